mod config;

use anyhow::Context;
use domain::{IngestEvent, ResourceType};
use dotenvy::dotenv;
use std::time::Duration;
use store::Store;
use sync::{SyncClient, SyncConfig};
use tokio::sync::broadcast;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tracing::{info, warn};

use crate::config::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let settings = Settings::new().context("Failed to load configuration")?;

    let (tx_ingest, _) = broadcast::channel(100);
    let store = Store::new(
        Duration::from_secs(settings.sync.typing_ttl_secs),
        tx_ingest.clone(),
    );

    let mut sync_config = SyncConfig::new(
        settings.server.url.clone(),
        settings.session.user_id.clone(),
        settings.session.user_name.clone(),
    );
    sync_config.avatar_url = settings.session.avatar_url.clone();
    sync_config.token = settings.session.token.clone();
    sync_config.heartbeat_interval = Duration::from_secs(settings.sync.heartbeat_secs);
    sync_config.reconnect_base = Duration::from_millis(settings.sync.reconnect_base_ms);
    sync_config.max_reconnect_attempts = settings.sync.max_reconnect_attempts;

    info!("Connecting to {}", settings.server.url);
    let client = SyncClient::connect(sync_config, store.clone(), tx_ingest.clone());

    // 事件尾随：把三个 store 的变化打到终端
    let mut events = BroadcastStream::new(tx_ingest.subscribe());
    let tail = tokio::spawn(async move {
        while let Some(result) = events.next().await {
            let event = match result {
                Ok(event) => event,
                // 落后就丢，尾随工具不需要完整回放
                Err(_) => continue,
            };
            match event {
                IngestEvent::CommentSaved {
                    resource_id,
                    comment,
                } => {
                    println!("[{}] {}: {}", resource_id, comment.author_name, comment.content);
                }
                IngestEvent::CommentDeleted {
                    resource_id,
                    comment_id,
                } => {
                    println!("[{}] comment {} deleted", resource_id, comment_id);
                }
                IngestEvent::NotificationArrived { notification } => {
                    println!("* {}", notification.message);
                }
                IngestEvent::TypingChanged {
                    resource_id,
                    active,
                } => {
                    if active.is_empty() {
                        println!("[{}] nobody is typing", resource_id);
                    } else {
                        println!("[{}] typing: {}", resource_id, active.join(", "));
                    }
                }
                IngestEvent::ConnectionChanged { state, attempt } => {
                    println!("connection: {:?} (attempt {})", state, attempt);
                }
            }
        }
    });

    // 等到连上再订阅启动资源
    for _ in 0..100 {
        if client.is_connected() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    if client.is_connected() {
        let resource_type = ResourceType::new(settings.watch.resource_type.clone())
            .map_err(anyhow::Error::msg)?;
        client
            .subscribe_resource(resource_type, settings.watch.resource_id.clone())
            .await?;
        info!(
            "Watching {}/{}",
            settings.watch.resource_type, settings.watch.resource_id
        );
    } else {
        warn!("Still not connected; skipping initial subscribe");
    }

    shutdown_signal().await;
    info!("Shutting down...");
    client.disconnect().await;
    tail.abort();

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        },
    }
}
