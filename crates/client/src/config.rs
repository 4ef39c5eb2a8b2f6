use config::ConfigError;
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub session: SessionSettings,
    pub sync: SyncSettings,
    pub watch: WatchSettings,
}

#[derive(Deserialize, Clone)]
pub struct ServerSettings {
    pub url: String,
}

// 身份由外部会话提供：这里只消费，不做鉴权
#[derive(Deserialize, Clone)]
pub struct SessionSettings {
    pub user_id: String,
    pub user_name: String,
    pub avatar_url: Option<String>,
    pub token: Option<String>,
}

#[derive(Deserialize, Clone)]
pub struct SyncSettings {
    pub heartbeat_secs: u64,
    pub reconnect_base_ms: u64,
    pub max_reconnect_attempts: u32,
    pub typing_ttl_secs: u64,
}

// 启动后自动订阅的资源
#[derive(Deserialize, Clone)]
pub struct WatchSettings {
    pub resource_type: String,
    pub resource_id: String,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());
        let env_map = collect_env_vars();

        let s = config::Config::builder()
            .set_default("server.url", "ws://127.0.0.1:9001/ws")?
            .set_default("session.user_id", "guest")?
            .set_default("session.user_name", "Guest")?
            .set_default("sync.heartbeat_secs", 30)?
            .set_default("sync.reconnect_base_ms", 1000)?
            .set_default("sync.max_reconnect_attempts", 5)?
            .set_default("sync.typing_ttl_secs", 3)?
            .set_default("watch.resource_type", "task")?
            .set_default("watch.resource_id", "demo")?
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::File::with_name(&format!("config.{}", run_mode)).required(false))
            .add_source(config::File::from_str(
                &serde_json::to_string(&env_map)
                    .expect("Environment variables should serialize to JSON"),
                config::FileFormat::Json,
            ))
            .build()?;

        s.try_deserialize()
    }
}

fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars()
        .filter(|(k, _)| k.starts_with("COMMOTION_"))
        .map(|(k, v)| {
            let new_key = k
                .trim_start_matches("COMMOTION_")
                .replace("__", ".")
                .to_lowercase();
            (new_key, v)
        })
        .collect()
}
