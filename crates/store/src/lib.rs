use domain::{Comment, IngestEvent, Notification};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};

mod repo;
mod typing;

pub use repo::comments::TOMBSTONE;
pub use repo::notifications::NotificationBucket;
pub use typing::TypingTracker;

// 会话级状态容器：可注入、可克隆，绝不做成全局单例
#[derive(Clone)]
pub struct Store {
    // resource_id -> 按 created_at 升序的评论桶
    comments: Arc<RwLock<HashMap<String, Vec<Comment>>>>,
    // 最新在前
    notifications: Arc<RwLock<Vec<Notification>>>,
    typing: TypingTracker,
}

impl Store {
    pub fn new(typing_ttl: Duration, tx_ingest: broadcast::Sender<IngestEvent>) -> Self {
        Self {
            comments: Arc::new(RwLock::new(HashMap::new())),
            notifications: Arc::new(RwLock::new(Vec::new())),
            typing: TypingTracker::new(typing_ttl, tx_ingest),
        }
    }

    pub async fn apply_typing(
        &self,
        resource_id: &str,
        user_id: &str,
        user_name: &str,
        is_typing: bool,
    ) {
        self.typing
            .apply(resource_id, user_id, user_name, is_typing)
            .await;
    }

    pub async fn typing_users(&self, resource_id: &str) -> Vec<String> {
        self.typing.active(resource_id).await
    }

    pub async fn clear_typing(&self) {
        self.typing.clear().await;
    }
}
