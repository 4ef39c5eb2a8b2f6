mod backoff;
mod client;
mod dispatch;
mod driver;
mod error;
mod traits;

pub use backoff::Backoff;
pub use client::SyncClient;
pub use error::SyncError;
pub use traits::Notifier;

use domain::AppCommand;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

// --- 信封模式核心定义 ---
pub struct CommandEnvelope {
    pub cmd: AppCommand,
    // 结果回传通道：API 层等待这个 Result
    pub resp: oneshot::Sender<Result<(), SyncError>>,
}

#[derive(Clone)]
pub struct SyncConfig {
    pub url: String,
    pub user_id: String,
    pub user_name: String,
    pub avatar_url: Option<String>,
    pub token: Option<String>,
    pub heartbeat_interval: Duration,
    pub reconnect_base: Duration,
    pub max_reconnect_attempts: u32,
    pub notifier: Option<Arc<dyn Notifier>>,
}

impl SyncConfig {
    pub fn new(
        url: impl Into<String>,
        user_id: impl Into<String>,
        user_name: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            user_id: user_id.into(),
            user_name: user_name.into(),
            avatar_url: None,
            token: None,
            heartbeat_interval: Duration::from_secs(30),
            reconnect_base: Duration::from_secs(1),
            max_reconnect_attempts: 5,
            notifier: None,
        }
    }

    // 身份走查询参数，token 可选
    pub(crate) fn endpoint(&self) -> String {
        match self.token {
            Some(ref token) => format!("{}?userId={}&token={}", self.url, self.user_id, token),
            None => format!("{}?userId={}", self.url, self.user_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_appends_identity_query() {
        let config = SyncConfig::new("ws://example.org/sync", "u-1", "Alice");
        assert_eq!(config.endpoint(), "ws://example.org/sync?userId=u-1");
    }

    #[test]
    fn endpoint_includes_token_when_present() {
        let mut config = SyncConfig::new("ws://example.org/sync", "u-1", "Alice");
        config.token = Some("secret".to_string());
        assert_eq!(
            config.endpoint(),
            "ws://example.org/sync?userId=u-1&token=secret"
        );
    }
}
