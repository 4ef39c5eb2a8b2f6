use async_trait::async_trait;
use domain::Notification;

// 平台原生通知钩子。权限由调用方预先取得，核心不主动申请
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification);
}
