use crate::error::SyncError;
use crate::traits::Notifier;
use domain::protocol::{CommentDeletePayload, CommentUpdatePayload, RawEnvelope, TypingPayload};
use domain::{Comment, IngestEvent, Notification};
use std::sync::Arc;
use store::Store;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

// 入站消息路由：一条分发队列，严格按到达顺序写三个 store
pub(crate) struct Dispatcher {
    store: Store,
    local_user_id: String,
    tx_ingest: broadcast::Sender<IngestEvent>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl Dispatcher {
    pub(crate) fn new(
        store: Store,
        local_user_id: String,
        tx_ingest: broadcast::Sender<IngestEvent>,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Self {
        Self {
            store,
            local_user_id,
            tx_ingest,
            notifier,
        }
    }

    // 解析失败返回 Err，由调用方记录后丢弃；连接不受影响
    pub(crate) async fn handle(&self, raw: &str) -> Result<(), SyncError> {
        let envelope = RawEnvelope::parse(raw)?;

        match envelope.kind.as_str() {
            "comment_added" => {
                let comment: Comment = envelope.payload_as()?;
                // 回声抑制：自己发出的评论已在本地乐观写入
                if comment.author_id == self.local_user_id {
                    debug!("Echo suppressed for comment {}", comment.id);
                    return Ok(());
                }
                let resource_id = comment.resource_id.clone();
                self.store.append_comment(comment.clone()).await;
                let _ = self.tx_ingest.send(IngestEvent::CommentSaved {
                    resource_id,
                    comment,
                });
            }
            "comment_updated" => {
                let p: CommentUpdatePayload = envelope.payload_as()?;
                if self.store.update_comment(&p.comment_id, &p.updates).await {
                    if let Some(comment) = self.store.get_comment(&p.comment_id).await {
                        let _ = self.tx_ingest.send(IngestEvent::CommentSaved {
                            resource_id: comment.resource_id.clone(),
                            comment,
                        });
                    }
                } else {
                    debug!("comment_updated for unknown id {}", p.comment_id);
                }
            }
            "comment_deleted" => {
                let p: CommentDeletePayload = envelope.payload_as()?;
                match self.store.soft_delete_comment(&p.comment_id).await {
                    Some(resource_id) => {
                        let _ = self.tx_ingest.send(IngestEvent::CommentDeleted {
                            resource_id,
                            comment_id: p.comment_id,
                        });
                    }
                    None => debug!("comment_deleted for unknown id {}", p.comment_id),
                }
            }
            "user_typing" => {
                let p: TypingPayload = envelope.payload_as()?;
                // 本地用户的输入状态不进追踪器
                if p.user_id == self.local_user_id {
                    return Ok(());
                }
                self.store
                    .apply_typing(&p.resource_id, &p.user_id, &p.user_name, p.is_typing)
                    .await;
            }
            "notification" => {
                let notification: Notification = envelope.payload_as()?;
                if notification.to_user_id != self.local_user_id {
                    debug!("Notification addressed to {}, ignored", notification.to_user_id);
                    return Ok(());
                }
                self.store.append_notification(notification.clone()).await;
                if let Some(ref notifier) = self.notifier {
                    notifier.notify(&notification).await;
                }
                let _ = self
                    .tx_ingest
                    .send(IngestEvent::NotificationArrived { notification });
            }
            "pong" => {
                trace!("pong");
            }
            other => {
                // 向前兼容：未知类型不致错
                warn!("Ignoring unknown message type: {}", other);
            }
        }

        Ok(())
    }
}
