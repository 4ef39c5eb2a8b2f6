use crate::driver::SyncWorker;
use crate::error::SyncError;
use crate::{CommandEnvelope, SyncConfig};
use chrono::Utc;
use domain::{AppCommand, Attachment, Comment, CommentUpdate, ConnectionState, IngestEvent, ResourceType};
use store::Store;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use uuid::Uuid;

// 同步客户端句柄：UI 层通过它提交本地意图并观察连接状态。
// store 与 tx_ingest 由调用方注入，多会话/测试互不干扰
pub struct SyncClient {
    config: SyncConfig,
    tx_cmd: mpsc::Sender<CommandEnvelope>,
    state_rx: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<Result<(), SyncError>>>>,
}

impl SyncClient {
    // 拉起同步工作者并立即返回句柄；连接建立是异步的，用 state() 观察
    pub fn connect(
        config: SyncConfig,
        store: Store,
        tx_ingest: broadcast::Sender<IngestEvent>,
    ) -> Self {
        let (tx_cmd, rx_cmd) = mpsc::channel(100);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let cancel = CancellationToken::new();

        let worker = SyncWorker::new(config.clone(), store, tx_ingest, state_tx);
        let worker_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let result = worker.run(rx_cmd, worker_cancel).await;
            if let Err(ref e) = result {
                error!("Sync worker stopped: {}", e);
            }
            result
        });

        Self {
            config,
            tx_cmd,
            state_rx,
            cancel,
            worker: Mutex::new(Some(handle)),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    // 从任意状态断开：心跳、重连定时器、输入过期定时器一并撤销
    pub async fn disconnect(&self) {
        self.cancel.cancel();
        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    // 乐观写入 + 传输；返回本地构造的评论 (含客户端生成的 id)
    pub async fn send_comment(
        &self,
        resource_type: ResourceType,
        resource_id: impl Into<String>,
        content: impl Into<String>,
        parent_id: Option<String>,
        mentions: Vec<String>,
        attachments: Vec<Attachment>,
    ) -> Result<Comment, SyncError> {
        let now = Utc::now();
        let comment = Comment {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            author_id: self.config.user_id.clone(),
            author_name: self.config.user_name.clone(),
            author_avatar: self.config.avatar_url.clone(),
            resource_type,
            resource_id: resource_id.into(),
            parent_id,
            mentions,
            attachments,
            reactions: Vec::new(),
            is_edited: false,
            is_pinned: false,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };

        self.submit(AppCommand::SendComment {
            comment: comment.clone(),
        })
        .await?;
        Ok(comment)
    }

    pub async fn send_comment_update(
        &self,
        comment_id: impl Into<String>,
        updates: CommentUpdate,
    ) -> Result<(), SyncError> {
        self.submit(AppCommand::UpdateComment {
            comment_id: comment_id.into(),
            updates,
        })
        .await
    }

    pub async fn send_comment_delete(
        &self,
        comment_id: impl Into<String>,
    ) -> Result<(), SyncError> {
        self.submit(AppCommand::DeleteComment {
            comment_id: comment_id.into(),
        })
        .await
    }

    // 本地输入信号的防抖是 UI 层的事，这里只负责转发
    pub async fn send_typing(
        &self,
        resource_id: impl Into<String>,
        is_typing: bool,
    ) -> Result<(), SyncError> {
        self.submit(AppCommand::SetTyping {
            resource_id: resource_id.into(),
            is_typing,
        })
        .await
    }

    pub async fn subscribe_resource(
        &self,
        resource_type: ResourceType,
        resource_id: impl Into<String>,
    ) -> Result<(), SyncError> {
        self.submit(AppCommand::Subscribe {
            resource_type,
            resource_id: resource_id.into(),
        })
        .await
    }

    pub async fn unsubscribe_resource(
        &self,
        resource_type: ResourceType,
        resource_id: impl Into<String>,
    ) -> Result<(), SyncError> {
        self.submit(AppCommand::Unsubscribe {
            resource_type,
            resource_id: resource_id.into(),
        })
        .await
    }

    async fn submit(&self, cmd: AppCommand) -> Result<(), SyncError> {
        // 无出站队列：离线期间的动作即丢即弃，绝不补发
        if !self.is_connected() {
            warn!("Not connected; dropping {:?}", cmd);
            return Err(SyncError::NotConnected);
        }

        let (resp_tx, resp_rx) = oneshot::channel();
        self.tx_cmd
            .send(CommandEnvelope {
                cmd,
                resp: resp_tx,
            })
            .await
            .map_err(|_| SyncError::Closed)?;
        resp_rx.await.map_err(|_| SyncError::Closed)?
    }
}
