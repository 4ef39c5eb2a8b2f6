use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    // 套接字打开失败或异常断开：触发退避重连，耗尽后才对用户可见
    #[error("transport failure: {0}")]
    Transport(String),

    // 信封解析失败：记录并丢弃，不影响连接
    #[error("malformed envelope: {0}")]
    Protocol(#[from] serde_json::Error),

    // 无出站队列：离线期间的指令直接丢弃
    #[error("not connected; command dropped")]
    NotConnected,

    // 致命：需要用户手动重连
    #[error("reconnect attempts exhausted after {attempts} tries")]
    ReconnectExhausted { attempts: u32 },

    #[error("sync worker is gone")]
    Closed,
}

impl SyncError {
    pub(crate) fn transport(err: impl fmt::Display) -> Self {
        SyncError::Transport(err.to_string())
    }
}
