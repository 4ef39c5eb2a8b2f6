use crate::models::{Comment, ConnectionState, Notification};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IngestEvent {
    CommentSaved {
        resource_id: String,
        comment: Comment,
    },
    CommentDeleted {
        resource_id: String,
        comment_id: String,
    },
    NotificationArrived {
        notification: Notification,
    },
    TypingChanged {
        resource_id: String,
        active: Vec<String>,
    },
    ConnectionChanged {
        state: ConnectionState,
        attempt: u32,
    },
}
