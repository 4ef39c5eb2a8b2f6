use crate::models::{Comment, CommentUpdate, ResourceType};

#[derive(Debug)]
pub enum AppCommand {
    SendComment {
        comment: Comment,
    },
    UpdateComment {
        comment_id: String,
        updates: CommentUpdate,
    },
    DeleteComment {
        comment_id: String,
    },
    SetTyping {
        resource_id: String,
        is_typing: bool,
    },
    Subscribe {
        resource_type: ResourceType,
        resource_id: String,
    },
    Unsubscribe {
        resource_type: ResourceType,
        resource_id: String,
    },
}
