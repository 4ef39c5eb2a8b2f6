mod commands;
mod events;
mod models;
pub mod protocol;

pub use commands::AppCommand;
pub use events::IngestEvent;
pub use models::{
    Attachment, Comment, CommentUpdate, ConnectionState, Notification, NotificationKind, Reaction,
    ResourceType,
};
