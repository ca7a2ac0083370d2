//! 记忆层：消息模型、历史投影、会话文档与持久化

pub mod conversation;
pub mod persistence;
pub mod projection;
pub mod session;

pub use conversation::{new_message_id, now_millis, Message, Role};
pub use persistence::{restore_or_create, SessionRecorder, SessionStore, SESSIONS_FILE};
pub use projection::{project_history, project_message};
pub use session::{Session, SessionDocument, SessionSummary, PLACEHOLDER_TITLE};
