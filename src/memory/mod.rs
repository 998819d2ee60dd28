//! 记忆层：对话记录（Message / Conversation）与对话注册表

pub mod conversation;
pub mod store;

pub use conversation::{ChatMessage, Content, Conversation, ConversationId, Message, Role};
pub use store::ConversationStore;
