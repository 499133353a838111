//! 会话模块
//!
//! 管理本地用户同时打开的多个聊天窗口及其消息流

pub mod layout;
pub mod listener;
pub mod models;
pub mod service;

pub use layout::assign_slots;
pub use listener::{ConversationListener, EmptyConversationListener};
pub use models::{
    group_conversation_id, single_conversation_id, Conversation, ConversationTarget,
    ConversationView, LayoutPosition, WindowState,
};
pub use service::{
    Cancellation, ConversationSessionManager, HistoryRequest, OpenedConversation, OutgoingSend,
};
