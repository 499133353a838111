pub mod im;

// 重新导出常用类型，方便外部使用
pub use im::{
    channel::{EventChannel, InboundEvent, MemoryEventChannel, Topic, WsEventChannel},
    client::{ClientConfig, SessionClient},
    conversation::{ConversationSessionManager, ConversationTarget, ConversationView},
    dispatcher::{DispatchStats, SessionDispatcher, SessionListeners},
    error::{SessionError, SessionResult},
    friend::{RelationshipGraph, RelationStatus},
    group::{GroupMembershipManager, MembershipStatus},
    message::{ChatMessage, MessageContent, MessageStatus},
    types::Notification,
};
