pub mod channel;
pub mod client;
pub mod conversation;
pub mod dispatcher;
pub mod error;
pub mod friend;
pub mod group;
pub mod message;
pub mod remote;
pub mod serialization;
pub mod types;

// 重新导出会话入口
pub use client::{ClientConfig, SessionClient};
pub use dispatcher::{SessionDispatcher, SessionListeners};
