//! 消息模块
//!
//! 消息模型、消息事件与发送/拉取历史的 HTTP API

pub mod api;
pub mod listener;
pub mod models;
pub mod types;

pub use api::MessageApi;
pub use listener::{AdvancedMsgListener, EmptyAdvancedMsgListener};
pub use models::{ChatMessage, MessageStatus};
pub use types::{FileElem, MessageAck, MessageContent, MessageEvent, PictureBaseInfo, PictureElem, TextElem};
