//! 联系人（好友关系）模块
//!
//! 维护本地用户与其他用户之间的关系边状态机

pub mod api;
pub mod listener;
pub mod models;
pub mod service;
pub mod types;

// 重新导出主要类型
pub use api::FriendApi;
pub use listener::{EmptyFriendListener, FriendListener};
pub use models::{EdgeState, PairKey, RelationAction, RelationStatus, RelationshipEdge, RelationshipView};
pub use service::{RelationTransition, RelationshipGraph};
pub use types::{RelationshipEvent, RemoteRelationStatus};
