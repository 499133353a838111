//! 群组模块
//!
//! 管理群邀请、入群申请与成员身份

pub mod api;
pub mod listener;
pub mod models;
pub mod service;
pub mod types;

pub use api::GroupApi;
pub use listener::{EmptyGroupListener, GroupListener};
pub use models::{
    GroupInfo, Invitation, InvitationKind, InvitationStatus, MemberSlot, Membership,
    MembershipStatus, MembershipView,
};
pub use service::{GroupAction, GroupMembershipManager, GroupTransition};
pub use types::{GroupEvent, MemberRemovedEvent};
