//! 会话核心的错误分类
//!
//! 所有错误都只影响单个实体，不会导致会话崩溃。
//! 本地乐观状态被服务器覆盖（reconciliation）不是错误，以通知形式下发。

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// 当前状态下动作不合法，本地为 no-op
    #[error("非法状态转换: {entity} 当前状态为 {from}，不允许 {action}")]
    InvalidTransition {
        entity: String,
        from: String,
        action: &'static str,
    },

    #[error("用户 {user_id} 已是群 {group_id} 成员或已有待处理邀请")]
    AlreadyInvitedOrMember { group_id: String, user_id: String },

    /// 只用于计数，不向用户展示
    #[error("重复或过期的消息: 会话 {conversation_id} seq={seq}")]
    StaleOrDuplicateMessage { conversation_id: String, seq: u64 },

    #[error("远程操作失败 ({action}): {reason}")]
    RemoteActionFailed { action: String, reason: String },

    #[error("会话不存在: {0}")]
    ConversationNotFound(String),

    #[error("消息不存在: {0}")]
    MessageNotFound(String),

    #[error("邀请不存在: {0}")]
    InvitationNotFound(String),

    #[error("会话已结束")]
    SessionClosed,
}

impl SessionError {
    pub fn invalid_transition(
        entity: impl Into<String>,
        from: impl std::fmt::Debug,
        action: &'static str,
    ) -> Self {
        SessionError::InvalidTransition {
            entity: entity.into(),
            from: format!("{:?}", from),
            action,
        }
    }
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;
