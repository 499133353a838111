//! 好友关系本地模型定义

use serde::{Deserialize, Serialize};

/// 关系状态（始终是某个用户视角下的状态）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationStatus {
    None,
    PendingOutgoing,
    PendingIncoming,
    Accepted,
    Declined,
    Blocked,
}

/// 关系边的底层状态（与观察者视角无关）
///
/// 同一条边对请求方是 `pending_outgoing`，对接收方是 `pending_incoming`，
/// 两种视角都由 [`EdgeState::view_for`] 推导。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EdgeState {
    None,
    Pending {
        #[serde(rename = "requesterID")]
        requester: String,
    },
    Accepted,
    Declined {
        #[serde(rename = "byUserID")]
        by: String,
    },
    Blocked {
        #[serde(rename = "byUserID")]
        by: String,
    },
}

impl EdgeState {
    /// 指定用户视角下的状态
    pub fn view_for(&self, user_id: &str) -> RelationStatus {
        match self {
            EdgeState::None => RelationStatus::None,
            EdgeState::Pending { requester } if requester == user_id => {
                RelationStatus::PendingOutgoing
            }
            EdgeState::Pending { .. } => RelationStatus::PendingIncoming,
            EdgeState::Accepted => RelationStatus::Accepted,
            EdgeState::Declined { .. } => RelationStatus::Declined,
            EdgeState::Blocked { .. } => RelationStatus::Blocked,
        }
    }
}

/// 无序用户对（同一对用户最多一条边）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey {
    low: String,
    high: String,
}

impl PairKey {
    pub fn new(a: &str, b: &str) -> Self {
        if a <= b {
            Self {
                low: a.to_string(),
                high: b.to_string(),
            }
        } else {
            Self {
                low: b.to_string(),
                high: a.to_string(),
            }
        }
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.low == user_id || self.high == user_id
    }

    /// 对端用户；`user_id` 不在该对中时返回 None
    pub fn other(&self, user_id: &str) -> Option<&str> {
        if self.low == user_id {
            Some(&self.high)
        } else if self.high == user_id {
            Some(&self.low)
        } else {
            None
        }
    }

    /// 实体 ID（用于通知）
    pub fn id(&self) -> String {
        format!("{}_{}", self.low, self.high)
    }
}

/// 已发出、尚未得到确认的本地动作（两阶段值的 optimistic 部分）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingAction {
    #[serde(rename = "opID")]
    pub op_id: u64,
    pub state: EdgeState,
    pub issued_at: i64,
}

/// 关系边
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipEdge {
    pub pair: PairKey,
    /// 服务器确认过的状态
    pub confirmed: EdgeState,
    /// 本地乐观状态，确认或失败后清空
    pub optimistic: Option<PendingAction>,
    /// 最后一次权威（远程）状态的时间戳
    pub updated_at: i64,
    /// 最近一次应用的远程事件 (updatedAt, 状态)，用于识别重复投递
    pub last_remote: Option<(i64, EdgeState)>,
}

impl RelationshipEdge {
    pub fn new(pair: PairKey) -> Self {
        Self {
            pair,
            confirmed: EdgeState::None,
            optimistic: None,
            updated_at: 0,
            last_remote: None,
        }
    }

    /// 当前生效的状态：有乐观值时取乐观值
    pub fn effective(&self) -> &EdgeState {
        self.optimistic
            .as_ref()
            .map(|p| &p.state)
            .unwrap_or(&self.confirmed)
    }

    pub fn status_for(&self, user_id: &str) -> RelationStatus {
        self.effective().view_for(user_id)
    }

    /// 本地用户视角的快照
    pub fn view(&self, local_user_id: &str) -> RelationshipView {
        RelationshipView {
            pair_id: self.pair.id(),
            peer_user_id: self
                .pair
                .other(local_user_id)
                .unwrap_or_default()
                .to_string(),
            status: self.status_for(local_user_id),
            confirmed_status: self.confirmed.view_for(local_user_id),
            pending_confirmation: self.optimistic.is_some(),
            updated_at: self.updated_at,
        }
    }
}

/// 推送给观察者的关系视图
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipView {
    #[serde(rename = "pairID")]
    pub pair_id: String,
    #[serde(rename = "peerUserID")]
    pub peer_user_id: String,
    pub status: RelationStatus,
    pub confirmed_status: RelationStatus,
    pub pending_confirmation: bool,
    pub updated_at: i64,
}

/// 本地用户可以发起的关系动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationAction {
    Request,
    Accept,
    Decline,
    Block,
    Unblock,
    Unfriend,
}

impl RelationAction {
    pub fn name(&self) -> &'static str {
        match self {
            RelationAction::Request => "request",
            RelationAction::Accept => "accept",
            RelationAction::Decline => "decline",
            RelationAction::Block => "block",
            RelationAction::Unblock => "unblock",
            RelationAction::Unfriend => "unfriend",
        }
    }
}
