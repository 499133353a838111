//! 好友关系事件 DTO

use crate::im::friend::models::{EdgeState, PairKey};
use serde::{Deserialize, Serialize};

/// 服务器侧的关系状态（与 friends 表的 status 字段对应）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteRelationStatus {
    None,
    Pending,
    Accepted,
    Declined,
    Blocked,
}

/// 关系变更事件（relationship topic 的 payload）
///
/// `actionUserID` 是最后一次操作该边的用户：pending 时为请求方，
/// declined/blocked 时为执行拒绝/拉黑的一方。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipEvent {
    #[serde(rename = "fromUserID")]
    pub from_user_id: String,
    #[serde(rename = "toUserID")]
    pub to_user_id: String,
    pub status: RemoteRelationStatus,
    #[serde(rename = "actionUserID")]
    pub action_user_id: String,
    pub updated_at: i64,
}

impl RelationshipEvent {
    pub fn pair(&self) -> PairKey {
        PairKey::new(&self.from_user_id, &self.to_user_id)
    }

    pub fn edge_state(&self) -> EdgeState {
        match self.status {
            RemoteRelationStatus::None => EdgeState::None,
            RemoteRelationStatus::Pending => EdgeState::Pending {
                requester: self.action_user_id.clone(),
            },
            RemoteRelationStatus::Accepted => EdgeState::Accepted,
            RemoteRelationStatus::Declined => EdgeState::Declined {
                by: self.action_user_id.clone(),
            },
            RemoteRelationStatus::Blocked => EdgeState::Blocked {
                by: self.action_user_id.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_pending_event() {
        let json = r#"{
            "fromUserID": "alice",
            "toUserID": "bob",
            "status": "pending",
            "actionUserID": "alice",
            "updatedAt": 1700000000000
        }"#;
        let ev: RelationshipEvent = serde_json::from_str(json).unwrap();
        assert_eq!(ev.pair(), PairKey::new("bob", "alice"));
        assert_eq!(
            ev.edge_state(),
            EdgeState::Pending {
                requester: "alice".to_string()
            }
        );
    }
}
