//! 群组事件 DTO（invitation topic 的 payload）

use crate::im::group::models::{GroupInfo, Invitation};
use serde::{Deserialize, Serialize};

/// 成员被移除（退群或被踢）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberRemovedEvent {
    #[serde(rename = "groupID")]
    pub group_id: String,
    #[serde(rename = "userID")]
    pub user_id: String,
    pub removed_at: i64,
}

/// 群组相关远程事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GroupEvent {
    /// 邀请/入群申请状态变更；`updatedAt` 为服务器处理时间
    InvitationChanged {
        invitation: Invitation,
        #[serde(rename = "updatedAt")]
        updated_at: i64,
    },
    MemberRemoved(MemberRemovedEvent),
    GroupInfoChanged(GroupInfo),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::im::group::models::{InvitationKind, InvitationStatus};

    #[test]
    fn decode_invitation_changed() {
        let json = r#"{
            "type": "invitation_changed",
            "invitation": {
                "invitationID": "inv-1",
                "groupID": "g1",
                "userID": "bob",
                "inviterUserID": "alice",
                "status": "accepted",
                "createdAt": 10
            },
            "updatedAt": 20
        }"#;
        let ev: GroupEvent = serde_json::from_str(json).unwrap();
        match ev {
            GroupEvent::InvitationChanged {
                invitation,
                updated_at,
            } => {
                assert_eq!(invitation.kind, InvitationKind::Invite);
                assert_eq!(invitation.status, InvitationStatus::Accepted);
                assert_eq!(updated_at, 20);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn decode_member_removed() {
        let json = r#"{"type":"member_removed","groupID":"g1","userID":"bob","removedAt":5}"#;
        let ev: GroupEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(ev, GroupEvent::MemberRemoved(ref e) if e.user_id == "bob"));
    }
}
