//! 群组本地模型定义

use serde::{Deserialize, Serialize};

/// 群组基础信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInfo {
    #[serde(rename = "groupID")]
    pub group_id: String,
    #[serde(rename = "creatorUserID")]
    pub creator_user_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "imageURL", default)]
    pub image_url: String,
    pub create_time: i64,
    pub update_time: i64,
}

/// 群成员记录（存在即表示有效成员）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    #[serde(rename = "groupID")]
    pub group_id: String,
    #[serde(rename = "userID")]
    pub user_id: String,
    pub joined_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Declined,
}

/// 邀请类型：成员邀请他人，或用户主动申请入群（由群主处理）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InvitationKind {
    #[default]
    Invite,
    JoinRequest,
}

/// 群邀请
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invitation {
    #[serde(rename = "invitationID")]
    pub invitation_id: String,
    #[serde(rename = "groupID")]
    pub group_id: String,
    #[serde(rename = "userID")]
    pub user_id: String,
    #[serde(rename = "inviterUserID", default)]
    pub inviter_user_id: Option<String>,
    #[serde(default)]
    pub kind: InvitationKind,
    pub status: InvitationStatus,
    pub created_at: i64,
}

/// 每个 (群, 用户) 唯一的槽位
///
/// 邀请与成员身份互斥：同一槽位同一时刻只能是其中之一，
/// 接受邀请即在一次赋值中把 `Invited` 替换为 `Member`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MemberSlot {
    Invited { invitation: Invitation },
    Member { membership: Membership },
}

/// 成员身份查询结果；非成员返回 `NotMember` 而不是错误
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MembershipStatus {
    Member { membership: Membership },
    Invited { invitation: Invitation },
    NotMember,
}

impl MembershipStatus {
    pub fn is_member(&self) -> bool {
        matches!(self, MembershipStatus::Member { .. })
    }
}

impl From<Option<&MemberSlot>> for MembershipStatus {
    fn from(slot: Option<&MemberSlot>) -> Self {
        match slot {
            Some(MemberSlot::Member { membership }) => MembershipStatus::Member {
                membership: membership.clone(),
            },
            Some(MemberSlot::Invited { invitation }) => MembershipStatus::Invited {
                invitation: invitation.clone(),
            },
            None => MembershipStatus::NotMember,
        }
    }
}

/// 推送给观察者的成员槽位视图
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipView {
    #[serde(rename = "groupID")]
    pub group_id: String,
    #[serde(rename = "userID")]
    pub user_id: String,
    #[serde(flatten)]
    pub status: MembershipStatus,
}

pub fn slot_entity_id(group_id: &str, user_id: &str) -> String {
    format!("{}:{}", group_id, user_id)
}
