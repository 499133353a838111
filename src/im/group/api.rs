//! 群组 HTTP API 客户端

use crate::im::group::models::{Invitation, InvitationKind};
use crate::im::types::handle_http_response;
use anyhow::{Context, Result};
use tracing::{debug, info};
use uuid::Uuid;

pub struct GroupApi {
    client: reqwest::Client,
    api_base_url: String,
    user_id: String,
}

impl GroupApi {
    pub fn new(client: reqwest::Client, api_base_url: String, user_id: String) -> Self {
        Self {
            client,
            api_base_url,
            user_id,
        }
    }

    /// 邀请用户入群
    pub async fn invite_user_to_group(&self, invitation: &Invitation) -> Result<()> {
        self.post(
            "/group/invite_user_to_group",
            "邀请入群",
            serde_json::json!({
                "groupID": invitation.group_id,
                "invitedUserIDs": [invitation.user_id],
                "reason": "",
                "invitationID": invitation.invitation_id,
            }),
        )
        .await
    }

    /// 申请入群
    pub async fn join_group(&self, invitation: &Invitation) -> Result<()> {
        self.post(
            "/group/join_group",
            "申请入群",
            serde_json::json!({
                "groupID": invitation.group_id,
                "reqMessage": "",
                "joinSource": 3,
                "invitationID": invitation.invitation_id,
            }),
        )
        .await
    }

    /// 处理邀请或入群申请（handleResult: 1 同意，-1 拒绝）
    pub async fn respond_to_invitation(&self, invitation: &Invitation, accept: bool) -> Result<()> {
        let path = match invitation.kind {
            InvitationKind::Invite => "/group/invitation_response",
            InvitationKind::JoinRequest => "/group/group_application_response",
        };
        self.post(
            path,
            "处理群邀请",
            serde_json::json!({
                "groupID": invitation.group_id,
                "fromUserID": invitation.user_id,
                "invitationID": invitation.invitation_id,
                "handledMsg": "",
                "handleResult": if accept { 1 } else { -1 },
            }),
        )
        .await
    }

    /// 退出群
    pub async fn quit_group(&self, group_id: &str) -> Result<()> {
        self.post(
            "/group/quit_group",
            "退出群",
            serde_json::json!({ "groupID": group_id }),
        )
        .await
    }

    async fn post(&self, path: &str, operation_name: &str, body: serde_json::Value) -> Result<()> {
        let operation_id = Uuid::new_v4().to_string();
        let url = format!("{}{}", self.api_base_url, path);

        info!("[GroupAPI] 📡 {}", operation_name);
        debug!(
            "[GroupAPI]   请求URL: {}, 用户ID: {}, 操作ID: {}",
            url, self.user_id, operation_id
        );

        let response = self
            .client
            .post(&url)
            .header("operationID", &operation_id)
            .json(&body)
            .send()
            .await
            .context("请求失败")?;

        handle_http_response::<serde_json::Value>(response, operation_name).await?;
        Ok(())
    }
}
