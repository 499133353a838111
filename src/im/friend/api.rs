//! 好友 HTTP API 客户端
//!
//! 负责所有好友关系相关的出站请求

use crate::im::friend::models::RelationAction;
use crate::im::types::handle_http_response;
use anyhow::{Context, Result};
use tracing::{debug, info};
use uuid::Uuid;

/// 好友相关的 HTTP API 客户端
pub struct FriendApi {
    client: reqwest::Client,
    api_base_url: String,
    user_id: String,
}

impl FriendApi {
    /// 创建新的好友 API 客户端
    ///
    /// `client` 应该已经在外部配置好认证拦截器
    pub fn new(client: reqwest::Client, api_base_url: String, user_id: String) -> Self {
        Self {
            client,
            api_base_url,
            user_id,
        }
    }

    /// 发送好友申请
    pub async fn send_friend_request(&self, to_user_id: &str) -> Result<()> {
        self.post(
            "/friend/add_friend",
            "发送好友申请",
            serde_json::json!({
                "fromUserID": self.user_id,
                "toUserID": to_user_id,
                "reqMsg": "",
            }),
        )
        .await
    }

    /// 处理好友申请（handleResult: 1 同意，-1 拒绝）
    pub async fn respond_to_friend_request(&self, from_user_id: &str, accept: bool) -> Result<()> {
        self.post(
            "/friend/add_friend_response",
            "处理好友申请",
            serde_json::json!({
                "fromUserID": from_user_id,
                "toUserID": self.user_id,
                "handleResult": if accept { 1 } else { -1 },
                "handleMsg": "",
            }),
        )
        .await
    }

    /// 拉黑 / 解除拉黑 / 删除好友
    pub async fn update_relation(&self, peer_user_id: &str, action: RelationAction) -> Result<()> {
        let (path, name, body) = match action {
            RelationAction::Block => (
                "/friend/add_black",
                "拉黑",
                serde_json::json!({ "ownerUserID": self.user_id, "blackUserID": peer_user_id }),
            ),
            RelationAction::Unblock => (
                "/friend/remove_black",
                "解除拉黑",
                serde_json::json!({ "ownerUserID": self.user_id, "blackUserID": peer_user_id }),
            ),
            RelationAction::Unfriend => (
                "/friend/delete_friend",
                "删除好友",
                serde_json::json!({ "ownerUserID": self.user_id, "friendUserID": peer_user_id }),
            ),
            RelationAction::Request => return self.send_friend_request(peer_user_id).await,
            RelationAction::Accept => return self.respond_to_friend_request(peer_user_id, true).await,
            RelationAction::Decline => {
                return self.respond_to_friend_request(peer_user_id, false).await
            }
        };
        self.post(path, name, body).await
    }

    async fn post(&self, path: &str, operation_name: &str, body: serde_json::Value) -> Result<()> {
        let operation_id = Uuid::new_v4().to_string();
        let url = format!("{}{}", self.api_base_url, path);

        info!("[FriendAPI] 📡 {}", operation_name);
        debug!(
            "[FriendAPI]   请求URL: {}, 用户ID: {}, 操作ID: {}",
            url, self.user_id, operation_id
        );

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("operationID", &operation_id)
            .json(&body)
            .send()
            .await
            .context("请求失败")?;

        handle_http_response::<serde_json::Value>(response, operation_name).await?;
        Ok(())
    }
}
