//! 出站协作方：远程 API 与历史消息存储
//!
//! 会话核心只依赖这两个 trait，测试中可替换为内存实现。

use crate::im::client::ClientConfig;
use crate::im::conversation::models::ConversationTarget;
use crate::im::friend::api::FriendApi;
use crate::im::friend::models::RelationAction;
use crate::im::group::api::GroupApi;
use crate::im::group::models::Invitation;
use crate::im::message::api::MessageApi;
use crate::im::message::models::ChatMessage;
use crate::im::message::types::{MessageAck, MessageEvent};
use anyhow::{Context, Result};
use async_trait::async_trait;

/// 远程 API（每个调用都可能失败，且没有延迟上限）
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn send_friend_request(&self, to_user_id: &str) -> Result<()>;

    async fn respond_to_friend_request(&self, from_user_id: &str, accept: bool) -> Result<()>;

    /// 拉黑 / 解除拉黑 / 删除好友
    async fn update_relation(&self, peer_user_id: &str, action: RelationAction) -> Result<()>;

    async fn invite_to_group(&self, invitation: &Invitation) -> Result<()>;

    async fn request_to_join(&self, invitation: &Invitation) -> Result<()>;

    async fn respond_to_invitation(&self, invitation: &Invitation, accept: bool) -> Result<()>;

    async fn leave_group(&self, group_id: &str) -> Result<()>;

    async fn post_message(&self, target: &ConversationTarget, message: &ChatMessage) -> Result<MessageAck>;
}

/// 历史消息存储
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// 返回按 seq 升序的一页消息；`before_seq` 为 None 时取最新一页
    async fn fetch_history(&self, conversation_id: &str, before_seq: Option<u64>) -> Result<Vec<ChatMessage>>;
}

/// 基于 HTTP 的远程 API 实现
pub struct HttpRemoteApi {
    friend: FriendApi,
    group: GroupApi,
    message: MessageApi,
}

impl HttpRemoteApi {
    /// 创建带认证拦截器的 HTTP 客户端（token 通过 default_headers 自动添加）
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http_client = reqwest::ClientBuilder::new()
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(
                    reqwest::header::HeaderName::from_static("token"),
                    reqwest::header::HeaderValue::from_str(&config.token).context("无效的 token")?,
                );
                headers
            })
            .build()
            .context("创建 HTTP 客户端失败")?;

        let base = config.api_base_url.clone();
        let user_id = config.user_id.clone();
        Ok(Self {
            friend: FriendApi::new(http_client.clone(), base.clone(), user_id.clone()),
            group: GroupApi::new(http_client.clone(), base.clone(), user_id.clone()),
            message: MessageApi::new(http_client, base, user_id),
        })
    }
}

#[async_trait]
impl RemoteApi for HttpRemoteApi {
    async fn send_friend_request(&self, to_user_id: &str) -> Result<()> {
        self.friend.send_friend_request(to_user_id).await
    }

    async fn respond_to_friend_request(&self, from_user_id: &str, accept: bool) -> Result<()> {
        self.friend.respond_to_friend_request(from_user_id, accept).await
    }

    async fn update_relation(&self, peer_user_id: &str, action: RelationAction) -> Result<()> {
        self.friend.update_relation(peer_user_id, action).await
    }

    async fn invite_to_group(&self, invitation: &Invitation) -> Result<()> {
        self.group.invite_user_to_group(invitation).await
    }

    async fn request_to_join(&self, invitation: &Invitation) -> Result<()> {
        self.group.join_group(invitation).await
    }

    async fn respond_to_invitation(&self, invitation: &Invitation, accept: bool) -> Result<()> {
        self.group.respond_to_invitation(invitation, accept).await
    }

    async fn leave_group(&self, group_id: &str) -> Result<()> {
        self.group.quit_group(group_id).await
    }

    async fn post_message(&self, target: &ConversationTarget, message: &ChatMessage) -> Result<MessageAck> {
        match target {
            ConversationTarget::Peer(peer) => self.message.send_msg(message, Some(peer), None).await,
            ConversationTarget::Group(group_id) => {
                self.message.send_msg(message, None, Some(group_id)).await
            }
        }
    }
}

#[async_trait]
impl HistoryStore for HttpRemoteApi {
    async fn fetch_history(&self, conversation_id: &str, before_seq: Option<u64>) -> Result<Vec<ChatMessage>> {
        let events = self.message.pull_history(conversation_id, before_seq).await?;
        Ok(events.into_iter().map(MessageEvent::into_message).collect())
    }
}
