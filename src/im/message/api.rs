//! 消息 HTTP API 客户端
//!
//! 发送消息与按 seq 拉取历史

use crate::im::message::models::ChatMessage;
use crate::im::message::types::{MessageAck, MessageEvent};
use crate::im::types::handle_http_response;
use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

/// 单次历史拉取的条数
const HISTORY_PAGE_SIZE: u32 = 50;

#[derive(Debug, Deserialize)]
struct PullMsgResp {
    #[serde(default)]
    msgs: Vec<MessageEvent>,
}

pub struct MessageApi {
    client: reqwest::Client,
    api_base_url: String,
    user_id: String,
}

impl MessageApi {
    pub fn new(client: reqwest::Client, api_base_url: String, user_id: String) -> Self {
        Self {
            client,
            api_base_url,
            user_id,
        }
    }

    /// 发送消息，返回服务器分配的 seq
    ///
    /// `recv_id` 为单聊对方，`group_id` 为群聊 ID，二者只填其一
    pub async fn send_msg(
        &self,
        message: &ChatMessage,
        recv_id: Option<&str>,
        group_id: Option<&str>,
    ) -> Result<MessageAck> {
        let operation_id = Uuid::new_v4().to_string();
        let url = format!("{}/msg/send_msg", self.api_base_url);

        info!(
            "[MsgAPI] 📤 发送消息 clientMsgID={} 会话={}",
            message.client_msg_id, message.conversation_id
        );
        debug!("[MsgAPI]   请求URL: {}, 操作ID: {}", url, operation_id);

        let response = self
            .client
            .post(&url)
            .header("operationID", &operation_id)
            .json(&serde_json::json!({
                "sendID": self.user_id,
                "recvID": recv_id.unwrap_or_default(),
                "groupID": group_id.unwrap_or_default(),
                "clientMsgID": message.client_msg_id,
                "sessionType": if group_id.is_some() { 3 } else { 1 },
                "content": message.content,
                "sendTime": message.send_time,
            }))
            .send()
            .await
            .context("发送消息请求失败")?;

        let resp = handle_http_response::<MessageAck>(response, "发送消息").await?;
        resp.data
            .ok_or_else(|| anyhow::anyhow!("发送消息响应中缺少 data 字段"))
    }

    /// 拉取 `before_seq` 之前（不含）的一页历史，None 表示最新一页
    pub async fn pull_history(
        &self,
        conversation_id: &str,
        before_seq: Option<u64>,
    ) -> Result<Vec<MessageEvent>> {
        let operation_id = Uuid::new_v4().to_string();
        let url = format!("{}/msg/pull_msg_by_seq", self.api_base_url);

        info!(
            "[MsgAPI] 📥 拉取历史 会话={} beforeSeq={:?}",
            conversation_id, before_seq
        );

        let response = self
            .client
            .post(&url)
            .header("operationID", &operation_id)
            .json(&serde_json::json!({
                "userID": self.user_id,
                "conversationID": conversation_id,
                "beforeSeq": before_seq.unwrap_or(0),
                "num": HISTORY_PAGE_SIZE,
            }))
            .send()
            .await
            .context("拉取历史请求失败")?;

        let resp = handle_http_response::<PullMsgResp>(response, "拉取历史").await?;
        let mut msgs = resp.data.map(|d| d.msgs).unwrap_or_default();
        msgs.sort_by_key(|m| m.seq);
        debug!("[MsgAPI] 拉取到 {} 条历史消息", msgs.len());
        Ok(msgs)
    }
}
