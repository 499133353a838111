//! 消息本地模型定义

use crate::im::message::types::MessageContent;
use serde::{Deserialize, Serialize};

/// 消息发送状态
///
/// 收到的消息一律为 `Sent`；本地发送的临时消息从 `Sending` 开始，
/// 失败后停留在 `Failed` 等待重试，正文不会丢失。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Sending,
    Sent,
    Failed,
}

/// 会话中的一条消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(rename = "conversationID")]
    pub conversation_id: String,
    #[serde(rename = "clientMsgID")]
    pub client_msg_id: String,
    #[serde(rename = "serverMsgID")]
    pub server_msg_id: Option<String>,
    #[serde(rename = "sendID")]
    pub send_id: String,
    /// 服务器分配的序列号，临时消息为 None
    pub seq: Option<u64>,
    /// 本地排序号：已确认消息等于 seq，临时消息为发送时分配的临时序号
    pub local_seq: u64,
    pub content: MessageContent,
    pub send_time: i64,
    pub status: MessageStatus,
}

impl ChatMessage {
    pub fn is_provisional(&self) -> bool {
        self.seq.is_none()
    }
}
