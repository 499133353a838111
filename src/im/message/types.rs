//! 消息元素与消息事件 DTO
//!
//! 元素字段命名沿用服务器 JSON 约定（camelCase）

use crate::im::conversation::models::{group_conversation_id, single_conversation_id};
use crate::im::message::models::{ChatMessage, MessageStatus};
use serde::{Deserialize, Serialize};

/// 文本元素
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextElem {
    pub content: String,
}

/// 已上传图片的引用信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PictureBaseInfo {
    pub uuid: String,
    #[serde(rename = "type")]
    pub r#type: String,
    pub size: i64,
    pub width: i32,
    pub height: i32,
    pub url: String,
}

/// 图片元素（只携带引用，上传由外部完成）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PictureElem {
    pub source_picture: PictureBaseInfo,
    pub snapshot_picture: Option<PictureBaseInfo>,
}

/// 文件元素
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileElem {
    pub uuid: String,
    pub source_url: String,
    pub file_name: String,
    pub file_size: i64,
}

/// 消息内容：正文或媒体引用
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "contentType", rename_all = "snake_case")]
pub enum MessageContent {
    Text(TextElem),
    Picture(PictureElem),
    File(FileElem),
}

impl MessageContent {
    pub fn text(content: impl Into<String>) -> Self {
        MessageContent::Text(TextElem {
            content: content.into(),
        })
    }

    /// 会话列表里展示的摘要
    pub fn summary(&self) -> String {
        match self {
            MessageContent::Text(t) => t.content.clone(),
            MessageContent::Picture(_) => "[图片]".to_string(),
            MessageContent::File(f) => format!("[文件] {}", f.file_name),
        }
    }
}

/// message topic 的 payload：服务器下发的一条消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEvent {
    #[serde(rename = "clientMsgID")]
    pub client_msg_id: String,
    #[serde(rename = "serverMsgID", default)]
    pub server_msg_id: String,
    #[serde(rename = "sendID")]
    pub send_id: String,
    #[serde(rename = "recvID", default)]
    pub recv_id: String,
    #[serde(rename = "groupID", default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    /// 0 表示服务器尚未分配 seq，这样的消息无法落地
    #[serde(default)]
    pub seq: u64,
    pub content: MessageContent,
    pub send_time: i64,
}

impl MessageEvent {
    /// 群消息 `sg_<群ID>`，单聊 `si_<较小ID>_<较大ID>`
    pub fn conversation_id(&self) -> String {
        match &self.group_id {
            Some(group_id) => group_conversation_id(group_id),
            None => single_conversation_id(&self.send_id, &self.recv_id),
        }
    }

    pub fn into_message(self) -> ChatMessage {
        let conversation_id = self.conversation_id();
        ChatMessage {
            conversation_id,
            client_msg_id: self.client_msg_id,
            server_msg_id: Some(self.server_msg_id).filter(|id| !id.is_empty()),
            send_id: self.send_id,
            seq: (self.seq > 0).then_some(self.seq),
            local_seq: self.seq,
            content: self.content,
            send_time: self.send_time,
            status: MessageStatus::Sent,
        }
    }
}

/// 服务器对发送消息的确认
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageAck {
    #[serde(rename = "serverMsgID")]
    pub server_msg_id: String,
    pub seq: u64,
    pub send_time: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_group_message_event() {
        let json = r#"{
            "clientMsgID": "c1",
            "serverMsgID": "s1",
            "sendID": "bob",
            "groupID": "g1",
            "seq": 7,
            "content": {"contentType": "text", "content": "hi"},
            "sendTime": 100
        }"#;
        let ev: MessageEvent = serde_json::from_str(json).unwrap();
        assert_eq!(ev.conversation_id(), "sg_g1");
        let msg = ev.into_message();
        assert_eq!(msg.seq, Some(7));
        assert_eq!(msg.server_msg_id.as_deref(), Some("s1"));
        assert_eq!(msg.content.summary(), "hi");
    }

    #[test]
    fn single_chat_id_is_order_independent() {
        let ev = MessageEvent {
            client_msg_id: "c1".to_string(),
            server_msg_id: String::new(),
            send_id: "zoe".to_string(),
            recv_id: "adam".to_string(),
            group_id: None,
            seq: 1,
            content: MessageContent::text("x"),
            send_time: 1,
        };
        assert_eq!(ev.conversation_id(), "si_adam_zoe");
        assert_eq!(ev.into_message().server_msg_id, None);
    }
}
