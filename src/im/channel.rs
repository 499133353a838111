//! 入站事件通道
//!
//! 事件记录为 `{topic, entityID, payload, receivedAt}`，同一 topic 内按序、至少一次投递。
//! 文本帧为 JSON，二进制帧为 gzip 压缩的 JSON。

use crate::im::client::ClientConfig;
use crate::im::serialization::unwrap_frame;
use crate::im::types::now_millis;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

/// WebSocket 写入端类型别名
pub type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

/// WebSocket 读取端类型别名
pub type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Relationship,
    Invitation,
    Message,
}

/// 入站事件记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEvent {
    pub topic: Topic,
    #[serde(rename = "entityID")]
    pub entity_id: String,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub received_at: i64,
}

impl InboundEvent {
    pub fn new<P: Serialize>(topic: Topic, entity_id: impl Into<String>, payload: &P) -> Self {
        Self {
            topic,
            entity_id: entity_id.into(),
            payload: serde_json::to_value(payload).unwrap_or_default(),
            received_at: now_millis(),
        }
    }
}

/// 解码一帧（必要时先解压）；缺少 receivedAt 时以本地时间补齐
pub fn decode_frame(data: Vec<u8>) -> Result<InboundEvent> {
    let raw = unwrap_frame(data).context("解压事件帧失败")?;
    let mut event: InboundEvent = serde_json::from_slice(&raw).with_context(|| {
        format!("解析事件帧失败: {}", String::from_utf8_lossy(&raw))
    })?;
    if event.received_at == 0 {
        event.received_at = now_millis();
    }
    Ok(event)
}

/// 事件来源
#[async_trait]
pub trait EventChannel: Send {
    /// 下一个事件；通道结束时返回 None
    async fn next_event(&mut self) -> Option<InboundEvent>;
}

/// 基于 WebSocket 的事件通道
pub struct WsEventChannel {
    reader: WsReader,
    heartbeat: JoinHandle<()>,
}

impl WsEventChannel {
    /// 构建 WebSocket 连接 URL
    pub fn build_url(config: &ClientConfig, operation_id: &str) -> String {
        let compression_param = if config.compression.is_empty() {
            String::new()
        } else {
            format!("&compression={}", config.compression)
        };
        format!(
            "{}/?token={}&sendID={}&platformID={}&operationID={}{}&sdkType={}",
            config.ws_url,
            config.token,
            config.user_id,
            config.platform_id,
            operation_id,
            compression_param,
            config.sdk_type
        )
    }

    /// 连接服务器并启动心跳
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let operation_id = format!("{}", now_millis());
        let url = Self::build_url(config, &operation_id);
        info!(
            "[Channel] 🔗 连接事件通道 (user={}, platform={})",
            config.user_id, config.platform_id
        );

        let (ws_stream, response) = connect_async(&url)
            .await
            .context("WebSocket 连接失败")?;
        info!(
            "[Channel] ✅ WebSocket 连接成功, 状态: {}",
            response.status()
        );

        let (mut writer, reader) = ws_stream.split();
        let period = Duration::from_secs(config.heartbeat_interval_secs.max(1));
        let heartbeat = tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                ticker.tick().await;
                if writer.send(WsMessage::Ping(vec![])).await.is_err() {
                    debug!("[Channel] 心跳发送失败，停止心跳");
                    break;
                }
            }
        });

        Ok(Self { reader, heartbeat })
    }
}

impl Drop for WsEventChannel {
    fn drop(&mut self) {
        self.heartbeat.abort();
    }
}

#[async_trait]
impl EventChannel for WsEventChannel {
    async fn next_event(&mut self) -> Option<InboundEvent> {
        while let Some(msg_result) = self.reader.next().await {
            let frame = match msg_result {
                Ok(WsMessage::Text(text)) => text.into_bytes(),
                Ok(WsMessage::Binary(data)) => data,
                Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => continue,
                Ok(WsMessage::Close(frame)) => {
                    warn!("[Channel] 👋 连接关闭: {:?}", frame);
                    return None;
                }
                Ok(_) => continue,
                Err(e) => {
                    error!("[Channel] WebSocket 错误: {}", e);
                    return None;
                }
            };
            match decode_frame(frame) {
                Ok(event) => return Some(event),
                Err(e) => warn!("[Channel] 丢弃无法解析的事件帧: {:#}", e),
            }
        }
        None
    }
}

/// 内存事件通道（测试或进程内事件源）
pub struct MemoryEventChannel {
    rx: mpsc::Receiver<InboundEvent>,
}

impl MemoryEventChannel {
    pub fn new(capacity: usize) -> (mpsc::Sender<InboundEvent>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx })
    }
}

#[async_trait]
impl EventChannel for MemoryEventChannel {
    async fn next_event(&mut self) -> Option<InboundEvent> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    const FRAME: &str = r#"{"topic":"relationship","entityID":"alice_bob","payload":{"x":1},"receivedAt":42}"#;

    #[test]
    fn decode_text_frame() {
        let event = decode_frame(FRAME.as_bytes().to_vec()).unwrap();
        assert_eq!(event.topic, Topic::Relationship);
        assert_eq!(event.entity_id, "alice_bob");
        assert_eq!(event.received_at, 42);
    }

    #[test]
    fn decode_gzip_frame() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(FRAME.as_bytes()).unwrap();
        let event = decode_frame(encoder.finish().unwrap()).unwrap();
        assert_eq!(event.payload["x"], 1);
    }

    #[test]
    fn missing_receive_time_is_filled() {
        let frame = r#"{"topic":"message","entityID":"si_a_b","payload":null}"#;
        let event = decode_frame(frame.as_bytes().to_vec()).unwrap();
        assert!(event.received_at > 0);
        assert!(decode_frame(b"not json".to_vec()).is_err());
    }

    #[test]
    fn ws_url_carries_identity() {
        let config = ClientConfig::new("alice".into(), "tk".into(), 5);
        let url = WsEventChannel::build_url(&config, "op1");
        assert!(url.contains("sendID=alice"));
        assert!(url.contains("token=tk"));
        assert!(url.contains("compression=gzip"));
    }

    #[tokio::test]
    async fn memory_channel_ends_when_sender_dropped() {
        let (tx, mut channel) = MemoryEventChannel::new(4);
        tx.send(InboundEvent::new(Topic::Message, "si_a_b", &serde_json::json!({})))
            .await
            .unwrap();
        drop(tx);
        assert!(channel.next_event().await.is_some());
        assert!(channel.next_event().await.is_none());
    }
}
