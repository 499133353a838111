//! 消息监听器回调接口

use async_trait::async_trait;

#[async_trait]
pub trait AdvancedMsgListener: Send + Sync {
    /// 收到新消息，参数为通知 JSON（newState 为消息本身）
    async fn on_recv_new_message(&self, message: String);

    /// 本地发送的消息状态变化（sending → sent / failed）
    async fn on_message_status_changed(&self, message: String);
}

/// 空的消息监听器实现
pub struct EmptyAdvancedMsgListener;

#[async_trait]
impl AdvancedMsgListener for EmptyAdvancedMsgListener {
    async fn on_recv_new_message(&self, _message: String) {}
    async fn on_message_status_changed(&self, _message: String) {}
}
