//! 会话监听器回调接口

use async_trait::async_trait;

#[async_trait]
pub trait ConversationListener: Send + Sync {
    /// 会话变更（窗口状态、未读数、布局位置、最新消息），参数为通知 JSON
    async fn on_conversation_changed(&self, conversation: String);

    /// 总未读消息数变更
    async fn on_total_unread_message_count_changed(&self, total_unread_count: i32);
}

/// 空实现（默认监听器）
pub struct EmptyConversationListener;

#[async_trait]
impl ConversationListener for EmptyConversationListener {
    async fn on_conversation_changed(&self, _conversation: String) {}
    async fn on_total_unread_message_count_changed(&self, _total_unread_count: i32) {}
}
