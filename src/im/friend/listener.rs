//! 好友监听器回调接口

use async_trait::async_trait;

/// 好友关系监听器
#[async_trait]
pub trait FriendListener: Send + Sync {
    /// 关系边状态变更（本地乐观更新、服务器确认、失败回滚），参数为通知 JSON
    async fn on_relationship_changed(&self, notification_json: String);

    /// 本地乐观状态被服务器权威状态覆盖，参数为通知 JSON
    async fn on_relationship_reconciled(&self, notification_json: String);
}

/// 默认空实现（无操作）
pub struct EmptyFriendListener;

#[async_trait]
impl FriendListener for EmptyFriendListener {
    async fn on_relationship_changed(&self, _notification_json: String) {}

    async fn on_relationship_reconciled(&self, _notification_json: String) {}
}
