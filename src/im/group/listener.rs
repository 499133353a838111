//! 群组监听器回调接口

use async_trait::async_trait;

#[async_trait]
pub trait GroupListener: Send + Sync {
    /// 邀请 / 成员身份变更，参数为通知 JSON
    async fn on_membership_changed(&self, notification_json: String);

    /// 群资料变更
    async fn on_group_info_changed(&self, _notification_json: String) {}
}

pub struct EmptyGroupListener;

#[async_trait]
impl GroupListener for EmptyGroupListener {
    async fn on_membership_changed(&self, _notification_json: String) {}
}
