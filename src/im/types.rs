use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

/// 当前毫秒时间戳
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// 用户基础信息（只读引用，核心层不持有其生命周期）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(rename = "userID")]
    pub user_id: String,
    #[serde(default)]
    pub nickname: String,
    #[serde(rename = "faceURL", default)]
    pub face_url: String,
}

/// 通知所属的实体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Relationship,
    Invitation,
    Membership,
    Group,
    Conversation,
    Message,
}

/// 通知种类
///
/// - `Committed`：状态转换已提交
/// - `Reconciled`：本地乐观状态被服务器权威状态覆盖，`previous` 为被覆盖的乐观值
/// - `ActionFailed`：出站请求失败，实体回到（或停留在）可重试状态
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationKind {
    Committed,
    Reconciled { previous: serde_json::Value },
    ActionFailed { reason: String },
}

/// 推送给表现层的状态变更通知 `{entityType, entityId, newState}`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub entity_type: EntityType,
    #[serde(rename = "entityID")]
    pub entity_id: String,
    #[serde(flatten)]
    pub kind: NotificationKind,
    pub new_state: serde_json::Value,
}

impl Notification {
    pub fn committed<S: Serialize>(entity_type: EntityType, entity_id: impl Into<String>, state: &S) -> Self {
        Self::with_kind(entity_type, entity_id, NotificationKind::Committed, state)
    }

    pub fn reconciled<S: Serialize, P: Serialize>(
        entity_type: EntityType,
        entity_id: impl Into<String>,
        previous: &P,
        state: &S,
    ) -> Self {
        let previous = serde_json::to_value(previous).unwrap_or_default();
        Self::with_kind(
            entity_type,
            entity_id,
            NotificationKind::Reconciled { previous },
            state,
        )
    }

    pub fn action_failed<S: Serialize>(
        entity_type: EntityType,
        entity_id: impl Into<String>,
        reason: impl Into<String>,
        state: &S,
    ) -> Self {
        Self::with_kind(
            entity_type,
            entity_id,
            NotificationKind::ActionFailed {
                reason: reason.into(),
            },
            state,
        )
    }

    fn with_kind<S: Serialize>(
        entity_type: EntityType,
        entity_id: impl Into<String>,
        kind: NotificationKind,
        state: &S,
    ) -> Self {
        Self {
            entity_type,
            entity_id: entity_id.into(),
            kind,
            new_state: serde_json::to_value(state).unwrap_or_default(),
        }
    }

    pub fn is_reconciliation(&self) -> bool {
        matches!(self.kind, NotificationKind::Reconciled { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.kind, NotificationKind::ActionFailed { .. })
    }

    /// 序列化为 JSON 字符串（供监听器回调使用）
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// 远程事件的应用结果
///
/// 重复投递（at-least-once）由各管理器按自身的身份键识别，返回 `Duplicate`
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    Applied(Vec<Notification>),
    Duplicate,
}

impl ApplyOutcome {
    pub fn notifications(self) -> Vec<Notification> {
        match self {
            ApplyOutcome::Applied(n) => n,
            ApplyOutcome::Duplicate => Vec::new(),
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, ApplyOutcome::Duplicate)
    }
}

/// 统一的 API 响应包装结构体（包含 errCode、errMsg、data）
/// data 字段可能为 null 或缺失，因此使用 Option<T>
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(rename = "errCode")]
    pub err_code: i32,
    #[serde(rename = "errMsg")]
    pub err_msg: String,
    pub data: Option<T>,
}

/// 通用 HTTP 响应处理函数：直接反序列化为统一的响应结构体
/// 返回 `ApiResponse<T>`，调用方可以根据需要处理 `data` 字段（可能为 None）
pub async fn handle_http_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    operation_name: &str,
) -> anyhow::Result<ApiResponse<T>> {
    use anyhow::Context;

    let status = response.status();

    // 读取 body bytes（只能读取一次）
    let body_bytes = response.bytes().await.context("读取响应 body 失败")?;
    let body_str = String::from_utf8_lossy(&body_bytes);
    debug!("[HTTP] {}响应 Body: {}", operation_name, body_str);

    if !status.is_success() {
        error!(
            "[HTTP] {}请求失败，HTTP状态: {}, 响应: {}",
            operation_name, status, body_str
        );
        return Err(anyhow::anyhow!("HTTP 错误 {}: {}", status, body_str));
    }

    let api_resp: ApiResponse<T> = serde_json::from_slice(&body_bytes).map_err(|e| {
        error!(
            "[HTTP] {}反序列化失败: {:?}\n原始响应: {}",
            operation_name, e, body_str
        );
        anyhow::anyhow!("反序列化响应失败: {:?}", e)
    })?;

    if api_resp.err_code != 0 {
        error!(
            "[HTTP] {}服务器错误，错误码: {}, 错误信息: {}",
            operation_name, api_resp.err_code, api_resp.err_msg
        );
        return Err(anyhow::anyhow!(
            "服务器错误 {}: {}",
            api_resp.err_code,
            api_resp.err_msg
        ));
    }

    info!("[HTTP] {}请求成功", operation_name);
    Ok(api_resp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_json_has_flat_kind() {
        let n = Notification::action_failed(
            EntityType::Message,
            "si_a_b",
            "timeout",
            &serde_json::json!({"status": "failed"}),
        );
        let v: serde_json::Value = serde_json::from_str(&n.to_json()).unwrap();
        assert_eq!(v["entityType"], "message");
        assert_eq!(v["entityID"], "si_a_b");
        assert_eq!(v["kind"], "action_failed");
        assert_eq!(v["reason"], "timeout");
        assert_eq!(v["newState"]["status"], "failed");
        assert!(n.is_failure());
    }

    #[test]
    fn api_response_allows_null_data() {
        let resp: ApiResponse<Vec<String>> =
            serde_json::from_str(r#"{"errCode":0,"errMsg":"","data":null}"#).unwrap();
        assert_eq!(resp.err_code, 0);
        assert!(resp.data.is_none());
    }
}
