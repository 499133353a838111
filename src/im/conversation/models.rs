//! 会话本地模型定义

use crate::im::message::models::ChatMessage;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// 单聊会话 ID：`si_<较小ID>_<较大ID>`
pub fn single_conversation_id(a: &str, b: &str) -> String {
    if a <= b {
        format!("si_{}_{}", a, b)
    } else {
        format!("si_{}_{}", b, a)
    }
}

/// 群聊会话 ID：`sg_<群ID>`
pub fn group_conversation_id(group_id: &str) -> String {
    format!("sg_{}", group_id)
}

/// 会话对象：对端用户或群
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationTarget {
    Peer(String),
    Group(String),
}

impl ConversationTarget {
    pub fn conversation_id(&self, local_user_id: &str) -> String {
        match self {
            ConversationTarget::Peer(peer) => single_conversation_id(local_user_id, peer),
            ConversationTarget::Group(group_id) => group_conversation_id(group_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowState {
    Open,
    Minimized,
    Closed,
}

/// 聊天窗口的布局位置（UI 提示）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutPosition {
    /// 窗口已关闭，不占位置
    Unassigned,
    Slot(usize),
    /// 窗口仍然打开，但可见槽位已被更近交互的会话占用
    Overflow,
}

/// 已应用过的 seq 集合
///
/// 会话内 seq 从 1 开始连续分配。`1..=floor` 连续区间只记一个上界，
/// 区间之上的零散 seq 放在 `above` 中；补齐空洞后自动并入区间，
/// 长时间运行的会话不会无限增长。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeenSeqs {
    floor: u64,
    above: BTreeSet<u64>,
}

impl SeenSeqs {
    /// 记录一个 seq；已见过返回 false
    pub fn insert(&mut self, seq: u64) -> bool {
        if self.contains(seq) {
            return false;
        }
        self.above.insert(seq);
        while self.above.remove(&(self.floor + 1)) {
            self.floor += 1;
        }
        true
    }

    pub fn contains(&self, seq: u64) -> bool {
        (seq != 0 && seq <= self.floor) || self.above.contains(&seq)
    }

    pub fn highest(&self) -> Option<u64> {
        // above 中的 seq 总是大于 floor
        self.above
            .last()
            .copied()
            .or((self.floor > 0).then_some(self.floor))
    }

    /// 连续区间之上仍单独保存的 seq 数量
    pub fn sparse_len(&self) -> usize {
        self.above.len()
    }
}

/// 会话记录
///
/// 已确认消息按 seq 存放在 `confirmed` 中，`seen` 记录所有已应用过的 seq
/// （关闭窗口时正文会被清出内存，但 seq 仍保留，用于去重）。
/// 本地发送且尚未确认的消息放在 `provisional`，排在已确认消息之后。
#[derive(Debug, Clone)]
pub struct Conversation {
    pub conversation_id: String,
    pub target: ConversationTarget,
    pub window_state: WindowState,
    pub unread_count: u32,
    pub layout_position: LayoutPosition,
    pub last_interaction_at: i64,
    pub(crate) confirmed: BTreeMap<u64, ChatMessage>,
    pub(crate) provisional: Vec<ChatMessage>,
    pub(crate) seen: SeenSeqs,
    pub(crate) history_loaded: bool,
    /// 历史拉取请求已发出、尚未返回
    pub(crate) history_pending: bool,
    pub(crate) next_local_seq: u64,
}

impl Conversation {
    pub fn new(conversation_id: String, target: ConversationTarget, window_state: WindowState, now: i64) -> Self {
        Self {
            conversation_id,
            target,
            window_state,
            unread_count: 0,
            layout_position: LayoutPosition::Unassigned,
            last_interaction_at: now,
            confirmed: BTreeMap::new(),
            provisional: Vec::new(),
            seen: SeenSeqs::default(),
            history_loaded: false,
            history_pending: false,
            next_local_seq: 0,
        }
    }

    /// 窗口是否存在（open 或 minimized）
    pub fn has_window(&self) -> bool {
        self.window_state != WindowState::Closed
    }

    /// 展示顺序：已确认消息按 seq 升序，随后是临时消息
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.confirmed
            .values()
            .chain(self.provisional.iter())
            .cloned()
            .collect()
    }

    pub fn highest_seq(&self) -> Option<u64> {
        self.seen.highest()
    }

    pub fn lowest_loaded_seq(&self) -> Option<u64> {
        self.confirmed.keys().next().copied()
    }

    pub fn find_provisional_mut(&mut self, client_msg_id: &str) -> Option<&mut ChatMessage> {
        self.provisional
            .iter_mut()
            .find(|m| m.client_msg_id == client_msg_id)
    }

    pub fn take_provisional(&mut self, client_msg_id: &str) -> Option<ChatMessage> {
        let pos = self
            .provisional
            .iter()
            .position(|m| m.client_msg_id == client_msg_id)?;
        Some(self.provisional.remove(pos))
    }

    /// 临时序号总是排在已知最大 seq 之后
    pub(crate) fn allocate_local_seq(&mut self) -> u64 {
        let floor = self.highest_seq().unwrap_or(0);
        self.next_local_seq = self.next_local_seq.max(floor) + 1;
        self.next_local_seq
    }

    pub fn view(&self) -> ConversationView {
        ConversationView {
            conversation_id: self.conversation_id.clone(),
            target: self.target.clone(),
            window_state: self.window_state,
            unread_count: self.unread_count,
            layout_position: self.layout_position,
            last_interaction_at: self.last_interaction_at,
            message_count: self.confirmed.len() + self.provisional.len(),
            latest_message: self
                .provisional
                .last()
                .or_else(|| self.confirmed.values().next_back())
                .cloned(),
        }
    }
}

/// 推送给观察者的会话视图
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    #[serde(rename = "conversationID")]
    pub conversation_id: String,
    pub target: ConversationTarget,
    pub window_state: WindowState,
    pub unread_count: u32,
    pub layout_position: LayoutPosition,
    pub last_interaction_at: i64,
    pub message_count: usize,
    pub latest_message: Option<ChatMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_ids() {
        assert_eq!(single_conversation_id("bob", "alice"), "si_alice_bob");
        assert_eq!(
            ConversationTarget::Peer("alice".into()).conversation_id("bob"),
            "si_alice_bob"
        );
        assert_eq!(
            ConversationTarget::Group("g1".into()).conversation_id("bob"),
            "sg_g1"
        );
    }

    #[test]
    fn seen_seqs_compact_into_contiguous_floor() {
        let mut seen = SeenSeqs::default();
        assert_eq!(seen.highest(), None);
        for seq in [3, 1, 5] {
            assert!(seen.insert(seq));
        }
        assert_eq!(seen.sparse_len(), 2);
        assert!(!seen.insert(1));
        assert!(!seen.insert(3));
        assert!(!seen.contains(2));

        assert!(seen.insert(2));
        assert!(seen.insert(4));
        assert_eq!(seen.sparse_len(), 0);
        assert!(seen.contains(5));
        assert!(!seen.insert(5));
        assert_eq!(seen.highest(), Some(5));
    }

    #[test]
    fn layout_position_serializes_as_hint() {
        let v = serde_json::to_value(LayoutPosition::Slot(2)).unwrap();
        assert_eq!(v, serde_json::json!({"slot": 2}));
        let v = serde_json::to_value(LayoutPosition::Overflow).unwrap();
        assert_eq!(v, serde_json::json!("overflow"));
    }
}
