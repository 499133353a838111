//! 会话窗口与消息流管理
//!
//! 同时管理任意多个会话，每个会话独立接收消息：
//! - 按 seq 去重并保持升序，乱序到达的较小 seq 插入到正确位置
//! - 窗口状态 open / minimized / closed 决定消息是否落地、未读数是否增加
//! - 本地发送先写入临时消息，确认后换成服务器 seq，失败则标记 failed 保留正文
//! - 可见槽位按最近交互时间分配（见 [`assign_slots`]）

use crate::im::conversation::layout::assign_slots;
use crate::im::conversation::models::{
    Conversation, ConversationTarget, ConversationView, LayoutPosition, WindowState,
};
use crate::im::error::{SessionError, SessionResult};
use crate::im::message::models::{ChatMessage, MessageStatus};
use crate::im::message::types::{MessageAck, MessageContent};
use crate::im::serialization::generate_msg_id;
use crate::im::types::{EntityType, Notification};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// 需要向历史存储拉取的一页消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRequest {
    pub conversation_id: String,
    /// None 表示最新一页
    pub before_seq: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct OpenedConversation {
    pub conversation_id: String,
    /// 是否新建了会话记录
    pub created: bool,
    pub history_request: Option<HistoryRequest>,
    pub notifications: Vec<Notification>,
}

/// 需要发往服务器的消息
#[derive(Debug, Clone)]
pub struct OutgoingSend {
    pub target: ConversationTarget,
    pub message: ChatMessage,
    pub notifications: Vec<Notification>,
}

/// 关闭会话或登出时被取消的发送
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    /// 被取消的 clientMsgID，对应的出站请求需要中止
    pub cancelled: Vec<String>,
    pub notifications: Vec<Notification>,
}

pub struct ConversationSessionManager {
    local_user_id: String,
    visible_slots: usize,
    conversations: HashMap<String, Conversation>,
}

impl ConversationSessionManager {
    pub fn new(local_user_id: impl Into<String>, visible_slots: usize) -> Self {
        Self {
            local_user_id: local_user_id.into(),
            visible_slots,
            conversations: HashMap::new(),
        }
    }

    pub fn local_user_id(&self) -> &str {
        &self.local_user_id
    }

    /// 打开会话
    ///
    /// 已有窗口时复用（不重复创建，不清未读）；从关闭状态重新打开时清零未读。
    /// 历史尚未成功加载且没有进行中的拉取时返回拉取请求（上次拉取失败后可借此重试）。
    pub fn open_conversation(&mut self, target: ConversationTarget, now: i64) -> OpenedConversation {
        let id = target.conversation_id(&self.local_user_id);
        let (created, history_request) = match self.conversations.get_mut(&id) {
            Some(conv) if conv.has_window() => {
                debug!("[Conv] 会话 {} 已打开，复用现有窗口", id);
                conv.window_state = WindowState::Open;
                conv.last_interaction_at = now;
                (false, Self::request_history(conv))
            }
            Some(conv) => {
                info!(
                    "[Conv] 重新打开会话 {} (未读 {} 清零)",
                    id, conv.unread_count
                );
                conv.window_state = WindowState::Open;
                conv.unread_count = 0;
                conv.last_interaction_at = now;
                (false, Self::request_history(conv))
            }
            None => {
                info!("[Conv] 新建会话 {}", id);
                let conv = self
                    .conversations
                    .entry(id.clone())
                    .or_insert_with(|| Conversation::new(id.clone(), target, WindowState::Open, now));
                (true, Self::request_history(conv))
            }
        };
        OpenedConversation {
            notifications: self.finish(&id),
            conversation_id: id,
            created,
            history_request,
        }
    }

    /// 关闭会话：清出消息正文，取消进行中的发送（标记为 failed）
    pub fn close_conversation(&mut self, conversation_id: &str) -> SessionResult<Cancellation> {
        let conv = self.conversation_mut(conversation_id)?;
        if conv.window_state == WindowState::Closed {
            return Ok(Cancellation::default());
        }
        conv.window_state = WindowState::Closed;
        conv.confirmed.clear();
        conv.history_loaded = false;
        conv.history_pending = false;

        let mut cancellation = Cancellation::default();
        for message in conv
            .provisional
            .iter_mut()
            .filter(|m| m.status == MessageStatus::Sending)
        {
            message.status = MessageStatus::Failed;
            cancellation.cancelled.push(message.client_msg_id.clone());
            cancellation.notifications.push(Notification::action_failed(
                EntityType::Message,
                message.client_msg_id.clone(),
                "会话已关闭，发送已取消",
                &*message,
            ));
        }
        info!(
            "[Conv] 关闭会话 {}，取消 {} 条进行中的发送",
            conversation_id,
            cancellation.cancelled.len()
        );
        cancellation.notifications.extend(self.finish(conversation_id));
        Ok(cancellation)
    }

    pub fn minimize(&mut self, conversation_id: &str) -> SessionResult<Vec<Notification>> {
        let conv = self.conversation_mut(conversation_id)?;
        match conv.window_state {
            WindowState::Open => conv.window_state = WindowState::Minimized,
            WindowState::Minimized => return Ok(Vec::new()),
            WindowState::Closed => {
                return Err(SessionError::invalid_transition(
                    conversation_id,
                    WindowState::Closed,
                    "minimize",
                ))
            }
        }
        debug!("[Conv] 最小化会话 {}", conversation_id);
        Ok(self.finish(conversation_id))
    }

    /// 恢复最小化的窗口；不影响消息和未读数
    pub fn restore(&mut self, conversation_id: &str, now: i64) -> SessionResult<Vec<Notification>> {
        let conv = self.conversation_mut(conversation_id)?;
        match conv.window_state {
            WindowState::Minimized => {
                conv.window_state = WindowState::Open;
                conv.last_interaction_at = now;
            }
            WindowState::Open => return Ok(Vec::new()),
            WindowState::Closed => {
                return Err(SessionError::invalid_transition(
                    conversation_id,
                    WindowState::Closed,
                    "restore",
                ))
            }
        }
        debug!("[Conv] 恢复会话 {}", conversation_id);
        Ok(self.finish(conversation_id))
    }

    /// 应用一条服务器消息
    ///
    /// 已见过的 seq 返回 `StaleOrDuplicateMessage`。会话没有窗口时只累计未读、
    /// 不落地正文；最小化时落地并累计未读；前台打开时只落地。
    /// 自己发出的消息（含其他端）不计未读。
    pub fn receive_message(
        &mut self,
        target: ConversationTarget,
        message: ChatMessage,
        now: i64,
    ) -> SessionResult<Vec<Notification>> {
        let seq = message.seq.ok_or_else(|| {
            SessionError::invalid_transition(
                message.client_msg_id.clone(),
                "unsequenced",
                "receive",
            )
        })?;
        let id = message.conversation_id.clone();
        let own = message.send_id == self.local_user_id;
        let conv = self
            .conversations
            .entry(id.clone())
            .or_insert_with(|| Conversation::new(id.clone(), target, WindowState::Closed, now));

        if !conv.seen.insert(seq) {
            debug!("[Conv] 丢弃重复消息 会话={} seq={}", id, seq);
            return Err(SessionError::StaleOrDuplicateMessage {
                conversation_id: id,
                seq,
            });
        }
        if conv.take_provisional(&message.client_msg_id).is_some() {
            debug!(
                "[Conv] 回显消息 {} 确认了本地临时消息 (seq={})",
                message.client_msg_id, seq
            );
        }

        let mut notifications = Vec::new();
        if conv.has_window() {
            conv.confirmed.insert(seq, message.clone());
            notifications.push(Notification::committed(
                EntityType::Message,
                message.client_msg_id.clone(),
                &message,
            ));
        }
        if !own && conv.window_state != WindowState::Open {
            conv.unread_count += 1;
        }
        debug!(
            "[Conv] 收到消息 会话={} seq={} 窗口={:?} 未读={}",
            id, seq, conv.window_state, conv.unread_count
        );
        notifications.extend(self.finish(&id));
        Ok(notifications)
    }

    /// 乐观发送：追加一条 `sending` 状态的临时消息
    pub fn send_message(
        &mut self,
        conversation_id: &str,
        content: MessageContent,
        now: i64,
    ) -> SessionResult<OutgoingSend> {
        let local_user_id = self.local_user_id.clone();
        let conv = self.conversation_mut(conversation_id)?;
        if !conv.has_window() {
            return Err(SessionError::invalid_transition(
                conversation_id,
                WindowState::Closed,
                "send",
            ));
        }
        let message = ChatMessage {
            conversation_id: conversation_id.to_string(),
            client_msg_id: generate_msg_id(&local_user_id),
            server_msg_id: None,
            send_id: local_user_id,
            seq: None,
            local_seq: conv.allocate_local_seq(),
            content,
            send_time: now,
            status: MessageStatus::Sending,
        };
        conv.provisional.push(message.clone());
        conv.last_interaction_at = now;
        let target = conv.target.clone();
        info!(
            "[Conv] 📤 发送消息 {} 到会话 {} (临时序号 {})",
            message.client_msg_id, conversation_id, message.local_seq
        );

        let mut notifications = vec![Notification::committed(
            EntityType::Message,
            message.client_msg_id.clone(),
            &message,
        )];
        notifications.extend(self.finish(conversation_id));
        Ok(OutgoingSend {
            target,
            message,
            notifications,
        })
    }

    /// 发送完成：成功则以服务器 seq 替换临时消息，失败则标记为 failed
    pub fn complete_send(
        &mut self,
        conversation_id: &str,
        client_msg_id: &str,
        result: Result<MessageAck, String>,
    ) -> Vec<Notification> {
        let Some(conv) = self.conversations.get_mut(conversation_id) else {
            debug!("[Conv] 会话 {} 已不存在，忽略发送结果", conversation_id);
            return Vec::new();
        };
        match result {
            Ok(ack) => {
                let Some(mut message) = conv.take_provisional(client_msg_id) else {
                    debug!("[Conv] 消息 {} 已由回显确认", client_msg_id);
                    return Vec::new();
                };
                message.seq = Some(ack.seq);
                message.local_seq = ack.seq;
                message.server_msg_id = Some(ack.server_msg_id);
                message.send_time = ack.send_time;
                message.status = MessageStatus::Sent;
                conv.seen.insert(ack.seq);
                if conv.has_window() {
                    conv.confirmed.insert(ack.seq, message.clone());
                }
                info!("[Conv] ✅ 消息 {} 已确认 seq={}", client_msg_id, ack.seq);
                let mut notifications = vec![Notification::committed(
                    EntityType::Message,
                    client_msg_id,
                    &message,
                )];
                notifications.extend(self.finish(conversation_id));
                notifications
            }
            Err(reason) => {
                let Some(message) = conv.find_provisional_mut(client_msg_id) else {
                    return Vec::new();
                };
                message.status = MessageStatus::Failed;
                warn!("[Conv] ❌ 消息 {} 发送失败: {}", client_msg_id, reason);
                vec![Notification::action_failed(
                    EntityType::Message,
                    client_msg_id,
                    reason,
                    &*message,
                )]
            }
        }
    }

    /// 重试一条 failed 的临时消息
    pub fn retry_message(
        &mut self,
        conversation_id: &str,
        client_msg_id: &str,
        now: i64,
    ) -> SessionResult<OutgoingSend> {
        let conv = self.conversation_mut(conversation_id)?;
        if !conv.has_window() {
            return Err(SessionError::invalid_transition(
                conversation_id,
                WindowState::Closed,
                "retry",
            ));
        }
        let target = conv.target.clone();
        let message = conv
            .find_provisional_mut(client_msg_id)
            .ok_or_else(|| SessionError::MessageNotFound(client_msg_id.to_string()))?;
        if message.status != MessageStatus::Failed {
            return Err(SessionError::invalid_transition(
                client_msg_id,
                message.status,
                "retry",
            ));
        }
        message.status = MessageStatus::Sending;
        message.send_time = now;
        let message = message.clone();
        conv.last_interaction_at = now;
        info!("[Conv] 🔁 重试发送消息 {}", client_msg_id);

        let mut notifications = vec![Notification::committed(
            EntityType::Message,
            client_msg_id,
            &message,
        )];
        notifications.extend(self.finish(conversation_id));
        Ok(OutgoingSend {
            target,
            message,
            notifications,
        })
    }

    /// 合并从历史存储拉取的消息（不计未读）
    pub fn merge_history(&mut self, conversation_id: &str, messages: Vec<ChatMessage>) -> Vec<Notification> {
        let Some(conv) = self.conversations.get_mut(conversation_id) else {
            return Vec::new();
        };
        conv.history_pending = false;
        if !conv.has_window() {
            debug!("[Conv] 会话 {} 已关闭，丢弃拉取到的历史", conversation_id);
            return Vec::new();
        }
        let mut added = 0usize;
        for message in messages {
            let Some(seq) = message.seq else { continue };
            if conv.confirmed.contains_key(&seq) {
                continue;
            }
            conv.seen.insert(seq);
            conv.take_provisional(&message.client_msg_id);
            conv.confirmed.insert(seq, message);
            added += 1;
        }
        conv.history_loaded = true;
        info!("[Conv] 会话 {} 合并历史消息 {} 条", conversation_id, added);
        vec![Notification::committed(
            EntityType::Conversation,
            conversation_id,
            &conv.view(),
        )]
    }

    /// 历史拉取失败：窗口保持打开，下一次 open 会重新请求
    pub fn fail_history(&mut self, conversation_id: &str, reason: &str) -> Vec<Notification> {
        let Some(conv) = self.conversations.get_mut(conversation_id) else {
            return Vec::new();
        };
        conv.history_pending = false;
        if !conv.has_window() {
            return Vec::new();
        }
        warn!("[Conv] 会话 {} 拉取历史失败: {}", conversation_id, reason);
        vec![Notification::action_failed(
            EntityType::Conversation,
            conversation_id,
            reason,
            &conv.view(),
        )]
    }

    /// 加载更早的历史：从当前内存中最小的 seq 往前翻页
    pub fn load_older_history(&self, conversation_id: &str) -> SessionResult<HistoryRequest> {
        let conv = self
            .conversations
            .get(conversation_id)
            .ok_or_else(|| SessionError::ConversationNotFound(conversation_id.to_string()))?;
        if !conv.has_window() {
            return Err(SessionError::invalid_transition(
                conversation_id,
                WindowState::Closed,
                "load_history",
            ));
        }
        Ok(HistoryRequest {
            conversation_id: conversation_id.to_string(),
            before_seq: conv.lowest_loaded_seq(),
        })
    }

    /// 标记已读，未读数清零
    pub fn mark_read(&mut self, conversation_id: &str, now: i64) -> SessionResult<Vec<Notification>> {
        let conv = self.conversation_mut(conversation_id)?;
        conv.unread_count = 0;
        conv.last_interaction_at = now;
        Ok(self.finish(conversation_id))
    }

    /// 登出：取消全部进行中的发送并销毁所有会话
    pub fn logout(&mut self) -> Cancellation {
        let mut cancellation = Cancellation::default();
        for conv in self.conversations.values_mut() {
            for message in conv
                .provisional
                .iter_mut()
                .filter(|m| m.status == MessageStatus::Sending)
            {
                message.status = MessageStatus::Failed;
                cancellation.cancelled.push(message.client_msg_id.clone());
                cancellation.notifications.push(Notification::action_failed(
                    EntityType::Message,
                    message.client_msg_id.clone(),
                    "已登出，发送已取消",
                    &*message,
                ));
            }
        }
        info!(
            "[Conv] 登出，销毁 {} 个会话，取消 {} 条发送",
            self.conversations.len(),
            cancellation.cancelled.len()
        );
        self.conversations.clear();
        cancellation
    }

    /// 需要拉取最新一页历史时返回请求，并标记为拉取中
    fn request_history(conv: &mut Conversation) -> Option<HistoryRequest> {
        if conv.history_loaded || conv.history_pending {
            return None;
        }
        conv.history_pending = true;
        Some(HistoryRequest {
            conversation_id: conv.conversation_id.clone(),
            before_seq: None,
        })
    }

    pub fn conversation(&self, conversation_id: &str) -> Option<&Conversation> {
        self.conversations.get(conversation_id)
    }

    /// 按展示顺序返回消息
    pub fn messages(&self, conversation_id: &str) -> SessionResult<Vec<ChatMessage>> {
        self.conversations
            .get(conversation_id)
            .map(Conversation::messages)
            .ok_or_else(|| SessionError::ConversationNotFound(conversation_id.to_string()))
    }

    /// 所有有窗口的会话，最近交互的在前
    pub fn open_conversations(&self) -> Vec<ConversationView> {
        let mut views: Vec<ConversationView> = self
            .conversations
            .values()
            .filter(|c| c.has_window())
            .map(Conversation::view)
            .collect();
        views.sort_by(|a, b| {
            b.last_interaction_at
                .cmp(&a.last_interaction_at)
                .then_with(|| a.conversation_id.cmp(&b.conversation_id))
        });
        views
    }

    pub fn total_unread_count(&self) -> u32 {
        self.conversations.values().map(|c| c.unread_count).sum()
    }

    fn conversation_mut(&mut self, conversation_id: &str) -> SessionResult<&mut Conversation> {
        self.conversations
            .get_mut(conversation_id)
            .ok_or_else(|| SessionError::ConversationNotFound(conversation_id.to_string()))
    }

    /// 重新分配槽位；返回位置发生变化的会话 ID
    fn relayout(&mut self) -> Vec<String> {
        let layout = assign_slots(
            self.conversations
                .values()
                .filter(|c| c.has_window())
                .map(|c| (c.conversation_id.as_str(), c.last_interaction_at)),
            self.visible_slots,
        );
        let mut changed: Vec<String> = self
            .conversations
            .values_mut()
            .filter_map(|conv| {
                let position = layout
                    .get(&conv.conversation_id)
                    .copied()
                    .unwrap_or(LayoutPosition::Unassigned);
                if conv.layout_position == position {
                    return None;
                }
                conv.layout_position = position;
                Some(conv.conversation_id.clone())
            })
            .collect();
        changed.sort();
        changed
    }

    /// 目标会话的通知在前，随后是被挤动位置的其他会话
    fn finish(&mut self, conversation_id: &str) -> Vec<Notification> {
        let displaced = self.relayout();
        std::iter::once(conversation_id)
            .chain(
                displaced
                    .iter()
                    .map(String::as_str)
                    .filter(|id| *id != conversation_id),
            )
            .filter_map(|id| self.conversations.get(id))
            .map(|conv| {
                Notification::committed(
                    EntityType::Conversation,
                    conv.conversation_id.clone(),
                    &conv.view(),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::im::message::types::MessageContent;

    const ME: &str = "alice";

    fn bob() -> ConversationTarget {
        ConversationTarget::Peer("bob".to_string())
    }

    fn incoming(conversation: &str, seq: u64, from: &str) -> ChatMessage {
        ChatMessage {
            conversation_id: conversation.to_string(),
            client_msg_id: format!("c-{}-{}", conversation, seq),
            server_msg_id: Some(format!("s{}", seq)),
            send_id: from.to_string(),
            seq: Some(seq),
            local_seq: seq,
            content: MessageContent::text(format!("msg {}", seq)),
            send_time: seq as i64,
            status: MessageStatus::Sent,
        }
    }

    fn seqs(m: &ConversationSessionManager, id: &str) -> Vec<Option<u64>> {
        m.messages(id).unwrap().iter().map(|m| m.seq).collect()
    }

    #[test]
    fn out_of_order_delivery_is_stored_in_sequence() {
        let mut m = ConversationSessionManager::new(ME, 3);
        let id = m.open_conversation(bob(), 1).conversation_id;
        for seq in [3, 1, 2] {
            m.receive_message(bob(), incoming(&id, seq, "bob"), 2).unwrap();
        }
        assert_eq!(seqs(&m, &id), vec![Some(1), Some(2), Some(3)]);

        let err = m.receive_message(bob(), incoming(&id, 2, "bob"), 3).unwrap_err();
        assert!(matches!(err, SessionError::StaleOrDuplicateMessage { seq: 2, .. }));
        assert_eq!(seqs(&m, &id).len(), 3);
    }

    #[test]
    fn failed_history_fetch_can_be_retried_by_reopening() {
        let mut m = ConversationSessionManager::new(ME, 3);
        let opened = m.open_conversation(bob(), 1);
        let id = opened.conversation_id.clone();
        assert!(opened.history_request.is_some());
        // 拉取进行中，不重复请求
        assert!(m.open_conversation(bob(), 2).history_request.is_none());

        let n = m.fail_history(&id, "history store unavailable");
        assert_eq!(n.len(), 1);
        assert!(n[0].is_failure());
        assert_eq!(n[0].entity_type, EntityType::Conversation);
        assert_eq!(m.conversation(&id).unwrap().window_state, WindowState::Open);

        let retry = m.open_conversation(bob(), 3);
        assert_eq!(
            retry.history_request,
            Some(HistoryRequest {
                conversation_id: id.clone(),
                before_seq: None
            })
        );
        m.merge_history(&id, vec![incoming(&id, 1, "bob")]);
        assert!(m.open_conversation(bob(), 4).history_request.is_none());
        assert_eq!(seqs(&m, &id), vec![Some(1)]);
    }

    #[test]
    fn reopening_open_conversation_keeps_single_record() {
        let mut m = ConversationSessionManager::new(ME, 3);
        let first = m.open_conversation(bob(), 1);
        assert!(first.created);
        m.minimize(&first.conversation_id).unwrap();
        m.receive_message(bob(), incoming(&first.conversation_id, 1, "bob"), 2).unwrap();

        let second = m.open_conversation(bob(), 3);
        assert!(!second.created);
        assert!(second.history_request.is_none());
        assert_eq!(second.conversation_id, first.conversation_id);
        assert_eq!(m.open_conversations().len(), 1);
        assert_eq!(m.conversation(&first.conversation_id).unwrap().unread_count, 1);
    }

    #[test]
    fn closed_conversation_counts_unread_without_window() {
        let mut m = ConversationSessionManager::new(ME, 3);
        let id = ConversationTarget::Group("g1".into()).conversation_id(ME);
        m.receive_message(ConversationTarget::Group("g1".into()), incoming(&id, 1, "bob"), 1)
            .unwrap();
        m.receive_message(ConversationTarget::Group("g1".into()), incoming(&id, 2, "carol"), 2)
            .unwrap();

        let conv = m.conversation(&id).unwrap();
        assert_eq!(conv.window_state, WindowState::Closed);
        assert_eq!(conv.unread_count, 2);
        assert!(m.messages(&id).unwrap().is_empty());
        assert!(m.open_conversations().is_empty());
        assert_eq!(m.total_unread_count(), 2);

        // 重新打开：未读清零并请求历史
        let opened = m.open_conversation(ConversationTarget::Group("g1".into()), 3);
        assert_eq!(m.conversation(&id).unwrap().unread_count, 0);
        assert_eq!(
            opened.history_request,
            Some(HistoryRequest {
                conversation_id: id.clone(),
                before_seq: None
            })
        );
        m.merge_history(&id, vec![incoming(&id, 1, "bob"), incoming(&id, 2, "carol")]);
        assert_eq!(seqs(&m, &id), vec![Some(1), Some(2)]);
        // 历史中的消息已计入去重集合
        assert!(m.receive_message(ConversationTarget::Group("g1".into()), incoming(&id, 2, "carol"), 4).is_err());
    }

    #[test]
    fn minimized_conversation_stores_and_counts() {
        let mut m = ConversationSessionManager::new(ME, 3);
        let id = m.open_conversation(bob(), 1).conversation_id;
        m.minimize(&id).unwrap();
        m.receive_message(bob(), incoming(&id, 1, "bob"), 2).unwrap();
        assert_eq!(seqs(&m, &id), vec![Some(1)]);
        assert_eq!(m.conversation(&id).unwrap().unread_count, 1);

        m.restore(&id, 3).unwrap();
        assert_eq!(m.conversation(&id).unwrap().unread_count, 1);
        m.receive_message(bob(), incoming(&id, 2, "bob"), 4).unwrap();
        assert_eq!(m.conversation(&id).unwrap().unread_count, 1);
        m.mark_read(&id, 5).unwrap();
        assert_eq!(m.total_unread_count(), 0);
    }

    #[test]
    fn own_messages_do_not_count_as_unread() {
        let mut m = ConversationSessionManager::new(ME, 3);
        let id = bob().conversation_id(ME);
        m.receive_message(bob(), incoming(&id, 1, ME), 1).unwrap();
        assert_eq!(m.total_unread_count(), 0);
    }

    #[test]
    fn failed_send_keeps_body_and_can_retry() {
        let mut m = ConversationSessionManager::new(ME, 3);
        let id = m.open_conversation(bob(), 1).conversation_id;
        let out = m.send_message(&id, MessageContent::text("are you there?"), 2).unwrap();
        let client_id = out.message.client_msg_id.clone();
        assert_eq!(out.message.status, MessageStatus::Sending);

        let n = m.complete_send(&id, &client_id, Err("network down".into()));
        assert!(n[0].is_failure());
        let history = m.messages(&id).unwrap();
        assert_eq!(history[0].status, MessageStatus::Failed);
        assert_eq!(history[0].content.summary(), "are you there?");

        let retry = m.retry_message(&id, &client_id, 3).unwrap();
        assert_eq!(retry.message.status, MessageStatus::Sending);
        // 正在发送的消息不能再次重试
        assert!(m.retry_message(&id, &client_id, 4).is_err());
    }

    #[test]
    fn ack_replaces_provisional_with_server_seq() {
        let mut m = ConversationSessionManager::new(ME, 3);
        let id = m.open_conversation(bob(), 1).conversation_id;
        m.receive_message(bob(), incoming(&id, 1, "bob"), 1).unwrap();
        let out = m.send_message(&id, MessageContent::text("hi"), 2).unwrap();
        assert_eq!(seqs(&m, &id), vec![Some(1), None]);

        let ack = MessageAck {
            server_msg_id: "s2".into(),
            seq: 2,
            send_time: 3,
        };
        m.complete_send(&id, &out.message.client_msg_id, Ok(ack));
        assert_eq!(seqs(&m, &id), vec![Some(1), Some(2)]);

        // 服务器回显同一条消息被视为重复
        let mut echo = incoming(&id, 2, ME);
        echo.client_msg_id = out.message.client_msg_id.clone();
        assert!(m.receive_message(bob(), echo, 4).is_err());
    }

    #[test]
    fn echo_before_ack_reconciles_provisional() {
        let mut m = ConversationSessionManager::new(ME, 3);
        let id = m.open_conversation(bob(), 1).conversation_id;
        let out = m.send_message(&id, MessageContent::text("hi"), 2).unwrap();
        let mut echo = incoming(&id, 5, ME);
        echo.client_msg_id = out.message.client_msg_id.clone();
        m.receive_message(bob(), echo, 3).unwrap();
        assert_eq!(seqs(&m, &id), vec![Some(5)]);

        // 迟到的 ack 不再产生变化
        let ack = MessageAck {
            server_msg_id: "s5".into(),
            seq: 5,
            send_time: 3,
        };
        assert!(m.complete_send(&id, &out.message.client_msg_id, Ok(ack)).is_empty());
    }

    #[test]
    fn closing_cancels_in_flight_sends() {
        let mut m = ConversationSessionManager::new(ME, 3);
        let id = m.open_conversation(bob(), 1).conversation_id;
        let other = m.open_conversation(ConversationTarget::Peer("carol".into()), 1).conversation_id;
        let out = m.send_message(&id, MessageContent::text("bye"), 2).unwrap();
        let kept = m.send_message(&other, MessageContent::text("hey"), 2).unwrap();

        let cancellation = m.close_conversation(&id).unwrap();
        assert_eq!(cancellation.cancelled, vec![out.message.client_msg_id.clone()]);
        assert!(cancellation.notifications[0].is_failure());

        // 关闭后仍保留失败的临时消息
        let history = m.messages(&id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, MessageStatus::Failed);
        assert!(m.send_message(&id, MessageContent::text("x"), 3).is_err());

        // 其他会话不受影响
        assert_eq!(m.messages(&other).unwrap()[0].status, MessageStatus::Sending);
        assert_eq!(m.messages(&other).unwrap()[0].client_msg_id, kept.message.client_msg_id);
    }

    #[test]
    fn logout_fails_pending_and_drops_everything() {
        let mut m = ConversationSessionManager::new(ME, 3);
        let id = m.open_conversation(bob(), 1).conversation_id;
        m.send_message(&id, MessageContent::text("a"), 2).unwrap();
        let cancellation = m.logout();
        assert_eq!(cancellation.cancelled.len(), 1);
        assert_eq!(
            cancellation.notifications[0].new_state["status"],
            serde_json::json!("failed")
        );
        assert!(m.conversation(&id).is_none());
    }

    #[test]
    fn most_recent_interaction_wins_visible_slot() {
        let mut m = ConversationSessionManager::new(ME, 2);
        let a = m.open_conversation(ConversationTarget::Peer("a".into()), 10).conversation_id;
        let b = m.open_conversation(ConversationTarget::Peer("b".into()), 20).conversation_id;
        let c = m.open_conversation(ConversationTarget::Peer("c".into()), 30);

        let pos = |m: &ConversationSessionManager, id: &str| m.conversation(id).unwrap().layout_position;
        assert_eq!(pos(&m, &c.conversation_id), LayoutPosition::Slot(0));
        assert_eq!(pos(&m, &b), LayoutPosition::Slot(1));
        assert_eq!(pos(&m, &a), LayoutPosition::Overflow);
        assert_eq!(m.conversation(&a).unwrap().window_state, WindowState::Open);
        // 被挤出的会话也收到通知
        assert!(c.notifications.iter().any(|n| n.entity_id == a));

        m.mark_read(&a, 40).unwrap();
        assert_eq!(pos(&m, &a), LayoutPosition::Slot(0));
        assert_eq!(pos(&m, &b), LayoutPosition::Overflow);

        m.close_conversation(&a).unwrap();
        assert_eq!(pos(&m, &a), LayoutPosition::Unassigned);
        assert_eq!(pos(&m, &b), LayoutPosition::Slot(1));
    }

    #[test]
    fn window_transitions_on_closed_conversation_are_rejected() {
        let mut m = ConversationSessionManager::new(ME, 3);
        let id = m.open_conversation(bob(), 1).conversation_id;
        m.close_conversation(&id).unwrap();
        assert!(matches!(m.minimize(&id), Err(SessionError::InvalidTransition { .. })));
        assert!(matches!(m.restore(&id, 2), Err(SessionError::InvalidTransition { .. })));
        assert!(matches!(
            m.minimize("si_nobody_zed"),
            Err(SessionError::ConversationNotFound(_))
        ));
    }

    #[test]
    fn older_history_pages_from_lowest_loaded_seq() {
        let mut m = ConversationSessionManager::new(ME, 3);
        let id = m.open_conversation(bob(), 1).conversation_id;
        m.merge_history(&id, vec![incoming(&id, 40, "bob"), incoming(&id, 41, "bob")]);
        assert_eq!(m.load_older_history(&id).unwrap().before_seq, Some(40));
        m.merge_history(&id, vec![incoming(&id, 39, "bob")]);
        assert_eq!(seqs(&m, &id), vec![Some(39), Some(40), Some(41)]);
    }
}
