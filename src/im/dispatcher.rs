//! 事件分发器
//!
//! 持有三个状态管理器，是会话状态的唯一写入方：
//! - 入站事件按 topic 路由到对应管理器，去重交给各管理器的身份键
//! - 出站动作的完成结果同样回到这里应用
//! - 每次成功应用后向订阅者和监听器推送通知

use crate::im::channel::{InboundEvent, Topic};
use crate::im::conversation::listener::{ConversationListener, EmptyConversationListener};
use crate::im::conversation::models::ConversationTarget;
use crate::im::conversation::service::ConversationSessionManager;
use crate::im::error::{SessionError, SessionResult};
use crate::im::friend::listener::{EmptyFriendListener, FriendListener};
use crate::im::friend::models::PairKey;
use crate::im::friend::service::RelationshipGraph;
use crate::im::friend::types::RelationshipEvent;
use crate::im::group::listener::{EmptyGroupListener, GroupListener};
use crate::im::group::service::GroupMembershipManager;
use crate::im::group::types::GroupEvent;
use crate::im::message::listener::{AdvancedMsgListener, EmptyAdvancedMsgListener};
use crate::im::message::models::ChatMessage;
use crate::im::message::types::{MessageAck, MessageEvent};
use crate::im::types::{ApplyOutcome, EntityType, Notification};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// 各领域的监听器（回调参数为通知 JSON）
#[derive(Clone)]
pub struct SessionListeners {
    pub friend: Arc<dyn FriendListener>,
    pub group: Arc<dyn GroupListener>,
    pub conversation: Arc<dyn ConversationListener>,
    pub message: Arc<dyn AdvancedMsgListener>,
}

impl Default for SessionListeners {
    fn default() -> Self {
        Self {
            friend: Arc::new(EmptyFriendListener),
            group: Arc::new(EmptyGroupListener),
            conversation: Arc::new(EmptyConversationListener),
            message: Arc::new(EmptyAdvancedMsgListener),
        }
    }
}

/// 分发计数
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchStats {
    pub relationship_events: u64,
    pub invitation_events: u64,
    pub message_events: u64,
    /// payload 无法解析的事件
    pub decode_failures: u64,
    /// 解析成功但无法应用的事件（例如缺少 seq 的消息）
    pub rejected: u64,
    /// 重复或过期投递（已静默丢弃）
    pub duplicates_discarded: u64,
    /// 本地乐观状态被服务器覆盖的次数
    pub reconciliations: u64,
    pub action_failures: u64,
    pub notifications_published: u64,
}

/// 单个事件的分发结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Applied { notifications: usize },
    Duplicate,
    /// payload 解析失败或事件不合法
    Rejected(String),
}

/// 出站动作的完成事件，回到同一个串行队列中应用
#[derive(Debug, Clone)]
pub enum Completion {
    Relation {
        op_id: u64,
        pair: PairKey,
        result: Result<(), String>,
    },
    Group {
        op_id: u64,
        result: Result<(), String>,
    },
    Send {
        conversation_id: String,
        client_msg_id: String,
        result: Result<MessageAck, String>,
    },
    History {
        conversation_id: String,
        result: Result<Vec<ChatMessage>, String>,
    },
}

pub struct SessionDispatcher {
    local_user_id: String,
    relationships: RelationshipGraph,
    groups: GroupMembershipManager,
    conversations: ConversationSessionManager,
    notifications: broadcast::Sender<Notification>,
    listeners: SessionListeners,
    stats: DispatchStats,
    last_total_unread: u32,
}

impl SessionDispatcher {
    pub fn new(
        local_user_id: impl Into<String>,
        visible_chat_slots: usize,
        notification_buffer: usize,
        listeners: SessionListeners,
    ) -> Self {
        let local_user_id = local_user_id.into();
        let (notifications, _) = broadcast::channel(notification_buffer.max(1));
        Self {
            relationships: RelationshipGraph::new(local_user_id.clone()),
            groups: GroupMembershipManager::new(local_user_id.clone()),
            conversations: ConversationSessionManager::new(local_user_id.clone(), visible_chat_slots),
            local_user_id,
            notifications,
            listeners,
            stats: DispatchStats::default(),
            last_total_unread: 0,
        }
    }

    pub fn local_user_id(&self) -> &str {
        &self.local_user_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    pub fn notification_sender(&self) -> broadcast::Sender<Notification> {
        self.notifications.clone()
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    pub fn relationships(&self) -> &RelationshipGraph {
        &self.relationships
    }

    pub fn relationships_mut(&mut self) -> &mut RelationshipGraph {
        &mut self.relationships
    }

    pub fn groups(&self) -> &GroupMembershipManager {
        &self.groups
    }

    pub fn groups_mut(&mut self) -> &mut GroupMembershipManager {
        &mut self.groups
    }

    pub fn conversations(&self) -> &ConversationSessionManager {
        &self.conversations
    }

    pub fn conversations_mut(&mut self) -> &mut ConversationSessionManager {
        &mut self.conversations
    }

    /// 按 topic 分发一个入站事件
    pub async fn dispatch(&mut self, event: InboundEvent) -> DispatchOutcome {
        debug!(
            "[Dispatch] 📥 {:?} entity={} receivedAt={}",
            event.topic, event.entity_id, event.received_at
        );
        let result = match event.topic {
            Topic::Relationship => {
                self.stats.relationship_events += 1;
                serde_json::from_value::<RelationshipEvent>(event.payload)
                    .map(|ev| self.relationships.apply_remote_event(&ev))
            }
            Topic::Invitation => {
                self.stats.invitation_events += 1;
                serde_json::from_value::<GroupEvent>(event.payload)
                    .map(|ev| self.groups.apply_remote_event(&ev))
            }
            Topic::Message => {
                self.stats.message_events += 1;
                match serde_json::from_value::<MessageEvent>(event.payload) {
                    Ok(ev) => match self.apply_message(ev, event.received_at) {
                        Ok(outcome) => Ok(outcome),
                        Err(e) => {
                            self.stats.rejected += 1;
                            warn!(
                                "[Dispatch] ⚠️ 消息无法应用 entity={}: {}",
                                event.entity_id, e
                            );
                            return DispatchOutcome::Rejected(e.to_string());
                        }
                    },
                    Err(e) => Err(e),
                }
            }
        };

        match result {
            Ok(ApplyOutcome::Applied(notifications)) => {
                let count = notifications.len();
                self.publish(notifications).await;
                DispatchOutcome::Applied {
                    notifications: count,
                }
            }
            Ok(ApplyOutcome::Duplicate) => {
                self.stats.duplicates_discarded += 1;
                debug!(
                    "[Dispatch] 丢弃重复事件 {:?} entity={}",
                    event.topic, event.entity_id
                );
                DispatchOutcome::Duplicate
            }
            Err(e) => {
                self.stats.decode_failures += 1;
                warn!(
                    "[Dispatch] ⚠️ 无法解析 {:?} 事件 entity={}: {}",
                    event.topic, event.entity_id, e
                );
                DispatchOutcome::Rejected(e.to_string())
            }
        }
    }

    fn apply_message(&mut self, event: MessageEvent, received_at: i64) -> SessionResult<ApplyOutcome> {
        let target = match &event.group_id {
            Some(group_id) => ConversationTarget::Group(group_id.clone()),
            None if event.send_id == self.local_user_id => ConversationTarget::Peer(event.recv_id.clone()),
            None => ConversationTarget::Peer(event.send_id.clone()),
        };
        match self
            .conversations
            .receive_message(target, event.into_message(), received_at)
        {
            Ok(notifications) => Ok(ApplyOutcome::Applied(notifications)),
            Err(SessionError::StaleOrDuplicateMessage { .. }) => Ok(ApplyOutcome::Duplicate),
            Err(e) => Err(e),
        }
    }

    /// 应用出站动作的完成结果
    pub async fn complete(&mut self, completion: Completion) {
        let notifications = match completion {
            Completion::Relation {
                op_id,
                pair,
                result,
            } => self
                .relationships
                .complete_action(op_id, &pair, result)
                .into_iter()
                .collect(),
            Completion::Group { op_id, result } => {
                self.groups.complete_action(op_id, result).into_iter().collect()
            }
            Completion::Send {
                conversation_id,
                client_msg_id,
                result,
            } => self
                .conversations
                .complete_send(&conversation_id, &client_msg_id, result),
            Completion::History {
                conversation_id,
                result,
            } => match result {
                Ok(messages) => self.conversations.merge_history(&conversation_id, messages),
                Err(reason) => self.conversations.fail_history(&conversation_id, &reason),
            },
        };
        self.publish(notifications).await;
    }

    /// 推送通知：广播给订阅者，并按实体类型回调监听器
    pub async fn publish(&mut self, notifications: Vec<Notification>) {
        let mut conversation_touched = false;
        for notification in notifications {
            if notification.is_reconciliation() {
                self.stats.reconciliations += 1;
                info!(
                    "[Dispatch] 🔀 {:?} {} 已按服务器状态校正",
                    notification.entity_type, notification.entity_id
                );
            }
            if notification.is_failure() {
                self.stats.action_failures += 1;
            }
            self.stats.notifications_published += 1;

            let json = notification.to_json();
            match notification.entity_type {
                EntityType::Relationship if notification.is_reconciliation() => {
                    self.listeners.friend.on_relationship_reconciled(json).await
                }
                EntityType::Relationship => self.listeners.friend.on_relationship_changed(json).await,
                EntityType::Invitation | EntityType::Membership => {
                    self.listeners.group.on_membership_changed(json).await
                }
                EntityType::Group => self.listeners.group.on_group_info_changed(json).await,
                EntityType::Conversation => {
                    conversation_touched = true;
                    self.listeners.conversation.on_conversation_changed(json).await
                }
                EntityType::Message => {
                    let own = notification.new_state["sendID"] == self.local_user_id.as_str();
                    if own {
                        self.listeners.message.on_message_status_changed(json).await
                    } else {
                        self.listeners.message.on_recv_new_message(json).await
                    }
                }
            }

            // 没有订阅者时 send 返回 Err，忽略即可
            let _ = self.notifications.send(notification);
        }

        if conversation_touched {
            let total = self.conversations.total_unread_count();
            if total != self.last_total_unread {
                self.last_total_unread = total;
                self.listeners
                    .conversation
                    .on_total_unread_message_count_changed(i32::try_from(total).unwrap_or(i32::MAX))
                    .await;
            }
        }
    }
}
