//! 会话客户端
//!
//! 会话状态由一个 actor 任务独占（单写者）：UI 动作、入站事件、出站请求的完成结果
//! 都以 [`SessionCommand`] 的形式进入同一个队列，按到达顺序逐个处理。
//! 出站请求在独立任务中执行，不阻塞其他事件的处理。

use crate::im::channel::{EventChannel, InboundEvent};
use crate::im::conversation::models::{ConversationTarget, ConversationView};
use crate::im::dispatcher::{Completion, DispatchStats, SessionDispatcher, SessionListeners};
use crate::im::error::{SessionError, SessionResult};
use crate::im::friend::models::{RelationAction, RelationStatus};
use crate::im::group::models::{Invitation, Membership, MembershipStatus};
use crate::im::group::service::{GroupAction, GroupTransition};
use crate::im::conversation::service::HistoryRequest;
use crate::im::message::models::ChatMessage;
use crate::im::message::types::MessageContent;
use crate::im::remote::{HistoryStore, HttpRemoteApi, RemoteApi};
use crate::im::types::{now_millis, Notification};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

/// 客户端配置
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// 用户 ID
    pub user_id: String,
    /// 认证 token
    pub token: String,
    /// 平台 ID
    pub platform_id: i32,
    /// WebSocket 服务器 URL
    pub ws_url: String,
    /// HTTP API 基础地址
    pub api_base_url: String,
    /// 压缩方式，例如 "gzip" 或空字符串表示不压缩
    pub compression: String,
    /// SDK 类型，例如 "js" 或 "go"
    pub sdk_type: String,
    pub heartbeat_interval_secs: u64,
    /// 可见聊天窗口槽位数
    pub visible_chat_slots: usize,
    /// 命令队列容量
    pub command_buffer: usize,
    /// 通知广播缓冲区容量（慢订阅者超出后会丢失旧通知）
    pub notification_buffer: usize,
}

impl ClientConfig {
    /// 创建默认配置
    pub fn new(user_id: String, token: String, platform_id: i32) -> Self {
        Self {
            user_id,
            token,
            platform_id,
            ws_url: "ws://localhost:10001".to_string(),
            api_base_url: "http://localhost:10002".to_string(),
            compression: "gzip".to_string(),
            sdk_type: "js".to_string(),
            heartbeat_interval_secs: 25,
            visible_chat_slots: 3,
            command_buffer: 256,
            notification_buffer: 1024,
        }
    }
}

type Reply<T> = oneshot::Sender<SessionResult<T>>;
type QueryJob = Box<dyn FnOnce(&SessionDispatcher) + Send>;

/// 进入会话 actor 的命令
pub enum SessionCommand {
    Relation {
        peer_user_id: String,
        action: RelationAction,
        reply: Reply<RelationStatus>,
    },
    Invite {
        group_id: String,
        user_id: String,
        reply: Reply<Invitation>,
    },
    RequestToJoin {
        group_id: String,
        reply: Reply<Invitation>,
    },
    RespondToInvitation {
        invitation_id: String,
        accept: bool,
        reply: Reply<MembershipStatus>,
    },
    LeaveGroup {
        group_id: String,
        reply: Reply<()>,
    },
    OpenConversation {
        target: ConversationTarget,
        reply: Reply<ConversationView>,
    },
    CloseConversation {
        conversation_id: String,
        reply: Reply<()>,
    },
    Minimize {
        conversation_id: String,
        reply: Reply<()>,
    },
    Restore {
        conversation_id: String,
        reply: Reply<()>,
    },
    MarkRead {
        conversation_id: String,
        reply: Reply<()>,
    },
    SendMessage {
        conversation_id: String,
        content: MessageContent,
        reply: Reply<ChatMessage>,
    },
    RetryMessage {
        conversation_id: String,
        client_msg_id: String,
        reply: Reply<ChatMessage>,
    },
    LoadOlderHistory {
        conversation_id: String,
        reply: Reply<()>,
    },
    Inbound(InboundEvent),
    Completion(Completion),
    Query(QueryJob),
    Logout {
        reply: oneshot::Sender<()>,
    },
}

/// 会话客户端句柄（可克隆，所有克隆共享同一个 actor）
#[derive(Clone)]
pub struct SessionClient {
    config: ClientConfig,
    commands: mpsc::Sender<SessionCommand>,
    notifications: broadcast::Sender<Notification>,
}

impl SessionClient {
    /// 启动会话 actor
    pub fn spawn(
        config: ClientConfig,
        remote: Arc<dyn RemoteApi>,
        history: Arc<dyn HistoryStore>,
        listeners: SessionListeners,
    ) -> Self {
        let dispatcher = SessionDispatcher::new(
            config.user_id.clone(),
            config.visible_chat_slots,
            config.notification_buffer,
            listeners,
        );
        let notifications = dispatcher.notification_sender();
        let (commands, rx) = mpsc::channel(config.command_buffer.max(1));
        let actor = SessionActor {
            dispatcher,
            remote,
            history,
            completions: commands.downgrade(),
            in_flight: HashMap::new(),
        };
        tokio::spawn(actor.run(rx));
        info!("[Client] 🚀 会话已启动 (user={})", config.user_id);
        Self {
            config,
            commands,
            notifications,
        }
    }

    /// 使用 HTTP 远程 API 启动会话
    pub fn spawn_http(config: ClientConfig, listeners: SessionListeners) -> anyhow::Result<Self> {
        let api = Arc::new(HttpRemoteApi::new(&config)?);
        Ok(Self::spawn(config, api.clone(), api, listeners))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// 把事件通道接入会话：通道中的事件依次进入命令队列
    pub fn attach_channel<C>(&self, mut channel: C) -> JoinHandle<()>
    where
        C: EventChannel + 'static,
    {
        let commands = self.commands.clone();
        tokio::spawn(async move {
            info!("[Client] 📥 开始监听事件通道");
            while let Some(event) = channel.next_event().await {
                if commands.send(SessionCommand::Inbound(event)).await.is_err() {
                    debug!("[Client] 会话已结束，停止监听事件通道");
                    return;
                }
            }
            warn!("[Client] 事件通道已关闭");
        })
    }

    /// 订阅状态变更通知
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    /// 直接投递一个入站事件
    pub async fn dispatch(&self, event: InboundEvent) -> SessionResult<()> {
        self.commands
            .send(SessionCommand::Inbound(event))
            .await
            .map_err(|_| SessionError::SessionClosed)
    }

    async fn call<T>(&self, build: impl FnOnce(Reply<T>) -> SessionCommand) -> SessionResult<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| SessionError::SessionClosed)?;
        rx.await.map_err(|_| SessionError::SessionClosed)?
    }

    async fn relation(&self, peer_user_id: &str, action: RelationAction) -> SessionResult<RelationStatus> {
        let peer_user_id = peer_user_id.to_string();
        self.call(|reply| SessionCommand::Relation {
            peer_user_id,
            action,
            reply,
        })
        .await
    }

    // ---------------------------------------------------------------
    // 好友关系
    // ---------------------------------------------------------------

    pub async fn send_friend_request(&self, to_user_id: &str) -> SessionResult<RelationStatus> {
        self.relation(to_user_id, RelationAction::Request).await
    }

    pub async fn accept_friend_request(&self, from_user_id: &str) -> SessionResult<RelationStatus> {
        self.relation(from_user_id, RelationAction::Accept).await
    }

    pub async fn decline_friend_request(&self, from_user_id: &str) -> SessionResult<RelationStatus> {
        self.relation(from_user_id, RelationAction::Decline).await
    }

    pub async fn block(&self, user_id: &str) -> SessionResult<RelationStatus> {
        self.relation(user_id, RelationAction::Block).await
    }

    pub async fn unblock(&self, user_id: &str) -> SessionResult<RelationStatus> {
        self.relation(user_id, RelationAction::Unblock).await
    }

    pub async fn unfriend(&self, user_id: &str) -> SessionResult<RelationStatus> {
        self.relation(user_id, RelationAction::Unfriend).await
    }

    // ---------------------------------------------------------------
    // 群组
    // ---------------------------------------------------------------

    pub async fn invite_to_group(&self, group_id: &str, user_id: &str) -> SessionResult<Invitation> {
        let (group_id, user_id) = (group_id.to_string(), user_id.to_string());
        self.call(|reply| SessionCommand::Invite {
            group_id,
            user_id,
            reply,
        })
        .await
    }

    pub async fn request_to_join(&self, group_id: &str) -> SessionResult<Invitation> {
        let group_id = group_id.to_string();
        self.call(|reply| SessionCommand::RequestToJoin { group_id, reply })
            .await
    }

    pub async fn respond_to_invitation(
        &self,
        invitation_id: &str,
        accept: bool,
    ) -> SessionResult<MembershipStatus> {
        let invitation_id = invitation_id.to_string();
        self.call(|reply| SessionCommand::RespondToInvitation {
            invitation_id,
            accept,
            reply,
        })
        .await
    }

    pub async fn leave_group(&self, group_id: &str) -> SessionResult<()> {
        let group_id = group_id.to_string();
        self.call(|reply| SessionCommand::LeaveGroup { group_id, reply })
            .await
    }

    // ---------------------------------------------------------------
    // 会话
    // ---------------------------------------------------------------

    pub async fn open_conversation(&self, target: ConversationTarget) -> SessionResult<ConversationView> {
        self.call(|reply| SessionCommand::OpenConversation { target, reply })
            .await
    }

    pub async fn close_conversation(&self, conversation_id: &str) -> SessionResult<()> {
        let conversation_id = conversation_id.to_string();
        self.call(|reply| SessionCommand::CloseConversation {
            conversation_id,
            reply,
        })
        .await
    }

    pub async fn minimize(&self, conversation_id: &str) -> SessionResult<()> {
        let conversation_id = conversation_id.to_string();
        self.call(|reply| SessionCommand::Minimize {
            conversation_id,
            reply,
        })
        .await
    }

    pub async fn restore(&self, conversation_id: &str) -> SessionResult<()> {
        let conversation_id = conversation_id.to_string();
        self.call(|reply| SessionCommand::Restore {
            conversation_id,
            reply,
        })
        .await
    }

    pub async fn mark_read(&self, conversation_id: &str) -> SessionResult<()> {
        let conversation_id = conversation_id.to_string();
        self.call(|reply| SessionCommand::MarkRead {
            conversation_id,
            reply,
        })
        .await
    }

    /// 发送消息，返回写入会话的临时消息（状态 sending）
    pub async fn send_message(
        &self,
        conversation_id: &str,
        content: MessageContent,
    ) -> SessionResult<ChatMessage> {
        let conversation_id = conversation_id.to_string();
        self.call(|reply| SessionCommand::SendMessage {
            conversation_id,
            content,
            reply,
        })
        .await
    }

    pub async fn send_text(&self, conversation_id: &str, text: &str) -> SessionResult<ChatMessage> {
        self.send_message(conversation_id, MessageContent::text(text))
            .await
    }

    pub async fn retry_message(&self, conversation_id: &str, client_msg_id: &str) -> SessionResult<ChatMessage> {
        let (conversation_id, client_msg_id) = (conversation_id.to_string(), client_msg_id.to_string());
        self.call(|reply| SessionCommand::RetryMessage {
            conversation_id,
            client_msg_id,
            reply,
        })
        .await
    }

    pub async fn load_older_history(&self, conversation_id: &str) -> SessionResult<()> {
        let conversation_id = conversation_id.to_string();
        self.call(|reply| SessionCommand::LoadOlderHistory {
            conversation_id,
            reply,
        })
        .await
    }

    // ---------------------------------------------------------------
    // 查询（在 actor 内执行，读到的是一致的快照）
    // ---------------------------------------------------------------

    pub async fn query<R, F>(&self, f: F) -> SessionResult<R>
    where
        F: FnOnce(&SessionDispatcher) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: QueryJob = Box::new(move |dispatcher| {
            let _ = tx.send(f(dispatcher));
        });
        self.commands
            .send(SessionCommand::Query(job))
            .await
            .map_err(|_| SessionError::SessionClosed)?;
        rx.await.map_err(|_| SessionError::SessionClosed)
    }

    pub async fn relationship_status(&self, peer_user_id: &str) -> SessionResult<RelationStatus> {
        let peer = peer_user_id.to_string();
        self.query(move |d| d.relationships().status_between(d.local_user_id(), &peer))
            .await
    }

    pub async fn friends(&self) -> SessionResult<Vec<String>> {
        self.query(|d| d.relationships().friends()).await
    }

    pub async fn is_member(&self, group_id: &str, user_id: &str) -> SessionResult<bool> {
        let (group_id, user_id) = (group_id.to_string(), user_id.to_string());
        self.query(move |d| d.groups().is_member(&group_id, &user_id))
            .await
    }

    pub async fn membership_of(&self, group_id: &str, user_id: &str) -> SessionResult<MembershipStatus> {
        let (group_id, user_id) = (group_id.to_string(), user_id.to_string());
        self.query(move |d| d.groups().membership_of(&group_id, &user_id))
            .await
    }

    pub async fn list_members(&self, group_id: &str) -> SessionResult<Vec<Membership>> {
        let group_id = group_id.to_string();
        self.query(move |d| d.groups().list_members(&group_id)).await
    }

    /// 本地用户待处理的群邀请
    pub async fn pending_invitations(&self) -> SessionResult<Vec<Invitation>> {
        self.query(|d| d.groups().pending_invitations_for(d.local_user_id()))
            .await
    }

    pub async fn messages(&self, conversation_id: &str) -> SessionResult<Vec<ChatMessage>> {
        let conversation_id = conversation_id.to_string();
        self.query(move |d| d.conversations().messages(&conversation_id))
            .await?
    }

    pub async fn conversation(&self, conversation_id: &str) -> SessionResult<Option<ConversationView>> {
        let conversation_id = conversation_id.to_string();
        self.query(move |d| d.conversations().conversation(&conversation_id).map(|c| c.view()))
            .await
    }

    pub async fn open_conversations(&self) -> SessionResult<Vec<ConversationView>> {
        self.query(|d| d.conversations().open_conversations()).await
    }

    pub async fn total_unread_count(&self) -> SessionResult<u32> {
        self.query(|d| d.conversations().total_unread_count()).await
    }

    pub async fn stats(&self) -> SessionResult<DispatchStats> {
        self.query(|d| d.stats().clone()).await
    }

    /// 登出：取消所有进行中的发送，销毁会话状态并停止 actor
    pub async fn logout(&self) -> SessionResult<()> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Logout { reply: tx })
            .await
            .map_err(|_| SessionError::SessionClosed)?;
        rx.await.map_err(|_| SessionError::SessionClosed)
    }
}

fn remote_failure(action: &str, error: anyhow::Error) -> String {
    SessionError::RemoteActionFailed {
        action: action.to_string(),
        reason: format!("{:#}", error),
    }
    .to_string()
}

/// 会话状态的唯一持有者
struct SessionActor {
    dispatcher: SessionDispatcher,
    remote: Arc<dyn RemoteApi>,
    history: Arc<dyn HistoryStore>,
    /// 出站任务用弱引用回投完成事件，不阻止 actor 在所有句柄释放后退出
    completions: mpsc::WeakSender<SessionCommand>,
    /// 进行中的消息发送（clientMsgID → 任务句柄）
    in_flight: HashMap<String, AbortHandle>,
}

impl SessionActor {
    async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        while let Some(command) = commands.recv().await {
            if !self.handle(command).await {
                break;
            }
        }
        for (_, handle) in self.in_flight.drain() {
            handle.abort();
        }
        info!(
            "[Client] 👋 会话 actor 退出 (user={})",
            self.dispatcher.local_user_id()
        );
    }

    /// 返回 false 表示 actor 应当退出
    async fn handle(&mut self, command: SessionCommand) -> bool {
        let now = now_millis();
        match command {
            SessionCommand::Relation {
                peer_user_id,
                action,
                reply,
            } => {
                let local = self.dispatcher.local_user_id().to_string();
                let result = self
                    .dispatcher
                    .relationships_mut()
                    .apply_action(&local, &peer_user_id, action, now);
                match result {
                    Ok(transition) => {
                        self.dispatcher.publish(vec![transition.notification]).await;
                        let remote = self.remote.clone();
                        let (op_id, pair, peer) = (transition.op_id, transition.pair, transition.peer_user_id);
                        self.spawn_outbound(async move {
                            let result = match action {
                                RelationAction::Request => remote.send_friend_request(&peer).await,
                                RelationAction::Accept => remote.respond_to_friend_request(&peer, true).await,
                                RelationAction::Decline => remote.respond_to_friend_request(&peer, false).await,
                                _ => remote.update_relation(&peer, action).await,
                            };
                            Completion::Relation {
                                op_id,
                                pair,
                                result: result.map_err(|e| remote_failure(action.name(), e)),
                            }
                        });
                        let status = self
                            .dispatcher
                            .relationships()
                            .status_between(&local, &peer_user_id);
                        let _ = reply.send(Ok(status));
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }
            SessionCommand::Invite {
                group_id,
                user_id,
                reply,
            } => {
                let local = self.dispatcher.local_user_id().to_string();
                let result = self
                    .dispatcher
                    .groups_mut()
                    .invite(&group_id, &user_id, &local, now);
                let result = self.start_group_action(result).await.and_then(|action| match action {
                    GroupAction::Invite(invitation) => Ok(invitation),
                    other => Err(SessionError::invalid_transition(group_id, other, "invite")),
                });
                let _ = reply.send(result);
            }
            SessionCommand::RequestToJoin { group_id, reply } => {
                let result = self.dispatcher.groups_mut().request_to_join(&group_id, now);
                let result = self.start_group_action(result).await.and_then(|action| match action {
                    GroupAction::RequestToJoin(invitation) => Ok(invitation),
                    other => Err(SessionError::invalid_transition(group_id, other, "request_to_join")),
                });
                let _ = reply.send(result);
            }
            SessionCommand::RespondToInvitation {
                invitation_id,
                accept,
                reply,
            } => {
                let result = self
                    .dispatcher
                    .groups_mut()
                    .respond_to_invitation(&invitation_id, accept, now);
                let result = self.start_group_action(result).await.map(|action| match action {
                    GroupAction::Respond { invitation, .. } => self
                        .dispatcher
                        .groups()
                        .membership_of(&invitation.group_id, &invitation.user_id),
                    _ => MembershipStatus::NotMember,
                });
                let _ = reply.send(result);
            }
            SessionCommand::LeaveGroup { group_id, reply } => {
                let result = self.dispatcher.groups_mut().leave_group(&group_id);
                let result = self.start_group_action(result).await.map(|_| ());
                let _ = reply.send(result);
            }
            SessionCommand::OpenConversation { target, reply } => {
                let opened = self.dispatcher.conversations_mut().open_conversation(target, now);
                self.dispatcher.publish(opened.notifications).await;
                if let Some(request) = opened.history_request {
                    self.spawn_history(request);
                }
                let view = self
                    .dispatcher
                    .conversations()
                    .conversation(&opened.conversation_id)
                    .map(|c| c.view())
                    .ok_or(SessionError::ConversationNotFound(opened.conversation_id));
                let _ = reply.send(view);
            }
            SessionCommand::CloseConversation {
                conversation_id,
                reply,
            } => {
                let result = self
                    .dispatcher
                    .conversations_mut()
                    .close_conversation(&conversation_id);
                let result = match result {
                    Ok(cancellation) => {
                        self.abort_sends(&cancellation.cancelled);
                        self.dispatcher.publish(cancellation.notifications).await;
                        Ok(())
                    }
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            SessionCommand::Minimize {
                conversation_id,
                reply,
            } => {
                let result = self.dispatcher.conversations_mut().minimize(&conversation_id);
                let _ = reply.send(self.publish_result(result).await);
            }
            SessionCommand::Restore {
                conversation_id,
                reply,
            } => {
                let result = self
                    .dispatcher
                    .conversations_mut()
                    .restore(&conversation_id, now);
                let _ = reply.send(self.publish_result(result).await);
            }
            SessionCommand::MarkRead {
                conversation_id,
                reply,
            } => {
                let result = self
                    .dispatcher
                    .conversations_mut()
                    .mark_read(&conversation_id, now);
                let _ = reply.send(self.publish_result(result).await);
            }
            SessionCommand::SendMessage {
                conversation_id,
                content,
                reply,
            } => {
                let result = self
                    .dispatcher
                    .conversations_mut()
                    .send_message(&conversation_id, content, now);
                let result = match result {
                    Ok(outgoing) => {
                        self.dispatcher.publish(outgoing.notifications).await;
                        self.spawn_send(outgoing.target, outgoing.message.clone());
                        Ok(outgoing.message)
                    }
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            SessionCommand::RetryMessage {
                conversation_id,
                client_msg_id,
                reply,
            } => {
                let result = self
                    .dispatcher
                    .conversations_mut()
                    .retry_message(&conversation_id, &client_msg_id, now);
                let result = match result {
                    Ok(outgoing) => {
                        self.dispatcher.publish(outgoing.notifications).await;
                        self.spawn_send(outgoing.target, outgoing.message.clone());
                        Ok(outgoing.message)
                    }
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            SessionCommand::LoadOlderHistory {
                conversation_id,
                reply,
            } => {
                let result = self
                    .dispatcher
                    .conversations()
                    .load_older_history(&conversation_id)
                    .map(|request| self.spawn_history(request));
                let _ = reply.send(result);
            }
            SessionCommand::Inbound(event) => {
                self.dispatcher.dispatch(event).await;
            }
            SessionCommand::Completion(completion) => {
                if let Completion::Send { client_msg_id, .. } = &completion {
                    self.in_flight.remove(client_msg_id);
                }
                self.dispatcher.complete(completion).await;
            }
            SessionCommand::Query(job) => job(&self.dispatcher),
            SessionCommand::Logout { reply } => {
                let cancellation = self.dispatcher.conversations_mut().logout();
                self.abort_sends(&cancellation.cancelled);
                self.dispatcher.publish(cancellation.notifications).await;
                info!("[Client] 🚪 用户 {} 已登出", self.dispatcher.local_user_id());
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    async fn publish_result(&mut self, result: SessionResult<Vec<Notification>>) -> SessionResult<()> {
        let notifications = result?;
        self.dispatcher.publish(notifications).await;
        Ok(())
    }

    /// 推送群组动作的乐观通知并发起出站请求，返回动作本身
    async fn start_group_action(&mut self, result: SessionResult<GroupTransition>) -> SessionResult<GroupAction> {
        let transition = result?;
        self.dispatcher.publish(vec![transition.notification]).await;
        let remote = self.remote.clone();
        let op_id = transition.op_id;
        let action = transition.action.clone();
        self.spawn_outbound(async move {
            let result = match &action {
                GroupAction::Invite(invitation) => remote.invite_to_group(invitation).await,
                GroupAction::RequestToJoin(invitation) => remote.request_to_join(invitation).await,
                GroupAction::Respond { invitation, accept } => {
                    remote.respond_to_invitation(invitation, *accept).await
                }
                GroupAction::Leave { group_id } => remote.leave_group(group_id).await,
            };
            Completion::Group {
                op_id,
                result: result.map_err(|e| remote_failure(action.name(), e)),
            }
        });
        Ok(transition.action)
    }

    fn spawn_send(&mut self, target: ConversationTarget, message: ChatMessage) {
        let remote = self.remote.clone();
        let client_msg_id = message.client_msg_id.clone();
        let handle = self.spawn_outbound(async move {
            let result = remote.post_message(&target, &message).await;
            Completion::Send {
                conversation_id: message.conversation_id,
                client_msg_id: message.client_msg_id,
                result: result.map_err(|e| remote_failure("post_message", e)),
            }
        });
        self.in_flight.insert(client_msg_id, handle);
    }

    fn spawn_history(&self, request: HistoryRequest) {
        let history = self.history.clone();
        self.spawn_outbound(async move {
            let result = history
                .fetch_history(&request.conversation_id, request.before_seq)
                .await;
            Completion::History {
                conversation_id: request.conversation_id,
                result: result.map_err(|e| format!("{:#}", e)),
            }
        });
    }

    /// 出站请求在独立任务中执行，完成后作为命令回到队列
    fn spawn_outbound<F>(&self, work: F) -> AbortHandle
    where
        F: Future<Output = Completion> + Send + 'static,
    {
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let completion = work.await;
            match completions.upgrade() {
                Some(tx) => {
                    let _ = tx.send(SessionCommand::Completion(completion)).await;
                }
                None => debug!("[Client] 会话已结束，丢弃出站请求结果"),
            }
        })
        .abort_handle()
    }

    fn abort_sends(&mut self, client_msg_ids: &[String]) {
        for id in client_msg_ids {
            if let Some(handle) = self.in_flight.remove(id) {
                handle.abort();
                debug!("[Client] 已取消发送 {}", id);
            }
        }
    }
}
