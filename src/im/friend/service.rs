//! 好友关系图
//!
//! 按无序用户对维护关系边的状态机。本地动作先写入乐观值并返回需要发往
//! 服务器的请求；请求完成后确认或回滚。远程事件是权威来源，总是覆盖本地
//! 乐观值，覆盖时下发 reconciliation 通知。

use crate::im::error::{SessionError, SessionResult};
use crate::im::friend::models::{
    EdgeState, PairKey, PendingAction, RelationAction, RelationStatus, RelationshipEdge,
};
use crate::im::friend::types::RelationshipEvent;
use crate::im::types::{ApplyOutcome, EntityType, Notification};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// 本地动作的结果：需要发往服务器的请求 + 乐观状态通知
#[derive(Debug, Clone)]
pub struct RelationTransition {
    pub op_id: u64,
    pub pair: PairKey,
    pub peer_user_id: String,
    pub action: RelationAction,
    pub notification: Notification,
}

/// 好友关系图
pub struct RelationshipGraph {
    local_user_id: String,
    edges: HashMap<PairKey, RelationshipEdge>,
    next_op_id: u64,
}

impl RelationshipGraph {
    pub fn new(local_user_id: impl Into<String>) -> Self {
        Self {
            local_user_id: local_user_id.into(),
            edges: HashMap::new(),
            next_op_id: 0,
        }
    }

    pub fn local_user_id(&self) -> &str {
        &self.local_user_id
    }

    /// 发送好友申请：`none|declined → pending_outgoing`
    pub fn request(&mut self, from: &str, to: &str, now: i64) -> SessionResult<RelationTransition> {
        self.apply_local(from, to, RelationAction::Request, now)
    }

    /// 同意好友申请：`pending_incoming → accepted`
    pub fn accept(&mut self, actor: &str, peer: &str, now: i64) -> SessionResult<RelationTransition> {
        self.apply_local(actor, peer, RelationAction::Accept, now)
    }

    /// 拒绝好友申请：`pending_incoming → declined`
    pub fn decline(&mut self, actor: &str, peer: &str, now: i64) -> SessionResult<RelationTransition> {
        self.apply_local(actor, peer, RelationAction::Decline, now)
    }

    /// 拉黑：任意状态 `→ blocked`
    pub fn block(&mut self, actor: &str, peer: &str, now: i64) -> SessionResult<RelationTransition> {
        self.apply_local(actor, peer, RelationAction::Block, now)
    }

    /// 解除拉黑（仅拉黑方可操作）：`blocked → none`
    pub fn unblock(&mut self, actor: &str, peer: &str, now: i64) -> SessionResult<RelationTransition> {
        self.apply_local(actor, peer, RelationAction::Unblock, now)
    }

    /// 删除好友：`accepted → none`
    pub fn unfriend(&mut self, actor: &str, peer: &str, now: i64) -> SessionResult<RelationTransition> {
        self.apply_local(actor, peer, RelationAction::Unfriend, now)
    }

    /// 按动作分派
    pub fn apply_action(
        &mut self,
        actor: &str,
        peer: &str,
        action: RelationAction,
        now: i64,
    ) -> SessionResult<RelationTransition> {
        self.apply_local(actor, peer, action, now)
    }

    fn apply_local(
        &mut self,
        actor: &str,
        peer: &str,
        action: RelationAction,
        now: i64,
    ) -> SessionResult<RelationTransition> {
        let pair = PairKey::new(actor, peer);
        if actor == peer {
            return Err(SessionError::invalid_transition(
                pair.id(),
                RelationStatus::None,
                action.name(),
            ));
        }

        let current = self
            .edges
            .get(&pair)
            .map(|e| e.effective().clone())
            .unwrap_or(EdgeState::None);

        let next = match Self::next_state(actor, &current, action) {
            Some(next) => next,
            None => {
                warn!(
                    "[Relation] 非法动作 {}: {} -> {}，当前状态 {:?}",
                    action.name(),
                    actor,
                    peer,
                    current.view_for(actor)
                );
                return Err(SessionError::invalid_transition(
                    pair.id(),
                    current.view_for(actor),
                    action.name(),
                ));
            }
        };

        self.next_op_id += 1;
        let op_id = self.next_op_id;
        let edge = self
            .edges
            .entry(pair.clone())
            .or_insert_with(|| RelationshipEdge::new(pair.clone()));
        edge.optimistic = Some(PendingAction {
            op_id,
            state: next,
            issued_at: now,
        });

        info!(
            "[Relation] {} {} -> {}，乐观状态 {:?} (op={})",
            action.name(),
            actor,
            peer,
            edge.status_for(actor),
            op_id
        );

        let notification = Notification::committed(
            EntityType::Relationship,
            pair.id(),
            &edge.view(&self.local_user_id),
        );
        Ok(RelationTransition {
            op_id,
            pair,
            peer_user_id: peer.to_string(),
            action,
            notification,
        })
    }

    /// 本地动作转换表
    fn next_state(actor: &str, current: &EdgeState, action: RelationAction) -> Option<EdgeState> {
        let view = current.view_for(actor);
        match action {
            RelationAction::Request => match view {
                RelationStatus::None | RelationStatus::Declined => Some(EdgeState::Pending {
                    requester: actor.to_string(),
                }),
                _ => None,
            },
            RelationAction::Accept => {
                (view == RelationStatus::PendingIncoming).then_some(EdgeState::Accepted)
            }
            RelationAction::Decline => {
                (view == RelationStatus::PendingIncoming).then(|| EdgeState::Declined {
                    by: actor.to_string(),
                })
            }
            RelationAction::Unfriend => {
                (view == RelationStatus::Accepted).then_some(EdgeState::None)
            }
            RelationAction::Block => match current {
                EdgeState::Blocked { by } if by == actor => None,
                _ => Some(EdgeState::Blocked {
                    by: actor.to_string(),
                }),
            },
            RelationAction::Unblock => match current {
                EdgeState::Blocked { by } if by == actor => Some(EdgeState::None),
                _ => None,
            },
        }
    }

    /// 出站请求完成（成功则确认乐观值，失败则回滚）
    ///
    /// 乐观值已被远程事件或更新的动作取代时返回 None。
    pub fn complete_action(
        &mut self,
        op_id: u64,
        pair: &PairKey,
        result: Result<(), String>,
    ) -> Option<Notification> {
        let edge = self.edges.get_mut(pair)?;
        match &edge.optimistic {
            Some(p) if p.op_id == op_id => {}
            _ => {
                debug!(
                    "[Relation] 动作 op={} 已被取代，忽略完成事件 ({})",
                    op_id,
                    pair.id()
                );
                return None;
            }
        }
        let pending = edge.optimistic.take()?;

        match result {
            Ok(()) => {
                edge.confirmed = pending.state;
                debug!("[Relation] 动作 op={} 已确认 ({})", op_id, pair.id());
                Some(Notification::committed(
                    EntityType::Relationship,
                    pair.id(),
                    &edge.view(&self.local_user_id),
                ))
            }
            Err(reason) => {
                warn!(
                    "[Relation] 动作 op={} 失败，回滚到 {:?}: {}",
                    op_id,
                    edge.confirmed.view_for(&self.local_user_id),
                    reason
                );
                Some(Notification::action_failed(
                    EntityType::Relationship,
                    pair.id(),
                    reason,
                    &edge.view(&self.local_user_id),
                ))
            }
        }
    }

    /// 应用服务器下发的关系事件
    ///
    /// 时间戳早于已确认状态，或与已确认状态完全相同的事件视为重复投递。
    pub fn apply_remote_event(&mut self, event: &RelationshipEvent) -> ApplyOutcome {
        let pair = event.pair();
        let state = event.edge_state();
        let edge = self
            .edges
            .entry(pair.clone())
            .or_insert_with(|| RelationshipEdge::new(pair.clone()));

        // 本地确认会改写 confirmed，所以重复投递要与上次应用的远程事件比较
        let redelivered = edge
            .last_remote
            .as_ref()
            .is_some_and(|(at, last)| *at == event.updated_at && *last == state);
        if event.updated_at < edge.updated_at || redelivered {
            debug!(
                "[Relation] 丢弃过期/重复关系事件 {} (event={}, local={})",
                pair.id(),
                event.updated_at,
                edge.updated_at
            );
            return ApplyOutcome::Duplicate;
        }

        let optimistic = edge.optimistic.take();
        edge.last_remote = Some((event.updated_at, state.clone()));
        edge.confirmed = state;
        edge.updated_at = event.updated_at;
        let view = edge.view(&self.local_user_id);

        let notification = match optimistic {
            Some(p) if p.state != edge.confirmed => {
                info!(
                    "[Relation] 远程状态覆盖本地乐观状态 {}: {:?} -> {:?}",
                    pair.id(),
                    p.state.view_for(&self.local_user_id),
                    view.status
                );
                Notification::reconciled(
                    EntityType::Relationship,
                    pair.id(),
                    &p.state.view_for(&self.local_user_id),
                    &view,
                )
            }
            _ => {
                debug!("[Relation] 关系 {} 更新为 {:?}", pair.id(), view.status);
                Notification::committed(EntityType::Relationship, pair.id(), &view)
            }
        };
        ApplyOutcome::Applied(vec![notification])
    }

    pub fn edge(&self, a: &str, b: &str) -> Option<&RelationshipEdge> {
        self.edges.get(&PairKey::new(a, b))
    }

    /// 用户 `a` 视角下与 `b` 的关系
    pub fn status_between(&self, a: &str, b: &str) -> RelationStatus {
        self.edge(a, b)
            .map(|e| e.status_for(a))
            .unwrap_or(RelationStatus::None)
    }

    /// 本地用户的好友列表（已接受）
    pub fn friends(&self) -> Vec<String> {
        self.peers_with(RelationStatus::Accepted)
    }

    /// 等待本地用户处理的好友申请
    pub fn pending_incoming(&self) -> Vec<String> {
        self.peers_with(RelationStatus::PendingIncoming)
    }

    fn peers_with(&self, status: RelationStatus) -> Vec<String> {
        let mut peers: Vec<String> = self
            .edges
            .values()
            .filter(|e| e.status_for(&self.local_user_id) == status)
            .filter_map(|e| e.pair.other(&self.local_user_id).map(str::to_string))
            .collect();
        peers.sort();
        peers
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::im::friend::types::RemoteRelationStatus;
    use crate::im::types::NotificationKind;

    fn remote(from: &str, to: &str, status: RemoteRelationStatus, actor: &str, at: i64) -> RelationshipEvent {
        RelationshipEvent {
            from_user_id: from.to_string(),
            to_user_id: to.to_string(),
            status,
            action_user_id: actor.to_string(),
            updated_at: at,
        }
    }

    /// 本地动作 + 立即确认
    fn act(g: &mut RelationshipGraph, actor: &str, peer: &str, action: RelationAction) -> SessionResult<()> {
        let t = g.apply_action(actor, peer, action, 1)?;
        g.complete_action(t.op_id, &t.pair, Ok(()));
        Ok(())
    }

    #[test]
    fn transition_table_matches_local_actions() {
        let mut g = RelationshipGraph::new("a");
        act(&mut g, "a", "b", RelationAction::Request).unwrap();
        assert_eq!(g.status_between("a", "b"), RelationStatus::PendingOutgoing);
        assert_eq!(g.status_between("b", "a"), RelationStatus::PendingIncoming);

        // 请求方不能同意自己的申请
        assert!(matches!(
            act(&mut g, "a", "b", RelationAction::Accept),
            Err(SessionError::InvalidTransition { .. })
        ));

        act(&mut g, "b", "a", RelationAction::Accept).unwrap();
        assert_eq!(g.status_between("a", "b"), RelationStatus::Accepted);

        act(&mut g, "a", "b", RelationAction::Unfriend).unwrap();
        assert_eq!(g.status_between("a", "b"), RelationStatus::None);

        act(&mut g, "b", "a", RelationAction::Block).unwrap();
        assert_eq!(g.status_between("a", "b"), RelationStatus::Blocked);
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn request_fails_from_outgoing_accepted_or_blocked() {
        let mut g = RelationshipGraph::new("a");
        act(&mut g, "a", "b", RelationAction::Request).unwrap();
        let err = g.request("a", "b", 2).unwrap_err();
        assert!(matches!(err, SessionError::InvalidTransition { action: "request", .. }));
        assert_eq!(g.status_between("a", "b"), RelationStatus::PendingOutgoing);

        act(&mut g, "b", "a", RelationAction::Accept).unwrap();
        assert!(g.request("a", "b", 3).is_err());

        act(&mut g, "a", "b", RelationAction::Block).unwrap();
        assert!(g.request("a", "b", 4).is_err());
        // 被拉黑的一方也无法再发起申请
        assert!(g.request("b", "a", 4).is_err());
        assert_eq!(g.status_between("a", "b"), RelationStatus::Blocked);
    }

    #[test]
    fn decline_is_not_terminal() {
        let mut g = RelationshipGraph::new("a");
        act(&mut g, "a", "b", RelationAction::Request).unwrap();
        act(&mut g, "b", "a", RelationAction::Decline).unwrap();
        assert_eq!(g.status_between("a", "b"), RelationStatus::Declined);

        let t = g.request("a", "b", 10).unwrap();
        assert_eq!(t.action, RelationAction::Request);
        assert_eq!(g.status_between("a", "b"), RelationStatus::PendingOutgoing);
        assert_eq!(g.status_between("b", "a"), RelationStatus::PendingIncoming);
    }

    #[test]
    fn only_blocker_can_unblock() {
        let mut g = RelationshipGraph::new("a");
        act(&mut g, "a", "b", RelationAction::Block).unwrap();
        assert!(g.unblock("b", "a", 2).is_err());
        act(&mut g, "a", "b", RelationAction::Unblock).unwrap();
        assert_eq!(g.status_between("a", "b"), RelationStatus::None);
    }

    #[test]
    fn failed_action_rolls_back_to_confirmed() {
        let mut g = RelationshipGraph::new("a");
        let t = g.request("a", "b", 1).unwrap();
        assert_eq!(g.status_between("a", "b"), RelationStatus::PendingOutgoing);

        let n = g
            .complete_action(t.op_id, &t.pair, Err("network down".to_string()))
            .unwrap();
        assert!(n.is_failure());
        assert_eq!(g.status_between("a", "b"), RelationStatus::None);
        // 可以重试
        assert!(g.request("a", "b", 2).is_ok());
    }

    #[test]
    fn applying_same_remote_event_twice_is_idempotent() {
        let mut g = RelationshipGraph::new("a");
        let ev = remote("b", "a", RemoteRelationStatus::Pending, "b", 100);

        assert!(!g.apply_remote_event(&ev).is_duplicate());
        let first = g.edge("a", "b").cloned();
        assert!(g.apply_remote_event(&ev).is_duplicate());
        assert_eq!(g.edge("a", "b").cloned(), first);
        assert_eq!(g.pending_incoming(), vec!["b".to_string()]);
    }

    #[test]
    fn redelivery_after_local_ack_does_not_regress_edge() {
        let mut g = RelationshipGraph::new("a");
        let ev = remote("b", "a", RemoteRelationStatus::Pending, "b", 100);
        g.apply_remote_event(&ev);

        let t = g.accept("a", "b", 110).unwrap();
        g.complete_action(t.op_id, &t.pair, Ok(()));
        assert_eq!(g.status_between("a", "b"), RelationStatus::Accepted);

        assert!(g.apply_remote_event(&ev).is_duplicate());
        assert_eq!(g.status_between("a", "b"), RelationStatus::Accepted);
        assert!(g.pending_incoming().is_empty());
    }

    #[test]
    fn stale_remote_event_is_discarded() {
        let mut g = RelationshipGraph::new("a");
        g.apply_remote_event(&remote("a", "b", RemoteRelationStatus::Accepted, "b", 200));
        let out = g.apply_remote_event(&remote("a", "b", RemoteRelationStatus::Pending, "a", 100));
        assert!(out.is_duplicate());
        assert_eq!(g.friends(), vec!["b".to_string()]);
    }

    #[test]
    fn remote_event_overrides_optimistic_state_with_reconciliation() {
        let mut g = RelationshipGraph::new("a");
        g.apply_remote_event(&remote("b", "a", RemoteRelationStatus::Pending, "b", 100));
        let t = g.accept("a", "b", 150).unwrap();
        assert_eq!(g.status_between("a", "b"), RelationStatus::Accepted);

        // 对方在此期间拉黑
        let out = g.apply_remote_event(&remote("b", "a", RemoteRelationStatus::Blocked, "b", 160));
        let notifications = out.notifications();
        assert_eq!(notifications.len(), 1);
        match &notifications[0].kind {
            NotificationKind::Reconciled { previous } => assert_eq!(previous, "accepted"),
            other => panic!("unexpected kind {:?}", other),
        }
        assert_eq!(g.status_between("a", "b"), RelationStatus::Blocked);

        // 迟到的成功回执不再生效
        assert!(g.complete_action(t.op_id, &t.pair, Ok(())).is_none());
        assert_eq!(g.status_between("a", "b"), RelationStatus::Blocked);
    }

    #[test]
    fn matching_remote_confirmation_is_plain_commit() {
        let mut g = RelationshipGraph::new("a");
        g.request("a", "b", 1).unwrap();
        let out = g.apply_remote_event(&remote("a", "b", RemoteRelationStatus::Pending, "a", 5));
        let n = out.notifications();
        assert_eq!(n[0].kind, NotificationKind::Committed);
        let edge = g.edge("a", "b").unwrap();
        assert!(edge.optimistic.is_none());
        assert_eq!(edge.status_for("a"), RelationStatus::PendingOutgoing);
    }

    #[test]
    fn self_relation_is_rejected() {
        let mut g = RelationshipGraph::new("a");
        assert!(g.request("a", "a", 1).is_err());
        assert!(g.is_empty());
    }
}
