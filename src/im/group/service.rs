//! 群成员与邀请管理
//!
//! 每个 (群, 用户) 对应一个槽位：无、已邀请、已是成员。
//! 本地动作立即写入槽位并记录回滚点；出站请求失败时回滚。
//! 远程事件按邀请 ID 去重，并覆盖尚未确认的本地动作。

use crate::im::error::{SessionError, SessionResult};
use crate::im::group::models::{
    slot_entity_id, GroupInfo, Invitation, InvitationKind, InvitationStatus, MemberSlot,
    Membership, MembershipStatus, MembershipView,
};
use crate::im::group::types::{GroupEvent, MemberRemovedEvent};
use crate::im::serialization::generate_invitation_id;
use crate::im::types::{ApplyOutcome, EntityType, Notification};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// 需要发往服务器的群组动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupAction {
    Invite(Invitation),
    RequestToJoin(Invitation),
    Respond { invitation: Invitation, accept: bool },
    Leave { group_id: String },
}

impl GroupAction {
    pub fn name(&self) -> &'static str {
        match self {
            GroupAction::Invite(_) => "invite",
            GroupAction::RequestToJoin(_) => "request_to_join",
            GroupAction::Respond { accept: true, .. } => "accept_invitation",
            GroupAction::Respond { accept: false, .. } => "decline_invitation",
            GroupAction::Leave { .. } => "leave_group",
        }
    }
}

/// 本地动作的结果
#[derive(Debug, Clone)]
pub struct GroupTransition {
    pub op_id: u64,
    pub action: GroupAction,
    pub notification: Notification,
}

/// 未确认的本地动作（用于失败回滚）
struct PendingGroupOp {
    group_id: String,
    user_id: String,
    previous: Option<MemberSlot>,
    applied: Option<MemberSlot>,
}

#[derive(Default)]
struct GroupState {
    info: Option<GroupInfo>,
    slots: HashMap<String, MemberSlot>,
}

/// 群成员管理器
pub struct GroupMembershipManager {
    local_user_id: String,
    groups: HashMap<String, GroupState>,
    /// 已结束（accepted/declined）的邀请，用于识别重复投递
    resolved: HashMap<String, InvitationStatus>,
    pending_ops: HashMap<u64, PendingGroupOp>,
    next_op_id: u64,
}

impl GroupMembershipManager {
    pub fn new(local_user_id: impl Into<String>) -> Self {
        Self {
            local_user_id: local_user_id.into(),
            groups: HashMap::new(),
            resolved: HashMap::new(),
            pending_ops: HashMap::new(),
            next_op_id: 0,
        }
    }

    /// 邀请用户入群：`none → invited`
    pub fn invite(
        &mut self,
        group_id: &str,
        user_id: &str,
        inviter_user_id: &str,
        now: i64,
    ) -> SessionResult<GroupTransition> {
        self.ensure_free_slot(group_id, user_id)?;
        let invitation = Invitation {
            invitation_id: generate_invitation_id(),
            group_id: group_id.to_string(),
            user_id: user_id.to_string(),
            inviter_user_id: Some(inviter_user_id.to_string()),
            kind: InvitationKind::Invite,
            status: InvitationStatus::Pending,
            created_at: now,
        };
        info!(
            "[Group] {} 邀请 {} 加入群 {} (invitation={})",
            inviter_user_id, user_id, group_id, invitation.invitation_id
        );
        Ok(self.begin(
            group_id,
            user_id,
            Some(MemberSlot::Invited {
                invitation: invitation.clone(),
            }),
            GroupAction::Invite(invitation),
        ))
    }

    /// 本地用户申请入群，由群主处理
    pub fn request_to_join(&mut self, group_id: &str, now: i64) -> SessionResult<GroupTransition> {
        let user_id = self.local_user_id.clone();
        self.ensure_free_slot(group_id, &user_id)?;
        let invitation = Invitation {
            invitation_id: generate_invitation_id(),
            group_id: group_id.to_string(),
            user_id: user_id.clone(),
            inviter_user_id: None,
            kind: InvitationKind::JoinRequest,
            status: InvitationStatus::Pending,
            created_at: now,
        };
        info!("[Group] {} 申请加入群 {}", user_id, group_id);
        Ok(self.begin(
            group_id,
            &user_id,
            Some(MemberSlot::Invited {
                invitation: invitation.clone(),
            }),
            GroupAction::RequestToJoin(invitation),
        ))
    }

    /// 处理邀请：接受则在一次赋值中以成员记录替换邀请，拒绝则清空槽位
    ///
    /// 普通邀请只能由被邀请人处理，入群申请只能由群主处理。
    pub fn respond_to_invitation(
        &mut self,
        invitation_id: &str,
        accept: bool,
        now: i64,
    ) -> SessionResult<GroupTransition> {
        let invitation = self
            .find_invitation(invitation_id)
            .cloned()
            .ok_or_else(|| SessionError::InvitationNotFound(invitation_id.to_string()))?;

        let allowed = match invitation.kind {
            InvitationKind::Invite => invitation.user_id == self.local_user_id,
            InvitationKind::JoinRequest => {
                self.is_group_owner(&invitation.group_id, &self.local_user_id)
            }
        };
        if !allowed {
            warn!(
                "[Group] {} 无权处理邀请 {} ({:?})",
                self.local_user_id, invitation_id, invitation.kind
            );
            return Err(SessionError::invalid_transition(
                slot_entity_id(&invitation.group_id, &invitation.user_id),
                invitation.status,
                if accept { "accept" } else { "decline" },
            ));
        }

        let new_slot = accept.then(|| MemberSlot::Member {
            membership: Membership {
                group_id: invitation.group_id.clone(),
                user_id: invitation.user_id.clone(),
                joined_at: now,
            },
        });
        info!(
            "[Group] {} 邀请 {}: 群 {} 用户 {}",
            if accept { "接受" } else { "拒绝" },
            invitation_id,
            invitation.group_id,
            invitation.user_id
        );
        let group_id = invitation.group_id.clone();
        let user_id = invitation.user_id.clone();
        Ok(self.begin(
            &group_id,
            &user_id,
            new_slot,
            GroupAction::Respond { invitation, accept },
        ))
    }

    /// 本地用户退出群：`member → none`
    pub fn leave_group(&mut self, group_id: &str) -> SessionResult<GroupTransition> {
        let user_id = self.local_user_id.clone();
        if !self.is_member(group_id, &user_id) {
            return Err(SessionError::invalid_transition(
                slot_entity_id(group_id, &user_id),
                "not_member",
                "leave",
            ));
        }
        info!("[Group] {} 退出群 {}", user_id, group_id);
        Ok(self.begin(
            group_id,
            &user_id,
            None,
            GroupAction::Leave {
                group_id: group_id.to_string(),
            },
        ))
    }

    fn ensure_free_slot(&self, group_id: &str, user_id: &str) -> SessionResult<()> {
        if self.slot(group_id, user_id).is_some() {
            warn!("[Group] 用户 {} 已是群 {} 成员或已被邀请", user_id, group_id);
            return Err(SessionError::AlreadyInvitedOrMember {
                group_id: group_id.to_string(),
                user_id: user_id.to_string(),
            });
        }
        Ok(())
    }

    fn begin(
        &mut self,
        group_id: &str,
        user_id: &str,
        new_slot: Option<MemberSlot>,
        action: GroupAction,
    ) -> GroupTransition {
        let previous = self.put_slot(group_id, user_id, new_slot.clone());
        self.next_op_id += 1;
        let op_id = self.next_op_id;
        self.pending_ops.insert(
            op_id,
            PendingGroupOp {
                group_id: group_id.to_string(),
                user_id: user_id.to_string(),
                previous,
                applied: new_slot,
            },
        );
        let notification = self.slot_notification(group_id, user_id, None);
        GroupTransition {
            op_id,
            action,
            notification,
        }
    }

    /// 出站请求完成；失败且槽位未被其他事件改写时回滚
    pub fn complete_action(&mut self, op_id: u64, result: Result<(), String>) -> Option<Notification> {
        let op = match self.pending_ops.remove(&op_id) {
            Some(op) => op,
            None => {
                debug!("[Group] 动作 op={} 已被远程事件取代", op_id);
                return None;
            }
        };
        match result {
            Ok(()) => {
                debug!(
                    "[Group] 动作 op={} 成功 (群 {} 用户 {})",
                    op_id, op.group_id, op.user_id
                );
                None
            }
            Err(reason) => {
                if self.slot(&op.group_id, &op.user_id) == op.applied.as_ref() {
                    self.put_slot(&op.group_id, &op.user_id, op.previous.clone());
                }
                warn!(
                    "[Group] 动作 op={} 失败，已回滚 (群 {} 用户 {}): {}",
                    op_id, op.group_id, op.user_id, reason
                );
                let view = self.view(&op.group_id, &op.user_id);
                Some(Notification::action_failed(
                    Self::entity_type_for(&view.status, op.applied.as_ref()),
                    slot_entity_id(&op.group_id, &op.user_id),
                    reason,
                    &view,
                ))
            }
        }
    }

    /// 应用服务器下发的群组事件
    pub fn apply_remote_event(&mut self, event: &GroupEvent) -> ApplyOutcome {
        match event {
            GroupEvent::InvitationChanged {
                invitation,
                updated_at,
            } => self.apply_invitation(invitation, *updated_at),
            GroupEvent::MemberRemoved(removed) => self.apply_member_removed(removed),
            GroupEvent::GroupInfoChanged(info) => self.apply_group_info(info),
        }
    }

    fn apply_invitation(&mut self, invitation: &Invitation, updated_at: i64) -> ApplyOutcome {
        let id = &invitation.invitation_id;
        if self.resolved.contains_key(id) {
            debug!("[Group] 邀请 {} 已结束，丢弃重复事件", id);
            return ApplyOutcome::Duplicate;
        }
        let (group_id, user_id) = (&invitation.group_id, &invitation.user_id);
        let current = self.slot(group_id, user_id).cloned();

        let new_slot = match invitation.status {
            InvitationStatus::Pending => match &current {
                Some(MemberSlot::Invited { invitation: known }) if known.invitation_id == *id => {
                    return ApplyOutcome::Duplicate;
                }
                Some(MemberSlot::Member { .. }) => {
                    warn!(
                        "[Group] 用户 {} 已是群 {} 成员，忽略待处理邀请 {}",
                        user_id, group_id, id
                    );
                    return ApplyOutcome::Duplicate;
                }
                _ => Some(MemberSlot::Invited {
                    invitation: invitation.clone(),
                }),
            },
            InvitationStatus::Accepted => Some(MemberSlot::Member {
                membership: Membership {
                    group_id: group_id.clone(),
                    user_id: user_id.clone(),
                    joined_at: updated_at,
                },
            }),
            // 成员身份若来自尚未确认的本地接受，则一并撤销
            InvitationStatus::Declined => match &current {
                Some(MemberSlot::Member { .. }) if !self.has_pending_op(group_id, user_id) => {
                    current.clone()
                }
                _ => None,
            },
        };
        if invitation.status != InvitationStatus::Pending {
            self.resolved.insert(id.clone(), invitation.status);
        }

        let optimistic = self.supersede_pending(group_id, user_id);
        self.put_slot(group_id, user_id, new_slot);
        info!(
            "[Group] 邀请 {} -> {:?} (群 {} 用户 {})",
            id, invitation.status, group_id, user_id
        );
        ApplyOutcome::Applied(vec![self.slot_notification(group_id, user_id, optimistic)])
    }

    fn apply_member_removed(&mut self, removed: &MemberRemovedEvent) -> ApplyOutcome {
        let (group_id, user_id) = (&removed.group_id, &removed.user_id);
        if !self.is_member(group_id, user_id) && !self.has_pending_op(group_id, user_id) {
            return ApplyOutcome::Duplicate;
        }
        // 早于本次入群的移除事件是旧的重复投递
        if let Some(MemberSlot::Member { membership }) = self.slot(group_id, user_id) {
            if removed.removed_at < membership.joined_at {
                debug!(
                    "[Group] 丢弃过期移除事件 群 {} 用户 {} (removedAt={}, joinedAt={})",
                    group_id, user_id, removed.removed_at, membership.joined_at
                );
                return ApplyOutcome::Duplicate;
            }
        }
        let optimistic = self.supersede_pending(group_id, user_id);
        self.put_slot(group_id, user_id, None);
        info!("[Group] 用户 {} 已离开群 {}", user_id, group_id);
        ApplyOutcome::Applied(vec![self.slot_notification(group_id, user_id, optimistic)])
    }

    fn apply_group_info(&mut self, info: &GroupInfo) -> ApplyOutcome {
        let state = self.groups.entry(info.group_id.clone()).or_default();
        if let Some(existing) = &state.info {
            if existing.update_time >= info.update_time {
                return ApplyOutcome::Duplicate;
            }
        }
        state.info = Some(info.clone());
        debug!("[Group] 群 {} 信息已更新", info.group_id);
        ApplyOutcome::Applied(vec![Notification::committed(
            EntityType::Group,
            info.group_id.clone(),
            info,
        )])
    }

    /// 移除该槽位上所有未确认的本地动作，返回最后一次乐观写入的槽位
    fn supersede_pending(&mut self, group_id: &str, user_id: &str) -> Option<Option<MemberSlot>> {
        let mut ids: Vec<u64> = self
            .pending_ops
            .iter()
            .filter(|(_, op)| op.group_id == group_id && op.user_id == user_id)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        let mut last = None;
        for id in ids {
            if let Some(op) = self.pending_ops.remove(&id) {
                last = Some(op.applied);
            }
        }
        last
    }

    fn has_pending_op(&self, group_id: &str, user_id: &str) -> bool {
        self.pending_ops
            .values()
            .any(|op| op.group_id == group_id && op.user_id == user_id)
    }

    /// 生成槽位通知；`optimistic` 为被覆盖的乐观槽位（存在且种类不同则为 reconciliation）
    fn slot_notification(
        &self,
        group_id: &str,
        user_id: &str,
        optimistic: Option<Option<MemberSlot>>,
    ) -> Notification {
        let view = self.view(group_id, user_id);
        let entity_id = slot_entity_id(group_id, user_id);
        let current = self.slot(group_id, user_id);
        let entity_type = Self::entity_type_for(&view.status, None);
        match optimistic {
            Some(applied) if slot_kind(applied.as_ref()) != slot_kind(current) => {
                info!(
                    "[Group] 远程状态覆盖本地乐观状态 {}: {} -> {}",
                    entity_id,
                    slot_kind(applied.as_ref()),
                    slot_kind(current)
                );
                let previous = MembershipStatus::from(applied.as_ref());
                Notification::reconciled(entity_type, entity_id, &previous, &view)
            }
            _ => Notification::committed(entity_type, entity_id, &view),
        }
    }

    fn entity_type_for(status: &MembershipStatus, applied: Option<&MemberSlot>) -> EntityType {
        match (status, applied) {
            (MembershipStatus::Member { .. }, _) | (_, Some(MemberSlot::Member { .. })) => {
                EntityType::Membership
            }
            _ => EntityType::Invitation,
        }
    }

    fn put_slot(&mut self, group_id: &str, user_id: &str, slot: Option<MemberSlot>) -> Option<MemberSlot> {
        let state = self.groups.entry(group_id.to_string()).or_default();
        match slot {
            Some(slot) => state.slots.insert(user_id.to_string(), slot),
            None => state.slots.remove(user_id),
        }
    }

    fn slot(&self, group_id: &str, user_id: &str) -> Option<&MemberSlot> {
        self.groups.get(group_id)?.slots.get(user_id)
    }

    fn find_invitation(&self, invitation_id: &str) -> Option<&Invitation> {
        self.groups
            .values()
            .flat_map(|g| g.slots.values())
            .find_map(|slot| match slot {
                MemberSlot::Invited { invitation } if invitation.invitation_id == invitation_id => {
                    Some(invitation)
                }
                _ => None,
            })
    }

    fn view(&self, group_id: &str, user_id: &str) -> MembershipView {
        MembershipView {
            group_id: group_id.to_string(),
            user_id: user_id.to_string(),
            status: self.membership_of(group_id, user_id),
        }
    }

    /// 群成员列表（按入群时间排序）
    pub fn list_members(&self, group_id: &str) -> Vec<Membership> {
        let mut members: Vec<Membership> = self
            .groups
            .get(group_id)
            .map(|g| {
                g.slots
                    .values()
                    .filter_map(|slot| match slot {
                        MemberSlot::Member { membership } => Some(membership.clone()),
                        MemberSlot::Invited { .. } => None,
                    })
                    .collect()
            })
            .unwrap_or_default();
        members.sort_by(|a, b| {
            a.joined_at
                .cmp(&b.joined_at)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        members
    }

    pub fn is_member(&self, group_id: &str, user_id: &str) -> bool {
        matches!(self.slot(group_id, user_id), Some(MemberSlot::Member { .. }))
    }

    /// 成员身份查询，非成员返回 `NotMember`
    pub fn membership_of(&self, group_id: &str, user_id: &str) -> MembershipStatus {
        MembershipStatus::from(self.slot(group_id, user_id))
    }

    /// 某用户所有待处理的邀请/申请
    pub fn pending_invitations_for(&self, user_id: &str) -> Vec<Invitation> {
        let mut list: Vec<Invitation> = self
            .groups
            .values()
            .filter_map(|g| match g.slots.get(user_id) {
                Some(MemberSlot::Invited { invitation }) => Some(invitation.clone()),
                _ => None,
            })
            .collect();
        list.sort_by_key(|i| i.created_at);
        list
    }

    pub fn group_info(&self, group_id: &str) -> Option<&GroupInfo> {
        self.groups.get(group_id)?.info.as_ref()
    }

    pub fn is_group_owner(&self, group_id: &str, user_id: &str) -> bool {
        self.group_info(group_id)
            .map(|info| info.creator_user_id == user_id)
            .unwrap_or(false)
    }
}

fn slot_kind(slot: Option<&MemberSlot>) -> &'static str {
    match slot {
        Some(MemberSlot::Member { .. }) => "member",
        Some(MemberSlot::Invited { .. }) => "invited",
        None => "none",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::im::types::NotificationKind;

    fn remote_invitation(id: &str, group: &str, user: &str, status: InvitationStatus, at: i64) -> GroupEvent {
        GroupEvent::InvitationChanged {
            invitation: Invitation {
                invitation_id: id.to_string(),
                group_id: group.to_string(),
                user_id: user.to_string(),
                inviter_user_id: Some("alice".to_string()),
                kind: InvitationKind::Invite,
                status,
                created_at: 1,
            },
            updated_at: at,
        }
    }

    fn group_info(group: &str, owner: &str, at: i64) -> GroupEvent {
        GroupEvent::GroupInfoChanged(GroupInfo {
            group_id: group.to_string(),
            creator_user_id: owner.to_string(),
            title: "hiking".to_string(),
            description: String::new(),
            image_url: String::new(),
            create_time: 1,
            update_time: at,
        })
    }

    /// 通知中不能同时出现邀请和成员记录，也不能二者皆无（除非明确为 not_member）
    fn assert_exclusive(n: &Notification) {
        let state = &n.new_state;
        let has_invitation = state.get("invitation").is_some();
        let has_membership = state.get("membership").is_some();
        assert!(!(has_invitation && has_membership), "both present: {}", state);
        if !has_invitation && !has_membership {
            assert_eq!(state["status"], "not_member");
        }
    }

    #[test]
    fn accepting_invitation_swaps_slot_atomically() {
        let mut m = GroupMembershipManager::new("bob");
        let out = m.apply_remote_event(&remote_invitation("inv-1", "g1", "bob", InvitationStatus::Pending, 10));
        for n in out.notifications() {
            assert_exclusive(&n);
        }
        assert!(!m.is_member("g1", "bob"));
        assert_eq!(m.pending_invitations_for("bob").len(), 1);

        let t = m.respond_to_invitation("inv-1", true, 20).unwrap();
        assert_exclusive(&t.notification);
        assert_eq!(t.notification.entity_type, EntityType::Membership);
        assert!(m.is_member("g1", "bob"));
        assert!(m.pending_invitations_for("bob").is_empty());
        assert!(matches!(
            m.membership_of("g1", "bob"),
            MembershipStatus::Member { .. }
        ));
        assert_eq!(m.list_members("g1").len(), 1);
    }

    #[test]
    fn duplicate_invite_is_rejected() {
        let mut m = GroupMembershipManager::new("alice");
        m.invite("g1", "bob", "alice", 1).unwrap();
        let err = m.invite("g1", "bob", "alice", 2).unwrap_err();
        assert!(matches!(err, SessionError::AlreadyInvitedOrMember { .. }));

        // 已是成员同样拒绝
        m.apply_remote_event(&remote_invitation("inv-9", "g2", "bob", InvitationStatus::Accepted, 3));
        assert!(matches!(
            m.invite("g2", "bob", "alice", 4),
            Err(SessionError::AlreadyInvitedOrMember { .. })
        ));
    }

    #[test]
    fn non_member_query_returns_not_member() {
        let m = GroupMembershipManager::new("alice");
        assert_eq!(m.membership_of("g1", "zed"), MembershipStatus::NotMember);
        assert!(!m.is_member("g1", "zed"));
        assert!(m.list_members("g1").is_empty());
    }

    #[test]
    fn decline_clears_slot_and_allows_new_invite() {
        let mut m = GroupMembershipManager::new("bob");
        m.apply_remote_event(&remote_invitation("inv-1", "g1", "bob", InvitationStatus::Pending, 10));
        let t = m.respond_to_invitation("inv-1", false, 11).unwrap();
        assert_eq!(t.notification.new_state["status"], "not_member");
        assert_eq!(m.membership_of("g1", "bob"), MembershipStatus::NotMember);

        m.apply_remote_event(&remote_invitation("inv-2", "g1", "bob", InvitationStatus::Pending, 12));
        assert_eq!(m.pending_invitations_for("bob").len(), 1);
    }

    #[test]
    fn failed_accept_rolls_back_to_invitation() {
        let mut m = GroupMembershipManager::new("bob");
        m.apply_remote_event(&remote_invitation("inv-1", "g1", "bob", InvitationStatus::Pending, 10));
        let t = m.respond_to_invitation("inv-1", true, 11).unwrap();
        assert!(m.is_member("g1", "bob"));

        let n = m.complete_action(t.op_id, Err("503".to_string())).unwrap();
        assert!(n.is_failure());
        assert_exclusive(&n);
        assert!(!m.is_member("g1", "bob"));
        assert_eq!(m.pending_invitations_for("bob")[0].invitation_id, "inv-1");
    }

    #[test]
    fn failed_invite_frees_slot() {
        let mut m = GroupMembershipManager::new("alice");
        let t = m.invite("g1", "bob", "alice", 1).unwrap();
        m.complete_action(t.op_id, Err("timeout".to_string()));
        assert_eq!(m.membership_of("g1", "bob"), MembershipStatus::NotMember);
        assert!(m.invite("g1", "bob", "alice", 2).is_ok());
    }

    #[test]
    fn redelivered_invitation_events_are_duplicates() {
        let mut m = GroupMembershipManager::new("bob");
        let pending = remote_invitation("inv-1", "g1", "bob", InvitationStatus::Pending, 10);
        let accepted = remote_invitation("inv-1", "g1", "bob", InvitationStatus::Accepted, 20);
        assert!(!m.apply_remote_event(&pending).is_duplicate());
        assert!(m.apply_remote_event(&pending).is_duplicate());
        assert!(!m.apply_remote_event(&accepted).is_duplicate());
        assert!(m.apply_remote_event(&accepted).is_duplicate());
        // 已结束的邀请再次以 pending 投递也不会回退
        assert!(m.apply_remote_event(&pending).is_duplicate());
        assert!(m.is_member("g1", "bob"));
        assert_eq!(m.list_members("g1")[0].joined_at, 20);
    }

    #[test]
    fn remote_decline_overrides_local_accept() {
        let mut m = GroupMembershipManager::new("bob");
        m.apply_remote_event(&remote_invitation("inv-1", "g1", "bob", InvitationStatus::Pending, 10));
        let t = m.respond_to_invitation("inv-1", true, 11).unwrap();

        let out = m.apply_remote_event(&remote_invitation("inv-1", "g1", "bob", InvitationStatus::Declined, 12));
        let n = out.notifications();
        assert!(matches!(n[0].kind, NotificationKind::Reconciled { .. }));
        assert!(!m.is_member("g1", "bob"));
        // 迟到的回执被忽略
        assert!(m.complete_action(t.op_id, Ok(())).is_none());
    }

    #[test]
    fn join_request_is_handled_by_owner() {
        let mut owner = GroupMembershipManager::new("alice");
        owner.apply_remote_event(&group_info("g1", "alice", 1));
        assert!(owner.is_group_owner("g1", "alice"));

        let request = Invitation {
            invitation_id: "req-1".to_string(),
            group_id: "g1".to_string(),
            user_id: "carol".to_string(),
            inviter_user_id: None,
            kind: InvitationKind::JoinRequest,
            status: InvitationStatus::Pending,
            created_at: 2,
        };
        owner.apply_remote_event(&GroupEvent::InvitationChanged {
            invitation: request,
            updated_at: 2,
        });
        owner.respond_to_invitation("req-1", true, 3).unwrap();
        assert!(owner.is_member("g1", "carol"));

        // 非群主无权处理入群申请
        let mut carol = GroupMembershipManager::new("carol");
        let t = carol.request_to_join("g2", 5).unwrap();
        let id = match &t.action {
            GroupAction::RequestToJoin(inv) => inv.invitation_id.clone(),
            other => panic!("unexpected action {:?}", other),
        };
        assert!(matches!(
            carol.respond_to_invitation(&id, true, 6),
            Err(SessionError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn leave_and_member_removed() {
        let mut m = GroupMembershipManager::new("bob");
        m.apply_remote_event(&remote_invitation("inv-1", "g1", "bob", InvitationStatus::Accepted, 10));
        assert!(m.leave_group("g2").is_err());
        m.leave_group("g1").unwrap();
        assert!(!m.is_member("g1", "bob"));

        // 服务器确认移除
        let removed = GroupEvent::MemberRemoved(MemberRemovedEvent {
            group_id: "g1".to_string(),
            user_id: "bob".to_string(),
            removed_at: 12,
        });
        let out = m.apply_remote_event(&removed);
        assert!(!out.is_duplicate());
        assert!(m.apply_remote_event(&removed).is_duplicate());
    }

    #[test]
    fn stale_removal_does_not_evict_rejoined_member() {
        let mut m = GroupMembershipManager::new("bob");
        m.apply_remote_event(&remote_invitation("inv-1", "g1", "bob", InvitationStatus::Accepted, 10));
        let removed = GroupEvent::MemberRemoved(MemberRemovedEvent {
            group_id: "g1".to_string(),
            user_id: "bob".to_string(),
            removed_at: 20,
        });
        assert!(!m.apply_remote_event(&removed).is_duplicate());
        assert!(!m.is_member("g1", "bob"));

        m.apply_remote_event(&remote_invitation("inv-2", "g1", "bob", InvitationStatus::Accepted, 30));
        assert!(m.is_member("g1", "bob"));

        // 旧的移除事件再次投递
        assert!(m.apply_remote_event(&removed).is_duplicate());
        assert!(m.is_member("g1", "bob"));
        assert_eq!(m.list_members("g1")[0].joined_at, 30);
    }

    #[test]
    fn stale_group_info_is_ignored() {
        let mut m = GroupMembershipManager::new("bob");
        assert!(!m.apply_remote_event(&group_info("g1", "alice", 5)).is_duplicate());
        assert!(m.apply_remote_event(&group_info("g1", "mallory", 4)).is_duplicate());
        assert_eq!(m.group_info("g1").unwrap().creator_user_id, "alice");
    }
}
