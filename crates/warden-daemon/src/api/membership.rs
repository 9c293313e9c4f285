//! `membership_create` / `membership_delete`: group membership management.
//!
//! Both mutations audit against the owning **group** with a
//! `GROUP_MEMBERSHIP_CHANGED` mask and full before/after group snapshots, so
//! the audit trail of a group tells the whole story of its member list.

use serde_json::{json, Value};

use warden_core::audit::{self, AuditTarget};
use warden_core::serialize::{serialize_group, serialize_membership};
use warden_core::{
    Action, ApiError, ApiResult, EventMask, GroupId, GroupRank, MembershipId, PolicyQuery,
    SecurityContext, StoreRead, UserId,
};

use super::{require_i64, MethodHandler};
use crate::conditions::{Condition, Denial, Guard};
use crate::context::RequestContext;

/// Handler for `membership_create`.
pub struct MembershipCreate {
    guard: Guard,
    user_id: UserId,
    group_id: GroupId,
    rank: GroupRank,
}

impl MembershipCreate {
    /// Factory. Requires `user_id` and `group_id`; `rank` defaults to
    /// member.
    pub fn create(
        _ctx: &RequestContext,
        content: &Value,
    ) -> Result<Box<dyn MethodHandler>, ApiError> {
        let user_id = require_i64(content, "user_id")?;
        let group_id = require_i64(content, "group_id")?;
        let rank = match content.get("rank") {
            None => GroupRank::Member,
            Some(value) => value
                .as_i64()
                .and_then(GroupRank::from_i64)
                .ok_or_else(|| ApiError::malformed("invalid `rank` field"))?,
        };
        Ok(Box::new(Self {
            guard: Guard::new()
                .require(Denial::PermissionDenied, vec![Condition::Authenticated])
                .require(
                    Denial::PermissionDenied,
                    vec![Condition::Permitted(Action::GroupManageMembership {
                        group_id,
                    })],
                ),
            user_id,
            group_id,
            rank,
        }))
    }
}

impl MethodHandler for MembershipCreate {
    fn guard(&self) -> &Guard {
        &self.guard
    }

    fn process(&self, ctx: &RequestContext) -> ApiResult<Value> {
        ctx.db.transaction(|tx| {
            tx.find_user(self.user_id)?
                .ok_or(ApiError::not_found("user", self.user_id))?;
            let mut group = tx
                .find_group(self.group_id)?
                .ok_or(ApiError::not_found("group", self.group_id))?;
            if tx.group_rank(self.user_id, self.group_id)?.is_some() {
                return Err(ApiError::model(
                    "data/relationships/user",
                    "user is already a member of this group",
                ));
            }

            let mut event = audit::begin_event(tx, AuditTarget::Group(group.id), ctx.actor());
            event.event_mask(EventMask::GROUP_MEMBERSHIP_CHANGED);
            event.before(serialize_group(&group, &SecurityContext::System, tx)?);

            let membership = tx.add_membership(self.user_id, self.group_id, self.rank)?;
            group.members.push(membership);

            event.after(serialize_group(&group, &SecurityContext::System, tx)?);
            event.finalize()?;

            Ok(json!({"data": serialize_membership(&membership)}))
        })
    }
}

/// Handler for `membership_delete`.
pub struct MembershipDelete {
    guard: Guard,
    membership_id: MembershipId,
}

impl MembershipDelete {
    /// Factory. Requires a `membership_id` field. The fine-grained
    /// membership-management check runs inside the transaction, once the
    /// owning group is known.
    pub fn create(
        _ctx: &RequestContext,
        content: &Value,
    ) -> Result<Box<dyn MethodHandler>, ApiError> {
        let membership_id = require_i64(content, "membership_id")?;
        Ok(Box::new(Self {
            guard: Guard::new()
                .require(Denial::PermissionDenied, vec![Condition::Authenticated]),
            membership_id,
        }))
    }
}

impl MethodHandler for MembershipDelete {
    fn guard(&self) -> &Guard {
        &self.guard
    }

    fn process(&self, ctx: &RequestContext) -> ApiResult<Value> {
        let sc = ctx.security();
        ctx.db.transaction(|tx| {
            let membership = tx
                .find_membership(self.membership_id)?
                .ok_or(ApiError::not_found("membership", self.membership_id))?;

            let manage = Action::GroupManageMembership {
                group_id: membership.group_id,
            };
            if !sc.check_permission(tx, &manage)? {
                return Err(ApiError::PermissionDenied);
            }

            let mut group = tx
                .find_group(membership.group_id)?
                .ok_or(ApiError::not_found("group", membership.group_id))?;

            let mut event = audit::begin_event(tx, AuditTarget::Group(group.id), ctx.actor());
            event.event_mask(EventMask::GROUP_MEMBERSHIP_CHANGED);
            event.before(serialize_group(&group, &SecurityContext::System, tx)?);

            tx.remove_membership(membership.id)?;
            group.members.retain(|m| m.id != membership.id);

            event.after(serialize_group(&group, &SecurityContext::System, tx)?);
            event.finalize()?;

            Ok(json!({"status": 0}))
        })
    }
}
