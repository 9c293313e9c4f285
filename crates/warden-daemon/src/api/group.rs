//! `group_get` / `group_put` / `group_delete`: group lifecycle.
//!
//! `group_put` with `group_id == 0` creates the group and immediately adds
//! the creating actor as its admin, producing two audit events in the same
//! transaction (creation, then membership change). Name uniqueness is
//! validated inside that transaction by id comparison, so an edit that keeps
//! the group's own name never self-collides.

use serde_json::{json, Value};

use warden_core::audit::{self, AuditTarget};
use warden_core::serialize::{serialize_group, unserialize_group};
use warden_core::{
    Action, ApiError, ApiResult, EventMask, Group, GroupId, GroupRank, SecurityContext, StoreRead,
};

use super::{optional_str, require_i64, MethodHandler};
use crate::conditions::{Condition, Denial, Guard};
use crate::context::RequestContext;

/// Handler for `group_get`.
pub struct GroupGet {
    guard: Guard,
    group_id: GroupId,
}

impl GroupGet {
    /// Factory. Requires a `group_id` field.
    pub fn create(
        _ctx: &RequestContext,
        content: &Value,
    ) -> Result<Box<dyn MethodHandler>, ApiError> {
        let group_id = require_i64(content, "group_id")?;
        Ok(Box::new(Self {
            guard: Guard::new().require(
                Denial::PermissionDenied,
                vec![Condition::Permitted(Action::GroupRead { group_id })],
            ),
            group_id,
        }))
    }
}

impl MethodHandler for GroupGet {
    fn guard(&self) -> &Guard {
        &self.guard
    }

    fn process(&self, ctx: &RequestContext) -> ApiResult<Value> {
        let group = ctx
            .db
            .find_group(self.group_id)?
            .ok_or(ApiError::not_found("group", self.group_id))?;
        let doc = serialize_group(&group, &ctx.security(), ctx.db.as_ref())?;
        Ok(json!({"data": doc}))
    }
}

/// Handler for `group_put`: creates when `group_id == 0`, edits otherwise.
pub struct GroupPut {
    guard: Guard,
    group_id: GroupId,
    name: Option<String>,
    description: String,
}

impl GroupPut {
    /// Factory. Requires `group_id` and an `attributes` object carrying
    /// `name`.
    pub fn create(
        _ctx: &RequestContext,
        content: &Value,
    ) -> Result<Box<dyn MethodHandler>, ApiError> {
        let group_id = require_i64(content, "group_id")?;
        let attributes = content.get("attributes").cloned().unwrap_or(Value::Null);
        let well_formed = attributes.is_object();

        let (name, description) = if well_formed {
            (
                Some(super::require_str(&attributes, "name")?),
                optional_str(&attributes, "description", ""),
            )
        } else {
            (None, String::new())
        };

        Ok(Box::new(Self {
            guard: Guard::new()
                .require(Denial::PermissionDenied, vec![Condition::Authenticated])
                .require(
                    Denial::Malformed("no `attributes` subobject"),
                    vec![Condition::WellFormed(well_formed)],
                )
                .require(
                    Denial::PermissionDenied,
                    vec![
                        Condition::TargetIsNewGroup { group_id },
                        Condition::ActorInGroup {
                            group_id,
                            at_least: GroupRank::Admin,
                        },
                        Condition::ActorIsAdmin,
                    ],
                ),
            group_id,
            name,
            description,
        }))
    }

    fn name(&self) -> ApiResult<&str> {
        self.name
            .as_deref()
            .ok_or_else(|| ApiError::malformed("missing `name` field"))
    }

    fn create_group(&self, ctx: &RequestContext) -> ApiResult<Value> {
        let actor = ctx.actor().ok_or(ApiError::PermissionDenied)?;
        let name = self.name()?;
        let sc = ctx.security();
        ctx.db.transaction(|tx| {
            let mut group = Group::new(name, &*self.description);
            tx.ensure_group_name_free(&group)?;
            tx.persist_group(&mut group)?;

            let mut created = audit::begin_event(tx, AuditTarget::Group(group.id), Some(actor));
            created.event_mask(EventMask::GROUP_CREATED);
            created.after(serialize_group(&group, &SecurityContext::System, tx)?);
            created.finalize()?;

            // The creating actor becomes the group's first admin.
            let mut joined = audit::begin_event(tx, AuditTarget::Group(group.id), Some(actor));
            joined.event_mask(EventMask::GROUP_MEMBERSHIP_CHANGED);
            joined.before(serialize_group(&group, &SecurityContext::System, tx)?);

            let membership = tx.add_membership(actor, group.id, GroupRank::Admin)?;
            group.members.push(membership);
            tx.update_group(&mut group)?;

            joined.after(serialize_group(&group, &SecurityContext::System, tx)?);
            joined.finalize()?;

            Ok(json!({"data": serialize_group(&group, &sc, tx)?}))
        })
    }

    fn edit_group(&self, ctx: &RequestContext) -> ApiResult<Value> {
        let name = self.name()?;
        let sc = ctx.security();
        ctx.db.transaction(|tx| {
            let mut group = tx
                .find_group(self.group_id)?
                .ok_or(ApiError::not_found("group", self.group_id))?;

            let mut event = audit::begin_event(tx, AuditTarget::Group(group.id), ctx.actor());
            event.event_mask(EventMask::GROUP_UPDATED);
            event.before(serialize_group(&group, &SecurityContext::System, tx)?);

            unserialize_group(
                &mut group,
                &json!({"name": name, "description": &self.description}),
            );
            tx.ensure_group_name_free(&group)?;
            tx.update_group(&mut group)?;

            event.after(serialize_group(&group, &SecurityContext::System, tx)?);
            event.finalize()?;

            Ok(json!({"data": serialize_group(&group, &sc, tx)?}))
        })
    }
}

impl MethodHandler for GroupPut {
    fn guard(&self) -> &Guard {
        &self.guard
    }

    fn process(&self, ctx: &RequestContext) -> ApiResult<Value> {
        if self.group_id == 0 {
            self.create_group(ctx)
        } else {
            self.edit_group(ctx)
        }
    }
}

/// Handler for `group_delete`.
pub struct GroupDelete {
    guard: Guard,
    group_id: GroupId,
}

impl GroupDelete {
    /// Factory. Requires a `group_id` field; only group admins and system
    /// admins pass.
    pub fn create(
        _ctx: &RequestContext,
        content: &Value,
    ) -> Result<Box<dyn MethodHandler>, ApiError> {
        let group_id = require_i64(content, "group_id")?;
        Ok(Box::new(Self {
            guard: Guard::new()
                .require(Denial::PermissionDenied, vec![Condition::Authenticated])
                .require(
                    Denial::PermissionDenied,
                    vec![
                        Condition::ActorInGroup {
                            group_id,
                            at_least: GroupRank::Admin,
                        },
                        Condition::ActorIsAdmin,
                    ],
                ),
            group_id,
        }))
    }
}

impl MethodHandler for GroupDelete {
    fn guard(&self) -> &Guard {
        &self.guard
    }

    fn process(&self, ctx: &RequestContext) -> ApiResult<Value> {
        ctx.db.transaction(|tx| {
            let group = tx
                .find_group(self.group_id)?
                .ok_or(ApiError::not_found("group", self.group_id))?;

            let mut event = audit::begin_event(tx, AuditTarget::Group(group.id), ctx.actor());
            event.event_mask(EventMask::GROUP_DELETED);
            event.before(serialize_group(&group, &SecurityContext::System, tx)?);

            tx.delete_group(group.id)?;
            event.finalize()?;

            Ok(json!({"status": 0}))
        })
    }
}
