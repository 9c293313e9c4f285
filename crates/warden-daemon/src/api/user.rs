//! `user_get` / `user_put`: user inspection and mutation.

use serde_json::{json, Value};

use warden_core::audit::{self, AuditTarget};
use warden_core::serialize::{serialize_user, unserialize_user};
use warden_core::{
    Action, ApiError, ApiResult, EventMask, SecurityContext, StoreRead, User, UserId,
};

use super::{require_i64, MethodHandler};
use crate::conditions::{Condition, Denial, Guard};
use crate::context::RequestContext;

/// Handler for `user_get`.
pub struct UserGet {
    guard: Guard,
    user_id: UserId,
}

impl UserGet {
    /// Factory. Requires a `user_id` field.
    pub fn create(
        _ctx: &RequestContext,
        content: &Value,
    ) -> Result<Box<dyn MethodHandler>, ApiError> {
        let user_id = require_i64(content, "user_id")?;
        Ok(Box::new(Self {
            guard: Guard::new().require(
                Denial::PermissionDenied,
                vec![Condition::Permitted(Action::UserRead { user_id })],
            ),
            user_id,
        }))
    }
}

impl MethodHandler for UserGet {
    fn guard(&self) -> &Guard {
        &self.guard
    }

    fn process(&self, ctx: &RequestContext) -> ApiResult<Value> {
        let user = ctx
            .db
            .find_user(self.user_id)?
            .ok_or(ApiError::not_found("user", self.user_id))?;
        let doc = serialize_user(&user, &ctx.security(), ctx.db.as_ref())?;
        Ok(json!({"data": doc}))
    }
}

/// Handler for `user_put`: creates when `user_id == 0`, edits otherwise.
pub struct UserPut {
    guard: Guard,
    user_id: UserId,
    /// `None` for edits; creation requires a username up front.
    username: Option<String>,
    attributes: Value,
}

impl UserPut {
    /// Factory. Requires `user_id` and an `attributes` object; creation
    /// additionally requires `attributes.username`.
    pub fn create(
        _ctx: &RequestContext,
        content: &Value,
    ) -> Result<Box<dyn MethodHandler>, ApiError> {
        let user_id = require_i64(content, "user_id")?;
        let attributes = content.get("attributes").cloned().unwrap_or(Value::Null);
        let well_formed = attributes.is_object();

        let username = if user_id == 0 && well_formed {
            Some(super::require_str(&attributes, "username")?)
        } else {
            None
        };

        let permission = if user_id == 0 {
            Action::UserCreate
        } else {
            Action::UserUpdate { user_id }
        };

        Ok(Box::new(Self {
            guard: Guard::new()
                .require(
                    Denial::Malformed("no `attributes` subobject"),
                    vec![Condition::WellFormed(well_formed)],
                )
                .require(
                    Denial::PermissionDenied,
                    vec![Condition::Permitted(permission)],
                ),
            user_id,
            username,
            attributes,
        }))
    }

    fn create_user(&self, ctx: &RequestContext) -> ApiResult<Value> {
        let username = self
            .username
            .clone()
            .ok_or_else(|| ApiError::malformed("missing `username` field"))?;
        let sc = ctx.security();
        ctx.db.transaction(|tx| {
            if tx.find_user_by_username(&username)?.is_some() {
                return Err(ApiError::model(
                    "data/attributes/username",
                    format!("A user named {username} already exists."),
                ));
            }
            let mut user = User::new(&username);
            unserialize_user(&mut user, &self.attributes, &sc, tx)?;
            tx.persist_user(&mut user)?;

            let mut event = audit::begin_event(tx, AuditTarget::User(user.id), ctx.actor());
            event.event_mask(EventMask::USER_CREATED);
            event.after(serialize_user(&user, &SecurityContext::System, tx)?);
            event.finalize()?;

            Ok(json!({"data": serialize_user(&user, &sc, tx)?}))
        })
    }

    fn edit_user(&self, ctx: &RequestContext) -> ApiResult<Value> {
        let sc = ctx.security();
        ctx.db.transaction(|tx| {
            let mut user = tx
                .find_user(self.user_id)?
                .ok_or(ApiError::not_found("user", self.user_id))?;

            let mut event = audit::begin_event(tx, AuditTarget::User(user.id), ctx.actor());
            event.event_mask(EventMask::USER_EDITED);
            event.before(serialize_user(&user, &SecurityContext::System, tx)?);

            unserialize_user(&mut user, &self.attributes, &sc, tx)?;
            tx.update_user(&mut user)?;

            event.after(serialize_user(&user, &SecurityContext::System, tx)?);
            event.finalize()?;

            Ok(json!({"data": serialize_user(&user, &sc, tx)?}))
        })
    }
}

impl MethodHandler for UserPut {
    fn guard(&self) -> &Guard {
        &self.guard
    }

    fn process(&self, ctx: &RequestContext) -> ApiResult<Value> {
        if self.user_id == 0 {
            self.create_user(ctx)
        } else {
            self.edit_user(ctx)
        }
    }
}
