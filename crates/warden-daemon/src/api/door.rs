//! `door_get` / `door_put` / `door_delete`: door lifecycle.

use serde_json::{json, Value};

use warden_core::audit::{self, AuditTarget};
use warden_core::serialize::{serialize_door, unserialize_door};
use warden_core::{Action, ApiError, ApiResult, Door, DoorId, EventMask, StoreRead};

use super::{require_i64, MethodHandler};
use crate::conditions::{Condition, Denial, Guard};
use crate::context::RequestContext;

/// Handler for `door_get`.
pub struct DoorGet {
    guard: Guard,
    door_id: DoorId,
}

impl DoorGet {
    /// Factory. Requires a `door_id` field.
    pub fn create(
        _ctx: &RequestContext,
        content: &Value,
    ) -> Result<Box<dyn MethodHandler>, ApiError> {
        let door_id = require_i64(content, "door_id")?;
        Ok(Box::new(Self {
            guard: Guard::new().require(
                Denial::PermissionDenied,
                vec![Condition::Permitted(Action::DoorRead { door_id })],
            ),
            door_id,
        }))
    }
}

impl MethodHandler for DoorGet {
    fn guard(&self) -> &Guard {
        &self.guard
    }

    fn process(&self, ctx: &RequestContext) -> ApiResult<Value> {
        let door = ctx
            .db
            .find_door(self.door_id)?
            .ok_or(ApiError::not_found("door", self.door_id))?;
        Ok(json!({"data": serialize_door(&door)}))
    }
}

/// Handler for `door_put`: creates when `door_id == 0`, edits otherwise.
pub struct DoorPut {
    guard: Guard,
    door_id: DoorId,
    attributes: Value,
}

impl DoorPut {
    /// Factory. Requires `door_id` and an `attributes` object; creation
    /// additionally requires `attributes.alias`.
    pub fn create(
        _ctx: &RequestContext,
        content: &Value,
    ) -> Result<Box<dyn MethodHandler>, ApiError> {
        let door_id = require_i64(content, "door_id")?;
        let attributes = content.get("attributes").cloned().unwrap_or(Value::Null);
        let well_formed = attributes.is_object();
        if door_id == 0 && well_formed {
            super::require_str(&attributes, "alias")?;
        }

        let permission = if door_id == 0 {
            Action::DoorCreate
        } else {
            Action::DoorUpdate { door_id }
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
            door_id,
            attributes,
        }))
    }
}

impl MethodHandler for DoorPut {
    fn guard(&self) -> &Guard {
        &self.guard
    }

    fn process(&self, ctx: &RequestContext) -> ApiResult<Value> {
        if self.door_id == 0 {
            ctx.db.transaction(|tx| {
                let mut door = Door::new("", "");
                unserialize_door(&mut door, &self.attributes);

                tx.persist_door(&mut door)?;

                let mut event = audit::begin_event(tx, AuditTarget::Door(door.id), ctx.actor());
                event.event_mask(EventMask::DOOR_CREATED);
                event.after(serialize_door(&door));
                event.finalize()?;

                Ok(json!({"data": serialize_door(&door)}))
            })
        } else {
            ctx.db.transaction(|tx| {
                let mut door = tx
                    .find_door(self.door_id)?
                    .ok_or(ApiError::not_found("door", self.door_id))?;

                let mut event = audit::begin_event(tx, AuditTarget::Door(door.id), ctx.actor());
                event.event_mask(EventMask::DOOR_UPDATED);
                event.before(serialize_door(&door));

                unserialize_door(&mut door, &self.attributes);
                tx.update_door(&mut door)?;

                event.after(serialize_door(&door));
                event.finalize()?;

                Ok(json!({"data": serialize_door(&door)}))
            })
        }
    }
}

/// Handler for `door_delete`.
pub struct DoorDelete {
    guard: Guard,
    door_id: DoorId,
}

impl DoorDelete {
    /// Factory. Requires a `door_id` field; admin only.
    pub fn create(
        _ctx: &RequestContext,
        content: &Value,
    ) -> Result<Box<dyn MethodHandler>, ApiError> {
        let door_id = require_i64(content, "door_id")?;
        Ok(Box::new(Self {
            guard: Guard::new().require(
                Denial::PermissionDenied,
                vec![Condition::Permitted(Action::DoorDelete { door_id })],
            ),
            door_id,
        }))
    }
}

impl MethodHandler for DoorDelete {
    fn guard(&self) -> &Guard {
        &self.guard
    }

    fn process(&self, ctx: &RequestContext) -> ApiResult<Value> {
        ctx.db.transaction(|tx| {
            let door = tx
                .find_door(self.door_id)?
                .ok_or(ApiError::not_found("door", self.door_id))?;

            let mut event = audit::begin_event(tx, AuditTarget::Door(door.id), ctx.actor());
            event.event_mask(EventMask::DOOR_DELETED);
            event.before(serialize_door(&door));

            tx.delete_door(door.id)?;
            event.finalize()?;

            Ok(json!({"status": 0}))
        })
    }
}
