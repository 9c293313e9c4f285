//! Command handlers.
//!
//! Every RPC command is one [`MethodHandler`]: a small object created per
//! request by its factory, which parses the required fields out of the
//! payload (raising a malformed error when they are absent) and declares the
//! [`Guard`] gating execution. The dispatcher evaluates the guard and only
//! then calls [`MethodHandler::process`].
//!
//! `process` owns the request's side effects: it opens the store transaction,
//! performs reads and writes, records audit events through that transaction,
//! and returns the response content (typically the serialized post-mutation
//! entity, so the caller learns server-assigned ids). Any error aborts the
//! transaction; no partial entity or audit state survives.

use std::collections::HashMap;

use serde_json::Value;

use warden_core::{ApiError, ApiResult};

use crate::conditions::Guard;
use crate::context::RequestContext;

pub mod auth;
pub mod door;
pub mod group;
pub mod membership;
pub mod user;
pub mod version;

/// One RPC command's bound unit of authorization and execution.
pub trait MethodHandler {
    /// The precondition guard built by the factory.
    fn guard(&self) -> &Guard;

    /// Execute the command. Called only after the guard passed.
    ///
    /// # Errors
    ///
    /// Any [`ApiError`]; in-transaction failures roll the transaction back
    /// before the error reaches the dispatcher.
    fn process(&self, ctx: &RequestContext) -> ApiResult<Value>;
}

/// Builds a handler bound to the request, or fails with a malformed error.
pub type HandlerFactory =
    fn(&RequestContext, &Value) -> Result<Box<dyn MethodHandler>, ApiError>;

/// Register the full command set.
pub fn register_all(registry: &mut HashMap<&'static str, HandlerFactory>) {
    registry.insert("get_version", version::GetVersion::create);
    registry.insert("create_auth_token", auth::CreateAuthToken::create);
    registry.insert("authenticate_with_token", auth::AuthenticateWithToken::create);
    registry.insert("logout", auth::Logout::create);
    registry.insert("user_get", user::UserGet::create);
    registry.insert("user_put", user::UserPut::create);
    registry.insert("group_get", group::GroupGet::create);
    registry.insert("group_put", group::GroupPut::create);
    registry.insert("group_delete", group::GroupDelete::create);
    registry.insert("membership_create", membership::MembershipCreate::create);
    registry.insert("membership_delete", membership::MembershipDelete::create);
    registry.insert("door_get", door::DoorGet::create);
    registry.insert("door_put", door::DoorPut::create);
    registry.insert("door_delete", door::DoorDelete::create);
}

/// Extract a required integer field.
pub(crate) fn require_i64(content: &Value, key: &'static str) -> Result<i64, ApiError> {
    content
        .get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| ApiError::malformed(format!("missing `{key}` field")))
}

/// Extract a required string field.
pub(crate) fn require_str(content: &Value, key: &'static str) -> Result<String, ApiError> {
    content
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| ApiError::malformed(format!("missing `{key}` field")))
}

/// Extract an optional string field with a default.
pub(crate) fn optional_str(content: &Value, key: &str, default: &str) -> String {
    content
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_owned()
}
