//! Wire envelopes for the control plane.
//!
//! Inbound payloads are JSON objects `{cmd, uuid, content?}`; `content` is
//! optional and its absence is not an error. Outbound shapes:
//!
//! | outcome              | payload                                  |
//! |----------------------|------------------------------------------|
//! | success              | `{uuid, content}`                        |
//! | permission denied    | `{status: -2}`                           |
//! | malformed request    | `{status: -1, message}`                  |
//! | failed in store      | `{uuid, status: -3, message, path?}`     |
//! | unknown command      | `{}`                                     |
//!
//! Unknown commands are deliberately indistinguishable from a no-op so that
//! probing the command table produces no observable signal. Payloads that do
//! not decode to an envelope at all produce no reply.

use serde::Deserialize;
use serde_json::{json, Value};

use warden_core::ApiError;

/// Maximum accepted request size in bytes.
///
/// Requests longer than this are rejected by the framing layer before any
/// allocation proportional to the payload happens.
pub const MAX_REQUEST_BYTES: usize = 256 * 1024;

/// A decoded inbound request envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestEnvelope {
    /// Command name, e.g. `"group_put"`.
    pub cmd: String,
    /// Caller-chosen correlation id, echoed on success.
    pub uuid: String,
    /// Optional command payload.
    #[serde(default)]
    pub content: Option<Value>,
}

impl RequestEnvelope {
    /// Decode a raw text payload.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Malformed`] if the payload is not a JSON object
    /// with `cmd` and `uuid` strings.
    pub fn decode(raw: &str) -> Result<Self, ApiError> {
        serde_json::from_str(raw)
            .map_err(|err| ApiError::malformed(format!("invalid envelope: {err}")))
    }

    /// The command payload, or `Null` when absent.
    #[must_use]
    pub fn content(&self) -> &Value {
        static JSON_NULL: Value = Value::Null;
        self.content.as_ref().unwrap_or(&JSON_NULL)
    }
}

/// Encode a success reply.
#[must_use]
pub fn success(uuid: &str, content: Value) -> String {
    json!({"uuid": uuid, "content": content}).to_string()
}

/// Encode a permission denial. Carries no detail.
#[must_use]
pub fn permission_denied() -> String {
    json!({"status": -2}).to_string()
}

/// Encode a malformed-request rejection.
#[must_use]
pub fn malformed(message: &str) -> String {
    json!({"status": -1, "message": message}).to_string()
}

/// Encode an in-transaction failure (not-found, model violation, store).
#[must_use]
pub fn request_failed(uuid: &str, err: &ApiError) -> String {
    let mut reply = json!({"uuid": uuid, "status": -3, "message": err.to_string()});
    if let ApiError::Model { path, .. } = err {
        reply["path"] = json!(path);
    }
    reply.to_string()
}

/// Encode the unknown-command reply: an empty object.
#[must_use]
pub fn unknown_command() -> String {
    "{}".to_owned()
}

/// Map a request failure onto its wire shape.
#[must_use]
pub fn error_reply(uuid: &str, err: &ApiError) -> String {
    match err {
        ApiError::PermissionDenied => permission_denied(),
        ApiError::Malformed { reason } => malformed(reason),
        ApiError::NotFound { .. } | ApiError::Model { .. } | ApiError::Store(_) => {
            request_failed(uuid, err)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_with_and_without_content() {
        let with = RequestEnvelope::decode(r#"{"cmd":"user_get","uuid":"u1","content":{"user_id":3}}"#)
            .unwrap();
        assert_eq!(with.cmd, "user_get");
        assert_eq!(with.content()["user_id"], 3);

        let without = RequestEnvelope::decode(r#"{"cmd":"get_version","uuid":"u2"}"#).unwrap();
        assert!(without.content().is_null());
    }

    #[test]
    fn test_decode_rejects_missing_fields() {
        assert!(RequestEnvelope::decode(r#"{"uuid":"u1"}"#).is_err());
        assert!(RequestEnvelope::decode("not json").is_err());
    }

    #[test]
    fn test_denial_shape_carries_no_detail() {
        let reply: Value = serde_json::from_str(&permission_denied()).unwrap();
        assert_eq!(reply, json!({"status": -2}));
    }

    #[test]
    fn test_model_failure_carries_path() {
        let err = ApiError::model("data/attributes/name", "duplicate");
        let reply: Value = serde_json::from_str(&request_failed("u3", &err)).unwrap();
        assert_eq!(reply["status"], -3);
        assert_eq!(reply["path"], "data/attributes/name");
        assert_eq!(reply["uuid"], "u3");
    }

    #[test]
    fn test_unknown_command_is_empty_object() {
        let reply: Value = serde_json::from_str(&unknown_command()).unwrap();
        assert_eq!(reply, json!({}));
    }
}
