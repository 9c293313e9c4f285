//! `get_version`: daemon version string, available to anyone.

use serde_json::{json, Value};

use warden_core::{ApiError, ApiResult};

use super::MethodHandler;
use crate::conditions::Guard;
use crate::context::RequestContext;

/// Handler for `get_version`.
pub struct GetVersion {
    guard: Guard,
}

impl GetVersion {
    /// Factory. No required fields, no conditions.
    pub fn create(
        _ctx: &RequestContext,
        _content: &Value,
    ) -> Result<Box<dyn MethodHandler>, ApiError> {
        Ok(Box::new(Self {
            guard: Guard::new(),
        }))
    }
}

impl MethodHandler for GetVersion {
    fn guard(&self) -> &Guard {
        &self.guard
    }

    fn process(&self, _ctx: &RequestContext) -> ApiResult<Value> {
        Ok(json!({"version": env!("CARGO_PKG_VERSION")}))
    }
}
