//! Request failure taxonomy for the Warden control plane.
//!
//! Every failure a request can produce maps onto one [`ApiError`] variant,
//! and the variant decides what the caller observes:
//!
//! - **Malformed requests** abort before any transaction opens.
//! - **Permission denials** leave no side effects and carry no detail.
//! - **Not-found and model violations** abort the transaction they occurred
//!   in and carry enough context (a field path for model violations) for the
//!   caller to highlight the offending input.
//! - **Store errors** are not recovered locally: they abort the request and
//!   are surfaced to the operator log, since they indicate corruption or a
//!   programming error rather than a recoverable business condition.
//!
//! A failing request never affects other in-flight or future requests.

use thiserror::Error;

/// Result alias for request-scoped operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors raised while the store executes a query or statement.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying SQLite layer failed.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored row could not be mapped back onto a domain entity.
    ///
    /// This indicates schema drift or corruption, never caller input.
    #[error("corrupt row: {reason}")]
    Corrupt {
        /// Description of the mapping failure.
        reason: String,
    },
}

impl StoreError {
    /// Create a corrupt-row error.
    pub fn corrupt(reason: impl Into<String>) -> Self {
        Self::Corrupt {
            reason: reason.into(),
        }
    }
}

/// Failure taxonomy for one dispatched request.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A required field is missing or has the wrong shape.
    ///
    /// Raised before any transaction opens; the request is rejected without
    /// touching the store.
    #[error("malformed message: {reason}")]
    Malformed {
        /// What was missing or malformed.
        reason: String,
    },

    /// The acting user is not allowed to perform the operation.
    ///
    /// Intentionally carries no detail: the caller learns only that the
    /// request was denied.
    #[error("permission denied")]
    PermissionDenied,

    /// A referenced entity id did not resolve inside the transaction.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Entity kind, e.g. `"group"`.
        kind: &'static str,
        /// The id that failed to resolve.
        id: i64,
    },

    /// A domain invariant was violated, e.g. a duplicate unique name.
    ///
    /// `path` points at the offending input field in the request document
    /// (e.g. `data/attributes/name`) so the caller can highlight it.
    #[error("{message}")]
    Model {
        /// Path of the offending field in the request document.
        path: String,
        /// Human-readable description of the violation.
        message: String,
    },

    /// The store failed; the transaction is discarded.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl ApiError {
    /// Create a malformed-message error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }

    /// Create a not-found error.
    #[must_use]
    pub const fn not_found(kind: &'static str, id: i64) -> Self {
        Self::NotFound { kind, id }
    }

    /// Create a model-violation error with a field path.
    pub fn model(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Model {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if the failure is the caller's fault (bad input or
    /// insufficient rights) rather than a server-side condition.
    #[must_use]
    pub const fn is_client_fault(&self) -> bool {
        matches!(
            self,
            Self::Malformed { .. } | Self::PermissionDenied | Self::Model { .. }
        )
    }

    /// Returns `true` if the request may have opened a transaction before
    /// failing. Malformed requests and permission denials never do.
    #[must_use]
    pub const fn reached_store(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Model { .. } | Self::Store(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_error_carries_path() {
        let err = ApiError::model("data/attributes/name", "a group named x already exists");
        match &err {
            ApiError::Model { path, .. } => assert_eq!(path, "data/attributes/name"),
            other => panic!("unexpected variant: {other:?}"),
        }
        assert!(err.is_client_fault());
        assert!(err.reached_store());
    }

    #[test]
    fn test_denial_is_pre_transaction() {
        let err = ApiError::PermissionDenied;
        assert!(err.is_client_fault());
        assert!(!err.reached_store());
    }

    #[test]
    fn test_not_found_display() {
        let err = ApiError::not_found("group", 42);
        assert_eq!(err.to_string(), "group 42 not found");
    }
}
