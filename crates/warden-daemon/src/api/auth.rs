//! Authentication commands: token minting, token login, logout.
//!
//! Tokens are random material returned to the caller exactly once; the store
//! keeps only a SHA-256 digest with an expiry. Lookup is by digest, and the
//! fetched row's digest is compared constant-time before the row is trusted.

use chrono::Utc;
use rand::RngCore;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{debug, info};

use warden_core::store::AuthToken;
use warden_core::{ApiError, ApiResult, StoreRead};

use super::{require_str, MethodHandler};
use crate::conditions::{Condition, Denial, Guard};
use crate::context::{RequestContext, SessionEffect};

/// Bytes of entropy in a minted token.
const TOKEN_BYTES: usize = 32;

fn token_digest(plaintext: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plaintext.as_bytes());
    hex::encode(hasher.finalize())
}

fn mint_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Handler for `create_auth_token`: password login.
///
/// Responds with `{status: 0, user_id, token}` on success and
/// `{status: -1}` on bad credentials or a disabled account; the two are
/// indistinguishable to the caller.
pub struct CreateAuthToken {
    guard: Guard,
    username: String,
    password: String,
}

impl CreateAuthToken {
    /// Factory. Requires `username` and `password` strings.
    pub fn create(
        _ctx: &RequestContext,
        content: &Value,
    ) -> Result<Box<dyn MethodHandler>, ApiError> {
        Ok(Box::new(Self {
            guard: Guard::new(),
            username: require_str(content, "username")?,
            password: require_str(content, "password")?,
        }))
    }
}

impl MethodHandler for CreateAuthToken {
    fn guard(&self) -> &Guard {
        &self.guard
    }

    fn process(&self, ctx: &RequestContext) -> ApiResult<Value> {
        let now = Utc::now();
        let Some(user) = ctx.db.find_user_by_username(&self.username)? else {
            debug!(username = %self.username, "login rejected: unknown user");
            return Ok(json!({"status": -1}));
        };
        if !user.verify_password(&self.password) || !user.validity.is_valid_at(now) {
            debug!(username = %self.username, "login rejected");
            return Ok(json!({"status": -1}));
        }

        let plaintext = mint_token();
        let digest = token_digest(&plaintext);
        let token = AuthToken {
            token_digest: digest.clone(),
            user_id: user.id,
            expires_at: now + ctx.token_ttl(),
        };
        ctx.db.transaction(|tx| {
            tx.purge_expired_tokens(now)?;
            tx.insert_auth_token(&token)?;
            Ok(())
        })?;

        ctx.set_session_effect(SessionEffect::Authenticate {
            user_id: user.id,
            token_digest: digest,
        });
        info!(username = %user.username, user_id = user.id, "operator authenticated");
        Ok(json!({"status": 0, "user_id": user.id, "token": plaintext}))
    }
}

/// Handler for `authenticate_with_token`: resume a session from a token
/// minted earlier.
pub struct AuthenticateWithToken {
    guard: Guard,
    token: String,
}

impl AuthenticateWithToken {
    /// Factory. Requires a `token` string.
    pub fn create(
        _ctx: &RequestContext,
        content: &Value,
    ) -> Result<Box<dyn MethodHandler>, ApiError> {
        Ok(Box::new(Self {
            guard: Guard::new(),
            token: require_str(content, "token")?,
        }))
    }
}

impl MethodHandler for AuthenticateWithToken {
    fn guard(&self) -> &Guard {
        &self.guard
    }

    fn process(&self, ctx: &RequestContext) -> ApiResult<Value> {
        let digest = token_digest(&self.token);
        let Some(row) = ctx.db.find_auth_token(&digest)? else {
            return Ok(json!({"status": -1}));
        };
        let digest_matches: bool = row
            .token_digest
            .as_bytes()
            .ct_eq(digest.as_bytes())
            .into();
        if !digest_matches {
            return Ok(json!({"status": -1}));
        }
        if row.expires_at < Utc::now() {
            ctx.db.transaction(|tx| {
                tx.revoke_auth_token(&digest)?;
                Ok(())
            })?;
            return Ok(json!({"status": -1}));
        }

        ctx.set_session_effect(SessionEffect::Authenticate {
            user_id: row.user_id,
            token_digest: digest,
        });
        Ok(json!({"status": 0, "user_id": row.user_id}))
    }
}

/// Handler for `logout`: revoke the session's token and drop the actor
/// binding.
pub struct Logout {
    guard: Guard,
}

impl Logout {
    /// Factory. Requires an authenticated session.
    pub fn create(
        _ctx: &RequestContext,
        _content: &Value,
    ) -> Result<Box<dyn MethodHandler>, ApiError> {
        Ok(Box::new(Self {
            guard: Guard::new()
                .require(Denial::PermissionDenied, vec![Condition::Authenticated]),
        }))
    }
}

impl MethodHandler for Logout {
    fn guard(&self) -> &Guard {
        &self.guard
    }

    fn process(&self, ctx: &RequestContext) -> ApiResult<Value> {
        if let Some(digest) = ctx.session_token_digest() {
            let digest = digest.to_owned();
            ctx.db.transaction(|tx| {
                tx.revoke_auth_token(&digest)?;
                Ok(())
            })?;
        }
        ctx.set_session_effect(SessionEffect::ClearAuth);
        Ok(json!({"status": 0}))
    }
}
