//! Per-request state handed to handlers.
//!
//! A [`RequestContext`] is constructed once per inbound request and
//! discarded after the response is produced. It ties the connection's
//! session to the shared store handle and carries the request's
//! [`SecurityContext`].
//!
//! Handlers cannot reach the session registry directly; authentication
//! commands record a [`SessionEffect`] on the context instead, which the
//! dispatcher applies to the registry after the handler returns
//! successfully. This keeps the registry exclusively owned by the dispatch
//! loop.

use std::cell::RefCell;
use std::sync::Arc;

use chrono::Duration;

use warden_core::{Db, SecurityContext, UserId};

/// Session mutation requested by a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEffect {
    /// Bind the connection to an authenticated actor.
    Authenticate {
        /// The authenticated user.
        user_id: UserId,
        /// Digest of the token that proved the identity.
        token_digest: String,
    },
    /// Return the connection to the unauthenticated state.
    ClearAuth,
}

/// Everything a handler needs to execute one request.
pub struct RequestContext {
    /// Shared store handle.
    pub db: Arc<Db>,
    actor: Option<UserId>,
    session_token_digest: Option<String>,
    token_ttl: Duration,
    effect: RefCell<Option<SessionEffect>>,
}

impl RequestContext {
    /// Build the context for one request.
    #[must_use]
    pub fn new(
        db: Arc<Db>,
        actor: Option<UserId>,
        session_token_digest: Option<String>,
        token_ttl: Duration,
    ) -> Self {
        Self {
            db,
            actor,
            session_token_digest,
            token_ttl,
            effect: RefCell::new(None),
        }
    }

    /// The acting user, if the session is authenticated.
    #[must_use]
    pub const fn actor(&self) -> Option<UserId> {
        self.actor
    }

    /// The security context of the acting user.
    #[must_use]
    pub fn security(&self) -> SecurityContext {
        self.actor.map_or(SecurityContext::Null, SecurityContext::User)
    }

    /// Digest of the token bound to the session, if any.
    #[must_use]
    pub fn session_token_digest(&self) -> Option<&str> {
        self.session_token_digest.as_deref()
    }

    /// Lifetime for tokens minted by this request.
    #[must_use]
    pub const fn token_ttl(&self) -> Duration {
        self.token_ttl
    }

    /// Record a session mutation for the dispatcher to apply on success.
    pub fn set_session_effect(&self, effect: SessionEffect) {
        *self.effect.borrow_mut() = Some(effect);
    }

    /// Take the recorded session mutation, if any.
    #[must_use]
    pub fn take_session_effect(&self) -> Option<SessionEffect> {
        self.effect.borrow_mut().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_context_follows_actor() {
        let db = Arc::new(Db::open_in_memory().unwrap());
        let anon = RequestContext::new(db.clone(), None, None, Duration::hours(1));
        assert_eq!(anon.security(), SecurityContext::Null);

        let authed = RequestContext::new(db, Some(9), None, Duration::hours(1));
        assert_eq!(authed.security(), SecurityContext::User(9));
        assert_eq!(authed.actor(), Some(9));
    }

    #[test]
    fn test_session_effect_taken_once() {
        let db = Arc::new(Db::open_in_memory().unwrap());
        let ctx = RequestContext::new(db, None, None, Duration::hours(1));
        ctx.set_session_effect(SessionEffect::ClearAuth);
        assert_eq!(ctx.take_session_effect(), Some(SessionEffect::ClearAuth));
        assert_eq!(ctx.take_session_effect(), None);
    }
}
