//! Command dispatch.
//!
//! The [`Dispatcher`] owns the handler-factory registry and the session
//! registry. For every inbound payload it:
//!
//! 1. decodes the envelope (undecodable payloads are logged and dropped);
//! 2. looks up the factory; unknown commands are logged and answered with
//!    an empty object, indistinguishable from a no-op;
//! 3. builds the [`RequestContext`] from the connection's session;
//! 4. runs the factory (which may reject the request as malformed), the
//!    guard, and then the handler;
//! 5. applies any session effect the handler recorded, and encodes the
//!    reply.
//!
//! All entry points run on the single dispatch task: a connection's close is
//! processed only after its previously queued requests, so no request ever
//! executes against a destroyed session.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use warden_core::{ApiError, Db};

use crate::api::{self, HandlerFactory};
use crate::context::{RequestContext, SessionEffect};
use crate::protocol::{self, RequestEnvelope};
use crate::session::{ConnectionId, SessionRegistry};

/// Dispatcher tunables.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Lifetime of minted auth tokens, in hours.
    pub token_ttl_hours: i64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { token_ttl_hours: 12 }
    }
}

/// Transport-facing request router.
pub struct Dispatcher {
    handlers: HashMap<&'static str, HandlerFactory>,
    sessions: SessionRegistry,
    db: Arc<Db>,
    token_ttl: Duration,
}

impl Dispatcher {
    /// Build a dispatcher with the full command set registered.
    #[must_use]
    pub fn new(db: Arc<Db>, config: DispatcherConfig) -> Self {
        let mut handlers = HashMap::new();
        api::register_all(&mut handlers);
        Self {
            handlers,
            sessions: SessionRegistry::new(),
            db,
            token_ttl: Duration::hours(config.token_ttl_hours),
        }
    }

    /// Register (or replace) a handler factory under a command name.
    pub fn register(&mut self, name: &'static str, factory: HandlerFactory) {
        self.handlers.insert(name, factory);
    }

    /// A connection opened: create its unauthenticated session.
    pub fn on_open(&mut self, connection: ConnectionId) {
        debug!(%connection, "connection opened");
        self.sessions.open(connection);
    }

    /// A connection closed: destroy its session.
    pub fn on_close(&mut self, connection: ConnectionId) {
        debug!(%connection, "connection closed");
        self.sessions.close(connection);
    }

    /// Number of live sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Process one inbound payload and produce the reply, if any.
    ///
    /// Returns `None` only for payloads that do not decode to an envelope;
    /// every decoded request gets a reply.
    pub fn handle(&mut self, connection: ConnectionId, raw: &str) -> Option<String> {
        let envelope = match RequestEnvelope::decode(raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(%connection, %err, "dropping undecodable payload");
                return None;
            },
        };

        let Some(factory) = self.handlers.get(envelope.cmd.as_str()).copied() else {
            info!(%connection, cmd = %envelope.cmd, "ignoring unknown command");
            return Some(protocol::unknown_command());
        };

        let (actor, token_digest) = self
            .sessions
            .get(connection)
            .map_or((None, None), |session| {
                (session.actor, session.token_digest.clone())
            });
        let ctx = RequestContext::new(self.db.clone(), actor, token_digest, self.token_ttl);

        match Self::run(factory, &ctx, &envelope) {
            Ok(content) => {
                if let Some(effect) = ctx.take_session_effect() {
                    self.apply_session_effect(connection, effect);
                }
                Some(protocol::success(&envelope.uuid, content))
            },
            Err(err) => {
                if err.is_client_fault() {
                    debug!(%connection, cmd = %envelope.cmd, %err, "request rejected");
                } else {
                    error!(%connection, cmd = %envelope.cmd, %err, "request failed");
                }
                Some(protocol::error_reply(&envelope.uuid, &err))
            },
        }
    }

    fn run(
        factory: HandlerFactory,
        ctx: &RequestContext,
        envelope: &RequestEnvelope,
    ) -> Result<Value, ApiError> {
        let handler = factory(ctx, envelope.content())?;
        handler.guard().check(ctx)?;
        handler.process(ctx)
    }

    fn apply_session_effect(&mut self, connection: ConnectionId, effect: SessionEffect) {
        match effect {
            SessionEffect::Authenticate {
                user_id,
                token_digest,
            } => self.sessions.authenticate(connection, user_id, token_digest),
            SessionEffect::ClearAuth => self.sessions.clear_auth(connection),
        }
    }
}
