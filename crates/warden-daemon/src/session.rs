//! Per-connection session state.
//!
//! A [`Session`] binds a transport connection to an actor. It is created
//! unauthenticated when the connection opens, promoted when an
//! authentication command succeeds, and destroyed when the connection
//! closes. Sessions are never persisted.
//!
//! The [`SessionRegistry`] is exclusively owned by the dispatcher; the
//! transport reaches it only through the dispatcher's open/close/handle
//! entry points, all of which run on the single dispatch task, so session
//! state can never race with request handling.

use std::collections::HashMap;

use warden_core::UserId;

/// Opaque handle of one transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Actor binding of one live connection.
#[derive(Debug, Clone)]
pub struct Session {
    /// Owning connection.
    pub connection: ConnectionId,
    /// Authenticated user, if any.
    pub actor: Option<UserId>,
    /// Digest of the token that authenticated this session, kept so logout
    /// can revoke it.
    pub token_digest: Option<String>,
}

impl Session {
    /// Returns `true` once an actor is bound.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.actor.is_some()
    }
}

/// Registry of live sessions, keyed by connection handle.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<ConnectionId, Session>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh unauthenticated session for a newly opened connection.
    ///
    /// Re-opening an existing handle resets its session; the transport
    /// allocates handles monotonically so this only happens in tests.
    pub fn open(&mut self, connection: ConnectionId) {
        self.sessions.insert(
            connection,
            Session {
                connection,
                actor: None,
                token_digest: None,
            },
        );
    }

    /// Remove the session of a closing connection.
    pub fn close(&mut self, connection: ConnectionId) -> Option<Session> {
        self.sessions.remove(&connection)
    }

    /// Look up the session of a connection.
    #[must_use]
    pub fn get(&self, connection: ConnectionId) -> Option<&Session> {
        self.sessions.get(&connection)
    }

    /// Bind an authenticated actor to a connection's session.
    pub fn authenticate(
        &mut self,
        connection: ConnectionId,
        actor: UserId,
        token_digest: String,
    ) {
        if let Some(session) = self.sessions.get_mut(&connection) {
            session.actor = Some(actor);
            session.token_digest = Some(token_digest);
        }
    }

    /// Drop a session's actor binding, returning it to the unauthenticated
    /// state.
    pub fn clear_auth(&mut self, connection: ConnectionId) {
        if let Some(session) = self.sessions.get_mut(&connection) {
            session.actor = None;
            session.token_digest = None;
        }
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if no sessions are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let mut registry = SessionRegistry::new();
        let conn = ConnectionId(1);

        registry.open(conn);
        assert!(!registry.get(conn).unwrap().is_authenticated());

        registry.authenticate(conn, 42, "digest".into());
        let session = registry.get(conn).unwrap();
        assert_eq!(session.actor, Some(42));

        registry.clear_auth(conn);
        assert!(!registry.get(conn).unwrap().is_authenticated());

        let closed = registry.close(conn);
        assert!(closed.is_some());
        assert!(registry.get(conn).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_sessions_are_per_connection() {
        let mut registry = SessionRegistry::new();
        registry.open(ConnectionId(1));
        registry.open(ConnectionId(2));
        registry.authenticate(ConnectionId(1), 7, "digest".into());

        assert!(registry.get(ConnectionId(1)).unwrap().is_authenticated());
        assert!(!registry.get(ConnectionId(2)).unwrap().is_authenticated());
        assert_eq!(registry.len(), 2);
    }
}
