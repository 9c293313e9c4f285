//! SQLite-backed entity store.
//!
//! [`Db`] owns the connection; [`Db::transaction`] is the sole unit of
//! atomicity for the whole platform. A handler's mutations and the audit
//! events describing them go through the same [`Tx`], so either all of them
//! commit or none do. Dropping a transaction without committing rolls it
//! back.
//!
//! # Schema
//!
//! Tables: `users`, `user_groups`, `memberships`, `doors`, `audit_events`,
//! `auth_tokens`. Group names carry **no** UNIQUE constraint: uniqueness is
//! a domain invariant enforced by [`Tx::ensure_group_name_free`] inside the
//! mutating transaction, so violations surface as a model error with a field
//! path instead of a bare constraint failure.
//!
//! # Concurrency
//!
//! The connection sits behind a `Mutex`; reads outside a transaction lock it
//! per call, a transaction holds it until commit or rollback. Request
//! dispatch is single-threaded, so the lock only ever arbitrates against
//! background readers.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use crate::audit::{AuditRecord, EventMask};
use crate::error::{ApiError, StoreError};
use crate::model::{
    Door, DoorId, Group, GroupId, GroupRank, Membership, MembershipId, User, UserId, UserRank,
    Validity,
};
use crate::security::PolicyQuery;

/// A minted authentication token row.
///
/// Only the digest of the token material is stored; the plaintext is
/// returned to the caller once at mint time and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthToken {
    /// Hex SHA-256 digest of the token material.
    pub token_digest: String,
    /// Account the token authenticates.
    pub user_id: UserId,
    /// Expiry instant; the token is unusable afterwards.
    pub expires_at: DateTime<Utc>,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    version             INTEGER NOT NULL DEFAULT 0,
    username            TEXT NOT NULL UNIQUE,
    firstname           TEXT NOT NULL DEFAULT '',
    lastname            TEXT NOT NULL DEFAULT '',
    email               TEXT NOT NULL DEFAULT '',
    password_digest     TEXT NOT NULL DEFAULT '',
    password_salt       TEXT NOT NULL DEFAULT '',
    rank                INTEGER NOT NULL DEFAULT 0,
    validity_enabled    INTEGER NOT NULL DEFAULT 1,
    validity_not_before TEXT,
    validity_not_after  TEXT
);
CREATE TABLE IF NOT EXISTS user_groups (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    version     INTEGER NOT NULL DEFAULT 0,
    name        TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS memberships (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id  INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    group_id INTEGER NOT NULL REFERENCES user_groups(id) ON DELETE CASCADE,
    rank     INTEGER NOT NULL DEFAULT 0,
    UNIQUE (user_id, group_id)
);
CREATE TABLE IF NOT EXISTS doors (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    version     INTEGER NOT NULL DEFAULT 0,
    alias       TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS audit_events (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    target_kind TEXT NOT NULL,
    target_id   INTEGER NOT NULL,
    event_mask  INTEGER NOT NULL,
    author_id   INTEGER,
    before_doc  TEXT,
    after_doc   TEXT,
    recorded_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_audit_target ON audit_events (target_kind, target_id);
CREATE TABLE IF NOT EXISTS auth_tokens (
    token_digest TEXT PRIMARY KEY,
    user_id      INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    expires_at   TEXT NOT NULL
);
";

/// Handle to the persistent store.
#[derive(Debug)]
pub struct Db {
    conn: Mutex<Connection>,
}

impl Db {
    /// Open (or create) the store at `path` and ensure the schema exists.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the file cannot be opened or the schema
    /// cannot be created.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "opened store");
        Self::setup(conn)
    }

    /// Open a fresh in-memory store. Used by tests and tooling.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if schema creation fails.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::setup(conn)
    }

    fn setup(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(SCHEMA)?;
        debug!("store schema ensured");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run `f` inside a transaction: commit on `Ok`, roll back on `Err`.
    ///
    /// This is the only way to mutate the store. The closure receives a
    /// [`Tx`] carrying both the typed write operations and the read
    /// interface, so permission checks and uniqueness validation inside a
    /// handler observe the handler's own uncommitted writes.
    ///
    /// # Errors
    ///
    /// Propagates the closure's error after rolling back, or a
    /// [`StoreError`] if the transaction itself cannot be opened or
    /// committed.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&Tx<'_>) -> Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        let mut guard = self.conn.lock().expect("store mutex poisoned");
        let tx = Tx {
            inner: guard.transaction().map_err(StoreError::from)?,
        };
        match f(&tx) {
            Ok(value) => {
                tx.inner.commit().map_err(StoreError::from)?;
                Ok(value)
            },
            Err(err) => {
                // Dropping the transaction rolls it back, taking any audit
                // rows written through it down with the mutation.
                drop(tx);
                Err(err)
            },
        }
    }

    /// Create a default admin account if the store holds no users at all.
    ///
    /// Returns the new admin's id, or `None` if users already exist.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn ensure_default_admin(&self, password: &str) -> Result<Option<UserId>, ApiError> {
        self.transaction(|tx| {
            let count: i64 = tx.with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
            })?;
            if count > 0 {
                return Ok(None);
            }
            let mut admin = User::new("admin");
            admin.rank = UserRank::Admin;
            admin.set_password(password);
            tx.persist_user(&mut admin)?;
            Ok(Some(admin.id))
        })
    }
}

/// An open store transaction.
///
/// Derefs-free wrapper over the rusqlite transaction: reads come from
/// [`StoreRead`], writes from the inherent methods below. Rolling back is
/// implicit on drop.
#[derive(Debug)]
pub struct Tx<'conn> {
    inner: rusqlite::Transaction<'conn>,
}

/// Typed read operations, available both on [`Db`] (autocommit, locking per
/// call) and on an open [`Tx`].
pub trait StoreRead {
    /// Run `f` against the underlying connection.
    #[doc(hidden)]
    fn with_conn<R>(
        &self,
        f: impl FnOnce(&Connection) -> Result<R, StoreError>,
    ) -> Result<R, StoreError>;

    /// Look up a user by id, memberships included.
    fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        self.with_conn(|conn| queries::find_user(conn, id))
    }

    /// Look up a user by login name, memberships included.
    fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.with_conn(|conn| queries::find_user_by_username(conn, username))
    }

    /// Look up a group by id, members included.
    fn find_group(&self, id: GroupId) -> Result<Option<Group>, StoreError> {
        self.with_conn(|conn| queries::find_group(conn, id))
    }

    /// Look up a group by exact name, members included.
    fn find_group_by_name(&self, name: &str) -> Result<Option<Group>, StoreError> {
        self.with_conn(|conn| queries::find_group_by_name(conn, name))
    }

    /// Look up a door by id.
    fn find_door(&self, id: DoorId) -> Result<Option<Door>, StoreError> {
        self.with_conn(|conn| queries::find_door(conn, id))
    }

    /// Look up an auth token by digest.
    fn find_auth_token(&self, token_digest: &str) -> Result<Option<AuthToken>, StoreError> {
        self.with_conn(|conn| queries::find_auth_token(conn, token_digest))
    }

    /// All audit events recorded against one target, oldest first.
    fn audit_events_for_target(
        &self,
        target_kind: &str,
        target_id: i64,
    ) -> Result<Vec<AuditRecord>, StoreError> {
        self.with_conn(|conn| queries::audit_events_for_target(conn, target_kind, target_id))
    }

    /// Total number of audit events in the store.
    fn count_audit_events(&self) -> Result<u64, StoreError> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM audit_events", [], |row| {
                row.get(0)
            })?;
            Ok(count.unsigned_abs())
        })
    }
}

impl StoreRead for Db {
    fn with_conn<R>(
        &self,
        f: impl FnOnce(&Connection) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let guard = self.conn.lock().expect("store mutex poisoned");
        f(&guard)
    }
}

impl StoreRead for Tx<'_> {
    fn with_conn<R>(
        &self,
        f: impl FnOnce(&Connection) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        f(&self.inner)
    }
}

impl PolicyQuery for Db {
    fn user_rank(&self, user_id: UserId) -> Result<Option<UserRank>, StoreError> {
        self.with_conn(|conn| queries::user_rank(conn, user_id))
    }

    fn group_rank(
        &self,
        user_id: UserId,
        group_id: GroupId,
    ) -> Result<Option<GroupRank>, StoreError> {
        self.with_conn(|conn| queries::group_rank(conn, user_id, group_id))
    }

    fn find_membership(
        &self,
        membership_id: MembershipId,
    ) -> Result<Option<Membership>, StoreError> {
        self.with_conn(|conn| queries::find_membership(conn, membership_id))
    }
}

impl PolicyQuery for Tx<'_> {
    fn user_rank(&self, user_id: UserId) -> Result<Option<UserRank>, StoreError> {
        self.with_conn(|conn| queries::user_rank(conn, user_id))
    }

    fn group_rank(
        &self,
        user_id: UserId,
        group_id: GroupId,
    ) -> Result<Option<GroupRank>, StoreError> {
        self.with_conn(|conn| queries::group_rank(conn, user_id, group_id))
    }

    fn find_membership(
        &self,
        membership_id: MembershipId,
    ) -> Result<Option<Membership>, StoreError> {
        self.with_conn(|conn| queries::find_membership(conn, membership_id))
    }
}

impl Tx<'_> {
    /// Insert a new user; assigns the server-side id.
    ///
    /// # Errors
    ///
    /// Propagates store failures (including username collisions, which are a
    /// schema-level constraint).
    pub fn persist_user(&self, user: &mut User) -> Result<(), StoreError> {
        self.inner.execute(
            "INSERT INTO users (version, username, firstname, lastname, email, \
             password_digest, password_salt, rank, validity_enabled, \
             validity_not_before, validity_not_after) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                user.version,
                user.username,
                user.firstname,
                user.lastname,
                user.email,
                user.password_digest,
                user.password_salt,
                user.rank.as_i64(),
                user.validity.enabled,
                user.validity.not_before,
                user.validity.not_after,
            ],
        )?;
        user.id = self.inner.last_insert_rowid();
        Ok(())
    }

    /// Write back an existing user, bumping its version.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn update_user(&self, user: &mut User) -> Result<(), StoreError> {
        user.version += 1;
        self.inner.execute(
            "UPDATE users SET version = ?2, username = ?3, firstname = ?4, lastname = ?5, \
             email = ?6, password_digest = ?7, password_salt = ?8, rank = ?9, \
             validity_enabled = ?10, validity_not_before = ?11, validity_not_after = ?12 \
             WHERE id = ?1",
            params![
                user.id,
                user.version,
                user.username,
                user.firstname,
                user.lastname,
                user.email,
                user.password_digest,
                user.password_salt,
                user.rank.as_i64(),
                user.validity.enabled,
                user.validity.not_before,
                user.validity.not_after,
            ],
        )?;
        Ok(())
    }

    /// Insert a new group; assigns the server-side id.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn persist_group(&self, group: &mut Group) -> Result<(), StoreError> {
        self.inner.execute(
            "INSERT INTO user_groups (version, name, description) VALUES (?1, ?2, ?3)",
            params![group.version, group.name, group.description],
        )?;
        group.id = self.inner.last_insert_rowid();
        Ok(())
    }

    /// Write back an existing group, bumping its version.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn update_group(&self, group: &mut Group) -> Result<(), StoreError> {
        group.version += 1;
        self.inner.execute(
            "UPDATE user_groups SET version = ?2, name = ?3, description = ?4 WHERE id = ?1",
            params![group.id, group.version, group.name, group.description],
        )?;
        Ok(())
    }

    /// Delete a group; memberships cascade.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn delete_group(&self, id: GroupId) -> Result<(), StoreError> {
        self.inner
            .execute("DELETE FROM user_groups WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Validate that `candidate`'s name is free, or already owned by
    /// `candidate` itself.
    ///
    /// Identity is compared by id, never by instance, so editing a group
    /// while keeping its name is not rejected as a collision even though the
    /// lookup returns a distinct fetched copy.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Model`] with path `data/attributes/name` on a
    /// collision; propagates store failures.
    pub fn ensure_group_name_free(&self, candidate: &Group) -> Result<(), ApiError> {
        if let Some(existing) = self.find_group_by_name(&candidate.name)? {
            if existing.id != candidate.id {
                return Err(ApiError::model(
                    "data/attributes/name",
                    format!("A group named {} already exists.", candidate.name),
                ));
            }
        }
        Ok(())
    }

    /// Add a user to a group at the given rank.
    ///
    /// # Errors
    ///
    /// Propagates store failures (including the one-membership-per-pair
    /// constraint).
    pub fn add_membership(
        &self,
        user_id: UserId,
        group_id: GroupId,
        rank: GroupRank,
    ) -> Result<Membership, StoreError> {
        self.inner.execute(
            "INSERT INTO memberships (user_id, group_id, rank) VALUES (?1, ?2, ?3)",
            params![user_id, group_id, rank.as_i64()],
        )?;
        Ok(Membership {
            id: self.inner.last_insert_rowid(),
            user_id,
            group_id,
            rank,
        })
    }

    /// Remove one membership relation. Returns `true` if a row was deleted.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn remove_membership(&self, id: MembershipId) -> Result<bool, StoreError> {
        let deleted = self
            .inner
            .execute("DELETE FROM memberships WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    /// Insert a new door; assigns the server-side id.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn persist_door(&self, door: &mut Door) -> Result<(), StoreError> {
        self.inner.execute(
            "INSERT INTO doors (version, alias, description) VALUES (?1, ?2, ?3)",
            params![door.version, door.alias, door.description],
        )?;
        door.id = self.inner.last_insert_rowid();
        Ok(())
    }

    /// Write back an existing door, bumping its version.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn update_door(&self, door: &mut Door) -> Result<(), StoreError> {
        door.version += 1;
        self.inner.execute(
            "UPDATE doors SET version = ?2, alias = ?3, description = ?4 WHERE id = ?1",
            params![door.id, door.version, door.alias, door.description],
        )?;
        Ok(())
    }

    /// Delete a door.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn delete_door(&self, id: DoorId) -> Result<(), StoreError> {
        self.inner
            .execute("DELETE FROM doors WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Store a freshly minted auth token.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn insert_auth_token(&self, token: &AuthToken) -> Result<(), StoreError> {
        self.inner.execute(
            "INSERT INTO auth_tokens (token_digest, user_id, expires_at) VALUES (?1, ?2, ?3)",
            params![token.token_digest, token.user_id, token.expires_at],
        )?;
        Ok(())
    }

    /// Revoke a token by digest. Returns `true` if a row was deleted.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn revoke_auth_token(&self, token_digest: &str) -> Result<bool, StoreError> {
        let deleted = self.inner.execute(
            "DELETE FROM auth_tokens WHERE token_digest = ?1",
            params![token_digest],
        )?;
        Ok(deleted > 0)
    }

    /// Drop every token whose expiry has passed.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn purge_expired_tokens(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        Ok(self.inner.execute(
            "DELETE FROM auth_tokens WHERE expires_at < ?1",
            params![now],
        )?)
    }

    /// Append one audit row. Called exclusively by
    /// [`AuditEvent::finalize`](crate::audit::AuditEvent::finalize).
    pub(crate) fn insert_audit_event(
        &self,
        target_kind: &str,
        target_id: i64,
        event_mask: EventMask,
        author_id: Option<UserId>,
        before_doc: Option<String>,
        after_doc: Option<String>,
        recorded_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.inner.execute(
            "INSERT INTO audit_events (target_kind, target_id, event_mask, author_id, \
             before_doc, after_doc, recorded_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                target_kind,
                target_id,
                i64::from(event_mask.bits()),
                author_id,
                before_doc,
                after_doc,
                recorded_at,
            ],
        )?;
        Ok(())
    }
}

/// Row-level query helpers shared by [`Db`] and [`Tx`].
mod queries {
    use super::*;

    pub(super) fn user_rank(
        conn: &Connection,
        user_id: UserId,
    ) -> Result<Option<UserRank>, StoreError> {
        let raw: Option<i64> = conn
            .query_row(
                "SELECT rank FROM users WHERE id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            None => Ok(None),
            Some(value) => UserRank::from_i64(value)
                .map(Some)
                .ok_or_else(|| StoreError::corrupt(format!("user rank {value}"))),
        }
    }

    pub(super) fn group_rank(
        conn: &Connection,
        user_id: UserId,
        group_id: GroupId,
    ) -> Result<Option<GroupRank>, StoreError> {
        let raw: Option<i64> = conn
            .query_row(
                "SELECT rank FROM memberships WHERE user_id = ?1 AND group_id = ?2",
                params![user_id, group_id],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            None => Ok(None),
            Some(value) => GroupRank::from_i64(value)
                .map(Some)
                .ok_or_else(|| StoreError::corrupt(format!("group rank {value}"))),
        }
    }

    struct UserRow {
        id: i64,
        version: i64,
        username: String,
        firstname: String,
        lastname: String,
        email: String,
        password_digest: String,
        password_salt: String,
        rank: i64,
        validity_enabled: bool,
        validity_not_before: Option<DateTime<Utc>>,
        validity_not_after: Option<DateTime<Utc>>,
    }

    const USER_COLUMNS: &str = "id, version, username, firstname, lastname, email, \
                                password_digest, password_salt, rank, validity_enabled, \
                                validity_not_before, validity_not_after";

    fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
        Ok(UserRow {
            id: row.get(0)?,
            version: row.get(1)?,
            username: row.get(2)?,
            firstname: row.get(3)?,
            lastname: row.get(4)?,
            email: row.get(5)?,
            password_digest: row.get(6)?,
            password_salt: row.get(7)?,
            rank: row.get(8)?,
            validity_enabled: row.get(9)?,
            validity_not_before: row.get(10)?,
            validity_not_after: row.get(11)?,
        })
    }

    fn finish_user(conn: &Connection, row: UserRow) -> Result<User, StoreError> {
        let rank = UserRank::from_i64(row.rank)
            .ok_or_else(|| StoreError::corrupt(format!("user rank {}", row.rank)))?;
        let memberships = memberships_where(conn, "user_id", row.id)?;
        Ok(User {
            id: row.id,
            version: row.version,
            username: row.username,
            firstname: row.firstname,
            lastname: row.lastname,
            email: row.email,
            password_digest: row.password_digest,
            password_salt: row.password_salt,
            rank,
            validity: Validity {
                enabled: row.validity_enabled,
                not_before: row.validity_not_before,
                not_after: row.validity_not_after,
            },
            memberships,
        })
    }

    pub(super) fn find_user(conn: &Connection, id: UserId) -> Result<Option<User>, StoreError> {
        let row = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                user_from_row,
            )
            .optional()?;
        row.map(|row| finish_user(conn, row)).transpose()
    }

    pub(super) fn find_user_by_username(
        conn: &Connection,
        username: &str,
    ) -> Result<Option<User>, StoreError> {
        let row = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
                params![username],
                user_from_row,
            )
            .optional()?;
        row.map(|row| finish_user(conn, row)).transpose()
    }

    fn memberships_where(
        conn: &Connection,
        column: &str,
        id: i64,
    ) -> Result<Vec<Membership>, StoreError> {
        let mut stmt = conn.prepare(&format!(
            "SELECT id, user_id, group_id, rank FROM memberships WHERE {column} = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;
        let mut memberships = Vec::new();
        for row in rows {
            let (id, user_id, group_id, rank) = row?;
            memberships.push(Membership {
                id,
                user_id,
                group_id,
                rank: GroupRank::from_i64(rank)
                    .ok_or_else(|| StoreError::corrupt(format!("group rank {rank}")))?,
            });
        }
        Ok(memberships)
    }

    pub(super) fn find_membership(
        conn: &Connection,
        id: MembershipId,
    ) -> Result<Option<Membership>, StoreError> {
        let row = conn
            .query_row(
                "SELECT id, user_id, group_id, rank FROM memberships WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()?;
        match row {
            None => Ok(None),
            Some((id, user_id, group_id, rank)) => Ok(Some(Membership {
                id,
                user_id,
                group_id,
                rank: GroupRank::from_i64(rank)
                    .ok_or_else(|| StoreError::corrupt(format!("group rank {rank}")))?,
            })),
        }
    }

    fn finish_group(
        conn: &Connection,
        id: i64,
        version: i64,
        name: String,
        description: String,
    ) -> Result<Group, StoreError> {
        Ok(Group {
            id,
            version,
            name,
            description,
            members: memberships_where(conn, "group_id", id)?,
        })
    }

    pub(super) fn find_group(conn: &Connection, id: GroupId) -> Result<Option<Group>, StoreError> {
        let row = conn
            .query_row(
                "SELECT id, version, name, description FROM user_groups WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;
        row.map(|(id, version, name, description)| {
            finish_group(conn, id, version, name, description)
        })
        .transpose()
    }

    pub(super) fn find_group_by_name(
        conn: &Connection,
        name: &str,
    ) -> Result<Option<Group>, StoreError> {
        let row = conn
            .query_row(
                "SELECT id, version, name, description FROM user_groups WHERE name = ?1",
                params![name],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;
        row.map(|(id, version, name, description)| {
            finish_group(conn, id, version, name, description)
        })
        .transpose()
    }

    pub(super) fn find_door(conn: &Connection, id: DoorId) -> Result<Option<Door>, StoreError> {
        Ok(conn
            .query_row(
                "SELECT id, version, alias, description FROM doors WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Door {
                        id: row.get(0)?,
                        version: row.get(1)?,
                        alias: row.get(2)?,
                        description: row.get(3)?,
                    })
                },
            )
            .optional()?)
    }

    pub(super) fn find_auth_token(
        conn: &Connection,
        token_digest: &str,
    ) -> Result<Option<AuthToken>, StoreError> {
        Ok(conn
            .query_row(
                "SELECT token_digest, user_id, expires_at FROM auth_tokens \
                 WHERE token_digest = ?1",
                params![token_digest],
                |row| {
                    Ok(AuthToken {
                        token_digest: row.get(0)?,
                        user_id: row.get(1)?,
                        expires_at: row.get(2)?,
                    })
                },
            )
            .optional()?)
    }

    pub(super) fn audit_events_for_target(
        conn: &Connection,
        target_kind: &str,
        target_id: i64,
    ) -> Result<Vec<AuditRecord>, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT id, target_kind, target_id, event_mask, author_id, before_doc, \
             after_doc, recorded_at FROM audit_events \
             WHERE target_kind = ?1 AND target_id = ?2 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![target_kind, target_id], |row| {
            Ok(AuditRecord {
                id: row.get(0)?,
                target_kind: row.get(1)?,
                target_id: row.get(2)?,
                event_mask: EventMask::from_bits(row.get::<_, i64>(3)?.unsigned_abs() as u32),
                author_id: row.get(4)?,
                before_doc: row.get(5)?,
                after_doc: row.get(6)?,
                recorded_at: row.get(7)?,
            })
        })?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }
}
