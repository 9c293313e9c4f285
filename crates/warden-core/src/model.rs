//! Domain entities of the access-control model.
//!
//! Entities are owned by the store; handlers obtain transient copies scoped
//! to one transaction, mutate them, and write them back through
//! [`Tx`](crate::store::Tx). Identifiers are plain `i64` row ids; `0` is the
//! sentinel for "not yet persisted" and is what a `persist_*` call replaces
//! with the server-assigned id.

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// User entity id.
pub type UserId = i64;
/// Group entity id.
pub type GroupId = i64;
/// Membership relation id.
pub type MembershipId = i64;
/// Door entity id.
pub type DoorId = i64;

/// Ordered privilege level of a user across the whole system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRank {
    /// Regular operator.
    User,
    /// May manage day-to-day entities but not other operators.
    Manager,
    /// Full control, passes every permission check.
    Admin,
}

impl UserRank {
    /// Decode a stored rank discriminant.
    #[must_use]
    pub const fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::User),
            1 => Some(Self::Manager),
            2 => Some(Self::Admin),
            _ => None,
        }
    }

    /// Stored discriminant for this rank.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self as i64
    }
}

/// Ordered rank of a user within one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupRank {
    /// Plain member.
    Member,
    /// May operate group-owned resources.
    Operator,
    /// May edit the group and manage its memberships.
    Admin,
}

impl GroupRank {
    /// Decode a stored rank discriminant.
    #[must_use]
    pub const fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Member),
            1 => Some(Self::Operator),
            2 => Some(Self::Admin),
            _ => None,
        }
    }

    /// Stored discriminant for this rank.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self as i64
    }
}

/// Enablement window of a user account.
///
/// An account authenticates only while `enabled` is set and the current time
/// falls inside the optional `[not_before, not_after]` window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validity {
    /// Master enablement flag.
    pub enabled: bool,
    /// Optional start of the validity window.
    pub not_before: Option<DateTime<Utc>>,
    /// Optional end of the validity window.
    pub not_after: Option<DateTime<Utc>>,
}

impl Default for Validity {
    fn default() -> Self {
        Self {
            enabled: true,
            not_before: None,
            not_after: None,
        }
    }
}

impl Validity {
    /// Returns `true` if the account is usable at `now`.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled {
            return false;
        }
        if let Some(start) = self.not_before {
            if now < start {
                return false;
            }
        }
        if let Some(end) = self.not_after {
            if now > end {
                return false;
            }
        }
        true
    }
}

/// An operator account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Row id; `0` until persisted.
    pub id: UserId,
    /// Optimistic version counter, bumped on every update.
    pub version: i64,
    /// Unique login name.
    pub username: String,
    /// Given name.
    pub firstname: String,
    /// Family name.
    pub lastname: String,
    /// Contact address; read access is permission-gated.
    pub email: String,
    /// Salted password digest (hex). Empty until a password is set.
    pub password_digest: String,
    /// Per-user salt (hex).
    pub password_salt: String,
    /// System-wide privilege level.
    pub rank: UserRank,
    /// Account enablement window.
    pub validity: Validity,
    /// Memberships loaded alongside the user.
    pub memberships: Vec<Membership>,
}

impl User {
    /// Create a fresh, unpersisted user with default rank and validity.
    #[must_use]
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            id: 0,
            version: 0,
            username: username.into(),
            firstname: String::new(),
            lastname: String::new(),
            email: String::new(),
            password_digest: String::new(),
            password_salt: String::new(),
            rank: UserRank::User,
            validity: Validity::default(),
            memberships: Vec::new(),
        }
    }

    /// Set the password, generating a fresh salt.
    pub fn set_password(&mut self, plaintext: &str) {
        let mut salt = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        self.password_salt = hex::encode(salt);
        self.password_digest = password_digest(&self.password_salt, plaintext);
    }

    /// Check a password attempt against the stored digest.
    ///
    /// Comparison is constant-time; an account without a password never
    /// verifies.
    #[must_use]
    pub fn verify_password(&self, attempt: &str) -> bool {
        if self.password_digest.is_empty() {
            return false;
        }
        let candidate = password_digest(&self.password_salt, attempt);
        bool::from(
            candidate
                .as_bytes()
                .ct_eq(self.password_digest.as_bytes()),
        )
    }
}

fn password_digest(salt_hex: &str, plaintext: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt_hex.as_bytes());
    hasher.update(plaintext.as_bytes());
    hex::encode(hasher.finalize())
}

/// The (user, group, rank-in-group) relation.
///
/// Identified independently of its group so permission checks can target
/// "read this specific membership" without resolving the whole group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Membership {
    /// Row id.
    pub id: MembershipId,
    /// Member.
    pub user_id: UserId,
    /// Group.
    pub group_id: GroupId,
    /// Rank of the member within the group.
    pub rank: GroupRank,
}

/// A named collection of users.
///
/// The name is unique across the system, enforced by a lookup-then-compare
/// check inside the mutating transaction (see
/// [`Tx::ensure_group_name_free`](crate::store::Tx::ensure_group_name_free)).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    /// Row id; `0` until persisted.
    pub id: GroupId,
    /// Optimistic version counter.
    pub version: i64,
    /// System-unique name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Members loaded alongside the group.
    pub members: Vec<Membership>,
}

impl Group {
    /// Create a fresh, unpersisted group.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: 0,
            version: 0,
            name: name.into(),
            description: description.into(),
            members: Vec::new(),
        }
    }
}

/// A controlled door.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Door {
    /// Row id; `0` until persisted.
    pub id: DoorId,
    /// Optimistic version counter.
    pub version: i64,
    /// Short human-facing name.
    pub alias: String,
    /// Free-form description.
    pub description: String,
}

impl Door {
    /// Create a fresh, unpersisted door.
    #[must_use]
    pub fn new(alias: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: 0,
            version: 0,
            alias: alias.into(),
            description: description.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_password_round_trip() {
        let mut user = User::new("alice");
        user.set_password("hunter2");
        assert!(user.verify_password("hunter2"));
        assert!(!user.verify_password("hunter3"));
    }

    #[test]
    fn test_empty_password_never_verifies() {
        let user = User::new("ghost");
        assert!(!user.verify_password(""));
    }

    #[test]
    fn test_salt_differs_between_users() {
        let mut a = User::new("a");
        let mut b = User::new("b");
        a.set_password("same");
        b.set_password("same");
        assert_ne!(a.password_digest, b.password_digest);
    }

    #[test]
    fn test_validity_window() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 12, 31, 0, 0, 0).unwrap();
        let validity = Validity {
            enabled: true,
            not_before: Some(start),
            not_after: Some(end),
        };
        let inside = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
        let before = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2027, 6, 1, 0, 0, 0).unwrap();
        assert!(validity.is_valid_at(inside));
        assert!(!validity.is_valid_at(before));
        assert!(!validity.is_valid_at(after));
    }

    #[test]
    fn test_disabled_account_invalid_everywhere() {
        let validity = Validity {
            enabled: false,
            ..Validity::default()
        };
        assert!(!validity.is_valid_at(Utc::now()));
    }

    #[test]
    fn test_rank_ordering() {
        assert!(UserRank::User < UserRank::Manager);
        assert!(UserRank::Manager < UserRank::Admin);
        assert!(GroupRank::Member < GroupRank::Admin);
    }

    #[test]
    fn test_rank_discriminant_round_trip() {
        for rank in [UserRank::User, UserRank::Manager, UserRank::Admin] {
            assert_eq!(UserRank::from_i64(rank.as_i64()), Some(rank));
        }
        assert_eq!(UserRank::from_i64(99), None);
    }
}
