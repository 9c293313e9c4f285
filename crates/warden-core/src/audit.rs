//! Transaction-bound audit events.
//!
//! Every accepted mutation of a security-relevant entity produces an
//! immutable audit record capturing before/after state, atomically with the
//! mutation itself. The mechanism:
//!
//! 1. A handler obtains an [`AuditEvent`] from [`begin_event`], bound to the
//!    open transaction and a target entity.
//! 2. It tags the event with an [`EventMask`] and attaches serialized
//!    `before`/`after` snapshots as the mutation proceeds.
//! 3. It calls [`AuditEvent::finalize`], which consumes the event and
//!    writes the row **through the owning transaction**, before the
//!    transaction commits.
//!
//! An audit record is therefore durable if and only if its transaction
//! committed: aborting rolls the audit row back together with the mutation,
//! and move semantics make a second `finalize` unrepresentable. Dropping an
//! event without finalizing writes nothing.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::StoreError;
use crate::model::{DoorId, GroupId, UserId};
use crate::store::Tx;

/// Bitmask describing what happened to the target entity.
///
/// Masks combine with `|` when one event covers several facets of a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventMask(u32);

impl EventMask {
    /// A user account was created.
    pub const USER_CREATED: Self = Self(1 << 0);
    /// A user account was edited.
    pub const USER_EDITED: Self = Self(1 << 1);
    /// A group was created.
    pub const GROUP_CREATED: Self = Self(1 << 2);
    /// A group's attributes were updated.
    pub const GROUP_UPDATED: Self = Self(1 << 3);
    /// A group was deleted.
    pub const GROUP_DELETED: Self = Self(1 << 4);
    /// A group's member list changed.
    pub const GROUP_MEMBERSHIP_CHANGED: Self = Self(1 << 5);
    /// A door was created.
    pub const DOOR_CREATED: Self = Self(1 << 6);
    /// A door's attributes were updated.
    pub const DOOR_UPDATED: Self = Self(1 << 7);
    /// A door was deleted.
    pub const DOOR_DELETED: Self = Self(1 << 8);

    /// Rebuild a mask from its stored bits.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bits for storage.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns `true` if every bit of `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if no bit is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for EventMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for EventMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// The entity an audit event is recorded against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditTarget {
    /// A user account.
    User(UserId),
    /// A group.
    Group(GroupId),
    /// A door.
    Door(DoorId),
}

impl AuditTarget {
    /// Stable kind tag used in the `audit_events` table.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::User(_) => "user",
            Self::Group(_) => "group",
            Self::Door(_) => "door",
        }
    }

    /// Target entity id.
    #[must_use]
    pub const fn id(&self) -> i64 {
        match self {
            Self::User(id) | Self::Group(id) | Self::Door(id) => *id,
        }
    }
}

/// A persisted audit row, as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    /// Row id.
    pub id: i64,
    /// Target entity kind tag.
    pub target_kind: String,
    /// Target entity id.
    pub target_id: i64,
    /// What happened.
    pub event_mask: EventMask,
    /// Acting user, if the mutation had an authenticated origin.
    pub author_id: Option<UserId>,
    /// Serialized entity state before the mutation.
    pub before_doc: Option<String>,
    /// Serialized entity state after the mutation.
    pub after_doc: Option<String>,
    /// When the event was finalized.
    pub recorded_at: DateTime<Utc>,
}

/// An in-flight audit event, exclusively owned by the transaction that
/// created it until [`finalize`](Self::finalize) hands the row to the store.
#[derive(Debug)]
pub struct AuditEvent<'a, 'conn> {
    tx: &'a Tx<'conn>,
    target: AuditTarget,
    author: Option<UserId>,
    mask: EventMask,
    before: Option<Value>,
    after: Option<Value>,
}

/// Begin recording an audit event against `target` on the open transaction.
///
/// `author` is the acting user, or `None` for mutations with no
/// authenticated origin (bootstrap, hardware-event ingestion).
#[must_use]
pub fn begin_event<'a, 'conn>(
    tx: &'a Tx<'conn>,
    target: AuditTarget,
    author: Option<UserId>,
) -> AuditEvent<'a, 'conn> {
    AuditEvent {
        tx,
        target,
        author,
        mask: EventMask::default(),
        before: None,
        after: None,
    }
}

impl AuditEvent<'_, '_> {
    /// Merge `mask` into the event's type tag.
    pub fn event_mask(&mut self, mask: EventMask) {
        self.mask |= mask;
    }

    /// Attach the serialized pre-mutation snapshot.
    pub fn before(&mut self, doc: Value) {
        self.before = Some(doc);
    }

    /// Attach the serialized post-mutation snapshot.
    pub fn after(&mut self, doc: Value) {
        self.after = Some(doc);
    }

    /// Write the audit row through the owning transaction.
    ///
    /// Must be called before the transaction commits; consuming `self`
    /// guarantees the event is finalized at most once.
    ///
    /// # Errors
    ///
    /// Propagates store failures, which abort the whole transaction.
    pub fn finalize(self) -> Result<(), StoreError> {
        self.tx.insert_audit_event(
            self.target.kind(),
            self.target.id(),
            self.mask,
            self.author,
            self.before.map(|doc| doc.to_string()),
            self.after.map(|doc| doc.to_string()),
            Utc::now(),
        )
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::ApiError;
    use crate::model::Group;
    use crate::store::{Db, StoreRead};

    #[test]
    fn test_mask_combination() {
        let mask = EventMask::GROUP_CREATED | EventMask::GROUP_MEMBERSHIP_CHANGED;
        assert!(mask.contains(EventMask::GROUP_CREATED));
        assert!(mask.contains(EventMask::GROUP_MEMBERSHIP_CHANGED));
        assert!(!mask.contains(EventMask::GROUP_DELETED));
        assert_eq!(EventMask::from_bits(mask.bits()), mask);
    }

    #[test]
    fn test_finalized_event_survives_commit() {
        let db = Db::open_in_memory().unwrap();
        let group_id = db
            .transaction(|tx| {
                let mut group = Group::new("Audited", "");
                tx.persist_group(&mut group)?;
                let mut event = begin_event(tx, AuditTarget::Group(group.id), Some(1));
                event.event_mask(EventMask::GROUP_CREATED);
                event.after(json!({"name": "Audited"}));
                event.finalize()?;
                Ok(group.id)
            })
            .unwrap();

        let records = db.audit_events_for_target("group", group_id).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].event_mask.contains(EventMask::GROUP_CREATED));
        assert_eq!(records[0].author_id, Some(1));
        assert!(records[0].before_doc.is_none());
        assert!(records[0].after_doc.as_deref().unwrap().contains("Audited"));
    }

    #[test]
    fn test_aborted_transaction_drops_audit_row() {
        let db = Db::open_in_memory().unwrap();
        let result = db.transaction(|tx| {
            let mut group = Group::new("Doomed", "");
            tx.persist_group(&mut group)?;
            let mut event = begin_event(tx, AuditTarget::Group(group.id), None);
            event.event_mask(EventMask::GROUP_CREATED);
            event.after(json!({"name": "Doomed"}));
            event.finalize()?;
            Err::<(), _>(ApiError::model("data/attributes/name", "rejected"))
        });
        assert!(result.is_err());
        assert_eq!(db.count_audit_events().unwrap(), 0);
        assert!(db.find_group_by_name("Doomed").unwrap().is_none());
    }

    #[test]
    fn test_unfinalized_event_writes_nothing() {
        let db = Db::open_in_memory().unwrap();
        db.transaction(|tx| {
            let mut group = Group::new("Quiet", "");
            tx.persist_group(&mut group)?;
            let mut event = begin_event(tx, AuditTarget::Group(group.id), None);
            event.event_mask(EventMask::GROUP_CREATED);
            // Dropped without finalize.
            Ok(())
        })
        .unwrap();
        assert_eq!(db.count_audit_events().unwrap(), 0);
    }
}
