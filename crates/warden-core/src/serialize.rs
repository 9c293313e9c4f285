//! Permission-filtered wire serialization.
//!
//! Entities render to the wire as `{id, type, attributes, relationships}`
//! documents. Serialization always emits the non-sensitive subset
//! unconditionally and adds permission-gated fields only when the viewer's
//! [`SecurityContext`] passes the matching [`Action`] for that specific
//! target. Unserialization is the mirror image: a field whose action check
//! fails never takes effect: the prior value is kept silently, never a
//! partial or erroring write.
//!
//! The output document is built field by field into an explicit
//! [`serde_json::Map`]; gating decisions are made while building, not by
//! editing a rendered tree afterwards.

use serde_json::{json, Map, Value};

use crate::error::StoreError;
use crate::model::{Door, Group, GroupRank, Membership, User, UserRank};
use crate::security::{Action, PolicyQuery, SecurityContext};

/// The `type` tag of membership references in relationship lists.
const MEMBERSHIP_TYPE: &str = "user-group-membership";

fn membership_refs(
    memberships: &[Membership],
    sc: &SecurityContext,
    query: &dyn PolicyQuery,
) -> Result<Vec<Value>, StoreError> {
    let mut refs = Vec::new();
    for membership in memberships {
        let action = Action::MembershipRead {
            membership_id: membership.id,
        };
        if sc.check_permission(query, &action)? {
            refs.push(json!({"id": membership.id, "type": MEMBERSHIP_TYPE}));
        }
    }
    Ok(refs)
}

/// Render a user for the viewer `sc`.
///
/// `email` appears only if the viewer passes
/// [`Action::UserReadEmail`] for this user; the membership list is filtered
/// per [`Action::MembershipRead`].
///
/// # Errors
///
/// Propagates policy-lookup failures.
pub fn serialize_user(
    user: &User,
    sc: &SecurityContext,
    query: &dyn PolicyQuery,
) -> Result<Value, StoreError> {
    let mut attributes = Map::new();
    attributes.insert("version".into(), json!(user.version));
    attributes.insert("username".into(), json!(user.username));
    attributes.insert("firstname".into(), json!(user.firstname));
    attributes.insert("lastname".into(), json!(user.lastname));
    attributes.insert("rank".into(), json!(user.rank.as_i64()));
    attributes.insert("validity-enabled".into(), json!(user.validity.enabled));
    let email_action = Action::UserReadEmail { user_id: user.id };
    if sc.check_permission(query, &email_action)? {
        attributes.insert("email".into(), json!(user.email));
    }

    Ok(json!({
        "id": user.id,
        "type": "user",
        "attributes": attributes,
        "relationships": {
            "memberships": {"data": membership_refs(&user.memberships, sc, query)?}
        }
    }))
}

/// Apply an `attributes` document onto a user, honoring field gates.
///
/// Always-writable fields: `firstname`, `lastname`, `password`. Gated:
/// `email` ([`Action::UserReadEmail`]; a viewer who cannot see the address
/// cannot set it either), `rank` ([`Action::UserUpdateRank`]),
/// `validity-enabled` ([`Action::UserManageValidity`]). A gated field
/// present in the input under a failing check is skipped silently.
///
/// # Errors
///
/// Propagates policy-lookup failures.
pub fn unserialize_user(
    user: &mut User,
    attributes: &Value,
    sc: &SecurityContext,
    query: &dyn PolicyQuery,
) -> Result<(), StoreError> {
    if let Some(value) = attributes.get("firstname").and_then(Value::as_str) {
        user.firstname = value.to_owned();
    }
    if let Some(value) = attributes.get("lastname").and_then(Value::as_str) {
        user.lastname = value.to_owned();
    }
    if let Some(value) = attributes.get("password").and_then(Value::as_str) {
        user.set_password(value);
    }

    let target = user.id;
    if sc.check_permission(query, &Action::UserReadEmail { user_id: target })? {
        if let Some(value) = attributes.get("email").and_then(Value::as_str) {
            user.email = value.to_owned();
        }
    }
    if sc.check_permission(query, &Action::UserUpdateRank { user_id: target })? {
        if let Some(rank) = attributes
            .get("rank")
            .and_then(Value::as_i64)
            .and_then(UserRank::from_i64)
        {
            user.rank = rank;
        }
    }
    if sc.check_permission(query, &Action::UserManageValidity { user_id: target })? {
        if let Some(enabled) = attributes.get("validity-enabled").and_then(Value::as_bool) {
            user.validity.enabled = enabled;
        }
    }
    Ok(())
}

/// Render a group for the viewer `sc`, member list filtered per
/// [`Action::MembershipRead`].
///
/// # Errors
///
/// Propagates policy-lookup failures.
pub fn serialize_group(
    group: &Group,
    sc: &SecurityContext,
    query: &dyn PolicyQuery,
) -> Result<Value, StoreError> {
    let mut attributes = Map::new();
    attributes.insert("version".into(), json!(group.version));
    attributes.insert("name".into(), json!(group.name));
    attributes.insert("description".into(), json!(group.description));

    Ok(json!({
        "id": group.id,
        "type": "group",
        "attributes": attributes,
        "relationships": {
            "members": {"data": membership_refs(&group.members, sc, query)?}
        }
    }))
}

/// Apply an `attributes` document onto a group.
///
/// Both fields ride on the caller-level [`Action::GroupUpdate`] gate, so no
/// per-field checks apply here.
pub fn unserialize_group(group: &mut Group, attributes: &Value) {
    if let Some(value) = attributes.get("name").and_then(Value::as_str) {
        group.name = value.to_owned();
    }
    if let Some(value) = attributes.get("description").and_then(Value::as_str) {
        group.description = value.to_owned();
    }
}

/// Render a door.
#[must_use]
pub fn serialize_door(door: &Door) -> Value {
    json!({
        "id": door.id,
        "type": "door",
        "attributes": {
            "version": door.version,
            "alias": door.alias,
            "description": door.description,
        }
    })
}

/// Apply an `attributes` document onto a door.
pub fn unserialize_door(door: &mut Door, attributes: &Value) {
    if let Some(value) = attributes.get("alias").and_then(Value::as_str) {
        door.alias = value.to_owned();
    }
    if let Some(value) = attributes.get("description").and_then(Value::as_str) {
        door.description = value.to_owned();
    }
}

/// Reference to a membership suitable for group-membership audit snapshots.
#[must_use]
pub fn serialize_membership(membership: &Membership) -> Value {
    json!({
        "id": membership.id,
        "type": MEMBERSHIP_TYPE,
        "attributes": {
            "rank": membership.rank.as_i64(),
        },
        "relationships": {
            "user": {"data": {"id": membership.user_id, "type": "user"}},
            "group": {"data": {"id": membership.group_id, "type": "group"}},
        }
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::model::{GroupId, MembershipId, UserId};

    /// Policy source with a fixed membership table, no store behind it.
    #[derive(Default)]
    struct TablePolicy {
        ranks: HashMap<UserId, UserRank>,
        group_ranks: HashMap<(UserId, GroupId), GroupRank>,
        memberships: HashMap<MembershipId, Membership>,
    }

    impl PolicyQuery for TablePolicy {
        fn user_rank(&self, user_id: UserId) -> Result<Option<UserRank>, StoreError> {
            Ok(self.ranks.get(&user_id).copied())
        }

        fn group_rank(
            &self,
            user_id: UserId,
            group_id: GroupId,
        ) -> Result<Option<GroupRank>, StoreError> {
            Ok(self.group_ranks.get(&(user_id, group_id)).copied())
        }

        fn find_membership(
            &self,
            membership_id: MembershipId,
        ) -> Result<Option<Membership>, StoreError> {
            Ok(self.memberships.get(&membership_id).copied())
        }
    }

    fn sample_user() -> User {
        let mut user = User::new("alice");
        user.id = 7;
        user.firstname = "Alice".into();
        user.lastname = "Liddell".into();
        user.email = "alice@example.com".into();
        user.memberships.push(Membership {
            id: 100,
            user_id: 7,
            group_id: 10,
            rank: GroupRank::Member,
        });
        user
    }

    #[test]
    fn test_email_gated_by_viewer() {
        let user = sample_user();
        let policy = TablePolicy::default();

        let full = serialize_user(&user, &SecurityContext::System, &policy).unwrap();
        assert_eq!(full["attributes"]["email"], "alice@example.com");

        let none = serialize_user(&user, &SecurityContext::Null, &policy).unwrap();
        assert!(none["attributes"].get("email").is_none());
        // Non-sensitive subset is always present.
        assert_eq!(none["attributes"]["username"], "alice");
        assert_eq!(none["id"], 7);
    }

    #[test]
    fn test_membership_list_filtered() {
        let user = sample_user();
        let mut policy = TablePolicy::default();
        policy.ranks.insert(7, UserRank::User);
        policy.memberships.insert(
            100,
            Membership {
                id: 100,
                user_id: 7,
                group_id: 10,
                rank: GroupRank::Member,
            },
        );

        // The member themself sees their membership.
        let own = serialize_user(&user, &SecurityContext::User(7), &policy).unwrap();
        assert_eq!(own["relationships"]["memberships"]["data"][0]["id"], 100);

        // A stranger sees an empty list.
        policy.ranks.insert(99, UserRank::User);
        let stranger = serialize_user(&user, &SecurityContext::User(99), &policy).unwrap();
        assert_eq!(
            stranger["relationships"]["memberships"]["data"]
                .as_array()
                .unwrap()
                .len(),
            0
        );
    }

    #[test]
    fn test_serialization_idempotent() {
        let user = sample_user();
        let policy = TablePolicy::default();
        let sc = SecurityContext::System;
        let first = serialize_user(&user, &sc, &policy).unwrap();
        let second = serialize_user(&user, &sc, &policy).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_denied_rank_write_is_silent_noop() {
        let mut user = sample_user();
        let mut policy = TablePolicy::default();
        policy.ranks.insert(7, UserRank::User);

        let before = user.rank;
        let attributes = json!({"rank": 2, "firstname": "Changed"});
        unserialize_user(&mut user, &attributes, &SecurityContext::User(7), &policy).unwrap();

        // Ungated field applied, gated field untouched, no error raised.
        assert_eq!(user.firstname, "Changed");
        assert_eq!(user.rank, before);
    }

    #[test]
    fn test_denied_email_write_is_silent_noop() {
        let mut user = sample_user();
        let policy = TablePolicy::default();
        let before = user.email.clone();
        let attributes = json!({"email": "spoofed@example.com"});
        unserialize_user(&mut user, &attributes, &SecurityContext::Null, &policy).unwrap();
        assert_eq!(user.email, before);
    }

    #[test]
    fn test_group_document_shape() {
        let mut group = Group::new("Engineers", "builds things");
        group.id = 10;
        let policy = TablePolicy::default();
        let doc = serialize_group(&group, &SecurityContext::System, &policy).unwrap();
        assert_eq!(doc["type"], "group");
        assert_eq!(doc["attributes"]["name"], "Engineers");
        assert_eq!(doc["attributes"]["version"], 0);
    }
}
