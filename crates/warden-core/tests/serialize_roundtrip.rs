//! Serializer properties exercised against a real store.

use warden_core::serialize::{serialize_user, unserialize_user};
use warden_core::{Db, GroupRank, SecurityContext, StoreRead, User, UserId, UserRank};

/// Seed a user with a membership and an email; returns (db, user_id).
fn seeded() -> (Db, UserId) {
    let db = Db::open_in_memory().unwrap();
    let user_id = db
        .transaction(|tx| {
            let mut user = User::new("alice");
            user.firstname = "Alice".into();
            user.lastname = "Liddell".into();
            user.email = "alice@example.com".into();
            user.rank = UserRank::Manager;
            tx.persist_user(&mut user)?;

            let mut group = warden_core::Group::new("Wonderland", "");
            tx.persist_group(&mut group)?;
            tx.add_membership(user.id, group.id, GroupRank::Member)?;
            Ok(user.id)
        })
        .unwrap();
    (db, user_id)
}

#[test]
fn test_serialization_idempotent_against_store() {
    let (db, user_id) = seeded();
    let user = db.find_user(user_id).unwrap().unwrap();
    let sc = SecurityContext::User(user_id);
    let first = serialize_user(&user, &sc, &db).unwrap();
    let second = serialize_user(&user, &sc, &db).unwrap();
    assert_eq!(first, second);
}

/// Serializing then unserializing under the same context reproduces every
/// visible field and leaves gated fields at their defaults.
#[test]
fn test_permission_gated_round_trip() {
    let (db, user_id) = seeded();
    let user = db.find_user(user_id).unwrap().unwrap();
    let sc = SecurityContext::User(user_id);

    let doc = serialize_user(&user, &sc, &db).unwrap();
    let attributes = &doc["attributes"];
    // Self sees their own email and membership.
    assert_eq!(attributes["email"], "alice@example.com");
    assert_eq!(
        doc["relationships"]["memberships"]["data"]
            .as_array()
            .unwrap()
            .len(),
        1
    );

    let mut fresh = User::new("alice");
    fresh.id = user.id;
    unserialize_user(&mut fresh, attributes, &sc, &db).unwrap();

    // Visible fields reproduced.
    assert_eq!(fresh.firstname, user.firstname);
    assert_eq!(fresh.lastname, user.lastname);
    assert_eq!(fresh.email, user.email);
    // Rank rides a gate the viewer fails: it stays at the default even
    // though the document carries the original manager rank.
    assert_eq!(fresh.rank, UserRank::User);
}

/// A field whose read check fails is absent from output and immune to
/// writes.
#[test]
fn test_denied_field_absent_and_write_immune() {
    let (db, user_id) = seeded();
    let stranger_id = db
        .transaction(|tx| {
            let mut stranger = User::new("mallory");
            tx.persist_user(&mut stranger)?;
            Ok(stranger.id)
        })
        .unwrap();
    let sc = SecurityContext::User(stranger_id);

    let user = db.find_user(user_id).unwrap().unwrap();
    let doc = serialize_user(&user, &sc, &db).unwrap();
    assert!(doc["attributes"].get("email").is_none());

    // Even a doctored document with the field present cannot write it.
    let mut target = db.find_user(user_id).unwrap().unwrap();
    let before = target.email.clone();
    let doctored = serde_json::json!({"email": "mallory@evil.example"});
    unserialize_user(&mut target, &doctored, &sc, &db).unwrap();
    assert_eq!(target.email, before);
}

/// Policy re-evaluates live data: revoking a membership mid-session changes
/// what serializes.
#[test]
fn test_policy_follows_live_membership_state() {
    let (db, user_id) = seeded();
    let viewer_id = db
        .transaction(|tx| {
            let mut viewer = User::new("peer");
            tx.persist_user(&mut viewer)?;
            let group = tx.find_group_by_name("Wonderland")?.expect("group exists");
            tx.add_membership(viewer.id, group.id, GroupRank::Member)?;
            Ok(viewer.id)
        })
        .unwrap();
    let sc = SecurityContext::User(viewer_id);

    // As a fellow member, the viewer sees alice's membership entry.
    let user = db.find_user(user_id).unwrap().unwrap();
    let doc = serialize_user(&user, &sc, &db).unwrap();
    assert_eq!(
        doc["relationships"]["memberships"]["data"]
            .as_array()
            .unwrap()
            .len(),
        1
    );

    // Drop the viewer's membership; the same call now filters it out.
    db.transaction(|tx| {
        let viewer = tx.find_user(viewer_id)?.expect("viewer exists");
        assert_eq!(viewer.memberships.len(), 1);
        tx.remove_membership(viewer.memberships[0].id)?;
        Ok(())
    })
    .unwrap();
    let doc = serialize_user(&user, &sc, &db).unwrap();
    assert_eq!(
        doc["relationships"]["memberships"]["data"]
            .as_array()
            .unwrap()
            .len(),
        0
    );
    let membership_id = user.memberships[0].id;
    assert!(!sc
        .check_permission(
            &db,
            &warden_core::Action::MembershipRead { membership_id }
        )
        .unwrap());
}
