//! Permission policy evaluation.
//!
//! [`SecurityContext`] is the single decision point for "may this actor
//! perform this action on this target". It is consulted at two
//! granularities:
//!
//! - **coarse**, before a handler runs at all, through the daemon's
//!   condition groups;
//! - **fine**, per field, while serializing an entity (e.g. a user's email
//!   is emitted only if the viewer passes
//!   [`Action::UserReadEmail`] for that specific user).
//!
//! Checks are pure decisions over live store state, queried through the
//! minimal [`PolicyQuery`] interface. Nothing is cached across calls: policy
//! may depend on membership rows that the current transaction just changed,
//! so every call re-evaluates against current data.

use crate::error::StoreError;
use crate::model::{
    DoorId, GroupId, GroupRank, Membership, MembershipId, UserId, UserRank,
};

/// One permission-checkable operation, carrying exactly the parameters the
/// policy needs to decide.
///
/// The set is closed: handlers and serializers construct variants
/// explicitly, and the policy table below matches on all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Read a user's non-sensitive profile.
    UserRead {
        /// Target user.
        user_id: UserId,
    },
    /// Read a user's email address.
    UserReadEmail {
        /// Target user.
        user_id: UserId,
    },
    /// Edit a user's profile fields.
    UserUpdate {
        /// Target user.
        user_id: UserId,
    },
    /// Change a user's system-wide rank.
    UserUpdateRank {
        /// Target user.
        user_id: UserId,
    },
    /// Change a user's enablement window.
    UserManageValidity {
        /// Target user.
        user_id: UserId,
    },
    /// Create a new user account.
    UserCreate,
    /// Read a group and its attributes.
    GroupRead {
        /// Target group.
        group_id: GroupId,
    },
    /// Create a new group.
    GroupCreate,
    /// Edit a group's attributes.
    GroupUpdate {
        /// Target group.
        group_id: GroupId,
    },
    /// Delete a group.
    GroupDelete {
        /// Target group.
        group_id: GroupId,
    },
    /// Add or remove members of a group.
    GroupManageMembership {
        /// Target group.
        group_id: GroupId,
    },
    /// Read one specific membership relation.
    MembershipRead {
        /// Target membership.
        membership_id: MembershipId,
    },
    /// Read a door.
    DoorRead {
        /// Target door.
        door_id: DoorId,
    },
    /// Create a new door.
    DoorCreate,
    /// Edit a door's attributes.
    DoorUpdate {
        /// Target door.
        door_id: DoorId,
    },
    /// Delete a door.
    DoorDelete {
        /// Target door.
        door_id: DoorId,
    },
}

/// The minimal read interface the policy needs.
///
/// Implemented both by the store handle (autocommit reads, used by
/// pre-transaction condition checks) and by an open transaction (used by
/// per-field serializer checks), so a check inside a handler observes the
/// handler's own uncommitted writes.
pub trait PolicyQuery {
    /// System-wide rank of a user, if the user exists.
    fn user_rank(&self, user_id: UserId) -> Result<Option<UserRank>, StoreError>;

    /// Rank of `user_id` within `group_id`, if such a membership exists.
    fn group_rank(
        &self,
        user_id: UserId,
        group_id: GroupId,
    ) -> Result<Option<GroupRank>, StoreError>;

    /// Look up one membership relation.
    fn find_membership(
        &self,
        membership_id: MembershipId,
    ) -> Result<Option<Membership>, StoreError>;
}

/// The actor on whose behalf a request executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityContext {
    /// Unauthenticated: every check fails.
    Null,
    /// Internal callers (bootstrap, audit snapshots): every check passes.
    System,
    /// An authenticated operator.
    User(UserId),
}

impl SecurityContext {
    /// Decide whether the actor may perform `action`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the policy lookup itself fails; callers
    /// treat that as fatal to the request, never as a denial.
    pub fn check_permission(
        &self,
        query: &dyn PolicyQuery,
        action: &Action,
    ) -> Result<bool, StoreError> {
        match self {
            Self::Null => Ok(false),
            Self::System => Ok(true),
            Self::User(actor) => check_user(query, *actor, action),
        }
    }

    /// Returns the acting user id, if any.
    #[must_use]
    pub const fn actor(&self) -> Option<UserId> {
        match self {
            Self::User(id) => Some(*id),
            Self::Null | Self::System => None,
        }
    }
}

/// Policy table for authenticated, non-system actors.
fn check_user(
    query: &dyn PolicyQuery,
    actor: UserId,
    action: &Action,
) -> Result<bool, StoreError> {
    // A system admin passes every check.
    if query.user_rank(actor)? == Some(UserRank::Admin) {
        return Ok(true);
    }

    let allowed = match action {
        Action::UserRead { .. } | Action::DoorRead { .. } | Action::GroupCreate => true,

        Action::UserReadEmail { user_id } | Action::UserUpdate { user_id } => *user_id == actor,

        Action::UserUpdateRank { .. }
        | Action::UserManageValidity { .. }
        | Action::UserCreate
        | Action::DoorCreate
        | Action::DoorUpdate { .. }
        | Action::DoorDelete { .. } => false,

        Action::GroupRead { group_id } => query.group_rank(actor, *group_id)?.is_some(),

        Action::GroupUpdate { group_id }
        | Action::GroupDelete { group_id }
        | Action::GroupManageMembership { group_id } => {
            query.group_rank(actor, *group_id)? == Some(GroupRank::Admin)
        },

        Action::MembershipRead { membership_id } => {
            match query.find_membership(*membership_id)? {
                None => false,
                Some(membership) => {
                    membership.user_id == actor
                        || query.group_rank(actor, membership.group_id)?.is_some()
                },
            }
        },
    };
    Ok(allowed)
}
