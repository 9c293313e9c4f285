//! Precondition guards for command handlers.
//!
//! A handler declares a [`Guard`]: an ordered list of [`Requirement`]s
//! (AND-groups), each holding OR-alternatives plus the [`Denial`] raised
//! when no alternative is satisfied. Evaluation:
//!
//! - groups run in declaration order;
//! - within a group, alternatives short-circuit on first success;
//! - the first unsatisfied group stops evaluation and raises its denial;
//!   later groups never run, so declaration order encodes which error the
//!   caller sees (a shape check that a permission check depends on must come
//!   first).
//!
//! Conditions are small data-carrying predicates built explicitly from the
//! parsed request, with no hidden captured state, and a guard is rebuilt per
//! request since the predicates hold request-specific values.

use warden_core::{Action, ApiError, GroupId, GroupRank, PolicyQuery, UserRank};

use crate::context::RequestContext;

/// Failure raised by an unsatisfied requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    /// The request is structurally invalid.
    Malformed(&'static str),
    /// The actor may not perform the operation.
    PermissionDenied,
}

impl Denial {
    /// Materialize the denial as a request error.
    #[must_use]
    pub fn to_error(self) -> ApiError {
        match self {
            Self::Malformed(reason) => ApiError::malformed(reason),
            Self::PermissionDenied => ApiError::PermissionDenied,
        }
    }
}

/// One predicate over the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// Satisfied iff the precomputed shape check passed. Used for
    /// malformed-input groups whose verdict is known at parse time.
    WellFormed(bool),
    /// The session is bound to an authenticated actor.
    Authenticated,
    /// The request targets a group that does not exist yet (id `0`), i.e. a
    /// creation.
    TargetIsNewGroup {
        /// Requested group id.
        group_id: GroupId,
    },
    /// The actor holds the system admin rank.
    ActorIsAdmin,
    /// The actor is a member of `group_id` at `at_least` rank.
    ActorInGroup {
        /// Target group.
        group_id: GroupId,
        /// Minimum rank within the group.
        at_least: GroupRank,
    },
    /// The security context passes a policy check for `Action`.
    Permitted(Action),
}

impl Condition {
    /// Evaluate against the current request.
    ///
    /// # Errors
    ///
    /// Propagates store failures from policy lookups; those abort the
    /// request rather than counting as a denial.
    pub fn eval(&self, ctx: &RequestContext) -> Result<bool, ApiError> {
        match self {
            Self::WellFormed(ok) => Ok(*ok),
            Self::Authenticated => Ok(ctx.actor().is_some()),
            Self::TargetIsNewGroup { group_id } => Ok(*group_id == 0),
            Self::ActorIsAdmin => match ctx.actor() {
                None => Ok(false),
                Some(actor) => Ok(ctx.db.user_rank(actor)? == Some(UserRank::Admin)),
            },
            Self::ActorInGroup { group_id, at_least } => match ctx.actor() {
                None => Ok(false),
                Some(actor) => {
                    let rank = ctx.db.group_rank(actor, *group_id)?;
                    Ok(rank.is_some_and(|r| r >= *at_least))
                },
            },
            Self::Permitted(action) => {
                Ok(ctx.security().check_permission(ctx.db.as_ref(), action)?)
            },
        }
    }
}

/// One AND-group: passes if any alternative holds.
#[derive(Debug, Clone)]
pub struct Requirement {
    any_of: Vec<Condition>,
    denial: Denial,
}

/// Ordered conjunction of requirements gating one handler.
#[derive(Debug, Clone, Default)]
pub struct Guard {
    requirements: Vec<Requirement>,
}

impl Guard {
    /// A guard with no requirements; always passes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a requirement: at least one of `any_of` must hold, otherwise
    /// `denial` is raised.
    #[must_use]
    pub fn require(mut self, denial: Denial, any_of: Vec<Condition>) -> Self {
        self.requirements.push(Requirement { any_of, denial });
        self
    }

    /// Evaluate all requirements in declaration order.
    ///
    /// # Errors
    ///
    /// Returns the first unsatisfied requirement's denial, or propagates a
    /// store failure from a policy lookup.
    pub fn check(&self, ctx: &RequestContext) -> Result<(), ApiError> {
        for requirement in &self.requirements {
            let mut satisfied = false;
            for condition in &requirement.any_of {
                if condition.eval(ctx)? {
                    satisfied = true;
                    break;
                }
            }
            if !satisfied {
                return Err(requirement.denial.to_error());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;

    use warden_core::{Db, User};

    use super::*;
    use crate::context::RequestContext;

    fn anon_ctx() -> RequestContext {
        let db = Arc::new(Db::open_in_memory().unwrap());
        RequestContext::new(db, None, None, Duration::hours(1))
    }

    fn admin_ctx() -> RequestContext {
        let db = Arc::new(Db::open_in_memory().unwrap());
        let admin_id = db
            .transaction(|tx| {
                let mut admin = User::new("root");
                admin.rank = UserRank::Admin;
                tx.persist_user(&mut admin)?;
                Ok(admin.id)
            })
            .unwrap();
        RequestContext::new(db, Some(admin_id), None, Duration::hours(1))
    }

    #[test]
    fn test_empty_guard_passes() {
        assert!(Guard::new().check(&anon_ctx()).is_ok());
    }

    #[test]
    fn test_first_failing_group_chooses_the_error() {
        let ctx = anon_ctx();
        // Shape check first, permission second: the malformed denial wins
        // even though the permission group would also fail.
        let guard = Guard::new()
            .require(
                Denial::Malformed("no `attributes` subobject"),
                vec![Condition::WellFormed(false)],
            )
            .require(Denial::PermissionDenied, vec![Condition::Authenticated]);
        match guard.check(&ctx) {
            Err(ApiError::Malformed { reason }) => {
                assert_eq!(reason, "no `attributes` subobject");
            },
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_alternatives_short_circuit() {
        let ctx = admin_ctx();
        // TargetIsNewGroup(0) passes first; the admin lookup never matters.
        let guard = Guard::new().require(
            Denial::PermissionDenied,
            vec![
                Condition::TargetIsNewGroup { group_id: 0 },
                Condition::ActorIsAdmin,
            ],
        );
        assert!(guard.check(&ctx).is_ok());
    }

    #[test]
    fn test_admin_alternative_rescues_group() {
        let ctx = admin_ctx();
        let guard = Guard::new().require(
            Denial::PermissionDenied,
            vec![
                Condition::TargetIsNewGroup { group_id: 33 },
                Condition::ActorInGroup {
                    group_id: 33,
                    at_least: GroupRank::Admin,
                },
                Condition::ActorIsAdmin,
            ],
        );
        assert!(guard.check(&ctx).is_ok());
    }

    #[test]
    fn test_unauthenticated_denied() {
        let ctx = anon_ctx();
        let guard = Guard::new().require(Denial::PermissionDenied, vec![Condition::Authenticated]);
        match guard.check(&ctx) {
            Err(ApiError::PermissionDenied) => {},
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
