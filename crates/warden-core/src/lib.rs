//! Core domain library for the Warden access-control platform.
//!
//! This crate holds everything the daemon's control plane builds on:
//!
//! - [`model`]: domain entities (users, groups, memberships, doors) and
//!   their rank/validity vocabulary
//! - [`security`]: the [`SecurityContext`](security::SecurityContext) policy
//!   evaluator and the closed [`Action`](security::Action) set it decides on
//! - [`store`]: the SQLite-backed entity store with closure-scoped
//!   transactions ([`Db::transaction`](store::Db::transaction))
//! - [`audit`]: transaction-bound audit events with before/after snapshots
//! - [`serialize`]: permission-filtered wire serialization of entities
//! - [`error`]: the request failure taxonomy shared with the daemon
//! - [`config`]: daemon configuration parsing
//!
//! # Layering
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │   serialize (permission-gated wire)     │
//! ├──────────────────┬──────────────────────┤
//! │     security     │        audit         │
//! ├──────────────────┴──────────────────────┤
//! │         store (transactions)            │
//! ├─────────────────────────────────────────┤
//! │         model (plain entities)          │
//! └─────────────────────────────────────────┘
//! ```
//!
//! The crate is transport-agnostic: nothing here knows about connections,
//! sessions, or envelopes. Those live in `warden-daemon`.

pub mod audit;
pub mod config;
pub mod error;
pub mod model;
pub mod security;
pub mod serialize;
pub mod store;

pub use audit::{AuditEvent, AuditTarget, EventMask};
pub use config::{ConfigError, WardenConfig};
pub use error::{ApiError, ApiResult, StoreError};
pub use model::{
    Door, DoorId, Group, GroupId, GroupRank, Membership, MembershipId, User, UserId, UserRank,
    Validity,
};
pub use security::{Action, PolicyQuery, SecurityContext};
pub use store::{Db, StoreRead, Tx};
