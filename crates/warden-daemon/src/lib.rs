//! Control-plane daemon for the Warden access-control platform.
//!
//! The daemon accepts framed text connections, decodes command envelopes,
//! and routes them through a permission-gated handler registry:
//!
//! ```text
//! ┌────────────┐   lines    ┌──────────────┐   events   ┌────────────────┐
//! │ connection │──────────▶│ server loop   │──────────▶│   Dispatcher   │
//! └────────────┘           └──────────────┘            │  ┌──────────┐  │
//!                                                      │  │ sessions │  │
//!      reply ◀──────────────────────────────────────── │  └──────────┘  │
//!                                                      │  ┌──────────┐  │
//!                                                      │  │ handlers │  │
//!                                                      │  └──────────┘  │
//!                                                      └───────┬────────┘
//!                                                              ▼
//!                                                    warden-core (store,
//!                                                    policy, audit)
//! ```
//!
//! # Module Overview
//!
//! - [`protocol`]: request/response envelopes and wire shapes
//! - [`conditions`]: the AND-of-OR precondition guard evaluated per request
//! - [`context`]: per-request state handed to handlers
//! - [`session`]: per-connection actor/authentication registry
//! - [`dispatch`]: command-name → handler-factory routing
//! - [`api`]: the command handlers themselves
//! - [`server`]: transport loop feeding the dispatcher
//!
//! # Execution model
//!
//! All dispatching happens on a single task: one request is fully processed
//! (decode → conditions → transaction → response) before the next event is
//! dequeued, and a connection's close event is ordered after its in-flight
//! requests. Store transactions are the sole unit of atomicity.

pub mod api;
pub mod conditions;
pub mod context;
pub mod dispatch;
pub mod protocol;
pub mod server;
pub mod session;

pub use dispatch::{Dispatcher, DispatcherConfig};
pub use session::ConnectionId;
