//! Ownership Forwarding Module
//!
//! Routes an action to the single node authoritative for an entity and
//! delivers the answer asynchronously.
//!
//! ## Core Concepts
//! - **Tri-state result**: handlers answer `Success`, `Failure` or `Ignore`.
//! - **Registry**: every node registers the same handlers by service name.
//! - **Exactly-once callback**: each forward ends in exactly one of
//!   `on_succeeded`, `on_failed` or `on_ignored`; unreachable targets and
//!   timeouts end in `on_failed`.

pub mod registry;
pub mod service;
pub mod types;


pub use service::ForwardingService;
pub use types::{ForwardCallback, ForwardFailure, ForwardOutcome, ForwardRequest, ForwardResult};
