//! Clustered Chat Library
//!
//! This library crate defines the modules of a chat node that shares its
//! state with its peers without a central database. It serves as the
//! foundation for the binary executable (`main.rs`).
//!
//! ## Architecture Modules
//!
//! - **`membership`**: The cluster coordination layer. Uses a UDP-based Gossip protocol
//!   (SWIM-like) for node discovery and failure detection, and reports joins and failures.
//! - **`cluster`**: Node-to-node plumbing. One message protocol over HTTP (or in-process
//!   for tests) carrying forwards, partition replication and relayed publishes.
//! - **`forward`**: Ownership forwarding. Runs a named handler on the node owning some
//!   state and reports a tri-state result (success / failure / ignore) exactly once.
//! - **`storage`**: Replicated partitioned map and list, a master-serialized counter,
//!   an additive cluster counter and a bounded history buffer.
//! - **`messaging`**: Local client sessions, channel subscriptions and long-poll mailboxes.
//! - **`chat`**: Rooms, members, users, chat and history, built on the modules above.
//! - **`config`**: Command-line flags and per-node bootstrap files.

pub mod chat;
pub mod cluster;
pub mod config;
pub mod forward;
pub mod membership;
pub mod messaging;
pub mod storage;
