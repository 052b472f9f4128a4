//! Distributed State Module
//!
//! Shared state without a central database.
//!
//! ## Core Concepts
//! - **Partitioning by writer**: every node owns a local partition and is its
//!   only writer; peers keep cached copies. No write-write conflicts arise, so
//!   merges are plain unions.
//! - **Replication**: each local mutation pushes the whole partition with a
//!   new `(epoch, seq)` version; stale or duplicated pushes are dropped and
//!   a restarted writer outranks its previous run.
//! - **Collections**: `ReplicatedMap` (single writer per key) and
//!   `ReplicatedList` (set union, any node adds its own elements).
//! - **Counters**: `DistributedCounter` sums per-node shares,
//!   `MasterCounter` serializes increments on one static master.
//! - **History**: `BoundedHistory` is a local FIFO, never replicated.

pub mod counter;
pub mod history;
pub mod list;
pub mod map;
pub mod master;
mod partition;

#[cfg(test)]
mod tests;

use crate::membership::types::NodeId;

pub use counter::DistributedCounter;
pub use history::BoundedHistory;
pub use list::{ElementEvent, ElementListener, ReplicatedList};
pub use map::{EntryEvent, EntryListener, ReplicatedMap};
pub use master::{CounterCallback, MasterCounter};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReplicaError {
    /// The key lives in another node's partition; only that node may write it.
    #[error("key {key} of '{object}' is owned by node {owner}")]
    NotOwner {
        object: String,
        key: String,
        owner: NodeId,
    },
}
