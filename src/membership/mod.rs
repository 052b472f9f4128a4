//! Membership & Discovery Module
//!
//! A small gossip protocol (SWIM-like) that tells each node who its peers are,
//! where their cluster endpoint lives and whether they are still reachable.
//!
//! ## Core Mechanisms
//! - **Join**: a starting node announces itself to its seed nodes.
//! - **Ping/Ack**: periodic probes of a random peer; acks carry the member list.
//! - **Failure Detection**: `Alive` -> `Suspect` -> `Dead` with timeouts.
//! - **Events**: joins and failures are published so replicated state can be
//!   pushed to new nodes and dropped for dead ones.

pub mod service;
pub mod types;

#[cfg(test)]
mod tests;
