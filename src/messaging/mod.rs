//! Messaging Module
//!
//! A minimal publish/subscribe substrate for clients connected to this node:
//! sessions with attributes, channel subscriptions, mailboxes drained by
//! long-polling, and session lifecycle listeners.

pub mod hub;
pub mod session;

#[cfg(test)]
mod tests;

pub use hub::{MessageHub, SessionListener};
pub use session::{ClientSession, Delivery};
