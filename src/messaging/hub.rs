use dashmap::DashMap;
use serde_json::Value;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use super::session::ClientSession;

/// Notified when client sessions come and go.
pub trait SessionListener: Send + Sync {
    fn session_added(&self, session: &Arc<ClientSession>);

    /// `expired` is true when the session stopped polling rather than
    /// disconnecting.
    fn session_removed(&self, session: &Arc<ClientSession>, expired: bool);
}

/// Local sessions and channel fan-out of one node.
#[derive(Default)]
pub struct MessageHub {
    sessions: DashMap<String, Arc<ClientSession>>,
    listeners: RwLock<Vec<Arc<dyn SessionListener>>>,
}

impl MessageHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Listeners run in registration order.
    pub fn add_listener(&self, listener: Arc<dyn SessionListener>) {
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(listener);
    }

    fn listeners(&self) -> Vec<Arc<dyn SessionListener>> {
        self.listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn open_session(&self, session: Arc<ClientSession>) {
        tracing::debug!("Session {} opened", session.id());
        self.sessions
            .insert(session.id().to_string(), session.clone());
        for listener in self.listeners() {
            listener.session_added(&session);
        }
    }

    pub fn close_session(&self, session_id: &str, expired: bool) -> bool {
        let Some((_, session)) = self.sessions.remove(session_id) else {
            return false;
        };
        tracing::debug!(
            "Session {} {}",
            session_id,
            if expired { "expired" } else { "closed" }
        );
        for listener in self.listeners() {
            listener.session_removed(&session, expired);
        }
        true
    }

    pub fn find_session(&self, session_id: &str) -> Option<Arc<ClientSession>> {
        self.sessions
            .get(session_id)
            .map(|entry| entry.value().clone())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn subscribe(&self, session_id: &str, channel: &str) -> bool {
        match self.find_session(session_id) {
            Some(session) => {
                session.subscribe(channel);
                true
            }
            None => false,
        }
    }

    pub fn unsubscribe(&self, session_id: &str, channel: &str) -> bool {
        self.find_session(session_id)
            .is_some_and(|session| session.unsubscribe(channel))
    }

    /// Delivers `data` to every local session subscribed to `channel`.
    /// Returns the number of recipients.
    pub fn publish_local(&self, channel: &str, data: Value) -> usize {
        let recipients: Vec<Arc<ClientSession>> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().is_subscribed(channel))
            .map(|entry| entry.value().clone())
            .collect();

        for session in &recipients {
            session.deliver(channel, data.clone());
        }
        tracing::trace!("Published on {} to {} session(s)", channel, recipients.len());
        recipients.len()
    }

    /// Expires sessions that have not polled for longer than `max_idle`.
    pub fn reap_idle(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let idle: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().idle_for(now) > max_idle)
            .map(|entry| entry.key().clone())
            .collect();

        idle.iter()
            .filter(|session_id| self.close_session(session_id, true))
            .count()
    }
}
