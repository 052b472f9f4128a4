use dashmap::{DashMap, DashSet};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use uuid::Uuid;

/// A message queued for a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub channel: String,
    pub data: Value,
}

/// A connected client: attributes, channel subscriptions and a mailbox
/// drained by long-polling.
pub struct ClientSession {
    id: String,
    attributes: DashMap<String, Value>,
    subscriptions: DashSet<String>,
    mailbox: Mutex<VecDeque<Delivery>>,
    notify: Notify,
    last_seen: Mutex<Instant>,
}

impl ClientSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            attributes: DashMap::new(),
            subscriptions: DashSet::new(),
            mailbox: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            last_seen: Mutex::new(Instant::now()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn attribute<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.attributes.get(key).map(|entry| entry.value().clone())?;
        serde_json::from_value(value).ok()
    }

    /// Stores `value` under `key` and returns the value it replaced.
    pub fn set_attribute<T: Serialize>(
        &self,
        key: &str,
        value: &T,
    ) -> serde_json::Result<Option<Value>> {
        let value = serde_json::to_value(value)?;
        Ok(self.attributes.insert(key.to_string(), value))
    }

    pub fn remove_attribute(&self, key: &str) -> Option<Value> {
        self.attributes.remove(key).map(|(_, value)| value)
    }

    pub fn subscribe(&self, channel: &str) {
        self.subscriptions.insert(channel.to_string());
    }

    pub fn unsubscribe(&self, channel: &str) -> bool {
        self.subscriptions.remove(channel).is_some()
    }

    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.subscriptions
            .iter()
            .any(|pattern| channel_matches(pattern.key(), channel))
    }

    /// Queues a message for the client and wakes a pending poll.
    pub fn deliver(&self, channel: &str, data: Value) {
        let mut mailbox = self.mailbox.lock().unwrap_or_else(|e| e.into_inner());
        mailbox.push_back(Delivery {
            channel: channel.to_string(),
            data,
        });
        drop(mailbox);
        self.notify.notify_one();
    }

    pub fn drain(&self) -> Vec<Delivery> {
        let mut mailbox = self.mailbox.lock().unwrap_or_else(|e| e.into_inner());
        mailbox.drain(..).collect()
    }

    /// Returns pending deliveries, waiting up to `max_wait` for the first one.
    pub async fn poll(&self, max_wait: Duration) -> Vec<Delivery> {
        self.touch();
        let pending = self.drain();
        if !pending.is_empty() {
            return pending;
        }

        let _ = tokio::time::timeout(max_wait, self.notify.notified()).await;
        self.touch();
        self.drain()
    }

    pub fn touch(&self) {
        *self.last_seen.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        let last_seen = *self.last_seen.lock().unwrap_or_else(|e| e.into_inner());
        now.saturating_duration_since(last_seen)
    }
}

impl Default for ClientSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Channel pattern matching: `/a/*` matches one trailing segment, `/a/**`
/// any number of them, anything else must match exactly.
pub fn channel_matches(pattern: &str, channel: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix("/**") {
        return channel
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/') && rest.len() > 1);
    }
    if let Some(prefix) = pattern.strip_suffix("/*") {
        return channel
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('/'))
            .is_some_and(|segment| !segment.is_empty() && !segment.contains('/'));
    }
    pattern == channel
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_patterns() {
        assert!(channel_matches("/chat/1", "/chat/1"));
        assert!(channel_matches("/chat/*", "/chat/1"));
        assert!(!channel_matches("/chat/*", "/chat/1/x"));
        assert!(!channel_matches("/chat/*", "/chat"));
        assert!(channel_matches("/chat/**", "/chat/1/x"));
        assert!(!channel_matches("/chat/**", "/chatter/1"));
    }

    #[tokio::test]
    async fn test_poll_returns_queued_delivery() {
        let session = ClientSession::new();
        session.deliver("/rooms", serde_json::json!([]));

        let deliveries = session.poll(Duration::from_millis(10)).await;

        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].channel, "/rooms");
        assert!(session.drain().is_empty());
    }

    #[tokio::test]
    async fn test_poll_times_out_empty() {
        let session = ClientSession::new();
        let deliveries = session.poll(Duration::from_millis(10)).await;
        assert!(deliveries.is_empty());
    }

    #[test]
    fn test_typed_attributes() {
        let session = ClientSession::new();
        assert_eq!(session.set_attribute("counted", &true).unwrap(), None);

        assert_eq!(session.attribute::<bool>("counted"), Some(true));
        assert_eq!(session.attribute::<bool>("missing"), None);
        assert_eq!(
            session.set_attribute("counted", &false).unwrap(),
            Some(serde_json::json!(true))
        );
    }
}
