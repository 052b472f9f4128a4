//! Messaging Module Tests
//!
//! Session lifecycle, listener notification and channel fan-out.

#[cfg(test)]
mod tests {
    use crate::messaging::{ClientSession, MessageHub, SessionListener};
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingListener {
        added: AtomicUsize,
        removed: AtomicUsize,
        expired: AtomicUsize,
    }

    impl SessionListener for CountingListener {
        fn session_added(&self, _session: &Arc<ClientSession>) {
            self.added.fetch_add(1, Ordering::SeqCst);
        }

        fn session_removed(&self, _session: &Arc<ClientSession>, expired: bool) {
            self.removed.fetch_add(1, Ordering::SeqCst);
            if expired {
                self.expired.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    // ============================================================
    // LIFECYCLE TESTS
    // ============================================================

    #[test]
    fn test_open_and_close_notify_listeners() {
        let hub = MessageHub::new();
        let listener = Arc::new(CountingListener::default());
        hub.add_listener(listener.clone());

        let session = Arc::new(ClientSession::new());
        hub.open_session(session.clone());
        assert_eq!(hub.session_count(), 1);
        assert!(hub.find_session(session.id()).is_some());

        assert!(hub.close_session(session.id(), false));
        assert!(!hub.close_session(session.id(), false), "second close is a no-op");

        assert_eq!(listener.added.load(Ordering::SeqCst), 1);
        assert_eq!(listener.removed.load(Ordering::SeqCst), 1);
        assert_eq!(listener.expired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_reap_idle_expires_silent_sessions() {
        let hub = MessageHub::new();
        let listener = Arc::new(CountingListener::default());
        hub.add_listener(listener.clone());
        hub.open_session(Arc::new(ClientSession::new()));

        assert_eq!(hub.reap_idle(Duration::from_secs(60)), 0);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(hub.reap_idle(Duration::from_millis(5)), 1);

        assert_eq!(hub.session_count(), 0);
        assert_eq!(listener.expired.load(Ordering::SeqCst), 1);
    }

    // ============================================================
    // FAN-OUT TESTS
    // ============================================================

    #[test]
    fn test_publish_reaches_only_subscribers() {
        let hub = MessageHub::new();
        let alice = Arc::new(ClientSession::new());
        let bob = Arc::new(ClientSession::new());
        hub.open_session(alice.clone());
        hub.open_session(bob.clone());

        assert!(hub.subscribe(alice.id(), "/chat/*"));
        assert!(hub.subscribe(bob.id(), "/users"));

        let recipients = hub.publish_local("/chat/7", json!({"text": "hi"}));

        assert_eq!(recipients, 1);
        assert_eq!(alice.drain().len(), 1);
        assert!(bob.drain().is_empty());
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let hub = MessageHub::new();
        let session = Arc::new(ClientSession::new());
        hub.open_session(session.clone());

        hub.subscribe(session.id(), "/rooms");
        assert!(hub.unsubscribe(session.id(), "/rooms"));
        hub.publish_local("/rooms", json!([]));

        assert!(session.drain().is_empty());
        assert!(!hub.subscribe("missing", "/rooms"));
    }
}
