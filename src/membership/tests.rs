//! Membership Module Tests
//!
//! Validates the gossip wire format and the state machine that decides who is
//! alive.
//!
//! ## Test Scopes
//! - **Data Structures**: identity semantics and wire serialization.
//! - **Service Logic**: initialization, join/ack handling, address defaults.
//! - **Failure Detection**: Alive -> Suspect -> Dead transitions and events.

#[cfg(test)]
mod tests {
    use crate::membership::service::MembershipService;
    use crate::membership::types::{GossipMessage, MembershipEvent, Node, NodeId, NodeState};
    use std::net::SocketAddr;
    use std::time::{Duration, Instant};
    use tokio::net::UdpSocket;

    fn peer(id: &str, port: u16, incarnation: u64) -> Node {
        Node {
            id: NodeId::from(id),
            gossip_addr: format!("127.0.0.1:{}", port).parse().unwrap(),
            http_addr: format!("127.0.0.1:{}", port + 1000).parse().unwrap(),
            state: NodeState::Alive,
            incarnation,
            last_seen: None,
        }
    }

    async fn service(id: &str) -> std::sync::Arc<MembershipService> {
        MembershipService::new(NodeId::from(id), "127.0.0.1:0".parse().unwrap(), None, vec![])
            .await
            .expect("Failed to create service")
    }

    async fn reply_socket() -> (UdpSocket, SocketAddr) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        (socket, addr)
    }

    // ============================================================
    // NODE ID TESTS
    // ============================================================

    #[test]
    fn test_node_id_equality() {
        let id1 = NodeId::new("test-123");
        let id2 = NodeId::from("test-123");
        let id3 = NodeId::new("test-456");

        assert_eq!(id1, id2);
        assert_ne!(id1, id3);
        assert_eq!(id1.to_string(), "test-123");
    }

    #[test]
    fn test_node_id_hash() {
        use std::collections::HashSet;

        let mut set = HashSet::new();
        set.insert(NodeId::from("node-1"));
        set.insert(NodeId::from("node-1")); // duplicate
        set.insert(NodeId::from("node-2"));

        assert_eq!(set.len(), 2, "HashSet should have 2 unique NodeIds");
    }

    // ============================================================
    // WIRE FORMAT TESTS
    // ============================================================

    #[test]
    fn test_node_serialization_skips_last_seen() {
        let mut node = peer("test-node", 5000, 42);
        node.last_seen = Some(Instant::now());

        let json = serde_json::to_string(&node).expect("Serialization failed");
        let restored: Node = serde_json::from_str(&json).expect("Deserialization failed");

        assert_eq!(restored.id, node.id);
        assert_eq!(restored.http_addr, node.http_addr);
        assert_eq!(restored.incarnation, 42);
        assert!(restored.last_seen.is_none());
    }

    #[test]
    fn test_gossip_ack_bincode() {
        let msg = GossipMessage::Ack {
            from: peer("responder", 5000, 10),
            members: vec![peer("node-1", 5001, 1), peer("node-2", 5002, 2)],
        };

        let encoded = bincode::serialize(&msg).expect("Failed to serialize Ack");
        let decoded: GossipMessage =
            bincode::deserialize(&encoded).expect("Failed to deserialize Ack");

        if let GossipMessage::Ack { from, members } = decoded {
            assert_eq!(from.id.as_str(), "responder");
            assert_eq!(from.incarnation, 10);
            assert_eq!(members.len(), 2);
        } else {
            panic!("Wrong message type");
        }
    }

    // ============================================================
    // MEMBERSHIP SERVICE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_membership_service_creation() {
        let service = service("solo").await;

        assert_eq!(service.members.len(), 1);
        let alive = service.get_alive_members();
        assert_eq!(alive.len(), 1);
        assert_eq!(alive[0].id, NodeId::from("solo"));
        assert!(service.reachable_peers().is_empty());
    }

    #[tokio::test]
    async fn test_membership_http_addr_defaults_to_offset() {
        let service = service("offset").await;

        let gossip_port = service.local_node.gossip_addr.port();
        assert_eq!(
            service.local_node.http_addr.port(),
            gossip_port.wrapping_add(1000)
        );
    }

    #[tokio::test]
    async fn test_membership_explicit_http_addr() {
        let http: SocketAddr = "127.0.0.1:7777".parse().unwrap();
        let service = MembershipService::new(
            NodeId::from("explicit"),
            "127.0.0.1:0".parse().unwrap(),
            Some(http),
            vec![],
        )
        .await
        .unwrap();

        assert_eq!(service.local_node.http_addr, http);
    }

    #[tokio::test]
    async fn test_join_adds_member_and_emits_event() {
        // ARRANGE
        let service = service("local").await;
        let mut events = service.subscribe();
        let (_socket, src) = reply_socket().await;

        // ACT
        service
            .handle_message(
                GossipMessage::Join {
                    node: peer("remote", 5100, 1),
                },
                src,
            )
            .await
            .unwrap();

        // ASSERT
        let member = service.get_member(&NodeId::from("remote")).unwrap();
        assert_eq!(member.state, NodeState::Alive);
        match events.try_recv().unwrap() {
            MembershipEvent::Joined(node) => assert_eq!(node.id, NodeId::from("remote")),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ack_merges_member_list_without_self() {
        let service = service("local").await;
        let (_socket, src) = reply_socket().await;

        let mut me = service.local_node.clone();
        me.incarnation = 99;
        service
            .handle_message(
                GossipMessage::Ack {
                    from: peer("a", 5200, 1),
                    members: vec![peer("b", 5201, 1), me],
                },
                src,
            )
            .await
            .unwrap();

        assert_eq!(service.members.len(), 3);
        assert_eq!(
            service.get_member(&service.local_node.id).unwrap().incarnation,
            1,
            "own entry is never overwritten by gossip"
        );
    }

    #[tokio::test]
    async fn test_dead_members_are_not_learned_from_gossip() {
        let service = service("local").await;
        let (_socket, src) = reply_socket().await;

        let mut ghost = peer("ghost", 5300, 3);
        ghost.state = NodeState::Dead;
        service
            .handle_message(
                GossipMessage::Ack {
                    from: peer("a", 5301, 1),
                    members: vec![ghost],
                },
                src,
            )
            .await
            .unwrap();

        assert!(service.get_member(&NodeId::from("ghost")).is_none());
    }

    // ============================================================
    // FAILURE DETECTION TESTS
    // ============================================================

    #[tokio::test]
    async fn test_silent_member_becomes_suspect_then_dead() {
        // ARRANGE
        let service = service("local").await;
        let (_socket, src) = reply_socket().await;
        service
            .handle_message(
                GossipMessage::Join {
                    node: peer("quiet", 5400, 1),
                },
                src,
            )
            .await
            .unwrap();
        let mut events = service.subscribe();
        let start = Instant::now();

        // ACT & ASSERT: suspicion first
        let msgs = service.detect_failures(start + Duration::from_secs(6));
        assert_eq!(msgs.len(), 1);
        assert!(matches!(msgs[0], GossipMessage::Suspect { .. }));
        assert_eq!(
            service.get_member(&NodeId::from("quiet")).unwrap().state,
            NodeState::Suspect
        );

        // ACT & ASSERT: then death
        service.detect_failures(start + Duration::from_secs(11));
        assert_eq!(
            service.get_member(&NodeId::from("quiet")).unwrap().state,
            NodeState::Dead
        );
        assert!(service.reachable_peers().is_empty());
        match events.try_recv().unwrap() {
            MembershipEvent::Failed(id) => assert_eq!(id, NodeId::from("quiet")),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_contact_revives_dead_member() {
        let service = service("local").await;
        let (_socket, src) = reply_socket().await;
        let ping = || GossipMessage::Ping {
            from: peer("flaky", 5500, 1),
        };

        service.handle_message(ping(), src).await.unwrap();
        let start = Instant::now();
        service.detect_failures(start + Duration::from_secs(6));
        service.detect_failures(start + Duration::from_secs(11));

        let mut events = service.subscribe();
        service.handle_message(ping(), src).await.unwrap();

        assert_eq!(
            service.get_member(&NodeId::from("flaky")).unwrap().state,
            NodeState::Alive
        );
        assert!(matches!(
            events.try_recv().unwrap(),
            MembershipEvent::Joined(_)
        ));
    }

    #[tokio::test]
    async fn test_alive_refutes_suspicion() {
        let service = service("local").await;
        let (_socket, src) = reply_socket().await;
        service
            .handle_message(
                GossipMessage::Join {
                    node: peer("x", 5600, 1),
                },
                src,
            )
            .await
            .unwrap();

        service
            .handle_message(
                GossipMessage::Suspect {
                    node_id: NodeId::from("x"),
                    incarnation: 1,
                },
                src,
            )
            .await
            .unwrap();
        assert_eq!(
            service.get_member(&NodeId::from("x")).unwrap().state,
            NodeState::Suspect
        );

        service
            .handle_message(
                GossipMessage::Alive {
                    node_id: NodeId::from("x"),
                    incarnation: 2,
                },
                src,
            )
            .await
            .unwrap();
        let member = service.get_member(&NodeId::from("x")).unwrap();
        assert_eq!(member.state, NodeState::Alive);
        assert_eq!(member.incarnation, 2);
    }
}
