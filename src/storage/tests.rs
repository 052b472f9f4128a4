//! Storage Module Tests
//!
//! Validates the replicated primitives over an in-process network.
//!
//! ## Test Scopes
//! - **BoundedHistory**: FIFO eviction under capacity.
//! - **ReplicatedMap / ReplicatedList**: replication, union merge, ownership,
//!   listeners and stale snapshots.
//! - **Counters**: additive sums and master-serialized increments.

#[cfg(test)]
mod tests {
    use crate::cluster::{ReplicaSink, Version};
    use crate::cluster::loopback::LoopbackNetwork;
    use crate::membership::types::NodeId;
    use crate::storage::{
        BoundedHistory, CounterCallback, DistributedCounter, EntryEvent, EntryListener,
        MasterCounter, ReplicaError, ReplicatedList, ReplicatedMap,
    };
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[derive(Default)]
    struct Recorder {
        puts: Mutex<Vec<(i64, bool)>>,
        removes: Mutex<Vec<(i64, bool)>>,
    }

    impl EntryListener<i64, String> for Recorder {
        fn on_put(&self, event: &EntryEvent<i64, String>) {
            self.puts.lock().unwrap().push((event.key, event.is_local));
        }

        fn on_removed(&self, event: &EntryEvent<i64, String>) {
            self.removes.lock().unwrap().push((event.key, event.is_local));
        }
    }

    fn two_maps(
        network: &Arc<LoopbackNetwork>,
    ) -> (
        Arc<ReplicatedMap<i64, String>>,
        Arc<ReplicatedMap<i64, String>>,
    ) {
        let a = ReplicatedMap::new(network.node("A"), "things");
        let b = ReplicatedMap::new(network.node("B"), "things");
        a.start();
        b.start();
        (a, b)
    }

    // ============================================================
    // BOUNDED HISTORY TESTS
    // ============================================================

    #[test]
    fn test_history_keeps_last_entries_in_order() {
        let history = BoundedHistory::new(5);

        let evicted: Vec<i32> = (1..=8).filter_map(|i| history.push(i)).collect();

        assert_eq!(history.len(), 5);
        assert_eq!(history.snapshot(), vec![4, 5, 6, 7, 8]);
        assert_eq!(evicted, vec![1, 2, 3], "exactly N - C evictions, oldest first");
    }

    #[test]
    fn test_history_zero_capacity_rejects_everything() {
        let history = BoundedHistory::new(0);
        assert_eq!(history.push("x"), Some("x"));
        assert!(history.is_empty());
    }

    #[test]
    fn test_history_concurrent_pushes_respect_capacity() {
        let history = Arc::new(BoundedHistory::new(10));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let history = history.clone();
                std::thread::spawn(move || {
                    let mut evicted = 0;
                    for i in 0..100 {
                        if history.push(t * 1000 + i).is_some() {
                            evicted += 1;
                        }
                    }
                    evicted
                })
            })
            .collect();

        let evicted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(history.len(), 10);
        assert_eq!(evicted, 390);
    }

    // ============================================================
    // REPLICATED MAP TESTS
    // ============================================================

    #[tokio::test]
    async fn test_map_put_is_visible_on_peer() {
        // ARRANGE
        let network = LoopbackNetwork::new();
        let (a, b) = two_maps(&network);

        // ACT
        let previous = a.put_and_share(7, "Lobby".to_string()).unwrap();

        // ASSERT
        assert_eq!(previous, None);
        assert_eq!(b.find(&7), Some("Lobby".to_string()));
        assert_eq!(b.get_local(&7), None, "peer copy is not part of B's partition");
        assert_eq!(b.find_owner(&7), Some(NodeId::from("A")));
        assert_eq!(a.find_owner(&7), Some(NodeId::from("A")));
    }

    #[tokio::test]
    async fn test_map_merge_is_union_of_disjoint_partitions() {
        let network = LoopbackNetwork::new();
        let (a, b) = two_maps(&network);

        for key in 1..=3 {
            a.put_and_share(key, format!("a{}", key)).unwrap();
        }
        for key in 4..=5 {
            b.put_and_share(key, format!("b{}", key)).unwrap();
        }

        for map in [&a, &b] {
            let merged = map.merge();
            assert_eq!(merged.len(), 5);
            assert_eq!(merged.get(&2), Some(&"a2".to_string()));
            assert_eq!(merged.get(&5), Some(&"b5".to_string()));
        }
    }

    #[tokio::test]
    async fn test_map_replace_keeps_key_and_returns_new_value() {
        let network = LoopbackNetwork::new();
        let (a, b) = two_maps(&network);

        a.put_and_share(7, "Lobby".to_string()).unwrap();
        let previous = a.put_and_share(7, "Hall".to_string()).unwrap();

        assert_eq!(previous, Some("Lobby".to_string()));
        assert_eq!(b.find(&7), Some("Hall".to_string()));
        assert_eq!(b.merge().len(), 1);
    }

    #[tokio::test]
    async fn test_map_rejects_write_to_foreign_key() {
        let network = LoopbackNetwork::new();
        let (a, b) = two_maps(&network);
        a.put_and_share(7, "Lobby".to_string()).unwrap();

        let result = b.put_and_share(7, "Hijack".to_string());

        match result {
            Err(ReplicaError::NotOwner { owner, .. }) => assert_eq!(owner, NodeId::from("A")),
            other => panic!("expected NotOwner, got {:?}", other),
        }
        assert_eq!(a.find(&7), Some("Lobby".to_string()));
    }

    #[tokio::test]
    async fn test_map_listeners_tag_origin() {
        let network = LoopbackNetwork::new();
        let a = ReplicatedMap::new(network.node("A"), "things");
        let b = ReplicatedMap::new(network.node("B"), "things");
        let on_a = Arc::new(Recorder::default());
        let on_b = Arc::new(Recorder::default());
        a.add_listener(on_a.clone());
        b.add_listener(on_b.clone());
        a.start();
        b.start();

        a.put_and_share(1, "one".to_string()).unwrap();
        a.remove_and_share(&1);

        assert_eq!(*on_a.puts.lock().unwrap(), vec![(1, true)]);
        assert_eq!(*on_a.removes.lock().unwrap(), vec![(1, true)]);
        assert_eq!(*on_b.puts.lock().unwrap(), vec![(1, false)]);
        assert_eq!(*on_b.removes.lock().unwrap(), vec![(1, false)]);
        assert_eq!(b.find(&1), None);
    }

    #[tokio::test]
    async fn test_map_late_starter_receives_existing_partitions() {
        let network = LoopbackNetwork::new();
        let a = ReplicatedMap::<i64, String>::new(network.node("A"), "things");
        a.start();
        a.put_and_share(1, "one".to_string()).unwrap();

        let b = ReplicatedMap::<i64, String>::new(network.node("B"), "things");
        b.start();

        assert_eq!(b.find(&1), Some("one".to_string()));
    }

    #[tokio::test]
    async fn test_map_drops_stale_and_duplicate_snapshots() {
        let network = LoopbackNetwork::new();
        let b = ReplicatedMap::<i64, String>::new(network.node("B"), "things");
        let origin = NodeId::from("A");

        b.apply_remote(&origin, Version::new(5, 2), serde_json::json!([[1, "new"]])).unwrap();
        b.apply_remote(&origin, Version::new(5, 1), serde_json::json!([[1, "old"]])).unwrap();
        b.apply_remote(&origin, Version::new(5, 2), serde_json::json!([])).unwrap();
        b.apply_remote(&origin, Version::new(4, 9), serde_json::json!([])).unwrap();

        assert_eq!(b.find(&1), Some("new".to_string()));
    }

    #[tokio::test]
    async fn test_map_newer_epoch_replaces_partition_with_higher_seq() {
        let network = LoopbackNetwork::new();
        let b = ReplicatedMap::<i64, String>::new(network.node("B"), "things");
        let origin = NodeId::from("A");

        b.apply_remote(&origin, Version::new(5, 40), serde_json::json!([[1, "old"]])).unwrap();
        b.apply_remote(&origin, Version::new(6, 1), serde_json::json!([[2, "new"]])).unwrap();

        assert_eq!(b.find(&1), None);
        assert_eq!(b.find(&2), Some("new".to_string()));
    }

    #[tokio::test]
    async fn test_map_restarted_writer_replaces_its_old_partition() {
        // ARRANGE
        let network = LoopbackNetwork::new();
        let (a, b) = two_maps(&network);
        let on_b = Arc::new(Recorder::default());
        b.add_listener(on_b.clone());
        a.put_and_share(1, "one".to_string()).unwrap();
        a.put_and_share(2, "two".to_string()).unwrap();
        a.put_and_share(3, "three".to_string()).unwrap();

        // ACT: A restarts under the same id before anyone declares it dead
        drop(a);
        let a = ReplicatedMap::<i64, String>::new(network.node("A"), "things");
        a.start();

        // ASSERT: the empty partition pushed on start wins over the old one
        assert!(b.merge().is_empty());
        let mut removed = on_b.removes.lock().unwrap().clone();
        removed.sort();
        assert_eq!(removed, vec![(1, false), (2, false), (3, false)]);

        a.put_and_share(10, "ten".to_string()).unwrap();
        assert_eq!(b.find(&10), Some("ten".to_string()));
        assert_eq!(b.find_owner(&10), Some(NodeId::from("A")));
        assert_eq!(b.merge().len(), 1);
    }

    #[tokio::test]
    async fn test_map_forget_drops_partition_of_failed_node() {
        let network = LoopbackNetwork::new();
        let (a, b) = two_maps(&network);
        let on_b = Arc::new(Recorder::default());
        b.add_listener(on_b.clone());
        a.put_and_share(3, "three".to_string()).unwrap();

        b.forget(&NodeId::from("A"));

        assert_eq!(b.find(&3), None);
        assert_eq!(*on_b.removes.lock().unwrap(), vec![(3, false)]);
    }

    // ============================================================
    // REPLICATED LIST TESTS
    // ============================================================

    #[tokio::test]
    async fn test_list_union_across_nodes() {
        let network = LoopbackNetwork::new();
        let a = ReplicatedList::<String>::new(network.node("A"), "members_room_7");
        let b = ReplicatedList::<String>::new(network.node("B"), "members_room_7");
        a.start();
        b.start();

        assert!(a.add_and_share("alice".to_string()));
        assert!(b.add_and_share("bob".to_string()));
        assert!(!a.add_and_share("alice".to_string()), "duplicate add is a no-op");

        for list in [&a, &b] {
            let merged: HashSet<String> = list.merge().into_iter().collect();
            assert_eq!(merged.len(), 2);
            assert!(list.is_present(&"alice".to_string()));
            assert!(list.is_present(&"bob".to_string()));
        }
    }

    #[tokio::test]
    async fn test_list_remove_propagates() {
        let network = LoopbackNetwork::new();
        let a = ReplicatedList::<String>::new(network.node("A"), "members_room_7");
        let b = ReplicatedList::<String>::new(network.node("B"), "members_room_7");
        a.start();
        b.start();
        a.add_and_share("alice".to_string());

        assert!(!b.remove_and_share(&"alice".to_string()), "B does not own alice");
        assert!(a.remove_and_share(&"alice".to_string()));

        assert!(!b.is_present(&"alice".to_string()));
        assert!(b.merge().is_empty());
    }

    // ============================================================
    // DISTRIBUTED COUNTER TESTS
    // ============================================================

    #[tokio::test]
    async fn test_counter_sums_every_share() {
        let network = LoopbackNetwork::new();
        let a = DistributedCounter::new(network.node("A"), "user_count");
        let b = DistributedCounter::new(network.node("B"), "user_count");
        a.start();
        b.start();

        assert_eq!(a.add_and_get(3), 3);
        assert_eq!(b.add_and_get(2), 2);
        assert_eq!(a.add_and_get(-1), 2);

        assert_eq!(a.sum(), 4);
        assert_eq!(b.sum(), 4);
        assert_eq!(b.local_value(), 2);

        b.forget(&NodeId::from("A"));
        assert_eq!(b.sum(), 2);
    }

    #[tokio::test]
    async fn test_list_and_counter_survive_writer_restart() {
        let network = LoopbackNetwork::new();
        let list_a = ReplicatedList::<String>::new(network.node("A"), "members_room_7");
        let list_b = ReplicatedList::<String>::new(network.node("B"), "members_room_7");
        list_a.start();
        list_b.start();
        list_a.add_and_share("alice".to_string());
        list_a.add_and_share("carol".to_string());

        drop(list_a);
        let list_a = ReplicatedList::<String>::new(network.node("A"), "members_room_7");
        list_a.start();
        list_a.add_and_share("dave".to_string());

        assert_eq!(list_b.merge(), vec!["dave".to_string()]);

        let count_a = DistributedCounter::new(network.node("C"), "user_count");
        let count_b = DistributedCounter::new(network.node("D"), "user_count");
        count_a.start();
        count_b.start();
        for _ in 0..5 {
            count_a.add_and_get(1);
        }
        assert_eq!(count_b.sum(), 5);

        drop(count_a);
        let count_a = DistributedCounter::new(network.node("C"), "user_count");
        count_a.start();
        count_a.add_and_get(1);

        assert_eq!(count_b.sum(), 1);
    }

    // ============================================================
    // MASTER COUNTER TESTS
    // ============================================================

    struct Reply(oneshot::Sender<Result<i64, String>>);

    impl CounterCallback for Reply {
        fn succeeded(self, value: i64) {
            let _ = self.0.send(Ok(value));
        }

        fn failed(self, reason: String) {
            let _ = self.0.send(Err(reason));
        }
    }

    #[tokio::test]
    async fn test_master_counter_answers_synchronously_on_master() {
        let network = LoopbackNetwork::new();
        let master = MasterCounter::new(network.node("A"), "room_ids", true, 6);
        master.start();

        let (tx, mut rx) = oneshot::channel();
        master.add_and_get(1, Reply(tx));

        assert_eq!(rx.try_recv().unwrap(), Ok(7));
        assert_eq!(master.value(), 7);
    }

    #[tokio::test]
    async fn test_follower_learns_master_and_forwards() {
        let network = LoopbackNetwork::new();
        let master = MasterCounter::new(network.node("A"), "room_ids", true, 10);
        let follower = MasterCounter::new(network.node("B"), "room_ids", false, 0);
        master.start();
        follower.start();

        assert_eq!(follower.master(), Some(NodeId::from("A")));
        assert_eq!(follower.value(), 10);

        let (tx, rx) = oneshot::channel();
        follower.add_and_get(1, Reply(tx));

        assert_eq!(rx.await.unwrap(), Ok(11));
        assert_eq!(master.value(), 11);
        assert_eq!(follower.value(), 11, "master pushes new values to followers");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_are_unique_and_gap_free() {
        // ARRANGE
        let network = LoopbackNetwork::new();
        let master = MasterCounter::new(network.node("A"), "room_ids", true, 100);
        master.start();
        let followers: Vec<_> = ["B", "C", "D"]
            .iter()
            .map(|id| {
                let counter = MasterCounter::new(network.node(id), "room_ids", false, 0);
                counter.start();
                counter
            })
            .collect();

        // ACT
        let mut handles = Vec::new();
        for counter in followers.iter().chain(std::iter::once(&master)) {
            for _ in 0..10 {
                let counter = counter.clone();
                handles.push(tokio::spawn(
                    async move { counter.add_and_get_async(1).await },
                ));
            }
        }
        let mut values = Vec::new();
        for handle in handles {
            values.push(handle.await.unwrap().unwrap());
        }

        // ASSERT
        values.sort();
        assert_eq!(values, (101..=140).collect::<Vec<i64>>());
        assert_eq!(master.value(), 140);
    }

    #[tokio::test]
    async fn test_unreachable_master_fails_follower() {
        let network = LoopbackNetwork::new();
        let master = MasterCounter::new(network.node("A"), "room_ids", true, 0);
        let follower = MasterCounter::new(network.node("B"), "room_ids", false, 0);
        master.start();
        follower.start();
        network.set_unreachable(&NodeId::from("A"), true);

        let (tx, rx) = oneshot::channel();
        follower.add_and_get(1, Reply(tx));

        assert!(rx.await.unwrap().is_err());
        assert_eq!(master.value(), 0);
    }

    #[tokio::test]
    async fn test_follower_without_master_fails_immediately() {
        let network = LoopbackNetwork::new();
        let follower = MasterCounter::new(network.node("B"), "room_ids", false, 0);
        follower.start();

        let (tx, mut rx) = oneshot::channel();
        follower.add_and_get(1, Reply(tx));

        assert!(rx.try_recv().unwrap().is_err());
    }

    #[tokio::test]
    async fn test_forgotten_master_is_not_replaced() {
        let network = LoopbackNetwork::new();
        let master = MasterCounter::new(network.node("A"), "room_ids", true, 0);
        let follower = MasterCounter::new(network.node("B"), "room_ids", false, 0);
        master.start();
        follower.start();

        follower.forget(&NodeId::from("A"));

        assert_eq!(follower.master(), None);
        let result = tokio::time::timeout(Duration::from_secs(1), follower.add_and_get_async(1))
            .await
            .unwrap();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_follower_adopts_value_of_restarted_master() {
        let network = LoopbackNetwork::new();
        let master = MasterCounter::new(network.node("A"), "room_ids", true, 100);
        let follower = MasterCounter::new(network.node("B"), "room_ids", false, 0);
        master.start();
        follower.start();
        for _ in 0..3 {
            master.add_and_get_async(1).await.unwrap();
        }
        assert_eq!(follower.value(), 103);

        drop(master);
        let master = MasterCounter::new(network.node("A"), "room_ids", true, 200);
        master.start();

        assert_eq!(follower.master(), Some(NodeId::from("A")));
        assert_eq!(follower.value(), 200);
    }
}
