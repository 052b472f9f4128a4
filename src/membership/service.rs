use anyhow::Result;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use std::{net::SocketAddr, time::Duration};
use tokio::net::UdpSocket;
use tokio::sync::{RwLock, broadcast};
use tracing::info;

use super::types::{GossipMessage, MembershipEvent, Node, NodeId, NodeState};

const GOSSIP_INTERVAL: Duration = Duration::from_millis(500);
const FAILURE_DETECTION_INTERVAL: Duration = Duration::from_secs(2);
const SUSPECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Offset between the gossip port and the default cluster HTTP port.
pub const HTTP_PORT_OFFSET: u16 = 1000;

pub struct MembershipService {
    pub local_node: Node,
    pub members: Arc<DashMap<NodeId, Node>>,
    socket: Arc<UdpSocket>,
    incarnation: Arc<RwLock<u64>>,
    events: broadcast::Sender<MembershipEvent>,
}

impl MembershipService {
    /// Binds the gossip socket and announces the local node to `seed_nodes`.
    ///
    /// When `http_addr` is `None` the cluster endpoint is assumed to listen on
    /// the gossip port plus [`HTTP_PORT_OFFSET`].
    pub async fn new(
        local_id: NodeId,
        bind_addr: SocketAddr,
        http_addr: Option<SocketAddr>,
        seed_nodes: Vec<SocketAddr>,
    ) -> Result<Arc<Self>> {
        let socket = UdpSocket::bind(bind_addr).await?;
        let gossip_addr = socket.local_addr()?;
        let http_addr = http_addr.unwrap_or_else(|| {
            SocketAddr::new(
                gossip_addr.ip(),
                gossip_addr.port().wrapping_add(HTTP_PORT_OFFSET),
            )
        });

        let local_node = Node {
            id: local_id,
            gossip_addr,
            http_addr,
            state: NodeState::Alive,
            incarnation: 1,
            last_seen: Some(Instant::now()),
        };
        let members = Arc::new(DashMap::new());
        members.insert(local_node.id.clone(), local_node.clone());

        if !seed_nodes.is_empty() {
            info!("Joining cluster via {} seed node(s)", seed_nodes.len());

            let encoded = bincode::serialize(&GossipMessage::Join {
                node: local_node.clone(),
            })?;
            for seed_node in seed_nodes.iter() {
                socket.send_to(&encoded, seed_node).await?;
                info!("Sent join request to {}", seed_node);
            }
        }

        let (events, _) = broadcast::channel(64);

        Ok(Arc::new(Self {
            local_node,
            members,
            socket: Arc::new(socket),
            incarnation: Arc::new(RwLock::new(1)),
            events,
        }))
    }

    pub async fn start(self: Arc<Self>) {
        tracing::info!("Starting membership service for {}", self.local_node.id);

        let service = self.clone();
        tokio::spawn(async move {
            service.gossip_loop().await;
        });

        let service = self.clone();
        tokio::spawn(async move {
            service.receive_loop().await;
        });

        let service = self.clone();
        tokio::spawn(async move {
            service.failure_detection_loop().await;
        });
    }

    /// Subscribes to join/failure events.
    pub fn subscribe(&self) -> broadcast::Receiver<MembershipEvent> {
        self.events.subscribe()
    }

    pub fn get_alive_members(&self) -> Vec<Node> {
        self.members
            .iter()
            .filter(|entry| entry.value().state == NodeState::Alive)
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn get_member(&self, id: &NodeId) -> Option<Node> {
        self.members.get(id).map(|entry| entry.value().clone())
    }

    /// Peers (local node excluded) that have not been declared dead.
    pub fn reachable_peers(&self) -> Vec<Node> {
        self.members
            .iter()
            .filter(|entry| {
                entry.value().id != self.local_node.id && entry.value().state != NodeState::Dead
            })
            .map(|entry| entry.value().clone())
            .collect()
    }

    async fn current_node(&self) -> Node {
        let mut node = self.local_node.clone();
        node.incarnation = *self.incarnation.read().await;
        node
    }

    async fn gossip_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(GOSSIP_INTERVAL);

        loop {
            interval.tick().await;

            let peers = self.reachable_peers();
            if peers.is_empty() {
                continue;
            }

            let target = {
                use rand::Rng;
                let idx = rand::thread_rng().gen_range(0..peers.len());
                peers[idx].clone()
            };

            let msg = GossipMessage::Ping {
                from: self.current_node().await,
            };

            match bincode::serialize(&msg) {
                Ok(encoded) => {
                    if let Err(e) = self.socket.send_to(&encoded, target.gossip_addr).await {
                        tracing::warn!("Failed to send ping to {}: {}", target.id, e);
                    } else {
                        tracing::trace!("Sent ping to {}", target.id);
                    }
                }
                Err(e) => tracing::error!("Failed to serialize ping: {}", e),
            }
        }
    }

    async fn receive_loop(self: Arc<Self>) {
        let mut buf = vec![0u8; 65536];

        loop {
            match self.socket.recv_from(&mut buf).await {
                Ok((len, src)) => match bincode::deserialize::<GossipMessage>(&buf[..len]) {
                    Ok(msg) => {
                        if let Err(e) = self.handle_message(msg, src).await {
                            tracing::error!("Error handling gossip from {}: {}", src, e);
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Failed to deserialize gossip from {}: {}", src, e);
                    }
                },
                Err(e) => {
                    tracing::error!("Failed to receive UDP packet: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    pub(crate) async fn handle_message(&self, msg: GossipMessage, src: SocketAddr) -> Result<()> {
        match msg {
            GossipMessage::Join { node } => {
                tracing::info!("Node {} joining cluster at {}", node.id, node.gossip_addr);
                self.touch(node);
                self.send_ack(src).await?;
            }
            GossipMessage::Ping { from } => {
                tracing::trace!("Received ping from {}", from.id);
                self.touch(from);
                self.send_ack(src).await?;
            }
            GossipMessage::Ack { from, members } => {
                tracing::trace!("Received ack from {} with {} members", from.id, members.len());
                self.touch(from);
                for member in members {
                    self.merge_member(member);
                }
            }
            GossipMessage::Suspect {
                node_id,
                incarnation,
            } => {
                self.handle_suspect(node_id, incarnation).await;
            }
            GossipMessage::Alive {
                node_id,
                incarnation,
            } => {
                self.handle_alive(node_id, incarnation);
            }
        }

        Ok(())
    }

    async fn send_ack(&self, src: SocketAddr) -> Result<()> {
        let reply = GossipMessage::Ack {
            from: self.current_node().await,
            members: self
                .members
                .iter()
                .map(|entry| entry.value().clone())
                .collect(),
        };
        let encoded = bincode::serialize(&reply)?;
        self.socket.send_to(&encoded, src).await?;
        Ok(())
    }

    /// Records direct contact with `node`: it is alive right now.
    fn touch(&self, node: Node) {
        if node.id == self.local_node.id {
            return;
        }

        let mut revived = None;
        match self.members.get_mut(&node.id) {
            Some(mut existing) => {
                existing.last_seen = Some(Instant::now());
                existing.incarnation = existing.incarnation.max(node.incarnation);
                existing.http_addr = node.http_addr;
                if existing.state != NodeState::Alive {
                    tracing::info!("Node {} is alive again", existing.id);
                    if existing.state == NodeState::Dead {
                        revived = Some(existing.clone());
                    }
                    existing.state = NodeState::Alive;
                }
            }
            None => {
                tracing::info!("Discovered new member {} at {}", node.id, node.gossip_addr);
                let mut node = node;
                node.state = NodeState::Alive;
                node.last_seen = Some(Instant::now());
                self.members.insert(node.id.clone(), node.clone());
                revived = Some(node);
            }
        }

        if let Some(node) = revived {
            let _ = self.events.send(MembershipEvent::Joined(node));
        }
    }

    fn merge_member(&self, new_member: Node) {
        if new_member.id == self.local_node.id {
            return;
        }

        let mut joined = None;
        match self.members.get_mut(&new_member.id) {
            Some(mut existing) => {
                if new_member.incarnation > existing.incarnation {
                    tracing::debug!(
                        "Updating {}: inc {} -> {}",
                        new_member.id,
                        existing.incarnation,
                        new_member.incarnation,
                    );
                    if existing.state == NodeState::Dead && new_member.state == NodeState::Alive {
                        joined = Some(new_member.clone());
                    }
                    existing.state = new_member.state;
                    existing.incarnation = new_member.incarnation;
                    existing.last_seen = Some(Instant::now());
                } else if new_member.incarnation == existing.incarnation
                    && new_member.state == NodeState::Alive
                    && existing.state == NodeState::Suspect
                {
                    tracing::info!("{} refuted suspicion", new_member.id);
                    existing.state = NodeState::Alive;
                    existing.last_seen = Some(Instant::now());
                }
            }
            None => {
                if new_member.state == NodeState::Dead {
                    return;
                }
                tracing::info!(
                    "Discovered new member {} at {}",
                    new_member.id,
                    new_member.gossip_addr
                );
                let mut member = new_member;
                member.last_seen = Some(Instant::now());
                self.members.insert(member.id.clone(), member.clone());
                joined = Some(member);
            }
        }

        if let Some(node) = joined {
            let _ = self.events.send(MembershipEvent::Joined(node));
        }
    }

    async fn handle_suspect(&self, node_id: NodeId, incarnation: u64) {
        if node_id == self.local_node.id {
            let my_incarnation = {
                let mut inc = self.incarnation.write().await;
                if incarnation >= *inc {
                    *inc = incarnation + 1;
                }
                *inc
            };
            tracing::info!("Refuting suspicion with incarnation {}", my_incarnation);
            self.broadcast_message(GossipMessage::Alive {
                node_id,
                incarnation: my_incarnation,
            })
            .await;
            return;
        }

        match self.members.get_mut(&node_id) {
            Some(mut existing) => {
                if incarnation >= existing.incarnation && existing.state == NodeState::Alive {
                    tracing::info!("Node {} suspected by a peer", existing.id);
                    existing.state = NodeState::Suspect;
                    existing.incarnation = incarnation;
                    existing.last_seen = Some(Instant::now());
                }
            }
            None => {
                tracing::debug!("Suspected node {} doesn't exist", node_id);
            }
        }
    }

    fn handle_alive(&self, node_id: NodeId, incarnation: u64) {
        match self.members.get_mut(&node_id) {
            Some(mut existing) => {
                if incarnation > existing.incarnation
                    || (incarnation == existing.incarnation
                        && existing.state == NodeState::Suspect)
                {
                    tracing::info!("Node {} is alive (inc={})", existing.id, incarnation);
                    existing.state = NodeState::Alive;
                    existing.incarnation = incarnation;
                    existing.last_seen = Some(Instant::now());
                }
            }
            None => {
                tracing::debug!("Alive message for unknown node {}", node_id);
            }
        }
    }

    async fn failure_detection_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(FAILURE_DETECTION_INTERVAL);

        loop {
            interval.tick().await;
            for msg in self.detect_failures(Instant::now()) {
                self.broadcast_message(msg).await;
            }
        }
    }

    /// Advances member states by elapsed silence and returns the suspicion
    /// messages to disseminate.
    pub(crate) fn detect_failures(&self, now: Instant) -> Vec<GossipMessage> {
        let mut messages = Vec::new();
        let mut failed = Vec::new();

        for mut entry in self.members.iter_mut() {
            let member = entry.value_mut();

            if member.id == self.local_node.id {
                continue;
            }

            let Some(last_seen) = member.last_seen else {
                member.last_seen = Some(now);
                continue;
            };
            let elapsed = now.saturating_duration_since(last_seen);

            match member.state {
                NodeState::Alive if elapsed > SUSPECT_TIMEOUT => {
                    tracing::warn!("Node {} suspected (no contact for {:?})", member.id, elapsed);
                    member.state = NodeState::Suspect;
                    messages.push(GossipMessage::Suspect {
                        node_id: member.id.clone(),
                        incarnation: member.incarnation,
                    });
                }
                NodeState::Suspect if elapsed > DEAD_TIMEOUT => {
                    tracing::warn!("Node {} declared dead (no contact for {:?})", member.id, elapsed);
                    member.state = NodeState::Dead;
                    failed.push(member.id.clone());
                }
                _ => {}
            }
        }

        for node_id in failed {
            let _ = self.events.send(MembershipEvent::Failed(node_id));
        }

        messages
    }

    async fn broadcast_message(&self, msg: GossipMessage) {
        let Ok(encoded) = bincode::serialize(&msg) else {
            tracing::error!("Failed to serialize gossip broadcast");
            return;
        };

        for member in self.get_alive_members() {
            if member.id == self.local_node.id {
                continue;
            }
            if let Err(e) = self.socket.send_to(&encoded, member.gossip_addr).await {
                tracing::warn!("Failed to broadcast to {}: {}", member.id, e);
            }
        }
    }
}
