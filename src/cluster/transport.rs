use anyhow::Result;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use super::protocol::{ClusterMessage, ClusterReply, ENDPOINT_CLUSTER};
use crate::membership::service::MembershipService;
use crate::membership::types::{NodeId, NodeState};

pub type ReplyFuture = Pin<Box<dyn Future<Output = Result<ClusterReply>> + Send + 'static>>;

/// Moves [`ClusterMessage`]s between nodes.
///
/// `notify` and `broadcast` never report errors: replication and relays are
/// best effort and repaired by later snapshots.
pub trait Transport: Send + Sync {
    fn request(&self, target: &NodeId, message: ClusterMessage) -> ReplyFuture;

    fn notify(&self, target: &NodeId, message: ClusterMessage);

    fn broadcast(&self, message: ClusterMessage);
}

const NOTIFY_TIMEOUT: Duration = Duration::from_millis(500);
const NOTIFY_ATTEMPTS: usize = 3;

/// Transport over the peers' HTTP cluster endpoint, addressed through the
/// gossip membership table.
pub struct HttpTransport {
    membership: Arc<MembershipService>,
    http_client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(membership: Arc<MembershipService>) -> Arc<Self> {
        Arc::new(Self {
            membership,
            http_client: reqwest::Client::new(),
        })
    }

    fn url_for(&self, target: &NodeId) -> Result<String> {
        let node = self
            .membership
            .get_member(target)
            .ok_or_else(|| anyhow::anyhow!("Unknown node {}", target))?;

        if node.state == NodeState::Dead {
            return Err(anyhow::anyhow!("Node {} is dead", target));
        }

        Ok(format!("http://{}{}", node.http_addr, ENDPOINT_CLUSTER))
    }

    fn spawn_notify(&self, target: NodeId, url: String, message: ClusterMessage) {
        let client = self.http_client.clone();
        tokio::spawn(async move {
            if let Err(e) =
                post_with_retry(&client, url, &message, NOTIFY_TIMEOUT, NOTIFY_ATTEMPTS).await
            {
                tracing::warn!("Failed to deliver {} to {}: {}", message.kind(), target, e);
            }
        });
    }
}

impl Transport for HttpTransport {
    fn request(&self, target: &NodeId, message: ClusterMessage) -> ReplyFuture {
        let url = self.url_for(target);
        let client = self.http_client.clone();

        Box::pin(async move {
            let response = client.post(url?).json(&message).send().await?;

            if !response.status().is_success() {
                return Err(anyhow::anyhow!("Cluster request failed {}", response.status()));
            }

            Ok(response.json::<ClusterReply>().await?)
        })
    }

    fn notify(&self, target: &NodeId, message: ClusterMessage) {
        match self.url_for(target) {
            Ok(url) => self.spawn_notify(target.clone(), url, message),
            Err(e) => tracing::debug!("Dropping {} for {}: {}", message.kind(), target, e),
        }
    }

    fn broadcast(&self, message: ClusterMessage) {
        for peer in self.membership.reachable_peers() {
            let url = format!("http://{}{}", peer.http_addr, ENDPOINT_CLUSTER);
            self.spawn_notify(peer.id, url, message.clone());
        }
    }
}

/// POST with bounded exponential backoff and jitter.
async fn post_with_retry<T: serde::Serialize>(
    client: &reqwest::Client,
    url: String,
    payload: &T,
    timeout: Duration,
    attempts: usize,
) -> Result<reqwest::Response> {
    let mut delay_ms = 150u64;

    for attempt in 0..attempts {
        let response = client
            .post(url.clone())
            .json(payload)
            .timeout(timeout)
            .send()
            .await;

        match response {
            Ok(resp) => return Ok(resp),
            Err(e) => {
                if attempt + 1 == attempts {
                    return Err(anyhow::anyhow!(e));
                }
                let jitter = rand::random::<u64>() % 50;
                tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                delay_ms = (delay_ms * 2).min(1200);
            }
        }
    }

    Err(anyhow::anyhow!("Retry attempts exhausted"))
}
