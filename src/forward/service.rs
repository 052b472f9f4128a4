use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

use super::types::{ForwardCallback, ForwardFailure, ForwardOutcome, ForwardRequest, ForwardResult};
use crate::cluster::Cluster;
use crate::cluster::protocol::{ClusterMessage, ClusterReply};
use crate::membership::types::NodeId;

/// Routes a request to the node that owns the target entity.
///
/// There is no retry: a caller that wants one issues a new forward.
#[derive(Clone)]
pub struct ForwardingService {
    cluster: Arc<Cluster>,
}

impl ForwardingService {
    pub fn new(cluster: Arc<Cluster>) -> Self {
        Self { cluster }
    }

    pub fn cluster(&self) -> &Arc<Cluster> {
        &self.cluster
    }

    /// Awaitable form: runs `service` on `target` and returns its outcome.
    /// A local target runs the handler in-process.
    pub async fn request<T: DeserializeOwned>(
        &self,
        target: &NodeId,
        service: &str,
        payload: Value,
    ) -> ForwardOutcome<T> {
        let local = self.cluster.local_id();

        let result: ForwardResult<Value> = if target == local {
            self.cluster.services().handle(
                service,
                ForwardRequest {
                    origin: local.clone(),
                    payload,
                },
            )
        } else {
            let message = ClusterMessage::Forward {
                service: service.to_string(),
                origin: local.clone(),
                payload,
            };
            let pending = self.cluster.transport().request(target, message);

            match tokio::time::timeout(self.cluster.forward_timeout(), pending).await {
                Err(_) => {
                    return ForwardOutcome::Failed(ForwardFailure::Timeout(target.clone()));
                }
                Ok(Err(e)) => {
                    return ForwardOutcome::Failed(ForwardFailure::Unreachable(
                        target.clone(),
                        e.to_string(),
                    ));
                }
                Ok(Ok(ClusterReply::Forwarded(result))) => result,
                Ok(Ok(ClusterReply::Ack)) => {
                    return ForwardOutcome::Failed(ForwardFailure::Protocol(
                        "acknowledgement instead of a forward result".to_string(),
                    ));
                }
            }
        };

        ForwardOutcome::from_result(result)
    }

    /// Sends `payload` to the `service` handler on `target` and returns
    /// immediately. Exactly one method of `callback` runs later, with
    /// `context` handed back unchanged.
    pub fn forward<P, T, C, F>(
        &self,
        target: &NodeId,
        service: &str,
        payload: &P,
        context: C,
        callback: F,
    ) where
        P: Serialize + ?Sized,
        T: DeserializeOwned + Send + 'static,
        C: Send + 'static,
        F: ForwardCallback<T, C>,
    {
        let this = self.clone();
        let target = target.clone();
        let service = service.to_string();
        let payload = serde_json::to_value(payload)
            .map_err(|e| ForwardFailure::Protocol(format!("cannot encode payload: {}", e)));

        tokio::spawn(async move {
            let outcome = match payload {
                Ok(payload) => this.request::<T>(&target, &service, payload).await,
                Err(failure) => ForwardOutcome::Failed(failure),
            };

            if let ForwardOutcome::Failed(failure) = &outcome {
                tracing::warn!("Forward '{}' to {} failed: {}", service, target, failure);
            }

            outcome.dispatch(context, callback);
        });
    }
}
