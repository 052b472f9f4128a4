use axum::{Json, extract::Extension};
use std::sync::Arc;

use super::context::Cluster;
use super::protocol::{ClusterMessage, ClusterReply};

pub async fn handle_cluster_message(
    Extension(cluster): Extension<Arc<Cluster>>,
    Json(message): Json<ClusterMessage>,
) -> Json<ClusterReply> {
    Json(cluster.dispatch(message))
}
