use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

use super::node::{ChatNode, PublishError};
use super::protocol::{ChannelRequest, HandshakeRequest, HandshakeResponse, PublishRequest};
use crate::messaging::Delivery;

/// How long a poll waits for the first delivery.
const POLL_WAIT: Duration = Duration::from_secs(10);

fn error_body(message: impl Into<String>) -> Json<Value> {
    Json(json!({ "error": message.into() }))
}

pub async fn handle_handshake(
    Extension(node): Extension<Arc<ChatNode>>,
    Json(req): Json<HandshakeRequest>,
) -> Result<Json<HandshakeResponse>, (StatusCode, Json<Value>)> {
    match node.handshake(req.ext.as_ref()) {
        Ok(session) => Ok(Json(HandshakeResponse {
            session_id: session.id().to_string(),
        })),
        Err(e) => {
            tracing::warn!("Handshake rejected: {}", e);
            Err((StatusCode::UNAUTHORIZED, error_body(e.to_string())))
        }
    }
}

pub async fn handle_subscribe(
    Extension(node): Extension<Arc<ChatNode>>,
    Path(session_id): Path<String>,
    Json(req): Json<ChannelRequest>,
) -> StatusCode {
    if node.cluster().hub().subscribe(&session_id, &req.channel) {
        tracing::debug!("Session {} subscribed to {}", session_id, req.channel);
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

pub async fn handle_unsubscribe(
    Extension(node): Extension<Arc<ChatNode>>,
    Path(session_id): Path<String>,
    Json(req): Json<ChannelRequest>,
) -> StatusCode {
    if node.cluster().hub().find_session(&session_id).is_none() {
        return StatusCode::NOT_FOUND;
    }
    node.cluster().hub().unsubscribe(&session_id, &req.channel);
    StatusCode::OK
}

pub async fn handle_publish(
    Extension(node): Extension<Arc<ChatNode>>,
    Path(session_id): Path<String>,
    Json(req): Json<PublishRequest>,
) -> (StatusCode, Json<Value>) {
    let Some(session) = node.cluster().hub().find_session(&session_id) else {
        return (StatusCode::NOT_FOUND, error_body("unknown session"));
    };
    session.touch();

    match node.publish(&session, &req.channel, req.data) {
        Ok(()) => (StatusCode::ACCEPTED, Json(json!({ "status": "accepted" }))),
        Err(e @ PublishError::UnknownChannel(_)) => (StatusCode::FORBIDDEN, error_body(e.to_string())),
        Err(e @ PublishError::BadRequest { .. }) => {
            tracing::debug!("Rejected publish from {}: {}", session_id, e);
            (StatusCode::BAD_REQUEST, error_body(e.to_string()))
        }
    }
}

pub async fn handle_poll(
    Extension(node): Extension<Arc<ChatNode>>,
    Path(session_id): Path<String>,
) -> Result<Json<Vec<Delivery>>, StatusCode> {
    let session = node
        .cluster()
        .hub()
        .find_session(&session_id)
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(session.poll(POLL_WAIT).await))
}

pub async fn handle_disconnect(
    Extension(node): Extension<Arc<ChatNode>>,
    Path(session_id): Path<String>,
) -> StatusCode {
    if node.disconnect(&session_id) {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}
