use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::membership::types::NodeId;

/// Outcome produced by a forward handler on the owning node.
///
/// `Ignore` means the request was well formed but there is nothing to do on
/// this node (entity gone, ownership moved). It is not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum ForwardResult<T> {
    Success(T),
    Failure(String),
    Ignore(String),
}

impl<T> ForwardResult<T> {
    pub fn failure(reason: impl Into<String>) -> Self {
        ForwardResult::Failure(reason.into())
    }

    pub fn ignore(reason: impl Into<String>) -> Self {
        ForwardResult::Ignore(reason.into())
    }
}

/// A forwarded call as seen by the handler.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    /// Node that issued the forward.
    pub origin: NodeId,
    pub payload: Value,
}

impl ForwardRequest {
    pub fn payload_as<P: DeserializeOwned>(&self) -> Result<P, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ForwardFailure {
    /// The handler answered with an explicit failure.
    #[error("{0}")]
    Rejected(String),

    #[error("node {0} unreachable: {1}")]
    Unreachable(NodeId, String),

    #[error("forward to {0} timed out")]
    Timeout(NodeId),

    #[error("unexpected reply: {0}")]
    Protocol(String),

    #[error("cannot decode forward result: {0}")]
    Decode(String),
}

/// Terminal outcome of one forward call, as seen by the caller.
#[derive(Debug)]
pub enum ForwardOutcome<T> {
    Succeeded(T),
    Failed(ForwardFailure),
    Ignored(String),
}

impl<T> ForwardOutcome<T> {
    /// Hands the outcome to exactly one callback method.
    pub fn dispatch<C, F>(self, context: C, callback: F)
    where
        F: ForwardCallback<T, C>,
    {
        match self {
            ForwardOutcome::Succeeded(result) => callback.on_succeeded(result, context),
            ForwardOutcome::Failed(failure) => callback.on_failed(failure, context),
            ForwardOutcome::Ignored(reason) => callback.on_ignored(reason, context),
        }
    }
}

impl<T: DeserializeOwned> ForwardOutcome<T> {
    pub(crate) fn from_result(result: ForwardResult<Value>) -> Self {
        match result {
            ForwardResult::Success(value) => match serde_json::from_value(value) {
                Ok(decoded) => ForwardOutcome::Succeeded(decoded),
                Err(e) => ForwardOutcome::Failed(ForwardFailure::Decode(e.to_string())),
            },
            ForwardResult::Failure(reason) => ForwardOutcome::Failed(ForwardFailure::Rejected(reason)),
            ForwardResult::Ignore(reason) => ForwardOutcome::Ignored(reason),
        }
    }
}

/// Receives the result of a forward. Consumed by the single method that runs.
///
/// `context` is handed back untouched so the caller can correlate the
/// response with its own state.
pub trait ForwardCallback<T, C>: Sized + Send + 'static {
    fn on_succeeded(self, result: T, context: C);

    fn on_failed(self, failure: ForwardFailure, context: C);

    fn on_ignored(self, reason: String, context: C) {
        let _ = context;
        tracing::debug!("Forward ignored: {}", reason);
    }
}
