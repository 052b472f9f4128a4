//! Forward Handler Registry
//!
//! Maps service names (e.g. "room_edit") to the handler that runs when a peer
//! forwards a request for that service to this node. Every node registers the
//! same names.

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use super::types::{ForwardRequest, ForwardResult};

/// Type-erased handler: typed results are encoded to JSON on the way out.
pub type ForwardHandlerFn = Arc<dyn Fn(ForwardRequest) -> ForwardResult<Value> + Send + Sync>;

#[derive(Default)]
pub struct ForwardRegistry {
    handlers: DashMap<String, ForwardHandlerFn>,
}

impl ForwardRegistry {
    /// Registers `handler` under `service`, replacing any previous handler.
    ///
    /// Handlers run on the caller's task and must return promptly.
    pub fn register<T, F>(&self, service: &str, handler: F)
    where
        T: Serialize,
        F: Fn(ForwardRequest) -> ForwardResult<T> + Send + Sync + 'static,
    {
        let service_name = service.to_string();
        let handler_fn: ForwardHandlerFn = Arc::new(move |request: ForwardRequest| {
            match handler(request) {
                ForwardResult::Success(result) => match serde_json::to_value(&result) {
                    Ok(value) => ForwardResult::Success(value),
                    Err(e) => {
                        tracing::error!("Cannot encode result of '{}': {}", service_name, e);
                        ForwardResult::failure(format!("cannot encode result: {}", e))
                    }
                },
                ForwardResult::Failure(reason) => ForwardResult::Failure(reason),
                ForwardResult::Ignore(reason) => ForwardResult::Ignore(reason),
            }
        });

        self.handlers.insert(service.to_string(), handler_fn);

        tracing::debug!("Registered forward handler: {}", service);
    }

    pub fn unregister(&self, service: &str) {
        self.handlers.remove(service);
    }

    /// Runs the handler registered under `service`. An unknown service is an
    /// explicit failure.
    pub fn handle(&self, service: &str, request: ForwardRequest) -> ForwardResult<Value> {
        let handler_fn = self.handlers.get(service).map(|entry| entry.value().clone());

        match handler_fn {
            Some(handler_fn) => {
                tracing::debug!("Handling forward '{}' from {}", service, request.origin);
                handler_fn(request)
            }
            None => {
                let error = format!("Unknown forward service: {}", service);
                tracing::warn!("{}", error);
                ForwardResult::Failure(error)
            }
        }
    }
}
