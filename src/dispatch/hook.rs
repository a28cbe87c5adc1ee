//! Post-response dispatch hook for axum routes
//!
//! The hook pulls a payload out of the request before the handler runs,
//! lets the handler produce its response, and only then decides whether to
//! enqueue: dispatch happens when the status matches (200 by default). The
//! response is returned unchanged whatever the dispatch outcome.

use crate::dispatch::dispatcher::TaskDispatcher;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Builds the task payload from the incoming request
pub type PayloadExtractor = fn(&Request) -> Option<Value>;

/// Middleware state: where to dispatch and when
#[derive(Clone)]
pub struct DispatchHook {
    dispatcher: Arc<dyn TaskDispatcher>,
    queue: String,
    success_status: StatusCode,
    extractor: PayloadExtractor,
}

impl DispatchHook {
    pub fn new(
        dispatcher: Arc<dyn TaskDispatcher>,
        queue: impl Into<String>,
        extractor: PayloadExtractor,
    ) -> Self {
        Self {
            dispatcher,
            queue: queue.into(),
            success_status: StatusCode::OK,
            extractor,
        }
    }

    /// Dispatch on `status` instead of 200
    pub fn on_status(mut self, status: StatusCode) -> Self {
        self.success_status = status;
        self
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }
}

/// Axum middleware; attach with `middleware::from_fn_with_state(hook, dispatch_on_success)`
pub async fn dispatch_on_success(
    State(hook): State<DispatchHook>,
    request: Request,
    next: Next,
) -> Response {
    let payload = (hook.extractor)(&request);
    let response = next.run(request).await;

    if response.status() != hook.success_status {
        debug!(
            queue = %hook.queue,
            status = response.status().as_u16(),
            "Response status does not trigger dispatch"
        );
        return response;
    }

    match payload {
        Some(payload) => {
            if !hook.dispatcher.dispatch(&hook.queue, payload).await {
                warn!(queue = %hook.queue, "Post-response dispatch dropped");
            }
        }
        None => debug!(queue = %hook.queue, "No payload extracted, skipping dispatch"),
    }

    response
}

/// Parse the path segment following `collection`, e.g. `/clans/7/refresh` -> 7
pub fn path_id(path: &str, collection: &str) -> Option<i64> {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    segments.find(|segment| *segment == collection)?;
    segments.next()?.parse().ok()
}
