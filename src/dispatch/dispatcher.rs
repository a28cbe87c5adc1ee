//! Fire-and-forget task dispatch
//!
//! `Dispatcher::send` is the only entry point producers use. It never fails:
//! every error on the way to the broker is logged, counted, and reported as
//! `false`. Retrying is left to the next independent send.

use crate::amqp::connection::AmqpConnector;
use crate::amqp::manager::ConnectionManager;
use crate::amqp::registry::{encode_payload, QueueRegistry};
use crate::amqp::transport::ConnectionStatus;
use crate::config::BrokerSettings;
use crate::error::DispatchError;
use crate::metrics::{DispatchMetrics, DispatchOutcome};
use crate::types::QueueOptions;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Anything that can take a task payload for a named queue
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskDispatcher: Send + Sync {
    /// Enqueue `payload` on `queue`; `true` only if the client accepted it
    async fn dispatch(&self, queue: &str, payload: serde_json::Value) -> bool;
}

/// Process-wide dispatcher; cheap to clone
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    manager: Arc<ConnectionManager>,
    registry: QueueRegistry,
    send_timeout: Duration,
    metrics: DispatchMetrics,
}

impl Dispatcher {
    pub fn new(
        manager: Arc<ConnectionManager>,
        send_timeout: Duration,
        metrics: DispatchMetrics,
    ) -> Self {
        let registry = QueueRegistry::new(manager.clone(), QueueOptions::default());
        Self {
            inner: Arc::new(DispatcherInner {
                manager,
                registry,
                send_timeout,
                metrics,
            }),
        }
    }

    /// Dispatcher talking to the broker described by `settings`.
    ///
    /// Nothing connects until the first send.
    pub fn from_settings(settings: &BrokerSettings, metrics: DispatchMetrics) -> Self {
        let connector = Arc::new(AmqpConnector::new(settings.clone()));
        let manager = ConnectionManager::new(connector, settings.connection_timeout())
            .with_metrics(metrics.clone());
        Self::new(Arc::new(manager), settings.send_timeout(), metrics)
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.inner.manager
    }

    pub fn metrics(&self) -> &DispatchMetrics {
        &self.inner.metrics
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.manager.status()
    }

    /// Serialize `payload` and enqueue it on `queue`.
    ///
    /// Resolves within the send timeout. Returns `false` on any failure.
    pub async fn send<T: Serialize + ?Sized>(&self, queue: &str, payload: &T) -> bool {
        match self.try_send(queue, payload).await {
            Ok(()) => {
                self.inner
                    .metrics
                    .record_dispatch(queue, DispatchOutcome::Sent);
                true
            }
            Err(e) => {
                self.inner
                    .metrics
                    .record_dispatch(queue, DispatchOutcome::Dropped);
                warn!(queue, error = %e, "Task dispatch dropped");
                false
            }
        }
    }

    /// Like `send`, but keeps the reason for a failure
    pub async fn try_send<T: Serialize + ?Sized>(
        &self,
        queue: &str,
        payload: &T,
    ) -> Result<(), DispatchError> {
        let queue_channel = self.inner.registry.queue(queue)?;
        let body = encode_payload(payload)?;

        match tokio::time::timeout(self.inner.send_timeout, queue_channel.try_send(body)).await {
            Ok(result) => result,
            Err(_) => Err(DispatchError::Timeout {
                operation: format!("dispatch to '{}'", queue),
                timeout_ms: self.inner.send_timeout.as_millis() as u64,
            }),
        }
    }

    /// Close the broker connection; safe to call more than once
    pub async fn disconnect(&self) {
        debug!("Disconnecting dispatcher");
        self.inner.manager.disconnect().await;
    }
}

#[async_trait]
impl TaskDispatcher for Dispatcher {
    async fn dispatch(&self, queue: &str, payload: serde_json::Value) -> bool {
        self.send(queue, &payload).await
    }
}
