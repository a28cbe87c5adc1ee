//! Health reporting
//!
//! A broker outage never makes the service unhealthy: dispatch is a side
//! effect, so the worst it can do is degrade.

use crate::amqp::transport::ConnectionStatus;
use crate::metrics::DispatchOutcome;
use crate::service::app::AppState;
use crate::types::{CLAN_REQUESTS_QUEUE, PLAYER_REQUESTS_QUEUE};
use serde::Serialize;

/// Health check status
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
        }
    }
}

/// Dispatch counters for the built-in queues
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub queue: String,
    pub sent: u64,
    pub dropped: u64,
}

/// Health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    pub status: HealthStatus,
    pub service: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub uptime_seconds: u64,
    pub broker: ConnectionStatus,
    pub broker_endpoint: String,
    pub connect_attempts: u64,
    pub queues: Vec<QueueStats>,
}

impl HealthCheck {
    pub fn check(state: &AppState) -> Self {
        let dispatcher = state.dispatcher();
        let manager = dispatcher.manager();
        let broker = manager.status();
        let connect_attempts = manager.connect_attempts();

        let status = match broker {
            ConnectionStatus::Ready => HealthStatus::Healthy,
            // Lazy connect: idle until the first dispatch
            ConnectionStatus::Disconnected if connect_attempts == 0 => HealthStatus::Healthy,
            _ => HealthStatus::Degraded,
        };

        let metrics = dispatcher.metrics();
        let queues = [PLAYER_REQUESTS_QUEUE, CLAN_REQUESTS_QUEUE]
            .iter()
            .map(|queue| QueueStats {
                queue: queue.to_string(),
                sent: metrics.dispatch_count(queue, DispatchOutcome::Sent),
                dropped: metrics.dispatch_count(queue, DispatchOutcome::Dropped),
            })
            .collect();

        Self {
            status,
            service: state.config().service.name.clone(),
            version: crate::VERSION.to_string(),
            timestamp: chrono::Utc::now(),
            uptime_seconds: state.uptime().as_secs(),
            broker,
            broker_endpoint: manager.endpoint(),
            connect_attempts,
            queues,
        }
    }
}
