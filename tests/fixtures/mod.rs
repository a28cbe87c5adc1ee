//! Test fixtures for dispatch integration tests

#![allow(dead_code)]

use roster_dispatch::amqp::{ConnectionManager, InMemoryBroker};
use roster_dispatch::dispatch::Dispatcher;
use roster_dispatch::metrics::DispatchMetrics;
use std::sync::Arc;
use std::time::Duration;

/// Connect timeout used by every fixture
pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// Send timeout matching the service default
pub const SEND_TIMEOUT: Duration = Duration::from_secs(2);

/// A dispatcher wired to a fresh in-memory broker
pub struct TestSystem {
    pub broker: InMemoryBroker,
    pub dispatcher: Dispatcher,
}

impl TestSystem {
    pub fn new() -> Self {
        Self::with_timeouts(CONNECT_TIMEOUT, SEND_TIMEOUT)
    }

    pub fn with_timeouts(connect_timeout: Duration, send_timeout: Duration) -> Self {
        let broker = InMemoryBroker::new();
        let metrics = DispatchMetrics::new().expect("metrics registry");
        let manager = ConnectionManager::new(Arc::new(broker.clone()), connect_timeout)
            .with_metrics(metrics.clone());
        let dispatcher = Dispatcher::new(Arc::new(manager), send_timeout, metrics);

        Self { broker, dispatcher }
    }

    /// Broker that refuses connections until told otherwise
    pub fn unreachable() -> Self {
        let system = Self::new();
        system.broker.set_reachable(false);
        system
    }

    /// Broker whose handshake takes `delay`
    pub fn slow(delay: Duration) -> Self {
        let system = Self::new();
        system.broker.set_connect_delay(delay);
        system
    }
}
