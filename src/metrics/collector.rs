//! Prometheus counters for dispatch outcomes and broker connectivity

use anyhow::{Context, Result};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Final outcome of one `Dispatcher::send` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    Dropped,
}

impl DispatchOutcome {
    fn label(self) -> &'static str {
        match self {
            DispatchOutcome::Sent => "sent",
            DispatchOutcome::Dropped => "dropped",
        }
    }
}

/// Dispatch metrics collector
#[derive(Clone)]
pub struct DispatchMetrics {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Messages by queue and outcome
    messages_total: IntCounterVec,

    /// Transport connection attempts started
    connect_attempts_total: IntCounter,

    /// 1 while a broker connection is established
    broker_connected: IntGauge,
}

impl DispatchMetrics {
    /// Create a collector with its own registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let messages_total = IntCounterVec::new(
            Opts::new(
                "dispatch_messages_total",
                "Task messages handed to the dispatcher, by queue and outcome",
            ),
            &["queue", "outcome"],
        )
        .context("Failed to create dispatch_messages_total")?;

        let connect_attempts_total = IntCounter::new(
            "broker_connect_attempts_total",
            "Broker connection attempts started",
        )
        .context("Failed to create broker_connect_attempts_total")?;

        let broker_connected = IntGauge::new(
            "broker_connected",
            "Whether a broker connection is currently established",
        )
        .context("Failed to create broker_connected")?;

        registry
            .register(Box::new(messages_total.clone()))
            .context("Failed to register dispatch_messages_total")?;
        registry
            .register(Box::new(connect_attempts_total.clone()))
            .context("Failed to register broker_connect_attempts_total")?;
        registry
            .register(Box::new(broker_connected.clone()))
            .context("Failed to register broker_connected")?;

        Ok(Self {
            registry,
            messages_total,
            connect_attempts_total,
            broker_connected,
        })
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn record_dispatch(&self, queue: &str, outcome: DispatchOutcome) {
        self.messages_total
            .with_label_values(&[queue, outcome.label()])
            .inc();
    }

    pub fn record_connect_attempt(&self) {
        self.connect_attempts_total.inc();
    }

    pub fn set_connected(&self, connected: bool) {
        self.broker_connected.set(i64::from(connected));
    }

    pub fn dispatch_count(&self, queue: &str, outcome: DispatchOutcome) -> u64 {
        self.messages_total
            .with_label_values(&[queue, outcome.label()])
            .get()
    }

    pub fn connect_attempts(&self) -> u64 {
        self.connect_attempts_total.get()
    }

    pub fn is_connected(&self) -> bool {
        self.broker_connected.get() == 1
    }

    /// Render the registry in the Prometheus text format
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .context("Failed to encode metrics")?;
        String::from_utf8(buffer).context("Metrics output was not UTF-8")
    }
}
