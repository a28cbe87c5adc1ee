//! Application state and lifecycle
//!
//! `AppState` owns the process-wide dispatcher. Building it performs no I/O:
//! the broker is contacted on the first dispatch, so the service boots and
//! serves unrelated routes while the broker is down. `shutdown` must run on
//! every exit path to close the broker connection cleanly.

use crate::config::AppConfig;
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::metrics::DispatchMetrics;
use std::time::{Duration, Instant};
use tracing::info;

/// Main application state shared with request handlers
pub struct AppState {
    config: AppConfig,
    dispatcher: Dispatcher,
    started_at: Instant,
}

impl AppState {
    /// Build state for the broker described in `config`
    pub fn new(config: AppConfig) -> Result<Self> {
        let metrics = DispatchMetrics::new()?;
        let dispatcher = Dispatcher::from_settings(&config.broker, metrics);
        Ok(Self::with_dispatcher(config, dispatcher))
    }

    /// Build state around an existing dispatcher
    pub fn with_dispatcher(config: AppConfig, dispatcher: Dispatcher) -> Self {
        Self {
            config,
            dispatcher,
            started_at: Instant::now(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Release the broker connection
    pub async fn shutdown(&self) {
        info!(
            endpoint = %self.dispatcher.manager().endpoint(),
            "Closing broker connection"
        );
        self.dispatcher.disconnect().await;
    }
}
