//! Broker transport settings

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Credentials used when none are configured
pub const DEFAULT_CREDENTIAL: &str = "guest";

/// Connection parameters for the local message broker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
    /// Broker host; the broker runs next to the service
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub vhost: String,
    /// Upper bound on one connection handshake
    pub connection_timeout_ms: u64,
    /// Upper bound on one dispatch, connect included
    pub send_timeout_ms: u64,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5672,
            username: DEFAULT_CREDENTIAL.to_string(),
            password: DEFAULT_CREDENTIAL.to_string(),
            vhost: "/".to_string(),
            connection_timeout_ms: 2000,
            send_timeout_ms: 2000,
        }
    }
}

impl BrokerSettings {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}
