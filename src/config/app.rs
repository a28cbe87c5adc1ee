//! Main application configuration
//!
//! This module defines the configuration for the roster-dispatch service,
//! including environment variable and TOML file loading and validation.

use crate::config::broker::{BrokerSettings, DEFAULT_CREDENTIAL};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub broker: BrokerSettings,
}

/// Service-level settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Port for the HTTP server
    pub http_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "roster-dispatch".to_string(),
            log_level: "info".to_string(),
            http_port: 8080,
            shutdown_timeout_seconds: 10,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow!("Invalid {} value: {}", name, value))
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        // Service settings
        if let Some(name) = lookup("SERVICE_NAME") {
            config.service.name = name;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            config.service.log_level = level;
        }
        if let Some(port) = lookup("HTTP_PORT") {
            config.service.http_port = parse_var("HTTP_PORT", &port)?;
        }
        if let Some(timeout) = lookup("SHUTDOWN_TIMEOUT_SECONDS") {
            config.service.shutdown_timeout_seconds =
                parse_var("SHUTDOWN_TIMEOUT_SECONDS", &timeout)?;
        }

        // Broker settings; blank credentials fall back to guest
        if let Some(host) = lookup("RABBITMQ_HOST") {
            config.broker.host = host;
        }
        if let Some(port) = lookup("RABBITMQ_PORT") {
            config.broker.port = parse_var("RABBITMQ_PORT", &port)?;
        }
        if let Some(user) = lookup("RABBITMQ_USER").filter(|v| !v.is_empty()) {
            config.broker.username = user;
        }
        if let Some(password) = lookup("RABBITMQ_PASSWORD").filter(|v| !v.is_empty()) {
            config.broker.password = password;
        }
        if let Some(vhost) = lookup("RABBITMQ_VHOST") {
            config.broker.vhost = vhost;
        }
        if let Some(timeout) = lookup("BROKER_CONNECT_TIMEOUT_MS") {
            config.broker.connection_timeout_ms =
                parse_var("BROKER_CONNECT_TIMEOUT_MS", &timeout)?;
        }
        if let Some(timeout) = lookup("DISPATCH_SEND_TIMEOUT_MS") {
            config.broker.send_timeout_ms = parse_var("DISPATCH_SEND_TIMEOUT_MS", &timeout)?;
        }

        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file; missing keys take defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let mut config: AppConfig =
            toml::from_str(contents).context("Failed to parse TOML configuration")?;

        if config.broker.username.is_empty() {
            config.broker.username = DEFAULT_CREDENTIAL.to_string();
        }
        if config.broker.password.is_empty() {
            config.broker.password = DEFAULT_CREDENTIAL.to_string();
        }

        validate_config(&config)?;
        Ok(config)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    if config.service.http_port == 0 {
        return Err(anyhow!("HTTP port cannot be 0"));
    }
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }

    if config.broker.host.is_empty() {
        return Err(anyhow!("Broker host cannot be empty"));
    }
    if config.broker.port == 0 {
        return Err(anyhow!("Broker port cannot be 0"));
    }
    if config.broker.connection_timeout_ms == 0 {
        return Err(anyhow!("Broker connection timeout must be greater than 0"));
    }
    if config.broker.send_timeout_ms == 0 {
        return Err(anyhow!("Dispatch send timeout must be greater than 0"));
    }

    Ok(())
}
