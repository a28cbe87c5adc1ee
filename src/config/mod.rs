//! Configuration management for the roster-dispatch service
//!
//! This module handles configuration loading from environment variables and
//! TOML files, validation, and default values.

pub mod app;
pub mod broker;

// Re-export commonly used types
pub use app::{validate_config, AppConfig, ServiceSettings};
pub use broker::BrokerSettings;
