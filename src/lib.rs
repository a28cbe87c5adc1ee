//! Roster Dispatch - background task dispatch for roster refreshes
//!
//! This crate lazily connects to a local AMQP broker, caches one channel per
//! queue, and exposes a fire-and-forget `Dispatcher::send` that producers
//! (HTTP hooks, handlers) call after their synchronous work succeeds.

pub mod amqp;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod metrics;
pub mod service;
pub mod types;

// Re-export commonly used types and traits
pub use error::{DispatchError, Result};
pub use types::*;

// Re-export key components
pub use amqp::{ConnectionManager, ConnectionStatus, InMemoryBroker};
pub use dispatch::{DispatchHook, Dispatcher, TaskDispatcher};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
