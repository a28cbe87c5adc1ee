//! AMQP integration for the dispatch subsystem
//!
//! This module owns the broker connection, the per-purpose channel cache and
//! the queue registry that producers publish through.

pub mod connection;
pub mod manager;
pub mod memory;
pub mod registry;
pub mod transport;

// Re-export commonly used types
pub use connection::AmqpConnector;
pub use manager::{ConnectionManager, LiveConnection, PurposeChannel};
pub use memory::{InMemoryBroker, PublishedMessage};
pub use registry::{QueueChannel, QueueRegistry};
pub use transport::{BrokerChannel, BrokerConnection, ConnectionStatus, Connector};
