//! Broker transport seam
//!
//! The connection manager only talks to the broker through these traits, so
//! the amqprs client and the in-memory broker used by tests are
//! interchangeable.

use crate::error::DispatchError;
use crate::types::QueueOptions;
use async_trait::async_trait;
use std::sync::Arc;

/// Shared handle to an open broker connection
pub type SharedConnection = Arc<dyn BrokerConnection>;

/// Shared handle to an open channel
pub type SharedChannel = Arc<dyn BrokerChannel>;

/// Opens transport connections to the broker
#[async_trait]
pub trait Connector: Send + Sync {
    /// Perform one connection attempt (TCP + protocol handshake)
    async fn connect(&self) -> Result<SharedConnection, DispatchError>;

    /// Human readable endpoint for log lines, never includes credentials
    fn endpoint(&self) -> String;
}

/// An established connection that channels are multiplexed over
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    /// Whether the transport is still usable
    fn is_open(&self) -> bool;

    /// Open a fresh channel on this connection
    async fn open_channel(&self) -> Result<SharedChannel, DispatchError>;

    /// Close the connection; closing an already-closed connection is not an error
    async fn close(&self) -> Result<(), DispatchError>;
}

/// A lightweight session used to declare queues and publish to them
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    fn is_open(&self) -> bool;

    /// Assert a queue; identical redeclaration is a broker-side no-op
    async fn declare_queue(&self, queue: &str, options: QueueOptions)
        -> Result<(), DispatchError>;

    /// Hand one message to the client library for delivery to `queue`
    async fn publish(&self, queue: &str, body: Vec<u8>) -> Result<(), DispatchError>;
}

/// Observable state of the connection manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Ready,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Ready => write!(f, "ready"),
        }
    }
}
