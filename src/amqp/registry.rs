//! Queue-bound channels and the registry that caches them
//!
//! A `QueueChannel` asserts its queue once per channel lifetime: the first
//! send on a fresh channel declares, later sends on that channel publish
//! straight away. After a reconnect the new channel gets a new id and the
//! queue is declared again.

use crate::amqp::manager::{ConnectionManager, PurposeChannel};
use crate::error::DispatchError;
use crate::types::QueueOptions;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// AMQP short strings cap queue names at 255 bytes
const MAX_QUEUE_NAME_LEN: usize = 255;

/// Serialize a task payload to its UTF-8 JSON wire form
pub fn encode_payload<T: Serialize + ?Sized>(payload: &T) -> Result<Vec<u8>, DispatchError> {
    serde_json::to_vec(payload).map_err(|e| DispatchError::Serialization {
        message: e.to_string(),
    })
}

/// Reject names the broker would refuse before any I/O happens
pub fn validate_queue_name(queue: &str) -> Result<(), DispatchError> {
    if queue.trim().is_empty() {
        return Err(DispatchError::InvalidQueue {
            reason: "queue name cannot be empty".to_string(),
        });
    }
    if queue.len() > MAX_QUEUE_NAME_LEN {
        return Err(DispatchError::InvalidQueue {
            reason: format!("queue name exceeds {} bytes", MAX_QUEUE_NAME_LEN),
        });
    }
    if queue.starts_with("amq.") {
        return Err(DispatchError::InvalidQueue {
            reason: format!("'{}' uses the reserved amq. prefix", queue),
        });
    }
    Ok(())
}

/// A channel purpose bound to one named queue
pub struct QueueChannel {
    queue: String,
    options: QueueOptions,
    manager: Arc<ConnectionManager>,
    /// Id of the channel the queue was last asserted on
    declared_on: tokio::sync::Mutex<Option<u64>>,
}

impl QueueChannel {
    pub fn new(manager: Arc<ConnectionManager>, queue: &str, options: QueueOptions) -> Self {
        Self {
            queue: queue.to_string(),
            options,
            manager,
            declared_on: tokio::sync::Mutex::new(None),
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Declare the queue on `channel` unless that channel already has it
    pub async fn ensure_queue(&self, channel: &PurposeChannel) -> Result<(), DispatchError> {
        let mut declared_on = self.declared_on.lock().await;
        if *declared_on == Some(channel.id()) {
            return Ok(());
        }

        channel
            .channel()
            .declare_queue(&self.queue, self.options)
            .await?;

        info!(
            queue = %self.queue,
            channel_id = channel.id(),
            durable = self.options.durable,
            "Queue asserted"
        );
        *declared_on = Some(channel.id());
        Ok(())
    }

    /// Publish an already encoded body
    pub async fn try_send(&self, body: Vec<u8>) -> Result<(), DispatchError> {
        let channel = self.manager.get_channel(&self.queue).await?;
        self.ensure_queue(&channel).await?;

        let bytes = body.len();
        channel.channel().publish(&self.queue, body).await?;

        debug!(queue = %self.queue, bytes, "Task enqueued");
        Ok(())
    }

    /// Serialize and publish `payload`, reporting only success or failure
    pub async fn send<T: Serialize + ?Sized>(&self, payload: &T) -> bool {
        let result = match encode_payload(payload) {
            Ok(body) => self.try_send(body).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(queue = %self.queue, error = %e, "Task dispatch dropped");
                false
            }
        }
    }
}

/// Caches one `QueueChannel` per queue name
pub struct QueueRegistry {
    manager: Arc<ConnectionManager>,
    options: QueueOptions,
    queues: Mutex<HashMap<String, Arc<QueueChannel>>>,
}

impl QueueRegistry {
    pub fn new(manager: Arc<ConnectionManager>, options: QueueOptions) -> Self {
        Self {
            manager,
            options,
            queues: Mutex::new(HashMap::new()),
        }
    }

    /// Get or create the channel wrapper for `queue`
    pub fn queue(&self, queue: &str) -> Result<Arc<QueueChannel>, DispatchError> {
        validate_queue_name(queue)?;

        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = queues.entry(queue.to_string()).or_insert_with(|| {
            Arc::new(QueueChannel::new(self.manager.clone(), queue, self.options))
        });
        Ok(entry.clone())
    }

    /// Number of distinct queues seen so far
    pub fn len(&self) -> usize {
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
