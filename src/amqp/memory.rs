//! In-process broker implementing the transport traits
//!
//! Used by the test suites and by `dispatch-tester --in-memory`. It counts
//! connect attempts, channel opens, and queue declarations, and can be told to
//! refuse connections, reject specific queues, or drop every open connection.

use crate::amqp::transport::{
    BrokerChannel, BrokerConnection, Connector, SharedChannel, SharedConnection,
};
use crate::error::DispatchError;
use crate::types::QueueOptions;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// A message accepted by the in-memory broker
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub queue: String,
    pub body: Vec<u8>,
}

impl PublishedMessage {
    /// Decode the body as JSON
    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

#[derive(Default)]
struct BrokerInner {
    unreachable: AtomicBool,
    connect_delay_ms: AtomicU64,
    connect_attempts: AtomicU64,
    channels_opened: AtomicU64,
    fail_channel_open: AtomicBool,
    fail_publish: AtomicBool,
    declares: Mutex<HashMap<String, u64>>,
    durable: Mutex<HashMap<String, bool>>,
    rejected_queues: Mutex<HashSet<String>>,
    messages: Mutex<Vec<PublishedMessage>>,
    connections: Mutex<Vec<Arc<AtomicBool>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared handle to an in-memory broker; clones observe the same state
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    inner: Arc<BrokerInner>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse (false) or accept (true) new connections
    pub fn set_reachable(&self, reachable: bool) {
        self.inner.unreachable.store(!reachable, Ordering::SeqCst);
    }

    /// Delay every connection handshake by `delay`
    pub fn set_connect_delay(&self, delay: Duration) {
        self.inner
            .connect_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_fail_channel_open(&self, fail: bool) {
        self.inner.fail_channel_open.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_publish(&self, fail: bool) {
        self.inner.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Make declarations of `queue` fail with an access-refused error
    pub fn reject_queue(&self, queue: &str) {
        lock(&self.inner.rejected_queues).insert(queue.to_string());
    }

    pub fn accept_queue(&self, queue: &str) {
        lock(&self.inner.rejected_queues).remove(queue);
    }

    /// Close every open connection as if the broker went away
    pub fn drop_connections(&self) {
        for open in lock(&self.inner.connections).drain(..) {
            open.store(false, Ordering::SeqCst);
        }
    }

    pub fn connect_attempts(&self) -> u64 {
        self.inner.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn channels_opened(&self) -> u64 {
        self.inner.channels_opened.load(Ordering::SeqCst)
    }

    pub fn open_connections(&self) -> usize {
        lock(&self.inner.connections)
            .iter()
            .filter(|open| open.load(Ordering::SeqCst))
            .count()
    }

    /// How many times `queue` has been declared across all channels
    pub fn declare_count(&self, queue: &str) -> u64 {
        lock(&self.inner.declares).get(queue).copied().unwrap_or(0)
    }

    /// Durability flag of the last successful declaration of `queue`
    pub fn is_durable(&self, queue: &str) -> Option<bool> {
        lock(&self.inner.durable).get(queue).copied()
    }

    pub fn messages(&self) -> Vec<PublishedMessage> {
        lock(&self.inner.messages).clone()
    }

    pub fn messages_for(&self, queue: &str) -> Vec<PublishedMessage> {
        lock(&self.inner.messages)
            .iter()
            .filter(|message| message.queue == queue)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Connector for InMemoryBroker {
    async fn connect(&self) -> Result<SharedConnection, DispatchError> {
        self.inner.connect_attempts.fetch_add(1, Ordering::SeqCst);

        let delay = self.inner.connect_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if self.inner.unreachable.load(Ordering::SeqCst) {
            return Err(DispatchError::Connection {
                message: "connection refused".to_string(),
            });
        }

        let open = Arc::new(AtomicBool::new(true));
        lock(&self.inner.connections).push(open.clone());
        Ok(Arc::new(MemoryConnection {
            broker: self.clone(),
            open,
        }))
    }

    fn endpoint(&self) -> String {
        "memory://local".to_string()
    }
}

struct MemoryConnection {
    broker: InMemoryBroker,
    open: Arc<AtomicBool>,
}

#[async_trait]
impl BrokerConnection for MemoryConnection {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn open_channel(&self) -> Result<SharedChannel, DispatchError> {
        if !self.is_open() {
            return Err(DispatchError::Channel {
                message: "connection is closed".to_string(),
            });
        }
        if self.broker.inner.fail_channel_open.load(Ordering::SeqCst) {
            return Err(DispatchError::Channel {
                message: "channel limit reached".to_string(),
            });
        }

        self.broker
            .inner
            .channels_opened
            .fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemoryChannel {
            broker: self.broker.clone(),
            connection_open: self.open.clone(),
            open: AtomicBool::new(true),
        }))
    }

    async fn close(&self) -> Result<(), DispatchError> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }
}

struct MemoryChannel {
    broker: InMemoryBroker,
    connection_open: Arc<AtomicBool>,
    open: AtomicBool,
}

#[async_trait]
impl BrokerChannel for MemoryChannel {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && self.connection_open.load(Ordering::SeqCst)
    }

    async fn declare_queue(
        &self,
        queue: &str,
        options: QueueOptions,
    ) -> Result<(), DispatchError> {
        if !self.is_open() {
            return Err(DispatchError::QueueDeclare {
                queue: queue.to_string(),
                message: "channel is closed".to_string(),
            });
        }

        *lock(&self.broker.inner.declares)
            .entry(queue.to_string())
            .or_insert(0) += 1;

        if lock(&self.broker.inner.rejected_queues).contains(queue) {
            // A failed declare is a channel-level exception in AMQP.
            self.open.store(false, Ordering::SeqCst);
            return Err(DispatchError::QueueDeclare {
                queue: queue.to_string(),
                message: "ACCESS_REFUSED".to_string(),
            });
        }

        lock(&self.broker.inner.durable).insert(queue.to_string(), options.durable);
        Ok(())
    }

    async fn publish(&self, queue: &str, body: Vec<u8>) -> Result<(), DispatchError> {
        if !self.is_open() || self.broker.inner.fail_publish.load(Ordering::SeqCst) {
            return Err(DispatchError::Publish {
                queue: queue.to_string(),
                message: "channel is closed".to_string(),
            });
        }

        lock(&self.broker.inner.messages).push(PublishedMessage {
            queue: queue.to_string(),
            body,
        });
        Ok(())
    }
}
