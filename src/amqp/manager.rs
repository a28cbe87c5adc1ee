//! Lazy, single-flight broker connection management
//!
//! The manager owns the one process-wide broker connection. Nothing is
//! opened until the first channel is requested. Concurrent callers arriving
//! while a connect is in flight all await that same attempt; a failed attempt
//! drops the manager back to `Disconnected` so the next caller retries.
//!
//! Channels are cached per purpose and tagged with the connection generation
//! they were opened on. Callers re-request their channel on every send, and a
//! reconnect transparently replaces every cached channel.

use crate::amqp::transport::{ConnectionStatus, Connector, SharedChannel, SharedConnection};
use crate::error::DispatchError;
use crate::metrics::DispatchMetrics;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, warn};

type ConnectAttempt = Shared<BoxFuture<'static, Result<LiveConnection, DispatchError>>>;

type ChannelSlot = Arc<tokio::sync::Mutex<Option<PurposeChannel>>>;

/// An established connection together with the generation it was opened as
#[derive(Clone)]
pub struct LiveConnection {
    pub generation: u64,
    pub handle: SharedConnection,
}

/// A cached channel handed out for one purpose
#[derive(Clone)]
pub struct PurposeChannel {
    id: u64,
    generation: u64,
    channel: SharedChannel,
}

impl PurposeChannel {
    /// Process-unique id; a new id means a new channel lifetime
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Connection generation this channel belongs to
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn channel(&self) -> &SharedChannel {
        &self.channel
    }
}

impl std::fmt::Debug for PurposeChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PurposeChannel")
            .field("id", &self.id)
            .field("generation", &self.generation)
            .field("open", &self.channel.is_open())
            .finish()
    }
}

impl std::fmt::Debug for LiveConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveConnection")
            .field("generation", &self.generation)
            .field("open", &self.handle.is_open())
            .finish()
    }
}

enum ConnectionState {
    Disconnected,
    Connecting {
        generation: u64,
        attempt: ConnectAttempt,
    },
    Ready(LiveConnection),
}

/// Owns the broker connection and the per-purpose channel cache
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    connect_timeout: Duration,
    state: Arc<Mutex<ConnectionState>>,
    channels: Mutex<HashMap<String, ChannelSlot>>,
    next_generation: AtomicU64,
    next_channel_id: AtomicU64,
    connect_attempts: AtomicU64,
    metrics: Option<DispatchMetrics>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ConnectionManager {
    /// Create a manager in the `Disconnected` state. No I/O happens here.
    pub fn new(connector: Arc<dyn Connector>, connect_timeout: Duration) -> Self {
        Self {
            connector,
            connect_timeout,
            state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            channels: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
            next_channel_id: AtomicU64::new(0),
            connect_attempts: AtomicU64::new(0),
            metrics: None,
        }
    }

    /// Report connect attempts and connection state to `metrics`
    pub fn with_metrics(mut self, metrics: DispatchMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn status(&self) -> ConnectionStatus {
        match &*lock(&self.state) {
            ConnectionState::Disconnected => ConnectionStatus::Disconnected,
            ConnectionState::Connecting { .. } => ConnectionStatus::Connecting,
            ConnectionState::Ready(live) if live.handle.is_open() => ConnectionStatus::Ready,
            ConnectionState::Ready(_) => ConnectionStatus::Disconnected,
        }
    }

    /// Number of transport connection attempts started so far
    pub fn connect_attempts(&self) -> u64 {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn endpoint(&self) -> String {
        self.connector.endpoint()
    }

    /// Return the live connection, connecting first if necessary.
    ///
    /// A connect failure is returned only to the callers awaiting this attempt.
    pub async fn connection(&self) -> Result<LiveConnection, DispatchError> {
        let attempt = {
            let mut state = lock(&self.state);
            let pending = match &*state {
                ConnectionState::Ready(live) if live.handle.is_open() => {
                    return Ok(live.clone());
                }
                ConnectionState::Ready(live) => {
                    warn!(
                        generation = live.generation,
                        "Broker connection closed by transport, reconnecting"
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.set_connected(false);
                    }
                    None
                }
                ConnectionState::Connecting { attempt, .. } => Some(attempt.clone()),
                ConnectionState::Disconnected => None,
            };

            match pending {
                Some(attempt) => attempt,
                None => self.begin_attempt(&mut state),
            }
        };

        attempt.await
    }

    /// Claim the connect transition. Must be called with the state lock held,
    /// so exactly one attempt is stored before any other caller can look.
    fn begin_attempt(&self, state: &mut ConnectionState) -> ConnectAttempt {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let attempt_number = self.connect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(metrics) = &self.metrics {
            metrics.record_connect_attempt();
        }

        info!(
            endpoint = %self.connector.endpoint(),
            generation,
            attempt = attempt_number,
            "Connecting to broker"
        );

        let connector = self.connector.clone();
        let shared_state = self.state.clone();
        let metrics = self.metrics.clone();
        let connect_timeout = self.connect_timeout;

        // The attempt runs on its own task so a caller timing out does not
        // stall the handshake for everyone else waiting on it.
        let task = tokio::spawn(async move {
            let outcome = match tokio::time::timeout(connect_timeout, connector.connect()).await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(DispatchError::Timeout {
                    operation: "broker connect".to_string(),
                    timeout_ms: connect_timeout.as_millis() as u64,
                }),
            };
            settle_attempt(&shared_state, generation, outcome, metrics.as_ref()).await
        });

        let panic_state = self.state.clone();
        let attempt = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    let mut state = lock(&panic_state);
                    if matches!(&*state, ConnectionState::Connecting { generation: g, .. } if *g == generation)
                    {
                        *state = ConnectionState::Disconnected;
                    }
                    Err(DispatchError::Connection {
                        message: format!("connect task failed: {}", e),
                    })
                }
            }
        }
        .boxed()
        .shared();

        *state = ConnectionState::Connecting {
            generation,
            attempt: attempt.clone(),
        };
        attempt
    }

    /// Get the cached channel for `purpose`, opening one if the cache is empty,
    /// closed, or belongs to an older connection.
    pub async fn get_channel(&self, purpose: &str) -> Result<PurposeChannel, DispatchError> {
        let live = self.connection().await?;
        let slot = self.channel_slot(purpose);
        let mut cached = slot.lock().await;

        if let Some(existing) = cached.as_ref() {
            if existing.generation == live.generation && existing.channel.is_open() {
                return Ok(existing.clone());
            }
            debug!(
                purpose,
                channel_id = existing.id,
                "Cached channel is stale, reopening"
            );
        }

        let channel = match live.handle.open_channel().await {
            Ok(channel) => channel,
            Err(e) => {
                // Same recovery as a connect failure: start over on next demand.
                self.invalidate(live.generation).await;
                return Err(e);
            }
        };

        let entry = PurposeChannel {
            id: self.next_channel_id.fetch_add(1, Ordering::SeqCst) + 1,
            generation: live.generation,
            channel,
        };
        info!(
            purpose,
            generation = live.generation,
            channel_id = entry.id,
            "Opened broker channel"
        );

        *cached = Some(entry.clone());
        Ok(entry)
    }

    fn channel_slot(&self, purpose: &str) -> ChannelSlot {
        lock(&self.channels)
            .entry(purpose.to_string())
            .or_default()
            .clone()
    }

    /// Drop the connection of `generation` if it is still the current one
    async fn invalidate(&self, generation: u64) {
        let stale = {
            let mut state = lock(&self.state);
            let current = matches!(
                &*state,
                ConnectionState::Ready(live) if live.generation == generation
            );
            if current {
                match std::mem::replace(&mut *state, ConnectionState::Disconnected) {
                    ConnectionState::Ready(live) => Some(live),
                    _ => None,
                }
            } else {
                None
            }
        };

        if let Some(live) = stale {
            warn!(generation, "Discarding unusable broker connection");
            if let Some(metrics) = &self.metrics {
                metrics.set_connected(false);
            }
            if let Err(e) = live.handle.close().await {
                debug!(generation, error = %e, "Close of discarded connection failed");
            }
        }
    }

    /// Close the connection if there is one and reset to `Disconnected`.
    ///
    /// Idempotent. An in-flight attempt is abandoned; if it later succeeds
    /// its connection is closed instead of being installed.
    pub async fn disconnect(&self) {
        let previous = std::mem::replace(&mut *lock(&self.state), ConnectionState::Disconnected);
        lock(&self.channels).clear();
        if let Some(metrics) = &self.metrics {
            metrics.set_connected(false);
        }

        match previous {
            ConnectionState::Ready(live) => match live.handle.close().await {
                Ok(()) => info!(generation = live.generation, "Broker connection closed"),
                Err(e) => warn!(
                    generation = live.generation,
                    error = %e,
                    "Broker connection did not close cleanly"
                ),
            },
            ConnectionState::Connecting { generation, .. } => {
                info!(generation, "Abandoning in-flight broker connection attempt")
            }
            ConnectionState::Disconnected => debug!("Broker already disconnected"),
        }
    }
}

/// Record the outcome of attempt `generation`, unless a disconnect or a newer
/// attempt has superseded it.
async fn settle_attempt(
    state: &Mutex<ConnectionState>,
    generation: u64,
    outcome: Result<SharedConnection, DispatchError>,
    metrics: Option<&DispatchMetrics>,
) -> Result<LiveConnection, DispatchError> {
    let current = {
        let mut state = lock(state);
        let current = matches!(
            &*state,
            ConnectionState::Connecting { generation: g, .. } if *g == generation
        );
        if current {
            *state = match &outcome {
                Ok(handle) => ConnectionState::Ready(LiveConnection {
                    generation,
                    handle: handle.clone(),
                }),
                Err(_) => ConnectionState::Disconnected,
            };
        }
        current
    };

    match outcome {
        Ok(handle) if !current => {
            info!(generation, "Closing connection from superseded attempt");
            if let Err(e) = handle.close().await {
                debug!(generation, error = %e, "Close of superseded connection failed");
            }
            Err(DispatchError::Connection {
                message: "connection attempt superseded by disconnect".to_string(),
            })
        }
        Ok(handle) => {
            info!(generation, "Broker connection ready");
            if let Some(metrics) = metrics {
                metrics.set_connected(true);
            }
            Ok(LiveConnection { generation, handle })
        }
        Err(e) => {
            error!(generation, error = %e, "Broker connection attempt failed");
            Err(e)
        }
    }
}
