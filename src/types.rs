//! Task payloads and queue definitions shared by producers and consumers

use serde::{Deserialize, Serialize};

/// Queue consumed by the player roster worker
pub const PLAYER_REQUESTS_QUEUE: &str = "player_requests";

/// Queue consumed by the clan roster worker
pub const CLAN_REQUESTS_QUEUE: &str = "clan_requests";

/// Re-ingest a single player's profile and activity history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRequest {
    pub membership_id: i64,
}

/// Re-ingest a clan's member roster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClanRequest {
    pub group_id: i64,
}

/// Parameters used when asserting a queue on the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueOptions {
    /// Whether the queue survives a broker restart
    pub durable: bool,
}

impl Default for QueueOptions {
    fn default() -> Self {
        // Task messages are disposable; a restart simply loses them.
        Self { durable: false }
    }
}
