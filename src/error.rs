//! Error types for the dispatch subsystem
//!
//! Application code (bootstrap, config loading, binaries) uses anyhow; the
//! dispatch path uses the typed `DispatchError` so a single connect outcome
//! can be cloned out to every caller waiting on it.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Failures that can occur anywhere between a producer and the broker.
///
/// None of these ever escape `Dispatcher::send`; they are logged and
/// collapsed to `false`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DispatchError {
    #[error("broker connection failed: {message}")]
    Connection { message: String },

    #[error("channel creation failed: {message}")]
    Channel { message: String },

    #[error("failed to declare queue '{queue}': {message}")]
    QueueDeclare { queue: String, message: String },

    #[error("failed to publish to queue '{queue}': {message}")]
    Publish { queue: String, message: String },

    #[error("failed to serialize payload: {message}")]
    Serialization { message: String },

    #[error("invalid queue: {reason}")]
    InvalidQueue { reason: String },

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },
}

impl DispatchError {
    /// Errors that mean the connection (not just one queue) is unusable.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            DispatchError::Connection { .. } | DispatchError::Channel { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = DispatchError::QueueDeclare {
            queue: "clan_requests".to_string(),
            message: "access refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "failed to declare queue 'clan_requests': access refused"
        );

        let err = DispatchError::Timeout {
            operation: "dispatch".to_string(),
            timeout_ms: 2000,
        };
        assert_eq!(err.to_string(), "dispatch timed out after 2000ms");
    }

    #[test]
    fn test_transport_classification() {
        assert!(DispatchError::Connection {
            message: "refused".to_string()
        }
        .is_transport());
        assert!(DispatchError::Channel {
            message: "closed".to_string()
        }
        .is_transport());
        assert!(!DispatchError::Publish {
            queue: "q".to_string(),
            message: "closed".to_string()
        }
        .is_transport());
    }
}
