//! # Sync Error Types
//!
//! Error types for sync operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Transport     │  │     Protocol            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Connection     │  │  InvalidMessage         │ │
//! │  │  MissingShopId  │  │  Offline        │  │  SerializationFailed    │ │
//! │  │  InvalidUrl     │  │  Timeout        │  │  UnexpectedResponse     │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │    Database     │  │     Outbox      │  │      Remote             │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  DatabaseError  │  │  PayloadMismatch│  │  RemoteRejected         │ │
//! │  │                 │  │  MissingPayload │  │  DocumentMissing        │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use kirana_core::Collection;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all possible sync failures.
///
/// ## Design Principles
/// - Each variant includes enough context for debugging
/// - Errors are categorized for different handling strategies
/// - All errors are `Send + Sync` for async compatibility
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Missing shop id (required to start the engine).
    #[error("Shop id not configured")]
    MissingShopId,

    /// Invalid gateway URL.
    #[error("Invalid gateway URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// Failed to establish the gateway connection.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The device is offline (connectivity gate).
    #[error("Offline")]
    Offline,

    /// Disconnected from the gateway mid-operation.
    #[error("Disconnected from remote gateway")]
    Disconnected,

    /// Remote request timed out.
    #[error("Remote request timed out after {0} seconds")]
    Timeout(u64),

    /// WebSocket protocol error.
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    // =========================================================================
    // Protocol Errors
    // =========================================================================
    /// Invalid message received.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Failed to serialize or deserialize a message.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// The gateway answered a request with the wrong message type.
    #[error("Unexpected response: expected {expected}, got {actual}")]
    UnexpectedResponse { expected: String, actual: String },

    // =========================================================================
    // Remote Store Errors
    // =========================================================================
    /// The remote store rejected an operation.
    #[error("Remote rejected {collection}/{doc_id}: {reason}")]
    RemoteRejected {
        collection: Collection,
        doc_id: String,
        reason: String,
    },

    // =========================================================================
    // Outbox Errors
    // =========================================================================
    /// A mutation-log entry's payload does not match its collection.
    /// Non-retryable: the entry is quarantined, never sent.
    #[error("Payload shape mismatch for log entry {id}: entry says {expected}, payload is {actual}")]
    PayloadMismatch {
        id: i64,
        expected: Collection,
        actual: Collection,
    },

    /// A create/update entry with no payload to send.
    /// Non-retryable: the entry is quarantined.
    #[error("Log entry {id} has no payload for {action}")]
    MissingPayload { id: i64, action: String },

    // =========================================================================
    // Database / Internal
    // =========================================================================
    /// Local store operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Channel send/receive failed (component shut down).
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// The engine is already running / already stopped.
    #[error("Engine lifecycle error: {0}")]
    Lifecycle(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<kirana_db::DbError> for SyncError {
    fn from(err: kirana_db::DbError) -> Self {
        SyncError::DatabaseError(err.to_string())
    }
}

impl From<kirana_core::CoreError> for SyncError {
    fn from(err: kirana_core::CoreError) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed => SyncError::Disconnected,
            WsError::AlreadyClosed => SyncError::Disconnected,
            WsError::Protocol(p) => SyncError::WebSocketError(p.to_string()),
            WsError::Io(io) => SyncError::ConnectionFailed(io.to_string()),
            other => SyncError::WebSocketError(other.to_string()),
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for drain / dead-letter decisions)
// =============================================================================

impl SyncError {
    /// Returns true if this error is transient and the operation can be
    /// retried on the next drain trigger.
    ///
    /// ## Retryable
    /// - Connection failures, disconnects, timeouts, offline gate
    ///
    /// ## Non-Retryable
    /// - Payload shape mismatches (can never succeed)
    /// - Configuration errors
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::ConnectionFailed(_)
                | SyncError::Offline
                | SyncError::Disconnected
                | SyncError::Timeout(_)
                | SyncError::WebSocketError(_)
                | SyncError::RemoteRejected { .. }
        )
    }

    /// Returns true for errors that no amount of retrying can fix - the
    /// outbox dead-letters these immediately instead of blocking the queue.
    pub fn is_permanent_payload_error(&self) -> bool {
        matches!(
            self,
            SyncError::PayloadMismatch { .. } | SyncError::MissingPayload { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::ConnectionFailed("network error".into()).is_retryable());
        assert!(SyncError::Disconnected.is_retryable());
        assert!(SyncError::Timeout(30).is_retryable());
        assert!(SyncError::Offline.is_retryable());

        assert!(!SyncError::InvalidConfig("bad config".into()).is_retryable());
        assert!(!SyncError::MissingShopId.is_retryable());
    }

    #[test]
    fn test_payload_errors_are_permanent() {
        let err = SyncError::MissingPayload {
            id: 7,
            action: "create".into(),
        };
        assert!(err.is_permanent_payload_error());
        assert!(!err.is_retryable());

        let err = SyncError::PayloadMismatch {
            id: 7,
            expected: Collection::Products,
            actual: Collection::Bills,
        };
        assert!(err.is_permanent_payload_error());
    }
}
