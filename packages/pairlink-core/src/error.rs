//! # Error Handling
//!
//! Error types for the pairlink engine.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Lifecycle (100)                                                   │
//! │  │   └── ContextClosed        - A context channel has shut down        │
//! │  │                                                                      │
//! │  ├── Routing (200)                                                     │
//! │  │   ├── RequestNotFound      - Response has no pending request        │
//! │  │   ├── UnknownAction        - No handler for the action              │
//! │  │   └── InvalidEnvelope      - Payload does not fit the target        │
//! │  │                                                                      │
//! │  ├── Transport (300)                                                   │
//! │  │   ├── TransportNotReady    - Not connected, or no peers paired      │
//! │  │   ├── PeerNotFound         - No peer with that key / sender id      │
//! │  │   └── InvalidKey           - Peer public key is malformed           │
//! │  │                                                                      │
//! │  ├── Storage (400)                                                     │
//! │  ├── Codec (500)                                                       │
//! │  ├── Decisions (600)                                                   │
//! │  │   ├── DecisionMismatch     - Decision kind differs from request     │
//! │  │   └── NotGranted           - Requester lacks the needed scope       │
//! │  ├── Popup (700)                                                       │
//! │  └── Internal (900)                                                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Crossing a Context Boundary
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Background context              channel               Page / popup    │
//! │  ──────────────────────────────────────────────────────────────────     │
//! │                                                                         │
//! │  Result<T, Error>  ──────►  ErrorReport (JSON)  ──────►  rejected op   │
//! │                              { code, message, recoverable }            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for pairlink operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Lifecycle Errors (100-199)
    // ========================================================================

    /// A context's channel was closed
    #[error("Context channel closed: {0}")]
    ContextClosed(String),

    // ========================================================================
    // Routing Errors (200-299)
    // ========================================================================

    /// A response could not be matched to a pending request
    #[error("Matching request not found: {0}")]
    RequestNotFound(String),

    /// No handler is registered for an action
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    /// The envelope payload does not match its target
    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),

    // ========================================================================
    // Transport Errors (300-399)
    // ========================================================================

    /// Transport is not connected or has no peers
    #[error("Transport not ready: {0}")]
    TransportNotReady(String),

    /// No peer matches the destination
    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    /// Invalid key format or length
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    // ========================================================================
    // Storage Errors (400-499)
    // ========================================================================

    /// Failed to read from storage
    #[error("Failed to read from storage: {0}")]
    StorageReadError(String),

    /// Failed to write to storage
    #[error("Failed to write to storage: {0}")]
    StorageWriteError(String),

    /// Stored value could not be interpreted
    #[error("Data corruption detected: {0}")]
    StorageCorrupted(String),

    /// Database error
    #[error("Database error: {0}")]
    DatabaseError(String),

    // ========================================================================
    // Codec Errors (500-599)
    // ========================================================================

    /// Encoding a message failed
    #[error("Failed to encode message: {0}")]
    EncodeFailed(String),

    /// Decoding a message failed
    #[error("Failed to decode message: {0}")]
    DecodeFailed(String),

    /// Encoded message exceeds the size limit
    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge {
        /// Actual size
        size: usize,
        /// Limit
        max: usize,
    },

    // ========================================================================
    // Decision Errors (600-699)
    // ========================================================================

    /// The user decision does not answer the request kind
    #[error("Decision does not match request: {0}")]
    DecisionMismatch(String),

    /// The requester has no permission for this request
    #[error("Permission not granted: {0}")]
    NotGranted(String),

    // ========================================================================
    // Popup Errors (700-799)
    // ========================================================================

    /// The popup surface could not be opened
    #[error("Popup unavailable: {0}")]
    PopupUnavailable(String),

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl Error {
    /// Numeric error code, stable across the context boundary
    ///
    /// - 100-199: Lifecycle
    /// - 200-299: Routing
    /// - 300-399: Transport
    /// - 400-499: Storage
    /// - 500-599: Codec
    /// - 600-699: Decisions
    /// - 700-799: Popup
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            Error::ContextClosed(_) => 100,

            Error::RequestNotFound(_) => 200,
            Error::UnknownAction(_) => 201,
            Error::InvalidEnvelope(_) => 202,

            Error::TransportNotReady(_) => 300,
            Error::PeerNotFound(_) => 301,
            Error::InvalidKey(_) => 302,

            Error::StorageReadError(_) => 400,
            Error::StorageWriteError(_) => 401,
            Error::StorageCorrupted(_) => 402,
            Error::DatabaseError(_) => 403,

            Error::EncodeFailed(_) => 500,
            Error::DecodeFailed(_) => 501,
            Error::MessageTooLarge { .. } => 502,

            Error::DecisionMismatch(_) => 600,
            Error::NotGranted(_) => 601,

            Error::PopupUnavailable(_) => 700,

            Error::Internal(_) => 900,
            Error::SerializationError(_) => 901,
        }
    }

    /// Check if this error is recoverable
    ///
    /// Recoverable errors can go away on their own once a peer pairs,
    /// the transport connects, or the popup is reopened.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::TransportNotReady(_) | Error::PeerNotFound(_) | Error::PopupUnavailable(_)
        )
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

// ============================================================================
// CROSS-CONTEXT ERROR REPRESENTATION
// ============================================================================

/// Serializable error sent back to the context that started a flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Numeric error code
    pub code: i32,
    /// Human-readable error message
    pub message: String,
    /// Whether the error is recoverable
    pub recoverable: bool,
}

impl From<&Error> for ErrorReport {
    fn from(err: &Error) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
        }
    }
}

impl From<Error> for ErrorReport {
    fn from(err: Error) -> Self {
        ErrorReport::from(&err)
    }
}

// ============================================================================
// TESTS
// ============================================================================
