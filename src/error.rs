//! Error handling module
//!
//! Defines custom error types for the Neon World server.

use std::io;

use thiserror::Error;
use uuid::Uuid;

/// Main error type for the Neon World server
#[derive(Error, Debug)]
pub enum WorldError {
    /// Network-related errors
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Protocol-related errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Item catalog errors
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Network-specific errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Too many connections ({0} active)")]
    TooManyConnections(usize),

    #[error("World is not accepting connections")]
    NotAccepting,
}

/// Protocol-specific errors
///
/// None of these end a session; the offending frame is dropped.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    #[error("Malformed payload for {event}: {reason}")]
    MalformedPayload { event: String, reason: String },

    #[error("User id {claimed} does not match session {session}")]
    UserMismatch { claimed: Uuid, session: Uuid },

    #[error("Unsupported frame: {0}")]
    UnsupportedFrame(&'static str),

    #[error("Failed to encode {event}: {reason}")]
    Encode { event: &'static str, reason: String },
}

/// Item catalog errors
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Catalog database not configured")]
    NotConfigured,

    #[error("Invalid catalog row {id}: {reason}")]
    InvalidRow { id: String, reason: String },
}

/// Result type alias for Neon World operations
pub type Result<T> = std::result::Result<T, WorldError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NetworkError::ConnectionClosed;
        assert_eq!(err.to_string(), "Connection closed");

        let err = ProtocolError::UnknownEvent("user:dance".to_string());
        assert_eq!(err.to_string(), "Unknown event: user:dance");

        let err = ProtocolError::MalformedPayload {
            event: "item:drop".to_string(),
            reason: "missing field `position`".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Malformed payload for item:drop: missing field `position`"
        );
    }

    #[test]
    fn test_error_wrapping() {
        let err: WorldError = NetworkError::TooManyConnections(3).into();
        assert_eq!(
            err.to_string(),
            "Network error: Too many connections (3 active)"
        );

        let err: WorldError = CatalogError::NotConfigured.into();
        assert_eq!(
            err.to_string(),
            "Catalog error: Catalog database not configured"
        );
    }
}
