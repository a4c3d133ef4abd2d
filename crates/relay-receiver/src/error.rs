//! Receiver error types.

use thiserror::Error;

use crate::validator::ValidationError;

/// Receiver error type.
#[derive(Error, Debug)]
pub enum ReceiverError {
    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Inbound frame that matches neither message format
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Request that decoded but cannot be dispatched
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Signature or freshness check failed
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The action runner returned an error or panicked
    #[error("Dispatch failed: {0}")]
    Dispatch(String),
}

/// Result type alias using ReceiverError.
pub type ReceiverResult<T> = Result<T, ReceiverError>;
