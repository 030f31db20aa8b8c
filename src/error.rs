/// Error types for the dhaba client core.
/// The taxonomy keeps transport failures, expired sessions, and rejected
/// credentials distinct so callers can react to each differently.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    /// Transport-level failure (timeout, DNS, connection refused).
    /// Retryable by the caller; never clears stored credentials.
    #[error("Network error: {0}")]
    Network(String),

    /// Token refresh exhausted. The token store has been cleared and the
    /// user must sign in again.
    #[error("Session expired, sign in again")]
    SessionExpired,

    /// Login or signup rejected by the backend.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Realtime chat channel could not be established.
    #[error("Chat unavailable: {0}")]
    ChatUnavailable(String),

    /// Malformed local input (empty message body, empty cart at checkout).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unexpected response from the backend (non-401 error status,
    /// missing fields).
    #[error("Server error: {0}")]
    Server(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("State error: {0}")]
    State(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;

impl ClientError {
    /// Whether the caller may usefully retry the same call unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Network(_) | ClientError::ChatUnavailable(_))
    }
}
