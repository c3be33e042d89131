//! Error types for collaborator calls

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the relay, filter selector and processed-message cache
#[derive(Debug, Error)]
pub enum Error {
    /// No relay or mail server is configured at all
    #[error("No relay available")]
    NoRelayAvailable,

    /// Relay client failure (publish, fetch, peer request)
    #[error("Relay error: {0}")]
    Relay(String),

    /// Filter or key derivation failed
    #[error("Filter error: {0}")]
    Filter(String),

    /// Unknown key handle
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// Unknown filter
    #[error("Filter not found: {0}")]
    FilterNotFound(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid historic request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid key material
    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

impl From<sled::Error> for Error {
    fn from(err: sled::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<hex::FromHexError> for Error {
    fn from(err: hex::FromHexError) -> Self {
        Error::Serialization(err.to_string())
    }
}
