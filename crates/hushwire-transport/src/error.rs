//! Transport error types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, TransportError>;

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// No relay or mail server is configured
    #[error("No configured mailservers")]
    NoMailservers,

    /// Signing key could not be registered with the relay
    #[error("Failed to resolve signing key: {0}")]
    Signature(#[source] hushwire_core::Error),

    /// Filter or key material could not be derived
    #[error("Failed to resolve filter: {0}")]
    FilterResolution(#[source] hushwire_core::Error),

    /// Symmetric key could not be derived or read
    #[error("Key error: {0}")]
    Key(#[source] hushwire_core::Error),

    /// Relay call failed (publish, fetch, peer request)
    #[error("Relay error: {0}")]
    Relay(#[source] hushwire_core::Error),

    /// Processed-message cache failed
    #[error("Processed-message store error: {0}")]
    Store(#[source] hushwire_core::Error),

    /// Historic request rejected before dispatch
    #[error("Invalid historic request: {0}")]
    InvalidRequest(#[source] hushwire_core::Error),

    /// Mail server reported an error for a historic request
    #[error("Mail server error: {0}")]
    MailServer(String),

    /// Caller cancelled while waiting for a historic request
    #[error("Request cancelled")]
    Cancelled,

    /// Request deadline elapsed while waiting for a historic request
    #[error("Request deadline exceeded")]
    DeadlineExceeded,

    /// Relay closed the envelope event stream
    #[error("Envelope event stream closed")]
    EventStreamClosed,

    /// Transport was built without an envelope monitor
    #[error("Current transport has no envelopes monitor")]
    NoEnvelopesMonitor,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl TransportError {
    /// Filter-resolution failure, keeping "no relay available" distinct
    pub(crate) fn resolution(err: hushwire_core::Error) -> Self {
        match err {
            hushwire_core::Error::NoRelayAvailable => TransportError::NoMailservers,
            other => TransportError::FilterResolution(other),
        }
    }

    /// Whether the error is a cancellation or deadline rather than a failure
    pub fn is_cancellation(&self) -> bool {
        matches!(self, TransportError::Cancelled | TransportError::DeadlineExceeded)
    }
}
