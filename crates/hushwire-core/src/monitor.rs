//! Delivery-acknowledgement monitor interface

use std::sync::Arc;

use crate::message::{Hash, OutboundMessage};
use crate::request::Cursor;

/// Receives delivery outcomes of tracked envelopes
pub trait EnvelopeEventsHandler: Send + Sync {
    /// Envelopes carrying these application identifiers were sent
    fn envelope_sent(&self, identifiers: &[Vec<u8>]);

    /// Envelopes carrying these application identifiers expired unacknowledged
    fn envelope_expired(&self, identifiers: &[Vec<u8>], reason: &str);

    /// A mail server finished serving a request
    fn mail_server_request_completed(
        &self,
        request_id: &Hash,
        last_envelope_hash: &Hash,
        cursor: &Cursor,
        error: Option<&str>,
    );

    /// A mail server request expired
    fn mail_server_request_expired(&self, request_id: &Hash);
}

/// Tracks published envelopes until they are acknowledged or expire
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
pub trait EnvelopeMonitor: Send + Sync {
    /// Track an envelope carrying the given application identifiers
    fn add(&self, identifiers: Vec<Vec<u8>>, hash: Hash, message: OutboundMessage);

    /// Install the handler notified of outcomes
    fn set_handler(&self, handler: Arc<dyn EnvelopeEventsHandler>);

    /// Start watching the relay's event stream
    fn start(&self);

    /// Stop watching
    fn stop(&self);
}
