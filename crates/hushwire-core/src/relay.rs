//! Relay client interface

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::error::Result;
use crate::event::EnvelopeEvent;
use crate::keys::{IdentityKey, PeerId};
use crate::message::{Hash, OutboundMessage, ReceivedMessage};
use crate::request::HistoricRequest;

/// Client of the gossip relay network
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait Relay: Send + Sync {
    /// Register a key pair with the relay and return its handle.
    /// Registering the same key again returns the same handle.
    async fn add_key_pair(&self, key: &IdentityKey) -> Result<String>;

    /// Derive a symmetric key from a password and return its handle
    async fn add_sym_key_from_password(&self, password: &str) -> Result<String>;

    /// Raw bytes of a symmetric key
    async fn get_sym_key(&self, id: &str) -> Result<Vec<u8>>;

    /// Publish a message and return the envelope hash
    async fn post(&self, message: OutboundMessage) -> Result<Hash>;

    /// Drain messages pending on a filter, in arrival order
    async fn filter_messages(&self, filter_id: &str) -> Result<Vec<ReceivedMessage>>;

    /// Send a historic request to a mail server peer
    async fn send_messages_request(&self, peer: &PeerId, request: HistoricRequest) -> Result<()>;

    /// Subscribe to the envelope event stream; dropping the receiver
    /// unsubscribes
    fn subscribe_envelope_events(&self) -> broadcast::Receiver<EnvelopeEvent>;

    /// Relay clock
    fn current_time(&self) -> DateTime<Utc>;

    /// Largest payload the relay accepts
    fn max_message_size(&self) -> u32;
}
