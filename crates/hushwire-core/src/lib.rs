//! # Hushwire Core
//!
//! Shared data model and collaborator interfaces for the Hushwire transport,
//! the layer between a chat protocol and a gossip relay network.
//!
//! This crate provides:
//! - Topics and the fixed-width topic bloom filter
//! - Filters, outbound and received messages, historic requests
//! - Envelope lifecycle events emitted by the relay
//! - The collaborator traits the transport consumes: [`Relay`],
//!   [`FilterSelector`], [`ProcessedCache`] and [`EnvelopeMonitor`]
//! - In-memory collaborators for tests and local runs

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod bloom;
pub mod cache;
pub mod error;
pub mod event;
pub mod filter;
pub mod keys;
pub mod memory;
pub mod message;
pub mod monitor;
pub mod relay;
pub mod request;
pub mod selector;
pub mod topic;

pub use bloom::{BloomFilter, BLOOM_FILTER_SIZE};
pub use cache::{MemoryProcessedCache, ProcessedCache, SledProcessedCache};
pub use error::{Error, Result};
pub use event::{EnvelopeEvent, EnvelopeEventKind, MailServerResponse};
pub use filter::{Filter, KeyHandle, NegotiatedSecret};
pub use keys::{IdentityKey, PeerId, PublicKey};
pub use message::{Hash, OutboundMessage, ReceivedMessage, Recipient};
pub use monitor::{EnvelopeEventsHandler, EnvelopeMonitor};
pub use relay::Relay;
pub use request::{Cursor, HistoricRequest, RequestId};
pub use selector::FilterSelector;
pub use topic::{Topic, TOPIC_LENGTH};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::bloom::BloomFilter;
    pub use crate::cache::ProcessedCache;
    pub use crate::error::{Error, Result};
    pub use crate::event::{EnvelopeEvent, EnvelopeEventKind};
    pub use crate::filter::{Filter, KeyHandle};
    pub use crate::keys::{IdentityKey, PeerId, PublicKey};
    pub use crate::message::{OutboundMessage, ReceivedMessage, Recipient};
    pub use crate::relay::Relay;
    pub use crate::request::{Cursor, HistoricRequest};
    pub use crate::selector::FilterSelector;
    pub use crate::topic::Topic;
}
