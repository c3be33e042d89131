//! # Hushwire Transport
//!
//! Routing, deduplication and historic retrieval between a chat protocol and
//! a gossip relay network.
//!
//! This crate provides:
//! - Outbound routing per conversation kind
//! - Historic requests correlated with their completion events
//! - Collection of unseen inbound messages
//! - Periodic removal of publish-only filters
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use hushwire_core::memory::{MemoryFilterRegistry, MemoryRelay};
//! use hushwire_core::{IdentityKey, MemoryProcessedCache, OutboundMessage};
//! use hushwire_transport::TransportBuilder;
//!
//! # async fn example() -> hushwire_transport::Result<()> {
//! let relay = Arc::new(MemoryRelay::new());
//! let identity = IdentityKey::generate();
//! let registry = Arc::new(MemoryFilterRegistry::new(relay.clone(), identity.clone()));
//!
//! let transport = TransportBuilder::new(
//!     relay,
//!     registry,
//!     Arc::new(MemoryProcessedCache::new()),
//!     identity,
//! )
//! .build()?;
//!
//! transport.start();
//! transport.join_public("status").await?;
//! transport
//!     .send_public(OutboundMessage::new(b"hello".to_vec()), "status")
//!     .await?;
//! let _unseen = transport.collect_unseen().await?;
//! transport.stop().await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod collector;
pub mod config;
pub mod error;
pub mod history;
pub mod janitor;
pub mod keys;
pub mod router;
pub mod transport;

pub use collector::InboundCollector;
pub use config::TransportConfig;
pub use error::{Result, TransportError};
pub use history::{HistoricRequester, HistoryQuery};
pub use janitor::FilterJanitor;
pub use keys::KeysManager;
pub use router::{pubkey_to_hex, OutboundRouter};
pub use transport::{Transport, TransportBuilder};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::TransportConfig;
    pub use crate::error::{Result, TransportError};
    pub use crate::history::HistoryQuery;
    pub use crate::transport::{Transport, TransportBuilder};
    pub use tokio_util::sync::CancellationToken;
}
