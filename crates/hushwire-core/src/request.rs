//! Historic message requests sent to mail servers

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bloom::BloomFilter;
use crate::error::{Error, Result};
use crate::message::Hash;
use crate::topic::Topic;

/// Page size of a historic request
pub const DEFAULT_PAGE_LIMIT: u32 = 100;

/// Largest page a mail server will serve
pub const MAX_PAGE_LIMIT: u32 = 1000;

/// Default look-back window when no lower bound is given (24 hours)
pub const DEFAULT_WINDOW_SECS: u32 = 86_400;

/// Identifier of a historic request: 32 lowercase hex characters of a
/// random 16-byte token
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(String);

impl RequestId {
    /// Fresh random identifier
    pub fn random() -> Self {
        Self(hex::encode(Uuid::new_v4().as_bytes()))
    }

    /// Hex string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The hash completion events for this request carry: the 32 ASCII
    /// bytes of the identifier
    pub fn to_hash(&self) -> Hash {
        let mut bytes = [0u8; 32];
        let src = self.0.as_bytes();
        let take = src.len().min(32);
        bytes[..take].copy_from_slice(&src[..take]);
        Hash::new(bytes)
    }
}

impl fmt::Debug for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestId({})", self.0)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque pagination token returned by a mail server; empty when there are
/// no further pages
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cursor(#[serde(with = "hex::serde")] Vec<u8>);

impl Cursor {
    /// Create from raw bytes
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Whether there are no further pages
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Cursor {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cursor({})", hex::encode(&self.0))
    }
}

/// Request for envelopes stored by a mail server
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricRequest {
    /// Request identifier
    pub id: RequestId,
    /// Lower bound of the time range (Unix seconds)
    pub from: u32,
    /// Upper bound of the time range (Unix seconds)
    pub to: u32,
    /// Page size
    pub limit: u32,
    /// Continuation of a previous page
    pub cursor: Cursor,
    /// Topics of interest
    pub bloom: BloomFilter,
}

impl HistoricRequest {
    /// Build a request with a fresh identifier over the given topics
    pub fn new(from: u32, to: u32, cursor: Cursor, topics: &[Topic]) -> Self {
        Self {
            id: RequestId::random(),
            from,
            to,
            limit: DEFAULT_PAGE_LIMIT,
            cursor,
            bloom: BloomFilter::from_topics(topics),
        }
    }

    /// Override the page size
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// Fill in unset bounds: `to` becomes `now`, `from` becomes `to` minus
    /// `window_secs` (saturating at zero)
    pub fn set_defaults(&mut self, now: DateTime<Utc>, window_secs: u32) {
        if self.to == 0 {
            self.to = u32::try_from(now.timestamp().max(0)).unwrap_or(u32::MAX);
        }
        if self.from == 0 {
            self.from = self.to.saturating_sub(window_secs);
        }
    }

    /// Check bounds and page size
    pub fn validate(&self) -> Result<()> {
        if self.from > self.to {
            return Err(Error::InvalidRequest(format!(
                "from {} is after to {}",
                self.from, self.to
            )));
        }
        if self.limit == 0 || self.limit > MAX_PAGE_LIMIT {
            return Err(Error::InvalidRequest(format!(
                "limit {} outside 1..={}",
                self.limit, MAX_PAGE_LIMIT
            )));
        }
        Ok(())
    }
}
