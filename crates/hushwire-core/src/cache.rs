//! Processed-message cache used for deduplication
//!
//! Records map a message id to the time it was confirmed as processed.
//! The transport only issues batched lookups and inserts.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{Error, Result};

/// Store of message ids already delivered to the application
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait ProcessedCache: Send + Sync {
    /// Which of `ids` have been recorded
    async fn hits(&self, ids: &[String]) -> Result<HashSet<String>>;

    /// Record `ids` as processed at `timestamp`
    async fn add(&self, ids: &[String], timestamp: u64) -> Result<()>;

    /// Evict every record with a timestamp strictly below `timestamp`
    async fn clean(&self, timestamp: u64) -> Result<()>;
}

/// In-memory processed-message cache
#[derive(Debug, Default)]
pub struct MemoryProcessedCache {
    seen: RwLock<HashMap<String, u64>>,
}

impl MemoryProcessedCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.seen.read().len()
    }

    /// Whether there are no records
    pub fn is_empty(&self) -> bool {
        self.seen.read().is_empty()
    }
}

#[async_trait]
impl ProcessedCache for MemoryProcessedCache {
    async fn hits(&self, ids: &[String]) -> Result<HashSet<String>> {
        let seen = self.seen.read();
        Ok(ids.iter().filter(|id| seen.contains_key(*id)).cloned().collect())
    }

    async fn add(&self, ids: &[String], timestamp: u64) -> Result<()> {
        let mut seen = self.seen.write();
        for id in ids {
            seen.insert(id.clone(), timestamp);
        }
        Ok(())
    }

    async fn clean(&self, timestamp: u64) -> Result<()> {
        let mut seen = self.seen.write();
        let before = seen.len();
        seen.retain(|_, at| *at >= timestamp);
        debug!("Evicted {} processed message ids", before - seen.len());
        Ok(())
    }
}

/// Sled-backed processed-message cache
pub struct SledProcessedCache {
    tree: sled::Tree,
}

impl SledProcessedCache {
    const TREE: &'static str = "transport_message_cache";

    /// Open or create the cache at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)?;
        Self::with_db(&db)
    }

    /// Use a tree of an already open database
    pub fn with_db(db: &sled::Db) -> Result<Self> {
        Ok(Self {
            tree: db.open_tree(Self::TREE)?,
        })
    }

    fn decode_timestamp(bytes: &[u8]) -> Result<u64> {
        let raw: [u8; 8] = bytes
            .try_into()
            .map_err(|_| Error::Storage(format!("corrupt timestamp of {} bytes", bytes.len())))?;
        Ok(u64::from_be_bytes(raw))
    }
}

#[async_trait]
impl ProcessedCache for SledProcessedCache {
    async fn hits(&self, ids: &[String]) -> Result<HashSet<String>> {
        let mut hits = HashSet::new();
        for id in ids {
            if self.tree.contains_key(id.as_bytes())? {
                hits.insert(id.clone());
            }
        }
        Ok(hits)
    }

    async fn add(&self, ids: &[String], timestamp: u64) -> Result<()> {
        let mut batch = sled::Batch::default();
        for id in ids {
            batch.insert(id.as_bytes(), timestamp.to_be_bytes().to_vec());
        }
        self.tree.apply_batch(batch)?;
        self.tree.flush_async().await?;
        Ok(())
    }

    async fn clean(&self, timestamp: u64) -> Result<()> {
        let mut batch = sled::Batch::default();
        let mut evicted = 0usize;

        for entry in self.tree.iter() {
            let (key, value) = entry?;
            if Self::decode_timestamp(&value)? < timestamp {
                batch.remove(key);
                evicted += 1;
            }
        }

        self.tree.apply_batch(batch)?;
        self.tree.flush_async().await?;
        debug!("Evicted {} processed message ids", evicted);
        Ok(())
    }
}
