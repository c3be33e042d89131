//! Topic bloom filter for historic requests
//!
//! A mail server is asked for every envelope whose topic bloom is covered by
//! the request's filter. The filter for a set of topics is the bitwise OR of
//! the per-topic encodings, so it is order-independent and an empty set
//! yields the all-zero filter.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::topic::Topic;

/// Size of a topic bloom filter in bytes
pub const BLOOM_FILTER_SIZE: usize = 64;

/// Fixed-width probabilistic encoding of a set of topics
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BloomFilter([u8; BLOOM_FILTER_SIZE]);

impl BloomFilter {
    /// The all-zero filter
    pub const fn empty() -> Self {
        Self([0u8; BLOOM_FILTER_SIZE])
    }

    /// Aggregate a set of topics into one filter
    pub fn from_topics<'a, I>(topics: I) -> Self
    where
        I: IntoIterator<Item = &'a Topic>,
    {
        topics
            .into_iter()
            .fold(Self::empty(), |acc, topic| acc.union(&Self(topic.to_bloom())))
    }

    /// Build from a big-endian byte string, right-aligned into the fixed width.
    ///
    /// Leading bytes beyond the fixed width are dropped.
    pub fn from_be_slice(bytes: &[u8]) -> Self {
        let mut filter = [0u8; BLOOM_FILTER_SIZE];
        let take = bytes.len().min(BLOOM_FILTER_SIZE);
        filter[BLOOM_FILTER_SIZE - take..].copy_from_slice(&bytes[bytes.len() - take..]);
        Self(filter)
    }

    /// Bitwise OR of two filters
    pub fn union(&self, other: &Self) -> Self {
        let mut out = self.0;
        for (a, b) in out.iter_mut().zip(other.0.iter()) {
            *a |= b;
        }
        Self(out)
    }

    /// Whether every bit of the topic's encoding is set in this filter.
    ///
    /// False positives are possible, false negatives are not.
    pub fn matches(&self, topic: &Topic) -> bool {
        topic
            .to_bloom()
            .iter()
            .zip(self.0.iter())
            .all(|(t, f)| t & f == *t)
    }

    /// Whether no bit is set
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; BLOOM_FILTER_SIZE] {
        &self.0
    }
}

impl Default for BloomFilter {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<[u8; BLOOM_FILTER_SIZE]> for BloomFilter {
    fn from(bytes: [u8; BLOOM_FILTER_SIZE]) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BloomFilter({})", hex::encode(self.0))
    }
}

impl fmt::Display for BloomFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Serialize for BloomFilter {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for BloomFilter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let mut bytes = [0u8; BLOOM_FILTER_SIZE];
        hex::decode_to_slice(s.strip_prefix("0x").unwrap_or(&s), &mut bytes)
            .map_err(serde::de::Error::custom)?;
        Ok(Self(bytes))
    }
}
