//! Relay topics

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::bloom::BLOOM_FILTER_SIZE;
use crate::error::{Error, Result};

/// Length of a topic in bytes
pub const TOPIC_LENGTH: usize = 4;

/// Fixed-size identifier of a pub/sub channel on the relay network
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Topic(#[serde(with = "hex::serde")] pub [u8; TOPIC_LENGTH]);

impl Topic {
    /// Create from raw bytes
    pub const fn new(bytes: [u8; TOPIC_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Derive the topic for a chat name: the first four bytes of its Keccak-256
    pub fn from_chat_id(chat_id: &str) -> Self {
        let digest = Keccak256::digest(chat_id.as_bytes());
        let mut topic = [0u8; TOPIC_LENGTH];
        topic.copy_from_slice(&digest[..TOPIC_LENGTH]);
        Self(topic)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; TOPIC_LENGTH] {
        &self.0
    }

    /// Per-topic bloom encoding.
    ///
    /// Three bit positions in `0..512` are taken from the first three bytes,
    /// each extended by one bit of the fourth byte. Must stay bit-identical to
    /// the relay's envelope bloom, which writes each byte by assignment.
    pub fn to_bloom(&self) -> [u8; BLOOM_FILTER_SIZE] {
        let mut bloom = [0u8; BLOOM_FILTER_SIZE];
        let mut index = [0usize; 3];

        for (j, slot) in index.iter_mut().enumerate() {
            *slot = self.0[j] as usize;
            if self.0[3] & (1 << j) != 0 {
                *slot += 256;
            }
        }

        for i in index {
            bloom[i / 8] = 1 << (i % 8);
        }

        bloom
    }
}

impl From<[u8; TOPIC_LENGTH]> for Topic {
    fn from(bytes: [u8; TOPIC_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Topic {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = [0u8; TOPIC_LENGTH];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}
