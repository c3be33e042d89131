//! Outbound and received relay messages

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::keys::PublicKey;
use crate::topic::Topic;

/// Default envelope time-to-live in seconds
pub const DEFAULT_TTL: u32 = 15;

/// Default proof-of-work target
pub const DEFAULT_POW_TARGET: f64 = 0.002;

/// Default proof-of-work time budget in seconds
pub const DEFAULT_POW_TIME: u32 = 1;

/// 32-byte hash identifying an envelope or a mail-server request
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash(#[serde(with = "hex::serde")] pub [u8; 32]);

impl Hash {
    /// Create from raw bytes
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// `0x`-prefixed lowercase hex
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Key material an outbound envelope is encrypted with.
///
/// Symmetric key handles and raw public keys never travel together.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recipient {
    /// Relay-held symmetric key
    SymKey(String),
    /// Raw public key of the receiving peer
    PublicKey(PublicKey),
}

/// Message handed to the relay for publishing
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Encoded application payload
    pub payload: Vec<u8>,
    /// Topic the envelope is published on
    pub topic: Topic,
    /// Encryption target
    pub recipient: Option<Recipient>,
    /// Relay handle of the signing key pair
    pub sig_id: Option<String>,
    /// Time-to-live in seconds
    pub ttl: u32,
    /// Proof-of-work target
    pub pow_target: f64,
    /// Proof-of-work time budget in seconds
    pub pow_time: u32,
}

impl OutboundMessage {
    /// Create an unaddressed message with default envelope parameters
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            topic: Topic::default(),
            recipient: None,
            sig_id: None,
            ttl: DEFAULT_TTL,
            pow_target: DEFAULT_POW_TARGET,
            pow_time: DEFAULT_POW_TIME,
        }
    }

    /// Symmetric key handle, if encrypted symmetrically
    pub fn sym_key_id(&self) -> Option<&str> {
        match &self.recipient {
            Some(Recipient::SymKey(id)) => Some(id),
            _ => None,
        }
    }

    /// Raw public key, if encrypted asymmetrically
    pub fn public_key(&self) -> Option<&PublicKey> {
        match &self.recipient {
            Some(Recipient::PublicKey(key)) => Some(key),
            _ => None,
        }
    }
}

/// Decrypted message pulled from a relay filter
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedMessage {
    /// Envelope hash
    pub hash: Hash,
    /// Topic it arrived on
    pub topic: Topic,
    /// Decrypted payload
    pub payload: Vec<u8>,
    /// Signer, if signed
    pub sig: Option<PublicKey>,
    /// Recipient key, if asymmetrically encrypted
    pub dst: Option<PublicKey>,
    /// Envelope timestamp (Unix seconds)
    pub timestamp: u32,
    /// Envelope time-to-live in seconds
    pub ttl: u32,
}

impl ReceivedMessage {
    /// Content-addressed identifier used for deduplication
    pub fn id(&self) -> String {
        self.hash.to_hex()
    }
}
