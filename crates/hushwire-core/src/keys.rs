//! Identity keys, public keys and peer identifiers

use std::fmt;
use std::str::FromStr;

use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Length of a raw public key in bytes
pub const PUBLIC_KEY_LENGTH: usize = 32;

/// Raw public key of a peer, as attached to asymmetric envelopes
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PublicKey(#[serde(with = "hex::serde")] pub [u8; PUBLIC_KEY_LENGTH]);

impl PublicKey {
    /// Create from raw bytes, rejecting points that are not valid keys
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_LENGTH]) -> Result<Self> {
        VerifyingKey::from_bytes(&bytes).map_err(|e| Error::InvalidKey(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        &self.0
    }

    /// `0x`-prefixed lowercase hex of the raw key
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for PublicKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut bytes = [0u8; PUBLIC_KEY_LENGTH];
        hex::decode_to_slice(s.strip_prefix("0x").unwrap_or(s), &mut bytes)?;
        Self::from_bytes(bytes)
    }
}

/// Local signing identity
#[derive(Clone)]
pub struct IdentityKey {
    signing_key: SigningKey,
}

impl IdentityKey {
    /// Generate a fresh identity
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Restore from secret bytes
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(secret),
        }
    }

    /// Secret key bytes
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Public half of the identity
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing_key.verifying_key().to_bytes())
    }
}

impl fmt::Debug for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityKey")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

/// Identifier of a relay peer (e.g. a mail server)
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(#[serde(with = "hex::serde")] pub Vec<u8>);

impl PeerId {
    /// Create from raw bytes
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", hex::encode(&self.0))
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl FromStr for PeerId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(Self(hex::decode(s.strip_prefix("0x").unwrap_or(s))?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_roundtrip_secret() {
        let identity = IdentityKey::generate();
        let restored = IdentityKey::from_secret_bytes(&identity.secret_bytes());
        assert_eq!(identity.public_key(), restored.public_key());
    }

    #[test]
    fn test_public_key_hex() {
        let key = IdentityKey::generate().public_key();
        let hex = key.to_hex();

        assert!(hex.starts_with("0x"));
        assert_eq!(hex.len(), 2 + 2 * PUBLIC_KEY_LENGTH);
        assert_eq!(hex.parse::<PublicKey>().unwrap(), key);
    }

    #[test]
    fn test_debug_hides_secret() {
        let identity = IdentityKey::generate();
        let debug = format!("{:?}", identity);
        assert!(!debug.contains(&hex::encode(identity.secret_bytes())));
    }

    #[test]
    fn test_peer_id_parse() {
        let peer: PeerId = "0xabcd".parse().unwrap();
        assert_eq!(peer.as_bytes(), &[0xab, 0xcd]);
        assert_eq!(peer.to_string(), "abcd");
    }
}
