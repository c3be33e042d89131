//! Filters: local bindings of a topic to key material

use serde::{Deserialize, Serialize};

use crate::keys::PublicKey;
use crate::topic::Topic;

/// Relay-held key a filter decrypts with
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum KeyHandle {
    /// Symmetric key id
    Symmetric(String),
    /// Asymmetric key pair id
    Asymmetric(String),
}

impl KeyHandle {
    /// Symmetric key id, if any
    pub fn sym_key_id(&self) -> Option<&str> {
        match self {
            KeyHandle::Symmetric(id) => Some(id),
            KeyHandle::Asymmetric(_) => None,
        }
    }
}

/// Relay subscription for one conversation
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Filter {
    /// Conversation identifier (chat name, or a key-derived name)
    pub chat_id: String,
    /// Relay filter id used to fetch pending messages
    pub filter_id: String,
    /// Decryption key
    pub key: KeyHandle,
    /// Topic subscribed to
    pub topic: Topic,
    /// Remote identity for one-to-one filters
    pub identity: Option<PublicKey>,
    /// Whether this is a one-to-one conversation
    pub one_to_one: bool,
    /// Whether this is a discovery (partitioned or personal) topic
    pub discovery: bool,
    /// Whether this filter was derived from a negotiated secret
    pub negotiated: bool,
    /// Whether this process listens for inbound messages on it, as opposed
    /// to holding it only to publish
    pub listen: bool,
}

impl Filter {
    /// Symmetric key id, if the filter decrypts symmetrically
    pub fn sym_key_id(&self) -> Option<&str> {
        self.key.sym_key_id()
    }
}

/// Shared secret negotiated with a peer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NegotiatedSecret {
    /// Peer the secret is shared with
    pub public_key: PublicKey,
    /// Secret bytes
    pub key: Vec<u8>,
}
