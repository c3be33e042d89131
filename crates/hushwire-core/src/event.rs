//! Envelope lifecycle events emitted by the relay

use serde::{Deserialize, Serialize};

use crate::keys::PeerId;
use crate::message::Hash;
use crate::request::Cursor;

/// Answer of a mail server to a historic request
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailServerResponse {
    /// Hash of the last envelope delivered for this page
    pub last_envelope_hash: Hash,
    /// Cursor of the next page, empty when done
    pub cursor: Cursor,
    /// Application-level error reported by the mail server
    pub error: Option<String>,
}

/// What happened to an envelope or request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EnvelopeEventKind {
    /// Envelope handed to peers
    EnvelopeSent,
    /// Envelope expired before it was acknowledged
    EnvelopeExpired,
    /// Batch of envelopes acknowledged by a peer
    BatchAcknowledged,
    /// Envelope received from a peer
    EnvelopeReceived,
    /// Historic request handed to a mail server
    MailServerRequestSent,
    /// Mail server finished serving a historic request
    MailServerRequestCompleted(MailServerResponse),
    /// Historic request timed out at the relay
    MailServerRequestExpired,
    /// Peer added
    PeerAdded,
    /// Peer dropped
    PeerDropped,
}

/// Event on the relay's shared envelope event stream
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeEvent {
    /// Envelope hash, or the request id hash for mail-server events
    pub hash: Hash,
    /// Peer involved, if any
    pub peer: Option<PeerId>,
    /// Event kind and payload
    pub kind: EnvelopeEventKind,
}

impl EnvelopeEvent {
    /// Completion event for a historic request
    pub fn request_completed(hash: Hash, response: MailServerResponse) -> Self {
        Self {
            hash,
            peer: None,
            kind: EnvelopeEventKind::MailServerRequestCompleted(response),
        }
    }

    /// Response payload, if this is a completion event
    pub fn completion(&self) -> Option<&MailServerResponse> {
        match &self.kind {
            EnvelopeEventKind::MailServerRequestCompleted(response) => Some(response),
            _ => None,
        }
    }
}
