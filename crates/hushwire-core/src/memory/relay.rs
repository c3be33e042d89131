//! Loopback relay

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sha3::{Digest, Keccak256};
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::{Error, Result};
use crate::event::{EnvelopeEvent, EnvelopeEventKind, MailServerResponse};
use crate::filter::KeyHandle;
use crate::keys::{IdentityKey, PeerId, PublicKey};
use crate::message::{Hash, OutboundMessage, ReceivedMessage};
use crate::relay::Relay;
use crate::request::{Cursor, HistoricRequest};
use crate::topic::Topic;

/// Default capacity of the envelope event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Default maximum payload size (1 MB)
pub const DEFAULT_MAX_MESSAGE_SIZE: u32 = 1024 * 1024;

/// How the loopback mail server answers historic requests
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MailServerReply {
    /// Emit a completion event carrying this cursor
    Complete(Cursor),
    /// Emit a completion event carrying this error
    Fail(String),
    /// Never answer
    Silent,
}

impl Default for MailServerReply {
    fn default() -> Self {
        MailServerReply::Complete(Cursor::default())
    }
}

/// Filter installed on the relay
#[derive(Clone, Debug)]
struct InstalledFilter {
    topic: Topic,
    key: KeyHandle,
}

#[derive(Default)]
struct RelayState {
    next_id: u64,
    key_pairs: HashMap<PublicKey, String>,
    sym_keys: HashMap<String, Vec<u8>>,
    sym_key_derivations: usize,
    installed: HashMap<String, InstalledFilter>,
    pending: HashMap<String, Vec<ReceivedMessage>>,
    archive: HashMap<Hash, ReceivedMessage>,
    published: Vec<OutboundMessage>,
    requests: Vec<(PeerId, HistoricRequest)>,
    failing_filters: HashSet<String>,
    fail_posts: bool,
    reply: MailServerReply,
    clock: Option<DateTime<Utc>>,
}

impl RelayState {
    fn next_handle(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn fan_out(&mut self, message: &ReceivedMessage) -> usize {
        let targets: Vec<String> = self
            .installed
            .iter()
            .filter(|(_, f)| f.topic == message.topic)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &targets {
            self.pending.entry(id.clone()).or_default().push(message.clone());
        }
        targets.len()
    }
}

/// In-process relay: publishing fans out to every installed filter on the
/// same topic, and a loopback mail server answers historic requests on the
/// envelope event stream.
pub struct MemoryRelay {
    state: RwLock<RelayState>,
    events: broadcast::Sender<EnvelopeEvent>,
    max_message_size: u32,
}

impl MemoryRelay {
    /// Create a relay with default limits
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Create a relay whose event channel holds `capacity` events
    pub fn with_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            state: RwLock::new(RelayState::default()),
            events,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Install a filter and return its relay id
    pub fn install_filter(&self, topic: Topic, key: KeyHandle) -> String {
        let mut state = self.state.write();
        let id = state.next_handle("filter");
        state.installed.insert(id.clone(), InstalledFilter { topic, key });
        debug!("Installed filter {} on topic {}", id, topic);
        id
    }

    /// Remove an installed filter along with its pending messages
    pub fn uninstall_filter(&self, filter_id: &str) -> bool {
        let mut state = self.state.write();
        state.pending.remove(filter_id);
        state.installed.remove(filter_id).is_some()
    }

    /// Whether a filter is installed
    pub fn is_installed(&self, filter_id: &str) -> bool {
        self.state.read().installed.contains_key(filter_id)
    }

    /// Key handle an installed filter decrypts with
    pub fn installed_key(&self, filter_id: &str) -> Option<KeyHandle> {
        self.state
            .read()
            .installed
            .get(filter_id)
            .map(|f| f.key.clone())
    }

    /// Register raw symmetric key bytes and return the handle
    pub fn add_sym_key(&self, key: Vec<u8>) -> String {
        let mut state = self.state.write();
        let id = state.next_handle("sym");
        state.sym_keys.insert(id.clone(), key);
        id
    }

    /// Deliver a message from another peer; returns how many filters got it
    pub fn deliver(&self, message: ReceivedMessage) -> usize {
        let mut state = self.state.write();
        state.archive.insert(message.hash, message.clone());
        state.fan_out(&message)
    }

    /// Queue an already seen envelope again, as a relay may do
    pub fn redeliver(&self, hash: &Hash) -> Result<usize> {
        let mut state = self.state.write();
        let message = state
            .archive
            .get(hash)
            .cloned()
            .ok_or_else(|| Error::Relay(format!("unknown envelope {}", hash)))?;
        Ok(state.fan_out(&message))
    }

    /// Emit an event on the envelope stream; returns the receiver count
    pub fn emit(&self, event: EnvelopeEvent) -> usize {
        self.events.send(event).unwrap_or(0)
    }

    /// Number of live envelope event subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    /// Make fetches on a filter fail
    pub fn fail_fetches(&self, filter_id: &str, fail: bool) {
        let mut state = self.state.write();
        if fail {
            state.failing_filters.insert(filter_id.to_string());
        } else {
            state.failing_filters.remove(filter_id);
        }
    }

    /// Make publishing fail
    pub fn fail_posts(&self, fail: bool) {
        self.state.write().fail_posts = fail;
    }

    /// Choose how the loopback mail server answers
    pub fn set_mail_server_reply(&self, reply: MailServerReply) {
        self.state.write().reply = reply;
    }

    /// Pin the relay clock
    pub fn set_time(&self, now: DateTime<Utc>) {
        self.state.write().clock = Some(now);
    }

    /// Every message published so far
    pub fn published(&self) -> Vec<OutboundMessage> {
        self.state.read().published.clone()
    }

    /// Every historic request received so far
    pub fn requests(&self) -> Vec<(PeerId, HistoricRequest)> {
        self.state.read().requests.clone()
    }

    /// How many symmetric keys were derived from passwords
    pub fn sym_key_derivations(&self) -> usize {
        self.state.read().sym_key_derivations
    }

    fn envelope_hash(message: &OutboundMessage, sequence: u64) -> Hash {
        let mut hasher = Keccak256::new();
        hasher.update(message.topic.as_bytes());
        hasher.update(&message.payload);
        hasher.update(sequence.to_be_bytes());
        Hash::new(hasher.finalize().into())
    }
}

impl Default for MemoryRelay {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Relay for MemoryRelay {
    async fn add_key_pair(&self, key: &IdentityKey) -> Result<String> {
        let mut state = self.state.write();
        let public_key = key.public_key();
        if let Some(id) = state.key_pairs.get(&public_key) {
            return Ok(id.clone());
        }
        let id = state.next_handle("keypair");
        state.key_pairs.insert(public_key, id.clone());
        Ok(id)
    }

    async fn add_sym_key_from_password(&self, password: &str) -> Result<String> {
        let key = Keccak256::digest(password.as_bytes()).to_vec();
        let mut state = self.state.write();
        state.sym_key_derivations += 1;
        let id = state.next_handle("sym");
        state.sym_keys.insert(id.clone(), key);
        Ok(id)
    }

    async fn get_sym_key(&self, id: &str) -> Result<Vec<u8>> {
        self.state
            .read()
            .sym_keys
            .get(id)
            .cloned()
            .ok_or_else(|| Error::KeyNotFound(id.to_string()))
    }

    async fn post(&self, message: OutboundMessage) -> Result<Hash> {
        if message.payload.len() > self.max_message_size as usize {
            return Err(Error::Relay(format!(
                "payload of {} bytes exceeds {}",
                message.payload.len(),
                self.max_message_size
            )));
        }

        let hash = {
            let mut state = self.state.write();
            if state.fail_posts {
                return Err(Error::Relay("publish rejected".to_string()));
            }

            state.next_id += 1;
            let hash = Self::envelope_hash(&message, state.next_id);
            let now = state.clock.unwrap_or_else(Utc::now);

            let received = ReceivedMessage {
                hash,
                topic: message.topic,
                payload: message.payload.clone(),
                sig: None,
                dst: message.public_key().copied(),
                timestamp: u32::try_from(now.timestamp().max(0)).unwrap_or(u32::MAX),
                ttl: message.ttl,
            };

            state.archive.insert(hash, received.clone());
            let delivered = state.fan_out(&received);
            state.published.push(message);
            debug!("Published envelope {} to {} filters", hash, delivered);
            hash
        };

        self.emit(EnvelopeEvent {
            hash,
            peer: None,
            kind: EnvelopeEventKind::EnvelopeSent,
        });

        Ok(hash)
    }

    async fn filter_messages(&self, filter_id: &str) -> Result<Vec<ReceivedMessage>> {
        let mut state = self.state.write();
        if state.failing_filters.contains(filter_id) {
            return Err(Error::Relay(format!("fetch failed for filter {}", filter_id)));
        }
        if !state.installed.contains_key(filter_id) {
            return Err(Error::FilterNotFound(filter_id.to_string()));
        }
        Ok(state.pending.remove(filter_id).unwrap_or_default())
    }

    async fn send_messages_request(&self, peer: &PeerId, request: HistoricRequest) -> Result<()> {
        let hash = request.id.to_hash();
        let reply = {
            let mut state = self.state.write();
            state.requests.push((peer.clone(), request));
            state.reply.clone()
        };

        self.emit(EnvelopeEvent {
            hash,
            peer: Some(peer.clone()),
            kind: EnvelopeEventKind::MailServerRequestSent,
        });

        let response = match reply {
            MailServerReply::Complete(cursor) => MailServerResponse {
                cursor,
                ..Default::default()
            },
            MailServerReply::Fail(error) => MailServerResponse {
                error: Some(error),
                ..Default::default()
            },
            MailServerReply::Silent => return Ok(()),
        };

        self.emit(EnvelopeEvent {
            hash,
            peer: Some(peer.clone()),
            kind: EnvelopeEventKind::MailServerRequestCompleted(response),
        });
        Ok(())
    }

    fn subscribe_envelope_events(&self) -> broadcast::Receiver<EnvelopeEvent> {
        self.events.subscribe()
    }

    fn current_time(&self) -> DateTime<Utc> {
        self.state.read().clock.unwrap_or_else(Utc::now)
    }

    fn max_message_size(&self) -> u32 {
        self.max_message_size
    }
}
