//! In-memory filter registry

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use sha3::{Digest, Keccak256};
use tracing::{debug, info};

use crate::error::Result;
use crate::filter::{Filter, KeyHandle, NegotiatedSecret};
use crate::keys::{IdentityKey, PublicKey};
use crate::memory::relay::MemoryRelay;
use crate::relay::Relay;
use crate::selector::FilterSelector;
use crate::topic::Topic;

/// Number of partitioned discovery topics
pub const DISCOVERY_PARTITIONS: u64 = 5000;

/// Prefix of discovery chat ids
pub const DISCOVERY_PREFIX: &str = "contact-discovery";

/// Filter registry that derives topics deterministically and installs
/// filters on a [`MemoryRelay`]
pub struct MemoryFilterRegistry {
    relay: Arc<MemoryRelay>,
    identity: IdentityKey,
    filters: RwLock<HashMap<String, Filter>>,
}

/// Kind-specific parameters of a new filter
struct FilterParams {
    chat_id: String,
    topic: Topic,
    identity: Option<PublicKey>,
    one_to_one: bool,
    discovery: bool,
    negotiated: bool,
    listen: bool,
}

impl FilterParams {
    fn new(chat_id: String) -> Self {
        Self {
            topic: Topic::from_chat_id(&chat_id),
            chat_id,
            identity: None,
            one_to_one: false,
            discovery: false,
            negotiated: false,
            listen: true,
        }
    }
}

impl MemoryFilterRegistry {
    /// Create a registry for the local `identity`
    pub fn new(relay: Arc<MemoryRelay>, identity: IdentityKey) -> Self {
        Self {
            relay,
            identity,
            filters: RwLock::new(HashMap::new()),
        }
    }

    /// Chat id of the partitioned discovery topic of a key
    pub fn partitioned_chat_id(key: &PublicKey) -> String {
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&key.as_bytes()[..8]);
        let partition = u64::from_be_bytes(prefix) % DISCOVERY_PARTITIONS;
        format!("{}-{}", DISCOVERY_PREFIX, partition)
    }

    /// Chat id of the personal discovery topic of a key
    pub fn personal_chat_id(key: &PublicKey) -> String {
        format!("{}-{}", DISCOVERY_PREFIX, key.to_hex())
    }

    /// Chat id of the contact-code topic of a key
    pub fn contact_code_chat_id(key: &PublicKey) -> String {
        format!("{}-contact-code", key.to_hex())
    }

    /// Chat id of a community channel: its key hex without the `0x` prefix
    pub fn community_chat_id(key: &PublicKey) -> String {
        hex::encode(key.as_bytes())
    }

    fn existing(&self, chat_id: &str, listen: bool) -> Option<Filter> {
        let mut filters = self.filters.write();
        let filter = filters.get_mut(chat_id)?;
        // A listening load upgrades a publish-only filter
        if listen && !filter.listen {
            filter.listen = true;
        }
        Some(filter.clone())
    }

    fn install(&self, params: FilterParams, key: KeyHandle) -> Filter {
        let filter_id = self.relay.install_filter(params.topic, key.clone());
        let filter = Filter {
            chat_id: params.chat_id,
            filter_id,
            key,
            topic: params.topic,
            identity: params.identity,
            one_to_one: params.one_to_one,
            discovery: params.discovery,
            negotiated: params.negotiated,
            listen: params.listen,
        };

        debug!(
            "Registered filter {} for {} (listen: {})",
            filter.filter_id, filter.chat_id, filter.listen
        );
        self.filters
            .write()
            .entry(filter.chat_id.clone())
            .or_insert(filter)
            .clone()
    }

    async fn load_symmetric(&self, params: FilterParams) -> Result<Filter> {
        if let Some(filter) = self.existing(&params.chat_id, params.listen) {
            return Ok(filter);
        }
        let sym_key = self.relay.add_sym_key_from_password(&params.chat_id).await?;
        Ok(self.install(params, KeyHandle::Symmetric(sym_key)))
    }

    async fn load_asymmetric(&self, params: FilterParams, our_key: &IdentityKey) -> Result<Filter> {
        if let Some(filter) = self.existing(&params.chat_id, params.listen) {
            return Ok(filter);
        }
        let key_pair = self.relay.add_key_pair(our_key).await?;
        Ok(self.install(params, KeyHandle::Asymmetric(key_pair)))
    }

    async fn load_discovery(
        &self,
        chat_id: String,
        their_key: &PublicKey,
        our_key: &IdentityKey,
        listen: bool,
    ) -> Result<Filter> {
        let params = FilterParams {
            identity: Some(*their_key),
            one_to_one: true,
            discovery: true,
            listen,
            ..FilterParams::new(chat_id)
        };
        self.load_asymmetric(params, our_key).await
    }

    fn drop_filters(&self, doomed: &[Filter]) {
        let mut filters = self.filters.write();
        for filter in doomed {
            self.relay.uninstall_filter(&filter.filter_id);
            filters.remove(&filter.chat_id);
        }
    }
}

#[async_trait]
impl FilterSelector for MemoryFilterRegistry {
    async fn resolve_public(&self, chat_id: &str) -> Result<Filter> {
        self.load_symmetric(FilterParams::new(chat_id.to_string())).await
    }

    async fn resolve_negotiated(&self, secret: NegotiatedSecret) -> Result<Filter> {
        let chat_id = format!("{}-negotiated", secret.public_key.to_hex());
        if let Some(filter) = self.existing(&chat_id, true) {
            return Ok(filter);
        }

        let topic_seed = hex::encode(Keccak256::digest(&secret.key));
        let params = FilterParams {
            topic: Topic::from_chat_id(&topic_seed),
            identity: Some(secret.public_key),
            one_to_one: true,
            negotiated: true,
            ..FilterParams::new(chat_id)
        };
        let sym_key = self.relay.add_sym_key(secret.key);
        Ok(self.install(params, KeyHandle::Symmetric(sym_key)))
    }

    async fn resolve_partitioned(
        &self,
        their_key: &PublicKey,
        our_key: &IdentityKey,
        listen: bool,
    ) -> Result<Filter> {
        let chat_id = Self::partitioned_chat_id(their_key);
        self.load_discovery(chat_id, their_key, our_key, listen).await
    }

    async fn resolve_personal(
        &self,
        their_key: &PublicKey,
        our_key: &IdentityKey,
        listen: bool,
    ) -> Result<Filter> {
        let chat_id = Self::personal_chat_id(their_key);
        self.load_discovery(chat_id, their_key, our_key, listen).await
    }

    async fn resolve_ephemeral(
        &self,
        their_key: &PublicKey,
        our_key: &IdentityKey,
        listen: bool,
    ) -> Result<Filter> {
        let params = FilterParams {
            identity: Some(*their_key),
            listen,
            ..FilterParams::new(their_key.to_hex())
        };
        self.load_asymmetric(params, our_key).await
    }

    async fn resolve_contact_code(&self, their_key: &PublicKey) -> Result<Filter> {
        let params = FilterParams {
            identity: Some(*their_key),
            ..FilterParams::new(Self::contact_code_chat_id(their_key))
        };
        self.load_symmetric(params).await
    }

    async fn init(&self, chat_ids: &[String], public_keys: &[PublicKey]) -> Result<Vec<Filter>> {
        let mut loaded = self.init_public_filters(chat_ids).await?;

        let own = self.identity.public_key();
        loaded.push(self.resolve_partitioned(&own, &self.identity, true).await?);
        loaded.push(self.resolve_personal(&own, &self.identity, true).await?);

        for key in public_keys {
            loaded.push(self.resolve_contact_code(key).await?);
        }

        info!("Initialized {} filters", loaded.len());
        Ok(loaded)
    }

    async fn init_public_filters(&self, chat_ids: &[String]) -> Result<Vec<Filter>> {
        let mut loaded = Vec::with_capacity(chat_ids.len());
        for chat_id in chat_ids {
            loaded.push(self.resolve_public(chat_id).await?);
        }
        Ok(loaded)
    }

    async fn init_with_filters(&self, filters: &[Filter]) -> Result<Vec<Filter>> {
        let mut chat_ids = Vec::new();
        let mut public_keys = Vec::new();
        let mut skipped = 0;

        for filter in filters {
            match filter.identity {
                None => chat_ids.push(filter.chat_id.clone()),
                Some(key) if filter.chat_id == Self::contact_code_chat_id(&key) => {
                    public_keys.push(key)
                }
                // Negotiated, ephemeral and community filters need key
                // material that is not persisted with the filter
                Some(_) => skipped += 1,
            }
        }

        if skipped > 0 {
            debug!("Skipped {} filters that need their keys to restore", skipped);
        }
        self.init(&chat_ids, &public_keys).await
    }

    async fn init_community_filters(&self, keys: &[IdentityKey]) -> Result<Vec<Filter>> {
        let mut loaded = Vec::with_capacity(keys.len());
        for key in keys {
            let public_key = key.public_key();
            let params = FilterParams {
                identity: Some(public_key),
                ..FilterParams::new(Self::community_chat_id(&public_key))
            };
            loaded.push(self.load_asymmetric(params, key).await?);
        }
        info!("Initialized {} community filters", loaded.len());
        Ok(loaded)
    }

    fn filters(&self) -> Vec<Filter> {
        self.filters.read().values().cloned().collect()
    }

    fn filter_by_chat_id(&self, chat_id: &str) -> Option<Filter> {
        self.filters.read().get(chat_id).cloned()
    }

    fn filters_by_public_key(&self, key: &PublicKey) -> Vec<Filter> {
        self.filters
            .read()
            .values()
            .filter(|f| f.identity.as_ref() == Some(key))
            .cloned()
            .collect()
    }

    async fn remove_filters(&self, filters: &[Filter]) -> Result<()> {
        self.drop_filters(filters);
        Ok(())
    }

    async fn remove_filter_by_chat_id(&self, chat_id: &str) -> Result<Option<Filter>> {
        let filter = self.filter_by_chat_id(chat_id);
        if let Some(filter) = &filter {
            self.drop_filters(std::slice::from_ref(filter));
        }
        Ok(filter)
    }

    async fn remove_non_listen_filters(&self) -> Result<()> {
        let doomed: Vec<Filter> = self
            .filters
            .read()
            .values()
            .filter(|f| !f.listen)
            .cloned()
            .collect();

        if !doomed.is_empty() {
            debug!("Removing {} publish-only filters", doomed.len());
        }
        self.drop_filters(&doomed);
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        let all = self.filters();
        self.drop_filters(&all);
        Ok(())
    }
}
