//! Transport facade
//!
//! Ties the router, historic requester, inbound collector and filter
//! janitor to one set of collaborators.

use std::collections::HashMap;
use std::sync::Arc;

use hushwire_core::{
    Cursor, EnvelopeEventsHandler, EnvelopeMonitor, Filter, FilterSelector, Hash, IdentityKey,
    NegotiatedSecret, OutboundMessage, PeerId, ProcessedCache, PublicKey, ReceivedMessage, Relay,
    Topic,
};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::collector::InboundCollector;
use crate::config::TransportConfig;
use crate::error::{Result, TransportError};
use crate::history::{HistoricRequester, HistoryQuery};
use crate::janitor::FilterJanitor;
use crate::keys::KeysManager;
use crate::router::OutboundRouter;

/// Messaging transport over a relay network
pub struct Transport {
    config: TransportConfig,
    relay: Arc<dyn Relay>,
    selector: Arc<dyn FilterSelector>,
    keys: Arc<KeysManager>,
    router: OutboundRouter,
    history: HistoricRequester,
    collector: InboundCollector,
    monitor: Option<Arc<dyn EnvelopeMonitor>>,
    janitor: Mutex<Option<FilterJanitor>>,
}

impl Transport {
    /// Start the filter janitor and the envelope monitor.
    /// Starting a running transport does nothing.
    ///
    /// Must be called from within a Tokio runtime. The janitor is cancelled
    /// when the transport is dropped.
    #[instrument(skip(self))]
    pub fn start(&self) {
        let mut janitor = self.janitor.lock();
        if janitor.is_some() {
            return;
        }

        *janitor = Some(FilterJanitor::spawn(
            self.selector.clone(),
            self.config.filter_cleanup_interval(),
            CancellationToken::new(),
        ));
        if let Some(monitor) = &self.monitor {
            monitor.start();
        }
        info!("Transport started");
    }

    /// Stop the filter janitor and the envelope monitor
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        let janitor = self.janitor.lock().take();
        if let Some(janitor) = janitor {
            janitor.stop().await;
        }
        if let Some(monitor) = &self.monitor {
            monitor.stop();
        }
        info!("Transport stopped");
    }

    /// Whether the filter janitor is running
    pub fn is_running(&self) -> bool {
        self.janitor
            .lock()
            .as_ref()
            .is_some_and(|janitor| !janitor.is_finished())
    }

    /// Configuration in use
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Configured mail servers
    pub fn mailservers(&self) -> &[PeerId] {
        &self.config.mailservers
    }

    /// Keys registered on behalf of the local identity
    pub fn keys(&self) -> &KeysManager {
        &self.keys
    }

    // Outbound

    /// Publish on a public chat
    pub async fn send_public(&self, message: OutboundMessage, chat_name: &str) -> Result<Hash> {
        self.router.send_public(message, chat_name).await
    }

    /// Publish on the topic of a secret negotiated with `public_key`
    pub async fn send_private_with_shared_secret(
        &self,
        message: OutboundMessage,
        public_key: &PublicKey,
        secret: &[u8],
    ) -> Result<Hash> {
        self.router
            .send_private_with_shared_secret(message, public_key, secret)
            .await
    }

    /// Publish on the partitioned discovery topic of `public_key`
    pub async fn send_private_with_partitioned(
        &self,
        message: OutboundMessage,
        public_key: &PublicKey,
    ) -> Result<Hash> {
        self.router
            .send_private_with_partitioned(message, public_key)
            .await
    }

    /// Publish on the personal discovery topic of `public_key`
    pub async fn send_private_on_personal_topic(
        &self,
        message: OutboundMessage,
        public_key: &PublicKey,
    ) -> Result<Hash> {
        self.router
            .send_private_on_personal_topic(message, public_key)
            .await
    }

    /// Publish on a community channel
    pub async fn send_community_message(
        &self,
        message: OutboundMessage,
        public_key: &PublicKey,
    ) -> Result<Hash> {
        self.router.send_community_message(message, public_key).await
    }

    /// Track delivery of a published envelope, if a monitor is installed
    pub fn track(&self, identifiers: Vec<Vec<u8>>, hash: Hash, message: OutboundMessage) {
        if let Some(monitor) = &self.monitor {
            monitor.add(identifiers, hash, message);
        }
    }

    /// Install the handler notified of delivery outcomes
    pub fn set_envelope_events_handler(&self, handler: Arc<dyn EnvelopeEventsHandler>) -> Result<()> {
        let monitor = self
            .monitor
            .as_ref()
            .ok_or(TransportError::NoEnvelopesMonitor)?;
        monitor.set_handler(handler);
        Ok(())
    }

    // Inbound

    /// Unseen messages per listening filter
    pub async fn collect_unseen(&self) -> Result<HashMap<Filter, Vec<ReceivedMessage>>> {
        self.collector.collect_unseen().await
    }

    /// Mark messages as processed so they are not collected again
    pub async fn confirm_messages_processed(&self, ids: &[String], timestamp: u64) -> Result<()> {
        self.collector.confirm_processed(ids, timestamp).await
    }

    /// Forget processed messages older than `timestamp`
    pub async fn clean_messages_processed(&self, timestamp: u64) -> Result<()> {
        self.collector.clean_processed(timestamp).await
    }

    // History

    /// Request envelopes on `topics`
    pub async fn request_history(
        &self,
        query: HistoryQuery,
        topics: &[Topic],
        cancel: &CancellationToken,
    ) -> Result<Cursor> {
        self.history.request(query, topics, cancel).await
    }

    /// Request envelopes on the topics of every known filter
    pub async fn request_history_for_all(
        &self,
        query: HistoryQuery,
        cancel: &CancellationToken,
    ) -> Result<Cursor> {
        let topics: Vec<Topic> = self.selector.filters().iter().map(|f| f.topic).collect();
        self.history.request(query, &topics, cancel).await
    }

    /// Request envelopes on the topic of one filter
    pub async fn request_history_for_filter(
        &self,
        query: HistoryQuery,
        filter: &Filter,
        cancel: &CancellationToken,
    ) -> Result<Cursor> {
        self.history.request(query, &[filter.topic], cancel).await
    }

    /// Request envelopes on every known topic from the first configured
    /// mail server
    pub async fn request_history_from_default(
        &self,
        from: u32,
        to: u32,
        cursor: Cursor,
        wait_for_response: bool,
        cancel: &CancellationToken,
    ) -> Result<Cursor> {
        let peer = self
            .config
            .mailservers
            .first()
            .cloned()
            .ok_or(TransportError::NoMailservers)?;

        let mut query = HistoryQuery::new(peer)
            .with_range(from, to)
            .with_cursor(cursor);
        query.wait_for_response = wait_for_response;
        self.request_history_for_all(query, cancel).await
    }

    // Relay

    /// Relay clock in Unix milliseconds
    pub fn current_time_millis(&self) -> u64 {
        u64::try_from(self.relay.current_time().timestamp_millis()).unwrap_or(0)
    }

    /// Largest payload the relay accepts
    pub fn max_message_size(&self) -> u32 {
        self.relay.max_message_size()
    }

    // Filters

    /// Load public chats and one-to-one discovery filters
    pub async fn init_filters(
        &self,
        chat_ids: &[String],
        public_keys: &[PublicKey],
    ) -> Result<Vec<Filter>> {
        self.selector
            .init(chat_ids, public_keys)
            .await
            .map_err(TransportError::resolution)
    }

    /// Load public chat filters
    pub async fn init_public_filters(&self, chat_ids: &[String]) -> Result<Vec<Filter>> {
        self.selector
            .init_public_filters(chat_ids)
            .await
            .map_err(TransportError::resolution)
    }

    /// Restore previously persisted filters
    pub async fn load_filters(&self, filters: &[Filter]) -> Result<Vec<Filter>> {
        self.selector
            .init_with_filters(filters)
            .await
            .map_err(TransportError::resolution)
    }

    /// Listen on the channels of communities whose keys we hold
    pub async fn init_community_filters(&self, keys: &[IdentityKey]) -> Result<Vec<Filter>> {
        self.selector
            .init_community_filters(keys)
            .await
            .map_err(TransportError::resolution)
    }

    /// Every known filter
    pub fn filters(&self) -> Vec<Filter> {
        self.selector.filters()
    }

    /// Filter of a conversation
    pub fn filter_by_chat_id(&self, chat_id: &str) -> Option<Filter> {
        self.selector.filter_by_chat_id(chat_id)
    }

    /// Remove filters
    pub async fn remove_filters(&self, filters: &[Filter]) -> Result<()> {
        self.selector
            .remove_filters(filters)
            .await
            .map_err(TransportError::resolution)
    }

    /// Remove the filter of a conversation
    pub async fn remove_filter_by_chat_id(&self, chat_id: &str) -> Result<Option<Filter>> {
        self.selector
            .remove_filter_by_chat_id(chat_id)
            .await
            .map_err(TransportError::resolution)
    }

    /// Remove every filter
    pub async fn reset_filters(&self) -> Result<()> {
        self.selector.reset().await.map_err(TransportError::resolution)
    }

    /// Listen on a public chat
    pub async fn join_public(&self, chat_id: &str) -> Result<Filter> {
        self.selector
            .resolve_public(chat_id)
            .await
            .map_err(TransportError::resolution)
    }

    /// Stop listening on a public chat
    pub async fn leave_public(&self, chat_id: &str) -> Result<()> {
        if self.remove_filter_by_chat_id(chat_id).await?.is_none() {
            debug!("Not listening on {}", chat_id);
        }
        Ok(())
    }

    /// Listen on the contact code of a peer
    pub async fn join_private(&self, public_key: &PublicKey) -> Result<Filter> {
        self.selector
            .resolve_contact_code(public_key)
            .await
            .map_err(TransportError::resolution)
    }

    /// Drop every filter bound to a peer
    pub async fn leave_private(&self, public_key: &PublicKey) -> Result<()> {
        let filters = self.selector.filters_by_public_key(public_key);
        self.remove_filters(&filters).await
    }

    /// Listen on the contact codes of every group member
    pub async fn join_group(&self, public_keys: &[PublicKey]) -> Result<Vec<Filter>> {
        let mut filters = Vec::with_capacity(public_keys.len());
        for key in public_keys {
            filters.push(self.join_private(key).await?);
        }
        Ok(filters)
    }

    /// Drop every filter bound to any group member
    pub async fn leave_group(&self, public_keys: &[PublicKey]) -> Result<()> {
        for key in public_keys {
            self.leave_private(key).await?;
        }
        Ok(())
    }

    /// Listen on the topic of a negotiated secret
    pub async fn process_negotiated_secret(&self, secret: NegotiatedSecret) -> Result<Filter> {
        self.selector
            .resolve_negotiated(secret)
            .await
            .map_err(TransportError::resolution)
    }

    /// Listen with an ephemeral key
    pub async fn load_key_filters(&self, key: &IdentityKey) -> Result<Filter> {
        self.selector
            .resolve_ephemeral(&key.public_key(), key, true)
            .await
            .map_err(TransportError::resolution)
    }
}

/// Builder for Transport
pub struct TransportBuilder {
    relay: Arc<dyn Relay>,
    selector: Arc<dyn FilterSelector>,
    cache: Arc<dyn ProcessedCache>,
    identity: IdentityKey,
    monitor: Option<Arc<dyn EnvelopeMonitor>>,
    config: TransportConfig,
}

impl TransportBuilder {
    /// Create new builder from the required collaborators
    pub fn new(
        relay: Arc<dyn Relay>,
        selector: Arc<dyn FilterSelector>,
        cache: Arc<dyn ProcessedCache>,
        identity: IdentityKey,
    ) -> Self {
        Self {
            relay,
            selector,
            cache,
            identity,
            monitor: None,
            config: TransportConfig::default(),
        }
    }

    /// Set configuration
    pub fn config(mut self, config: TransportConfig) -> Self {
        self.config = config;
        self
    }

    /// Add mail server
    pub fn add_mailserver(mut self, peer: PeerId) -> Self {
        self.config.mailservers.push(peer);
        self
    }

    /// Set envelope monitor
    pub fn monitor(mut self, monitor: Arc<dyn EnvelopeMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Build the transport
    pub fn build(self) -> Result<Transport> {
        self.config
            .validate()
            .map_err(TransportError::Configuration)?;

        let keys = Arc::new(KeysManager::new(self.relay.clone(), self.identity));
        Ok(Transport {
            router: OutboundRouter::new(self.relay.clone(), self.selector.clone(), keys.clone()),
            history: HistoricRequester::new(self.relay.clone(), &self.config),
            collector: InboundCollector::new(
                self.relay.clone(),
                self.selector.clone(),
                self.cache,
            ),
            keys,
            relay: self.relay,
            selector: self.selector,
            monitor: self.monitor,
            janitor: Mutex::new(None),
            config: self.config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use hushwire_core::memory::{MemoryFilterRegistry, MemoryRelay};
    use hushwire_core::monitor::MockEnvelopeMonitor;
    use hushwire_core::MemoryProcessedCache;

    struct Network {
        relay: Arc<MemoryRelay>,
        registry: Arc<MemoryFilterRegistry>,
    }

    fn network() -> Network {
        let relay = Arc::new(MemoryRelay::new());
        let registry = Arc::new(MemoryFilterRegistry::new(
            relay.clone(),
            IdentityKey::generate(),
        ));
        Network { relay, registry }
    }

    fn builder(net: &Network) -> TransportBuilder {
        TransportBuilder::new(
            net.relay.clone(),
            net.registry.clone(),
            Arc::new(MemoryProcessedCache::new()),
            IdentityKey::generate(),
        )
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let net = network();
        let config = TransportConfig {
            history_page_limit: 0,
            ..Default::default()
        };
        let err = builder(&net).config(config).build().err().unwrap();
        assert!(matches!(err, TransportError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_start_stop() {
        let net = network();
        let transport = builder(&net).build().unwrap();

        assert!(!transport.is_running());
        transport.start();
        transport.start();
        assert!(transport.is_running());

        transport.stop().await;
        assert!(!transport.is_running());
    }

    #[tokio::test]
    async fn test_monitor_lifecycle() {
        let net = network();
        let mut monitor = MockEnvelopeMonitor::new();
        monitor.expect_start().times(1).return_const(());
        monitor.expect_stop().times(1).return_const(());
        monitor
            .expect_add()
            .withf(|ids, hash, _| ids.len() == 1 && *hash == Hash::new([1; 32]))
            .times(1)
            .return_const(());

        let transport = builder(&net).monitor(Arc::new(monitor)).build().unwrap();
        transport.start();
        transport.track(
            vec![b"id".to_vec()],
            Hash::new([1; 32]),
            OutboundMessage::new(b"hi".to_vec()),
        );
        transport.stop().await;
    }

    #[tokio::test]
    async fn test_handler_requires_monitor() {
        struct Ignore;
        impl EnvelopeEventsHandler for Ignore {
            fn envelope_sent(&self, _: &[Vec<u8>]) {}
            fn envelope_expired(&self, _: &[Vec<u8>], _: &str) {}
            fn mail_server_request_completed(&self, _: &Hash, _: &Hash, _: &Cursor, _: Option<&str>) {}
            fn mail_server_request_expired(&self, _: &Hash) {}
        }

        let net = network();
        let transport = builder(&net).build().unwrap();
        let err = transport
            .set_envelope_events_handler(Arc::new(Ignore))
            .unwrap_err();
        assert!(matches!(err, TransportError::NoEnvelopesMonitor));
        assert_eq!(err.to_string(), "Current transport has no envelopes monitor");

        let mut monitor = MockEnvelopeMonitor::new();
        monitor.expect_set_handler().times(1).return_const(());
        let transport = builder(&net).monitor(Arc::new(monitor)).build().unwrap();
        transport
            .set_envelope_events_handler(Arc::new(Ignore))
            .unwrap();
    }

    #[tokio::test]
    async fn test_default_mailserver_required() {
        let net = network();
        let transport = builder(&net).build().unwrap();

        let err = transport
            .request_history_from_default(0, 0, Cursor::default(), false, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::NoMailservers));
        assert!(net.relay.requests().is_empty());
    }

    #[tokio::test]
    async fn test_history_for_all_uses_known_topics_only() {
        let net = network();
        let transport = builder(&net)
            .add_mailserver(PeerId::new(vec![1, 2, 3]))
            .build()
            .unwrap();

        let a = transport.join_public("a").await.unwrap();
        let b = transport.join_public("b").await.unwrap();

        transport
            .request_history_from_default(0, 0, Cursor::default(), false, &CancellationToken::new())
            .await
            .unwrap();

        let requests = net.relay.requests();
        assert_eq!(requests[0].0, PeerId::new(vec![1, 2, 3]));
        assert_eq!(
            requests[0].1.bloom,
            hushwire_core::BloomFilter::from_topics([&a.topic, &b.topic])
        );
    }

    #[tokio::test]
    async fn test_leave_public_removes_filter() {
        let net = network();
        let transport = builder(&net).build().unwrap();

        let filter = transport.join_public("status").await.unwrap();
        assert!(net.relay.is_installed(&filter.filter_id));

        transport.leave_public("status").await.unwrap();
        assert!(transport.filter_by_chat_id("status").is_none());
        assert!(!net.relay.is_installed(&filter.filter_id));

        // Leaving twice is fine
        transport.leave_public("status").await.unwrap();
    }

    #[tokio::test]
    async fn test_join_and_leave_group() {
        let net = network();
        let transport = builder(&net).build().unwrap();
        let members: Vec<PublicKey> = (0..3).map(|_| IdentityKey::generate().public_key()).collect();

        let filters = transport.join_group(&members).await.unwrap();
        assert_eq!(filters.len(), 3);
        assert!(filters.iter().all(|f| f.listen));

        transport.leave_group(&members[..2]).await.unwrap();
        assert_eq!(transport.filters().len(), 1);
        assert_eq!(transport.filters()[0].identity, Some(members[2]));
    }

    #[tokio::test]
    async fn test_load_key_filters_listens() {
        let net = network();
        let transport = builder(&net).build().unwrap();
        let ephemeral = IdentityKey::generate();

        let filter = transport.load_key_filters(&ephemeral).await.unwrap();
        assert!(filter.listen);
        assert_eq!(filter.identity, Some(ephemeral.public_key()));
    }

    #[tokio::test]
    async fn test_relay_passthroughs() {
        let net = network();
        net.relay.set_time(Utc.timestamp_opt(1_700_000_000, 500_000_000).unwrap());
        let transport = builder(&net).build().unwrap();

        assert_eq!(transport.current_time_millis(), 1_700_000_000_500);
        assert_eq!(transport.max_message_size(), 1024 * 1024);
    }
}
