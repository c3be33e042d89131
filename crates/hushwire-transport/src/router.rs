//! Outbound routing
//!
//! Every send resolves the filter of its conversation kind, stamps the
//! message with the filter's topic and key material, signs it with the local
//! identity and publishes it. Nothing is retried here.

use std::sync::Arc;

use hushwire_core::{
    FilterSelector, Hash, NegotiatedSecret, OutboundMessage, PublicKey, Recipient, Relay,
};
use tracing::{debug, instrument};

use crate::error::{Result, TransportError};
use crate::keys::KeysManager;

/// `0x`-prefixed lowercase hex of a raw public key
pub fn pubkey_to_hex(key: &PublicKey) -> String {
    key.to_hex()
}

/// Routes outbound messages to the topic and key of their conversation
pub struct OutboundRouter {
    relay: Arc<dyn Relay>,
    selector: Arc<dyn FilterSelector>,
    keys: Arc<KeysManager>,
}

impl OutboundRouter {
    /// Create a new outbound router
    pub fn new(
        relay: Arc<dyn Relay>,
        selector: Arc<dyn FilterSelector>,
        keys: Arc<KeysManager>,
    ) -> Self {
        Self {
            relay,
            selector,
            keys,
        }
    }

    /// Publish on a public chat, encrypted with the chat's symmetric key
    #[instrument(skip(self, message))]
    pub async fn send_public(&self, mut message: OutboundMessage, chat_name: &str) -> Result<Hash> {
        self.sign(&mut message).await?;

        let filter = self
            .selector
            .resolve_public(chat_name)
            .await
            .map_err(TransportError::resolution)?;

        message.topic = filter.topic;
        message.recipient = filter.sym_key_id().map(|id| Recipient::SymKey(id.to_string()));
        self.publish(message).await
    }

    /// Publish on the topic derived from a secret negotiated with `public_key`
    #[instrument(skip(self, message, secret))]
    pub async fn send_private_with_shared_secret(
        &self,
        mut message: OutboundMessage,
        public_key: &PublicKey,
        secret: &[u8],
    ) -> Result<Hash> {
        self.sign(&mut message).await?;

        let filter = self
            .selector
            .resolve_negotiated(NegotiatedSecret {
                public_key: *public_key,
                key: secret.to_vec(),
            })
            .await
            .map_err(TransportError::resolution)?;

        message.topic = filter.topic;
        // Never carries the raw public key, only the negotiated key handle
        message.recipient = filter.sym_key_id().map(|id| Recipient::SymKey(id.to_string()));
        self.publish(message).await
    }

    /// Publish on the partitioned discovery topic of `public_key`
    #[instrument(skip(self, message))]
    pub async fn send_private_with_partitioned(
        &self,
        mut message: OutboundMessage,
        public_key: &PublicKey,
    ) -> Result<Hash> {
        self.sign(&mut message).await?;

        let filter = self
            .selector
            .resolve_partitioned(public_key, self.keys.identity(), false)
            .await
            .map_err(TransportError::resolution)?;

        message.topic = filter.topic;
        message.recipient = Some(Recipient::PublicKey(*public_key));
        self.publish(message).await
    }

    /// Publish on the personal discovery topic of `public_key`
    #[instrument(skip(self, message))]
    pub async fn send_private_on_personal_topic(
        &self,
        mut message: OutboundMessage,
        public_key: &PublicKey,
    ) -> Result<Hash> {
        self.sign(&mut message).await?;

        let filter = self
            .selector
            .resolve_personal(public_key, self.keys.identity(), false)
            .await
            .map_err(TransportError::resolution)?;

        message.topic = filter.topic;
        message.recipient = Some(Recipient::PublicKey(*public_key));
        self.publish(message).await
    }

    /// Publish on the channel of a community identified by its public key
    #[instrument(skip(self, message))]
    pub async fn send_community_message(
        &self,
        mut message: OutboundMessage,
        public_key: &PublicKey,
    ) -> Result<Hash> {
        self.sign(&mut message).await?;

        // Communities are addressed by their key hex without the prefix
        let hex = pubkey_to_hex(public_key);
        let filter = self
            .selector
            .resolve_public(&hex[2..])
            .await
            .map_err(TransportError::resolution)?;

        message.topic = filter.topic;
        message.recipient = Some(Recipient::PublicKey(*public_key));
        self.publish(message).await
    }

    async fn sign(&self, message: &mut OutboundMessage) -> Result<()> {
        message.sig_id = Some(self.keys.add_or_get_key_pair().await?);
        Ok(())
    }

    async fn publish(&self, message: OutboundMessage) -> Result<Hash> {
        let topic = message.topic;
        let hash = self.relay.post(message).await.map_err(TransportError::Relay)?;
        debug!("Sent envelope {} on topic {}", hash, topic);
        Ok(hash)
    }
}
