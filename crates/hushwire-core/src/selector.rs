//! Filter and key selection interface
//!
//! The selector derives and persists per-conversation topics and key
//! material. Loading a filter may create and persist it as a side effect.

use async_trait::async_trait;

use crate::error::Result;
use crate::filter::{Filter, NegotiatedSecret};
use crate::keys::{IdentityKey, PublicKey};

/// Filter lifecycle manager
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait FilterSelector: Send + Sync {
    /// Filter of a public chat
    async fn resolve_public(&self, chat_id: &str) -> Result<Filter>;

    /// Filter derived from a negotiated shared secret
    async fn resolve_negotiated(&self, secret: NegotiatedSecret) -> Result<Filter>;

    /// Partitioned discovery filter of a peer
    async fn resolve_partitioned(
        &self,
        their_key: &PublicKey,
        our_key: &IdentityKey,
        listen: bool,
    ) -> Result<Filter>;

    /// Personal discovery filter of a peer
    async fn resolve_personal(
        &self,
        their_key: &PublicKey,
        our_key: &IdentityKey,
        listen: bool,
    ) -> Result<Filter>;

    /// Filter for an ephemeral key
    async fn resolve_ephemeral(
        &self,
        their_key: &PublicKey,
        our_key: &IdentityKey,
        listen: bool,
    ) -> Result<Filter>;

    /// Contact-code filter of a peer
    async fn resolve_contact_code(&self, their_key: &PublicKey) -> Result<Filter>;

    /// Load public chats and one-to-one discovery filters in one go
    async fn init(&self, chat_ids: &[String], public_keys: &[PublicKey]) -> Result<Vec<Filter>>;

    /// Load public chat filters
    async fn init_public_filters(&self, chat_ids: &[String]) -> Result<Vec<Filter>>;

    /// Restore previously persisted filters, along with the local discovery
    /// filters
    async fn init_with_filters(&self, filters: &[Filter]) -> Result<Vec<Filter>>;

    /// Listen on community channels, one per community key
    async fn init_community_filters(&self, keys: &[IdentityKey]) -> Result<Vec<Filter>>;

    /// Every known filter
    fn filters(&self) -> Vec<Filter>;

    /// Filter of a conversation
    fn filter_by_chat_id(&self, chat_id: &str) -> Option<Filter>;

    /// Filters bound to a peer identity
    fn filters_by_public_key(&self, key: &PublicKey) -> Vec<Filter>;

    /// Remove filters and their relay subscriptions
    async fn remove_filters(&self, filters: &[Filter]) -> Result<()>;

    /// Remove the filter of a conversation, returning it if it existed
    async fn remove_filter_by_chat_id(&self, chat_id: &str) -> Result<Option<Filter>>;

    /// Remove every filter that is held only to publish
    async fn remove_non_listen_filters(&self) -> Result<()>;

    /// Remove every filter
    async fn reset(&self) -> Result<()>;
}
