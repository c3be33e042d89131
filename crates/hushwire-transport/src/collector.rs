//! Inbound collection and processed-message bookkeeping

use std::collections::HashMap;
use std::sync::Arc;

use hushwire_core::{Filter, FilterSelector, ProcessedCache, ReceivedMessage, Relay};
use tracing::{debug, error, instrument, warn};

use crate::error::{Result, TransportError};

/// Pulls pending messages from every listening filter and drops the ones
/// already confirmed as processed
pub struct InboundCollector {
    relay: Arc<dyn Relay>,
    selector: Arc<dyn FilterSelector>,
    cache: Arc<dyn ProcessedCache>,
}

impl InboundCollector {
    /// Create a new inbound collector
    pub fn new(
        relay: Arc<dyn Relay>,
        selector: Arc<dyn FilterSelector>,
        cache: Arc<dyn ProcessedCache>,
    ) -> Self {
        Self {
            relay,
            selector,
            cache,
        }
    }

    /// Unseen messages per filter, each in relay fetch order.
    ///
    /// A filter whose fetch fails is skipped. A cache failure fails the
    /// whole call.
    #[instrument(skip(self))]
    pub async fn collect_unseen(&self) -> Result<HashMap<Filter, Vec<ReceivedMessage>>> {
        let mut result = HashMap::new();

        for filter in self.selector.filters().into_iter().filter(|f| f.listen) {
            let messages = match self.relay.filter_messages(&filter.filter_id).await {
                Ok(messages) => messages,
                Err(e) => {
                    warn!("Failed to fetch messages for filter {}: {}", filter.chat_id, e);
                    continue;
                }
            };
            if messages.is_empty() {
                continue;
            }

            let ids: Vec<String> = messages.iter().map(ReceivedMessage::id).collect();
            let hits = self.cache.hits(&ids).await.map_err(|e| {
                error!("Failed to query processed messages: {}", e);
                TransportError::Store(e)
            })?;

            let fetched = messages.len();
            let unseen: Vec<ReceivedMessage> = messages
                .into_iter()
                .zip(ids)
                .filter(|(_, id)| !hits.contains(id))
                .map(|(message, _)| message)
                .collect();

            debug!(
                "Filter {}: {} fetched, {} unseen",
                filter.chat_id,
                fetched,
                unseen.len()
            );
            if !unseen.is_empty() {
                result.insert(filter, unseen);
            }
        }

        Ok(result)
    }

    /// Record messages as processed at `timestamp`
    pub async fn confirm_processed(&self, ids: &[String], timestamp: u64) -> Result<()> {
        self.cache
            .add(ids, timestamp)
            .await
            .map_err(TransportError::Store)
    }

    /// Forget processed records older than `timestamp`
    pub async fn clean_processed(&self, timestamp: u64) -> Result<()> {
        self.cache.clean(timestamp).await.map_err(TransportError::Store)
    }
}
