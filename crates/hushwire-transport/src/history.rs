//! Historic request protocol
//!
//! A request carries a fresh random id and a bloom filter over the topics of
//! interest. When the caller waits, the relay's envelope event stream is
//! subscribed before dispatch and filtered for the completion event of that
//! id. The subscription is a `broadcast::Receiver` owned by the call, so it
//! is released on every exit path.

use std::sync::Arc;
use std::time::Duration;

use hushwire_core::{Cursor, HistoricRequest, PeerId, Relay, Topic};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::TransportConfig;
use crate::error::{Result, TransportError};

/// Parameters of one historic request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryQuery {
    /// Mail server the request is sent to
    pub peer: PeerId,
    /// Lower bound (Unix seconds), 0 for the default window
    pub from: u32,
    /// Upper bound (Unix seconds), 0 for now
    pub to: u32,
    /// Continuation of a previous page
    pub cursor: Cursor,
    /// Whether to block until the mail server completes the request
    pub wait_for_response: bool,
}

impl HistoryQuery {
    /// Create a fire-and-forget query over the default window
    pub fn new(peer: PeerId) -> Self {
        Self {
            peer,
            from: 0,
            to: 0,
            cursor: Cursor::default(),
            wait_for_response: false,
        }
    }

    /// Set the time range
    pub fn with_range(mut self, from: u32, to: u32) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    /// Continue from a cursor
    pub fn with_cursor(mut self, cursor: Cursor) -> Self {
        self.cursor = cursor;
        self
    }

    /// Block until the mail server answers
    pub fn wait_for_response(mut self) -> Self {
        self.wait_for_response = true;
        self
    }
}

/// Sends historic requests and correlates their completion events
pub struct HistoricRequester {
    relay: Arc<dyn Relay>,
    page_limit: u32,
    window_secs: u32,
    timeout: Option<Duration>,
}

impl HistoricRequester {
    /// Create a new requester
    pub fn new(relay: Arc<dyn Relay>, config: &TransportConfig) -> Self {
        Self {
            relay,
            page_limit: config.history_page_limit,
            window_secs: config.history_default_window_secs,
            timeout: config.request_timeout(),
        }
    }

    /// Request envelopes on `topics` from `query.peer`.
    ///
    /// Returns the mail server's continuation cursor, or an empty cursor
    /// when not waiting for the response.
    #[instrument(skip(self, query, topics, cancel), fields(peer = %query.peer))]
    pub async fn request(
        &self,
        query: HistoryQuery,
        topics: &[Topic],
        cancel: &CancellationToken,
    ) -> Result<Cursor> {
        let mut request = HistoricRequest::new(query.from, query.to, query.cursor, topics)
            .with_limit(self.page_limit);
        request.set_defaults(self.relay.current_time(), self.window_secs);
        request
            .validate()
            .map_err(TransportError::InvalidRequest)?;

        let id = request.id.clone();
        debug!(
            "Historic request {} for {} topics in [{}, {}]",
            id,
            topics.len(),
            request.from,
            request.to
        );

        if !query.wait_for_response {
            self.relay
                .send_messages_request(&query.peer, request)
                .await
                .map_err(TransportError::Relay)?;
            return Ok(Cursor::default());
        }

        // Subscribe first so a fast completion cannot be missed
        let mut events = self.relay.subscribe_envelope_events();
        self.relay
            .send_messages_request(&query.peer, request)
            .await
            .map_err(TransportError::Relay)?;

        let expected = id.to_hash();
        let timeout = self.timeout;
        let deadline = async move {
            match timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("Historic request {} cancelled", id);
                    return Err(TransportError::Cancelled);
                }
                _ = &mut deadline => {
                    warn!("Historic request {} exceeded its deadline", id);
                    return Err(TransportError::DeadlineExceeded);
                }
                event = events.recv() => match event {
                    Ok(event) if event.hash == expected => {
                        let Some(response) = event.completion() else {
                            continue;
                        };
                        if let Some(error) = &response.error {
                            warn!("Mail server failed request {}: {}", id, error);
                            return Err(TransportError::MailServer(error.clone()));
                        }
                        info!("Historic request {} completed", id);
                        return Ok(response.cursor.clone());
                    }
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Envelope event stream lagged, skipped {} events", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => return Err(TransportError::EventStreamClosed),
                },
            }
        }
    }
}
