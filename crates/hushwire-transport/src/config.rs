//! Transport configuration

use std::time::Duration;

use hushwire_core::request::{DEFAULT_PAGE_LIMIT, DEFAULT_WINDOW_SECS, MAX_PAGE_LIMIT};
use hushwire_core::PeerId;
use serde::{Deserialize, Serialize};

/// Default interval between publish-only filter sweeps (5 minutes)
pub const DEFAULT_FILTER_CLEANUP_INTERVAL_SECS: u64 = 5 * 60;

/// Transport configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Mail servers available for historic requests
    pub mailservers: Vec<PeerId>,
    /// Interval between publish-only filter sweeps, in seconds
    pub filter_cleanup_interval_secs: u64,
    /// Page size of historic requests
    pub history_page_limit: u32,
    /// Look-back window used when a historic request has no lower bound
    pub history_default_window_secs: u32,
    /// Deadline for waiting on a historic request, in seconds
    pub request_timeout_secs: Option<u64>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            mailservers: Vec::new(),
            filter_cleanup_interval_secs: DEFAULT_FILTER_CLEANUP_INTERVAL_SECS,
            history_page_limit: DEFAULT_PAGE_LIMIT,
            history_default_window_secs: DEFAULT_WINDOW_SECS,
            request_timeout_secs: None,
        }
    }
}

impl TransportConfig {
    /// Create with mail servers
    pub fn with_mailservers(mailservers: Vec<PeerId>) -> Self {
        Self {
            mailservers,
            ..Default::default()
        }
    }

    /// Filter sweep interval as Duration
    pub fn filter_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.filter_cleanup_interval_secs)
    }

    /// Historic request deadline as Duration
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.filter_cleanup_interval_secs == 0 {
            return Err("filter_cleanup_interval_secs must be > 0".to_string());
        }
        if self.history_page_limit == 0 || self.history_page_limit > MAX_PAGE_LIMIT {
            return Err(format!(
                "history_page_limit must be within 1..={}",
                MAX_PAGE_LIMIT
            ));
        }
        if self.request_timeout_secs == Some(0) {
            return Err("request_timeout_secs must be > 0 when set".to_string());
        }
        Ok(())
    }
}
