//! Harvester tuning knobs.
//!
//! [`HarvestConfig`] deserializes with defaults for every missing field, so a
//! caller can load a partial JSON document and override only what it needs.
//! Where the config comes from is up to the caller.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Retries per page after a transient fetch failure
    pub max_retries: u32,

    /// Base delay between retries; attempt `n` waits `n * retry_backoff_ms`
    pub retry_backoff_ms: u64,

    /// Upper bound on a single page fetch
    pub fetch_timeout_ms: u64,

    /// Pages fetched before a run stops following resumption tokens
    pub max_pages: usize,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff_ms: 500,
            fetch_timeout_ms: 30_000,
            max_pages: 10_000,
        }
    }
}

impl HarvestConfig {
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff_ms = backoff.as_millis() as u64;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_max_pages(mut self, pages: usize) -> Self {
        self.max_pages = pages;
        self
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}
