//! Time-bucketed popularity statistics.
//!
//! Usage events are folded into per-bucket counters keyed by [`ItemTime`].
//! Counters live in a `BTreeMap`, so they drain in the same order the store
//! keeps their rows: bucket first, then item, then context.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::key::ItemTime;
use crate::model::PopularityStat;
use crate::store::{ColumnStore, StoreError};
use crate::traits::StorableRow;

/// Smallest bucket accepted (one second).
pub const MIN_BUCKET_SECS: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageKind {
    View,
    Download,
}

/// A single use of an item, as reported by a usage feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEvent {
    pub item_id: i64,
    pub context: String,
    pub timestamp: i64,
    pub kind: UsageKind,
}

#[derive(Debug)]
pub struct PopularityAggregator {
    bucket_secs: i64,
    counters: BTreeMap<ItemTime, PopularityStat>,
}

impl PopularityAggregator {
    /// Creates an aggregator with `bucket_secs`-wide time buckets.
    ///
    /// Widths below [`MIN_BUCKET_SECS`] are clamped.
    pub fn new(bucket_secs: i64) -> Self {
        let bucket_secs = if bucket_secs < MIN_BUCKET_SECS {
            warn!(
                bucket_secs,
                min = MIN_BUCKET_SECS,
                "Bucket width below minimum; using minimum"
            );
            MIN_BUCKET_SECS
        } else {
            bucket_secs
        };
        Self {
            bucket_secs,
            counters: BTreeMap::new(),
        }
    }

    pub fn bucket_secs(&self) -> i64 {
        self.bucket_secs
    }

    /// Start of the bucket containing `timestamp`, rounding toward negative
    /// infinity so pre-epoch timestamps bucket in order too.
    pub fn bucket_start(&self, timestamp: i64) -> i64 {
        timestamp.saturating_sub(timestamp.rem_euclid(self.bucket_secs))
    }

    pub fn record(&mut self, event: &UsageEvent) {
        let key = ItemTime::new(
            event.item_id,
            event.context.as_str(),
            self.bucket_start(event.timestamp),
        );
        let stat = self
            .counters
            .entry(key)
            .or_insert_with_key(|key| PopularityStat::new(key.clone()));
        match event.kind {
            UsageKind::View => stat.views = stat.views.saturating_add(1),
            UsageKind::Download => stat.downloads = stat.downloads.saturating_add(1),
        }
    }

    pub fn record_all<'a>(&mut self, events: impl IntoIterator<Item = &'a UsageEvent>) {
        for event in events {
            self.record(event);
        }
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Takes every accumulated statistic in key order, leaving the
    /// aggregator empty.
    pub fn drain(&mut self) -> Vec<PopularityStat> {
        std::mem::take(&mut self.counters).into_values().collect()
    }

    /// Adds the accumulated counters onto whatever `store` already holds for
    /// each key, then clears the aggregator. Returns the number of rows written.
    ///
    /// # Errors
    ///
    /// Stops at the first store or encoding failure. Statistics not yet
    /// written are put back, so a retry does not lose counts.
    pub fn flush_to<S: ColumnStore>(&mut self, store: &S) -> Result<usize, StoreError> {
        let pending = self.drain();
        let mut written = 0;
        let mut remaining = pending.into_iter();

        while let Some(stat) = remaining.next() {
            let outcome = store
                .get(&stat.row_key())
                .and_then(|stored| match stored {
                    Some(columns) => stat.accumulate(&columns).map_err(StoreError::from),
                    None => Ok(stat.clone()),
                })
                .and_then(|total| store.write(&total));

            if let Err(err) = outcome {
                self.counters.insert(stat.key.clone(), stat);
                for rest in remaining {
                    self.counters.insert(rest.key.clone(), rest);
                }
                return Err(err);
            }
            written += 1;
        }

        debug!(rows = written, "Flushed popularity statistics");
        Ok(written)
    }
}
