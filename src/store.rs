//! Column store boundary.
//!
//! [`ColumnStore`] is the shape a wide-column client has to offer: sorted rows
//! of sorted columns, addressed by raw byte keys. [`MemoryColumnStore`] is the
//! in-process implementation used for local runs and tests.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::{debug, error};

use crate::harvest::traits::{HarvestEvent, HarvestEventSink};
use crate::traits::{ColumnMap, EncodingError, Row, StorableRow};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to encode row: {0}")]
    Encoding(#[from] EncodingError),

    #[error("Store backend failure: {0}")]
    Backend(String),
}

/// Minimal wide-column store client.
///
/// Scans return rows in ascending raw byte order of their keys.
pub trait ColumnStore: Send + Sync {
    /// Writes a row, merging its columns into any row already stored under
    /// the same key.
    fn put(&self, row: Row) -> Result<(), StoreError>;

    fn get(&self, key: &[u8]) -> Result<Option<ColumnMap>, StoreError>;

    /// Every row whose key starts with `prefix`.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<Row>, StoreError>;

    /// Every row with `start <= key < end`.
    fn scan_range(&self, start: &[u8], end: &[u8]) -> Result<Vec<Row>, StoreError>;

    /// Encodes `entity` and writes it as one unit.
    fn write<R: StorableRow + ?Sized>(&self, entity: &R) -> Result<(), StoreError>
    where
        Self: Sized,
    {
        self.put(entity.to_row()?)
    }
}

#[derive(Debug, Default)]
pub struct MemoryColumnStore {
    rows: RwLock<BTreeMap<Vec<u8>, ColumnMap>>,
}

impl MemoryColumnStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<Vec<u8>, ColumnMap>> {
        self.rows.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, BTreeMap<Vec<u8>, ColumnMap>> {
        self.rows.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn collect<'a>(rows: impl Iterator<Item = (&'a Vec<u8>, &'a ColumnMap)>) -> Vec<Row> {
        rows.map(|(key, columns)| Row {
            key: key.clone(),
            columns: columns.clone(),
        })
        .collect()
    }
}

impl ColumnStore for MemoryColumnStore {
    fn put(&self, row: Row) -> Result<(), StoreError> {
        if row.key.is_empty() {
            return Err(StoreError::Backend("row key must not be empty".to_string()));
        }
        debug!(key_len = row.key.len(), columns = row.columns.len(), "Writing row");
        self.write_lock()
            .entry(row.key)
            .or_default()
            .extend(row.columns);
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<ColumnMap>, StoreError> {
        Ok(self.read().get(key).cloned())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<Row>, StoreError> {
        let rows = self.read();
        let matching = rows
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix));
        Ok(Self::collect(matching))
    }

    fn scan_range(&self, start: &[u8], end: &[u8]) -> Result<Vec<Row>, StoreError> {
        if start >= end {
            return Ok(Vec::new());
        }
        let rows = self.read();
        let matching = rows.range::<[u8], _>((Bound::Included(start), Bound::Excluded(end)));
        Ok(Self::collect(matching))
    }
}

/// Event sink that stores every harvested record.
///
/// Records that fail to encode are logged and counted; nothing partial is
/// written for them and the harvest carries on.
pub struct StoringSink<S, R> {
    store: Arc<S>,
    written: AtomicUsize,
    failed: AtomicUsize,
    _record: PhantomData<fn(&R)>,
}

impl<S: ColumnStore, R> StoringSink<S, R> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            written: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            _record: PhantomData,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn written(&self) -> usize {
        self.written.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }
}

impl<S, R> HarvestEventSink<R> for StoringSink<S, R>
where
    S: ColumnStore,
    R: StorableRow,
{
    fn on_event(&self, event: &HarvestEvent<R>) {
        if let HarvestEvent::Progress { record, .. } = event {
            match self.store.write(record) {
                Ok(()) => {
                    self.written.fetch_add(1, Ordering::SeqCst);
                }
                Err(err) => {
                    self.failed.fetch_add(1, Ordering::SeqCst);
                    error!(error = %err, "Failed to store harvested record");
                }
            }
        }
    }
}
