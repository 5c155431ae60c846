//! Row encoding contract for wide-column storage.
//!
//! Every entity that lands in the column store implements [`StorableRow`].
//! Encoding produces a [`ColumnMap`], which is sorted by raw column-name bytes
//! so that prefix and range reads behave the same no matter which order the
//! entity wrote its columns in.

use crate::key::{decode_ordered_i64, encode_ordered_i64};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Sorted mapping from column name to column value within one row.
pub type ColumnMap = BTreeMap<Vec<u8>, Vec<u8>>;

/// Largest value accepted for a single column (1 MiB).
pub const MAX_COLUMN_VALUE_LEN: usize = 1 << 20;

#[derive(Error, Debug)]
pub enum EncodingError {
    #[error("Column name must not be empty")]
    EmptyColumnName,
    #[error("Column '{0}' written twice by one entity")]
    DuplicateColumn(String),
    #[error("Column '{column}' value is {len} bytes, limit is {limit}")]
    ValueTooLarge {
        column: String,
        len: usize,
        limit: usize,
    },
    #[error("Failed to serialize column '{column}': {source}")]
    Serialization {
        column: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid value for column '{column}': {reason}")]
    InvalidValue { column: String, reason: String },
}

/// Failed [`StorableRow::merge_into`]; carries the caller's map back untouched.
#[derive(Error, Debug)]
#[error("{source}")]
pub struct MergeError {
    #[source]
    pub source: EncodingError,
    pub target: ColumnMap,
}

impl MergeError {
    pub fn into_target(self) -> ColumnMap {
        self.target
    }
}

/// A fully encoded row, ready to hand to a column store client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub key: Vec<u8>,
    pub columns: ColumnMap,
}

/// Typed column writer handed to [`StorableRow::encode_columns`].
///
/// Integers are written as fixed-width big-endian so stored values sort
/// numerically; signed integers additionally have their sign bit flipped.
#[derive(Debug, Default)]
pub struct ColumnWriter {
    columns: ColumnMap,
}

impl ColumnWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_bytes(
        &mut self,
        column: &str,
        value: impl Into<Vec<u8>>,
    ) -> Result<(), EncodingError> {
        if column.is_empty() {
            return Err(EncodingError::EmptyColumnName);
        }
        let value = value.into();
        if value.len() > MAX_COLUMN_VALUE_LEN {
            return Err(EncodingError::ValueTooLarge {
                column: column.to_string(),
                len: value.len(),
                limit: MAX_COLUMN_VALUE_LEN,
            });
        }
        if self.columns.insert(column.as_bytes().to_vec(), value).is_some() {
            return Err(EncodingError::DuplicateColumn(column.to_string()));
        }
        Ok(())
    }

    pub fn put_str(&mut self, column: &str, value: &str) -> Result<(), EncodingError> {
        self.put_bytes(column, value.as_bytes())
    }

    /// Writes `value` if present; `None` leaves the column out of the row.
    pub fn put_opt_str(&mut self, column: &str, value: Option<&str>) -> Result<(), EncodingError> {
        match value {
            Some(v) => self.put_str(column, v),
            None => Ok(()),
        }
    }

    pub fn put_u64(&mut self, column: &str, value: u64) -> Result<(), EncodingError> {
        self.put_bytes(column, value.to_be_bytes())
    }

    pub fn put_i64(&mut self, column: &str, value: i64) -> Result<(), EncodingError> {
        self.put_bytes(column, encode_ordered_i64(value))
    }

    pub fn put_bool(&mut self, column: &str, value: bool) -> Result<(), EncodingError> {
        self.put_bytes(column, [u8::from(value)])
    }

    /// Writes a structured value as compact JSON.
    pub fn put_json<T: Serialize + ?Sized>(
        &mut self,
        column: &str,
        value: &T,
    ) -> Result<(), EncodingError> {
        let encoded = serde_json::to_vec(value).map_err(|source| EncodingError::Serialization {
            column: column.to_string(),
            source,
        })?;
        self.put_bytes(column, encoded)
    }

    pub fn into_columns(self) -> ColumnMap {
        self.columns
    }
}

/// Read-side counterpart of [`ColumnWriter`].
///
/// Missing columns read as `Ok(None)`; present columns with the wrong shape
/// are an [`EncodingError::InvalidValue`].
#[derive(Debug, Clone, Copy)]
pub struct ColumnReader<'a> {
    columns: &'a ColumnMap,
}

impl<'a> ColumnReader<'a> {
    pub fn new(columns: &'a ColumnMap) -> Self {
        Self { columns }
    }

    pub fn get_bytes(&self, column: &str) -> Option<&'a [u8]> {
        self.columns.get(column.as_bytes()).map(Vec::as_slice)
    }

    pub fn get_str(&self, column: &str) -> Result<Option<&'a str>, EncodingError> {
        self.get_bytes(column)
            .map(|bytes| {
                std::str::from_utf8(bytes).map_err(|e| invalid(column, e.to_string()))
            })
            .transpose()
    }

    pub fn get_u64(&self, column: &str) -> Result<Option<u64>, EncodingError> {
        self.get_bytes(column)
            .map(|bytes| fixed8(column, bytes).map(u64::from_be_bytes))
            .transpose()
    }

    pub fn get_i64(&self, column: &str) -> Result<Option<i64>, EncodingError> {
        self.get_bytes(column)
            .map(|bytes| fixed8(column, bytes).map(decode_ordered_i64))
            .transpose()
    }

    pub fn get_bool(&self, column: &str) -> Result<Option<bool>, EncodingError> {
        self.get_bytes(column)
            .map(|bytes| match bytes {
                [0] => Ok(false),
                [1] => Ok(true),
                _ => Err(invalid(column, format!("expected boolean byte, got {bytes:?}"))),
            })
            .transpose()
    }

    pub fn get_json<T: DeserializeOwned>(&self, column: &str) -> Result<Option<T>, EncodingError> {
        self.get_bytes(column)
            .map(|bytes| serde_json::from_slice(bytes).map_err(|e| invalid(column, e.to_string())))
            .transpose()
    }
}

fn invalid(column: &str, reason: String) -> EncodingError {
    EncodingError::InvalidValue {
        column: column.to_string(),
        reason,
    }
}

fn fixed8(column: &str, bytes: &[u8]) -> Result<[u8; 8], EncodingError> {
    bytes
        .try_into()
        .map_err(|_| invalid(column, format!("expected 8 bytes, got {}", bytes.len())))
}

/// Contract for any domain object persisted as a wide-column row.
///
/// Implementors provide [`encode_columns`](StorableRow::encode_columns) and
/// [`row_key`](StorableRow::row_key); the map-building methods are provided.
///
/// # Determinism
///
/// Encoding must be a pure function of the current field values: the same
/// object state always yields byte-identical columns. The store relies on
/// this for prefix and range scans.
///
/// # Atomicity
///
/// Columns are staged in a scratch writer and only copied into the caller's
/// map once the whole entity has encoded, so a failure never leaves a
/// partially populated row behind.
pub trait StorableRow {
    /// Writes every column describing the object's state.
    fn encode_columns(&self, columns: &mut ColumnWriter) -> Result<(), EncodingError>;

    /// Row key derived from immutable identity fields only.
    fn row_key(&self) -> Vec<u8>;

    /// Builds a fresh column map for this object.
    fn to_map(&self) -> Result<ColumnMap, EncodingError> {
        let mut columns = ColumnWriter::new();
        self.encode_columns(&mut columns)?;
        Ok(columns.into_columns())
    }

    /// Appends this object's columns to `target` and hands the map back, so
    /// several entities can share one physical row.
    ///
    /// Column names already present in `target` are overwritten; avoiding
    /// collisions between merged entities is up to the caller. On error the
    /// map comes back unchanged inside [`MergeError`].
    fn merge_into(&self, mut target: ColumnMap) -> Result<ColumnMap, MergeError> {
        match self.to_map() {
            Ok(staged) => {
                target.extend(staged);
                Ok(target)
            }
            Err(source) => Err(MergeError { source, target }),
        }
    }

    fn to_row(&self) -> Result<Row, EncodingError> {
        Ok(Row {
            key: self.row_key(),
            columns: self.to_map()?,
        })
    }
}
