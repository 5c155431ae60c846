//! Composite time-bucketed key for popularity statistics.
//!
//! [`ItemTime`] orders by `timestamp`, then `item_id`, then `context`. Its
//! byte form reproduces that order under raw lexicographic comparison, so a
//! store scanning keys in byte order returns statistics chronologically.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

const SIGN_BIT: u64 = 1 << 63;

/// Width of the fixed integer prefix: timestamp then item id.
pub const ITEM_TIME_PREFIX_LEN: usize = 16;

/// Encodes a signed integer so that big-endian byte order matches numeric order.
pub fn encode_ordered_i64(value: i64) -> [u8; 8] {
    ((value as u64) ^ SIGN_BIT).to_be_bytes()
}

pub fn decode_ordered_i64(bytes: [u8; 8]) -> i64 {
    (u64::from_be_bytes(bytes) ^ SIGN_BIT) as i64
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum KeyDecodeError {
    #[error("Key is {0} bytes, need at least 16")]
    TooShort(usize),
    #[error("Context is not valid UTF-8: {0}")]
    InvalidContext(#[from] std::str::Utf8Error),
}

/// `(item_id, context, timestamp)` statistics key.
///
/// Immutable once built. `context` is kept exactly as given.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemTime {
    item_id: i64,
    context: String,
    timestamp: i64,
}

impl ItemTime {
    pub fn new(item_id: i64, context: impl Into<String>, timestamp: i64) -> Self {
        Self {
            item_id,
            context: context.into(),
            timestamp,
        }
    }

    pub fn item_id(&self) -> i64 {
        self.item_id
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Row-key fragment: biased big-endian `timestamp`, biased big-endian
    /// `item_id`, then the raw context bytes.
    pub fn to_key_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(ITEM_TIME_PREFIX_LEN + self.context.len());
        bytes.extend_from_slice(&encode_ordered_i64(self.timestamp));
        bytes.extend_from_slice(&encode_ordered_i64(self.item_id));
        bytes.extend_from_slice(self.context.as_bytes());
        bytes
    }

    pub fn from_key_bytes(bytes: &[u8]) -> Result<Self, KeyDecodeError> {
        if bytes.len() < ITEM_TIME_PREFIX_LEN {
            return Err(KeyDecodeError::TooShort(bytes.len()));
        }
        let mut ts = [0u8; 8];
        ts.copy_from_slice(&bytes[0..8]);
        let mut item = [0u8; 8];
        item.copy_from_slice(&bytes[8..16]);
        let context = std::str::from_utf8(&bytes[ITEM_TIME_PREFIX_LEN..])?;

        Ok(Self {
            item_id: decode_ordered_i64(item),
            context: context.to_string(),
            timestamp: decode_ordered_i64(ts),
        })
    }

    /// Key prefix selecting every statistic in one time bucket.
    pub fn timestamp_prefix(timestamp: i64) -> [u8; 8] {
        encode_ordered_i64(timestamp)
    }
}

impl Ord for ItemTime {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.timestamp, self.item_id, &self.context).cmp(&(
            other.timestamp,
            other.item_id,
            &other.context,
        ))
    }
}

impl PartialOrd for ItemTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ItemTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}/{}", self.item_id, self.timestamp, self.context)
    }
}
