//! Response format implementations.
//!
//! Each module implements [`RecordParser`](crate::harvest::RecordParser) for
//! one document shape. Both formats are JSON turned into an
//! [`Element`] tree, so fields are found by tag name at any depth:
//! - `json_feed` - metadata records with resumption tokens
//! - `usage` - usage events feeding popularity statistics

pub mod json_feed;
pub mod usage;

pub use json_feed::JsonFeedParser;
pub use usage::UsageFeedParser;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use crate::harvest::traits::SourceError;
use crate::tree::{find_all_by_tag_name, find_first_by_tag_name, Element};

/// Tag given to the root of every parsed document.
pub const DOCUMENT_TAG: &str = "document";

/// Parses a JSON page into an element tree rooted at [`DOCUMENT_TAG`].
pub(crate) fn parse_document(document: &[u8]) -> Result<Element, SourceError> {
    let value: serde_json::Value = serde_json::from_slice(document)
        .map_err(|e| SourceError::Malformed(format!("invalid JSON document: {e}")))?;
    Ok(Element::from_json(DOCUMENT_TAG, &value))
}

/// Non-empty `resumptionToken` anywhere in the document.
pub(crate) fn resumption_token(document: &Element) -> Option<String> {
    text_of(document, "resumptionToken").map(str::to_string)
}

/// Trimmed text of the first descendant (or self) tagged `tag`.
pub(crate) fn text_of<'a>(element: &'a Element, tag: &str) -> Option<&'a str> {
    find_first_by_tag_name(element, tag)
        .and_then(Element::text)
        .map(str::trim)
        .filter(|text| !text.is_empty())
}

/// Trimmed, non-empty texts of every descendant tagged `tag`.
pub(crate) fn texts_of(element: &Element, tag: &str) -> Vec<String> {
    find_all_by_tag_name(element, tag)
        .into_iter()
        .filter_map(Element::text)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
        .collect()
}

/// Accepts epoch seconds, RFC 3339 timestamps, or day-granularity
/// `YYYY-MM-DD` dates (midnight UTC).
pub(crate) fn parse_datestamp(raw: &str) -> Result<i64, String> {
    let raw = raw.trim();
    if let Ok(seconds) = raw.parse::<i64>() {
        return Ok(seconds);
    }
    if let Ok(stamp) = DateTime::parse_from_rfc3339(raw) {
        return Ok(stamp.timestamp());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|midnight| Utc.from_utc_datetime(&midnight).timestamp())
        .ok_or_else(|| format!("unrecognized datestamp '{raw}'"))
}
