//! Usage event feed.
//!
//! Pages carry `usage` entries anywhere in the document:
//!
//! ```json
//! { "events": { "usage": [
//!     { "item": 42, "context": "web", "timestamp": "2021-03-04T10:00:00Z", "kind": "download" }
//! ] }, "resumptionToken": "usage-2.json" }
//! ```
//!
//! `context` defaults to empty and is taken verbatim; `kind` defaults to `view`.

use super::{parse_datestamp, parse_document, resumption_token, text_of};
use crate::harvest::traits::{HarvestItem, ParsedPage, RecordError, RecordParser, SourceError};
use crate::stats::{UsageEvent, UsageKind};
use crate::tree::{find_all_by_tag_name, find_first_by_tag_name, Element};

#[derive(Debug, Default, Clone, Copy)]
pub struct UsageFeedParser;

impl HarvestItem for UsageEvent {
    fn record_id(&self) -> String {
        format!("{}:{}:{}", self.item_id, self.timestamp, self.context)
    }
}

impl RecordParser for UsageFeedParser {
    type Record = UsageEvent;

    fn format_name(&self) -> &'static str {
        "usage-feed"
    }

    fn parse_page(&self, document: &[u8]) -> Result<ParsedPage<UsageEvent>, SourceError> {
        let root = parse_document(document)?;
        let records = find_all_by_tag_name(&root, "usage")
            .into_iter()
            .map(parse_usage)
            .collect();
        Ok(ParsedPage {
            records,
            resumption_token: resumption_token(&root),
        })
    }
}

fn parse_usage(usage: &Element) -> Result<UsageEvent, RecordError> {
    let raw_item = text_of(usage, "item").ok_or_else(|| RecordError::MissingField {
        field: "item".to_string(),
    })?;
    let item_id = raw_item
        .parse::<i64>()
        .map_err(|e| invalid(raw_item, "item", e.to_string()))?;

    let raw_time = text_of(usage, "timestamp").ok_or_else(|| RecordError::MissingField {
        field: "timestamp".to_string(),
    })?;
    let timestamp =
        parse_datestamp(raw_time).map_err(|reason| invalid(raw_item, "timestamp", reason))?;

    let kind = match text_of(usage, "kind").unwrap_or("view") {
        "view" => UsageKind::View,
        "download" => UsageKind::Download,
        other => {
            return Err(invalid(
                raw_item,
                "kind",
                format!("expected 'view' or 'download', got '{other}'"),
            ))
        }
    };

    Ok(UsageEvent {
        item_id,
        context: raw_context(usage).to_string(),
        timestamp,
        kind,
    })
}

/// Context is part of the statistics key, so its text is kept untrimmed.
fn raw_context(usage: &Element) -> &str {
    find_first_by_tag_name(usage, "context")
        .and_then(Element::text)
        .unwrap_or("")
}

fn invalid(item: &str, field: &str, reason: String) -> RecordError {
    RecordError::InvalidField {
        record: item.to_string(),
        field: field.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_usage_entries() {
        let doc = br#"{
            "events": { "usage": [
                { "item": 42, "context": "web", "timestamp": 3600, "kind": "download" },
                { "item": "7", "timestamp": "1970-01-01T00:01:00Z" },
                { "item": "x", "timestamp": 1 },
                { "item": 9, "timestamp": 1, "kind": "like" },
                { "timestamp": 1 }
            ] },
            "resumptionToken": "usage-2.json"
        }"#;

        let page = UsageFeedParser.parse_page(doc).unwrap();
        assert_eq!(page.resumption_token.as_deref(), Some("usage-2.json"));
        assert_eq!(page.records.len(), 5);

        let first = page.records[0].as_ref().unwrap();
        assert_eq!(first.item_id, 42);
        assert_eq!(first.kind, UsageKind::Download);
        assert_eq!(first.record_id(), "42:3600:web");

        let second = page.records[1].as_ref().unwrap();
        assert_eq!((second.item_id, second.timestamp), (7, 60));
        assert_eq!(second.kind, UsageKind::View);
        assert_eq!(second.context, "");

        assert!(page.records[2..].iter().all(Result::is_err));
    }

    #[test]
    fn test_context_whitespace_is_preserved() {
        let doc = br#"{"usage": [
            {"item": 1, "context": " Web ", "timestamp": 0},
            {"item": 1, "context": "Web", "timestamp": 0}
        ]}"#;

        let page = UsageFeedParser.parse_page(doc).unwrap();
        let contexts: Vec<&str> = page
            .records
            .iter()
            .map(|r| r.as_ref().unwrap().context.as_str())
            .collect();
        assert_eq!(contexts, vec![" Web ", "Web"]);
    }
}
