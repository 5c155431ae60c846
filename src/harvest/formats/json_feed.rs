//! Paged JSON metadata feed.
//!
//! A page looks like an OAI-PMH `ListRecords` response rendered as JSON:
//!
//! ```json
//! {
//!   "ListRecords": {
//!     "record": [
//!       { "header": { "identifier": "oai:repo:1", "datestamp": "2021-03-04",
//!                     "setSpec": ["theses"] },
//!         "metadata": { "title": "...", "creator": ["..."], "subject": ["..."] } }
//!     ],
//!     "resumptionToken": "page-2.json"
//!   }
//! }
//! ```
//!
//! Fields are located by tag name anywhere inside a record, so sources that
//! flatten or nest the header differently parse the same way.

use tracing::debug;

use super::{parse_datestamp, parse_document, resumption_token, text_of, texts_of};
use crate::harvest::traits::{HarvestItem, ParsedPage, RecordError, RecordParser, SourceError};
use crate::model::HarvestedRecord;
use crate::tree::{find_all_by_tag_name, Element};

/// Error code a source uses for an empty, but valid, result set.
const NO_RECORDS_MATCH: &str = "noRecordsMatch";

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFeedParser;

impl HarvestItem for HarvestedRecord {
    fn record_id(&self) -> String {
        self.identifier.clone()
    }
}

impl RecordParser for JsonFeedParser {
    type Record = HarvestedRecord;

    fn format_name(&self) -> &'static str {
        "json-feed"
    }

    fn parse_page(&self, document: &[u8]) -> Result<ParsedPage<HarvestedRecord>, SourceError> {
        let root = parse_document(document)?;

        if let Some(error) = root.child("error") {
            let code = text_of(error, "code").unwrap_or("unknown");
            if code == NO_RECORDS_MATCH {
                debug!("Source reported no matching records");
                return Ok(ParsedPage {
                    records: Vec::new(),
                    resumption_token: None,
                });
            }
            let message = text_of(error, "message").unwrap_or("");
            return Err(SourceError::Malformed(format!(
                "source reported error '{code}': {message}"
            )));
        }

        let records = find_all_by_tag_name(&root, "record")
            .into_iter()
            .map(parse_record)
            .collect();

        Ok(ParsedPage {
            records,
            resumption_token: resumption_token(&root),
        })
    }
}

fn parse_record(record: &Element) -> Result<HarvestedRecord, RecordError> {
    let identifier = text_of(record, "identifier").ok_or_else(|| RecordError::MissingField {
        field: "identifier".to_string(),
    })?;
    let raw_datestamp = text_of(record, "datestamp").ok_or_else(|| RecordError::MissingField {
        field: "datestamp".to_string(),
    })?;
    let datestamp = parse_datestamp(raw_datestamp).map_err(|reason| RecordError::InvalidField {
        record: identifier.to_string(),
        field: "datestamp".to_string(),
        reason,
    })?;

    Ok(HarvestedRecord {
        identifier: identifier.to_string(),
        datestamp,
        title: text_of(record, "title").map(str::to_string),
        creators: texts_of(record, "creator"),
        subjects: texts_of(record, "subject"),
        sets: texts_of(record, "setSpec"),
        deleted: text_of(record, "status") == Some("deleted"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &[u8] = br#"{
        "ListRecords": {
            "record": [
                {
                    "header": {
                        "identifier": "oai:repo:1",
                        "datestamp": "2021-03-04T05:06:07Z",
                        "setSpec": ["theses", "physics"]
                    },
                    "metadata": {
                        "dc": {
                            "title": "Wave Functions",
                            "creator": ["Curie, M.", "Bohr, N."],
                            "subject": "quantum"
                        }
                    }
                },
                {
                    "header": { "datestamp": "2021-03-04" }
                },
                {
                    "header": { "identifier": "oai:repo:3", "datestamp": "someday" }
                },
                {
                    "header": {
                        "identifier": "oai:repo:4",
                        "datestamp": 1600000000,
                        "status": "deleted"
                    }
                }
            ],
            "resumptionToken": "page-2.json"
        }
    }"#;

    #[test]
    fn test_parses_nested_records() {
        let page = JsonFeedParser.parse_page(PAGE).unwrap();
        assert_eq!(page.records.len(), 4);
        assert_eq!(page.resumption_token.as_deref(), Some("page-2.json"));

        let first = page.records[0].as_ref().unwrap();
        assert_eq!(first.identifier, "oai:repo:1");
        assert_eq!(first.datestamp, 1_614_834_367);
        assert_eq!(first.title.as_deref(), Some("Wave Functions"));
        assert_eq!(first.creators, vec!["Curie, M.", "Bohr, N."]);
        assert_eq!(first.subjects, vec!["quantum"]);
        assert_eq!(first.sets, vec!["theses", "physics"]);
        assert!(!first.deleted);

        let deleted = page.records[3].as_ref().unwrap();
        assert!(deleted.deleted);
        assert_eq!(deleted.record_id(), "oai:repo:4");
    }

    #[test]
    fn test_malformed_records_become_errors() {
        let page = JsonFeedParser.parse_page(PAGE).unwrap();
        assert_eq!(
            page.records[1],
            Err(RecordError::MissingField {
                field: "identifier".to_string()
            })
        );
        assert!(matches!(
            &page.records[2],
            Err(RecordError::InvalidField { record, .. }) if record == "oai:repo:3"
        ));
    }

    #[test]
    fn test_no_records_match_is_empty_page() {
        let doc = br#"{"error": {"code": "noRecordsMatch", "message": "nothing"}}"#;
        let page = JsonFeedParser.parse_page(doc).unwrap();
        assert!(page.records.is_empty());
        assert!(page.resumption_token.is_none());
    }

    #[test]
    fn test_source_error_is_malformed() {
        let doc = br#"{"error": {"code": "badResumptionToken", "message": "expired"}}"#;
        let err = JsonFeedParser.parse_page(doc).unwrap_err();
        assert!(err.to_string().contains("badResumptionToken"));
    }

    #[test]
    fn test_records_follow_document_order() {
        let doc = br#"{"ListRecords": {
            "zeta": {"record": {"header": {"identifier": "first-in-doc", "datestamp": 1}}},
            "alpha": {"record": {"header": {"identifier": "second-in-doc", "datestamp": 2}}}
        }}"#;
        let page = JsonFeedParser.parse_page(doc).unwrap();
        let ids: Vec<String> = page
            .records
            .iter()
            .map(|r| r.as_ref().unwrap().record_id())
            .collect();
        assert_eq!(ids, vec!["first-in-doc", "second-in-doc"]);
    }
}
