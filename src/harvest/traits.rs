//! Core traits and types for the harvest system.
//!
//! This module defines the seams a concrete harvester is assembled from:
//! - Byte transport via [`Transport`]
//! - Document parsing via [`RecordParser`]
//! - Progress reporting via [`HarvestEventSink`]
//! - Standardized error handling

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ============================================================================
// Transport Trait
// ============================================================================

/// Fetches raw documents from an external source.
///
/// The source string is opaque to the harvester (URL, path, endpoint). A
/// transport only moves bytes; it never interprets them.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` so one harvester can be driven from
/// any tokio worker.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short identifier used in logs (e.g. `"file"`).
    fn name(&self) -> &str;

    /// Fetches one page of the source.
    ///
    /// `resumption_token` is `None` for the first page and otherwise the
    /// token the parser extracted from the previous page.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Transient`] or [`SourceError::Timeout`] for
    /// failures worth retrying, and [`SourceError::Unreachable`] when the
    /// source cannot be reached at all.
    async fn fetch(
        &self,
        source: &str,
        resumption_token: Option<&str>,
    ) -> Result<Vec<u8>, SourceError>;
}

// ============================================================================
// Parser Trait
// ============================================================================

/// Anything a harvester can emit: it must name itself for the resume cursor.
pub trait HarvestItem: Send + Sync + 'static {
    fn record_id(&self) -> String;
}

/// One parsed page of a harvest response.
#[derive(Debug)]
pub struct ParsedPage<R> {
    /// Records in document order; malformed entries are kept as errors so the
    /// harvester can report and skip them.
    pub records: Vec<Result<R, RecordError>>,

    /// Token for the next page, `None` on the last one.
    pub resumption_token: Option<String>,
}

/// Turns a fetched document into records.
pub trait RecordParser: Send + Sync {
    type Record: HarvestItem;

    /// Returns the format identifier (e.g. `"json-feed"`).
    fn format_name(&self) -> &'static str;

    /// Parses a whole page.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Malformed`] if the document as a whole is
    /// unusable. Problems confined to one record belong in
    /// [`ParsedPage::records`] instead.
    fn parse_page(&self, document: &[u8]) -> Result<ParsedPage<Self::Record>, SourceError>;
}

// ============================================================================
// Events
// ============================================================================

/// Notification emitted while a harvest runs.
#[derive(Debug, Clone)]
pub enum HarvestEvent<R> {
    /// A record was harvested; `harvested` counts records so far in this run.
    Progress { record: R, harvested: usize },

    /// Something recoverable went wrong (skipped record, retried fetch).
    Warning { message: String },

    /// The run failed.
    Error {
        kind: HarvestErrorKind,
        message: String,
    },

    /// The run finished successfully.
    Completed { report: HarvestReport },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HarvestEventKind {
    Progress,
    Warning,
    Error,
    Completed,
}

impl<R> HarvestEvent<R> {
    pub fn kind(&self) -> HarvestEventKind {
        match self {
            HarvestEvent::Progress { .. } => HarvestEventKind::Progress,
            HarvestEvent::Warning { .. } => HarvestEventKind::Warning,
            HarvestEvent::Error { .. } => HarvestEventKind::Error,
            HarvestEvent::Completed { .. } => HarvestEventKind::Completed,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            HarvestEvent::Warning { message } | HarvestEvent::Error { message, .. } => {
                Some(message.as_str())
            }
            _ => None,
        }
    }
}

/// Receives harvest events.
///
/// Delivery is synchronous: the harvester calls `on_event` at the point the
/// event happens and waits for it to return, so a slow sink stalls the run.
pub trait HarvestEventSink<R>: Send + Sync {
    fn on_event(&self, event: &HarvestEvent<R>);
}

// ============================================================================
// Run Bookkeeping
// ============================================================================

/// Lifecycle of a harvester instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HarvestState {
    Idle,
    Running,
    Completed,
    Failed,
}

impl HarvestState {
    pub fn is_terminal(self) -> bool {
        matches!(self, HarvestState::Completed | HarvestState::Failed)
    }
}

impl fmt::Display for HarvestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HarvestState::Idle => "idle",
            HarvestState::Running => "running",
            HarvestState::Completed => "completed",
            HarvestState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Statistics about one harvest run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestReport {
    /// Records emitted as progress events
    pub harvested: usize,

    /// Malformed records skipped with a warning
    pub skipped: usize,

    /// Pages fetched and parsed
    pub pages: usize,

    /// Fetch attempts repeated after a transient failure
    pub retries: usize,

    /// Wall time for the run (milliseconds)
    pub duration_ms: u64,
}

/// Position a failed run can be resumed from.
///
/// The caller persists this between runs. `resumption_token` names the page
/// that was being processed, so resuming may re-emit records from that page.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestCursor {
    pub resumption_token: Option<String>,
    pub last_identifier: Option<String>,
    pub harvested: usize,
}

// ============================================================================
// Error Types
// ============================================================================

/// The external source could not provide usable data.
#[derive(Error, Debug)]
pub enum SourceError {
    /// Source cannot be reached at all
    #[error("Source '{location}' is unreachable: {reason}")]
    Unreachable { location: String, reason: String },

    /// Temporary failure worth retrying
    #[error("Transient source failure: {0}")]
    Transient(String),

    /// Fetch took longer than the configured timeout
    #[error("Fetch timed out after {0}ms")]
    Timeout(u64),

    /// Source answered with a document that cannot be used
    #[error("Source returned unusable data: {0}")]
    Malformed(String),
}

impl SourceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Transient(_) | SourceError::Timeout(_))
    }
}

/// A single harvested record is malformed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("Record is missing required field '{field}'")]
    MissingField { field: String },

    #[error("Record '{record}' has invalid '{field}': {reason}")]
    InvalidField {
        record: String,
        field: String,
        reason: String,
    },
}

/// An operation was invoked in a state that forbids it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Cannot {operation} while harvester is {state}")]
pub struct StateError {
    pub operation: &'static str,
    pub state: HarvestState,
}

/// The run was stopped through its cancel handle.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Harvest cancelled")]
pub struct CancellationError;

/// Reasons a run that has already started ends `Failed`.
///
/// Malformed records are reported as warnings and never fail a run, and a
/// [`StateError`] is returned before a run starts, so neither appears here.
#[derive(Error, Debug)]
pub enum HarvestError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Cancelled(#[from] CancellationError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HarvestErrorKind {
    Source,
    Cancelled,
}

impl HarvestError {
    pub fn kind(&self) -> HarvestErrorKind {
        match self {
            HarvestError::Source(_) => HarvestErrorKind::Source,
            HarvestError::Cancelled(_) => HarvestErrorKind::Cancelled,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_and_message() {
        let warning: HarvestEvent<()> = HarvestEvent::Warning {
            message: "skipped".to_string(),
        };
        assert_eq!(warning.kind(), HarvestEventKind::Warning);
        assert_eq!(warning.message(), Some("skipped"));

        let progress = HarvestEvent::Progress {
            record: (),
            harvested: 1,
        };
        assert_eq!(progress.kind(), HarvestEventKind::Progress);
        assert_eq!(progress.message(), None);
    }

    #[test]
    fn test_transient_classification() {
        assert!(SourceError::Timeout(5).is_transient());
        assert!(SourceError::Transient("reset".to_string()).is_transient());
        assert!(!SourceError::Malformed("bad".to_string()).is_transient());
        assert!(!SourceError::Unreachable {
            location: "x".to_string(),
            reason: "gone".to_string(),
        }
        .is_transient());
    }

    #[test]
    fn test_error_kinds_stay_distinct() {
        let cancelled = HarvestError::from(CancellationError);
        let source = HarvestError::from(SourceError::Timeout(1));
        assert_eq!(cancelled.kind(), HarvestErrorKind::Cancelled);
        assert_eq!(source.kind(), HarvestErrorKind::Source);
        assert_ne!(cancelled.kind(), source.kind());
    }

    #[test]
    fn test_state_error_message() {
        let err = StateError {
            operation: "start a harvest",
            state: HarvestState::Running,
        };
        assert_eq!(err.to_string(), "Cannot start a harvest while harvester is running");
    }

    #[test]
    fn test_cursor_serialization() {
        let cursor = HarvestCursor {
            resumption_token: Some("page-2.json".to_string()),
            last_identifier: Some("oai:x:9".to_string()),
            harvested: 9,
        };
        let json = serde_json::to_string(&cursor).unwrap();
        let back: HarvestCursor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cursor);
    }
}
