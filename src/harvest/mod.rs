//! Harvest module - pull-based metadata harvesting.
//!
//! This module provides the core abstractions for the harvester:
//! - **Traits**: [`Transport`], [`RecordParser`], [`HarvestEventSink`] for assembling harvesters
//! - **Events**: Progress, warning, error and completion notifications via [`HarvestEvent`]
//! - **Errors**: Standardized error kinds for runs and records
//! - **Pipeline**: Run state machine via [`pipeline::Harvester`]
//! - **Formats**: Concrete parsers in [`formats`]

pub mod formats;
pub mod pipeline;
pub mod traits;
pub mod transport;

// Re-export commonly used types
pub use traits::{
    CancellationError, HarvestCursor, HarvestError, HarvestErrorKind, HarvestEvent,
    HarvestEventKind, HarvestEventSink, HarvestItem, HarvestReport, HarvestState, ParsedPage,
    RecordError, RecordParser, SourceError, StateError, Transport,
};

pub use formats::{JsonFeedParser, UsageFeedParser};
pub use pipeline::{CancelHandle, Harvester, SharedSink};
pub use transport::FileTransport;
