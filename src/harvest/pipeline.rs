//! Harvest run coordinator.
//!
//! This module provides the [`Harvester`] that drives one source through the
//! fetch → parse → emit cycle with:
//! - Async execution via `tokio`
//! - Per-fetch timeouts and bounded retries for transient failures
//! - Structured logging via `tracing`
//! - A state machine (`Idle → Running → Completed | Failed`) that always
//!   resolves, even if the run future is dropped midway (`Drop` on `RunGuard`)

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Instant;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, instrument, warn};

use crate::config::HarvestConfig;
use crate::harvest::traits::{
    CancellationError, HarvestCursor, HarvestError, HarvestEvent, HarvestEventSink, HarvestItem,
    HarvestReport, HarvestState, RecordParser, SourceError, StateError, Transport,
};

/// Shared sink handle for records of type `R`.
pub type SharedSink<R> = Arc<dyn HarvestEventSink<R>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Cancellation
// ============================================================================

/// Cloneable flag that stops the in-flight run of one harvester.
///
/// The flag is checked between page fetches and between records. A cancelled
/// run ends `Failed` and reports [`CancellationError`].
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ============================================================================
// Run Guard
// ============================================================================

/// Holds the harvester in `Running` for the duration of a run.
///
/// If the run future is dropped before [`RunGuard::finish`] is called, `Drop`
/// moves the state to `Failed` so the harvester never stays `Running`.
struct RunGuard<'a> {
    state: &'a Mutex<HarvestState>,
    resolved: bool,
}

impl RunGuard<'_> {
    fn finish(mut self, terminal: HarvestState) {
        *lock(self.state) = terminal;
        self.resolved = true;
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if !self.resolved {
            *lock(self.state) = HarvestState::Failed;
            warn!("Harvest run abandoned before completion; marking failed");
        }
    }
}

// ============================================================================
// Harvester
// ============================================================================

/// Pulls records from one source and reports them through an event sink.
///
/// # Lifecycle
///
/// A new harvester is `Idle`. [`start_harvest`](Harvester::start_harvest)
/// moves it to `Running` and always leaves it `Completed` or `Failed`. A
/// terminal harvester must be [`reset`](Harvester::reset) before it can run
/// again. Runs on one instance never overlap: a second call while running
/// fails fast with [`StateError`].
///
/// # Failure Semantics
///
/// - A malformed record is skipped and reported as a warning.
/// - Transient fetch failures are retried up to `max_retries` times, each
///   retry reported as a warning.
/// - An unreachable source, an unusable document, exhausted retries or
///   cancellation fail the run; one error event is emitted.
///
/// # Example
///
/// ```ignore
/// let harvester = Harvester::new(FileTransport, JsonFeedParser)
///     .with_config(HarvestConfig::default().with_max_retries(5));
/// harvester.set_source("/data/feed/page-1.json")?;
/// harvester.set_harvest_event(Some(Arc::new(StoringSink::new(store))));
/// let completed = harvester.start_harvest().await?;
/// ```
pub struct Harvester<T, P>
where
    T: Transport,
    P: RecordParser,
{
    transport: T,
    parser: P,
    config: HarvestConfig,
    source: Mutex<String>,
    state: Mutex<HarvestState>,
    sink: RwLock<Option<SharedSink<P::Record>>>,
    cursor: Mutex<HarvestCursor>,
    resume: Mutex<Option<HarvestCursor>>,
    last_report: Mutex<Option<HarvestReport>>,
    cancel: CancelHandle,
}

impl<T, P> Harvester<T, P>
where
    T: Transport,
    P: RecordParser,
{
    /// Creates an idle harvester with default configuration and no source.
    pub fn new(transport: T, parser: P) -> Self {
        Self {
            transport,
            parser,
            config: HarvestConfig::default(),
            source: Mutex::new(String::new()),
            state: Mutex::new(HarvestState::Idle),
            sink: RwLock::new(None),
            cursor: Mutex::new(HarvestCursor::default()),
            resume: Mutex::new(None),
            last_report: Mutex::new(None),
            cancel: CancelHandle::default(),
        }
    }

    pub fn with_config(mut self, config: HarvestConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_source(self, source: impl Into<String>) -> Self {
        *lock(&self.source) = source.into();
        self
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    pub fn state(&self) -> HarvestState {
        *lock(&self.state)
    }

    pub fn source(&self) -> String {
        lock(&self.source).clone()
    }

    /// Replaces the source. Not validated until the next run.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] while a run is in progress.
    pub fn set_source(&self, source: impl Into<String>) -> Result<(), StateError> {
        let state = lock(&self.state);
        if *state == HarvestState::Running {
            return Err(StateError {
                operation: "change the source",
                state: *state,
            });
        }
        *lock(&self.source) = source.into();
        Ok(())
    }

    /// Attaches (or with `None`, detaches) the event sink. Takes effect for
    /// the next event emitted, even mid-run.
    pub fn set_harvest_event(&self, sink: Option<SharedSink<P::Record>>) {
        *self.sink.write().unwrap_or_else(PoisonError::into_inner) = sink;
    }

    pub fn harvest_event(&self) -> Option<SharedSink<P::Record>> {
        self.sink
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Position reached by the most recent run.
    pub fn cursor(&self) -> HarvestCursor {
        lock(&self.cursor).clone()
    }

    pub fn last_report(&self) -> Option<HarvestReport> {
        lock(&self.last_report).clone()
    }

    /// Seeds the next run with a cursor saved from an earlier one.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] while a run is in progress.
    pub fn resume_from(&self, cursor: HarvestCursor) -> Result<(), StateError> {
        let state = lock(&self.state);
        if *state == HarvestState::Running {
            return Err(StateError {
                operation: "set a resume cursor",
                state: *state,
            });
        }
        *lock(&self.resume) = Some(cursor);
        Ok(())
    }

    /// Returns a finished harvester to `Idle`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] while a run is in progress.
    pub fn reset(&self) -> Result<(), StateError> {
        let mut state = lock(&self.state);
        if *state == HarvestState::Running {
            return Err(StateError {
                operation: "reset",
                state: *state,
            });
        }
        *state = HarvestState::Idle;
        Ok(())
    }

    /// Runs one harvest against the configured source.
    ///
    /// Returns `Ok(true)` when the run completes and `Ok(false)` when it
    /// fails; failure detail goes to the event sink. Nothing raised inside the
    /// run propagates past this call.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] without starting a run if the harvester is not
    /// `Idle`.
    #[instrument(
        skip(self),
        fields(transport = self.transport.name(), format = self.parser.format_name())
    )]
    pub async fn start_harvest(&self) -> Result<bool, StateError> {
        let guard = self.begin()?;

        let source = self.source();
        let started = Instant::now();
        let mut report = HarvestReport::default();

        info!(source = %source, "Starting harvest");
        let outcome = self.run(&source, &mut report).await;
        report.duration_ms = started.elapsed().as_millis() as u64;

        let terminal = match outcome {
            Ok(()) => {
                info!(
                    harvested = report.harvested,
                    skipped = report.skipped,
                    pages = report.pages,
                    duration_ms = report.duration_ms,
                    "Harvest completed"
                );
                self.emit(HarvestEvent::Completed {
                    report: report.clone(),
                });
                HarvestState::Completed
            }
            Err(err) => {
                error!(
                    kind = ?err.kind(),
                    error = %err,
                    harvested = report.harvested,
                    "Harvest failed"
                );
                self.emit(HarvestEvent::Error {
                    kind: err.kind(),
                    message: err.to_string(),
                });
                HarvestState::Failed
            }
        };

        *lock(&self.last_report) = Some(report);
        guard.finish(terminal);
        Ok(terminal == HarvestState::Completed)
    }

    fn begin(&self) -> Result<RunGuard<'_>, StateError> {
        let mut state = lock(&self.state);
        if *state != HarvestState::Idle {
            return Err(StateError {
                operation: "start a harvest",
                state: *state,
            });
        }
        // Cleared under the state lock so a cancel issued once `Running` is
        // observable always reaches this run.
        self.cancel.clear();
        *state = HarvestState::Running;
        Ok(RunGuard {
            state: &self.state,
            resolved: false,
        })
    }

    async fn run(&self, source: &str, report: &mut HarvestReport) -> Result<(), HarvestError> {
        if source.trim().is_empty() {
            return Err(SourceError::Unreachable {
                location: source.to_string(),
                reason: "no source configured".to_string(),
            }
            .into());
        }

        let seed = lock(&self.resume).take().unwrap_or_default();
        let mut token = seed.resumption_token.clone();
        if token.is_some() {
            info!(token = ?token, harvested = seed.harvested, "Resuming from saved cursor");
        }
        *lock(&self.cursor) = seed;

        loop {
            self.check_cancelled()?;
            if report.pages >= self.config.max_pages {
                warn!(max_pages = self.config.max_pages, "Page limit reached");
                self.emit(HarvestEvent::Warning {
                    message: format!(
                        "stopped after {} pages; resumption token left unfollowed",
                        report.pages
                    ),
                });
                break;
            }

            let document = self.fetch_with_retry(source, token.as_deref(), report).await?;
            let page = self.parser.parse_page(&document)?;
            report.pages += 1;
            debug!(
                page = report.pages,
                records = page.records.len(),
                bytes = document.len(),
                "Parsed page"
            );

            for entry in page.records {
                self.check_cancelled()?;
                match entry {
                    Ok(record) => {
                        report.harvested += 1;
                        {
                            let mut cursor = lock(&self.cursor);
                            cursor.last_identifier = Some(record.record_id());
                            cursor.harvested += 1;
                        }
                        self.emit(HarvestEvent::Progress {
                            record,
                            harvested: report.harvested,
                        });
                    }
                    Err(err) => {
                        report.skipped += 1;
                        warn!(error = %err, "Skipping malformed record");
                        self.emit(HarvestEvent::Warning {
                            message: err.to_string(),
                        });
                    }
                }
            }

            match page.resumption_token {
                Some(next) if !next.is_empty() => {
                    lock(&self.cursor).resumption_token = Some(next.clone());
                    token = Some(next);
                }
                _ => {
                    lock(&self.cursor).resumption_token = None;
                    break;
                }
            }
        }

        Ok(())
    }

    async fn fetch_with_retry(
        &self,
        source: &str,
        token: Option<&str>,
        report: &mut HarvestReport,
    ) -> Result<Vec<u8>, HarvestError> {
        let mut attempt: u32 = 0;
        loop {
            let fetched = timeout(self.config.fetch_timeout(), self.transport.fetch(source, token))
                .await
                .unwrap_or(Err(SourceError::Timeout(self.config.fetch_timeout_ms)));

            match fetched {
                Ok(document) => return Ok(document),
                Err(err) if err.is_transient() && attempt < self.config.max_retries => {
                    attempt += 1;
                    report.retries += 1;
                    warn!(attempt, error = %err, "Transient fetch failure, retrying");
                    self.emit(HarvestEvent::Warning {
                        message: format!("fetch attempt {attempt} failed: {err}; retrying"),
                    });
                    sleep(self.config.retry_backoff() * attempt).await;
                    self.check_cancelled()?;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn check_cancelled(&self) -> Result<(), CancellationError> {
        if self.cancel.is_cancelled() {
            Err(CancellationError)
        } else {
            Ok(())
        }
    }

    fn emit(&self, event: HarvestEvent<P::Record>) {
        let sink = self.harvest_event();
        match sink {
            Some(sink) => sink.on_event(&event),
            None => debug!(kind = ?event.kind(), "No event sink attached; dropping event"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
