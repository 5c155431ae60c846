use crate::harvest::{Harvester, RecordParser, StateError, Transport};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{info, instrument};

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Harvester refused to start: {0}")]
    State(#[from] StateError),
    #[error("Executor semaphore closed: {0}")]
    Closed(String),
    #[error("Harvest task panicked or was aborted: {0}")]
    Join(String),
}

/// Runs independent harvesters concurrently, at most `concurrency_limit` at a time.
pub struct HarvestExecutor {
    semaphore: Arc<Semaphore>,
}

impl HarvestExecutor {
    pub fn new(concurrency_limit: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(concurrency_limit.max(1))),
        }
    }

    #[instrument(skip(self, harvester), fields(source = %harvester.source()))]
    pub async fn execute<T, P>(
        &self,
        harvester: Arc<Harvester<T, P>>,
    ) -> Result<bool, ExecutorError>
    where
        T: Transport + 'static,
        P: RecordParser + 'static,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| ExecutorError::Closed(e.to_string()))?;

        info!("Starting harvest");
        let completed = harvester.start_harvest().await?;
        info!(completed, "Finished harvest");
        Ok(completed)
    }

    /// Spawns every harvester on the runtime and waits for all of them.
    /// Results come back in input order.
    pub async fn execute_all<T, P>(
        &self,
        harvesters: Vec<Arc<Harvester<T, P>>>,
    ) -> Vec<Result<bool, ExecutorError>>
    where
        T: Transport + 'static,
        P: RecordParser + 'static,
    {
        let handles: Vec<_> = harvesters
            .into_iter()
            .map(|harvester| {
                let semaphore = self.semaphore.clone();
                tokio::spawn(async move {
                    let _permit = match semaphore.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(e) => return Err(ExecutorError::Closed(e.to_string())),
                    };
                    harvester.start_harvest().await.map_err(ExecutorError::from)
                })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(match handle.await {
                Ok(outcome) => outcome,
                Err(e) => Err(ExecutorError::Join(e.to_string())),
            });
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harvest::{HarvestItem, HarvestState, ParsedPage, SourceError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Unit;

    impl HarvestItem for Unit {
        fn record_id(&self) -> String {
            "unit".to_string()
        }
    }

    struct CountParser;

    impl RecordParser for CountParser {
        type Record = Unit;

        fn format_name(&self) -> &'static str {
            "count"
        }

        fn parse_page(&self, document: &[u8]) -> Result<ParsedPage<Unit>, SourceError> {
            Ok(ParsedPage {
                records: document.iter().map(|_| Ok(Unit)).collect(),
                resumption_token: None,
            })
        }
    }

    /// Tracks the peak number of fetches in flight.
    struct SlowTransport {
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Transport for SlowTransport {
        fn name(&self) -> &str {
            "slow"
        }

        async fn fetch(&self, source: &str, _token: Option<&str>) -> Result<Vec<u8>, SourceError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            if source == "down" {
                return Err(SourceError::Unreachable {
                    location: source.to_string(),
                    reason: "offline".to_string(),
                });
            }
            Ok(vec![0u8; 3])
        }
    }

    #[tokio::test]
    async fn test_execute_all_respects_limit() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let harvesters: Vec<_> = ["a", "down", "c", "d"]
            .into_iter()
            .map(|source| {
                let transport = SlowTransport {
                    active: active.clone(),
                    peak: peak.clone(),
                };
                Arc::new(Harvester::new(transport, CountParser).with_source(source))
            })
            .collect();

        let executor = HarvestExecutor::new(2);
        let results = executor.execute_all(harvesters.clone()).await;

        let outcomes: Vec<bool> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(outcomes, vec![true, false, true, true]);
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(harvesters[1].state(), HarvestState::Failed);
        assert_eq!(harvesters[0].last_report().unwrap().harvested, 3);
    }

    #[tokio::test]
    async fn test_execute_reports_state_error() {
        let transport = SlowTransport {
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        };
        let harvester = Arc::new(Harvester::new(transport, CountParser).with_source("a"));
        let executor = HarvestExecutor::new(1);

        assert!(executor.execute(harvester.clone()).await.unwrap());
        assert!(matches!(
            executor.execute(harvester).await,
            Err(ExecutorError::State(_))
        ));
    }
}
