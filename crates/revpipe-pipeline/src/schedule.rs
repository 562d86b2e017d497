//! Time-distributed scrape runs.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use revpipe_core::{SourceKind, TenantContext};

use crate::fetch::{Ingest, ScrapeUnit};
use crate::queue::{Job, JobQueue, RetryPolicy};
use crate::PipelineError;

/// Delay for each of `total` units spread evenly over `window`.
///
/// Unit `k` starts after `k * window / total`; a single unit starts at once.
#[must_use]
pub fn distribution_delays(total: usize, window: Duration) -> Vec<Duration> {
    if total <= 1 {
        return vec![Duration::ZERO; total];
    }
    let Ok(total_u32) = u32::try_from(total) else {
        return vec![Duration::ZERO; total];
    };
    let interval = window / total_u32;
    (0..total_u32).map(|k| interval * k).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub source: SourceKind,
    pub locations: usize,
    pub dispatched: usize,
}

pub struct ScrapeScheduler {
    ingest: Arc<Ingest>,
    queue: Arc<dyn JobQueue>,
    retry: RetryPolicy,
    window: Duration,
}

impl ScrapeScheduler {
    #[must_use]
    pub fn new(
        ingest: Arc<Ingest>,
        queue: Arc<dyn JobQueue>,
        retry: RetryPolicy,
        window: Duration,
    ) -> Self {
        Self {
            ingest,
            queue,
            retry,
            window,
        }
    }

    /// Enumerate eligible locations for `source` and queue one unit per
    /// identifier, spread across the distribution window.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Store`] if locations cannot be listed. Unit
    /// failures are handled inside each unit and never surface here.
    pub async fn schedule_run(
        &self,
        source: SourceKind,
        limit_per_request: u32,
        max_reviews: u32,
    ) -> Result<RunReport, PipelineError> {
        let locations = self
            .ingest
            .locations()
            .list_scrape_eligible(&TenantContext::system(), source)
            .await?;

        let units: Vec<ScrapeUnit> = locations
            .iter()
            .flat_map(|loc| ScrapeUnit::for_location(loc, source, limit_per_request, max_reviews))
            .collect();

        if units.is_empty() {
            tracing::info!(%source, "scheduler: no locations to scrape");
            return Ok(RunReport {
                source,
                locations: locations.len(),
                dispatched: 0,
            });
        }

        let delays = distribution_delays(units.len(), self.window);
        let dispatched = units.len();
        for (unit, delay) in units.into_iter().zip(delays) {
            let label = unit.label();
            let ingest = Arc::clone(&self.ingest);
            let retry = self.retry;
            let job_label = label.clone();
            let job = Job::new(label, async move {
                retry
                    .run(&job_label, || ingest.process_location(&unit, Utc::now()))
                    .await;
            });
            self.queue.schedule(job, delay);
        }

        tracing::info!(
            %source,
            locations = locations.len(),
            units = dispatched,
            window_secs = self.window.as_secs(),
            "scheduler: scrape run queued"
        );
        Ok(RunReport {
            source,
            locations: locations.len(),
            dispatched,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryStore, StaticFetcher, StoreOp};
    use crate::queue::InlineQueue;
    use revpipe_core::Location;

    const MINUTE: Duration = Duration::from_secs(60);

    fn location(id: i64, talabat: Vec<i32>, instashop: Option<&str>) -> Location {
        Location {
            id,
            company_id: 1,
            name: format!("loc-{id}"),
            is_active: true,
            instashop_client_id: instashop.map(str::to_string),
            talabat_location_ids: talabat,
            last_scrape_attempt_time: None,
            last_successful_scrape_time: None,
        }
    }

    fn scheduler(
        store: &Arc<MemoryStore>,
        fetcher: &Arc<StaticFetcher>,
        queue: &Arc<InlineQueue>,
    ) -> ScrapeScheduler {
        let ingest = Ingest::new(
            fetcher.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
        );
        ScrapeScheduler::new(
            Arc::new(ingest),
            queue.clone(),
            RetryPolicy::new(2, Duration::ZERO),
            30 * MINUTE,
        )
    }

    #[test]
    fn five_jobs_spread_over_thirty_minutes() {
        let delays = distribution_delays(5, 30 * MINUTE);
        assert_eq!(
            delays,
            vec![
                Duration::ZERO,
                6 * MINUTE,
                12 * MINUTE,
                18 * MINUTE,
                24 * MINUTE
            ]
        );
    }

    #[test]
    fn single_job_runs_immediately() {
        assert_eq!(distribution_delays(1, 30 * MINUTE), vec![Duration::ZERO]);
        assert!(distribution_delays(0, 30 * MINUTE).is_empty());
    }

    #[tokio::test]
    async fn talabat_run_queues_one_unit_per_sub_location() {
        let store = Arc::new(MemoryStore::with_locations(vec![
            location(1, vec![10, 11], None),
            location(2, vec![12], Some("c-2")),
            location(3, vec![], Some("c-3")),
        ]));
        let fetcher = Arc::new(StaticFetcher::new());
        let queue = Arc::new(InlineQueue::new());

        let report = scheduler(&store, &fetcher, &queue)
            .schedule_run(SourceKind::Talabat, 5, 100)
            .await
            .unwrap();

        assert_eq!(report.locations, 2);
        assert_eq!(report.dispatched, 3);
        assert_eq!(
            queue.delays(),
            vec![Duration::ZERO, 10 * MINUTE, 20 * MINUTE]
        );
        assert_eq!(
            queue.names(),
            vec!["talabat:1:10", "talabat:1:11", "talabat:2:12"]
        );
    }

    #[tokio::test]
    async fn instashop_run_skips_blank_client_ids() {
        let store = Arc::new(MemoryStore::with_locations(vec![
            location(1, vec![10], Some("  ")),
            location(2, vec![], Some("c-2")),
        ]));
        let fetcher = Arc::new(StaticFetcher::new());
        let queue = Arc::new(InlineQueue::new());

        let report = scheduler(&store, &fetcher, &queue)
            .schedule_run(SourceKind::Instashop, 20, 50)
            .await
            .unwrap();

        assert_eq!(report.dispatched, 1);
        assert_eq!(queue.names(), vec!["instashop:2:c-2"]);
    }

    #[tokio::test]
    async fn no_locations_is_not_an_error() {
        let store = Arc::new(MemoryStore::new());
        let fetcher = Arc::new(StaticFetcher::new());
        let queue = Arc::new(InlineQueue::new());

        let report = scheduler(&store, &fetcher, &queue)
            .schedule_run(SourceKind::Talabat, 5, 100)
            .await
            .unwrap();

        assert_eq!(report.dispatched, 0);
        assert!(queue.delays().is_empty());
    }

    #[tokio::test]
    async fn enumeration_failure_is_returned() {
        let store = Arc::new(MemoryStore::new());
        store.fail_on(StoreOp::ListLocations, true);
        let fetcher = Arc::new(StaticFetcher::new());
        let queue = Arc::new(InlineQueue::new());

        let result = scheduler(&store, &fetcher, &queue)
            .schedule_run(SourceKind::Talabat, 5, 100)
            .await;

        assert!(matches!(result, Err(PipelineError::Store(_))));
    }

    #[tokio::test]
    async fn failing_units_do_not_affect_siblings() {
        let store = Arc::new(MemoryStore::with_locations(vec![
            location(1, vec![10], None),
            location(2, vec![20], None),
        ]));
        let fetcher = Arc::new(StaticFetcher::new());
        let queue = Arc::new(InlineQueue::new());

        scheduler(&store, &fetcher, &queue)
            .schedule_run(SourceKind::Talabat, 5, 100)
            .await
            .unwrap();
        assert_eq!(queue.drain().await, 2);

        // Every fetch fails; each unit is fetched once and records its attempt.
        assert_eq!(fetcher.calls(), 2);
        for id in [1, 2] {
            let loc = store.location(id).unwrap();
            assert!(loc.last_scrape_attempt_time.is_some());
            assert!(loc.last_successful_scrape_time.is_none());
        }
    }
}
