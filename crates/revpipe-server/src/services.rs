//! Wiring of the pipeline components over Postgres and the scraper client.

use std::sync::Arc;
use std::time::Duration;

use revpipe_bus::RoutingKeys;
use revpipe_core::AppConfig;
use revpipe_db::{PgInbox, PgOutbox, PgStore};
use revpipe_pipeline::{
    build_registry, Dispatcher, InboxPoller, Ingest, RetryPolicy, ScrapeAuditor, ScrapeScheduler,
    SummaryPublisher, TokioJobQueue,
};
use revpipe_scraper::{ScraperClient, ScraperError};
use sqlx::PgPool;

pub struct Services {
    pub scrape: ScrapeScheduler,
    pub auditor: ScrapeAuditor,
    pub summaries: SummaryPublisher,
    pub dispatcher: Dispatcher,
    pub inbox: InboxPoller,
    pub queue: Arc<TokioJobQueue>,
}

impl Services {
    /// # Errors
    ///
    /// Returns [`ScraperError`] if the HTTP client cannot be built.
    pub fn build(pool: PgPool, config: &AppConfig) -> Result<Self, ScraperError> {
        let store = Arc::new(PgStore::new(pool.clone()));
        let outbox = Arc::new(PgOutbox::new(pool.clone()));
        let fetcher = Arc::new(ScraperClient::from_config(config)?);
        let keys = RoutingKeys::new(&config.bus_routing_key);
        let queue = Arc::new(TokioJobQueue);

        let ingest = Arc::new(Ingest::new(
            fetcher,
            store.clone(),
            store.clone(),
            store.clone(),
        ));
        let retry = RetryPolicy::new(
            config.job_max_attempts,
            Duration::from_secs(config.scraper_retry_backoff_base_secs),
        );
        let window = Duration::from_secs(config.job_distribution_minutes * 60);

        Ok(Self {
            scrape: ScrapeScheduler::new(ingest, queue.clone(), retry, window),
            auditor: ScrapeAuditor::new(
                store.clone(),
                chrono::Duration::hours(config.stale_after_hours),
            ),
            summaries: SummaryPublisher::new(store.clone(), outbox.clone(), keys.clone()),
            dispatcher: Dispatcher::new(
                store.clone(),
                outbox,
                keys,
                config.dispatch_batch_size,
            ),
            inbox: InboxPoller::new(
                Arc::new(PgInbox::new(pool)),
                Arc::new(build_registry(store)),
            ),
            queue,
        })
    }
}
