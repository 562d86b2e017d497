//! Scrape and audit command handlers.
//!
//! Both run their jobs on an [`InlineQueue`] so the whole run happens in
//! this process, one location at a time, with distribution delays ignored.

use std::sync::Arc;
use std::time::Duration;

use revpipe_core::{AppConfig, Location, LocationStore, SourceKind, TenantContext};
use revpipe_db::PgStore;
use revpipe_pipeline::{
    Ingest, InlineQueue, RetryPolicy, ScrapeAuditor, ScrapeScheduler, ScrapeUnit,
};
use revpipe_scraper::ScraperClient;

#[derive(Debug, Clone, Copy)]
pub(crate) struct Limits {
    pub per_request: u32,
    pub max_reviews: u32,
}

/// The units a scrape run over `locations` would queue, in order.
pub(crate) fn plan_units(
    locations: &[Location],
    source: SourceKind,
    limits: Limits,
) -> Vec<ScrapeUnit> {
    locations
        .iter()
        .flat_map(|location| {
            ScrapeUnit::for_location(location, source, limits.per_request, limits.max_reviews)
        })
        .collect()
}

/// Scrape every eligible location for `source`.
///
/// When `dry_run` is `true` the scrape units are printed and nothing is
/// fetched or written.
///
/// # Errors
///
/// Returns an error if the scraper client cannot be built or the eligible
/// locations cannot be listed. Per-location failures are logged by the
/// pipeline and do not abort the run.
pub(crate) async fn run_scrape(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    source: SourceKind,
    limits: Limits,
    dry_run: bool,
) -> anyhow::Result<()> {
    let store = Arc::new(PgStore::new(pool.clone()));

    if dry_run {
        let locations = store
            .list_scrape_eligible(&TenantContext::system(), source)
            .await?;
        let units = plan_units(&locations, source, limits);
        println!(
            "dry-run: would scrape {} units across {} {source} locations",
            units.len(),
            locations.len()
        );
        for unit in &units {
            println!("  {}", unit.label());
        }
        return Ok(());
    }

    let client = ScraperClient::from_config(config)
        .map_err(|e| anyhow::anyhow!("failed to build scraper client: {e}"))?;
    let ingest = Arc::new(Ingest::new(
        Arc::new(client),
        store.clone(),
        store.clone(),
        store,
    ));
    let queue = Arc::new(InlineQueue::new());
    let retry = RetryPolicy::new(
        config.job_max_attempts,
        Duration::from_secs(config.scraper_retry_backoff_base_secs),
    );
    let scheduler = ScrapeScheduler::new(ingest, queue.clone(), retry, Duration::ZERO);

    let report = scheduler
        .schedule_run(source, limits.per_request, limits.max_reviews)
        .await?;
    let ran = queue.drain().await;
    println!(
        "scrape {source}: {} locations, {} units queued, {ran} units run",
        report.locations, report.dispatched
    );
    Ok(())
}

/// Audit every company with eligible locations for `source`, logging each
/// location whose last successful scrape is stale. Nothing is written.
///
/// # Errors
///
/// Returns an error if the companies cannot be listed.
pub(crate) async fn run_audit(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    source: SourceKind,
) -> anyhow::Result<()> {
    let store = Arc::new(PgStore::new(pool.clone()));
    let auditor = ScrapeAuditor::new(store, chrono::Duration::hours(config.stale_after_hours));
    let queue = InlineQueue::new();

    let companies = auditor.schedule_audits(&queue, source).await?;
    queue.drain().await;
    println!("audit {source}: {companies} companies audited");
    Ok(())
}
