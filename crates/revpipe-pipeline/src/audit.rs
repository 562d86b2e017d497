//! Scrape staleness audit. Read-only: findings are logged, never written.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use revpipe_core::{Location, LocationStore, SourceKind, TenantContext};

use crate::queue::{Job, JobQueue};
use crate::PipelineError;

/// Spacing between consecutive per-company audits.
pub const AUDIT_SPACING: Duration = Duration::from_secs(5 * 60);

/// True when the location never scraped successfully or last did so more
/// than `stale_after` before `now`.
#[must_use]
pub fn is_stale(location: &Location, now: DateTime<Utc>, stale_after: chrono::Duration) -> bool {
    match location.last_successful_scrape_time {
        None => true,
        Some(at) => now - at > stale_after,
    }
}

#[derive(Clone)]
pub struct ScrapeAuditor {
    locations: Arc<dyn LocationStore>,
    stale_after: chrono::Duration,
}

impl ScrapeAuditor {
    #[must_use]
    pub fn new(locations: Arc<dyn LocationStore>, stale_after: chrono::Duration) -> Self {
        Self {
            locations,
            stale_after,
        }
    }

    /// Log every stale location of `company_id` for `source` and return how
    /// many were found.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Store`] if the locations cannot be listed.
    pub async fn audit_company(
        &self,
        ctx: &TenantContext,
        source: SourceKind,
        company_id: i64,
        now: DateTime<Utc>,
    ) -> Result<usize, PipelineError> {
        let locations = self
            .locations
            .list_eligible_for_company(ctx, source, company_id)
            .await?;

        let mut stale = 0;
        for location in locations.iter().filter(|l| is_stale(l, now, self.stale_after)) {
            stale += 1;
            tracing::error!(
                company_id,
                actor = ctx.actor(),
                location_id = location.id,
                location = %location.name,
                %source,
                last_success = ?location.last_successful_scrape_time,
                "audit: location has not been scraped successfully recently"
            );
        }

        tracing::info!(
            company_id,
            actor = ctx.actor(),
            %source,
            checked = locations.len(),
            stale,
            "audit: company checked"
        );
        Ok(stale)
    }

    /// Queue one audit per company with eligible locations, the first now
    /// and the rest [`AUDIT_SPACING`] apart. Returns the number queued.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Store`] if companies cannot be listed.
    pub async fn schedule_audits(
        &self,
        queue: &dyn JobQueue,
        source: SourceKind,
    ) -> Result<usize, PipelineError> {
        let companies = self
            .locations
            .list_companies_with_eligible_locations(&TenantContext::system(), source)
            .await?;

        if companies.is_empty() {
            tracing::info!(%source, "audit: no companies to audit");
            return Ok(0);
        }

        let mut delay = Duration::ZERO;
        for company_id in &companies {
            let company_id = *company_id;
            let auditor = self.clone();
            let job = Job::new(format!("audit:{source}:{company_id}"), async move {
                let ctx = TenantContext::for_company(company_id);
                if let Err(e) = auditor
                    .audit_company(&ctx, source, company_id, Utc::now())
                    .await
                {
                    tracing::error!(company_id, %source, error = %e, "audit: company audit failed");
                }
            });
            queue.schedule(job, delay);
            delay += AUDIT_SPACING;
        }

        Ok(companies.len())
    }
}
