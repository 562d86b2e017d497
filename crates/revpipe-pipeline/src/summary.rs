//! Daily per-location summary maintenance.

use chrono::NaiveDate;
use revpipe_core::{SourceReviewSummary, SummaryStore, SummaryUpsert, TenantContext};
use revpipe_scraper::ScrapeResponse;

/// Builds the summary upsert for one scrape response.
#[must_use]
pub fn summary_from_response(
    location_id: i64,
    company_id: i64,
    response: &ScrapeResponse,
    as_of: NaiveDate,
) -> SummaryUpsert {
    let (avg_rating, total_responses) = response.summary_figures();
    SummaryUpsert {
        location_id,
        company_id,
        source: response.source(),
        avg_rating,
        total_responses,
        as_of,
    }
}

/// Insert or overwrite the day's summary row.
///
/// Failures are logged and reported as `None`; they never fail ingestion.
pub async fn upsert_summary(
    store: &dyn SummaryStore,
    ctx: &TenantContext,
    summary: &SummaryUpsert,
) -> Option<SourceReviewSummary> {
    match store.upsert_summary(ctx, summary).await {
        Ok(row) => {
            tracing::debug!(
                location_id = summary.location_id,
                source = %summary.source,
                total = summary.total_responses,
                "summary: upserted"
            );
            Some(row)
        }
        Err(e) => {
            tracing::warn!(
                location_id = summary.location_id,
                source = %summary.source,
                actor = ctx.actor(),
                error = %e,
                "summary: upsert failed"
            );
            None
        }
    }
}
