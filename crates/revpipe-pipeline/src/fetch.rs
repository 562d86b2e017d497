//! One scrape-and-persist unit of work.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use revpipe_core::{
    Location, LocationStore, ReviewStore, SourceIdentifier, SourceKind, SummaryStore,
    TenantContext,
};
use revpipe_scraper::dates::{self, DateStyle};
use revpipe_scraper::{normalize_batch, FetchParams, NormalizeContext, ScrapeResponse, ScraperClient};

use crate::summary;

/// Calls the external scraper for one location or sub-location.
#[async_trait]
pub trait LocationFetcher: Send + Sync {
    /// `None` covers every transport, status and decode failure.
    async fn fetch(
        &self,
        source: SourceKind,
        identifier: &SourceIdentifier,
        params: &FetchParams,
    ) -> Option<ScrapeResponse>;
}

#[async_trait]
impl LocationFetcher for ScraperClient {
    async fn fetch(
        &self,
        source: SourceKind,
        identifier: &SourceIdentifier,
        params: &FetchParams,
    ) -> Option<ScrapeResponse> {
        ScraperClient::fetch(self, source, identifier, params).await
    }
}

/// Everything one unit needs to know about its target.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeUnit {
    pub location_id: i64,
    pub location_name: String,
    pub company_id: i64,
    pub source: SourceKind,
    pub identifier: SourceIdentifier,
    pub limit_per_request: u32,
    pub max_reviews: u32,
}

impl ScrapeUnit {
    /// One unit per identifier the location has for `source`.
    #[must_use]
    pub fn for_location(
        location: &Location,
        source: SourceKind,
        limit_per_request: u32,
        max_reviews: u32,
    ) -> Vec<Self> {
        location
            .source_identifiers(source)
            .into_iter()
            .map(|identifier| ScrapeUnit {
                location_id: location.id,
                location_name: location.name.clone(),
                company_id: location.company_id,
                source,
                identifier,
                limit_per_request,
                max_reviews,
            })
            .collect()
    }

    #[must_use]
    pub fn label(&self) -> String {
        format!("{}:{}:{}", self.source, self.location_id, self.identifier)
    }
}

/// Why a unit ended without persisting reviews.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum UnitFailure {
    #[error("fetch failed")]
    FetchFailed,
    #[error("scraper reported an unsuccessful response")]
    Unsuccessful,
    #[error("no reviews returned")]
    NoReviews,
    #[error("no reviews within the last 24 hours")]
    NoneRecent,
    #[error("no valid reviews to save")]
    SaveReviewsFailed,
    #[error("failed to persist reviews")]
    PersistFailed,
}

impl UnitFailure {
    /// Storage failures may succeed on a later attempt. Fetch failures are
    /// final here: the scraper client has already retried the request.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, UnitFailure::PersistFailed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOutcome {
    Persisted { reviews: u64 },
    Failed(UnitFailure),
}

/// Fetch, summarize, filter and store for one unit at a time.
#[derive(Clone)]
pub struct Ingest {
    fetcher: Arc<dyn LocationFetcher>,
    locations: Arc<dyn LocationStore>,
    reviews: Arc<dyn ReviewStore>,
    summaries: Arc<dyn SummaryStore>,
}

impl Ingest {
    #[must_use]
    pub fn new(
        fetcher: Arc<dyn LocationFetcher>,
        locations: Arc<dyn LocationStore>,
        reviews: Arc<dyn ReviewStore>,
        summaries: Arc<dyn SummaryStore>,
    ) -> Self {
        Self {
            fetcher,
            locations,
            reviews,
            summaries,
        }
    }

    #[must_use]
    pub fn locations(&self) -> &Arc<dyn LocationStore> {
        &self.locations
    }

    /// Run one unit to completion. Never panics and never propagates errors;
    /// the outcome says what happened.
    pub async fn process_location(&self, unit: &ScrapeUnit, now: DateTime<Utc>) -> UnitOutcome {
        let ctx = TenantContext::system();
        let params = FetchParams::last_24h(now, unit.limit_per_request, unit.max_reviews);

        let Some(response) = self.fetcher.fetch(unit.source, &unit.identifier, &params).await
        else {
            return self.fail(&ctx, unit, now, UnitFailure::FetchFailed).await;
        };

        if !response.is_success() {
            tracing::warn!(
                location_id = unit.location_id,
                source = %unit.source,
                identifier = %unit.identifier,
                "fetch: scraper reported failure"
            );
            return self.fail(&ctx, unit, now, UnitFailure::Unsuccessful).await;
        }

        let records = response.reviews();
        if records.is_empty() {
            tracing::warn!(
                location_id = unit.location_id,
                source = %unit.source,
                identifier = %unit.identifier,
                "fetch: no reviews returned"
            );
            return self.fail(&ctx, unit, now, UnitFailure::NoReviews).await;
        }

        let upsert = summary::summary_from_response(
            unit.location_id,
            unit.company_id,
            &response,
            now.date_naive(),
        );
        summary::upsert_summary(self.summaries.as_ref(), &ctx, &upsert).await;

        let style = DateStyle::from(unit.source);
        let recent: Vec<_> = records
            .into_iter()
            .filter(|r| dates::is_within_last_24h(r.date_text(), style, now))
            .collect();
        if recent.is_empty() {
            tracing::info!(
                location_id = unit.location_id,
                source = %unit.source,
                "fetch: nothing recent to ingest"
            );
            return self.fail(&ctx, unit, now, UnitFailure::NoneRecent).await;
        }

        let normalize_ctx = NormalizeContext {
            location_id: unit.location_id,
            location_name: &unit.location_name,
            company_id: unit.company_id,
        };
        let Ok(new_reviews) = normalize_batch(&recent, &normalize_ctx, now) else {
            return self
                .fail(&ctx, unit, now, UnitFailure::SaveReviewsFailed)
                .await;
        };

        let inserted = match self.reviews.insert_reviews(&ctx, &new_reviews).await {
            Ok(n) => n,
            Err(e) => {
                tracing::error!(
                    location_id = unit.location_id,
                    source = %unit.source,
                    error = %e,
                    "fetch: failed to persist reviews"
                );
                return self.fail(&ctx, unit, now, UnitFailure::PersistFailed).await;
            }
        };

        self.record_times(&ctx, unit, now, Some(now)).await;
        tracing::info!(
            location_id = unit.location_id,
            source = %unit.source,
            identifier = %unit.identifier,
            reviews = inserted,
            "fetch: reviews ingested"
        );
        UnitOutcome::Persisted { reviews: inserted }
    }

    async fn fail(
        &self,
        ctx: &TenantContext,
        unit: &ScrapeUnit,
        now: DateTime<Utc>,
        failure: UnitFailure,
    ) -> UnitOutcome {
        self.record_times(ctx, unit, now, None).await;
        UnitOutcome::Failed(failure)
    }

    async fn record_times(
        &self,
        ctx: &TenantContext,
        unit: &ScrapeUnit,
        attempted_at: DateTime<Utc>,
        succeeded_at: Option<DateTime<Utc>>,
    ) {
        if let Err(e) = self
            .locations
            .record_scrape_times(ctx, unit.location_id, attempted_at, succeeded_at)
            .await
        {
            tracing::error!(
                location_id = unit.location_id,
                error = %e,
                "fetch: failed to record scrape times"
            );
        }
    }
}

#[cfg(test)]
#[path = "fetch_test.rs"]
mod tests;
