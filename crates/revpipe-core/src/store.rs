//! Persistence seams used by the pipeline.
//!
//! Every call takes a [`TenantContext`]; implementations filter by the
//! context's company when one is set.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::domain::{Location, NewReview, Review, SourceKind, SourceReviewSummary, SummaryUpsert};
use crate::tenant::TenantContext;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("store backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StoreError::Backend(Box::new(err))
    }
}

#[async_trait]
pub trait LocationStore: Send + Sync {
    /// Active locations with at least one identifier for `source`.
    async fn list_scrape_eligible(
        &self,
        ctx: &TenantContext,
        source: SourceKind,
    ) -> Result<Vec<Location>, StoreError>;

    /// Distinct companies owning at least one scrape-eligible location for `source`.
    async fn list_companies_with_eligible_locations(
        &self,
        ctx: &TenantContext,
        source: SourceKind,
    ) -> Result<Vec<i64>, StoreError>;

    /// Scrape-eligible locations for `source` owned by `company_id`.
    async fn list_eligible_for_company(
        &self,
        ctx: &TenantContext,
        source: SourceKind,
        company_id: i64,
    ) -> Result<Vec<Location>, StoreError>;

    /// Always sets the attempt time; sets the success time only when given.
    async fn record_scrape_times(
        &self,
        ctx: &TenantContext,
        location_id: i64,
        attempted_at: DateTime<Utc>,
        succeeded_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ReviewStore: Send + Sync {
    /// Returns the number of rows written.
    async fn insert_reviews(
        &self,
        ctx: &TenantContext,
        reviews: &[NewReview],
    ) -> Result<u64, StoreError>;

    /// Oldest unprocessed reviews first, at most `limit`.
    async fn fetch_unprocessed(
        &self,
        ctx: &TenantContext,
        limit: usize,
    ) -> Result<Vec<Review>, StoreError>;

    /// Returns the number of rows flipped from unprocessed to processed.
    async fn mark_processed(&self, ctx: &TenantContext, ids: &[i64]) -> Result<u64, StoreError>;

    /// Returns `false` when no review with `review_id` is visible.
    async fn record_acknowledgement(
        &self,
        ctx: &TenantContext,
        review_id: i64,
        received_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait SummaryStore: Send + Sync {
    /// Insert or overwrite the row keyed by (location, day, source).
    async fn upsert_summary(
        &self,
        ctx: &TenantContext,
        summary: &SummaryUpsert,
    ) -> Result<SourceReviewSummary, StoreError>;

    async fn list_summaries_since(
        &self,
        ctx: &TenantContext,
        since: NaiveDate,
    ) -> Result<Vec<SourceReviewSummary>, StoreError>;
}
