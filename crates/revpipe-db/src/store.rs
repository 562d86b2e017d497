//! Postgres implementation of the core store traits.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use revpipe_core::{
    Location, LocationStore, NewReview, Review, ReviewStore, SourceKind, SourceReviewSummary,
    StoreError, SummaryStore, SummaryUpsert, TenantContext,
};
use sqlx::PgPool;

use crate::{locations, reviews, summaries, DbError};

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound => StoreError::NotFound("row".to_string()),
            other => StoreError::backend(other),
        }
    }
}

#[async_trait]
impl LocationStore for PgStore {
    async fn list_scrape_eligible(
        &self,
        ctx: &TenantContext,
        source: SourceKind,
    ) -> Result<Vec<Location>, StoreError> {
        let rows =
            locations::list_scrape_eligible_locations(&self.pool, source, ctx.company_id())
                .await?;
        Ok(rows.into_iter().map(Location::from).collect())
    }

    async fn list_companies_with_eligible_locations(
        &self,
        ctx: &TenantContext,
        source: SourceKind,
    ) -> Result<Vec<i64>, StoreError> {
        Ok(
            locations::list_companies_with_eligible_locations(
                &self.pool,
                source,
                ctx.company_id(),
            )
            .await?,
        )
    }

    async fn list_eligible_for_company(
        &self,
        ctx: &TenantContext,
        source: SourceKind,
        company_id: i64,
    ) -> Result<Vec<Location>, StoreError> {
        if !ctx.allows(company_id) {
            return Ok(Vec::new());
        }
        let rows =
            locations::list_scrape_eligible_locations(&self.pool, source, Some(company_id))
                .await?;
        Ok(rows.into_iter().map(Location::from).collect())
    }

    async fn record_scrape_times(
        &self,
        ctx: &TenantContext,
        location_id: i64,
        attempted_at: DateTime<Utc>,
        succeeded_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        locations::record_scrape_times(
            &self.pool,
            location_id,
            ctx.company_id(),
            attempted_at,
            succeeded_at,
        )
        .await
        .map_err(|e| match e {
            DbError::NotFound => StoreError::NotFound(format!("location {location_id}")),
            other => StoreError::from(other),
        })
    }
}

#[async_trait]
impl ReviewStore for PgStore {
    async fn insert_reviews(
        &self,
        ctx: &TenantContext,
        new_reviews: &[NewReview],
    ) -> Result<u64, StoreError> {
        let visible: Vec<NewReview> = new_reviews
            .iter()
            .filter(|r| ctx.allows(r.company_id))
            .cloned()
            .collect();
        Ok(reviews::insert_reviews(&self.pool, &visible).await?)
    }

    async fn fetch_unprocessed(
        &self,
        ctx: &TenantContext,
        limit: usize,
    ) -> Result<Vec<Review>, StoreError> {
        let rows = reviews::fetch_unprocessed_reviews(&self.pool, limit, ctx.company_id()).await?;
        rows.into_iter()
            .map(|row| Review::try_from(row).map_err(StoreError::from))
            .collect()
    }

    async fn mark_processed(&self, ctx: &TenantContext, ids: &[i64]) -> Result<u64, StoreError> {
        Ok(reviews::mark_reviews_processed(&self.pool, ids, ctx.company_id()).await?)
    }

    async fn record_acknowledgement(
        &self,
        ctx: &TenantContext,
        review_id: i64,
        received_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Ok(reviews::record_review_acknowledgement(
            &self.pool,
            review_id,
            ctx.company_id(),
            received_at,
        )
        .await?)
    }
}

#[async_trait]
impl SummaryStore for PgStore {
    async fn upsert_summary(
        &self,
        ctx: &TenantContext,
        summary: &SummaryUpsert,
    ) -> Result<SourceReviewSummary, StoreError> {
        if !ctx.allows(summary.company_id) {
            return Err(StoreError::NotFound(format!(
                "location {} for company {}",
                summary.location_id, summary.company_id
            )));
        }
        let row = summaries::upsert_summary(&self.pool, summary).await?;
        Ok(SourceReviewSummary::try_from(row)?)
    }

    async fn list_summaries_since(
        &self,
        ctx: &TenantContext,
        since: NaiveDate,
    ) -> Result<Vec<SourceReviewSummary>, StoreError> {
        let rows = summaries::list_summaries_since(&self.pool, since, ctx.company_id()).await?;
        rows.into_iter()
            .map(|row| SourceReviewSummary::try_from(row).map_err(StoreError::from))
            .collect()
    }
}
