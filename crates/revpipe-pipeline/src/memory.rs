//! In-process store used by tests and dry runs.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use revpipe_core::{
    Location, LocationStore, NewReview, Review, ReviewStore, SourceIdentifier, SourceKind,
    SourceReviewSummary, StoreError, SummaryStore, SummaryUpsert, TenantContext,
};
use revpipe_scraper::{FetchParams, ScrapeResponse};

use crate::fetch::LocationFetcher;

#[derive(Debug, thiserror::Error)]
#[error("memory store unavailable")]
pub struct Unavailable;

/// Store operations that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    ListLocations,
    RecordScrapeTimes,
    InsertReviews,
    FetchUnprocessed,
    MarkProcessed,
    RecordAcknowledgement,
    UpsertSummary,
    ListSummaries,
}

#[derive(Debug, Default)]
struct State {
    locations: Vec<Location>,
    reviews: Vec<Review>,
    summaries: Vec<SourceReviewSummary>,
    next_review_id: i64,
    next_summary_id: i64,
    failing: HashSet<StoreOp>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_locations(locations: Vec<Location>) -> Self {
        let store = Self::default();
        if let Ok(mut state) = store.state.lock() {
            state.locations = locations;
        }
        store
    }

    /// Make `op` fail with a backend error until reset.
    pub fn fail_on(&self, op: StoreOp, fail: bool) {
        if let Ok(mut state) = self.state.lock() {
            if fail {
                state.failing.insert(op);
            } else {
                state.failing.remove(&op);
            }
        }
    }

    #[must_use]
    pub fn location(&self, id: i64) -> Option<Location> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.locations.iter().find(|l| l.id == id).cloned())
    }

    #[must_use]
    pub fn reviews(&self) -> Vec<Review> {
        self.state
            .lock()
            .map(|state| state.reviews.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn summaries(&self) -> Vec<SourceReviewSummary> {
        self.state
            .lock()
            .map(|state| state.summaries.clone())
            .unwrap_or_default()
    }

    fn lock(&self, op: StoreOp) -> Result<MutexGuard<'_, State>, StoreError> {
        let state = self
            .state
            .lock()
            .map_err(|_| StoreError::backend(Unavailable))?;
        if state.failing.contains(&op) {
            return Err(StoreError::backend(Unavailable));
        }
        Ok(state)
    }
}

fn eligible(state: &State, ctx: &TenantContext, source: SourceKind) -> Vec<Location> {
    let mut found: Vec<Location> = state
        .locations
        .iter()
        .filter(|l| ctx.allows(l.company_id) && l.is_scrape_eligible(source))
        .cloned()
        .collect();
    found.sort_by_key(|l| l.id);
    found
}

#[async_trait]
impl LocationStore for MemoryStore {
    async fn list_scrape_eligible(
        &self,
        ctx: &TenantContext,
        source: SourceKind,
    ) -> Result<Vec<Location>, StoreError> {
        let state = self.lock(StoreOp::ListLocations)?;
        Ok(eligible(&state, ctx, source))
    }

    async fn list_companies_with_eligible_locations(
        &self,
        ctx: &TenantContext,
        source: SourceKind,
    ) -> Result<Vec<i64>, StoreError> {
        let state = self.lock(StoreOp::ListLocations)?;
        let mut companies: Vec<i64> = eligible(&state, ctx, source)
            .iter()
            .map(|l| l.company_id)
            .collect();
        companies.sort_unstable();
        companies.dedup();
        Ok(companies)
    }

    async fn list_eligible_for_company(
        &self,
        ctx: &TenantContext,
        source: SourceKind,
        company_id: i64,
    ) -> Result<Vec<Location>, StoreError> {
        let state = self.lock(StoreOp::ListLocations)?;
        Ok(eligible(&state, ctx, source)
            .into_iter()
            .filter(|l| l.company_id == company_id)
            .collect())
    }

    async fn record_scrape_times(
        &self,
        ctx: &TenantContext,
        location_id: i64,
        attempted_at: DateTime<Utc>,
        succeeded_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let mut state = self.lock(StoreOp::RecordScrapeTimes)?;
        let location = state
            .locations
            .iter_mut()
            .find(|l| l.id == location_id && ctx.allows(l.company_id))
            .ok_or_else(|| StoreError::NotFound(format!("location {location_id}")))?;
        location.last_scrape_attempt_time = Some(attempted_at);
        if succeeded_at.is_some() {
            location.last_successful_scrape_time = succeeded_at;
        }
        Ok(())
    }
}

#[async_trait]
impl ReviewStore for MemoryStore {
    async fn insert_reviews(
        &self,
        ctx: &TenantContext,
        reviews: &[NewReview],
    ) -> Result<u64, StoreError> {
        let mut state = self.lock(StoreOp::InsertReviews)?;
        let mut inserted = 0;
        for review in reviews.iter().filter(|r| ctx.allows(r.company_id)) {
            state.next_review_id += 1;
            let id = state.next_review_id;
            state.reviews.push(review.clone().into_review(id));
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn fetch_unprocessed(
        &self,
        ctx: &TenantContext,
        limit: usize,
    ) -> Result<Vec<Review>, StoreError> {
        let state = self.lock(StoreOp::FetchUnprocessed)?;
        let mut pending: Vec<Review> = state
            .reviews
            .iter()
            .filter(|r| !r.is_processed && ctx.allows(r.company_id))
            .cloned()
            .collect();
        pending.sort_by_key(|r| (r.scraped_at, r.id));
        pending.truncate(limit);
        Ok(pending)
    }

    async fn mark_processed(&self, ctx: &TenantContext, ids: &[i64]) -> Result<u64, StoreError> {
        let mut state = self.lock(StoreOp::MarkProcessed)?;
        let mut flipped = 0;
        for review in state
            .reviews
            .iter_mut()
            .filter(|r| ids.contains(&r.id) && !r.is_processed && ctx.allows(r.company_id))
        {
            review.is_processed = true;
            flipped += 1;
        }
        Ok(flipped)
    }

    async fn record_acknowledgement(
        &self,
        ctx: &TenantContext,
        review_id: i64,
        received_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut state = self.lock(StoreOp::RecordAcknowledgement)?;
        match state
            .reviews
            .iter_mut()
            .find(|r| r.id == review_id && ctx.allows(r.company_id))
        {
            Some(review) => {
                review.acknowledged_at = Some(received_at);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl SummaryStore for MemoryStore {
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
        let mut state = self.lock(StoreOp::UpsertSummary)?;
        let now = Utc::now();

        if let Some(existing) = state.summaries.iter_mut().find(|s| {
            s.location_id == summary.location_id
                && s.summary_date == summary.as_of
                && s.source == summary.source
        }) {
            existing.company_id = summary.company_id;
            existing.avg_rating = summary.avg_rating;
            existing.total_responses = summary.total_responses;
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        state.next_summary_id += 1;
        let row = SourceReviewSummary {
            id: state.next_summary_id,
            location_id: summary.location_id,
            company_id: summary.company_id,
            source: summary.source,
            summary_date: summary.as_of,
            avg_rating: summary.avg_rating,
            total_responses: summary.total_responses,
            created_at: now,
            updated_at: now,
        };
        state.summaries.push(row.clone());
        Ok(row)
    }

    async fn list_summaries_since(
        &self,
        ctx: &TenantContext,
        since: NaiveDate,
    ) -> Result<Vec<SourceReviewSummary>, StoreError> {
        let state = self.lock(StoreOp::ListSummaries)?;
        let mut rows: Vec<SourceReviewSummary> = state
            .summaries
            .iter()
            .filter(|s| s.summary_date >= since && ctx.allows(s.company_id))
            .cloned()
            .collect();
        rows.sort_by_key(|s| (s.summary_date, s.location_id));
        Ok(rows)
    }
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// Fetcher answering from canned responses keyed by identifier.
///
/// Identifiers without a response fetch as `None`.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    responses: Mutex<HashMap<String, ScrapeResponse>>,
    calls: AtomicUsize,
}

impl StaticFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, identifier: &SourceIdentifier, response: ScrapeResponse) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.insert(identifier.to_string(), response);
        }
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocationFetcher for StaticFetcher {
    async fn fetch(
        &self,
        _source: SourceKind,
        identifier: &SourceIdentifier,
        _params: &FetchParams,
    ) -> Option<ScrapeResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .ok()
            .and_then(|responses| responses.get(&identifier.to_string()).cloned())
    }
}
