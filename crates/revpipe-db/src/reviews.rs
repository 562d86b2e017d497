//! Database operations for the `reviews` table.

use chrono::{DateTime, NaiveDate, Utc};
use revpipe_core::{NewReview, Review, Sentiment, SourceKind};
use sqlx::PgPool;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row type
// ---------------------------------------------------------------------------

/// A row from the `reviews` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReviewRow {
    pub id: i64,
    pub location_id: Option<i64>,
    pub location_name: String,
    pub company_id: i64,
    pub source: String,
    pub rating: i32,
    pub feedback: String,
    pub reviewer_name: Option<String>,
    pub published_at: DateTime<Utc>,
    pub review_date: NaiveDate,
    pub scraped_at: DateTime<Utc>,
    pub sentiment: Option<String>,
    pub is_processed: bool,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

impl TryFrom<ReviewRow> for Review {
    type Error = DbError;

    fn try_from(row: ReviewRow) -> Result<Self, Self::Error> {
        let source = row
            .source
            .parse::<SourceKind>()
            .map_err(|_| DbError::InvalidColumn {
                column: "source",
                value: row.source.clone(),
            })?;
        let sentiment = row
            .sentiment
            .as_deref()
            .map(|label| {
                label
                    .parse::<Sentiment>()
                    .map_err(|_| DbError::InvalidColumn {
                        column: "sentiment",
                        value: label.to_string(),
                    })
            })
            .transpose()?;

        Ok(Review {
            id: row.id,
            location_id: row.location_id,
            location_name: row.location_name,
            company_id: row.company_id,
            source,
            rating: row.rating,
            feedback: row.feedback,
            reviewer_name: row.reviewer_name,
            published_at: row.published_at,
            review_date: row.review_date,
            scraped_at: row.scraped_at,
            sentiment,
            is_processed: row.is_processed,
            acknowledged_at: row.acknowledged_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Inserts a batch of normalized reviews in one round-trip.
///
/// Returns the number of rows inserted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_reviews(pool: &PgPool, reviews: &[NewReview]) -> Result<u64, DbError> {
    if reviews.is_empty() {
        return Ok(0);
    }

    // Parallel column vectors for UNNEST binding.
    let mut location_ids: Vec<Option<i64>> = Vec::with_capacity(reviews.len());
    let mut location_names: Vec<String> = Vec::with_capacity(reviews.len());
    let mut company_ids: Vec<i64> = Vec::with_capacity(reviews.len());
    let mut sources: Vec<String> = Vec::with_capacity(reviews.len());
    let mut ratings: Vec<i32> = Vec::with_capacity(reviews.len());
    let mut feedbacks: Vec<String> = Vec::with_capacity(reviews.len());
    let mut reviewer_names: Vec<Option<String>> = Vec::with_capacity(reviews.len());
    let mut published_ats: Vec<DateTime<Utc>> = Vec::with_capacity(reviews.len());
    let mut review_dates: Vec<NaiveDate> = Vec::with_capacity(reviews.len());
    let mut scraped_ats: Vec<DateTime<Utc>> = Vec::with_capacity(reviews.len());
    let mut sentiments: Vec<Option<String>> = Vec::with_capacity(reviews.len());

    for review in reviews {
        location_ids.push(review.location_id);
        location_names.push(review.location_name.clone());
        company_ids.push(review.company_id);
        sources.push(review.source.as_str().to_string());
        ratings.push(review.rating);
        feedbacks.push(review.feedback.clone());
        reviewer_names.push(review.reviewer_name.clone());
        published_ats.push(review.published_at);
        review_dates.push(review.review_date);
        scraped_ats.push(review.scraped_at);
        sentiments.push(review.sentiment.map(|s| s.as_str().to_string()));
    }

    let result = sqlx::query(
        "INSERT INTO reviews \
             (location_id, location_name, company_id, source, rating, feedback, \
              reviewer_name, published_at, review_date, scraped_at, sentiment) \
         SELECT * FROM UNNEST(\
              $1::int8[], $2::text[], $3::int8[], $4::text[], $5::int4[], $6::text[], \
              $7::text[], $8::timestamptz[], $9::date[], $10::timestamptz[], $11::text[])",
    )
    .bind(&location_ids)
    .bind(&location_names)
    .bind(&company_ids)
    .bind(&sources)
    .bind(&ratings)
    .bind(&feedbacks)
    .bind(&reviewer_names)
    .bind(&published_ats)
    .bind(&review_dates)
    .bind(&scraped_ats)
    .bind(&sentiments)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Flips `is_processed` for the given ids. Already-processed rows are not
/// counted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn mark_reviews_processed(
    pool: &PgPool,
    ids: &[i64],
    company_id: Option<i64>,
) -> Result<u64, DbError> {
    if ids.is_empty() {
        return Ok(0);
    }

    let result = sqlx::query(
        "UPDATE reviews SET is_processed = true \
         WHERE id = ANY($1) \
           AND is_processed = false \
           AND ($2::BIGINT IS NULL OR company_id = $2)",
    )
    .bind(ids)
    .bind(company_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Records when a downstream consumer confirmed receipt of a review.
///
/// Returns `false` when no visible review has `review_id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn record_review_acknowledgement(
    pool: &PgPool,
    review_id: i64,
    company_id: Option<i64>,
    received_at: DateTime<Utc>,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE reviews SET acknowledged_at = $2 \
         WHERE id = $1 \
           AND ($3::BIGINT IS NULL OR company_id = $3)",
    )
    .bind(review_id)
    .bind(received_at)
    .bind(company_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Returns up to `limit` unprocessed reviews, oldest scrape first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn fetch_unprocessed_reviews(
    pool: &PgPool,
    limit: usize,
    company_id: Option<i64>,
) -> Result<Vec<ReviewRow>, DbError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let rows = sqlx::query_as::<_, ReviewRow>(
        "SELECT id, location_id, location_name, company_id, source, rating, feedback, \
                reviewer_name, published_at, review_date, scraped_at, sentiment, \
                is_processed, acknowledged_at \
         FROM reviews \
         WHERE is_processed = false \
           AND ($2::BIGINT IS NULL OR company_id = $2) \
         ORDER BY scraped_at, id \
         LIMIT $1",
    )
    .bind(limit)
    .bind(company_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
