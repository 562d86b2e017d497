//! Database operations for the `source_review_summaries` table.

use chrono::{DateTime, NaiveDate, Utc};
use revpipe_core::{SourceKind, SourceReviewSummary, SummaryUpsert};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `source_review_summaries` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SummaryRow {
    pub id: i64,
    pub location_id: i64,
    pub company_id: i64,
    pub source: String,
    pub summary_date: NaiveDate,
    pub avg_rating: f64,
    pub total_responses: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<SummaryRow> for SourceReviewSummary {
    type Error = DbError;

    fn try_from(row: SummaryRow) -> Result<Self, Self::Error> {
        let source = row
            .source
            .parse::<SourceKind>()
            .map_err(|_| DbError::InvalidColumn {
                column: "source",
                value: row.source.clone(),
            })?;
        Ok(SourceReviewSummary {
            id: row.id,
            location_id: row.location_id,
            company_id: row.company_id,
            source,
            summary_date: row.summary_date,
            avg_rating: row.avg_rating,
            total_responses: row.total_responses,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const SUMMARY_COLUMNS: &str = "id, location_id, company_id, source, summary_date, avg_rating, \
     total_responses, created_at, updated_at";

/// Inserts the (location, day, source) row or overwrites its company,
/// average and total when it already exists.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the statement fails.
pub async fn upsert_summary(pool: &PgPool, summary: &SummaryUpsert) -> Result<SummaryRow, DbError> {
    let sql = format!(
        "INSERT INTO source_review_summaries \
             (location_id, company_id, source, summary_date, avg_rating, total_responses) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (location_id, summary_date, source) DO UPDATE SET \
             company_id      = EXCLUDED.company_id, \
             avg_rating      = EXCLUDED.avg_rating, \
             total_responses = EXCLUDED.total_responses, \
             updated_at      = NOW() \
         RETURNING {SUMMARY_COLUMNS}"
    );
    let row = sqlx::query_as::<_, SummaryRow>(&sql)
        .bind(summary.location_id)
        .bind(summary.company_id)
        .bind(summary.source.as_str())
        .bind(summary.as_of)
        .bind(summary.avg_rating)
        .bind(summary.total_responses)
        .fetch_one(pool)
        .await?;

    Ok(row)
}

/// Returns summary rows dated on or after `since`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_summaries_since(
    pool: &PgPool,
    since: NaiveDate,
    company_id: Option<i64>,
) -> Result<Vec<SummaryRow>, DbError> {
    let sql = format!(
        "SELECT {SUMMARY_COLUMNS} \
         FROM source_review_summaries \
         WHERE summary_date >= $1 \
           AND ($2::BIGINT IS NULL OR company_id = $2) \
         ORDER BY summary_date, location_id, source"
    );
    let rows = sqlx::query_as::<_, SummaryRow>(&sql)
        .bind(since)
        .bind(company_id)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}
