//! Database operations for the `locations` table.

use chrono::{DateTime, Utc};
use revpipe_core::{Location, SourceKind};
use sqlx::PgPool;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row type
// ---------------------------------------------------------------------------

/// A row from the `locations` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LocationRow {
    pub id: i64,
    pub company_id: i64,
    pub name: String,
    pub is_active: bool,
    pub instashop_client_id: Option<String>,
    pub talabat_location_ids: Vec<i32>,
    pub last_scrape_attempt_time: Option<DateTime<Utc>>,
    pub last_successful_scrape_time: Option<DateTime<Utc>>,
}

impl From<LocationRow> for Location {
    fn from(row: LocationRow) -> Self {
        Location {
            id: row.id,
            company_id: row.company_id,
            name: row.name,
            is_active: row.is_active,
            instashop_client_id: row.instashop_client_id,
            talabat_location_ids: row.talabat_location_ids,
            last_scrape_attempt_time: row.last_scrape_attempt_time,
            last_successful_scrape_time: row.last_successful_scrape_time,
        }
    }
}

const LOCATION_COLUMNS: &str = "id, company_id, name, is_active, instashop_client_id, \
     talabat_location_ids, last_scrape_attempt_time, last_successful_scrape_time";

/// SQL predicate selecting rows that carry an identifier for `source`.
pub(crate) fn identifier_predicate(source: SourceKind) -> &'static str {
    match source {
        SourceKind::Talabat => "cardinality(talabat_location_ids) > 0",
        SourceKind::Instashop => "btrim(COALESCE(instashop_client_id, '')) <> ''",
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Returns active locations with an identifier for `source`, optionally
/// restricted to one company, ordered by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_scrape_eligible_locations(
    pool: &PgPool,
    source: SourceKind,
    company_id: Option<i64>,
) -> Result<Vec<LocationRow>, DbError> {
    let sql = format!(
        "SELECT {LOCATION_COLUMNS} \
         FROM locations \
         WHERE is_active = true \
           AND {} \
           AND ($1::BIGINT IS NULL OR company_id = $1) \
         ORDER BY id",
        identifier_predicate(source)
    );
    let rows = sqlx::query_as::<_, LocationRow>(&sql)
        .bind(company_id)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Returns the distinct companies owning at least one scrape-eligible
/// location for `source`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_companies_with_eligible_locations(
    pool: &PgPool,
    source: SourceKind,
    company_id: Option<i64>,
) -> Result<Vec<i64>, DbError> {
    let sql = format!(
        "SELECT DISTINCT company_id \
         FROM locations \
         WHERE is_active = true \
           AND {} \
           AND ($1::BIGINT IS NULL OR company_id = $1) \
         ORDER BY company_id",
        identifier_predicate(source)
    );
    let ids = sqlx::query_scalar::<_, i64>(&sql)
        .bind(company_id)
        .fetch_all(pool)
        .await?;

    Ok(ids)
}

/// Sets `last_scrape_attempt_time`, and `last_successful_scrape_time` when
/// `succeeded_at` is given.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no visible location has `location_id`,
/// or [`DbError::Sqlx`] if the update fails.
pub async fn record_scrape_times(
    pool: &PgPool,
    location_id: i64,
    company_id: Option<i64>,
    attempted_at: DateTime<Utc>,
    succeeded_at: Option<DateTime<Utc>>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE locations \
         SET last_scrape_attempt_time    = $2, \
             last_successful_scrape_time = COALESCE($3, last_successful_scrape_time), \
             updated_at                  = NOW() \
         WHERE id = $1 \
           AND ($4::BIGINT IS NULL OR company_id = $4)",
    )
    .bind(location_id)
    .bind(attempted_at)
    .bind(succeeded_at)
    .bind(company_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}
