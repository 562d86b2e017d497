use chrono::{DateTime, Utc};
use revpipe_core::{NewReview, Sentiment};
use thiserror::Error;

use crate::dates::{self, DateStyle};
use crate::types::{InstashopReview, RawReview, TalabatReview};

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("no valid reviews to save for location {location_id}")]
    SaveReviewsFailed { location_id: i64 },
}

/// Location the batch belongs to.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeContext<'a> {
    pub location_id: i64,
    pub location_name: &'a str,
    pub company_id: i64,
}

/// Rating derived from two 1–5 sub-ratings: mean rounded half away from
/// zero, clamped to [1, 5]. `None` when either sub-rating is out of range.
#[must_use]
pub fn rating_from_sub_ratings(first: i32, second: i32) -> Option<i32> {
    if !(1..=5).contains(&first) || !(1..=5).contains(&second) {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    let rounded = (f64::from(first + second) / 2.0).round() as i32;
    Some(rounded.clamp(1, 5))
}

/// Normalize every valid record. Invalid records are skipped; a batch with
/// no valid records at all is an error.
///
/// # Errors
///
/// Returns [`NormalizeError::SaveReviewsFailed`] when no record survives.
pub fn normalize_batch(
    records: &[RawReview],
    ctx: &NormalizeContext<'_>,
    now: DateTime<Utc>,
) -> Result<Vec<NewReview>, NormalizeError> {
    let reviews: Vec<NewReview> = records
        .iter()
        .filter_map(|record| normalize_review(record, ctx, now))
        .collect();

    if reviews.is_empty() {
        tracing::info!(
            location_id = ctx.location_id,
            records = records.len(),
            "normalize: no valid reviews in batch"
        );
        return Err(NormalizeError::SaveReviewsFailed {
            location_id: ctx.location_id,
        });
    }
    Ok(reviews)
}

/// Normalize one record, or `None` if it fails validation.
#[must_use]
pub fn normalize_review(
    record: &RawReview,
    ctx: &NormalizeContext<'_>,
    now: DateTime<Utc>,
) -> Option<NewReview> {
    match record {
        RawReview::Talabat(r) => normalize_talabat(r, ctx, now),
        RawReview::Instashop(r) => normalize_instashop(r, ctx, now),
    }
}

fn published_at(
    text: Option<&str>,
    style: DateStyle,
    location_id: i64,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    if let Some(parsed) = text.and_then(|t| dates::parse(t, style, now)) {
        return parsed.instant;
    }
    tracing::info!(
        location_id,
        text = text.unwrap_or(""),
        "normalize: unparseable review date, using scrape time"
    );
    now
}

fn normalize_talabat(
    record: &TalabatReview,
    ctx: &NormalizeContext<'_>,
    now: DateTime<Utc>,
) -> Option<NewReview> {
    let rating = match record.rat {
        Some(r) if (1..=5).contains(&r) => r,
        other => {
            tracing::info!(
                location_id = ctx.location_id,
                rating = ?other,
                "normalize: skipping talabat review with invalid rating"
            );
            return None;
        }
    };

    let feedback = record.rew.clone().unwrap_or_default();
    // Talabat reviews with text are left for downstream sentiment analysis.
    let sentiment = feedback
        .trim()
        .is_empty()
        .then(|| Sentiment::from_rating(rating));
    let published_at = published_at(
        record.con.as_deref(),
        DateStyle::Talabat,
        ctx.location_id,
        now,
    );

    Some(NewReview {
        location_id: Some(ctx.location_id),
        location_name: ctx.location_name.to_string(),
        company_id: ctx.company_id,
        source: revpipe_core::SourceKind::Talabat,
        rating,
        feedback,
        reviewer_name: record.first_name.clone().filter(|n| !n.trim().is_empty()),
        published_at,
        review_date: published_at.date_naive(),
        scraped_at: now,
        sentiment,
    })
}

fn normalize_instashop(
    record: &InstashopReview,
    ctx: &NormalizeContext<'_>,
    now: DateTime<Utc>,
) -> Option<NewReview> {
    let rating = match (record.product_accuracy, record.delivery_speed) {
        (Some(pa), Some(ds)) => rating_from_sub_ratings(pa, ds),
        _ => None,
    };
    let Some(rating) = rating else {
        tracing::info!(
            location_id = ctx.location_id,
            product_accuracy = ?record.product_accuracy,
            delivery_speed = ?record.delivery_speed,
            "normalize: skipping instashop review with invalid sub-ratings"
        );
        return None;
    };

    let published_at = published_at(
        record.created_at.as_deref(),
        DateStyle::Instashop,
        ctx.location_id,
        now,
    );

    Some(NewReview {
        location_id: Some(ctx.location_id),
        location_name: ctx.location_name.to_string(),
        company_id: ctx.company_id,
        source: revpipe_core::SourceKind::Instashop,
        rating,
        feedback: record.comment.clone().unwrap_or_default(),
        reviewer_name: None,
        published_at,
        review_date: published_at.date_naive(),
        scraped_at: now,
        sentiment: Some(Sentiment::from_rating(rating)),
    })
}

#[cfg(test)]
#[path = "normalize_test.rs"]
mod tests;
