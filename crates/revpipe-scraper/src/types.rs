use revpipe_core::SourceKind;
use serde::{Deserialize, Deserializer};

/// Accepts a JSON string or number and keeps it as text.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

// ---------------------------------------------------------------------------
// Talabat
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TalabatResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub reviews: Option<TalabatReviewsData>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TalabatReviewsData {
    /// Platform-wide total review count, delivered as text.
    #[serde(default, deserialize_with = "lenient_string")]
    pub trt: Option<String>,
    /// Platform-wide average rating.
    #[serde(default)]
    pub rat: Option<f64>,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub count: Option<i64>,
    #[serde(default)]
    pub reviews: Vec<Option<TalabatReview>>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
pub struct TalabatReview {
    #[serde(default)]
    pub id: Option<i64>,
    /// Reviewer first name.
    #[serde(default, rename = "fn")]
    pub first_name: Option<String>,
    #[serde(default)]
    pub oid: Option<i64>,
    /// Feedback text.
    #[serde(default)]
    pub rew: Option<String>,
    #[serde(default)]
    pub rat: Option<i32>,
    /// Review date, e.g. `"28 October 2025"`.
    #[serde(default)]
    pub con: Option<String>,
}

// ---------------------------------------------------------------------------
// Instashop
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct InstashopResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub count: Option<i64>,
    #[serde(default)]
    pub reviews: Vec<Option<InstashopReview>>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
pub struct InstashopReview {
    /// e.g. `"10/2/2025, 3:10:28 PM"`, local to the platform.
    #[serde(default, rename = "CreatedAt", alias = "createdAt")]
    pub created_at: Option<String>,
    #[serde(default, rename = "Comment", alias = "comment")]
    pub comment: Option<String>,
    #[serde(default, rename = "Area", alias = "area")]
    pub area: Option<String>,
    #[serde(default, rename = "productAccuracy", alias = "ProductAccuracy")]
    pub product_accuracy: Option<i32>,
    #[serde(default, rename = "deliverySpeed", alias = "DeliverySpeed")]
    pub delivery_speed: Option<i32>,
}

// ---------------------------------------------------------------------------
// Source-independent view
// ---------------------------------------------------------------------------

/// One raw record from either scraper.
#[derive(Debug, Clone, PartialEq)]
pub enum RawReview {
    Talabat(TalabatReview),
    Instashop(InstashopReview),
}

impl RawReview {
    #[must_use]
    pub fn source(&self) -> SourceKind {
        match self {
            RawReview::Talabat(_) => SourceKind::Talabat,
            RawReview::Instashop(_) => SourceKind::Instashop,
        }
    }

    #[must_use]
    pub fn date_text(&self) -> Option<&str> {
        match self {
            RawReview::Talabat(r) => r.con.as_deref(),
            RawReview::Instashop(r) => r.created_at.as_deref(),
        }
    }
}

/// Decoded scraper response for one location or sub-location.
#[derive(Debug, Clone)]
pub enum ScrapeResponse {
    Talabat(TalabatResponse),
    Instashop(InstashopResponse),
}

impl ScrapeResponse {
    #[must_use]
    pub fn source(&self) -> SourceKind {
        match self {
            ScrapeResponse::Talabat(_) => SourceKind::Talabat,
            ScrapeResponse::Instashop(_) => SourceKind::Instashop,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        match self {
            ScrapeResponse::Talabat(r) => r.success,
            ScrapeResponse::Instashop(r) => r.success,
        }
    }

    /// Non-null review records, in response order.
    #[must_use]
    pub fn reviews(&self) -> Vec<RawReview> {
        match self {
            ScrapeResponse::Talabat(r) => r
                .reviews
                .iter()
                .flat_map(|data| data.reviews.iter().flatten())
                .cloned()
                .map(RawReview::Talabat)
                .collect(),
            ScrapeResponse::Instashop(r) => r
                .reviews
                .iter()
                .flatten()
                .cloned()
                .map(RawReview::Instashop)
                .collect(),
        }
    }

    /// Average rating and total response count for the daily summary.
    ///
    /// Talabat reports both figures directly; the total falls back to the
    /// nested `count` when `trt` is missing or not an integer. Instashop
    /// figures are computed from the returned records.
    #[must_use]
    pub fn summary_figures(&self) -> (f64, i64) {
        match self {
            ScrapeResponse::Talabat(r) => {
                let Some(data) = &r.reviews else {
                    return (0.0, 0);
                };
                let count = data.count.unwrap_or(0);
                let total = data
                    .trt
                    .as_deref()
                    .and_then(|t| t.trim().parse::<i64>().ok())
                    .unwrap_or(count);
                (data.rat.unwrap_or(0.0), total)
            }
            ScrapeResponse::Instashop(r) => {
                let records: Vec<&InstashopReview> = r.reviews.iter().flatten().collect();
                if records.is_empty() {
                    return (0.0, 0);
                }
                let sum: f64 = records
                    .iter()
                    .map(|rec| {
                        f64::from(
                            rec.product_accuracy.unwrap_or(0) + rec.delivery_speed.unwrap_or(0),
                        ) / 2.0
                    })
                    .sum();
                #[allow(clippy::cast_precision_loss)]
                let n = records.len() as f64;
                (sum / n, i64::try_from(records.len()).unwrap_or(i64::MAX))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn talabat_response_decodes_and_skips_null_records() {
        let body = json!({
            "success": true,
            "reviews": {
                "trt": "1234",
                "rat": 4.3,
                "success": true,
                "count": 2,
                "reviews": [
                    {"id": 1, "fn": "Mona", "oid": 99, "rew": "great", "rat": 5, "con": "28 October 2025"},
                    null
                ]
            }
        });
        let parsed: TalabatResponse = serde_json::from_value(body).unwrap();
        let response = ScrapeResponse::Talabat(parsed);
        assert!(response.is_success());
        let reviews = response.reviews();
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].date_text(), Some("28 October 2025"));
        assert_eq!(reviews[0].source(), SourceKind::Talabat);
    }

    #[test]
    fn talabat_summary_prefers_trt() {
        let parsed: TalabatResponse = serde_json::from_value(json!({
            "success": true,
            "reviews": {"trt": "1234", "rat": 4.3, "count": 2, "reviews": []}
        }))
        .unwrap();
        let (avg, total) = ScrapeResponse::Talabat(parsed).summary_figures();
        assert!((avg - 4.3).abs() < f64::EPSILON);
        assert_eq!(total, 1234);
    }

    #[test]
    fn talabat_summary_falls_back_to_count() {
        let parsed: TalabatResponse = serde_json::from_value(json!({
            "success": true,
            "reviews": {"trt": "n/a", "rat": 3.0, "count": 17, "reviews": []}
        }))
        .unwrap();
        let (_, total) = ScrapeResponse::Talabat(parsed).summary_figures();
        assert_eq!(total, 17);
    }

    #[test]
    fn talabat_trt_may_arrive_as_number() {
        let parsed: TalabatResponse = serde_json::from_value(json!({
            "success": true,
            "reviews": {"trt": 88, "rat": 3.0, "count": 17, "reviews": []}
        }))
        .unwrap();
        let (_, total) = ScrapeResponse::Talabat(parsed).summary_figures();
        assert_eq!(total, 88);
    }

    #[test]
    fn instashop_summary_averages_sub_ratings() {
        let parsed: InstashopResponse = serde_json::from_value(json!({
            "success": true,
            "count": 2,
            "reviews": [
                {"CreatedAt": "10/2/2025, 3:10:28 PM", "Comment": "ok", "Area": "Zamalek", "productAccuracy": 4, "deliverySpeed": 5},
                {"CreatedAt": "10/2/2025, 4:00:00 PM", "Comment": "", "Area": "Maadi", "productAccuracy": 2, "deliverySpeed": 3}
            ]
        }))
        .unwrap();
        let response = ScrapeResponse::Instashop(parsed);
        let (avg, total) = response.summary_figures();
        assert!((avg - 3.5).abs() < f64::EPSILON);
        assert_eq!(total, 2);
        assert_eq!(response.reviews().len(), 2);
    }

    #[test]
    fn instashop_summary_of_empty_response_is_zero() {
        let response = ScrapeResponse::Instashop(InstashopResponse::default());
        assert_eq!(response.summary_figures(), (0.0, 0));
        assert!(!response.is_success());
    }
}
