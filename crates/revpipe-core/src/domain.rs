use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::CoreError;

/// External platform a review was scraped from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Talabat,
    Instashop,
}

impl SourceKind {
    pub const ALL: [SourceKind; 2] = [SourceKind::Talabat, SourceKind::Instashop];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Talabat => "talabat",
            SourceKind::Instashop => "instashop",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "talabat" => Ok(SourceKind::Talabat),
            "instashop" => Ok(SourceKind::Instashop),
            other => Err(CoreError::UnknownSource(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sentiment {
    Positive,
    Negative,
}

impl Sentiment {
    /// Ratings of 3 and below read as negative.
    #[must_use]
    pub fn from_rating(rating: i32) -> Self {
        if rating <= 3 {
            Sentiment::Negative
        } else {
            Sentiment::Positive
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
        }
    }
}

impl std::str::FromStr for Sentiment {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "positive" => Ok(Sentiment::Positive),
            "negative" => Ok(Sentiment::Negative),
            other => Err(CoreError::UnknownSentiment(other.to_string())),
        }
    }
}

/// Identifier a scraper endpoint uses to address one location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceIdentifier {
    /// Instashop client id.
    ClientId(String),
    /// One Talabat sub-location id.
    LocationId(i32),
}

impl SourceIdentifier {
    #[must_use]
    pub fn query_param(&self) -> &'static str {
        match self {
            SourceIdentifier::ClientId(_) => "clientId",
            SourceIdentifier::LocationId(_) => "locationId",
        }
    }
}

impl std::fmt::Display for SourceIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceIdentifier::ClientId(id) => f.write_str(id),
            SourceIdentifier::LocationId(id) => write!(f, "{id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: i64,
    pub company_id: i64,
    pub name: String,
    pub is_active: bool,
    pub instashop_client_id: Option<String>,
    pub talabat_location_ids: Vec<i32>,
    pub last_scrape_attempt_time: Option<DateTime<Utc>>,
    pub last_successful_scrape_time: Option<DateTime<Utc>>,
}

impl Location {
    /// Units of scrape work this location contributes for `source`.
    ///
    /// Instashop yields at most one identifier; Talabat yields one per
    /// configured sub-location.
    #[must_use]
    pub fn source_identifiers(&self, source: SourceKind) -> Vec<SourceIdentifier> {
        match source {
            SourceKind::Instashop => self
                .instashop_client_id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(|id| vec![SourceIdentifier::ClientId(id.to_string())])
                .unwrap_or_default(),
            SourceKind::Talabat => self
                .talabat_location_ids
                .iter()
                .copied()
                .map(SourceIdentifier::LocationId)
                .collect(),
        }
    }

    /// True when the location is active and has at least one identifier for `source`.
    #[must_use]
    pub fn is_scrape_eligible(&self, source: SourceKind) -> bool {
        self.is_active && !self.source_identifiers(source).is_empty()
    }
}

/// A review as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: i64,
    pub location_id: Option<i64>,
    pub location_name: String,
    pub company_id: i64,
    pub source: SourceKind,
    pub rating: i32,
    pub feedback: String,
    pub reviewer_name: Option<String>,
    pub published_at: DateTime<Utc>,
    pub review_date: NaiveDate,
    pub scraped_at: DateTime<Utc>,
    pub sentiment: Option<Sentiment>,
    pub is_processed: bool,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

/// A normalized review that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReview {
    pub location_id: Option<i64>,
    pub location_name: String,
    pub company_id: i64,
    pub source: SourceKind,
    pub rating: i32,
    pub feedback: String,
    pub reviewer_name: Option<String>,
    pub published_at: DateTime<Utc>,
    pub review_date: NaiveDate,
    pub scraped_at: DateTime<Utc>,
    pub sentiment: Option<Sentiment>,
}

impl NewReview {
    /// Attach a store-assigned id, producing an unprocessed [`Review`].
    #[must_use]
    pub fn into_review(self, id: i64) -> Review {
        Review {
            id,
            location_id: self.location_id,
            location_name: self.location_name,
            company_id: self.company_id,
            source: self.source,
            rating: self.rating,
            feedback: self.feedback,
            reviewer_name: self.reviewer_name,
            published_at: self.published_at,
            review_date: self.review_date,
            scraped_at: self.scraped_at,
            sentiment: self.sentiment,
            is_processed: false,
            acknowledged_at: None,
        }
    }
}

/// Daily rolling aggregate for one location and source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReviewSummary {
    pub id: i64,
    pub location_id: i64,
    pub company_id: i64,
    pub source: SourceKind,
    pub summary_date: NaiveDate,
    pub avg_rating: f64,
    pub total_responses: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input to a summary upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryUpsert {
    pub location_id: i64,
    pub company_id: i64,
    pub source: SourceKind,
    pub avg_rating: f64,
    pub total_responses: i64,
    pub as_of: NaiveDate,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location() -> Location {
        Location {
            id: 7,
            company_id: 3,
            name: "Downtown".to_string(),
            is_active: true,
            instashop_client_id: Some("abc-123".to_string()),
            talabat_location_ids: vec![11, 12, 13],
            last_scrape_attempt_time: None,
            last_successful_scrape_time: None,
        }
    }

    #[test]
    fn talabat_yields_one_identifier_per_sub_location() {
        let ids = location().source_identifiers(SourceKind::Talabat);
        assert_eq!(
            ids,
            vec![
                SourceIdentifier::LocationId(11),
                SourceIdentifier::LocationId(12),
                SourceIdentifier::LocationId(13),
            ]
        );
    }

    #[test]
    fn blank_instashop_client_id_is_not_eligible() {
        let mut loc = location();
        loc.instashop_client_id = Some("   ".to_string());
        assert!(loc.source_identifiers(SourceKind::Instashop).is_empty());
        assert!(!loc.is_scrape_eligible(SourceKind::Instashop));
    }

    #[test]
    fn inactive_location_is_not_eligible() {
        let mut loc = location();
        loc.is_active = false;
        assert!(!loc.is_scrape_eligible(SourceKind::Talabat));
    }

    #[test]
    fn source_kind_parses_case_insensitively() {
        assert_eq!("Talabat".parse::<SourceKind>().unwrap(), SourceKind::Talabat);
        assert_eq!(
            " instashop ".parse::<SourceKind>().unwrap(),
            SourceKind::Instashop
        );
        assert!("mrsool".parse::<SourceKind>().is_err());
    }

    #[test]
    fn source_kind_serializes_snake_case() {
        let json = serde_json::to_string(&SourceKind::Instashop).unwrap();
        assert_eq!(json, "\"instashop\"");
    }

    #[test]
    fn sentiment_threshold_is_three() {
        assert_eq!(Sentiment::from_rating(3), Sentiment::Negative);
        assert_eq!(Sentiment::from_rating(4), Sentiment::Positive);
        assert_eq!(Sentiment::from_rating(1), Sentiment::Negative);
    }

    #[test]
    fn identifier_query_params() {
        assert_eq!(
            SourceIdentifier::ClientId("x".into()).query_param(),
            "clientId"
        );
        assert_eq!(SourceIdentifier::LocationId(4).query_param(), "locationId");
        assert_eq!(SourceIdentifier::LocationId(4).to_string(), "4");
    }
}
