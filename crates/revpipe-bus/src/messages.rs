use chrono::{DateTime, NaiveDate, Utc};
use revpipe_core::{Review, Sentiment, SourceKind, SourceReviewSummary};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::BusError;

/// Message types carried on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    #[serde(rename = "ReviewMessage")]
    Review,
    #[serde(rename = "ReviewSummaryMessage")]
    ReviewSummary,
    #[serde(rename = "ReviewReceivedMessage")]
    ReviewReceived,
}

impl MessageKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Review => "ReviewMessage",
            MessageKind::ReviewSummary => "ReviewSummaryMessage",
            MessageKind::ReviewReceived => "ReviewReceivedMessage",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MessageKind {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ReviewMessage" => Ok(MessageKind::Review),
            "ReviewSummaryMessage" => Ok(MessageKind::ReviewSummary),
            "ReviewReceivedMessage" => Ok(MessageKind::ReviewReceived),
            other => Err(BusError::UnknownKind(other.to_string())),
        }
    }
}

/// A typed payload that can travel inside an [`Envelope`](crate::Envelope).
pub trait BusMessage: Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: MessageKind;

    /// Company the message is published on behalf of, if any.
    fn company_id(&self) -> Option<i64>;
}

/// Routing keys derived from one base key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingKeys {
    pub review_published: String,
    pub review_ack: String,
    pub review_summary: String,
}

impl RoutingKeys {
    #[must_use]
    pub fn new(base: &str) -> Self {
        Self {
            review_published: format!("{base}.review.published"),
            review_ack: format!("{base}.review.ack"),
            review_summary: format!("{base}.review.summary"),
        }
    }
}

/// A newly ingested review, forwarded downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewMessage {
    pub id: i64,
    pub location_id: Option<i64>,
    pub location_name: String,
    pub feedback: String,
    pub reviewer_name: Option<String>,
    pub published_at: DateTime<Utc>,
    pub review_date: NaiveDate,
    pub source: SourceKind,
    pub sentiment: Option<Sentiment>,
    pub rating: i32,
    pub company_id: i64,
    pub publisher_routing_key: String,
    pub ack_routing_key: String,
    pub message_created_at: DateTime<Utc>,
}

impl ReviewMessage {
    #[must_use]
    pub fn from_review(review: &Review, keys: &RoutingKeys, now: DateTime<Utc>) -> Self {
        Self {
            id: review.id,
            location_id: review.location_id,
            location_name: review.location_name.clone(),
            feedback: review.feedback.clone(),
            reviewer_name: review.reviewer_name.clone(),
            published_at: review.published_at,
            review_date: review.review_date,
            source: review.source,
            sentiment: review.sentiment,
            rating: review.rating,
            company_id: review.company_id,
            publisher_routing_key: keys.review_published.clone(),
            ack_routing_key: keys.review_ack.clone(),
            message_created_at: now,
        }
    }
}

impl BusMessage for ReviewMessage {
    const KIND: MessageKind = MessageKind::Review;

    fn company_id(&self) -> Option<i64> {
        Some(self.company_id)
    }
}

/// Daily per-location aggregate for one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSummaryMessage {
    pub location_id: i64,
    pub company_id: i64,
    pub source: SourceKind,
    pub rating: f64,
    pub total_response_count: i64,
    pub message_created_at: DateTime<Utc>,
}

impl ReviewSummaryMessage {
    #[must_use]
    pub fn from_summary(summary: &SourceReviewSummary, now: DateTime<Utc>) -> Self {
        Self {
            location_id: summary.location_id,
            company_id: summary.company_id,
            source: summary.source,
            rating: summary.avg_rating,
            total_response_count: summary.total_responses,
            message_created_at: now,
        }
    }
}

impl BusMessage for ReviewSummaryMessage {
    const KIND: MessageKind = MessageKind::ReviewSummary;

    fn company_id(&self) -> Option<i64> {
        Some(self.company_id)
    }
}

/// Downstream acknowledgement that a review message arrived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewReceivedMessage {
    #[serde(alias = "id")]
    pub review_id: i64,
    pub message_created_at: DateTime<Utc>,
}

impl BusMessage for ReviewReceivedMessage {
    const KIND: MessageKind = MessageKind::ReviewReceived;

    fn company_id(&self) -> Option<i64> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn routing_keys_derive_from_base() {
        let keys = RoutingKeys::new("reviews");
        assert_eq!(keys.review_published, "reviews.review.published");
        assert_eq!(keys.review_ack, "reviews.review.ack");
        assert_eq!(keys.review_summary, "reviews.review.summary");
    }

    #[test]
    fn message_kind_round_trips_through_str() {
        for kind in [
            MessageKind::Review,
            MessageKind::ReviewSummary,
            MessageKind::ReviewReceived,
        ] {
            assert_eq!(kind.as_str().parse::<MessageKind>().unwrap(), kind);
        }
        assert!("LocationCreated".parse::<MessageKind>().is_err());
    }

    #[test]
    fn review_message_copies_review_fields() {
        let published_at = Utc.with_ymd_and_hms(2025, 10, 28, 9, 0, 0).unwrap();
        let review = Review {
            id: 10,
            location_id: Some(4),
            location_name: "Maadi".to_string(),
            company_id: 2,
            source: SourceKind::Talabat,
            rating: 4,
            feedback: "good".to_string(),
            reviewer_name: Some("Omar".to_string()),
            published_at,
            review_date: published_at.date_naive(),
            scraped_at: published_at,
            sentiment: None,
            is_processed: false,
            acknowledged_at: None,
        };
        let now = Utc.with_ymd_and_hms(2025, 10, 28, 10, 0, 0).unwrap();
        let msg = ReviewMessage::from_review(&review, &RoutingKeys::new("rp"), now);

        assert_eq!(msg.id, 10);
        assert_eq!(msg.location_id, Some(4));
        assert_eq!(msg.rating, 4);
        assert_eq!(msg.publisher_routing_key, "rp.review.published");
        assert_eq!(msg.ack_routing_key, "rp.review.ack");
        assert_eq!(msg.message_created_at, now);
        assert_eq!(msg.company_id(), Some(2));
    }

    #[test]
    fn review_received_accepts_id_alias() {
        let msg: ReviewReceivedMessage = serde_json::from_value(serde_json::json!({
            "id": 77,
            "messageCreatedAt": "2025-10-28T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(msg.review_id, 77);
    }
}
