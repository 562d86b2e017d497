use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BusError;
use crate::messages::{BusMessage, MessageKind};

pub const COMPANY_ID_HEADER: &str = "company_id";

/// Wire form of every bus message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub message_id: Uuid,
    pub message_type: MessageKind,
    pub routing_key: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl Envelope {
    /// # Errors
    ///
    /// Returns [`BusError::Encode`] if the message cannot be serialized.
    pub fn wrap<M: BusMessage>(
        message: &M,
        routing_key: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, BusError> {
        let payload = serde_json::to_value(message).map_err(|source| BusError::Encode {
            kind: M::KIND,
            source,
        })?;
        let mut headers = BTreeMap::new();
        if let Some(company_id) = message.company_id() {
            headers.insert(COMPANY_ID_HEADER.to_string(), company_id.to_string());
        }
        Ok(Self {
            message_id: Uuid::new_v4(),
            message_type: M::KIND,
            routing_key: routing_key.to_string(),
            headers,
            created_at: now,
            payload,
        })
    }

    /// # Errors
    ///
    /// Returns [`BusError::KindMismatch`] if the envelope holds a different
    /// message type, or [`BusError::Decode`] if the payload does not match.
    pub fn decode<M: BusMessage>(&self) -> Result<M, BusError> {
        if self.message_type != M::KIND {
            return Err(BusError::KindMismatch {
                expected: M::KIND,
                actual: self.message_type,
            });
        }
        serde_json::from_value(self.payload.clone()).map_err(|source| BusError::Decode {
            kind: M::KIND,
            source,
        })
    }

    #[must_use]
    pub fn company_id(&self) -> Option<i64> {
        self.headers
            .get(COMPANY_ID_HEADER)
            .and_then(|v| v.parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{ReviewReceivedMessage, ReviewSummaryMessage};
    use chrono::TimeZone;
    use revpipe_core::SourceKind;

    fn summary() -> ReviewSummaryMessage {
        ReviewSummaryMessage {
            location_id: 3,
            company_id: 8,
            source: SourceKind::Instashop,
            rating: 4.5,
            total_response_count: 12,
            message_created_at: Utc.with_ymd_and_hms(2025, 10, 28, 1, 0, 0).unwrap(),
        }
    }

    #[test]
    fn wrap_sets_kind_and_company_header() {
        let now = Utc.with_ymd_and_hms(2025, 10, 28, 1, 0, 0).unwrap();
        let env = Envelope::wrap(&summary(), "rp.review.summary", now).unwrap();
        assert_eq!(env.message_type, MessageKind::ReviewSummary);
        assert_eq!(env.routing_key, "rp.review.summary");
        assert_eq!(env.company_id(), Some(8));
        assert_eq!(env.created_at, now);
        assert_eq!(env.decode::<ReviewSummaryMessage>().unwrap(), summary());
    }

    #[test]
    fn message_without_company_has_no_header() {
        let msg = ReviewReceivedMessage {
            review_id: 1,
            message_created_at: Utc::now(),
        };
        let env = Envelope::wrap(&msg, "rp.review.ack", Utc::now()).unwrap();
        assert!(env.headers.is_empty());
        assert_eq!(env.company_id(), None);
    }

    #[test]
    fn decode_rejects_other_kinds() {
        let env = Envelope::wrap(&summary(), "rp", Utc::now()).unwrap();
        let err = env.decode::<ReviewReceivedMessage>().unwrap_err();
        assert!(matches!(
            err,
            BusError::KindMismatch {
                expected: MessageKind::ReviewReceived,
                actual: MessageKind::ReviewSummary
            }
        ));
    }

    #[test]
    fn envelope_serializes_message_type_by_name() {
        let env = Envelope::wrap(&summary(), "rp", Utc::now()).unwrap();
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["message_type"], "ReviewSummaryMessage");
        assert_eq!(json["payload"]["totalResponseCount"], 12);
    }
}
