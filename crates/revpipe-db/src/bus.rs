//! Transactional outbox and inbox tables backing the message bus.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use revpipe_bus::{BusError, BusTransport, Envelope, InboxEntry, InboxStore, MessageKind};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// Inbox rows that failed this many times are no longer claimed.
pub const INBOX_MAX_ATTEMPTS: i32 = 5;

// ---------------------------------------------------------------------------
// Outbox
// ---------------------------------------------------------------------------

/// [`BusTransport`] writing envelopes to `bus_outbox`.
///
/// A batch lands in a single statement, so it is stored completely or not
/// at all.
#[derive(Debug, Clone)]
pub struct PgOutbox {
    pool: PgPool,
}

impl PgOutbox {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BusTransport for PgOutbox {
    async fn publish_batch(&self, envelopes: &[Envelope]) -> Result<(), BusError> {
        insert_outbox(&self.pool, envelopes)
            .await
            .map(|_| ())
            .map_err(BusError::transport)
    }
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_outbox(pool: &PgPool, envelopes: &[Envelope]) -> Result<u64, DbError> {
    if envelopes.is_empty() {
        return Ok(0);
    }

    let mut message_ids: Vec<Uuid> = Vec::with_capacity(envelopes.len());
    let mut message_types: Vec<String> = Vec::with_capacity(envelopes.len());
    let mut routing_keys: Vec<String> = Vec::with_capacity(envelopes.len());
    let mut headers: Vec<serde_json::Value> = Vec::with_capacity(envelopes.len());
    let mut payloads: Vec<serde_json::Value> = Vec::with_capacity(envelopes.len());
    let mut created_ats: Vec<DateTime<Utc>> = Vec::with_capacity(envelopes.len());

    for envelope in envelopes {
        message_ids.push(envelope.message_id);
        message_types.push(envelope.message_type.as_str().to_string());
        routing_keys.push(envelope.routing_key.clone());
        headers.push(headers_to_json(&envelope.headers));
        payloads.push(envelope.payload.clone());
        created_ats.push(envelope.created_at);
    }

    let result = sqlx::query(
        "INSERT INTO bus_outbox \
             (message_id, message_type, routing_key, headers, payload, created_at) \
         SELECT * FROM UNNEST(\
              $1::uuid[], $2::text[], $3::text[], $4::jsonb[], $5::jsonb[], $6::timestamptz[])",
    )
    .bind(&message_ids)
    .bind(&message_types)
    .bind(&routing_keys)
    .bind(&headers)
    .bind(&payloads)
    .bind(&created_ats)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

fn headers_to_json(headers: &BTreeMap<String, String>) -> serde_json::Value {
    serde_json::Value::Object(
        headers
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect(),
    )
}

// ---------------------------------------------------------------------------
// Inbox
// ---------------------------------------------------------------------------

/// A claimed row from the `bus_inbox` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct InboxRow {
    pub id: i64,
    pub message_id: Uuid,
    pub message_type: String,
    pub routing_key: String,
    pub headers: serde_json::Value,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub attempts: i32,
}

impl InboxRow {
    /// # Errors
    ///
    /// Returns [`DbError::InvalidColumn`] if the message type is unknown or
    /// the headers are not a string map.
    pub fn to_envelope(&self) -> Result<Envelope, DbError> {
        let message_type =
            self.message_type
                .parse::<MessageKind>()
                .map_err(|_| DbError::InvalidColumn {
                    column: "message_type",
                    value: self.message_type.clone(),
                })?;
        let headers: BTreeMap<String, String> = serde_json::from_value(self.headers.clone())
            .map_err(|_| DbError::InvalidColumn {
                column: "headers",
                value: self.headers.to_string(),
            })?;

        Ok(Envelope {
            message_id: self.message_id,
            message_type,
            routing_key: self.routing_key.clone(),
            headers,
            created_at: self.created_at,
            payload: self.payload.clone(),
        })
    }
}

/// Claims up to `limit` unhandled inbox rows, oldest first.
///
/// Rows locked by a concurrent claimer are skipped. A claim expires after
/// five minutes so rows held by a crashed poller are picked up again.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the claim fails.
pub async fn claim_inbox_batch(pool: &PgPool, limit: i64) -> Result<Vec<InboxRow>, DbError> {
    let rows = sqlx::query_as::<_, InboxRow>(
        "UPDATE bus_inbox \
         SET claimed_at = NOW(), attempts = attempts + 1 \
         WHERE id IN ( \
             SELECT id FROM bus_inbox \
             WHERE handled_at IS NULL \
               AND attempts < $2 \
               AND (claimed_at IS NULL OR claimed_at < NOW() - INTERVAL '5 minutes') \
             ORDER BY id \
             LIMIT $1 \
             FOR UPDATE SKIP LOCKED) \
         RETURNING id, message_id, message_type, routing_key, headers, payload, \
                   created_at, attempts",
    )
    .bind(limit)
    .bind(INBOX_MAX_ATTEMPTS)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn mark_inbox_handled(pool: &PgPool, id: i64) -> Result<(), DbError> {
    sqlx::query("UPDATE bus_inbox SET handled_at = NOW(), last_error = NULL WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Releases the claim and stores the error so the row is retried.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn mark_inbox_failed(pool: &PgPool, id: i64, error: &str) -> Result<(), DbError> {
    sqlx::query("UPDATE bus_inbox SET claimed_at = NULL, last_error = $2 WHERE id = $1")
        .bind(id)
        .bind(error)
        .execute(pool)
        .await?;
    Ok(())
}

/// [`InboxStore`] over `bus_inbox`.
#[derive(Debug, Clone)]
pub struct PgInbox {
    pool: PgPool,
}

impl PgInbox {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InboxStore for PgInbox {
    async fn claim(&self, limit: usize) -> Result<Vec<InboxEntry>, BusError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = claim_inbox_batch(&self.pool, limit)
            .await
            .map_err(BusError::transport)?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            match row.to_envelope() {
                Ok(envelope) => entries.push(InboxEntry {
                    id: row.id,
                    envelope,
                }),
                // Unreadable rows keep their error and age out after INBOX_MAX_ATTEMPTS.
                Err(e) => mark_inbox_failed(&self.pool, row.id, &e.to_string())
                    .await
                    .map_err(BusError::transport)?,
            }
        }
        Ok(entries)
    }

    async fn mark_handled(&self, id: i64) -> Result<(), BusError> {
        mark_inbox_handled(&self.pool, id)
            .await
            .map_err(BusError::transport)
    }

    async fn mark_failed(&self, id: i64, error: &str) -> Result<(), BusError> {
        mark_inbox_failed(&self.pool, id, error)
            .await
            .map_err(BusError::transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revpipe_bus::ReviewReceivedMessage;
    use serde_json::json;

    fn inbox_row(message_type: &str, headers: serde_json::Value) -> InboxRow {
        InboxRow {
            id: 1,
            message_id: Uuid::new_v4(),
            message_type: message_type.to_string(),
            routing_key: "revpipe.review.ack".to_string(),
            headers,
            payload: json!({"reviewId": 77, "messageCreatedAt": "2025-10-28T10:00:00Z"}),
            created_at: Utc::now(),
            attempts: 1,
        }
    }

    #[test]
    fn inbox_row_becomes_envelope() {
        let row = inbox_row("ReviewReceivedMessage", json!({"company_id": "4"}));
        let envelope = row.to_envelope().unwrap();
        assert_eq!(envelope.message_type, MessageKind::ReviewReceived);
        assert_eq!(envelope.company_id(), Some(4));
        let message = envelope.decode::<ReviewReceivedMessage>().unwrap();
        assert_eq!(message.review_id, 77);
    }

    #[test]
    fn unknown_inbox_type_is_invalid() {
        let row = inbox_row("OrderPlaced", json!({}));
        assert!(matches!(
            row.to_envelope(),
            Err(DbError::InvalidColumn {
                column: "message_type",
                ..
            })
        ));
    }

    #[test]
    fn non_string_headers_are_invalid() {
        let row = inbox_row("ReviewReceivedMessage", json!({"company_id": 4}));
        assert!(matches!(
            row.to_envelope(),
            Err(DbError::InvalidColumn {
                column: "headers",
                ..
            })
        ));
    }

    #[test]
    fn headers_serialize_as_string_map() {
        let mut headers = BTreeMap::new();
        headers.insert("company_id".to_string(), "9".to_string());
        assert_eq!(headers_to_json(&headers), json!({"company_id": "9"}));
    }
}
