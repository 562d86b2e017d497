use async_trait::async_trait;

use crate::envelope::Envelope;
use crate::error::BusError;

/// One received message awaiting a consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct InboxEntry {
    pub id: i64,
    pub envelope: Envelope,
}

/// Durable queue of inbound messages.
///
/// Claimed entries stay invisible to other claimers until they are marked
/// handled or failed.
#[async_trait]
pub trait InboxStore: Send + Sync {
    async fn claim(&self, limit: usize) -> Result<Vec<InboxEntry>, BusError>;

    async fn mark_handled(&self, id: i64) -> Result<(), BusError>;

    /// Release the claim and keep `error` for inspection.
    async fn mark_failed(&self, id: i64, error: &str) -> Result<(), BusError>;
}
