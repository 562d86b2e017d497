use async_trait::async_trait;

use crate::envelope::Envelope;
use crate::error::BusError;

/// The publish primitive behind [`EventPublisher`](crate::EventPublisher).
///
/// A batch is published as a unit: either every envelope is accepted or the
/// call fails and none are.
#[async_trait]
pub trait BusTransport: Send + Sync {
    async fn publish_batch(&self, envelopes: &[Envelope]) -> Result<(), BusError>;
}
