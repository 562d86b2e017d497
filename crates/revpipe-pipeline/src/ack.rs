//! Inbound acknowledgements from downstream consumers.

use std::sync::Arc;

use async_trait::async_trait;
use revpipe_bus::{
    BusError, Consumer, ConsumerRegistry, Envelope, MessageKind, ReviewReceivedMessage,
};
use revpipe_core::{ReviewStore, TenantContext};

/// Stamps `acknowledged_at` on the review named by a `ReviewReceived` message.
pub struct AcknowledgementConsumer {
    reviews: Arc<dyn ReviewStore>,
}

impl AcknowledgementConsumer {
    #[must_use]
    pub fn new(reviews: Arc<dyn ReviewStore>) -> Self {
        Self { reviews }
    }
}

#[async_trait]
impl Consumer<ReviewReceivedMessage> for AcknowledgementConsumer {
    async fn consume(
        &self,
        message: ReviewReceivedMessage,
        envelope: &Envelope,
    ) -> Result<(), BusError> {
        let ctx = envelope
            .company_id()
            .map_or_else(TenantContext::system, TenantContext::for_company);

        let found = self
            .reviews
            .record_acknowledgement(&ctx, message.review_id, message.message_created_at)
            .await
            .map_err(|e| BusError::Consumer {
                kind: MessageKind::ReviewReceived,
                source: Box::new(e),
            })?;

        if found {
            tracing::debug!(
                review_id = message.review_id,
                actor = ctx.actor(),
                "ack: review acknowledged"
            );
        } else {
            tracing::warn!(
                review_id = message.review_id,
                actor = ctx.actor(),
                message_id = %envelope.message_id,
                "ack: acknowledged review not found"
            );
        }
        Ok(())
    }
}

/// Registry with every inbound consumer this service handles.
#[must_use]
pub fn build_registry(reviews: Arc<dyn ReviewStore>) -> ConsumerRegistry {
    let mut registry = ConsumerRegistry::new();
    let consumer = Arc::new(AcknowledgementConsumer::new(reviews));
    registry.register::<ReviewReceivedMessage, _>(consumer);
    registry
}
