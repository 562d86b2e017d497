use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::envelope::Envelope;
use crate::error::BusError;
use crate::messages::BusMessage;
use crate::transport::BusTransport;

/// Stages messages and publishes them together on [`flush`](Self::flush).
pub struct EventPublisher {
    transport: Arc<dyn BusTransport>,
    staged: Vec<Envelope>,
}

impl EventPublisher {
    #[must_use]
    pub fn new(transport: Arc<dyn BusTransport>) -> Self {
        Self {
            transport,
            staged: Vec::new(),
        }
    }

    /// # Errors
    ///
    /// Returns [`BusError::Encode`] if the message cannot be serialized.
    pub fn stage<M: BusMessage>(
        &mut self,
        message: &M,
        routing_key: &str,
        now: DateTime<Utc>,
    ) -> Result<(), BusError> {
        self.staged.push(Envelope::wrap(message, routing_key, now)?);
        tracing::debug!(
            kind = %M::KIND,
            staged = self.staged.len(),
            "bus: message staged"
        );
        Ok(())
    }

    #[must_use]
    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    /// Publish everything staged so far and clear the stage.
    ///
    /// The stage is cleared even when publishing fails; callers re-derive
    /// unpublished work from their own state.
    ///
    /// # Errors
    ///
    /// Propagates the transport's error.
    pub async fn flush(&mut self) -> Result<usize, BusError> {
        let batch = std::mem::take(&mut self.staged);
        if batch.is_empty() {
            return Ok(0);
        }
        self.transport.publish_batch(&batch).await?;
        tracing::info!(count = batch.len(), "bus: published events");
        Ok(batch.len())
    }
}
