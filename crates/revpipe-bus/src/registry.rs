//! Inbound message routing.
//!
//! Consumers are registered explicitly at startup, one per message kind.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::envelope::Envelope;
use crate::error::BusError;
use crate::messages::{BusMessage, MessageKind};

/// Handles one decoded message type.
#[async_trait]
pub trait Consumer<M: BusMessage>: Send + Sync {
    async fn consume(&self, message: M, envelope: &Envelope) -> Result<(), BusError>;
}

type Handler = Arc<dyn Fn(Envelope) -> BoxFuture<'static, Result<(), BusError>> + Send + Sync>;

/// Result of routing one envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    Handled,
    /// No consumer is registered for the envelope's kind.
    Unrouted,
}

#[derive(Default)]
pub struct ConsumerRegistry {
    handlers: HashMap<MessageKind, Handler>,
}

impl ConsumerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `consumer` for `M`. A later registration for the same kind
    /// replaces the earlier one.
    pub fn register<M, C>(&mut self, consumer: Arc<C>)
    where
        M: BusMessage,
        C: Consumer<M> + 'static,
    {
        let handler: Handler = Arc::new(
            move |envelope: Envelope| -> BoxFuture<'static, Result<(), BusError>> {
                let consumer = Arc::clone(&consumer);
                Box::pin(async move {
                    let message = envelope.decode::<M>()?;
                    consumer.consume(message, &envelope).await
                })
            },
        );
        if self.handlers.insert(M::KIND, handler).is_some() {
            tracing::warn!(kind = %M::KIND, "bus: consumer replaced");
        }
    }

    #[must_use]
    pub fn is_registered(&self, kind: MessageKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Route `envelope` to its consumer. Unknown kinds are logged and dropped.
    ///
    /// # Errors
    ///
    /// Returns the consumer's error, or a decode error if the payload does
    /// not match its declared kind.
    pub async fn dispatch(&self, envelope: Envelope) -> Result<RouteOutcome, BusError> {
        let Some(handler) = self.handlers.get(&envelope.message_type) else {
            tracing::warn!(
                kind = %envelope.message_type,
                message_id = %envelope.message_id,
                "bus: no consumer registered, dropping message"
            );
            return Ok(RouteOutcome::Unrouted);
        };
        let handler = Arc::clone(handler);
        handler(envelope).await?;
        Ok(RouteOutcome::Handled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{ReviewReceivedMessage, ReviewSummaryMessage};
    use chrono::Utc;
    use revpipe_core::SourceKind;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl Consumer<ReviewReceivedMessage> for Recorder {
        async fn consume(
            &self,
            message: ReviewReceivedMessage,
            _envelope: &Envelope,
        ) -> Result<(), BusError> {
            self.seen.lock().unwrap().push(message.review_id);
            Ok(())
        }
    }

    #[derive(Debug, thiserror::Error)]
    #[error("boom")]
    struct Boom;

    struct Failing;

    #[async_trait]
    impl Consumer<ReviewReceivedMessage> for Failing {
        async fn consume(
            &self,
            _message: ReviewReceivedMessage,
            _envelope: &Envelope,
        ) -> Result<(), BusError> {
            Err(BusError::Consumer {
                kind: MessageKind::ReviewReceived,
                source: Box::new(Boom),
            })
        }
    }

    fn received(id: i64) -> Envelope {
        let msg = ReviewReceivedMessage {
            review_id: id,
            message_created_at: Utc::now(),
        };
        Envelope::wrap(&msg, "rp.review.ack", Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn dispatches_to_registered_consumer() {
        let recorder = Arc::new(Recorder::default());
        let mut registry = ConsumerRegistry::new();
        registry.register::<ReviewReceivedMessage, _>(recorder.clone());

        assert!(registry.is_registered(MessageKind::ReviewReceived));
        let outcome = registry.dispatch(received(5)).await.unwrap();
        assert_eq!(outcome, RouteOutcome::Handled);
        assert_eq!(*recorder.seen.lock().unwrap(), vec![5]);
    }

    #[tokio::test]
    async fn unknown_kind_is_dropped() {
        let registry = ConsumerRegistry::new();
        let summary = ReviewSummaryMessage {
            location_id: 1,
            company_id: 1,
            source: SourceKind::Talabat,
            rating: 4.0,
            total_response_count: 3,
            message_created_at: Utc::now(),
        };
        let env = Envelope::wrap(&summary, "rp", Utc::now()).unwrap();
        let outcome = registry.dispatch(env).await.unwrap();
        assert_eq!(outcome, RouteOutcome::Unrouted);
    }

    #[tokio::test]
    async fn consumer_errors_propagate() {
        let mut registry = ConsumerRegistry::new();
        registry.register::<ReviewReceivedMessage, _>(Arc::new(Failing));
        let result = registry.dispatch(received(1)).await;
        assert!(matches!(result, Err(BusError::Consumer { .. })));
    }

    #[tokio::test]
    async fn malformed_payload_is_a_decode_error() {
        let recorder = Arc::new(Recorder::default());
        let mut registry = ConsumerRegistry::new();
        registry.register::<ReviewReceivedMessage, _>(recorder.clone());

        let mut env = received(1);
        env.payload = serde_json::json!({"unexpected": true});
        let result = registry.dispatch(env).await;
        assert!(matches!(result, Err(BusError::Decode { .. })));
        assert!(recorder.seen.lock().unwrap().is_empty());
    }
}
