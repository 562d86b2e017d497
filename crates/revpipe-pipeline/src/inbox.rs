//! Drains received bus messages through the consumer registry.

use std::sync::Arc;
use std::time::Duration;

use revpipe_bus::{ConsumerRegistry, InboxStore};
use tokio::sync::watch;

use crate::PipelineError;

pub const INBOX_BATCH: usize = 50;
pub const INBOX_IDLE_DELAY: Duration = Duration::from_secs(5);

pub struct InboxPoller {
    inbox: Arc<dyn InboxStore>,
    registry: Arc<ConsumerRegistry>,
}

impl InboxPoller {
    #[must_use]
    pub fn new(inbox: Arc<dyn InboxStore>, registry: Arc<ConsumerRegistry>) -> Self {
        Self { inbox, registry }
    }

    /// Claim one batch and route each entry. Returns how many were claimed.
    ///
    /// Consumer failures are recorded on the entry and do not stop the batch.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Bus`] if the inbox itself fails.
    pub async fn poll_once(&self) -> Result<usize, PipelineError> {
        let entries = self.inbox.claim(INBOX_BATCH).await?;
        let claimed = entries.len();

        for entry in entries {
            let id = entry.id;
            let kind = entry.envelope.message_type;
            match self.registry.dispatch(entry.envelope).await {
                Ok(_) => self.inbox.mark_handled(id).await?,
                Err(e) => {
                    tracing::error!(inbox_id = id, %kind, error = %e, "inbox: message failed");
                    self.inbox.mark_failed(id, &e.to_string()).await?;
                }
            }
        }
        Ok(claimed)
    }

    /// Poll until `shutdown` turns true. A full batch polls again at once;
    /// otherwise the poller idles for [`INBOX_IDLE_DELAY`].
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("inbox: poller started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            let delay = match self.poll_once().await {
                Ok(claimed) if claimed == INBOX_BATCH => Duration::ZERO,
                Ok(_) => INBOX_IDLE_DELAY,
                Err(e) => {
                    tracing::error!(error = %e, "inbox: poll failed");
                    INBOX_IDLE_DELAY
                }
            };
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::info!("inbox: poller stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ack::build_registry;
    use crate::memory::MemoryStore;
    use chrono::Utc;
    use revpipe_bus::{Envelope, InMemoryInbox, ReviewReceivedMessage, ReviewSummaryMessage};
    use revpipe_core::SourceKind;

    fn ack(review_id: i64) -> Envelope {
        let msg = ReviewReceivedMessage {
            review_id,
            message_created_at: Utc::now(),
        };
        Envelope::wrap(&msg, "revpipe.review.ack", Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn handled_and_unrouted_entries_are_both_marked_handled() {
        let inbox = Arc::new(InMemoryInbox::new());
        let first = inbox.push(ack(1));
        let summary = ReviewSummaryMessage {
            location_id: 1,
            company_id: 1,
            source: SourceKind::Talabat,
            rating: 4.0,
            total_response_count: 1,
            message_created_at: Utc::now(),
        };
        let second = inbox.push(Envelope::wrap(&summary, "x", Utc::now()).unwrap());

        let registry = Arc::new(build_registry(Arc::new(MemoryStore::new())));
        let poller = InboxPoller::new(inbox.clone(), registry);

        assert_eq!(poller.poll_once().await.unwrap(), 2);
        assert_eq!(inbox.handled_ids(), vec![first, second]);
        assert_eq!(poller.poll_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn undecodable_payload_is_recorded_as_failure() {
        let inbox = Arc::new(InMemoryInbox::new());
        let mut bad = ack(1);
        bad.payload = serde_json::json!({"nope": true});
        let id = inbox.push(bad);

        let registry = Arc::new(build_registry(Arc::new(MemoryStore::new())));
        let poller = InboxPoller::new(inbox.clone(), registry);

        assert_eq!(poller.poll_once().await.unwrap(), 1);
        assert!(inbox.handled_ids().is_empty());
        assert_eq!(inbox.pending_ids(), vec![id]);
        assert!(inbox.last_error(id).is_some());
    }
}
