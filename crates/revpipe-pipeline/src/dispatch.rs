//! Standing loop publishing stored reviews to the bus.
//!
//! Each cycle publishes one batch and only then marks it processed, so a
//! crash between the two re-publishes the batch rather than losing it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use revpipe_bus::{BusTransport, EventPublisher, ReviewMessage, RoutingKeys};
use revpipe_core::{ReviewStore, TenantContext};
use tokio::sync::{watch, Semaphore};

use crate::PipelineError;

pub const BUSY_DELAY: Duration = Duration::from_secs(5);
pub const ERROR_DELAY: Duration = Duration::from_secs(5);
pub const FULL_BATCH_DELAY: Duration = Duration::from_secs(30);
pub const IDLE_DELAY: Duration = Duration::from_secs(10 * 60);

/// What one dispatch cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Another cycle holds the guard.
    Busy,
    /// `count` reviews were published and marked. `more` is set when the
    /// store held more than one batch.
    Dispatched { count: usize, more: bool },
    Failed,
}

impl CycleOutcome {
    #[must_use]
    pub fn next_delay(self) -> Duration {
        match self {
            CycleOutcome::Busy => BUSY_DELAY,
            CycleOutcome::Failed => ERROR_DELAY,
            CycleOutcome::Dispatched { more: true, .. } => FULL_BATCH_DELAY,
            CycleOutcome::Dispatched { more: false, .. } => IDLE_DELAY,
        }
    }
}

pub struct Dispatcher {
    reviews: Arc<dyn ReviewStore>,
    transport: Arc<dyn BusTransport>,
    keys: RoutingKeys,
    batch_limit: usize,
    guard: Arc<Semaphore>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        reviews: Arc<dyn ReviewStore>,
        transport: Arc<dyn BusTransport>,
        keys: RoutingKeys,
        batch_limit: usize,
    ) -> Self {
        Self::with_guard(
            reviews,
            transport,
            keys,
            batch_limit,
            Arc::new(Semaphore::new(1)),
        )
    }

    /// Share `guard` with other dispatchers in this process so at most one
    /// cycle runs at a time.
    #[must_use]
    pub fn with_guard(
        reviews: Arc<dyn ReviewStore>,
        transport: Arc<dyn BusTransport>,
        keys: RoutingKeys,
        batch_limit: usize,
        guard: Arc<Semaphore>,
    ) -> Self {
        Self {
            reviews,
            transport,
            keys,
            batch_limit: batch_limit.max(1),
            guard,
        }
    }

    /// Run one cycle. Errors are logged and reported as
    /// [`CycleOutcome::Failed`].
    pub async fn cycle(&self, now: DateTime<Utc>) -> CycleOutcome {
        let Ok(_permit) = self.guard.try_acquire() else {
            tracing::debug!("dispatch: previous cycle still running");
            return CycleOutcome::Busy;
        };

        match self.dispatch_batch(now).await {
            Ok((count, more)) => {
                if count > 0 {
                    tracing::info!(count, more, "dispatch: reviews published");
                }
                CycleOutcome::Dispatched { count, more }
            }
            Err(e) => {
                tracing::error!(error = %e, "dispatch: cycle failed");
                CycleOutcome::Failed
            }
        }
    }

    async fn dispatch_batch(&self, now: DateTime<Utc>) -> Result<(usize, bool), PipelineError> {
        let ctx = TenantContext::system();

        // One extra row tells us whether another batch is waiting.
        let mut batch = self
            .reviews
            .fetch_unprocessed(&ctx, self.batch_limit + 1)
            .await?;
        let more = batch.len() > self.batch_limit;
        if more {
            batch.truncate(self.batch_limit);
        }
        if batch.is_empty() {
            return Ok((0, false));
        }

        let mut publisher = EventPublisher::new(Arc::clone(&self.transport));
        for review in &batch {
            let message = ReviewMessage::from_review(review, &self.keys, now);
            publisher.stage(&message, &self.keys.review_published, now)?;
        }
        publisher.flush().await?;

        let ids: Vec<i64> = batch.iter().map(|r| r.id).collect();
        let marked = self.reviews.mark_processed(&ctx, &ids).await?;
        if usize::try_from(marked).ok() != Some(ids.len()) {
            tracing::warn!(
                published = ids.len(),
                marked,
                "dispatch: fewer reviews marked than published"
            );
        }
        Ok((batch.len(), more))
    }

    /// Loop until `shutdown` turns true, sleeping between cycles according
    /// to each outcome.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(batch_limit = self.batch_limit, "dispatch: loop started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            let outcome = self.cycle(Utc::now()).await;
            let delay = outcome.next_delay();
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::info!("dispatch: loop stopped");
    }
}

#[cfg(test)]
#[path = "dispatch_test.rs"]
mod tests;
