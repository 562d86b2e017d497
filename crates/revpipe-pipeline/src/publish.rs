//! Publication of the recent daily summaries.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use revpipe_bus::{BusTransport, EventPublisher, ReviewSummaryMessage, RoutingKeys};
use revpipe_core::{SummaryStore, TenantContext};

use crate::PipelineError;

pub struct SummaryPublisher {
    summaries: Arc<dyn SummaryStore>,
    transport: Arc<dyn BusTransport>,
    keys: RoutingKeys,
}

impl SummaryPublisher {
    #[must_use]
    pub fn new(
        summaries: Arc<dyn SummaryStore>,
        transport: Arc<dyn BusTransport>,
        keys: RoutingKeys,
    ) -> Self {
        Self {
            summaries,
            transport,
            keys,
        }
    }

    /// Publish one message per summary dated yesterday or today with at
    /// least one response. Returns the number published.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the summaries cannot be read or the
    /// batch cannot be published.
    pub async fn publish_recent(&self, now: DateTime<Utc>) -> Result<usize, PipelineError> {
        let today = now.date_naive();
        let since = today.pred_opt().unwrap_or(today);
        let rows = self
            .summaries
            .list_summaries_since(&TenantContext::system(), since)
            .await?;

        let mut publisher = EventPublisher::new(Arc::clone(&self.transport));
        let mut skipped = 0;
        for row in &rows {
            if row.total_responses == 0 {
                skipped += 1;
                continue;
            }
            let message = ReviewSummaryMessage::from_summary(row, now);
            publisher.stage(&message, &self.keys.review_summary, now)?;
        }
        let published = publisher.flush().await?;

        tracing::info!(
            found = rows.len(),
            skipped,
            published,
            "publish: review summaries sent"
        );
        Ok(published)
    }
}
