//! Review ingestion and dispatch.
//!
//! Scrape runs fan out over a time window through a [`JobQueue`]; each unit
//! fetches one location, upserts the daily summary and stores the recent
//! reviews. The [`Dispatcher`] forwards stored reviews to the bus.

pub mod ack;
pub mod audit;
pub mod dispatch;
pub mod fetch;
pub mod inbox;
pub mod memory;
pub mod publish;
pub mod queue;
pub mod schedule;
pub mod summary;

use revpipe_bus::BusError;
use revpipe_core::StoreError;
use thiserror::Error;

pub use ack::{build_registry, AcknowledgementConsumer};
pub use audit::{is_stale, ScrapeAuditor};
pub use dispatch::{CycleOutcome, Dispatcher};
pub use fetch::{Ingest, LocationFetcher, ScrapeUnit, UnitFailure, UnitOutcome};
pub use inbox::InboxPoller;
pub use memory::{MemoryStore, StaticFetcher, StoreOp};
pub use publish::SummaryPublisher;
pub use queue::{InlineQueue, Job, JobQueue, RetryPolicy, TokioJobQueue};
pub use schedule::{distribution_delays, RunReport, ScrapeScheduler};
pub use summary::{summary_from_response, upsert_summary};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Bus(#[from] BusError),
}
