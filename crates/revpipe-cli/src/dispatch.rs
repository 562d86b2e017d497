//! Outbound publication command handlers.

use std::sync::Arc;

use chrono::Utc;
use revpipe_bus::RoutingKeys;
use revpipe_core::AppConfig;
use revpipe_db::{PgOutbox, PgStore};
use revpipe_pipeline::{CycleOutcome, Dispatcher, SummaryPublisher};

/// Run a single dispatch cycle.
///
/// # Errors
///
/// Returns an error if the cycle fails to publish or mark its batch.
pub(crate) async fn run_dispatch_once(
    pool: &sqlx::PgPool,
    config: &AppConfig,
) -> anyhow::Result<()> {
    let dispatcher = Dispatcher::new(
        Arc::new(PgStore::new(pool.clone())),
        Arc::new(PgOutbox::new(pool.clone())),
        RoutingKeys::new(&config.bus_routing_key),
        config.dispatch_batch_size,
    );

    match dispatcher.cycle(Utc::now()).await {
        CycleOutcome::Dispatched { count, more } => {
            println!("dispatched {count} reviews");
            if more {
                println!("more unprocessed reviews remain; run again");
            }
            Ok(())
        }
        CycleOutcome::Busy => anyhow::bail!("another dispatch cycle is running"),
        CycleOutcome::Failed => anyhow::bail!("dispatch cycle failed, see logs"),
    }
}

/// Publish the recent per-source summaries.
///
/// # Errors
///
/// Returns an error if summaries cannot be read or published.
pub(crate) async fn run_publish_summaries(
    pool: &sqlx::PgPool,
    config: &AppConfig,
) -> anyhow::Result<()> {
    let publisher = SummaryPublisher::new(
        Arc::new(PgStore::new(pool.clone())),
        Arc::new(PgOutbox::new(pool.clone())),
        RoutingKeys::new(&config.bus_routing_key),
    );
    let published = publisher.publish_recent(Utc::now()).await?;
    println!("published {published} summaries");
    Ok(())
}
