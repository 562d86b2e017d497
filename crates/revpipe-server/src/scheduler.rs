//! Background job scheduler.
//!
//! Initialises a [`JobScheduler`] at startup and registers the recurring
//! scrape, audit and summary jobs.

use std::sync::Arc;

use chrono::Utc;
use revpipe_core::{CronConfig, SourceKind};
use revpipe_scraper::FetchParams;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::services::Services;

/// One recurring job and the cron expression that triggers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CronTask {
    Scrape(SourceKind),
    Audit,
    PublishSummaries,
}

fn cron_tasks(cron: &CronConfig) -> Vec<(CronTask, &str)> {
    vec![
        (
            CronTask::Scrape(SourceKind::Talabat),
            cron.talabat_scrape.as_str(),
        ),
        (
            CronTask::Scrape(SourceKind::Instashop),
            cron.instashop_scrape.as_str(),
        ),
        (CronTask::Audit, cron.scrape_audit.as_str()),
        (CronTask::PublishSummaries, cron.summary_publish.as_str()),
    ]
}

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive
/// for the lifetime of the process; dropping it stops all jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// a cron expression is invalid, or the scheduler fails to start.
pub async fn build_scheduler(
    services: Arc<Services>,
    cron: &CronConfig,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    for (task, expr) in cron_tasks(cron) {
        register(&scheduler, Arc::clone(&services), task, expr).await?;
        tracing::info!(?task, cron = expr, "scheduler: job registered");
    }

    scheduler.start().await?;
    Ok(scheduler)
}

async fn register(
    scheduler: &JobScheduler,
    services: Arc<Services>,
    task: CronTask,
    expr: &str,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(expr, move |_uuid, _lock| {
        let services = Arc::clone(&services);

        Box::pin(async move {
            tracing::info!(?task, "scheduler: job triggered");
            run_task(&services, task).await;
        })
    })?;

    scheduler.add(job).await?;
    Ok(())
}

async fn run_task(services: &Services, task: CronTask) {
    match task {
        CronTask::Scrape(source) => {
            let (limit, max) = FetchParams::default_limits(source);
            match services.scrape.schedule_run(source, limit, max).await {
                Ok(report) => tracing::info!(
                    %source,
                    dispatched = report.dispatched,
                    "scheduler: scrape run scheduled"
                ),
                Err(e) => tracing::error!(%source, error = %e, "scheduler: scrape run failed"),
            }
        }
        CronTask::Audit => {
            for source in SourceKind::ALL {
                if let Err(e) = services
                    .auditor
                    .schedule_audits(services.queue.as_ref(), source)
                    .await
                {
                    tracing::error!(%source, error = %e, "scheduler: audit scheduling failed");
                }
            }
        }
        CronTask::PublishSummaries => {
            if let Err(e) = services.summaries.publish_recent(Utc::now()).await {
                tracing::error!(error = %e, "scheduler: summary publication failed");
            }
        }
    }
}
