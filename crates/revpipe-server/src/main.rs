mod scheduler;
mod services;

use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use crate::services::Services;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(revpipe_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    tracing::info!(env = %config.env, "revpipe-server starting");

    let pool_config = revpipe_db::PoolConfig::from_app_config(&config);
    let pool = revpipe_db::connect_pool(&config.database_url, pool_config).await?;
    let applied = revpipe_db::run_migrations(&pool).await?;
    tracing::info!(applied, "migrations complete");

    let services = Arc::new(Services::build(pool, &config)?);

    let mut scheduler = if config.scheduler_enabled {
        Some(scheduler::build_scheduler(Arc::clone(&services), &config.cron).await?)
    } else {
        tracing::info!("scheduler disabled; cron jobs not registered");
        None
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let dispatcher = tokio::spawn({
        let services = Arc::clone(&services);
        let shutdown = shutdown_rx.clone();
        async move { services.dispatcher.run(shutdown).await }
    });
    let inbox = tokio::spawn({
        let services = Arc::clone(&services);
        async move { services.inbox.run(shutdown_rx).await }
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(true);

    if let Some(scheduler) = scheduler.as_mut() {
        scheduler.shutdown().await?;
    }
    dispatcher.await?;
    inbox.await?;
    tracing::info!("revpipe-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
