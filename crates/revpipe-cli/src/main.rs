mod db;
mod dispatch;
mod scrape;

use clap::{Parser, Subcommand};
use revpipe_core::SourceKind;
use revpipe_scraper::FetchParams;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "revpipe-cli")]
#[command(about = "revpipe operator command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Scrape every eligible location for one source, in this process
    Scrape {
        /// Source platform: talabat or instashop
        #[arg(value_parser = parse_source)]
        source: SourceKind,
        /// Reviews requested per upstream page
        #[arg(long)]
        limit_per_request: Option<u32>,
        /// Upper bound on reviews fetched per location
        #[arg(long)]
        max_reviews: Option<u32>,
        /// List the scrape units without fetching anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Re-scrape locations whose last successful scrape is stale
    Audit {
        #[arg(value_parser = parse_source)]
        source: SourceKind,
    },
    /// Publish one batch of unprocessed reviews to the outbox
    Dispatch,
    /// Summary publication
    Summaries {
        #[command(subcommand)]
        command: SummaryCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    Ping,
    Migrate,
}

#[derive(Debug, Subcommand)]
enum SummaryCommands {
    /// Publish summaries dated yesterday or today
    Publish,
}

fn parse_source(value: &str) -> Result<SourceKind, String> {
    value.parse().map_err(|e: revpipe_core::CoreError| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("revpipe-cli: no command given, see --help");
        return Ok(());
    };

    let config = revpipe_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = revpipe_db::PoolConfig::from_app_config(&config);
    let pool = revpipe_db::connect_pool(&config.database_url, pool_config).await?;

    match command {
        Commands::Db { command } => match command {
            DbCommands::Ping => db::run_ping(&pool).await?,
            DbCommands::Migrate => db::run_migrate(&pool).await?,
        },
        Commands::Scrape {
            source,
            limit_per_request,
            max_reviews,
            dry_run,
        } => {
            let (default_limit, default_max) = FetchParams::default_limits(source);
            let limits = scrape::Limits {
                per_request: limit_per_request.unwrap_or(default_limit),
                max_reviews: max_reviews.unwrap_or(default_max),
            };
            scrape::run_scrape(&pool, &config, source, limits, dry_run).await?;
        }
        Commands::Audit { source } => scrape::run_audit(&pool, &config, source).await?,
        Commands::Dispatch => dispatch::run_dispatch_once(&pool, &config).await?,
        Commands::Summaries {
            command: SummaryCommands::Publish,
        } => dispatch::run_publish_summaries(&pool, &config).await?,
    }

    pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests;
