use crate::app_config::{AppConfig, CronConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from the variables already in the process.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

fn invalid(var: &str, reason: impl ToString) -> ConfigError {
    ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason: reason.to_string(),
    }
}

fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e))
    };

    let parse_bool = |var: &str, default: &str| -> Result<bool, ConfigError> {
        match or_default(var, default).to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(invalid(var, format!("expected a boolean, got {other:?}"))),
        }
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("REVPIPE_ENV", "development"));
    let log_level = or_default("REVPIPE_LOG_LEVEL", "info");

    let db_max_connections = parse_u32("REVPIPE_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("REVPIPE_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("REVPIPE_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let scraper_base_url = or_default("REVPIPE_SCRAPER_BASE_URL", "http://localhost:8080")
        .trim_end_matches('/')
        .to_string();
    let scraper_request_timeout_secs = parse_u64("REVPIPE_SCRAPER_REQUEST_TIMEOUT_SECS", "60")?;
    let scraper_user_agent = or_default(
        "REVPIPE_SCRAPER_USER_AGENT",
        "revpipe/0.1 (review-ingestion)",
    );
    let scraper_max_retries = parse_u32("REVPIPE_SCRAPER_MAX_RETRIES", "2")?;
    let scraper_retry_backoff_base_secs =
        parse_u64("REVPIPE_SCRAPER_RETRY_BACKOFF_BASE_SECS", "2")?;

    let job_distribution_minutes = parse_u64("REVPIPE_JOB_DISTRIBUTION_MINUTES", "30")?;
    if job_distribution_minutes == 0 {
        return Err(invalid(
            "REVPIPE_JOB_DISTRIBUTION_MINUTES",
            "must be greater than zero",
        ));
    }
    let job_max_attempts = parse_u32("REVPIPE_JOB_MAX_ATTEMPTS", "3")?;
    if job_max_attempts == 0 {
        return Err(invalid("REVPIPE_JOB_MAX_ATTEMPTS", "must be at least 1"));
    }
    let scheduler_enabled = parse_bool("REVPIPE_SCHEDULER_ENABLED", "true")?;

    let cron = CronConfig {
        talabat_scrape: or_default("REVPIPE_TALABAT_CRON", "0 0 20 * * *"),
        instashop_scrape: or_default("REVPIPE_INSTASHOP_CRON", "0 0 20 * * *"),
        scrape_audit: or_default("REVPIPE_AUDIT_CRON", "0 30 * * * *"),
        summary_publish: or_default("REVPIPE_SUMMARY_PUBLISH_CRON", "0 1 * * * *"),
    };

    let bus_routing_key = or_default("REVPIPE_BUS_ROUTING_KEY", "revpipe");
    if bus_routing_key.trim().is_empty() {
        return Err(invalid("REVPIPE_BUS_ROUTING_KEY", "must not be empty"));
    }

    let dispatch_batch_size = or_default("REVPIPE_DISPATCH_BATCH_SIZE", "100")
        .parse::<usize>()
        .map_err(|e| invalid("REVPIPE_DISPATCH_BATCH_SIZE", e))?;
    if dispatch_batch_size == 0 {
        return Err(invalid(
            "REVPIPE_DISPATCH_BATCH_SIZE",
            "must be greater than zero",
        ));
    }

    let stale_after_hours = or_default("REVPIPE_STALE_AFTER_HOURS", "3")
        .parse::<i64>()
        .map_err(|e| invalid("REVPIPE_STALE_AFTER_HOURS", e))?;
    if stale_after_hours <= 0 {
        return Err(invalid("REVPIPE_STALE_AFTER_HOURS", "must be positive"));
    }

    Ok(AppConfig {
        database_url,
        env,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        scraper_base_url,
        scraper_request_timeout_secs,
        scraper_user_agent,
        scraper_max_retries,
        scraper_retry_backoff_base_secs,
        job_distribution_minutes,
        job_max_attempts,
        scheduler_enabled,
        cron,
        bus_routing_key,
        dispatch_batch_size,
        stale_after_hours,
    })
}

/// Unrecognized values default to `Environment::Development`.
fn parse_environment(s: &str) -> Environment {
    match s {
        "production" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
