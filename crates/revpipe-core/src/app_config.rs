#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Cron expressions for the recurring jobs (six-field, seconds first).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronConfig {
    pub talabat_scrape: String,
    pub instashop_scrape: String,
    pub scrape_audit: String,
    pub summary_publish: String,
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub scraper_base_url: String,
    pub scraper_request_timeout_secs: u64,
    pub scraper_user_agent: String,
    pub scraper_max_retries: u32,
    pub scraper_retry_backoff_base_secs: u64,
    pub job_distribution_minutes: u64,
    pub job_max_attempts: u32,
    pub scheduler_enabled: bool,
    pub cron: CronConfig,
    pub bus_routing_key: String,
    pub dispatch_batch_size: usize,
    pub stale_after_hours: i64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("scraper_base_url", &self.scraper_base_url)
            .field(
                "scraper_request_timeout_secs",
                &self.scraper_request_timeout_secs,
            )
            .field("scraper_user_agent", &self.scraper_user_agent)
            .field("scraper_max_retries", &self.scraper_max_retries)
            .field(
                "scraper_retry_backoff_base_secs",
                &self.scraper_retry_backoff_base_secs,
            )
            .field("job_distribution_minutes", &self.job_distribution_minutes)
            .field("job_max_attempts", &self.job_max_attempts)
            .field("scheduler_enabled", &self.scheduler_enabled)
            .field("cron", &self.cron)
            .field("bus_routing_key", &self.bus_routing_key)
            .field("dispatch_batch_size", &self.dispatch_batch_size)
            .field("stale_after_hours", &self.stale_after_hours)
            .finish()
    }
}
