mod app_config;
mod config;
pub mod domain;
pub mod store;
mod tenant;

use thiserror::Error;

pub use app_config::{AppConfig, CronConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use domain::{
    Location, NewReview, Review, Sentiment, SourceIdentifier, SourceKind, SourceReviewSummary,
    SummaryUpsert,
};
pub use store::{LocationStore, ReviewStore, StoreError, SummaryStore};
pub use tenant::TenantContext;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for environment variable {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown review source: {0}")]
    UnknownSource(String),

    #[error("unknown sentiment label: {0}")]
    UnknownSentiment(String),
}
