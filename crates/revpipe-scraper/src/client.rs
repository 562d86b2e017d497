//! HTTP client for the review scraper services.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use revpipe_core::{AppConfig, SourceIdentifier, SourceKind};

use crate::error::ScraperError;
use crate::retry::retry_with_backoff;
use crate::types::{InstashopResponse, ScrapeResponse, TalabatResponse};

/// Format of the `timeStamp` query parameter.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d:%H:%M";

/// Query window and paging for one scraper call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchParams {
    /// Lower bound of the lookback window.
    pub since: DateTime<Utc>,
    pub limit_per_request: u32,
    pub max_reviews: u32,
}

impl FetchParams {
    /// Talabat pages 5 at a time up to 100; Instashop 20 at a time up to 50.
    #[must_use]
    pub fn default_limits(source: SourceKind) -> (u32, u32) {
        match source {
            SourceKind::Talabat => (5, 100),
            SourceKind::Instashop => (20, 50),
        }
    }

    /// Lookback of 24 hours before `now`.
    #[must_use]
    pub fn last_24h(now: DateTime<Utc>, limit_per_request: u32, max_reviews: u32) -> Self {
        Self {
            since: now - chrono::Duration::hours(24),
            limit_per_request,
            max_reviews,
        }
    }
}

fn endpoint(source: SourceKind) -> &'static str {
    match source {
        SourceKind::Talabat => "talabat",
        SourceKind::Instashop => "instashop",
    }
}

/// Client for the `/talabat` and `/instashop` scraper endpoints.
///
/// Network failures, 429s and 5xx responses are retried with exponential
/// backoff up to `max_retries` extra attempts.
#[derive(Debug, Clone)]
pub struct ScraperClient {
    client: Client,
    base_url: String,
    max_retries: u32,
    backoff_base_secs: u64,
}

impl ScraperClient {
    /// # Errors
    ///
    /// Returns [`ScraperError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(
        base_url: &str,
        timeout_secs: u64,
        user_agent: &str,
        max_retries: u32,
        backoff_base_secs: u64,
    ) -> Result<Self, ScraperError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries,
            backoff_base_secs,
        })
    }

    /// # Errors
    ///
    /// Returns [`ScraperError::Http`] if the HTTP client cannot be built.
    pub fn from_config(config: &AppConfig) -> Result<Self, ScraperError> {
        Self::new(
            &config.scraper_base_url,
            config.scraper_request_timeout_secs,
            &config.scraper_user_agent,
            config.scraper_max_retries,
            config.scraper_retry_backoff_base_secs,
        )
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Builds the request URL for one location or sub-location.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::InvalidUrl`] if the base URL does not parse.
    pub fn reviews_url(
        &self,
        source: SourceKind,
        identifier: &SourceIdentifier,
        params: &FetchParams,
    ) -> Result<String, ScraperError> {
        let raw = format!("{}/{}", self.base_url, endpoint(source));
        let mut url = reqwest::Url::parse(&raw).map_err(|e| ScraperError::InvalidUrl {
            url: raw.clone(),
            reason: e.to_string(),
        })?;
        url.query_pairs_mut()
            .append_pair(identifier.query_param(), &identifier.to_string())
            .append_pair(
                "timeStamp",
                &params.since.format(TIMESTAMP_FORMAT).to_string(),
            )
            .append_pair("limitPerRequest", &params.limit_per_request.to_string())
            .append_pair("maxReviews", &params.max_reviews.to_string());
        Ok(url.to_string())
    }

    /// Fetches and decodes reviews for one identifier.
    ///
    /// # Errors
    ///
    /// - [`ScraperError::RateLimited`] / [`ScraperError::Http`] after retries are exhausted.
    /// - [`ScraperError::UnexpectedStatus`] for any other non-2xx status.
    /// - [`ScraperError::EmptyBody`] when the body is blank.
    /// - [`ScraperError::Deserialize`] when the body is not the expected JSON.
    pub async fn fetch_reviews(
        &self,
        source: SourceKind,
        identifier: &SourceIdentifier,
        params: &FetchParams,
    ) -> Result<ScrapeResponse, ScraperError> {
        let url = self.reviews_url(source, identifier, params)?;
        tracing::debug!(%source, %identifier, url = %url, "scraper: requesting reviews");

        let body = retry_with_backoff(self.max_retries, self.backoff_base_secs, || {
            let url = url.clone();
            async move {
                let response = self
                    .client
                    .get(&url)
                    .header(reqwest::header::ACCEPT, "application/json")
                    .send()
                    .await?;
                let status = response.status();

                if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                    let retry_after_secs = response
                        .headers()
                        .get(reqwest::header::RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok())
                        .unwrap_or(30);
                    return Err(ScraperError::RateLimited { retry_after_secs });
                }

                if !status.is_success() {
                    return Err(ScraperError::UnexpectedStatus {
                        status: status.as_u16(),
                        url,
                    });
                }

                let body = response.text().await?;
                if body.trim().is_empty() {
                    return Err(ScraperError::EmptyBody { url });
                }
                Ok(body)
            }
        })
        .await?;

        let context = format!("{source} reviews for {identifier}");
        let parsed = match source {
            SourceKind::Talabat => serde_json::from_str::<TalabatResponse>(&body)
                .map(ScrapeResponse::Talabat),
            SourceKind::Instashop => serde_json::from_str::<InstashopResponse>(&body)
                .map(ScrapeResponse::Instashop),
        };
        parsed.map_err(|e| ScraperError::Deserialize { context, source: e })
    }

    /// Like [`fetch_reviews`](Self::fetch_reviews), but failures are logged
    /// and reported as `None`.
    pub async fn fetch(
        &self,
        source: SourceKind,
        identifier: &SourceIdentifier,
        params: &FetchParams,
    ) -> Option<ScrapeResponse> {
        match self.fetch_reviews(source, identifier, params).await {
            Ok(response) => Some(response),
            Err(e) => {
                tracing::error!(%source, %identifier, error = %e, "scraper: fetch failed");
                None
            }
        }
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
