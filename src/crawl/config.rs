//! # Crawl Configuration Module
//!
//! Configuration for the crawl service client and the polling loops that
//! consume it, using a builder pattern for flexible construction.
//!
//! ## Key Components
//!
//! - `CrawlConfig`: the main configuration struct
//! - `CrawlConfigBuilder`: builder pattern implementation
//!
//! Credentials are read from the environment (`FIRECRAWL_API_KEY`,
//! `FIRECRAWL_BASE_URL`, `CRAWL_PAGE_LIMIT`); a missing API key is a
//! configuration error, never silently ignored.

use crate::error::{Error, Result};
use std::time::Duration;

/// Default base URL for the crawl service
const DEFAULT_BASE_URL: &str = "https://api.firecrawl.dev/v1";

/// Configuration for the crawl client and polling loops
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Base URL of the crawl service API
    pub base_url: String,

    /// API key for the crawl service
    pub api_key: String,

    /// Maximum number of pages to crawl per job
    pub page_limit: u32,

    /// Maximum status-poll attempts before giving up on a job
    pub max_attempts: u32,

    /// Period of the bounded job-status polling loop
    pub poll_interval: Duration,

    /// Period of the heavier partial-content polling loop
    pub content_interval: Duration,
}

impl CrawlConfig {
    /// Create a new builder
    pub fn builder() -> CrawlConfigBuilder {
        CrawlConfigBuilder::new()
    }

    /// Build a configuration from environment variables
    ///
    /// Fails with `Error::Config` if `FIRECRAWL_API_KEY` is not set.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("FIRECRAWL_API_KEY").map_err(|_| {
            Error::Config("FIRECRAWL_API_KEY is not defined in environment variables".to_string())
        })?;

        let mut builder = CrawlConfigBuilder::new().api_key(api_key);

        if let Ok(base_url) = std::env::var("FIRECRAWL_BASE_URL") {
            builder = builder.base_url(base_url);
        }

        if let Some(limit) = std::env::var("CRAWL_PAGE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            builder = builder.page_limit(limit);
        }

        Ok(builder.build())
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            page_limit: 10,
            max_attempts: 30,
            poll_interval: Duration::from_secs(3),
            content_interval: Duration::from_secs(5),
        }
    }
}

/// Builder for CrawlConfig
#[derive(Debug, Default)]
pub struct CrawlConfigBuilder {
    config: CrawlConfig,
}

impl CrawlConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: CrawlConfig::default(),
        }
    }

    /// Set the base URL of the crawl service
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    /// Set the API key
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.config.api_key = api_key.into();
        self
    }

    /// Set the maximum number of pages to crawl per job
    pub fn page_limit(mut self, page_limit: u32) -> Self {
        self.config.page_limit = page_limit;
        self
    }

    /// Set the maximum number of status-poll attempts
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.config.max_attempts = max_attempts;
        self
    }

    /// Set the period of the status polling loop
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.config.poll_interval = poll_interval;
        self
    }

    /// Set the period of the content polling loop
    pub fn content_interval(mut self, content_interval: Duration) -> Self {
        self.config.content_interval = content_interval;
        self
    }

    /// Build the configuration
    pub fn build(self) -> CrawlConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides_defaults() {
        let config = CrawlConfig::builder()
            .api_key("test-key")
            .page_limit(25)
            .max_attempts(5)
            .poll_interval(Duration::from_millis(10))
            .build();

        assert_eq!(config.api_key, "test-key");
        assert_eq!(config.page_limit, 25);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.poll_interval, Duration::from_millis(10));
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_default_polling_periods() {
        let config = CrawlConfig::default();
        assert_eq!(config.content_interval, Duration::from_secs(5));
        assert_eq!(config.max_attempts, 30);
        assert_eq!(config.poll_interval, Duration::from_secs(3));
    }
}
