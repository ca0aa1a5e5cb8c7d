//! HTTP client for the crawl service
//!
//! This module provides the client for starting crawl jobs and polling
//! them for status and incrementally arriving pages. Both operations are
//! plain request/response; the client holds no job state of its own.

use crate::crawl::{CrawlConfig, CrawlStatus, JobStatus, Page};
use crate::error::{Error, Result};
use reqwest::{Client as ReqwestClient, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, instrument};

/// Default timeout for HTTP requests in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Request body for initiating a crawl job
#[derive(Debug, Serialize)]
struct StartCrawlRequest<'a> {
    url: &'a str,
    limit: u32,
    #[serde(rename = "scrapeOptions")]
    scrape_options: ScrapeOptions,
}

#[derive(Debug, Serialize)]
struct ScrapeOptions {
    formats: Vec<&'static str>,
}

/// Response from initiating a crawl job
#[derive(Debug, Deserialize)]
struct StartCrawlResponse {
    success: bool,
    #[serde(default)]
    id: Option<String>,
}

/// Per-page metadata in the crawl service's result payload
#[derive(Debug, Deserialize)]
struct WireMetadata {
    #[serde(default)]
    title: Option<String>,
    #[serde(rename = "sourceURL", default)]
    source_url: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// One page entry in the crawl service's result payload
#[derive(Debug, Deserialize)]
struct WirePage {
    #[serde(default)]
    markdown: Option<String>,
    #[serde(default)]
    metadata: Option<WireMetadata>,
}

/// Job status payload returned by the crawl service
#[derive(Debug, Deserialize)]
struct CrawlStatusResponse {
    status: JobStatus,
    #[serde(default)]
    completed: u32,
    #[serde(default)]
    total: u32,
    #[serde(default)]
    data: Vec<WirePage>,
}

/// Client for the crawl service API
///
/// Thin wrapper over reqwest that handles authentication, request
/// formatting, and error mapping for the two operations the rest of the
/// crate needs: start a job and fetch a job's status by id.
#[derive(Clone)]
pub struct CrawlClient {
    /// The underlying reqwest client
    client: ReqwestClient,

    /// Configuration (base URL, API key, page limit)
    config: CrawlConfig,
}

#[cfg(test)]
impl CrawlClient {
    /// Set the base URL (for testing only)
    pub fn set_base_url(&mut self, url: String) {
        self.config.base_url = url;
    }
}

impl CrawlClient {
    /// Create a new crawl client from a configuration
    pub fn new(config: CrawlConfig) -> Self {
        let client = ReqwestClient::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, config }
    }

    fn check_credentials(&self) -> Result<()> {
        if self.config.api_key.is_empty() {
            return Err(Error::Config(
                "FIRECRAWL_API_KEY is not defined in environment variables".to_string(),
            ));
        }
        Ok(())
    }

    /// Initiate a crawl job for a root URL
    ///
    /// Returns the opaque job id assigned by the service.
    #[instrument(skip(self), level = "debug")]
    pub async fn start_crawl(&self, url: &str) -> Result<String> {
        self.check_credentials()?;

        let body = StartCrawlRequest {
            url,
            limit: self.config.page_limit,
            scrape_options: ScrapeOptions {
                formats: vec!["markdown"],
            },
        };

        debug!("Initiating crawl for {} (limit {})", url, body.limit);
        let response = self
            .client
            .post(format!("{}/crawl", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let parsed: StartCrawlResponse = self.parse_response(response).await?;
        match parsed.id {
            Some(id) if parsed.success => {
                debug!("Crawl initiated with id {}", id);
                Ok(id)
            }
            _ => Err(Error::UnexpectedResponse(
                "Failed to initiate crawl: missing job id".to_string(),
            )),
        }
    }

    /// Fetch the current status and pages of a crawl job
    ///
    /// Idempotent and safe to call repeatedly; each call may return a
    /// superset of previously returned pages. Transport failures should be
    /// treated as transient by polling callers.
    #[instrument(skip(self), level = "debug")]
    pub async fn crawl_status(&self, job_id: &str) -> Result<CrawlStatus> {
        self.check_credentials()?;

        let response = self
            .client
            .get(format!("{}/crawl/{}", self.config.base_url, job_id))
            .bearer_auth(&self.config.api_key)
            .send()
            .await?;

        let parsed: CrawlStatusResponse = self.parse_response(response).await?;

        let pages = parsed
            .data
            .into_iter()
            .filter_map(|page| {
                let metadata = page.metadata?;
                // Pages without a source URL cannot be deduplicated or cited
                let url = metadata.source_url?;
                Some(Page {
                    url,
                    title: metadata.title.unwrap_or_default(),
                    content: page.markdown.unwrap_or_default(),
                    description: metadata.description,
                })
            })
            .collect();

        Ok(CrawlStatus {
            status: parsed.status,
            completed: parsed.completed,
            total: parsed.total,
            pages,
        })
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            return serde_json::from_str(&text).map_err(|e| {
                error!("Failed to parse crawl service response: {}", e);
                Error::UnexpectedResponse(format!("Failed to parse response: {}", e))
            });
        }

        error!("Crawl service error: {} - {}", status, text);
        if status == StatusCode::TOO_MANY_REQUESTS {
            Err(Error::RateLimit)
        } else if status == StatusCode::UNAUTHORIZED {
            Err(Error::Config(
                "Crawl service rejected the API key".to_string(),
            ))
        } else {
            Err(Error::Upstream {
                status_code: status.as_u16(),
                message: text,
            })
        }
    }
}
