//! Crawl service client module
//!
//! This module wraps an external crawl-job API: start a job for a root URL,
//! then poll the job by id for status and incrementally arriving pages.

mod client;
mod config;
mod reconcile;

pub use client::CrawlClient;
pub use config::{CrawlConfig, CrawlConfigBuilder};
pub use reconcile::{ContentReconciler, CrawledSite, PartialContent};

use serde::{Deserialize, Serialize};

/// Status of a crawl job as reported by the crawl service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Job accepted but not yet started
    Queued,
    /// Pages are being fetched
    Scraping,
    /// All pages fetched, results are final
    Completed,
    /// The service gave up on the job
    Failed,
    /// Any status string we do not recognize
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    /// Whether the job has reached a terminal state
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// One crawled page with its content and metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    /// Source URL of the page, unique within a job
    pub url: String,

    /// Title of the page
    pub title: String,

    /// Page content in Markdown format
    pub content: String,

    /// Description extracted from the page metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A point-in-time snapshot of a crawl job
///
/// Each snapshot may contain a superset of the pages seen in earlier
/// snapshots, never a subset.
#[derive(Debug, Clone)]
pub struct CrawlStatus {
    /// Current job status
    pub status: JobStatus,

    /// Number of pages fetched so far
    pub completed: u32,

    /// Total pages the service expects to fetch; may be revised upward
    pub total: u32,

    /// Pages available so far
    pub pages: Vec<Page>,
}
