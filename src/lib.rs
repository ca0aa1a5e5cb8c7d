//! # sitetalk - Crawl, Summarize, and Chat Over a Website
//!
//! This crate implements a small web application backend: a user submits a
//! website URL, an external crawl service fetches and converts the site's
//! pages into markdown, an LLM generates a summary of the crawled content,
//! and follow-up questions are answered conversationally over that content
//! with inline citations.
//!
//! ## Features
//!
//! - Client for an asynchronous crawl-job API (start a job, poll for results)
//! - Incremental content reconciliation while a crawl is in flight
//! - A progress orchestrator that runs status and content polling loops
//!   concurrently and publishes unified progress snapshots
//! - OpenAI-compatible LLM client for summarization and multi-turn chat
//! - An in-memory chat transcript with regenerate-last-answer support
//! - Thin axum HTTP routes that validate input and forward to the clients
//!
//! ## Example
//!
//! ```rust,no_run
//! use sitetalk::crawl::{CrawlClient, CrawlConfig};
//! use sitetalk::progress::Orchestrator;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CrawlConfig::from_env()?;
//!     let orchestrator = Orchestrator::new(CrawlClient::new(config.clone()), config);
//!
//!     let handle = orchestrator.submit("https://example.com").await;
//!     let site = handle.wait().await?;
//!     println!("crawled {} pages from {}", site.pages.len(), site.url);
//!     Ok(())
//! }
//! ```

mod error;

pub mod chat;
pub mod crawl;
pub mod llm;
pub mod progress;
pub mod server;

pub use error::Error;

/// Re-export of common types for public use
pub mod prelude {
    pub use crate::error::Error;
    pub use crate::error::Result;
}
