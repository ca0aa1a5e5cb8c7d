//! Server binary
//!
//! Loads credentials from the environment (a local `.env` file is honored),
//! sets up tracing, and serves the HTTP API.

use anyhow::Context;
use clap::Parser;
use sitetalk::crawl::CrawlConfig;
use sitetalk::llm::LlmConfig;
use sitetalk::server::{self, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sitetalk", about = "Crawl a website and chat with its content")]
struct Args {
    /// Address to bind the HTTP server to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(long, default_value_t = 3000)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let crawl_config = CrawlConfig::from_env().context("crawl service configuration")?;
    let llm_config = LlmConfig::from_env().context("completion service configuration")?;

    let state = Arc::new(AppState::new(crawl_config, llm_config));

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .context("invalid bind address")?;
    server::serve(addr, state).await
}
