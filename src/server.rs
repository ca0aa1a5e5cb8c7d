//! HTTP surface for the application
//!
//! Thin axum routes that validate input and forward to the crawl and
//! completion clients. The routes themselves hold no conversation state;
//! the only server-side state is a short-TTL map from submitted URL to
//! crawl-job id, which bridges the scrape route and the progress route.

use crate::chat::ChatTurn;
use crate::crawl::{ContentReconciler, CrawlClient, CrawlConfig, CrawledSite, JobStatus, Page};
use crate::error::Error;
use crate::llm::{LlmClient, LlmConfig, ModelChoice};
use crate::progress::{Orchestrator, progress_message};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use url::Url;

/// How long a url -> job id ticket stays resolvable
const TICKET_TTL: Duration = Duration::from_secs(60 * 60);

/// Short-TTL map from submitted URL to crawl-job id
///
/// Bridges the scrape route (which learns the job id) and the progress
/// route (which only knows the URL the user submitted). Entries expire
/// lazily; the store assumes a single server process and is not durable
/// across instances.
#[derive(Default)]
pub struct TicketStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl TicketStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the job id for a URL
    pub fn insert(&self, url: impl Into<String>, job_id: impl Into<String>) {
        let mut entries = self.entries.lock().expect("ticket lock poisoned");
        let now = Instant::now();
        entries.retain(|_, (_, created)| now.duration_since(*created) < TICKET_TTL);
        entries.insert(url.into(), (job_id.into(), now));
    }

    /// Look up the job id for a URL, if one is known and fresh
    pub fn get(&self, url: &str) -> Option<String> {
        let entries = self.entries.lock().expect("ticket lock poisoned");
        entries.get(url).and_then(|(job_id, created)| {
            (created.elapsed() < TICKET_TTL).then(|| job_id.clone())
        })
    }
}

/// Shared state for all routes
pub struct AppState {
    /// Orchestrator for the scrape route's crawl jobs
    pub orchestrator: Orchestrator<CrawlClient>,

    /// Crawl client for the progress and partial-content routes
    pub crawl: CrawlClient,

    /// Completion client for summarize and chat
    pub llm: LlmClient,

    /// url -> job id bridge between routes
    pub tickets: Arc<TicketStore>,
}

impl AppState {
    /// Build the state from client configurations
    pub fn new(crawl_config: CrawlConfig, llm_config: LlmConfig) -> Self {
        let crawl = CrawlClient::new(crawl_config.clone());
        Self {
            orchestrator: Orchestrator::new(crawl.clone(), crawl_config),
            crawl,
            llm: LlmClient::new(llm_config),
            tickets: Arc::new(TicketStore::new()),
        }
    }
}

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/scrape", post(scrape))
        .route("/api/crawl-progress", get(crawl_progress))
        .route("/api/partial-content", get(partial_content))
        .route("/api/summarize", post(summarize))
        .route("/api/chat", post(chat))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the application on the given address
pub async fn serve(addr: SocketAddr, state: Arc<AppState>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Route-level error with the status mapping from the API contract
#[derive(Debug)]
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::NoContent | Error::CrawlFailed => StatusCode::UNPROCESSABLE_ENTITY,
            Error::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            Error::Timeout => StatusCode::REQUEST_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match &self.0 {
            Error::InvalidRequest(message) => message.clone(),
            other => other.user_message(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Loosely-typed website data as clients send it back to us
#[derive(Debug, Deserialize)]
struct WebsiteData {
    url: Option<String>,
    title: Option<String>,
    pages: Option<Vec<Page>>,
    #[serde(rename = "totalPages")]
    total_pages: Option<u32>,
}

impl WebsiteData {
    /// Validate and convert into the canonical site bundle
    fn into_site(self) -> Result<CrawledSite, ApiError> {
        let (Some(url), Some(pages)) = (self.url, self.pages) else {
            return Err(Error::InvalidRequest("Website data is required".to_string()).into());
        };
        let total_pages = self.total_pages.unwrap_or(pages.len() as u32);
        Ok(CrawledSite {
            url,
            title: self
                .title
                .unwrap_or_else(|| "Untitled Website".to_string()),
            pages,
            total_pages,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ScrapeRequest {
    url: Option<String>,
    #[serde(default = "default_language")]
    language: String,
    #[serde(default)]
    model: ModelChoice,
}

fn default_language() -> String {
    "en".to_string()
}

/// Accept bare hostnames by assuming https, then validate
fn normalize_url(raw: &str) -> Result<String, ApiError> {
    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{}", raw)
    };
    let parsed = Url::parse(&candidate)
        .map_err(|_| Error::InvalidRequest("Invalid URL format".to_string()))?;
    Ok(parsed.to_string())
}

#[derive(Debug, Serialize)]
struct ScrapeResponse {
    url: String,
    title: String,
    summary: String,
    pages: Vec<Page>,
    #[serde(rename = "totalPages")]
    total_pages: u32,
}

/// POST /api/scrape - crawl a site and summarize it in one request
async fn scrape(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ScrapeRequest>,
) -> Result<Json<ScrapeResponse>, ApiError> {
    let url = match request.url.filter(|u| !u.trim().is_empty()) {
        Some(url) => normalize_url(url.trim())?,
        None => {
            return Err(Error::InvalidRequest(
                "URL is required. Please provide a website URL to crawl.".to_string(),
            )
            .into());
        }
    };

    let handle = state.orchestrator.submit(&url).await;

    // Publish the job id to the ticket store as soon as it is known so the
    // progress route can resolve this URL while the crawl is in flight.
    {
        let tickets = state.tickets.clone();
        let ticket_url = url.clone();
        let mut job_id = handle.job_id();
        tokio::spawn(async move {
            if let Ok(value) = job_id.wait_for(|id| id.is_some()).await {
                if let Some(id) = value.clone() {
                    tickets.insert(ticket_url, id);
                }
            }
        });
    }

    let site = handle.wait().await?;
    let summary = state
        .llm
        .summarize(&site, &request.language, request.model)
        .await?;

    Ok(Json(ScrapeResponse {
        url: site.url,
        title: site.title,
        summary,
        pages: site.pages,
        total_pages: site.total_pages,
    }))
}

#[derive(Debug, Deserialize)]
struct ProgressQuery {
    url: Option<String>,
}

/// GET /api/crawl-progress?url= - human-readable progress for a URL
///
/// Degrades instead of failing: an unknown URL means the job id is not
/// known yet, and a transport error while fetching progress is reported
/// inside the progress string rather than as a 5xx.
async fn crawl_progress(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProgressQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let url = query
        .url
        .filter(|u| !u.is_empty())
        .ok_or_else(|| Error::InvalidRequest("URL parameter is required".to_string()))?;

    let Some(crawl_id) = state.tickets.get(&url) else {
        return Ok(Json(json!({
            "progress": "Initializing crawl...",
            "completed": 0,
            "total": 0,
        })));
    };

    match state.crawl.crawl_status(&crawl_id).await {
        Ok(status) => Ok(Json(json!({
            "progress": progress_message(&status),
            "crawlId": crawl_id,
            "completed": status.completed,
            "total": status.total,
            "status": status.status,
        }))),
        Err(err) => {
            warn!("Error fetching crawl progress: {}", err);
            Ok(Json(json!({
                "progress": format!("Error fetching progress: {}", err.user_message()),
                "crawlId": crawl_id,
                "completed": 0,
                "total": 0,
            })))
        }
    }
}

#[derive(Debug, Deserialize)]
struct PartialContentQuery {
    #[serde(rename = "crawlId")]
    crawl_id: Option<String>,
}

/// GET /api/partial-content?crawlId= - accumulated content so far
async fn partial_content(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PartialContentQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let crawl_id = query
        .crawl_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| Error::InvalidRequest("crawlId parameter is required".to_string()))?;

    let status = state.crawl.crawl_status(&crawl_id).await?;

    let mut reconciler = ContentReconciler::new();
    reconciler.ingest(&status);
    let partial = reconciler.partial();

    let mut content = partial.content;
    if !partial.pages.is_empty() {
        content.push_str("\n\n--- Crawl Progress ---\n");
        content.push_str(&format!(
            "Pages crawled so far: {} of {}\n",
            status.completed, status.total
        ));
        match status.status {
            JobStatus::Completed => content.push_str("Status: Crawl completed\n"),
            _ => content.push_str("Status: Crawl in progress...\n"),
        }
    }

    Ok(Json(json!({
        "title": partial.title,
        "content": content,
        "pages": partial.pages,
        "sources": partial.sources,
        "status": status.status,
        "completed": status.completed,
        "total": status.total,
    })))
}

#[derive(Debug, Deserialize)]
struct SummarizeRequest {
    #[serde(rename = "websiteData")]
    website_data: Option<WebsiteData>,
    #[serde(default = "default_language")]
    language: String,
    #[serde(default)]
    model: ModelChoice,
}

/// POST /api/summarize - (re)generate a summary for already-crawled data
async fn summarize(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SummarizeRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let site = request
        .website_data
        .ok_or_else(|| Error::InvalidRequest("Website data is required".to_string()))?
        .into_site()?;

    let summary = state
        .llm
        .summarize(&site, &request.language, request.model)
        .await?;
    Ok(Json(json!({ "summary": summary })))
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    messages: Option<Vec<ChatTurn>>,
    #[serde(rename = "lastMessage")]
    last_message: Option<String>,
    #[serde(rename = "websiteData")]
    website_data: Option<WebsiteData>,
    #[serde(default = "default_language")]
    language: String,
    #[serde(default)]
    model: ModelChoice,
}

/// POST /api/chat - answer one chat turn over already-crawled data
async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let messages = match request.messages {
        Some(messages) if !messages.is_empty() => messages,
        _ => {
            return Err(Error::InvalidRequest("Messages array is required".to_string()).into());
        }
    };

    let last_message = request
        .last_message
        .filter(|m| !m.is_empty())
        .ok_or_else(|| Error::InvalidRequest("Last message is required".to_string()))?;

    let site = request
        .website_data
        .ok_or_else(|| Error::InvalidRequest("Website data is required".to_string()))?
        .into_site()?;

    let response = state
        .llm
        .chat_turn(&site, &messages, &last_message, &request.language, request.model)
        .await?;
    Ok(Json(json!({ "response": response })))
}
