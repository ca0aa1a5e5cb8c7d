//! HTTP client for the completion service
//!
//! Speaks the OpenAI-compatible `/chat/completions` shape. Two operations
//! are exposed: summarize a crawled site, and answer one chat turn given
//! the conversation history and the site content. Both are plain
//! request/response with no local state.

use crate::chat::{ChatTurn, Role};
use crate::crawl::CrawledSite;
use crate::error::{Error, Result};
use crate::llm::prompt::{chat_system_prompt, strip_thinking, summary_prompt};
use crate::llm::{LlmConfig, ModelChoice};
use reqwest::{Client as ReqwestClient, StatusCode};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, instrument};

/// Default timeout for HTTP requests in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: String,
}

/// A backend that can answer one chat turn over a crawled site
///
/// Implemented by [`LlmClient`]; tests substitute fakes.
pub trait ChatBackend: Send + Sync {
    /// Answer `last_message` given the conversation history and content
    fn chat(
        &self,
        site: &CrawledSite,
        history: &[ChatTurn],
        last_message: &str,
        language: &str,
        model: ModelChoice,
    ) -> impl Future<Output = Result<String>> + Send;
}

/// Drop turns the upstream API must not see
///
/// The synthetic leading assistant greeting and any trailing unanswered
/// user turn are stripped, so the sequence sent upstream alternates
/// starting with a real user turn and the fresh question is appended
/// separately by the caller.
fn normalize_history(history: &[ChatTurn]) -> &[ChatTurn] {
    let mut turns = history;
    if let [ChatTurn { role: Role::Assistant, .. }, rest @ ..] = turns {
        turns = rest;
    }
    if let [rest @ .., ChatTurn { role: Role::User, .. }] = turns {
        turns = rest;
    }
    turns
}

/// Client for the completion service API
#[derive(Clone)]
pub struct LlmClient {
    /// The underlying reqwest client
    client: ReqwestClient,

    /// Configuration (base URL, API key)
    config: LlmConfig,
}

#[cfg(test)]
impl LlmClient {
    /// Set the base URL (for testing only)
    pub fn set_base_url(&mut self, url: String) {
        self.config.base_url = url;
    }
}

impl LlmClient {
    /// Create a new completion client from a configuration
    pub fn new(config: LlmConfig) -> Self {
        let client = ReqwestClient::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, config }
    }

    /// Generate a summary of a crawled site
    #[instrument(skip(self, site), level = "debug", fields(url = %site.url))]
    pub async fn summarize(
        &self,
        site: &CrawledSite,
        language: &str,
        model: ModelChoice,
    ) -> Result<String> {
        let prompt = summary_prompt(site, language, model);
        let messages = vec![WireMessage {
            role: "user",
            content: &prompt,
        }];

        debug!("Requesting summary for {}", site.url);
        self.complete(model, messages).await
    }

    /// Answer one chat turn over a crawled site
    #[instrument(
        skip(self, site, history, last_message),
        level = "debug",
        fields(url = %site.url, history_len = history.len())
    )]
    pub async fn chat_turn(
        &self,
        site: &CrawledSite,
        history: &[ChatTurn],
        last_message: &str,
        language: &str,
        model: ModelChoice,
    ) -> Result<String> {
        let system = chat_system_prompt(site, language, model);

        let mut messages = vec![WireMessage {
            role: "system",
            content: &system,
        }];
        for turn in normalize_history(history) {
            messages.push(WireMessage {
                role: match turn.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                content: &turn.content,
            });
        }
        messages.push(WireMessage {
            role: "user",
            content: last_message,
        });

        debug!("Requesting chat completion for {}", site.url);
        self.complete(model, messages).await
    }

    async fn complete(&self, model: ModelChoice, messages: Vec<WireMessage<'_>>) -> Result<String> {
        if self.config.api_key.is_empty() {
            return Err(Error::Config(
                "TYPHOON_API_KEY is not defined in environment variables".to_string(),
            ));
        }

        let parameters = model.parameters();
        let body = CompletionRequest {
            model: model.id(),
            messages,
            max_tokens: parameters.max_tokens,
            temperature: parameters.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            error!("Completion service error: {} - {}", status, text);
            return if status == StatusCode::TOO_MANY_REQUESTS {
                Err(Error::RateLimit)
            } else {
                Err(Error::Upstream {
                    status_code: status.as_u16(),
                    message: text,
                })
            };
        }

        let parsed: CompletionResponse = serde_json::from_str(&text).map_err(|e| {
            error!("Failed to parse completion response: {}", e);
            Error::UnexpectedResponse(format!("Failed to parse response: {}", e))
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| {
                Error::UnexpectedResponse("Completion response had no choices".to_string())
            })?;

        Ok(strip_thinking(&content).to_string())
    }
}

impl ChatBackend for LlmClient {
    fn chat(
        &self,
        site: &CrawledSite,
        history: &[ChatTurn],
        last_message: &str,
        language: &str,
        model: ModelChoice,
    ) -> impl Future<Output = Result<String>> + Send {
        self.chat_turn(site, history, last_message, language, model)
    }
}
