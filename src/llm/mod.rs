//! LLM client module
//!
//! Wraps an OpenAI-compatible text-generation API for two operations:
//! summarize a crawled-content bundle, and answer a chat turn over that
//! bundle. The model set is a small fixed enumeration carried alongside
//! every request.

mod client;
mod prompt;

pub use client::{ChatBackend, LlmClient};
pub use prompt::{chat_system_prompt, language_instructions, summary_prompt};

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Default base URL for the completion service
const DEFAULT_BASE_URL: &str = "https://api.opentyphoon.ai/v1";

/// The fixed set of selectable model backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelChoice {
    /// Efficient 8B parameter model for faster responses
    #[serde(rename = "typhoon-v2-8b-instruct")]
    Typhoon8b,

    /// Powerful 70B parameter model for complex tasks
    #[serde(rename = "typhoon-v2-70b-instruct")]
    Typhoon70b,

    /// 70B model with strong reasoning capabilities
    #[serde(rename = "typhoon-v2-r1-70b-preview")]
    TyphoonR170b,
}

impl Default for ModelChoice {
    fn default() -> Self {
        ModelChoice::Typhoon70b
    }
}

/// Generation parameters for one model backend
#[derive(Debug, Clone, Copy)]
pub struct ModelParameters {
    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Sampling temperature
    pub temperature: f32,

    /// Character budget for the content bundle across all pages
    pub max_content_length: usize,
}

impl ModelChoice {
    /// The wire identifier sent to the completion service
    pub fn id(self) -> &'static str {
        match self {
            ModelChoice::Typhoon8b => "typhoon-v2-8b-instruct",
            ModelChoice::Typhoon70b => "typhoon-v2-70b-instruct",
            ModelChoice::TyphoonR170b => "typhoon-v2-r1-70b-preview",
        }
    }

    /// Generation parameters for this model
    pub fn parameters(self) -> ModelParameters {
        // All current backends share the same budget
        ModelParameters {
            max_tokens: 1000,
            temperature: 0.7,
            max_content_length: 24_000,
        }
    }
}

/// Configuration for the completion service client
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Base URL of the OpenAI-compatible API
    pub base_url: String,

    /// API key for the completion service
    pub api_key: String,
}

impl LlmConfig {
    /// Create a configuration with an explicit key and the default base URL
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
        }
    }

    /// Build a configuration from environment variables
    ///
    /// Reads `TYPHOON_API_KEY`, falling back to `OPENAI_API_KEY`; the base
    /// URL can be overridden with `TYPHOON_BASE_URL`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("TYPHOON_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .map_err(|_| {
                Error::Config("TYPHOON_API_KEY is not defined in environment variables".to_string())
            })?;

        let base_url =
            std::env::var("TYPHOON_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        Ok(Self { base_url, api_key })
    }
}
