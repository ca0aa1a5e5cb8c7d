//! Error types for the sitetalk crate

use thiserror::Error;

/// Result type for sitetalk operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for sitetalk operations
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid configuration (credentials, base URLs)
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An external service returned an error response
    #[error("Upstream error: {status_code} - {message}")]
    Upstream {
        /// HTTP status code
        status_code: u16,
        /// Error message
        message: String,
    },

    /// Rate limit exceeded on an external service
    #[error("Rate limit exceeded. Please try again later")]
    RateLimit,

    /// Polling finished without extracting any pages
    #[error("No content extracted from the URL")]
    NoContent,

    /// Polling attempt budget exhausted before the crawl completed
    #[error("Timed out waiting for crawl results")]
    Timeout,

    /// The crawl service reported the job as failed
    #[error("Crawl failed")]
    CrawlFailed,

    /// There is no prior user turn to regenerate an answer for
    #[error("Nothing to regenerate")]
    NothingToRegenerate,

    /// Unexpected response format from an external service
    #[error("Unexpected response format: {0}")]
    UnexpectedResponse(String),

    /// Invalid request parameters from the caller
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl Error {
    /// A friendlier message for user-facing surfaces.
    ///
    /// Upstream messages are pattern-matched into a small set of known
    /// categories; anything unrecognized is surfaced verbatim.
    pub fn user_message(&self) -> String {
        match self {
            Error::Config(_) => {
                "The crawl service API key is not configured. Please contact the administrator."
                    .to_string()
            }
            Error::RateLimit => "Rate limit exceeded. Please try again later.".to_string(),
            Error::NoContent => {
                "Could not extract content from the provided URL. Please try a different website."
                    .to_string()
            }
            Error::Timeout => {
                "The crawl process timed out. The website might be too large or not responding."
                    .to_string()
            }
            Error::CrawlFailed => {
                "The crawl process failed. Please try a different website.".to_string()
            }
            Error::Upstream { message, .. } => {
                let lower = message.to_lowercase();
                if lower.contains("quota") || lower.contains("rate limit") {
                    "Rate limit exceeded. Please try again later.".to_string()
                } else if lower.contains("timeout") || lower.contains("timed out") {
                    "The request to the language model timed out. Please try again.".to_string()
                } else if lower.contains("api key") || lower.contains("unauthorized") {
                    "The API key was rejected. Please check the configuration.".to_string()
                } else {
                    message.clone()
                }
            }
            other => other.to_string(),
        }
    }

    /// Whether the error is transient from a polling loop's point of view.
    ///
    /// Transient errors are logged and retried on the next tick; everything
    /// else aborts the job.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Http(_) | Error::Upstream { .. } | Error::UnexpectedResponse(_)
        )
    }
}
