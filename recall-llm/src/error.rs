//! AI provider error types.

use thiserror::Error;

/// Errors that can occur while talking to an AI provider.
#[derive(Debug, Error)]
pub enum AiError {
    /// HTTP request failed.
    #[error("AI request failed: {0}")]
    RequestFailed(String),

    /// Provider response was not the JSON shape we expect.
    #[error("Failed to parse AI response: {0}")]
    ParseError(String),

    /// Every attempt ran into the configured request timeout.
    #[error("AI request timed out after {0}ms")]
    Timeout(u64),

    /// The provider refused the request itself (4xx other than 429);
    /// retrying would not help.
    #[error("AI provider rejected the request (HTTP {status}): {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body.
        message: String,
    },

    /// No provider configured, or the provider cannot be reached.
    #[error("AI provider unavailable: {0}")]
    Unavailable(String),

    /// All retry attempts exhausted.
    #[error("All AI retry attempts exhausted after {attempts} tries: {last_error}")]
    RetriesExhausted {
        /// Attempts made, including the first.
        attempts: u32,
        /// Error from the final attempt.
        last_error: String,
    },

    /// Configuration error.
    #[error("AI configuration error: {0}")]
    ConfigError(String),
}

impl AiError {
    /// Whether another attempt could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AiError::Timeout(_) | AiError::Unavailable(_) | AiError::RequestFailed(_)
        )
    }
}

/// Timeouts are not mapped here: the client knows its own budget and
/// reports [`AiError::Timeout`] with it.
impl From<reqwest::Error> for AiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            AiError::Unavailable(err.to_string())
        } else if err.is_decode() {
            AiError::ParseError(err.to_string())
        } else {
            AiError::RequestFailed(err.to_string())
        }
    }
}
