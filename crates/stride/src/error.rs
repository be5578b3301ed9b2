//! Error taxonomy for the agent runtime.
//!
//! Errors are split by where they are handled:
//!
//! - [`ProviderError`]: model backend failures. `Transient` variants are
//!   retried inside [`LlmClient`](crate::api::backend::LlmClient); `Terminal`
//!   ones end the running task.
//! - [`ToolError`]: returned by [`Tool::execute`](crate::tools::core::Tool::execute).
//!   Never aborts the loop except for `NonRecoverable`; everything else is
//!   fed back to the model as a tool result.
//! - [`PlanError`]: invalid chunking configuration, rejected before any
//!   model call is made.
//! - [`IntegrationError`]: the long-context pipeline produced nothing usable.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error for library operations that can fail outright.
#[derive(Debug, Error)]
pub enum Error {
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("configuration error: {0}")]
    Plan(#[from] PlanError),

    #[error("integration error: {0}")]
    Integration(#[from] IntegrationError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Reading a document or writing an execution record failed.
    #[error("failed to access '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Invalid setup supplied by the caller (unknown provider, missing key).
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result alias using the crate [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Failure reported by a model backend.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum ProviderError {
    /// Rate limiting, timeouts, dropped connections, 5xx responses.
    #[error("transient provider failure: {0}")]
    Transient(String),

    /// Bad credentials, malformed requests, undecodable responses, or a
    /// transient failure that outlived its retry budget.
    #[error("terminal provider failure: {0}")]
    Terminal(String),
}

impl ProviderError {
    /// Whether the retry driver may try the call again.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }

    /// Classify an HTTP status code and body.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = format!("HTTP {status}: {body}");
        match status {
            408 | 429 | 500..=599 => ProviderError::Transient(message),
            _ => ProviderError::Terminal(message),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        // `is_request()` also covers requests that can never succeed, so only
        // transport-level failures are retried.
        if e.is_timeout() || e.is_connect() || e.is_body() {
            ProviderError::Transient(format!("request failed: {e}"))
        } else {
            ProviderError::Terminal(format!("request failed: {e}"))
        }
    }
}

/// Failure returned by a tool capability.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    /// Arguments did not match what the tool expects.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The tool ran and failed. The model may retry or adapt.
    #[error("{0}")]
    Execution(String),

    /// The tool cannot continue and the task must stop.
    #[error("non-recoverable: {0}")]
    NonRecoverable(String),
}

/// Invalid chunk plan parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("target chunk size must be greater than zero")]
    ZeroChunkSize,

    #[error("overlap ({overlap}) must be smaller than the target chunk size ({target})")]
    OverlapTooLarge { overlap: usize, target: usize },

    /// A produced plan does not cover the text as required.
    #[error("invalid plan at chunk {index}: {message}")]
    Coverage { index: usize, message: String },
}

/// Failure to merge per-chunk results into a final answer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrationError {
    #[error("all {total} chunk(s) failed; nothing to integrate")]
    AllChunksFailed { total: usize },
}
