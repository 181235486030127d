//! Error taxonomy for compaction strategies and configuration.
//!
//! None of these ever reach the end user: [`ContextManager::manage`](crate::context::manager::ContextManager::manage)
//! logs them and moves to the next step of the fallback chain.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} API HTTP {status}: {body}")]
    Api {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("empty response from model")]
    EmptyResponse,

    #[error("provider applied no edits")]
    NoEditsApplied,

    #[error("missing credentials: {0} is not set")]
    MissingCredentials(&'static str),

    #[error("window has unresolved tool calls: {}", .0.join(", "))]
    UnsettledToolCalls(Vec<String>),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for ContextError {
    fn from(e: serde_json::Error) -> Self {
        ContextError::Parse(e.to_string())
    }
}

impl ContextError {
    /// Whether retrying the same call later could plausibly succeed
    /// (429, 5xx, network trouble, timeouts). Reported in fallback logs.
    pub fn is_transient(&self) -> bool {
        match self {
            ContextError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ContextError::Api { status, .. } => *status == 429 || *status >= 500,
            ContextError::Timeout(_) => true,
            _ => false,
        }
    }
}
