//! HTTP client for a context-editing endpoint speaking the Anthropic shape.

use super::types::{EditRequest, EditResponse};
use crate::context::provider_edit::{ContextEditor, EditFuture};
use crate::error::ContextError;
use std::time::Instant;
use tracing::{debug, trace};

pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const CONTEXT_MANAGEMENT_BETA: &str = "context-management-2025-06-27";

/// POSTs an [`EditRequest`] and parses the [`EditResponse`].
pub struct RemoteContextEditor {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl RemoteContextEditor {
    /// `api_key` first, then the endpoint URL.
    pub fn new(api_key: impl Into<String>, url: impl Into<String>) -> Result<Self, ContextError> {
        let client = reqwest::Client::builder()
            .user_agent("chat-context/0.1")
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            api_key: api_key.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn send(&self, request: &EditRequest) -> Result<EditResponse, ContextError> {
        debug!(
            "Context edit request: model={}, messages={}, edits={}",
            request.model,
            request.messages.len(),
            request.context_management.edits.len()
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(request).map_or(0, |s| s.len())
        );

        let start = Instant::now();
        let resp = self
            .client
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("anthropic-beta", CONTEXT_MANAGEMENT_BETA)
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        debug!(
            "Context edit response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(ContextError::Api {
                provider: "context-edit",
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(serde_json::from_str(&text)?)
    }
}

impl ContextEditor for RemoteContextEditor {
    fn apply_edits(&self, request: EditRequest) -> EditFuture<'_> {
        Box::pin(async move { self.send(&request).await })
    }
}
