//! Context window management for tool-augmented chat conversations.
//!
//! `chat-context` keeps a multi-turn conversation, where the assistant calls
//! external tools and reads their results, inside a model's finite context
//! budget. It runs once per chat turn, before the real model call, and either
//! returns the window unchanged or a compacted copy of it.
//!
//! # Getting started
//!
//! ```ignore
//! use chat_context::prelude::*;
//!
//! let budget = ContextBudget::new(100_000)
//!     .with_keep_recent(10)
//!     .with_system_prompt("You are a helpful assistant.")
//!     .with_tool_count(12);
//!
//! // Picks strategies from `budget.strategy` and credentials in the environment.
//! let manager = ContextManager::from_env(budget);
//! let result = manager.manage(&messages).await;
//!
//! println!(
//!     "{:?}: {} -> {} tokens",
//!     result.method, result.original_tokens, result.new_tokens
//! );
//! send_to_model(result.messages).await;
//! ```
//!
//! # Where to find things
//!
//! - **Message shape:** [`Message`], [`Content`] and [`ContentPart`] in this
//!   module. Tool calls and tool results are content parts correlated by id.
//!
//! - **Token estimation:** [`TokenEstimator`](context::estimator::TokenEstimator).
//!   Deterministic, character-based, never fails.
//!
//! - **Where to cut:** [`find_safe_split_point`](context::boundary::find_safe_split_point)
//!   never separates a tool call from its result.
//!
//! - **Compaction strategies:** [`Summarizer`](context::summarizer::Summarizer)
//!   (LLM digest) and [`ProviderEditStrategy`](context::provider_edit::ProviderEditStrategy)
//!   (provider-side context editing, wire format in [`api::anthropic`]).
//!
//! - **The entry point:** [`ContextManager::manage`](context::manager::ContextManager::manage)
//!   measures, decides, compacts, falls back, and reports a
//!   [`CompactionResult`](context::manager::CompactionResult).
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`context`] | Budget config, estimator, boundary finder, strategies, manager facade |
//! | [`api`] | Provider wire formats and the remote context-editing client |
//! | [`error`] | [`ContextError`] taxonomy |
//!
//! # Failure model
//!
//! Compaction never fails from the caller's point of view. Every strategy
//! error (network, timeout, provider rejection, "no edits applied", missing
//! credentials) is logged with `tracing` and handed to the next step of the
//! chain: provider edit, then summarization, then plain truncation, which
//! cannot fail.

pub mod api;
pub mod context;
pub mod error;
pub mod prelude;

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::context::summarizer::{Completion, CompletionRequest, LanguageModel, ModelFuture};

pub use error::ContextError;

// ── Constants ──────────────────────────────────────────────────────

pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Default model for summarization calls. Cheap and fast beats clever here.
pub const DEFAULT_SUMMARY_MODEL: &str = "openai/gpt-4o-mini";

/// Temperature used for summarization. Low, so digests stay factual.
const SUMMARY_TEMPERATURE: f32 = 0.2;

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl MessageRole {
    /// Upper-case label used in plain-text transcripts (`USER: ...`).
    pub fn label(self) -> &'static str {
        match self {
            MessageRole::System => "SYSTEM",
            MessageRole::User => "USER",
            MessageRole::Assistant => "ASSISTANT",
            MessageRole::Tool => "TOOL",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

/// One typed piece of a message's content.
///
/// `ToolCall` and `ToolResult` are correlated by `id`: every call is answered
/// by exactly one later result carrying the same id.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    /// Model reasoning / extended thinking emitted alongside an answer.
    Reasoning {
        text: String,
    },
    ToolCall {
        id: String,
        name: String,
        #[serde(default)]
        arguments: serde_json::Value,
    },
    ToolResult {
        id: String,
        #[serde(default)]
        name: String,
        #[serde(default)]
        output: serde_json::Value,
    },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        ContentPart::ToolCall {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    pub fn tool_result(
        id: impl Into<String>,
        name: impl Into<String>,
        output: impl Into<serde_json::Value>,
    ) -> Self {
        ContentPart::ToolResult {
            id: id.into(),
            name: name.into(),
            output: output.into(),
        }
    }

    /// Whether this part is a tool call or a tool result.
    pub fn is_tool_invocation(&self) -> bool {
        matches!(
            self,
            ContentPart::ToolCall { .. } | ContentPart::ToolResult { .. }
        )
    }

    /// Render the part as plain text for transcripts.
    pub fn render(&self) -> String {
        match self {
            ContentPart::Text { text } => text.clone(),
            ContentPart::Reasoning { text } => format!("[reasoning] {text}"),
            ContentPart::ToolCall {
                name, arguments, ..
            } => format!("[tool-call {name}({arguments})]"),
            ContentPart::ToolResult { name, output, .. } => {
                let output = match output {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                format!("[tool-result {name}: {output}]")
            }
        }
    }
}

/// Message content: a plain string, a list of typed parts, or anything else
/// the upstream sent us.
///
/// `Other` keeps unrecognized shapes intact so they pass through compaction
/// untouched and can still be estimated by serializing the raw JSON.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Parts(Vec<ContentPart>),
    Other(serde_json::Value),
}

impl Default for Content {
    fn default() -> Self {
        Content::Text(String::new())
    }
}

/// A message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    #[serde(default)]
    pub content: Content,
}

impl Message {
    pub fn new(role: MessageRole, content: Content) -> Self {
        Self { role, content }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, Content::Text(content.into()))
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, Content::Text(content.into()))
    }

    pub fn assistant_text(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, Content::Text(content.into()))
    }

    /// Assistant message made of arbitrary parts (text, reasoning, tool calls).
    pub fn assistant_parts(parts: Vec<ContentPart>) -> Self {
        Self::new(MessageRole::Assistant, Content::Parts(parts))
    }

    pub fn assistant_tool_calls(calls: Vec<ContentPart>) -> Self {
        Self::assistant_parts(calls)
    }

    /// Tool-role message carrying one or more results.
    pub fn tool_results(results: Vec<ContentPart>) -> Self {
        Self::new(MessageRole::Tool, Content::Parts(results))
    }

    pub fn tool_result(
        call_id: impl Into<String>,
        name: impl Into<String>,
        output: impl Into<serde_json::Value>,
    ) -> Self {
        Self::tool_results(vec![ContentPart::tool_result(call_id, name, output)])
    }

    /// Typed parts of this message. Empty for string or unrecognized content.
    pub fn parts(&self) -> &[ContentPart] {
        match &self.content {
            Content::Parts(parts) => parts,
            _ => &[],
        }
    }

    pub fn has_tool_call(&self) -> bool {
        self.parts()
            .iter()
            .any(|p| matches!(p, ContentPart::ToolCall { .. }))
    }

    pub fn tool_call_ids(&self) -> impl Iterator<Item = &str> {
        self.parts().iter().filter_map(|p| match p {
            ContentPart::ToolCall { id, .. } => Some(id.as_str()),
            _ => None,
        })
    }

    pub fn tool_result_ids(&self) -> impl Iterator<Item = &str> {
        self.parts().iter().filter_map(|p| match p {
            ContentPart::ToolResult { id, .. } => Some(id.as_str()),
            _ => None,
        })
    }

    /// Flatten the content into plain text.
    pub fn text_content(&self) -> String {
        match &self.content {
            Content::Text(text) => text.clone(),
            Content::Parts(parts) => parts
                .iter()
                .map(ContentPart::render)
                .collect::<Vec<_>>()
                .join("\n"),
            Content::Other(value) => value.to_string(),
        }
    }
}

// ── OpenRouter client ──────────────────────────────────────────────

/// Chat completion request body (OpenAI-compatible subset).
#[derive(Serialize, Debug, Default)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "is_zero_f32")]
    pub temperature: f32,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}
fn is_zero_f32(v: &f32) -> bool {
    *v == 0.0
}

/// Plain string message in OpenAI chat format.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    /// Build a chat message from an internal message.
    ///
    /// Tool-role messages are sent as `user` text: the summarization call
    /// carries no tool definitions, so a `tool` role would be rejected.
    pub fn from_message(msg: &Message) -> Self {
        let role = match msg.role {
            MessageRole::Tool => MessageRole::User,
            other => other,
        };
        Self {
            role: role.to_string(),
            content: msg.text_content(),
        }
    }
}

#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

/// Token usage statistics.
#[derive(Deserialize, Debug, Clone)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

/// Clean return type from [`OpenRouterClient::chat`].
#[derive(Debug)]
pub struct ChatCompletion {
    pub content: Option<String>,
    pub usage: Option<UsageInfo>,
    pub finish_reason: Option<String>,
}

/// Async HTTP client for the OpenRouter chat completions API.
///
/// Used only for summarization; the user-facing answer is produced elsewhere.
pub struct OpenRouterClient {
    client: reqwest::Client,
    api_key: String,
    url: String,
}

impl OpenRouterClient {
    /// Create a client for the public OpenRouter endpoint.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ContextError> {
        Self::with_url(api_key, OPENROUTER_URL)
    }

    /// Create a client for any OpenAI-compatible chat completions URL.
    pub fn with_url(
        api_key: impl Into<String>,
        url: impl Into<String>,
    ) -> Result<Self, ContextError> {
        let client = reqwest::Client::builder()
            .user_agent("chat-context/0.1")
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            url: url.into(),
        })
    }

    /// Send a chat completion request.
    pub async fn chat(&self, body: &ChatRequest) -> Result<ChatCompletion, ContextError> {
        debug!(
            "LLM request: model={}, messages={}, max_tokens={}",
            body.model,
            body.messages.len(),
            body.max_tokens,
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let start = Instant::now();

        let resp = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;

        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(ContextError::Api {
                provider: "openrouter",
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: RawChatResponse = serde_json::from_str(&text)?;

        if let Some(err) = parsed.error {
            return Err(ContextError::Api {
                provider: "openrouter",
                status: status.as_u16(),
                body: err.message,
            });
        }

        if let Some(ref usage) = parsed.usage {
            debug!(
                "Token usage: prompt={}, completion={}, total={}",
                usage.prompt_tokens.unwrap_or(0),
                usage.completion_tokens.unwrap_or(0),
                usage.total_tokens.unwrap_or(0),
            );
        }

        let choice = parsed.choices.and_then(|c| c.into_iter().next());
        Ok(match choice {
            Some(c) => ChatCompletion {
                content: c.message.content,
                usage: parsed.usage,
                finish_reason: c.finish_reason,
            },
            None => ChatCompletion {
                content: None,
                usage: parsed.usage,
                finish_reason: None,
            },
        })
    }
}

impl LanguageModel for OpenRouterClient {
    fn complete(&self, request: CompletionRequest) -> ModelFuture<'_> {
        Box::pin(async move {
            let mut messages = Vec::with_capacity(request.messages.len() + 1);
            messages.push(ChatMessage {
                role: MessageRole::System.to_string(),
                content: request.system_prompt,
            });
            messages.extend(request.messages.iter().map(ChatMessage::from_message));

            let body = ChatRequest {
                model: request.model,
                messages,
                max_tokens: request.max_output_tokens,
                temperature: SUMMARY_TEMPERATURE,
            };

            let completion = self.chat(&body).await?;
            completion
                .content
                .filter(|text| !text.trim().is_empty())
                .map(|text| Completion { text })
                .ok_or(ContextError::EmptyResponse)
        })
    }
}
