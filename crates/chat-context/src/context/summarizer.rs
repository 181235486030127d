//! Summarization strategy: replace the dropped span with an LLM digest.
//!
//! The span older than the safe split point is rendered as a plain-text
//! transcript, sent to a cheap model in one non-streaming call, and the reply
//! is wrapped in a marker block. The manager prepends the result to the kept
//! messages as a single `system` message.

use crate::context::budget::ContextBudget;
use crate::error::ContextError;
use crate::{Message, MessageRole};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// System prompt for the summarization call.
pub const SUMMARY_SYSTEM_PROMPT: &str = "\
You compress the older part of a conversation between a user and an assistant \
that calls tools. Produce a digest the assistant can rely on instead of the \
original messages.

Use exactly these labeled headings:
USER GOALS & CONSTRAINTS:
KEY DATA POINTS:
TECHNICAL ACTIONS (tool calls and their outcomes):
DECISIONS & NEXT STEPS:

Rules:
- Keep exact numbers, identifiers, names, dates and proper nouns. Prefer them over prose.
- Only state facts that appear in the messages.
- Write terse bullet points. No greetings, no pleasantries, no closing remarks.";

/// Boxed future returned by [`LanguageModel::complete`].
pub type ModelFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Completion, ContextError>> + Send + 'a>>;

/// One non-streaming completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub system_prompt: String,
    pub messages: Vec<Message>,
    pub max_output_tokens: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
}

/// A language model that can answer a [`CompletionRequest`].
///
/// [`OpenRouterClient`](crate::OpenRouterClient) is the HTTP implementation;
/// tests plug in canned models.
pub trait LanguageModel: Send + Sync {
    fn complete(&self, request: CompletionRequest) -> ModelFuture<'_>;
}

/// Configuration for the summarizer.
#[derive(Debug, Clone, PartialEq)]
pub struct SummarizerConfig {
    /// Model id passed through to the provider.
    pub model: String,
    /// Maximum tokens for the digest.
    pub max_summary_tokens: u32,
    /// Characters of each message included in the transcript.
    pub excerpt_chars: usize,
    /// Upper bound on the model call.
    pub timeout: Duration,
}

impl SummarizerConfig {
    pub fn from_budget(budget: &ContextBudget) -> Self {
        Self {
            model: budget.summary_model.clone(),
            max_summary_tokens: budget.max_summary_tokens,
            excerpt_chars: budget.summary_excerpt_chars,
            timeout: budget.timeout(),
        }
    }
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self::from_budget(&ContextBudget::default())
    }
}

/// Summarizes a span of old messages through a [`LanguageModel`].
pub struct Summarizer {
    model: Arc<dyn LanguageModel>,
    config: SummarizerConfig,
}

impl Summarizer {
    pub fn new(model: Arc<dyn LanguageModel>, config: SummarizerConfig) -> Self {
        Self { model, config }
    }

    pub fn config(&self) -> &SummarizerConfig {
        &self.config
    }

    /// Build the one-shot request for a span of messages.
    pub fn build_summarization_request(&self, span: &[Message]) -> CompletionRequest {
        CompletionRequest {
            model: self.config.model.clone(),
            system_prompt: SUMMARY_SYSTEM_PROMPT.to_string(),
            messages: vec![Message::user(format_span(span, self.config.excerpt_chars))],
            max_output_tokens: self.config.max_summary_tokens,
        }
    }

    /// Summarize `old` and return the wrapped digest text.
    ///
    /// Fails on transport errors, an empty reply, or when the call exceeds
    /// the configured timeout. The caller decides what to fall back to.
    pub async fn summarize(&self, old: &[Message]) -> Result<String, ContextError> {
        let request = self.build_summarization_request(old);
        debug!(
            "Summarizing {} messages with {} (timeout {:?})",
            old.len(),
            request.model,
            self.config.timeout
        );

        let completion = tokio::time::timeout(self.config.timeout, self.model.complete(request))
            .await
            .map_err(|_| ContextError::Timeout(self.config.timeout))??;

        let digest = completion.text.trim();
        if digest.is_empty() {
            return Err(ContextError::EmptyResponse);
        }
        Ok(wrap_digest(old.len(), digest))
    }

    /// Summarize `old` into the `system` message that replaces it.
    pub async fn summary_message(&self, old: &[Message]) -> Result<Message, ContextError> {
        Ok(Message::system(self.summarize(old).await?))
    }
}

/// Render a span as `ROLE: excerpt` lines.
pub fn format_span(span: &[Message], excerpt_chars: usize) -> String {
    span.iter()
        .map(|msg| format_line(msg.role, &msg.text_content(), excerpt_chars))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_line(role: MessageRole, text: &str, excerpt_chars: usize) -> String {
    let excerpt: String = text.chars().take(excerpt_chars).collect();
    format!("{}: {excerpt}", role.label())
}

/// Wrap a digest in the marker block the manager injects.
pub fn wrap_digest(compacted: usize, digest: &str) -> String {
    format!("[CONVERSATION SUMMARY - {compacted} messages compacted]\n{digest}\n[END SUMMARY]")
}
