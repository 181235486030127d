//! Approximate, deterministic token estimation.
//!
//! Character-count based: `ceil(chars / chars_per_token)`. Messages are
//! measured by their canonical JSON serialization, plus a fixed surcharge for
//! every tool call and tool result. Tool schemas are charged a flat amount
//! each. No tokenizer, no I/O, no failure modes.

use crate::context::budget::{DEFAULT_CHARS_PER_TOKEN, EstimatorConfig};
use crate::{Content, Message};

/// Anything the estimator can measure.
///
/// Implemented for `str` (system prompts), single messages, and message
/// slices, so callers can write `estimator.estimate(prompt)` or
/// `estimator.estimate(&messages[..])` alike.
pub trait TokenCount {
    /// Weighted character count, including any per-invocation surcharge.
    fn weighted_chars(&self, config: &EstimatorConfig) -> usize;
}

impl TokenCount for str {
    fn weighted_chars(&self, _config: &EstimatorConfig) -> usize {
        self.chars().count()
    }
}

impl TokenCount for String {
    fn weighted_chars(&self, config: &EstimatorConfig) -> usize {
        self.as_str().weighted_chars(config)
    }
}

impl TokenCount for Message {
    fn weighted_chars(&self, config: &EstimatorConfig) -> usize {
        let serialized = serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"));
        serialized.chars().count()
            + tool_invocation_count(&self.content) * config.tool_invocation_overhead_chars
    }
}

impl TokenCount for [Message] {
    fn weighted_chars(&self, config: &EstimatorConfig) -> usize {
        self.iter().map(|m| m.weighted_chars(config)).sum()
    }
}

impl TokenCount for Vec<Message> {
    fn weighted_chars(&self, config: &EstimatorConfig) -> usize {
        self.as_slice().weighted_chars(config)
    }
}

/// Count tool-call / tool-result parts in message content.
///
/// Unrecognized content is scanned best-effort for objects whose `type`
/// names a tool invocation in either this crate's or a provider's spelling.
fn tool_invocation_count(content: &Content) -> usize {
    match content {
        Content::Text(_) => 0,
        Content::Parts(parts) => parts.iter().filter(|p| p.is_tool_invocation()).count(),
        Content::Other(value) => raw_tool_invocation_count(value),
    }
}

fn raw_tool_invocation_count(value: &serde_json::Value) -> usize {
    match value {
        serde_json::Value::Array(items) => items.iter().map(raw_tool_invocation_count).sum(),
        serde_json::Value::Object(map) => {
            let own = map
                .get("type")
                .and_then(|t| t.as_str())
                .is_some_and(|t| {
                    matches!(
                        t,
                        "tool-call" | "tool-result" | "tool_use" | "tool_result" | "function_call"
                    )
                });
            usize::from(own) + map.values().map(raw_tool_invocation_count).sum::<usize>()
        }
        _ => 0,
    }
}

/// Token estimator configured from an [`EstimatorConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenEstimator {
    config: EstimatorConfig,
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::new(EstimatorConfig::default())
    }
}

impl TokenEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Estimate tokens for a string, a message, or a message sequence.
    pub fn estimate<T: TokenCount + ?Sized>(&self, input: &T) -> usize {
        self.chars_to_tokens(input.weighted_chars(&self.config))
    }

    pub fn text(&self, text: &str) -> usize {
        self.estimate(text)
    }

    pub fn messages(&self, messages: &[Message]) -> usize {
        self.estimate(messages)
    }

    /// Fixed cost of making `n` tool schemas available to the model.
    pub fn tool_schemas(&self, n: usize) -> usize {
        n.saturating_mul(self.config.tool_schema_overhead_tokens)
    }

    /// Would-be prompt size: messages + system prompt + tool schemas.
    pub fn total(
        &self,
        messages: &[Message],
        system_prompt: Option<&str>,
        tool_count: usize,
    ) -> usize {
        self.messages(messages)
            .saturating_add(system_prompt.map_or(0, |s| self.text(s)))
            .saturating_add(self.tool_schemas(tool_count))
    }

    fn chars_to_tokens(&self, chars: usize) -> usize {
        if chars == 0 {
            return 0;
        }
        // A zero or negative ratio would divide into nonsense; fall back.
        let cpt = if self.config.chars_per_token > 0.0 {
            self.config.chars_per_token
        } else {
            DEFAULT_CHARS_PER_TOKEN
        };
        (chars as f64 / cpt).ceil() as usize
    }
}
