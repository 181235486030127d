//! The compaction entry point.
//!
//! [`ContextManager::manage`] measures the would-be prompt, decides whether
//! compaction is needed, finds a boundary-safe split, and runs the fallback
//! chain: provider edit, then summarization of the old span, then plain
//! truncation. It never returns an error; every strategy failure is logged
//! and handed to the next step.

use crate::api::anthropic::client::RemoteContextEditor;
use crate::context::boundary::{find_safe_split_point, orphaned_tool_results};
use crate::context::budget::{ContextBudget, StrategyKind};
use crate::context::provider_edit::{ContextEditor, ProviderEditStrategy};
use crate::context::summarizer::{LanguageModel, Summarizer, SummarizerConfig};
use crate::error::ContextError;
use crate::{Message, OpenRouterClient};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Environment variable holding the summarization API key.
pub const OPENROUTER_KEY_VAR: &str = "OPENROUTER_KEY";
/// Environment variable holding the context-editing API key.
pub const ANTHROPIC_KEY_VAR: &str = "ANTHROPIC_API_KEY";
/// Environment variable holding the context-editing endpoint URL.
pub const CONTEXT_EDIT_URL_VAR: &str = "CONTEXT_EDIT_URL";

/// How a window was compacted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompactionMethod {
    /// Window returned unchanged.
    None,
    /// Old span replaced by a digest.
    Summarization,
    /// Provider applied edit directives.
    ProviderEdit,
    /// Old span dropped without replacement.
    Truncation,
}

/// Outcome of [`ContextManager::manage`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactionResult {
    pub messages: Vec<Message>,
    /// True iff a digest was inserted.
    pub summarized: bool,
    pub original_tokens: usize,
    pub new_tokens: usize,
    /// `original_tokens - new_tokens`. Zero or negative is not an error.
    pub tokens_saved: i64,
    pub method: CompactionMethod,
}

impl CompactionResult {
    fn unchanged(messages: &[Message], tokens: usize) -> Self {
        Self {
            messages: messages.to_vec(),
            summarized: false,
            original_tokens: tokens,
            new_tokens: tokens,
            tokens_saved: 0,
            method: CompactionMethod::None,
        }
    }
}

/// Keeps a conversation window under its [`ContextBudget`].
///
/// # Example
///
/// ```ignore
/// let manager = ContextManager::new(ContextBudget::new(8_000))
///     .with_summary_model(Arc::new(OpenRouterClient::new(key)?));
/// let result = manager.manage(&messages).await;
/// ```
pub struct ContextManager {
    budget: ContextBudget,
    summarizer: Option<Summarizer>,
    provider_edit: Option<ProviderEditStrategy>,
}

impl ContextManager {
    /// A manager with no strategies attached: over-budget windows are
    /// truncated.
    pub fn new(budget: ContextBudget) -> Self {
        Self {
            budget,
            summarizer: None,
            provider_edit: None,
        }
    }

    /// Attach a summarization model.
    pub fn with_summary_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.summarizer = Some(Summarizer::new(
            model,
            SummarizerConfig::from_budget(&self.budget),
        ));
        self
    }

    /// Attach a context editor, tried before summarization.
    pub fn with_context_editor(mut self, editor: Arc<dyn ContextEditor>) -> Self {
        self.provider_edit = Some(ProviderEditStrategy::from_budget(editor, &self.budget));
        self
    }

    /// Build the strategies named by `budget.strategy` from process
    /// environment credentials.
    pub fn from_env(budget: ContextBudget) -> Self {
        Self::from_lookup(budget, |key| std::env::var(key).ok())
    }

    /// Build the strategies named by `budget.strategy`, reading credentials
    /// through `lookup`. A strategy whose credentials are missing is left
    /// unconfigured and the fallback chain covers for it.
    pub fn from_lookup(budget: ContextBudget, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let strategy = budget.strategy;
        let mut manager = Self::new(budget);

        if strategy == StrategyKind::ProviderEdit {
            match remote_editor(&lookup) {
                Ok(editor) => manager = manager.with_context_editor(editor),
                Err(e) => warn!("Provider context editing disabled: {e}"),
            }
        }
        if matches!(strategy, StrategyKind::Summarize | StrategyKind::ProviderEdit) {
            match summary_model(&lookup) {
                Ok(model) => manager = manager.with_summary_model(model),
                Err(e) => {
                    warn!("Summarization disabled, over-budget windows will be truncated: {e}")
                }
            }
        }
        manager
    }

    pub fn budget(&self) -> &ContextBudget {
        &self.budget
    }

    pub fn has_summarizer(&self) -> bool {
        self.summarizer.is_some()
    }

    pub fn has_context_editor(&self) -> bool {
        self.provider_edit.is_some()
    }

    /// Estimated prompt size: messages, system prompt and tool schemas.
    pub fn measure(&self, messages: &[Message]) -> usize {
        self.budget.estimate_usage(messages).estimated_tokens
    }

    /// Return `messages` unchanged when under budget, or a compacted copy.
    pub async fn manage(&self, messages: &[Message]) -> CompactionResult {
        let usage = self.budget.estimate_usage(messages);
        let original_tokens = usage.estimated_tokens;
        debug!("{}", usage.to_log_string());

        if !usage.over_budget() {
            return CompactionResult::unchanged(messages, original_tokens);
        }

        let split = find_safe_split_point(
            messages,
            self.budget.keep_recent_messages,
            self.budget.search_window,
        );
        if split < self.budget.min_compactable_messages {
            debug!(
                "Over budget but only {split} message(s) before the split, leaving window unchanged"
            );
            return CompactionResult::unchanged(messages, original_tokens);
        }

        let orphans = orphaned_tool_results(&messages[split..]);
        if !orphans.is_empty() {
            debug!("Kept window starts with orphaned tool results: {orphans:?}");
        }

        let (compacted, method) = self.compact(messages, split).await;
        let new_tokens = self.measure(&compacted);
        let tokens_saved = original_tokens as i64 - new_tokens as i64;

        info!(
            "Context compacted via {method:?}: {} -> {} messages, ~{original_tokens} -> ~{new_tokens} tokens",
            messages.len(),
            compacted.len(),
        );

        CompactionResult {
            messages: compacted,
            summarized: method == CompactionMethod::Summarization,
            original_tokens,
            new_tokens,
            tokens_saved,
            method,
        }
    }

    async fn compact(
        &self,
        messages: &[Message],
        split: usize,
    ) -> (Vec<Message>, CompactionMethod) {
        if let Some(editor) = &self.provider_edit {
            match editor.edit(messages).await {
                Ok(outcome) => return (outcome.messages, CompactionMethod::ProviderEdit),
                Err(e) => warn!(
                    "Provider context edit failed ({}), falling back: {e}",
                    transience(&e)
                ),
            }
        }

        let (old, recent) = messages.split_at(split);

        if let Some(summarizer) = &self.summarizer {
            match summarizer.summary_message(old).await {
                Ok(summary) => {
                    let mut out = Vec::with_capacity(recent.len() + 1);
                    out.push(summary);
                    out.extend_from_slice(recent);
                    return (out, CompactionMethod::Summarization);
                }
                Err(e) => warn!(
                    "Summarization failed ({}), truncating {} old message(s): {e}",
                    transience(&e),
                    old.len()
                ),
            }
        }

        (recent.to_vec(), CompactionMethod::Truncation)
    }
}

fn transience(e: &ContextError) -> &'static str {
    if e.is_transient() { "transient" } else { "permanent" }
}

fn required(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<String, ContextError> {
    lookup(var)
        .filter(|v| !v.trim().is_empty())
        .ok_or(ContextError::MissingCredentials(var))
}

fn summary_model(
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<Arc<dyn LanguageModel>, ContextError> {
    let key = required(lookup, OPENROUTER_KEY_VAR)?;
    Ok(Arc::new(OpenRouterClient::new(key)?))
}

fn remote_editor(
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<Arc<dyn ContextEditor>, ContextError> {
    let key = required(lookup, ANTHROPIC_KEY_VAR)?;
    let url = required(lookup, CONTEXT_EDIT_URL_VAR)?;
    Ok(Arc::new(RemoteContextEditor::new(key, url)?))
}

/// Compact `messages` against `budget` with strategies built from the
/// process environment.
pub async fn manage(messages: &[Message], budget: &ContextBudget) -> CompactionResult {
    ContextManager::from_env(budget.clone()).manage(messages).await
}
