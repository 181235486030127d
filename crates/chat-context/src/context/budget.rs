//! Context budget configuration: the single, versioned settings struct every
//! caller injects into the [`ContextManager`](super::manager::ContextManager).
//!
//! Holds the hard ceiling that triggers compaction, how many recent messages
//! must survive verbatim, the fixed prompt costs (system prompt text and
//! declared tool schemas), and every tuning knob the estimator and the
//! compaction strategies use. Nothing here is re-derived per call site.

use crate::Message;
use crate::context::estimator::TokenEstimator;
use crate::context::provider_edit::EditOptions;
use crate::error::ContextError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Default characters per token (conservative estimate for English text).
/// Most tokenizers average 3-4 chars per token; we use 3.5 as a middle ground.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 3.5;

/// Current configuration schema version. Bump when a field changes meaning.
pub const BUDGET_CONFIG_VERSION: u32 = 1;

const DEFAULT_MAX_TOKENS: usize = 100_000;
const DEFAULT_KEEP_RECENT: usize = 10;
const DEFAULT_TOOL_INVOCATION_OVERHEAD_CHARS: usize = 200;
const DEFAULT_TOOL_SCHEMA_OVERHEAD_TOKENS: usize = 150;
const DEFAULT_SEARCH_WINDOW: usize = 3;
const DEFAULT_MIN_COMPACTABLE: usize = 3;
const DEFAULT_SUMMARY_EXCERPT_CHARS: usize = 300;
const DEFAULT_MAX_SUMMARY_TOKENS: u32 = 2048;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Tuning knobs for [`TokenEstimator`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Characters per token.
    pub chars_per_token: f64,
    /// Extra characters charged for every tool-call or tool-result part.
    /// Tool metadata costs more tokens than its serialized size suggests.
    pub tool_invocation_overhead_chars: usize,
    /// Tokens charged per declared tool schema.
    pub tool_schema_overhead_tokens: usize,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
            tool_invocation_overhead_chars: DEFAULT_TOOL_INVOCATION_OVERHEAD_CHARS,
            tool_schema_overhead_tokens: DEFAULT_TOOL_SCHEMA_OVERHEAD_TOKENS,
        }
    }
}

/// Preferred compaction strategy. Whatever is picked, failures degrade
/// toward plain truncation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// LLM digest of the dropped span.
    #[default]
    Summarize,
    /// Provider-side context editing, then summarization, then truncation.
    ProviderEdit,
    /// Drop the old span without a replacement.
    Truncate,
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "summarize" | "summarization" => Ok(StrategyKind::Summarize),
            "provider-edit" | "edit" => Ok(StrategyKind::ProviderEdit),
            "truncate" | "truncation" => Ok(StrategyKind::Truncate),
            other => Err(format!(
                "unknown strategy '{other}' (expected summarize, provider-edit or truncate)"
            )),
        }
    }
}

/// Context budget for one conversation window.
///
/// Construct with [`ContextBudget::new`] and the `with_*` builders, or load a
/// JSON file with [`ContextBudget::load`]. Every field has a default, so a
/// config file only needs the values it changes.
///
/// # Example
///
/// ```ignore
/// let budget = ContextBudget::new(128_000)
///     .with_keep_recent(8)
///     .with_system_prompt(SYSTEM_PROMPT)
///     .with_tool_count(tools.len())
///     .with_timeout(Duration::from_secs(20));
///
/// let usage = budget.estimate_usage(&messages);
/// tracing::debug!("{}", usage.to_log_string());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextBudget {
    /// Schema version of this configuration.
    pub version: u32,
    /// Hard ceiling. Compaction triggers when the estimate reaches it.
    pub max_tokens: usize,
    /// Most-recent messages that must survive compaction verbatim.
    pub keep_recent_messages: usize,
    /// System prompt sent with every call; counted against the budget.
    pub system_prompt_text: Option<String>,
    /// Number of tool schemas made available to the model (0 = none).
    pub declared_tool_count: usize,
    pub estimator: EstimatorConfig,
    /// How far back from the ideal cut the boundary finder looks.
    pub search_window: usize,
    /// Skip compaction when fewer old messages than this would be dropped.
    pub min_compactable_messages: usize,
    /// Characters of each dropped message shown to the summarizer.
    pub summary_excerpt_chars: usize,
    pub summary_model: String,
    pub max_summary_tokens: u32,
    /// Upper bound on each strategy's network call.
    pub timeout_secs: u64,
    pub strategy: StrategyKind,
    /// Directive parameters for the provider-edit strategy.
    pub edit: EditOptions,
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self {
            version: BUDGET_CONFIG_VERSION,
            max_tokens: DEFAULT_MAX_TOKENS,
            keep_recent_messages: DEFAULT_KEEP_RECENT,
            system_prompt_text: None,
            declared_tool_count: 0,
            estimator: EstimatorConfig::default(),
            search_window: DEFAULT_SEARCH_WINDOW,
            min_compactable_messages: DEFAULT_MIN_COMPACTABLE,
            summary_excerpt_chars: DEFAULT_SUMMARY_EXCERPT_CHARS,
            summary_model: crate::DEFAULT_SUMMARY_MODEL.to_string(),
            max_summary_tokens: DEFAULT_MAX_SUMMARY_TOKENS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            strategy: StrategyKind::default(),
            edit: EditOptions::default(),
        }
    }
}

impl ContextBudget {
    /// Create a budget with the given ceiling and defaults for everything else.
    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            ..Default::default()
        }
    }

    /// Load a budget from a JSON file and validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ContextError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let budget: Self = serde_json::from_str(&raw)?;
        budget.validate()?;
        Ok(budget)
    }

    /// Reject configurations the manager cannot honor.
    pub fn validate(&self) -> Result<(), ContextError> {
        if self.version > BUDGET_CONFIG_VERSION {
            return Err(ContextError::Config(format!(
                "config version {} is newer than supported version {BUDGET_CONFIG_VERSION}",
                self.version
            )));
        }
        if self.max_tokens == 0 {
            return Err(ContextError::Config("max_tokens must be positive".into()));
        }
        if !(self.estimator.chars_per_token.is_finite() && self.estimator.chars_per_token > 0.0) {
            return Err(ContextError::Config(format!(
                "chars_per_token must be a positive number, got {}",
                self.estimator.chars_per_token
            )));
        }
        Ok(())
    }

    pub fn with_keep_recent(mut self, n: usize) -> Self {
        self.keep_recent_messages = n;
        self
    }

    pub fn with_system_prompt(mut self, text: impl Into<String>) -> Self {
        self.system_prompt_text = Some(text.into());
        self
    }

    pub fn with_tool_count(mut self, n: usize) -> Self {
        self.declared_tool_count = n;
        self
    }

    pub fn with_estimator(mut self, estimator: EstimatorConfig) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn with_chars_per_token(mut self, cpt: f64) -> Self {
        self.estimator.chars_per_token = cpt;
        self
    }

    pub fn with_search_window(mut self, window: usize) -> Self {
        self.search_window = window;
        self
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_summary_model(mut self, model: impl Into<String>) -> Self {
        self.summary_model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn with_edit_options(mut self, edit: EditOptions) -> Self {
        self.edit = edit;
        self
    }

    /// Timeout applied to each strategy's network call.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Estimator configured with this budget's tuning knobs.
    pub fn estimator(&self) -> TokenEstimator {
        TokenEstimator::new(self.estimator)
    }

    /// Estimate the full would-be prompt size: messages plus system prompt
    /// plus tool schemas.
    pub fn estimate_usage(&self, messages: &[Message]) -> ContextUsage {
        let estimator = self.estimator();
        let message_tokens = estimator.messages(messages);
        let system_prompt_tokens = self
            .system_prompt_text
            .as_deref()
            .map_or(0, |s| estimator.text(s));
        let tool_schema_tokens = estimator.tool_schemas(self.declared_tool_count);
        let estimated_tokens = message_tokens
            .saturating_add(system_prompt_tokens)
            .saturating_add(tool_schema_tokens);

        let usage_pct = if self.max_tokens > 0 {
            estimated_tokens as f64 / self.max_tokens as f64
        } else {
            1.0
        };

        ContextUsage {
            estimated_tokens,
            message_tokens,
            system_prompt_tokens,
            tool_schema_tokens,
            max_tokens: self.max_tokens,
            usage_pct,
        }
    }
}

/// Snapshot of context usage at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct ContextUsage {
    /// Total estimated tokens (messages + system prompt + tool schemas).
    pub estimated_tokens: usize,
    pub message_tokens: usize,
    pub system_prompt_tokens: usize,
    pub tool_schema_tokens: usize,
    pub max_tokens: usize,
    /// Usage as a fraction (0.0 to 1.0+).
    pub usage_pct: f64,
}

impl ContextUsage {
    /// Whether the window must be compacted before the next model call.
    pub fn over_budget(&self) -> bool {
        self.estimated_tokens >= self.max_tokens
    }

    /// Format as a short log-friendly string.
    pub fn to_log_string(&self) -> String {
        format!(
            "context: ~{} tokens ({:.0}% of {}; messages {}, system {}, tools {})",
            self.estimated_tokens,
            self.usage_pct * 100.0,
            self.max_tokens,
            self.message_tokens,
            self.system_prompt_tokens,
            self.tool_schema_tokens,
        )
    }
}
