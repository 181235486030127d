//! Convenience re-exports for common `chat-context` types.
//!
//! Meant to be glob-imported by callers that compact before each model call:
//!
//! ```ignore
//! use chat_context::prelude::*;
//! ```
//!
//! Wire-format types and the in-process editor are left out; import those
//! from [`api::anthropic`](crate::api::anthropic) and
//! [`context::eviction`](crate::context::eviction) when needed.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{Content, ContentPart, ContextError, Message, MessageRole, OpenRouterClient};

// ── Configuration ───────────────────────────────────────────────────
pub use crate::context::budget::{ContextBudget, ContextUsage, EstimatorConfig, StrategyKind};

// ── Compaction ──────────────────────────────────────────────────────
pub use crate::context::boundary::find_safe_split_point;
pub use crate::context::estimator::TokenEstimator;
pub use crate::context::manager::{CompactionMethod, CompactionResult, ContextManager};
pub use crate::context::provider_edit::{ContextEditor, EditOptions};
pub use crate::context::summarizer::{LanguageModel, Summarizer};
