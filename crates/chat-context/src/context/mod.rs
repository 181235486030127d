//! Context window management: budget, estimation, boundaries, strategies.
//!
//! The pieces, bottom-up:
//!
//! 1. **[`budget`]**: [`ContextBudget`], the one versioned configuration
//!    struct, and [`ContextUsage`] snapshots.
//!
//! 2. **[`estimator`]**: deterministic character-based token estimates for
//!    strings, messages, and declared tool schemas.
//!
//! 3. **[`boundary`]**: where to cut without separating a tool call from
//!    its result, plus the tool-completeness predicate.
//!
//! 4. **[`summarizer`]**: replaces the old span with an LLM digest.
//!
//! 5. **[`provider_edit`]** and **[`eviction`]**: edit directives applied by
//!    the provider, or in-process, to clear old tool results and thinking.
//!
//! 6. **[`manager`]**: [`ContextManager::manage`], which ties it together
//!    and never fails.

pub mod boundary;
pub mod budget;
pub mod estimator;
pub mod eviction;
pub mod manager;
pub mod provider_edit;
pub mod summarizer;

// Re-export commonly used items at the module level.
pub use boundary::find_safe_split_point;
pub use budget::{ContextBudget, ContextUsage, DEFAULT_CHARS_PER_TOKEN};
pub use estimator::TokenEstimator;
pub use manager::{CompactionMethod, CompactionResult, ContextManager, manage};
