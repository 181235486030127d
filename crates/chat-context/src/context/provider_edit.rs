//! Provider context-editing strategy.
//!
//! Instead of summarizing, the window is converted to the provider's native
//! shape and sent with a list of edit directives (clear old thinking, clear
//! old tool results). The provider returns the edited window, which is
//! converted back. Any failure, including an edit call that applied nothing,
//! is reported to the caller so the fallback chain can take over.

use crate::Message;
use crate::api::anthropic::convert::{from_wire, restore_roles, to_wire};
use crate::api::anthropic::types::{
    AppliedEdit, ContextManagement, EditDirective, EditRequest, EditResponse, Threshold,
    WireConversation,
};
use crate::context::boundary::{orphaned_tool_results, unresolved_tool_calls};
use crate::context::budget::ContextBudget;
use crate::context::estimator::TokenEstimator;
use crate::error::ContextError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_EDIT_MODEL: &str = "claude-sonnet-4-5";

/// Boxed future returned by [`ContextEditor::apply_edits`].
pub type EditFuture<'a> =
    Pin<Box<dyn Future<Output = Result<EditResponse, ContextError>> + Send + 'a>>;

/// Something that applies edit directives to a provider-shaped window.
pub trait ContextEditor: Send + Sync {
    fn apply_edits(&self, request: EditRequest) -> EditFuture<'_>;
}

/// Directive parameters for the provider-edit strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditOptions {
    /// Model id sent with the edit request.
    pub model: String,
    /// Keep thinking blocks in only the last K assistant turns.
    /// `None` sends no thinking directive.
    pub keep_thinking_turns: Option<usize>,
    /// Only clear tool uses once the input exceeds this many tokens.
    pub trigger_input_tokens: Option<usize>,
    /// Most recent tool uses left intact.
    pub keep_tool_uses: usize,
    /// Also blank the inputs of cleared tool calls.
    pub clear_tool_inputs: bool,
    /// Tools whose results are never cleared.
    pub exclude_tools: Vec<String>,
}

impl Default for EditOptions {
    fn default() -> Self {
        Self {
            model: DEFAULT_EDIT_MODEL.to_string(),
            keep_thinking_turns: Some(1),
            trigger_input_tokens: None,
            keep_tool_uses: 3,
            clear_tool_inputs: false,
            exclude_tools: Vec::new(),
        }
    }
}

impl EditOptions {
    pub fn exclude_tool(mut self, name: impl Into<String>) -> Self {
        self.exclude_tools.push(name.into());
        self
    }

    pub fn with_keep_tool_uses(mut self, n: usize) -> Self {
        self.keep_tool_uses = n;
        self
    }

    pub fn with_trigger(mut self, input_tokens: usize) -> Self {
        self.trigger_input_tokens = Some(input_tokens);
        self
    }

    /// The directive list sent to the provider. Thinking is cleared first.
    pub fn directives(&self) -> Vec<EditDirective> {
        let mut edits = Vec::with_capacity(2);
        if let Some(keep) = self.keep_thinking_turns {
            edits.push(EditDirective::ClearThinking {
                keep: Threshold::thinking_turns(keep),
            });
        }
        edits.push(EditDirective::ClearToolUses {
            trigger: self.trigger_input_tokens.map(Threshold::input_tokens),
            keep: Threshold::tool_uses(self.keep_tool_uses),
            clear_tool_inputs: self.clear_tool_inputs,
            exclude_tools: self.exclude_tools.clone(),
        });
        edits
    }
}

/// Result of a successful edit.
#[derive(Debug, Clone, PartialEq)]
pub struct EditOutcome {
    pub messages: Vec<Message>,
    /// Estimated tokens before minus after. May be zero or negative.
    pub tokens_saved: i64,
    pub applied_edits: Vec<AppliedEdit>,
}

pub struct ProviderEditStrategy {
    editor: Arc<dyn ContextEditor>,
    options: EditOptions,
    estimator: TokenEstimator,
    timeout: Duration,
}

impl ProviderEditStrategy {
    pub fn new(
        editor: Arc<dyn ContextEditor>,
        options: EditOptions,
        estimator: TokenEstimator,
        timeout: Duration,
    ) -> Self {
        Self {
            editor,
            options,
            estimator,
            timeout,
        }
    }

    pub fn from_budget(editor: Arc<dyn ContextEditor>, budget: &ContextBudget) -> Self {
        Self::new(
            editor,
            budget.edit.clone(),
            budget.estimator(),
            budget.timeout(),
        )
    }

    pub fn options(&self) -> &EditOptions {
        &self.options
    }

    /// Build the provider request for a window.
    pub fn build_request(&self, conversation: WireConversation) -> EditRequest {
        EditRequest {
            model: self.options.model.clone(),
            system: conversation.system,
            messages: conversation.messages,
            context_management: ContextManagement {
                edits: self.options.directives(),
            },
        }
    }

    /// Ask the provider to edit `messages` and convert the result back.
    pub async fn edit(&self, messages: &[Message]) -> Result<EditOutcome, ContextError> {
        let unresolved = unresolved_tool_calls(messages);
        if !unresolved.is_empty() {
            return Err(ContextError::UnsettledToolCalls(unresolved));
        }

        let request = self.build_request(to_wire(messages));
        let sent_system = request.system.clone();
        debug!(
            "Requesting context edit: {} wire messages, {} directives",
            request.messages.len(),
            request.context_management.edits.len()
        );

        let response = tokio::time::timeout(self.timeout, self.editor.apply_edits(request))
            .await
            .map_err(|_| ContextError::Timeout(self.timeout))??;

        if response.applied_edits().is_empty() {
            return Err(ContextError::NoEditsApplied);
        }

        let EditResponse {
            system,
            messages: wire_messages,
            context_management,
        } = response;
        // An omitted or emptied system prompt is not an edit target.
        let system = system.filter(|blocks| !blocks.is_empty()).unwrap_or(sent_system);
        let mut edited = from_wire(WireConversation {
            system,
            messages: wire_messages,
        });
        restore_roles(&mut edited, messages);

        let dangling = unresolved_tool_calls(&edited);
        if !dangling.is_empty() {
            return Err(ContextError::Parse(format!(
                "edited window lost tool results for: {}",
                dangling.join(", ")
            )));
        }
        let already_orphaned = orphaned_tool_results(messages);
        let new_orphans: Vec<String> = orphaned_tool_results(&edited)
            .into_iter()
            .filter(|id| !already_orphaned.contains(id))
            .collect();
        if !new_orphans.is_empty() {
            return Err(ContextError::Parse(format!(
                "edited window lost tool calls for: {}",
                new_orphans.join(", ")
            )));
        }

        let before = self.estimator.messages(messages) as i64;
        let after = self.estimator.messages(&edited) as i64;
        debug!(
            "Context edit applied {} edit(s): {} -> {} message tokens",
            context_management.applied_edits.len(),
            before,
            after
        );

        Ok(EditOutcome {
            messages: edited,
            tokens_saved: before - after,
            applied_edits: context_management.applied_edits,
        })
    }
}
