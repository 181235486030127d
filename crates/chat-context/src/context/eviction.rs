//! In-process context editing: apply edit directives without a provider.
//!
//! Tool results are the largest context consumers in any tool-using
//! conversation, and most of their bytes are irrelevant once the model has
//! read them. [`LocalContextEditor`] honours the same directives a provider
//! would (clear old tool results, clear old thinking) and replaces cleared
//! content with one-line placeholders. No LLM call, no network.

use crate::api::anthropic::types::{
    AppliedEdit, AppliedEdits, EditDirective, EditRequest, EditResponse, SystemBlock, WireBlock,
    WireContent, WireMessage, WireRole,
};
use crate::context::estimator::TokenEstimator;
use crate::context::provider_edit::{ContextEditor, EditFuture};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Prefix used for cleared placeholders.
///
/// Both the placeholder writer and the "already cleared?" check reference
/// this constant so they can't drift out of sync.
pub const EVICTED_PREFIX: &str = "[Cleared:";

const ARGS_SUMMARY_CHARS: usize = 80;
const ARG_VALUE_CHARS: usize = 40;

/// Applies [`EditDirective`]s to a provider-shaped window in memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalContextEditor {
    estimator: TokenEstimator,
}

impl LocalContextEditor {
    pub fn new(estimator: TokenEstimator) -> Self {
        Self { estimator }
    }

    /// Apply every directive in order and report what changed.
    pub fn apply(&self, request: &EditRequest) -> EditResponse {
        let mut messages = request.messages.clone();
        let mut applied = Vec::new();

        for directive in &request.context_management.edits {
            match directive {
                EditDirective::ClearThinking { keep } => {
                    let cleared = clear_thinking(&mut messages, keep.value);
                    if cleared > 0 {
                        applied.push(AppliedEdit {
                            kind: "clear_thinking_20251015".into(),
                            cleared_tool_uses: None,
                            cleared_thinking_turns: Some(cleared),
                            cleared_input_tokens: None,
                        });
                    }
                }
                EditDirective::ClearToolUses {
                    trigger,
                    keep,
                    clear_tool_inputs,
                    exclude_tools,
                } => {
                    let before = self.input_tokens(&request.system, &messages);
                    if let Some(trigger) = trigger
                        && before < trigger.value
                    {
                        debug!(
                            "Skipping tool-use clearing: ~{before} input tokens below trigger {}",
                            trigger.value
                        );
                        continue;
                    }
                    let cleared = clear_tool_uses(
                        &mut messages,
                        keep.value,
                        *clear_tool_inputs,
                        exclude_tools,
                    );
                    if cleared > 0 {
                        let after = self.input_tokens(&request.system, &messages);
                        applied.push(AppliedEdit {
                            kind: "clear_tool_uses_20250919".into(),
                            cleared_tool_uses: Some(cleared),
                            cleared_thinking_turns: None,
                            cleared_input_tokens: Some(before.saturating_sub(after)),
                        });
                    }
                }
            }
        }

        EditResponse {
            system: None,
            messages,
            context_management: AppliedEdits {
                applied_edits: applied,
            },
        }
    }

    /// Estimated input size of a wire window.
    fn input_tokens(&self, system: &[SystemBlock], messages: &[WireMessage]) -> usize {
        let system_tokens: usize = system.iter().map(|b| self.estimator.text(b.as_text())).sum();
        let serialized = serde_json::to_string(messages).unwrap_or_default();
        system_tokens + self.estimator.text(&serialized)
    }
}

impl ContextEditor for LocalContextEditor {
    fn apply_edits(&self, request: EditRequest) -> EditFuture<'_> {
        let response = self.apply(&request);
        Box::pin(async move { Ok(response) })
    }
}

fn blocks_mut(msg: &mut WireMessage) -> Option<&mut Vec<WireBlock>> {
    match &mut msg.content {
        WireContent::Blocks(blocks) => Some(blocks),
        WireContent::Text(_) => None,
    }
}

/// Replace results of all but the last `keep` tool uses with placeholders.
///
/// Returns the number of tool uses newly cleared.
fn clear_tool_uses(
    messages: &mut [WireMessage],
    keep: usize,
    clear_inputs: bool,
    exclude_tools: &[String],
) -> usize {
    let uses: Vec<(String, String, String)> = messages
        .iter()
        .filter_map(|m| match &m.content {
            WireContent::Blocks(blocks) if m.role == WireRole::Assistant => Some(blocks),
            _ => None,
        })
        .flatten()
        .filter_map(|b| match b {
            WireBlock::ToolUse { id, name, input } if !exclude_tools.contains(name) => {
                Some((id.clone(), name.clone(), summarize_args(input, ARGS_SUMMARY_CHARS)))
            }
            _ => None,
        })
        .collect();

    let clearable = uses.len().saturating_sub(keep);
    let targets: HashMap<&str, (&str, &str)> = uses
        .iter()
        .take(clearable)
        .map(|(id, name, args)| (id.as_str(), (name.as_str(), args.as_str())))
        .collect();
    if targets.is_empty() {
        return 0;
    }

    let mut cleared: HashSet<String> = HashSet::new();
    for msg in messages.iter_mut() {
        let Some(blocks) = blocks_mut(msg) else {
            continue;
        };
        for block in blocks.iter_mut() {
            match block {
                WireBlock::ToolResult {
                    tool_use_id,
                    content,
                    ..
                } => {
                    let Some((name, args)) = targets.get(tool_use_id.as_str()) else {
                        continue;
                    };
                    if is_cleared(content) {
                        continue;
                    }
                    let chars = rendered_len(content);
                    *content = Value::String(format!(
                        "{EVICTED_PREFIX} {name}({args}) - {chars} chars]"
                    ));
                    cleared.insert(tool_use_id.clone());
                }
                WireBlock::ToolUse { id, input, .. }
                    if clear_inputs && targets.contains_key(id.as_str()) =>
                {
                    *input = Value::Object(Default::default());
                }
                _ => {}
            }
        }
    }
    cleared.len()
}

/// Drop thinking blocks from all but the last `keep` assistant turns that
/// carry any. Returns the number of turns cleared.
fn clear_thinking(messages: &mut [WireMessage], keep: usize) -> usize {
    let thinking_turns: Vec<usize> = messages
        .iter()
        .enumerate()
        .filter(|(_, m)| m.role == WireRole::Assistant)
        .filter(|(_, m)| match &m.content {
            WireContent::Blocks(blocks) => blocks
                .iter()
                .any(|b| matches!(b, WireBlock::Thinking { .. })),
            WireContent::Text(_) => false,
        })
        .map(|(i, _)| i)
        .collect();

    let clearable = thinking_turns.len().saturating_sub(keep);
    for &idx in thinking_turns.iter().take(clearable) {
        if let Some(blocks) = blocks_mut(&mut messages[idx]) {
            blocks.retain(|b| !matches!(b, WireBlock::Thinking { .. }));
            // Providers reject empty content.
            if blocks.is_empty() {
                blocks.push(WireBlock::Text {
                    text: format!("{EVICTED_PREFIX} reasoning]"),
                });
            }
        }
    }
    clearable
}

fn is_cleared(content: &Value) -> bool {
    content
        .as_str()
        .is_some_and(|s| s.starts_with(EVICTED_PREFIX))
}

fn rendered_len(content: &Value) -> usize {
    match content {
        Value::String(s) => s.chars().count(),
        other => other.to_string().chars().count(),
    }
}

fn truncate_chars(s: &str, max_len: usize) -> String {
    if s.chars().count() > max_len {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{head}...")
    } else {
        s.to_string()
    }
}

/// Short argument summary for use in placeholders: `key="value", n=3`.
pub fn summarize_args(arguments: &Value, max_len: usize) -> String {
    let Some(obj) = arguments.as_object() else {
        return truncate_chars(&arguments.to_string(), max_len);
    };
    let parts: Vec<String> = obj
        .iter()
        .take(3)
        .map(|(k, v)| {
            let val = match v {
                Value::String(s) => format!("\"{}\"", truncate_chars(s, ARG_VALUE_CHARS)),
                other => truncate_chars(&other.to_string(), ARG_VALUE_CHARS),
            };
            format!("{k}={val}")
        })
        .collect();
    truncate_chars(&parts.join(", "), max_len)
}
