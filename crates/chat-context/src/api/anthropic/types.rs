//! Anthropic Messages API shapes used by the context-editing endpoint.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireRole {
    User,
    Assistant,
}

/// Provider-native message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: WireRole,
    pub content: WireContent,
}

impl WireMessage {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: WireRole::User,
            content: WireContent::Text(text.into()),
        }
    }
}

/// Message content: a bare string or a list of content blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireContent {
    Text(String),
    Blocks(Vec<WireBlock>),
}

/// Content block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

/// System prompt block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SystemBlock {
    Text { text: String },
}

impl SystemBlock {
    pub fn text(text: impl Into<String>) -> Self {
        SystemBlock::Text { text: text.into() }
    }

    pub fn as_text(&self) -> &str {
        match self {
            SystemBlock::Text { text } => text,
        }
    }
}

/// A whole window in provider shape: system blocks plus turn messages.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WireConversation {
    pub system: Vec<SystemBlock>,
    pub messages: Vec<WireMessage>,
}

// ── Context-management directives ──────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdUnit {
    ThinkingTurns,
    ToolUses,
    InputTokens,
}

/// `{"type": "tool_uses", "value": 3}` and friends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Threshold {
    #[serde(rename = "type")]
    pub unit: ThresholdUnit,
    pub value: usize,
}

impl Threshold {
    pub fn thinking_turns(value: usize) -> Self {
        Self {
            unit: ThresholdUnit::ThinkingTurns,
            value,
        }
    }

    pub fn tool_uses(value: usize) -> Self {
        Self {
            unit: ThresholdUnit::ToolUses,
            value,
        }
    }

    pub fn input_tokens(value: usize) -> Self {
        Self {
            unit: ThresholdUnit::InputTokens,
            value,
        }
    }
}

/// One edit the provider is asked to apply, tagged with its versioned type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EditDirective {
    /// Drop thinking blocks from all but the last `keep` assistant turns.
    #[serde(rename = "clear_thinking_20251015")]
    ClearThinking { keep: Threshold },
    /// Clear old tool results once the input grows past `trigger`.
    #[serde(rename = "clear_tool_uses_20250919")]
    ClearToolUses {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        trigger: Option<Threshold>,
        keep: Threshold,
        #[serde(default)]
        clear_tool_inputs: bool,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        exclude_tools: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContextManagement {
    pub edits: Vec<EditDirective>,
}

/// Body POSTed to the context-editing endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditRequest {
    pub model: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub system: Vec<SystemBlock>,
    pub messages: Vec<WireMessage>,
    pub context_management: ContextManagement,
}

/// One edit the provider reports having applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedEdit {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleared_tool_uses: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleared_thinking_turns: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleared_input_tokens: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AppliedEdits {
    #[serde(default)]
    pub applied_edits: Vec<AppliedEdit>,
}

/// Edited window returned by the endpoint.
///
/// A missing `context_management` object reads as "no edits applied".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<Vec<SystemBlock>>,
    pub messages: Vec<WireMessage>,
    #[serde(default)]
    pub context_management: AppliedEdits,
}

impl EditResponse {
    pub fn applied_edits(&self) -> &[AppliedEdit] {
        &self.context_management.applied_edits
    }
}
