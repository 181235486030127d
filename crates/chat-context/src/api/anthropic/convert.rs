//! Conversion between [`Message`] windows and Anthropic wire shape.
//!
//! Both directions are total. Tool call ids survive the round trip
//! unchanged, and tool result names (which the wire format does not carry)
//! are restored from the matching `tool_use` block. User text that happens
//! to start with [`SYSTEM_MARKER`] is escaped so it can never come back as a
//! system message.

use super::types::{SystemBlock, WireBlock, WireContent, WireConversation, WireMessage, WireRole};
use crate::{Content, ContentPart, Message, MessageRole};
use serde_json::Value;
use std::collections::HashMap;

/// Prefix marking a system message that had to travel as user text.
pub const SYSTEM_MARKER: &str = "[system] ";

/// Prepended to user text that would otherwise read as marked or escaped.
const ESCAPE: char = '\\';

fn escape_user_text(text: &str) -> String {
    if text.starts_with(SYSTEM_MARKER) || text.starts_with(ESCAPE) {
        format!("{ESCAPE}{text}")
    } else {
        text.to_string()
    }
}

fn user_text_from_wire(text: String) -> Message {
    if let Some(rest) = text.strip_prefix(ESCAPE) {
        Message::user(rest)
    } else if let Some(rest) = text.strip_prefix(SYSTEM_MARKER) {
        Message::system(rest)
    } else {
        Message::user(text)
    }
}

/// Convert a window to provider shape.
///
/// Leading system messages become `system` blocks. A system message after
/// the first turn becomes a user string prefixed with [`SYSTEM_MARKER`].
/// Tool messages become user messages of `tool_result` blocks.
pub fn to_wire(messages: &[Message]) -> WireConversation {
    let mut conversation = WireConversation::default();
    let mut leading = true;

    for msg in messages {
        if msg.role != MessageRole::System {
            leading = false;
        }
        match msg.role {
            MessageRole::System if leading => {
                conversation
                    .system
                    .push(SystemBlock::text(msg.text_content()));
            }
            MessageRole::System => {
                conversation.messages.push(WireMessage::user_text(format!(
                    "{SYSTEM_MARKER}{}",
                    msg.text_content()
                )));
            }
            MessageRole::User | MessageRole::Tool => {
                let content = match content_to_wire(&msg.content) {
                    WireContent::Text(text) => WireContent::Text(escape_user_text(&text)),
                    blocks => blocks,
                };
                conversation.messages.push(WireMessage {
                    role: WireRole::User,
                    content,
                });
            }
            MessageRole::Assistant => conversation.messages.push(WireMessage {
                role: WireRole::Assistant,
                content: content_to_wire(&msg.content),
            }),
        }
    }
    conversation
}

fn content_to_wire(content: &Content) -> WireContent {
    match content {
        Content::Text(text) => WireContent::Text(text.clone()),
        Content::Parts(parts) => WireContent::Blocks(parts.iter().map(part_to_wire).collect()),
        // Content that is already provider-native passes through as blocks.
        Content::Other(value) => serde_json::from_value::<Vec<WireBlock>>(value.clone())
            .map(WireContent::Blocks)
            .unwrap_or_else(|_| WireContent::Text(value.to_string())),
    }
}

fn part_to_wire(part: &ContentPart) -> WireBlock {
    match part {
        ContentPart::Text { text } => WireBlock::Text { text: text.clone() },
        ContentPart::Reasoning { text } => WireBlock::Thinking {
            thinking: text.clone(),
            signature: None,
        },
        ContentPart::ToolCall {
            id,
            name,
            arguments,
        } => WireBlock::ToolUse {
            id: id.clone(),
            name: name.clone(),
            input: arguments.clone(),
        },
        ContentPart::ToolResult { id, output, .. } => WireBlock::ToolResult {
            tool_use_id: id.clone(),
            content: result_content(output),
            is_error: None,
        },
    }
}

/// `tool_result` content must be a string or a list of blocks.
fn result_content(output: &Value) -> Value {
    match output {
        Value::String(_) | Value::Array(_) => output.clone(),
        Value::Null => Value::String(String::new()),
        other => Value::String(other.to_string()),
    }
}

/// Convert a provider-shape window back to messages.
pub fn from_wire(conversation: WireConversation) -> Vec<Message> {
    let names: HashMap<String, String> = conversation
        .messages
        .iter()
        .flat_map(|m| match &m.content {
            WireContent::Blocks(blocks) => blocks.as_slice(),
            WireContent::Text(_) => &[],
        })
        .filter_map(|b| match b {
            WireBlock::ToolUse { id, name, .. } => Some((id.clone(), name.clone())),
            _ => None,
        })
        .collect();

    let mut messages: Vec<Message> = conversation
        .system
        .iter()
        .map(|block| Message::system(block.as_text()))
        .collect();

    for wire in conversation.messages {
        let msg = match (wire.role, wire.content) {
            (WireRole::Assistant, content) => {
                Message::new(MessageRole::Assistant, content_from_wire(content, &names))
            }
            (WireRole::User, WireContent::Text(text)) => user_text_from_wire(text),
            (WireRole::User, WireContent::Blocks(blocks)) => {
                let role = if !blocks.is_empty()
                    && blocks
                        .iter()
                        .all(|b| matches!(b, WireBlock::ToolResult { .. }))
                {
                    MessageRole::Tool
                } else {
                    MessageRole::User
                };
                Message::new(role, content_from_wire(WireContent::Blocks(blocks), &names))
            }
        };
        messages.push(msg);
    }
    messages
}

/// Put back roles the wire format cannot express, such as a tool message
/// with plain text content.
///
/// Edits clear content in place, so when the edited window has as many
/// messages as `original` each message keeps the role it was sent with.
/// Otherwise the window is left as converted.
pub fn restore_roles(edited: &mut [Message], original: &[Message]) {
    if edited.len() != original.len() {
        return;
    }
    for (msg, sent) in edited.iter_mut().zip(original) {
        msg.role = sent.role;
    }
}

fn content_from_wire(content: WireContent, names: &HashMap<String, String>) -> Content {
    match content {
        WireContent::Text(text) => Content::Text(text),
        WireContent::Blocks(blocks) => Content::Parts(
            blocks
                .into_iter()
                .map(|b| part_from_wire(b, names))
                .collect(),
        ),
    }
}

fn part_from_wire(block: WireBlock, names: &HashMap<String, String>) -> ContentPart {
    match block {
        WireBlock::Text { text } => ContentPart::Text { text },
        WireBlock::Thinking { thinking, .. } => ContentPart::Reasoning { text: thinking },
        WireBlock::ToolUse { id, name, input } => ContentPart::ToolCall {
            id,
            name,
            arguments: input,
        },
        WireBlock::ToolResult {
            tool_use_id,
            content,
            ..
        } => ContentPart::ToolResult {
            name: names.get(&tool_use_id).cloned().unwrap_or_default(),
            id: tool_use_id,
            output: content,
        },
    }
}
