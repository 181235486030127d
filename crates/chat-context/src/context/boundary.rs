//! Boundary-safe split points.
//!
//! Everything at index `>= cut` is kept verbatim; everything before it is
//! eligible for compaction. A cut must never land between an assistant
//! tool call and the tool message answering it: the next model call would
//! see a result with no call, or a call with no result, and reject the
//! conversation.
//!
//! The search is deliberately local. Only a small window behind the ideal
//! cut is inspected; an orphan further back was already there when the
//! window reached us and is passed through unchanged.

use crate::{Message, MessageRole};
use std::collections::HashSet;

/// Default number of messages inspected behind the ideal cut.
pub const DEFAULT_SEARCH_WINDOW: usize = 3;

/// Find the largest safe cut index `<=` the ideal `len - keep_recent`.
///
/// - `keep_recent >= len` returns `0` (nothing to compact).
/// - `keep_recent == 0` returns `len` (everything is compactable).
/// - If the ideal cut lands on a tool message, the cut moves back to the
///   nearest assistant message with a tool call within `search_window`, so
///   the call and its results stay together on the kept side.
/// - If the ideal cut lands on an assistant tool call followed by its tool
///   message, the cut is already safe and is returned as is.
pub fn find_safe_split_point(
    messages: &[Message],
    keep_recent: usize,
    search_window: usize,
) -> usize {
    let len = messages.len();
    let ideal = len.saturating_sub(keep_recent);
    if ideal == 0 || ideal >= len {
        return ideal;
    }

    let at_ideal = &messages[ideal];
    match at_ideal.role {
        MessageRole::Tool => {
            let floor = ideal.saturating_sub(search_window);
            (floor..ideal)
                .rev()
                .find(|&i| {
                    let m = &messages[i];
                    m.role == MessageRole::Assistant && m.has_tool_call()
                })
                .unwrap_or(ideal)
        }
        // Call and result both start on the kept side.
        MessageRole::Assistant
            if at_ideal.has_tool_call()
                && messages
                    .get(ideal + 1)
                    .is_some_and(|next| next.role == MessageRole::Tool) =>
        {
            ideal
        }
        _ => ideal,
    }
}

/// Keep only the most recent messages, cut at a boundary-safe point.
///
/// The terminal fallback of the compaction chain: no I/O, cannot fail.
pub fn truncate_to_recent(
    messages: &[Message],
    keep_recent: usize,
    search_window: usize,
) -> Vec<Message> {
    let split = find_safe_split_point(messages, keep_recent, search_window);
    messages[split..].to_vec()
}

/// Tool calls with no later tool result carrying the same id.
///
/// This is the single completeness predicate used throughout the crate: a
/// tool invocation is complete iff a `tool-result` part with its id appears
/// after the call. Ids are returned in call order.
pub fn unresolved_tool_calls(messages: &[Message]) -> Vec<String> {
    let mut answered: HashSet<&str> = HashSet::new();
    let mut unresolved = Vec::new();
    for msg in messages.iter().rev() {
        answered.extend(msg.tool_result_ids());
        // Calls scanned in reverse too, so the final reverse restores order.
        let calls: Vec<&str> = msg.tool_call_ids().collect();
        for id in calls.into_iter().rev() {
            if !answered.contains(id) {
                unresolved.push(id.to_string());
            }
        }
    }
    unresolved.reverse();
    unresolved
}

/// Tool results whose call does not appear earlier in the window.
pub fn orphaned_tool_results(messages: &[Message]) -> Vec<String> {
    let mut called: HashSet<&str> = HashSet::new();
    let mut orphans = Vec::new();
    for msg in messages {
        for id in msg.tool_result_ids() {
            if !called.contains(id) {
                orphans.push(id.to_string());
            }
        }
        called.extend(msg.tool_call_ids());
    }
    orphans
}
