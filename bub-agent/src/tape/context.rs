//! Context reconstruction
//!
//! Deterministic projection of a tape slice to the provider-agnostic
//! message list handed to the model. The projection is idempotent: running
//! it over the serialized output of a previous projection changes nothing.
//!
//! Pairing rules:
//!
//! 1. `message` entries contribute one standard message each, as stored.
//! 2. A `tool_call` entry contributes one assistant message with empty
//!    content and the calls array, and its calls become *pending* for the
//!    next `tool_result` entry.
//! 3. A `tool_result` entry emits one `tool` message per result, paired by
//!    index with the pending calls. A pending call with a missing id yields
//!    `orphan_call_<i>`; a result with no pending call at its index yields
//!    `orphan_result_<i>`. String results pass through; other values are
//!    JSON-encoded. The pending calls are consumed either way.
//! 4. `anchor` and `event` entries are skipped; they stay on the log only.
//!
//! Truncated histories (a `tool_call` whose `tool_result` never arrived,
//! e.g. after a cancellation) project without error; the orphan ids keep
//! downstream providers accepting the conversation.

use crate::llm::{StandardMessage, ToolCall};
use crate::tape::types::{EntryKind, TapeEntry};

/// Project tape entries to standard messages
pub fn project(entries: &[TapeEntry]) -> Vec<StandardMessage> {
    let mut messages: Vec<StandardMessage> = Vec::new();
    let mut pending_calls: Vec<ToolCall> = Vec::new();

    for entry in entries {
        match entry.kind {
            EntryKind::Message => {
                if let Ok(message) =
                    serde_json::from_value::<StandardMessage>(entry.payload.clone())
                {
                    messages.push(message);
                }
            }
            EntryKind::ToolCall => {
                let calls = normalize_calls(entry.payload.get("calls"));
                if !calls.is_empty() {
                    messages.push(StandardMessage::assistant_tool_calls(calls.clone()));
                }
                pending_calls = calls;
            }
            EntryKind::ToolResult => {
                if let Some(results) = entry.payload.get("results").and_then(|v| v.as_array()) {
                    for (index, result) in results.iter().enumerate() {
                        messages.push(tool_result_message(result, &pending_calls, index));
                    }
                }
                pending_calls = Vec::new();
            }
            EntryKind::Anchor | EntryKind::Event => {}
        }
    }

    messages
}

fn normalize_calls(value: Option<&serde_json::Value>) -> Vec<ToolCall> {
    let Some(items) = value.and_then(|v| v.as_array()) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| serde_json::from_value::<ToolCall>(item.clone()).ok())
        .collect()
}

fn tool_result_message(
    result: &serde_json::Value,
    pending_calls: &[ToolCall],
    index: usize,
) -> StandardMessage {
    let content = render_result(result);

    match pending_calls.get(index) {
        Some(call) => {
            let call_id = if call.id.is_empty() {
                format!("orphan_call_{}", index)
            } else {
                call.id.clone()
            };
            let name = if call.function.name.is_empty() {
                None
            } else {
                Some(call.function.name.clone())
            };
            StandardMessage::tool(content, call_id, name)
        }
        // No matching call; keep the result with a placeholder id so
        // providers accept the conversation.
        None => StandardMessage::tool(content, format!("orphan_result_{}", index), None),
    }
}

fn render_result(result: &serde_json::Value) -> String {
    match result {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
