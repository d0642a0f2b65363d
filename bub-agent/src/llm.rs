//! Provider-agnostic conversation messages
//!
//! Everything inside the runtime speaks one message shape, regardless of
//! which model provider sits behind the boundary:
//!
//! ```json
//! {"role": "user" | "system" | "assistant" | "tool",
//!  "content": "...",
//!  "tool_calls": [...],      // assistant messages proposing calls
//!  "tool_call_id": "...",    // tool messages answering a call
//!  "name": "..."}            // tool messages: the function name
//! ```
//!
//! Tape entries store this shape verbatim; provider adapters convert at the
//! API boundary only.

use serde::{Deserialize, Serialize};

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions
    System,
    /// User input
    User,
    /// Model output (text or proposed tool calls)
    Assistant,
    /// Tool result answering a call
    Tool,
}

/// The function half of a tool call descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallFunction {
    /// Tool name to invoke
    pub name: String,
    /// JSON-encoded arguments string, as providers emit it
    pub arguments: String,
}

/// One tool call proposed by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call id; pairs the call with its result
    pub id: String,
    /// Call type; always `"function"` today
    #[serde(rename = "type")]
    pub kind: String,
    /// The function to invoke
    pub function: ToolCallFunction,
}

impl ToolCall {
    /// Build a function call descriptor
    pub fn function(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: "function".to_string(),
            function: ToolCallFunction {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// One provider-agnostic conversation message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardMessage {
    /// Message role
    pub role: Role,
    /// Text content; empty for assistant messages that only carry calls
    #[serde(default)]
    pub content: String,
    /// Tool calls proposed by an assistant message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Call id this tool message answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Function name, on tool messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl StandardMessage {
    /// System message
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    /// User message
    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    /// Assistant text message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// Assistant message carrying tool calls and no text
    pub fn assistant_tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            tool_calls: Some(calls),
            tool_call_id: None,
            name: None,
        }
    }

    /// Tool message answering a call
    pub fn tool(
        content: impl Into<String>,
        tool_call_id: impl Into<String>,
        name: Option<String>,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
            name,
        }
    }

    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        assert_eq!(serde_json::to_string(&Role::Tool).unwrap(), "\"tool\"");
    }

    #[test]
    fn test_plain_message_wire_shape() {
        let msg = StandardMessage::user("hello");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["role"], "user");
        assert_eq!(value["content"], "hello");
        assert!(value.get("tool_calls").is_none());
        assert!(value.get("tool_call_id").is_none());
    }

    #[test]
    fn test_tool_call_wire_shape() {
        let call = ToolCall::function("c1", "add", r#"{"a":3,"b":4}"#);
        let value = serde_json::to_value(&call).unwrap();
        assert_eq!(value["id"], "c1");
        assert_eq!(value["type"], "function");
        assert_eq!(value["function"]["name"], "add");
    }

    #[test]
    fn test_round_trip() {
        let msg = StandardMessage::assistant_tool_calls(vec![ToolCall::function(
            "c1",
            "add",
            "{}",
        )]);
        let encoded = serde_json::to_string(&msg).unwrap();
        let decoded: StandardMessage = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_tool_message_carries_pairing() {
        let msg = StandardMessage::tool("7", "c1", Some("add".to_string()));
        assert_eq!(msg.tool_call_id.as_deref(), Some("c1"));
        assert_eq!(msg.name.as_deref(), Some("add"));
        assert_eq!(msg.content, "7");
    }
}
