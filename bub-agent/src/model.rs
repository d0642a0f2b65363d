//! Model provider boundary
//!
//! The runtime sees the language model as one capability: hand it the
//! reconstructed conversation plus the tool schemas, get back either text
//! or a batch of tool calls. Everything provider-specific (HTTP, auth,
//! message format adaptation) lives behind [`ModelProvider`].
//!
//! Two built-in providers exist for development and tests:
//! [`ScriptedModel`] replays a queued script of outcomes, and [`EchoModel`]
//! reflects the last user message back as text.

use crate::error::{AgentError, AgentResult};
use crate::llm::{Role, StandardMessage, ToolCall};
use crate::tools::ToolSchema;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// One model turn: either final text or a batch of tool calls
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutcome {
    /// The model produced visible text; the turn is over
    Text(String),
    /// The model wants these tools executed before continuing
    ToolCalls(Vec<ToolCall>),
}

/// The single capability the runtime requires of a model
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &str;

    /// Run one model turn over the conversation
    async fn run_tools(
        &self,
        messages: &[StandardMessage],
        tools: &[ToolSchema],
    ) -> AgentResult<ModelOutcome>;
}

/// Scripted provider replaying queued outcomes, for tests and dry runs
///
/// # Examples
///
/// ```rust
/// use bub_agent::model::ScriptedModel;
/// use bub_agent::llm::ToolCall;
///
/// let model = ScriptedModel::new();
/// model.push_tool_call(ToolCall::function("c1", "add", r#"{"a":3,"b":4}"#));
/// model.push_text("7");
/// ```
#[derive(Default)]
pub struct ScriptedModel {
    script: Mutex<VecDeque<ModelOutcome>>,
}

impl ScriptedModel {
    /// Create a provider with an empty script
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a text outcome
    pub fn push_text(&self, text: impl Into<String>) {
        self.push(ModelOutcome::Text(text.into()));
    }

    /// Queue a single tool call outcome
    pub fn push_tool_call(&self, call: ToolCall) {
        self.push(ModelOutcome::ToolCalls(vec![call]));
    }

    /// Queue a multi-call outcome
    pub fn push_tool_calls(&self, calls: Vec<ToolCall>) {
        self.push(ModelOutcome::ToolCalls(calls));
    }

    fn push(&self, outcome: ModelOutcome) {
        self.lock_script().push_back(outcome);
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, VecDeque<ModelOutcome>> {
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ModelProvider for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn run_tools(
        &self,
        _messages: &[StandardMessage],
        _tools: &[ToolSchema],
    ) -> AgentResult<ModelOutcome> {
        self.lock_script()
            .pop_front()
            .ok_or_else(|| AgentError::Model("script exhausted".to_string()))
    }
}

/// Provider that echoes the last user message, for offline interactive runs
#[derive(Default)]
pub struct EchoModel;

impl EchoModel {
    /// Create the echo provider
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ModelProvider for EchoModel {
    fn name(&self) -> &str {
        "echo"
    }

    async fn run_tools(
        &self,
        messages: &[StandardMessage],
        _tools: &[ToolSchema],
    ) -> AgentResult<ModelOutcome> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Ok(ModelOutcome::Text(last_user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_model_replays_in_order() {
        let model = ScriptedModel::new();
        model.push_tool_call(ToolCall::function("c1", "add", "{}"));
        model.push_text("7");

        let first = model.run_tools(&[], &[]).await.unwrap();
        assert!(matches!(first, ModelOutcome::ToolCalls(_)));
        let second = model.run_tools(&[], &[]).await.unwrap();
        assert_eq!(second, ModelOutcome::Text("7".to_string()));
    }

    #[tokio::test]
    async fn test_scripted_model_exhaustion_is_error() {
        let model = ScriptedModel::new();
        let result = model.run_tools(&[], &[]).await;
        assert!(matches!(result, Err(AgentError::Model(_))));
    }

    #[tokio::test]
    async fn test_echo_model_reflects_last_user_message() {
        let model = EchoModel::new();
        let messages = vec![
            StandardMessage::system("be brief"),
            StandardMessage::user("first"),
            StandardMessage::assistant("ok"),
            StandardMessage::user("second"),
        ];
        let outcome = model.run_tools(&messages, &[]).await.unwrap();
        assert_eq!(outcome, ModelOutcome::Text("second".to_string()));
    }
}
