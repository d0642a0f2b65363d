//! Model-turn loop
//!
//! One user prompt becomes a bounded sequence of model turns. Each
//! iteration reconstructs the conversation from the tape, invokes the
//! provider, and appends what came back: text ends the turn, tool calls
//! are executed (concurrently, order-preserving) and their results appended
//! before the loop continues.
//!
//! Ordering guarantee: within one run, entries are appended strictly as
//! `user, (tool_call, tool_result)*, assistant`, and every `tool_result`
//! array parallels its `tool_call` array index for index.
//!
//! Cancellation is cooperative and observed at suspension points; a
//! cancelled run leaves the tape consistent (the next projection pairs any
//! unanswered calls with orphan placeholders).

use crate::error::AgentError;
use crate::llm::StandardMessage;
use crate::model::{ModelOutcome, ModelProvider};
use crate::tape::TapeService;
use crate::tools::ToolRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default bound on model turns per input
pub const DEFAULT_MAX_STEPS: u32 = 20;

/// Default model invocation deadline
pub const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(90);

/// Outcome of one model-turn loop
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModelTurnResult {
    /// Final assistant text, empty when the loop errored
    pub visible_text: String,
    /// The model asked to end the session
    pub exit_requested: bool,
    /// Model turns consumed
    pub steps: u32,
    /// Stable error tag, if the loop failed
    pub error: Option<String>,
    /// Follow-up input the loop wants scheduled
    pub trigger_next: Option<String>,
    /// Command lines detected in the assistant output
    pub command_followups: Vec<String>,
}

impl ModelTurnResult {
    fn text(visible_text: String, steps: u32) -> Self {
        Self {
            visible_text,
            steps,
            ..Self::default()
        }
    }

    fn failure(tag: String, steps: u32) -> Self {
        Self {
            steps,
            error: Some(tag),
            ..Self::default()
        }
    }
}

/// Runs the model-turn loop for one session
pub struct ModelRunner {
    provider: Arc<dyn ModelProvider>,
    tools: Arc<ToolRegistry>,
    tape: TapeService,
    max_steps: u32,
    model_timeout: Duration,
    system_prompt: String,
    cancel: CancellationToken,
}

impl ModelRunner {
    /// Create a runner bound to one session's tape
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        tools: Arc<ToolRegistry>,
        tape: TapeService,
        max_steps: u32,
        model_timeout: Duration,
        system_prompt: String,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            provider,
            tools,
            tape,
            max_steps: max_steps.max(1),
            model_timeout,
            system_prompt,
            cancel,
        }
    }

    /// Run the loop for one user prompt
    #[tracing::instrument(skip(self, prompt), fields(tape_id = %self.tape.tape_id()))]
    pub async fn run(&self, prompt: &str) -> ModelTurnResult {
        if let Err(e) = self.tape.append_message(&StandardMessage::user(prompt)) {
            return ModelTurnResult::failure(e.tag(), 0);
        }

        let schemas = self.tools.schemas();

        for step in 1..=self.max_steps {
            if self.cancel.is_cancelled() {
                return ModelTurnResult::failure(AgentError::Cancelled.tag(), step - 1);
            }

            let mut messages = Vec::new();
            if !self.system_prompt.is_empty() {
                messages.push(StandardMessage::system(self.system_prompt.clone()));
            }
            match self.tape.project_messages() {
                Ok(projected) => messages.extend(projected),
                Err(e) => return ModelTurnResult::failure(e.tag(), step - 1),
            }

            let invocation =
                tokio::time::timeout(self.model_timeout, self.provider.run_tools(&messages, &schemas));
            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => {
                    return ModelTurnResult::failure(AgentError::Cancelled.tag(), step - 1);
                }
                outcome = invocation => outcome,
            };

            let outcome = match outcome {
                Err(_elapsed) => {
                    let tag = AgentError::Timeout("model".to_string()).tag();
                    let _ = self
                        .tape
                        .append_event("loop.timeout", serde_json::json!({"stage": "model"}));
                    tracing::warn!(step, "model invocation timed out");
                    return ModelTurnResult::failure(tag, step);
                }
                Ok(Err(e)) => {
                    tracing::warn!(step, error = %e, "model invocation failed");
                    return ModelTurnResult::failure(e.tag(), step);
                }
                Ok(Ok(outcome)) => outcome,
            };

            match outcome {
                ModelOutcome::Text(text) => {
                    if let Err(e) = self.tape.append_message(&StandardMessage::assistant(&text))
                    {
                        return ModelTurnResult::failure(e.tag(), step);
                    }
                    tracing::debug!(step, "model produced text");
                    return ModelTurnResult::text(text, step);
                }
                ModelOutcome::ToolCalls(calls) => {
                    if calls.is_empty() {
                        tracing::debug!(step, "empty tool call batch, continuing");
                        continue;
                    }
                    if let Err(e) = self.tape.append_tool_call(&calls) {
                        return ModelTurnResult::failure(e.tag(), step);
                    }
                    tracing::debug!(step, calls = calls.len(), "executing tool calls");
                    let results = self.tools.execute_calls(&calls).await;
                    if let Err(e) = self.tape.append_tool_result(results) {
                        return ModelTurnResult::failure(e.tag(), step);
                    }
                }
            }
        }

        // No further appends after exhaustion.
        tracing::warn!(max_steps = self.max_steps, "model loop exhausted");
        ModelTurnResult::failure(AgentError::MaxStepsExceeded.tag(), self.max_steps)
    }
}
