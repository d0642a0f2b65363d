//! Per-session agent loop
//!
//! `handle_input` is the single entry point for one piece of user input:
//! route it, short-circuit commands and exits, otherwise run the model-turn
//! loop and record a `loop.result` event with the outcome.

use crate::runtime::model_loop::{ModelRunner, ModelTurnResult};
use crate::runtime::router::InputRouter;
use crate::tape::TapeService;

/// Outcome of one `handle_input`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoopResult {
    /// Command output or routing feedback, shown before any model output
    pub immediate_output: String,
    /// Final assistant text
    pub assistant_output: String,
    /// The session should end
    pub exit_requested: bool,
    /// Model turns consumed
    pub steps: u32,
    /// Stable error tag, if the turn failed
    pub error: Option<String>,
    /// Follow-up input the loop wants scheduled
    pub trigger_next: Option<String>,
}

/// Deterministic single-session loop over an append-only tape
pub struct AgentLoop {
    router: InputRouter,
    runner: ModelRunner,
    tape: TapeService,
    session_id: String,
}

impl AgentLoop {
    /// Assemble the loop for one session
    pub fn new(
        router: InputRouter,
        runner: ModelRunner,
        tape: TapeService,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            router,
            runner,
            tape,
            session_id: session_id.into(),
        }
    }

    /// The session this loop serves
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Process one piece of user input
    pub async fn handle_input(&self, raw: &str) -> LoopResult {
        tracing::info!(
            session_id = %self.session_id,
            raw = %truncate(raw, 100),
            "loop input"
        );
        let route = self.router.route_user(raw).await;
        tracing::debug!(
            session_id = %self.session_id,
            enter_model = route.enter_model,
            exit_requested = route.exit_requested,
            "loop route"
        );

        if route.exit_requested {
            return LoopResult {
                immediate_output: route.immediate_output,
                exit_requested: true,
                ..LoopResult::default()
            };
        }

        if !route.enter_model {
            return LoopResult {
                immediate_output: route.immediate_output,
                ..LoopResult::default()
            };
        }

        let result = self.runner.run(&route.model_prompt).await;
        self.record_result(&result);
        tracing::debug!(
            session_id = %self.session_id,
            steps = result.steps,
            error = result.error.as_deref().unwrap_or("-"),
            "loop complete"
        );

        LoopResult {
            immediate_output: route.immediate_output,
            assistant_output: result.visible_text,
            exit_requested: result.exit_requested,
            steps: result.steps,
            error: result.error,
            trigger_next: result.trigger_next,
        }
    }

    fn record_result(&self, result: &ModelTurnResult) {
        let appended = self.tape.append_event(
            "loop.result",
            serde_json::json!({
                "steps": result.steps,
                "followups": result.command_followups,
                "exit_requested": result.exit_requested,
                "error": result.error,
                "trigger_next": result.trigger_next,
            }),
        );
        if let Err(e) = appended {
            tracing::warn!(session_id = %self.session_id, error = %e, "failed to record loop result");
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
