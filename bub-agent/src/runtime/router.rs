//! Input router
//!
//! First stop for every piece of user input. Empty input is dropped, a
//! leading `,` dispatches an in-process command, anything else goes to the
//! model as a user message. Command handlers are the only path that mutates
//! session state without traversing the model.

use crate::error::AgentResult;
use crate::tape::TapeService;
use crate::tools::ToolRegistry;
use std::sync::Arc;

/// Command prefix for in-process commands
pub const COMMAND_PREFIX: char = ',';

/// Routing decision for one piece of raw input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRouteResult {
    /// Deliver `model_prompt` to the model
    pub enter_model: bool,
    /// The prompt to deliver when `enter_model` is set
    pub model_prompt: String,
    /// Output to show immediately (command results, errors)
    pub immediate_output: String,
    /// The user asked to leave the session
    pub exit_requested: bool,
}

impl UserRouteResult {
    fn nothing() -> Self {
        Self {
            enter_model: false,
            model_prompt: String::new(),
            immediate_output: String::new(),
            exit_requested: false,
        }
    }

    fn command(output: String, exit_requested: bool) -> Self {
        Self {
            enter_model: false,
            model_prompt: String::new(),
            immediate_output: output,
            exit_requested,
        }
    }

    fn model(prompt: String) -> Self {
        Self {
            enter_model: true,
            model_prompt: prompt,
            immediate_output: String::new(),
            exit_requested: false,
        }
    }
}

/// What the built-in commands operate on
#[derive(Clone)]
pub struct CommandContext {
    /// The session's tape
    pub tape: TapeService,
    /// The session's tools
    pub tools: Arc<ToolRegistry>,
}

/// Routes raw input to commands or the model
pub struct InputRouter {
    ctx: CommandContext,
}

impl InputRouter {
    /// Create a router over a session's context
    pub fn new(ctx: CommandContext) -> Self {
        Self { ctx }
    }

    /// Route one piece of raw user input
    pub async fn route_user(&self, raw: &str) -> UserRouteResult {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return UserRouteResult::nothing();
        }

        if let Some(rest) = trimmed.strip_prefix(COMMAND_PREFIX) {
            let mut parts = rest.trim().splitn(2, char::is_whitespace);
            let name = parts.next().unwrap_or_default();
            let args = parts.next().unwrap_or_default().trim();
            return self.run_command(name, args).await;
        }

        UserRouteResult::model(trimmed.to_string())
    }

    async fn run_command(&self, name: &str, args: &str) -> UserRouteResult {
        tracing::debug!(command = %name, "routing command");
        match name {
            "help" => UserRouteResult::command(self.help_text(), false),
            "tools" => UserRouteResult::command(self.tools_text(), false),
            "tape" => UserRouteResult::command(self.tape_text(), false),
            "search" => UserRouteResult::command(self.search_text(args), false),
            "reset" => match self.reset() {
                Ok(()) => UserRouteResult::command("context reset".to_string(), false),
                Err(e) => UserRouteResult::command(format!("reset failed: {}", e.tag()), false),
            },
            "quit" | "exit" => UserRouteResult::command("bye".to_string(), true),
            "" => UserRouteResult::command(
                "empty command (try ,help)".to_string(),
                false,
            ),
            other => UserRouteResult::command(
                format!("unknown command: {} (try ,help)", other),
                false,
            ),
        }
    }

    fn help_text(&self) -> String {
        [
            ",help            show this help",
            ",tools           list available tools",
            ",tape            show tape info",
            ",search <query>  search tape messages",
            ",reset           reset session context",
            ",quit            exit the session",
        ]
        .join("\n")
    }

    fn tools_text(&self) -> String {
        let schemas = self.ctx.tools.schemas();
        if schemas.is_empty() {
            return "no tools registered".to_string();
        }
        schemas
            .iter()
            .map(|s| format!("{}  {}", s.name, s.description))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn tape_text(&self) -> String {
        match self.ctx.tape.info() {
            Ok(info) => format!(
                "tape:{} entries:{} anchors:{} last:{}",
                self.ctx.tape.tape_id(),
                info.entries,
                info.anchors,
                info.last_anchor.as_deref().unwrap_or("-"),
            ),
            Err(e) => format!("tape info failed: {}", e.tag()),
        }
    }

    fn search_text(&self, query: &str) -> String {
        if query.is_empty() {
            return "usage: ,search <query>".to_string();
        }
        match self.ctx.tape.search(query, 5) {
            Ok(matches) if matches.is_empty() => "no matches".to_string(),
            Ok(matches) => matches
                .iter()
                .map(|entry| {
                    let content = entry
                        .payload
                        .get("content")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default();
                    format!("#{} {}", entry.id, content)
                })
                .collect::<Vec<_>>()
                .join("\n"),
            Err(e) => format!("search failed: {}", e.tag()),
        }
    }

    fn reset(&self) -> AgentResult<()> {
        self.ctx.tape.reset()
    }
}
