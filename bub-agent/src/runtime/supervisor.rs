//! Process-wide session supervisor
//!
//! Owns the session table. Sessions are created lazily on the first input
//! for an unknown session id (the session id doubles as the tape id), and
//! every session shares the supervisor's store, provider, and tool
//! registry. Shutdown cancels all in-flight inputs cooperatively and waits
//! out a grace window before giving up on stragglers.

use crate::config::AgentSettings;
use crate::error::{AgentError, AgentResult};
use crate::model::ModelProvider;
use crate::runtime::agent_loop::{AgentLoop, LoopResult};
use crate::runtime::model_loop::ModelRunner;
use crate::runtime::router::{CommandContext, InputRouter};
use crate::runtime::session::Session;
use crate::tape::{FileTapeStore, TapeService};
use crate::tools::ToolRegistry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Default grace window for shutdown
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Registry of live sessions
pub struct Supervisor {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
    store: Arc<FileTapeStore>,
    provider: Arc<dyn ModelProvider>,
    tools: Arc<ToolRegistry>,
    settings: AgentSettings,
    shutdown: CancellationToken,
}

impl Supervisor {
    /// Create a supervisor over a store, provider, and tool registry
    pub fn new(
        store: Arc<FileTapeStore>,
        provider: Arc<dyn ModelProvider>,
        tools: Arc<ToolRegistry>,
        settings: AgentSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(HashMap::new()),
            store,
            provider,
            tools,
            settings,
            shutdown: CancellationToken::new(),
        })
    }

    /// Get or lazily create the session for `session_id`
    pub async fn session(&self, session_id: &str) -> AgentResult<Arc<Session>> {
        if self.shutdown.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get(session_id) {
            return Ok(Arc::clone(session));
        }

        tracing::info!(session_id = %session_id, "creating session");
        let tape = TapeService::open(Arc::clone(&self.store), session_id)?;
        let cancel = self.shutdown.child_token();

        let router = InputRouter::new(CommandContext {
            tape: tape.clone(),
            tools: Arc::clone(&self.tools),
        });
        let runner = ModelRunner::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.tools),
            tape.clone(),
            self.settings.max_steps,
            self.settings.model_timeout,
            self.settings.system_prompt.clone(),
            cancel.clone(),
        );
        let agent_loop = AgentLoop::new(router, runner, tape.clone(), session_id);
        let session = Session::spawn(session_id, agent_loop, tape, cancel);

        sessions.insert(session_id.to_string(), Arc::clone(&session));
        Ok(session)
    }

    /// Route one input to its session
    pub async fn handle_input(&self, session_id: &str, raw: &str) -> AgentResult<LoopResult> {
        let session = self.session(session_id).await?;
        session.handle_input(raw).await
    }

    /// Reset a session's context back to its bootstrap anchor
    pub async fn reset_session_context(&self, session_id: &str) -> AgentResult<()> {
        let session = self.session(session_id).await?;
        session.reset_context().await
    }

    /// Ids of every live session
    pub async fn session_ids(&self) -> Vec<String> {
        self.sessions.lock().await.keys().cloned().collect()
    }

    /// True once shutdown has started
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Stop accepting input, cancel in-flight turns, and wait up to `grace`
    pub async fn shutdown(&self, grace: Duration) {
        tracing::info!("supervisor shutting down");
        self.shutdown.cancel();
        let sessions: Vec<Arc<Session>> = {
            let mut table = self.sessions.lock().await;
            table.drain().map(|(_, session)| session).collect()
        };
        let waits = sessions.iter().map(|session| session.shutdown(grace));
        futures::future::join_all(waits).await;
        tracing::info!("supervisor stopped");
    }
}
