//! Session worker
//!
//! One session owns one tape and one worker task. Inputs go through a
//! bounded queue and the worker processes them one at a time, which gives
//! the two ordering guarantees the tape relies on: inputs for a session are
//! handled in arrival order, and the entries of one `handle_input` land on
//! the tape contiguously, never interleaved with another input's entries.
//!
//! Cancellation is cooperative: the session's token is shared with its
//! model runner, so an in-flight turn ends at its next suspension point and
//! the worker stops picking up queued inputs.

use crate::error::{AgentError, AgentResult};
use crate::runtime::agent_loop::{AgentLoop, LoopResult};
use crate::tape::TapeService;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;

/// Bound on queued inputs per session
pub const SESSION_QUEUE_CAPACITY: usize = 32;

struct InputJob {
    raw: String,
    reply: oneshot::Sender<LoopResult>,
}

/// One live session: tape, loop, input queue, worker
pub struct Session {
    id: String,
    tape: TapeService,
    input_tx: mpsc::Sender<InputJob>,
    cancel: CancellationToken,
    worker: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Session {
    /// Spawn the worker for a session
    pub fn spawn(
        id: impl Into<String>,
        agent_loop: AgentLoop,
        tape: TapeService,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        let id = id.into();
        let (input_tx, mut input_rx) = mpsc::channel::<InputJob>(SESSION_QUEUE_CAPACITY);

        let worker_cancel = cancel.clone();
        let worker_id = id.clone();
        let worker = tokio::spawn(async move {
            loop {
                if worker_cancel.is_cancelled() {
                    break;
                }
                let job = tokio::select! {
                    _ = worker_cancel.cancelled() => break,
                    job = input_rx.recv() => job,
                };
                let Some(job) = job else { break };
                let result = agent_loop.handle_input(&job.raw).await;
                let _ = job.reply.send(result);
            }
            tracing::debug!(session_id = %worker_id, "session worker stopped");
        });

        Arc::new(Self {
            id,
            tape,
            input_tx,
            cancel,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// The session id (`"<channel>:<chat>"`)
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The session's tape
    pub fn tape(&self) -> &TapeService {
        &self.tape
    }

    /// Enqueue one input; the returned channel yields its result
    ///
    /// Enqueueing completes before this returns, so calling `submit` twice
    /// in sequence guarantees the first input is handled first.
    pub async fn submit(&self, raw: String) -> AgentResult<oneshot::Receiver<LoopResult>> {
        let (reply, rx) = oneshot::channel();
        self.input_tx
            .send(InputJob { raw, reply })
            .await
            .map_err(|_| AgentError::Cancelled)?;
        Ok(rx)
    }

    /// Enqueue one input and wait for its result
    pub async fn handle_input(&self, raw: &str) -> AgentResult<LoopResult> {
        let rx = self.submit(raw.to_string()).await?;
        rx.await.map_err(|_| AgentError::Cancelled)
    }

    /// Reset the session's context through the command path
    ///
    /// Routing `,reset` through the queue keeps the reset serialized with
    /// in-flight inputs.
    pub async fn reset_context(&self) -> AgentResult<()> {
        let result = self.handle_input(",reset").await?;
        if result.immediate_output.contains("failed") {
            return Err(AgentError::InvalidArgument(result.immediate_output));
        }
        Ok(())
    }

    /// Cancel in-flight work and stop the worker, waiting up to `grace`
    pub async fn shutdown(&self, grace: Duration) {
        self.cancel.cancel();
        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            if tokio::time::timeout(grace, handle).await.is_err() {
                tracing::warn!(session_id = %self.id, "session worker did not stop within grace");
            }
        }
    }
}
