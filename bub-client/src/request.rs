//! Request/response correlation
//!
//! Every outbound request gets a monotonically increasing integer id and a
//! dedicated oneshot channel. When the matching response arrives on the
//! receive loop, the channel completes; when the connection is lost, every
//! pending request fails at once. Timed-out requests are abandoned so their
//! map entries do not accumulate.

use bub_core::{Error, Id, JsonRpcResponse, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};

/// Tracks requests awaiting responses
#[derive(Clone)]
pub struct RequestManager {
    pending: Arc<Mutex<HashMap<String, oneshot::Sender<Result<JsonRpcResponse>>>>>,
    counter: Arc<Mutex<u64>>,
}

impl RequestManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            counter: Arc::new(Mutex::new(0)),
        }
    }

    /// Next request id; strictly increasing integers
    pub async fn next_id(&self) -> Id {
        let mut counter = self.counter.lock().await;
        *counter += 1;
        Id::Number(*counter as i64)
    }

    /// Register a pending request, returning the channel its response
    /// arrives on
    pub async fn register(&self, id: Id) -> oneshot::Receiver<Result<JsonRpcResponse>> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id_key(&id), tx);
        rx
    }

    /// Complete a pending request with its response
    pub async fn complete(&self, id: &Id, response: JsonRpcResponse) {
        if let Some(tx) = self.pending.lock().await.remove(&id_key(id)) {
            let _ = tx.send(Ok(response));
        }
    }

    /// Drop a pending request without completing it (request timed out)
    pub async fn abandon(&self, id: &Id) {
        self.pending.lock().await.remove(&id_key(id));
    }

    /// Fail every pending request with the same error
    pub async fn fail_all(&self, error: Error) {
        let mut pending = self.pending.lock().await;
        for (_, tx) in pending.drain() {
            let _ = tx.send(Err(error.clone()));
        }
    }

    /// Number of requests currently awaiting responses
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

impl Default for RequestManager {
    fn default() -> Self {
        Self::new()
    }
}

fn id_key(id: &Id) -> String {
    match id {
        Id::String(s) => s.clone(),
        Id::Number(n) => n.to_string(),
        Id::Null => "null".to_string(),
    }
}
