//! Local topic handler registry
//!
//! Handlers are keyed by subscription pattern, not by exact topic: one
//! incoming `deliverMessage` may match several registered patterns, and
//! every matching handler fires. Dispatch order is registration order, which
//! is why the registry is an ordered vector rather than a map.

use bub_core::{Result, TopicPattern};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Handler invoked with the delivered topic and payload
pub type TopicHandlerFn = Arc<
    dyn Fn(String, serde_json::Value) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync,
>;

struct HandlerEntry {
    pattern: TopicPattern,
    raw: String,
    handler: TopicHandlerFn,
}

/// Ordered registry of `(pattern, handler)` pairs
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    entries: Arc<Mutex<Vec<HandlerEntry>>>,
}

impl HandlerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under a pattern
    ///
    /// Fails when the pattern does not parse. Registering the same pattern
    /// twice keeps both handlers; each fires on matching deliveries.
    pub async fn register<F, Fut>(&self, pattern: &str, handler: F) -> Result<()>
    where
        F: Fn(String, serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let parsed = TopicPattern::parse(pattern)
            .map_err(|e| bub_core::Error::InvalidPattern(format!("{}: {}", pattern, e)))?;
        let handler: TopicHandlerFn =
            Arc::new(move |topic, payload| Box::pin(handler(topic, payload)));
        self.entries.lock().await.push(HandlerEntry {
            pattern: parsed,
            raw: pattern.to_string(),
            handler,
        });
        Ok(())
    }

    /// Remove the first handler registered under a pattern
    pub async fn unregister(&self, pattern: &str) -> bool {
        let mut entries = self.entries.lock().await;
        if let Some(pos) = entries.iter().position(|e| e.raw == pattern) {
            entries.remove(pos);
            true
        } else {
            false
        }
    }

    /// Invoke every handler whose pattern matches `topic`, in registration
    /// order
    pub async fn dispatch(&self, topic: &str, payload: serde_json::Value) {
        let matching: Vec<TopicHandlerFn> = {
            let entries = self.entries.lock().await;
            entries
                .iter()
                .filter(|e| e.pattern.matches(topic))
                .map(|e| Arc::clone(&e.handler))
                .collect()
        };
        if matching.is_empty() {
            tracing::debug!(topic = %topic, "delivery matched no local handlers");
            return;
        }
        for handler in matching {
            handler(topic.to_string(), payload.clone()).await;
        }
    }

    /// True when a handler is registered under `pattern`
    pub async fn has_handler(&self, pattern: &str) -> bool {
        self.entries.lock().await.iter().any(|e| e.raw == pattern)
    }

    /// All registered patterns, in registration order
    pub async fn patterns(&self) -> Vec<String> {
        self.entries
            .lock()
            .await
            .iter()
            .map(|e| e.raw.clone())
            .collect()
    }
}
