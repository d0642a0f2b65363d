//! Subscription table
//!
//! Tracks `(connection, pattern)` subscriptions and answers the routing
//! question: which subscriptions match a topic? Patterns are parsed once at
//! subscribe time and matched with [`TopicPattern`] on every publish.
//!
//! Invariants:
//! - subscribe is idempotent per `(connection, pattern)`: re-subscribing
//!   returns the existing subscription id
//! - unsubscribe removes exactly one subscription by `(connection, pattern)`
//! - a connection may hold any number of subscriptions; all of them are
//!   dropped when the connection closes
//!
//! The table is a flat scan over parsed patterns, which stays cheap below a
//! few thousand subscriptions.

use bub_core::TopicPattern;
use std::sync::Arc;
use tokio::sync::Mutex;

/// One registered subscription
#[derive(Debug, Clone)]
pub struct SubscriptionEntry {
    /// Server-assigned subscription id
    pub id: u64,
    /// Owning connection
    pub conn_id: u64,
    /// Parsed pattern
    pub pattern: TopicPattern,
}

#[derive(Default)]
struct TableInner {
    next_id: u64,
    entries: Vec<SubscriptionEntry>,
}

/// Shared subscription table
#[derive(Clone, Default)]
pub struct SubscriptionTable {
    inner: Arc<Mutex<TableInner>>,
}

impl SubscriptionTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscription, returning its id
    ///
    /// Idempotent: an existing `(connection, pattern)` pair keeps its id.
    pub async fn subscribe(&self, conn_id: u64, pattern: TopicPattern) -> u64 {
        let mut inner = self.inner.lock().await;
        if let Some(existing) = inner
            .entries
            .iter()
            .find(|e| e.conn_id == conn_id && e.pattern.as_str() == pattern.as_str())
        {
            return existing.id;
        }
        inner.next_id += 1;
        let id = inner.next_id;
        inner.entries.push(SubscriptionEntry {
            id,
            conn_id,
            pattern,
        });
        id
    }

    /// Remove one subscription by `(connection, pattern)`
    ///
    /// Returns true when a subscription was removed.
    pub async fn unsubscribe(&self, conn_id: u64, pattern: &str) -> bool {
        let mut inner = self.inner.lock().await;
        if let Some(pos) = inner
            .entries
            .iter()
            .position(|e| e.conn_id == conn_id && e.pattern.as_str() == pattern)
        {
            inner.entries.remove(pos);
            true
        } else {
            false
        }
    }

    /// All `(connection, subscription)` pairs whose pattern matches a topic
    pub async fn matching(&self, topic: &str) -> Vec<(u64, u64)> {
        let inner = self.inner.lock().await;
        inner
            .entries
            .iter()
            .filter(|e| e.pattern.matches(topic))
            .map(|e| (e.conn_id, e.id))
            .collect()
    }

    /// Drop every subscription held by a connection; returns how many
    pub async fn remove_connection(&self, conn_id: u64) -> usize {
        let mut inner = self.inner.lock().await;
        let before = inner.entries.len();
        inner.entries.retain(|e| e.conn_id != conn_id);
        before - inner.entries.len()
    }

    /// Patterns a connection currently holds, in subscribe order
    pub async fn patterns_for(&self, conn_id: u64) -> Vec<String> {
        let inner = self.inner.lock().await;
        inner
            .entries
            .iter()
            .filter(|e| e.conn_id == conn_id)
            .map(|e| e.pattern.as_str().to_string())
            .collect()
    }

    /// Total number of live subscriptions
    pub async fn subscription_count(&self) -> usize {
        self.inner.lock().await.entries.len()
    }
}
