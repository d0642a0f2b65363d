//! Server builder
//!
//! Fluent configuration for a [`BusServer`](crate::BusServer): bind address
//! and per-connection write-queue capacity.
//!
//! # Examples
//!
//! ```rust,no_run
//! use bub_bus::BusServer;
//!
//! # async fn example() -> bub_core::Result<()> {
//! let addr: std::net::SocketAddr = "127.0.0.1:7892".parse().unwrap();
//! let server = BusServer::builder()
//!     .bind(addr)
//!     .queue_capacity(512)
//!     .build()
//!     .await?;
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

use crate::connection::ConnectionRegistry;
use crate::subscription::SubscriptionTable;
use crate::write_queue::DEFAULT_QUEUE_CAPACITY;
use crate::BusServer;
use bub_core::{Error, Result};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

/// Builder for a [`BusServer`]
pub struct BusBuilder {
    addr: Option<SocketAddr>,
    queue_capacity: usize,
}

impl BusBuilder {
    /// Create a builder with the default queue capacity
    pub fn new() -> Self {
        Self {
            addr: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: impl Into<SocketAddr>) -> Self {
        self.addr = Some(addr.into());
        self
    }

    /// Set the bind address from a string (e.g. `"127.0.0.1:7892"`)
    pub fn bind_str(mut self, addr: &str) -> Result<Self> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|e| Error::InvalidRequest(format!("Invalid address: {}", e)))?;
        self.addr = Some(addr);
        Ok(self)
    }

    /// Set the per-connection write-queue capacity (default 256)
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Bind the listener and build the server
    pub async fn build(self) -> Result<BusServer> {
        let addr = self
            .addr
            .ok_or_else(|| Error::InvalidRequest("No bind address specified".to_string()))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Io(e.to_string()))?;

        tracing::info!(addr = %addr, "bus listening");

        let registry: ConnectionRegistry = Arc::new(Mutex::new(HashMap::new()));
        Ok(BusServer {
            listener,
            registry,
            subscriptions: SubscriptionTable::new(),
            queue_capacity: self.queue_capacity,
        })
    }
}

impl Default for BusBuilder {
    fn default() -> Self {
        Self::new()
    }
}
