//! Message bus server over WebSocket
//!
//! The bus brokers JSON-RPC messages between loosely-coupled participants:
//! channel adapters publish inbound user messages, agent processes subscribe
//! to them and publish replies back out. The server keeps a connection
//! registry and a subscription table and routes `sendMessage` calls to every
//! subscription whose pattern matches the target topic.
//!
//! # Protocol
//!
//! Clients speak JSON-RPC 2.0, one document per text frame:
//!
//! - `initialize(clientId, clientInfo?)` - binds a client id; required
//!   before anything but `ping`
//! - `subscribe(pattern)` / `unsubscribe(pattern)` - manage subscriptions
//! - `sendMessage(to, payload)` - route a payload; acks `{delivered: n}`
//! - `ping()` - liveness
//!
//! Deliveries arrive as `deliverMessage` notifications carrying
//! `{topic, payload, messageId, from}`.
//!
//! # Backpressure
//!
//! The server never blocks a publish on a slow recipient. Each connection
//! has a bounded write queue (default 256 frames); overflow evicts the
//! oldest undelivered frame and logs `delivery_dropped`.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use bub_bus::BusServer;
//!
//! #[tokio::main]
//! async fn main() -> bub_core::Result<()> {
//!     let addr: std::net::SocketAddr = "127.0.0.1:7892".parse().unwrap();
//!     let server = BusServer::builder().bind(addr).build().await?;
//!     server.run().await
//! }
//! ```

mod builder;
mod connection;
mod subscription;
mod write_queue;

pub use builder::BusBuilder;
pub use connection::{Connection, ConnectionRegistry};
pub use subscription::{SubscriptionEntry, SubscriptionTable};
pub use write_queue::{WriteQueue, DEFAULT_QUEUE_CAPACITY};

use bub_core::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::TcpListener;

/// The bus server
///
/// Owns the TCP listener, the connection registry, and the subscription
/// table. Each accepted connection runs in its own task; shared state is
/// mutated only under its own mutex.
pub struct BusServer {
    pub(crate) listener: TcpListener,
    pub(crate) registry: ConnectionRegistry,
    pub(crate) subscriptions: SubscriptionTable,
    pub(crate) queue_capacity: usize,
}

impl BusServer {
    /// Create a server builder
    pub fn builder() -> BusBuilder {
        BusBuilder::new()
    }

    /// Accept connections until the listener fails
    ///
    /// Each accepted connection gets a fresh connection id and its own
    /// handler task; a failing connection never affects its peers.
    #[tracing::instrument(skip(self), name = "bus.run")]
    pub async fn run(&self) -> Result<()> {
        let conn_counter = AtomicU64::new(0);

        loop {
            let (stream, addr) = self
                .listener
                .accept()
                .await
                .map_err(|e| bub_core::Error::Io(e.to_string()))?;
            let conn_id = conn_counter.fetch_add(1, Ordering::SeqCst);
            let registry = self.registry.clone();
            let subscriptions = self.subscriptions.clone();
            let queue_capacity = self.queue_capacity;

            tracing::info!(conn_id = conn_id, addr = %addr, "connection accepted");

            tokio::spawn(async move {
                if let Err(e) = connection::handle_connection(
                    stream,
                    conn_id,
                    registry,
                    subscriptions,
                    queue_capacity,
                )
                .await
                {
                    tracing::error!(conn_id = conn_id, error = %e, "connection error");
                }
            });
        }
    }

    /// Publish a server-originated payload to a topic
    ///
    /// Same routing as `sendMessage`, with `from` set to `system`. Used for
    /// system events such as `system:disconnect`. Returns the number of
    /// notifications enqueued.
    pub async fn publish(
        &self,
        topic: impl AsRef<str>,
        payload: serde_json::Value,
    ) -> Result<usize> {
        let delivered = connection::deliver(
            &self.registry,
            &self.subscriptions,
            topic.as_ref(),
            &payload,
            "system",
        )
        .await;
        Ok(delivered)
    }

    /// The subscription table, for inspection
    pub fn subscriptions(&self) -> &SubscriptionTable {
        &self.subscriptions
    }

    /// Local address the listener is bound to
    ///
    /// Useful with port 0 binds, where the OS picks the port.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }
}
