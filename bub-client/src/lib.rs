//! Bus client with request correlation and auto-reconnect
//!
//! A typed façade over the bus wire protocol:
//!
//! - [`BusClient`]: `initialize`, `subscribe`, `sendMessage`, `ping`, the
//!   inbound/outbound convenience wrappers, and the receive loop
//! - [`HandlerRegistry`]: local handlers keyed by subscription pattern,
//!   dispatched in registration order
//! - [`RequestManager`]: monotonically increasing request ids and
//!   oneshot-based response correlation with per-request timeouts
//! - [`ReconnectionStrategy`]: pluggable reconnect policies; the default is
//!   exponential backoff (250ms, doubling to 5s, ±20% jitter)
//!
//! # Quick start
//!
//! ```rust,no_run
//! use bub_client::BusClient;
//!
//! # async fn example() -> bub_core::Result<()> {
//! let client = BusClient::builder("ws://localhost:7892")
//!     .with_default_reconnect()
//!     .connect()
//!     .await?;
//! client.initialize("agent:echo", None).await?;
//! client
//!     .subscribe("inbound:*", |topic, payload| async move {
//!         println!("{} -> {}", topic, payload);
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod handlers;
mod reconnect;
mod request;

pub use client::{
    BusClient, ClientBuilder, ConnectionState, InitializeResult, ServerInfo,
    DEFAULT_REQUEST_TIMEOUT, DEFAULT_SEND_QUEUE_CAPACITY,
};
pub use handlers::{HandlerRegistry, TopicHandlerFn};
pub use reconnect::{ExponentialBackoff, FixedDelay, NoReconnect, ReconnectionStrategy};
pub use request::RequestManager;
