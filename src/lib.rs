//! bub - agent message bus and tape-backed agent runtime
//!
//! This is the convenience crate re-exporting the workspace members. Use it
//! for a single dependency covering the whole stack, or depend on the
//! members directly:
//!
//! - **bub-core**: JSON-RPC types and codec, topic matcher, message
//!   envelopes
//! - **bub-bus**: the WebSocket bus server
//! - **bub-client**: the typed bus client with auto-reconnect
//! - **bub-agent**: tape store, context projection, session runtime,
//!   channel bridge
//!
//! # Quick start - bus
//!
//! ```rust,no_run
//! use bub::BusServer;
//!
//! #[tokio::main]
//! async fn main() -> bub_core::Result<()> {
//!     let addr: std::net::SocketAddr = "127.0.0.1:7892".parse().unwrap();
//!     let server = BusServer::builder().bind(addr).build().await?;
//!     server.run().await
//! }
//! ```
//!
//! # Quick start - agent
//!
//! ```rust,no_run
//! use bub::agent::config::AgentSettings;
//! use bub::agent::model::EchoModel;
//! use bub::agent::tools::ToolRegistry;
//! use bub::{ChannelBridge, BusClient, FileTapeStore, Supervisor};
//! use std::sync::Arc;
//!
//! # async fn example() -> bub_agent::AgentResult<()> {
//! let store = Arc::new(FileTapeStore::open("/tmp/bub")?);
//! let supervisor = Supervisor::new(
//!     store,
//!     Arc::new(EchoModel::new()),
//!     Arc::new(ToolRegistry::new()),
//!     AgentSettings::default(),
//! );
//! let client = BusClient::connect("ws://localhost:7892").await?;
//! let bridge = ChannelBridge::new(client, supervisor, "agent:bub");
//! bridge.start().await?;
//! # Ok(())
//! # }
//! ```

pub use bub_agent as agent;
pub use bub_bus as bus;
pub use bub_client as client;

pub use bub_agent::{
    AgentError, AgentResult, ChannelBridge, FileTapeStore, LoopResult, Settings, Supervisor,
    TapeService,
};
pub use bub_bus::BusServer;
pub use bub_client::BusClient;
pub use bub_core::{
    Error, InboundMessage, MessageEnvelope, OutboundMessage, Result, TopicPattern,
};
