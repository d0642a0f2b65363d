//! Agent runtime: tapes, context reconstruction, and the session loop
//!
//! This crate owns per-session conversational state and the model
//! invocation loop around it:
//!
//! - [`tape`]: append-only session logs with fork, anchor, reset, and
//!   range-read semantics, plus the deterministic projection to
//!   provider-agnostic messages
//! - [`llm`] / [`model`]: the standard message shape and the single model
//!   capability (`run_tools(messages, tools) → text | tool_calls`)
//! - [`tools`]: the tool registry with order-preserving concurrent
//!   execution
//! - [`runtime`]: input routing, the bounded model-turn loop, per-session
//!   workers with serialized input queues, and the supervisor
//! - [`bridge`]: glue between bus topics and the session runtime
//! - [`config`]: `BUB_`-prefixed environment settings
//!
//! One input flows: bus delivery → bridge → session queue → router →
//! model loop → tape appends → outbound publish.

pub mod bridge;
pub mod config;
pub mod error;
pub mod llm;
pub mod model;
pub mod runtime;
pub mod tape;
pub mod tools;

pub use bridge::{ChannelBridge, MessageFilter};
pub use config::{AgentSettings, BusSettings, Settings, TapeSettings};
pub use error::{AgentError, AgentResult};
pub use llm::{Role, StandardMessage, ToolCall, ToolCallFunction};
pub use model::{EchoModel, ModelOutcome, ModelProvider, ScriptedModel};
pub use runtime::{AgentLoop, LoopResult, ModelRunner, ModelTurnResult, Session, Supervisor};
pub use tape::{FileTapeStore, SessionGraph, TapeEntry, TapeInfo, TapeService};
pub use tools::{tool_fn, ToolHandler, ToolRegistry, ToolSchema};
