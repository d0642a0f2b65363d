//! Core types for the bub agent message bus
//!
//! This crate holds everything the bus server, the bus client, and the agent
//! runtime share:
//!
//! - **JSON-RPC 2.0 types and codec** ([`types`], [`codec`]): the wire
//!   protocol, one JSON document per WebSocket text frame
//! - **Errors** ([`error`]): application errors with stable textual tags and
//!   the wire-format error object with the bus's code table
//! - **Topic matching** ([`topic`]): colon-delimited topics and wildcard
//!   subscription patterns
//! - **Message envelopes** ([`payload`]): the canonical
//!   `{messageId, type, from, timestamp, content}` envelope with typed
//!   bodies, plus the inbound/outbound channel events

pub mod codec;
pub mod error;
pub mod payload;
pub mod topic;
pub mod types;

pub use error::{Error, JsonRpcErrorData, Result};
pub use payload::{
    inbound_topic, new_message_id, outbound_topic, AgentEventContent, InboundMessage,
    MessageEnvelope, OutboundMessage, PayloadBody, SpawnRequestContent, SpawnResultContent,
    TgMessageContent, TgReplyContent, SYSTEM_DISCONNECT_TOPIC, SYSTEM_SPAWN_TOPIC,
};
pub use topic::{PatternError, Segment, TopicPattern};
pub use types::{Id, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
