//! Canonical message envelope and channel events
//!
//! Every domain message crossing the bus travels inside one envelope shape:
//!
//! ```json
//! {
//!   "messageId": "<unique>",
//!   "type": "tg_message",
//!   "from": "tg:12345",
//!   "timestamp": "2026-02-17T00:00:00Z",
//!   "content": { "text": "hi", ... }
//! }
//! ```
//!
//! The `content` schema is a function of `type`. [`MessageEnvelope::body`]
//! decodes the known types into [`PayloadBody`] variants; unknown or
//! malformed bodies fall back to [`PayloadBody::Other`], which round-trips
//! unchanged so unrecognized traffic is never destroyed in transit.
//!
//! [`InboundMessage`] and [`OutboundMessage`] are the channel-facing events
//! the bridge converts envelopes into and out of; their `session_id` is the
//! `"<channel>:<chat>"` pair that keys agent sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Conventional topic for user messages entering the system
pub fn inbound_topic(chat_id: &str) -> String {
    format!("inbound:{}", chat_id)
}

/// Conventional topic for agent messages exiting to channels
pub fn outbound_topic(chat_id: &str) -> String {
    format!("outbound:{}", chat_id)
}

/// Topic the server notifies when a client connection drops
pub const SYSTEM_DISCONNECT_TOPIC: &str = "system:disconnect";

/// Topic serving session spawn requests
pub const SYSTEM_SPAWN_TOPIC: &str = "system:spawn";

/// Generate a fresh unique message id
pub fn new_message_id() -> String {
    format!("msg_{}", uuid::Uuid::new_v4().simple())
}

/// Canonical payload envelope for domain messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Unique message id, `msg_<uuid>` when generated here
    #[serde(rename = "messageId")]
    pub message_id: String,
    /// Discriminator selecting the `content` schema
    #[serde(rename = "type")]
    pub kind: String,
    /// Topic of the sender
    pub from: String,
    /// ISO-8601 UTC send time
    pub timestamp: DateTime<Utc>,
    /// Type-specific body, decoded on demand via [`MessageEnvelope::body`]
    pub content: serde_json::Value,
}

impl MessageEnvelope {
    /// Build an envelope from a typed body, stamping id and timestamp
    pub fn new(from: impl Into<String>, body: PayloadBody) -> Self {
        let (kind, content) = body.into_parts();
        Self {
            message_id: new_message_id(),
            kind,
            from: from.into(),
            timestamp: Utc::now(),
            content,
        }
    }

    /// Decode the typed body for this envelope
    ///
    /// Unknown `type` values, and known types whose content fails to parse,
    /// come back as [`PayloadBody::Other`] carrying the raw content.
    pub fn body(&self) -> PayloadBody {
        macro_rules! parse {
            ($variant:ident, $ty:ty) => {
                match serde_json::from_value::<$ty>(self.content.clone()) {
                    Ok(content) => PayloadBody::$variant(content),
                    Err(_) => PayloadBody::Other {
                        kind: self.kind.clone(),
                        content: self.content.clone(),
                    },
                }
            };
        }
        match self.kind.as_str() {
            "tg_message" => parse!(TgMessage, TgMessageContent),
            "tg_reply" => parse!(TgReply, TgReplyContent),
            "spawn_request" => parse!(SpawnRequest, SpawnRequestContent),
            "spawn_result" => parse!(SpawnResult, SpawnResultContent),
            "agent_event" => parse!(AgentEvent, AgentEventContent),
            _ => PayloadBody::Other {
                kind: self.kind.clone(),
                content: self.content.clone(),
            },
        }
    }

    /// Serialize into the raw JSON value a bus payload carries
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Parse an envelope out of a raw bus payload
    pub fn from_value(value: serde_json::Value) -> Option<Self> {
        serde_json::from_value(value).ok()
    }
}

/// Typed message bodies, discriminated by the envelope `type`
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadBody {
    /// A user message arriving from a channel
    TgMessage(TgMessageContent),
    /// An agent reply going back to a channel
    TgReply(TgReplyContent),
    /// Request to spawn a session for a channel/chat pair
    SpawnRequest(SpawnRequestContent),
    /// Outcome of a spawn request
    SpawnResult(SpawnResultContent),
    /// Structured runtime event
    AgentEvent(AgentEventContent),
    /// Unknown type or unparseable content, preserved as-is
    Other {
        /// The envelope `type` value
        kind: String,
        /// The raw content
        content: serde_json::Value,
    },
}

impl PayloadBody {
    fn into_parts(self) -> (String, serde_json::Value) {
        fn value<T: Serialize>(v: &T) -> serde_json::Value {
            serde_json::to_value(v).unwrap_or(serde_json::Value::Null)
        }
        match self {
            PayloadBody::TgMessage(c) => ("tg_message".to_string(), value(&c)),
            PayloadBody::TgReply(c) => ("tg_reply".to_string(), value(&c)),
            PayloadBody::SpawnRequest(c) => ("spawn_request".to_string(), value(&c)),
            PayloadBody::SpawnResult(c) => ("spawn_result".to_string(), value(&c)),
            PayloadBody::AgentEvent(c) => ("agent_event".to_string(), value(&c)),
            PayloadBody::Other { kind, content } => (kind, content),
        }
    }
}

/// Content of a `tg_message` envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TgMessageContent {
    /// Message text
    pub text: String,
    /// Channel name (`telegram`, `discord`, ...)
    pub channel: String,
    /// Chat the message belongs to
    #[serde(rename = "chatId")]
    pub chat_id: String,
    /// Sender within the chat
    #[serde(rename = "senderId")]
    pub sender_id: String,
    /// Channel-specific extras (chat type, mention flags, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Content of a `tg_reply` envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TgReplyContent {
    /// Reply text
    pub text: String,
    /// Channel name
    pub channel: String,
    /// Chat to deliver into
    #[serde(rename = "chatId")]
    pub chat_id: String,
    /// Channel message id to thread under, when the channel supports it
    #[serde(
        rename = "replyToMessageId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub reply_to_message_id: Option<i64>,
}

/// Content of a `spawn_request` envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnRequestContent {
    /// Chat to create a session for
    pub chat_id: String,
    /// Channel the chat lives on
    pub channel: String,
}

/// Content of a `spawn_result` envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnResultContent {
    /// Whether the session exists now
    pub success: bool,
    /// Session client id on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Failure description on error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Content of an `agent_event` envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentEventContent {
    /// Event name (`loop.result`, `disconnect`, ...)
    pub name: String,
    /// Event data
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Message received from an external channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Channel the message arrived on
    pub channel: String,
    /// Sender within the chat
    pub sender_id: String,
    /// Chat the message belongs to
    pub chat_id: String,
    /// Message text
    pub content: String,
    /// Channel-specific extras
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl InboundMessage {
    /// Session key for this message: `"<channel>:<chat>"`
    pub fn session_id(&self) -> String {
        format!("{}:{}", self.channel, self.chat_id)
    }

    /// Render the message as the JSON prompt text handed to a session
    pub fn render(&self) -> String {
        let mut data = serde_json::Map::new();
        data.insert(
            "message".to_string(),
            serde_json::Value::String(self.content.clone()),
        );
        for (key, value) in &self.metadata {
            data.insert(key.clone(), value.clone());
        }
        data.insert(
            "sender_id".to_string(),
            serde_json::Value::String(self.sender_id.clone()),
        );
        data.insert(
            "chat_id".to_string(),
            serde_json::Value::String(self.chat_id.clone()),
        );
        serde_json::Value::Object(data).to_string()
    }

    /// Extract an inbound message from a `tg_message` envelope, if it is one
    pub fn from_envelope(envelope: &MessageEnvelope) -> Option<Self> {
        match envelope.body() {
            PayloadBody::TgMessage(content) => Some(Self {
                channel: content.channel,
                sender_id: content.sender_id,
                chat_id: content.chat_id,
                content: content.text,
                metadata: content.metadata,
            }),
            _ => None,
        }
    }

    /// Wrap this message in a `tg_message` envelope
    pub fn to_envelope(&self) -> MessageEnvelope {
        MessageEnvelope::new(
            format!("{}:{}", self.channel, self.chat_id),
            PayloadBody::TgMessage(TgMessageContent {
                text: self.content.clone(),
                channel: self.channel.clone(),
                chat_id: self.chat_id.clone(),
                sender_id: self.sender_id.clone(),
                metadata: self.metadata.clone(),
            }),
        )
    }
}

/// Message to be delivered to one external channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Channel to deliver on
    pub channel: String,
    /// Chat to deliver into
    pub chat_id: String,
    /// Reply text
    pub content: String,
    /// Channel-specific extras
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Channel message id to thread under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_message_id: Option<i64>,
}

impl OutboundMessage {
    /// Session key for this message: `"<channel>:<chat>"`
    pub fn session_id(&self) -> String {
        format!("{}:{}", self.channel, self.chat_id)
    }

    /// Wrap this message in a `tg_reply` envelope sent from the agent
    pub fn to_envelope(&self, from: impl Into<String>) -> MessageEnvelope {
        MessageEnvelope::new(
            from,
            PayloadBody::TgReply(TgReplyContent {
                text: self.content.clone(),
                channel: self.channel.clone(),
                chat_id: self.chat_id.clone(),
                reply_to_message_id: self.reply_to_message_id,
            }),
        )
    }

    /// Extract an outbound message from a `tg_reply` envelope, if it is one
    pub fn from_envelope(envelope: &MessageEnvelope) -> Option<Self> {
        match envelope.body() {
            PayloadBody::TgReply(content) => Some(Self {
                channel: content.channel,
                chat_id: content.chat_id,
                content: content.text,
                metadata: BTreeMap::new(),
                reply_to_message_id: content.reply_to_message_id,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_wire_shape() {
        let envelope = MessageEnvelope::new(
            "tg:42",
            PayloadBody::TgMessage(TgMessageContent {
                text: "hi".to_string(),
                channel: "telegram".to_string(),
                chat_id: "42".to_string(),
                sender_id: "7".to_string(),
                metadata: BTreeMap::new(),
            }),
        );
        let value = envelope.to_value();
        assert_eq!(value["type"], "tg_message");
        assert_eq!(value["from"], "tg:42");
        assert_eq!(value["content"]["text"], "hi");
        assert_eq!(value["content"]["chatId"], "42");
        assert!(value["messageId"].as_str().unwrap().starts_with("msg_"));
    }

    #[test]
    fn test_envelope_round_trip() {
        let envelope = MessageEnvelope::new(
            "system",
            PayloadBody::SpawnResult(SpawnResultContent {
                success: true,
                client_id: Some("telegram:42".to_string()),
                error: None,
            }),
        );
        let value = envelope.to_value();
        let back = MessageEnvelope::from_value(value).unwrap();
        assert_eq!(back, envelope);
        match back.body() {
            PayloadBody::SpawnResult(content) => {
                assert!(content.success);
                assert_eq!(content.client_id.as_deref(), Some("telegram:42"));
            }
            other => panic!("expected spawn_result, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_falls_back_to_other() {
        let value = json!({
            "messageId": "msg_x",
            "type": "tg_sticker",
            "from": "tg:42",
            "timestamp": "2026-02-17T00:00:00Z",
            "content": {"sticker": "cat"},
        });
        let envelope = MessageEnvelope::from_value(value.clone()).unwrap();
        match envelope.body() {
            PayloadBody::Other { kind, content } => {
                assert_eq!(kind, "tg_sticker");
                assert_eq!(content["sticker"], "cat");
            }
            other => panic!("expected fallback, got {:?}", other),
        }
        // The unknown payload survives re-serialization unchanged.
        assert_eq!(envelope.to_value(), value);
    }

    #[test]
    fn test_malformed_known_type_falls_back() {
        let value = json!({
            "messageId": "msg_x",
            "type": "tg_message",
            "from": "tg:42",
            "timestamp": "2026-02-17T00:00:00Z",
            "content": {"no_text_here": true},
        });
        let envelope = MessageEnvelope::from_value(value).unwrap();
        assert!(matches!(envelope.body(), PayloadBody::Other { .. }));
    }

    #[test]
    fn test_inbound_session_id_and_render() {
        let mut metadata = BTreeMap::new();
        metadata.insert("chat_type".to_string(), json!("group"));
        let msg = InboundMessage {
            channel: "telegram".to_string(),
            sender_id: "7".to_string(),
            chat_id: "42".to_string(),
            content: "hello".to_string(),
            metadata,
        };
        assert_eq!(msg.session_id(), "telegram:42");

        let rendered: serde_json::Value = serde_json::from_str(&msg.render()).unwrap();
        assert_eq!(rendered["message"], "hello");
        assert_eq!(rendered["chat_type"], "group");
        assert_eq!(rendered["sender_id"], "7");
        assert_eq!(rendered["chat_id"], "42");
    }

    #[test]
    fn test_inbound_envelope_round_trip() {
        let msg = InboundMessage {
            channel: "telegram".to_string(),
            sender_id: "7".to_string(),
            chat_id: "42".to_string(),
            content: "hello".to_string(),
            metadata: BTreeMap::new(),
        };
        let envelope = msg.to_envelope();
        assert_eq!(envelope.from, "telegram:42");
        let back = InboundMessage::from_envelope(&envelope).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_outbound_envelope_round_trip() {
        let msg = OutboundMessage {
            channel: "telegram".to_string(),
            chat_id: "42".to_string(),
            content: "done".to_string(),
            metadata: BTreeMap::new(),
            reply_to_message_id: Some(99),
        };
        let envelope = msg.to_envelope("agent:telegram:42");
        assert_eq!(envelope.kind, "tg_reply");
        let back = OutboundMessage::from_envelope(&envelope).unwrap();
        assert_eq!(back.content, "done");
        assert_eq!(back.reply_to_message_id, Some(99));
    }

    #[test]
    fn test_topic_helpers() {
        assert_eq!(inbound_topic("42"), "inbound:42");
        assert_eq!(outbound_topic("42"), "outbound:42");
    }

    #[test]
    fn test_message_ids_are_unique() {
        assert_ne!(new_message_id(), new_message_id());
    }
}
