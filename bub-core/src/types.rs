//! JSON-RPC 2.0 message types for the bus wire protocol
//!
//! The bus speaks JSON-RPC 2.0 over a text-frame transport, one JSON document
//! per frame. Three message shapes travel on the wire:
//!
//! 1. **Request**: a method call carrying an `id`, answered by a response
//!    (`initialize`, `subscribe`, `sendMessage`, `ping`, ...)
//! 2. **Notification**: a method call without an `id`; the server uses this
//!    shape for `deliverMessage` fan-out and never answers one
//! 3. **Response**: the result or error for a previously seen request `id`
//!
//! Request ids correlate requests with responses. JSON-RPC 2.0 allows
//! string, number, or null ids; the bus client issues monotonically
//! increasing integer ids, but the server accepts any of the three.

use crate::error::JsonRpcErrorData;
use serde::{Deserialize, Serialize};
use std::fmt;

/// JSON-RPC 2.0 request id
///
/// Serialized untagged, so it appears on the wire as a bare string, number,
/// or null, exactly as the JSON-RPC 2.0 spec requires. Implements `Hash` and
/// `Eq` so pending requests can be keyed by id.
///
/// # Examples
///
/// ```rust
/// use bub_core::Id;
///
/// let a: Id = 7i64.into();
/// let b: Id = "req-7".into();
/// assert_eq!(a.to_string(), "7");
/// assert_eq!(b.to_string(), "\"req-7\"");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    /// String identifier
    String(String),
    /// Numeric identifier (the client's counter uses this form)
    Number(i64),
    /// Null identifier; only produced when a request id could not be parsed
    Null,
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::String(s) => write!(f, "\"{}\"", s),
            Id::Number(n) => write!(f, "{}", n),
            Id::Null => write!(f, "null"),
        }
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Id::String(s)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Id::String(s.to_string())
    }
}

impl From<i64> for Id {
    fn from(n: i64) -> Self {
        Id::Number(n)
    }
}

impl From<u64> for Id {
    fn from(n: u64) -> Self {
        Id::Number(n as i64)
    }
}

/// JSON-RPC 2.0 request
///
/// A method call that expects a response with a matching `id`. The `jsonrpc`
/// field is always `"2.0"`; `params` is omitted from the wire form when
/// absent.
///
/// # Examples
///
/// ```rust
/// use bub_core::{JsonRpcRequest, Id};
/// use serde_json::json;
///
/// let req = JsonRpcRequest::new(
///     "sendMessage",
///     Some(json!({"to": "inbound:42", "payload": {}})),
///     Id::Number(1),
/// );
/// assert_eq!(req.jsonrpc, "2.0");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version, always "2.0"
    pub jsonrpc: String,
    /// Method name (`initialize`, `subscribe`, `sendMessage`, ...)
    pub method: String,
    /// Optional structured parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    /// Correlation id echoed back in the response
    pub id: Id,
}

impl JsonRpcRequest {
    /// Create a new request with the version field filled in
    pub fn new(method: impl Into<String>, params: Option<serde_json::Value>, id: Id) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
            id,
        }
    }
}

/// JSON-RPC 2.0 notification
///
/// Like a request but without an `id`; no response is ever sent for one,
/// even on error. The bus server delivers published messages to subscribers
/// as `deliverMessage` notifications.
///
/// # Examples
///
/// ```rust
/// use bub_core::JsonRpcNotification;
/// use serde_json::json;
///
/// let notif = JsonRpcNotification::new(
///     "deliverMessage",
///     Some(json!({"topic": "inbound:42", "payload": {}})),
/// );
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// Protocol version, always "2.0"
    pub jsonrpc: String,
    /// Method or event name
    pub method: String,
    /// Optional event data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcNotification {
    /// Create a new notification with the version field filled in
    pub fn new(method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC 2.0 response
///
/// Carries exactly one of `result` or `error`, never both; the factory
/// methods enforce that by construction. The `id` matches the originating
/// request, or is `Id::Null` when the request id could not be determined
/// (e.g. a parse error).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Protocol version, always "2.0"
    pub jsonrpc: String,
    /// Success result, mutually exclusive with `error`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error data, mutually exclusive with `result`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcErrorData>,
    /// Correlation id from the request
    pub id: Id,
}

impl JsonRpcResponse {
    /// Create a success response
    pub fn success(result: serde_json::Value, id: Id) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    /// Create an error response
    pub fn error(error: JsonRpcErrorData, id: Id) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }

    /// True when `result` is present
    pub fn is_success(&self) -> bool {
        self.result.is_some()
    }

    /// True when `error` is present
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Any JSON-RPC 2.0 message arriving on a frame
///
/// Incoming frames are decoded into this untagged union, then handled by
/// variant: servers act on requests and ignore stray responses; clients
/// complete pending requests on responses and fan notifications out to
/// topic handlers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    /// A request (expects a response)
    Request(JsonRpcRequest),
    /// A notification (no response expected)
    Notification(JsonRpcNotification),
    /// A response to an earlier request
    Response(JsonRpcResponse),
}

impl JsonRpcMessage {
    /// True for the `Request` variant
    pub fn is_request(&self) -> bool {
        matches!(self, JsonRpcMessage::Request(_))
    }

    /// True for the `Notification` variant
    pub fn is_notification(&self) -> bool {
        matches!(self, JsonRpcMessage::Notification(_))
    }

    /// True for the `Response` variant
    pub fn is_response(&self) -> bool {
        matches!(self, JsonRpcMessage::Response(_))
    }
}
