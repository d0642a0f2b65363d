//! Error types for the bus
//!
//! Two layers of error exist here:
//!
//! - [`Error`]: the application-level enum used throughout the workspace
//!   (transport failures, protocol violations, timeouts, backpressure)
//! - [`JsonRpcErrorData`]: the wire-format error object carried inside a
//!   JSON-RPC response
//!
//! Standard JSON-RPC 2.0 codes are used where the protocol defines one:
//! `-32700` parse error, `-32600` invalid request, `-32601` method not
//! found, `-32602` invalid params, `-32603` internal error. The bus defines
//! three server codes in the reserved range for session gating:
//! `-32002` not initialized, `-32003` already initialized, `-32004`
//! client id in use.
//!
//! Every error kind exposes a stable textual tag through [`Error::tag`];
//! those tags appear in tape events and CLI output and never change shape.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for bus operations
pub type Result<T> = std::result::Result<T, Error>;

/// Application-level error for bus operations
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// JSON-RPC error already in wire format, usually received from a peer
    #[error("JSON-RPC error: {0}")]
    JsonRpc(#[from] JsonRpcErrorData),

    /// Conversion between Rust types and JSON failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// WebSocket transport failure (below the JSON-RPC layer)
    #[error("transport error: {0}")]
    Transport(String),

    /// Operating-system level I/O failure
    #[error("io error: {0}")]
    Io(String),

    /// Frame was valid JSON but not a well-formed JSON-RPC message
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The requested method does not exist on the bus
    #[error("unknown method: {0}")]
    UnknownMethod(String),

    /// The method exists but its parameters are malformed
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// Unexpected server-side failure
    #[error("internal error: {0}")]
    Internal(String),

    /// A request exceeded its deadline
    #[error("request timeout")]
    Timeout,

    /// The connection is no longer open
    #[error("connection closed")]
    ConnectionClosed,

    /// An outstanding request was abandoned by a deliberate disconnect
    #[error("cancelled")]
    Cancelled,

    /// A method other than `initialize` arrived before `initialize`
    #[error("connection not initialized")]
    NotInitialized,

    /// `initialize` was called twice on the same connection
    #[error("connection already initialized")]
    AlreadyInitialized,

    /// The requested client id is bound to another live connection
    #[error("client id in use: {0}")]
    ClientInUse(String),

    /// The reconnect send queue is full; the caller decides whether to retry
    #[error("backpressure: send queue full")]
    Backpressure,

    /// A subscription pattern failed to parse
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),
}

impl Error {
    /// Stable textual tag for this error kind, used in events and CLI output
    pub fn tag(&self) -> &'static str {
        match self {
            Error::JsonRpc(_) => "rpc_error",
            Error::Serialization(_) => "protocol_violation",
            Error::Transport(_) => "transport_closed",
            Error::Io(_) => "io_error",
            Error::InvalidRequest(_) => "protocol_violation",
            Error::UnknownMethod(_) => "unknown_method",
            Error::InvalidParams(_) => "protocol_violation",
            Error::Internal(_) => "internal_error",
            Error::Timeout => "timeout:bus",
            Error::ConnectionClosed => "transport_closed",
            Error::Cancelled => "cancelled",
            Error::NotInitialized => "not_initialized",
            Error::AlreadyInitialized => "already_initialized",
            Error::ClientInUse(_) => "client_in_use",
            Error::Backpressure => "backpressure",
            Error::InvalidPattern(_) => "invalid_pattern",
        }
    }

    /// Convert into the wire-format error object for a JSON-RPC response
    pub fn to_error_data(&self) -> JsonRpcErrorData {
        match self {
            Error::JsonRpc(data) => data.clone(),
            Error::UnknownMethod(m) => JsonRpcErrorData::method_not_found(m.clone()),
            Error::InvalidParams(m) => JsonRpcErrorData::invalid_params(m.clone()),
            Error::InvalidRequest(m) => JsonRpcErrorData::invalid_request(m.clone()),
            Error::InvalidPattern(m) => JsonRpcErrorData::invalid_params(m.clone()),
            Error::NotInitialized => JsonRpcErrorData::not_initialized(),
            Error::AlreadyInitialized => JsonRpcErrorData::already_initialized(),
            Error::ClientInUse(id) => JsonRpcErrorData::client_in_use(id.clone()),
            other => JsonRpcErrorData::internal_error(other.to_string()),
        }
    }
}

/// JSON-RPC 2.0 error object as carried in the `error` field of a response
///
/// Contains a numeric `code`, a human-readable `message`, and optional
/// structured `data`. The factory methods cover every code the bus emits.
///
/// # Examples
///
/// ```rust
/// use bub_core::JsonRpcErrorData;
///
/// let err = JsonRpcErrorData::method_not_found("spawn");
/// assert_eq!(err.code, -32601);
///
/// let gated = JsonRpcErrorData::not_initialized();
/// assert_eq!(gated.code, -32002);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcErrorData {
    /// Numeric error code
    pub code: i32,

    /// Short human-readable description
    pub message: String,

    /// Optional structured context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcErrorData {
    /// Create an error with a code and message
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Create an error with additional structured data
    pub fn with_data(code: i32, message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    /// Parse error (-32700): the frame was not valid JSON
    pub fn parse_error() -> Self {
        Self::new(-32700, "Parse error")
    }

    /// Invalid request (-32600): valid JSON, malformed JSON-RPC
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::new(-32600, msg)
    }

    /// Method not found (-32601)
    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::new(-32601, format!("Method not found: {}", method.into()))
    }

    /// Invalid params (-32602)
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::new(-32602, msg)
    }

    /// Internal error (-32603)
    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::new(-32603, msg)
    }

    /// Not initialized (-32002): `initialize` must precede any other method
    pub fn not_initialized() -> Self {
        Self::new(-32002, "Connection not initialized")
    }

    /// Already initialized (-32003): `initialize` called twice on one connection
    pub fn already_initialized() -> Self {
        Self::new(-32003, "Connection already initialized")
    }

    /// Client in use (-32004): the client id is bound to another live connection
    pub fn client_in_use(client_id: impl Into<String>) -> Self {
        Self::new(
            -32004,
            format!("Client id in use: {}", client_id.into()),
        )
    }
}

impl std::fmt::Display for JsonRpcErrorData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for JsonRpcErrorData {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_standard_codes() {
        let cases = vec![
            (JsonRpcErrorData::parse_error(), -32700),
            (JsonRpcErrorData::invalid_request("x"), -32600),
            (JsonRpcErrorData::method_not_found("x"), -32601),
            (JsonRpcErrorData::invalid_params("x"), -32602),
            (JsonRpcErrorData::internal_error("x"), -32603),
        ];
        for (err, code) in cases {
            assert_eq!(err.code, code);
            assert!(!err.message.is_empty());
        }
    }

    #[test]
    fn test_server_codes() {
        assert_eq!(JsonRpcErrorData::not_initialized().code, -32002);
        assert_eq!(JsonRpcErrorData::already_initialized().code, -32003);
        let in_use = JsonRpcErrorData::client_in_use("tg:42");
        assert_eq!(in_use.code, -32004);
        assert!(in_use.message.contains("tg:42"));
    }

    #[test]
    fn test_tags_are_stable() {
        assert_eq!(Error::NotInitialized.tag(), "not_initialized");
        assert_eq!(Error::Backpressure.tag(), "backpressure");
        assert_eq!(Error::ConnectionClosed.tag(), "transport_closed");
        assert_eq!(Error::UnknownMethod("x".into()).tag(), "unknown_method");
        assert_eq!(Error::Timeout.tag(), "timeout:bus");
    }

    #[test]
    fn test_to_error_data_mapping() {
        assert_eq!(Error::NotInitialized.to_error_data().code, -32002);
        assert_eq!(Error::AlreadyInitialized.to_error_data().code, -32003);
        assert_eq!(Error::ClientInUse("a".into()).to_error_data().code, -32004);
        assert_eq!(
            Error::UnknownMethod("spawn".into()).to_error_data().code,
            -32601
        );
    }

    #[test]
    fn test_error_data_round_trip() {
        let err = JsonRpcErrorData::with_data(-32000, "custom", json!({"key": "value"}));
        let encoded = serde_json::to_string(&err).unwrap();
        let decoded: JsonRpcErrorData = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.code, err.code);
        assert_eq!(decoded.message, err.message);
        assert_eq!(decoded.data, err.data);
    }

    #[test]
    fn test_display_format() {
        let err = JsonRpcErrorData::method_not_found("spawn");
        let shown = format!("{}", err);
        assert!(shown.contains("-32601"));
        assert!(shown.contains("spawn"));
    }
}
