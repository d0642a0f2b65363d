//! Frame codec for JSON-RPC messages
//!
//! Encoding and decoding between wire text and the typed message shapes.
//! The bus frames exactly one JSON document per transport frame; arrays
//! (batch frames) are rejected as invalid requests, and broken JSON maps to
//! the JSON-RPC parse error so the connection can answer with `-32700`
//! instead of closing.
//!
//! # Examples
//!
//! ```rust
//! use bub_core::{codec, JsonRpcRequest, Id};
//!
//! let request = JsonRpcRequest::new("ping", None, Id::Number(1));
//! let frame = codec::encode_request(&request).unwrap();
//! let decoded = codec::decode(&frame).unwrap();
//! assert!(decoded.is_request());
//! ```

use crate::error::{Error, JsonRpcErrorData, Result};
use crate::types::{JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use serde::{Deserialize, Serialize};

/// Encode any serializable message to a frame string
pub fn encode<T: Serialize>(msg: &T) -> Result<String> {
    serde_json::to_string(msg).map_err(|e| Error::Serialization(e.to_string()))
}

/// Decode a frame into a JSON-RPC message
///
/// The frame must contain a single JSON object. Errors map to the wire
/// codes a connection responds with:
///
/// - invalid JSON → parse error (`-32700`)
/// - a JSON array → invalid request (`-32600`); the bus does not frame
///   batches
/// - an object that matches none of request/notification/response →
///   invalid request (`-32600`)
pub fn decode(data: &str) -> Result<JsonRpcMessage> {
    let value: serde_json::Value =
        serde_json::from_str(data).map_err(|_e| Error::JsonRpc(JsonRpcErrorData::parse_error()))?;

    if value.is_array() {
        return Err(Error::JsonRpc(JsonRpcErrorData::invalid_request(
            "Batch frames are not supported",
        )));
    }

    serde_json::from_value(value).map_err(|_e| {
        Error::JsonRpc(JsonRpcErrorData::invalid_request(
            "Frame is not a JSON-RPC message",
        ))
    })
}

/// Decode a frame directly into a specific type
///
/// Lower-level helper for when the caller knows what to expect. Prefer
/// [`decode`] for frames coming off the wire.
pub fn decode_as<'de, T: Deserialize<'de>>(data: &'de str) -> Result<T> {
    serde_json::from_str(data).map_err(|e| Error::Serialization(e.to_string()))
}

/// Encode a request to a frame
pub fn encode_request(req: &JsonRpcRequest) -> Result<String> {
    encode(req)
}

/// Encode a notification to a frame
pub fn encode_notification(notif: &JsonRpcNotification) -> Result<String> {
    encode(notif)
}

/// Encode a response to a frame
pub fn encode_response(resp: &JsonRpcResponse) -> Result<String> {
    encode(resp)
}

/// Decode a frame known to be a request
pub fn decode_request(data: &str) -> Result<JsonRpcRequest> {
    decode_as(data)
}

/// Decode a frame known to be a notification
pub fn decode_notification(data: &str) -> Result<JsonRpcNotification> {
    decode_as(data)
}

/// Decode a frame known to be a response
pub fn decode_response(data: &str) -> Result<JsonRpcResponse> {
    decode_as(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Id;

    #[test]
    fn test_encode_decode_request() {
        let req = JsonRpcRequest::new(
            "subscribe",
            Some(serde_json::json!({"pattern": "inbound:*"})),
            Id::Number(1),
        );
        let encoded = encode_request(&req).unwrap();
        let decoded = decode_request(&encoded).unwrap();

        assert_eq!(decoded.method, "subscribe");
        assert_eq!(decoded.id, Id::Number(1));
        assert_eq!(decoded.jsonrpc, "2.0");
    }

    #[test]
    fn test_encode_decode_notification() {
        let notif = JsonRpcNotification::new(
            "deliverMessage",
            Some(serde_json::json!({"topic": "tg:1", "payload": {}})),
        );
        let encoded = encode_notification(&notif).unwrap();
        let decoded = decode_notification(&encoded).unwrap();

        assert_eq!(decoded.method, "deliverMessage");
        assert!(decoded.params.is_some());
    }

    #[test]
    fn test_encode_decode_response() {
        let resp = JsonRpcResponse::success(
            serde_json::json!({"delivered": 2}),
            Id::String("req-9".to_string()),
        );
        let encoded = encode_response(&resp).unwrap();
        let decoded = decode_response(&encoded).unwrap();

        assert!(decoded.is_success());
        assert_eq!(decoded.id, Id::String("req-9".to_string()));
    }

    #[test]
    fn test_decode_classifies_variants() {
        let msg = decode(r#"{"jsonrpc":"2.0","method":"ping","id":1}"#).unwrap();
        assert!(msg.is_request());

        let msg = decode(r#"{"jsonrpc":"2.0","method":"deliverMessage"}"#).unwrap();
        assert!(msg.is_notification());

        let msg = decode(r#"{"jsonrpc":"2.0","result":{"ts":"now"},"id":1}"#).unwrap();
        assert!(msg.is_response());
    }

    #[test]
    fn test_decode_invalid_json_is_parse_error() {
        let result = decode("not valid json");
        match result {
            Err(Error::JsonRpc(data)) => assert_eq!(data.code, -32700),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_empty_string_is_parse_error() {
        let result = decode("");
        match result {
            Err(Error::JsonRpc(data)) => assert_eq!(data.code, -32700),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_array_is_invalid_request() {
        let result = decode(r#"[{"jsonrpc":"2.0","method":"ping","id":1}]"#);
        match result {
            Err(Error::JsonRpc(data)) => assert_eq!(data.code, -32600),
            other => panic!("expected invalid request, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_error_response() {
        let frame = r#"{"jsonrpc":"2.0","error":{"code":-32601,"message":"Method not found"},"id":3}"#;
        let decoded = decode_response(frame).unwrap();
        assert!(decoded.is_error());
        assert_eq!(decoded.error.unwrap().code, -32601);
    }
}
