//! Connection lifecycle and method dispatch
//!
//! Each accepted TCP connection is upgraded to WebSocket and handled by two
//! tasks: a receive task decoding frames and dispatching bus methods, and a
//! drain task moving queued outbound frames into the socket. The two are
//! joined with `select!` so either side failing tears the connection down.
//!
//! # Protocol gating
//!
//! `initialize` binds a client id to the connection and must precede every
//! other method except `ping`. Calling it twice fails with
//! `already_initialized`; binding a client id that another live connection
//! holds fails with `client_in_use`.
//!
//! # Failure semantics
//!
//! Malformed frames are answered with JSON-RPC errors (`-32700`/`-32600`)
//! and the connection stays open. Transport errors close the connection:
//! its registry entry and subscriptions are dropped and
//! `system:disconnect` is published with the former client id.

use crate::subscription::SubscriptionTable;
use crate::write_queue::WriteQueue;
use bub_core::{
    codec, new_message_id, Error, Id, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    Result, TopicPattern, SYSTEM_DISCONNECT_TOPIC,
};
use futures::StreamExt;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Registry of live connections, keyed by connection id
pub type ConnectionRegistry = Arc<Mutex<HashMap<u64, Connection>>>;

/// Handle for one live connection
///
/// Lightweight and cloneable; the registry holds the authoritative copy
/// (including the bound client id), every clone shares the same write queue.
#[derive(Clone)]
pub struct Connection {
    /// Server-assigned connection id
    pub id: u64,
    /// Client id bound by `initialize`, `None` until then
    pub client_id: Option<String>,
    queue: WriteQueue,
}

impl Connection {
    /// Create a handle around a connection's write queue
    pub fn new(id: u64, queue: WriteQueue) -> Self {
        Self {
            id,
            client_id: None,
            queue,
        }
    }

    /// Enqueue a notification frame for this connection
    pub async fn notify(
        &self,
        method: impl Into<String>,
        params: Option<serde_json::Value>,
    ) -> Result<()> {
        let notification = JsonRpcNotification::new(method, params);
        let frame = codec::encode_notification(&notification)?;
        self.queue.push(Message::Text(frame)).await?;
        Ok(())
    }

    /// Enqueue a response frame for this connection
    async fn respond(&self, response: &JsonRpcResponse) -> Result<()> {
        let frame = codec::encode_response(response)?;
        self.queue.push(Message::Text(frame)).await?;
        Ok(())
    }

    /// Frames this connection has lost to write-queue overflow
    pub fn dropped_frames(&self) -> u64 {
        self.queue.dropped_count()
    }
}

/// Deliver a payload to every subscription matching `topic`
///
/// One `deliverMessage` notification is enqueued per matching subscription;
/// a connection holding two matching patterns receives the payload twice.
/// The returned count is the number of notifications enqueued at send time;
/// frames later evicted by queue overflow do not reduce it.
pub(crate) async fn deliver(
    registry: &ConnectionRegistry,
    subscriptions: &SubscriptionTable,
    topic: &str,
    payload: &serde_json::Value,
    from: &str,
) -> usize {
    let matches = subscriptions.matching(topic).await;
    if matches.is_empty() {
        tracing::debug!(topic = %topic, "publish matched no subscriptions");
        return 0;
    }

    let message_id = payload
        .get("messageId")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(new_message_id);

    let registry = registry.lock().await;
    let mut delivered = 0;
    for (conn_id, sub_id) in matches {
        if let Some(conn) = registry.get(&conn_id) {
            let params = serde_json::json!({
                "topic": topic,
                "payload": payload,
                "messageId": message_id,
                "from": from,
            });
            if conn.notify("deliverMessage", Some(params)).await.is_ok() {
                delivered += 1;
                tracing::trace!(
                    topic = %topic,
                    conn_id = conn_id,
                    subscription_id = sub_id,
                    "delivered"
                );
            }
        }
    }
    tracing::debug!(topic = %topic, delivered = delivered, from = %from, "publish routed");
    delivered
}

/// Handle one WebSocket connection end to end
#[tracing::instrument(skip(stream, registry, subscriptions), fields(conn_id = conn_id))]
pub async fn handle_connection(
    stream: TcpStream,
    conn_id: u64,
    registry: ConnectionRegistry,
    subscriptions: SubscriptionTable,
    queue_capacity: usize,
) -> Result<()> {
    let ws_stream = accept_async(stream)
        .await
        .map_err(|e| Error::Transport(e.to_string()))?;
    let (ws_sink, mut ws_receiver) = ws_stream.split();

    let queue = WriteQueue::new(queue_capacity);
    let conn = Connection::new(conn_id, queue.clone());

    {
        let mut registry = registry.lock().await;
        registry.insert(conn_id, conn.clone());
    }

    let drain_queue = queue.clone();
    let mut send_task = tokio::spawn(async move {
        if let Err(e) = drain_queue.drain(ws_sink).await {
            tracing::debug!(error = %e, "drain task ended");
        }
    });

    let recv_registry = Arc::clone(&registry);
    let recv_subs = subscriptions.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(message) = ws_receiver.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    if let Err(e) =
                        handle_frame(&text, conn_id, &recv_registry, &recv_subs).await
                    {
                        tracing::error!(error = %e, "error handling frame");
                    }
                }
                Ok(Message::Close(_)) => {
                    tracing::info!("connection closed by client");
                    break;
                }
                Ok(_) => {} // binary/ping/pong frames are not part of the protocol
                Err(e) => {
                    tracing::warn!(error = %e, "websocket error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => { recv_task.abort(); }
        _ = &mut recv_task => { send_task.abort(); }
    }

    queue.close();

    // Cleanup: drop registry entry and subscriptions, then announce the
    // disconnect with the former client id.
    let former_client_id = {
        let mut registry_guard = registry.lock().await;
        registry_guard
            .remove(&conn_id)
            .and_then(|conn| conn.client_id)
    };
    let removed = subscriptions.remove_connection(conn_id).await;
    tracing::info!(
        dropped_subscriptions = removed,
        dropped_frames = queue.dropped_count(),
        client_id = former_client_id.as_deref().unwrap_or("-"),
        "connection cleaned up"
    );

    if let Some(client_id) = former_client_id {
        let payload = serde_json::json!({"clientId": client_id});
        deliver(
            &registry,
            &subscriptions,
            SYSTEM_DISCONNECT_TOPIC,
            &payload,
            "system",
        )
        .await;
    }

    Ok(())
}

/// Decode one frame and act on it
async fn handle_frame(
    text: &str,
    conn_id: u64,
    registry: &ConnectionRegistry,
    subscriptions: &SubscriptionTable,
) -> Result<()> {
    let message = match codec::decode(text) {
        Ok(message) => message,
        Err(e) => {
            // Protocol violations are answered, not fatal: the connection
            // stays open and the error carries a null id.
            let response = JsonRpcResponse::error(e.to_error_data(), Id::Null);
            return respond_to(conn_id, registry, &response).await;
        }
    };

    match message {
        bub_core::JsonRpcMessage::Request(request) => {
            let response = process_request(request, conn_id, registry, subscriptions).await;
            respond_to(conn_id, registry, &response).await
        }
        bub_core::JsonRpcMessage::Notification(notification) => {
            tracing::debug!(method = %notification.method, "ignoring client notification");
            Ok(())
        }
        bub_core::JsonRpcMessage::Response(_) => {
            tracing::warn!("ignoring unexpected response frame");
            Ok(())
        }
    }
}

async fn respond_to(
    conn_id: u64,
    registry: &ConnectionRegistry,
    response: &JsonRpcResponse,
) -> Result<()> {
    let registry = registry.lock().await;
    match registry.get(&conn_id) {
        Some(conn) => conn.respond(response).await,
        None => Err(Error::ConnectionClosed),
    }
}

#[derive(Deserialize)]
struct InitializeParams {
    #[serde(rename = "clientId")]
    client_id: String,
    #[serde(rename = "clientInfo", default)]
    #[allow(dead_code)]
    client_info: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct PatternParams {
    pattern: String,
}

#[derive(Deserialize)]
struct SendMessageParams {
    to: String,
    payload: serde_json::Value,
}

fn parse_params<T: serde::de::DeserializeOwned>(
    params: Option<serde_json::Value>,
) -> std::result::Result<T, bub_core::JsonRpcErrorData> {
    match params {
        Some(value) => serde_json::from_value(value)
            .map_err(|e| bub_core::JsonRpcErrorData::invalid_params(e.to_string())),
        None => Err(bub_core::JsonRpcErrorData::invalid_params(
            "Missing params",
        )),
    }
}

/// Process one request and build its response
pub(crate) async fn process_request(
    request: JsonRpcRequest,
    conn_id: u64,
    registry: &ConnectionRegistry,
    subscriptions: &SubscriptionTable,
) -> JsonRpcResponse {
    let id = request.id.clone();
    let method = request.method.as_str();

    // ping answers before initialize: liveness must not depend on session
    // state.
    if method == "ping" {
        return JsonRpcResponse::success(
            serde_json::json!({"ts": chrono::Utc::now().to_rfc3339()}),
            id,
        );
    }

    if method == "initialize" {
        return handle_initialize(request, conn_id, registry).await;
    }

    // Every other method requires a bound client id.
    let client_id = {
        let registry = registry.lock().await;
        registry.get(&conn_id).and_then(|c| c.client_id.clone())
    };
    let client_id = match client_id {
        Some(client_id) => client_id,
        None => {
            return JsonRpcResponse::error(bub_core::JsonRpcErrorData::not_initialized(), id)
        }
    };

    match method {
        "subscribe" => handle_subscribe(request, conn_id, subscriptions).await,
        "unsubscribe" => handle_unsubscribe(request, conn_id, subscriptions).await,
        "sendMessage" => {
            handle_send_message(request, &client_id, registry, subscriptions).await
        }
        other => JsonRpcResponse::error(
            bub_core::JsonRpcErrorData::method_not_found(other),
            id,
        ),
    }
}

async fn handle_initialize(
    request: JsonRpcRequest,
    conn_id: u64,
    registry: &ConnectionRegistry,
) -> JsonRpcResponse {
    let id = request.id.clone();
    let params: InitializeParams = match parse_params(request.params) {
        Ok(params) => params,
        Err(e) => return JsonRpcResponse::error(e, id),
    };

    let mut registry = registry.lock().await;
    let already_bound = registry
        .get(&conn_id)
        .map(|c| c.client_id.is_some())
        .unwrap_or(false);
    if already_bound {
        return JsonRpcResponse::error(
            bub_core::JsonRpcErrorData::already_initialized(),
            id,
        );
    }
    let in_use = registry.iter().any(|(other_id, c)| {
        *other_id != conn_id && c.client_id.as_deref() == Some(params.client_id.as_str())
    });
    if in_use {
        return JsonRpcResponse::error(
            bub_core::JsonRpcErrorData::client_in_use(params.client_id),
            id,
        );
    }
    if let Some(conn) = registry.get_mut(&conn_id) {
        conn.client_id = Some(params.client_id.clone());
    }
    drop(registry);

    tracing::info!(conn_id = conn_id, client_id = %params.client_id, "client initialized");
    JsonRpcResponse::success(
        serde_json::json!({
            "serverInfo": {
                "name": "bub-bus",
                "version": env!("CARGO_PKG_VERSION"),
            },
            "capabilities": {
                "subscriptions": true,
                "publish": true,
            },
        }),
        id,
    )
}

async fn handle_subscribe(
    request: JsonRpcRequest,
    conn_id: u64,
    subscriptions: &SubscriptionTable,
) -> JsonRpcResponse {
    let id = request.id.clone();
    let params: PatternParams = match parse_params(request.params) {
        Ok(params) => params,
        Err(e) => return JsonRpcResponse::error(e, id),
    };

    let pattern = match TopicPattern::parse(&params.pattern) {
        Ok(pattern) => pattern,
        Err(e) => {
            return JsonRpcResponse::error(
                bub_core::JsonRpcErrorData::invalid_params(format!(
                    "Invalid pattern '{}': {}",
                    params.pattern, e
                )),
                id,
            );
        }
    };

    let subscription_id = subscriptions.subscribe(conn_id, pattern).await;
    tracing::debug!(conn_id = conn_id, pattern = %params.pattern, subscription_id, "subscribed");
    JsonRpcResponse::success(
        serde_json::json!({"subscriptionId": subscription_id}),
        id,
    )
}

async fn handle_unsubscribe(
    request: JsonRpcRequest,
    conn_id: u64,
    subscriptions: &SubscriptionTable,
) -> JsonRpcResponse {
    let id = request.id.clone();
    let params: PatternParams = match parse_params(request.params) {
        Ok(params) => params,
        Err(e) => return JsonRpcResponse::error(e, id),
    };

    let removed = subscriptions.unsubscribe(conn_id, &params.pattern).await;
    tracing::debug!(conn_id = conn_id, pattern = %params.pattern, removed, "unsubscribed");
    JsonRpcResponse::success(serde_json::json!({}), id)
}

async fn handle_send_message(
    request: JsonRpcRequest,
    client_id: &str,
    registry: &ConnectionRegistry,
    subscriptions: &SubscriptionTable,
) -> JsonRpcResponse {
    let id = request.id.clone();
    let params: SendMessageParams = match parse_params(request.params) {
        Ok(params) => params,
        Err(e) => return JsonRpcResponse::error(e, id),
    };

    let delivered = deliver(
        registry,
        subscriptions,
        &params.to,
        &params.payload,
        client_id,
    )
    .await;

    // Zero recipients is a successful outcome, not an error.
    JsonRpcResponse::success(serde_json::json!({"delivered": delivered}), id)
}
