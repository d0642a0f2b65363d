//! Bus client
//!
//! [`BusClient`] is the typed façade over the bus wire protocol. It manages
//! the WebSocket connection, correlates requests with responses, dispatches
//! `deliverMessage` notifications to pattern-keyed local handlers, and
//! (when enabled) reconnects transparently after transport loss.
//!
//! # Lifecycle
//!
//! 1. **Connect**: `BusClient::connect(url)` or the builder
//! 2. **Initialize**: `initialize(client_id, client_info)` binds the client
//!    id; the client remembers it for reconnects
//! 3. **Use**: `subscribe`, `send_message`, `ping`, and the
//!    inbound/outbound convenience wrappers
//! 4. **Disconnect**: `disconnect()` fails outstanding requests with
//!    `cancelled`
//!
//! # Reconnection
//!
//! With a strategy configured, transport loss puts the client into a
//! reconnecting state. Each successful reconnect re-sends `initialize` with
//! the remembered client id and re-subscribes every locally-registered
//! pattern before releasing queued user traffic. Sends attempted while
//! reconnecting queue up to a bound; overflow fails fast with
//! `backpressure`.
//!
//! The client is cheaply cloneable; clones share the connection and state.

use crate::handlers::HandlerRegistry;
use crate::reconnect::ReconnectionStrategy;
use crate::request::RequestManager;
use bub_core::{
    codec, inbound_topic, outbound_topic, Error, InboundMessage, JsonRpcMessage, JsonRpcRequest,
    MessageEnvelope, OutboundMessage, Result,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type WsSink =
    futures::stream::SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = futures::stream::SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;
type SharedStrategy = Arc<Mutex<Box<dyn ReconnectionStrategy>>>;

/// Default deadline for a single request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on sends queued while reconnecting
pub const DEFAULT_SEND_QUEUE_CAPACITY: usize = 64;

/// Client connection state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connected and ready
    Connected,
    /// Transport lost; reconnect attempts in progress
    Reconnecting {
        /// Current attempt number (0-indexed)
        attempt: u32,
    },
    /// Closed for good (explicit disconnect or strategy gave up)
    Closed,
}

#[derive(Clone)]
struct Identity {
    client_id: String,
    client_info: Option<serde_json::Value>,
}

/// Server identification returned by `initialize`
#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    /// Server name
    pub name: String,
    /// Server version
    pub version: String,
}

/// Result of `initialize`
#[derive(Debug, Clone, Deserialize)]
pub struct InitializeResult {
    /// Server identification
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
    /// Server capability flags
    #[serde(default)]
    pub capabilities: serde_json::Value,
}

#[derive(Deserialize)]
struct SubscribeResult {
    #[serde(rename = "subscriptionId")]
    subscription_id: u64,
}

#[derive(Deserialize)]
struct SendMessageResult {
    delivered: u64,
}

#[derive(Deserialize)]
struct PingResult {
    ts: String,
}

/// Typed bus client over WebSocket
#[derive(Clone)]
pub struct BusClient {
    sender: Arc<Mutex<WsSink>>,
    requests: RequestManager,
    handlers: HandlerRegistry,
    identity: Arc<Mutex<Option<Identity>>>,
    subscribed: Arc<Mutex<Vec<String>>>,
    state: Arc<Mutex<ConnectionState>>,
    pending_sends: Arc<Mutex<VecDeque<String>>>,
    send_queue_capacity: usize,
    request_timeout: Duration,
}

/// Builder for configuring a [`BusClient`]
pub struct ClientBuilder {
    url: String,
    reconnect: Option<Box<dyn ReconnectionStrategy>>,
    request_timeout: Duration,
    send_queue_capacity: usize,
}

impl ClientBuilder {
    /// Start building a client for `url`
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            send_queue_capacity: DEFAULT_SEND_QUEUE_CAPACITY,
        }
    }

    /// Enable auto-reconnect with the given strategy
    pub fn with_reconnect(mut self, strategy: impl ReconnectionStrategy + 'static) -> Self {
        self.reconnect = Some(Box::new(strategy));
        self
    }

    /// Enable auto-reconnect with the default exponential backoff
    pub fn with_default_reconnect(mut self) -> Self {
        self.reconnect = Some(Box::new(crate::reconnect::ExponentialBackoff::default()));
        self
    }

    /// Per-request deadline (default 30s)
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Bound on sends queued while reconnecting (default 64)
    pub fn send_queue_capacity(mut self, capacity: usize) -> Self {
        self.send_queue_capacity = capacity.max(1);
        self
    }

    /// Open the transport and start the reader task
    pub async fn connect(self) -> Result<BusClient> {
        let (ws_stream, _) = connect_async(&self.url)
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        let (sender, receiver) = ws_stream.split();

        let client = BusClient {
            sender: Arc::new(Mutex::new(sender)),
            requests: RequestManager::new(),
            handlers: HandlerRegistry::new(),
            identity: Arc::new(Mutex::new(None)),
            subscribed: Arc::new(Mutex::new(Vec::new())),
            state: Arc::new(Mutex::new(ConnectionState::Connected)),
            pending_sends: Arc::new(Mutex::new(VecDeque::new())),
            send_queue_capacity: self.send_queue_capacity,
            request_timeout: self.request_timeout,
        };

        let strategy: Option<SharedStrategy> =
            self.reconnect.map(|s| Arc::new(Mutex::new(s)));

        tokio::spawn(BusClient::receive_loop(
            receiver,
            client.clone(),
            strategy,
            self.url,
        ));

        tracing::info!("bus client connected");
        Ok(client)
    }
}

impl BusClient {
    /// Connect without auto-reconnect; use [`ClientBuilder`] for more
    pub async fn connect(url: &str) -> Result<Self> {
        ClientBuilder::new(url).connect().await
    }

    /// Start building a client
    pub fn builder(url: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(url)
    }

    /// Current connection state
    pub async fn state(&self) -> ConnectionState {
        self.state.lock().await.clone()
    }

    /// True while the transport is up
    pub async fn is_connected(&self) -> bool {
        matches!(self.state().await, ConnectionState::Connected)
    }

    /// The client id bound by `initialize`, if any
    pub async fn client_id(&self) -> Option<String> {
        self.identity.lock().await.as_ref().map(|i| i.client_id.clone())
    }

    /// Bind a client id to this connection
    ///
    /// The id and info are remembered and re-sent on every reconnect.
    pub async fn initialize(
        &self,
        client_id: impl Into<String>,
        client_info: Option<serde_json::Value>,
    ) -> Result<InitializeResult> {
        let client_id = client_id.into();
        let params = initialize_params(&client_id, &client_info);
        let result: InitializeResult = self.request("initialize", params).await?;
        *self.identity.lock().await = Some(Identity {
            client_id,
            client_info,
        });
        Ok(result)
    }

    /// Subscribe to a pattern and register a handler for its deliveries
    ///
    /// The handler receives the delivered topic and payload. Returns the
    /// server-assigned subscription id.
    pub async fn subscribe<F, Fut>(&self, pattern: &str, handler: F) -> Result<u64>
    where
        F: Fn(String, serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.handlers.register(pattern, handler).await?;

        let result: Result<SubscribeResult> = self
            .request("subscribe", serde_json::json!({"pattern": pattern}))
            .await;
        match result {
            Ok(result) => {
                let mut subscribed = self.subscribed.lock().await;
                if !subscribed.iter().any(|p| p == pattern) {
                    subscribed.push(pattern.to_string());
                }
                Ok(result.subscription_id)
            }
            Err(e) => {
                self.handlers.unregister(pattern).await;
                Err(e)
            }
        }
    }

    /// Remove one subscription and its local handler
    pub async fn unsubscribe(&self, pattern: &str) -> Result<()> {
        let _: serde_json::Value = self
            .request("unsubscribe", serde_json::json!({"pattern": pattern}))
            .await?;
        self.handlers.unregister(pattern).await;
        self.subscribed.lock().await.retain(|p| p != pattern);
        Ok(())
    }

    /// Send a payload to a topic; returns how many subscribers received it
    pub async fn send_message(
        &self,
        to: impl AsRef<str>,
        payload: serde_json::Value,
    ) -> Result<u64> {
        let result: SendMessageResult = self
            .request(
                "sendMessage",
                serde_json::json!({"to": to.as_ref(), "payload": payload}),
            )
            .await?;
        Ok(result.delivered)
    }

    /// Liveness check; returns the server timestamp
    pub async fn ping(&self) -> Result<String> {
        let result: PingResult = self.request("ping", serde_json::json!({})).await?;
        Ok(result.ts)
    }

    /// Publish an inbound message on its conventional topic
    /// (`inbound:<chat_id>`)
    pub async fn publish_inbound(&self, message: &InboundMessage) -> Result<u64> {
        self.send_message(
            inbound_topic(&message.chat_id),
            message.to_envelope().to_value(),
        )
        .await
    }

    /// Publish an outbound message on its conventional topic
    /// (`outbound:<chat_id>`)
    pub async fn publish_outbound(&self, message: &OutboundMessage) -> Result<u64> {
        let from = self
            .client_id()
            .await
            .unwrap_or_else(|| "agent".to_string());
        self.send_message(
            outbound_topic(&message.chat_id),
            message.to_envelope(from).to_value(),
        )
        .await
    }

    /// Subscribe to all inbound traffic, decoding envelopes into
    /// [`InboundMessage`] events
    pub async fn on_inbound<F, Fut>(&self, handler: F) -> Result<u64>
    where
        F: Fn(InboundMessage) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.subscribe("inbound:*", move |topic, payload| {
            let decoded = MessageEnvelope::from_value(payload)
                .as_ref()
                .and_then(InboundMessage::from_envelope);
            let fut = decoded.map(|message| handler(message));
            async move {
                if let Some(fut) = fut {
                    fut.await;
                } else {
                    tracing::debug!(topic = %topic, "inbound delivery was not a tg_message envelope");
                }
            }
        })
        .await
    }

    /// Subscribe to all outbound traffic, decoding envelopes into
    /// [`OutboundMessage`] events
    pub async fn on_outbound<F, Fut>(&self, handler: F) -> Result<u64>
    where
        F: Fn(OutboundMessage) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.subscribe("outbound:*", move |topic, payload| {
            let decoded = MessageEnvelope::from_value(payload)
                .as_ref()
                .and_then(OutboundMessage::from_envelope);
            let fut = decoded.map(|message| handler(message));
            async move {
                if let Some(fut) = fut {
                    fut.await;
                } else {
                    tracing::debug!(topic = %topic, "outbound delivery was not a tg_reply envelope");
                }
            }
        })
        .await
    }

    /// Close the transport; outstanding requests fail with `cancelled`
    pub async fn disconnect(&self) {
        *self.state.lock().await = ConnectionState::Closed;
        {
            let mut sender = self.sender.lock().await;
            let _ = sender.send(Message::Close(None)).await;
            let _ = sender.close().await;
        }
        self.requests.fail_all(Error::Cancelled).await;
        tracing::info!("bus client disconnected");
    }

    /// Send a request and await its correlated, deserialized response
    #[tracing::instrument(skip(self, params), fields(method = %method.as_ref()))]
    pub async fn request<P, R>(
        &self,
        method: impl Into<String> + AsRef<str>,
        params: P,
    ) -> Result<R>
    where
        P: serde::Serialize,
        R: serde::de::DeserializeOwned,
    {
        let method = method.into();
        let params_value =
            serde_json::to_value(params).map_err(|e| Error::Serialization(e.to_string()))?;

        let id = self.requests.next_id().await;
        let request = JsonRpcRequest::new(method.clone(), Some(params_value), id.clone());
        let rx = self.requests.register(id.clone()).await;

        let frame = codec::encode_request(&request)?;
        if let Err(e) = self.send_frame(frame).await {
            self.requests.abandon(&id).await;
            return Err(e);
        }

        let response = match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(result)) => result?,
            Ok(Err(_)) => {
                return Err(Error::Internal("request channel closed".to_string()));
            }
            Err(_) => {
                self.requests.abandon(&id).await;
                tracing::warn!(method = %method, "request timed out");
                return Err(Error::Timeout);
            }
        };

        if let Some(error) = response.error {
            tracing::debug!(method = %method, error = %error, "request failed");
            return Err(Error::JsonRpc(error));
        }
        let result = response
            .result
            .ok_or_else(|| Error::Internal("response missing result".to_string()))?;
        serde_json::from_value(result).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Write a frame, or queue it while reconnecting
    async fn send_frame(&self, frame: String) -> Result<()> {
        let state = self.state.lock().await.clone();
        match state {
            ConnectionState::Connected => self
                .sender
                .lock()
                .await
                .send(Message::Text(frame))
                .await
                .map_err(|e| Error::Transport(e.to_string())),
            ConnectionState::Reconnecting { .. } => {
                let mut pending = self.pending_sends.lock().await;
                if pending.len() >= self.send_queue_capacity {
                    return Err(Error::Backpressure);
                }
                pending.push_back(frame);
                Ok(())
            }
            ConnectionState::Closed => Err(Error::ConnectionClosed),
        }
    }

    /// Reader task: drain frames, and reconnect on transport loss when a
    /// strategy is configured
    async fn receive_loop(
        mut receiver: WsSource,
        client: BusClient,
        strategy: Option<SharedStrategy>,
        url: String,
    ) {
        loop {
            while let Some(message) = receiver.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        client.handle_frame(&text).await;
                    }
                    Ok(Message::Close(_)) => {
                        tracing::info!("connection closed by server");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "websocket error");
                        break;
                    }
                }
            }

            if matches!(*client.state.lock().await, ConnectionState::Closed) {
                // Deliberate disconnect; nothing to recover.
                client.requests.fail_all(Error::Cancelled).await;
                return;
            }

            let strategy = match &strategy {
                Some(strategy) => strategy,
                None => {
                    *client.state.lock().await = ConnectionState::Closed;
                    client.requests.fail_all(Error::ConnectionClosed).await;
                    return;
                }
            };

            // Requests in flight on the dropped connection cannot complete.
            client.requests.fail_all(Error::ConnectionClosed).await;
            *client.state.lock().await = ConnectionState::Reconnecting { attempt: 0 };

            let mut attempt: u32 = 0;
            receiver = loop {
                let delay = strategy.lock().await.next_delay(attempt);
                let delay = match delay {
                    Some(delay) => delay,
                    None => {
                        tracing::error!("reconnection abandoned");
                        *client.state.lock().await = ConnectionState::Closed;
                        client.requests.fail_all(Error::ConnectionClosed).await;
                        return;
                    }
                };

                tracing::info!(
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    "reconnecting"
                );
                tokio::time::sleep(delay).await;

                match connect_async(&url).await {
                    Ok((ws_stream, _)) => {
                        let (new_sender, new_receiver) = ws_stream.split();
                        *client.sender.lock().await = new_sender;
                        client.restore_session().await;
                        strategy.lock().await.reset();
                        *client.state.lock().await = ConnectionState::Connected;
                        tracing::info!("reconnected");
                        break new_receiver;
                    }
                    Err(e) => {
                        tracing::warn!(attempt = attempt, error = %e, "reconnect failed");
                        attempt += 1;
                        *client.state.lock().await =
                            ConnectionState::Reconnecting { attempt };
                    }
                }
            };
        }
    }

    /// Re-send `initialize` and every subscription, then flush queued sends
    ///
    /// Frames are written in order on a fresh connection: identity first,
    /// subscriptions next, queued user traffic last. The server processes
    /// frames in order, so subscriptions are live before queued sends run.
    async fn restore_session(&self) {
        let identity = self.identity.lock().await.clone();
        if let Some(identity) = identity {
            let id = self.requests.next_id().await;
            let params = initialize_params(&identity.client_id, &identity.client_info);
            let request = JsonRpcRequest::new("initialize", Some(params), id);
            self.write_direct(&request).await;
        }

        let patterns: Vec<String> = self.subscribed.lock().await.clone();
        for pattern in patterns {
            tracing::info!(pattern = %pattern, "resubscribing");
            let id = self.requests.next_id().await;
            let request = JsonRpcRequest::new(
                "subscribe",
                Some(serde_json::json!({"pattern": pattern})),
                id,
            );
            self.write_direct(&request).await;
        }

        let queued: Vec<String> = {
            let mut pending = self.pending_sends.lock().await;
            pending.drain(..).collect()
        };
        for frame in queued {
            let _ = self.sender.lock().await.send(Message::Text(frame)).await;
        }
    }

    async fn write_direct(&self, request: &JsonRpcRequest) {
        if let Ok(frame) = codec::encode_request(request) {
            let _ = self.sender.lock().await.send(Message::Text(frame)).await;
        }
    }

    /// Handle one incoming frame
    async fn handle_frame(&self, text: &str) {
        let message = match codec::decode(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::error!(error = %e, "undecodable frame");
                return;
            }
        };

        match message {
            JsonRpcMessage::Response(response) => {
                let id = response.id.clone();
                self.requests.complete(&id, response).await;
            }
            JsonRpcMessage::Notification(notification) => {
                if notification.method == "deliverMessage" {
                    let params = notification.params.unwrap_or(serde_json::Value::Null);
                    let topic = params
                        .get("topic")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string();
                    let payload = params
                        .get("payload")
                        .cloned()
                        .unwrap_or(serde_json::Value::Null);
                    self.handlers.dispatch(&topic, payload).await;
                } else {
                    tracing::debug!(method = %notification.method, "unhandled notification");
                }
            }
            JsonRpcMessage::Request(_) => {
                tracing::warn!("ignoring unexpected request frame");
            }
        }
    }
}

fn initialize_params(
    client_id: &str,
    client_info: &Option<serde_json::Value>,
) -> serde_json::Value {
    let mut params = serde_json::Map::new();
    params.insert(
        "clientId".to_string(),
        serde_json::Value::String(client_id.to_string()),
    );
    if let Some(info) = client_info {
        params.insert("clientInfo".to_string(), info.clone());
    }
    serde_json::Value::Object(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_params_shape() {
        let params = initialize_params("tg:42", &None);
        assert_eq!(params["clientId"], "tg:42");
        assert!(params.get("clientInfo").is_none());

        let params = initialize_params("tg:42", &Some(serde_json::json!({"v": 1})));
        assert_eq!(params["clientInfo"]["v"], 1);
    }

    #[test]
    fn test_result_shapes_deserialize() {
        let init: InitializeResult = serde_json::from_value(serde_json::json!({
            "serverInfo": {"name": "bub-bus", "version": "0.1.0"},
            "capabilities": {"subscriptions": true},
        }))
        .unwrap();
        assert_eq!(init.server_info.name, "bub-bus");

        let sub: SubscribeResult =
            serde_json::from_value(serde_json::json!({"subscriptionId": 3})).unwrap();
        assert_eq!(sub.subscription_id, 3);

        let sent: SendMessageResult =
            serde_json::from_value(serde_json::json!({"delivered": 0})).unwrap();
        assert_eq!(sent.delivered, 0);
    }
}
