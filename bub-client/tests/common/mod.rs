//! Mock bus server for client integration tests
//!
//! A lightweight WebSocket endpoint that answers protocol requests from a
//! scripted handler, so client behavior can be tested without a full bus
//! server. The handler receives each text frame and returns the frames to
//! send back (possibly none, possibly several).

use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// Scripted WebSocket server
pub struct MockBusServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    frame_rx: mpsc::Receiver<String>,
}

impl MockBusServer {
    /// Start a mock answering with the default protocol responses
    pub async fn start() -> Self {
        Self::with_handler(default_responder).await
    }

    /// Start a mock with a custom frame handler
    pub async fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(String) -> Vec<String> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handler = Arc::new(handler);

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let (frame_tx, frame_rx) = mpsc::channel::<String>(64);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    accepted = listener.accept() => {
                        let Ok((stream, _)) = accepted else { break };
                        let handler = Arc::clone(&handler);
                        let frame_tx = frame_tx.clone();
                        tokio::spawn(async move {
                            let Ok(ws) = accept_async(stream).await else { return };
                            let (mut write, mut read) = ws.split();
                            while let Some(Ok(message)) = read.next().await {
                                if let Message::Text(text) = message {
                                    let _ = frame_tx.send(text.clone()).await;
                                    for response in handler(text) {
                                        if write.send(Message::Text(response)).await.is_err() {
                                            return;
                                        }
                                    }
                                }
                            }
                        });
                    }
                }
            }
        });

        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        Self {
            addr,
            shutdown_tx,
            frame_rx,
        }
    }

    /// WebSocket URL for connecting to this mock
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Next frame the mock received, or `None` on timeout
    pub async fn next_frame(&mut self) -> Option<String> {
        tokio::time::timeout(
            tokio::time::Duration::from_secs(2),
            self.frame_rx.recv(),
        )
        .await
        .ok()
        .flatten()
    }

    /// Stop accepting connections
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
    }
}

/// Answer protocol requests the way a real bus would
pub fn default_responder(frame: String) -> Vec<String> {
    let Ok(request) = serde_json::from_str::<serde_json::Value>(&frame) else {
        return Vec::new();
    };
    let Some(id) = request.get("id").cloned() else {
        return Vec::new(); // notification, no response
    };
    let method = request["method"].as_str().unwrap_or_default();

    let result = match method {
        "initialize" => serde_json::json!({
            "serverInfo": {"name": "mock-bus", "version": "0.0.0"},
            "capabilities": {"subscriptions": true, "publish": true},
        }),
        "subscribe" => serde_json::json!({"subscriptionId": 1}),
        "unsubscribe" => serde_json::json!({}),
        "sendMessage" => serde_json::json!({"delivered": 0}),
        "ping" => serde_json::json!({"ts": "2026-02-17T00:00:00Z"}),
        _ => {
            return vec![serde_json::json!({
                "jsonrpc": "2.0",
                "error": {"code": -32601, "message": "Method not found"},
                "id": id,
            })
            .to_string()]
        }
    };

    vec![serde_json::json!({"jsonrpc": "2.0", "result": result, "id": id}).to_string()]
}

/// Build a `deliverMessage` notification frame
pub fn deliver_frame(topic: &str, payload: serde_json::Value) -> String {
    serde_json::json!({
        "jsonrpc": "2.0",
        "method": "deliverMessage",
        "params": {
            "topic": topic,
            "payload": payload,
            "messageId": "msg_mock",
            "from": "mock",
        },
    })
    .to_string()
}
