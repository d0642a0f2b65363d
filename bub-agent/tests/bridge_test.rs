//! Bridge end-to-end over a real bus
//!
//! Channel adapter → bus → bridge → session runtime → bus → channel
//! adapter, with a scripted model standing in for the provider.

use bub_agent::config::AgentSettings;
use bub_agent::bridge::ChannelBridge;
use bub_agent::model::ScriptedModel;
use bub_agent::runtime::Supervisor;
use bub_agent::tape::FileTapeStore;
use bub_agent::tools::ToolRegistry;
use bub_bus::BusServer;
use bub_client::BusClient;
use bub_core::{InboundMessage, MessageEnvelope, OutboundMessage, PayloadBody, SpawnRequestContent};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

async fn start_server() -> (String, tokio::task::JoinHandle<()>) {
    let addr: std::net::SocketAddr = "127.0.0.1:0".parse().unwrap();
    let server = BusServer::builder().bind(addr).build().await.unwrap();
    let server_addr = server.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let _ = server.run().await;
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    (format!("ws://{}", server_addr), handle)
}

async fn start_bridge(
    url: &str,
    model: ScriptedModel,
) -> (tempfile::TempDir, Arc<Supervisor>, ChannelBridge) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileTapeStore::open(dir.path()).unwrap());
    let supervisor = Supervisor::new(
        store,
        Arc::new(model),
        Arc::new(ToolRegistry::new()),
        AgentSettings::default(),
    );
    let client = BusClient::connect(url).await.unwrap();
    let bridge = ChannelBridge::new(client, Arc::clone(&supervisor), "agent:bub");
    bridge.start().await.unwrap();
    (dir, supervisor, bridge)
}

fn inbound(text: &str) -> InboundMessage {
    InboundMessage {
        channel: "telegram".to_string(),
        sender_id: "7".to_string(),
        chat_id: "42".to_string(),
        content: text.to_string(),
        metadata: BTreeMap::new(),
    }
}

#[tokio::test]
async fn test_inbound_to_outbound_round_trip() {
    let (url, server) = start_server().await;

    let model = ScriptedModel::new();
    model.push_text("pong");
    let (_dir, supervisor, bridge) = start_bridge(&url, model).await;

    // The channel adapter side: publishes inbound, listens on outbound.
    let channel = BusClient::connect(&url).await.unwrap();
    channel.initialize("tg:42", None).await.unwrap();

    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(4);
    channel
        .on_outbound(move |message| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(message).await;
            }
        })
        .await
        .unwrap();

    let delivered = channel.publish_inbound(&inbound("ping")).await.unwrap();
    assert_eq!(delivered, 1);

    let reply = tokio::time::timeout(Duration::from_secs(3), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply.content, "pong");
    assert_eq!(reply.chat_id, "42");
    assert_eq!(reply.channel, "telegram");

    // The session was created under its "<channel>:<chat>" id.
    assert_eq!(supervisor.session_ids().await, vec!["telegram:42"]);

    channel.disconnect().await;
    bridge.stop().await;
    server.abort();
}

#[tokio::test]
async fn test_group_message_without_addressing_is_dropped() {
    let (url, server) = start_server().await;

    let model = ScriptedModel::new();
    model.push_text("should never be used");
    let (_dir, supervisor, bridge) = start_bridge(&url, model).await;

    let channel = BusClient::connect(&url).await.unwrap();
    channel.initialize("tg:42", None).await.unwrap();

    let mut message = inbound("background chatter");
    message
        .metadata
        .insert("chat_type".to_string(), serde_json::json!("group"));
    channel.publish_inbound(&message).await.unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(supervisor.session_ids().await.is_empty());

    channel.disconnect().await;
    bridge.stop().await;
    server.abort();
}

#[tokio::test]
async fn test_spawn_request_creates_session_and_replies() {
    let (url, server) = start_server().await;

    let (_dir, supervisor, bridge) = start_bridge(&url, ScriptedModel::new()).await;

    let requester = BusClient::connect(&url).await.unwrap();
    requester.initialize("probe-client", None).await.unwrap();

    let (tx, mut rx) = mpsc::channel::<serde_json::Value>(4);
    requester
        .subscribe("tg:probe123", move |_topic, payload| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(payload).await;
            }
        })
        .await
        .unwrap();

    let request = MessageEnvelope::new(
        "tg:probe123",
        PayloadBody::SpawnRequest(SpawnRequestContent {
            chat_id: "probe123".to_string(),
            channel: "telegram".to_string(),
        }),
    );
    requester
        .send_message("system:spawn", request.to_value())
        .await
        .unwrap();

    let payload = tokio::time::timeout(Duration::from_secs(3), rx.recv())
        .await
        .unwrap()
        .unwrap();
    let envelope = MessageEnvelope::from_value(payload).unwrap();
    match envelope.body() {
        PayloadBody::SpawnResult(content) => {
            assert!(content.success);
            assert_eq!(content.client_id.as_deref(), Some("telegram:probe123"));
        }
        other => panic!("expected spawn_result, got {:?}", other),
    }
    assert_eq!(supervisor.session_ids().await, vec!["telegram:probe123"]);

    requester.disconnect().await;
    bridge.stop().await;
    server.abort();
}

#[tokio::test]
async fn test_busy_session_queues_in_arrival_order() {
    let (url, server) = start_server().await;

    let model = ScriptedModel::new();
    model.push_text("reply one");
    model.push_text("reply two");
    let (_dir, supervisor, bridge) = start_bridge(&url, model).await;

    let channel = BusClient::connect(&url).await.unwrap();
    channel.initialize("tg:42", None).await.unwrap();

    channel.publish_inbound(&inbound("one")).await.unwrap();
    channel.publish_inbound(&inbound("two")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    let session = supervisor.session("telegram:42").await.unwrap();
    let entries = session.tape().read_all().unwrap();
    let user_prompts: Vec<String> = entries
        .iter()
        .filter(|e| {
            e.kind == bub_agent::tape::EntryKind::Message
                && e.payload["role"] == "user"
        })
        .map(|e| e.payload["content"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(user_prompts.len(), 2);
    assert!(user_prompts[0].contains("\"one\""));
    assert!(user_prompts[1].contains("\"two\""));

    channel.disconnect().await;
    bridge.stop().await;
    server.abort();
}
