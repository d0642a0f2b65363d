//! Full client-server routing tests

use bub_bus::BusServer;
use bub_client::BusClient;
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

#[tokio::test]
async fn test_echo_via_bus() {
    let (url, server) = start_server().await;

    // Client A: the agent side, listening on all inbound traffic.
    let agent = BusClient::connect(&url).await.unwrap();
    agent.initialize("agent:echo", None).await.unwrap();

    let (tx, mut rx) = mpsc::channel::<(String, serde_json::Value)>(8);
    agent
        .subscribe("inbound:*", move |topic, payload| {
            let tx = tx.clone();
            async move {
                let _ = tx.send((topic, payload)).await;
            }
        })
        .await
        .unwrap();

    // Client B: the channel side, sending one user message.
    let channel = BusClient::connect(&url).await.unwrap();
    channel.initialize("tg:42", None).await.unwrap();

    let payload = serde_json::json!({
        "messageId": "msg_echo_1",
        "type": "tg_message",
        "from": "tg:42",
        "timestamp": "2026-02-17T00:00:00Z",
        "content": {"text": "hi", "channel": "telegram", "chatId": "42", "senderId": "7"},
    });
    let delivered = channel
        .send_message("inbound:42", payload)
        .await
        .unwrap();
    assert_eq!(delivered, 1);

    let (topic, received) = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(topic, "inbound:42");
    assert_eq!(received["content"]["text"], "hi");

    // Exactly one delivery.
    assert!(
        tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .is_err()
    );

    agent.disconnect().await;
    channel.disconnect().await;
    server.abort();
}

#[tokio::test]
async fn test_send_with_no_subscribers_delivers_zero() {
    let (url, server) = start_server().await;

    let client = BusClient::connect(&url).await.unwrap();
    client.initialize("tg:1", None).await.unwrap();

    let delivered = client
        .send_message("inbound:nobody", serde_json::json!({"x": 1}))
        .await
        .unwrap();
    assert_eq!(delivered, 0);

    client.disconnect().await;
    server.abort();
}

#[tokio::test]
async fn test_fanout_to_multiple_subscribers() {
    let (url, server) = start_server().await;

    let mut receivers = Vec::new();
    let mut clients = Vec::new();
    for n in 0..3 {
        let client = BusClient::connect(&url).await.unwrap();
        client
            .initialize(format!("agent:fan:{}", n), None)
            .await
            .unwrap();
        let (tx, rx) = mpsc::channel::<String>(4);
        client
            .subscribe("tg:*", move |topic, _payload| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(topic).await;
                }
            })
            .await
            .unwrap();
        receivers.push(rx);
        clients.push(client);
    }

    let sender = BusClient::connect(&url).await.unwrap();
    sender.initialize("tg:99", None).await.unwrap();
    let delivered = sender
        .send_message("tg:1", serde_json::json!({"n": 1}))
        .await
        .unwrap();
    assert_eq!(delivered, 3);

    for rx in receivers.iter_mut() {
        let topic = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(topic, "tg:1");
    }

    for client in clients {
        client.disconnect().await;
    }
    sender.disconnect().await;
    server.abort();
}

#[tokio::test]
async fn test_ping_returns_timestamp() {
    let (url, server) = start_server().await;

    let client = BusClient::connect(&url).await.unwrap();
    let ts = client.ping().await.unwrap();
    assert!(!ts.is_empty());

    client.disconnect().await;
    server.abort();
}

#[tokio::test]
async fn test_unsubscribe_stops_delivery() {
    let (url, server) = start_server().await;

    let listener = BusClient::connect(&url).await.unwrap();
    listener.initialize("agent:listener", None).await.unwrap();

    let (tx, mut rx) = mpsc::channel::<String>(4);
    listener
        .subscribe("outbound:*", move |topic, _| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(topic).await;
            }
        })
        .await
        .unwrap();

    let sender = BusClient::connect(&url).await.unwrap();
    sender.initialize("agent:sender", None).await.unwrap();

    assert_eq!(
        sender
            .send_message("outbound:1", serde_json::json!({}))
            .await
            .unwrap(),
        1
    );
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();

    listener.unsubscribe("outbound:*").await.unwrap();
    assert_eq!(
        sender
            .send_message("outbound:1", serde_json::json!({}))
            .await
            .unwrap(),
        0
    );

    listener.disconnect().await;
    sender.disconnect().await;
    server.abort();
}

#[tokio::test]
async fn test_disconnect_publishes_system_event() {
    let (url, server) = start_server().await;

    let watcher = BusClient::connect(&url).await.unwrap();
    watcher.initialize("agent:watcher", None).await.unwrap();

    let (tx, mut rx) = mpsc::channel::<serde_json::Value>(4);
    watcher
        .subscribe("system:disconnect", move |_topic, payload| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(payload).await;
            }
        })
        .await
        .unwrap();

    let ephemeral = BusClient::connect(&url).await.unwrap();
    ephemeral.initialize("tg:gone", None).await.unwrap();
    ephemeral.disconnect().await;

    let payload = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payload["clientId"], "tg:gone");

    watcher.disconnect().await;
    server.abort();
}
