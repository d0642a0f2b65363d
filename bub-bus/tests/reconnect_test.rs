//! Reconnection across a server restart
//!
//! A client with auto-reconnect must come back from a server restart with
//! its identity and subscriptions restored, without any new `subscribe`
//! calls from user code.

use bub_bus::BusServer;
use bub_client::{BusClient, ConnectionState, FixedDelay};
use std::time::Duration;
use tokio::sync::mpsc;

async fn start_server_on(addr: std::net::SocketAddr) -> (std::net::SocketAddr, tokio::task::JoinHandle<()>) {
    let server = BusServer::builder().bind(addr).build().await.unwrap();
    let bound = server.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let _ = server.run().await;
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    (bound, handle)
}

#[tokio::test]
async fn test_reconnect_preserves_subscriptions() {
    let (addr, first_server) = start_server_on("127.0.0.1:0".parse().unwrap()).await;
    let url = format!("ws://{}", addr);

    let client = BusClient::builder(&url)
        .with_reconnect(FixedDelay::new(Duration::from_millis(100)))
        .connect()
        .await
        .unwrap();
    client.initialize("agent:sticky", None).await.unwrap();

    let (tx, mut rx) = mpsc::channel::<(String, serde_json::Value)>(4);
    client
        .subscribe("tg:*", move |topic, payload| {
            let tx = tx.clone();
            async move {
                let _ = tx.send((topic, payload)).await;
            }
        })
        .await
        .unwrap();

    // Server restart: kill the old instance, free the port, rebind it.
    first_server.abort();
    let _ = first_server.await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    let (_, second_server) = start_server_on(addr).await;

    // Wait for the client to notice and come back.
    let mut reconnected = false;
    for _ in 0..50 {
        if client.state().await == ConnectionState::Connected {
            reconnected = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(reconnected, "client did not reconnect");
    // Give the restored session a moment to finish resubscribing.
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Publish from a second client; the reconnected subscription must fire.
    let publisher = BusClient::connect(&url).await.unwrap();
    publisher.initialize("tg:publisher", None).await.unwrap();
    let delivered = publisher
        .send_message("tg:1", serde_json::json!({"alive": true}))
        .await
        .unwrap();
    assert_eq!(delivered, 1);

    let (topic, payload) = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(topic, "tg:1");
    assert_eq!(payload["alive"], true);

    client.disconnect().await;
    publisher.disconnect().await;
    second_server.abort();
}

#[tokio::test]
async fn test_no_reconnect_closes_client() {
    let (addr, server) = start_server_on("127.0.0.1:0".parse().unwrap()).await;
    let url = format!("ws://{}", addr);

    let client = BusClient::connect(&url).await.unwrap();
    client.initialize("agent:oneshot", None).await.unwrap();

    server.abort();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(client.state().await, ConnectionState::Closed);
    let err = client
        .send_message("tg:1", serde_json::json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, bub_core::Error::ConnectionClosed));
}
