// End-to-end test for the relay over real WebSocket connections:
// handshake auth gate, delivery between two live clients, and retry
// absorption.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream};

use pulse_relay::auth::token::{Claims, TokenManager};
use pulse_relay::auth::user::UserProfile;
use pulse_relay::core::dedup::{DedupCache, MemoryDedupStore};
use pulse_relay::core::event_handler::EventRouter;
use pulse_relay::core::fanout::Notifier;
use pulse_relay::core::rate_limit::{MemoryRateLimitStore, RateLimiter};
use pulse_relay::core::registry::ConnectionRegistry;
use pulse_relay::core::server::RealtimeServer;
use pulse_relay::handlers::websocket::relay_routes;
use pulse_relay::storage::memory::{
    InMemoryMessageStore, InMemoryNotificationStore, InMemoryUserDirectory, LogPushSink,
};

const TEST_SECRET: &str = "integration-te5t-5ecret-never-used-in-production";

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Boot the relay on an ephemeral port and return its address
async fn start_server() -> (SocketAddr, Arc<TokenManager>) {
    let directory = Arc::new(InMemoryUserDirectory::new());
    directory.insert(UserProfile::new("alice".to_string(), "Alice".to_string()));
    directory.insert(UserProfile::new("bob".to_string(), "Bob".to_string()));

    let registry = Arc::new(ConnectionRegistry::new(directory));
    let notifier = Notifier::new(
        registry.clone(),
        Arc::new(InMemoryNotificationStore::new()),
        Arc::new(LogPushSink::new()),
    );
    let server = Arc::new(RealtimeServer::new(
        registry,
        Arc::new(RateLimiter::new(Arc::new(MemoryRateLimitStore::new()))),
        Arc::new(DedupCache::new(Arc::new(MemoryDedupStore::new()))),
        Arc::new(InMemoryMessageStore::new()),
        notifier,
    ));
    let router = Arc::new(EventRouter::new(server.clone()));
    let tokens = Arc::new(TokenManager::new(TEST_SECRET));

    let routes = relay_routes(tokens.clone(), server, router);
    let (addr, fut) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(fut);

    (addr, tokens)
}

async fn ws_connect(addr: SocketAddr, tokens: &TokenManager, identity: &str) -> WsClient {
    let claims = Claims::new(identity.to_string(), format!("sess-{}", identity));
    let token = tokens.generate_token(&claims).unwrap();
    let url = format!("ws://{}/ws?token={}", addr, token);

    let (ws, _) = tokio::time::timeout(Duration::from_secs(5), connect_async(url))
        .await
        .expect("connection timeout")
        .expect("failed to connect");
    ws
}

/// Read frames until one of the wanted type arrives
async fn next_event(ws: &mut WsClient, wanted: &str) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(3), ws.next())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for '{}' event", wanted))
            .unwrap_or_else(|| panic!("stream ended waiting for '{}' event", wanted))
            .expect("websocket error");

        let text = match msg.into_text() {
            Ok(text) if !text.is_empty() => text,
            _ => continue,
        };
        let value: Value = serde_json::from_str(&text).expect("frame is not JSON");
        if value["type"] == wanted {
            return value;
        }
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let (addr, _tokens) = start_server().await;

    let response = reqwest::Client::new()
        .get(format!("http://{}/health", addr))
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .expect("health request failed");

    assert!(response.status().is_success());
    assert_eq!(response.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_connection_without_token_is_rejected() {
    let (addr, _tokens) = start_server().await;

    let url = format!("ws://{}/ws", addr);
    let (mut ws, _) = connect_async(url).await.expect("upgrade should succeed");

    let rejection = next_event(&mut ws, "error").await;
    assert_eq!(rejection["code"], "unauthorized");

    // Nothing else arrives; the server closes the socket
    let next = tokio::time::timeout(Duration::from_secs(3), ws.next()).await;
    match next {
        Ok(None) => {}
        Ok(Some(Ok(msg))) => assert!(msg.is_close(), "expected close, got {:?}", msg),
        Ok(Some(Err(_))) => {}
        Err(_) => panic!("server left rejected connection open"),
    }
}

#[tokio::test]
async fn test_direct_message_between_live_clients() {
    let (addr, tokens) = start_server().await;

    let mut bob = ws_connect(addr, &tokens, "bob").await;
    let connected = next_event(&mut bob, "connected").await;
    assert_eq!(connected["identity"], "bob");

    let mut alice = ws_connect(addr, &tokens, "alice").await;
    next_event(&mut alice, "connected").await;

    // Bob sees alice come online
    let presence = next_event(&mut bob, "presence").await;
    assert_eq!(presence["identity"], "alice");
    assert_eq!(presence["online"], true);

    let send = json!({
        "type": "direct_message",
        "recipient_id": "bob",
        "content": "hi bob",
        "attachment": null,
        "correlation_token": "opt-1",
    });
    alice
        .send(Message::Text(send.to_string()))
        .await
        .expect("send failed");

    let ack = next_event(&mut alice, "ack").await;
    assert_eq!(ack["success"], true);
    assert_eq!(ack["duplicate"], false);
    assert_eq!(ack["correlation_token"], "opt-1");
    let record_id = ack["record_id"].as_str().unwrap().to_string();

    let delivery = next_event(&mut bob, "direct_message").await;
    assert_eq!(delivery["sender_id"], "alice");
    assert_eq!(delivery["sender_name"], "Alice");
    assert_eq!(delivery["content"], "hi bob");
    assert_eq!(delivery["record_id"], record_id.as_str());

    // A retry of the same send is absorbed: same record, duplicate flag
    alice
        .send(Message::Text(send.to_string()))
        .await
        .expect("send failed");
    let retry_ack = next_event(&mut alice, "ack").await;
    assert_eq!(retry_ack["success"], true);
    assert_eq!(retry_ack["duplicate"], true);
    assert_eq!(retry_ack["record_id"], record_id.as_str());

    let _ = alice.close(None).await;
    let _ = bob.close(None).await;
}

#[tokio::test]
async fn test_room_message_reaches_lounge() {
    let (addr, tokens) = start_server().await;

    let mut bob = ws_connect(addr, &tokens, "bob").await;
    next_event(&mut bob, "connected").await;
    let mut alice = ws_connect(addr, &tokens, "alice").await;
    next_event(&mut alice, "connected").await;

    let send = json!({
        "type": "room_message",
        "room": "lounge",
        "content": "evening all",
        "attachment": null,
    });
    alice
        .send(Message::Text(send.to_string()))
        .await
        .expect("send failed");

    let ack = next_event(&mut alice, "ack").await;
    assert_eq!(ack["success"], true);

    let delivery = next_event(&mut bob, "room_message").await;
    assert_eq!(delivery["room"], "lounge");
    assert_eq!(delivery["content"], "evening all");

    let _ = alice.close(None).await;
    let _ = bob.close(None).await;
}
