//! End-to-end tests against a real listener using a WebSocket client.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use roomcast_server::{RoomcastServer, ServerConfig, ServerHandle};
use serde_json::{Value, json};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Boot a server on a free port.
async fn boot_server(config: ServerConfig) -> ServerHandle {
    let config = ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        ..config
    };
    RoomcastServer::new(config, None)
        .unwrap()
        .listen()
        .await
        .unwrap()
}

async fn connect(handle: &ServerHandle, query: &str) -> WsStream {
    let url = format!("ws://{}/ws{query}", handle.local_addr());
    let (ws, _) = connect_async(url).await.unwrap();
    ws
}

/// Next JSON text message, skipping control frames.
async fn next_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for message")
            .expect("stream ended")
            .expect("websocket error");
        match msg {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => {}
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

async fn assert_no_message(ws: &mut WsStream) {
    let next = timeout(Duration::from_millis(200), ws.next()).await;
    assert!(next.is_err(), "unexpected frame: {next:?}");
}

async fn send_json(ws: &mut WsStream, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

async fn wait_for_connections(handle: &ServerHandle, n: usize) {
    timeout(TIMEOUT, async {
        while handle.hub().connection_count() != n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("connection count never settled");
}

#[tokio::test]
async fn join_is_announced_to_joiner() {
    let server = boot_server(ServerConfig::default()).await;
    let mut alice = connect(&server, "?username=alice&room=lobby").await;

    let join = next_json(&mut alice).await;
    assert_eq!(join["type"], "join");
    assert_eq!(join["username"], "alice");
    assert_eq!(join["room"], "lobby");
    assert_eq!(join["content"], "alice joined the room");
    assert!(chrono::DateTime::parse_from_rfc3339(join["timestamp"].as_str().unwrap()).is_ok());
}

#[tokio::test]
async fn defaults_apply_without_query() {
    let server = boot_server(ServerConfig::default()).await;
    let mut anon = connect(&server, "").await;

    let join = next_json(&mut anon).await;
    assert_eq!(join["username"], "Anonymous");
    assert_eq!(join["room"], "general");
}

#[tokio::test]
async fn messages_stay_in_room_and_carry_bound_identity() {
    let server = boot_server(ServerConfig::default()).await;
    let mut alice = connect(&server, "?username=alice&room=general").await;
    let _ = next_json(&mut alice).await;
    let mut bob = connect(&server, "?username=bob&room=general").await;
    let _ = next_json(&mut bob).await;
    let _ = next_json(&mut alice).await; // bob joined
    let mut carol = connect(&server, "?username=carol&room=random").await;
    let _ = next_json(&mut carol).await;

    send_json(
        &mut alice,
        json!({"type": "message", "content": "hello", "username": "mallory", "room": "random", "timestamp": "1999-01-01T00:00:00Z"}),
    )
    .await;

    for ws in [&mut alice, &mut bob] {
        let msg = next_json(ws).await;
        assert_eq!(msg["type"], "message");
        assert_eq!(msg["username"], "alice");
        assert_eq!(msg["room"], "general");
        assert_eq!(msg["content"], "hello");
        assert_ne!(msg["timestamp"], "1999-01-01T00:00:00Z");
    }
    assert_no_message(&mut carol).await;
}

#[tokio::test]
async fn malformed_frames_are_ignored() {
    let server = boot_server(ServerConfig::default()).await;
    let mut alice = connect(&server, "?username=alice").await;
    let _ = next_json(&mut alice).await;

    alice.send(Message::Text("{oops".into())).await.unwrap();
    alice.send(Message::Text(r#"{"type":"shout","content":"x"}"#.into())).await.unwrap();
    send_json(&mut alice, json!({"content": "ok"})).await;

    let msg = next_json(&mut alice).await;
    assert_eq!(msg["content"], "ok");
    assert_eq!(server.hub().connection_count(), 1);
}

#[tokio::test]
async fn leave_is_announced_after_close() {
    let server = boot_server(ServerConfig::default()).await;
    let mut alice = connect(&server, "?username=alice").await;
    let _ = next_json(&mut alice).await;
    let mut bob = connect(&server, "?username=bob").await;
    let _ = next_json(&mut bob).await;

    alice
        .close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        }))
        .await
        .unwrap();

    let leave = next_json(&mut bob).await;
    assert_eq!(leave["type"], "leave");
    assert_eq!(leave["username"], "alice");
    assert_eq!(leave["content"], "alice left the room");
    wait_for_connections(&server, 1).await;
}

#[tokio::test]
async fn leave_can_be_disabled() {
    let config = ServerConfig {
        announce_leave: false,
        ..ServerConfig::default()
    };
    let server = boot_server(config).await;
    let alice = connect(&server, "?username=alice").await;
    let mut bob = connect(&server, "?username=bob").await;
    let _ = next_json(&mut bob).await;

    drop(alice);
    wait_for_connections(&server, 1).await;
    assert_no_message(&mut bob).await;
}

#[tokio::test]
async fn health_endpoint_reports_rooms() {
    let server = boot_server(ServerConfig::default()).await;
    let mut a = connect(&server, "?room=general").await;
    let _ = next_json(&mut a).await;
    let mut b = connect(&server, "?room=random").await;
    let _ = next_json(&mut b).await;

    let resp = reqwest::get(format!("http://{}/health", server.local_addr()))
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(
        resp.headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("application/json")
    );
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["connections"], 2);
    assert_eq!(body["rooms"]["general"], 1);
    assert_eq!(body["rooms"]["random"], 1);
}

#[tokio::test]
async fn shutdown_closes_clients() {
    let server = boot_server(ServerConfig::default()).await;
    let mut alice = connect(&server, "?username=alice").await;
    let _ = next_json(&mut alice).await;

    assert!(server.shutdown().await);

    let frame = timeout(TIMEOUT, alice.next()).await.unwrap();
    assert!(matches!(frame, Some(Ok(Message::Close(_))) | None | Some(Err(_))));
}
