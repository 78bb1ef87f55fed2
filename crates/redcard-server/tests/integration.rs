//! End-to-end tests over real WebSocket connections.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use redcard_game::Deck;
use redcard_server::{RedcardServer, ServerConfig};
use redcard_settings::GameSettings;
use serde_json::{Value, json};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn boot(config: ServerConfig) -> (String, RedcardServer) {
    let server = RedcardServer::new(config, GameSettings::default(), Deck::builtin(), None);
    let (addr, _handle) = server.listen().await.unwrap();
    (format!("ws://{addr}"), server)
}

async fn boot_default() -> (String, RedcardServer) {
    boot(ServerConfig {
        port: 0,
        ..ServerConfig::default()
    })
    .await
}

async fn connect(base: &str) -> WsStream {
    let (ws, _) = connect_async(format!("{base}/ws")).await.unwrap();
    ws
}

async fn send(ws: &mut WsStream, kind: &str, details: Value) {
    let frame = json!({"type": kind, "details": details}).to_string();
    ws.send(Message::Text(frame.into())).await.unwrap();
}

/// Next JSON text frame, skipping control frames.
async fn read_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Read until a message of `kind` arrives.
async fn expect_kind(ws: &mut WsStream, kind: &str) -> Value {
    loop {
        let msg = read_json(ws).await;
        if msg["type"] == kind {
            return msg;
        }
        assert_ne!(msg["type"], "error", "unexpected error while waiting for {kind}: {msg}");
    }
}

async fn create(ws: &mut WsStream, name: &str) -> (String, String) {
    send(ws, "createsession", json!({"username": name, "avatarId": 1})).await;
    let created = expect_kind(ws, "created").await;
    (
        created["details"]["id"].as_str().unwrap().to_owned(),
        created["details"]["userId"].as_str().unwrap().to_owned(),
    )
}

async fn join(ws: &mut WsStream, session_id: &str, name: &str) -> Value {
    send(
        ws,
        "joinsession",
        json!({"sessionId": session_id, "username": name, "avatarId": 2}),
    )
    .await;
    expect_kind(ws, "joined").await
}

#[tokio::test]
async fn full_round_over_websockets() {
    let (base, _server) = boot_default().await;
    let mut host = connect(&base).await;
    let mut guest = connect(&base).await;

    let (session_id, _host_id) = create(&mut host, "ann").await;
    let joined = join(&mut guest, &session_id, "bo").await;
    let guest_id = joined["details"]["userId"].as_str().unwrap().to_owned();
    assert_eq!(joined["details"]["status"], "waiting");

    let seen = expect_kind(&mut host, "userjoined").await;
    assert_eq!(seen["details"]["users"].as_array().unwrap().len(), 2);

    send(&mut host, "startgame", json!({})).await;
    for ws in [&mut host, &mut guest] {
        let start = expect_kind(ws, "gamestart").await;
        assert_eq!(start["details"]["status"], "starting");
    }
    let _ = expect_kind(&mut host, "votingstarted").await;
    let voting = expect_kind(&mut guest, "votingstarted").await;
    let hand = voting["details"]["whiteCards"].as_array().unwrap();
    assert_eq!(hand.len(), GameSettings::default().hand_size);
    assert!(voting["details"]["redCard"].is_string());
    let card = hand[0].as_str().unwrap().to_owned();

    send(&mut guest, "vote", json!({"text": card})).await;
    let choosing = expect_kind(&mut host, "choosingstarted").await;
    assert_eq!(choosing["details"]["votes"][0]["text"], card.as_str());
    let _ = expect_kind(&mut guest, "choosingstarted").await;

    send(&mut host, "choose", json!({"userId": guest_id})).await;
    let best = expect_kind(&mut guest, "choosingbeststarted").await;
    assert_eq!(best["details"]["chosen"], guest_id.as_str());
    let _ = expect_kind(&mut host, "choosingbeststarted").await;

    send(&mut host, "choosebest", json!({"userId": guest_id})).await;
    for ws in [&mut host, &mut guest] {
        let ended = expect_kind(ws, "roundended").await;
        assert_eq!(ended["details"]["winner"], guest_id.as_str());
        assert_eq!(ended["details"]["card"], card.as_str());
        let winner = ended["details"]["users"]
            .as_array()
            .unwrap()
            .iter()
            .find(|u| u["id"] == guest_id.as_str())
            .unwrap()
            .clone();
        assert_eq!(winner["score"], 1);
    }
}

#[tokio::test]
async fn rejected_command_answers_only_the_sender() {
    let (base, _server) = boot_default().await;
    let mut host = connect(&base).await;
    let mut guest = connect(&base).await;

    let (session_id, _) = create(&mut host, "ann").await;
    let _ = join(&mut guest, &session_id, "bo").await;
    let _ = expect_kind(&mut host, "userjoined").await;

    send(&mut guest, "startgame", json!({})).await;
    let err = read_json(&mut guest).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["details"]["code"], "PERMISSION_DENIED");

    // The host's next frame is the reply to its own command, not the guest's error.
    send(&mut host, "vote", json!({"text": "anything"})).await;
    let err = read_json(&mut host).await;
    assert_eq!(err["details"]["code"], "INVALID_PHASE");
}

#[tokio::test]
async fn malformed_frame_gets_invalid_message() {
    let (base, _server) = boot_default().await;
    let mut ws = connect(&base).await;
    ws.send(Message::Text("not json".into())).await.unwrap();
    let err = read_json(&mut ws).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["details"]["code"], "INVALID_MESSAGE");
}

#[tokio::test]
async fn closing_socket_broadcasts_userleft() {
    let (base, server) = boot_default().await;
    let mut host = connect(&base).await;
    let mut guest = connect(&base).await;

    let (session_id, _) = create(&mut host, "ann").await;
    let joined = join(&mut guest, &session_id, "bo").await;
    let guest_id = joined["details"]["userId"].as_str().unwrap().to_owned();
    let _ = expect_kind(&mut host, "userjoined").await;

    guest.close(None).await.unwrap();
    let left = expect_kind(&mut host, "userleft").await;
    let gone = left["details"]["users"]
        .as_array()
        .unwrap()
        .iter()
        .find(|u| u["id"] == guest_id.as_str())
        .unwrap()
        .clone();
    assert_eq!(gone["disconnected"], true);
    assert_eq!(server.game().lock().session_count(), 1);

    // Returning under the same name restores the same user.
    let mut back = connect(&base).await;
    let rejoined = join(&mut back, &session_id, "bo").await;
    assert_eq!(rejoined["details"]["userId"], guest_id.as_str());
}

#[tokio::test]
async fn last_player_leaving_ends_session() {
    let (base, server) = boot_default().await;
    let mut host = connect(&base).await;
    let (session_id, _) = create(&mut host, "ann").await;
    assert_eq!(server.game().lock().session_count(), 1);

    host.close(None).await.unwrap();
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    while server.game().lock().session_count() > 0 {
        assert!(tokio::time::Instant::now() < deadline, "session never ended");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let mut late = connect(&base).await;
    send(
        &mut late,
        "joinsession",
        json!({"sessionId": session_id, "username": "bo", "avatarId": 2}),
    )
    .await;
    let err = read_json(&mut late).await;
    assert_eq!(err["details"]["code"], "SESSION_NOT_FOUND");
}

#[tokio::test]
async fn connection_limit_rejects_upgrade() {
    let (base, _server) = boot(ServerConfig {
        port: 0,
        max_connections: 1,
        ..ServerConfig::default()
    })
    .await;

    let mut first = connect(&base).await;
    // Round-trip so the first socket is registered before the second knocks.
    send(&mut first, "startgame", json!({})).await;
    let _ = read_json(&mut first).await;

    assert!(connect_async(format!("{base}/ws")).await.is_err());
}

#[tokio::test]
async fn health_over_http() {
    let (base, _server) = boot_default().await;
    let _ws = connect(&base).await;
    let addr = base.trim_start_matches("ws://");

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    let request = format!("GET /health HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    tokio::io::AsyncWriteExt::write_all(&mut stream, request.as_bytes())
        .await
        .unwrap();
    let mut response = String::new();
    let _ = timeout(
        TIMEOUT,
        tokio::io::AsyncReadExt::read_to_string(&mut stream, &mut response),
    )
    .await
    .unwrap()
    .unwrap();

    assert!(response.starts_with("HTTP/1.1 200"));
    let body = response.split("\r\n\r\n").nth(1).unwrap();
    let health: Value = serde_json::from_str(body).unwrap();
    assert_eq!(health["status"], "ok");
}

#[tokio::test]
async fn shutdown_closes_sockets() {
    let (base, server) = boot_default().await;
    let mut ws = connect(&base).await;
    let _ = create(&mut ws, "ann").await;

    server.shutdown().shutdown();
    let closed = timeout(TIMEOUT, async {
        loop {
            match ws.next().await {
                None | Some(Err(_) | Ok(Message::Close(_))) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok());
}
