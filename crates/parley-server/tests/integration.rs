//! End-to-end tests using a real WebSocket client.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parley_backplane::Backplane;
use parley_core::{Phase, PlayerSnapshot, RoomCode};
use parley_server::{GameHooks, ParleyServer, RoomRegistry};
use parley_settings::ParleySettings;
use serde_json::{Value, json};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

#[derive(Default)]
struct CountingHooks {
    fired: AtomicUsize,
    last_room: parking_lot::Mutex<Option<String>>,
}

impl GameHooks for CountingHooks {
    fn on_all_ready(&self, room: &RoomCode, _players: &[PlayerSnapshot]) {
        let _ = self.fired.fetch_add(1, Ordering::SeqCst);
        *self.last_room.lock() = Some(room.to_string());
    }
}

struct TestServer {
    base: String,
    server: ParleyServer,
    hooks: Arc<CountingHooks>,
}

/// Boot a server on an ephemeral port with in-memory history.
async fn boot_server() -> TestServer {
    let mut settings = ParleySettings::default();
    settings.server.host = "127.0.0.1".into();
    settings.server.port = 0;

    let hooks = Arc::new(CountingHooks::default());
    let registry = RoomRegistry::new(&settings.rooms, Backplane::in_memory(50))
        .with_hooks(hooks.clone());
    let server = ParleyServer::new(settings, registry);
    let (addr, _handle) = server.listen().await.unwrap();

    TestServer {
        base: format!("ws://{addr}/ws"),
        server,
        hooks,
    }
}

async fn connect(ts: &TestServer, room: &str, name: &str) -> WsStream {
    let url = format!("{}?room={room}&name={name}", ts.base);
    let (ws, _) = timeout(TIMEOUT, connect_async(url)).await.unwrap().unwrap();
    ws
}

/// Next text frame as JSON, skipping control frames.
async fn recv_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("read error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Skip frames until one of `kind` arrives.
async fn recv_type(ws: &mut WsStream, kind: &str) -> Value {
    loop {
        let msg = recv_json(ws).await;
        if msg["type"] == kind {
            return msg;
        }
    }
}

async fn send_json(ws: &mut WsStream, value: &Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

async fn wait_until<F: Fn() -> bool>(cond: F) {
    timeout(TIMEOUT, async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn join_ready_starts_game() {
    let ts = boot_server().await;
    let mut zed = connect(&ts, "abcd", "Zed").await;

    let hello = recv_json(&mut zed).await;
    assert_eq!(hello["type"], "hello");
    assert_eq!(hello["data"]["room"], "ABCD");
    assert_eq!(hello["data"]["name"], "Zed");
    let id = hello["data"]["id"].as_str().unwrap().to_owned();

    let join = recv_json(&mut zed).await;
    assert_eq!(join["type"], "join");
    assert_eq!(join["data"]["name"], "Zed");
    assert_eq!(join["data"]["id"], id.as_str());

    let state = recv_json(&mut zed).await;
    assert_eq!(state["type"], "state");
    assert_eq!(state["data"]["room"], "ABCD");
    assert_eq!(
        state["data"]["players"],
        json!([{"id": id, "name": "Zed", "alive": true, "ready": false}])
    );

    send_json(&mut zed, &json!({"type": "ready"})).await;

    let ready = recv_json(&mut zed).await;
    assert_eq!(ready["type"], "ready");
    assert_eq!(ready["data"]["username"], "Zed");

    let state = recv_json(&mut zed).await;
    assert_eq!(state["type"], "state");
    assert_eq!(state["data"]["players"][0]["ready"], true);

    let phase = recv_json(&mut zed).await;
    assert_eq!(phase, json!({"type": "phase", "data": {"status": "inGame"}}));

    wait_until(|| ts.hooks.fired.load(Ordering::SeqCst) == 1).await;
    assert_eq!(ts.hooks.last_room.lock().as_deref(), Some("ABCD"));

    // A repeated signal changes nothing.
    send_json(&mut zed, &json!({"type": "agree"})).await;
    let room = ts.server.registry().get(&RoomCode::parse("ABCD").unwrap()).unwrap();
    let status = room.status().await.unwrap();
    assert_eq!(status.ready_count, 1);
    assert_eq!(ts.hooks.fired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn chat_is_relayed_verbatim() {
    let ts = boot_server().await;
    let mut alice = connect(&ts, "room1", "Alice").await;
    let _ = recv_type(&mut alice, "state").await;
    let mut bob = connect(&ts, "ROOM1", "Bob").await;
    let _ = recv_type(&mut bob, "state").await;

    let chat = json!({"type": "chat", "data": {"from": "Alice", "text": "hello"}});
    send_json(&mut alice, &chat).await;

    assert_eq!(recv_type(&mut bob, "chat").await, chat);
    assert_eq!(recv_type(&mut alice, "chat").await, chat);
}

#[tokio::test]
async fn unknown_types_pass_through_and_garbage_is_skipped() {
    let ts = boot_server().await;
    let mut a = connect(&ts, "opaque", "A").await;
    let _ = recv_type(&mut a, "state").await;

    a.send(Message::Text("this is not json".into())).await.unwrap();
    let custom = json!({"type": "dance", "data": [1, 2, 3]});
    send_json(&mut a, &custom).await;

    // The connection survived the bad frame.
    assert_eq!(recv_type(&mut a, "dance").await, custom);
}

#[tokio::test]
async fn late_joiner_gets_history() {
    let ts = boot_server().await;
    let mut a = connect(&ts, "hist", "A").await;
    let _ = recv_type(&mut a, "state").await;
    let chat = json!({"type": "chat", "data": {"from": "A", "text": "earlier"}});
    send_json(&mut a, &chat).await;
    let _ = recv_type(&mut a, "chat").await;

    // The append happens right after the broadcast; give it a moment.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut b = connect(&ts, "hist", "B").await;
    assert_eq!(recv_json(&mut b).await["type"], "hello");
    assert_eq!(recv_json(&mut b).await, chat);
    assert_eq!(recv_json(&mut b).await["type"], "join");
}

#[tokio::test]
async fn abrupt_disconnect_in_game() {
    let ts = boot_server().await;
    let mut a = connect(&ts, "game", "A").await;
    let _ = recv_type(&mut a, "state").await;
    let mut b = connect(&ts, "game", "B").await;
    let _ = recv_type(&mut b, "state").await;

    send_json(&mut a, &json!({"type": "ready"})).await;
    send_json(&mut b, &json!({"type": "ready"})).await;
    let _ = recv_type(&mut a, "phase").await;

    // Drop B without a close handshake.
    drop(b);

    let leave = recv_type(&mut a, "leave").await;
    assert_eq!(leave["data"]["name"], "B");
    let state = recv_type(&mut a, "state").await;
    assert_eq!(state["data"]["players"].as_array().unwrap().len(), 1);

    let room = ts.server.registry().get(&RoomCode::parse("game").unwrap()).unwrap();
    let status = room.status().await.unwrap();
    assert_eq!(status.phase, Phase::InGame);
    assert_eq!(status.ready_count, 1);

    let chat = json!({"type": "chat", "data": {"text": "still here"}});
    send_json(&mut a, &chat).await;
    assert_eq!(recv_type(&mut a, "chat").await, chat);
    assert_eq!(ts.hooks.fired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_params_rejected_before_upgrade() {
    let ts = boot_server().await;
    for query in ["", "?room=ABCD", "?name=Zed", "?room=%20&name=Zed", "?room=ABCD&name=%20"] {
        let url = format!("{}{query}", ts.base);
        let result = timeout(TIMEOUT, connect_async(url)).await.unwrap();
        assert!(result.is_err(), "upgrade accepted for {query:?}");
    }
    assert_eq!(ts.server.registry().room_count(), 0);
}

#[tokio::test]
async fn roster_tracks_connections() {
    let ts = boot_server().await;
    let mut a = connect(&ts, "zeta", "A").await;
    let _ = recv_type(&mut a, "state").await;
    let mut b = connect(&ts, "alpha", "B").await;
    let _ = recv_type(&mut b, "state").await;

    let roster = ts.server.registry().roster();
    let codes: Vec<_> = roster.iter().map(|r| (r.code.as_str(), r.count)).collect();
    assert_eq!(codes, [("ALPHA", 1), ("ZETA", 1)]);

    a.close(None).await.unwrap();
    let registry = Arc::clone(ts.server.registry());
    wait_until(|| registry.connection_count() == 1).await;
    assert_eq!(registry.roster()[1].count, 0);
}
