use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tutorboard_core::event::ChangeEvent;
use tutorboard_core::sync::{ChannelEvent, ChannelState, RelayChannel, SyncChannel};
use tutorboard_server::{AppState, app};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(AppState::new(16));
    tokio::spawn(async move {
        axum::serve(listener, app(state)).await.unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    ws
}

async fn send(ws: &mut Client, value: Value) {
    ws.send(Message::text(value.to_string())).await.unwrap();
}

async fn recv(ws: &mut Client) -> Value {
    loop {
        let msg = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for relay")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn assert_silent(ws: &mut Client) {
    assert!(timeout(Duration::from_millis(200), ws.next()).await.is_err());
}

async fn join(ws: &mut Client, user_id: &str) -> Value {
    send(ws, json!({"type": "join", "session": "session:s1", "user_id": user_id})).await;
    recv(ws).await
}

#[tokio::test]
async fn test_broadcast_excludes_publisher() {
    let addr = start_server().await;
    let mut a = connect(addr).await;
    let mut b = connect(addr).await;

    assert_eq!(
        join(&mut a, "u1").await,
        json!({"type": "joined", "session": "session:s1", "peer_count": 1})
    );
    assert_eq!(join(&mut b, "u2").await["peer_count"], 2);
    assert_eq!(recv(&mut a).await, json!({"type": "peer_joined", "user_id": "u2"}));

    let payload = json!({"userId": "u1", "data": {"type": "clear", "originUserId": "u1"}});
    send(
        &mut a,
        json!({"type": "broadcast", "event": "canvas-update", "payload": payload}),
    )
    .await;

    assert_eq!(
        recv(&mut b).await,
        json!({"type": "broadcast", "from": "u1", "event": "canvas-update", "payload": payload})
    );
    assert_silent(&mut a).await;
}

#[tokio::test]
async fn test_late_joiner_gets_no_history() {
    let addr = start_server().await;
    let mut a = connect(addr).await;
    join(&mut a, "u1").await;
    send(
        &mut a,
        json!({"type": "broadcast", "event": "canvas-update", "payload": {}}),
    )
    .await;

    let mut b = connect(addr).await;
    assert_eq!(join(&mut b, "u2").await["peer_count"], 2);
    assert_silent(&mut b).await;
}

#[tokio::test]
async fn test_peer_left_on_disconnect() {
    let addr = start_server().await;
    let mut a = connect(addr).await;
    let mut b = connect(addr).await;
    join(&mut a, "u1").await;
    join(&mut b, "u2").await;
    recv(&mut a).await; // peer_joined

    b.close(None).await.unwrap();
    assert_eq!(recv(&mut a).await, json!({"type": "peer_left", "user_id": "u2"}));
}

#[tokio::test]
async fn test_broadcast_before_join_is_an_error() {
    let addr = start_server().await;
    let mut a = connect(addr).await;
    send(&mut a, json!({"type": "broadcast", "event": "x", "payload": {}})).await;
    assert_eq!(recv(&mut a).await["type"], "error");

    send(&mut a, json!({"type": "shout"})).await;
    assert_eq!(recv(&mut a).await["type"], "error");
}

async fn poll_until<F>(channel: &mut RelayChannel, mut done: F) -> Vec<ChannelEvent>
where
    F: FnMut(&ChannelEvent) -> bool,
{
    let mut seen = Vec::new();
    for _ in 0..100 {
        for event in channel.poll() {
            let finished = done(&event);
            seen.push(event);
            if finished {
                return seen;
            }
        }
        sleep(Duration::from_millis(50)).await;
    }
    panic!("relay channel never produced the expected event: {seen:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_relay_channel_end_to_end() {
    let addr = start_server().await;
    let url = format!("ws://{addr}/ws");

    let mut a = RelayChannel::connect(&url, "s1", "u1").unwrap();
    poll_until(&mut a, |e| matches!(e, ChannelEvent::Connected { .. })).await;
    assert_eq!(a.state(), ChannelState::Connected);

    let mut b = RelayChannel::connect(&url, "s1", "u2").unwrap();
    poll_until(&mut b, |e| matches!(e, ChannelEvent::Connected { peer_count: 2 })).await;
    poll_until(&mut a, |e| matches!(e, ChannelEvent::PeerJoined { .. })).await;

    a.publish(&ChangeEvent::clear("u1")).unwrap();
    let events = poll_until(&mut b, |e| matches!(e, ChannelEvent::Change(_))).await;
    assert_eq!(
        events.last(),
        Some(&ChannelEvent::Change(ChangeEvent::clear("u1")))
    );

    b.unsubscribe();
    poll_until(&mut a, |e| matches!(e, ChannelEvent::PeerLeft { .. })).await;
}

fn changes(events: &[ChannelEvent]) -> Vec<ChangeEvent> {
    events
        .iter()
        .filter_map(|e| match e {
            ChannelEvent::Change(change) => Some(change.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reconnect_skips_missed_events() {
    let addr = start_server().await;
    let url = format!("ws://{addr}/ws");

    let mut a = RelayChannel::connect(&url, "s1", "u1").unwrap();
    poll_until(&mut a, |e| matches!(e, ChannelEvent::Connected { .. })).await;
    let mut b = RelayChannel::connect(&url, "s1", "u2").unwrap();
    poll_until(&mut b, |e| matches!(e, ChannelEvent::Connected { peer_count: 2 })).await;

    // A goes away; B keeps publishing
    a.unsubscribe();
    assert_eq!(a.state(), ChannelState::Disconnected);
    poll_until(&mut b, |e| matches!(e, ChannelEvent::PeerLeft { .. })).await;
    b.publish(&ChangeEvent::remove("missed".into(), "u2")).unwrap();
    sleep(Duration::from_millis(300)).await;

    a.reconnect().unwrap();
    let mut seen =
        poll_until(&mut a, |e| matches!(e, ChannelEvent::Connected { peer_count: 2 })).await;
    assert_eq!(a.state(), ChannelState::Connected);

    poll_until(&mut b, |e| matches!(e, ChannelEvent::PeerJoined { .. })).await;
    b.publish(&ChangeEvent::remove("after".into(), "u2")).unwrap();
    seen.extend(poll_until(&mut a, |e| matches!(e, ChannelEvent::Change(_))).await);

    assert_eq!(changes(&seen), vec![ChangeEvent::remove("after".into(), "u2")]);
}
