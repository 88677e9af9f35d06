//! End-to-end tests: real WebSocket clients against the full router.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::Message};

use crate::config::{DuplicatePeerIdPolicy, ServerConfig, SignalingConfig};
use crate::signaling::SignalingHub;
use crate::{AppState, app_router};

const RECV_TIMEOUT: Duration = Duration::from_secs(2);
const QUIET_PERIOD: Duration = Duration::from_millis(200);

struct TestServer {
    port: u16,
    hub: Arc<SignalingHub>,
    _shutdown: tokio::sync::oneshot::Sender<()>,
}

impl TestServer {
    async fn start() -> Self {
        Self::start_with(SignalingConfig::default()).await
    }

    async fn start_with(signaling: SignalingConfig) -> Self {
        let server_config = ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            send_queue_capacity: 64,
        };
        let state = AppState::new(server_config, signaling);
        let hub = state.hub.clone();
        let app = app_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await
                .unwrap();
        });
        Self {
            port,
            hub,
            _shutdown: tx,
        }
    }

    async fn connect(&self) -> Client {
        let url = format!("ws://127.0.0.1:{}/ws", self.port);
        let (stream, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        Client { stream }
    }

    /// Wait until the hub has processed a disconnect that happens on another task.
    async fn wait_for_peer_count(&self, expected: usize) {
        for _ in 0..100 {
            if self.hub.peer_count().await == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "peer count never reached {expected} (now {})",
            self.hub.peer_count().await
        );
    }
}

struct Client {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Client {
    async fn send(&mut self, msg: Value) {
        self.stream
            .send(Message::Text(msg.to_string().into()))
            .await
            .unwrap();
    }

    async fn send_raw(&mut self, text: &str) {
        self.stream
            .send(Message::Text(text.to_string().into()))
            .await
            .unwrap();
    }

    /// Next JSON text frame, skipping control frames.
    async fn recv(&mut self) -> Value {
        loop {
            let msg = tokio::time::timeout(RECV_TIMEOUT, self.stream.next())
                .await
                .expect("timed out waiting for a frame")
                .expect("stream ended")
                .expect("websocket error");
            if let Message::Text(text) = msg {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
    }

    /// Next frame whose action matches, skipping others (e.g. dashboard noise).
    async fn recv_action(&mut self, action: &str) -> Value {
        loop {
            let frame = self.recv().await;
            if frame["action"] == action {
                return frame;
            }
        }
    }

    async fn expect_silence(&mut self) {
        if let Ok(Some(Ok(Message::Text(text)))) =
            tokio::time::timeout(QUIET_PERIOD, self.stream.next()).await
        {
            panic!("expected no frame, got {}", text.as_str());
        }
    }

    /// True once the server has closed this connection.
    async fn closed_by_server(&mut self) -> bool {
        loop {
            match tokio::time::timeout(RECV_TIMEOUT, self.stream.next()).await {
                Err(_) => return false,
                Ok(None) | Ok(Some(Err(_))) | Ok(Some(Ok(Message::Close(_)))) => return true,
                Ok(Some(Ok(_))) => continue,
            }
        }
    }

    async fn register(&mut self, peer_id: &str, room_id: &str, is_source: bool) -> Value {
        self.send(json!({
            "action": "register",
            "peerId": peer_id,
            "roomId": room_id,
            "isSource": is_source,
        }))
        .await;
        self.recv_action("registered").await
    }

    async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }
}

#[tokio::test]
async fn test_source_discovery() {
    let server = TestServer::start().await;
    let mut a = server.connect().await;
    let mut b = server.connect().await;

    let registered = a.register("src1", "r1", true).await;
    assert_eq!(
        registered,
        json!({"action":"registered","peerId":"src1","roomId":"r1","isSource":true})
    );
    b.register("cli1", "r1", false).await;

    b.send(json!({"action":"get-peer","roomId":"r1"})).await;
    let found = b.recv().await;
    assert_eq!(found["action"], "peer-found");
    assert_eq!(found["peer"]["peerId"], "src1");
    assert_eq!(found["peer"]["isSource"], true);
}

#[tokio::test]
async fn test_offer_reaches_room_but_not_sender() {
    let server = TestServer::start().await;
    let mut a = server.connect().await;
    let mut b = server.connect().await;
    a.register("src1", "r1", true).await;
    b.register("cli1", "r1", false).await;

    a.send(json!({"action":"update-peer","offer":"SDP1"})).await;

    assert_eq!(
        b.recv().await,
        json!({"action":"offer","offer":"SDP1","fromPeerId":"src1"})
    );
    assert_eq!(
        b.recv().await,
        json!({"action":"peer-updated","peerId":"src1","offer":"SDP1","answer":null})
    );
    a.expect_silence().await;
}

#[tokio::test]
async fn test_ice_candidates_accumulate_without_broadcast() {
    let server = TestServer::start().await;
    let mut a = server.connect().await;
    let mut b = server.connect().await;
    a.register("src1", "r1", true).await;
    b.register("cli1", "r1", false).await;

    for c in ["c1", "c2"] {
        a.send(json!({"action":"update-peer","iceCandidate":c})).await;
    }
    b.expect_silence().await;

    b.send(json!({"action":"get-peer-updates","peerId":"src1"})).await;
    assert_eq!(
        b.recv().await,
        json!({"action":"peer-updates","offer":null,"answer":null,"iceCandidates":["c1","c2"]})
    );
}

#[tokio::test]
async fn test_raw_relay_round_trip() {
    let server = TestServer::start().await;
    let mut a = server.connect().await;
    let mut b = server.connect().await;
    a.register("src1", "r1", true).await;
    b.register("cli1", "r1", false).await;

    b.send(json!({"action":"answer","answer":{"type":"answer","sdp":"v=0"}}))
        .await;
    assert_eq!(
        a.recv().await,
        json!({"action":"answer","answer":{"type":"answer","sdp":"v=0"},"fromPeerId":"cli1"})
    );
    b.expect_silence().await;
}

#[tokio::test]
async fn test_departure_and_room_lifecycle() {
    let server = TestServer::start().await;
    let mut a = server.connect().await;
    let mut b = server.connect().await;
    a.register("src1", "r1", true).await;
    b.register("cli1", "r1", false).await;

    b.close().await;
    assert_eq!(
        a.recv().await,
        json!({"action":"peer-left","peerId":"cli1"})
    );
    server.wait_for_peer_count(1).await;
    assert!(server.hub.room_exists("r1").await);

    a.close().await;
    server.wait_for_peer_count(0).await;
    assert!(!server.hub.room_exists("r1").await);

    let mut fresh = server.connect().await;
    fresh.send(json!({"action":"get-peer","roomId":"r1"})).await;
    assert_eq!(fresh.recv().await, json!({"action":"peer-not-found"}));
}

#[tokio::test]
async fn test_malformed_frames_keep_connection_open() {
    let server = TestServer::start().await;
    let mut a = server.connect().await;

    a.send_raw("{{{ not json").await;
    a.send_raw(r#"{"action":"nope"}"#).await;
    a.send_raw(r#"{"peerId":"x"}"#).await;
    a.expect_silence().await;

    let registered = a.register("still-here", "r1", false).await;
    assert_eq!(registered["peerId"], "still-here");
}

#[tokio::test]
async fn test_dashboard_feed() {
    let server = TestServer::start().await;
    let mut dash = server.connect().await;
    dash.send(json!({"action":"dashboard-connect"})).await;
    let connected = dash.recv().await;
    assert_eq!(connected["action"], "dashboard-connected");
    assert_eq!(
        connected["stats"],
        json!({"totalPeers":0,"sourcePeers":0,"clientPeers":0})
    );

    let mut a = server.connect().await;
    a.register("src1", "r1", true).await;
    let update = dash.recv().await;
    assert_eq!(update["action"], "dashboard-update");
    assert_eq!(update["stats"]["totalPeers"], 1);
    assert_eq!(update["peers"][0]["peerId"], "src1");
    assert_eq!(update["peers"][0]["connected"], true);

    a.close().await;
    let update = dash.recv_action("dashboard-update").await;
    assert_eq!(update["stats"]["totalPeers"], 0);
}

#[tokio::test]
async fn test_remove_peer_closes_target() {
    let server = TestServer::start().await;
    let mut a = server.connect().await;
    let mut b = server.connect().await;
    let mut admin = server.connect().await;
    a.register("src1", "r1", true).await;
    b.register("cli1", "r1", false).await;

    admin
        .send(json!({"action":"remove-peer","peerId":"cli1"}))
        .await;
    assert_eq!(
        admin.recv().await,
        json!({"action":"peer-removed","peerId":"cli1","success":true})
    );
    assert!(b.closed_by_server().await);
    assert_eq!(a.recv().await, json!({"action":"peer-left","peerId":"cli1"}));
    server.wait_for_peer_count(1).await;

    admin
        .send(json!({"action":"remove-peer","peerId":"cli1"}))
        .await;
    admin.expect_silence().await;
}

#[tokio::test]
async fn test_duplicate_rejection_policy() {
    let server = TestServer::start_with(SignalingConfig {
        duplicate_peer_ids: DuplicatePeerIdPolicy::Reject,
        ..SignalingConfig::default()
    })
    .await;
    let mut a = server.connect().await;
    let mut b = server.connect().await;
    a.register("taken", "r1", true).await;

    b.send(json!({"action":"register","peerId":"taken"})).await;
    let rejected = b.recv().await;
    assert_eq!(rejected["action"], "register-rejected");
    assert_eq!(rejected["peerId"], "taken");
    assert_eq!(server.hub.peer_count().await, 1);
}
