// In-process hub speaking the WebSocket protocol over a loopback socket.

#![allow(dead_code, clippy::unwrap_used)]

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use url::Url;

use hublink_api::{ReconnectConfig, SessionConfig};

pub const TOKEN: &str = "test-token";
const STEP_TIMEOUT: Duration = Duration::from_secs(5);

// ── Server ──────────────────────────────────────────────────────────

pub struct MockHub {
    listener: TcpListener,
    pub url: Url,
}

impl MockHub {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let url = Url::parse(&format!("ws://{addr}/api/websocket")).unwrap();
        Self { listener, url }
    }

    /// Accept one client and complete the WebSocket upgrade.
    pub async fn accept(&self) -> HubConn {
        let (stream, _) = tokio::time::timeout(STEP_TIMEOUT, self.listener.accept())
            .await
            .expect("client never connected")
            .unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        HubConn { ws }
    }

    /// Accept and authenticate one client.
    pub async fn accept_authenticated(&self) -> HubConn {
        let mut conn = self.accept().await;
        conn.handshake().await;
        conn
    }
}

pub struct HubConn {
    ws: WebSocketStream<TcpStream>,
}

impl HubConn {
    pub async fn send_json(&mut self, value: Value) {
        self.ws.send(Message::text(value.to_string())).await.unwrap();
    }

    /// Next text frame as JSON. Panics if nothing arrives in time.
    pub async fn next_json(&mut self) -> Value {
        self.try_next_json(STEP_TIMEOUT)
            .await
            .expect("expected a frame from the client")
    }

    /// Next text frame within `wait`, or `None` on timeout / close.
    pub async fn try_next_json(&mut self, wait: Duration) -> Option<Value> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let frame = tokio::time::timeout_at(deadline, self.ws.next()).await.ok()??;
            match frame.ok()? {
                Message::Text(text) => return Some(serde_json::from_str(text.as_str()).unwrap()),
                Message::Close(_) => return None,
                _ => {}
            }
        }
    }

    /// `auth_required` → expect `auth` with the test token → `auth_ok`.
    pub async fn handshake(&mut self) {
        self.send_json(json!({"type": "auth_required", "ha_version": "2025.1.0"}))
            .await;
        let auth = self.next_json().await;
        assert_eq!(auth, json!({"type": "auth", "access_token": TOKEN}));
        self.send_json(json!({"type": "auth_ok", "ha_version": "2025.1.0"}))
            .await;
    }

    pub async fn reply(&mut self, id: &Value, result: Value) {
        self.send_json(json!({"id": id, "type": "result", "success": true, "result": result}))
            .await;
    }

    pub async fn reply_error(&mut self, id: &Value, code: &str, message: &str) {
        self.send_json(json!({
            "id": id,
            "type": "result",
            "success": false,
            "error": {"code": code, "message": message}
        }))
        .await;
    }

    /// Push an event on subscription `sub_id`.
    pub async fn push_event(&mut self, sub_id: &Value, event_type: &str, data: Value) {
        self.send_json(json!({
            "id": sub_id,
            "type": "event",
            "event": {
                "event_type": event_type,
                "data": data,
                "origin": "LOCAL",
                "time_fired": "2026-01-05T10:00:00.000000+00:00"
            }
        }))
        .await;
    }

    /// Answer the next `subscribe_events` request and return its id.
    pub async fn accept_subscription(&mut self, event_type: &str) -> Value {
        let frame = self.next_json().await;
        assert_eq!(frame["type"], "subscribe_events");
        assert_eq!(frame["event_type"], event_type);
        let id = frame["id"].clone();
        self.reply(&id, Value::Null).await;
        id
    }

    pub async fn close(&mut self, code: CloseCode) {
        let _ = self
            .ws
            .close(Some(CloseFrame {
                code,
                reason: "bye".into(),
            }))
            .await;
    }

    /// Wait for the client's close frame and return its code.
    pub async fn expect_close(&mut self) -> Option<u16> {
        let deadline = tokio::time::Instant::now() + STEP_TIMEOUT;
        loop {
            let frame = tokio::time::timeout_at(deadline, self.ws.next()).await.ok()??;
            if let Ok(Message::Close(frame)) = frame {
                return frame.map(|f| u16::from(f.code));
            }
        }
    }
}

// ── Client config ───────────────────────────────────────────────────

/// Session config with short timers for tests.
pub fn session_config(url: &Url) -> SessionConfig {
    let mut config = SessionConfig::new(url.clone(), SecretString::from(TOKEN));
    config.auth_timeout = Duration::from_secs(2);
    config.request_timeout = Duration::from_secs(2);
    config.reconnect = ReconnectConfig {
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        max_retries: None,
    };
    config
}
