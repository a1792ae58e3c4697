// Scripted in-process hub for controller tests. Answers snapshot and
// subscription requests on its own; tests push events and break the
// connection through the handle.

#![allow(dead_code, clippy::unwrap_used)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use url::Url;

use hublink_core::{HubConfig, Tuning};

pub const TOKEN: &str = "test-token";
const WAIT: Duration = Duration::from_secs(5);

enum Control {
    Push(Value),
    Drop,
    CloseNormal,
}

#[derive(Default)]
struct HubState {
    states: Mutex<Vec<Value>>,
    calls: Mutex<Vec<Value>>,
    control: Mutex<Option<mpsc::UnboundedSender<Control>>>,
    connections: AtomicUsize,
    snapshots: AtomicUsize,
    subscriptions: AtomicUsize,
    refuse_subscriptions: AtomicBool,
    /// Request types seen on each authenticated connection, in order.
    requests: Mutex<Vec<Vec<String>>>,
}

pub struct FakeHub {
    /// Plain `http://` base URL, as a user would configure it.
    pub url: Url,
    state: Arc<HubState>,
    task: JoinHandle<()>,
}

impl Drop for FakeHub {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl FakeHub {
    pub async fn start(states: &[(&str, &str)]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(HubState::default());
        *state.states.lock().unwrap() = states.iter().map(|(id, s)| state_object(id, s)).collect();

        let task = tokio::spawn(accept_loop(listener, Arc::clone(&state)));
        Self {
            url: Url::parse(&format!("http://{addr}")).unwrap(),
            state,
            task,
        }
    }

    /// Config with short timers, pointing at this hub.
    pub fn config(&self, token: &str) -> HubConfig {
        let mut config = HubConfig::new(self.url.clone(), SecretString::from(token));
        config.tuning = Tuning {
            request_timeout: Duration::from_secs(2),
            auth_timeout: Duration::from_secs(2),
            backoff_floor: Duration::from_millis(10),
            backoff_ceiling: Duration::from_millis(50),
            optimistic_window: Duration::from_millis(400),
            ..Tuning::default()
        };
        config
    }

    /// Change what the next `get_states` returns.
    pub fn set_state(&self, entity_id: &str, state: &str) {
        let mut states = self.state.states.lock().unwrap();
        states.retain(|s| s["entity_id"] != entity_id);
        states.push(state_object(entity_id, state));
    }

    /// Push a `state_changed` event on the live connection.
    pub fn push_state(&self, entity_id: &str, state: &str) {
        self.control(Control::Push(json!({
            "entity_id": entity_id,
            "new_state": state_object(entity_id, state),
            "old_state": null
        })));
    }

    /// Kill the live connection without a close frame.
    pub fn drop_connection(&self) {
        self.control(Control::Drop);
    }

    pub fn close_normal(&self) {
        self.control(Control::CloseNormal);
    }

    pub fn calls(&self) -> Vec<Value> {
        self.state.calls.lock().unwrap().clone()
    }

    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    pub fn snapshots(&self) -> usize {
        self.state.snapshots.load(Ordering::SeqCst)
    }

    /// Accepted `subscribe_events` requests.
    pub fn subscriptions(&self) -> usize {
        self.state.subscriptions.load(Ordering::SeqCst)
    }

    /// Answer `subscribe_events` with an error from now on.
    pub fn refuse_subscriptions(&self, refuse: bool) {
        self.state.refuse_subscriptions.store(refuse, Ordering::SeqCst);
    }

    /// Request types received on the `n`th connection (0-based).
    pub fn requests_on(&self, n: usize) -> Vec<String> {
        self.state
            .requests
            .lock()
            .unwrap()
            .get(n)
            .cloned()
            .unwrap_or_default()
    }

    fn control(&self, control: Control) {
        let guard = self.state.control.lock().unwrap();
        guard.as_ref().expect("no live connection").send(control).ok();
    }
}

pub fn state_object(entity_id: &str, state: &str) -> Value {
    json!({
        "entity_id": entity_id,
        "state": state,
        "attributes": {"friendly_name": entity_id},
        "last_changed": "2026-01-05T10:00:00.000000+00:00",
        "last_updated": "2026-01-05T10:00:00.000000+00:00"
    })
}

/// Poll `check` until it holds or the wait runs out.
pub async fn wait_until(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ── Server internals ────────────────────────────────────────────────

async fn accept_loop(listener: TcpListener, state: Arc<HubState>) {
    while let Ok((stream, _)) = listener.accept().await {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Ok(ws) = tokio_tungstenite::accept_async(stream).await {
                serve(ws, state).await;
            }
        });
    }
}

async fn send(ws: &mut WebSocketStream<TcpStream>, value: Value) -> bool {
    ws.send(Message::text(value.to_string())).await.is_ok()
}

async fn serve(mut ws: WebSocketStream<TcpStream>, state: Arc<HubState>) {
    send(&mut ws, json!({"type": "auth_required", "ha_version": "2025.1.0"})).await;
    let Some(Ok(Message::Text(auth))) = ws.next().await else {
        return;
    };
    let auth: Value = serde_json::from_str(auth.as_str()).unwrap();
    if auth["access_token"] != TOKEN {
        send(&mut ws, json!({"type": "auth_invalid", "message": "Invalid access token"})).await;
        return;
    }
    send(&mut ws, json!({"type": "auth_ok", "ha_version": "2025.1.0"})).await;

    let connection = {
        let mut requests = state.requests.lock().unwrap();
        requests.push(Vec::new());
        requests.len() - 1
    };
    state.connections.fetch_add(1, Ordering::SeqCst);
    let (tx, mut control) = mpsc::unbounded_channel();
    *state.control.lock().unwrap() = Some(tx);
    let mut subscription = Value::Null;

    loop {
        tokio::select! {
            frame = ws.next() => {
                let Some(Ok(Message::Text(text))) = frame else { return };
                let frame: Value = serde_json::from_str(text.as_str()).unwrap();
                let id = frame["id"].clone();
                let kind = frame["type"].as_str().unwrap_or_default().to_owned();
                state.requests.lock().unwrap()[connection].push(kind.clone());
                let result = match kind.as_str() {
                    "subscribe_events" if state.refuse_subscriptions.load(Ordering::SeqCst) => {
                        send(&mut ws, json!({
                            "id": id,
                            "type": "result",
                            "success": false,
                            "error": {"code": "unknown_error", "message": "Subscription refused"}
                        }))
                        .await;
                        continue;
                    }
                    "subscribe_events" => {
                        subscription = id.clone();
                        state.subscriptions.fetch_add(1, Ordering::SeqCst);
                        Value::Null
                    }
                    "get_states" => {
                        state.snapshots.fetch_add(1, Ordering::SeqCst);
                        Value::Array(state.states.lock().unwrap().clone())
                    }
                    "call_service" => {
                        state.calls.lock().unwrap().push(frame.clone());
                        json!({"context": {"id": "ctx"}})
                    }
                    "ping" => {
                        send(&mut ws, json!({"id": id, "type": "pong"})).await;
                        continue;
                    }
                    _ => json!([]),
                };
                send(&mut ws, json!({"id": id, "type": "result", "success": true, "result": result})).await;
            }
            Some(control) = control.recv() => match control {
                Control::Push(data) => {
                    send(&mut ws, json!({
                        "id": subscription,
                        "type": "event",
                        "event": {
                            "event_type": "state_changed",
                            "data": data,
                            "origin": "LOCAL",
                            "time_fired": "2026-01-05T10:00:01.000000+00:00"
                        }
                    }))
                    .await;
                }
                Control::Drop => return,
                Control::CloseNormal => {
                    let _ = ws
                        .close(Some(CloseFrame {
                            code: CloseCode::Normal,
                            reason: "bye".into(),
                        }))
                        .await;
                    return;
                }
            },
        }
    }
}
