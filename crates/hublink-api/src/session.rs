//! Authenticated hub session with request correlation and auto-reconnect.
//!
//! A [`HubSession`] is a handle to a background actor task that owns the
//! WebSocket. The actor performs the `auth_required` → `auth` → `auth_ok`
//! handshake, writes correlated requests, routes `result` frames back to
//! their callers and pushes `event` frames onto a broadcast channel.
//!
//! When the socket drops for any reason other than a normal close, the
//! actor rejects every in-flight request, backs off exponentially and
//! reconnects. A successful reconnect is announced as
//! [`SessionNotice::Reconnected`] so higher layers can re-subscribe and
//! resynchronize.
//!
//! ```rust,ignore
//! use hublink_api::{HubSession, SessionConfig};
//! use secrecy::SecretString;
//! use url::Url;
//!
//! let url = Url::parse("ws://homeassistant.local:8123/api/websocket")?;
//! let session = HubSession::connect(SessionConfig::new(url, SecretString::from(token))).await?;
//!
//! let states = session.get_states().await?;
//! println!("{} entities", states.len());
//!
//! session.disconnect().await;
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::correlator::{Correlator, Reply};
use crate::error::Error;
use crate::protocol::{
    AreaEntry, AuthFrame, DeviceEntry, EntityRegistryEntry, FloorEntry, HubEvent, InboundMessage,
    Request, ResultMessage, ServiceTarget, StateObject,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;

// ── Channel capacities ───────────────────────────────────────────────

const EVENT_CHANNEL_CAPACITY: usize = 1024;
const NOTICE_CHANNEL_CAPACITY: usize = 32;
const COMMAND_CHANNEL_CAPACITY: usize = 256;

/// Close code the hub uses for an intentional, final close.
const NORMAL_CLOSE: u16 = 1000;

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum consecutive failed reconnects before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

// ── SessionConfig ────────────────────────────────────────────────────

/// Everything the actor needs to open and keep a session.
#[derive(Debug)]
pub struct SessionConfig {
    /// `ws://` or `wss://` endpoint, normally ending in `/api/websocket`.
    pub url: Url,
    /// Long-lived access token.
    pub token: SecretString,
    /// Bound on socket open plus the auth handshake.
    pub auth_timeout: Duration,
    /// Bound on each correlated request.
    pub request_timeout: Duration,
    pub reconnect: ReconnectConfig,
}

impl SessionConfig {
    pub fn new(url: Url, token: SecretString) -> Self {
        Self {
            url,
            token,
            auth_timeout: Duration::from_secs(15),
            request_timeout: Duration::from_secs(30),
            reconnect: ReconnectConfig::default(),
        }
    }
}

// ── Phase / notices ──────────────────────────────────────────────────

/// Where the actor currently is in the connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Connecting,
    Authenticating,
    /// Socket open and authenticated; requests are accepted.
    Open,
    /// Waiting before reconnect attempt `attempt`.
    BackingOff { attempt: u32 },
    /// Terminal. The actor has exited.
    Closed,
}

/// Lifecycle announcements for higher layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    /// A dropped connection was re-established and re-authenticated.
    /// Server-side subscriptions from the previous socket are gone.
    Reconnected,
    /// The hub refused the credential during a reconnect. Terminal.
    AuthRejected { message: String },
    /// The session ended. `code` is the hub's close code when the hub
    /// initiated the close.
    Closed { code: Option<u16> },
}

// ── Commands ─────────────────────────────────────────────────────────

enum Command {
    Call { request: Request, reply: Reply },
    Send { request: Request },
}

// ── HubSession ───────────────────────────────────────────────────────

/// Cloneable handle to a running session actor.
///
/// Dropping the last clone stops the actor; call
/// [`disconnect`](Self::disconnect) to close the socket and wait for it.
#[derive(Clone)]
pub struct HubSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    commands: mpsc::Sender<Command>,
    phase: watch::Receiver<SessionPhase>,
    events: broadcast::Sender<Arc<HubEvent>>,
    notices: broadcast::Sender<SessionNotice>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    request_timeout: Duration,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl HubSession {
    /// Open the socket, authenticate and spawn the actor.
    ///
    /// Resolves once the session is open. A failure of this first attempt
    /// (unreachable host, rejected token, handshake timeout) is returned
    /// as-is and no reconnect loop is started.
    pub async fn connect(config: SessionConfig) -> Result<Self, Error> {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (phase_tx, phase_rx) = watch::channel(SessionPhase::Idle);
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (notices_tx, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = oneshot::channel();
        let cancel = CancellationToken::new();
        let request_timeout = config.request_timeout;

        let actor = SessionActor {
            config,
            commands: command_rx,
            phase: phase_tx,
            events: events_tx.clone(),
            notices: notices_tx.clone(),
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(actor.run(ready_tx));

        match ready_rx.await {
            Ok(Ok(())) => Ok(Self {
                inner: Arc::new(SessionInner {
                    commands: command_tx,
                    phase: phase_rx,
                    events: events_tx,
                    notices: notices_tx,
                    cancel,
                    task: Mutex::new(Some(handle)),
                    request_timeout,
                }),
            }),
            Ok(Err(e)) => {
                let _ = handle.await;
                Err(e)
            }
            Err(_) => Err(Error::ConnectionClosed),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    pub fn phase(&self) -> SessionPhase {
        *self.inner.phase.borrow()
    }

    pub fn watch_phase(&self) -> watch::Receiver<SessionPhase> {
        self.inner.phase.clone()
    }

    pub fn is_open(&self) -> bool {
        self.phase() == SessionPhase::Open
    }

    /// Raw hub events from every active subscription, in arrival order.
    pub fn events(&self) -> broadcast::Receiver<Arc<HubEvent>> {
        self.inner.events.subscribe()
    }

    pub fn notices(&self) -> broadcast::Receiver<SessionNotice> {
        self.inner.notices.subscribe()
    }

    pub fn request_timeout(&self) -> Duration {
        self.inner.request_timeout
    }

    /// Close the socket with a normal close code and wait for the actor
    /// to exit. No reconnect follows.
    pub async fn disconnect(&self) {
        self.inner.cancel.cancel();
        let handle = self.inner.task.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    // ── Requests ─────────────────────────────────────────────────────

    /// Send a correlated request and wait for its result.
    ///
    /// Fails with [`Error::NotConnected`] unless the session is open,
    /// [`Error::Timeout`] when no result arrives in time and
    /// [`Error::ConnectionClosed`] when the socket drops first.
    pub async fn call(&self, request: Request) -> Result<Value, Error> {
        if !self.is_open() {
            return Err(Error::NotConnected);
        }

        let kind = request.kind();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.inner
            .commands
            .send(Command::Call {
                request,
                reply: reply_tx,
            })
            .await
            .map_err(|_| Error::NotConnected)?;

        match tokio::time::timeout(self.inner.request_timeout, reply_rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                tracing::warn!(kind, "request timed out");
                Err(Error::Timeout {
                    timeout_secs: self.inner.request_timeout.as_secs(),
                })
            }
        }
    }

    /// [`call`](Self::call) and decode the result payload.
    pub async fn call_as<T: DeserializeOwned>(&self, request: Request) -> Result<T, Error> {
        let value = self.call(request).await?;
        serde_json::from_value(value.clone()).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: value.to_string(),
        })
    }

    /// Fire-and-forget. Dropped with a debug log when the session is not
    /// open.
    pub fn send(&self, request: Request) {
        if !self.is_open() {
            tracing::debug!(kind = request.kind(), "session not open, dropping send");
            return;
        }
        if let Err(e) = self.inner.commands.try_send(Command::Send { request }) {
            tracing::debug!(error = %e, "command queue unavailable, dropping send");
        }
    }

    pub async fn get_states(&self) -> Result<Vec<StateObject>, Error> {
        self.call_as(Request::GetStates).await
    }

    pub async fn list_areas(&self) -> Result<Vec<AreaEntry>, Error> {
        self.call_as(Request::ListAreas).await
    }

    pub async fn list_floors(&self) -> Result<Vec<FloorEntry>, Error> {
        self.call_as(Request::ListFloors).await
    }

    pub async fn list_devices(&self) -> Result<Vec<DeviceEntry>, Error> {
        self.call_as(Request::ListDevices).await
    }

    pub async fn list_entity_registry(&self) -> Result<Vec<EntityRegistryEntry>, Error> {
        self.call_as(Request::ListEntityRegistry).await
    }

    /// Service catalogue keyed by domain then service name.
    pub async fn get_services(&self) -> Result<Value, Error> {
        self.call(Request::GetServices).await
    }

    pub async fn subscribe_events(&self, event_type: &str) -> Result<(), Error> {
        self.call(Request::SubscribeEvents {
            event_type: event_type.to_owned(),
        })
        .await
        .map(|_| ())
    }

    /// Invoke `domain.service` on one entity with optional extra fields.
    pub async fn call_service(
        &self,
        domain: &str,
        service: &str,
        entity_id: &str,
        data: Map<String, Value>,
    ) -> Result<Value, Error> {
        self.call(Request::call_service(domain, service, entity_id, data))
            .await
    }

    /// Invoke `domain.service` against an explicit target.
    pub async fn call_service_target(
        &self,
        domain: &str,
        service: &str,
        data: Option<Map<String, Value>>,
        target: ServiceTarget,
    ) -> Result<Value, Error> {
        self.call(Request::CallService {
            domain: domain.to_owned(),
            service: service.to_owned(),
            service_data: data,
            target: Some(target),
        })
        .await
    }

    pub async fn browse_media(
        &self,
        entity_id: &str,
        media_content_id: Option<String>,
        media_content_type: Option<String>,
    ) -> Result<Value, Error> {
        self.call(Request::browse_media(
            entity_id,
            media_content_id,
            media_content_type,
        ))
        .await
    }

    /// Start playback of a browsed media item on a player.
    pub async fn play_media(
        &self,
        entity_id: &str,
        media_content_id: &str,
        media_content_type: &str,
    ) -> Result<Value, Error> {
        let mut data = Map::new();
        data.insert("media_content_id".into(), Value::from(media_content_id));
        data.insert("media_content_type".into(), Value::from(media_content_type));
        self.call_service_target(
            "media_player",
            "play_media",
            Some(data),
            ServiceTarget {
                entity_id: Some(entity_id.to_owned()),
                area_id: None,
            },
        )
        .await
    }

    pub async fn ping(&self) -> Result<(), Error> {
        self.call(Request::Ping).await.map(|_| ())
    }
}

// ── Actor ────────────────────────────────────────────────────────────

struct SessionActor {
    config: SessionConfig,
    commands: mpsc::Receiver<Command>,
    phase: watch::Sender<SessionPhase>,
    events: broadcast::Sender<Arc<HubEvent>>,
    notices: broadcast::Sender<SessionNotice>,
    cancel: CancellationToken,
}

/// How a single open connection ended.
enum ConnectionEnd {
    /// Local shutdown: cancel token fired or every handle was dropped.
    Shutdown,
    /// The hub closed with the normal close code.
    ClosedByHub { code: u16 },
    /// Anything else: error, abnormal close, stream end.
    Dropped,
}

/// Result of one connect + authenticate attempt.
enum Attempt {
    Established(WsStream),
    Failed(Error),
    Stopped,
}

impl SessionActor {
    /// Main loop: connect → serve → on drop, backoff → reconnect.
    async fn run(mut self, ready: oneshot::Sender<Result<(), Error>>) {
        let mut ws = match self.establish().await {
            Attempt::Established(ws) => ws,
            Attempt::Failed(e) => {
                tracing::warn!(error = %e, "initial connection failed");
                self.phase.send_replace(SessionPhase::Closed);
                let _ = ready.send(Err(e));
                return;
            }
            Attempt::Stopped => {
                self.phase.send_replace(SessionPhase::Closed);
                let _ = ready.send(Err(Error::ConnectionClosed));
                return;
            }
        };

        self.phase.send_replace(SessionPhase::Open);
        let _ = ready.send(Ok(()));
        tracing::info!(url = %self.config.url, "hub session open");

        let close_code = 'session: loop {
            match self.run_open(ws).await {
                ConnectionEnd::Shutdown => break 'session None,
                ConnectionEnd::ClosedByHub { code } => {
                    tracing::info!(code, "hub closed the session normally, not reconnecting");
                    break 'session Some(code);
                }
                ConnectionEnd::Dropped => {
                    tracing::warn!("hub connection lost, reconnecting");
                }
            }

            let mut attempt: u32 = 0;
            ws = loop {
                if self
                    .config
                    .reconnect
                    .max_retries
                    .is_some_and(|max| attempt >= max)
                {
                    tracing::error!(attempt, "reconnection limit reached, giving up");
                    break 'session None;
                }

                let delay = backoff_delay(attempt, &self.config.reconnect);
                tracing::info!(
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    attempt,
                    "waiting before reconnect"
                );
                self.phase.send_replace(SessionPhase::BackingOff { attempt });
                if !self.wait_backoff(delay).await {
                    break 'session None;
                }

                match self.establish().await {
                    Attempt::Established(ws) => break ws,
                    Attempt::Failed(e) if e.is_auth() => {
                        tracing::error!(error = %e, "credential rejected on reconnect");
                        let _ = self.notices.send(SessionNotice::AuthRejected {
                            message: e.to_string(),
                        });
                        break 'session None;
                    }
                    Attempt::Failed(e) => {
                        tracing::warn!(error = %e, attempt, "reconnect attempt failed");
                        attempt += 1;
                    }
                    Attempt::Stopped => break 'session None,
                }
            };

            self.phase.send_replace(SessionPhase::Open);
            tracing::info!("hub session re-established");
            let _ = self.notices.send(SessionNotice::Reconnected);
        };

        self.phase.send_replace(SessionPhase::Closed);
        let _ = self.notices.send(SessionNotice::Closed { code: close_code });
        tracing::debug!("session actor exiting");
    }

    /// One connect + authenticate attempt, bounded by the auth timeout.
    /// Commands that arrive meanwhile are refused.
    async fn establish(&mut self) -> Attempt {
        let timeout = self.config.auth_timeout;
        let handshake = tokio::time::timeout(
            timeout,
            open_and_authenticate(&self.config.url, &self.config.token, &self.phase),
        );
        tokio::pin!(handshake);

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Attempt::Stopped,
                result = &mut handshake => {
                    return match result {
                        Ok(Ok(ws)) => Attempt::Established(ws),
                        Ok(Err(e)) => Attempt::Failed(e),
                        Err(_) => Attempt::Failed(Error::AuthTimeout {
                            timeout_secs: timeout.as_secs(),
                        }),
                    };
                }
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => refuse(cmd),
                    None => return Attempt::Stopped,
                },
            }
        }
    }

    /// Sleep out a backoff delay, refusing commands. Returns `false` on
    /// shutdown.
    async fn wait_backoff(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return false,
                () = &mut sleep => return true,
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => refuse(cmd),
                    None => return false,
                },
            }
        }
    }

    /// Serve one authenticated connection until it ends.
    async fn run_open(&mut self, ws: WsStream) -> ConnectionEnd {
        let (mut write, mut read) = ws.split();
        let mut correlator = Correlator::new();

        let end = loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    close_normally(&mut write).await;
                    break ConnectionEnd::Shutdown;
                }
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Call { request, reply }) => {
                        let id = correlator.register(request.kind(), reply);
                        if let Err(e) = write_request(&mut write, &request, id).await {
                            let fatal = !matches!(e, Error::Serialization(_));
                            correlator.reject(id, e);
                            if fatal {
                                break ConnectionEnd::Dropped;
                            }
                        }
                    }
                    Some(Command::Send { request }) => {
                        let id = correlator.allocate();
                        match write_request(&mut write, &request, id).await {
                            Ok(()) => {}
                            Err(Error::Serialization(e)) => {
                                tracing::warn!(error = %e, "could not encode request");
                            }
                            Err(_) => break ConnectionEnd::Dropped,
                        }
                    }
                    None => {
                        close_normally(&mut write).await;
                        break ConnectionEnd::Shutdown;
                    }
                },
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        self.dispatch(text.as_str(), &mut correlator);
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let code = frame.as_ref().map(|cf| u16::from(cf.code));
                        tracing::info!(?code, "close frame received");
                        break match code {
                            Some(NORMAL_CLOSE) => ConnectionEnd::ClosedByHub { code: NORMAL_CLOSE },
                            _ => ConnectionEnd::Dropped,
                        };
                    }
                    Some(Ok(_)) => {
                        // Ping/Pong/Binary: tungstenite answers pings itself
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "socket error");
                        break ConnectionEnd::Dropped;
                    }
                    None => {
                        tracing::info!("socket stream ended");
                        break ConnectionEnd::Dropped;
                    }
                },
            }
        };

        correlator.reject_all();
        end
    }

    fn dispatch(&self, text: &str, correlator: &mut Correlator) {
        match serde_json::from_str::<InboundMessage>(text) {
            Ok(InboundMessage::Result(msg)) => {
                correlator.resolve(msg);
            }
            Ok(InboundMessage::Event(msg)) => {
                // No receivers is fine
                let _ = self.events.send(Arc::new(msg.event));
            }
            Ok(InboundMessage::Pong { id }) => {
                correlator.resolve(ResultMessage {
                    id,
                    success: true,
                    result: None,
                    error: None,
                });
            }
            Ok(other) => {
                tracing::debug!(?other, "unexpected handshake frame on open session");
            }
            Err(e) => {
                tracing::debug!(error = %e, "failed to parse inbound frame");
            }
        }
    }
}

// ── Handshake ────────────────────────────────────────────────────────

/// Open the socket and run the auth exchange. Nothing is written before
/// the hub sends `auth_required`.
async fn open_and_authenticate(
    url: &Url,
    token: &SecretString,
    phase: &watch::Sender<SessionPhase>,
) -> Result<WsStream, Error> {
    phase.send_replace(SessionPhase::Connecting);
    tracing::debug!(url = %url, "connecting");

    let (mut ws, _response) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    phase.send_replace(SessionPhase::Authenticating);

    loop {
        match next_inbound(&mut ws).await? {
            InboundMessage::AuthRequired { ha_version } => {
                tracing::debug!(?ha_version, "auth required");
                break;
            }
            other => tracing::trace!(?other, "ignoring frame before auth_required"),
        }
    }

    let frame = serde_json::to_string(&AuthFrame::new(token.expose_secret()))
        .map_err(|e| Error::Serialization(e.to_string()))?;
    ws.send(Message::text(frame))
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    loop {
        match next_inbound(&mut ws).await? {
            InboundMessage::AuthOk { ha_version } => {
                tracing::debug!(?ha_version, "authenticated");
                return Ok(ws);
            }
            InboundMessage::AuthInvalid { message } => {
                return Err(Error::Authentication {
                    message: message.unwrap_or_else(|| "invalid access token".into()),
                });
            }
            other => tracing::trace!(?other, "ignoring frame during auth"),
        }
    }
}

async fn next_inbound(ws: &mut WsStream) -> Result<InboundMessage, Error> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => {
                match serde_json::from_str::<InboundMessage>(text.as_str()) {
                    Ok(msg) => return Ok(msg),
                    Err(e) => tracing::debug!(error = %e, "unparseable handshake frame"),
                }
            }
            Some(Ok(Message::Close(frame))) => {
                return Err(match frame {
                    Some(cf) => Error::WebSocketClosed {
                        code: u16::from(cf.code),
                        reason: cf.reason.as_str().to_owned(),
                    },
                    None => Error::ConnectionClosed,
                });
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(Error::WebSocketConnect(e.to_string())),
            None => return Err(Error::ConnectionClosed),
        }
    }
}

// ── Frame helpers ────────────────────────────────────────────────────

async fn write_request(write: &mut WsWrite, request: &Request, id: u64) -> Result<(), Error> {
    let frame = request.to_frame(id)?;
    tracing::trace!(id, kind = request.kind(), "sending request");
    write
        .send(Message::text(frame))
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))
}

async fn close_normally(write: &mut WsWrite) {
    let frame = CloseFrame {
        code: CloseCode::Normal,
        reason: "client disconnect".into(),
    };
    if let Err(e) = write.send(Message::Close(Some(frame))).await {
        tracing::debug!(error = %e, "close frame not delivered");
    }
}

fn refuse(cmd: Command) {
    match cmd {
        Command::Call { reply, .. } => {
            let _ = reply.send(Err(Error::NotConnected));
        }
        Command::Send { request } => {
            tracing::debug!(kind = request.kind(), "session not open, dropping send");
        }
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// `delay = min(initial * 2^attempt, max)`
pub(crate) fn backoff_delay(attempt: u32, config: &ReconnectConfig) -> Duration {
    config
        .initial_delay
        .saturating_mul(2_u32.saturating_pow(attempt))
        .min(config.max_delay)
}

// ── Tests ────────────────────────────────────────────────────────────
