// ── Controller abstraction ──
//
// Full lifecycle management for a hub connection. Opens the session,
// starts the change feed before the first snapshot, keeps the mirror in
// step with reconnects and resync signals, and routes commands through
// the dispatcher and media controls.

use std::future::Future;
use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hublink_api::{EventSubscriptions, HubSession, SessionNotice, SessionPhase};

use crate::client::{HubClient, SessionClient, StateChangeFeed};
use crate::config::HubConfig;
use crate::dispatcher::{CommandDispatcher, CommandOutcome};
use crate::error::CoreError;
use crate::media::{MediaAction, MediaControls, MediaSendOutcome};
use crate::model::{Area, Device, Domain, Entity, Floor, StateChange};
use crate::notice::{Notice, NoticeBus};
use crate::resync::{RESYNC_CHANNEL_SIZE, ResyncGate, ResyncSignal, ResyncTrigger};
use crate::snapshot::load_snapshot;
use crate::store::{ConnectionStatus, MirrorStore};

const CHANGE_CHANNEL_SIZE: usize = 256;

// ── Controller ───────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<ControllerInner>`. A controller connects
/// once; after [`disconnect`](Self::disconnect) build a new one.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: HubConfig,
    store: Arc<MirrorStore>,
    client: SessionClient,
    dispatcher: CommandDispatcher<SessionClient>,
    media: MediaControls<SessionClient>,
    notices: NoticeBus,
    changes: broadcast::Sender<Arc<StateChange>>,
    resync_tx: mpsc::Sender<ResyncSignal>,
    resync_rx: Mutex<Option<mpsc::Receiver<ResyncSignal>>>,
    cancel: CancellationToken,
    /// Cancels the tasks bound to the current session.
    link_cancel: Mutex<Option<CancellationToken>>,
    /// Serializes connect / resync / disconnect.
    lifecycle: Mutex<()>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Controller {
    /// Create a controller. Does NOT connect; call
    /// [`connect()`](Self::connect).
    pub fn new(config: HubConfig) -> Self {
        let store = Arc::new(MirrorStore::new());
        let client = SessionClient::new();
        let notices = NoticeBus::new();
        let tuning = &config.tuning;

        let dispatcher = CommandDispatcher::new(
            client.clone(),
            Arc::clone(&store),
            notices.clone(),
            tuning.optimistic_window,
        );
        let media = MediaControls::new(
            client.clone(),
            Arc::clone(&store),
            notices.clone(),
            tuning.media_confirm_window,
            tuning.media_ceiling,
        );
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_SIZE);
        let (resync_tx, resync_rx) = mpsc::channel(RESYNC_CHANNEL_SIZE);

        Self {
            inner: Arc::new(ControllerInner {
                config,
                store,
                client,
                dispatcher,
                media,
                notices,
                changes,
                resync_tx,
                resync_rx: Mutex::new(Some(resync_rx)),
                cancel: CancellationToken::new(),
                link_cancel: Mutex::new(None),
                lifecycle: Mutex::new(()),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<MirrorStore> {
        &self.inner.store
    }

    pub fn dispatcher(&self) -> &CommandDispatcher<SessionClient> {
        &self.inner.dispatcher
    }

    pub fn media(&self) -> &MediaControls<SessionClient> {
        &self.inner.media
    }

    // ── Connection lifecycle ─────────────────────────────────────────

    /// Connect, authenticate, subscribe to state changes and load the
    /// first snapshot. Failures are returned; no retry loop is started.
    pub async fn connect(&self) -> Result<(), CoreError> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        self.establish().await?;
        self.spawn_resync_task().await;
        Ok(())
    }

    /// Stop every background task, close the session and cancel all
    /// pending timers.
    pub async fn disconnect(&self) {
        let _lifecycle = self.inner.lifecycle.lock().await;
        self.inner.cancel.cancel();
        self.teardown_link().await;

        let handles: Vec<JoinHandle<()>> = self.inner.task_handles.lock().await.drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }

        self.inner.dispatcher.shutdown();
        self.inner.media.reset_all();
        self.inner
            .store
            .set_connection_status(ConnectionStatus::Disconnected);
        debug!("disconnected");
    }

    /// Reload the snapshot, reconnecting first when the session is not
    /// open.
    pub async fn resync(&self) -> Result<(), CoreError> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        if self.inner.client.is_connected() {
            debug!("resyncing mirror");
            self.resubscribe(false).await?;
            self.refresh().await?;
            self.inner.store.set_last_error(None);
            Ok(())
        } else {
            info!("session not open, reconnecting before resync");
            self.establish().await
        }
    }

    /// Sender for platform hooks (foreground, network online, ...).
    pub fn resync_trigger(&self) -> ResyncTrigger {
        ResyncTrigger::new(self.inner.resync_tx.clone())
    }

    /// Fetch a full snapshot and apply it. On failure the mirror keeps
    /// its previous contents.
    pub async fn refresh(&self) -> Result<(), CoreError> {
        let snapshot = load_snapshot(&self.inner.client).await?;
        self.inner.dispatcher.apply_snapshot(snapshot);
        Ok(())
    }

    // ── One-shot convenience ─────────────────────────────────────────

    /// Connect, run the closure, disconnect.
    pub async fn oneshot<F, Fut, T>(config: HubConfig, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(Controller) -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let controller = Controller::new(config);
        controller.connect().await?;
        let result = f(controller.clone()).await;
        controller.disconnect().await;
        result
    }

    // ── State observation ────────────────────────────────────────────

    pub fn connection_status(&self) -> ConnectionStatus {
        self.inner.store.connection_status()
    }

    pub fn watch_connection_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.store.watch_connection_status()
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.inner.notices.subscribe()
    }

    /// Every applied change event, after the mirror was updated.
    pub fn state_changes(&self) -> broadcast::Receiver<Arc<StateChange>> {
        self.inner.changes.subscribe()
    }

    // ── Selectors (delegate to MirrorStore) ──────────────────────────

    pub fn entities_snapshot(&self) -> Arc<Vec<Arc<Entity>>> {
        self.inner.store.entities_snapshot()
    }

    pub fn entity(&self, entity_id: &str) -> Option<Arc<Entity>> {
        self.inner.store.entity(entity_id)
    }

    pub fn entities_in_domain(&self, domain: &Domain) -> Vec<Arc<Entity>> {
        self.inner.store.entities_in_domain(domain)
    }

    pub fn entities_in_area(&self, area_id: &str) -> Vec<Arc<Entity>> {
        self.inner.store.entities_in_area(area_id)
    }

    pub fn areas_snapshot(&self) -> Arc<Vec<Arc<Area>>> {
        self.inner.store.areas_snapshot()
    }

    pub fn floors_snapshot(&self) -> Arc<Vec<Arc<Floor>>> {
        self.inner.store.floors_snapshot()
    }

    pub fn devices_snapshot(&self) -> Arc<Vec<Arc<Device>>> {
        self.inner.store.devices_snapshot()
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub async fn toggle_entity(&self, entity_id: &str) -> Result<CommandOutcome, CoreError> {
        self.inner.dispatcher.toggle_entity(entity_id).await
    }

    pub async fn control_entity(
        &self,
        entity_id: &str,
        service: &str,
        data: Map<String, Value>,
        expected_state: Option<&str>,
    ) -> Result<CommandOutcome, CoreError> {
        self.inner
            .dispatcher
            .control_entity(entity_id, service, data, expected_state)
            .await
    }

    pub async fn media_action(
        &self,
        entity_id: &str,
        action: MediaAction,
    ) -> Result<MediaSendOutcome, CoreError> {
        self.inner.media.send(entity_id, action).await
    }

    /// Service catalogue keyed by domain.
    pub async fn get_services(&self) -> Result<Value, CoreError> {
        Ok(self.inner.client.session()?.get_services().await?)
    }

    pub async fn browse_media(
        &self,
        entity_id: &str,
        media_content_id: Option<String>,
        media_content_type: Option<String>,
    ) -> Result<Value, CoreError> {
        Ok(self
            .inner
            .client
            .session()?
            .browse_media(entity_id, media_content_id, media_content_type)
            .await?)
    }

    pub async fn play_media(
        &self,
        entity_id: &str,
        media_content_id: &str,
        media_content_type: &str,
    ) -> Result<(), CoreError> {
        self.inner
            .client
            .session()?
            .play_media(entity_id, media_content_id, media_content_type)
            .await?;
        Ok(())
    }

    // ── Private helpers ──────────────────────────────────────────────

    async fn establish(&self) -> Result<(), CoreError> {
        self.teardown_link().await;
        self.inner
            .store
            .set_connection_status(ConnectionStatus::Connecting);

        match self.open_link().await {
            Ok(()) => {
                self.inner.store.set_last_error(None);
                self.mark_connected();
                info!(url = %self.inner.config.url, "connected to hub");
                Ok(())
            }
            Err(e) => {
                self.teardown_link().await;
                self.inner.store.set_last_error(Some(e.to_string()));
                self.inner
                    .store
                    .set_connection_status(ConnectionStatus::Disconnected);
                Err(e)
            }
        }
    }

    async fn open_link(&self) -> Result<(), CoreError> {
        let session_config = self.inner.config.session_config()?;
        let url = session_config.url.to_string();
        let session = HubSession::connect(session_config)
            .await
            .map_err(|e| with_url(CoreError::from(e), &url))?;

        let subscriptions = EventSubscriptions::start_managed(session.clone());
        self.inner.client.attach(session.clone(), subscriptions);

        // Listen before the snapshot so no change falls between the two.
        let feed = self.inner.client.subscribe_state_changes().await?;

        let cancel = self.inner.cancel.child_token();
        *self.inner.link_cancel.lock().await = Some(cancel.clone());
        {
            let mut handles = self.inner.task_handles.lock().await;
            handles.push(tokio::spawn(event_pump(
                self.clone(),
                feed,
                cancel.clone(),
            )));
            handles.push(tokio::spawn(session_watch(
                self.clone(),
                session.watch_phase(),
                session.notices(),
                cancel,
            )));
        }

        self.refresh().await
    }

    async fn teardown_link(&self) {
        if let Some(cancel) = self.inner.link_cancel.lock().await.take() {
            cancel.cancel();
        }
        if let Some(link) = self.inner.client.detach() {
            link.subscriptions.shutdown().await;
            link.session.disconnect().await;
        }
        self.inner
            .task_handles
            .lock()
            .await
            .retain(|handle| !handle.is_finished());
    }

    /// Re-issue the change-feed subscription. After a reconnect every
    /// subscription is gone (`all`); otherwise only failed ones are retried.
    async fn resubscribe(&self, all: bool) -> Result<(), CoreError> {
        let link = self.inner.client.link().ok_or(CoreError::NotConnected)?;
        let result = if all {
            link.subscriptions.resubscribe().await
        } else {
            link.subscriptions.resubscribe_missing().await
        };
        result.map_err(CoreError::from)
    }

    /// Runs once per controller. Spawned from `connect` only: the task
    /// drives `resync`, which re-enters `establish`.
    async fn spawn_resync_task(&self) {
        if let Some(rx) = self.inner.resync_rx.lock().await.take() {
            let ctrl = self.clone();
            let cancel = self.inner.cancel.clone();
            self.inner
                .task_handles
                .lock()
                .await
                .push(tokio::spawn(resync_task(ctrl, rx, cancel)));
        }
    }

    /// Entering `connected` invalidates every optimistic overlay and
    /// outstanding media confirmation.
    fn mark_connected(&self) {
        let cleared = self.inner.dispatcher.clear_all_pending();
        self.inner.media.reset_all();
        self.inner
            .store
            .set_connection_status(ConnectionStatus::Connected);
        if cleared > 0 {
            debug!(cleared, "pending commands dropped on connect");
        }
    }

    fn apply_change(&self, change: StateChange) {
        self.inner.dispatcher.apply_change_event(&change);
        self.inner.media.on_state_change(&change);
        let _ = self.inner.changes.send(Arc::new(change));
    }

    fn on_phase(&self, phase: SessionPhase) {
        let status = match phase {
            SessionPhase::Connecting
            | SessionPhase::Authenticating
            | SessionPhase::BackingOff { .. } => ConnectionStatus::Connecting,
            SessionPhase::Closed => ConnectionStatus::Disconnected,
            SessionPhase::Idle | SessionPhase::Open => return,
        };
        self.inner.store.set_connection_status(status);
    }

    async fn on_reconnected(&self) {
        info!("reconnected to hub, resyncing");
        self.mark_connected();
        // Listen again before the snapshot so no change falls between the two.
        let subscribed = self.resubscribe(true).await;
        let refreshed = self.refresh().await;
        match subscribed.and(refreshed) {
            Ok(()) => self.inner.store.set_last_error(None),
            Err(e) => {
                warn!(error = %e, "resync after reconnect failed");
                self.inner.store.set_last_error(Some(e.to_string()));
            }
        }
    }

    fn on_closed(&self, code: Option<u16>) {
        info!(?code, "hub session ended");
        self.inner
            .store
            .set_connection_status(ConnectionStatus::Disconnected);
        if self.inner.store.last_error().is_none() {
            let message = match code {
                Some(code) => format!("Hub closed the connection (code {code})"),
                None => "Connection to hub closed".to_owned(),
            };
            self.inner.store.set_last_error(Some(message));
        }
    }
}

fn with_url(err: CoreError, url: &str) -> CoreError {
    match err {
        CoreError::ConnectionFailed { reason, .. } => CoreError::ConnectionFailed {
            url: url.to_owned(),
            reason,
        },
        other => other,
    }
}

// ── Background tasks ─────────────────────────────────────────────────

/// Feed change events into the mirror in arrival order.
async fn event_pump(ctrl: Controller, mut feed: StateChangeFeed, cancel: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            change = feed.next() => {
                let Some(change) = change else { break };
                ctrl.apply_change(change);
            }
        }
    }
    debug!("event pump stopped");
}

/// Mirror session phase into connection status and react to lifecycle
/// notices.
async fn session_watch(
    ctrl: Controller,
    mut phase: watch::Receiver<SessionPhase>,
    mut notices: broadcast::Receiver<SessionNotice>,
    cancel: CancellationToken,
) {
    let mut phase_live = true;
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            notice = notices.recv() => match notice {
                Ok(SessionNotice::Reconnected) => ctrl.on_reconnected().await,
                Ok(SessionNotice::AuthRejected { message }) => {
                    warn!(%message, "hub rejected the token on reconnect");
                    ctrl.inner
                        .store
                        .set_last_error(Some(format!("Authentication failed: {message}")));
                }
                Ok(SessionNotice::Closed { code }) => {
                    ctrl.on_closed(code);
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "session notices lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            changed = phase.changed(), if phase_live => match changed {
                Ok(()) => {
                    let current = *phase.borrow_and_update();
                    ctrl.on_phase(current);
                }
                Err(_) => phase_live = false,
            },
        }
    }
    debug!("session watch stopped");
}

/// Debounce resync signals and act on the ones that pass.
async fn resync_task(
    ctrl: Controller,
    mut rx: mpsc::Receiver<ResyncSignal>,
    cancel: CancellationToken,
) {
    let mut gate = ResyncGate::new(ctrl.inner.config.tuning.resync_min_interval);
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            signal = rx.recv() => {
                let Some(signal) = signal else { break };
                if !gate.admit(signal, Instant::now()) {
                    continue;
                }
                info!(%signal, "resync requested");
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    result = ctrl.resync() => {
                        if let Err(e) = result {
                            warn!(error = %e, "resync failed");
                        }
                    }
                }
            }
        }
    }
}
