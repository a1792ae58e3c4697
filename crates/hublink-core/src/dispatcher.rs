// ── Optimistic command dispatcher ──
//
// Toggle-style commands show their target state in the mirror before the
// hub answers. Each entity has at most one `PendingAction`; it owns the
// abort handle of its deadline timer. Whatever happens first settles it:
// a matching change event (confirm), the deadline (rollback), or a send
// error (immediate rollback).
//
// Every mirror write that can race with an overlay (change events,
// snapshot application, rollbacks) goes through here under the pending
// table lock, so an overlay and its rollback never interleave with a hub
// update.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::client::{HubClient, ServiceCall};
use crate::domain::{Capability, strategy_for};
use crate::error::CoreError;
use crate::model::{Domain, EntityId, StateChange};
use crate::notice::{Notice, NoticeBus};
use crate::snapshot::Snapshot;
use crate::store::{MirrorStore, UpsertOutcome};

// ── Pending actions ──────────────────────────────────────────────────

/// A tentative state change waiting for the hub to report it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAction {
    pub entity_id: EntityId,
    pub target_state: String,
    /// Rollback target: the last state the hub itself reported, never a
    /// superseded overlay.
    pub previous_state: String,
    pub deadline: Instant,
    /// Monotonic across all entities. Timers and send-failure handlers
    /// only act on the record carrying their own number.
    pub seq: u64,
    /// Set when the hub confirmed the target.
    pub confirmed_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
enum Resolution {
    Confirmed(PendingAction),
    Expired,
    SendFailed(String),
    Superseded,
    Cleared,
}

struct PendingSlot {
    action: PendingAction,
    timer: Option<AbortHandle>,
    resolve: Option<oneshot::Sender<Resolution>>,
}

impl PendingSlot {
    fn finish(mut self, resolution: Resolution) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        if let Some(tx) = self.resolve.take() {
            let _ = tx.send(resolution);
        }
    }
}

/// Handle to the fate of one optimistic command.
#[derive(Debug)]
pub struct PendingReceipt {
    entity_id: EntityId,
    seq: u64,
    window: Duration,
    rx: oneshot::Receiver<Resolution>,
}

impl PendingReceipt {
    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Wait until the command is confirmed or given up on.
    pub async fn confirmed(self) -> Result<PendingAction, CoreError> {
        let entity_id = self.entity_id.to_string();
        match self.rx.await {
            Ok(Resolution::Confirmed(action)) => Ok(action),
            Ok(Resolution::Expired) => Err(CoreError::ConfirmationTimeout {
                entity_id,
                window_secs: self.window.as_secs(),
            }),
            Ok(Resolution::SendFailed(reason)) => Err(CoreError::SendFailed { entity_id, reason }),
            Ok(Resolution::Superseded) => Err(CoreError::Superseded { entity_id }),
            Ok(Resolution::Cleared) | Err(_) => Err(CoreError::ConnectionClosed),
        }
    }
}

/// What a dispatch did.
#[derive(Debug)]
pub enum CommandOutcome {
    /// Sent and accepted with no local overlay.
    Sent,
    /// Overlay applied; the receipt settles on confirm or rollback.
    Optimistic(PendingReceipt),
}

// ── CommandDispatcher ────────────────────────────────────────────────

/// Entry point for every entity command the UI issues.
pub struct CommandDispatcher<C: HubClient> {
    inner: Arc<DispatcherInner<C>>,
}

impl<C: HubClient> Clone for CommandDispatcher<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct DispatcherInner<C> {
    client: C,
    store: Arc<MirrorStore>,
    notices: NoticeBus,
    window: Duration,
    pending: Mutex<HashMap<String, PendingSlot>>,
    next_seq: AtomicU64,
}

impl<C: HubClient> CommandDispatcher<C> {
    pub fn new(client: C, store: Arc<MirrorStore>, notices: NoticeBus, window: Duration) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                client,
                store,
                notices,
                window,
                pending: Mutex::new(HashMap::new()),
                next_seq: AtomicU64::new(0),
            }),
        }
    }

    pub fn client(&self) -> &C {
        &self.inner.client
    }

    pub fn window(&self) -> Duration {
        self.inner.window
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Flip an entity using its domain's toggle rule.
    pub async fn toggle_entity(&self, entity_id: &str) -> Result<CommandOutcome, CoreError> {
        let id = self.precheck(entity_id)?;
        let entity = self
            .inner
            .store
            .entity(id.as_str())
            .ok_or_else(|| CoreError::EntityNotFound {
                entity_id: id.to_string(),
            })?;

        let domain = id.domain();
        let strategy = strategy_for(&domain);
        let plan = strategy
            .toggle_plan(&entity.state)
            .ok_or_else(|| unsupported("toggle", &domain))?;

        let call = ServiceCall::new(&id, plan.service);
        match plan.target_state {
            Some(target) if strategy.optimistic => self.send_optimistic(call, target).await,
            _ => self.send_plain(call).await,
        }
    }

    /// Call an arbitrary service on an entity. With `expected_state`, and
    /// in a domain that allows it, the mirror shows that state until the
    /// hub confirms or the window lapses.
    pub async fn control_entity(
        &self,
        entity_id: &str,
        service: &str,
        data: Map<String, Value>,
        expected_state: Option<&str>,
    ) -> Result<CommandOutcome, CoreError> {
        let id = self.precheck(entity_id)?;
        let optimistic = strategy_for(&id.domain()).optimistic
            && self.inner.store.entity(id.as_str()).is_some();

        let call = ServiceCall::new(&id, service).with_data(data);
        match expected_state {
            Some(target) if optimistic => self.send_optimistic(call, target).await,
            _ => self.send_plain(call).await,
        }
    }

    /// `number`/`input_number` value, or a climate target temperature.
    pub async fn set_value(&self, entity_id: &str, value: f64) -> Result<CommandOutcome, CoreError> {
        let id = self.precheck(entity_id)?;
        let domain = id.domain();
        if !strategy_for(&domain).supports(Capability::SetValue) {
            return Err(unsupported("set_value", &domain));
        }

        let (service, field) = match domain {
            Domain::Climate => ("set_temperature", "temperature"),
            _ => ("set_value", "value"),
        };
        let mut data = Map::new();
        data.insert(field.into(), Value::from(value));
        self.control_entity(id.as_str(), service, data, None).await
    }

    pub async fn select_option(
        &self,
        entity_id: &str,
        option: &str,
    ) -> Result<CommandOutcome, CoreError> {
        let id = self.precheck(entity_id)?;
        let domain = id.domain();
        if !strategy_for(&domain).supports(Capability::SelectOption) {
            return Err(unsupported("select_option", &domain));
        }

        let mut data = Map::new();
        data.insert("option".into(), Value::from(option));
        self.control_entity(id.as_str(), "select_option", data, Some(option))
            .await
    }

    // ── Mirror writes ────────────────────────────────────────────────

    /// Apply a hub change event and settle any pending command on it.
    pub fn apply_change_event(&self, change: &StateChange) -> Option<UpsertOutcome> {
        let mut pending = self.inner.lock_pending();
        let outcome = self.inner.store.apply_change_event(change)?;
        let key = change.entity_id.as_str();
        let observed = change.new_state.as_ref().map(|e| e.state.as_str())?;
        self.inner.reconcile(&mut pending, key, Some(observed));
        Some(outcome)
    }

    /// Replace the mirror with a snapshot, then re-check every pending
    /// command against the fresh states.
    pub fn apply_snapshot(&self, snapshot: Snapshot) {
        let mut pending = self.inner.lock_pending();
        self.inner.store.apply_snapshot(snapshot);

        let keys: Vec<String> = pending.keys().cloned().collect();
        for key in keys {
            let observed = self.inner.store.entity_state(&key);
            self.inner.reconcile(&mut pending, &key, observed.as_deref());
        }
    }

    // ── Bookkeeping ──────────────────────────────────────────────────

    pub fn pending_action(&self, entity_id: &str) -> Option<PendingAction> {
        self.inner
            .lock_pending()
            .get(entity_id)
            .map(|slot| slot.action.clone())
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock_pending().len()
    }

    /// Drop every outstanding command, restoring the hub-observed states.
    /// Used before a resync restates ground truth.
    pub fn clear_all_pending(&self) -> usize {
        let mut pending = self.inner.lock_pending();
        let drained: Vec<PendingSlot> = pending.drain().map(|(_, slot)| slot).collect();
        for slot in &drained {
            self.inner
                .store
                .set_entity_state(slot.action.entity_id.as_str(), &slot.action.previous_state);
        }
        drop(pending);

        let count = drained.len();
        for slot in drained {
            slot.finish(Resolution::Cleared);
        }
        if count > 0 {
            info!(count, "cleared pending commands");
            self.inner.notices.publish(Notice::PendingCleared { count });
        }
        count
    }

    /// Cancel every deadline timer. Nothing fires afterwards.
    pub fn shutdown(&self) {
        self.clear_all_pending();
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn precheck(&self, entity_id: &str) -> Result<EntityId, CoreError> {
        if !self.inner.client.is_connected() {
            return Err(CoreError::NotConnected);
        }
        Ok(entity_id.parse::<EntityId>()?)
    }

    async fn send_plain(&self, call: ServiceCall) -> Result<CommandOutcome, CoreError> {
        let entity_id = call.entity_id.to_string();
        debug!(%entity_id, service = %call.service, "sending command");

        match self.inner.client.call_service(call).await {
            Ok(()) => {
                self.inner.store.record_send_success();
                Ok(CommandOutcome::Sent)
            }
            Err(e) => {
                let issues = self.inner.store.record_send_failure();
                warn!(%entity_id, error = %e, issues, "command failed");
                self.inner.notices.publish(Notice::SendFailed {
                    entity_id: entity_id.clone(),
                    restored_state: None,
                    reason: e.to_string(),
                });
                Err(send_error(entity_id, e))
            }
        }
    }

    async fn send_optimistic(
        &self,
        call: ServiceCall,
        target: &str,
    ) -> Result<CommandOutcome, CoreError> {
        let inner = &self.inner;
        let entity_id = call.entity_id.clone();
        let key = entity_id.to_string();
        let seq = inner.next_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = oneshot::channel();

        {
            let mut pending = inner.lock_pending();
            let previous_state = match pending.remove(&key) {
                Some(old) => {
                    debug!(entity_id = %key, replaced = old.action.seq, seq, "replacing pending command");
                    let previous = old.action.previous_state.clone();
                    old.finish(Resolution::Superseded);
                    previous
                }
                None => inner
                    .store
                    .entity_state(&key)
                    .ok_or_else(|| CoreError::EntityNotFound {
                        entity_id: key.clone(),
                    })?,
            };

            inner.store.set_entity_state(&key, target);
            let timer = self.arm_deadline(key.clone(), seq);
            pending.insert(
                key.clone(),
                PendingSlot {
                    action: PendingAction {
                        entity_id: entity_id.clone(),
                        target_state: target.to_owned(),
                        previous_state,
                        deadline: Instant::now() + inner.window,
                        seq,
                        confirmed_at: None,
                    },
                    timer: Some(timer),
                    resolve: Some(tx),
                },
            );
        }

        debug!(entity_id = %key, service = %call.service, target, seq, "optimistic command");
        match inner.client.call_service(call).await {
            Ok(()) => {
                inner.store.record_send_success();
                Ok(CommandOutcome::Optimistic(PendingReceipt {
                    entity_id,
                    seq,
                    window: inner.window,
                    rx,
                }))
            }
            Err(e) => {
                let issues = inner.store.record_send_failure();
                warn!(entity_id = %key, error = %e, issues, "command send failed, state restored");
                inner.rollback_send_failure(&key, seq, &e.to_string());
                Err(send_error(key, e))
            }
        }
    }

    fn arm_deadline(&self, key: String, seq: u64) -> AbortHandle {
        let weak = Arc::downgrade(&self.inner);
        let window = self.inner.window;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            if let Some(inner) = weak.upgrade() {
                inner.expire(&key, seq);
            }
        })
        .abort_handle()
    }
}

impl<C> DispatcherInner<C> {
    fn lock_pending(&self) -> MutexGuard<'_, HashMap<String, PendingSlot>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_if_current(
        pending: &mut HashMap<String, PendingSlot>,
        key: &str,
        seq: u64,
    ) -> Option<PendingSlot> {
        match pending.get(key) {
            Some(slot) if slot.action.seq == seq => pending.remove(key),
            _ => None,
        }
    }

    /// Deadline reached with the record still in place.
    fn expire(&self, key: &str, seq: u64) {
        let mut pending = self.lock_pending();
        let Some(mut slot) = Self::take_if_current(&mut pending, key, seq) else {
            return;
        };
        // Running inside this timer's own task.
        slot.timer = None;
        let restored = slot.action.previous_state.clone();
        self.store.set_entity_state(key, &restored);
        drop(pending);

        warn!(
            entity_id = key,
            target = %slot.action.target_state,
            restored = %restored,
            "no confirmation before deadline, state restored"
        );
        self.notices.publish(Notice::CommandExpired {
            entity_id: key.to_owned(),
            restored_state: restored,
        });
        slot.finish(Resolution::Expired);
    }

    fn rollback_send_failure(&self, key: &str, seq: u64, reason: &str) {
        let mut pending = self.lock_pending();
        let slot = Self::take_if_current(&mut pending, key, seq);
        if let Some(slot) = &slot {
            self.store.set_entity_state(key, &slot.action.previous_state);
        }
        drop(pending);

        self.notices.publish(Notice::SendFailed {
            entity_id: key.to_owned(),
            restored_state: slot.as_ref().map(|s| s.action.previous_state.clone()),
            reason: reason.to_owned(),
        });
        if let Some(slot) = slot {
            slot.finish(Resolution::SendFailed(reason.to_owned()));
        }
    }

    /// Settle or refresh the pending record for `key` given the state the
    /// hub now reports (`None`: the entity is gone). Caller holds the lock.
    fn reconcile(
        &self,
        pending: &mut HashMap<String, PendingSlot>,
        key: &str,
        observed: Option<&str>,
    ) {
        let Some(slot) = pending.get_mut(key) else {
            return;
        };

        match observed {
            Some(state) if state == slot.action.target_state => {
                let Some(mut slot) = pending.remove(key) else {
                    return;
                };
                let confirmed_at = Utc::now();
                slot.action.confirmed_at = Some(confirmed_at);
                debug!(entity_id = key, state, seq = slot.action.seq, "command confirmed");
                self.notices.publish(Notice::Confirmed {
                    entity_id: key.to_owned(),
                    state: state.to_owned(),
                    confirmed_at,
                });
                let action = slot.action.clone();
                slot.finish(Resolution::Confirmed(action));
            }
            Some(state) => {
                debug!(
                    entity_id = key,
                    observed = state,
                    target = %slot.action.target_state,
                    "intermediate state, keeping overlay"
                );
                slot.action.previous_state = state.to_owned();
                self.store.set_entity_state(key, &slot.action.target_state);
            }
            None => {
                if let Some(slot) = pending.remove(key) {
                    slot.finish(Resolution::Cleared);
                }
            }
        }
    }
}

fn unsupported(operation: &str, domain: &Domain) -> CoreError {
    CoreError::Unsupported {
        operation: operation.to_owned(),
        domain: domain.to_string(),
    }
}

fn send_error(entity_id: String, err: CoreError) -> CoreError {
    if err.is_send_failure() {
        CoreError::SendFailed {
            entity_id,
            reason: err.to_string(),
        }
    } else {
        err
    }
}
