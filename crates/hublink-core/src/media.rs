// ── Media transport controls ──
//
// Play/pause are single-flight: while one action is outstanding for a
// player, further presses are ignored. An action counts as confirmed once
// the mirror shows a state consistent with it. Two timers guard each
// action: a short confirmation window that resends exactly once, and a
// hard ceiling that always releases the in-flight flag.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use strum::{Display, EnumString};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::client::{HubClient, ServiceCall};
use crate::error::CoreError;
use crate::model::{Domain, EntityId, StateChange};
use crate::notice::{Notice, NoticeBus};
use crate::store::MirrorStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MediaAction {
    Play,
    Pause,
}

impl MediaAction {
    pub fn service(self) -> &'static str {
        match self {
            Self::Play => "media_play",
            Self::Pause => "media_pause",
        }
    }

    /// Whether a player reporting `state` has carried out this action.
    pub fn confirmed_by(self, state: &str) -> bool {
        match self {
            Self::Play => matches!(state, "playing" | "buffering"),
            Self::Pause => matches!(state, "paused" | "idle" | "off" | "standby"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaSendOutcome {
    Sent,
    /// Another action for this player is still unconfirmed.
    AlreadyInFlight,
}

#[derive(Debug, Clone, Copy)]
enum ControlTimer {
    Confirm,
    Ceiling,
}

#[derive(Default)]
struct ControlSlot {
    in_flight: bool,
    retried: bool,
    last_action: Option<MediaAction>,
    /// Bumped per action and on reset; stale timers compare against it.
    generation: u64,
    timers: Vec<AbortHandle>,
}

impl ControlSlot {
    fn disarm(&mut self) {
        for timer in self.timers.drain(..) {
            timer.abort();
        }
    }

    fn release(&mut self) {
        self.in_flight = false;
        self.disarm();
    }
}

// ── MediaControls ────────────────────────────────────────────────────

pub struct MediaControls<C: HubClient> {
    inner: Arc<MediaInner<C>>,
}

impl<C: HubClient> Clone for MediaControls<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct MediaInner<C> {
    client: C,
    store: Arc<MirrorStore>,
    notices: NoticeBus,
    confirm_window: Duration,
    ceiling: Duration,
    controls: DashMap<String, ControlSlot>,
}

impl<C: HubClient> MediaControls<C> {
    pub fn new(
        client: C,
        store: Arc<MirrorStore>,
        notices: NoticeBus,
        confirm_window: Duration,
        ceiling: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(MediaInner {
                client,
                store,
                notices,
                confirm_window,
                ceiling,
                controls: DashMap::new(),
            }),
        }
    }

    /// Send a transport action unless one is already in flight.
    pub async fn send(
        &self,
        entity_id: &str,
        action: MediaAction,
    ) -> Result<MediaSendOutcome, CoreError> {
        if !self.inner.client.is_connected() {
            return Err(CoreError::NotConnected);
        }
        let id: EntityId = entity_id.parse()?;
        if id.domain() != Domain::MediaPlayer {
            return Err(CoreError::Unsupported {
                operation: action.to_string(),
                domain: id.domain_str().to_owned(),
            });
        }

        let key = id.to_string();
        let generation = {
            let mut slot = self.inner.controls.entry(key.clone()).or_default();
            if slot.in_flight {
                debug!(entity_id = %key, %action, "action already in flight, ignoring");
                return Ok(MediaSendOutcome::AlreadyInFlight);
            }
            slot.disarm();
            slot.in_flight = true;
            slot.retried = false;
            slot.last_action = Some(action);
            slot.generation += 1;
            let generation = slot.generation;
            slot.timers = vec![
                self.arm(id.clone(), generation, ControlTimer::Confirm),
                self.arm(id.clone(), generation, ControlTimer::Ceiling),
            ];
            generation
        };

        debug!(entity_id = %key, %action, "media action");
        match self
            .inner
            .client
            .call_service(ServiceCall::new(&id, action.service()))
            .await
        {
            Ok(()) => {
                self.inner.store.record_send_success();
                Ok(MediaSendOutcome::Sent)
            }
            Err(e) => {
                let issues = self.inner.store.record_send_failure();
                warn!(entity_id = %key, %action, error = %e, issues, "media action failed");
                if let Some(mut slot) = self.inner.controls.get_mut(&key) {
                    if slot.generation == generation {
                        slot.release();
                    }
                }
                self.inner.notices.publish(Notice::SendFailed {
                    entity_id: key.clone(),
                    restored_state: None,
                    reason: e.to_string(),
                });
                if e.is_send_failure() {
                    Err(CoreError::SendFailed {
                        entity_id: key,
                        reason: e.to_string(),
                    })
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Check the mirror after a change event; release the player's
    /// in-flight flag once its state matches the outstanding action.
    pub fn on_state_change(&self, change: &StateChange) {
        let key = change.entity_id.as_str();
        let Some(mut slot) = self.inner.controls.get_mut(key) else {
            return;
        };
        if !slot.in_flight {
            return;
        }
        let Some(action) = slot.last_action else {
            return;
        };
        if self
            .inner
            .store
            .entity_state(key)
            .is_some_and(|state| action.confirmed_by(&state))
        {
            debug!(entity_id = key, %action, "media action confirmed");
            slot.release();
        }
    }

    /// Forget every outstanding action. Any confirmation still expected
    /// belongs to a connection that no longer exists.
    pub fn reset_all(&self) {
        for mut slot in self.inner.controls.iter_mut() {
            slot.disarm();
            slot.in_flight = false;
            slot.retried = false;
            slot.last_action = None;
            slot.generation += 1;
        }
    }

    pub fn is_in_flight(&self, entity_id: &str) -> bool {
        self.inner
            .controls
            .get(entity_id)
            .is_some_and(|slot| slot.in_flight)
    }

    pub fn last_action(&self, entity_id: &str) -> Option<MediaAction> {
        self.inner
            .controls
            .get(entity_id)
            .and_then(|slot| slot.last_action)
    }

    fn arm(&self, id: EntityId, generation: u64, timer: ControlTimer) -> AbortHandle {
        let weak = Arc::downgrade(&self.inner);
        let delay = match timer {
            ControlTimer::Confirm => self.inner.confirm_window,
            ControlTimer::Ceiling => self.inner.ceiling,
        };
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            match timer {
                ControlTimer::Confirm => inner.retry_unconfirmed(&id, generation).await,
                ControlTimer::Ceiling => inner.expire(id.as_str(), generation),
            }
        })
        .abort_handle()
    }
}

impl<C: HubClient> MediaInner<C> {
    /// Confirmation window elapsed: resend once, never twice.
    async fn retry_unconfirmed(&self, id: &EntityId, generation: u64) {
        let action = {
            let Some(mut slot) = self.controls.get_mut(id.as_str()) else {
                return;
            };
            if slot.generation != generation || !slot.in_flight || slot.retried {
                return;
            }
            let Some(action) = slot.last_action else {
                return;
            };
            slot.retried = true;
            action
        };

        info!(entity_id = %id, %action, "media action not confirmed, retrying once");
        self.notices.publish(Notice::MediaRetried {
            entity_id: id.to_string(),
            action,
        });
        if let Err(e) = self
            .client
            .call_service(ServiceCall::new(id, action.service()))
            .await
        {
            self.store.record_send_failure();
            warn!(entity_id = %id, %action, error = %e, "media retry failed");
        }
    }

    /// Ceiling reached: release the flag whatever happened.
    fn expire(&self, key: &str, generation: u64) {
        if let Some(mut slot) = self.controls.get_mut(key) {
            if slot.generation == generation && slot.in_flight {
                debug!(entity_id = key, "media action ceiling reached");
                slot.release();
            }
        }
    }
}
