// ── Foreground / network resync trigger ──
//
// Platform hooks (app foregrounded, network back online, window focus,
// page restored from cache) fire a bare signal. Signals are collapsed so a
// burst of them costs one snapshot, not one each.

use std::time::Duration;

use strum::Display;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

pub(crate) const RESYNC_CHANNEL_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ResyncSignal {
    Foreground,
    NetworkOnline,
    Focus,
    PageRestored,
    /// Explicit user request. Never debounced.
    Manual,
}

/// Cloneable sender handed to platform hooks.
#[derive(Debug, Clone)]
pub struct ResyncTrigger {
    tx: mpsc::Sender<ResyncSignal>,
}

impl ResyncTrigger {
    pub(crate) fn new(tx: mpsc::Sender<ResyncSignal>) -> Self {
        Self { tx }
    }

    /// Fire and forget. A full queue already holds a pending resync, so
    /// the signal is dropped.
    pub fn fire(&self, signal: ResyncSignal) {
        if self.tx.try_send(signal).is_err() {
            debug!(%signal, "resync already queued, dropping signal");
        }
    }
}

/// Minimum-interval filter over incoming signals.
#[derive(Debug)]
pub struct ResyncGate {
    min_interval: Duration,
    last_accepted: Option<Instant>,
}

impl ResyncGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_accepted: None,
        }
    }

    /// Whether `signal` arriving at `now` should trigger a resync.
    pub fn admit(&mut self, signal: ResyncSignal, now: Instant) -> bool {
        let too_soon = signal != ResyncSignal::Manual
            && self
                .last_accepted
                .is_some_and(|last| now.duration_since(last) < self.min_interval);
        if too_soon {
            debug!(%signal, "resync signal within minimum interval, ignored");
            return false;
        }
        self.last_accepted = Some(now);
        true
    }
}
