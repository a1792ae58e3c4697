//! Event-type fan-out on top of a [`HubSession`].
//!
//! The hub delivers every subscribed event type over one socket. This
//! module keeps one server-side `subscribe_events` per event type, however
//! many local listeners there are, and re-issues those subscriptions after
//! every reconnect (the hub forgets them when the socket drops).
//!
//! [`EventSubscriptions::start`] re-subscribes on its own when the session
//! announces a reconnect. An owner that must order the re-subscription
//! against other requests uses [`EventSubscriptions::start_managed`] and
//! awaits [`EventSubscriptions::resubscribe`] itself.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use futures_core::Stream;
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::protocol::HubEvent;
use crate::session::{HubSession, SessionNotice};

type ListenerTx = mpsc::UnboundedSender<Arc<HubEvent>>;

#[derive(Default)]
struct Topic {
    /// A `subscribe_events` for this type is active or in flight.
    subscribed: bool,
    listeners: Vec<(u64, ListenerTx)>,
}

struct SubscriptionsInner {
    session: HubSession,
    topics: DashMap<String, Topic>,
    next_listener: AtomicU64,
    /// The owner re-subscribes after a reconnect; the pump does not.
    managed: bool,
    cancel: CancellationToken,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for SubscriptionsInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Registry of local event listeners keyed by event type.
#[derive(Clone)]
pub struct EventSubscriptions {
    inner: Arc<SubscriptionsInner>,
}

impl EventSubscriptions {
    /// Attach to `session` and start routing its events. Subscriptions
    /// are re-issued in the background after every reconnect.
    pub fn start(session: HubSession) -> Self {
        Self::spawn(session, false)
    }

    /// Like [`start`](Self::start), but nothing is re-issued on reconnect
    /// until the owner calls [`resubscribe`](Self::resubscribe).
    pub fn start_managed(session: HubSession) -> Self {
        Self::spawn(session, true)
    }

    fn spawn(session: HubSession, managed: bool) -> Self {
        // Take receivers before spawning so nothing published after this
        // point is missed.
        let events = session.events();
        let notices = session.notices();
        let cancel = CancellationToken::new();

        let inner = Arc::new(SubscriptionsInner {
            session,
            topics: DashMap::new(),
            next_listener: AtomicU64::new(1),
            managed,
            cancel: cancel.clone(),
            pump: Mutex::new(None),
        });

        let handle = tokio::spawn(pump(Arc::downgrade(&inner), events, notices, cancel));
        if let Ok(mut slot) = inner.pump.try_lock() {
            *slot = Some(handle);
        }

        Self { inner }
    }

    pub fn session(&self) -> &HubSession {
        &self.inner.session
    }

    /// Register a listener for `event_type`.
    ///
    /// The first listener of a type issues `subscribe_events` and waits for
    /// the hub to confirm it. If the hub refuses, the listener is removed
    /// again and the error is returned; the next `listen` retries.
    pub async fn listen(&self, event_type: &str) -> Result<EventListener, Error> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);

        let needs_subscribe = {
            let mut topic = self.inner.topics.entry(event_type.to_owned()).or_default();
            topic.listeners.push((id, tx));
            !std::mem::replace(&mut topic.subscribed, true)
        };

        let listener = EventListener {
            event_type: event_type.to_owned(),
            id,
            rx,
            registry: Arc::downgrade(&self.inner),
        };

        if needs_subscribe {
            // On error the listener drops here and unregisters itself.
            subscribe_topic(&self.inner, event_type).await?;
        }
        Ok(listener)
    }

    /// Re-issue `subscribe_events` for every event type that still has
    /// listeners. Needed after each [`SessionNotice::Reconnected`] when
    /// started with [`start_managed`](Self::start_managed).
    ///
    /// Every type is attempted; the first failure is returned.
    pub async fn resubscribe(&self) -> Result<(), Error> {
        resubscribe_topics(&self.inner, false).await
    }

    /// Retry only the event types whose last subscribe failed.
    pub async fn resubscribe_missing(&self) -> Result<(), Error> {
        resubscribe_topics(&self.inner, true).await
    }

    /// Whether a server-side subscription for `event_type` is believed active.
    pub fn is_subscribed(&self, event_type: &str) -> bool {
        self.inner
            .topics
            .get(event_type)
            .is_some_and(|t| t.subscribed)
    }

    pub fn listener_count(&self, event_type: &str) -> usize {
        self.inner
            .topics
            .get(event_type)
            .map_or(0, |t| t.listeners.len())
    }

    /// Stop routing events. Listeners see their channel end.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let handle = self.inner.pump.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.inner.topics.clear();
    }
}

async fn subscribe_topic(inner: &SubscriptionsInner, event_type: &str) -> Result<(), Error> {
    match inner.session.subscribe_events(event_type).await {
        Ok(()) => {
            tracing::debug!(event_type, "subscribed to hub events");
            Ok(())
        }
        Err(e) => {
            tracing::warn!(event_type, error = %e, "subscribe_events failed");
            if let Some(mut topic) = inner.topics.get_mut(event_type) {
                topic.subscribed = false;
            }
            Err(e)
        }
    }
}

/// Re-issue one subscription per event type that still has listeners,
/// or only for those marked unsubscribed when `only_missing` is set.
async fn resubscribe_topics(inner: &SubscriptionsInner, only_missing: bool) -> Result<(), Error> {
    inner.topics.retain(|_, topic| !topic.listeners.is_empty());

    let mut pending = Vec::new();
    for mut topic in inner.topics.iter_mut() {
        if only_missing && topic.subscribed {
            continue;
        }
        topic.subscribed = true;
        pending.push(topic.key().clone());
    }

    let mut first_error = None;
    for event_type in pending {
        if let Err(e) = subscribe_topic(inner, &event_type).await {
            first_error.get_or_insert(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}

// ── Event pump ───────────────────────────────────────────────────────

async fn pump(
    registry: Weak<SubscriptionsInner>,
    mut events: broadcast::Receiver<Arc<HubEvent>>,
    mut notices: broadcast::Receiver<SessionNotice>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            notice = notices.recv() => match notice {
                Ok(SessionNotice::Reconnected) => {
                    let Some(inner) = registry.upgrade() else { break };
                    if !inner.managed {
                        tokio::spawn(async move {
                            let _ = resubscribe_topics(&inner, false).await;
                        });
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "session notices lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            event = events.recv() => match event {
                Ok(event) => {
                    let Some(inner) = registry.upgrade() else { break };
                    fan_out(&inner, &event);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "event pump lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    tracing::debug!("event pump exiting");
}

/// Deliver to every listener of the event's type, in registration order.
/// Listeners whose receiver is gone are pruned.
fn fan_out(inner: &SubscriptionsInner, event: &Arc<HubEvent>) {
    if let Some(mut topic) = inner.topics.get_mut(&event.event_type) {
        topic
            .listeners
            .retain(|(_, tx)| tx.send(Arc::clone(event)).is_ok());
    }
}

// ── EventListener ────────────────────────────────────────────────────

/// Receives every event of one type, in hub order. Dropping it removes
/// the listener; the server-side subscription is kept.
pub struct EventListener {
    event_type: String,
    id: u64,
    rx: mpsc::UnboundedReceiver<Arc<HubEvent>>,
    registry: Weak<SubscriptionsInner>,
}

impl EventListener {
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Next event, or `None` once the registry shut down.
    pub async fn recv(&mut self) -> Option<Arc<HubEvent>> {
        self.rx.recv().await
    }

    pub fn into_stream(mut self) -> impl Stream<Item = Arc<HubEvent>> + Send + 'static {
        async_stream::stream! {
            while let Some(event) = self.recv().await {
                yield event;
            }
        }
    }
}

impl Drop for EventListener {
    fn drop(&mut self) {
        if let Some(inner) = self.registry.upgrade() {
            if let Some(mut topic) = inner.topics.get_mut(&self.event_type) {
                topic.listeners.retain(|(id, _)| *id != self.id);
            }
        }
    }
}
