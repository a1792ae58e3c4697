// ── Hub client seam ──
//
// The dispatcher, media controls and snapshot loader depend on this
// narrow capability set rather than on a concrete socket. `SessionClient`
// is the production implementation over a `HubSession`; tests substitute
// an in-memory fake.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use futures_core::Stream;
use futures_util::StreamExt;
use serde_json::{Map, Value};
use tracing::debug;

use hublink_api::protocol::STATE_CHANGED;
use hublink_api::{EventSubscriptions, HubSession};

use crate::convert::convert_all;
use crate::error::CoreError;
use crate::model::{Area, Device, Entity, EntityId, EntityRegistryEntry, Floor, StateChange};

/// Decoded `state_changed` notifications, in arrival order.
pub type StateChangeFeed = Pin<Box<dyn Stream<Item = StateChange> + Send>>;

/// One `call_service` invocation aimed at a single entity.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceCall {
    pub domain: String,
    pub service: String,
    pub entity_id: EntityId,
    pub data: Map<String, Value>,
}

impl ServiceCall {
    /// Call `service` in the entity's own domain.
    pub fn new(entity_id: &EntityId, service: impl Into<String>) -> Self {
        Self {
            domain: entity_id.domain_str().to_owned(),
            service: service.into(),
            entity_id: entity_id.clone(),
            data: Map::new(),
        }
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }
}

/// What the optimistic machinery needs from a hub connection.
pub trait HubClient: Send + Sync + 'static {
    fn is_connected(&self) -> bool;

    /// Resolves once the hub accepted the call. Acceptance says nothing
    /// about the device having changed state.
    fn call_service(&self, call: ServiceCall) -> impl Future<Output = Result<(), CoreError>> + Send;

    fn get_states(&self) -> impl Future<Output = Result<Vec<Entity>, CoreError>> + Send;

    fn list_areas(&self) -> impl Future<Output = Result<Vec<Area>, CoreError>> + Send;

    fn list_floors(&self) -> impl Future<Output = Result<Vec<Floor>, CoreError>> + Send;

    fn list_devices(&self) -> impl Future<Output = Result<Vec<Device>, CoreError>> + Send;

    fn list_entity_registry(
        &self,
    ) -> impl Future<Output = Result<Vec<EntityRegistryEntry>, CoreError>> + Send;

    fn subscribe_state_changes(
        &self,
    ) -> impl Future<Output = Result<StateChangeFeed, CoreError>> + Send;
}

// ── SessionClient ────────────────────────────────────────────────────

/// A live session plus the subscription manager bound to it.
pub struct HubLink {
    pub session: HubSession,
    pub subscriptions: EventSubscriptions,
}

/// [`HubClient`] over whichever session is currently attached.
///
/// Clones share the slot, so the controller can swap sessions under a
/// dispatcher that was built once.
#[derive(Clone, Default)]
pub struct SessionClient {
    link: Arc<ArcSwapOption<HubLink>>,
}

impl SessionClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, session: HubSession, subscriptions: EventSubscriptions) {
        self.link.store(Some(Arc::new(HubLink {
            session,
            subscriptions,
        })));
    }

    /// Remove and return the current link.
    pub fn detach(&self) -> Option<Arc<HubLink>> {
        self.link.swap(None)
    }

    pub fn link(&self) -> Option<Arc<HubLink>> {
        self.link.load_full()
    }

    pub fn session(&self) -> Result<HubSession, CoreError> {
        self.link
            .load_full()
            .map(|link| link.session.clone())
            .ok_or(CoreError::NotConnected)
    }
}

impl HubClient for SessionClient {
    fn is_connected(&self) -> bool {
        self.link
            .load_full()
            .is_some_and(|link| link.session.is_open())
    }

    async fn call_service(&self, call: ServiceCall) -> Result<(), CoreError> {
        let session = self.session()?;
        session
            .call_service(
                &call.domain,
                &call.service,
                call.entity_id.as_str(),
                call.data,
            )
            .await?;
        Ok(())
    }

    async fn get_states(&self) -> Result<Vec<Entity>, CoreError> {
        let states = self.session()?.get_states().await?;
        Ok(convert_all(states, "states"))
    }

    async fn list_areas(&self) -> Result<Vec<Area>, CoreError> {
        let areas = self.session()?.list_areas().await?;
        Ok(areas.into_iter().map(Area::from).collect())
    }

    async fn list_floors(&self) -> Result<Vec<Floor>, CoreError> {
        let floors = self.session()?.list_floors().await?;
        Ok(floors.into_iter().map(Floor::from).collect())
    }

    async fn list_devices(&self) -> Result<Vec<Device>, CoreError> {
        let devices = self.session()?.list_devices().await?;
        Ok(devices.into_iter().map(Device::from).collect())
    }

    async fn list_entity_registry(&self) -> Result<Vec<EntityRegistryEntry>, CoreError> {
        let entries = self.session()?.list_entity_registry().await?;
        Ok(convert_all(entries, "entity registry"))
    }

    async fn subscribe_state_changes(&self) -> Result<StateChangeFeed, CoreError> {
        let link = self.link().ok_or(CoreError::NotConnected)?;
        let listener = link.subscriptions.listen(STATE_CHANGED).await?;

        let feed = listener.into_stream().filter_map(|event| async move {
            match event.state_changed()? {
                Ok(data) => match StateChange::try_from(data) {
                    Ok(change) => Some(change),
                    Err(e) => {
                        debug!(error = %e, "dropping change for malformed entity id");
                        None
                    }
                },
                Err(e) => {
                    debug!(error = %e, "dropping undecodable state_changed event");
                    None
                }
            }
        });
        Ok(Box::pin(feed))
    }
}

// ── Test double ──────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod testing {
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use tokio::sync::mpsc;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    use super::*;

    /// In-memory hub: records service calls, serves canned collections.
    #[derive(Clone)]
    pub(crate) struct FakeClient {
        inner: Arc<FakeInner>,
    }

    struct FakeInner {
        connected: AtomicBool,
        fail_calls: AtomicBool,
        entities: Mutex<Vec<Entity>>,
        areas: Mutex<Vec<Area>>,
        failing: Mutex<HashSet<String>>,
        calls: Mutex<Vec<ServiceCall>>,
        feed: Mutex<Option<mpsc::UnboundedSender<StateChange>>>,
    }

    impl FakeClient {
        pub(crate) fn with_entities(entities: &[(&str, &str)]) -> Self {
            let entities = entities
                .iter()
                .map(|(id, state)| Entity::new(id.parse().unwrap(), *state))
                .collect();
            Self {
                inner: Arc::new(FakeInner {
                    connected: AtomicBool::new(true),
                    fail_calls: AtomicBool::new(false),
                    entities: Mutex::new(entities),
                    areas: Mutex::new(Vec::new()),
                    failing: Mutex::new(HashSet::new()),
                    calls: Mutex::new(Vec::new()),
                    feed: Mutex::new(None),
                }),
            }
        }

        pub(crate) fn set_areas(&self, areas: Vec<Area>) {
            *self.inner.areas.lock().unwrap() = areas;
        }

        pub(crate) fn fail_request(&self, name: &str) {
            self.inner.failing.lock().unwrap().insert(name.to_owned());
        }

        pub(crate) fn set_connected(&self, connected: bool) {
            self.inner.connected.store(connected, Ordering::SeqCst);
        }

        /// Make every `call_service` fail as if the socket dropped.
        pub(crate) fn fail_service_calls(&self, fail: bool) {
            self.inner.fail_calls.store(fail, Ordering::SeqCst);
        }

        pub(crate) fn calls(&self) -> Vec<ServiceCall> {
            self.inner.calls.lock().unwrap().clone()
        }

        pub(crate) fn services(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .map(|c| format!("{}.{}", c.domain, c.service))
                .collect()
        }

        fn check(&self, name: &str) -> Result<(), CoreError> {
            if self.inner.failing.lock().unwrap().contains(name) {
                Err(CoreError::Hub {
                    code: "unknown_error".into(),
                    message: format!("{name} failed"),
                })
            } else {
                Ok(())
            }
        }
    }

    impl HubClient for FakeClient {
        fn is_connected(&self) -> bool {
            self.inner.connected.load(Ordering::SeqCst)
        }

        async fn call_service(&self, call: ServiceCall) -> Result<(), CoreError> {
            self.inner.calls.lock().unwrap().push(call);
            if self.inner.fail_calls.load(Ordering::SeqCst) {
                Err(CoreError::ConnectionClosed)
            } else {
                Ok(())
            }
        }

        async fn get_states(&self) -> Result<Vec<Entity>, CoreError> {
            self.check("get_states")?;
            Ok(self.inner.entities.lock().unwrap().clone())
        }

        async fn list_areas(&self) -> Result<Vec<Area>, CoreError> {
            self.check("list_areas")?;
            Ok(self.inner.areas.lock().unwrap().clone())
        }

        async fn list_floors(&self) -> Result<Vec<Floor>, CoreError> {
            self.check("list_floors")?;
            Ok(Vec::new())
        }

        async fn list_devices(&self) -> Result<Vec<Device>, CoreError> {
            self.check("list_devices")?;
            Ok(Vec::new())
        }

        async fn list_entity_registry(&self) -> Result<Vec<EntityRegistryEntry>, CoreError> {
            self.check("list_entity_registry")?;
            Ok(Vec::new())
        }

        async fn subscribe_state_changes(&self) -> Result<StateChangeFeed, CoreError> {
            let (tx, rx) = mpsc::unbounded_channel();
            *self.inner.feed.lock().unwrap() = Some(tx);
            Ok(Box::pin(UnboundedReceiverStream::new(rx)))
        }
    }
}
