// ── Local mirror of hub state ──
//
// The single read model for entities, registries and connection status.
// Three writers touch it: the snapshot loader (bulk replace), the change
// event pump (per-entity upsert) and the command dispatcher (optimistic
// overlay and rollback). Reads are lock-free snapshots.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::Display;
use tokio::sync::watch;

use super::collection::{EntityCollection, Keyed, UpsertOutcome};
use crate::model::{Area, Device, Domain, Entity, EntityRegistryEntry, Floor, StateChange};
use crate::snapshot::Snapshot;

// ── Keys ────────────────────────────────────────────────────────────

impl Keyed for Entity {
    fn key(&self) -> &str {
        self.id.as_str()
    }
}

impl Keyed for Area {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for Floor {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for Device {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for EntityRegistryEntry {
    fn key(&self) -> &str {
        self.entity_id.as_str()
    }
}

// ── ConnectionStatus ────────────────────────────────────────────────

/// Process-wide link status as seen by readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

// ── MirrorStore ─────────────────────────────────────────────────────

pub struct MirrorStore {
    entities: EntityCollection<Entity>,
    areas: EntityCollection<Area>,
    floors: EntityCollection<Floor>,
    devices: EntityCollection<Device>,
    entity_registry: EntityCollection<EntityRegistryEntry>,
    connection_status: watch::Sender<ConnectionStatus>,
    last_full_refresh: watch::Sender<Option<DateTime<Utc>>>,
    last_event: watch::Sender<Option<DateTime<Utc>>>,
    connection_issues: AtomicU32,
    last_error: ArcSwapOption<String>,
}

impl Default for MirrorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MirrorStore {
    pub fn new() -> Self {
        let (connection_status, _) = watch::channel(ConnectionStatus::Disconnected);
        let (last_full_refresh, _) = watch::channel(None);
        let (last_event, _) = watch::channel(None);

        Self {
            entities: EntityCollection::new(),
            areas: EntityCollection::new(),
            floors: EntityCollection::new(),
            devices: EntityCollection::new(),
            entity_registry: EntityCollection::new(),
            connection_status,
            last_full_refresh,
            last_event,
            connection_issues: AtomicU32::new(0),
            last_error: ArcSwapOption::empty(),
        }
    }

    // ── Entity selectors ─────────────────────────────────────────────

    pub fn entities_snapshot(&self) -> Arc<Vec<Arc<Entity>>> {
        self.entities.snapshot()
    }

    pub fn entity(&self, entity_id: &str) -> Option<Arc<Entity>> {
        self.entities.get(entity_id)
    }

    pub fn entity_state(&self, entity_id: &str) -> Option<String> {
        self.entities.get(entity_id).map(|e| e.state.clone())
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn entities_in_domain(&self, domain: &Domain) -> Vec<Arc<Entity>> {
        self.entities
            .snapshot()
            .iter()
            .filter(|e| e.domain() == *domain)
            .cloned()
            .collect()
    }

    /// Entities whose registry entry (or, failing that, whose device)
    /// sits in `area_id`.
    pub fn entities_in_area(&self, area_id: &str) -> Vec<Arc<Entity>> {
        self.entities
            .snapshot()
            .iter()
            .filter(|e| self.area_id_for(e.id.as_str()).as_deref() == Some(area_id))
            .cloned()
            .collect()
    }

    /// Resolve an entity's area: its own registry override first, then
    /// the area of its device.
    pub fn area_for_entity(&self, entity_id: &str) -> Option<Arc<Area>> {
        let area_id = self.area_id_for(entity_id)?;
        self.areas.get(&area_id)
    }

    fn area_id_for(&self, entity_id: &str) -> Option<String> {
        let entry = self.entity_registry.get(entity_id)?;
        if let Some(area_id) = &entry.area_id {
            return Some(area_id.clone());
        }
        let device_id = entry.device_id.as_deref()?;
        self.devices.get(device_id)?.area_id.clone()
    }

    // ── Registry selectors ───────────────────────────────────────────

    pub fn areas_snapshot(&self) -> Arc<Vec<Arc<Area>>> {
        self.areas.snapshot()
    }

    pub fn floors_snapshot(&self) -> Arc<Vec<Arc<Floor>>> {
        self.floors.snapshot()
    }

    pub fn devices_snapshot(&self) -> Arc<Vec<Arc<Device>>> {
        self.devices.snapshot()
    }

    pub fn entity_registry_snapshot(&self) -> Arc<Vec<Arc<EntityRegistryEntry>>> {
        self.entity_registry.snapshot()
    }

    pub fn area(&self, area_id: &str) -> Option<Arc<Area>> {
        self.areas.get(area_id)
    }

    pub fn floor(&self, floor_id: &str) -> Option<Arc<Floor>> {
        self.floors.get(floor_id)
    }

    // ── Status / metadata ────────────────────────────────────────────

    pub fn connection_status(&self) -> ConnectionStatus {
        *self.connection_status.borrow()
    }

    pub fn watch_connection_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.connection_status.subscribe()
    }

    /// Returns `true` if the status actually changed.
    pub fn set_connection_status(&self, status: ConnectionStatus) -> bool {
        self.connection_status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                tracing::debug!(from = %current, to = %status, "connection status");
                *current = status;
                true
            }
        })
    }

    pub fn last_full_refresh(&self) -> Option<DateTime<Utc>> {
        *self.last_full_refresh.borrow()
    }

    pub fn last_event_at(&self) -> Option<DateTime<Utc>> {
        *self.last_event.borrow()
    }

    /// Consecutive failed command sends since the last success.
    pub fn connection_issues(&self) -> u32 {
        self.connection_issues.load(Ordering::Relaxed)
    }

    pub fn record_send_failure(&self) -> u32 {
        self.connection_issues.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_send_success(&self) {
        self.connection_issues.store(0, Ordering::Relaxed);
    }

    pub fn last_error(&self) -> Option<Arc<String>> {
        self.last_error.load_full()
    }

    pub fn set_last_error(&self, message: Option<String>) {
        self.last_error.store(message.map(Arc::new));
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Replace every collection with a freshly loaded snapshot.
    pub fn apply_snapshot(&self, snapshot: Snapshot) {
        let Snapshot {
            entities,
            areas,
            floors,
            devices,
            entity_registry,
        } = snapshot;

        self.entities.replace_all(entities);
        self.areas.replace_all(areas);
        self.floors.replace_all(floors);
        self.devices.replace_all(devices);
        self.entity_registry.replace_all(entity_registry);

        let _ = self.last_full_refresh.send_replace(Some(Utc::now()));
        tracing::debug!(
            entities = self.entities.len(),
            areas = self.areas.len(),
            devices = self.devices.len(),
            "snapshot applied"
        );
    }

    /// Upsert the entity carried by a change event. Events without a new
    /// state (entity removed on the hub) are ignored.
    pub fn apply_change_event(&self, change: &StateChange) -> Option<UpsertOutcome> {
        let entity = change.new_state.clone()?;
        let outcome = self.entities.upsert(entity);
        let _ = self.last_event.send_replace(Some(Utc::now()));
        Some(outcome)
    }

    /// Overwrite only the state value of an entity. Returns the previous
    /// state, or `None` when the entity is unknown.
    pub fn set_entity_state(&self, entity_id: &str, state: &str) -> Option<String> {
        self.entities
            .update(entity_id, |e| e.with_state(state))
            .map(|prev| prev.state.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::EntityId;
    use pretty_assertions::assert_eq;

    fn entity(id: &str, state: &str) -> Entity {
        Entity::new(id.parse::<EntityId>().unwrap(), state)
    }

    fn change(id: &str, state: &str) -> StateChange {
        StateChange {
            entity_id: id.parse().unwrap(),
            new_state: Some(entity(id, state)),
            old_state: None,
        }
    }

    fn snapshot(entities: Vec<Entity>) -> Snapshot {
        Snapshot {
            entities,
            ..Snapshot::default()
        }
    }

    #[test]
    fn change_event_upserts() {
        let store = MirrorStore::new();
        store.apply_snapshot(snapshot(vec![entity("light.a", "off")]));

        assert_eq!(
            store.apply_change_event(&change("light.a", "on")),
            Some(UpsertOutcome::Updated)
        );
        assert_eq!(
            store.apply_change_event(&change("light.b", "on")),
            Some(UpsertOutcome::Inserted)
        );
        assert_eq!(store.entity_state("light.a").as_deref(), Some("on"));
        assert_eq!(store.entity_count(), 2);
        assert!(store.last_event_at().is_some());
    }

    #[test]
    fn replayed_event_is_idempotent() {
        let store = MirrorStore::new();
        let event = change("switch.fan", "on");

        store.apply_change_event(&event);
        let once = store.entities_snapshot();
        assert_eq!(
            store.apply_change_event(&event),
            Some(UpsertOutcome::Unchanged)
        );
        let twice = store.entities_snapshot();

        assert_eq!(*once, *twice);
    }

    #[test]
    fn removal_events_are_ignored() {
        let store = MirrorStore::new();
        store.apply_snapshot(snapshot(vec![entity("light.a", "on")]));
        let removal = StateChange {
            entity_id: "light.a".parse().unwrap(),
            new_state: None,
            old_state: Some(entity("light.a", "on")),
        };
        assert_eq!(store.apply_change_event(&removal), None);
        assert!(store.entity("light.a").is_some());
    }

    #[test]
    fn snapshot_replaces_wholesale() {
        let store = MirrorStore::new();
        store.apply_snapshot(snapshot(vec![entity("light.a", "on"), entity("light.b", "on")]));
        store.apply_snapshot(snapshot(vec![entity("light.c", "off")]));

        assert!(store.entity("light.a").is_none());
        assert_eq!(store.entity_count(), 1);
        assert!(store.last_full_refresh().is_some());
    }

    #[test]
    fn set_entity_state_returns_previous() {
        let store = MirrorStore::new();
        store.apply_snapshot(snapshot(vec![entity("light.a", "off")]));
        assert_eq!(store.set_entity_state("light.a", "on").as_deref(), Some("off"));
        assert_eq!(store.entity_state("light.a").as_deref(), Some("on"));
        assert_eq!(store.set_entity_state("light.missing", "on"), None);
    }

    #[test]
    fn area_resolution_prefers_entity_override() {
        let store = MirrorStore::new();
        store.apply_snapshot(Snapshot {
            entities: vec![entity("light.a", "on"), entity("light.b", "on")],
            areas: vec![
                Area {
                    id: "kitchen".into(),
                    name: "Kitchen".into(),
                    floor_id: None,
                    picture: None,
                },
                Area {
                    id: "hall".into(),
                    name: "Hall".into(),
                    floor_id: None,
                    picture: None,
                },
            ],
            floors: Vec::new(),
            devices: vec![Device {
                id: "dev1".into(),
                name: None,
                area_id: Some("kitchen".into()),
                model: None,
                manufacturer: None,
                disabled: false,
            }],
            entity_registry: vec![
                EntityRegistryEntry {
                    entity_id: "light.a".parse().unwrap(),
                    device_id: Some("dev1".into()),
                    area_id: None,
                    name: None,
                    platform: None,
                    hidden: false,
                    disabled: false,
                },
                EntityRegistryEntry {
                    entity_id: "light.b".parse().unwrap(),
                    device_id: Some("dev1".into()),
                    area_id: Some("hall".into()),
                    name: None,
                    platform: None,
                    hidden: false,
                    disabled: false,
                },
            ],
        });

        assert_eq!(store.area_for_entity("light.a").unwrap().name, "Kitchen");
        assert_eq!(store.area_for_entity("light.b").unwrap().name, "Hall");
        let in_hall: Vec<_> = store
            .entities_in_area("hall")
            .iter()
            .map(|e| e.id.to_string())
            .collect();
        assert_eq!(in_hall, ["light.b"]);
    }

    #[test]
    fn status_and_counters() {
        let store = MirrorStore::new();
        assert_eq!(store.connection_status(), ConnectionStatus::Disconnected);
        assert!(store.set_connection_status(ConnectionStatus::Connecting));
        assert!(!store.set_connection_status(ConnectionStatus::Connecting));

        assert_eq!(store.record_send_failure(), 1);
        assert_eq!(store.record_send_failure(), 2);
        store.record_send_success();
        assert_eq!(store.connection_issues(), 0);

        store.set_last_error(Some("token revoked".into()));
        assert_eq!(store.last_error().unwrap().as_str(), "token revoked");
        store.set_last_error(None);
        assert!(store.last_error().is_none());
    }
}
