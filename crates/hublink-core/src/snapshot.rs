// ── Snapshot loader ──
//
// Bulk fetch of everything the mirror holds. The five requests go out
// concurrently over the same session; entity states and areas are
// required, the rest degrade to empty collections.

use tracing::{debug, warn};

use crate::client::HubClient;
use crate::error::CoreError;
use crate::model::{Area, Device, Entity, EntityRegistryEntry, Floor};

/// Ground truth as of one full fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub entities: Vec<Entity>,
    pub areas: Vec<Area>,
    pub floors: Vec<Floor>,
    pub devices: Vec<Device>,
    pub entity_registry: Vec<EntityRegistryEntry>,
}

/// Fetch a full snapshot.
///
/// Fails with [`CoreError::SnapshotLoad`] when states or areas cannot be
/// loaded; the caller should then leave the mirror untouched. Floors,
/// devices and the entity registry are optional.
pub async fn load_snapshot<C: HubClient>(client: &C) -> Result<Snapshot, CoreError> {
    let (entities, areas, floors, devices, entity_registry) = tokio::join!(
        client.get_states(),
        client.list_areas(),
        client.list_floors(),
        client.list_devices(),
        client.list_entity_registry(),
    );

    let snapshot = Snapshot {
        entities: entities.map_err(|e| required("entity states", &e))?,
        areas: areas.map_err(|e| required("areas", &e))?,
        floors: optional("floors", floors),
        devices: optional("devices", devices),
        entity_registry: optional("entity registry", entity_registry),
    };

    debug!(
        entities = snapshot.entities.len(),
        areas = snapshot.areas.len(),
        floors = snapshot.floors.len(),
        devices = snapshot.devices.len(),
        "snapshot loaded"
    );
    Ok(snapshot)
}

fn required(what: &str, err: &CoreError) -> CoreError {
    CoreError::SnapshotLoad {
        message: format!("{what}: {err}"),
    }
}

fn optional<T>(registry: &str, result: Result<Vec<T>, CoreError>) -> Vec<T> {
    match result {
        Ok(items) => items,
        Err(e) => {
            let err = CoreError::RegistryLoad {
                registry: registry.to_owned(),
                message: e.to_string(),
            };
            warn!(error = %err, "continuing with an empty collection");
            Vec::new()
        }
    }
}
