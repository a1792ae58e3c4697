// ── Registry domain types ──
//
// Physical/logical grouping. Each collection is small (one household)
// and replaced wholesale on every snapshot; relations are plain ids
// resolved by linear lookup.

use serde::{Deserialize, Serialize};

use super::entity_id::EntityId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Area {
    pub id: String,
    pub name: String,
    pub floor_id: Option<String>,
    pub picture: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Floor {
    pub id: String,
    pub name: String,
    pub level: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub name: Option<String>,
    pub area_id: Option<String>,
    pub model: Option<String>,
    pub manufacturer: Option<String>,
    pub disabled: bool,
}

impl Device {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Registry metadata for one entity: which device and area it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRegistryEntry {
    pub entity_id: EntityId,
    pub device_id: Option<String>,
    pub area_id: Option<String>,
    pub name: Option<String>,
    pub platform: Option<String>,
    pub hidden: bool,
    pub disabled: bool,
}
