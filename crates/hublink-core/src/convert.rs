// ── Wire → domain conversion ──
//
// Maps `hublink_api` payloads onto the domain model. Timestamps arrive as
// RFC 3339 strings; unparseable ones become `None` rather than failing the
// whole entity.

use chrono::{DateTime, Utc};

use hublink_api::protocol as wire;

use crate::model::{
    Area, Device, Entity, EntityId, EntityIdError, EntityRegistryEntry, Floor, StateChange,
};

fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

impl TryFrom<wire::StateObject> for Entity {
    type Error = EntityIdError;

    fn try_from(state: wire::StateObject) -> Result<Self, Self::Error> {
        Ok(Self {
            id: EntityId::try_from(state.entity_id)?,
            state: state.state,
            attributes: state.attributes,
            last_changed: parse_timestamp(state.last_changed.as_deref()),
            last_updated: parse_timestamp(state.last_updated.as_deref()),
        })
    }
}

impl TryFrom<wire::StateChangedData> for StateChange {
    type Error = EntityIdError;

    fn try_from(data: wire::StateChangedData) -> Result<Self, Self::Error> {
        Ok(Self {
            entity_id: EntityId::try_from(data.entity_id)?,
            new_state: data.new_state.map(Entity::try_from).transpose()?,
            old_state: data.old_state.and_then(|s| Entity::try_from(s).ok()),
        })
    }
}

impl From<wire::AreaEntry> for Area {
    fn from(a: wire::AreaEntry) -> Self {
        Self {
            id: a.area_id,
            name: a.name,
            floor_id: a.floor_id,
            picture: a.picture,
        }
    }
}

impl From<wire::FloorEntry> for Floor {
    fn from(f: wire::FloorEntry) -> Self {
        Self {
            id: f.floor_id,
            name: f.name,
            level: f.level,
        }
    }
}

impl From<wire::DeviceEntry> for Device {
    fn from(d: wire::DeviceEntry) -> Self {
        Self {
            id: d.id,
            name: d.name_by_user.or(d.name),
            area_id: d.area_id,
            model: d.model,
            manufacturer: d.manufacturer,
            disabled: d.disabled_by.is_some(),
        }
    }
}

impl TryFrom<wire::EntityRegistryEntry> for EntityRegistryEntry {
    type Error = EntityIdError;

    fn try_from(e: wire::EntityRegistryEntry) -> Result<Self, Self::Error> {
        Ok(Self {
            entity_id: EntityId::try_from(e.entity_id)?,
            device_id: e.device_id,
            area_id: e.area_id,
            name: e.name,
            platform: e.platform,
            hidden: e.hidden_by.is_some(),
            disabled: e.disabled_by.is_some(),
        })
    }
}

/// Convert a batch, logging and skipping items with malformed ids.
pub(crate) fn convert_all<W, D>(items: Vec<W>, what: &'static str) -> Vec<D>
where
    D: TryFrom<W, Error = EntityIdError>,
{
    items
        .into_iter()
        .filter_map(|item| match D::try_from(item) {
            Ok(d) => Some(d),
            Err(e) => {
                tracing::debug!(what, error = %e, "skipping malformed item");
                None
            }
        })
        .collect()
}
