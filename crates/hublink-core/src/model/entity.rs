// ── Entity domain type ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::entity_id::{Domain, EntityId};

/// Sentinel state the hub reports for entities it cannot reach.
pub const STATE_UNAVAILABLE: &str = "unavailable";

/// One observable/controllable point on the hub.
///
/// `attributes` is an open bag whose schema depends on the domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub state: String,
    pub attributes: Map<String, Value>,
    pub last_changed: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Entity {
    pub fn new(id: EntityId, state: impl Into<String>) -> Self {
        Self {
            id,
            state: state.into(),
            attributes: Map::new(),
            last_changed: None,
            last_updated: None,
        }
    }

    pub fn domain(&self) -> Domain {
        self.id.domain()
    }

    /// `friendly_name` attribute, falling back to the object id.
    pub fn friendly_name(&self) -> &str {
        self.attributes
            .get("friendly_name")
            .and_then(Value::as_str)
            .unwrap_or_else(|| self.id.object_id())
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn is_available(&self) -> bool {
        self.state != STATE_UNAVAILABLE
    }

    /// Copy with only the state value replaced (optimistic overlay and
    /// rollback keep attributes as last reported by the hub).
    pub fn with_state(&self, state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn friendly_name_falls_back_to_object_id() {
        let mut entity = Entity::new("light.hall".parse().unwrap(), "off");
        assert_eq!(entity.friendly_name(), "hall");

        entity
            .attributes
            .insert("friendly_name".into(), json!("Hall lamp"));
        assert_eq!(entity.friendly_name(), "Hall lamp");
    }

    #[test]
    fn with_state_keeps_attributes() {
        let mut entity = Entity::new("light.hall".parse().unwrap(), "off");
        entity.attributes.insert("brightness".into(), json!(80));
        let on = entity.with_state("on");
        assert_eq!(on.state, "on");
        assert_eq!(on.attributes["brightness"], 80);
    }
}
