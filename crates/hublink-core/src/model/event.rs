use super::entity::Entity;
use super::entity_id::EntityId;

/// A decoded `state_changed` notification.
///
/// `new_state` is `None` when the hub removed the entity; the mirror
/// ignores those (removal only happens through a full snapshot).
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    pub entity_id: EntityId,
    pub new_state: Option<Entity>,
    pub old_state: Option<Entity>,
}
