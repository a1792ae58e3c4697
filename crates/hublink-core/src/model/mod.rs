// ── Domain model ──

mod entity;
mod entity_id;
mod event;
mod registry;

pub use entity::{Entity, STATE_UNAVAILABLE};
pub use entity_id::{Domain, EntityId, EntityIdError};
pub use event::StateChange;
pub use registry::{Area, Device, EntityRegistryEntry, Floor};
