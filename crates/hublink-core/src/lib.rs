// hublink-core: Local mirror, optimistic commands and lifecycle between hublink-api and consumers.

pub mod client;
pub mod config;
pub mod controller;
mod convert;
pub mod dispatcher;
pub mod domain;
pub mod error;
pub mod media;
pub mod model;
pub mod notice;
pub mod resync;
pub mod snapshot;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use client::{HubClient, ServiceCall, SessionClient, StateChangeFeed};
pub use config::{HubConfig, Tuning};
pub use controller::Controller;
pub use dispatcher::{CommandDispatcher, CommandOutcome, PendingAction, PendingReceipt};
pub use domain::{Capability, DomainStrategy, TogglePlan, strategy_for};
pub use error::CoreError;
pub use media::{MediaAction, MediaControls, MediaSendOutcome};
pub use notice::{Notice, NoticeBus};
pub use resync::{ResyncGate, ResyncSignal, ResyncTrigger};
pub use snapshot::{Snapshot, load_snapshot};
pub use store::{ConnectionStatus, MirrorStore, UpsertOutcome};

pub use model::{
    Area, Device, Domain, Entity, EntityId, EntityIdError, EntityRegistryEntry, Floor,
    STATE_UNAVAILABLE, StateChange,
};
