// hublink-api: Async Rust client for the hub's WebSocket API (session, correlation, events)

pub mod correlator;
pub mod error;
pub mod protocol;
pub mod session;
pub mod subscription;

pub use error::Error;
pub use protocol::{
    AreaEntry, DeviceEntry, EntityRegistryEntry, FloorEntry, HubEvent, Request, ServiceTarget,
    StateChangedData, StateObject,
};
pub use session::{HubSession, ReconnectConfig, SessionConfig, SessionNotice, SessionPhase};
pub use subscription::{EventListener, EventSubscriptions};
