mod collection;
mod mirror;

pub use collection::UpsertOutcome;
pub use mirror::{ConnectionStatus, MirrorStore};
