//! Command dispatch: bridges CLI args -> controller calls -> output formatting.

pub mod config_cmd;
pub mod control;
pub mod entities;
pub mod media;
pub mod services;
pub mod watch;

use hublink_core::Controller;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a hub-bound command to the appropriate handler. The controller
/// is already connected.
pub async fn dispatch(
    cmd: Command,
    controller: &Controller,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Entities(args) => entities::list(controller, &args, global),
        Command::Entity { entity_id } => entities::show(controller, &entity_id, global),
        Command::Areas => entities::areas(controller, global),
        Command::Devices => entities::devices(controller, global),
        Command::Toggle(args) => control::toggle(controller, args, global).await,
        Command::Call(args) => control::call(controller, args, global).await,
        Command::Media(args) => media::handle(controller, args, global).await,
        Command::Services { domain } => services::handle(controller, domain, global).await,
        Command::Watch(args) => watch::handle(controller, args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => Err(CliError::Internal(
            "config and completions do not need a hub connection".into(),
        )),
    }
}
