//! Media transport (play / pause) with resend-once semantics.

use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use hublink_core::{Controller, MediaAction, MediaSendOutcome};

use crate::cli::{GlobalOpts, MediaActionArg, MediaArgs};
use crate::error::CliError;
use crate::output;

/// Slack past the in-flight ceiling so the ceiling timer fires first.
const SETTLE_SLACK: Duration = Duration::from_millis(250);

impl From<MediaActionArg> for MediaAction {
    fn from(arg: MediaActionArg) -> Self {
        match arg {
            MediaActionArg::Play => Self::Play,
            MediaActionArg::Pause => Self::Pause,
        }
    }
}

pub async fn handle(
    controller: &Controller,
    args: MediaArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let action = MediaAction::from(args.action);
    let entity_id = args.entity_id.as_str();

    let mut changes = controller.state_changes();
    if controller.media_action(entity_id, action).await? == MediaSendOutcome::AlreadyInFlight {
        output::print_output(&format!("{entity_id}: {action} already in flight"), global.quiet);
        return Ok(());
    }

    // Stay connected while the command is in flight so the resend can happen.
    let ceiling = controller.config().tuning.media_ceiling + SETTLE_SLACK;
    let settled = tokio::time::timeout(ceiling, async {
        while controller.media().is_in_flight(entity_id) {
            match changes.recv().await {
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
    })
    .await;
    if settled.is_err() {
        debug!(entity_id, "media command still in flight at ceiling");
    }

    let state = controller
        .entity(entity_id)
        .map(|e| e.state.clone())
        .unwrap_or_default();
    let color = output::should_color(global.color);
    let line = if action.confirmed_by(&state) {
        format!("{entity_id}: {}", output::paint_state(&state, color))
    } else {
        format!(
            "{entity_id}: {action} sent, hub still reports {}",
            output::paint_state(&state, color)
        )
    };
    output::print_output(&line, global.quiet);
    Ok(())
}
