//! Live view: state changes, command notices, and connection status until
//! Ctrl-C (or `--count` changes).

use chrono::Local;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use hublink_core::{Controller, Domain, Notice, StateChange};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

fn change_line(change: &StateChange, format: OutputFormat, color: bool) -> String {
    let old = change.old_state.as_ref().map(|e| e.state.as_str());
    let new = change.new_state.as_ref().map(|e| e.state.as_str());

    match format {
        OutputFormat::Json | OutputFormat::JsonCompact => json!({
            "entity_id": change.entity_id.as_str(),
            "old_state": old,
            "new_state": new,
        })
        .to_string(),
        OutputFormat::Plain => format!("{} {}", change.entity_id, new.unwrap_or("removed")),
        OutputFormat::Table => {
            let new = new.map_or_else(|| "removed".to_owned(), |s| output::paint_state(s, color));
            match old {
                Some(old) => format!(
                    "{} {}: {} -> {new}",
                    Local::now().format("%H:%M:%S"),
                    change.entity_id,
                    output::paint_state(old, color),
                ),
                None => format!("{} {}: {new}", Local::now().format("%H:%M:%S"), change.entity_id),
            }
        }
    }
}

fn notice_line(notice: &Notice, format: OutputFormat, color: bool) -> String {
    match format {
        OutputFormat::Json | OutputFormat::JsonCompact => json!({
            "notice": notice.message(),
            "entity_id": notice.entity_id(),
            "error": notice.is_error(),
        })
        .to_string(),
        OutputFormat::Plain => notice.message(),
        OutputFormat::Table => format!(
            "{} {}",
            Local::now().format("%H:%M:%S"),
            output::paint_notice(&notice.message(), notice.is_error(), color)
        ),
    }
}

pub async fn handle(
    controller: &Controller,
    args: WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let domain = args.domain.as_deref().map(Domain::parse);
    let color = output::should_color(global.color);
    let mut changes = controller.state_changes();
    let mut notices = controller.notices();
    let mut status = controller.watch_connection_status();
    let mut seen = 0usize;

    if !global.quiet {
        eprintln!(
            "Watching {} entities (Ctrl-C to stop)",
            controller.entities_snapshot().len()
        );
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,

            change = changes.recv() => match change {
                Ok(change) => {
                    if domain.as_ref().is_some_and(|d| change.entity_id.domain() != *d) {
                        continue;
                    }
                    output::print_output(&change_line(&change, global.output, color), global.quiet);
                    seen += 1;
                    if args.count.is_some_and(|n| seen >= n) {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "watch fell behind"),
                Err(RecvError::Closed) => break,
            },

            notice = notices.recv() => match notice {
                Ok(notice) => {
                    let line = notice_line(&notice, global.output, color);
                    output::print_output(&line, global.quiet);
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "notices fell behind"),
                Err(RecvError::Closed) => break,
            },

            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                if !global.quiet {
                    eprintln!("connection: {current}");
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use hublink_core::{Entity, EntityId};

    use super::*;

    fn change(old: Option<&str>, new: Option<&str>) -> StateChange {
        let id: EntityId = "light.porch".parse().unwrap();
        StateChange {
            entity_id: id.clone(),
            new_state: new.map(|s| Entity::new(id.clone(), s)),
            old_state: old.map(|s| Entity::new(id.clone(), s)),
        }
    }

    #[test]
    fn json_lines_carry_both_states() {
        let line = change_line(&change(Some("off"), Some("on")), OutputFormat::Json, false);
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["entity_id"], "light.porch");
        assert_eq!(value["old_state"], "off");
        assert_eq!(value["new_state"], "on");
    }

    #[test]
    fn removal_is_spelled_out() {
        assert_eq!(
            change_line(&change(Some("on"), None), OutputFormat::Plain, false),
            "light.porch removed"
        );
        assert!(
            change_line(&change(None, Some("on")), OutputFormat::Table, false)
                .ends_with("light.porch: on")
        );
    }

    #[test]
    fn notices_render_their_message() {
        let notice = Notice::PendingCleared { count: 2 };
        assert_eq!(
            notice_line(&notice, OutputFormat::Plain, false),
            "2 pending command(s) dropped for resync"
        );
    }
}
