//! Entity commands: toggle and arbitrary service calls.

use serde_json::{Map, Value};

use hublink_core::{CommandOutcome, Controller};

use crate::cli::{CallArgs, GlobalOpts, ToggleArgs};
use crate::error::CliError;
use crate::output;

pub async fn toggle(
    controller: &Controller,
    args: ToggleArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let before = current_state(controller, &args.entity_id);
    let outcome = controller.toggle_entity(&args.entity_id).await?;
    report(controller, &args.entity_id, before, outcome, args.wait, global).await
}

pub async fn call(
    controller: &Controller,
    args: CallArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let data = parse_service_data(args.data.as_deref())?;
    let before = current_state(controller, &args.entity_id);
    let outcome = controller
        .control_entity(&args.entity_id, &args.service, data, args.expect.as_deref())
        .await?;
    report(controller, &args.entity_id, before, outcome, args.wait, global).await
}

fn current_state(controller: &Controller, entity_id: &str) -> Option<String> {
    controller.entity(entity_id).map(|e| e.state.clone())
}

/// `--data` must be a JSON object; absent means empty.
pub(crate) fn parse_service_data(raw: Option<&str>) -> Result<Map<String, Value>, CliError> {
    let Some(raw) = raw else {
        return Ok(Map::new());
    };
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        other => Err(CliError::Validation {
            field: "data".into(),
            reason: format!("expected a JSON object, got {other}"),
        }),
    }
}

async fn report(
    controller: &Controller,
    entity_id: &str,
    before: Option<String>,
    outcome: CommandOutcome,
    wait: bool,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let color = output::should_color(global.color);
    let before = before.unwrap_or_default();

    let line = match outcome {
        CommandOutcome::Sent => format!("{entity_id}: sent"),
        CommandOutcome::Optimistic(receipt) => {
            let shown = current_state(controller, entity_id).unwrap_or_default();
            if wait {
                let action = receipt.confirmed().await?;
                format!(
                    "{entity_id}: {} -> {} (confirmed)",
                    output::paint_state(&before, color),
                    output::paint_state(&action.target_state, color),
                )
            } else {
                format!(
                    "{entity_id}: {} -> {} (pending)",
                    output::paint_state(&before, color),
                    output::paint_state(&shown, color),
                )
            }
        }
    };
    output::print_output(&line, global.quiet);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn service_data_must_be_an_object() {
        assert!(parse_service_data(None).unwrap().is_empty());

        let data = parse_service_data(Some(r#"{"brightness": 120}"#)).unwrap();
        assert_eq!(data["brightness"], 120);

        assert!(matches!(
            parse_service_data(Some("[1, 2]")),
            Err(CliError::Validation { .. })
        ));
        assert!(matches!(
            parse_service_data(Some("{oops")),
            Err(CliError::Json(_))
        ));
    }
}
