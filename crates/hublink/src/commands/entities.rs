//! Read-only views over the mirror: entities, areas, devices.

use std::fmt::Write as _;
use std::sync::Arc;

use tabled::Tabled;

use hublink_core::{Area, Controller, Device, Domain, Entity};

use crate::cli::{EntitiesArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct EntityRow {
    #[tabled(rename = "Entity")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Area")]
    area: String,
    #[tabled(rename = "Changed")]
    changed: String,
}

#[derive(Tabled)]
struct AreaRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Floor")]
    floor: String,
    #[tabled(rename = "Entities")]
    entities: usize,
}

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Manufacturer")]
    manufacturer: String,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Area")]
    area: String,
}

fn entity_row(controller: &Controller, entity: &Arc<Entity>, color: bool) -> EntityRow {
    let area = controller
        .store()
        .area_for_entity(entity.id.as_str())
        .map(|a| a.name.clone())
        .unwrap_or_default();
    EntityRow {
        id: entity.id.to_string(),
        name: entity.friendly_name().to_owned(),
        state: output::paint_state(&entity.state, color),
        area,
        changed: entity
            .last_changed
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default(),
    }
}

// ── Handlers ────────────────────────────────────────────────────────

pub fn list(
    controller: &Controller,
    args: &EntitiesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let mut entities: Vec<Arc<Entity>> = match args.area {
        Some(ref area) => {
            if controller.store().area(area).is_none() {
                return Err(CliError::Validation {
                    field: "area".into(),
                    reason: format!("unknown area '{area}' (see `hublink areas`)"),
                });
            }
            controller.entities_in_area(area)
        }
        None => controller.entities_snapshot().iter().cloned().collect(),
    };
    if let Some(ref domain) = args.domain {
        let domain = Domain::parse(domain);
        entities.retain(|e| e.domain() == domain);
    }
    entities.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));

    let color = output::should_color(global.color);
    let out = output::render_list(
        global.output,
        &entities,
        |e| entity_row(controller, e, color),
        |e| e.id.to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub fn show(controller: &Controller, entity_id: &str, global: &GlobalOpts) -> Result<(), CliError> {
    let entity = controller
        .entity(entity_id)
        .ok_or_else(|| CliError::NotFound {
            entity_id: entity_id.into(),
        })?;
    let color = output::should_color(global.color);
    let area = controller.store().area_for_entity(entity_id);

    let out = output::render_single(
        global.output,
        &entity,
        |e| detail(e, area.as_deref(), color),
        |e| e.state.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

fn detail(entity: &Entity, area: Option<&Area>, color: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Entity:   {}", entity.id);
    let _ = writeln!(out, "Name:     {}", entity.friendly_name());
    let _ = writeln!(out, "State:    {}", output::paint_state(&entity.state, color));
    if let Some(area) = area {
        let _ = writeln!(out, "Area:     {}", area.name);
    }
    if let Some(changed) = entity.last_changed {
        let _ = writeln!(out, "Changed:  {}", changed.to_rfc3339());
    }
    if !entity.attributes.is_empty() {
        let _ = writeln!(out, "Attributes:");
        let mut keys: Vec<&String> = entity.attributes.keys().collect();
        keys.sort();
        for key in keys {
            let _ = writeln!(out, "  {key}: {}", entity.attributes[key]);
        }
    }
    out.trim_end().to_owned()
}

pub fn areas(controller: &Controller, global: &GlobalOpts) -> Result<(), CliError> {
    let areas = controller.areas_snapshot();
    let out = output::render_list(
        global.output,
        areas.as_slice(),
        |a: &Arc<Area>| AreaRow {
            id: a.id.clone(),
            name: a.name.clone(),
            floor: a
                .floor_id
                .as_deref()
                .and_then(|f| controller.store().floor(f))
                .map(|f| f.name.clone())
                .unwrap_or_default(),
            entities: controller.entities_in_area(&a.id).len(),
        },
        |a| a.id.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub fn devices(controller: &Controller, global: &GlobalOpts) -> Result<(), CliError> {
    let devices = controller.devices_snapshot();
    let out = output::render_list(
        global.output,
        devices.as_slice(),
        |d: &Arc<Device>| DeviceRow {
            id: d.id.clone(),
            name: d.name.clone().unwrap_or_default(),
            manufacturer: d.manufacturer.clone().unwrap_or_default(),
            model: d.model.clone().unwrap_or_default(),
            area: d
                .area_id
                .as_deref()
                .and_then(|a| controller.store().area(a))
                .map(|a| a.name.clone())
                .unwrap_or_default(),
        },
        |d| d.id.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
