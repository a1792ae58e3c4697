//! Service catalogue listing.

use serde::Serialize;
use serde_json::Value;
use tabled::Tabled;

use hublink_core::Controller;

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

#[derive(Debug, Clone, Serialize, Tabled)]
struct ServiceRow {
    #[tabled(rename = "Domain")]
    domain: String,
    #[tabled(rename = "Service")]
    service: String,
    #[tabled(rename = "Description")]
    description: String,
}

/// Flatten `{domain: {service: {description, ...}}}` into sorted rows.
fn flatten(catalogue: &Value, only: Option<&str>) -> Vec<ServiceRow> {
    let mut rows = Vec::new();
    let Some(domains) = catalogue.as_object() else {
        return rows;
    };
    for (domain, services) in domains {
        if only.is_some_and(|d| d != domain) {
            continue;
        }
        let Some(services) = services.as_object() else {
            continue;
        };
        for (service, info) in services {
            rows.push(ServiceRow {
                domain: domain.clone(),
                service: service.clone(),
                description: info
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned(),
            });
        }
    }
    rows.sort_by(|a, b| (&a.domain, &a.service).cmp(&(&b.domain, &b.service)));
    rows
}

pub async fn handle(
    controller: &Controller,
    domain: Option<String>,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let catalogue = controller.get_services().await?;
    let rows = flatten(&catalogue, domain.as_deref());
    let out = output::render_list(
        global.output,
        &rows,
        ServiceRow::clone,
        |r| format!("{}.{}", r.domain, r.service),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
