//! `hublink call`: one-shot service call over the HTTP API.

use serde_json::{Map, Value};

use hublink_core::{HubClient, ServiceCall, Target};

use crate::cli::{CallArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

fn parse_data(raw: Option<&str>) -> Result<Map<String, Value>, CliError> {
    match raw {
        None => Ok(Map::new()),
        Some(text) => match serde_json::from_str(text)? {
            Value::Object(map) => Ok(map),
            other => Err(CliError::Validation {
                field: "data".into(),
                reason: format!("expected a JSON object, got {other}"),
            }),
        },
    }
}

pub async fn handle(client: &HubClient, args: CallArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let call = ServiceCall {
        data: parse_data(args.data.as_deref())?,
        target: Target::entities(args.entity),
    };

    let reply = client
        .call_service(&args.domain, &args.service, &call)
        .await?;

    // The hub answers with the states the call changed
    let changed = match reply {
        Value::Array(ref items) => items.len(),
        _ => 0,
    };
    let out = output::render_single(
        global.output,
        &reply,
        |_| format!("Called {}.{} ({changed} states changed)", args.domain, args.service),
        |_| changed.to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
