//! `hublink send`: raw correlated command over the event socket.

use std::time::Duration;

use serde_json::Value;

use hublink_core::HubClient;

use crate::cli::{GlobalOpts, SendArgs};
use crate::error::CliError;
use crate::output;

pub async fn handle(client: &HubClient, args: SendArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let message: Value = serde_json::from_str(&args.message)?;
    if !message.is_object() {
        return Err(CliError::Validation {
            field: "message".into(),
            reason: "expected a JSON object with a \"type\" field".into(),
        });
    }

    client.connect().await?;
    let reply = match args.wait {
        Some(secs) => {
            client
                .send_with_timeout(message, Duration::from_secs(secs))
                .await?
        }
        None => client.send(message).await?,
    };

    let out = output::render_single(
        global.output,
        &reply,
        |r| serde_json::to_string_pretty(r).unwrap_or_else(|_| r.to_string()),
        Value::to_string,
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
