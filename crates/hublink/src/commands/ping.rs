//! `hublink ping`: reachability check over HTTP, optionally the socket too.

use serde::Serialize;

use hublink_core::HubClient;

use crate::cli::{GlobalOpts, PingArgs};
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct PingReport {
    url: String,
    api: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    socket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hub_version: Option<String>,
}

pub async fn handle(client: &HubClient, args: PingArgs, global: &GlobalOpts) -> Result<(), CliError> {
    client.ping().await?;

    let mut report = PingReport {
        url: client.config().hub_url.to_string(),
        api: "running",
        socket: None,
        hub_version: None,
    };

    if args.socket {
        client.connect().await?;
        report.socket = Some(client.state().to_string());
        report.hub_version = client.hub_version();
    }

    let out = output::render_single(
        global.output,
        &report,
        |r| {
            let mut lines = vec![format!("{}  API {}", r.url, r.api)];
            if let Some(ref socket) = r.socket {
                lines.push(format!(
                    "socket {socket} (hub {})",
                    r.hub_version.as_deref().unwrap_or("unknown version")
                ));
            }
            lines.join("\n")
        },
        |r| r.api.to_owned(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
