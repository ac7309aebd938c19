//! `hublink watch`: stream state changes from the event socket.

use std::pin::pin;

use futures_util::StreamExt;
use serde::Serialize;

use hublink_core::{ConnectionState, HubClient, HubEvent, StateChange};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct ChangeLine<'a> {
    entity_id: &'a str,
    old_state: Option<&'a str>,
    new_state: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_updated: Option<String>,
}

impl<'a> From<&'a StateChange> for ChangeLine<'a> {
    fn from(change: &'a StateChange) -> Self {
        Self {
            entity_id: &change.entity_id,
            old_state: change.old_state.as_deref().map(|e| e.state.as_str()),
            new_state: change.new_state.as_deref().map(|e| e.state.as_str()),
            last_updated: change
                .new_state
                .as_deref()
                .map(|e| e.last_updated.to_rfc3339()),
        }
    }
}

fn render_change(change: &StateChange, format: OutputFormat, color: bool) -> Result<String, CliError> {
    let line = ChangeLine::from(change);
    match format {
        // One record per line, so streams stay parseable
        OutputFormat::Json | OutputFormat::JsonCompact => output::render_json(&line, true),
        OutputFormat::Table | OutputFormat::Yaml | OutputFormat::Plain => {
            let paint = |s: Option<&str>| s.map_or_else(|| "(removed)".into(), |s| output::paint_state(s, color));
            Ok(format!(
                "{}  {}: {} -> {}",
                chrono::Local::now().format("%H:%M:%S"),
                line.entity_id,
                paint(line.old_state),
                paint(line.new_state),
            ))
        }
    }
}

pub async fn handle(client: &HubClient, args: WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let color = output::should_color(global.color);
    let mut events = pin!(client.event_stream());

    client.connect().await?;
    if !global.quiet {
        eprintln!(
            "Watching {} (Ctrl-C to stop)",
            if args.entity.is_empty() {
                "all entities".to_owned()
            } else {
                args.entity.join(", ")
            }
        );
    }

    let mut seen = 0usize;
    let ctrl_c = tokio::signal::ctrl_c();
    let mut ctrl_c = pin!(ctrl_c);

    loop {
        let event = tokio::select! {
            _ = &mut ctrl_c => break,
            event = events.next() => match event {
                Some(event) => event,
                None => break,
            },
        };

        match event {
            HubEvent::StateChanged(change) => {
                output::print_output(&render_change(&change, global.output, color)?, global.quiet);
                seen += 1;
                if args.count.is_some_and(|n| seen >= n) {
                    break;
                }
            }
            HubEvent::ConnectionStatus(state) => {
                tracing::info!(%state, "connection status");
                if state == ConnectionState::Disconnected && !global.quiet {
                    eprintln!("Connection lost, reconnecting...");
                }
            }
            HubEvent::StatesLoaded(states) => {
                tracing::debug!(count = states.len(), "snapshot loaded");
            }
            HubEvent::Error(err) if err.is_terminal() => return Err(err.into()),
            HubEvent::Error(err) => tracing::warn!(error = %err, "hub error"),
        }
    }

    Ok(())
}
