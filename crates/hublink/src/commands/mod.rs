//! Command dispatch: bridges CLI args -> hub client -> output formatting.

pub mod call;
pub mod config_cmd;
pub mod ping;
pub mod send;
pub mod states;
pub mod watch;

use hublink_core::HubClient;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a hub-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, client: &HubClient, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Ping(args) => ping::handle(client, args, global).await,
        Command::States(args) => states::handle(client, args, global).await,
        Command::Call(args) => call::handle(client, args, global).await,
        Command::Watch(args) => watch::handle(client, args, global).await,
        Command::Send(args) => send::handle(client, args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => Ok(()),
    }
}
