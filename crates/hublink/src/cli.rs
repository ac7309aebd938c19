//! Clap derive structures for the `hublink` CLI.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// hublink -- talk to a home automation hub from the command line
#[derive(Debug, Parser)]
#[command(
    name = "hublink",
    version,
    about = "Query and control a home automation hub from the command line",
    long_about = "Query and control a home automation hub.\n\n\
        One-shot commands use the hub's HTTP API; `watch` and `send`\n\
        open the authenticated event socket.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Hub profile to use
    #[arg(long, short = 'p', env = "HUBLINK_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Hub URL (overrides profile)
    #[arg(long, short = 'u', env = "HUBLINK_URL", global = true)]
    pub url: Option<String>,

    /// Long-lived access token
    #[arg(long, env = "HUBLINK_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "HUBLINK_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "HUBLINK_INSECURE", global = true)]
    pub insecure: bool,

    /// HTTP timeout in seconds (overrides profile)
    #[arg(long, env = "HUBLINK_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check that the hub API is reachable
    Ping(PingArgs),

    /// List entity states, or show one entity
    #[command(alias = "st")]
    States(StatesArgs),

    /// Call a hub service
    Call(CallArgs),

    /// Stream state changes over the event socket
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Send a raw command over the event socket and print the reply
    Send(SendArgs),

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Hub commands ─────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct PingArgs {
    /// Also authenticate over the event socket and report the hub version
    #[arg(long)]
    pub socket: bool,
}

#[derive(Debug, Args)]
pub struct StatesArgs {
    /// Show a single entity instead of a list
    pub entity_id: Option<String>,

    /// Case-insensitive match on entity id or friendly name
    #[arg(long, short = 's')]
    pub search: Option<String>,

    /// Match the search term as a prefix instead of a substring
    #[arg(long, requires = "search")]
    pub prefix: bool,

    /// Only entities in this domain (light, sensor, ...)
    #[arg(long, short = 'd')]
    pub domain: Option<String>,

    /// Only entities whose attribute equals a value (key=value)
    #[arg(long, value_name = "KEY=VALUE")]
    pub attr: Option<String>,
}

#[derive(Debug, Args)]
pub struct CallArgs {
    /// Service domain (e.g. light)
    pub domain: String,

    /// Service name (e.g. turn_on)
    pub service: String,

    /// Target entity id (repeatable)
    #[arg(long, short = 'e')]
    pub entity: Vec<String>,

    /// Service data as a JSON object
    #[arg(long)]
    pub data: Option<String>,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Only watch these entity ids (repeatable)
    #[arg(long, short = 'e')]
    pub entity: Vec<String>,

    /// Exit after this many changes
    #[arg(long, short = 'n')]
    pub count: Option<usize>,
}

#[derive(Debug, Args)]
pub struct SendArgs {
    /// Command as a JSON object; the `id` field is assigned automatically
    pub message: String,

    /// Seconds to wait for the reply
    #[arg(long)]
    pub wait: Option<u64>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Display current configuration
    Show,

    /// Set a value on the active profile
    Set {
        /// Profile key (url, token_env, ca_cert, insecure, timeout, track)
        key: String,

        /// Value to set
        value: String,
    },

    /// List configured profiles
    Profiles,

    /// Make a profile the default
    Use {
        /// Profile name
        name: String,
    },

    /// Store the active profile's token in the system keyring
    SetToken {
        /// The token; read from HUBLINK_TOKEN / --token when omitted
        token: Option<String>,
    },
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
