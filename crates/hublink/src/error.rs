//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use hublink_config::ConfigError;
use hublink_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not connect to hub at {url}")]
    #[diagnostic(
        code(hublink::connection_failed),
        help(
            "Check that the hub is running and reachable.\n\
             Reason: {reason}\n\
             Try: hublink ping --insecure"
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Connection to the hub was lost: {reason}")]
    #[diagnostic(code(hublink::disconnected))]
    Disconnected { reason: String },

    // ── Authentication ───────────────────────────────────────────────

    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(hublink::auth_failed),
        help(
            "Verify the long-lived access token for profile '{profile}'.\n\
             Store a new one with: hublink config set-token --profile {profile}"
        )
    )]
    AuthFailed { profile: String, message: String },

    #[error("No access token configured for profile '{profile}'")]
    #[diagnostic(
        code(hublink::no_token),
        help(
            "Store one with: hublink config set-token\n\
             Or set the HUBLINK_TOKEN environment variable."
        )
    )]
    NoToken { profile: String },

    // ── Resources ────────────────────────────────────────────────────

    #[error("Entity '{entity_id}' not found")]
    #[diagnostic(
        code(hublink::not_found),
        help("Run: hublink states --search {entity_id}")
    )]
    NotFound { entity_id: String },

    // ── Hub ──────────────────────────────────────────────────────────

    #[error("Hub error ({code}): {message}")]
    #[diagnostic(code(hublink::hub_error))]
    HubError { code: String, message: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(hublink::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(hublink::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: hublink config set url <URL> --profile {name}"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No hub configured")]
    #[diagnostic(
        code(hublink::no_config),
        help(
            "Pass --url, set HUBLINK_URL, or create a profile with:\n\
             hublink config set url http://hub.local:8123\n\
             Expected config at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(hublink::config))]
    Config(Box<ConfigError>),

    // ── Timeout ──────────────────────────────────────────────────────

    #[error("Request timed out after {millis}ms")]
    #[diagnostic(
        code(hublink::timeout),
        help("Increase the timeout or check hub responsiveness.")
    )]
    Timeout { millis: u64 },

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    #[diagnostic(code(hublink::json))]
    Json(#[from] serde_json::Error),

    #[error("YAML rendering failed: {0}")]
    #[diagnostic(code(hublink::yaml))]
    Yaml(#[from] serde_yaml::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Disconnected { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoToken { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::NoConfig { .. } | Self::ProfileNotFound { .. } => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoToken { profile } => CliError::NoToken { profile },
            ConfigError::ProfileNotFound { name, available } => {
                CliError::ProfileNotFound { name, available }
            }
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            other => CliError::Config(Box::new(other)),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed { url, reason },

            CoreError::AuthenticationFailed { message } => CliError::AuthFailed {
                profile: "current".into(),
                message,
            },

            CoreError::Http { status: 401, body } => CliError::AuthFailed {
                profile: "current".into(),
                message: if body.is_empty() { "401 Unauthorized".into() } else { body },
            },

            CoreError::Http { status: 404, body } => CliError::HubError {
                code: "not_found".into(),
                message: body,
            },

            CoreError::ReconnectExhausted { attempts } => CliError::Disconnected {
                reason: format!("gave up after {attempts} reconnect attempts"),
            },

            closed @ (CoreError::ConnectionClosed | CoreError::NotConnected) => {
                CliError::Disconnected {
                    reason: closed.to_string(),
                }
            }

            CoreError::RequestTimeout { timeout_ms, .. } => CliError::Timeout { millis: timeout_ms },

            CoreError::Rejected { code, message } => CliError::HubError { code, message },

            CoreError::InvalidRequest { message } => CliError::Validation {
                field: "message".into(),
                reason: message,
            },

            CoreError::Http { status, body } => CliError::HubError {
                code: format!("http_{status}"),
                message: body,
            },

            CoreError::UnexpectedResponse { message } => CliError::HubError {
                code: "unexpected_response".into(),
                message,
            },

            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },

            CoreError::Internal(message) => CliError::HubError {
                code: "internal".into(),
                message,
            },
        }
    }
}
