// ── Core error types ──
//
// User-facing errors from hublink-core. Callers never see raw reqwest or
// tungstenite failures: the `From<hublink_api::Error>` impl translates
// wire-layer errors into the client's taxonomy.
//
// `CoreError` is `Clone` because one failure often fans out to many
// receivers: every pending request on a dropped connection, every
// `connect()` waiter, and every event subscriber.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to hub at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication rejected by hub: {message}")]
    AuthenticationFailed { message: String },

    #[error("Gave up reconnecting after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Not connected to hub")]
    NotConnected,

    // ── Request errors ───────────────────────────────────────────────
    #[error("Request {id} timed out after {timeout_ms}ms")]
    RequestTimeout { id: u64, timeout_ms: u64 },

    #[error("Hub rejected request: {message} ({code})")]
    Rejected { code: String, message: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    // ── Gateway errors ───────────────────────────────────────────────
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Unexpected response from hub: {message}")]
    UnexpectedResponse { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Errors after which the client stops trying on its own.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed { .. } | Self::ReconnectExhausted { .. }
        )
    }
}

// ── Conversion from wire-layer errors ────────────────────────────────

impl From<hublink_api::Error> for CoreError {
    fn from(err: hublink_api::Error) -> Self {
        match err {
            hublink_api::Error::Transport(ref e) => CoreError::ConnectionFailed {
                url: e.url().map(ToString::to_string).unwrap_or_default(),
                reason: e.to_string(),
            },
            hublink_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            hublink_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            hublink_api::Error::Http { status, body } => CoreError::Http { status, body },
            hublink_api::Error::UnexpectedResponse(message) => {
                CoreError::UnexpectedResponse { message }
            }
            hublink_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("WebSocket connection failed: {reason}"),
            },
            hublink_api::Error::WebSocketClosed { code, reason } => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("WebSocket closed (code {code}): {reason}"),
            },
            hublink_api::Error::Codec { message, frame: _ } => {
                CoreError::Internal(format!("Codec error: {message}"))
            }
            hublink_api::Error::InvalidMessage(message) => CoreError::InvalidRequest { message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_survives_conversion() {
        let err: CoreError = hublink_api::Error::Http {
            status: 401,
            body: "401: Unauthorized".into(),
        }
        .into();
        assert_eq!(
            err,
            CoreError::Http {
                status: 401,
                body: "401: Unauthorized".into()
            }
        );
    }

    #[test]
    fn socket_failures_become_connection_failures() {
        let err: CoreError = hublink_api::Error::WebSocketConnect("refused".into()).into();
        assert!(matches!(err, CoreError::ConnectionFailed { .. }));
        assert!(!err.is_terminal());
    }

    #[test]
    fn bad_commands_are_invalid_requests() {
        let err: CoreError = hublink_api::Error::InvalidMessage("no type".into()).into();
        assert!(matches!(err, CoreError::InvalidRequest { .. }));
    }

    #[test]
    fn auth_and_exhaustion_are_terminal() {
        assert!(
            CoreError::AuthenticationFailed {
                message: "bad token".into()
            }
            .is_terminal()
        );
        assert!(CoreError::ReconnectExhausted { attempts: 10 }.is_terminal());
        assert!(!CoreError::ConnectionClosed.is_terminal());
    }
}
