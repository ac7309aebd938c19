use thiserror::Error;

/// Top-level error type for the `hublink-api` crate.
///
/// Covers every failure mode of the wire layer: HTTP transport,
/// gateway status codes, socket transport, and frame encoding.
/// `hublink-core` maps these into the client's error taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Gateway ─────────────────────────────────────────────────────
    /// The gateway answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The gateway answered 2xx but the payload was not what we expected.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    // ── Socket ──────────────────────────────────────────────────────
    /// Socket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// Socket closed by the peer.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    // ── Data ────────────────────────────────────────────────────────
    /// A frame could not be decoded, with the raw text for debugging.
    #[error("Codec error: {message}")]
    Codec { message: String, frame: String },

    /// An outbound message was rejected before it hit the wire.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

impl Error {
    /// Returns `true` if this is a transport-level failure worth retrying.
    ///
    /// Status-code failures are never transient here: the gateway answered,
    /// and retrying an application-level rejection is the caller's call.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.status().is_none(),
            Self::WebSocketConnect(_) => true,
            _ => false,
        }
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
