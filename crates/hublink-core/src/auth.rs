// ── Authentication handshake ──
//
// The hub speaks first: `auth_required`, then we answer with the token,
// then it rules `auth_ok` or `auth_invalid`. Frames that arrive out of
// order are ignored rather than treated as protocol errors.

use hublink_api::wire::{ClientMessage, HubMessage};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::error::CoreError;

/// What the reactor should do with an inbound frame during the handshake.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum AuthStep {
    /// Not a handshake frame, or not one expected right now.
    Ignore,
    /// Send this frame to the hub.
    Respond(String),
    Accepted { hub_version: Option<String> },
    Rejected { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitingChallenge,
    AwaitingVerdict,
    Done,
}

/// Per-connection handshake state. One is created for every opened link,
/// carrying the token of the config snapshot that link was opened with.
pub(crate) struct AuthHandshake {
    token: SecretString,
    phase: Phase,
}

impl AuthHandshake {
    pub(crate) fn new(token: SecretString) -> Self {
        Self {
            token,
            phase: Phase::AwaitingChallenge,
        }
    }

    pub(crate) fn on_message(&mut self, message: &HubMessage) -> Result<AuthStep, CoreError> {
        match (self.phase, message) {
            (Phase::AwaitingChallenge, HubMessage::AuthRequired { ha_version }) => {
                debug!(hub_version = ?ha_version, "hub requested authentication");
                let frame = ClientMessage::Auth {
                    access_token: self.token.expose_secret(),
                }
                .encode()?;
                self.phase = Phase::AwaitingVerdict;
                Ok(AuthStep::Respond(frame))
            }
            (Phase::AwaitingVerdict, HubMessage::AuthOk { ha_version }) => {
                self.phase = Phase::Done;
                Ok(AuthStep::Accepted {
                    hub_version: ha_version.clone(),
                })
            }
            (Phase::AwaitingVerdict, HubMessage::AuthInvalid { message }) => {
                self.phase = Phase::Done;
                Ok(AuthStep::Rejected {
                    message: message
                        .clone()
                        .unwrap_or_else(|| "invalid access token".into()),
                })
            }
            (phase, other) => {
                debug!(?phase, frame = ?other, "ignoring frame during handshake");
                Ok(AuthStep::Ignore)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use hublink_api::wire::decode;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    use super::*;

    fn handshake() -> AuthHandshake {
        AuthHandshake::new(SecretString::from("T".to_string()))
    }

    fn frame(value: &Value) -> HubMessage {
        decode(&value.to_string()).unwrap()
    }

    #[test]
    fn challenge_is_answered_with_token() {
        let mut auth = handshake();
        let step = auth
            .on_message(&frame(&json!({ "type": "auth_required", "ha_version": "2026.2.0" })))
            .unwrap();

        let text = match step {
            AuthStep::Respond(text) => text,
            other => panic!("expected a response, got {other:?}"),
        };
        let sent: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(sent, json!({ "type": "auth", "access_token": "T" }));
        assert_eq!(auth.phase, Phase::AwaitingVerdict);
    }

    #[test]
    fn verdict_before_challenge_is_ignored() {
        let mut auth = handshake();
        let step = auth.on_message(&frame(&json!({ "type": "auth_ok" }))).unwrap();
        assert_eq!(step, AuthStep::Ignore);
        assert_eq!(auth.phase, Phase::AwaitingChallenge);
    }

    #[test]
    fn auth_ok_accepts() {
        let mut auth = handshake();
        auth.on_message(&frame(&json!({ "type": "auth_required" })))
            .unwrap();
        let step = auth
            .on_message(&frame(&json!({ "type": "auth_ok", "ha_version": "2026.2.0" })))
            .unwrap();
        assert_eq!(
            step,
            AuthStep::Accepted {
                hub_version: Some("2026.2.0".into())
            }
        );
    }

    #[test]
    fn auth_invalid_rejects_with_message() {
        let mut auth = handshake();
        auth.on_message(&frame(&json!({ "type": "auth_required" })))
            .unwrap();
        let step = auth
            .on_message(&frame(&json!({ "type": "auth_invalid", "message": "Invalid password" })))
            .unwrap();
        assert_eq!(
            step,
            AuthStep::Rejected {
                message: "Invalid password".into()
            }
        );
    }

    #[test]
    fn repeated_challenge_is_ignored() {
        let mut auth = handshake();
        auth.on_message(&frame(&json!({ "type": "auth_required" })))
            .unwrap();
        let step = auth
            .on_message(&frame(&json!({ "type": "auth_required" })))
            .unwrap();
        assert_eq!(step, AuthStep::Ignore);
    }
}
