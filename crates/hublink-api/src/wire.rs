//! JSON envelope exchanged over the hub's duplex channel.
//!
//! Every frame is a JSON object with a `type` discriminator. Inbound frames
//! decode into [`HubMessage`]; outbound frames are built from
//! [`ClientMessage`] or, for arbitrary correlated control messages, from a
//! caller-supplied JSON object with the request id spliced in.
//!
//! The codec is stateless: id allocation and reply matching live in the
//! client's request correlator.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;
use crate::model::WireState;

/// Event type the client subscribes to for cache updates.
pub const STATE_CHANGED: &str = "state_changed";

// ── Inbound ──────────────────────────────────────────────────────────

/// A frame sent by the hub.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubMessage {
    /// First frame after the socket opens.
    AuthRequired {
        #[serde(default)]
        ha_version: Option<String>,
    },
    AuthOk {
        #[serde(default)]
        ha_version: Option<String>,
    },
    AuthInvalid {
        #[serde(default)]
        message: Option<String>,
    },
    /// A notification delivered on an event subscription.
    Event {
        #[serde(default)]
        id: Option<u64>,
        event: EventPayload,
    },
    /// Reply to a correlated request.
    Result {
        id: u64,
        success: bool,
        #[serde(default)]
        result: Option<Value>,
        #[serde(default)]
        error: Option<HubError>,
    },
    Pong {
        #[serde(default)]
        id: Option<u64>,
    },
    /// Anything this client does not understand.
    #[serde(other)]
    Unknown,
}

/// Error object carried by a failed `result` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// The `event` object of an `event` frame.
#[derive(Debug, Clone, Deserialize)]
pub struct EventPayload {
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub time_fired: Option<String>,
}

/// Payload of a `state_changed` event.
#[derive(Debug, Clone, Deserialize)]
pub struct StateChangedData {
    pub entity_id: String,
    #[serde(default)]
    pub new_state: Option<WireState>,
    #[serde(default)]
    pub old_state: Option<WireState>,
}

impl EventPayload {
    /// Decode the data as a state change, if this is one.
    ///
    /// Returns `None` for other event types and `Some(Err)` when a
    /// `state_changed` payload is malformed.
    pub fn state_changed(&self) -> Option<Result<StateChangedData, Error>> {
        if self.event_type != STATE_CHANGED {
            return None;
        }
        Some(
            StateChangedData::deserialize(&self.data).map_err(|e| Error::Codec {
                message: format!("bad state_changed payload: {e}"),
                frame: self.data.to_string(),
            }),
        )
    }
}

/// Decode a text frame.
pub fn decode(text: &str) -> Result<HubMessage, Error> {
    serde_json::from_str(text).map_err(|e| Error::Codec {
        message: e.to_string(),
        frame: text.to_owned(),
    })
}

// ── Outbound ─────────────────────────────────────────────────────────

/// A frame this client sends on its own behalf.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage<'a> {
    Auth {
        access_token: &'a str,
    },
    SubscribeEvents {
        id: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        event_type: Option<&'a str>,
    },
    Ping {
        id: u64,
    },
}

impl ClientMessage<'_> {
    pub fn encode(&self) -> Result<String, Error> {
        serde_json::to_string(self).map_err(|e| Error::InvalidMessage(e.to_string()))
    }
}

/// Encode an arbitrary correlated control message.
///
/// The message must be a JSON object with a string `type`; `id` is
/// overwritten with the correlator-assigned value.
pub fn encode_command(id: u64, message: &Value) -> Result<String, Error> {
    let Some(object) = message.as_object() else {
        return Err(Error::InvalidMessage("message must be a JSON object".into()));
    };
    if !object.get("type").is_some_and(Value::is_string) {
        return Err(Error::InvalidMessage(
            "message must carry a string \"type\" field".into(),
        ));
    }

    let mut framed = Map::with_capacity(object.len() + 1);
    framed.insert("id".into(), Value::from(id));
    for (key, value) in object {
        if key != "id" {
            framed.insert(key.clone(), value.clone());
        }
    }
    serde_json::to_string(&framed).map_err(|e| Error::InvalidMessage(e.to_string()))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn decode_handshake_frames() {
        assert!(matches!(
            decode(r#"{"type":"auth_required","ha_version":"2026.1.0"}"#).unwrap(),
            HubMessage::AuthRequired { ha_version: Some(v) } if v == "2026.1.0"
        ));
        assert!(matches!(
            decode(r#"{"type":"auth_ok"}"#).unwrap(),
            HubMessage::AuthOk { .. }
        ));
        assert!(matches!(
            decode(r#"{"type":"auth_invalid","message":"Invalid password"}"#).unwrap(),
            HubMessage::AuthInvalid { message: Some(m) } if m == "Invalid password"
        ));
    }

    #[test]
    fn decode_failed_result() {
        let msg = decode(
            r#"{"id":7,"type":"result","success":false,"error":{"code":"not_found","message":"Service not found."}}"#,
        )
        .unwrap();

        let HubMessage::Result { id, success, result, error } = msg else {
            panic!("expected result frame");
        };
        assert_eq!(id, 7);
        assert!(!success);
        assert!(result.is_none());
        assert_eq!(error.unwrap().code, "not_found");
    }

    #[test]
    fn decode_state_changed_event() {
        let frame = json!({
            "type": "event",
            "id": 2,
            "event": {
                "event_type": "state_changed",
                "data": {
                    "entity_id": "sensor.x",
                    "new_state": { "state": "42" },
                    "old_state": { "state": "40" }
                }
            }
        });

        let HubMessage::Event { id, event } = decode(&frame.to_string()).unwrap() else {
            panic!("expected event frame");
        };
        assert_eq!(id, Some(2));

        let change = event.state_changed().unwrap().unwrap();
        assert_eq!(change.entity_id, "sensor.x");
        assert_eq!(change.new_state.unwrap().state, "42");
        assert_eq!(change.old_state.unwrap().state, "40");
    }

    #[test]
    fn other_event_types_are_not_state_changes() {
        let payload = EventPayload {
            event_type: "call_service".into(),
            data: json!({}),
            time_fired: None,
        };
        assert!(payload.state_changed().is_none());
    }

    #[test]
    fn unknown_frame_types_decode_as_unknown() {
        assert!(matches!(
            decode(r#"{"type":"supported_features","id":1}"#).unwrap(),
            HubMessage::Unknown
        ));
    }

    #[test]
    fn malformed_frames_keep_the_raw_text() {
        let err = decode("not json").unwrap_err();
        assert!(matches!(err, Error::Codec { ref frame, .. } if frame == "not json"));
    }

    #[test]
    fn encode_client_messages() {
        let auth = ClientMessage::Auth { access_token: "T" }.encode().unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(&auth).unwrap(),
            json!({ "type": "auth", "access_token": "T" })
        );

        let sub = ClientMessage::SubscribeEvents {
            id: 3,
            event_type: Some(STATE_CHANGED),
        }
        .encode()
        .unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(&sub).unwrap(),
            json!({ "type": "subscribe_events", "id": 3, "event_type": "state_changed" })
        );

        let ping = ClientMessage::Ping { id: 9 }.encode().unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(&ping).unwrap(),
            json!({ "type": "ping", "id": 9 })
        );
    }

    #[test]
    fn encode_command_splices_id() {
        let text = encode_command(
            12,
            &json!({ "type": "call_service", "domain": "light", "id": 999 }),
        )
        .unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(&text).unwrap(),
            json!({ "type": "call_service", "domain": "light", "id": 12 })
        );
    }

    #[test]
    fn encode_command_rejects_untyped_messages() {
        assert!(matches!(
            encode_command(1, &json!(["not", "an", "object"])),
            Err(Error::InvalidMessage(_))
        ));
        assert!(matches!(
            encode_command(1, &json!({ "domain": "light" })),
            Err(Error::InvalidMessage(_))
        ));
    }
}
