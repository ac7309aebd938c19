// ── Entity model ──
//
// The hub reports state objects in two places: the REST snapshot and the
// `new_state`/`old_state` fields of change notifications. Both decode
// through `WireState` so missing fields are tolerated the same way.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A named piece of remote state (a sensor, a switch, a light...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "entity_id")]
    pub id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    pub last_changed: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl Entity {
    /// The domain part of the id: `"sensor"` for `"sensor.kitchen"`.
    pub fn domain(&self) -> &str {
        entity_domain(&self.id)
    }

    /// The `friendly_name` attribute, if the hub set one.
    pub fn friendly_name(&self) -> Option<&str> {
        self.attributes.get("friendly_name").and_then(Value::as_str)
    }

    /// Display name, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.friendly_name().unwrap_or(&self.id)
    }
}

/// Domain part of an entity id. Ids without a dot are their own domain.
pub fn entity_domain(entity_id: &str) -> &str {
    entity_id
        .split_once('.')
        .map_or(entity_id, |(domain, _)| domain)
}

/// A state object as it appears on the wire.
///
/// Notifications sometimes carry partial objects, so everything except
/// `state` is optional and filled in by [`WireState::into_entity`].
#[derive(Debug, Clone, Deserialize)]
pub struct WireState {
    #[serde(default)]
    pub entity_id: Option<String>,
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub last_changed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl WireState {
    /// Convert into an [`Entity`], using `fallback_id` when the object does
    /// not name itself and `now` for missing timestamps.
    pub fn into_entity(self, fallback_id: &str, now: DateTime<Utc>) -> Entity {
        let last_updated = self.last_updated.unwrap_or(now);
        Entity {
            id: self.entity_id.unwrap_or_else(|| fallback_id.to_owned()),
            state: self.state,
            attributes: self.attributes,
            last_changed: self.last_changed.unwrap_or(last_updated),
            last_updated,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn domain_split() {
        assert_eq!(entity_domain("sensor.kitchen_temp"), "sensor");
        assert_eq!(entity_domain("sun"), "sun");
    }

    #[test]
    fn partial_state_fills_defaults() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let wire: WireState = serde_json::from_value(serde_json::json!({ "state": "42" })).unwrap();

        let entity = wire.into_entity("sensor.x", now);
        assert_eq!(entity.id, "sensor.x");
        assert_eq!(entity.state, "42");
        assert!(entity.attributes.is_empty());
        assert_eq!(entity.last_updated, now);
        assert_eq!(entity.last_changed, now);
    }

    #[test]
    fn full_state_keeps_hub_fields() {
        let wire: WireState = serde_json::from_value(serde_json::json!({
            "entity_id": "light.porch",
            "state": "on",
            "attributes": { "friendly_name": "Porch", "brightness": 200 },
            "last_changed": "2026-03-01T08:00:00Z",
            "last_updated": "2026-03-01T08:05:00Z"
        }))
        .unwrap();

        let entity = wire.into_entity("ignored", Utc::now());
        assert_eq!(entity.id, "light.porch");
        assert_eq!(entity.display_name(), "Porch");
        assert_eq!(entity.domain(), "light");
        assert!(entity.last_updated > entity.last_changed);
    }
}
