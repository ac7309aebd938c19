// ── Event dispatch ──
//
// Typed pub/sub for everything the client observes. Global listeners get
// every `HubEvent`; entity listeners get only the state changes for the id
// they asked about. State changes are applied to the cache before anyone
// is notified, so a listener that reads the cache sees the new state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use hublink_api::Entity;
use hublink_api::wire::StateChangedData;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::cache::EntityStateCache;
use crate::connection::ConnectionState;
use crate::error::CoreError;

const GLOBAL_CHANNEL_CAPACITY: usize = 1024;
const ENTITY_CHANNEL_CAPACITY: usize = 64;

/// One entity's transition, as applied to the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    pub entity_id: String,
    /// `None` when the entity was removed.
    pub new_state: Option<Arc<Entity>>,
    pub old_state: Option<Arc<Entity>>,
}

/// Everything a global listener can observe.
#[derive(Debug, Clone)]
pub enum HubEvent {
    ConnectionStatus(ConnectionState),
    StateChanged(Arc<StateChange>),
    /// The post-authentication snapshot was merged into the cache.
    StatesLoaded(Arc<Vec<Arc<Entity>>>),
    Error(CoreError),
}

/// Broadcast hub for global and entity-scoped listeners.
pub struct EventDispatcher {
    cache: Arc<EntityStateCache>,
    global: broadcast::Sender<HubEvent>,
    per_entity: Mutex<HashMap<String, broadcast::Sender<Arc<StateChange>>>>,
}

impl EventDispatcher {
    pub fn new(cache: Arc<EntityStateCache>) -> Self {
        let (global, _) = broadcast::channel(GLOBAL_CHANNEL_CAPACITY);
        Self {
            cache,
            global,
            per_entity: Mutex::new(HashMap::new()),
        }
    }

    pub fn cache(&self) -> &Arc<EntityStateCache> {
        &self.cache
    }

    /// Listen to every event.
    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.global.subscribe()
    }

    /// Listen to state changes of one entity.
    pub fn subscribe_entity(&self, entity_id: &str) -> broadcast::Receiver<Arc<StateChange>> {
        let mut per_entity = self
            .per_entity
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        per_entity.retain(|_, tx| tx.receiver_count() > 0);
        per_entity
            .entry(entity_id.to_owned())
            .or_insert_with(|| broadcast::channel(ENTITY_CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Fan an event out to global listeners. Having none is fine.
    pub fn publish(&self, event: HubEvent) {
        let _ = self.global.send(event);
    }

    // ── Cache application (reactor only) ─────────────────────────────

    /// Apply a `state_changed` payload to the cache and notify listeners.
    ///
    /// Untracked entities are dropped before touching the cache. A missing
    /// `new_state` removes the entity. Returns `true` if anything was
    /// applied.
    pub(crate) fn apply_state_change(
        &self,
        data: StateChangedData,
        tracks: impl Fn(&str) -> bool,
    ) -> bool {
        if !tracks(&data.entity_id) {
            trace!(entity_id = %data.entity_id, "ignoring untracked entity");
            return false;
        }

        let now = Utc::now();
        let previous = match data.new_state {
            Some(wire) => {
                let mut entity = wire.into_entity(&data.entity_id, now);
                entity.id.clone_from(&data.entity_id);
                self.cache.upsert(Arc::new(entity))
            }
            None => {
                debug!(entity_id = %data.entity_id, "entity removed");
                self.cache.remove(&data.entity_id)
            }
        };

        // The cache's previous record is the authoritative old state; the
        // hub's copy only fills in for entities we had never seen.
        let new_state = self.cache.get(&data.entity_id);
        let old_state = previous.or_else(|| {
            data.old_state
                .map(|wire| Arc::new(wire.into_entity(&data.entity_id, now)))
        });

        self.notify(StateChange {
            entity_id: data.entity_id,
            new_state,
            old_state,
        });
        true
    }

    /// Merge a snapshot into the cache and announce it. Returns the
    /// number of records written.
    pub(crate) fn load_snapshot(
        &self,
        entities: Vec<Entity>,
        tracks: impl Fn(&str) -> bool,
    ) -> usize {
        let tracked: Vec<Arc<Entity>> = entities
            .into_iter()
            .filter(|e| tracks(&e.id))
            .map(Arc::new)
            .collect();
        let written = self.cache.merge(tracked);
        debug!(written, cached = self.cache.len(), "snapshot merged");
        self.publish(HubEvent::StatesLoaded(self.cache.snapshot()));
        written
    }

    fn notify(&self, change: StateChange) {
        let change = Arc::new(change);
        self.publish(HubEvent::StateChanged(Arc::clone(&change)));

        let mut per_entity = self
            .per_entity
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let delivered = per_entity
            .get(&change.entity_id)
            .map(|tx| tx.send(Arc::clone(&change)).is_ok());
        if delivered == Some(false) {
            // Every listener for this entity went away.
            per_entity.remove(&change.entity_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use hublink_api::wire::{HubMessage, decode};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tokio::sync::broadcast::error::TryRecvError;

    use super::*;

    fn dispatcher() -> EventDispatcher {
        EventDispatcher::new(Arc::new(EntityStateCache::new()))
    }

    fn state_changed(data: &serde_json::Value) -> StateChangedData {
        let frame = json!({
            "type": "event",
            "id": 1,
            "event": { "event_type": "state_changed", "data": data }
        })
        .to_string();
        match decode(&frame).unwrap() {
            HubMessage::Event { event, .. } => event.state_changed().unwrap().unwrap(),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    fn kitchen_on() -> StateChangedData {
        state_changed(&json!({
            "entity_id": "light.kitchen",
            "new_state": {
                "entity_id": "light.kitchen",
                "state": "on",
                "last_changed": "2026-02-01T10:00:00Z",
                "last_updated": "2026-02-01T10:00:00Z"
            },
            "old_state": null
        }))
    }

    #[test]
    fn change_notifies_global_and_entity_listeners_once() {
        let dispatcher = dispatcher();
        let mut global = dispatcher.subscribe();
        let mut kitchen = dispatcher.subscribe_entity("light.kitchen");
        let mut porch = dispatcher.subscribe_entity("light.porch");

        assert!(dispatcher.apply_state_change(kitchen_on(), |_| true));

        match global.try_recv().unwrap() {
            HubEvent::StateChanged(change) => {
                assert_eq!(change.entity_id, "light.kitchen");
                assert_eq!(change.new_state.as_ref().unwrap().state, "on");
                assert!(change.old_state.is_none());
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(global.try_recv(), Err(TryRecvError::Empty)));

        let change = kitchen.try_recv().unwrap();
        assert_eq!(change.entity_id, "light.kitchen");
        assert!(matches!(kitchen.try_recv(), Err(TryRecvError::Empty)));
        assert!(matches!(porch.try_recv(), Err(TryRecvError::Empty)));

        assert_eq!(
            dispatcher.cache().get("light.kitchen").unwrap().state,
            "on"
        );
    }

    #[test]
    fn abandoned_entity_listeners_are_pruned_on_subscribe() {
        let dispatcher = dispatcher();
        drop(dispatcher.subscribe_entity("light.attic"));
        let _kitchen = dispatcher.subscribe_entity("light.kitchen");
        let _kitchen_again = dispatcher.subscribe_entity("light.kitchen");

        let per_entity = dispatcher.per_entity.lock().unwrap();
        assert_eq!(per_entity.len(), 1);
        assert_eq!(per_entity["light.kitchen"].receiver_count(), 2);
    }

    #[test]
    fn untracked_changes_are_dropped() {
        let dispatcher = dispatcher();
        let mut global = dispatcher.subscribe();

        assert!(!dispatcher.apply_state_change(kitchen_on(), |id| id == "light.porch"));
        assert!(dispatcher.cache().is_empty());
        assert!(matches!(global.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn null_new_state_removes_entity() {
        let dispatcher = dispatcher();
        dispatcher.apply_state_change(kitchen_on(), |_| true);
        let mut global = dispatcher.subscribe();

        let removal = state_changed(&json!({
            "entity_id": "light.kitchen",
            "new_state": null,
            "old_state": { "entity_id": "light.kitchen", "state": "on" }
        }));
        assert!(dispatcher.apply_state_change(removal, |_| true));

        assert!(dispatcher.cache().get("light.kitchen").is_none());
        match global.try_recv().unwrap() {
            HubEvent::StateChanged(change) => {
                assert!(change.new_state.is_none());
                assert_eq!(change.old_state.as_ref().unwrap().state, "on");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn old_state_comes_from_cache_when_known() {
        let dispatcher = dispatcher();
        dispatcher.apply_state_change(kitchen_on(), |_| true);

        let mut kitchen = dispatcher.subscribe_entity("light.kitchen");
        let off = state_changed(&json!({
            "entity_id": "light.kitchen",
            "new_state": { "state": "off", "last_updated": "2026-02-01T10:05:00Z" },
            "old_state": { "state": "bogus" }
        }));
        dispatcher.apply_state_change(off, |_| true);

        let change = kitchen.try_recv().unwrap();
        assert_eq!(change.old_state.as_ref().unwrap().state, "on");
        assert_eq!(change.new_state.as_ref().unwrap().state, "off");
    }

    #[test]
    fn snapshot_load_filters_and_announces() {
        let dispatcher = dispatcher();
        let mut global = dispatcher.subscribe();

        let entities: Vec<Entity> = ["light.kitchen", "light.porch"]
            .into_iter()
            .map(|id| Entity {
                id: id.into(),
                state: "off".into(),
                attributes: serde_json::Map::new(),
                last_changed: Utc::now(),
                last_updated: Utc::now(),
            })
            .collect();

        let written = dispatcher.load_snapshot(entities, |id| id == "light.porch");
        assert_eq!(written, 1);
        match global.try_recv().unwrap() {
            HubEvent::StatesLoaded(states) => {
                assert_eq!(states.len(), 1);
                assert_eq!(states[0].id, "light.porch");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn dropped_entity_listeners_are_pruned() {
        let dispatcher = dispatcher();
        drop(dispatcher.subscribe_entity("light.kitchen"));
        dispatcher.apply_state_change(kitchen_on(), |_| true);
        assert!(dispatcher.per_entity.lock().unwrap().is_empty());
    }
}
