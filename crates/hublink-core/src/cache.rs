// ── Entity state cache ──
//
// Latest known state per entity id. Reads are lock-free from any task;
// writes come only from the connection reactor, so the cache never sees
// two concurrent mutations for the same connection.

use std::sync::Arc;

use dashmap::DashMap;
use hublink_api::Entity;
use tokio::sync::watch;

/// Concurrent map of entity id to its last known state.
///
/// Every mutation bumps a version counter and republishes a sorted
/// snapshot, so UIs can either poll [`version`](Self::version) or hold a
/// [`subscribe`](Self::subscribe) receiver.
pub struct EntityStateCache {
    entries: DashMap<String, Arc<Entity>>,
    version: watch::Sender<u64>,
    snapshot: watch::Sender<Arc<Vec<Arc<Entity>>>>,
}

impl Default for EntityStateCache {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStateCache {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            entries: DashMap::new(),
            version,
            snapshot,
        }
    }

    pub fn get(&self, entity_id: &str) -> Option<Arc<Entity>> {
        self.entries.get(entity_id).map(|r| Arc::clone(r.value()))
    }

    /// Every cached entity, sorted by id (cheap `Arc` clone).
    pub fn snapshot(&self) -> Arc<Vec<Arc<Entity>>> {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<Entity>>>> {
        self.snapshot.subscribe()
    }

    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // ── Writes (reactor only) ────────────────────────────────────────

    /// Replace the record for `entity.id`, returning the previous one.
    pub(crate) fn upsert(&self, entity: Arc<Entity>) -> Option<Arc<Entity>> {
        let previous = self.entries.insert(entity.id.clone(), entity);
        self.publish();
        previous
    }

    pub(crate) fn remove(&self, entity_id: &str) -> Option<Arc<Entity>> {
        let removed = self.entries.remove(entity_id).map(|(_, v)| v);
        if removed.is_some() {
            self.publish();
        }
        removed
    }

    /// Merge a bulk snapshot. A record only replaces a cached one that is
    /// not newer than itself, so a live update that raced ahead of the
    /// snapshot wins. Returns the number of records written.
    pub(crate) fn merge(&self, entities: impl IntoIterator<Item = Arc<Entity>>) -> usize {
        let mut written = 0;
        for entity in entities {
            let stale = self
                .entries
                .get(&entity.id)
                .is_some_and(|cached| cached.last_updated > entity.last_updated);
            if !stale {
                self.entries.insert(entity.id.clone(), entity);
                written += 1;
            }
        }
        if written > 0 {
            self.publish();
        }
        written
    }

    fn publish(&self) {
        let mut values: Vec<Arc<Entity>> =
            self.entries.iter().map(|r| Arc::clone(r.value())).collect();
        values.sort_by(|a, b| a.id.cmp(&b.id));
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
        self.version.send_modify(|v| *v += 1);
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_767_225_600 + secs, 0).unwrap()
    }

    fn entity(id: &str, state: &str, updated: i64) -> Arc<Entity> {
        Arc::new(Entity {
            id: id.into(),
            state: state.into(),
            attributes: serde_json::Map::new(),
            last_changed: at(updated),
            last_updated: at(updated),
        })
    }

    #[test]
    fn upsert_replaces_and_reports_previous() {
        let cache = EntityStateCache::new();
        assert!(cache.upsert(entity("light.kitchen", "off", 0)).is_none());

        let previous = cache.upsert(entity("light.kitchen", "on", 5)).unwrap();
        assert_eq!(previous.state, "off");
        assert_eq!(cache.get("light.kitchen").unwrap().state, "on");
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.version(), 2);
    }

    #[test]
    fn remove_only_bumps_version_when_present() {
        let cache = EntityStateCache::new();
        cache.upsert(entity("switch.fan", "on", 0));
        assert!(cache.remove("switch.fan").is_some());
        assert!(cache.remove("switch.fan").is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.version(), 2);
    }

    #[test]
    fn merge_keeps_newer_live_records() {
        let cache = EntityStateCache::new();
        cache.upsert(entity("light.kitchen", "on", 60));

        let written = cache.merge([
            entity("light.kitchen", "off", 30),
            entity("light.porch", "off", 30),
        ]);

        assert_eq!(written, 1);
        assert_eq!(cache.get("light.kitchen").unwrap().state, "on");
        assert_eq!(cache.get("light.porch").unwrap().state, "off");
    }

    #[test]
    fn snapshot_is_sorted_by_id() {
        let cache = EntityStateCache::new();
        cache.merge([
            entity("sensor.b", "1", 0),
            entity("light.z", "on", 0),
            entity("binary_sensor.a", "off", 0),
        ]);

        let ids: Vec<String> = cache.snapshot().iter().map(|e| e.id.clone()).collect();
        assert_eq!(ids, vec!["binary_sensor.a", "light.z", "sensor.b"]);
    }

    #[tokio::test]
    async fn subscribers_see_changes() {
        let cache = EntityStateCache::new();
        let mut rx = cache.subscribe();

        cache.upsert(entity("light.kitchen", "on", 0));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().len(), 1);
    }
}
