// ── Local status override layer ──
//
// Status changes the analyst made, keyed by incident id. Overrides win
// over whatever status the server reports until the server snapshot
// catches up, and they survive restarts through an `OverrideStore`
// backend. Persistence failures are logged, never propagated: losing
// the cache must not break the live session.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tracing::warn;

use crate::model::Status;

/// Durable backend for the override map. The map is saved as one blob,
/// read-modify-write, mirroring a small key-value cache file.
pub trait OverrideStore: Send + Sync {
    /// Load the persisted map; an empty map when nothing is saved or
    /// the cache is unreadable.
    fn load(&self) -> HashMap<String, Status>;

    /// Persist the full map, replacing whatever was saved before.
    fn save(&self, map: &HashMap<String, Status>) -> std::io::Result<()>;
}

/// In-memory backend, used in tests and as the fallback when no
/// durable cache is configured.
#[derive(Default)]
pub struct MemoryOverrideStore {
    saved: Mutex<HashMap<String, Status>>,
}

impl OverrideStore for MemoryOverrideStore {
    fn load(&self) -> HashMap<String, Status> {
        self.saved
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn save(&self, map: &HashMap<String, Status>) -> std::io::Result<()> {
        *self
            .saved
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = map.clone();
        Ok(())
    }
}

/// The live override map plus its persistence backend.
pub(crate) struct OverrideMap {
    statuses: DashMap<String, Status>,
    store: Arc<dyn OverrideStore>,
}

impl OverrideMap {
    /// Build the map seeded from whatever the backend has saved.
    pub(crate) fn load(store: Arc<dyn OverrideStore>) -> Self {
        let statuses = DashMap::new();
        for (id, status) in store.load() {
            statuses.insert(id, status);
        }
        Self { statuses, store }
    }

    pub(crate) fn get(&self, id: &str) -> Option<Status> {
        self.statuses.get(id).map(|entry| *entry.value())
    }

    /// Record an override in memory only. Callers decide when to
    /// `persist`; push-driven updates deliberately skip the disk write.
    pub(crate) fn set(&self, id: &str, status: Status) {
        self.statuses.insert(id.to_owned(), status);
    }

    /// Saved map overlaid with the in-memory map, in-memory winning on
    /// conflicts. This is the merge source for a server refetch: edits
    /// made this session beat what an older session persisted.
    pub(crate) fn merged_with_saved(&self) -> HashMap<String, Status> {
        let mut merged = self.store.load();
        for entry in self.statuses.iter() {
            merged.insert(entry.key().clone(), *entry.value());
        }
        merged
    }

    /// Copy of the current in-memory map.
    pub(crate) fn snapshot(&self) -> HashMap<String, Status> {
        self.statuses
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    /// Write the in-memory map through to the backend.
    pub(crate) fn persist(&self) {
        if let Err(err) = self.store.save(&self.snapshot()) {
            warn!(error = %err, "failed to persist status overrides");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn get_reflects_in_memory_writes() {
        let map = OverrideMap::load(Arc::new(MemoryOverrideStore::default()));
        assert_eq!(map.get("a"), None);

        map.set("a", Status::Resolved);
        assert_eq!(map.get("a"), Some(Status::Resolved));
    }

    #[test]
    fn load_seeds_from_the_backend() {
        let store = Arc::new(MemoryOverrideStore::default());
        store
            .save(&HashMap::from([("a".to_owned(), Status::Escalated)]))
            .unwrap();

        let map = OverrideMap::load(store);
        assert_eq!(map.get("a"), Some(Status::Escalated));
    }

    #[test]
    fn merged_with_saved_lets_memory_win() {
        let store = Arc::new(MemoryOverrideStore::default());
        store
            .save(&HashMap::from([
                ("a".to_owned(), Status::Open),
                ("b".to_owned(), Status::Resolved),
            ]))
            .unwrap();

        let map = OverrideMap::load(store);
        map.set("a", Status::Escalated);

        let merged = map.merged_with_saved();
        assert_eq!(merged.get("a"), Some(&Status::Escalated));
        assert_eq!(merged.get("b"), Some(&Status::Resolved));
    }

    #[test]
    fn set_does_not_touch_the_backend_until_persist() {
        let store = Arc::new(MemoryOverrideStore::default());
        let map = OverrideMap::load(Arc::clone(&store) as Arc<dyn OverrideStore>);

        map.set("a", Status::Resolved);
        assert!(store.load().is_empty());

        map.persist();
        assert_eq!(store.load().get("a"), Some(&Status::Resolved));
    }
}
