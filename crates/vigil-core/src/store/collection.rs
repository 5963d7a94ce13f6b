// ── Reactive incident collection ──
//
// Normalized storage (unique ids, insertion-ordered) with push-based
// change notification via `watch` channels. The published snapshot is
// the natural display order: timestamp descending, insertion order as
// the stable tie-break.

use std::sync::{Arc, RwLock};

use indexmap::IndexMap;
use tokio::sync::watch;

use crate::model::{Incident, Status};

pub(crate) struct IncidentCollection {
    /// Primary storage: incident id -> incident, in insertion order.
    /// Re-inserting an existing id replaces the value in place and
    /// keeps its original position.
    by_id: RwLock<IndexMap<String, Arc<Incident>>>,

    /// Version counter, bumped on every mutation.
    version: watch::Sender<u64>,

    /// Full snapshot in natural order, rebuilt on mutation.
    snapshot: watch::Sender<Arc<Vec<Arc<Incident>>>>,
}

impl IncidentCollection {
    pub(crate) fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));

        Self {
            by_id: RwLock::new(IndexMap::new()),
            version,
            snapshot,
        }
    }

    /// Insert or update an incident. Returns `true` if the id was new.
    pub(crate) fn upsert(&self, incident: Incident) -> bool {
        let is_new = {
            let mut map = self.by_id.write().unwrap_or_else(std::sync::PoisonError::into_inner);
            map.insert(incident.id.clone(), Arc::new(incident)).is_none()
        };
        self.publish();
        is_new
    }

    /// Replace the entire collection with a fresh server snapshot,
    /// preserving the order of `incidents` as the new insertion order.
    pub(crate) fn replace_all(&self, incidents: Vec<Incident>) {
        {
            let mut map = self.by_id.write().unwrap_or_else(std::sync::PoisonError::into_inner);
            map.clear();
            for incident in incidents {
                map.insert(incident.id.clone(), Arc::new(incident));
            }
        }
        self.publish();
    }

    /// Rewrite the stored status of one incident. Returns `false` if
    /// the id is unknown.
    pub(crate) fn set_status(&self, id: &str, status: Status) -> bool {
        let changed = {
            let mut map = self.by_id.write().unwrap_or_else(std::sync::PoisonError::into_inner);
            match map.get_mut(id) {
                Some(slot) => {
                    if slot.status != status {
                        let mut updated = (**slot).clone();
                        updated.status = status;
                        *slot = Arc::new(updated);
                    }
                    true
                }
                None => false,
            }
        };
        if changed {
            self.publish();
        }
        changed
    }

    pub(crate) fn get(&self, id: &str) -> Option<Arc<Incident>> {
        self.by_id
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(id)
            .map(Arc::clone)
    }

    /// Current snapshot in natural order (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<Incident>>> {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot changes via a `watch::Receiver`.
    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<Incident>>>> {
        self.snapshot.subscribe()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_id
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    #[allow(dead_code)]
    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ── Private helpers ──────────────────────────────────────────────

    /// Rebuild the natural-order snapshot and bump the version.
    fn publish(&self) {
        let mut values: Vec<Arc<Incident>> = {
            let map = self.by_id.read().unwrap_or_else(std::sync::PoisonError::into_inner);
            map.values().map(Arc::clone).collect()
        };
        // Stable sort: equal timestamps keep insertion order.
        values.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
        self.version.send_modify(|v| *v += 1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::Severity;

    fn incident(id: &str, ts: &str) -> Incident {
        Incident {
            id: id.into(),
            severity: Severity::Medium,
            category: "intrusion".into(),
            source: "192.168.1.4".into(),
            timestamp: ts.parse().unwrap(),
            status: Status::Open,
        }
    }

    #[test]
    fn upsert_returns_true_for_new_id() {
        let col = IncidentCollection::new();
        assert!(col.upsert(incident("a", "2026-01-01T00:00:00Z")));
        assert!(!col.upsert(incident("a", "2026-01-02T00:00:00Z")));
        assert_eq!(col.len(), 1);
    }

    #[test]
    fn snapshot_is_timestamp_descending() {
        let col = IncidentCollection::new();
        col.upsert(incident("old", "2026-01-01T00:00:00Z"));
        col.upsert(incident("new", "2026-01-03T00:00:00Z"));
        col.upsert(incident("mid", "2026-01-02T00:00:00Z"));

        let snapshot = col.snapshot();
        let ids: Vec<&str> = snapshot.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["new", "mid", "old"]);
    }

    #[test]
    fn equal_timestamps_keep_insertion_order() {
        let col = IncidentCollection::new();
        col.upsert(incident("first", "2026-01-01T00:00:00Z"));
        col.upsert(incident("second", "2026-01-01T00:00:00Z"));
        col.upsert(incident("third", "2026-01-01T00:00:00Z"));

        let snapshot = col.snapshot();
        let ids: Vec<&str> = snapshot.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["first", "second", "third"]);
    }

    #[test]
    fn replace_all_swaps_the_contents_wholesale() {
        let col = IncidentCollection::new();
        col.upsert(incident("stale", "2026-01-01T00:00:00Z"));

        col.replace_all(vec![
            incident("a", "2026-02-01T00:00:00Z"),
            incident("b", "2026-02-02T00:00:00Z"),
        ]);

        assert!(col.get("stale").is_none());
        assert_eq!(col.len(), 2);
    }

    #[test]
    fn set_status_rewrites_in_place() {
        let col = IncidentCollection::new();
        col.upsert(incident("a", "2026-01-01T00:00:00Z"));

        assert!(col.set_status("a", Status::Resolved));
        assert_eq!(col.get("a").unwrap().status, Status::Resolved);
        assert!(!col.set_status("ghost", Status::Resolved));
    }

    #[test]
    fn subscribers_see_mutations() {
        let col = IncidentCollection::new();
        let rx = col.subscribe();
        assert!(rx.borrow().is_empty());

        col.upsert(incident("a", "2026-01-01T00:00:00Z"));
        assert_eq!(rx.borrow().len(), 1);
    }
}
