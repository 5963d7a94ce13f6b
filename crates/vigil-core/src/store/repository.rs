// ── Incident repository ──
//
// Reconciles the three sources of truth for incident state: the
// authoritative server snapshot (fetch), the locally persisted status
// overrides, and the live push stream. All mutations funnel through
// here so the effective-status rule stays consistent everywhere.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use vigil_api::ApiClient;

use crate::config::RollbackPolicy;
use crate::convert;
use crate::error::CoreError;
use crate::model::{Incident, Status};
use crate::store::collection::IncidentCollection;
use crate::store::overrides::{OverrideMap, OverrideStore};

/// The last write that failed and can be re-issued verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryAction {
    Fetch,
    StatusUpdate { id: String, status: Status },
}

/// Observable repository state for UI chrome (spinners, error banners,
/// retry buttons). Data itself flows through the snapshot channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoStatus {
    pub loading: bool,
    pub last_error: Option<String>,
    pub pending_retry: Option<RetryAction>,
}

pub struct IncidentRepository {
    api: Arc<ApiClient>,
    collection: IncidentCollection,
    overrides: OverrideMap,
    rollback: RollbackPolicy,
    status: watch::Sender<RepoStatus>,
}

impl IncidentRepository {
    pub fn new(
        api: Arc<ApiClient>,
        override_store: Arc<dyn OverrideStore>,
        rollback: RollbackPolicy,
    ) -> Self {
        let (status, _) = watch::channel(RepoStatus::default());
        Self {
            api,
            collection: IncidentCollection::new(),
            overrides: OverrideMap::load(override_store),
            rollback,
            status,
        }
    }

    // ── Fetch ────────────────────────────────────────────────────────

    /// Fetch the authoritative snapshot and merge it with the local
    /// override layer.
    ///
    /// Overrides win over server-reported statuses; after the merge the
    /// override map holds the effective status for every incident in
    /// the snapshot and is persisted, so a reload reproduces this view
    /// even if the server has not caught up. On failure the existing
    /// collection is left untouched -- a refetch error never blanks an
    /// already-rendered list.
    pub async fn fetch_all(&self) -> Result<(), CoreError> {
        self.status.send_modify(|s| s.loading = true);

        let records = match self.api.list_incidents().await {
            Ok(records) => records,
            Err(err) => {
                let err = CoreError::from(err);
                warn!(error = %err, "incident fetch failed");
                self.status.send_modify(|s| {
                    s.loading = false;
                    s.last_error = Some(err.to_string());
                    s.pending_retry = Some(RetryAction::Fetch);
                });
                return Err(err);
            }
        };

        let mut incidents = convert::incidents_from_records(records);
        let local = self.overrides.merged_with_saved();
        for incident in &mut incidents {
            if let Some(status) = local.get(&incident.id) {
                incident.status = *status;
            }
        }

        info!(count = incidents.len(), "incident snapshot replaced");
        self.collection.replace_all(incidents.clone());

        // Republish the effective status of every incident so the next
        // reload starts from exactly this view.
        for incident in &incidents {
            self.overrides.set(&incident.id, incident.status);
        }
        self.overrides.persist();

        self.status.send_modify(|s| {
            s.loading = false;
            s.last_error = None;
            s.pending_retry = None;
        });
        Ok(())
    }

    // ── Push-driven updates ──────────────────────────────────────────

    /// Apply one incident arriving over the push channel.
    ///
    /// The pushed record is authoritative for its own fields, so its
    /// status also lands in the in-memory override map (a concurrent
    /// refetch must not resurrect the pre-push status). The disk cache
    /// is deliberately not rewritten on every push.
    pub fn upsert(&self, incident: Incident) {
        debug!(id = %incident.id, "applying pushed incident");
        self.overrides.set(&incident.id, incident.status);
        self.collection.upsert(incident);
    }

    // ── Status edits ─────────────────────────────────────────────────

    /// Record a status override locally and persist it immediately.
    pub fn set_status_local(&self, id: &str, status: Status) {
        self.overrides.set(id, status);
        self.overrides.persist();
        self.collection.set_status(id, status);
    }

    /// Tell the server about a status change.
    ///
    /// The optimistic local write has usually already happened via
    /// [`set_status_local`](Self::set_status_local); this confirms it
    /// upstream. On failure the local value stands (the analyst's edit
    /// is not silently discarded) and a retry record is published.
    pub async fn set_status_remote(&self, id: &str, status: Status) -> Result<(), CoreError> {
        match self.api.update_incident_status(id, &status.to_string()).await {
            Ok(confirmed) => {
                // Trust the server's echo if it parses; otherwise keep
                // what we asked for.
                let effective = confirmed
                    .and_then(|record| record.status.parse::<Status>().ok())
                    .unwrap_or(status);
                self.set_status_local(id, effective);
                self.status.send_modify(|s| {
                    s.last_error = None;
                    s.pending_retry = None;
                });
                Ok(())
            }
            Err(err) => {
                let core_err = CoreError::from(err);
                warn!(id, error = %core_err, "status update failed");
                self.status.send_modify(|s| {
                    s.last_error = Some(core_err.to_string());
                    s.pending_retry = Some(RetryAction::StatusUpdate {
                        id: id.to_owned(),
                        status,
                    });
                });
                Err(core_err)
            }
        }
    }

    /// Optimistic status change: apply locally first, then confirm with
    /// the server.
    ///
    /// Under [`RollbackPolicy::RevertOnRejection`], a definitive server
    /// rejection reverts the override to the pre-edit effective status;
    /// transient failures (and the default policy) keep the local edit.
    pub async fn set_status(&self, id: &str, status: Status) -> Result<(), CoreError> {
        let previous = self.effective_status(id);
        self.set_status_local(id, status);

        let result = self.set_status_remote(id, status).await;
        if let Err(err) = &result {
            let definitive = matches!(err, CoreError::Api { status: Some(code), .. }
                if (400..500).contains(code) && !matches!(code, 401 | 408 | 429));
            if self.rollback == RollbackPolicy::RevertOnRejection && definitive {
                if let Some(previous) = previous {
                    info!(id, "reverting rejected status override");
                    self.set_status_local(id, previous);
                }
            }
        }
        result
    }

    // ── Error surface ────────────────────────────────────────────────

    /// Dismiss the current error banner without retrying.
    pub fn clear_error(&self) {
        self.status.send_modify(|s| {
            s.last_error = None;
            s.pending_retry = None;
        });
    }

    /// Re-issue the last failed write, if any.
    pub async fn retry_last_failed(&self) -> Result<(), CoreError> {
        let action = self.status.borrow().pending_retry.clone();
        match action {
            Some(RetryAction::Fetch) => self.fetch_all().await,
            Some(RetryAction::StatusUpdate { id, status }) => {
                self.set_status_remote(&id, status).await
            }
            None => Ok(()),
        }
    }

    // ── Read surface ─────────────────────────────────────────────────

    /// Current incident list in natural order (timestamp descending).
    pub fn snapshot(&self) -> Arc<Vec<Arc<Incident>>> {
        self.collection.snapshot()
    }

    /// Subscribe to incident list changes.
    pub fn subscribe(&self) -> IncidentSubscription {
        IncidentSubscription {
            receiver: self.collection.subscribe(),
        }
    }

    /// Subscribe to loading/error state changes.
    pub fn status_channel(&self) -> watch::Receiver<RepoStatus> {
        self.status.subscribe()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Incident>> {
        self.collection.get(id)
    }

    pub fn len(&self) -> usize {
        self.collection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collection.len() == 0
    }

    /// The effective (override-aware) status of one incident.
    pub fn effective_status(&self, id: &str) -> Option<Status> {
        self.overrides
            .get(id)
            .or_else(|| self.collection.get(id).map(|incident| incident.status))
    }

    /// Copy of the current override map, for the projection engine.
    pub fn overrides_snapshot(&self) -> HashMap<String, Status> {
        self.overrides.snapshot()
    }
}

/// Change notifications for the incident list, vended by
/// [`IncidentRepository::subscribe`].
///
/// Backed by the collection's `watch` channel: intermediate snapshots
/// may be skipped under load, but `changed` always resolves with the
/// most recent one. Fetch, push upserts, and local status edits all
/// publish through the same channel.
pub struct IncidentSubscription {
    receiver: watch::Receiver<Arc<Vec<Arc<Incident>>>>,
}

impl IncidentSubscription {
    /// The most recently published snapshot, without waiting.
    pub fn latest(&self) -> Arc<Vec<Arc<Incident>>> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next snapshot. `None` once the repository is gone.
    pub async fn changed(&mut self) -> Option<Arc<Vec<Arc<Incident>>>> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }
}
