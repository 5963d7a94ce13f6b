// ── Reactive incident storage ──

pub(crate) mod collection;
mod overrides;
mod repository;

pub use overrides::{MemoryOverrideStore, OverrideStore};
pub use repository::{IncidentRepository, IncidentSubscription, RepoStatus, RetryAction};
