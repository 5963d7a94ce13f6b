//! Client-side incident state synchronization core.
//!
//! This crate reconciles three independent sources of truth for the
//! same incident records -- the authoritative server snapshot, a
//! locally persisted status-override layer, and a live push stream --
//! into one consistent, filterable view, and keeps that view alive
//! across token rotation and transient connectivity loss:
//!
//! - **[`SessionManager`]** -- Central facade managing the full
//!   lifecycle: [`login()`](SessionManager::login) authenticates,
//!   fetches the initial snapshot, then arms the push channel and
//!   background refresh. Token rotation and session expiry flow back
//!   in through `vigil_api::SessionHooks`.
//!
//! - **[`IncidentRepository`]** -- Normalized reactive storage. Merges
//!   server fetches with the persisted [`OverrideStore`] layer
//!   (overrides win) and applies pushed incidents as they arrive.
//!
//! - **[`IncidentSubscription`]** -- Change-notification handle vended
//!   by the repository. `changed()` resolves once per published
//!   snapshot, for reactive rendering.
//!
//! - **Projection engine** ([`project`]) -- Pure functions from
//!   (snapshot, [`FilterCriteria`], override map) to the ordered list
//!   the UI renders, plus dashboard aggregates.
//!
//! - **Domain model** ([`model`]) -- Canonical types ([`Incident`],
//!   [`Severity`], [`Status`]) with URL-round-trippable filter state.

pub mod config;
pub mod convert;
pub mod error;
pub mod model;
pub mod project;
pub mod session;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{ClientConfig, RollbackPolicy, TlsVerification};
pub use error::CoreError;
pub use project::{
    TrendPoint, counts_by_severity, counts_by_status, effective_status, project, weekly_trend,
};
pub use session::{MemoryTokenStore, SessionManager, SessionState, TokenStore};
pub use store::{
    IncidentRepository, IncidentSubscription, MemoryOverrideStore, OverrideStore, RepoStatus,
    RetryAction,
};

// Re-export model types at the crate root for ergonomics.
pub use model::{FilterCriteria, Incident, Severity, SortKey, SortOrder, Status, TimeRange};
