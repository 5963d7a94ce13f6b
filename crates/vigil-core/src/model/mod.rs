// ── Domain model ──

mod filter;
mod incident;

pub use filter::{FilterCriteria, SortKey, SortOrder, TimeRange};
pub use incident::{Incident, Severity, Status};
