// ── Filter/Sort/View engine ──
//
// Pure projection from (incident snapshot, filter criteria, override
// map) to the ordered list the UI renders, plus the aggregate counts
// the dashboard widgets show. No hidden clock: callers inject `now`
// so the time-window filter is deterministic and testable.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Days, NaiveDate, Utc};
use strum::IntoEnumIterator;

use crate::model::{FilterCriteria, Incident, Severity, SortKey, SortOrder, Status};

/// The override-aware status of an incident.
pub fn effective_status(incident: &Incident, overrides: &HashMap<String, Status>) -> Status {
    overrides
        .get(&incident.id)
        .copied()
        .unwrap_or(incident.status)
}

/// Project the incident snapshot through the filter criteria.
///
/// Filters apply in sequence (severity, effective status, category,
/// source substring, time window), then the sort. Without an explicit
/// sort key the snapshot's natural order (timestamp descending) is
/// preserved; with one, ties keep their snapshot order (stable sort).
pub fn project(
    incidents: &[Arc<Incident>],
    filters: &FilterCriteria,
    overrides: &HashMap<String, Status>,
    now: DateTime<Utc>,
) -> Vec<Arc<Incident>> {
    let search = filters.search_ip.to_lowercase();
    let cutoff = filters
        .time_range
        .window()
        .and_then(|window| chrono::Duration::from_std(window).ok())
        .map(|window| now - window);

    let mut projected: Vec<Arc<Incident>> = incidents
        .iter()
        .filter(|incident| {
            filters.severities.is_empty() || filters.severities.contains(&incident.severity)
        })
        .filter(|incident| {
            filters.statuses.is_empty()
                || filters
                    .statuses
                    .contains(&effective_status(incident, overrides))
        })
        .filter(|incident| {
            filters.categories.is_empty() || filters.categories.contains(&incident.category)
        })
        .filter(|incident| search.is_empty() || incident.source.to_lowercase().contains(&search))
        .filter(|incident| cutoff.is_none_or(|cutoff| incident.timestamp >= cutoff))
        .map(Arc::clone)
        .collect();

    if let Some(key) = filters.sort_by {
        projected.sort_by(|a, b| {
            let ordering = match key {
                SortKey::Timestamp => a.timestamp.cmp(&b.timestamp),
                SortKey::Severity => a.severity.rank().cmp(&b.severity.rank()),
            };
            match filters.sort_order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });
    }

    projected
}

// ── Aggregates ───────────────────────────────────────────────────────
//
// Recomputed from the snapshot on every call, never cached.

/// Incident count per severity. Every severity appears as a key, zero
/// or not, so chart axes stay stable.
pub fn counts_by_severity(incidents: &[Arc<Incident>]) -> HashMap<Severity, usize> {
    let mut counts: HashMap<Severity, usize> =
        Severity::iter().map(|severity| (severity, 0)).collect();
    for incident in incidents {
        if let Some(count) = counts.get_mut(&incident.severity) {
            *count += 1;
        }
    }
    counts
}

/// Incident count per effective (override-aware) status.
pub fn counts_by_status(
    incidents: &[Arc<Incident>],
    overrides: &HashMap<String, Status>,
) -> HashMap<Status, usize> {
    let mut counts: HashMap<Status, usize> = Status::iter().map(|status| (status, 0)).collect();
    for incident in incidents {
        if let Some(count) = counts.get_mut(&effective_status(incident, overrides)) {
            *count += 1;
        }
    }
    counts
}

/// One day of the weekly trend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrendPoint {
    pub day: NaiveDate,
    pub count: usize,
}

/// Daily incident counts for a seven-day window (UTC calendar days),
/// oldest first, anchored so the final day is the day of the newest
/// incident (or `now` for an empty snapshot). Days without incidents
/// appear with a zero count.
pub fn weekly_trend(incidents: &[Arc<Incident>], now: DateTime<Utc>) -> Vec<TrendPoint> {
    let anchor = incidents
        .iter()
        .map(|incident| incident.timestamp)
        .max()
        .unwrap_or(now)
        .date_naive();

    let mut per_day: HashMap<NaiveDate, usize> = HashMap::new();
    for incident in incidents {
        *per_day.entry(incident.timestamp.date_naive()).or_default() += 1;
    }

    (0..7)
        .rev()
        .filter_map(|offset| anchor.checked_sub_days(Days::new(offset)))
        .map(|day| TrendPoint {
            day,
            count: per_day.get(&day).copied().unwrap_or(0),
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::TimeRange;
    use pretty_assertions::assert_eq;

    fn incident(id: &str, severity: Severity, status: Status, ts: &str, source: &str) -> Arc<Incident> {
        Arc::new(Incident {
            id: id.into(),
            severity,
            category: "intrusion".into(),
            source: source.into(),
            timestamp: ts.parse().unwrap(),
            status,
        })
    }

    fn now() -> DateTime<Utc> {
        "2026-03-10T12:00:00Z".parse().unwrap()
    }

    fn ids(list: &[Arc<Incident>]) -> Vec<&str> {
        list.iter().map(|i| i.id.as_str()).collect()
    }

    fn fixture() -> Vec<Arc<Incident>> {
        // Natural (timestamp-descending) order, as vended by the store.
        vec![
            incident("c", Severity::Low, Status::Resolved, "2026-03-10T09:00:00Z", "10.0.0.3"),
            incident("b", Severity::Critical, Status::Open, "2026-03-09T09:00:00Z", "10.0.0.2"),
            incident("a", Severity::High, Status::Open, "2026-02-01T09:00:00Z", "192.168.7.1"),
        ]
    }

    #[test]
    fn default_filters_return_everything_in_natural_order() {
        let list = fixture();
        let projected = project(&list, &FilterCriteria::default(), &HashMap::new(), now());
        assert_eq!(ids(&projected), ["c", "b", "a"]);
    }

    #[test]
    fn status_filter_uses_the_effective_status() {
        let list = fixture();
        let overrides = HashMap::from([("b".to_owned(), Status::Resolved)]);
        let filters = FilterCriteria {
            statuses: vec![Status::Resolved],
            ..FilterCriteria::default()
        };
        let projected = project(&list, &filters, &overrides, now());
        assert_eq!(ids(&projected), ["c", "b"]);
    }

    #[test]
    fn source_search_is_case_insensitive_substring() {
        let list = vec![incident(
            "x",
            Severity::Medium,
            Status::Open,
            "2026-03-10T00:00:00Z",
            "FW-Edge-01",
        )];
        let filters = FilterCriteria {
            search_ip: "fw-edge".into(),
            ..FilterCriteria::default()
        };
        assert_eq!(project(&list, &filters, &HashMap::new(), now()).len(), 1);
    }

    #[test]
    fn time_window_drops_older_incidents() {
        let list = fixture();
        let filters = FilterCriteria {
            time_range: TimeRange::Last7d,
            ..FilterCriteria::default()
        };
        let projected = project(&list, &filters, &HashMap::new(), now());
        assert_eq!(ids(&projected), ["c", "b"]);
    }

    #[test]
    fn severity_sort_descending_is_stable() {
        let list = vec![
            incident("first", Severity::High, Status::Open, "2026-03-03T00:00:00Z", "s"),
            incident("crit", Severity::Critical, Status::Open, "2026-03-02T00:00:00Z", "s"),
            incident("second", Severity::High, Status::Open, "2026-03-01T00:00:00Z", "s"),
        ];
        let filters = FilterCriteria {
            sort_by: Some(SortKey::Severity),
            sort_order: SortOrder::Desc,
            ..FilterCriteria::default()
        };
        let projected = project(&list, &filters, &HashMap::new(), now());
        assert_eq!(ids(&projected), ["crit", "first", "second"]);
    }

    #[test]
    fn timestamp_sort_ascending_reverses_natural_order() {
        let list = fixture();
        let filters = FilterCriteria {
            sort_by: Some(SortKey::Timestamp),
            sort_order: SortOrder::Asc,
            ..FilterCriteria::default()
        };
        let projected = project(&list, &filters, &HashMap::new(), now());
        assert_eq!(ids(&projected), ["a", "b", "c"]);
    }

    #[test]
    fn open_status_filter_picks_the_critical_example() {
        let list = vec![
            incident("1", Severity::Critical, Status::Open, "2024-01-01T00:00:00Z", "s"),
            incident("2", Severity::Low, Status::Resolved, "2024-01-02T00:00:00Z", "s"),
        ];
        let filters = FilterCriteria {
            statuses: vec![Status::Open],
            ..FilterCriteria::default()
        };
        let projected = project(&list, &filters, &HashMap::new(), now());
        assert_eq!(ids(&projected), ["1"]);
    }

    #[test]
    fn severity_counts_include_zero_buckets() {
        let counts = counts_by_severity(&fixture());
        assert_eq!(counts[&Severity::Critical], 1);
        assert_eq!(counts[&Severity::High], 1);
        assert_eq!(counts[&Severity::Medium], 0);
        assert_eq!(counts[&Severity::Low], 1);
    }

    #[test]
    fn status_counts_respect_overrides() {
        let overrides = HashMap::from([("a".to_owned(), Status::Escalated)]);
        let counts = counts_by_status(&fixture(), &overrides);
        assert_eq!(counts[&Status::Open], 1);
        assert_eq!(counts[&Status::Escalated], 1);
        assert_eq!(counts[&Status::Resolved], 1);
    }

    #[test]
    fn weekly_trend_anchors_on_the_newest_incident() {
        let trend = weekly_trend(&fixture(), now());
        assert_eq!(trend.len(), 7);
        assert_eq!(trend[6].day, "2026-03-10".parse().unwrap());
        assert_eq!(trend[6].count, 1);
        assert_eq!(trend[5].count, 1); // 2026-03-09
        assert_eq!(trend[4].count, 0);
    }

    #[test]
    fn weekly_trend_of_empty_snapshot_anchors_on_now() {
        let trend = weekly_trend(&[], now());
        assert_eq!(trend.len(), 7);
        assert_eq!(trend[6].day, "2026-03-10".parse().unwrap());
        assert!(trend.iter().all(|point| point.count == 0));
    }
}
