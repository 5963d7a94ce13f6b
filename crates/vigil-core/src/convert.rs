// ── API-to-domain type conversions ──
//
// Bridges raw `vigil_api` payload types into canonical `vigil_core::model`
// domain types. Parsing is lenient per-record: a record whose required
// fields fail to parse is dropped (and logged), never an error for the
// whole batch.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use tracing::debug;

use vigil_api::IncidentRecord;

use crate::model::{Incident, Severity, Status};

/// Parse an ISO-8601 timestamp string from the wire.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Convert a wire record into a domain `Incident`.
///
/// Returns `None` (and logs at debug) when the severity, status, or
/// timestamp cannot be parsed into their strong types. Category and
/// source default to empty strings when absent.
pub fn incident_from_record(record: IncidentRecord) -> Option<Incident> {
    let severity = match Severity::from_str(&record.severity) {
        Ok(severity) => severity,
        Err(_) => {
            debug!(id = %record.id, severity = %record.severity, "dropping incident with unknown severity");
            return None;
        }
    };
    let status = match Status::from_str(&record.status) {
        Ok(status) => status,
        Err(_) => {
            debug!(id = %record.id, status = %record.status, "dropping incident with unknown status");
            return None;
        }
    };
    let Some(timestamp) = parse_timestamp(&record.timestamp) else {
        debug!(id = %record.id, timestamp = %record.timestamp, "dropping incident with unparseable timestamp");
        return None;
    };

    Some(Incident {
        id: record.id,
        severity,
        category: record.category,
        source: record.source,
        timestamp,
        status,
    })
}

/// Convert a batch of wire records, dropping unparseable ones individually.
pub fn incidents_from_records(records: Vec<IncidentRecord>) -> Vec<Incident> {
    records.into_iter().filter_map(incident_from_record).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn record(id: &str) -> IncidentRecord {
        IncidentRecord {
            id: id.into(),
            severity: "HIGH".into(),
            category: "malware".into(),
            source: "10.0.0.9".into(),
            timestamp: "2026-02-01T08:30:00Z".into(),
            status: "OPEN".into(),
        }
    }

    #[test]
    fn well_formed_record_converts() {
        let incident = incident_from_record(record("inc-1")).unwrap();
        assert_eq!(incident.id, "inc-1");
        assert_eq!(incident.severity, Severity::High);
        assert_eq!(incident.status, Status::Open);
        assert_eq!(incident.timestamp.to_rfc3339(), "2026-02-01T08:30:00+00:00");
    }

    #[test]
    fn lowercase_enum_values_are_accepted() {
        let mut rec = record("inc-2");
        rec.severity = "critical".into();
        rec.status = "resolved".into();
        let incident = incident_from_record(rec).unwrap();
        assert_eq!(incident.severity, Severity::Critical);
        assert_eq!(incident.status, Status::Resolved);
    }

    #[test]
    fn unknown_severity_drops_the_record() {
        let mut rec = record("inc-3");
        rec.severity = "APOCALYPTIC".into();
        assert!(incident_from_record(rec).is_none());
    }

    #[test]
    fn bad_timestamp_drops_the_record() {
        let mut rec = record("inc-4");
        rec.timestamp = "yesterday".into();
        assert!(incident_from_record(rec).is_none());
    }

    #[test]
    fn batch_conversion_drops_only_the_bad_records() {
        let mut bad = record("inc-bad");
        bad.status = "UNKNOWN".into();
        let incidents = incidents_from_records(vec![record("a"), bad, record("b")]);
        assert_eq!(incidents.len(), 2);
        assert_eq!(incidents[0].id, "a");
        assert_eq!(incidents[1].id, "b");
    }
}
