// ── Incident domain model ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a security incident, ordered from least to most urgent.
///
/// The derived `Ord` follows declaration order, so `Critical` compares
/// greatest. Wire and display form is the uppercase name.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Numeric rank used for severity sorting (`Critical` = 4 down to `Low` = 1).
    pub fn rank(self) -> u8 {
        match self {
            Self::Critical => 4,
            Self::High => 3,
            Self::Medium => 2,
            Self::Low => 1,
        }
    }
}

/// Workflow status of an incident.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Status {
    Open,
    Escalated,
    Resolved,
}

/// A single security incident as held in the local store.
///
/// `status` is the server-known status at the time the incident was
/// fetched or pushed; the effective (possibly locally overridden)
/// status lives in the repository's override map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub severity: Severity,
    pub category: String,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub status: Status,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn severity_rank_ordering_matches_ord() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert_eq!(Severity::Critical.rank(), 4);
        assert_eq!(Severity::Low.rank(), 1);
    }

    #[test]
    fn severity_parses_uppercase_wire_form() {
        assert_eq!(Severity::from_str("CRITICAL").unwrap(), Severity::Critical);
        assert_eq!(Severity::from_str("low").unwrap(), Severity::Low);
        assert!(Severity::from_str("catastrophic").is_err());
    }

    #[test]
    fn status_round_trips_display_and_parse() {
        for status in [Status::Open, Status::Escalated, Status::Resolved] {
            assert_eq!(Status::from_str(&status.to_string()).unwrap(), status);
        }
    }

    #[test]
    fn incident_serde_uses_uppercase_enums() {
        let incident = Incident {
            id: "inc-1".into(),
            severity: Severity::High,
            category: "malware".into(),
            source: "10.0.0.5".into(),
            timestamp: "2026-01-10T12:00:00Z".parse().unwrap(),
            status: Status::Open,
        };
        let json = serde_json::to_value(&incident).unwrap();
        assert_eq!(json["severity"], "HIGH");
        assert_eq!(json["status"], "OPEN");
    }
}
