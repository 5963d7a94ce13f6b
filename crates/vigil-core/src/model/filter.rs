// ── Filter criteria and URL query round-trip ──
//
// View state, not business state. A shared link must reproduce the
// same view, so the criteria encode into a query string and parse
// back losslessly: empty list -> absent key, `all` range -> absent
// key, no sort -> both sort keys absent.

use std::str::FromStr;
use std::time::Duration;

use url::form_urlencoded;

use super::incident::{Severity, Status};

/// Sort key selectable by the user. `None` at the criteria level means
/// natural collection order (timestamp-descending).
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "camelCase", ascii_case_insensitive)]
pub enum SortKey {
    Timestamp,
    Severity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Relative time window bounding `incident.timestamp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display, strum::EnumString)]
pub enum TimeRange {
    #[default]
    #[strum(serialize = "all")]
    All,
    #[strum(serialize = "24h")]
    Last24h,
    #[strum(serialize = "7d")]
    Last7d,
    #[strum(serialize = "30d")]
    Last30d,
}

impl TimeRange {
    /// The window length, or `None` for no bound.
    pub fn window(self) -> Option<Duration> {
        const HOUR: u64 = 3600;
        match self {
            Self::All => None,
            Self::Last24h => Some(Duration::from_secs(24 * HOUR)),
            Self::Last7d => Some(Duration::from_secs(7 * 24 * HOUR)),
            Self::Last30d => Some(Duration::from_secs(30 * 24 * HOUR)),
        }
    }
}

/// The complete filter/sort state for the incident view.
///
/// List fields are sets in spirit; order within them is not
/// significant for filtering but is preserved through the URL
/// round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterCriteria {
    pub severities: Vec<Severity>,
    pub statuses: Vec<Status>,
    pub categories: Vec<String>,
    /// Case-insensitive substring matched against `incident.source`.
    pub search_ip: String,
    pub sort_by: Option<SortKey>,
    /// Only meaningful when `sort_by` is set; parsing a query without
    /// `sortBy` always yields the default order.
    pub sort_order: SortOrder,
    pub time_range: TimeRange,
}

impl FilterCriteria {
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    /// Encode into a URL query string. Default/empty fields produce no
    /// key at all, so a default criteria encodes to the empty string.
    pub fn to_query(&self) -> String {
        let mut ser = form_urlencoded::Serializer::new(String::new());

        if !self.severities.is_empty() {
            ser.append_pair("severity", &join(self.severities.iter()));
        }
        if !self.statuses.is_empty() {
            ser.append_pair("status", &join(self.statuses.iter()));
        }
        if !self.categories.is_empty() {
            ser.append_pair("category", &self.categories.join(","));
        }
        if !self.search_ip.is_empty() {
            ser.append_pair("searchIp", &self.search_ip);
        }
        if let Some(key) = self.sort_by {
            ser.append_pair("sortBy", &key.to_string());
            ser.append_pair("sortOrder", &self.sort_order.to_string());
        }
        if self.time_range != TimeRange::All {
            ser.append_pair("timeRange", &self.time_range.to_string());
        }

        ser.finish()
    }

    /// Parse from a URL query string (with or without a leading `?`).
    ///
    /// Unknown keys and unparseable list elements are dropped rather
    /// than failing the whole parse, so a stale or hand-edited link
    /// still produces a usable view.
    pub fn from_query(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut criteria = Self::default();

        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "severity" => criteria.severities = split(&value),
                "status" => criteria.statuses = split(&value),
                "category" => {
                    criteria.categories = value
                        .split(',')
                        .filter(|s| !s.is_empty())
                        .map(str::to_owned)
                        .collect();
                }
                "searchIp" => criteria.search_ip = value.into_owned(),
                "sortBy" => criteria.sort_by = SortKey::from_str(&value).ok(),
                "sortOrder" => {
                    criteria.sort_order = SortOrder::from_str(&value).unwrap_or_default();
                }
                "timeRange" => {
                    criteria.time_range = TimeRange::from_str(&value).unwrap_or_default();
                }
                _ => {}
            }
        }

        // Sort order without a sort key is meaningless; normalize it so
        // the round-trip contract holds.
        if criteria.sort_by.is_none() {
            criteria.sort_order = SortOrder::default();
        }

        criteria
    }
}

fn join<T: ToString>(items: impl Iterator<Item = T>) -> String {
    items
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn split<T: FromStr>(value: &str) -> Vec<T> {
    value
        .split(',')
        .filter(|s| !s.is_empty())
        .filter_map(|s| T::from_str(s).ok())
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> FilterCriteria {
        FilterCriteria {
            severities: vec![Severity::Critical, Severity::High],
            statuses: vec![Status::Open],
            categories: vec!["malware".into(), "phishing".into()],
            search_ip: "10.0.".into(),
            sort_by: Some(SortKey::Severity),
            sort_order: SortOrder::Asc,
            time_range: TimeRange::Last7d,
        }
    }

    #[test]
    fn default_criteria_encodes_to_empty_query() {
        assert_eq!(FilterCriteria::default().to_query(), "");
        assert!(FilterCriteria::from_query("").is_default());
    }

    #[test]
    fn full_criteria_round_trips() {
        let criteria = sample();
        let query = criteria.to_query();
        assert_eq!(FilterCriteria::from_query(&query), criteria);
    }

    #[test]
    fn round_trip_with_leading_question_mark() {
        let criteria = sample();
        let query = format!("?{}", criteria.to_query());
        assert_eq!(FilterCriteria::from_query(&query), criteria);
    }

    #[test]
    fn empty_fields_produce_no_keys() {
        let criteria = FilterCriteria {
            severities: vec![Severity::Low],
            ..FilterCriteria::default()
        };
        let query = criteria.to_query();
        assert_eq!(query, "severity=LOW");
        assert!(!query.contains("sortBy"));
        assert!(!query.contains("timeRange"));
    }

    #[test]
    fn unknown_keys_and_bad_tokens_are_dropped() {
        let criteria =
            FilterCriteria::from_query("severity=CRITICAL,BOGUS&page=3&status=OPEN,,RESOLVED");
        assert_eq!(criteria.severities, vec![Severity::Critical]);
        assert_eq!(criteria.statuses, vec![Status::Open, Status::Resolved]);
    }

    #[test]
    fn sort_order_without_sort_key_normalizes_to_default() {
        let criteria = FilterCriteria::from_query("sortOrder=asc");
        assert_eq!(criteria.sort_by, None);
        assert_eq!(criteria.sort_order, SortOrder::Desc);
    }

    #[test]
    fn search_text_with_reserved_characters_round_trips() {
        let criteria = FilterCriteria {
            search_ip: "fe80::1 &co".into(),
            ..FilterCriteria::default()
        };
        let query = criteria.to_query();
        assert_eq!(FilterCriteria::from_query(&query), criteria);
    }

    #[test]
    fn time_range_windows() {
        assert_eq!(TimeRange::All.window(), None);
        assert_eq!(
            TimeRange::Last24h.window(),
            Some(Duration::from_secs(86_400))
        );
        assert_eq!(
            TimeRange::Last30d.window(),
            Some(Duration::from_secs(30 * 86_400))
        );
    }
}
