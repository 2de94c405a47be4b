use serde::{Deserialize, Serialize};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

use crate::errors::ProviderFailure;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Ioda,
    Ooni,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockStatus {
    Blocked,
    NotBlocked,
    Unknown,
}

impl BlockStatus {
    pub fn from_raw(raw: Option<&Value>) -> Self {
        match raw {
            Some(Value::Bool(true)) => BlockStatus::Blocked,
            Some(Value::Bool(false)) => BlockStatus::NotBlocked,
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => BlockStatus::Blocked,
                "false" => BlockStatus::NotBlocked,
                _ => BlockStatus::Unknown,
            },
            _ => BlockStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub source: Source,
    pub subject: String,
    pub country: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub status: BlockStatus,
    pub kind: Option<String>,
}

impl Observation {
    pub fn region_placeholder(source: Source, region: &str) -> Self {
        Self {
            source,
            subject: region.to_string(),
            country: Some(region.to_string()),
            timestamp: None,
            status: BlockStatus::Unknown,
            kind: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub link: String,
    pub published: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsSection {
    pub name: String,
    pub fallback_cause: Option<String>,
    pub items: Vec<NewsItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbeSample {
    pub rtt: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeTrace {
    pub probe_id: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub samples: Vec<ProbeSample>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeMetric {
    pub probe_id: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub avg_rtt: Option<f64>,
    pub min_rtt: Option<f64>,
    pub max_rtt: Option<f64>,
    pub loss_rate: f64,
    pub packets_sent: usize,
    pub packets_received: usize,
}

#[derive(Debug)]
pub enum FetchOutcome<T> {
    Fetched(T),
    Fallback(T, ProviderFailure),
}

impl<T> FetchOutcome<T> {
    pub fn data(&self) -> &T {
        match self {
            FetchOutcome::Fetched(data) => data,
            FetchOutcome::Fallback(data, _) => data,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, FetchOutcome::Fallback(..))
    }

    pub fn into_parts(self) -> (T, Option<ProviderFailure>) {
        match self {
            FetchOutcome::Fetched(data) => (data, None),
            FetchOutcome::Fallback(data, cause) => (data, Some(cause)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderDataset {
    pub source: Source,
    pub label: String,
    pub fallback_cause: Option<String>,
    pub observations: Vec<Observation>,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct DashboardState {
    pub datasets: Vec<ProviderDataset>,
    pub news: Vec<NewsSection>,
    pub probe_metrics: Vec<ProbeMetric>,
    pub last_refresh: Option<DateTime<Utc>>,
}

pub fn normalize_country(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.len() == 2 && trimmed.bytes().all(|b| b.is_ascii_alphabetic()) {
        Some(trimmed.to_ascii_uppercase())
    } else {
        None
    }
}

pub fn parse_instant(raw: &Value) -> Option<DateTime<Utc>> {
    match raw {
        Value::String(s) => parse_instant_str(s),
        Value::Number(n) => n.as_i64().and_then(|secs| DateTime::from_timestamp(secs, 0)),
        _ => None,
    }
}

pub fn parse_instant_str(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    // Providers disagree on precision: IODA truncates to minutes, OONI uses a
    // space separator and no offset.
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(naive.and_utc());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_mapping_covers_raw_variants() {
        assert_eq!(BlockStatus::from_raw(Some(&json!(true))), BlockStatus::Blocked);
        assert_eq!(BlockStatus::from_raw(Some(&json!(false))), BlockStatus::NotBlocked);
        assert_eq!(BlockStatus::from_raw(Some(&json!("true"))), BlockStatus::Blocked);
        assert_eq!(BlockStatus::from_raw(Some(&json!("false"))), BlockStatus::NotBlocked);
        assert_eq!(BlockStatus::from_raw(Some(&json!("tcp_ip"))), BlockStatus::Unknown);
        assert_eq!(BlockStatus::from_raw(None), BlockStatus::Unknown);
    }

    #[test]
    fn country_codes_normalize_to_upper_alpha2() {
        assert_eq!(normalize_country("ir"), Some("IR".to_string()));
        assert_eq!(normalize_country(" RU "), Some("RU".to_string()));
        assert_eq!(normalize_country("Iran"), None);
        assert_eq!(normalize_country("I1"), None);
        assert_eq!(normalize_country(""), None);
    }

    #[test]
    fn instants_parse_across_provider_formats() {
        assert!(parse_instant_str("2025-06-28T14:12").is_some());
        assert!(parse_instant_str("2025-06-27 12:00:00").is_some());
        assert!(parse_instant_str("2025-06-27T12:00:00Z").is_some());
        assert!(parse_instant_str("2025-06-27T12:00:00+02:00").is_some());
        assert!(parse_instant_str("not a date").is_none());
        assert!(parse_instant(&json!(1751025600)).is_some());
        assert!(parse_instant(&json!(null)).is_none());
    }

    #[test]
    fn placeholder_rows_carry_only_the_region() {
        let row = Observation::region_placeholder(Source::Ooni, "IR");
        assert_eq!(row.country.as_deref(), Some("IR"));
        assert_eq!(row.subject, "IR");
        assert_eq!(row.status, BlockStatus::Unknown);
        assert!(row.timestamp.is_none());
        assert!(row.kind.is_none());
    }
}
