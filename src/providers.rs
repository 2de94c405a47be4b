use serde_json::Value;
use std::time::Duration;

use crate::config::{MeasurementConfig, NewsFeedConfig, OutageFeedConfig};
use crate::errors::{FetchError, NormalizeError};
use crate::fallback;
use crate::models::{
    normalize_country, parse_instant, BlockStatus, FetchOutcome, NewsItem, Observation, Source,
};

const NEWS_ENTRY_CAP: usize = 5;

#[derive(Clone)]
pub struct ProviderClient {
    http: reqwest::Client,
}

impl ProviderClient {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }

    pub async fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        let response = self.http.get(url).send().await?.error_for_status()?;
        Ok(response.json::<Value>().await?)
    }

    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.http.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

pub trait ObservationProvider: Send + Sync {
    fn source(&self) -> Source;
    fn label(&self) -> String;
    fn request_url(&self) -> String;
    fn normalize(&self, raw: &Value) -> Result<Vec<Observation>, NormalizeError>;
    fn fallback(&self) -> Vec<Observation>;
}

pub struct IodaProvider {
    url: String,
    limit: usize,
}

impl IodaProvider {
    pub fn new(config: &OutageFeedConfig) -> Self {
        Self {
            url: config.url.clone(),
            limit: config.limit,
        }
    }
}

impl ObservationProvider for IodaProvider {
    fn source(&self) -> Source {
        Source::Ioda
    }

    fn label(&self) -> String {
        "IODA outage signals".into()
    }

    fn request_url(&self) -> String {
        self.url.clone()
    }

    fn normalize(&self, raw: &Value) -> Result<Vec<Observation>, NormalizeError> {
        let signals = raw.as_array().ok_or(NormalizeError::TypeMismatch {
            field: "response",
            expected: "array",
        })?;
        if signals.is_empty() {
            return Err(NormalizeError::MissingField("signals"));
        }

        let rows = signals
            .iter()
            .take(self.limit)
            .map(|item| {
                let location = item.get("location").and_then(Value::as_str);
                Observation {
                    source: Source::Ioda,
                    subject: location.unwrap_or("unknown").to_string(),
                    country: location.and_then(normalize_country),
                    timestamp: item.get("start_time").and_then(parse_instant),
                    // Outage signals report reachability loss, not a blocking verdict.
                    status: BlockStatus::Unknown,
                    kind: item.get("signal_type").and_then(Value::as_str).map(str::to_string),
                }
            })
            .collect();
        Ok(rows)
    }

    fn fallback(&self) -> Vec<Observation> {
        fallback::outage_fallback()
    }
}

pub struct OoniProvider {
    url: String,
    domain: String,
    limit: usize,
}

impl OoniProvider {
    pub fn new(config: &MeasurementConfig, domain: String) -> Self {
        Self {
            url: config.url.clone(),
            domain,
            limit: config.limit,
        }
    }
}

impl ObservationProvider for OoniProvider {
    fn source(&self) -> Source {
        Source::Ooni
    }

    fn label(&self) -> String {
        format!("OONI {}", self.domain)
    }

    fn request_url(&self) -> String {
        format!("{}?domain={}&limit={}", self.url, self.domain, self.limit)
    }

    fn normalize(&self, raw: &Value) -> Result<Vec<Observation>, NormalizeError> {
        let envelope = raw.as_object().ok_or(NormalizeError::TypeMismatch {
            field: "response",
            expected: "object",
        })?;
        let results = envelope
            .get("results")
            .ok_or(NormalizeError::MissingField("results"))?
            .as_array()
            .ok_or(NormalizeError::TypeMismatch {
                field: "results",
                expected: "array",
            })?;
        if results.is_empty() {
            return Err(NormalizeError::MissingField("results"));
        }

        let rows = results
            .iter()
            .map(|entry| Observation {
                source: Source::Ooni,
                subject: self.domain.clone(),
                country: entry
                    .get("probe_cc")
                    .and_then(Value::as_str)
                    .and_then(normalize_country),
                timestamp: entry.get("measurement_start_time").and_then(parse_instant),
                status: BlockStatus::from_raw(entry.get("blocking")),
                kind: None,
            })
            .collect();
        Ok(rows)
    }

    fn fallback(&self) -> Vec<Observation> {
        fallback::measurement_fallback(&self.domain)
    }
}

pub fn resolve_payload(
    provider: &dyn ObservationProvider,
    payload: Result<Value, FetchError>,
) -> FetchOutcome<Vec<Observation>> {
    let raw = match payload {
        Ok(raw) => raw,
        Err(err) => return FetchOutcome::Fallback(provider.fallback(), err.into()),
    };
    match provider.normalize(&raw) {
        Ok(rows) => FetchOutcome::Fetched(rows),
        Err(err) => FetchOutcome::Fallback(provider.fallback(), err.into()),
    }
}

pub async fn fetch_observations(
    client: &ProviderClient,
    provider: &dyn ObservationProvider,
) -> FetchOutcome<Vec<Observation>> {
    let payload = client.get_json(&provider.request_url()).await;
    resolve_payload(provider, payload)
}

pub fn normalize_feed(body: &[u8]) -> Result<Vec<NewsItem>, NormalizeError> {
    let feed = feed_rs::parser::parse(body).map_err(|_| NormalizeError::TypeMismatch {
        field: "feed",
        expected: "RSS or Atom document",
    })?;

    let items: Vec<NewsItem> = feed
        .entries
        .into_iter()
        .take(NEWS_ENTRY_CAP)
        .map(|entry| {
            let link = entry
                .links
                .first()
                .map(|l| l.href.clone())
                .unwrap_or_else(|| "#".into());
            NewsItem {
                title: entry
                    .title
                    .map(|t| t.content)
                    .unwrap_or_else(|| "(untitled)".into()),
                link,
                published: entry.published,
            }
        })
        .collect();

    if items.is_empty() {
        return Err(NormalizeError::MissingField("entries"));
    }
    Ok(items)
}

pub async fn fetch_news(client: &ProviderClient, feed: &NewsFeedConfig) -> FetchOutcome<Vec<NewsItem>> {
    let body = match client.get_bytes(&feed.url).await {
        Ok(body) => body,
        Err(err) => return FetchOutcome::Fallback(fallback::news_fallback(), err.into()),
    };
    match normalize_feed(&body) {
        Ok(items) => FetchOutcome::Fetched(items),
        Err(err) => FetchOutcome::Fallback(fallback::news_fallback(), err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MeasurementConfig, OutageFeedConfig};
    use serde_json::json;

    fn ioda() -> IodaProvider {
        IodaProvider::new(&OutageFeedConfig::default())
    }

    fn ooni(domain: &str) -> OoniProvider {
        OoniProvider::new(&MeasurementConfig::default(), domain.to_string())
    }

    #[test]
    fn ioda_normalize_maps_signal_fields() {
        let raw = json!([
            {"location": "IR", "start_time": "2025-06-28T14:12", "signal_type": "bgp"},
            {"location": "Moscow region", "start_time": 1751025600, "signal_type": "darknet"},
            {"start_time": "garbage"}
        ]);
        let rows = ioda().normalize(&raw).expect("valid payload");
        assert_eq!(rows.len(), 3);

        assert_eq!(rows[0].source, Source::Ioda);
        assert_eq!(rows[0].subject, "IR");
        assert_eq!(rows[0].country.as_deref(), Some("IR"));
        assert!(rows[0].timestamp.is_some());
        assert_eq!(rows[0].kind.as_deref(), Some("bgp"));
        assert_eq!(rows[0].status, BlockStatus::Unknown);

        // Free-form locations survive as subject but never as a country code.
        assert_eq!(rows[1].subject, "Moscow region");
        assert!(rows[1].country.is_none());
        assert!(rows[1].timestamp.is_some());

        assert_eq!(rows[2].subject, "unknown");
        assert!(rows[2].timestamp.is_none());
        assert!(rows[2].kind.is_none());
    }

    #[test]
    fn ioda_caps_rows_at_configured_limit() {
        let signals: Vec<_> = (0..25).map(|i| json!({"location": format!("loc-{i}")})).collect();
        let rows = ioda().normalize(&Value::Array(signals)).expect("valid payload");
        assert_eq!(rows.len(), 10);
    }

    #[test]
    fn ioda_rejects_broken_envelopes() {
        assert_eq!(
            ioda().normalize(&json!({"signals": []})),
            Err(NormalizeError::TypeMismatch { field: "response", expected: "array" })
        );
        assert_eq!(
            ioda().normalize(&json!([])),
            Err(NormalizeError::MissingField("signals"))
        );
    }

    #[test]
    fn ooni_normalize_maps_measurement_fields() {
        let raw = json!({"results": [
            {"probe_cc": "ir", "measurement_start_time": "2025-06-27 12:00:00", "blocking": "tcp_ip"},
            {"probe_cc": "RU", "measurement_start_time": "2025-06-27 11:00:00", "blocking": false},
            {"blocking": true}
        ]});
        let rows = ooni("telegram.org").normalize(&raw).expect("valid payload");
        assert_eq!(rows.len(), 3);

        assert_eq!(rows[0].subject, "telegram.org");
        assert_eq!(rows[0].country.as_deref(), Some("IR"));
        assert_eq!(rows[0].status, BlockStatus::Unknown);
        assert_eq!(rows[1].status, BlockStatus::NotBlocked);
        assert_eq!(rows[2].status, BlockStatus::Blocked);
        assert!(rows[2].country.is_none());
        assert!(rows[2].timestamp.is_none());
    }

    #[test]
    fn ooni_rejects_broken_envelopes() {
        assert_eq!(
            ooni("bbc.com").normalize(&json!([])),
            Err(NormalizeError::TypeMismatch { field: "response", expected: "object" })
        );
        assert_eq!(
            ooni("bbc.com").normalize(&json!({})),
            Err(NormalizeError::MissingField("results"))
        );
        assert_eq!(
            ooni("bbc.com").normalize(&json!({"results": 7})),
            Err(NormalizeError::TypeMismatch { field: "results", expected: "array" })
        );
        assert_eq!(
            ooni("bbc.com").normalize(&json!({"results": []})),
            Err(NormalizeError::MissingField("results"))
        );
    }

    #[test]
    fn failed_fetch_resolves_to_canned_data() {
        let provider = ooni("telegram.org");
        let outcome = resolve_payload(&provider, Err(FetchError::Timeout));
        assert!(outcome.is_fallback());
        let (rows, cause) = outcome.into_parts();
        assert!(!rows.is_empty());
        assert!(rows.iter().all(|o| o.source == Source::Ooni));
        assert!(rows.iter().all(|o| o.subject == "telegram.org"));
        assert_eq!(cause.expect("cause recorded").to_string(), "request timed out");
    }

    #[test]
    fn malformed_payload_resolves_to_canned_data() {
        let provider = ioda();
        let outcome = resolve_payload(&provider, Ok(json!("nonsense")));
        assert!(outcome.is_fallback());
        assert!(!outcome.data().is_empty());
        assert!(outcome.data().iter().all(|o| o.source == Source::Ioda));
    }

    #[test]
    fn feeds_trim_to_first_five_entries() {
        let mut body = String::from(
            "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>updates</title>",
        );
        for i in 0..8 {
            body.push_str(&format!(
                "<item><title>story {i}</title><link>https://example.org/{i}</link>\
                 <pubDate>Fri, 27 Jun 2025 12:00:0{i} GMT</pubDate></item>"
            ));
        }
        body.push_str("</channel></rss>");

        let items = normalize_feed(body.as_bytes()).expect("valid feed");
        assert_eq!(items.len(), 5);
        assert_eq!(items[0].title, "story 0");
        assert_eq!(items[0].link, "https://example.org/0");
        assert!(items[0].published.is_some());
    }

    #[test]
    fn empty_or_unparseable_feeds_are_errors() {
        let empty = "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>t</title></channel></rss>";
        assert_eq!(
            normalize_feed(empty.as_bytes()),
            Err(NormalizeError::MissingField("entries"))
        );
        assert!(matches!(
            normalize_feed(b"this is not xml"),
            Err(NormalizeError::TypeMismatch { .. })
        ));
    }
}
