use serde_json::{json, Value};
use std::time::Duration;

use crate::config::{AtlasConfig, PingConfig};
use crate::errors::{FetchError, NormalizeError, ProviderFailure};
use crate::models::{parse_instant, ProbeMetric, ProbeSample, ProbeTrace};

#[derive(Debug, Default)]
pub struct ResultBatch {
    pub traces: Vec<ProbeTrace>,
    pub summaries: Vec<ProbeMetric>,
}

impl ResultBatch {
    pub fn is_empty(&self) -> bool {
        self.traces.is_empty() && self.summaries.is_empty()
    }
}

pub struct AtlasClient {
    http: reqwest::Client,
    base_url: String,
}

impl AtlasClient {
    pub fn new(config: &AtlasConfig, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn create_ping_measurement(
        &self,
        api_key: &str,
        ping: &PingConfig,
        bill_to: Option<&str>,
    ) -> Result<u64, ProviderFailure> {
        let mut body = json!({
            "definitions": [{
                "type": "ping",
                "af": 4,
                "resolve_on_probe": true,
                "description": format!("Ping measurement to {}", ping.target),
                "packets": ping.packets,
                "size": ping.size,
                "target": ping.target,
            }],
            "probes": [{
                "type": "country",
                "value": ping.probe_country,
                "requested": ping.probe_count,
            }],
            "is_oneoff": true,
        });
        if let Some(account) = bill_to {
            body["bill_to"] = json!(account);
        }

        let response = self
            .http
            .post(format!("{}/measurements/", self.base_url))
            .header("Authorization", format!("Key {api_key}"))
            .json(&body)
            .send()
            .await
            .map_err(FetchError::from)?;
        if response.status() != reqwest::StatusCode::CREATED {
            return Err(FetchError::HttpStatus(response.status()).into());
        }

        let payload: Value = response.json().await.map_err(FetchError::from)?;
        Ok(extract_measurement_id(&payload)?)
    }

    pub async fn fetch_results(&self, measurement_id: u64) -> Result<ResultBatch, ProviderFailure> {
        let url = format!("{}/measurements/{}/results/", self.base_url, measurement_id);
        let raw: Value = self
            .http
            .get(url)
            .send()
            .await
            .map_err(FetchError::from)?
            .error_for_status()
            .map_err(FetchError::from)?
            .json()
            .await
            .map_err(FetchError::from)?;
        Ok(parse_results(&raw)?)
    }
}

fn extract_measurement_id(payload: &Value) -> Result<u64, NormalizeError> {
    payload
        .get("measurements")
        .and_then(Value::as_array)
        .and_then(|ids| ids.first())
        .and_then(Value::as_u64)
        .ok_or(NormalizeError::MissingField("measurements"))
}

pub fn parse_results(raw: &Value) -> Result<ResultBatch, NormalizeError> {
    let entries = raw.as_array().ok_or(NormalizeError::TypeMismatch {
        field: "response",
        expected: "array",
    })?;

    let mut batch = ResultBatch::default();
    for entry in entries {
        let probe_id = match entry.get("prb_id") {
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::String(s)) => s.clone(),
            _ => continue,
        };
        let timestamp = entry.get("timestamp").and_then(parse_instant);

        if let Some(samples) = entry.get("result").and_then(Value::as_array) {
            // Per-packet entries carry {"rtt": ms} on success and {"x": "*"}
            // (or an error object) on loss.
            batch.traces.push(ProbeTrace {
                probe_id,
                timestamp,
                samples: samples
                    .iter()
                    .map(|sample| ProbeSample {
                        rtt: sample.get("rtt").and_then(Value::as_f64),
                    })
                    .collect(),
            });
        } else if entry.get("avg").and_then(Value::as_f64).is_some() {
            let sent = entry.get("sent").and_then(Value::as_u64).unwrap_or(0) as usize;
            let received = entry.get("rcvd").and_then(Value::as_u64).unwrap_or(0) as usize;
            batch.summaries.push(ProbeMetric::from_summary(
                probe_id,
                timestamp,
                positive_ms(entry.get("avg")),
                positive_ms(entry.get("min")),
                positive_ms(entry.get("max")),
                sent,
                received,
            ));
        }
    }
    Ok(batch)
}

// RIPE reports -1 on latency summaries when no reply came back.
fn positive_ms(raw: Option<&Value>) -> Option<f64> {
    raw.and_then(Value::as_f64).filter(|v| *v >= 0.0)
}
