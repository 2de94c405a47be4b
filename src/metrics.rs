use chrono::{DateTime, Utc};
use std::path::Path;

use crate::errors::MetricsError;
use crate::models::{ProbeMetric, ProbeTrace};

impl ProbeMetric {
    pub fn from_summary(
        probe_id: String,
        timestamp: Option<DateTime<Utc>>,
        avg_rtt: Option<f64>,
        min_rtt: Option<f64>,
        max_rtt: Option<f64>,
        packets_sent: usize,
        packets_received: usize,
    ) -> Self {
        let loss_rate = if packets_sent == 0 {
            100.0
        } else {
            let lost = packets_sent.saturating_sub(packets_received);
            (lost as f64 / packets_sent as f64 * 100.0).clamp(0.0, 100.0)
        };
        Self {
            probe_id,
            timestamp,
            avg_rtt,
            min_rtt,
            max_rtt,
            loss_rate,
            packets_sent,
            packets_received,
        }
    }
}

pub fn derive(trace: &ProbeTrace) -> ProbeMetric {
    let total = trace.samples.len();
    let received: Vec<f64> = trace.samples.iter().filter_map(|s| s.rtt).collect();
    let lost = total - received.len();

    // An empty trace counts as total loss, never as a division by zero.
    let loss_rate = if total == 0 {
        100.0
    } else {
        lost as f64 / total as f64 * 100.0
    };

    // No received sample means "no data", which must stay distinguishable
    // from a genuine zero-latency reading.
    let avg_rtt = if received.is_empty() {
        None
    } else {
        Some(received.iter().sum::<f64>() / received.len() as f64)
    };

    ProbeMetric {
        probe_id: trace.probe_id.clone(),
        timestamp: trace.timestamp,
        avg_rtt,
        min_rtt: received.iter().copied().reduce(f64::min),
        max_rtt: received.iter().copied().reduce(f64::max),
        loss_rate,
        packets_sent: total,
        packets_received: received.len(),
    }
}

pub fn derive_batch(traces: &[ProbeTrace]) -> Result<Vec<ProbeMetric>, MetricsError> {
    if traces.is_empty() {
        return Err(MetricsError::EmptyTraceBatch);
    }
    Ok(traces.iter().map(derive).collect())
}

const METRIC_COLUMNS: [&str; 7] = [
    "probe_id",
    "timestamp",
    "avg_latency",
    "min_latency",
    "max_latency",
    "packets_sent",
    "packets_received",
];

pub fn write_metrics(path: &Path, metrics: &[ProbeMetric]) -> Result<(), MetricsError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut ordered: Vec<&ProbeMetric> = metrics.iter().collect();
    // Stable sort, absent timestamps first: reruns over the same input stay
    // byte-identical.
    ordered.sort_by_key(|m| m.timestamp);

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(METRIC_COLUMNS)?;
    for metric in ordered {
        writer.write_record([
            metric.probe_id.clone(),
            metric
                .timestamp
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default(),
            metric.avg_rtt.map(|v| v.to_string()).unwrap_or_default(),
            metric.min_rtt.map(|v| v.to_string()).unwrap_or_default(),
            metric.max_rtt.map(|v| v.to_string()).unwrap_or_default(),
            metric.packets_sent.to_string(),
            metric.packets_received.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
