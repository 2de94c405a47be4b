use anyhow::Result;
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::atlas::AtlasClient;
use crate::config::AppConfig;
use crate::errors::MetricsError;
use crate::metrics;
use crate::models::{
    normalize_country, DashboardState, FetchOutcome, NewsSection, Observation, ProbeMetric,
    ProviderDataset, Source,
};
use crate::providers::{self, IodaProvider, ObservationProvider, OoniProvider, ProviderClient};
use crate::regions;

pub struct Engine {
    config: AppConfig,
    client: ProviderClient,
    atlas: AtlasClient,
    providers: Vec<Arc<dyn ObservationProvider>>,
    allow_list: Vec<String>,
    pub state: Arc<Mutex<DashboardState>>,
}

impl Engine {
    pub fn new(config: AppConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.provider_timeout_secs);
        let client = ProviderClient::new(timeout)?;
        let atlas = AtlasClient::new(&config.atlas, timeout)?;

        let mut providers: Vec<Arc<dyn ObservationProvider>> =
            vec![Arc::new(IodaProvider::new(&config.outages))];
        for domain in &config.measurements.domains {
            providers.push(Arc::new(OoniProvider::new(&config.measurements, domain.clone())));
        }

        let allow_list: Vec<String> = config
            .monitored_regions
            .iter()
            .filter_map(|region| normalize_country(region))
            .collect();

        Ok(Self {
            config,
            client,
            atlas,
            providers,
            allow_list,
            state: Arc::new(Mutex::new(DashboardState::default())),
        })
    }

    pub async fn run(self: Arc<Self>) -> Result<()> {
        info!(
            "Telemetry engine active: {} providers, {} news feeds, {} monitored regions",
            self.providers.len(),
            self.config.news_feeds.len(),
            self.allow_list.len()
        );

        let mut measurement_id = self.config.atlas.measurement_id;
        if self.config.atlas.create_oneoff {
            if let Some(id) = self.launch_ping_measurement().await {
                measurement_id = Some(id);
            }
        }

        loop {
            let started = Utc::now();
            self.refresh_cycle(measurement_id).await;
            let took = Utc::now() - started;
            info!(
                "Refresh cycle completed in {:.2}s",
                took.num_milliseconds() as f64 / 1000.0
            );
            tokio::time::sleep(Duration::from_secs(self.config.refresh_interval)).await;
        }
    }

    // Cycles are strictly serialized: the next one only starts after this one
    // has published its state.
    async fn refresh_cycle(&self, measurement_id: Option<u64>) {
        let mut tasks = FuturesUnordered::new();
        for provider in &self.providers {
            let client = self.client.clone();
            let provider = Arc::clone(provider);
            tasks.push(tokio::spawn(async move {
                let outcome = providers::fetch_observations(&client, provider.as_ref()).await;
                (provider.source(), provider.label(), outcome)
            }));
        }

        let mut datasets = Vec::with_capacity(self.providers.len());
        while let Some(join_res) = tasks.next().await {
            if let Ok((source, label, outcome)) = join_res {
                datasets.push(self.build_dataset(source, label, outcome));
            }
        }
        datasets.sort_by(|a, b| a.label.cmp(&b.label));

        let news = self.refresh_news().await;
        let probe_metrics = match measurement_id {
            Some(id) => self.collect_probe_metrics(id).await,
            None => None,
        };

        let mut state = self.state.lock().await;
        state.datasets = datasets;
        state.news = news;
        if let Some(metrics) = probe_metrics {
            state.probe_metrics = metrics;
        }
        state.last_refresh = Some(Utc::now());
    }

    fn build_dataset(
        &self,
        source: Source,
        label: String,
        outcome: FetchOutcome<Vec<Observation>>,
    ) -> ProviderDataset {
        let (rows, failure) = outcome.into_parts();
        let fallback_cause = failure.map(|cause| {
            warn!("{} unavailable, serving canned data: {}", label, cause);
            cause.to_string()
        });

        let filtered = regions::filter_by_region(rows, &self.allow_list);
        let observations = if self.config.complete_regions {
            regions::complete_regions(&self.allow_list, &filtered, source)
        } else {
            filtered
        };

        ProviderDataset {
            source,
            label,
            fallback_cause,
            observations,
        }
    }

    async fn refresh_news(&self) -> Vec<NewsSection> {
        let mut tasks = FuturesUnordered::new();
        for feed in &self.config.news_feeds {
            let client = self.client.clone();
            let feed = feed.clone();
            tasks.push(tokio::spawn(async move {
                let outcome = providers::fetch_news(&client, &feed).await;
                (feed.name, outcome)
            }));
        }

        let mut sections = Vec::with_capacity(self.config.news_feeds.len());
        while let Some(join_res) = tasks.next().await {
            if let Ok((name, outcome)) = join_res {
                let (items, failure) = outcome.into_parts();
                let fallback_cause = failure.map(|cause| {
                    warn!("News feed '{}' unavailable: {}", name, cause);
                    cause.to_string()
                });
                sections.push(NewsSection {
                    name,
                    fallback_cause,
                    items,
                });
            }
        }
        // Task completion order is arbitrary; present feeds in config order.
        sections.sort_by_key(|section| {
            self.config
                .news_feeds
                .iter()
                .position(|feed| feed.name == section.name)
        });
        sections
    }

    async fn collect_probe_metrics(&self, measurement_id: u64) -> Option<Vec<ProbeMetric>> {
        let batch = match self.atlas.fetch_results(measurement_id).await {
            Ok(batch) => batch,
            Err(failure) => {
                warn!(
                    "Result retrieval for measurement {} failed: {}",
                    measurement_id, failure
                );
                return None;
            }
        };

        if batch.is_empty() {
            // Metrics have no canned substitute; an empty batch empties the file.
            warn!(
                "Measurement {} yielded no usable results ({})",
                measurement_id,
                MetricsError::EmptyTraceBatch
            );
        }

        let mut metrics = batch.summaries;
        match metrics::derive_batch(&batch.traces) {
            Ok(derived) => metrics.extend(derived),
            Err(MetricsError::EmptyTraceBatch) => {}
            Err(err) => warn!("Probe metric derivation failed: {}", err),
        }

        let path = Path::new(&self.config.metrics_path);
        if let Err(err) = metrics::write_metrics(path, &metrics) {
            error!("Failed to write {}: {}", self.config.metrics_path, err);
        }
        Some(metrics)
    }

    pub async fn launch_ping_measurement(&self) -> Option<u64> {
        let Some(api_key) = self.config.atlas.api_key.as_deref() else {
            warn!("Cannot create a one-off ping measurement without an Atlas API key");
            return None;
        };
        match self
            .atlas
            .create_ping_measurement(
                api_key,
                &self.config.atlas.ping,
                self.config.atlas.bill_to.as_deref(),
            )
            .await
        {
            Ok(id) => {
                info!("Created one-off ping measurement {}", id);
                Some(id)
            }
            Err(failure) => {
                warn!("One-off ping measurement creation failed: {}", failure);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FetchError;
    use crate::fallback;

    fn engine() -> Engine {
        let config: AppConfig = serde_json::from_str("{}").expect("defaults parse");
        Engine::new(config).expect("engine builds")
    }

    #[test]
    fn fallback_datasets_still_cover_every_monitored_region() {
        let engine = engine();
        let dataset = engine.build_dataset(
            Source::Ooni,
            "OONI telegram.org".into(),
            FetchOutcome::Fallback(
                fallback::measurement_fallback("telegram.org"),
                FetchError::Timeout.into(),
            ),
        );

        assert_eq!(dataset.fallback_cause.as_deref(), Some("request timed out"));
        assert!(dataset.observations.len() >= engine.allow_list.len());
        for region in &engine.allow_list {
            assert!(dataset
                .observations
                .iter()
                .any(|obs| obs.country.as_deref() == Some(region.as_str())));
        }
    }

    #[test]
    fn live_rows_outside_the_allow_list_are_dropped() {
        let engine = engine();
        let rows = vec![
            Observation {
                country: Some("US".into()),
                ..Observation::region_placeholder(Source::Ooni, "US")
            },
            Observation::region_placeholder(Source::Ooni, "IR"),
        ];
        let dataset =
            engine.build_dataset(Source::Ooni, "OONI bbc.com".into(), FetchOutcome::Fetched(rows));

        assert!(dataset.fallback_cause.is_none());
        assert!(dataset
            .observations
            .iter()
            .all(|obs| obs.country.as_deref() != Some("US")));
        assert_eq!(dataset.observations.len(), engine.allow_list.len());
    }
}
