use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_secs: u64,
    #[serde(default = "default_monitored_regions")]
    pub monitored_regions: Vec<String>,
    #[serde(default = "default_true")]
    pub complete_regions: bool,
    #[serde(default)]
    pub outages: OutageFeedConfig,
    #[serde(default)]
    pub measurements: MeasurementConfig,
    #[serde(default = "default_news_feeds")]
    pub news_feeds: Vec<NewsFeedConfig>,
    #[serde(default)]
    pub atlas: AtlasConfig,
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,
}

fn default_refresh_interval() -> u64 { 300 }
fn default_api_port() -> u16 { 3000 }
fn default_provider_timeout() -> u64 { 10 }
fn default_true() -> bool { true }
fn default_metrics_path() -> String { "data/probe_latency.csv".into() }

fn default_monitored_regions() -> Vec<String> {
    ["IR", "RU", "CN", "IN"].iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OutageFeedConfig {
    #[serde(default = "default_outage_url")]
    pub url: String,
    #[serde(default = "default_outage_limit")]
    pub limit: usize,
}

fn default_outage_url() -> String {
    "https://ioda.inetintel.cc.gatech.edu/api/v1/signals".into()
}
fn default_outage_limit() -> usize { 10 }

impl Default for OutageFeedConfig {
    fn default() -> Self {
        Self {
            url: default_outage_url(),
            limit: default_outage_limit(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MeasurementConfig {
    #[serde(default = "default_measurement_url")]
    pub url: String,
    #[serde(default = "default_domains")]
    pub domains: Vec<String>,
    #[serde(default = "default_measurement_limit")]
    pub limit: usize,
}

fn default_measurement_url() -> String {
    "https://api.ooni.io/api/v1/measurements".into()
}
fn default_measurement_limit() -> usize { 20 }

fn default_domains() -> Vec<String> {
    ["telegram.org", "bbc.com", "wikipedia.org", "youtube.com", "nytimes.com"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            url: default_measurement_url(),
            domains: default_domains(),
            limit: default_measurement_limit(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NewsFeedConfig {
    pub name: String,
    pub url: String,
}

fn default_news_feeds() -> Vec<NewsFeedConfig> {
    vec![
        NewsFeedConfig {
            name: "EFF (Digital Rights)".into(),
            url: "https://www.eff.org/rss/updates.xml".into(),
        },
        NewsFeedConfig {
            name: "Access Now (Censorship News)".into(),
            url: "https://www.accessnow.org/feed/".into(),
        },
    ]
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AtlasConfig {
    #[serde(default = "default_atlas_url")]
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub measurement_id: Option<u64>,
    #[serde(default)]
    pub create_oneoff: bool,
    #[serde(default)]
    pub bill_to: Option<String>,
    #[serde(default)]
    pub ping: PingConfig,
}

fn default_atlas_url() -> String { "https://atlas.ripe.net/api/v2".into() }

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            url: default_atlas_url(),
            api_key: None,
            measurement_id: None,
            create_oneoff: false,
            bill_to: None,
            ping: PingConfig::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PingConfig {
    #[serde(default = "default_ping_target")]
    pub target: String,
    #[serde(default = "default_ping_packets")]
    pub packets: u32,
    #[serde(default = "default_ping_size")]
    pub size: u32,
    #[serde(default = "default_probe_country")]
    pub probe_country: String,
    #[serde(default = "default_probe_count")]
    pub probe_count: u32,
}

fn default_ping_target() -> String { "1.1.1.1".into() }
fn default_ping_packets() -> u32 { 3 }
fn default_ping_size() -> u32 { 48 }
fn default_probe_country() -> String { "IR".into() }
fn default_probe_count() -> u32 { 81 }

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            target: default_ping_target(),
            packets: default_ping_packets(),
            size: default_ping_size(),
            probe_country: default_probe_country(),
            probe_count: default_probe_count(),
        }
    }
}
