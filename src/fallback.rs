use crate::models::{parse_instant_str, BlockStatus, NewsItem, Observation, Source};

pub fn outage_fallback() -> Vec<Observation> {
    vec![
        canned_outage("Iran", "IR", "2025-06-28T14:12", "Internet blackout"),
        canned_outage("Russia", "RU", "2025-06-27T22:10", "BGP drop"),
        canned_outage("India", "IN", "2025-06-27T18:00", "Darknet loss"),
    ]
}

fn canned_outage(subject: &str, country: &str, at: &str, kind: &str) -> Observation {
    Observation {
        source: Source::Ioda,
        subject: subject.to_string(),
        country: Some(country.to_string()),
        timestamp: parse_instant_str(at),
        status: BlockStatus::Unknown,
        kind: Some(kind.to_string()),
    }
}

pub fn measurement_fallback(domain: &str) -> Vec<Observation> {
    vec![
        canned_measurement(domain, "IR", "2025-06-27T12:00", BlockStatus::Blocked),
        canned_measurement(domain, "RU", "2025-06-27T11:00", BlockStatus::NotBlocked),
    ]
}

fn canned_measurement(domain: &str, country: &str, at: &str, status: BlockStatus) -> Observation {
    Observation {
        source: Source::Ooni,
        subject: domain.to_string(),
        country: Some(country.to_string()),
        timestamp: parse_instant_str(at),
        status,
        kind: None,
    }
}

pub fn news_fallback() -> Vec<NewsItem> {
    vec![NewsItem {
        title: "News feed unavailable".to_string(),
        link: "#".to_string(),
        published: None,
    }]
}
