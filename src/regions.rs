use crate::models::{Observation, Source};

pub fn filter_by_region(observations: Vec<Observation>, allow: &[String]) -> Vec<Observation> {
    observations
        .into_iter()
        .filter(|obs| {
            obs.country
                .as_deref()
                .map_or(false, |cc| allow.iter().any(|region| region == cc))
        })
        .collect()
}

/// Left join of the allow-list against an already filtered observation set.
/// Output follows allow-list order; regions with no data get one placeholder row.
pub fn complete_regions(
    allow: &[String],
    observations: &[Observation],
    source: Source,
) -> Vec<Observation> {
    let mut rows = Vec::with_capacity(allow.len().max(observations.len()));
    for region in allow {
        let mut matched = observations
            .iter()
            .filter(|obs| obs.country.as_deref() == Some(region.as_str()))
            .peekable();
        if matched.peek().is_some() {
            rows.extend(matched.cloned());
        } else {
            rows.push(Observation::region_placeholder(source, region));
        }
    }
    rows
}
