//! Scraping and inspection of the coordinator's own `/metrics` endpoint.

use std::collections::HashMap;
use std::error::Error;

/// A single scrape of the coordinator's Prometheus text output, indexed by
/// `metric_name{sorted,label=values}` for simple point lookups in
/// assertions.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    samples: HashMap<String, f64>,
}

impl MetricsSnapshot {
    /// Parse a Prometheus text-format body into flat samples, skipping
    /// `#`-prefixed HELP/TYPE lines.
    pub fn parse(body: &str) -> Self {
        let mut samples = HashMap::new();
        for line in body.lines() {
            if line.starts_with('#') || line.trim().is_empty() {
                continue;
            }
            if let Some((key, value)) = line.rsplit_once(' ') {
                if let Ok(value) = value.parse::<f64>() {
                    samples.insert(key.to_string(), value);
                }
            }
        }
        Self { samples }
    }

    /// Look up `metric_name{label="value",...}` exactly as it would appear
    /// in the text exposition (labels must be given in the same order
    /// prometheus's `TextEncoder` emits them: alphabetical).
    pub fn get(&self, key: &str) -> Option<f64> {
        self.samples.get(key).copied()
    }
}

pub struct MetricsCollector {
    client: reqwest::Client,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Scrape the coordinator's `/metrics` endpoint.
    pub async fn scrape(&self, url: &str) -> Result<MetricsSnapshot, Box<dyn Error>> {
        let body = self.client.get(url).send().await?.text().await?;
        Ok(MetricsSnapshot::parse(&body))
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
