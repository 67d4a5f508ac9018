use std::fmt;

use tracing::info;

use crate::error::{HarvestError, Result};
use crate::source::Querier;

const BUCKET_SUFFIX: &str = "_bucket";
const COUNTER_SUFFIXES: [&str; 2] = ["_count", "_sum"];

/// How a raw metric name is treated downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Counter,
    Gauge,
    HistogramBucket,
}

impl MetricKind {
    /// The exposition `# TYPE` keyword.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::HistogramBucket => "histogram",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a metric by its name suffix alone.
pub fn classify(name: &str) -> MetricKind {
    if name.ends_with(BUCKET_SUFFIX) {
        MetricKind::HistogramBucket
    } else if COUNTER_SUFFIXES.iter().any(|s| name.ends_with(s)) {
        MetricKind::Counter
    } else {
        MetricKind::Gauge
    }
}

/// Metric names under one prefix, split by kind. Source order is preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    pub histograms: Vec<String>,
    pub counters: Vec<String>,
    pub gauges: Vec<String>,
}

impl Catalog {
    /// Keep the names starting with `prefix` and sort them into kinds.
    pub fn from_names<I, S>(names: I, prefix: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut catalog = Self::default();
        for name in names.into_iter().map(Into::into) {
            if !name.starts_with(prefix) {
                continue;
            }
            match classify(&name) {
                MetricKind::HistogramBucket => catalog.histograms.push(name),
                MetricKind::Counter => catalog.counters.push(name),
                MetricKind::Gauge => catalog.gauges.push(name),
            }
        }
        catalog
    }

    pub fn is_empty(&self) -> bool {
        self.histograms.is_empty() && self.counters.is_empty() && self.gauges.is_empty()
    }
}

/// List every name the source knows and classify those under `prefix`.
pub async fn discover(querier: &dyn Querier, prefix: &str) -> Result<Catalog> {
    let names = querier.metric_names().await.map_err(|e| match e {
        HarvestError::SourceUnavailable(_) => e,
        other => HarvestError::SourceUnavailable(other.to_string()),
    })?;

    let catalog = Catalog::from_names(names, prefix);
    info!(
        prefix,
        histograms = catalog.histograms.len(),
        counters = catalog.counters.len(),
        gauges = catalog.gauges.len(),
        "discovered metrics"
    );
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_suffix() {
        assert_eq!(classify("latency_bucket"), MetricKind::HistogramBucket);
        assert_eq!(classify("latency_count"), MetricKind::Counter);
        assert_eq!(classify("latency_sum"), MetricKind::Counter);
        assert_eq!(classify("frontend_service_pending"), MetricKind::Gauge);
        // Suffix must be at the very end.
        assert_eq!(classify("bucket_count_total"), MetricKind::Gauge);
        assert_eq!(classify("_bucket_sum"), MetricKind::Counter);
    }

    #[test]
    fn classification_is_stable() {
        for name in ["a_bucket", "b_count", "c_sum", "d", ""] {
            assert_eq!(classify(name), classify(name));
        }
    }

    #[test]
    fn filters_by_prefix_and_keeps_order() {
        let catalog = Catalog::from_names(
            [
                "temporal_cloud_v0_latency_bucket",
                "other_latency_bucket",
                "temporal_cloud_v0_poll_success_count",
                "temporal_cloud_v0_state_transition_sum",
                "temporal_cloud_v0_resource_exhausted",
                "temporal_cloud_v0_a_count",
            ],
            "temporal_cloud_v0",
        );

        assert_eq!(catalog.histograms, vec!["temporal_cloud_v0_latency_bucket"]);
        assert_eq!(
            catalog.counters,
            vec![
                "temporal_cloud_v0_poll_success_count",
                "temporal_cloud_v0_state_transition_sum",
                "temporal_cloud_v0_a_count",
            ]
        );
        assert_eq!(catalog.gauges, vec!["temporal_cloud_v0_resource_exhausted"]);
    }

    #[test]
    fn nothing_matches_gives_empty_catalog() {
        let catalog = Catalog::from_names(["x_bucket", "y_count"], "temporal_");
        assert!(catalog.is_empty());
    }
}
