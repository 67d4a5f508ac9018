use std::fmt;
use std::time::Duration;

use crate::catalog::Catalog;
use crate::config::MetricQuery;
use crate::error::{HarvestError, Result};

/// Labels kept when aggregating histogram buckets into quantiles.
pub const DEFAULT_GROUPING: &[&str] = &["temporal_namespace", "operation", "le"];

/// Grouping used by generated scrape configs.
const SCRAPE_GROUPING: &str = "le, operation, temporal_namespace";

/// Share of the poll interval added to every query window so that
/// consecutive windows overlap instead of leaving gaps.
const WINDOW_OVERLAP: f64 = 1.2;

/// End of every window is aligned down to this boundary first.
const MINUTE_SECS: i64 = 60;

// ─── Quantile ────────────────────────────────────────────────────

/// A quantile in `(0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Quantile(f64);

impl Quantile {
    pub fn new(q: f64) -> Result<Self> {
        if q > 0.0 && q <= 1.0 {
            Ok(Self(q))
        } else {
            Err(HarvestError::Config(format!("quantile {q} is outside (0, 1]")))
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// `0.95` → `_P95`, `0.5` → `_P50`, `0.05` → `_P05`.
    pub fn suffix(self) -> String {
        format!("_P{:02}", (self.0 * 100.0).round() as u32)
    }
}

impl fmt::Display for Quantile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl std::str::FromStr for Quantile {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self> {
        let q: f64 = s
            .trim()
            .parse()
            .map_err(|e| HarvestError::Config(format!("invalid quantile {s:?}: {e}")))?;
        Self::new(q)
    }
}

// ─── Query specs ─────────────────────────────────────────────────

/// Intake kind of the series a spec produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeriesKind {
    Gauge,
    /// Per-interval rate; the query itself already converted the counter.
    Count,
}

/// One derived query and the name its results are published under.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub query: String,
    pub output_name: String,
    pub kind: SeriesKind,
}

impl QuerySpec {
    pub fn quantile(bucket_name: &str, quantile: Quantile, grouping: &str) -> Self {
        Self {
            query: format!(
                "histogram_quantile({quantile}, \
                 sum(rate({bucket_name}[1m])) by ({grouping}))"
            ),
            output_name: format!(
                "{}{}",
                strip(bucket_name, "_bucket"),
                quantile.suffix()
            ),
            kind: SeriesKind::Gauge,
        }
    }

    pub fn rate(counter_name: &str) -> Self {
        Self {
            query: format!("rate({counter_name}[1m])"),
            output_name: format!("{}_rate1m", strip(counter_name, "_count")),
            kind: SeriesKind::Count,
        }
    }
}

fn strip<'a>(name: &'a str, suffix: &str) -> &'a str {
    name.strip_suffix(suffix).unwrap_or(name)
}

/// Builds the derived queries for a catalog.
#[derive(Debug, Clone)]
pub struct Planner {
    quantiles: Vec<Quantile>,
    grouping: String,
}

impl Planner {
    pub fn new(quantiles: Vec<Quantile>) -> Self {
        Self {
            quantiles,
            grouping: DEFAULT_GROUPING.join(","),
        }
    }

    pub fn with_grouping<S: AsRef<str>>(mut self, labels: &[S]) -> Self {
        self.grouping = labels.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(",");
        self
    }

    /// Quantile specs for every histogram, quantile-major.
    pub fn histogram_specs(&self, catalog: &Catalog) -> Vec<QuerySpec> {
        self.quantiles
            .iter()
            .flat_map(|&q| {
                catalog
                    .histograms
                    .iter()
                    .map(move |name| QuerySpec::quantile(name, q, &self.grouping))
            })
            .collect()
    }

    /// One rate spec per counter.
    pub fn counter_specs(&self, catalog: &Catalog) -> Vec<QuerySpec> {
        catalog.counters.iter().map(|name| QuerySpec::rate(name)).collect()
    }
}

/// The `{metric_name, query}` list a scrape server polls, derived from a catalog.
pub fn scrape_queries(catalog: &Catalog) -> Vec<MetricQuery> {
    let counters = catalog.counters.iter().map(|c| MetricQuery {
        metric_name: format!("{c}:rate1m"),
        query: format!("rate({c}[1m])"),
    });
    let gauges = catalog.gauges.iter().map(|g| MetricQuery {
        metric_name: g.clone(),
        query: g.clone(),
    });
    let histograms = catalog.histograms.iter().map(|h| MetricQuery {
        metric_name: format!("{h}:histogram_quantile_p99_1m"),
        query: format!(
            "histogram_quantile(0.99, sum(rate({h}[1m])) by ({SCRAPE_GROUPING}))"
        ),
    });

    let mut queries: Vec<MetricQuery> =
        counters.chain(gauges).chain(histograms).collect();
    queries.sort_by(|a, b| a.metric_name.cmp(&b.metric_name));
    queries
}

// ─── Query window ────────────────────────────────────────────────

/// Range-query bounds in unix seconds, both aligned to `step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryWindow {
    pub start: i64,
    pub end: i64,
    pub step: Duration,
}

impl QueryWindow {
    /// Window ending at the last whole minute before `now_secs`, covering
    /// `interval × 1.2`, then padded outward by one step on each side.
    pub fn compute(now_secs: i64, interval: Duration, step: Duration) -> Self {
        let end = now_secs.div_euclid(MINUTE_SECS) * MINUTE_SECS;
        let window_secs = (interval.as_secs_f64() * WINDOW_OVERLAP) as i64;
        let start = end - window_secs;

        let step_secs = (step.as_secs() as i64).max(1);
        Self {
            start: (start.div_euclid(step_secs) - 1) * step_secs,
            end: (end.div_euclid(step_secs) + 1) * step_secs,
            step: Duration::from_secs(step_secs as u64),
        }
    }
}
