use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::error::{HarvestError, Result};
use crate::planner::Quantile;
use crate::source::PromConfig;

/// Relays metrics from a Prometheus query API into a push intake or a scrape endpoint.
#[derive(Parser, Debug)]
#[command(name = "promql-relay", version, about)]
pub struct Cli {
    /// Enable debug logging.
    #[arg(long, global = true, default_value_t = false)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Periodically push derived series to the ingestion API.
    Push(PushArgs),
    /// Serve the latest query results on /metrics.
    Scrape(ScrapeArgs),
    /// Discover metric names once and write a scrape config file.
    Genconfig(GenconfigArgs),
}

/// Flags shared by every subcommand for reaching the query API.
#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Prometheus API endpoint, e.g. https://<account>.tmprl.cloud/prometheus
    #[arg(long)]
    pub prom_endpoint: String,

    /// Path to the client certificate (required).
    #[arg(long, default_value = "")]
    pub client_cert: String,

    /// Path to the client key (required).
    #[arg(long, default_value = "")]
    pub client_key: String,

    /// Optional path to the root server CA cert.
    #[arg(long)]
    pub server_root_ca_cert: Option<PathBuf>,

    /// Server name to use when verifying the server's certificate.
    #[arg(long)]
    pub server_name: Option<String>,

    /// Skip verification of the server's certificate and host name.
    #[arg(long, default_value_t = false)]
    pub insecure_skip_verify: bool,
}

impl ConnectionArgs {
    pub fn to_prom_config(&self) -> Result<PromConfig> {
        if self.client_cert.is_empty() || self.client_key.is_empty() {
            return Err(HarvestError::Config(
                "--client-cert and --client-key are required".into(),
            ));
        }
        if self.prom_endpoint.is_empty() {
            return Err(HarvestError::Config("--prom-endpoint is required".into()));
        }
        Ok(PromConfig {
            target_host: self.prom_endpoint.clone(),
            server_root_ca_cert: self.server_root_ca_cert.clone(),
            client_cert: PathBuf::from(&self.client_cert),
            client_key: PathBuf::from(&self.client_key),
            server_name: self.server_name.clone(),
            insecure_skip_verify: self.insecure_skip_verify,
        })
    }
}

#[derive(Args, Debug, Clone)]
pub struct PushArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Prefix of the metrics to query and forward.
    #[arg(long, default_value = "temporal_cloud_")]
    pub metric_prefix: String,

    /// Step between points of a range query.
    #[arg(long, default_value_t = 60)]
    pub step_duration_seconds: u64,

    /// Interval between harvest cycles.
    #[arg(long, default_value_t = 600)]
    pub query_interval_seconds: u64,

    /// Labels kept when aggregating histogram buckets.
    #[arg(long, value_delimiter = ',', default_value = "temporal_namespace,operation,le")]
    pub grouping_labels: Vec<String>,

    /// Quantiles derived from every histogram.
    #[arg(long, value_delimiter = ',', default_value = "0.5,0.9,0.95,0.99")]
    pub quantiles: Vec<Quantile>,

    /// Ingestion API site.
    #[arg(long, env = "DD_SITE", default_value = "datadoghq.com")]
    pub dd_site: String,

    /// Ingestion API key.
    #[arg(long, env = "DD_API_KEY", hide_env_values = true, default_value = "")]
    pub dd_api_key: String,
}

impl PushArgs {
    pub fn step(&self) -> Duration {
        Duration::from_secs(self.step_duration_seconds)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.query_interval_seconds)
    }

    pub fn validate(&self) -> Result<()> {
        if self.step_duration_seconds == 0 || self.query_interval_seconds == 0 {
            return Err(HarvestError::Config(
                "step and query interval must be positive".into(),
            ));
        }
        if self.dd_api_key.is_empty() {
            return Err(HarvestError::Config("DD_API_KEY is required".into()));
        }
        Ok(())
    }
}

#[derive(Args, Debug, Clone)]
pub struct ScrapeArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Scrape config file; when absent the query set is discovered each refresh.
    #[arg(long)]
    pub config_file: Option<PathBuf>,

    /// Prefix used when discovering the query set.
    #[arg(long, default_value = "temporal_cloud_v0")]
    pub metric_prefix: String,

    /// address:port to expose the metrics server on.
    #[arg(long, default_value = "0.0.0.0:9001")]
    pub bind: SocketAddr,
}

#[derive(Args, Debug, Clone)]
pub struct GenconfigArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[arg(long, default_value = "temporal_cloud_v0")]
    pub metric_prefix: String,

    /// Where to write the generated config.
    #[arg(long, default_value = "config.yaml")]
    pub output: PathBuf,
}

// ─── Scrape config file ──────────────────────────────────────────

/// One published metric and the query that produces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricQuery {
    pub metric_name: String,
    pub query: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeConfig {
    #[serde(default)]
    pub metrics: Vec<MetricQuery>,
}

impl ScrapeConfig {
    pub fn new(mut metrics: Vec<MetricQuery>) -> Self {
        metrics.sort_by(|a, b| a.metric_name.cmp(&b.metric_name));
        Self { metrics }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let parsed: ScrapeConfig = serde_yaml::from_str(&raw)?;
        Ok(Self::new(parsed.metrics))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> ConnectionArgs {
        ConnectionArgs {
            prom_endpoint: "https://acct.tmprl.cloud/prometheus".into(),
            client_cert: "client.pem".into(),
            client_key: "client.key".into(),
            server_root_ca_cert: None,
            server_name: None,
            insecure_skip_verify: false,
        }
    }

    #[test]
    fn missing_credentials_is_config_error() {
        let mut args = connection();
        args.client_key.clear();
        assert!(matches!(args.to_prom_config(), Err(HarvestError::Config(_))));
        assert!(connection().to_prom_config().is_ok());
    }

    #[test]
    fn push_defaults() {
        let cli = Cli::try_parse_from([
            "promql-relay",
            "push",
            "--prom-endpoint",
            "https://example/prometheus",
            "--client-cert",
            "c.pem",
            "--client-key",
            "c.key",
            "--dd-api-key",
            "k",
        ])
        .unwrap();

        let Command::Push(push) = cli.command else {
            panic!("expected push");
        };
        assert_eq!(push.metric_prefix, "temporal_cloud_");
        assert_eq!(push.step(), Duration::from_secs(60));
        assert_eq!(push.interval(), Duration::from_secs(600));
        let qs: Vec<f64> = push.quantiles.iter().map(|q| q.value()).collect();
        assert_eq!(qs, vec![0.5, 0.9, 0.95, 0.99]);
        assert_eq!(push.grouping_labels, vec!["temporal_namespace", "operation", "le"]);
        assert!(push.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_quantile() {
        let parsed = Cli::try_parse_from([
            "promql-relay",
            "push",
            "--prom-endpoint",
            "https://example",
            "--quantiles",
            "0.5,1.5",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn scrape_config_round_trips_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            concat!(
                "metrics:\n",
                "  - metric_name: b\n    query: rate(b[1m])\n",
                "  - metric_name: a\n    query: a\n",
            ),
        )
        .unwrap();

        let config = ScrapeConfig::load(&path).unwrap();
        assert_eq!(config.metrics[0].metric_name, "a");
        assert_eq!(config.metrics[1].query, "rate(b[1m])");

        let out = dir.path().join("out.yaml");
        config.save(&out).unwrap();
        assert_eq!(ScrapeConfig::load(&out).unwrap(), config);
    }

    #[test]
    fn missing_file_is_io_error() {
        let missing = Path::new("/definitely/not/here.yaml");
        let err = ScrapeConfig::load(missing).unwrap_err();
        assert!(matches!(err, HarvestError::Io(_)));
    }
}
