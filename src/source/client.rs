use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Certificate, Identity, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::{Labels, QueryResult, QueryValue, Querier, Sample, SamplePair, SampleStream};
use crate::error::{HarvestError, Result};
use crate::planner::QueryWindow;

/// Per-call time box for every request to the query API.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection settings for the query API.
#[derive(Debug, Clone, Default)]
pub struct PromConfig {
    pub target_host: String,
    pub server_root_ca_cert: Option<PathBuf>,
    pub client_cert: PathBuf,
    pub client_key: PathBuf,
    /// Name to verify the server certificate against, if not the URL host.
    pub server_name: Option<String>,
    pub insecure_skip_verify: bool,
}

/// mTLS client for a Prometheus-compatible HTTP query API.
pub struct PromClient {
    http: reqwest::Client,
    base: String,
}

impl PromClient {
    pub async fn connect(cfg: &PromConfig) -> Result<Self> {
        let mut endpoint = Url::parse(&cfg.target_host)
            .map_err(|e| {
                HarvestError::Config(format!(
                    "invalid endpoint {:?}: {e}",
                    cfg.target_host
                ))
            })?;

        // ── Client identity (cert + key in one PEM buffer) ──────────
        let mut pem = std::fs::read(&cfg.client_cert)?;
        pem.push(b'\n');
        pem.extend(std::fs::read(&cfg.client_key)?);
        let identity = Identity::from_pem(&pem)
            .map_err(|e| {
                HarvestError::Config(format!("invalid client cert/key: {e}"))
            })?;

        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .identity(identity)
            .timeout(QUERY_TIMEOUT)
            .danger_accept_invalid_certs(cfg.insecure_skip_verify);

        // ── Optional CA pin ─────────────────────────────────────────
        if let Some(ca_path) = &cfg.server_root_ca_cert {
            let ca = Certificate::from_pem(&std::fs::read(ca_path)?)
                .map_err(|e| HarvestError::Config(format!("invalid server CA: {e}")))?;
            builder = builder.tls_built_in_root_certs(false).add_root_certificate(ca);
        }

        // ── Optional server-name override ───────────────────────────
        // Address the server by the override name, pinned to the real host's addresses.
        if let Some(name) = cfg.server_name.as_deref().filter(|n| !n.is_empty()) {
            let host = endpoint
                .host_str()
                .ok_or_else(|| HarvestError::Config("endpoint has no host".into()))?
                .to_owned();
            let port = endpoint.port_or_known_default().unwrap_or(443);
            let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), port))
                .await
                .map_err(|e| {
                    HarvestError::Config(format!("cannot resolve {host}: {e}"))
                })?
                .collect();
            builder = builder.resolve_to_addrs(name, &addrs);
            endpoint
                .set_host(Some(name))
                .map_err(|e| {
                    HarvestError::Config(format!("invalid server name {name:?}: {e}"))
                })?;
        }

        let http = builder
            .build()
            .map_err(|e| {
                HarvestError::Config(format!("failed to build http client: {e}"))
            })?;

        Ok(Self {
            http,
            base: endpoint.as_str().trim_end_matches('/').to_owned(),
        })
    }

    /// GET an API path and unwrap the response envelope.
    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> std::result::Result<(T, Vec<String>), String> {
        let url = format!("{}{}", self.base, path);
        debug!(%url, "querying source");

        let resp = self
            .http
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(|e| describe(&e))?;
        let status = resp.status();
        let body = resp.bytes().await.map_err(|e| describe(&e))?;

        match serde_json::from_slice::<ApiResponse<T>>(&body) {
            Ok(envelope) => envelope.into_result(),
            Err(e) if status.is_success() => Err(format!("malformed response: {e}")),
            Err(_) => Err(format!("server returned {status}")),
        }
    }
}

fn describe(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        HarvestError::Timeout(QUERY_TIMEOUT).to_string()
    } else {
        e.to_string()
    }
}

#[async_trait]
impl Querier for PromClient {
    async fn metric_names(&self) -> Result<Vec<String>> {
        let (names, _) = self
            .get::<Vec<String>>("/api/v1/label/__name__/values", &[])
            .await
            .map_err(|e| {
                HarvestError::SourceUnavailable(format!(
                    "failed to fetch metric names: {e}"
                ))
            })?;
        Ok(names)
    }

    async fn query_range(
        &self,
        query: &str,
        window: &QueryWindow,
    ) -> Result<QueryResult> {
        let params = [
            ("query", query.to_owned()),
            ("start", window.start.to_string()),
            ("end", window.end.to_string()),
            ("step", window.step.as_secs().to_string()),
            ("timeout", format!("{}s", QUERY_TIMEOUT.as_secs())),
        ];
        let (data, warnings) = self
            .get::<WireData>("/api/v1/query_range", &params)
            .await
            .map_err(|e| HarvestError::query_failed(query, e))?;
        let value = data
            .into_value()
            .map_err(|e| HarvestError::query_failed(query, e))?;
        Ok(QueryResult { value, warnings })
    }

    async fn query_instant(
        &self,
        query: &str,
        at: DateTime<Utc>,
    ) -> Result<QueryResult> {
        let params = [
            ("query", query.to_owned()),
            ("time", at.timestamp().to_string()),
            ("timeout", format!("{}s", QUERY_TIMEOUT.as_secs())),
        ];
        let (data, warnings) = self
            .get::<WireData>("/api/v1/query", &params)
            .await
            .map_err(|e| HarvestError::query_failed(query, e))?;
        let value = data
            .into_value()
            .map_err(|e| HarvestError::query_failed(query, e))?;
        Ok(QueryResult { value, warnings })
    }
}

// ─── Wire format ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    status: String,
    data: Option<T>,
    #[serde(rename = "errorType", default)]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    warnings: Vec<String>,
}

impl<T> ApiResponse<T> {
    fn into_result(self) -> std::result::Result<(T, Vec<String>), String> {
        if self.status != "success" {
            return Err(format!(
                "{}: {}",
                self.error_type.unwrap_or_else(|| "error".into()),
                self.error.unwrap_or_default()
            ));
        }
        match self.data {
            Some(data) => Ok((data, self.warnings)),
            None => Err("response carried no data".into()),
        }
    }
}

/// `[<unix seconds>, "<value>"]`
type WirePair = (f64, String);

#[derive(Debug, Deserialize)]
#[serde(tag = "resultType", content = "result", rename_all = "lowercase")]
enum WireData {
    Matrix(Vec<WireStream>),
    Vector(Vec<WireSample>),
    Scalar(WirePair),
    String(WirePair),
}

#[derive(Debug, Deserialize)]
struct WireStream {
    #[serde(default)]
    metric: Labels,
    #[serde(default)]
    values: Vec<WirePair>,
}

#[derive(Debug, Deserialize)]
struct WireSample {
    #[serde(default)]
    metric: Labels,
    value: WirePair,
}

impl WireData {
    fn into_value(self) -> std::result::Result<QueryValue, String> {
        Ok(match self {
            Self::Matrix(streams) => QueryValue::Matrix(
                streams
                    .into_iter()
                    .map(|s| {
                        Ok(SampleStream {
                            metric: s.metric,
                            values: s
                                .values
                                .iter()
                                .map(pair)
                                .collect::<std::result::Result<_, _>>()?,
                        })
                    })
                    .collect::<std::result::Result<_, String>>()?,
            ),
            Self::Vector(samples) => QueryValue::Vector(
                samples
                    .into_iter()
                    .map(|s| {
                        Ok(Sample {
                            value: pair(&s.value)?,
                            metric: s.metric,
                        })
                    })
                    .collect::<std::result::Result<_, String>>()?,
            ),
            Self::Scalar(p) => QueryValue::Scalar(pair(&p)?),
            Self::String((_, s)) => QueryValue::String(s),
        })
    }
}

fn pair((timestamp, raw): &WirePair) -> std::result::Result<SamplePair, String> {
    Ok(SamplePair {
        timestamp: *timestamp,
        value: parse_value(raw)?,
    })
}

/// Sample values travel as strings so that NaN and infinities survive JSON.
fn parse_value(raw: &str) -> std::result::Result<f64, String> {
    match raw {
        "NaN" => Ok(f64::NAN),
        "+Inf" | "Inf" => Ok(f64::INFINITY),
        "-Inf" => Ok(f64::NEG_INFINITY),
        _ => raw
            .parse::<f64>()
            .map_err(|e| format!("invalid sample value {raw:?}: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(json: &str) -> std::result::Result<(QueryValue, Vec<String>), String> {
        let envelope: ApiResponse<WireData> =
            serde_json::from_str(json).map_err(|e| e.to_string())?;
        let (data, warnings) = envelope.into_result()?;
        Ok((data.into_value()?, warnings))
    }

    #[test]
    fn decodes_matrix_with_special_values() {
        let (value, warnings) = decode(
            r#"{"status":"success","data":{"resultType":"matrix","result":[
                {"metric":{"operation":"Poll"},"values":[
                    [1700000000.5,"1.5"],[1700000060,"NaN"],[1700000120,"+Inf"]
                ]}
            ]}}"#,
        )
        .unwrap();
        assert!(warnings.is_empty());

        let QueryValue::Matrix(matrix) = value else {
            panic!("expected matrix");
        };
        assert_eq!(matrix.len(), 1);
        assert_eq!(matrix[0].metric.get("operation").map(String::as_str), Some("Poll"));
        assert_eq!(matrix[0].values[0].value, 1.5);
        assert!(matrix[0].values[1].value.is_nan());
        assert_eq!(matrix[0].values[2].value, f64::INFINITY);
    }

    #[test]
    fn decodes_vector_and_warnings() {
        let (value, warnings) = decode(
            r#"{"status":"success","warnings":["slow"],"data":{"resultType":"vector","result":[
                {"metric":{"__name__":"up"},"value":[1700000000,"-Inf"]}
            ]}}"#,
        )
        .unwrap();
        assert_eq!(warnings, vec!["slow".to_string()]);

        let QueryValue::Vector(vector) = value else {
            panic!("expected vector");
        };
        assert_eq!(vector[0].value.value, f64::NEG_INFINITY);
    }

    #[test]
    fn scalar_is_decoded_as_its_own_type() {
        let (value, _) =
            decode(r#"{"status":"success","data":{"resultType":"scalar","result":[1,"2"]}}"#)
                .unwrap();
        assert_eq!(value.type_name(), "scalar");
    }

    #[test]
    fn error_envelope_becomes_err() {
        let err =
            decode(r#"{"status":"error","errorType":"bad_data","error":"parse error"}"#)
                .unwrap_err();
        assert_eq!(err, "bad_data: parse error");
    }

    #[test]
    fn rejects_garbage_sample_value() {
        assert!(parse_value("twelve").is_err());
        assert_eq!(parse_value("0.25").unwrap(), 0.25);
    }
}
