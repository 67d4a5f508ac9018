use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{PageClient, PAGE_TIMEOUT};
use crate::error::{HarvestError, Result};
use crate::planner::SeriesKind;
use crate::translate::TranslatedSeries;

/// Client for the v2 series intake endpoint.
pub struct DatadogClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
}

impl DatadogClient {
    pub fn new(site: &str, api_key: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(PAGE_TIMEOUT)
            .build()
            .map_err(|e| {
                HarvestError::Config(format!("failed to build intake client: {e}"))
            })?;
        Ok(Self {
            http,
            url: format!("https://api.{site}/api/v2/series"),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl PageClient for DatadogClient {
    async fn submit_page(&self, page: Vec<TranslatedSeries>) -> Result<Vec<String>> {
        let payload = Payload::from_series(&page);
        let resp = self
            .http
            .post(&self.url)
            .header("DD-API-KEY", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| HarvestError::SubmissionFailed(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            // Body only decorates the message here.
            let body: IntakeResponse = resp.json().await.unwrap_or_default();
            return Err(HarvestError::SubmissionFailed(format!(
                "intake returned {status}: {}",
                body.errors.join("; ")
            )));
        }

        let body: IntakeResponse = resp.json().await.map_err(|e| {
            HarvestError::SubmissionFailed(format!("malformed intake response: {e}"))
        })?;
        Ok(body.errors)
    }
}

// ─── Wire format ─────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct Payload<'a> {
    series: Vec<WireSeries<'a>>,
}

#[derive(Debug, Serialize)]
struct WireSeries<'a> {
    metric: &'a str,
    #[serde(rename = "type")]
    intake_type: u8,
    points: Vec<WirePoint>,
    resources: Vec<WireResource<'a>>,
}

#[derive(Debug, Serialize)]
struct WirePoint {
    timestamp: i64,
    value: f64,
}

#[derive(Debug, Serialize)]
struct WireResource<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    name: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct IntakeResponse {
    #[serde(default)]
    errors: Vec<String>,
}

impl<'a> Payload<'a> {
    fn from_series(page: &'a [TranslatedSeries]) -> Self {
        Self {
            series: page
                .iter()
                .map(|s| WireSeries {
                    metric: &s.name,
                    intake_type: intake_type(s.kind),
                    points: s
                        .points
                        .iter()
                        .map(|p| WirePoint {
                            timestamp: p.timestamp,
                            value: p.value,
                        })
                        .collect(),
                    // Each label travels as a resource of type <key> named <value>.
                    resources: s
                        .labels
                        .iter()
                        .map(|(k, v)| WireResource { kind: k, name: v })
                        .collect(),
                })
                .collect(),
        }
    }
}

fn intake_type(kind: SeriesKind) -> u8 {
    match kind {
        SeriesKind::Count => 1,
        SeriesKind::Gauge => 3,
    }
}
