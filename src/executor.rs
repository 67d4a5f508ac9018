use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::{HarvestError, Result};
use crate::planner::QueryWindow;
use crate::source::{Matrix, QueryResult, QueryValue, Querier, Vector};

/// Time box applied to each individual query.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Instant queries look this far back so the point has been scraped.
pub const INSTANT_LAG: Duration = Duration::from_secs(60);

/// Runs derived queries against a [`Querier`], one call at a time.
pub struct Executor<'a> {
    querier: &'a dyn Querier,
    timeout: Duration,
}

impl<'a> Executor<'a> {
    pub fn new(querier: &'a dyn Querier) -> Self {
        Self {
            querier,
            timeout: CALL_TIMEOUT,
        }
    }

    /// Evaluate `query` over `window`. A non-matrix result is logged and
    /// treated as empty.
    pub async fn range(&self, query: &str, window: &QueryWindow) -> Result<Matrix> {
        let result = self
            .time_boxed(query, self.querier.query_range(query, window))
            .await?;
        match log_warnings(query, result) {
            QueryValue::Matrix(matrix) => {
                debug!(query, series = matrix.len(), "range query done");
                Ok(matrix)
            }
            other => {
                warn!(
                    query,
                    got = other.type_name(),
                    "unexpected result type for range query"
                );
                Ok(Matrix::new())
            }
        }
    }

    /// Evaluate `query` at `now − 60s`. A non-vector result is logged and
    /// treated as empty.
    pub async fn instant(&self, query: &str, now: DateTime<Utc>) -> Result<Vector> {
        let at = now - chrono::Duration::seconds(INSTANT_LAG.as_secs() as i64);
        let result = self
            .time_boxed(query, self.querier.query_instant(query, at))
            .await?;
        match log_warnings(query, result) {
            QueryValue::Vector(vector) => Ok(vector),
            other => {
                warn!(
                    query,
                    got = other.type_name(),
                    "unexpected result type for instant query"
                );
                Ok(Vector::new())
            }
        }
    }

    async fn time_boxed<F>(&self, query: &str, call: F) -> Result<QueryResult>
    where
        F: Future<Output = Result<QueryResult>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e @ HarvestError::QueryFailed { .. })) => Err(e),
            Ok(Err(e)) => Err(HarvestError::query_failed(query, e)),
            Err(_) => {
                let cause = HarvestError::Timeout(self.timeout);
                Err(HarvestError::query_failed(query, cause))
            }
        }
    }
}

fn log_warnings(query: &str, result: QueryResult) -> QueryValue {
    if !result.warnings.is_empty() {
        warn!(query, warnings = ?result.warnings, "source returned warnings");
    }
    result.value
}
