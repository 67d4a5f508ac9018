use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;
use tracing::{debug, error, info};

use super::SnapshotStore;
use crate::catalog;
use crate::config::MetricQuery;
use crate::error::Result;
use crate::executor::Executor;
use crate::planner::scrape_queries;
use crate::source::{Querier, Vector};
use crate::translate::render;

/// Where each refresh gets its list of named queries.
#[derive(Debug, Clone)]
pub enum QuerySource {
    /// A fixed list, usually loaded from the config file.
    Fixed(Vec<MetricQuery>),
    /// Rediscover metric names under `prefix` on every refresh.
    Discovered { prefix: String },
}

/// Periodically evaluates every named query and publishes the rendered text.
pub struct Refresher {
    querier: Arc<dyn Querier>,
    queries: QuerySource,
    store: Arc<SnapshotStore>,
}

impl Refresher {
    pub fn new(
        querier: Arc<dyn Querier>,
        queries: QuerySource,
        store: Arc<SnapshotStore>,
    ) -> Self {
        Self {
            querier,
            queries,
            store,
        }
    }

    /// One refresh. Any failing query aborts it and leaves the snapshot as is.
    /// Returns the number of published metric names.
    pub async fn refresh(&self, now: DateTime<Utc>) -> Result<usize> {
        let discovered;
        let queries: &[MetricQuery] = match &self.queries {
            QuerySource::Fixed(list) => list,
            QuerySource::Discovered { prefix } => {
                let found = catalog::discover(self.querier.as_ref(), prefix).await?;
                discovered = scrape_queries(&found);
                &discovered
            }
        };

        let executor = Executor::new(self.querier.as_ref());
        let mut results: BTreeMap<String, Vector> = BTreeMap::new();
        for record in queries {
            let samples = executor.instant(&record.query, now).await?;
            debug!(metric = %record.metric_name, samples = samples.len(), "query done");
            results.insert(record.metric_name.clone(), samples);
        }

        self.store.replace(render(&results), Utc::now());
        Ok(results.len())
    }

    /// Refresh immediately, then every `period`, until `shutdown` flips.
    pub async fn run(self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticks = IntervalStream::new(tokio::time::interval(period));
        info!(period_secs = period.as_secs(), "snapshot refresher started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                tick = ticks.next() => {
                    if tick.is_none() {
                        break;
                    }
                }
            }

            match self.refresh(Utc::now()).await {
                Ok(metrics) => info!(metrics, "snapshot refreshed"),
                Err(e) => {
                    error!(error = %e, "refresh failed; keeping previous snapshot")
                }
            }
        }

        info!("snapshot refresher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HarvestError;
    use crate::planner::QueryWindow;
    use crate::scrape::STALENESS_LIMIT;
    use crate::source::{Labels, QueryResult, QueryValue, Sample, SamplePair};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Answers each instant query with one sample valued by query length.
    #[derive(Default)]
    struct FakeQuerier {
        names: Vec<String>,
        fail_on: Option<String>,
        asked: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Querier for FakeQuerier {
        async fn metric_names(&self) -> Result<Vec<String>> {
            Ok(self.names.clone())
        }

        async fn query_range(
            &self,
            query: &str,
            _window: &QueryWindow,
        ) -> Result<QueryResult> {
            Err(HarvestError::query_failed(query, "not expected"))
        }

        async fn query_instant(
            &self,
            query: &str,
            _at: DateTime<Utc>,
        ) -> Result<QueryResult> {
            self.asked.lock().push(query.to_string());
            if self.fail_on.as_deref() == Some(query) {
                return Err(HarvestError::query_failed(query, "bad_data"));
            }
            let mut metric = Labels::new();
            metric.insert("temporal_namespace".into(), "ns.acct".into());
            Ok(QueryResult::new(QueryValue::Vector(vec![Sample {
                metric,
                value: SamplePair {
                    timestamp: 0.0,
                    value: query.len() as f64,
                },
            }])))
        }
    }

    fn record(name: &str, query: &str) -> MetricQuery {
        MetricQuery {
            metric_name: name.into(),
            query: query.into(),
        }
    }

    #[tokio::test]
    async fn fixed_list_renders_every_record() {
        let querier = Arc::new(FakeQuerier::default());
        let store = Arc::new(SnapshotStore::new());
        let refresher = Refresher::new(
            querier.clone(),
            QuerySource::Fixed(vec![record("b_gauge", "abc"), record("a_gauge", "ab")]),
            store.clone(),
        );

        assert_eq!(refresher.refresh(Utc::now()).await.unwrap(), 2);

        let text = store.read_fresh(Utc::now(), STALENESS_LIMIT).unwrap();
        let a = text.find("a_gauge{temporal_namespace=\"ns.acct\"} 2").unwrap();
        let b = text.find("b_gauge{temporal_namespace=\"ns.acct\"} 3").unwrap();
        assert!(a < b);
        assert_eq!(*querier.asked.lock(), vec!["abc", "ab"]);
    }

    #[tokio::test]
    async fn failed_query_keeps_previous_snapshot() {
        let querier = Arc::new(FakeQuerier {
            fail_on: Some("broken".into()),
            ..FakeQuerier::default()
        });
        let store = Arc::new(SnapshotStore::new());
        store.replace("previous\n".into(), Utc::now());

        let refresher = Refresher::new(
            querier,
            QuerySource::Fixed(vec![record("ok", "up"), record("bad", "broken")]),
            store.clone(),
        );
        assert!(refresher.refresh(Utc::now()).await.is_err());
        assert_eq!(
            store.read_fresh(Utc::now(), STALENESS_LIMIT).as_deref(),
            Some("previous\n")
        );
    }

    #[tokio::test]
    async fn discovery_derives_queries_each_refresh() {
        let querier = Arc::new(FakeQuerier {
            names: vec![
                "temporal_cloud_v0_frontend_service_request_count".into(),
                "temporal_cloud_v0_resource_exhausted_error_count".into(),
                "unrelated_metric".into(),
            ],
            ..FakeQuerier::default()
        });
        let store = Arc::new(SnapshotStore::new());
        let refresher = Refresher::new(
            querier.clone(),
            QuerySource::Discovered {
                prefix: "temporal_cloud_v0".into(),
            },
            store.clone(),
        );

        assert_eq!(refresher.refresh(Utc::now()).await.unwrap(), 2);
        assert_eq!(refresher.refresh(Utc::now()).await.unwrap(), 2);
        assert_eq!(querier.asked.lock().len(), 4);
        assert!(querier.asked.lock().iter().all(|q| !q.contains("unrelated_metric")));
    }

    #[tokio::test(start_paused = true)]
    async fn run_refreshes_on_each_tick_until_shutdown() {
        let querier = Arc::new(FakeQuerier::default());
        let store = Arc::new(SnapshotStore::new());
        let refresher = Refresher::new(
            querier.clone(),
            QuerySource::Fixed(vec![record("g", "up")]),
            store.clone(),
        );
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(refresher.run(Duration::from_secs(59), rx));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(querier.asked.lock().len(), 1);
        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(querier.asked.lock().len(), 2);

        tx.send(true).unwrap();
        task.await.unwrap();
        assert!(store.last_success().is_some());
    }
}
