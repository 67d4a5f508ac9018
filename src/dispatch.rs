use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::catalog;
use crate::error::Result;
use crate::executor::Executor;
use crate::planner::{Planner, QueryWindow};
use crate::sink::Sink;
use crate::source::Querier;
use crate::translate::{translate_matrix, TranslatedSeries};

/// Pause after a failed cycle before the next attempt.
pub const RETRY_BACKOFF: Duration = Duration::from_secs(3);

/// What one harvest cycle needs besides its two capabilities.
#[derive(Debug, Clone)]
pub struct HarvestSettings {
    pub metric_prefix: String,
    pub step: Duration,
    pub interval: Duration,
}

/// Outcome of a successful cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub histogram_series: usize,
    pub counter_series: usize,
}

impl CycleReport {
    pub fn submitted(&self) -> usize {
        self.histogram_series + self.counter_series
    }
}

/// Runs discover → plan → execute → translate → deliver.
pub struct Harvester {
    querier: Arc<dyn Querier>,
    sink: Arc<dyn Sink>,
    planner: Planner,
    settings: HarvestSettings,
}

impl Harvester {
    pub fn new(
        querier: Arc<dyn Querier>,
        sink: Arc<dyn Sink>,
        planner: Planner,
        settings: HarvestSettings,
    ) -> Self {
        Self {
            querier,
            sink,
            planner,
            settings,
        }
    }

    /// One full cycle evaluated against the wall-clock second `now_secs`.
    ///
    /// Any query failure abandons the cycle before anything is submitted.
    pub async fn run_cycle(&self, now_secs: i64) -> Result<CycleReport> {
        let settings = &self.settings;
        let window = QueryWindow::compute(now_secs, settings.interval, settings.step);
        let catalog =
            catalog::discover(self.querier.as_ref(), &settings.metric_prefix).await?;
        let executor = Executor::new(self.querier.as_ref());

        let mut histogram_series: Vec<TranslatedSeries> = Vec::new();
        for spec in self.planner.histogram_specs(&catalog) {
            let matrix = executor.range(&spec.query, &window).await?;
            histogram_series.extend(translate_matrix(&spec, matrix));
        }
        info!(count = histogram_series.len(), "received histogram series");

        let mut counter_series: Vec<TranslatedSeries> = Vec::new();
        for spec in self.planner.counter_specs(&catalog) {
            let matrix = executor.range(&spec.query, &window).await?;
            counter_series.extend(translate_matrix(&spec, matrix));
        }
        info!(count = counter_series.len(), "received counter series");

        let report = CycleReport {
            histogram_series: histogram_series.len(),
            counter_series: counter_series.len(),
        };
        let mut series = histogram_series;
        series.extend(counter_series);

        self.sink.submit(series).await?;
        info!(
            submitted = report.submitted(),
            next_in_secs = self.settings.interval.as_secs(),
            "cycle submitted"
        );
        Ok(report)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Stopped,
}

/// Drives harvest cycles on a fixed interval until shutdown is requested.
///
/// A failed cycle is retried right after [`RETRY_BACKOFF`] instead of
/// waiting for the next tick. A discovery failure ends the loop with an
/// error. Shutdown is only observed between cycles.
pub struct DispatchLoop {
    harvester: Arc<Harvester>,
    backoff: Duration,
    state: LoopState,
}

impl DispatchLoop {
    pub fn new(harvester: Harvester) -> Self {
        Self {
            harvester: Arc::new(harvester),
            backoff: RETRY_BACKOFF,
            state: LoopState::Idle,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut ticker = tokio::time::interval(self.harvester.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut retry_now = false;

        loop {
            // ── Idle ────────────────────────────────────────────────
            if *shutdown.borrow() {
                break;
            }
            if !retry_now {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => {}
                }
            }

            // ── Running ─────────────────────────────────────────────
            self.state = LoopState::Running;
            let harvester = Arc::clone(&self.harvester);
            let cycle = tokio::spawn(async move {
                harvester.run_cycle(Utc::now().timestamp()).await
            });
            let outcome = match cycle.await {
                Ok(outcome) => outcome,
                Err(join_err) => std::panic::resume_unwind(join_err.into_panic()),
            };
            self.state = LoopState::Idle;

            match outcome {
                Ok(report) => {
                    debug!(?report, "cycle finished");
                    retry_now = false;
                }
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "cycle failed unrecoverably");
                    self.stop();
                    return Err(e);
                }
                Err(e) => {
                    error!(
                        error = %e,
                        backoff_secs = self.backoff.as_secs(),
                        "cycle failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(self.backoff) => {}
                    }
                    retry_now = true;
                }
            }
        }

        self.stop();
        Ok(())
    }

    fn stop(&mut self) {
        self.state = LoopState::Stopped;
        info!("dispatch loop stopped");
    }
}
