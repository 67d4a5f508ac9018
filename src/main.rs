use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

mod catalog;
mod config;
mod dispatch;
mod error;
mod executor;
mod handlers;
mod middleware;
mod planner;
mod scrape;
mod server;
mod shutdown;
mod sink;
mod source;
mod translate;

use config::{Cli, Command, GenconfigArgs, PushArgs, ScrapeArgs, ScrapeConfig};
use dispatch::{DispatchLoop, HarvestSettings, Harvester};
use planner::Planner;
use scrape::{QuerySource, Refresher, SnapshotStore};
use sink::{DatadogClient, PagedSink};
use source::PromClient;

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    /// Latest rendered exposition text, written by the refresher.
    pub snapshots: Arc<SnapshotStore>,

    /// Snapshots at least this old are refused.
    pub max_age: Duration,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .init();

    match cli.command {
        Command::Push(args) => run_push(args).await,
        Command::Scrape(args) => run_scrape(args).await,
        Command::Genconfig(args) => run_genconfig(args).await,
    }
}

async fn run_push(args: PushArgs) -> anyhow::Result<()> {
    args.validate()?;

    // ── 1. Connect to the query API ──────────────────────────────
    let prom = PromClient::connect(&args.connection.to_prom_config()?).await?;
    info!(endpoint = %args.connection.prom_endpoint, "query client ready");

    // ── 2. Build the intake sink ─────────────────────────────────
    let intake = DatadogClient::new(&args.dd_site, args.dd_api_key.clone())?;
    info!(site = %args.dd_site, "intake client ready");

    // ── 3. Assemble the harvester ────────────────────────────────
    let planner = Planner::new(args.quantiles.clone())
        .with_grouping(args.grouping_labels.as_slice());
    let harvester = Harvester::new(
        Arc::new(prom),
        Arc::new(PagedSink::new(intake)),
        planner,
        HarvestSettings {
            metric_prefix: args.metric_prefix.clone(),
            step: args.step(),
            interval: args.interval(),
        },
    );

    // ── 4. Run until a signal or an unrecoverable failure ────────
    let mut dispatch = DispatchLoop::new(harvester);
    dispatch
        .run(shutdown::watch_signals())
        .await
        .context("harvesting stopped")?;
    Ok(())
}

async fn run_scrape(args: ScrapeArgs) -> anyhow::Result<()> {
    // ── 1. Connect to the query API ──────────────────────────────
    let prom = PromClient::connect(&args.connection.to_prom_config()?).await?;

    // ── 2. Decide the query set ──────────────────────────────────
    let queries = match &args.config_file {
        Some(path) => {
            let config = ScrapeConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?;
            info!(
                path = %path.display(),
                metrics = config.metrics.len(),
                "loaded scrape config"
            );
            QuerySource::Fixed(config.metrics)
        }
        None => {
            info!(
                prefix = %args.metric_prefix,
                "no config file; discovering queries on each refresh"
            );
            QuerySource::Discovered {
                prefix: args.metric_prefix.clone(),
            }
        }
    };

    // ── 3. Start the refresher ───────────────────────────────────
    let store = Arc::new(SnapshotStore::new());
    let shutdown = shutdown::watch_signals();
    let refresher = Refresher::new(Arc::new(prom), queries, Arc::clone(&store));
    let refresh_task =
        tokio::spawn(refresher.run(scrape::REFRESH_INTERVAL, shutdown.clone()));

    // ── 4. Build Axum router ─────────────────────────────────────
    let state = Arc::new(AppState {
        snapshots: store,
        max_age: scrape::STALENESS_LIMIT,
    });
    let app = server::create_router(state);

    // ── 5. Bind & serve ──────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    info!(addr = %args.bind, "serving /metrics");

    let mut stop = shutdown;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = stop.wait_for(|stopped| *stopped).await;
        })
        .await
        .context("server exited with error")?;

    refresh_task.await.context("refresher task failed")?;
    Ok(())
}

async fn run_genconfig(args: GenconfigArgs) -> anyhow::Result<()> {
    let prom = PromClient::connect(&args.connection.to_prom_config()?).await?;

    let catalog = catalog::discover(&prom, &args.metric_prefix).await?;
    if catalog.is_empty() {
        warn!(
            prefix = %args.metric_prefix,
            "no metrics found under prefix; config will be empty"
        );
    }
    let config = ScrapeConfig::new(planner::scrape_queries(&catalog));
    config
        .save(&args.output)
        .with_context(|| format!("writing {}", args.output.display()))?;

    info!(
        path = %args.output.display(),
        metrics = config.metrics.len(),
        "wrote scrape config"
    );
    Ok(())
}
