// ------------------------------------------------------------
// External dependencies
// ------------------------------------------------------------

use round_sync_collector::{
    collector::{AggregationMode, CancelContext, run_streaming, run_synchronized},
    config::{Config, RunMode},
    metrics::METRICS,
    presenter::{ConsolePresenter, Presenter},
    sources::{DataSource, bitstamp::DEFAULT_REQUEST_BUDGET, connect_source},
};

use anyhow::Context;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

const METRICS_PERIOD: Duration = Duration::from_secs(30);

// ------------------------------------------------------------
// Application entry point
// ------------------------------------------------------------
//
// This is the host runtime for the round-synchronized collector.
//
// Responsibilities:
// - Load configuration (path from the first argument)
// - Initialize logging
// - Connect the configured data source
// - Translate Ctrl+C into cooperative cancellation
// - Run the configured mode until it finishes or is cancelled
//
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --------------------------------------------------------
    // Load configuration from disk
    // --------------------------------------------------------
    let path = std::env::args().nth(1).unwrap_or_else(|| "config.json".to_string());
    let config = Config::load(&path).with_context(|| format!("loading {path}"))?;

    let level = if config.debug_log() { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let assets = config.resolve_assets()?;
    info!(
        "{} mode, {} assets from {} every {:?}",
        format!("{:?}", config.mode).to_lowercase(),
        assets.len(),
        config.source,
        config.interval()
    );

    // --------------------------------------------------------
    // Connect the data source
    //
    // NOTE:
    // - This loads the source's pair list once; every worker
    //   validates its asset against it.
    // --------------------------------------------------------
    let budget = config.request_budget().unwrap_or(DEFAULT_REQUEST_BUDGET);
    let source = connect_source(&config.source, budget)
        .await
        .with_context(|| format!("connecting {}", config.source))?;
    let sources: Vec<Arc<dyn DataSource>> = assets.iter().map(|_| source.clone()).collect();

    // --------------------------------------------------------
    // Start metrics reporter (periodic, low-noise)
    // --------------------------------------------------------
    tokio::spawn(async {
        loop {
            sleep(METRICS_PERIOD).await;
            info!("{}", METRICS.summary());
        }
    });

    // --------------------------------------------------------
    // Ctrl+C → cooperative shutdown
    // --------------------------------------------------------
    let cancel = CancelContext::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    println!("Ctrl+C detected. Terminating, please wait...");
                    cancel.cancel();
                }
                Err(e) => warn!("cannot listen for Ctrl+C: {}", e),
            }
        });
    }

    // --------------------------------------------------------
    // Run the configured mode
    // --------------------------------------------------------
    let presenter: Arc<dyn Presenter> = Arc::new(ConsolePresenter::new(config.render_hints()));
    let options = config.worker_options();

    if config.mode.is_synchronized() {
        let mode = if config.mode == RunMode::Download {
            AggregationMode::OneShot
        } else {
            AggregationMode::Continuous
        };
        let presented = run_synchronized(&assets, &sources, options, presenter, cancel, mode).await?;
        info!("{} snapshots presented", presented);
    } else {
        let reports = run_streaming(&assets, &sources, options, presenter, cancel).await?;
        info!("{} workers stopped", reports.len());
    }

    info!("{}", METRICS.summary());
    Ok(())
}
