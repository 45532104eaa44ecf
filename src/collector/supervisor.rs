use std::sync::Arc;

use futures_util::future::join_all;
use log::{debug, error, info};
use tokio::task::JoinHandle;

use super::aggregator::{AggregationMode, Aggregator};
use super::barrier::RoundBarrier;
use super::cancel::CancelContext;
use super::worker::{PollingWorker, WorkerOptions, WorkerReport};
use crate::{
    error::{CollectorError, Result},
    presenter::Presenter,
    sources::DataSource,
};

/// Owns the worker tasks of one run.
///
/// Spawns one task per asset, forwards shutdown requests through the
/// shared `CancelContext` and joins every task before handing back
/// control. A worker that panics is logged and left out of the reports;
/// it never takes the run down.
pub struct Supervisor {
    cancel: CancelContext,
    handles: Vec<JoinHandle<WorkerReport>>,
}

/// Checks the pairing of asset names and sources before anything starts.
fn check_counts(assets: &[String], sources: &[Arc<dyn DataSource>]) -> Result<()> {
    if assets.len() != sources.len() {
        return Err(CollectorError::CountMismatch {
            names: assets.len(),
            sources: sources.len(),
        });
    }
    if assets.is_empty() {
        return Err(CollectorError::Configuration("no assets to poll".to_string()));
    }
    Ok(())
}

impl Supervisor {
    pub fn new(cancel: CancelContext) -> Self {
        Self {
            cancel,
            handles: Vec::new(),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    fn workers(
        &self,
        assets: &[String],
        sources: &[Arc<dyn DataSource>],
        options: &Arc<WorkerOptions>,
    ) -> Vec<PollingWorker> {
        assets
            .iter()
            .zip(sources)
            .enumerate()
            .map(|(id, (asset, source))| {
                PollingWorker::new(id, asset.clone(), source.clone(), options.clone(), self.cancel.clone())
            })
            .collect()
    }

    /// Starts one streaming worker per asset.
    ///
    /// `assets[i]` is polled through `sources[i]`.
    pub fn spawn_streaming(
        &mut self,
        assets: &[String],
        sources: &[Arc<dyn DataSource>],
        options: Arc<WorkerOptions>,
        presenter: Arc<dyn Presenter>,
    ) -> Result<()> {
        check_counts(assets, sources)?;

        for worker in self.workers(assets, sources, &options) {
            let presenter = presenter.clone();
            self.handles
                .push(tokio::spawn(async move { worker.run_streaming(presenter).await }));
        }

        info!("started {} streaming workers", assets.len());
        Ok(())
    }

    /// Starts one synchronized worker per asset, publishing into `barrier`.
    ///
    /// The barrier must have exactly one slot per asset.
    pub fn spawn_synchronized(
        &mut self,
        assets: &[String],
        sources: &[Arc<dyn DataSource>],
        options: Arc<WorkerOptions>,
        barrier: Arc<RoundBarrier>,
        presenter: Arc<dyn Presenter>,
    ) -> Result<()> {
        check_counts(assets, sources)?;
        if barrier.len() != assets.len() {
            return Err(CollectorError::CountMismatch {
                names: assets.len(),
                sources: barrier.len(),
            });
        }

        for worker in self.workers(assets, sources, &options) {
            let barrier = barrier.clone();
            let presenter = presenter.clone();
            self.handles.push(tokio::spawn(async move {
                worker.run_synchronized(barrier, presenter).await
            }));
        }

        info!("started {} synchronized workers", assets.len());
        Ok(())
    }

    /// Asks every worker to stop. Returns immediately; use `join` to wait.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Waits for every worker task to finish.
    pub async fn join(&mut self) -> Vec<WorkerReport> {
        let handles = std::mem::take(&mut self.handles);
        let mut reports = Vec::with_capacity(handles.len());

        for joined in join_all(handles).await {
            match joined {
                Ok(report) => {
                    debug!(
                        "worker {} [{}] joined: {:?}, {} rounds, {} failed",
                        report.id, report.asset, report.exit, report.rounds, report.failed_rounds
                    );
                    reports.push(report);
                }
                Err(e) => error!("worker task failed to join: {}", e),
            }
        }

        reports
    }
}

/// Streaming run: every worker emits on its own, nothing is synchronized.
///
/// Returns once every worker has joined: either the context was cancelled,
/// or no worker was left running (e.g. every asset failed to bind).
pub async fn run_streaming(
    assets: &[String],
    sources: &[Arc<dyn DataSource>],
    options: WorkerOptions,
    presenter: Arc<dyn Presenter>,
    cancel: CancelContext,
) -> Result<Vec<WorkerReport>> {
    let mut supervisor = Supervisor::new(cancel.clone());
    supervisor.spawn_streaming(assets, sources, Arc::new(options), presenter)?;
    let workers = supervisor.worker_count();

    let joined = supervisor.join();
    tokio::pin!(joined);

    tokio::select! {
        reports = &mut joined => {
            info!("all {} workers exited on their own", workers);
            return Ok(reports);
        }
        () = cancel.stopped() => info!("stopping {} workers", workers),
    }

    Ok(joined.await)
}

/// Synchronized run: workers publish into a shared barrier and the
/// aggregator, running on the calling task, presents one snapshot per
/// complete round.
///
/// Returns the number of snapshots presented, after every worker has
/// joined.
pub async fn run_synchronized(
    assets: &[String],
    sources: &[Arc<dyn DataSource>],
    options: WorkerOptions,
    presenter: Arc<dyn Presenter>,
    cancel: CancelContext,
    mode: AggregationMode,
) -> Result<u64> {
    check_counts(assets, sources)?;

    let barrier = Arc::new(RoundBarrier::new(assets.len()));
    let labels = assets
        .iter()
        .map(|asset| format!("{}/{}", asset, options.pairing))
        .collect();

    let mut supervisor = Supervisor::new(cancel.clone());
    supervisor.spawn_synchronized(assets, sources, Arc::new(options), barrier.clone(), presenter.clone())?;

    let aggregator = Aggregator::new(labels, barrier, presenter, cancel.clone(), mode);
    let presented = aggregator.run().await;

    // the aggregator is gone; nobody will drain another round
    cancel.stop_round();
    let reports = supervisor.join().await;
    info!("{} workers joined after {} snapshots", reports.len(), presented);

    Ok(presented)
}
