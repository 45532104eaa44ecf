use std::sync::Arc;
use std::sync::atomic::Ordering;

use log::{debug, error, info, warn};

use super::barrier::{RoundBarrier, RoundOutcome, RoundSlot};
use super::cancel::CancelContext;
use crate::{metrics::METRICS, presenter::Presenter, schema::RecordSequence};

/// One asset's share of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Display label, e.g. "BTC/USD".
    pub label: String,

    /// No data this round (fetch failure or invalid binding).
    pub failed: bool,

    pub records: RecordSequence,
}

/// All assets' data for one round, ordered by worker position.
///
/// Rows line up by position inside each column, not by timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub round: u64,
    pub columns: Vec<Column>,
}

impl Snapshot {
    /// Builds a snapshot from drained slots; `labels[i]` names slot `i`.
    pub fn from_slots(round: u64, labels: &[String], slots: Vec<RoundSlot>) -> Self {
        let columns = slots
            .into_iter()
            .enumerate()
            .map(|(i, slot)| Column {
                label: labels.get(i).cloned().unwrap_or_else(|| format!("#{i}")),
                failed: slot.failed,
                records: slot.payload,
            })
            .collect();

        Self { round, columns }
    }

    /// Length of the longest column.
    pub fn row_count(&self) -> usize {
        self.columns.iter().map(|c| c.records.len()).max().unwrap_or(0)
    }

    pub fn populated(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| !c.failed && !c.records.is_empty())
    }

    pub fn failed(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.failed)
    }

    /// True when every populated column has the same number of rows.
    pub fn is_aligned(&self) -> bool {
        let mut lengths = self.populated().map(|c| c.records.len());
        match lengths.next() {
            Some(first) => lengths.all(|len| len == first),
            None => true,
        }
    }
}

/// How many rounds the aggregator drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationMode {
    /// Keep draining rounds until cancelled.
    Continuous,
    /// Drain a single round, then stop every worker.
    OneShot,
}

/// Turns complete rounds into snapshots for the presenter.
///
/// Runs on the invoking task while the workers run on their own tasks.
pub struct Aggregator {
    labels: Vec<String>,
    barrier: Arc<RoundBarrier>,
    presenter: Arc<dyn Presenter>,
    cancel: CancelContext,
    mode: AggregationMode,
}

impl Aggregator {
    pub fn new(
        labels: Vec<String>,
        barrier: Arc<RoundBarrier>,
        presenter: Arc<dyn Presenter>,
        cancel: CancelContext,
        mode: AggregationMode,
    ) -> Self {
        Self {
            labels,
            barrier,
            presenter,
            cancel,
            mode,
        }
    }

    /// Drives rounds until the mode or cancellation says stop.
    ///
    /// Returns the number of snapshots handed to the presenter.
    pub async fn run(self) -> u64 {
        let mut presented = 0;

        while !self.cancel.is_outer_stopped() && !self.cancel.is_cancelled() {
            match self.barrier.wait_round(&self.cancel).await {
                RoundOutcome::Complete => {}
                RoundOutcome::Cancelled => {
                    debug!("aggregator: round cancelled");
                    break;
                }
                RoundOutcome::Exhausted => {
                    warn!("aggregator: every worker has failed, nothing left to collect");
                    self.cancel.stop_round();
                    break;
                }
            }

            let slots = self.barrier.drain();
            let snapshot = Snapshot::from_slots(self.barrier.round(), &self.labels, slots);
            METRICS.rounds_completed.fetch_add(1, Ordering::Relaxed);

            if !snapshot.is_aligned() {
                warn!(
                    "round {}: columns differ in length, rows are aligned by position only",
                    snapshot.round
                );
            }

            if let Err(e) = self.presenter.present_snapshot(&snapshot) {
                error!("round {}: presenter failed: {}", snapshot.round, e);
            }
            presented += 1;

            if self.mode == AggregationMode::OneShot {
                info!("one-shot round collected, stopping workers");
                self.cancel.stop_round();
                self.cancel.stop_outer();
                break;
            }

            if self.cancel.is_round_stopped() {
                self.cancel.stop_outer();
            }
        }

        presented
    }
}
