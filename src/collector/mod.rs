/// Collector module
///
/// This module groups the polling engine:
/// - Binding assets to a data source
/// - One polling worker per asset
/// - The round barrier and the aggregator that turns complete rounds
///   into snapshots
/// - The supervisor owning worker lifecycles and shutdown
///
/// Design notes:
/// - Source-specific logic MUST NOT live here; workers only see the
///   `DataSource` trait
/// - Rendering belongs to the presenter
/// - Every task of a run shares one `CancelContext`
pub mod aggregator;
pub mod barrier;
pub mod binding;
pub mod cancel;
pub mod supervisor;
pub mod worker;

pub use aggregator::{AggregationMode, Aggregator, Column, Snapshot};
pub use barrier::{RoundBarrier, RoundOutcome, RoundSlot};
pub use binding::{DEFAULT_PAIRING, SourceBinding};
pub use cancel::CancelContext;
pub use supervisor::{Supervisor, run_streaming, run_synchronized};
pub use worker::{ExitReason, Feed, PollingWorker, WorkerOptions, WorkerReport, WorkerState};
