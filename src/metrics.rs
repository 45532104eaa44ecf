use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;

/// Global runtime metrics for the collector.
///
/// Purpose:
/// - Track live workers
/// - Track completed rounds and rendered snapshots
/// - Track decode volume and failures
///
/// Design:
/// - Lock-free (Atomics)
/// - Cheap to update
/// - Safe in async + multithreaded contexts
#[derive(Default)]
pub struct RuntimeMetrics {
    // Workers
    pub workers_active: AtomicUsize,
    pub binding_errors: AtomicUsize,

    // Rounds
    pub rounds_completed: AtomicUsize,
    pub snapshots_presented: AtomicUsize,

    // Throughput
    pub records_decoded: AtomicUsize,
    pub fetch_errors: AtomicUsize,
}

impl RuntimeMetrics {
    /// One-line summary, used by the periodic reporter and at exit.
    pub fn summary(&self) -> String {
        format!(
            "[METRICS] workers={} binding_err={} rounds={} snapshots={} decoded={} fetch_err={}",
            self.workers_active.load(Ordering::Relaxed),
            self.binding_errors.load(Ordering::Relaxed),
            self.rounds_completed.load(Ordering::Relaxed),
            self.snapshots_presented.load(Ordering::Relaxed),
            self.records_decoded.load(Ordering::Relaxed),
            self.fetch_errors.load(Ordering::Relaxed),
        )
    }
}

/// Global metrics registry (singleton)
pub static METRICS: Lazy<Arc<RuntimeMetrics>> =
    Lazy::new(|| Arc::new(RuntimeMetrics::default()));
