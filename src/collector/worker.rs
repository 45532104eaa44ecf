use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use log::{debug, error, info, warn};

use super::barrier::RoundBarrier;
use super::binding::{DEFAULT_PAIRING, SourceBinding};
use super::cancel::CancelContext;
use crate::{
    error::Result,
    metrics::METRICS,
    presenter::Presenter,
    schema::{RecordSequence, SeriesParams, select_all},
    sources::DataSource,
};

/// What a worker fetches each round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feed {
    /// Latest ticker record.
    Latest,
    /// Record series with source-specific request parameters.
    Series(SeriesParams),
}

/// Settings shared by every worker of a run.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub pairing: String,
    pub interval: Duration,
    pub request_budget: Option<Duration>,

    /// Allow-list applied to fetched records. Empty keeps every field.
    pub fields: Vec<String>,
    pub timestamp_field: String,
    pub feed: Feed,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            pairing: DEFAULT_PAIRING.to_string(),
            interval: Duration::from_secs(5),
            request_budget: None,
            fields: Vec::new(),
            timestamp_field: "timestamp".to_string(),
            feed: Feed::Latest,
        }
    }
}

/// Lifecycle of a polling worker.
///
/// `Idle -> Polling -> Publishing -> Waiting -> Polling ... -> Terminated`
///
/// An invalid binding goes from `Idle` straight to `Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Polling,
    Publishing,
    Waiting,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Stopped by the cancellation context.
    Cancelled,
    /// The asset could not be bound to the source.
    InvalidBinding,
}

/// What a worker did before it terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub id: usize,
    pub asset: String,
    /// Rounds that produced data (published or emitted).
    pub rounds: u64,
    /// Rounds lost to fetch failures.
    pub failed_rounds: u64,
    pub exit: ExitReason,
}

/// One asset's polling loop.
///
/// Owns its binding for the whole run. Cancellation is checked at the top
/// of every round and while waiting; a fetch in flight is abandoned when
/// the workers are told to stop.
///
/// Failures stay local: a bad binding or a failed fetch never touches
/// sibling workers, and in synchronized mode the slot is still marked
/// ready so the round can close.
pub struct PollingWorker {
    id: usize,
    asset: String,
    source: Arc<dyn DataSource>,
    options: Arc<WorkerOptions>,
    cancel: CancelContext,
    state: WorkerState,
    rounds: u64,
    failed_rounds: u64,
}

impl PollingWorker {
    pub fn new(
        id: usize,
        asset: String,
        source: Arc<dyn DataSource>,
        options: Arc<WorkerOptions>,
        cancel: CancelContext,
    ) -> Self {
        Self {
            id,
            asset,
            source,
            options,
            cancel,
            state: WorkerState::Idle,
            rounds: 0,
            failed_rounds: 0,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    fn transition(&mut self, next: WorkerState) {
        if self.state != next {
            debug!("worker {} [{}]: {:?} -> {:?}", self.id, self.asset, self.state, next);
            self.state = next;
        }
    }

    fn bind(&self) -> Result<SourceBinding> {
        SourceBinding::new(
            &self.asset,
            &self.options.pairing,
            self.options.request_budget,
            self.source.clone(),
        )
    }

    fn report(&mut self, exit: ExitReason) -> WorkerReport {
        self.transition(WorkerState::Terminated);
        WorkerReport {
            id: self.id,
            asset: self.asset.clone(),
            rounds: self.rounds,
            failed_rounds: self.failed_rounds,
            exit,
        }
    }

    fn invalid_binding(&mut self, presenter: &dyn Presenter, err: &dyn std::fmt::Display) -> WorkerReport {
        error!("worker {} [{}]: {}", self.id, self.asset, err);
        METRICS.binding_errors.fetch_add(1, Ordering::Relaxed);
        presenter.notice(&format!("{}: invalid coin name.", self.asset));
        self.report(ExitReason::InvalidBinding)
    }

    /// Fetches one round. `None` means the workers were told to stop
    /// while the request was in flight.
    async fn fetch(&self, binding: &SourceBinding) -> Option<Result<RecordSequence>> {
        let request = async {
            match &self.options.feed {
                Feed::Latest => binding
                    .fetch_latest()
                    .await
                    .map(|r| if r.is_empty() { vec![] } else { vec![r] }),
                Feed::Series(params) => binding.fetch_series(params).await,
            }
        };

        tokio::select! {
            result = request => Some(result),
            _ = self.cancel.stopped() => None,
        }
    }

    /// Streaming mode: emit whenever the newest timestamp changes.
    ///
    /// Latest records go to `present_record`, series to `present_series`.
    pub async fn run_streaming(mut self, presenter: Arc<dyn Presenter>) -> WorkerReport {
        let binding = match self.bind() {
            Ok(binding) => binding,
            Err(e) => return self.invalid_binding(presenter.as_ref(), &e),
        };
        let label = binding.label();

        METRICS.workers_active.fetch_add(1, Ordering::Relaxed);
        let mut last_stamp: Option<String> = None;

        while !self.cancel.workers_should_stop() {
            self.transition(WorkerState::Polling);

            let outcome = match self.fetch(&binding).await {
                None => break,
                Some(outcome) => outcome,
            };

            match outcome {
                Ok(records) if !records.is_empty() => {
                    let stamp = records
                        .last()
                        .and_then(|r| r.get(&self.options.timestamp_field))
                        .map(str::to_string);

                    if stamp.is_none() || stamp != last_stamp {
                        self.transition(WorkerState::Publishing);
                        let records = select_all(&records, &self.options.fields);
                        match self.options.feed {
                            Feed::Latest => presenter.present_record(&label, &records[0]),
                            Feed::Series(_) => presenter.present_series(&label, &records),
                        }
                        last_stamp = stamp;
                        self.rounds += 1;
                    }
                }
                Ok(_) => debug!("worker {} [{}]: empty response", self.id, self.asset),
                Err(e) => {
                    warn!("worker {} [{}]: {}", self.id, self.asset, e);
                    self.failed_rounds += 1;
                }
            }

            self.transition(WorkerState::Waiting);
            if !self.cancel.sleep(self.options.interval).await {
                break;
            }
        }

        METRICS.workers_active.fetch_sub(1, Ordering::Relaxed);
        info!("{}: worker terminated", self.asset);
        self.report(ExitReason::Cancelled)
    }

    /// Synchronized mode: publish each round into slot `self.id`.
    ///
    /// The worker never waits for the round to close; it only waits for
    /// its own slot to be drained before fetching the next round.
    pub async fn run_synchronized(
        mut self,
        barrier: Arc<RoundBarrier>,
        presenter: Arc<dyn Presenter>,
    ) -> WorkerReport {
        let binding = match self.bind() {
            Ok(binding) => binding,
            Err(e) => {
                barrier.retire(self.id);
                return self.invalid_binding(presenter.as_ref(), &e);
            }
        };

        METRICS.workers_active.fetch_add(1, Ordering::Relaxed);

        loop {
            self.transition(WorkerState::Waiting);
            if !barrier.wait_slot_open(self.id, &self.cancel).await {
                break;
            }

            self.transition(WorkerState::Polling);
            let outcome = match self.fetch(&binding).await {
                None => break,
                Some(outcome) => outcome,
            };

            self.transition(WorkerState::Publishing);
            match outcome {
                Ok(records) if records.is_empty() => {
                    warn!("worker {} [{}]: nothing decoded, round marked failed", self.id, self.asset);
                    barrier.fail_round(self.id);
                    self.failed_rounds += 1;
                }
                Ok(records) => {
                    if barrier.publish(self.id, select_all(&records, &self.options.fields)) {
                        self.rounds += 1;
                    } else {
                        warn!("worker {} [{}]: slot still holds an undrained round", self.id, self.asset);
                    }
                }
                Err(e) => {
                    warn!("worker {} [{}]: {}, round marked failed", self.id, self.asset, e);
                    barrier.fail_round(self.id);
                    self.failed_rounds += 1;
                }
            }

            self.transition(WorkerState::Waiting);
            if !self.cancel.sleep(self.options.interval).await {
                break;
            }
        }

        METRICS.workers_active.fetch_sub(1, Ordering::Relaxed);
        info!("{}: worker terminated", self.asset);
        self.report(ExitReason::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::aggregator::Snapshot;
    use crate::collector::barrier::RoundOutcome;
    use crate::decoder::RecordListDecoder;
    use crate::error::CollectorError;
    use crate::schema::FlatRecord;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicU64;

    /// Each fetch returns a record stamped with a call counter; calls listed
    /// in `fail_on` fail with a transport error instead.
    struct CountingSource {
        identifiers: HashSet<String>,
        calls: AtomicU64,
        fail_on: Vec<u64>,
        garbled_on: Vec<u64>,
        repeat_stamp: bool,
    }

    impl CountingSource {
        fn new(ids: &[&str]) -> Self {
            Self {
                identifiers: ids.iter().map(|s| s.to_string()).collect(),
                calls: AtomicU64::new(0),
                fail_on: vec![],
                garbled_on: vec![],
                repeat_stamp: false,
            }
        }
    }

    #[async_trait::async_trait]
    impl DataSource for CountingSource {
        fn name(&self) -> &'static str {
            "counting"
        }
        async fn fetch_latest(&self, identifier: &str) -> Result<FlatRecord> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on.contains(&n) {
                return Err(CollectorError::transport(identifier, "boom"));
            }
            let stamp = if self.repeat_stamp { 0 } else { n };
            Ok([("timestamp", stamp.to_string()), ("last", "1".to_string())].into_iter().collect())
        }
        async fn fetch_series(&self, identifier: &str, _: &SeriesParams) -> Result<RecordSequence> {
            if self.garbled_on.contains(&self.calls.load(Ordering::SeqCst)) {
                self.calls.fetch_add(1, Ordering::SeqCst);
                return Ok(RecordListDecoder::decode("<html>502 Bad Gateway</html>"));
            }
            Ok(vec![self.fetch_latest(identifier).await?; 2])
        }
        fn compose_pair_identifier(&self, symbol: &str, pairing: &str) -> String {
            format!("{}{}", symbol.to_lowercase(), pairing.to_lowercase())
        }
        fn known_identifiers(&self) -> &HashSet<String> {
            &self.identifiers
        }
        fn set_request_budget(&self, _: Duration) {}
        fn request_budget(&self) -> Duration {
            Duration::from_secs(1)
        }
    }

    #[derive(Default)]
    struct Recorder {
        lines: Mutex<Vec<String>>,
    }

    impl Presenter for Recorder {
        fn present_record(&self, label: &str, record: &FlatRecord) {
            self.lines.lock().unwrap().push(format!("{label}:{}", record.len()));
        }
        fn present_series(&self, label: &str, records: &[FlatRecord]) {
            self.lines.lock().unwrap().push(format!("{label}:series:{}", records.len()));
        }
        fn present_snapshot(&self, _: &Snapshot) -> Result<()> {
            Ok(())
        }
        fn notice(&self, message: &str) {
            self.lines.lock().unwrap().push(message.to_string());
        }
    }

    fn options(feed: Feed) -> Arc<WorkerOptions> {
        Arc::new(WorkerOptions {
            interval: Duration::from_millis(10),
            feed,
            ..WorkerOptions::default()
        })
    }

    #[tokio::test]
    async fn invalid_binding_retires_the_slot_and_terminates() {
        let barrier = Arc::new(RoundBarrier::new(1));
        let recorder = Arc::new(Recorder::default());
        let worker = PollingWorker::new(
            0,
            "NOPE".into(),
            Arc::new(CountingSource::new(&["btcusd"])),
            options(Feed::Latest),
            CancelContext::new(),
        );

        let report = worker.run_synchronized(barrier.clone(), recorder.clone()).await;

        assert_eq!(report.exit, ExitReason::InvalidBinding);
        let slot = barrier.slot(0).unwrap();
        assert!(slot.ready && slot.failed && slot.retired);
        assert_eq!(recorder.lines.lock().unwrap().as_slice(), ["NOPE: invalid coin name."]);
    }

    #[tokio::test]
    async fn synchronized_worker_waits_for_drain_between_rounds() {
        let barrier = Arc::new(RoundBarrier::new(1));
        let cancel = CancelContext::new();
        let source = Arc::new(CountingSource::new(&["btcusd"]));
        let worker = PollingWorker::new(0, "BTC".into(), source.clone(), options(Feed::Latest), cancel.clone());

        let handle = tokio::spawn(worker.run_synchronized(barrier.clone(), Arc::new(Recorder::default())));

        assert_eq!(barrier.wait_round(&cancel).await, RoundOutcome::Complete);
        // several intervals pass, but the undrained slot blocks the next fetch
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        let first = barrier.drain();
        assert_eq!(first[0].payload[0].get("timestamp"), Some("0"));

        assert_eq!(barrier.wait_round(&cancel).await, RoundOutcome::Complete);
        let second = barrier.drain();
        assert_eq!(second[0].payload[0].get("timestamp"), Some("1"));

        cancel.cancel();
        let report = tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
        assert_eq!(report.exit, ExitReason::Cancelled);
        assert_eq!(report.rounds, 2);
    }

    #[tokio::test]
    async fn fetch_failure_marks_only_that_round_failed() {
        let barrier = Arc::new(RoundBarrier::new(1));
        let cancel = CancelContext::new();
        let mut source = CountingSource::new(&["btcusd"]);
        source.fail_on = vec![0];
        let worker = PollingWorker::new(0, "BTC".into(), Arc::new(source), options(Feed::Latest), cancel.clone());

        let handle = tokio::spawn(worker.run_synchronized(barrier.clone(), Arc::new(Recorder::default())));

        barrier.wait_round(&cancel).await;
        let first = barrier.drain();
        assert!(first[0].failed && !first[0].retired);

        barrier.wait_round(&cancel).await;
        let second = barrier.drain();
        assert!(!second[0].failed);
        assert_eq!(second[0].payload.len(), 1);

        cancel.cancel();
        let report = handle.await.unwrap();
        assert_eq!(report.failed_rounds, 1);
    }

    #[tokio::test]
    async fn undecodable_body_fails_the_round_instead_of_publishing_nothing() {
        let barrier = Arc::new(RoundBarrier::new(1));
        let cancel = CancelContext::new();
        let mut source = CountingSource::new(&["btcusd"]);
        source.garbled_on = vec![0];
        let worker = PollingWorker::new(
            0,
            "BTC".into(),
            Arc::new(source),
            options(Feed::Series(SeriesParams::new())),
            cancel.clone(),
        );

        let handle = tokio::spawn(worker.run_synchronized(barrier.clone(), Arc::new(Recorder::default())));

        barrier.wait_round(&cancel).await;
        let first = barrier.drain();
        assert!(first[0].failed && !first[0].retired);
        assert!(first[0].payload.is_empty());

        barrier.wait_round(&cancel).await;
        let second = barrier.drain();
        assert!(!second[0].failed);
        assert_eq!(second[0].payload.len(), 2);

        cancel.cancel();
        let report = handle.await.unwrap();
        assert_eq!(report.failed_rounds, 1);
        assert_eq!(report.rounds, 1);
    }

    #[tokio::test]
    async fn streaming_emits_only_on_new_timestamps() {
        let cancel = CancelContext::new();
        let recorder = Arc::new(Recorder::default());
        let mut source = CountingSource::new(&["btcusd"]);
        source.repeat_stamp = true;

        let worker = PollingWorker::new(0, "BTC".into(), Arc::new(source), options(Feed::Latest), cancel.clone());
        let handle = tokio::spawn(worker.run_streaming(recorder.clone()));

        tokio::time::sleep(Duration::from_millis(80)).await;
        cancel.cancel();
        let report = tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();

        assert_eq!(report.rounds, 1);
        assert_eq!(recorder.lines.lock().unwrap().as_slice(), ["BTC/USD:2"]);
    }

    #[tokio::test]
    async fn streaming_series_uses_present_series() {
        let cancel = CancelContext::new();
        let recorder = Arc::new(Recorder::default());
        let worker = PollingWorker::new(
            0,
            "BTC".into(),
            Arc::new(CountingSource::new(&["btcusd"])),
            options(Feed::Series(SeriesParams::new())),
            cancel.clone(),
        );

        let handle = tokio::spawn(worker.run_streaming(recorder.clone()));
        while recorder.lines.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(recorder.lines.lock().unwrap()[0], "BTC/USD:series:2");
    }

    #[test]
    fn new_worker_starts_idle() {
        let worker = PollingWorker::new(
            3,
            "BTC".into(),
            Arc::new(CountingSource::new(&[])),
            options(Feed::Latest),
            CancelContext::new(),
        );
        assert_eq!(worker.state(), WorkerState::Idle);
    }
}
