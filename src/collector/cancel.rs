use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Cooperative cancellation shared by every participant of one run.
///
/// Three one-way scopes, each a `CancellationToken`:
/// - `all`:   host shutdown request (Ctrl+C)
/// - `round`: no new rounds may start; workers wind down and the
///            aggregator stops waiting. A child of `all`, so a host
///            shutdown stops rounds as well.
/// - `outer`: the aggregator's outer loop ends after the current drain
///
/// Tokens are never reset. Tasks parked in `sleep` or `stopped` wake as
/// soon as the round scope is cancelled.
///
/// Built once per run and cloned into each worker and the aggregator.
#[derive(Clone)]
pub struct CancelContext {
    all: CancellationToken,
    round: CancellationToken,
    outer: CancellationToken,
}

impl Default for CancelContext {
    fn default() -> Self {
        let all = CancellationToken::new();
        let round = all.child_token();
        Self {
            all,
            round,
            outer: CancellationToken::new(),
        }
    }
}

impl CancelContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host-level shutdown; stops the current round too.
    pub fn cancel(&self) {
        self.all.cancel();
    }

    pub fn stop_round(&self) {
        self.round.cancel();
    }

    pub fn stop_outer(&self) {
        self.outer.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.all.is_cancelled()
    }

    pub fn is_round_stopped(&self) -> bool {
        self.round.is_cancelled()
    }

    pub fn is_outer_stopped(&self) -> bool {
        self.outer.is_cancelled()
    }

    /// Workers stop on either a host shutdown or a round stop.
    pub fn workers_should_stop(&self) -> bool {
        self.is_round_stopped()
    }

    /// Sleeps for `period` unless the workers are told to stop first.
    ///
    /// Returns `true` if the full period elapsed, `false` on cancellation.
    pub async fn sleep(&self, period: Duration) -> bool {
        tokio::select! {
            () = self.round.cancelled() => false,
            () = tokio::time::sleep(period) => !self.workers_should_stop(),
        }
    }

    /// Resolves once the workers are told to stop.
    pub async fn stopped(&self) {
        self.round.cancelled().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[test]
    fn flags_are_independent_and_one_way() {
        let cancel = CancelContext::new();
        assert!(!cancel.workers_should_stop());

        cancel.stop_outer();
        assert!(cancel.is_outer_stopped());
        assert!(!cancel.workers_should_stop());

        cancel.stop_round();
        assert!(cancel.workers_should_stop());
        assert!(!cancel.is_cancelled());

        cancel.cancel();
        assert!(cancel.is_cancelled());
        assert!(cancel.is_round_stopped());
    }

    #[test]
    fn host_shutdown_stops_the_round_scope() {
        let cancel = CancelContext::new();
        let clone = cancel.clone();

        clone.cancel();
        assert!(cancel.workers_should_stop());
        assert!(!cancel.is_outer_stopped());
    }

    #[tokio::test]
    async fn sleep_completes_when_nobody_cancels() {
        let cancel = CancelContext::new();
        assert!(cancel.sleep(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn cancel_interrupts_a_long_sleep() {
        let cancel = CancelContext::new();
        let sleeper = {
            let cancel = cancel.clone();
            tokio::spawn(async move { cancel.sleep(Duration::from_secs(60)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let finished = tokio::time::timeout(Duration::from_secs(2), sleeper)
            .await
            .expect("sleep was not interrupted")
            .unwrap();
        assert!(!finished);
    }

    #[tokio::test]
    async fn outer_stop_does_not_cut_worker_sleep_short() {
        let cancel = CancelContext::new();
        let started = Instant::now();

        let sleeper = {
            let cancel = cancel.clone();
            tokio::spawn(async move { cancel.sleep(Duration::from_millis(100)).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.stop_outer();

        assert!(sleeper.await.unwrap());
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn stopped_resolves_after_round_stop() {
        let cancel = CancelContext::new();
        let waiter = {
            let cancel = cancel.clone();
            tokio::spawn(async move { cancel.stopped().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.stop_round();

        tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("stopped() never resolved")
            .unwrap();
    }
}
