use std::sync::{Mutex, MutexGuard};

use log::debug;
use tokio::sync::Notify;

use super::cancel::CancelContext;
use crate::schema::RecordSequence;

/// Per-worker cell of the current round.
///
/// Written only by its own worker, read only by the aggregator during a
/// drain. `retired` marks a worker that exited for good: its slot stays
/// ready (and failed) across resets so later rounds never wait for it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundSlot {
    pub ready: bool,
    pub failed: bool,
    pub retired: bool,
    pub payload: RecordSequence,
}

/// Why `wait_round` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    /// Every slot is ready; the round can be drained.
    Complete,
    /// The round stop flag was raised before completion.
    Cancelled,
    /// Every worker retired; no round can ever carry data again.
    Exhausted,
}

struct RoundTable {
    slots: Vec<RoundSlot>,
    round: u64,
}

/// Round synchronization point between the workers and the aggregator.
///
/// One mutex guards the slot table; one `Notify` plays the role of the
/// condition variable for both sides:
/// - workers wait on it for their slot to be drained
/// - the aggregator waits on it for all slots to become ready
///
/// The lock is never held across an await. Waiters arm the notification
/// before checking their predicate, so a wake-up between check and park is
/// not lost.
///
/// One instance per run.
pub struct RoundBarrier {
    table: Mutex<RoundTable>,
    changed: Notify,
}

impl RoundBarrier {
    pub fn new(workers: usize) -> Self {
        Self {
            table: Mutex::new(RoundTable {
                slots: vec![RoundSlot::default(); workers],
                round: 0,
            }),
            changed: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RoundTable> {
        // slot writes are single assignments, a panicked holder cannot leave
        // a slot half-written
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of rounds drained so far.
    pub fn round(&self) -> u64 {
        self.lock().round
    }

    pub fn is_ready(&self, id: usize) -> bool {
        self.lock().slots.get(id).is_some_and(|s| s.ready)
    }

    /// Copy of one slot, for inspection.
    pub fn slot(&self, id: usize) -> Option<RoundSlot> {
        self.lock().slots.get(id).cloned()
    }

    /// Publishes a successful round for worker `id`.
    ///
    /// Returns `false` (and writes nothing) when the slot still holds a
    /// round the aggregator has not drained, or when the worker is retired.
    pub fn publish(&self, id: usize, payload: RecordSequence) -> bool {
        let written = {
            let mut table = self.lock();
            match table.slots.get_mut(id) {
                Some(slot) if !slot.ready => {
                    slot.payload = payload;
                    slot.failed = false;
                    slot.ready = true;
                    true
                }
                _ => false,
            }
        };

        if written {
            self.changed.notify_waiters();
        }
        written
    }

    /// Marks this round of worker `id` as failed (ready, no data).
    pub fn fail_round(&self, id: usize) -> bool {
        let written = {
            let mut table = self.lock();
            match table.slots.get_mut(id) {
                Some(slot) if !slot.ready => {
                    slot.payload.clear();
                    slot.failed = true;
                    slot.ready = true;
                    true
                }
                _ => false,
            }
        };

        if written {
            self.changed.notify_waiters();
        }
        written
    }

    /// Permanently marks worker `id` as failed.
    pub fn retire(&self, id: usize) {
        {
            let mut table = self.lock();
            if let Some(slot) = table.slots.get_mut(id) {
                slot.payload.clear();
                slot.failed = true;
                slot.retired = true;
                slot.ready = true;
            }
        }
        self.changed.notify_waiters();
    }

    fn outcome(&self) -> Option<RoundOutcome> {
        let table = self.lock();
        if !table.slots.is_empty() && table.slots.iter().all(|s| s.retired) {
            return Some(RoundOutcome::Exhausted);
        }
        if table.slots.iter().all(|s| s.ready) {
            return Some(RoundOutcome::Complete);
        }
        None
    }

    /// Waits until every slot is ready, or until the round is stopped.
    ///
    /// Cancellation wins ties: once the round stop flag is up, a complete
    /// round is reported as `Cancelled`.
    pub async fn wait_round(&self, cancel: &CancelContext) -> RoundOutcome {
        loop {
            let changed = self.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();

            if cancel.workers_should_stop() {
                return RoundOutcome::Cancelled;
            }
            if let Some(outcome) = self.outcome() {
                return outcome;
            }

            tokio::select! {
                _ = &mut changed => {}
                _ = cancel.stopped() => return RoundOutcome::Cancelled,
            }
        }
    }

    /// Takes every slot's content and opens the next round.
    ///
    /// Readiness is reset under the same lock that reads the payloads, so
    /// no worker can publish round N+1 into a slot before round N is out.
    /// Retired slots stay ready and failed.
    pub fn drain(&self) -> Vec<RoundSlot> {
        let drained = {
            let mut table = self.lock();
            let drained: Vec<RoundSlot> = table
                .slots
                .iter_mut()
                .map(|slot| {
                    let taken = RoundSlot {
                        ready: slot.ready,
                        failed: slot.failed,
                        retired: slot.retired,
                        payload: std::mem::take(&mut slot.payload),
                    };
                    if !slot.retired {
                        slot.ready = false;
                        slot.failed = false;
                    }
                    taken
                })
                .collect();
            table.round += 1;
            debug!("round {} drained", table.round);
            drained
        };

        self.changed.notify_waiters();
        drained
    }

    /// Waits until worker `id` may publish again (its slot was drained).
    ///
    /// Returns `false` if the workers were told to stop first.
    pub async fn wait_slot_open(&self, id: usize, cancel: &CancelContext) -> bool {
        loop {
            let changed = self.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();

            if cancel.workers_should_stop() {
                return false;
            }
            if !self.is_ready(id) {
                return true;
            }

            tokio::select! {
                _ = &mut changed => {}
                _ = cancel.stopped() => return false,
            }
        }
    }
}
