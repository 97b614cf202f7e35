use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use crate::core::OperationState;

/// Counters of terminal operation outcomes, shared by all operations of a
/// service. Transition durations are emitted as structured events.
#[derive(Debug, Default)]
pub struct OperationMetrics {
    finished: AtomicU64,
    canceled: AtomicU64,
    timed_out: AtomicU64,
    errored: AtomicU64,
    closed: AtomicU64,
}

impl OperationMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one state transition: duration spent in the previous state,
    /// and the terminal outcome counter when the new state is terminal.
    pub fn record_transition(
        &self,
        prev: OperationState,
        next: OperationState,
        spent_in_prev: Duration,
    ) {
        debug!(
            from = %prev,
            to = %next,
            spent_ms = spent_in_prev.as_millis() as u64,
            "operation state transition"
        );
        let counter = match next {
            OperationState::Finished => &self.finished,
            OperationState::Canceled => &self.canceled,
            OperationState::TimedOut => &self.timed_out,
            OperationState::Error => &self.errored,
            OperationState::Closed => &self.closed,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn completed(&self, state: OperationState) -> u64 {
        let counter = match state {
            OperationState::Finished => &self.finished,
            OperationState::Canceled => &self.canceled,
            OperationState::TimedOut => &self.timed_out,
            OperationState::Error => &self.errored,
            OperationState::Closed => &self.closed,
            _ => return 0,
        };
        counter.load(Ordering::Relaxed)
    }
}
