use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::registry::OperationRegistry;
use crate::core::OperationState;

/// Periodic sweep that evicts operations idle past their timeout.
///
/// Evicted operations are cancelled (if still live) and closed, but stay in
/// the registry until the following sweep so a late poller observes the
/// terminal state the reaper produced rather than an unknown handle.
pub struct IdleReaper;

impl IdleReaper {
    pub fn spawn(registry: Arc<OperationRegistry>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tick.tick().await;
                let evicted = Self::sweep(&registry);
                if evicted > 0 {
                    debug!(evicted, "idle reaper sweep complete");
                }
            }
        })
    }

    /// One sweep pass; returns the number of operations evicted. A race
    /// with a client-driven close is safe: close is idempotent.
    pub fn sweep(registry: &OperationRegistry) -> usize {
        let now = Utc::now().timestamp_millis();
        let mut evicted = 0;
        for op in registry.live() {
            if op.state() == OperationState::Closed {
                // Closed by a previous sweep or by the owning session after
                // eviction; drop the entry now.
                registry.remove(op.id());
                continue;
            }
            if !op.is_timed_out(now) {
                continue;
            }
            warn!(operation_id = %op.id(), "operation is timed out and will be closed");
            if !op.is_terminal()
                && let Err(err) = op.cancel(OperationState::Canceled)
            {
                warn!(operation_id = %op.id(), error = %err, "failed to cancel timed-out operation");
            }
            if let Err(err) = op.close() {
                warn!(operation_id = %op.id(), error = %err, "failed to close timed-out operation");
            }
            evicted += 1;
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::OperationType;
    use crate::operation::metrics::OperationMetrics;
    use crate::operation::operation::Operation;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn idle_operation(timeout_ms: i64) -> Arc<Operation> {
        Operation::create(
            Uuid::new_v4(),
            OperationType::ExecuteStatement,
            HashMap::new(),
            timeout_ms,
            Arc::new(OperationMetrics::new()),
        )
    }

    #[test]
    fn test_sweep_evicts_idle_terminal_operation() {
        let registry = OperationRegistry::new();
        // Force mode so the fresh timestamp still counts as idle.
        let op = idle_operation(-1);
        registry.add(Arc::clone(&op));

        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(IdleReaper::sweep(&registry), 1);
        assert_eq!(op.state(), OperationState::Closed);
        // Entry survives one sweep so a late poller sees CLOSED, then goes.
        assert_eq!(registry.len(), 1);
        assert_eq!(IdleReaper::sweep(&registry), 0);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_sweep_skips_live_operations() {
        let registry = OperationRegistry::new();
        let op = idle_operation(1);
        registry.add(Arc::clone(&op));

        std::thread::sleep(Duration::from_millis(5));
        // Non-terminal with a positive timeout: not evictable.
        assert_eq!(IdleReaper::sweep(&registry), 0);
        assert_eq!(op.state(), OperationState::Initialized);
    }

    #[test]
    fn test_sweep_tolerates_client_close_race() {
        let registry = OperationRegistry::new();
        let op = idle_operation(-1);
        registry.add(Arc::clone(&op));
        op.close().unwrap();

        std::thread::sleep(Duration::from_millis(5));
        // Already closed by the "client"; the sweep must not error.
        assert_eq!(IdleReaper::sweep(&registry), 0);
        assert!(registry.is_empty());
    }
}
