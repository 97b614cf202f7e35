use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info_span, warn};
use uuid::Uuid;

use super::background::BackgroundExecutor;
use super::body::{BodyContext, BodyOutcome, StatementBody};
use super::log_sink::LogSink;
use super::metrics::OperationMetrics;
use crate::core::{
    FetchOrientation, OperationHandle, OperationState, OperationType, ProtocolVersion, QueryError,
    ResultSchema, Row,
};

pub const DEFAULT_FETCH_MAX_ROWS: usize = 100;

/// Snapshot of an operation's externally visible status.
#[derive(Debug, Clone)]
pub struct OperationStatus {
    pub state: OperationState,
    pub task_detail: Option<String>,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub terminal_error: Option<QueryError>,
}

#[derive(Serialize)]
struct TaskDetail<'a> {
    state: &'a str,
    elapsed_ms: i64,
}

/// Mutable half of an operation. Every field here is read and written only
/// under the operation lock, so state and timing always move as a pair.
#[derive(Debug)]
struct OperationInner {
    state: OperationState,
    handle: OperationHandle,
    started_at: Option<i64>,
    completed_at: Option<i64>,
    last_access_at: i64,
    entered_state_at: Instant,
    terminal_error: Option<QueryError>,
    background: Option<JoinHandle<()>>,
    log: Option<Arc<LogSink>>,
    log_cursor: usize,
    schema: Option<ResultSchema>,
    rows: Option<Vec<Row>>,
    row_cursor: usize,
}

/// One unit of asynchronous server-side work.
///
/// Owned by the registry for its lifetime. The request handler, the
/// background task and the idle reaper all mutate it concurrently; the
/// inner mutex keeps their updates consistent. State changes are broadcast
/// on a watch channel so status requests can long-poll without spinning.
#[derive(Debug)]
pub struct Operation {
    session_id: Uuid,
    conf_overlay: HashMap<String, String>,
    timeout_ms: i64,
    created_at: i64,
    inner: Mutex<OperationInner>,
    cancel_tx: watch::Sender<bool>,
    state_tx: watch::Sender<OperationState>,
    metrics: Arc<OperationMetrics>,
}

impl Operation {
    /// Creates an operation in `Initialized` with a fresh handle.
    ///
    /// `timeout_ms` follows the idle-timeout convention: 0 never times out,
    /// a positive value evicts terminal operations idle past it, a negative
    /// value (force mode) evicts regardless of state.
    #[must_use]
    pub fn create(
        session_id: Uuid,
        operation_type: OperationType,
        conf_overlay: HashMap<String, String>,
        timeout_ms: i64,
        metrics: Arc<OperationMetrics>,
    ) -> Arc<Self> {
        let handle = OperationHandle::new(operation_type, ProtocolVersion::CURRENT);
        let now = Utc::now().timestamp_millis();
        let (cancel_tx, _) = watch::channel(false);
        let (state_tx, _) = watch::channel(OperationState::Initialized);
        Arc::new(Self {
            session_id,
            conf_overlay,
            timeout_ms,
            created_at: now,
            inner: Mutex::new(OperationInner {
                state: OperationState::Initialized,
                handle,
                started_at: None,
                completed_at: None,
                last_access_at: now,
                entered_state_at: Instant::now(),
                terminal_error: None,
                background: None,
                log: None,
                log_cursor: 0,
                schema: None,
                rows: None,
                row_cursor: 0,
            }),
            cancel_tx,
            state_tx,
            metrics,
        })
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.lock().handle.id
    }

    #[must_use]
    pub const fn session_id(&self) -> Uuid {
        self.session_id
    }

    #[must_use]
    pub fn handle(&self) -> OperationHandle {
        self.lock().handle.clone()
    }

    #[must_use]
    pub fn state(&self) -> OperationState {
        self.lock().state
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    #[must_use]
    pub const fn created_at(&self) -> i64 {
        self.created_at
    }

    #[must_use]
    pub fn last_access_at(&self) -> i64 {
        self.lock().last_access_at
    }

    /// Watch channel mirroring the operation state, used for long-polling.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<OperationState> {
        self.state_tx.subscribe()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, OperationInner> {
        self.inner.lock().expect("operation lock poisoned")
    }

    /// Applies a validated transition plus its invariant-preserving side
    /// effects: timing fields, last-access refresh, metrics, broadcast.
    fn transition_locked(
        &self,
        inner: &mut OperationInner,
        target: OperationState,
    ) -> Result<(), QueryError> {
        inner.state.validate_transition(target)?;
        let prev = inner.state;
        let now = Utc::now().timestamp_millis();
        inner.state = target;
        match target {
            OperationState::Running => inner.started_at = Some(now),
            OperationState::Finished
            | OperationState::Canceled
            | OperationState::TimedOut
            | OperationState::Error => inner.completed_at = Some(now),
            _ => {}
        }
        inner.last_access_at = now;
        self.metrics
            .record_transition(prev, target, inner.entered_state_at.elapsed());
        inner.entered_state_at = Instant::now();
        self.state_tx.send_replace(target);
        Ok(())
    }

    pub fn set_state(&self, target: OperationState) -> Result<OperationState, QueryError> {
        let mut inner = self.lock();
        self.transition_locked(&mut inner, target)?;
        Ok(inner.state)
    }

    /// Records the result shape once compilation has determined it. The
    /// handle's `has_result_set` flag is flipped here, exactly once.
    pub fn mark_result_schema(&self, schema: ResultSchema) {
        let mut inner = self.lock();
        if inner.schema.is_none() {
            inner.handle.has_result_set = true;
            inner.schema = Some(schema);
        }
    }

    /// Opens the log sink and binds the correlation ids for the executing
    /// task.
    fn before_run(&self) -> Arc<LogSink> {
        let mut inner = self.lock();
        if let Some(log) = &inner.log {
            return Arc::clone(log);
        }
        let log = Arc::new(LogSink::new());
        inner.log = Some(Arc::clone(&log));
        log
    }

    /// Runs after the body regardless of outcome; the span and the sink
    /// writer reference are released when the context drops.
    fn after_run(&self) {
        debug!("operation body detached");
    }

    /// Runs the statement body: async-eligible bodies are handed to the
    /// background pool after the `Pending` transition and this call returns
    /// immediately; synchronous bodies complete before it returns.
    ///
    /// `run_async` is the request-level flag; it can force a body to run
    /// synchronously but never the reverse.
    pub async fn run(
        self: &Arc<Self>,
        body: Box<dyn StatementBody>,
        pool: &BackgroundExecutor,
        run_async: bool,
    ) -> Result<(), QueryError> {
        let log = self.before_run();
        if let Some(schema) = body.result_schema() {
            self.mark_result_schema(schema);
        }
        self.set_state(OperationState::Pending)?;

        let ctx = BodyContext::new(
            self.id(),
            self.session_id,
            self.conf_overlay.clone(),
            log,
            self.cancel_tx.subscribe(),
        );
        let span = info_span!(
            "operation",
            operation_id = %ctx.operation_id,
            session_id = %ctx.session_id,
        );

        if run_async && body.should_run_async() {
            let op = Arc::clone(self);
            let task = pool.spawn(
                async move {
                    if op.set_state(OperationState::Running).is_err() {
                        // Cancelled or closed while queued.
                        op.after_run();
                        return;
                    }
                    let result = body.run(ctx).await;
                    op.finish_body(result);
                    op.after_run();
                }
                .instrument(span),
            );
            self.lock().background = Some(task);
        } else {
            self.set_state(OperationState::Running)?;
            let result = async { body.run(ctx).await }.instrument(span).await;
            self.finish_body(result);
            self.after_run();
        }
        Ok(())
    }

    /// Captures the body outcome as the operation's terminal state. Never
    /// propagates: a failure becomes the terminal error surfaced through
    /// status reporting.
    fn finish_body(&self, result: Result<BodyOutcome, QueryError>) {
        let mut inner = self.lock();
        if inner.state != OperationState::Running {
            debug!(state = %inner.state, "body completed after operation left RUNNING");
            return;
        }
        let target = match result {
            Ok(outcome) => {
                if let Some(schema) = outcome.schema
                    && inner.schema.is_none()
                {
                    inner.handle.has_result_set = true;
                    inner.schema = Some(schema);
                }
                inner.rows = Some(outcome.rows);
                OperationState::Finished
            }
            Err(err) => {
                inner.terminal_error = Some(err);
                OperationState::Error
            }
        };
        if let Err(err) = self.transition_locked(&mut inner, target) {
            warn!(error = %err, "failed to record body completion");
        }
    }

    /// Requests cooperative cancellation and moves to `target` (normally
    /// `Canceled`; the query-timeout watchdog passes `TimedOut`).
    ///
    /// Idempotent: a cancel on an already-terminal operation is a no-op and
    /// leaves `completed_at` untouched.
    pub fn cancel(&self, target: OperationState) -> Result<(), QueryError> {
        let mut inner = self.lock();
        if inner.state.is_terminal() {
            debug!(state = %inner.state, "cancel on terminal operation is a no-op");
            return Ok(());
        }
        self.cancel_tx.send_replace(true);
        self.transition_locked(&mut inner, target)
    }

    /// Closes the operation: exactly one caller tears down the log sink and
    /// detaches the background task; concurrent closers observe a no-op.
    pub fn close(&self) -> Result<(), QueryError> {
        let (log, background) = {
            let mut inner = self.lock();
            if inner.state == OperationState::Closed {
                return Ok(());
            }
            if !inner.state.is_terminal() {
                self.cancel_tx.send_replace(true);
            }
            self.transition_locked(&mut inner, OperationState::Closed)?;
            (inner.log.take(), inner.background.take())
        };
        if let Some(task) = background {
            // Cooperative stop was already signalled; do not wait past the
            // grace of an abort.
            task.abort();
        }
        if let Some(log) = log {
            log.close();
        }
        Ok(())
    }

    /// Idle-timeout check against the configured `timeout_ms` convention.
    #[must_use]
    pub fn is_timed_out(&self, now_ms: i64) -> bool {
        if self.timeout_ms == 0 {
            return false;
        }
        let inner = self.lock();
        if self.timeout_ms > 0 {
            // Only terminal operations are evicted in normal mode.
            inner.state.is_terminal() && inner.last_access_at + self.timeout_ms <= now_ms
        } else {
            inner.last_access_at + self.timeout_ms.abs() <= now_ms
        }
    }

    /// Always returnable: task-detail production failure is swallowed.
    #[must_use]
    pub fn status(&self) -> OperationStatus {
        let mut inner = self.lock();
        inner.last_access_at = Utc::now().timestamp_millis();
        let detail = TaskDetail {
            state: match inner.state {
                OperationState::Initialized => "INITIALIZED",
                OperationState::Pending => "PENDING",
                OperationState::Running => "RUNNING",
                OperationState::Finished => "FINISHED",
                OperationState::Canceled => "CANCELED",
                OperationState::TimedOut => "TIMEDOUT",
                OperationState::Closed => "CLOSED",
                OperationState::Error => "ERROR",
                OperationState::Unknown => "UNKNOWN",
            },
            elapsed_ms: Utc::now().timestamp_millis() - self.created_at,
        };
        let task_detail = match serde_json::to_string(&detail) {
            Ok(json) => Some(json),
            Err(err) => {
                warn!(error = %err, "error getting task status");
                None
            }
        };
        OperationStatus {
            state: inner.state,
            task_detail,
            started_at: inner.started_at,
            completed_at: inner.completed_at,
            terminal_error: inner.terminal_error.clone(),
        }
    }

    fn supported_orientations(operation_type: OperationType) -> &'static [FetchOrientation] {
        match operation_type {
            OperationType::ExecuteStatement => {
                &[FetchOrientation::FetchNext, FetchOrientation::FetchFirst]
            }
            // Metadata result sets are forward-only.
            _ => &[FetchOrientation::FetchNext],
        }
    }

    /// Returns the next block of result rows. Valid only once the operation
    /// reached `Finished`.
    pub fn next_row_set(
        &self,
        orientation: FetchOrientation,
        max_rows: usize,
    ) -> Result<(ResultSchema, Vec<Row>), QueryError> {
        let mut inner = self.lock();
        inner.last_access_at = Utc::now().timestamp_millis();
        if inner.state != OperationState::Finished {
            return Err(QueryError::InvalidState(format!(
                "expected state FINISHED, but found {}",
                inner.state
            )));
        }
        if !Self::supported_orientations(inner.handle.operation_type).contains(&orientation) {
            return Err(QueryError::UnsupportedOrientation(orientation.to_string()));
        }
        let Some(schema) = inner.schema.clone() else {
            return Err(QueryError::InvalidState(
                "operation has no result set".to_string(),
            ));
        };
        if orientation == FetchOrientation::FetchFirst {
            inner.row_cursor = 0;
        }
        let rows = inner.rows.as_ref().map_or_else(Vec::new, |rows| {
            let start = inner.row_cursor.min(rows.len());
            let end = start.saturating_add(max_rows).min(rows.len());
            rows[start..end].to_vec()
        });
        inner.row_cursor += rows.len();
        Ok((schema, rows))
    }

    /// Reads captured log lines; cursor advancement is serialized under the
    /// operation lock so concurrent fetches never duplicate or skip lines.
    pub fn fetch_log(
        &self,
        orientation: FetchOrientation,
        max_lines: usize,
    ) -> Result<Vec<String>, QueryError> {
        let mut inner = self.lock();
        if inner.state == OperationState::Closed {
            return Err(QueryError::ClosedOrCancelled("fetch_log".to_string()));
        }
        inner.last_access_at = Utc::now().timestamp_millis();
        let Some(log) = inner.log.as_ref().map(Arc::clone) else {
            return Ok(Vec::new());
        };
        let offset = match orientation {
            FetchOrientation::FetchNext => inner.log_cursor,
            FetchOrientation::FetchFirst => 0,
        };
        let (lines, next) = log.read_from(offset, max_lines);
        inner.log_cursor = next;
        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_operation(timeout_ms: i64) -> Arc<Operation> {
        Operation::create(
            Uuid::new_v4(),
            OperationType::ExecuteStatement,
            HashMap::new(),
            timeout_ms,
            Arc::new(OperationMetrics::new()),
        )
    }

    #[test]
    fn test_create_starts_initialized() {
        let op = test_operation(0);
        assert_eq!(op.state(), OperationState::Initialized);
        assert!(!op.handle().has_result_set);
    }

    #[test]
    fn test_illegal_transition_leaves_operation_unchanged() {
        let op = test_operation(0);
        op.set_state(OperationState::Pending).unwrap();
        op.set_state(OperationState::Running).unwrap();
        op.set_state(OperationState::Finished).unwrap();
        let before = op.status();

        let err = op.set_state(OperationState::Running).unwrap_err();
        assert!(matches!(err, QueryError::InvalidTransition { .. }));

        let after = op.status();
        assert_eq!(after.state, OperationState::Finished);
        assert_eq!(after.completed_at, before.completed_at);
    }

    #[test]
    fn test_running_records_started_at() {
        let op = test_operation(0);
        assert!(op.status().started_at.is_none());
        op.set_state(OperationState::Pending).unwrap();
        op.set_state(OperationState::Running).unwrap();
        assert!(op.status().started_at.is_some());
        assert!(op.status().completed_at.is_none());
    }

    #[test]
    fn test_cancel_after_terminal_is_noop() {
        let op = test_operation(0);
        op.set_state(OperationState::Pending).unwrap();
        op.set_state(OperationState::Running).unwrap();
        op.set_state(OperationState::Finished).unwrap();
        let completed = op.status().completed_at;

        op.cancel(OperationState::Canceled).unwrap();
        assert_eq!(op.state(), OperationState::Finished);
        assert_eq!(op.status().completed_at, completed);
    }

    #[test]
    fn test_cancel_signals_cooperative_stop() {
        let op = test_operation(0);
        let cancel_rx = op.cancel_tx.subscribe();
        op.cancel(OperationState::Canceled).unwrap();
        assert!(*cancel_rx.borrow());
        assert_eq!(op.state(), OperationState::Canceled);
    }

    #[test]
    fn test_close_is_idempotent() {
        let op = test_operation(0);
        op.close().unwrap();
        assert_eq!(op.state(), OperationState::Closed);
        op.close().unwrap();
        assert_eq!(op.state(), OperationState::Closed);
    }

    #[test]
    fn test_timeout_zero_never_times_out() {
        let op = test_operation(0);
        op.cancel(OperationState::Canceled).unwrap();
        assert!(!op.is_timed_out(i64::MAX));
    }

    #[test]
    fn test_positive_timeout_requires_terminal_state() {
        let op = test_operation(10);
        let far_future = Utc::now().timestamp_millis() + 1_000_000;
        // Non-terminal: not evictable even when idle.
        assert!(!op.is_timed_out(far_future));
        op.cancel(OperationState::Canceled).unwrap();
        assert!(op.is_timed_out(far_future));
    }

    #[test]
    fn test_force_timeout_evicts_non_terminal() {
        let op = test_operation(-10);
        let far_future = Utc::now().timestamp_millis() + 1_000_000;
        assert_eq!(op.state(), OperationState::Initialized);
        assert!(op.is_timed_out(far_future));
    }

    #[test]
    fn test_result_schema_marked_once() {
        let op = test_operation(0);
        let schema = ResultSchema::new(vec![crate::core::ColumnDesc::new(
            "c1",
            crate::core::DataType::Integer,
        )]);
        op.mark_result_schema(schema.clone());
        assert!(op.handle().has_result_set);
        // A second mark must not replace the recorded schema.
        op.mark_result_schema(ResultSchema::new(vec![]));
        assert_eq!(op.lock().schema.as_ref().unwrap(), &schema);
    }

    #[test]
    fn test_row_fetch_requires_finished() {
        let op = test_operation(0);
        let err = op
            .next_row_set(FetchOrientation::FetchNext, 10)
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidState(_)));
    }

    #[test]
    fn test_status_always_returnable() {
        let op = test_operation(0);
        let status = op.status();
        assert_eq!(status.state, OperationState::Initialized);
        assert!(status.task_detail.is_some());
        assert!(status.terminal_error.is_none());
    }
}
