use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::compiler::StatementCompiler;
use super::rpc::{
    CancelOperationRequest, CloseOperationRequest, ExecuteStatementRequest,
    ExecuteStatementResponse, FetchResultsRequest, FetchResultsResponse,
    GetOperationStatusRequest, GetOperationStatusResponse, OperationStatusOnlyResponse, RpcStatus,
};
use crate::config::ServiceConfig;
use crate::core::{FetchType, OperationHandle, OperationState, OperationType, QueryError};
use crate::operation::{BackgroundExecutor, Operation, OperationMetrics, OperationRegistry};

/// Server-side implementation of the five operation RPCs.
///
/// Holds the registry, the bounded background pool and the shared metrics;
/// the statement compiler is the seam to the real planner/executor.
pub struct QueryService {
    config: ServiceConfig,
    registry: Arc<OperationRegistry>,
    pool: BackgroundExecutor,
    compiler: Arc<dyn StatementCompiler>,
    metrics: Arc<OperationMetrics>,
}

impl QueryService {
    #[must_use]
    pub fn new(config: ServiceConfig, compiler: Arc<dyn StatementCompiler>) -> Self {
        let pool = BackgroundExecutor::new(config.worker_pool_size);
        Self {
            config,
            registry: Arc::new(OperationRegistry::new()),
            pool,
            compiler,
            metrics: Arc::new(OperationMetrics::new()),
        }
    }

    #[must_use]
    pub const fn registry(&self) -> &Arc<OperationRegistry> {
        &self.registry
    }

    #[must_use]
    pub const fn metrics(&self) -> &Arc<OperationMetrics> {
        &self.metrics
    }

    #[must_use]
    pub const fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Compiles synchronously, then hands execution to the background pool
    /// and returns the handle immediately (when `run_async` is set).
    pub async fn execute_statement(&self, req: ExecuteStatementRequest) -> ExecuteStatementResponse {
        match self.execute_inner(req).await {
            Ok(handle) => ExecuteStatementResponse {
                status: RpcStatus::success(),
                handle: Some(handle),
            },
            Err(err) => {
                debug!(error = %err, "execute statement failed");
                ExecuteStatementResponse {
                    status: RpcStatus::from_error(&err),
                    handle: None,
                }
            }
        }
    }

    async fn execute_inner(
        &self,
        req: ExecuteStatementRequest,
    ) -> Result<OperationHandle, QueryError> {
        let body = self.compiler.compile(&req.sql)?;
        let op = Operation::create(
            req.session_id,
            OperationType::ExecuteStatement,
            req.conf_overlay,
            self.config.idle_operation_timeout_ms,
            Arc::clone(&self.metrics),
        );
        info!(operation_id = %op.id(), session_id = %req.session_id, "executing statement");
        self.registry.add(Arc::clone(&op));

        if let Err(err) = op.run(body, &self.pool, req.run_async).await {
            self.registry.remove(op.id());
            return Err(err);
        }
        if req.query_timeout_seconds > 0 {
            Self::spawn_query_watchdog(Arc::clone(&op), req.query_timeout_seconds);
        }
        Ok(op.handle())
    }

    /// Cancels the operation with target `TimedOut` once the per-query
    /// timeout elapses without a terminal state.
    fn spawn_query_watchdog(op: Arc<Operation>, timeout_seconds: u64) {
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(timeout_seconds)).await;
            if !op.is_terminal() {
                warn!(operation_id = %op.id(), timeout_seconds, "query timed out");
                if let Err(err) = op.cancel(OperationState::TimedOut) {
                    warn!(operation_id = %op.id(), error = %err, "failed to time out operation");
                }
            }
        });
    }

    /// Status report with server-side long-poll: a non-terminal operation
    /// holds the request open until the state changes or the configured
    /// ceiling elapses.
    pub async fn get_operation_status(
        &self,
        req: GetOperationStatusRequest,
    ) -> GetOperationStatusResponse {
        let Ok(op) = self.registry.get(req.handle.id) else {
            // Closed-and-removed or never-known handles report UNKNOWN.
            return GetOperationStatusResponse {
                status: RpcStatus::success(),
                state: Some(OperationState::Unknown),
                task_detail: None,
                started_at: None,
                completed_at: None,
                error_message: None,
                sql_state: None,
                error_code: None,
                has_result_set: None,
            };
        };

        let mut rx = op.subscribe_state();
        if !rx.borrow().is_terminal() {
            let ceiling = Duration::from_millis(self.config.long_poll_timeout_ms);
            // A ceiling hit is not an error; the current state is reported.
            let _ = tokio::time::timeout(ceiling, async {
                loop {
                    if rx.borrow_and_update().is_terminal() {
                        break;
                    }
                    if rx.changed().await.is_err() {
                        break;
                    }
                }
            })
            .await;
        }

        let status = op.status();
        let (error_message, sql_state, error_code) = status.terminal_error.as_ref().map_or(
            (None, None, None),
            |err| {
                (
                    Some(err.to_string()),
                    err.sql_state().map(str::to_string),
                    err.error_code(),
                )
            },
        );
        GetOperationStatusResponse {
            status: RpcStatus::success(),
            state: Some(status.state),
            task_detail: status.task_detail,
            started_at: status.started_at,
            completed_at: status.completed_at,
            error_message,
            sql_state,
            error_code,
            has_result_set: Some(op.handle().has_result_set),
        }
    }

    pub async fn fetch_results(&self, req: FetchResultsRequest) -> FetchResultsResponse {
        let result = self.registry.get(req.handle.id).and_then(|op| match req.fetch_type {
            FetchType::Rows => {
                let (schema, rows) = op.next_row_set(req.orientation, req.max_rows)?;
                Ok((Some(schema), rows, Vec::new()))
            }
            FetchType::Logs => {
                let lines = op.fetch_log(req.orientation, req.max_rows)?;
                Ok((None, Vec::new(), lines))
            }
        });
        match result {
            Ok((schema, rows, log_lines)) => FetchResultsResponse {
                status: RpcStatus::success(),
                schema,
                rows,
                log_lines,
            },
            Err(err) => FetchResultsResponse {
                status: RpcStatus::from_error(&err),
                schema: None,
                rows: Vec::new(),
                log_lines: Vec::new(),
            },
        }
    }

    /// Idempotent: cancelling an unknown (already reaped) or terminal
    /// operation is a no-op, not an error.
    pub async fn cancel_operation(&self, req: CancelOperationRequest) -> OperationStatusOnlyResponse {
        let status = match self.registry.get(req.handle.id) {
            Ok(op) => match op.cancel(OperationState::Canceled) {
                Ok(()) => RpcStatus::success(),
                Err(err) => RpcStatus::from_error(&err),
            },
            Err(_) => RpcStatus::success(),
        };
        OperationStatusOnlyResponse { status }
    }

    /// Idempotent; removes the operation from the registry after teardown.
    pub async fn close_operation(&self, req: CloseOperationRequest) -> OperationStatusOnlyResponse {
        let status = match self.registry.get(req.handle.id) {
            Ok(op) => match op.close() {
                Ok(()) => {
                    self.registry.remove(req.handle.id);
                    RpcStatus::success()
                }
                Err(err) => RpcStatus::from_error(&err),
            },
            Err(_) => RpcStatus::success(),
        };
        OperationStatusOnlyResponse { status }
    }
}
