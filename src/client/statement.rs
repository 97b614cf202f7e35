use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::result_set::ResultSet;
use super::{RpcClient, verify_success};
use crate::core::{FetchOrientation, FetchType, OperationHandle, OperationState, QueryError};
use crate::service::rpc::{
    CancelOperationRequest, CloseOperationRequest, ExecuteStatementRequest, FetchResultsRequest,
    GetOperationStatusRequest,
};

pub const DEFAULT_FETCH_SIZE: usize = 1000;

/// Client-side statement driver.
///
/// Owns at most one in-flight operation handle at a time and exposes a
/// synchronous-looking `execute` built from submit + long-poll + fetch.
/// The per-submission flags mirror, but are distinct from, the server-side
/// operation state.
pub struct Statement<C: RpcClient> {
    client: Arc<C>,
    session_id: Uuid,
    conf_overlay: HashMap<String, String>,
    handle: Option<OperationHandle>,
    result_set: Option<ResultSet<C>>,
    fetch_size: usize,
    max_rows: usize,
    scrollable: bool,
    query_timeout_seconds: u64,
    is_closed: bool,
    is_cancelled: bool,
    is_query_closed: bool,
    is_log_being_generated: bool,
    is_execute_failed: bool,
    is_operation_complete: bool,
}

impl<C: RpcClient> Statement<C> {
    #[must_use]
    pub fn new(client: Arc<C>, session_id: Uuid) -> Self {
        Self {
            client,
            session_id,
            conf_overlay: HashMap::new(),
            handle: None,
            result_set: None,
            fetch_size: DEFAULT_FETCH_SIZE,
            max_rows: 0,
            scrollable: false,
            query_timeout_seconds: 0,
            is_closed: false,
            is_cancelled: false,
            is_query_closed: false,
            is_log_being_generated: false,
            is_execute_failed: false,
            is_operation_complete: false,
        }
    }

    fn check_open(&self, action: &str) -> Result<(), QueryError> {
        if self.is_closed {
            return Err(QueryError::StatementClosed(action.to_string()));
        }
        Ok(())
    }

    fn reset_flags(&mut self) {
        self.is_cancelled = false;
        self.is_query_closed = false;
        self.is_log_being_generated = true;
        self.is_execute_failed = false;
        self.is_operation_complete = false;
        self.result_set = None;
    }

    /// Submits the statement for asynchronous execution and stores the
    /// returned handle. Any previous operation owned by this statement is
    /// closed first so the session never leaks a handle.
    pub async fn submit(&mut self, sql: &str) -> Result<(), QueryError> {
        self.check_open("execute")?;
        self.close_prior_operation().await?;
        self.reset_flags();

        let req = ExecuteStatementRequest {
            session_id: self.session_id,
            sql: sql.to_string(),
            conf_overlay: self.conf_overlay.clone(),
            // Compilation is synchronous server-side; execution is async.
            run_async: true,
            query_timeout_seconds: self.query_timeout_seconds,
        };
        let outcome = async {
            let resp = self.client.execute_statement(req).await?;
            verify_success(&resp.status)?;
            resp.handle.ok_or_else(|| {
                QueryError::Transport("execute response carried no operation handle".to_string())
            })
        }
        .await;

        match outcome {
            Ok(handle) => {
                self.handle = Some(handle);
                self.is_execute_failed = false;
                Ok(())
            }
            Err(err) => {
                self.is_execute_failed = true;
                Err(err)
            }
        }
    }

    /// Polls the operation status until a terminal state is observed.
    ///
    /// Each status request may legitimately block up to the server's
    /// long-poll ceiling; that is the mechanism that avoids hot-polling.
    pub async fn await_completion(&mut self) -> Result<(), QueryError> {
        let result = self.poll_until_complete().await;
        if result.is_err() {
            self.is_log_being_generated = false;
        }
        result
    }

    async fn poll_until_complete(&mut self) -> Result<(), QueryError> {
        while !self.is_operation_complete {
            let handle = self.handle.clone().ok_or_else(|| {
                QueryError::InvalidState("no operation in flight".to_string())
            })?;
            let resp = self
                .client
                .get_operation_status(GetOperationStatusRequest { handle })
                .await?;
            verify_success(&resp.status)?;
            let Some(state) = resp.state else {
                continue;
            };
            match state {
                OperationState::Finished | OperationState::Closed => {
                    self.is_operation_complete = true;
                    self.is_log_being_generated = false;
                    // The result-shape flag was settled during compilation;
                    // refresh our copy of it.
                    if let (Some(handle), Some(flag)) =
                        (self.handle.as_mut(), resp.has_result_set)
                    {
                        handle.has_result_set = flag;
                    }
                }
                OperationState::Canceled => return Err(QueryError::Cancelled),
                OperationState::TimedOut => {
                    return Err(QueryError::Timeout {
                        seconds: self.query_timeout_seconds,
                    });
                }
                OperationState::Error => {
                    return Err(QueryError::Execution {
                        message: resp.error_message.unwrap_or_default(),
                        sql_state: resp.sql_state.unwrap_or_else(|| "HY000".to_string()),
                        error_code: resp.error_code.unwrap_or(0),
                    });
                }
                OperationState::Unknown => return Err(QueryError::UnknownQuery),
                OperationState::Initialized
                | OperationState::Pending
                | OperationState::Running => {}
            }
        }
        Ok(())
    }

    /// Submits and waits for completion. Returns true when the statement
    /// produced a result set, in which case a cursor is bound to the
    /// handle with this statement's fetch settings.
    pub async fn execute(&mut self, sql: &str) -> Result<bool, QueryError> {
        self.submit(sql).await?;
        self.await_completion().await?;
        self.bind_result_set()
    }

    /// Submits without waiting. The cursor (when the statement has a
    /// result set) is usable once `await_completion` or `update_count`
    /// observes completion.
    pub async fn execute_async(&mut self, sql: &str) -> Result<bool, QueryError> {
        self.submit(sql).await?;
        self.bind_result_set()
    }

    /// Like `execute`, but fails when the statement produces no rows.
    pub async fn execute_query(&mut self, sql: &str) -> Result<&mut ResultSet<C>, QueryError> {
        if !self.execute(sql).await? {
            return Err(QueryError::InvalidState(
                "the query did not generate a result set".to_string(),
            ));
        }
        self.result_set.as_mut().ok_or_else(|| {
            QueryError::InvalidState("result set missing after execute".to_string())
        })
    }

    /// Waits for completion of an `execute_async` submission; row-less
    /// statements always report -1 (row counts are not tracked).
    pub async fn update_count(&mut self) -> Result<i64, QueryError> {
        self.check_open("update_count")?;
        self.await_completion().await?;
        Ok(-1)
    }

    fn bind_result_set(&mut self) -> Result<bool, QueryError> {
        let Some(handle) = self.handle.clone() else {
            return Ok(false);
        };
        if !handle.has_result_set {
            return Ok(false);
        }
        self.result_set = Some(ResultSet::new(
            Arc::clone(&self.client),
            handle,
            self.fetch_size,
            self.max_rows,
            self.scrollable,
        ));
        Ok(true)
    }

    /// Idempotent; a no-op when already cancelled or nothing was submitted.
    pub async fn cancel(&mut self) -> Result<(), QueryError> {
        self.check_open("cancel")?;
        if self.is_cancelled {
            return Ok(());
        }
        if let Some(handle) = self.handle.clone() {
            let resp = self
                .client
                .cancel_operation(CancelOperationRequest { handle })
                .await?;
            verify_success(&resp.status)?;
        }
        self.is_cancelled = true;
        Ok(())
    }

    /// Fetches a block of captured execution log lines, from the current
    /// cursor (`incremental`) or from the beginning.
    pub async fn query_log(
        &mut self,
        incremental: bool,
        fetch_size: usize,
    ) -> Result<Vec<String>, QueryError> {
        self.check_open("query_log")?;
        if self.is_cancelled {
            return Err(QueryError::ClosedOrCancelled("query_log".to_string()));
        }
        let Some(handle) = self.handle.clone() else {
            if self.is_query_closed {
                return Err(QueryError::ClosedOrCancelled("query_log".to_string()));
            }
            if self.is_execute_failed {
                return Err(QueryError::InvalidState(
                    "the statement handle is missing and the statement execution may have failed"
                        .to_string(),
                ));
            }
            // Nothing submitted yet; no logs is a normal answer.
            return Ok(Vec::new());
        };

        let resp = self
            .client
            .fetch_results(FetchResultsRequest {
                handle,
                orientation: if incremental {
                    FetchOrientation::FetchNext
                } else {
                    FetchOrientation::FetchFirst
                },
                max_rows: fetch_size,
                fetch_type: FetchType::Logs,
            })
            .await?;
        verify_success(&resp.status)?;
        Ok(resp.log_lines)
    }

    /// True while the server may still be producing log lines.
    #[must_use]
    pub const fn has_more_logs(&self) -> bool {
        self.is_log_being_generated
    }

    /// Idempotent; closes the in-flight operation and releases the cursor.
    /// Every later call on this statement fails with `StatementClosed`.
    pub async fn close(&mut self) -> Result<(), QueryError> {
        if self.is_closed {
            return Ok(());
        }
        self.close_prior_operation().await?;
        self.result_set = None;
        self.is_closed = true;
        Ok(())
    }

    async fn close_prior_operation(&mut self) -> Result<(), QueryError> {
        if let Some(handle) = self.handle.clone() {
            let resp = self
                .client
                .close_operation(CloseOperationRequest { handle })
                .await?;
            verify_success(&resp.status)?;
        }
        self.handle = None;
        self.is_query_closed = true;
        self.is_execute_failed = false;
        Ok(())
    }

    #[must_use]
    pub fn result_set(&mut self) -> Option<&mut ResultSet<C>> {
        self.result_set.as_mut()
    }

    #[must_use]
    pub fn handle(&self) -> Option<&OperationHandle> {
        self.handle.as_ref()
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.is_closed
    }

    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        self.is_cancelled
    }

    #[must_use]
    pub const fn is_execute_failed(&self) -> bool {
        self.is_execute_failed
    }

    /// 0 restores the default fetch size.
    pub fn set_fetch_size(&mut self, rows: usize) {
        self.fetch_size = if rows == 0 { DEFAULT_FETCH_SIZE } else { rows };
    }

    /// 0 means unlimited.
    pub const fn set_max_rows(&mut self, max: usize) {
        self.max_rows = max;
    }

    pub const fn set_scrollable(&mut self, scrollable: bool) {
        self.scrollable = scrollable;
    }

    pub const fn set_query_timeout(&mut self, seconds: u64) {
        self.query_timeout_seconds = seconds;
    }

    pub fn set_conf(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.conf_overlay.insert(key.into(), value.into());
    }
}
