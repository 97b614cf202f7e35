use gridsql::client::{InProcessClient, RpcClient, Statement};
use gridsql::config::ServiceConfig;
use gridsql::core::{OperationState, QueryError, Value};
use gridsql::operation::{BodyContext, BodyOutcome, BoxFuture, IdleReaper, StatementBody};
use gridsql::service::{QueryService, SimpleCompiler, StatementCompiler};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Delegates to the built-in compiler but recognizes a few statements the
/// tests need deterministic bodies for.
struct ScriptedCompiler {
    inner: SimpleCompiler,
}

impl ScriptedCompiler {
    fn new() -> Self {
        Self {
            inner: SimpleCompiler::new(),
        }
    }
}

impl StatementCompiler for ScriptedCompiler {
    fn compile(&self, sql: &str) -> Result<Box<dyn StatementBody>, QueryError> {
        if sql == "SELECT 1/0" {
            return Ok(Box::new(DivisionByZeroBody));
        }
        self.inner.compile(sql)
    }
}

/// Fails at execution time the way a runtime arithmetic error would.
#[derive(Debug)]
struct DivisionByZeroBody;

impl StatementBody for DivisionByZeroBody {
    fn run(self: Box<Self>, _ctx: BodyContext) -> BoxFuture<Result<BodyOutcome, QueryError>> {
        Box::pin(async {
            Err(QueryError::Execution {
                message: "division by zero".to_string(),
                sql_state: "22012".to_string(),
                error_code: 1,
            })
        })
    }
}

fn test_config() -> ServiceConfig {
    ServiceConfig {
        idle_operation_timeout_ms: 0,
        long_poll_timeout_ms: 1_000,
        reaper_period_ms: 60_000,
        worker_pool_size: 4,
    }
}

fn test_service(config: ServiceConfig) -> (Arc<QueryService>, Arc<InProcessClient>) {
    let service = Arc::new(QueryService::new(config, Arc::new(ScriptedCompiler::new())));
    let client = Arc::new(InProcessClient::new(Arc::clone(&service)));
    (service, client)
}

#[tokio::test]
async fn test_select_one_full_lifecycle() {
    let (service, client) = test_service(test_config());
    let mut statement = Statement::new(client, Uuid::new_v4());

    let has_rows = statement.execute("SELECT 1").await.unwrap();
    assert!(has_rows);

    let rows = statement
        .result_set()
        .unwrap()
        .collect_rows()
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].values, vec![Value::Integer(1)]);

    assert!(!statement.has_more_logs());
    assert_eq!(
        service.metrics().completed(OperationState::Finished),
        1
    );

    statement.close().await.unwrap();
    assert!(statement.is_closed());
    // A second close is observably identical.
    statement.close().await.unwrap();
    // Everything else now fails with a statement-closed error.
    assert!(matches!(
        statement.execute("SELECT 2").await,
        Err(QueryError::StatementClosed(_))
    ));
}

#[tokio::test]
async fn test_statement_with_no_result_set() {
    let (_service, client) = test_service(test_config());
    let mut statement = Statement::new(client, Uuid::new_v4());

    assert!(!statement.execute("SLEEP 10").await.unwrap());
    assert!(statement.result_set().is_none());
    assert!(matches!(
        statement.execute_query("SLEEP 10").await,
        Err(QueryError::InvalidState(_))
    ));
}

#[tokio::test]
async fn test_execution_error_carries_server_fields_verbatim() {
    let (_service, client) = test_service(test_config());
    let mut statement = Statement::new(client, Uuid::new_v4());

    let err = statement.execute("SELECT 1/0").await.unwrap_err();
    match err {
        QueryError::Execution {
            message,
            sql_state,
            error_code,
        } => {
            assert_eq!(message, "division by zero");
            assert_eq!(sql_state, "22012");
            assert_eq!(error_code, 1);
        }
        other => panic!("expected execution error, got {other:?}"),
    }
    assert!(!statement.has_more_logs());
}

#[tokio::test]
async fn test_compile_error_surfaces_on_submit() {
    let (_service, client) = test_service(test_config());
    let mut statement = Statement::new(client, Uuid::new_v4());

    let err = statement.execute("DROP TABLE users").await.unwrap_err();
    assert!(matches!(
        err,
        QueryError::Execution { ref sql_state, .. } if sql_state == "42601"
    ));
    assert!(statement.is_execute_failed());

    // A failed submission must raise from the log fetch, not silently
    // report "no logs".
    assert!(matches!(
        statement.query_log(true, 100).await,
        Err(QueryError::InvalidState(_))
    ));
}

#[tokio::test]
async fn test_cancel_aborts_wait_with_warning_class_error() {
    let (_service, client) = test_service(test_config());
    let mut statement = Statement::new(Arc::clone(&client), Uuid::new_v4());

    statement.submit("SLEEP 30000").await.unwrap();
    let handle = statement.handle().unwrap().clone();

    // Cancel from "another thread" while the poll is in flight.
    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        client
            .cancel_operation(gridsql::service::rpc::CancelOperationRequest { handle })
            .await
            .unwrap()
    });

    let err = statement.await_completion().await.unwrap_err();
    assert_eq!(err, QueryError::Cancelled);
    assert!(err.is_warning());
    canceller.await.unwrap();
}

#[tokio::test]
async fn test_query_timeout_reported_by_server() {
    let (_service, client) = test_service(test_config());
    let mut statement = Statement::new(client, Uuid::new_v4());
    statement.set_query_timeout(1);

    let err = statement.execute("SLEEP 30000").await.unwrap_err();
    assert_eq!(err, QueryError::Timeout { seconds: 1 });
}

#[tokio::test]
async fn test_long_poll_returns_promptly_on_completion() {
    let (_service, client) = test_service(ServiceConfig {
        long_poll_timeout_ms: 10_000,
        ..test_config()
    });
    let mut statement = Statement::new(client, Uuid::new_v4());

    let started = Instant::now();
    statement.execute("SLEEP 100").await.unwrap();
    // The state change must wake the poll well before the 10s ceiling.
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_query_log_streams_captured_lines() {
    let (_service, client) = test_service(test_config());
    let mut statement = Statement::new(client, Uuid::new_v4());

    statement.execute("SLEEP 20").await.unwrap();

    let mut lines = Vec::new();
    loop {
        let batch = statement.query_log(true, 1).await.unwrap();
        if batch.is_empty() {
            break;
        }
        lines.extend(batch);
    }
    assert_eq!(lines, vec!["sleeping for 20 ms", "sleep complete"]);

    // Non-incremental fetch restarts from the beginning.
    let from_start = statement.query_log(false, 100).await.unwrap();
    assert_eq!(from_start.len(), 2);
}

#[tokio::test]
async fn test_cancel_with_no_submission_issues_no_rpc() {
    let (service, client) = test_service(test_config());
    let counting = Arc::new(CountingClient {
        inner: client,
        cancels: AtomicUsize::new(0),
    });
    let mut statement = Statement::new(Arc::clone(&counting), Uuid::new_v4());

    statement.cancel().await.unwrap();
    assert!(statement.is_cancelled());
    assert_eq!(counting.cancels.load(Ordering::SeqCst), 0);
    assert_eq!(service.registry().len(), 0);

    // Cancel is idempotent on the statement as well.
    statement.cancel().await.unwrap();
    assert_eq!(counting.cancels.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_poll_after_reaper_eviction_observes_terminal_state() {
    // Force mode: even a non-terminal operation is evictable once idle.
    let (service, client) = test_service(ServiceConfig {
        idle_operation_timeout_ms: -1,
        ..test_config()
    });
    let mut statement = Statement::new(client, Uuid::new_v4());
    statement.submit("SLEEP 30000").await.unwrap();

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(IdleReaper::sweep(service.registry()), 1);

    // The poller sees the terminal state the reaper produced, not a
    // distinct "evicted" error.
    statement.await_completion().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_client_and_reaper_close() {
    let (service, client) = test_service(ServiceConfig {
        idle_operation_timeout_ms: -1,
        ..test_config()
    });
    let mut statement = Statement::new(client, Uuid::new_v4());
    statement.submit("SLEEP 30000").await.unwrap();
    let id = statement.handle().unwrap().id;
    let op = service.registry().get(id).unwrap();

    tokio::time::sleep(Duration::from_millis(10)).await;
    let registry = Arc::clone(service.registry());
    let sweeper = tokio::task::spawn_blocking(move || IdleReaper::sweep(&registry));
    statement.close().await.unwrap();
    sweeper.await.unwrap();

    // Exactly one teardown happened; both parties observed success.
    assert_eq!(op.state(), OperationState::Closed);
    op.close().unwrap();
}

#[tokio::test]
async fn test_resubmission_closes_previous_operation() {
    let (service, client) = test_service(test_config());
    let mut statement = Statement::new(client, Uuid::new_v4());

    statement.execute("SELECT 1").await.unwrap();
    let first = statement.handle().unwrap().id;
    assert_eq!(service.registry().len(), 1);

    statement.execute("SELECT 2").await.unwrap();
    let second = statement.handle().unwrap().id;
    assert_ne!(first, second);
    // The first operation was closed server-side before the second ran.
    assert_eq!(service.registry().len(), 1);
    assert!(matches!(
        service.registry().get(first),
        Err(QueryError::UnknownQuery)
    ));
}

#[tokio::test]
async fn test_max_rows_truncates_cursor() {
    let (_service, client) = test_service(test_config());
    let mut statement = Statement::new(client, Uuid::new_v4());
    statement.set_max_rows(1);
    statement.set_fetch_size(1);

    assert!(statement.execute("SELECT 1, 2, 3").await.unwrap());
    let rows = statement
        .result_set()
        .unwrap()
        .collect_rows()
        .await
        .unwrap();
    // One row of three columns; max_rows=1 leaves it intact.
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].values.len(), 3);
}

/// RPC client wrapper counting cancel calls, for the no-RPC assertions.
struct CountingClient {
    inner: Arc<InProcessClient>,
    cancels: AtomicUsize,
}

impl RpcClient for CountingClient {
    fn execute_statement(
        &self,
        req: gridsql::service::rpc::ExecuteStatementRequest,
    ) -> BoxFuture<Result<gridsql::service::rpc::ExecuteStatementResponse, QueryError>> {
        self.inner.execute_statement(req)
    }

    fn get_operation_status(
        &self,
        req: gridsql::service::rpc::GetOperationStatusRequest,
    ) -> BoxFuture<Result<gridsql::service::rpc::GetOperationStatusResponse, QueryError>> {
        self.inner.get_operation_status(req)
    }

    fn fetch_results(
        &self,
        req: gridsql::service::rpc::FetchResultsRequest,
    ) -> BoxFuture<Result<gridsql::service::rpc::FetchResultsResponse, QueryError>> {
        self.inner.fetch_results(req)
    }

    fn cancel_operation(
        &self,
        req: gridsql::service::rpc::CancelOperationRequest,
    ) -> BoxFuture<Result<gridsql::service::rpc::OperationStatusOnlyResponse, QueryError>> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        self.inner.cancel_operation(req)
    }

    fn close_operation(
        &self,
        req: gridsql::service::rpc::CloseOperationRequest,
    ) -> BoxFuture<Result<gridsql::service::rpc::OperationStatusOnlyResponse, QueryError>> {
        self.inner.close_operation(req)
    }
}
