// Client module - statement driver and RPC client implementations

pub mod in_process;
pub mod remote;
pub mod result_set;
pub mod statement;

pub use in_process::InProcessClient;
pub use remote::RemoteClient;
pub use result_set::ResultSet;
pub use statement::{DEFAULT_FETCH_SIZE, Statement};

use crate::core::QueryError;
use crate::operation::BoxFuture;
use crate::service::rpc::{
    CancelOperationRequest, CloseOperationRequest, ExecuteStatementRequest,
    ExecuteStatementResponse, FetchResultsRequest, FetchResultsResponse,
    GetOperationStatusRequest, GetOperationStatusResponse, OperationStatusOnlyResponse, RpcStatus,
};

/// Transport-agnostic view of the five operation RPCs.
///
/// Implementations only move requests and responses; protocol-level
/// failures surface as `QueryError::Transport`.
pub trait RpcClient: Send + Sync + 'static {
    fn execute_statement(
        &self,
        req: ExecuteStatementRequest,
    ) -> BoxFuture<Result<ExecuteStatementResponse, QueryError>>;

    fn get_operation_status(
        &self,
        req: GetOperationStatusRequest,
    ) -> BoxFuture<Result<GetOperationStatusResponse, QueryError>>;

    fn fetch_results(
        &self,
        req: FetchResultsRequest,
    ) -> BoxFuture<Result<FetchResultsResponse, QueryError>>;

    fn cancel_operation(
        &self,
        req: CancelOperationRequest,
    ) -> BoxFuture<Result<OperationStatusOnlyResponse, QueryError>>;

    fn close_operation(
        &self,
        req: CloseOperationRequest,
    ) -> BoxFuture<Result<OperationStatusOnlyResponse, QueryError>>;
}

/// Turns a non-success response status into the error it describes,
/// carrying the server's SQL state and error code verbatim.
pub(crate) fn verify_success(status: &RpcStatus) -> Result<(), QueryError> {
    if status.is_success() {
        return Ok(());
    }
    Err(QueryError::Execution {
        message: status
            .message
            .clone()
            .unwrap_or_else(|| "unknown server error".to_string()),
        sql_state: status
            .sql_state
            .clone()
            .unwrap_or_else(|| "HY000".to_string()),
        error_code: status.error_code.unwrap_or(0),
    })
}
