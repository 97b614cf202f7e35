// Service module - RPC surface of the operation lifecycle

pub mod compiler;
pub mod query_service;
pub mod rpc;

pub use compiler::{SimpleCompiler, StatementCompiler};
pub use query_service::QueryService;
pub use rpc::{
    CancelOperationRequest, CloseOperationRequest, ExecuteStatementRequest,
    ExecuteStatementResponse, FetchResultsRequest, FetchResultsResponse,
    GetOperationStatusRequest, GetOperationStatusResponse, OperationStatusOnlyResponse,
    RpcRequest, RpcResponse, RpcStatus, StatusCode,
};
