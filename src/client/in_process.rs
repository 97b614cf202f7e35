use std::sync::Arc;

use super::RpcClient;
use crate::core::QueryError;
use crate::operation::BoxFuture;
use crate::service::QueryService;
use crate::service::rpc::{
    CancelOperationRequest, CloseOperationRequest, ExecuteStatementRequest,
    ExecuteStatementResponse, FetchResultsRequest, FetchResultsResponse,
    GetOperationStatusRequest, GetOperationStatusResponse, OperationStatusOnlyResponse,
};

/// RPC client bound directly to a service instance in the same process.
/// Used by embedded deployments and by the integration tests.
#[derive(Clone)]
pub struct InProcessClient {
    service: Arc<QueryService>,
}

impl InProcessClient {
    #[must_use]
    pub const fn new(service: Arc<QueryService>) -> Self {
        Self { service }
    }
}

impl RpcClient for InProcessClient {
    fn execute_statement(
        &self,
        req: ExecuteStatementRequest,
    ) -> BoxFuture<Result<ExecuteStatementResponse, QueryError>> {
        let service = Arc::clone(&self.service);
        Box::pin(async move { Ok(service.execute_statement(req).await) })
    }

    fn get_operation_status(
        &self,
        req: GetOperationStatusRequest,
    ) -> BoxFuture<Result<GetOperationStatusResponse, QueryError>> {
        let service = Arc::clone(&self.service);
        Box::pin(async move { Ok(service.get_operation_status(req).await) })
    }

    fn fetch_results(
        &self,
        req: FetchResultsRequest,
    ) -> BoxFuture<Result<FetchResultsResponse, QueryError>> {
        let service = Arc::clone(&self.service);
        Box::pin(async move { Ok(service.fetch_results(req).await) })
    }

    fn cancel_operation(
        &self,
        req: CancelOperationRequest,
    ) -> BoxFuture<Result<OperationStatusOnlyResponse, QueryError>> {
        let service = Arc::clone(&self.service);
        Box::pin(async move { Ok(service.cancel_operation(req).await) })
    }

    fn close_operation(
        &self,
        req: CloseOperationRequest,
    ) -> BoxFuture<Result<OperationStatusOnlyResponse, QueryError>> {
        let service = Arc::clone(&self.service);
        Box::pin(async move { Ok(service.close_operation(req).await) })
    }
}
