use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;

use super::RpcClient;
use crate::core::QueryError;
use crate::operation::BoxFuture;
use crate::service::rpc::{
    CancelOperationRequest, CloseOperationRequest, ExecuteStatementRequest,
    ExecuteStatementResponse, FetchResultsRequest, FetchResultsResponse,
    GetOperationStatusRequest, GetOperationStatusResponse, OperationStatusOnlyResponse, RpcRequest,
    RpcResponse,
};

struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

/// RPC client over the JSON-lines TCP transport.
///
/// Requests on one connection are serialized behind a mutex; responses
/// arrive in request order.
pub struct RemoteClient {
    conn: Arc<Mutex<Connection>>,
}

impl RemoteClient {
    pub async fn connect(addr: &str) -> Result<Self, QueryError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| QueryError::Transport(e.to_string()))?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            conn: Arc::new(Mutex::new(Connection {
                reader: BufReader::new(reader),
                writer,
            })),
        })
    }

    async fn call(conn: &Mutex<Connection>, request: RpcRequest) -> Result<RpcResponse, QueryError> {
        let mut payload =
            serde_json::to_string(&request).map_err(|e| QueryError::Transport(e.to_string()))?;
        payload.push('\n');

        let mut conn = conn.lock().await;
        conn.writer
            .write_all(payload.as_bytes())
            .await
            .map_err(|e| QueryError::Transport(e.to_string()))?;

        let mut line = String::new();
        let read = conn
            .reader
            .read_line(&mut line)
            .await
            .map_err(|e| QueryError::Transport(e.to_string()))?;
        if read == 0 {
            return Err(QueryError::Transport(
                "server closed the connection".to_string(),
            ));
        }
        serde_json::from_str(&line).map_err(|e| QueryError::Transport(e.to_string()))
    }
}

fn unexpected(response: &RpcResponse) -> QueryError {
    QueryError::Transport(format!("unexpected response variant: {response:?}"))
}

impl RpcClient for RemoteClient {
    fn execute_statement(
        &self,
        req: ExecuteStatementRequest,
    ) -> BoxFuture<Result<ExecuteStatementResponse, QueryError>> {
        let conn = Arc::clone(&self.conn);
        Box::pin(async move {
            match Self::call(&conn, RpcRequest::Execute(req)).await? {
                RpcResponse::Execute(resp) => Ok(resp),
                other => Err(unexpected(&other)),
            }
        })
    }

    fn get_operation_status(
        &self,
        req: GetOperationStatusRequest,
    ) -> BoxFuture<Result<GetOperationStatusResponse, QueryError>> {
        let conn = Arc::clone(&self.conn);
        Box::pin(async move {
            match Self::call(&conn, RpcRequest::Status(req)).await? {
                RpcResponse::Status(resp) => Ok(resp),
                other => Err(unexpected(&other)),
            }
        })
    }

    fn fetch_results(
        &self,
        req: FetchResultsRequest,
    ) -> BoxFuture<Result<FetchResultsResponse, QueryError>> {
        let conn = Arc::clone(&self.conn);
        Box::pin(async move {
            match Self::call(&conn, RpcRequest::Fetch(req)).await? {
                RpcResponse::Fetch(resp) => Ok(resp),
                other => Err(unexpected(&other)),
            }
        })
    }

    fn cancel_operation(
        &self,
        req: CancelOperationRequest,
    ) -> BoxFuture<Result<OperationStatusOnlyResponse, QueryError>> {
        let conn = Arc::clone(&self.conn);
        Box::pin(async move {
            match Self::call(&conn, RpcRequest::Cancel(req)).await? {
                RpcResponse::Cancel(resp) => Ok(resp),
                other => Err(unexpected(&other)),
            }
        })
    }

    fn close_operation(
        &self,
        req: CloseOperationRequest,
    ) -> BoxFuture<Result<OperationStatusOnlyResponse, QueryError>> {
        let conn = Arc::clone(&self.conn);
        Box::pin(async move {
            match Self::call(&conn, RpcRequest::Close(req)).await? {
                RpcResponse::Close(resp) => Ok(resp),
                other => Err(unexpected(&other)),
            }
        })
    }
}
