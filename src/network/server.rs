use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::core::QueryError;
use crate::service::rpc::OperationStatusOnlyResponse;
use crate::service::{QueryService, RpcRequest, RpcResponse, RpcStatus};

/// TCP front for the query service: one JSON request per line, one JSON
/// response per line. Framing below the RPC boundary is deliberately this
/// simple; the RPC types are the contract.
pub struct Server {
    service: Arc<QueryService>,
}

impl Server {
    #[must_use]
    pub const fn new(service: Arc<QueryService>) -> Self {
        Self { service }
    }

    pub async fn start(&self, addr: &str) -> Result<(), QueryError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| QueryError::Transport(e.to_string()))?;
        info!(addr, "gridsql server listening");

        loop {
            let (socket, peer) = listener
                .accept()
                .await
                .map_err(|e| QueryError::Transport(e.to_string()))?;
            debug!(%peer, "new connection");
            let service = Arc::clone(&self.service);
            tokio::spawn(async move {
                if let Err(err) = handle_client(socket, service).await {
                    warn!(%peer, error = %err, "connection closed with error");
                }
            });
        }
    }
}

async fn handle_client(socket: TcpStream, service: Arc<QueryService>) -> Result<(), QueryError> {
    let (reader, mut writer) = socket.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| QueryError::Transport(e.to_string()))?
    {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<RpcRequest>(&line) {
            Ok(request) => dispatch(&service, request).await,
            Err(err) => RpcResponse::Invalid(OperationStatusOnlyResponse {
                status: RpcStatus::from_error(&QueryError::Transport(format!(
                    "malformed request: {err}"
                ))),
            }),
        };
        let mut payload = serde_json::to_string(&response)
            .map_err(|e| QueryError::Transport(e.to_string()))?;
        payload.push('\n');
        writer
            .write_all(payload.as_bytes())
            .await
            .map_err(|e| QueryError::Transport(e.to_string()))?;
    }
    Ok(())
}

async fn dispatch(service: &QueryService, request: RpcRequest) -> RpcResponse {
    match request {
        RpcRequest::Execute(req) => RpcResponse::Execute(service.execute_statement(req).await),
        RpcRequest::Status(req) => RpcResponse::Status(service.get_operation_status(req).await),
        RpcRequest::Fetch(req) => RpcResponse::Fetch(service.fetch_results(req).await),
        RpcRequest::Cancel(req) => RpcResponse::Cancel(service.cancel_operation(req).await),
        RpcRequest::Close(req) => RpcResponse::Close(service.close_operation(req).await),
    }
}
