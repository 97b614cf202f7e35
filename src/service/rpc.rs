use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::core::{
    FetchOrientation, FetchType, OperationHandle, OperationState, QueryError, ResultSchema, Row,
};

/// Success/warning/error classification carried by every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusCode {
    Success,
    SuccessWithInfo,
    Error,
}

/// Call outcome attached to every RPC response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcStatus {
    pub code: StatusCode,
    pub message: Option<String>,
    pub sql_state: Option<String>,
    pub error_code: Option<i32>,
}

impl RpcStatus {
    #[must_use]
    pub const fn success() -> Self {
        Self {
            code: StatusCode::Success,
            message: None,
            sql_state: None,
            error_code: None,
        }
    }

    #[must_use]
    pub fn from_error(err: &QueryError) -> Self {
        Self {
            code: StatusCode::Error,
            message: Some(err.to_string()),
            sql_state: err.sql_state().map(str::to_string),
            error_code: err.error_code(),
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, StatusCode::Success | StatusCode::SuccessWithInfo)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteStatementRequest {
    pub session_id: Uuid,
    pub sql: String,
    pub conf_overlay: HashMap<String, String>,
    pub run_async: bool,
    pub query_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteStatementResponse {
    pub status: RpcStatus,
    pub handle: Option<OperationHandle>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetOperationStatusRequest {
    pub handle: OperationHandle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetOperationStatusResponse {
    pub status: RpcStatus,
    pub state: Option<OperationState>,
    pub task_detail: Option<String>,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub error_message: Option<String>,
    pub sql_state: Option<String>,
    pub error_code: Option<i32>,
    /// Result shape flag, refreshed server-side once compilation knows it.
    pub has_result_set: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResultsRequest {
    pub handle: OperationHandle,
    pub orientation: FetchOrientation,
    pub max_rows: usize,
    pub fetch_type: FetchType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResultsResponse {
    pub status: RpcStatus,
    pub schema: Option<ResultSchema>,
    pub rows: Vec<Row>,
    pub log_lines: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelOperationRequest {
    pub handle: OperationHandle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseOperationRequest {
    pub handle: OperationHandle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationStatusOnlyResponse {
    pub status: RpcStatus,
}

/// Request envelope for the JSON-lines transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum RpcRequest {
    Execute(ExecuteStatementRequest),
    Status(GetOperationStatusRequest),
    Fetch(FetchResultsRequest),
    Cancel(CancelOperationRequest),
    Close(CloseOperationRequest),
}

/// Response envelope for the JSON-lines transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum RpcResponse {
    Execute(ExecuteStatementResponse),
    Status(GetOperationStatusResponse),
    Fetch(FetchResultsResponse),
    Cancel(OperationStatusOnlyResponse),
    Close(OperationStatusOnlyResponse),
    /// Reply to a request the server could not decode.
    Invalid(OperationStatusOnlyResponse),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_error_carries_sql_state() {
        let err = QueryError::Execution {
            message: "division by zero".to_string(),
            sql_state: "22012".to_string(),
            error_code: 1,
        };
        let status = RpcStatus::from_error(&err);
        assert_eq!(status.code, StatusCode::Error);
        assert_eq!(status.sql_state.as_deref(), Some("22012"));
        assert_eq!(status.error_code, Some(1));
        assert!(!status.is_success());
    }

    #[test]
    fn test_request_envelope_round_trip() {
        let req = RpcRequest::Execute(ExecuteStatementRequest {
            session_id: Uuid::new_v4(),
            sql: "SELECT 1".to_string(),
            conf_overlay: HashMap::new(),
            run_async: true,
            query_timeout_seconds: 0,
        });
        let json = serde_json::to_string(&req).unwrap();
        let back: RpcRequest = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, RpcRequest::Execute(inner) if inner.sql == "SELECT 1"));
    }
}
