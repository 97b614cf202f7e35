use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Kind of work an operation performs.
///
/// Only `ExecuteStatement` carries a statement body; the metadata kinds
/// exist as handle metadata for catalog browsing clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationType {
    ExecuteStatement,
    GetTables,
    GetSchemas,
    GetTypeInfo,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ExecuteStatement => "EXECUTE_STATEMENT",
            Self::GetTables => "GET_TABLES",
            Self::GetSchemas => "GET_SCHEMAS",
            Self::GetTypeInfo => "GET_TYPE_INFO",
        };
        write!(f, "{name}")
    }
}

/// Protocol revision negotiated at session open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProtocolVersion(pub u16);

impl ProtocolVersion {
    pub const CURRENT: Self = Self(1);
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

/// Identity of one submitted operation, shared between client and server.
///
/// The handle is allocated once at creation; `has_result_set` is flipped
/// exactly once, when compilation determines the statement's result shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationHandle {
    pub id: Uuid,
    pub operation_type: OperationType,
    pub protocol_version: ProtocolVersion,
    pub has_result_set: bool,
}

impl OperationHandle {
    #[must_use]
    pub fn new(operation_type: OperationType, protocol_version: ProtocolVersion) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation_type,
            protocol_version,
            has_result_set: false,
        }
    }
}

impl fmt::Display for OperationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.operation_type, self.id)
    }
}

/// Direction of a results or log read.
///
/// `FetchNext` continues from the current cursor; `FetchFirst` restarts
/// from the beginning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchOrientation {
    FetchNext,
    FetchFirst,
}

impl fmt::Display for FetchOrientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FetchNext => "FETCH_NEXT",
            Self::FetchFirst => "FETCH_FIRST",
        };
        write!(f, "{name}")
    }
}

/// Whether a fetch targets result rows or captured log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchType {
    Rows,
    Logs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_ids_are_unique() {
        let a = OperationHandle::new(OperationType::ExecuteStatement, ProtocolVersion::CURRENT);
        let b = OperationHandle::new(OperationType::ExecuteStatement, ProtocolVersion::CURRENT);
        assert_ne!(a.id, b.id);
        assert!(!a.has_result_set);
    }

    #[test]
    fn test_handle_round_trips_through_json() {
        let handle = OperationHandle::new(OperationType::GetTables, ProtocolVersion::CURRENT);
        let json = serde_json::to_string(&handle).unwrap();
        let back: OperationHandle = serde_json::from_str(&json).unwrap();
        assert_eq!(handle, back);
    }
}
