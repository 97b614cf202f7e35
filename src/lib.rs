// GridSQL - asynchronous query-operation protocol for a distributed SQL service
// A client submits a statement, the server compiles it synchronously and runs it
// in the background; the client polls the handle, then streams rows and logs.

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::future_not_send)]

// Shared leaf types (errors, handles, states, values)
pub mod core;

// Server-side operation lifecycle (state machine, registry, reaper, pool)
pub mod operation;

// RPC surface: wire types, query service, statement compiler seam
pub mod service;

// TCP transport for the RPC surface
pub mod network;

// Client statement driver and RPC client implementations
pub mod client;

// Service/server configuration
pub mod config;

// Re-export commonly used types for convenience
pub use client::{InProcessClient, RemoteClient, ResultSet, RpcClient, Statement};
pub use config::{ServerConfig, ServiceConfig};
pub use core::{
    FetchOrientation, FetchType, OperationHandle, OperationState, OperationType, QueryError,
    ResultSchema, Row, Value,
};
pub use network::Server;
pub use operation::{
    BackgroundExecutor, IdleReaper, Operation, OperationMetrics, OperationRegistry,
};
pub use service::{QueryService, SimpleCompiler, StatementCompiler};
