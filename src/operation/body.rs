use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

use super::log_sink::LogSink;
use crate::core::{QueryError, ResultSchema, Row};

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Per-operation execution context handed to a statement body.
///
/// Carries the correlation ids, the configuration overlay from the execute
/// request, the operation's log sink, and the cooperative cancel signal.
pub struct BodyContext {
    pub operation_id: Uuid,
    pub session_id: Uuid,
    pub conf_overlay: HashMap<String, String>,
    pub log: Arc<LogSink>,
    cancel: watch::Receiver<bool>,
}

impl BodyContext {
    #[must_use]
    pub fn new(
        operation_id: Uuid,
        session_id: Uuid,
        conf_overlay: HashMap<String, String>,
        log: Arc<LogSink>,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            operation_id,
            session_id,
            conf_overlay,
            log,
            cancel,
        }
    }

    /// True once cancellation has been requested. Bodies are expected to
    /// check this (or await `cancelled`) at convenient points and stop.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Resolves when cancellation is requested.
    pub async fn cancelled(&mut self) {
        // wait_for returns immediately if the flag is already set
        let _ = self.cancel.wait_for(|cancelled| *cancelled).await;
    }
}

/// Result of a statement body run.
///
/// A `schema` means the statement produced a result set; bodies whose shape
/// was already known at compile time may leave it `None` and only return
/// rows.
#[derive(Debug, Default)]
pub struct BodyOutcome {
    pub schema: Option<ResultSchema>,
    pub rows: Vec<Row>,
}

impl BodyOutcome {
    /// Outcome of a statement with no result set (DDL, DML).
    #[must_use]
    pub fn no_result_set() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_rows(schema: ResultSchema, rows: Vec<Row>) -> Self {
        Self {
            schema: Some(schema),
            rows,
        }
    }
}

/// One unit of executable work wrapped by an operation.
///
/// The compiler produces a body synchronously; the body then runs either on
/// the background pool or inline. Bodies must treat the cancel signal in
/// their context as a request to stop cooperatively.
pub trait StatementBody: std::fmt::Debug + Send + Sync + 'static {
    /// Result shape, when known at compile time. Drives the handle's
    /// `has_result_set` flag before execution starts.
    fn result_schema(&self) -> Option<ResultSchema> {
        None
    }

    /// Whether this body may run on the background pool. Metadata
    /// operations run synchronously on the request task.
    fn should_run_async(&self) -> bool {
        true
    }

    fn run(self: Box<Self>, ctx: BodyContext) -> BoxFuture<Result<BodyOutcome, QueryError>>;
}
