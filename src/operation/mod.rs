// Operation module - server-side operation lifecycle

pub mod background;
pub mod body;
pub mod log_sink;
pub mod metrics;
pub mod operation;
pub mod registry;
pub mod reaper;

pub use background::BackgroundExecutor;
pub use body::{BodyContext, BodyOutcome, BoxFuture, StatementBody};
pub use log_sink::LogSink;
pub use metrics::OperationMetrics;
pub use operation::{DEFAULT_FETCH_MAX_ROWS, Operation, OperationStatus};
pub use registry::OperationRegistry;
pub use reaper::IdleReaper;
