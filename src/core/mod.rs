// Module declarations
pub mod error;
pub mod handle;
pub mod schema;
pub mod state;
pub mod value;

// Re-exports for convenience
pub use error::QueryError;
pub use handle::{FetchOrientation, FetchType, OperationHandle, OperationType, ProtocolVersion};
pub use schema::{ColumnDesc, DataType, ResultSchema};
pub use state::OperationState;
pub use value::{Row, Value};
