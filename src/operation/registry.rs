use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use super::operation::Operation;
use crate::core::QueryError;

/// Owner of all in-flight and recently-terminal operations, keyed by
/// handle id. Insert on create, remove on close.
#[derive(Debug, Default)]
pub struct OperationRegistry {
    operations: Mutex<HashMap<Uuid, Arc<Operation>>>,
}

impl OperationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, operation: Arc<Operation>) {
        self.operations
            .lock()
            .expect("registry lock poisoned")
            .insert(operation.id(), operation);
    }

    pub fn get(&self, id: Uuid) -> Result<Arc<Operation>, QueryError> {
        self.operations
            .lock()
            .expect("registry lock poisoned")
            .get(&id)
            .cloned()
            .ok_or(QueryError::UnknownQuery)
    }

    pub fn remove(&self, id: Uuid) -> Option<Arc<Operation>> {
        self.operations
            .lock()
            .expect("registry lock poisoned")
            .remove(&id)
    }

    /// Snapshot of the live operations, for the reaper sweep.
    #[must_use]
    pub fn live(&self) -> Vec<Arc<Operation>> {
        self.operations
            .lock()
            .expect("registry lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.lock().expect("registry lock poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::OperationType;
    use crate::operation::metrics::OperationMetrics;
    use std::collections::HashMap;

    fn test_operation() -> Arc<Operation> {
        Operation::create(
            Uuid::new_v4(),
            OperationType::ExecuteStatement,
            HashMap::new(),
            0,
            Arc::new(OperationMetrics::new()),
        )
    }

    #[test]
    fn test_add_get_remove() {
        let registry = OperationRegistry::new();
        let op = test_operation();
        let id = op.id();

        registry.add(Arc::clone(&op));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(id).unwrap().id(), id);

        registry.remove(id);
        assert!(matches!(registry.get(id), Err(QueryError::UnknownQuery)));
    }

    #[test]
    fn test_unknown_handle() {
        let registry = OperationRegistry::new();
        assert!(matches!(
            registry.get(Uuid::new_v4()),
            Err(QueryError::UnknownQuery)
        ));
    }
}
