use std::collections::VecDeque;
use std::sync::Arc;

use super::{RpcClient, verify_success};
use crate::core::{FetchOrientation, FetchType, OperationHandle, QueryError, ResultSchema, Row};
use crate::service::rpc::FetchResultsRequest;

/// Streaming cursor over a finished operation's result rows.
///
/// Rows are pulled in `fetch_size` batches; `max_rows` (0 = unlimited)
/// silently truncates the stream. `FETCH_FIRST` rewinding requires a
/// scrollable cursor.
pub struct ResultSet<C: RpcClient> {
    client: Arc<C>,
    handle: OperationHandle,
    fetch_size: usize,
    max_rows: usize,
    scrollable: bool,
    schema: Option<ResultSchema>,
    buffer: VecDeque<Row>,
    fetched_rows: usize,
    exhausted: bool,
    next_orientation: FetchOrientation,
}

impl<C: RpcClient> ResultSet<C> {
    #[must_use]
    pub fn new(
        client: Arc<C>,
        handle: OperationHandle,
        fetch_size: usize,
        max_rows: usize,
        scrollable: bool,
    ) -> Self {
        Self {
            client,
            handle,
            fetch_size,
            max_rows,
            scrollable,
            schema: None,
            buffer: VecDeque::new(),
            fetched_rows: 0,
            exhausted: false,
            next_orientation: FetchOrientation::FetchNext,
        }
    }

    #[must_use]
    pub fn schema(&self) -> Option<&ResultSchema> {
        self.schema.as_ref()
    }

    /// Returns the next row, or `None` once the result set is exhausted or
    /// the `max_rows` limit is reached.
    pub async fn next(&mut self) -> Result<Option<Row>, QueryError> {
        if self.max_rows > 0 && self.fetched_rows >= self.max_rows {
            return Ok(None);
        }
        if self.buffer.is_empty() && !self.exhausted {
            self.fetch_batch().await?;
        }
        Ok(self.buffer.pop_front().inspect(|_| {
            self.fetched_rows += 1;
        }))
    }

    /// Drains the remaining rows, honoring `max_rows`.
    pub async fn collect_rows(&mut self) -> Result<Vec<Row>, QueryError> {
        let mut rows = Vec::new();
        while let Some(row) = self.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Repositions the cursor before the first row. Only legal for
    /// scrollable result sets.
    pub fn before_first(&mut self) -> Result<(), QueryError> {
        if !self.scrollable {
            return Err(QueryError::UnsupportedOperation(
                "before_first for a forward-only resultset".to_string(),
            ));
        }
        self.buffer.clear();
        self.fetched_rows = 0;
        self.exhausted = false;
        self.next_orientation = FetchOrientation::FetchFirst;
        Ok(())
    }

    async fn fetch_batch(&mut self) -> Result<(), QueryError> {
        let orientation = self.next_orientation;
        self.next_orientation = FetchOrientation::FetchNext;
        let resp = self
            .client
            .fetch_results(FetchResultsRequest {
                handle: self.handle.clone(),
                orientation,
                max_rows: self.fetch_size,
                fetch_type: FetchType::Rows,
            })
            .await?;
        verify_success(&resp.status)?;
        if self.schema.is_none() {
            self.schema = resp.schema;
        }
        if resp.rows.is_empty() {
            self.exhausted = true;
        }
        self.buffer.extend(resp.rows);
        Ok(())
    }
}
