use std::sync::Mutex;
use tracing::debug;

/// Append-only sequence of diagnostic log lines for one operation.
///
/// Single writer (the executing task), single read cursor (held by the
/// operation and advanced under its lock). Closing is idempotent; appends
/// after close are dropped.
#[derive(Debug, Default)]
pub struct LogSink {
    inner: Mutex<SinkInner>,
}

#[derive(Debug, Default)]
struct SinkInner {
    lines: Vec<String>,
    closed: bool,
}

impl LogSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, line: impl Into<String>) {
        let mut inner = self.inner.lock().expect("log sink lock poisoned");
        if inner.closed {
            debug!("dropping log line appended after sink close");
            return;
        }
        inner.lines.push(line.into());
    }

    /// Reads up to `max_lines` lines starting at `offset`.
    ///
    /// Returns the lines together with the offset just past the last line
    /// read, which the caller stores as the new cursor position.
    #[must_use]
    pub fn read_from(&self, offset: usize, max_lines: usize) -> (Vec<String>, usize) {
        let inner = self.inner.lock().expect("log sink lock poisoned");
        let start = offset.min(inner.lines.len());
        let end = start.saturating_add(max_lines).min(inner.lines.len());
        (inner.lines[start..end].to_vec(), end)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("log sink lock poisoned").lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Closes the sink. Returns true only for the call that performed the
    /// actual teardown, so racing closers can tell who won.
    pub fn close(&self) -> bool {
        let mut inner = self.inner.lock().expect("log sink lock poisoned");
        if inner.closed {
            return false;
        }
        inner.closed = true;
        true
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().expect("log sink lock poisoned").closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incremental_read_reconstructs_sequence() {
        let sink = LogSink::new();
        let lines: Vec<String> = (0..23).map(|i| format!("line {i}")).collect();
        for line in &lines {
            sink.append(line.clone());
        }

        // Any block size must reproduce the exact sequence.
        for block in [1, 2, 5, 7, 23, 100] {
            let mut cursor = 0;
            let mut collected = Vec::new();
            loop {
                let (batch, next) = sink.read_from(cursor, block);
                if batch.is_empty() {
                    break;
                }
                collected.extend(batch);
                cursor = next;
            }
            assert_eq!(collected, lines, "block size {block}");
        }
    }

    #[test]
    fn test_read_from_beginning_after_incremental() {
        let sink = LogSink::new();
        sink.append("a");
        sink.append("b");
        let (_, cursor) = sink.read_from(0, 10);
        assert_eq!(cursor, 2);
        let (again, _) = sink.read_from(0, 10);
        assert_eq!(again, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_close_is_exactly_once() {
        let sink = LogSink::new();
        sink.append("a");
        assert!(sink.close());
        assert!(!sink.close());
        sink.append("dropped");
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_read_past_end_is_empty() {
        let sink = LogSink::new();
        sink.append("only");
        let (batch, next) = sink.read_from(5, 10);
        assert!(batch.is_empty());
        assert_eq!(next, 1);
    }
}
