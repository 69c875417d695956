//! In-memory row source.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::datum::Value;
use crate::executor::EnumerationContext;

use super::{RowCursor, RowSource, SourceError};

/// Counters shared by a [`MemoryRowSource`] and the cursors it opened.
#[derive(Debug, Default)]
pub struct SourceStats {
    opened: AtomicUsize,
    closed: AtomicUsize,
    rows_read: AtomicUsize,
    before_enumerate: AtomicUsize,
    after_enumerate: AtomicUsize,
}

impl SourceStats {
    /// Number of cursors opened.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::Relaxed)
    }

    /// Number of cursors closed.
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::Relaxed)
    }

    /// Number of rows handed out across all cursors.
    pub fn rows_read(&self) -> usize {
        self.rows_read.load(Ordering::Relaxed)
    }

    /// Number of `on_before_enumerate` calls.
    pub fn before_enumerate(&self) -> usize {
        self.before_enumerate.load(Ordering::Relaxed)
    }

    /// Number of `on_after_enumerate` calls.
    pub fn after_enumerate(&self) -> usize {
        self.after_enumerate.load(Ordering::Relaxed)
    }
}

/// In-memory table of raw rows.
///
/// Rows are shared between cursors; opening a cursor does not copy them.
pub struct MemoryRowSource {
    rows: Arc<[Vec<Value>]>,
    /// Row position at which cursors fail (for testing source errors).
    fail_at: Option<usize>,
    stats: Arc<SourceStats>,
}

impl MemoryRowSource {
    /// Creates a source over the given rows.
    pub fn new(rows: Vec<Vec<Value>>) -> Self {
        Self {
            rows: rows.into(),
            fail_at: None,
            stats: Arc::new(SourceStats::default()),
        }
    }

    /// Creates a source whose cursors fail when reading row `position`
    /// (zero-based).
    ///
    /// This is useful for testing error propagation and cleanup.
    pub fn with_failure_at(rows: Vec<Vec<Value>>, position: usize) -> Self {
        Self {
            fail_at: Some(position),
            ..Self::new(rows)
        }
    }

    /// Returns the shared counters.
    pub fn stats(&self) -> &Arc<SourceStats> {
        &self.stats
    }
}

impl RowSource for MemoryRowSource {
    fn open(&self, _context: &EnumerationContext) -> Result<Box<dyn RowCursor>, SourceError> {
        self.stats.opened.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(MemoryCursor {
            rows: Arc::clone(&self.rows),
            position: 0,
            fail_at: self.fail_at,
            stats: Arc::clone(&self.stats),
            closed: false,
        }))
    }

    fn on_before_enumerate(&self, _context: &EnumerationContext) {
        self.stats.before_enumerate.fetch_add(1, Ordering::Relaxed);
    }

    fn on_after_enumerate(&self, _context: &EnumerationContext) {
        self.stats.after_enumerate.fetch_add(1, Ordering::Relaxed);
    }
}

struct MemoryCursor {
    rows: Arc<[Vec<Value>]>,
    position: usize,
    fail_at: Option<usize>,
    stats: Arc<SourceStats>,
    closed: bool,
}

impl RowCursor for MemoryCursor {
    fn next_row(&mut self) -> Result<Option<Vec<Value>>, SourceError> {
        if self.closed {
            return Err("cursor is closed".into());
        }
        if self.fail_at == Some(self.position) {
            return Err(format!("failed to read row {}", self.position).into());
        }
        let row = self.rows.get(self.position).cloned();
        if row.is_some() {
            self.position += 1;
            self.stats.rows_read.fetch_add(1, Ordering::Relaxed);
        }
        Ok(row)
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.stats.closed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl Drop for MemoryCursor {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{EnumerationContext, EnumerationOptions, ParameterContext};

    fn context() -> Arc<EnumerationContext> {
        EnumerationContext::new(EnumerationOptions::default(), ParameterContext::new())
    }

    #[test]
    fn test_cursor_reads_all_rows() {
        let source = MemoryRowSource::new(vec![vec![Value::Int32(1)], vec![Value::Int32(2)]]);
        let ctx = context();
        let mut cursor = source.open(&ctx).unwrap();
        assert_eq!(cursor.next_row().unwrap(), Some(vec![Value::Int32(1)]));
        assert_eq!(cursor.next_row().unwrap(), Some(vec![Value::Int32(2)]));
        assert_eq!(cursor.next_row().unwrap(), None);
        assert_eq!(cursor.next_row().unwrap(), None);
        cursor.close();
        cursor.close();
        drop(cursor);
        assert_eq!(source.stats().opened(), 1);
        assert_eq!(source.stats().closed(), 1);
        assert_eq!(source.stats().rows_read(), 2);
    }

    #[test]
    fn test_failure_injection() {
        let rows = vec![vec![Value::Int32(1)], vec![Value::Int32(2)]];
        let source = MemoryRowSource::with_failure_at(rows, 1);
        let ctx = context();
        let mut cursor = source.open(&ctx).unwrap();
        assert!(cursor.next_row().unwrap().is_some());
        assert!(cursor.next_row().is_err());
    }

    #[tokio::test]
    async fn test_async_defaults_delegate_to_sync() {
        let source = MemoryRowSource::new(vec![vec![Value::text("a")]]);
        let ctx = context();
        let mut cursor = source.open_async(&ctx).await.unwrap();
        assert_eq!(cursor.next_row_async().await.unwrap(), Some(vec![Value::text("a")]));
        assert_eq!(cursor.next_row_async().await.unwrap(), None);
        cursor.close_async().await;
        assert_eq!(source.stats().closed(), 1);
    }
}
