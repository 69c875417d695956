//! Row source trait definitions.

use crate::datum::Value;
use crate::executor::EnumerationContext;

/// Boxed, sendable future returned by the object-safe async methods.
pub type BoxFuture<'a, T> = futures_util::future::BoxFuture<'a, T>;

/// Error raised by an external row source.
pub type SourceError = Box<dyn std::error::Error + Send + Sync>;

/// Factory of row cursors.
///
/// A source is shared by every enumeration of the provider tree that holds
/// it, so it must be `Send + Sync`. All per-enumeration state lives in the
/// cursors it opens.
///
/// # Design Decisions
///
/// 1. **Object safe**: async methods return [`BoxFuture`] so store providers
///    can hold `Arc<dyn RowSource>` without becoming generic.
///
/// 2. **Sync by default**: the async methods default to the sync ones, so an
///    in-memory source only implements `open`/`next_row`.
pub trait RowSource: Send + Sync {
    /// Opens a cursor over the source's rows.
    ///
    /// The context carries query parameters and parameters bound by an
    /// enclosing Apply, which a source may use to restrict its rows.
    fn open(&self, context: &EnumerationContext) -> Result<Box<dyn RowCursor>, SourceError>;

    /// Opens a cursor asynchronously.
    fn open_async<'a>(
        &'a self,
        context: &'a EnumerationContext,
    ) -> BoxFuture<'a, Result<Box<dyn RowCursor>, SourceError>> {
        Box::pin(async move { self.open(context) })
    }

    /// Called once per enumeration context before the first cursor is opened.
    fn on_before_enumerate(&self, _context: &EnumerationContext) {}

    /// Called once per enumeration context after the first successful or
    /// failed exhaustion of the enclosing provider.
    fn on_after_enumerate(&self, _context: &EnumerationContext) {}
}

/// Forward-only cursor over raw rows.
pub trait RowCursor: Send {
    /// Returns the next row, or `None` when exhausted.
    fn next_row(&mut self) -> Result<Option<Vec<Value>>, SourceError>;

    /// Returns the next row asynchronously.
    fn next_row_async(&mut self) -> BoxFuture<'_, Result<Option<Vec<Value>>, SourceError>> {
        Box::pin(async move { self.next_row() })
    }

    /// Releases the cursor. Called at most once by the executor.
    fn close(&mut self) {}

    /// Releases the cursor asynchronously.
    fn close_async(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move { self.close() })
    }
}
