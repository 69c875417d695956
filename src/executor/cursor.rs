//! Tuple cursors.
//!
//! A [`TupleCursor`] is the raw, forward-only tuple stream a provider opens
//! for one record set. Record sets own the lifecycle (prepare, finish,
//! dispose); cursors only produce tuples and release what they hold.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::datum::Value;
use crate::source::{BoxFuture, RowCursor};
use crate::tuple::{MapTransform, PackedTuple, TupleDescriptor};

use super::apply::ApplyCursor;
use super::concat::{ConcatCursor, UnionCursor};
use super::context::EnumerationContext;
use super::error::ExecutorError;
use super::join::JoinCursor;
use super::plan::Predicate;
use super::record_set::RecordSet;

/// A forward-only stream of tuples.
///
/// Uses enum dispatch instead of `dyn Trait`; the set of providers is fixed.
pub enum TupleCursor {
    /// Tuples already in memory (Raw providers and greedy buffers).
    InMemory(InMemoryCursor),
    /// Rows read from a row source.
    Store(StoreCursor),
    /// Rows of the input that satisfy a predicate.
    Filter(FilterCursor),
    /// Projected rows of the input.
    Select(SelectCursor),
    /// Correlated nested loop.
    Apply(ApplyCursor),
    /// Hash equi-join.
    Join(JoinCursor),
    /// Left rows, then right rows.
    Concat(ConcatCursor),
    /// Distinct rows of a concatenation.
    Union(UnionCursor),
}

impl TupleCursor {
    pub(crate) fn raw(tuples: Arc<[PackedTuple]>) -> Self {
        TupleCursor::InMemory(InMemoryCursor { tuples, position: 0 })
    }

    pub(crate) fn buffered(tuples: Vec<PackedTuple>) -> Self {
        Self::raw(tuples.into())
    }

    /// Returns `true` if the tuples are already in memory, so buffering
    /// them again would gain nothing.
    pub fn is_in_memory(&self) -> bool {
        matches!(self, TupleCursor::InMemory(_))
    }

    /// Returns the next tuple, or `None` if exhausted.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<Option<PackedTuple>, ExecutorError> {
        match self {
            TupleCursor::InMemory(c) => Ok(c.next()),
            TupleCursor::Store(c) => c.next(),
            TupleCursor::Filter(c) => c.next(),
            TupleCursor::Select(c) => c.next(),
            TupleCursor::Apply(c) => c.next(),
            TupleCursor::Join(c) => c.next(),
            TupleCursor::Concat(c) => c.next(),
            TupleCursor::Union(c) => c.next(),
        }
    }

    /// Returns the next tuple asynchronously.
    ///
    /// Boxed to break the recursive future cycle
    /// (TupleCursor -> RecordSet -> TupleCursor).
    pub fn next_async<'a>(
        &'a mut self,
        token: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Option<PackedTuple>, ExecutorError>> {
        Box::pin(async move {
            match self {
                TupleCursor::InMemory(c) => {
                    if token.is_cancelled() {
                        return Err(ExecutorError::Cancelled);
                    }
                    Ok(c.next())
                }
                TupleCursor::Store(c) => c.next_async(token).await,
                TupleCursor::Filter(c) => c.next_async().await,
                TupleCursor::Select(c) => c.next_async().await,
                TupleCursor::Apply(c) => c.next_async(token).await,
                TupleCursor::Join(c) => c.next_async().await,
                TupleCursor::Concat(c) => c.next_async(token).await,
                TupleCursor::Union(c) => c.next_async(token).await,
            }
        })
    }

    /// Releases everything the cursor holds. Idempotent.
    pub fn close(&mut self) {
        match self {
            TupleCursor::InMemory(_) => {}
            TupleCursor::Store(c) => c.close(),
            TupleCursor::Filter(c) => c.input.dispose(),
            TupleCursor::Select(c) => c.input.dispose(),
            TupleCursor::Apply(c) => c.close(),
            TupleCursor::Join(c) => c.close(),
            TupleCursor::Concat(c) => c.close(),
            TupleCursor::Union(c) => c.close(),
        }
    }

    /// Releases everything the cursor holds, asynchronously.
    pub fn close_async(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            match self {
                TupleCursor::InMemory(_) => {}
                TupleCursor::Store(c) => c.close_async().await,
                TupleCursor::Filter(c) => c.input.dispose_async().await,
                TupleCursor::Select(c) => c.input.dispose_async().await,
                TupleCursor::Apply(c) => c.close_async().await,
                TupleCursor::Join(c) => c.close_async().await,
                TupleCursor::Concat(c) => c.close_async().await,
                TupleCursor::Union(c) => c.close_async().await,
            }
        })
    }
}

/// Cursor over shared in-memory tuples.
pub struct InMemoryCursor {
    tuples: Arc<[PackedTuple]>,
    position: usize,
}

impl InMemoryCursor {
    fn next(&mut self) -> Option<PackedTuple> {
        let tuple = self.tuples.get(self.position).cloned();
        if tuple.is_some() {
            self.position += 1;
        }
        tuple
    }
}

/// Cursor that packs rows from a [`RowCursor`].
///
/// The row cursor is closed as soon as it is exhausted.
pub struct StoreCursor {
    descriptor: Arc<TupleDescriptor>,
    rows: Option<Box<dyn RowCursor>>,
}

impl StoreCursor {
    pub(crate) fn new(descriptor: &Arc<TupleDescriptor>, rows: Box<dyn RowCursor>) -> Self {
        Self {
            descriptor: Arc::clone(descriptor),
            rows: Some(rows),
        }
    }

    fn pack(&mut self, row: Option<Vec<Value>>) -> Result<Option<PackedTuple>, ExecutorError> {
        match row {
            Some(values) => Ok(Some(PackedTuple::from_values(&self.descriptor, values)?)),
            None => {
                self.close();
                Ok(None)
            }
        }
    }

    fn next(&mut self) -> Result<Option<PackedTuple>, ExecutorError> {
        let Some(rows) = self.rows.as_mut() else {
            return Ok(None);
        };
        let row = rows.next_row().map_err(ExecutorError::Source)?;
        self.pack(row)
    }

    async fn next_async(&mut self, token: &CancellationToken) -> Result<Option<PackedTuple>, ExecutorError> {
        let Some(rows) = self.rows.as_mut() else {
            return Ok(None);
        };
        let row = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(ExecutorError::Cancelled),
            row = rows.next_row_async() => row.map_err(ExecutorError::Source)?,
        };
        self.pack(row)
    }

    fn close(&mut self) {
        if let Some(mut rows) = self.rows.take() {
            rows.close();
        }
    }

    async fn close_async(&mut self) {
        if let Some(mut rows) = self.rows.take() {
            rows.close_async().await;
        }
    }
}

/// Cursor yielding the input tuples that satisfy a predicate.
pub struct FilterCursor {
    input: RecordSet,
    predicate: Predicate,
    context: Arc<EnumerationContext>,
}

impl FilterCursor {
    pub(crate) fn new(input: RecordSet, predicate: Predicate, context: &Arc<EnumerationContext>) -> Self {
        Self {
            input,
            predicate,
            context: Arc::clone(context),
        }
    }

    fn next(&mut self) -> Result<Option<PackedTuple>, ExecutorError> {
        while let Some(tuple) = self.input.advance()? {
            if (self.predicate)(&tuple, &self.context)? {
                return Ok(Some(tuple));
            }
        }
        Ok(None)
    }

    async fn next_async(&mut self) -> Result<Option<PackedTuple>, ExecutorError> {
        while let Some(tuple) = self.input.advance_async().await? {
            if (self.predicate)(&tuple, &self.context)? {
                return Ok(Some(tuple));
            }
        }
        Ok(None)
    }
}

/// Cursor yielding projected input tuples.
pub struct SelectCursor {
    input: RecordSet,
    transform: MapTransform,
}

impl SelectCursor {
    pub(crate) fn new(input: RecordSet, transform: MapTransform) -> Self {
        Self { input, transform }
    }

    fn next(&mut self) -> Result<Option<PackedTuple>, ExecutorError> {
        match self.input.advance()? {
            Some(tuple) => Ok(Some(self.transform.apply(&tuple)?)),
            None => Ok(None),
        }
    }

    async fn next_async(&mut self) -> Result<Option<PackedTuple>, ExecutorError> {
        match self.input.advance_async().await? {
            Some(tuple) => Ok(Some(self.transform.apply(&tuple)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::{Type, Value};
    use crate::executor::{EnumerationOptions, ExecutableProvider, ParameterContext, Plan};
    use crate::source::MemoryRowSource;

    fn context() -> Arc<EnumerationContext> {
        EnumerationContext::new(EnumerationOptions::default(), ParameterContext::new())
    }

    fn drain(cursor: &mut TupleCursor) -> Vec<Vec<Value>> {
        let mut rows = Vec::new();
        while let Some(t) = cursor.next().unwrap() {
            rows.push(t.to_values());
        }
        rows
    }

    #[test]
    fn test_in_memory_cursor() {
        let d = TupleDescriptor::new(&[Type::Int4]);
        let tuples = vec![
            PackedTuple::from_values(&d, vec![Value::Int32(1)]).unwrap(),
            PackedTuple::from_values(&d, vec![Value::Int32(2)]).unwrap(),
        ];
        let mut cursor = TupleCursor::buffered(tuples);
        assert!(cursor.is_in_memory());
        assert_eq!(drain(&mut cursor), vec![vec![Value::Int32(1)], vec![Value::Int32(2)]]);
        assert!(cursor.next().unwrap().is_none());
    }

    #[test]
    fn test_store_cursor_closes_source_on_exhaustion() {
        let d = TupleDescriptor::new(&[Type::Int4, Type::Text]);
        let source = Arc::new(MemoryRowSource::new(vec![vec![
            Value::Int32(1),
            Value::text("a"),
        ]]));
        let provider = ExecutableProvider::compile(&Plan::store("t", &d, source.clone())).unwrap();
        let mut cursor = provider.on_enumerate(&context()).unwrap();
        assert!(!cursor.is_in_memory());
        assert_eq!(drain(&mut cursor), vec![vec![Value::Int32(1), Value::text("a")]]);
        assert_eq!(source.stats().closed(), 1);
        cursor.close();
        assert_eq!(source.stats().closed(), 1);
    }

    #[test]
    fn test_store_cursor_rejects_bad_rows() {
        let d = TupleDescriptor::new(&[Type::Int4]);
        let source = Arc::new(MemoryRowSource::new(vec![vec![Value::text("oops")]]));
        let provider = ExecutableProvider::compile(&Plan::store("t", &d, source)).unwrap();
        let mut cursor = provider.on_enumerate(&context()).unwrap();
        assert!(matches!(cursor.next(), Err(ExecutorError::Tuple(_))));
    }

    #[test]
    fn test_filter_and_select() {
        let d = TupleDescriptor::new(&[Type::Int4, Type::Text]);
        let tuples = (1..=4)
            .map(|i| PackedTuple::from_values(&d, vec![Value::Int32(i), Value::text("x")]).unwrap())
            .collect();
        let raw = Plan::raw(&d, tuples).unwrap();
        let filter = Plan::filter(&raw, |t, _| Ok(t.get_scalar::<i32>(0)?.is_some_and(|v| v % 2 == 0)));
        let select = Plan::select(&filter, &[0]).unwrap();
        let provider = ExecutableProvider::compile(&select).unwrap();

        let mut cursor = provider.on_enumerate(&context()).unwrap();
        assert_eq!(drain(&mut cursor), vec![vec![Value::Int32(2)], vec![Value::Int32(4)]]);
        cursor.close();
    }

    #[test]
    fn test_filter_propagates_predicate_errors() {
        let d = TupleDescriptor::new(&[Type::Int4]);
        let raw = Plan::raw(&d, vec![PackedTuple::new(&d)]).unwrap();
        // field 0 is unavailable, so the typed read fails
        let filter = Plan::filter(&raw, |t, _| Ok(t.get_scalar::<i32>(0)?.is_some()));
        let provider = ExecutableProvider::compile(&filter).unwrap();
        let mut cursor = provider.on_enumerate(&context()).unwrap();
        assert!(matches!(
            cursor.next(),
            Err(ExecutorError::Tuple(crate::tuple::TupleError::FieldUnavailable { index: 0 }))
        ));
    }

    #[tokio::test]
    async fn test_next_async_honors_cancellation() {
        let d = TupleDescriptor::new(&[Type::Int4]);
        let source = Arc::new(MemoryRowSource::new(vec![vec![Value::Int32(1)]]));
        let provider = ExecutableProvider::compile(&Plan::store("t", &d, source)).unwrap();
        let token = CancellationToken::new();
        let mut cursor = provider.on_enumerate_async(&context(), &token).await.unwrap();
        token.cancel();
        assert!(matches!(cursor.next_async(&token).await, Err(ExecutorError::Cancelled)));
        cursor.close_async().await;
    }
}
