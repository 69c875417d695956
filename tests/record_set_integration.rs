//! Integration tests for record set lifecycle, greedy buffering, errors and
//! cancellation through the public API.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tuplestream::datum::{Type, Value};
use tuplestream::executor::{
    EnumerationContext, EnumerationOptions, ExecutableProvider, ExecutorError, ParameterContext,
    Plan, RecordSetState, Session, SessionConfig,
};
use tuplestream::source::{BoxFuture, MemoryRowSource, RowCursor, RowSource, SourceError};
use tuplestream::tuple::TupleDescriptor;

fn int_rows(n: i32) -> Vec<Vec<Value>> {
    (1..=n).map(|i| vec![Value::Int32(i), Value::text(&format!("row {}", i))]).collect()
}

fn table(source: &Arc<MemoryRowSource>) -> Arc<ExecutableProvider> {
    let d = TupleDescriptor::new(&[Type::Int4, Type::Text]);
    ExecutableProvider::compile(&Plan::store("items", &d, source.clone())).unwrap()
}

fn session(greedy: bool) -> Session {
    Session::new(SessionConfig {
        greedy_enumeration: greedy,
    })
}

#[test]
fn test_move_next_after_exhaustion_is_idempotent() {
    let source = Arc::new(MemoryRowSource::new(int_rows(2)));
    let provider = table(&source);
    let mut rs = provider
        .get_record_set(&session(false), ParameterContext::new())
        .unwrap();

    assert!(rs.move_next().unwrap());
    assert!(rs.move_next().unwrap());
    for _ in 0..3 {
        assert!(!rs.move_next().unwrap());
    }
    assert_eq!(rs.state(), RecordSetState::Finished);

    rs.dispose();
    rs.dispose();
    drop(rs);
    assert_eq!(source.stats().opened(), 1);
    assert_eq!(source.stats().closed(), 1);
}

#[test]
fn test_dispose_after_zero_one_or_many_advances() {
    for advances in [0, 1, 5] {
        let source = Arc::new(MemoryRowSource::new(int_rows(3)));
        let provider = table(&source);
        let ctx = EnumerationContext::new(EnumerationOptions::default(), ParameterContext::new());
        let mut rs = provider.enumerate(&ctx).unwrap();
        for _ in 0..advances {
            let _ = rs.move_next().unwrap();
        }
        rs.dispose();
        rs.dispose();

        assert_eq!(source.stats().closed(), 1, "advances = {}", advances);
        let stats = ctx.stats();
        assert_eq!(stats.scopes_disposed, 1);
        assert_eq!(stats.active_scopes, 0);
        assert_eq!(stats.scopes_completed, usize::from(advances > 3));
    }
}

#[test]
fn test_greedy_releases_source_before_first_tuple() {
    let source = Arc::new(MemoryRowSource::new(int_rows(4)));
    let provider = table(&source);
    let mut rs = provider
        .get_record_set(&session(true), ParameterContext::new())
        .unwrap();

    assert_eq!(source.stats().rows_read(), 4);
    assert_eq!(source.stats().closed(), 1);

    assert!(rs.move_next().unwrap());
    assert_eq!(rs.current().unwrap().get_scalar::<i32>(0).unwrap(), Some(1));
    // abandon without finishing
    drop(rs);
    assert_eq!(source.stats().closed(), 1);
}

#[test]
fn test_greedy_applies_to_nested_record_sets() {
    let source = Arc::new(MemoryRowSource::new(int_rows(3)));
    let d = TupleDescriptor::new(&[Type::Int4, Type::Text]);
    let store = Plan::store("items", &d, source.clone());
    let filter = Plan::filter(&store, |t, _| Ok(t.get_scalar::<i32>(0)? != Some(2)));
    let provider = ExecutableProvider::compile(&filter).unwrap();

    let rows: Vec<_> = provider
        .get_record_set(&session(true), ParameterContext::new())
        .unwrap()
        .map(|t| t.unwrap().get_scalar::<i32>(0).unwrap())
        .collect();
    assert_eq!(rows, vec![Some(1), Some(3)]);
    assert_eq!(source.stats().closed(), 1);
}

#[test]
fn test_error_on_third_row() {
    let source = Arc::new(MemoryRowSource::with_failure_at(int_rows(10), 2));
    let provider = table(&source);
    let ctx = EnumerationContext::new(EnumerationOptions::default(), ParameterContext::new());
    let mut rs = provider.enumerate(&ctx).unwrap();

    assert!(rs.move_next().unwrap());
    assert!(rs.move_next().unwrap());
    let err = rs.move_next().unwrap_err();
    assert!(matches!(err, ExecutorError::Source(_)));
    assert!(!err.is_cancelled());

    rs.dispose();
    rs.dispose();
    let stats = ctx.stats();
    assert_eq!(stats.scopes_disposed, 1);
    assert_eq!(stats.scopes_completed, 0);
}

#[test]
fn test_failed_run_skips_completion_only_resources() {
    let committed = Arc::new(AtomicUsize::new(0));
    let released = Arc::new(AtomicUsize::new(0));

    for (fail_at, expect_committed) in [(None, 1), (Some(1), 1)] {
        let rows = int_rows(3);
        let source = Arc::new(match fail_at {
            Some(at) => MemoryRowSource::with_failure_at(rows, at),
            None => MemoryRowSource::new(rows),
        });
        let provider = table(&source);
        let ctx = EnumerationContext::new(EnumerationOptions::default(), ParameterContext::new());
        {
            let committed = Arc::clone(&committed);
            let released = Arc::clone(&released);
            ctx.attach_resource(move |completed: bool| {
                released.fetch_add(1, Ordering::Relaxed);
                if completed {
                    committed.fetch_add(1, Ordering::Relaxed);
                }
            });
        }
        let results: Vec<_> = provider.enumerate(&ctx).unwrap().collect();
        assert_eq!(results.iter().any(Result::is_err), fail_at.is_some());
        assert_eq!(committed.load(Ordering::Relaxed), expect_committed);
    }
    assert_eq!(released.load(Ordering::Relaxed), 2);
}

#[test]
fn test_concurrent_enumerations_share_compiled_tree() {
    let source = Arc::new(MemoryRowSource::new(int_rows(50)));
    let provider = table(&source);
    let session = Arc::new(session(false));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let provider = Arc::clone(&provider);
            let session = Arc::clone(&session);
            std::thread::spawn(move || {
                provider
                    .get_record_set(&*session, ParameterContext::new())
                    .unwrap()
                    .map(Result::unwrap)
                    .count()
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), 50);
    }
    assert_eq!(source.stats().before_enumerate(), 4);
    assert_eq!(source.stats().after_enumerate(), 4);
}

#[tokio::test]
async fn test_async_enumeration_matches_sync() {
    let source = Arc::new(MemoryRowSource::new(int_rows(5)));
    let provider = table(&source);
    let token = CancellationToken::new();

    let mut rs = provider
        .get_record_set_async(&session(false), ParameterContext::new(), &token)
        .await
        .unwrap();
    let mut ids = Vec::new();
    while rs.move_next_async().await.unwrap() {
        ids.push(rs.current().unwrap().get_scalar::<i32>(0).unwrap());
    }
    rs.dispose_async().await;
    assert_eq!(ids, (1..=5).map(Some).collect::<Vec<_>>());

    let streamed: Vec<_> = provider
        .get_record_set_async(&session(true), ParameterContext::new(), &token)
        .await
        .unwrap()
        .into_stream()
        .map(|t| t.unwrap().get_scalar::<i32>(0).unwrap())
        .collect()
        .await;
    assert_eq!(streamed, ids);
}

/// Row source whose async reads wait before producing each row.
struct SlowSource {
    rows: usize,
    delay: Duration,
    closed: Arc<AtomicUsize>,
}

struct SlowCursor {
    remaining: usize,
    delay: Duration,
    closed: Arc<AtomicUsize>,
}

impl RowSource for SlowSource {
    fn open(&self, _context: &EnumerationContext) -> Result<Box<dyn RowCursor>, SourceError> {
        Ok(Box::new(SlowCursor {
            remaining: self.rows,
            delay: self.delay,
            closed: Arc::clone(&self.closed),
        }))
    }
}

impl RowCursor for SlowCursor {
    fn next_row(&mut self) -> Result<Option<Vec<Value>>, SourceError> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        Ok(Some(vec![Value::Int32(self.remaining as i32)]))
    }

    fn next_row_async(&mut self) -> BoxFuture<'_, Result<Option<Vec<Value>>, SourceError>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            self.next_row()
        })
    }

    fn close(&mut self) {
        self.closed.fetch_add(1, Ordering::Relaxed);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancellation_interrupts_pending_read() {
    let closed = Arc::new(AtomicUsize::new(0));
    let source = Arc::new(SlowSource {
        rows: 3,
        delay: Duration::from_secs(60),
        closed: Arc::clone(&closed),
    });
    let d = TupleDescriptor::new(&[Type::Int4]);
    let provider = ExecutableProvider::compile(&Plan::store("slow", &d, source)).unwrap();
    let ctx = EnumerationContext::new(EnumerationOptions::default(), ParameterContext::new());
    let token = CancellationToken::new();

    let canceller = {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        })
    };

    let err = provider.enumerate_async(&ctx, &token).await.unwrap_err();
    assert!(err.is_cancelled());
    canceller.await.unwrap();

    assert_eq!(closed.load(Ordering::Relaxed), 1);
    assert_eq!(ctx.stats().scopes_disposed, 1);
    assert_eq!(ctx.stats().scopes_completed, 0);
}

#[tokio::test]
async fn test_cancelled_token_is_checked_at_entry() {
    let source = Arc::new(MemoryRowSource::new(int_rows(1)));
    let provider = table(&source);
    let token = CancellationToken::new();
    token.cancel();

    let err = provider
        .get_record_set_async(&session(false), ParameterContext::new(), &token)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(source.stats().opened(), 0);
}
