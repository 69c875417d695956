//! Concat and Union.
//!
//! Concat streams the left input and then the right input. The right record
//! set is only created once the left one is exhausted, so the two are never
//! open at the same time. Union filters a concatenation down to the first
//! occurrence of each tuple.

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::tuple::PackedTuple;

use super::context::EnumerationContext;
use super::error::ExecutorError;
use super::provider::ExecutableProvider;
use super::record_set::RecordSet;

enum Side {
    Left(RecordSet),
    Right(RecordSet),
    Done,
}

/// Cursor streaming left then right.
pub struct ConcatCursor {
    right_provider: Arc<ExecutableProvider>,
    context: Arc<EnumerationContext>,
    side: Side,
}

impl ConcatCursor {
    pub(crate) fn open(
        left: &Arc<ExecutableProvider>,
        right: &Arc<ExecutableProvider>,
        context: &Arc<EnumerationContext>,
    ) -> Result<Self, ExecutorError> {
        let left = left.enumerate(context)?;
        Ok(Self::new(right, context, left))
    }

    pub(crate) async fn open_async(
        left: &Arc<ExecutableProvider>,
        right: &Arc<ExecutableProvider>,
        context: &Arc<EnumerationContext>,
        token: &CancellationToken,
    ) -> Result<Self, ExecutorError> {
        let left = left.enumerate_async(context, token).await?;
        Ok(Self::new(right, context, left))
    }

    fn new(right: &Arc<ExecutableProvider>, context: &Arc<EnumerationContext>, left: RecordSet) -> Self {
        Self {
            right_provider: Arc::clone(right),
            context: Arc::clone(context),
            side: Side::Left(left),
        }
    }

    /// Returns the next tuple. After an error the cursor is closed and
    /// yields nothing more.
    pub(crate) fn next(&mut self) -> Result<Option<PackedTuple>, ExecutorError> {
        let next = self.pull();
        if next.is_err() {
            self.close();
        }
        next
    }

    fn pull(&mut self) -> Result<Option<PackedTuple>, ExecutorError> {
        loop {
            match &mut self.side {
                Side::Left(left) => {
                    if let Some(tuple) = left.advance()? {
                        return Ok(Some(tuple));
                    }
                    left.dispose();
                    // mark done first so a failing right side is not retried
                    self.side = Side::Done;
                    self.side = Side::Right(self.right_provider.enumerate(&self.context)?);
                }
                Side::Right(right) => {
                    let next = right.advance()?;
                    if next.is_none() {
                        right.dispose();
                        self.side = Side::Done;
                    }
                    return Ok(next);
                }
                Side::Done => return Ok(None),
            }
        }
    }

    pub(crate) async fn next_async(
        &mut self,
        token: &CancellationToken,
    ) -> Result<Option<PackedTuple>, ExecutorError> {
        let next = self.pull_async(token).await;
        if next.is_err() {
            self.close_async().await;
        }
        next
    }

    async fn pull_async(&mut self, token: &CancellationToken) -> Result<Option<PackedTuple>, ExecutorError> {
        loop {
            match &mut self.side {
                Side::Left(left) => {
                    if let Some(tuple) = left.advance_async().await? {
                        return Ok(Some(tuple));
                    }
                    left.dispose_async().await;
                    self.side = Side::Done;
                    let right = self
                        .right_provider
                        .enumerate_async(&self.context, token)
                        .await?;
                    self.side = Side::Right(right);
                }
                Side::Right(right) => {
                    let next = right.advance_async().await?;
                    if next.is_none() {
                        right.dispose_async().await;
                        self.side = Side::Done;
                    }
                    return Ok(next);
                }
                Side::Done => return Ok(None),
            }
        }
    }

    pub(crate) fn close(&mut self) {
        match std::mem::replace(&mut self.side, Side::Done) {
            Side::Left(mut rs) | Side::Right(mut rs) => rs.dispose(),
            Side::Done => {}
        }
    }

    pub(crate) async fn close_async(&mut self) {
        match std::mem::replace(&mut self.side, Side::Done) {
            Side::Left(mut rs) | Side::Right(mut rs) => rs.dispose_async().await,
            Side::Done => {}
        }
    }
}

/// Cursor yielding the distinct tuples of a concatenation, in order of first
/// occurrence.
pub struct UnionCursor {
    inner: ConcatCursor,
    seen: HashSet<PackedTuple>,
}

impl UnionCursor {
    pub(crate) fn new(inner: ConcatCursor) -> Self {
        Self {
            inner,
            seen: HashSet::new(),
        }
    }

    pub(crate) fn next(&mut self) -> Result<Option<PackedTuple>, ExecutorError> {
        while let Some(tuple) = self.inner.next()? {
            if self.seen.insert(tuple.clone()) {
                return Ok(Some(tuple));
            }
        }
        Ok(None)
    }

    pub(crate) async fn next_async(
        &mut self,
        token: &CancellationToken,
    ) -> Result<Option<PackedTuple>, ExecutorError> {
        while let Some(tuple) = self.inner.next_async(token).await? {
            if self.seen.insert(tuple.clone()) {
                return Ok(Some(tuple));
            }
        }
        Ok(None)
    }

    pub(crate) fn close(&mut self) {
        self.seen.clear();
        self.inner.close();
    }

    pub(crate) async fn close_async(&mut self) {
        self.seen.clear();
        self.inner.close_async().await;
    }
}
