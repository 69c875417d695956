//! Record sets.
//!
//! A [`RecordSet`] is the lifecycle-managed enumeration of one provider in
//! one context:
//!
//! ```text
//!   create/create_async
//!         |
//!       [New] --prepare--> [Prepared] --exhausted/error--> [Finished]
//!                              |                                |
//!                              +-------------dispose------------+
//! ```
//!
//! Preparing opens an enumeration scope, runs the provider's before-hooks
//! once per context, opens the cursor (draining it when enumeration is
//! greedy) and prefetches the first tuple. Finishing runs the after-hooks
//! if this record set ran the before-hooks, and completes the scope unless
//! an error occurred. Disposing closes the cursor and the scope.

use std::sync::Arc;

use futures_util::stream::{self, Stream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::tuple::PackedTuple;

use super::context::{EnumerationContext, EnumerationScope};
use super::cursor::TupleCursor;
use super::error::ExecutorError;
use super::provider::ExecutableProvider;

/// Lifecycle state of a [`RecordSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordSetState {
    /// Created, not yet prepared.
    New,
    /// Prepared; tuples may be pulled.
    Prepared,
    /// Exhausted or failed; no more tuples.
    Finished,
}

/// Forward-only, disposable stream of tuples produced by a provider.
///
/// Dropping a record set disposes it.
pub struct RecordSet {
    context: Arc<EnumerationContext>,
    provider: Arc<ExecutableProvider>,
    token: CancellationToken,
    state: RecordSetState,
    /// This record set ran the provider's before-hooks.
    owns_hooks: bool,
    finished: bool,
    disposed: bool,
    scope: Option<EnumerationScope>,
    cursor: Option<Box<TupleCursor>>,
    prefetched: Option<PackedTuple>,
    current: Option<PackedTuple>,
}

impl RecordSet {
    fn new(
        context: &Arc<EnumerationContext>,
        provider: &Arc<ExecutableProvider>,
        token: CancellationToken,
    ) -> Self {
        Self {
            context: Arc::clone(context),
            provider: Arc::clone(provider),
            token,
            state: RecordSetState::New,
            owns_hooks: false,
            finished: false,
            disposed: false,
            scope: None,
            cursor: None,
            prefetched: None,
            current: None,
        }
    }

    /// Creates and prepares a record set.
    ///
    /// Errors raised before the first tuple (including opening the source)
    /// surface here; the record set is disposed before returning them.
    pub fn create(
        context: &Arc<EnumerationContext>,
        provider: &Arc<ExecutableProvider>,
    ) -> Result<Self, ExecutorError> {
        let mut record_set = Self::new(context, provider, CancellationToken::new());
        record_set.begin();
        match record_set.open() {
            Ok(()) => {
                record_set.state = RecordSetState::Prepared;
                Ok(record_set)
            }
            Err(e) => {
                record_set.finish(true);
                record_set.dispose();
                Err(e)
            }
        }
    }

    /// Creates and prepares a record set asynchronously.
    ///
    /// The token is observed for the whole lifetime of the record set.
    pub async fn create_async(
        context: &Arc<EnumerationContext>,
        provider: &Arc<ExecutableProvider>,
        token: &CancellationToken,
    ) -> Result<Self, ExecutorError> {
        let mut record_set = Self::new(context, provider, token.clone());
        record_set.begin();
        match record_set.open_async().await {
            Ok(()) => {
                record_set.state = RecordSetState::Prepared;
                Ok(record_set)
            }
            Err(e) => {
                record_set.finish(true);
                record_set.dispose_async().await;
                Err(e)
            }
        }
    }

    fn begin(&mut self) {
        trace!(id = ?self.provider.id(), "preparing record set");
        self.scope = Some(self.context.begin_enumeration());
        if !self.provider.is_enumerated(&self.context) {
            self.provider.on_before_enumerate(&self.context);
            self.owns_hooks = true;
        }
    }

    fn open(&mut self) -> Result<(), ExecutorError> {
        let cursor: &mut TupleCursor = self
            .cursor
            .insert(Box::new(self.provider.on_enumerate(&self.context)?));
        if self.context.options().greedy && !cursor.is_in_memory() {
            let mut tuples = Vec::new();
            while let Some(tuple) = cursor.next()? {
                tuples.push(tuple);
            }
            cursor.close();
            debug!(id = ?self.provider.id(), count = tuples.len(), "buffered greedy enumeration");
            *cursor = TupleCursor::buffered(tuples);
        }
        self.prefetched = cursor.next()?;
        Ok(())
    }

    async fn open_async(&mut self) -> Result<(), ExecutorError> {
        let cursor = self
            .provider
            .on_enumerate_async(&self.context, &self.token)
            .await?;
        let cursor: &mut TupleCursor = self.cursor.insert(Box::new(cursor));
        if self.context.options().greedy && !cursor.is_in_memory() {
            let mut tuples = Vec::new();
            while let Some(tuple) = cursor.next_async(&self.token).await? {
                tuples.push(tuple);
            }
            cursor.close_async().await;
            debug!(id = ?self.provider.id(), count = tuples.len(), "buffered greedy enumeration");
            *cursor = TupleCursor::buffered(tuples);
        }
        self.prefetched = cursor.next_async(&self.token).await?;
        Ok(())
    }

    fn finish(&mut self, is_error: bool) {
        if self.finished {
            return;
        }
        self.finished = true;
        if self.owns_hooks {
            self.provider.on_after_enumerate(&self.context);
        }
        if !is_error && let Some(scope) = self.scope.as_mut() {
            scope.complete();
        }
        debug!(id = ?self.provider.id(), is_error, "record set finished");
    }

    fn settle(
        &mut self,
        next: Result<Option<PackedTuple>, ExecutorError>,
    ) -> Result<Option<PackedTuple>, ExecutorError> {
        match next {
            Ok(Some(tuple)) => Ok(Some(tuple)),
            Ok(None) => {
                self.state = RecordSetState::Finished;
                self.finish(false);
                Ok(None)
            }
            Err(e) => {
                if e.is_cancelled() {
                    debug!(id = ?self.provider.id(), "enumeration cancelled");
                }
                self.state = RecordSetState::Finished;
                self.finish(true);
                Err(e)
            }
        }
    }

    /// Pulls the next tuple without touching `current`.
    pub(crate) fn advance(&mut self) -> Result<Option<PackedTuple>, ExecutorError> {
        match self.state {
            RecordSetState::New => Err(ExecutorError::NotPrepared),
            RecordSetState::Finished => Ok(None),
            RecordSetState::Prepared => {
                let next = match (self.prefetched.take(), self.cursor.as_deref_mut()) {
                    (Some(tuple), _) => Ok(Some(tuple)),
                    (None, Some(cursor)) => cursor.next(),
                    (None, None) => Ok(None),
                };
                self.settle(next)
            }
        }
    }

    /// Asynchronous form of [`RecordSet::advance`].
    pub(crate) async fn advance_async(&mut self) -> Result<Option<PackedTuple>, ExecutorError> {
        match self.state {
            RecordSetState::New => Err(ExecutorError::NotPrepared),
            RecordSetState::Finished => Ok(None),
            RecordSetState::Prepared => {
                let next = match (self.prefetched.take(), self.cursor.as_deref_mut()) {
                    (Some(tuple), _) => Ok(Some(tuple)),
                    (None, Some(cursor)) => cursor.next_async(&self.token).await,
                    (None, None) => Ok(None),
                };
                self.settle(next)
            }
        }
    }

    /// Advances to the next tuple. Returns `false` once exhausted.
    ///
    /// # Errors
    ///
    /// Propagates provider and source errors. After an error the record set
    /// is finished and further calls return `Ok(false)`.
    pub fn move_next(&mut self) -> Result<bool, ExecutorError> {
        self.current = self.advance()?;
        Ok(self.current.is_some())
    }

    /// Asynchronous form of [`RecordSet::move_next`].
    pub async fn move_next_async(&mut self) -> Result<bool, ExecutorError> {
        self.current = self.advance_async().await?;
        Ok(self.current.is_some())
    }

    /// Returns the tuple the last successful `move_next` advanced to.
    pub fn current(&self) -> Option<&PackedTuple> {
        self.current.as_ref()
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> RecordSetState {
        self.state
    }

    /// Returns the provider being enumerated.
    pub fn provider(&self) -> &Arc<ExecutableProvider> {
        &self.provider
    }

    /// Returns the enumeration context.
    pub fn context(&self) -> &Arc<EnumerationContext> {
        &self.context
    }

    /// Closes the cursor and the enumeration scope. Idempotent.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.prefetched = None;
        if let Some(mut cursor) = self.cursor.take() {
            cursor.close();
        }
        if let Some(mut scope) = self.scope.take() {
            scope.dispose();
        }
    }

    /// Asynchronous form of [`RecordSet::dispose`].
    pub async fn dispose_async(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.prefetched = None;
        if let Some(mut cursor) = self.cursor.take() {
            cursor.close_async().await;
        }
        if let Some(mut scope) = self.scope.take() {
            scope.dispose();
        }
    }

    /// Converts the record set into an asynchronous stream of tuples.
    ///
    /// The record set is disposed when the stream ends or is dropped.
    pub fn into_stream(self) -> impl Stream<Item = Result<PackedTuple, ExecutorError>> + Send {
        stream::unfold(Some(self), |record_set| async move {
            let mut record_set = record_set?;
            match record_set.advance_async().await {
                Ok(Some(tuple)) => Some((Ok(tuple), Some(record_set))),
                Ok(None) => {
                    record_set.dispose_async().await;
                    None
                }
                Err(e) => {
                    record_set.dispose_async().await;
                    Some((Err(e), None))
                }
            }
        })
    }
}

impl Iterator for RecordSet {
    type Item = Result<PackedTuple, ExecutorError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.advance().transpose()
    }
}

impl Drop for RecordSet {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for RecordSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordSet")
            .field("provider", &self.provider)
            .field("state", &self.state)
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}
