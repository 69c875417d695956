//! Executable providers.
//!
//! [`ExecutableProvider::compile`] turns a [`Plan`] into a tree of executable
//! providers. Compilation builds the per-node transforms once; enumeration
//! opens a fresh [`TupleCursor`] per record set.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::source::{BoxFuture, RowSource};
use crate::tuple::{MapTransform, PackedTuple, TupleDescriptor};

use super::apply::{ApplyCursor, ApplyProvider};
use super::concat::{ConcatCursor, UnionCursor};
use super::context::EnumerationContext;
use super::cursor::{FilterCursor, SelectCursor, StoreCursor, TupleCursor};
use super::error::ExecutorError;
use super::join::{JoinCursor, JoinProvider};
use super::parameter::ParameterContext;
use super::plan::{Plan, PlanKind, Predicate};
use super::record_set::RecordSet;
use super::session::SessionBinding;

static NEXT_PROVIDER_ID: AtomicU64 = AtomicU64::new(1);

/// Context cache markers.
const ENUMERATED: &str = "Enumerated";
const FINALIZED: &str = "Finalized";

/// Identity of a compiled provider, used to key per-context state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProviderId(u64);

impl ProviderId {
    pub(crate) fn next() -> Self {
        ProviderId(NEXT_PROVIDER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A compiled provider.
///
/// Immutable after compilation and shared through `Arc`, so one compiled
/// tree can be enumerated by any number of contexts concurrently.
pub struct ExecutableProvider {
    id: ProviderId,
    origin: Arc<Plan>,
    sources: Vec<Arc<ExecutableProvider>>,
    kind: ProviderKind,
}

enum ProviderKind {
    Raw(Arc<[PackedTuple]>),
    Store(Arc<dyn RowSource>),
    Filter(Predicate),
    Select(MapTransform),
    Apply(Arc<ApplyProvider>),
    Join(Arc<JoinProvider>),
    Concat,
    Union,
}

impl ExecutableProvider {
    /// Compiles `plan` and all of its sources.
    pub fn compile(plan: &Arc<Plan>) -> Result<Arc<Self>, ExecutorError> {
        let sources = plan
            .sources()
            .into_iter()
            .map(Self::compile)
            .collect::<Result<Vec<_>, _>>()?;

        let kind = match plan.kind() {
            PlanKind::Raw { tuples } => ProviderKind::Raw(Arc::clone(tuples)),
            PlanKind::Store { source, .. } => ProviderKind::Store(Arc::clone(source)),
            PlanKind::Filter { predicate, .. } => ProviderKind::Filter(Arc::clone(predicate)),
            PlanKind::Select { input, columns } => {
                ProviderKind::Select(MapTransform::new(input.descriptor(), columns)?)
            }
            PlanKind::Apply {
                left,
                right,
                parameter,
                join_type,
            } => ProviderKind::Apply(Arc::new(ApplyProvider::new(
                left.descriptor(),
                right.descriptor(),
                parameter,
                *join_type,
            ))),
            PlanKind::Join {
                left,
                right,
                keys,
                join_type,
            } => ProviderKind::Join(Arc::new(JoinProvider::new(
                left.descriptor(),
                right.descriptor(),
                keys,
                *join_type,
            )?)),
            PlanKind::Concat { .. } => ProviderKind::Concat,
            PlanKind::Union { .. } => ProviderKind::Union,
        };

        let id = ProviderId::next();
        debug!(provider = plan.name(), ?id, "compiled provider");
        Ok(Arc::new(Self {
            id,
            origin: Arc::clone(plan),
            sources,
            kind,
        }))
    }

    /// Returns the provider's identity.
    pub fn id(&self) -> ProviderId {
        self.id
    }

    /// Returns the plan this provider was compiled from.
    pub fn origin(&self) -> &Arc<Plan> {
        &self.origin
    }

    /// Returns the output schema.
    pub fn descriptor(&self) -> &Arc<TupleDescriptor> {
        self.origin.descriptor()
    }

    /// Returns the compiled sources, left to right.
    pub fn sources(&self) -> &[Arc<ExecutableProvider>] {
        &self.sources
    }

    /// Runs the before-enumerate hooks of this subtree, sources first.
    ///
    /// Each provider's hook runs at most once per context, however many
    /// record sets enumerate it.
    pub fn on_before_enumerate(&self, context: &EnumerationContext) {
        if !self.mark(context, ENUMERATED) {
            return;
        }
        for source in &self.sources {
            source.on_before_enumerate(context);
        }
        if let ProviderKind::Store(source) = &self.kind {
            source.on_before_enumerate(context);
        }
    }

    /// Runs the after-enumerate hooks of this subtree, sources first.
    ///
    /// Each provider's hook runs at most once per context.
    pub fn on_after_enumerate(&self, context: &EnumerationContext) {
        if !self.mark(context, FINALIZED) {
            return;
        }
        for source in &self.sources {
            source.on_after_enumerate(context);
        }
        if let ProviderKind::Store(source) = &self.kind {
            source.on_after_enumerate(context);
        }
    }

    /// Returns `true` if the before-enumerate hooks already ran in `context`.
    pub fn is_enumerated(&self, context: &EnumerationContext) -> bool {
        context.get_value::<bool>(self.id, ENUMERATED).unwrap_or(false)
    }

    /// Sets the `name` marker; returns `false` if it was already set.
    fn mark(&self, context: &EnumerationContext, name: &'static str) -> bool {
        if context.get_value::<bool>(self.id, name).unwrap_or(false) {
            return false;
        }
        context.set_value(self.id, name, true);
        true
    }

    /// Opens a cursor over this provider's tuples.
    pub fn on_enumerate(
        self: &Arc<Self>,
        context: &Arc<EnumerationContext>,
    ) -> Result<TupleCursor, ExecutorError> {
        match &self.kind {
            ProviderKind::Raw(tuples) => Ok(TupleCursor::raw(Arc::clone(tuples))),
            ProviderKind::Store(source) => {
                let cursor = source.open(context).map_err(ExecutorError::Source)?;
                Ok(TupleCursor::Store(StoreCursor::new(self.descriptor(), cursor)))
            }
            ProviderKind::Filter(predicate) => {
                let input = self.sources[0].enumerate(context)?;
                Ok(TupleCursor::Filter(FilterCursor::new(
                    input,
                    Arc::clone(predicate),
                    context,
                )))
            }
            ProviderKind::Select(transform) => {
                let input = self.sources[0].enumerate(context)?;
                Ok(TupleCursor::Select(SelectCursor::new(input, transform.clone())))
            }
            ProviderKind::Apply(apply) => {
                let left = self.sources[0].enumerate(context)?;
                Ok(TupleCursor::Apply(ApplyCursor::new(
                    apply,
                    &self.sources[1],
                    context,
                    left,
                )))
            }
            ProviderKind::Join(join) => Ok(TupleCursor::Join(JoinCursor::open(
                join,
                &self.sources[0],
                &self.sources[1],
                context,
            )?)),
            ProviderKind::Concat => Ok(TupleCursor::Concat(ConcatCursor::open(
                &self.sources[0],
                &self.sources[1],
                context,
            )?)),
            ProviderKind::Union => Ok(TupleCursor::Union(UnionCursor::new(ConcatCursor::open(
                &self.sources[0],
                &self.sources[1],
                context,
            )?))),
        }
    }

    /// Opens a cursor asynchronously.
    ///
    /// Fails with `ExecutorError::Cancelled` if `token` is already cancelled
    /// or is cancelled while a row source is opening.
    pub fn on_enumerate_async<'a>(
        self: &'a Arc<Self>,
        context: &'a Arc<EnumerationContext>,
        token: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<TupleCursor, ExecutorError>> {
        Box::pin(async move {
            if token.is_cancelled() {
                debug!(id = ?self.id, "enumeration cancelled before start");
                return Err(ExecutorError::Cancelled);
            }
            match &self.kind {
                ProviderKind::Raw(tuples) => Ok(TupleCursor::raw(Arc::clone(tuples))),
                ProviderKind::Store(source) => {
                    let cursor = tokio::select! {
                        biased;
                        _ = token.cancelled() => return Err(ExecutorError::Cancelled),
                        opened = source.open_async(context) => opened.map_err(ExecutorError::Source)?,
                    };
                    Ok(TupleCursor::Store(StoreCursor::new(self.descriptor(), cursor)))
                }
                ProviderKind::Filter(predicate) => {
                    let input = self.sources[0].enumerate_async(context, token).await?;
                    Ok(TupleCursor::Filter(FilterCursor::new(
                        input,
                        Arc::clone(predicate),
                        context,
                    )))
                }
                ProviderKind::Select(transform) => {
                    let input = self.sources[0].enumerate_async(context, token).await?;
                    Ok(TupleCursor::Select(SelectCursor::new(input, transform.clone())))
                }
                ProviderKind::Apply(apply) => {
                    let left = self.sources[0].enumerate_async(context, token).await?;
                    Ok(TupleCursor::Apply(ApplyCursor::new(
                        apply,
                        &self.sources[1],
                        context,
                        left,
                    )))
                }
                ProviderKind::Join(join) => Ok(TupleCursor::Join(
                    JoinCursor::open_async(join, &self.sources[0], &self.sources[1], context, token)
                        .await?,
                )),
                ProviderKind::Concat => Ok(TupleCursor::Concat(
                    ConcatCursor::open_async(&self.sources[0], &self.sources[1], context, token)
                        .await?,
                )),
                ProviderKind::Union => Ok(TupleCursor::Union(UnionCursor::new(
                    ConcatCursor::open_async(&self.sources[0], &self.sources[1], context, token)
                        .await?,
                ))),
            }
        })
    }

    /// Creates a prepared record set over this provider in `context`.
    pub fn enumerate(self: &Arc<Self>, context: &Arc<EnumerationContext>) -> Result<RecordSet, ExecutorError> {
        RecordSet::create(context, self)
    }

    /// Creates a prepared record set asynchronously.
    pub async fn enumerate_async(
        self: &Arc<Self>,
        context: &Arc<EnumerationContext>,
        token: &CancellationToken,
    ) -> Result<RecordSet, ExecutorError> {
        RecordSet::create_async(context, self, token).await
    }

    /// Creates a fresh context from `session` and returns a prepared record
    /// set over this provider.
    pub fn get_record_set(
        self: &Arc<Self>,
        session: &dyn SessionBinding,
        parameters: ParameterContext,
    ) -> Result<RecordSet, ExecutorError> {
        let context = session.create_enumeration_context(parameters)?;
        RecordSet::create(&context, self)
    }

    /// Asynchronous form of [`ExecutableProvider::get_record_set`].
    pub async fn get_record_set_async(
        self: &Arc<Self>,
        session: &dyn SessionBinding,
        parameters: ParameterContext,
        token: &CancellationToken,
    ) -> Result<RecordSet, ExecutorError> {
        let context = session
            .create_enumeration_context_async(parameters, token)
            .await?;
        RecordSet::create_async(&context, self, token).await
    }
}

impl std::fmt::Debug for ExecutableProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutableProvider")
            .field("id", &self.id)
            .field("name", &self.origin.name())
            .field("descriptor", self.descriptor())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::{Type, Value};
    use crate::executor::EnumerationOptions;
    use crate::source::MemoryRowSource;

    fn context() -> Arc<EnumerationContext> {
        EnumerationContext::new(EnumerationOptions::default(), ParameterContext::new())
    }

    #[test]
    fn test_compile_mirrors_plan_tree() {
        let d = TupleDescriptor::new(&[Type::Int4]);
        let raw = Plan::raw(&d, vec![]).unwrap();
        let select = Plan::select(&raw, &[0, 0]).unwrap();
        let concat = Plan::concat(&select, &select).unwrap();

        let provider = ExecutableProvider::compile(&concat).unwrap();
        assert_eq!(provider.sources().len(), 2);
        assert_eq!(provider.sources()[0].sources().len(), 1);
        assert_eq!(provider.descriptor().types(), &[Type::Int4, Type::Int4]);
        assert!(Arc::ptr_eq(provider.origin(), &concat));
        assert_ne!(provider.sources()[0].id(), provider.sources()[1].id());
    }

    #[test]
    fn test_hooks_reach_store_sources() {
        let d = TupleDescriptor::new(&[Type::Int4]);
        let source = Arc::new(MemoryRowSource::new(vec![vec![Value::Int32(1)]]));
        let store = Plan::store("t", &d, source.clone());
        let filter = Plan::filter(&store, |_, _| Ok(true));
        let provider = ExecutableProvider::compile(&filter).unwrap();

        let ctx = context();
        assert!(!provider.is_enumerated(&ctx));
        for _ in 0..2 {
            provider.on_before_enumerate(&ctx);
            provider.sources()[0].on_before_enumerate(&ctx);
            provider.on_after_enumerate(&ctx);
        }
        assert!(provider.is_enumerated(&ctx));
        assert_eq!(source.stats().before_enumerate(), 1);
        assert_eq!(source.stats().after_enumerate(), 1);
        assert_eq!(source.stats().opened(), 0);

        let other = context();
        provider.sources()[0].on_before_enumerate(&other);
        assert_eq!(source.stats().before_enumerate(), 2);
    }

    #[test]
    fn test_on_enumerate_opens_fresh_cursors() {
        let d = TupleDescriptor::new(&[Type::Int4]);
        let source = Arc::new(MemoryRowSource::new(vec![vec![Value::Int32(1)]]));
        let provider = ExecutableProvider::compile(&Plan::store("t", &d, source.clone())).unwrap();

        let ctx = context();
        for _ in 0..2 {
            let mut cursor = provider.on_enumerate(&ctx).unwrap();
            assert_eq!(cursor.next().unwrap().unwrap().to_values(), vec![Value::Int32(1)]);
            assert!(cursor.next().unwrap().is_none());
            cursor.close();
        }
        assert_eq!(source.stats().opened(), 2);
        assert_eq!(source.stats().closed(), 2);
    }

    #[tokio::test]
    async fn test_on_enumerate_async_checks_token() {
        let d = TupleDescriptor::new(&[Type::Int4]);
        let source = Arc::new(MemoryRowSource::new(vec![]));
        let provider = ExecutableProvider::compile(&Plan::store("t", &d, source.clone())).unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let result = provider.on_enumerate_async(&context(), &token).await;
        assert!(matches!(result, Err(ExecutorError::Cancelled)));
        assert_eq!(source.stats().opened(), 0);
    }
}
