//! Apply (correlated nested loop).
//!
//! For each left tuple, the Apply binds its parameter to that tuple, opens a
//! fresh cursor over the right provider, and emits `left ++ right` for every
//! right tuple. A left-outer Apply emits `left ++ blank` when the right side
//! is empty. The parameter stays bound until the left tuple's output is
//! fully produced.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::tuple::{CombineTransform, PackedTuple, TupleDescriptor};

use super::context::{EnumerationContext, ParameterScope};
use super::cursor::TupleCursor;
use super::error::ExecutorError;
use super::parameter::Parameter;
use super::plan::JoinType;
use super::provider::ExecutableProvider;
use super::record_set::RecordSet;

/// Compiled state of an Apply provider.
pub(crate) struct ApplyProvider {
    parameter: Parameter,
    join_type: JoinType,
    combine: CombineTransform,
    right_blank: PackedTuple,
}

impl ApplyProvider {
    pub(crate) fn new(
        left: &Arc<TupleDescriptor>,
        right: &Arc<TupleDescriptor>,
        parameter: &Parameter,
        join_type: JoinType,
    ) -> Self {
        Self {
            parameter: parameter.clone(),
            join_type,
            combine: CombineTransform::new(left, right),
            right_blank: PackedTuple::blank(right),
        }
    }
}

/// Per-left-tuple state. Field order matters: the right cursor is closed
/// before the parameter binding is restored.
struct Correlation {
    left: PackedTuple,
    right: Box<TupleCursor>,
    matched: bool,
    _binding: ParameterScope,
}

/// Cursor driving an Apply.
pub struct ApplyCursor {
    apply: Arc<ApplyProvider>,
    right_provider: Arc<ExecutableProvider>,
    context: Arc<EnumerationContext>,
    left: RecordSet,
    current: Option<Correlation>,
    failed: bool,
}

impl ApplyCursor {
    pub(crate) fn new(
        apply: &Arc<ApplyProvider>,
        right_provider: &Arc<ExecutableProvider>,
        context: &Arc<EnumerationContext>,
        left: RecordSet,
    ) -> Self {
        Self {
            apply: Arc::clone(apply),
            right_provider: Arc::clone(right_provider),
            context: Arc::clone(context),
            left,
            current: None,
            failed: false,
        }
    }

    fn bind(&self, left: &PackedTuple) -> ParameterScope {
        trace!(parameter = self.apply.parameter.name(), "binding apply parameter");
        self.context.bind_parameter(&self.apply.parameter, left.clone())
    }

    /// Ends the current correlation. Returns the outer-join tuple if the
    /// right side produced nothing.
    fn finish_correlation(&mut self, mut correlation: Correlation) -> Result<Option<PackedTuple>, ExecutorError> {
        correlation.right.close();
        let emit_blank = !correlation.matched && self.apply.join_type == JoinType::LeftOuter;
        let left = correlation.left.clone();
        drop(correlation);
        if emit_blank {
            Ok(Some(self.apply.combine.apply(&left, &self.apply.right_blank)?))
        } else {
            Ok(None)
        }
    }

    /// Returns the next combined tuple. An error ends the enumeration: the
    /// open right cursor is closed and later calls yield nothing.
    pub(crate) fn next(&mut self) -> Result<Option<PackedTuple>, ExecutorError> {
        if self.failed {
            return Ok(None);
        }
        let next = self.pull();
        if next.is_err() {
            self.failed = true;
            if let Some(mut correlation) = self.current.take() {
                correlation.right.close();
            }
        }
        next
    }

    fn pull(&mut self) -> Result<Option<PackedTuple>, ExecutorError> {
        loop {
            if let Some(correlation) = self.current.as_mut() {
                if let Some(right) = correlation.right.next()? {
                    correlation.matched = true;
                    return Ok(Some(self.apply.combine.apply(&correlation.left, &right)?));
                }
                if let Some(correlation) = self.current.take()
                    && let Some(tuple) = self.finish_correlation(correlation)?
                {
                    return Ok(Some(tuple));
                }
                continue;
            }

            let Some(left) = self.left.advance()? else {
                return Ok(None);
            };
            let binding = self.bind(&left);
            let right = self.right_provider.on_enumerate(&self.context)?;
            self.current = Some(Correlation {
                left,
                right: Box::new(right),
                matched: false,
                _binding: binding,
            });
        }
    }

    pub(crate) async fn next_async(
        &mut self,
        token: &CancellationToken,
    ) -> Result<Option<PackedTuple>, ExecutorError> {
        if self.failed {
            return Ok(None);
        }
        let next = self.pull_async(token).await;
        if next.is_err() {
            self.failed = true;
            if let Some(mut correlation) = self.current.take() {
                correlation.right.close_async().await;
            }
        }
        next
    }

    async fn pull_async(&mut self, token: &CancellationToken) -> Result<Option<PackedTuple>, ExecutorError> {
        loop {
            if let Some(correlation) = self.current.as_mut() {
                if let Some(right) = correlation.right.next_async(token).await? {
                    correlation.matched = true;
                    return Ok(Some(self.apply.combine.apply(&correlation.left, &right)?));
                }
                if let Some(mut correlation) = self.current.take() {
                    correlation.right.close_async().await;
                    if let Some(tuple) = self.finish_correlation(correlation)? {
                        return Ok(Some(tuple));
                    }
                }
                continue;
            }

            let Some(left) = self.left.advance_async().await? else {
                return Ok(None);
            };
            let binding = self.bind(&left);
            let right = self
                .right_provider
                .on_enumerate_async(&self.context, token)
                .await?;
            self.current = Some(Correlation {
                left,
                right: Box::new(right),
                matched: false,
                _binding: binding,
            });
        }
    }

    pub(crate) fn close(&mut self) {
        if let Some(mut correlation) = self.current.take() {
            correlation.right.close();
        }
        self.left.dispose();
    }

    pub(crate) async fn close_async(&mut self) {
        if let Some(mut correlation) = self.current.take() {
            correlation.right.close_async().await;
        }
        self.left.dispose_async().await;
    }
}
