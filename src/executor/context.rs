//! Enumeration context.
//!
//! An [`EnumerationContext`] is the per-execution state shared by every
//! record set of one provider tree: the options, a cache keyed by
//! (provider, name), the parameter bindings, and the scope counter that
//! decides when attached resources are released.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::datum::Value;
use crate::tuple::PackedTuple;

use super::error::ExecutorError;
use super::parameter::{Parameter, ParameterContext, ParameterValue};
use super::provider::ProviderId;

/// Options that control how record sets enumerate.
#[derive(Debug, Clone, Default)]
pub struct EnumerationOptions {
    /// Drain each non-in-memory cursor into a buffer before handing out the
    /// first tuple, releasing the underlying source early.
    pub greedy: bool,
}

/// Scope counters, mostly useful for asserting cleanup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnumerationStats {
    /// Scopes opened by `begin_enumeration`.
    pub scopes_begun: usize,
    /// Scopes marked completed before being disposed.
    pub scopes_completed: usize,
    /// Scopes disposed.
    pub scopes_disposed: usize,
    /// Scopes currently open.
    pub active_scopes: usize,
}

/// Resource owned by an enumeration context.
///
/// Released once, when the outermost enumeration scope is disposed.
pub trait ContextResource: Send {
    /// Releases the resource. `completed` is `true` if the outermost scope
    /// finished without error.
    fn release(self: Box<Self>, completed: bool);
}

impl<F: FnOnce(bool) + Send> ContextResource for F {
    fn release(self: Box<Self>, completed: bool) {
        (*self)(completed)
    }
}

/// Per-execution state shared by the record sets of a provider tree.
///
/// Always handled through `Arc`: record sets, cursors and scopes each keep a
/// reference, and the parameter and cache maps are behind mutexes.
pub struct EnumerationContext {
    options: EnumerationOptions,
    cache: Mutex<HashMap<(ProviderId, &'static str), Box<dyn Any + Send + Sync>>>,
    parameters: Mutex<ParameterContext>,
    resources: Mutex<Vec<Box<dyn ContextResource>>>,
    stats: Mutex<EnumerationStats>,
}

impl EnumerationContext {
    /// Creates a context with the given options and parameter bindings.
    pub fn new(options: EnumerationOptions, parameters: ParameterContext) -> Arc<Self> {
        Arc::new(Self {
            options,
            cache: Mutex::new(HashMap::new()),
            parameters: Mutex::new(parameters),
            resources: Mutex::new(Vec::new()),
            stats: Mutex::new(EnumerationStats::default()),
        })
    }

    /// Returns the enumeration options.
    pub fn options(&self) -> &EnumerationOptions {
        &self.options
    }

    /// Returns a cached value stored by `provider` under `name`.
    ///
    /// Returns `None` if nothing is stored or the stored value has a
    /// different type.
    pub fn get_value<T: Clone + 'static>(&self, provider: ProviderId, name: &'static str) -> Option<T> {
        self.cache
            .lock()
            .get(&(provider, name))
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
    }

    /// Stores a value for `provider` under `name`, replacing any previous one.
    pub fn set_value<T: Send + Sync + 'static>(&self, provider: ProviderId, name: &'static str, value: T) {
        self.cache.lock().insert((provider, name), Box::new(value));
    }

    /// Opens an enumeration scope.
    ///
    /// Scopes nest: resources attached with [`EnumerationContext::attach_resource`]
    /// are released when the outermost scope is disposed, with the completion
    /// flag of that scope.
    pub fn begin_enumeration(self: &Arc<Self>) -> EnumerationScope {
        let mut stats = self.stats.lock();
        stats.scopes_begun += 1;
        stats.active_scopes += 1;
        trace!(depth = stats.active_scopes, "enumeration scope begun");
        EnumerationScope {
            context: Arc::clone(self),
            completed: false,
            disposed: false,
        }
    }

    /// Attaches a resource released by the outermost scope's disposal.
    ///
    /// Closures `FnOnce(bool)` are resources; they receive `true` if that
    /// scope was completed.
    pub fn attach_resource(&self, resource: impl ContextResource + 'static) {
        self.resources.lock().push(Box::new(resource));
    }

    fn end_enumeration(&self, completed: bool) {
        let outermost = {
            let mut stats = self.stats.lock();
            stats.scopes_disposed += 1;
            if completed {
                stats.scopes_completed += 1;
            }
            stats.active_scopes = stats.active_scopes.saturating_sub(1);
            stats.active_scopes == 0
        };
        if outermost {
            let resources = std::mem::take(&mut *self.resources.lock());
            if !resources.is_empty() {
                debug!(count = resources.len(), completed, "releasing context resources");
            }
            for resource in resources {
                resource.release(completed);
            }
        }
    }

    /// Binds `parameter` until the returned scope is dropped, then restores
    /// the previous binding.
    pub fn bind_parameter(
        self: &Arc<Self>,
        parameter: &Parameter,
        value: impl Into<ParameterValue>,
    ) -> ParameterScope {
        let previous = self.parameters.lock().set(parameter, value);
        ParameterScope {
            context: Arc::clone(self),
            parameter: parameter.clone(),
            previous,
        }
    }

    /// Returns the current binding of `parameter`.
    pub fn parameter(&self, parameter: &Parameter) -> Option<ParameterValue> {
        self.parameters.lock().get(parameter).cloned()
    }

    /// Returns the scalar bound to `parameter`.
    pub fn parameter_value(&self, parameter: &Parameter) -> Result<Value, ExecutorError> {
        self.parameters.lock().value(parameter).cloned()
    }

    /// Returns the tuple bound to `parameter`.
    pub fn parameter_tuple(&self, parameter: &Parameter) -> Result<PackedTuple, ExecutorError> {
        self.parameters.lock().tuple(parameter).cloned()
    }

    /// Returns a snapshot of the scope counters.
    pub fn stats(&self) -> EnumerationStats {
        *self.stats.lock()
    }
}

impl fmt::Debug for EnumerationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnumerationContext")
            .field("options", &self.options)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// An open enumeration scope.
///
/// Disposal is idempotent and also happens on drop.
#[must_use = "dropping the scope disposes it immediately"]
pub struct EnumerationScope {
    context: Arc<EnumerationContext>,
    completed: bool,
    disposed: bool,
}

impl EnumerationScope {
    /// Marks the scope as successfully completed.
    pub fn complete(&mut self) {
        self.completed = true;
    }

    /// Returns `true` if [`EnumerationScope::complete`] was called.
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Closes the scope.
    pub fn dispose(&mut self) {
        if !self.disposed {
            self.disposed = true;
            self.context.end_enumeration(self.completed);
        }
    }
}

impl Drop for EnumerationScope {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// A temporary parameter binding. Restores the previous binding on drop.
#[must_use = "dropping the scope unbinds the parameter immediately"]
pub struct ParameterScope {
    context: Arc<EnumerationContext>,
    parameter: Parameter,
    previous: Option<ParameterValue>,
}

impl Drop for ParameterScope {
    fn drop(&mut self) {
        let mut parameters = self.context.parameters.lock();
        match self.previous.take() {
            Some(previous) => {
                parameters.set(&self.parameter, previous);
            }
            None => {
                parameters.remove(&self.parameter);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn context() -> Arc<EnumerationContext> {
        EnumerationContext::new(EnumerationOptions::default(), ParameterContext::new())
    }

    #[test]
    fn test_cache_is_keyed_by_provider_and_name() {
        let ctx = context();
        let a = ProviderId::next();
        let b = ProviderId::next();
        ctx.set_value(a, "Enumerated", true);
        assert_eq!(ctx.get_value::<bool>(a, "Enumerated"), Some(true));
        assert_eq!(ctx.get_value::<bool>(b, "Enumerated"), None);
        assert_eq!(ctx.get_value::<bool>(a, "Other"), None);
        // wrong type
        assert_eq!(ctx.get_value::<u32>(a, "Enumerated"), None);
    }

    #[test]
    fn test_resources_released_by_outermost_scope() {
        let ctx = context();
        let released = Arc::new(AtomicUsize::new(0));
        let completed_flag = Arc::new(Mutex::new(None));

        let mut outer = ctx.begin_enumeration();
        let mut inner = ctx.begin_enumeration();
        {
            let released = Arc::clone(&released);
            let completed_flag = Arc::clone(&completed_flag);
            ctx.attach_resource(move |completed: bool| {
                released.fetch_add(1, Ordering::Relaxed);
                *completed_flag.lock() = Some(completed);
            });
        }

        inner.complete();
        inner.dispose();
        assert_eq!(released.load(Ordering::Relaxed), 0);

        outer.dispose();
        outer.dispose();
        assert_eq!(released.load(Ordering::Relaxed), 1);
        assert_eq!(*completed_flag.lock(), Some(false));

        let stats = ctx.stats();
        assert_eq!(stats.scopes_begun, 2);
        assert_eq!(stats.scopes_completed, 1);
        assert_eq!(stats.scopes_disposed, 2);
        assert_eq!(stats.active_scopes, 0);
    }

    #[test]
    fn test_scope_disposed_on_drop() {
        let ctx = context();
        {
            let mut scope = ctx.begin_enumeration();
            scope.complete();
            assert!(scope.is_completed());
        }
        assert_eq!(ctx.stats().scopes_disposed, 1);
        assert_eq!(ctx.stats().scopes_completed, 1);
    }

    #[test]
    fn test_parameter_scope_restores_previous_binding() {
        let p = Parameter::new("p");
        let ctx = EnumerationContext::new(
            EnumerationOptions::default(),
            ParameterContext::new().with(&p, Value::Int32(1)),
        );
        {
            let _outer = ctx.bind_parameter(&p, Value::Int32(2));
            assert_eq!(ctx.parameter_value(&p).unwrap(), Value::Int32(2));
            {
                let _inner = ctx.bind_parameter(&p, Value::Int32(3));
                assert_eq!(ctx.parameter_value(&p).unwrap(), Value::Int32(3));
            }
            assert_eq!(ctx.parameter_value(&p).unwrap(), Value::Int32(2));
        }
        assert_eq!(ctx.parameter_value(&p).unwrap(), Value::Int32(1));
    }

    #[test]
    fn test_parameter_scope_unbinds_fresh_parameter() {
        let p = Parameter::new("p");
        let ctx = context();
        let scope = ctx.bind_parameter(&p, Value::Int32(1));
        assert!(ctx.parameter(&p).is_some());
        drop(scope);
        assert!(ctx.parameter(&p).is_none());
    }
}
