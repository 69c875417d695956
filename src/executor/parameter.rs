//! Query parameters.
//!
//! A [`Parameter`] is a named slot whose value is supplied per execution,
//! either by the caller (through a [`ParameterContext`]) or by an Apply
//! provider that binds the current left row before enumerating its right side.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::datum::Value;
use crate::tuple::PackedTuple;

use super::error::ExecutorError;

static NEXT_PARAMETER_ID: AtomicU64 = AtomicU64::new(1);

/// A named query parameter.
///
/// Identity is per instance: two parameters created with the same name are
/// distinct slots. Clones share the identity.
#[derive(Clone)]
pub struct Parameter {
    id: u64,
    name: Arc<str>,
}

impl Parameter {
    /// Creates a new parameter slot.
    pub fn new(name: &str) -> Self {
        Self {
            id: NEXT_PARAMETER_ID.fetch_add(1, Ordering::Relaxed),
            name: Arc::from(name),
        }
    }

    /// Returns the parameter name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for Parameter {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Parameter {}

impl std::hash::Hash for Parameter {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}#{}", self.name, self.id)
    }
}

/// Value bound to a parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    /// A scalar value.
    Value(Value),
    /// A whole tuple (Apply binds the current left row this way).
    Tuple(PackedTuple),
}

impl ParameterValue {
    fn kind(&self) -> &'static str {
        match self {
            ParameterValue::Value(_) => "value",
            ParameterValue::Tuple(_) => "tuple",
        }
    }
}

impl From<Value> for ParameterValue {
    fn from(value: Value) -> Self {
        ParameterValue::Value(value)
    }
}

impl From<PackedTuple> for ParameterValue {
    fn from(tuple: PackedTuple) -> Self {
        ParameterValue::Tuple(tuple)
    }
}

/// Set of parameter bindings.
#[derive(Debug, Clone, Default)]
pub struct ParameterContext {
    values: HashMap<Parameter, ParameterValue>,
}

impl ParameterContext {
    /// Creates an empty parameter context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`ParameterContext::set`].
    pub fn with(mut self, parameter: &Parameter, value: impl Into<ParameterValue>) -> Self {
        self.set(parameter, value);
        self
    }

    /// Binds `parameter`, returning the previous binding.
    pub fn set(
        &mut self,
        parameter: &Parameter,
        value: impl Into<ParameterValue>,
    ) -> Option<ParameterValue> {
        self.values.insert(parameter.clone(), value.into())
    }

    /// Removes the binding of `parameter`, returning it.
    pub fn remove(&mut self, parameter: &Parameter) -> Option<ParameterValue> {
        self.values.remove(parameter)
    }

    /// Returns the binding of `parameter`.
    pub fn get(&self, parameter: &Parameter) -> Option<&ParameterValue> {
        self.values.get(parameter)
    }

    /// Returns the scalar bound to `parameter`.
    pub fn value(&self, parameter: &Parameter) -> Result<&Value, ExecutorError> {
        match self.bound(parameter)? {
            ParameterValue::Value(v) => Ok(v),
            other => Err(kind_error(parameter, "value", other)),
        }
    }

    /// Returns the tuple bound to `parameter`.
    pub fn tuple(&self, parameter: &Parameter) -> Result<&PackedTuple, ExecutorError> {
        match self.bound(parameter)? {
            ParameterValue::Tuple(t) => Ok(t),
            other => Err(kind_error(parameter, "tuple", other)),
        }
    }

    fn bound(&self, parameter: &Parameter) -> Result<&ParameterValue, ExecutorError> {
        self.values
            .get(parameter)
            .ok_or_else(|| ExecutorError::UnboundParameter {
                name: parameter.name().to_string(),
            })
    }
}

fn kind_error(parameter: &Parameter, expected: &'static str, found: &ParameterValue) -> ExecutorError {
    ExecutorError::ParameterKind {
        name: parameter.name().to_string(),
        expected,
        found: found.kind(),
    }
}
