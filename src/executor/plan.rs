//! Compilable provider trees.
//!
//! A [`Plan`] is the logical description of a query: a tree of providers,
//! each with a known output schema. Constructors validate schemas and key
//! columns, so a `Plan` that exists always compiles.
//!
//! ```text
//! Apply(LeftOuter, @customer)
//!   ├── Store(customers)
//!   └── Filter(orders.customer = @customer)
//!         └── Store(orders)
//! ```

use std::fmt;
use std::sync::Arc;

use crate::source::RowSource;
use crate::tuple::{PackedTuple, TupleDescriptor};

use super::context::EnumerationContext;
use super::error::ExecutorError;
use super::parameter::Parameter;

/// Row predicate evaluated by Filter providers.
///
/// Receives the context so it can read bound parameters.
pub type Predicate =
    Arc<dyn Fn(&PackedTuple, &EnumerationContext) -> Result<bool, ExecutorError> + Send + Sync>;

/// Join/Apply flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    /// Emit only matching pairs.
    Inner,
    /// Also emit each unmatched left row, combined with an all-unavailable
    /// right tuple.
    LeftOuter,
}

/// A node of a compilable provider tree.
#[derive(Clone)]
pub struct Plan {
    kind: PlanKind,
    descriptor: Arc<TupleDescriptor>,
}

/// The operation a [`Plan`] node performs.
#[derive(Clone)]
pub enum PlanKind {
    /// Fixed in-memory tuples.
    Raw { tuples: Arc<[PackedTuple]> },
    /// Rows read from an external source.
    Store {
        name: String,
        source: Arc<dyn RowSource>,
    },
    /// Rows of `input` satisfying `predicate`.
    Filter {
        input: Arc<Plan>,
        predicate: Predicate,
    },
    /// Projection of `input` onto `columns`.
    Select {
        input: Arc<Plan>,
        columns: Vec<usize>,
    },
    /// Correlated nested loop: `right` is enumerated once per left row with
    /// `parameter` bound to that row.
    Apply {
        left: Arc<Plan>,
        right: Arc<Plan>,
        parameter: Parameter,
        join_type: JoinType,
    },
    /// Hash equi-join on `(left column, right column)` pairs.
    Join {
        left: Arc<Plan>,
        right: Arc<Plan>,
        keys: Vec<(usize, usize)>,
        join_type: JoinType,
    },
    /// All rows of `left`, then all rows of `right`.
    Concat { left: Arc<Plan>, right: Arc<Plan> },
    /// Distinct rows of `left ++ right`, in order of first occurrence.
    Union { left: Arc<Plan>, right: Arc<Plan> },
}

impl Plan {
    /// Creates a provider over fixed tuples.
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError::InvalidPlan` if a tuple has another schema.
    pub fn raw(
        descriptor: &Arc<TupleDescriptor>,
        tuples: Vec<PackedTuple>,
    ) -> Result<Arc<Self>, ExecutorError> {
        if let Some(bad) = tuples.iter().find(|t| !descriptor.is_compatible(t.descriptor())) {
            return Err(ExecutorError::InvalidPlan(format!(
                "raw tuple {} does not match {}",
                bad.descriptor(),
                descriptor
            )));
        }
        Ok(Self::new(
            PlanKind::Raw {
                tuples: tuples.into(),
            },
            Arc::clone(descriptor),
        ))
    }

    /// Creates a provider reading rows of `descriptor` from `source`.
    pub fn store(
        name: &str,
        descriptor: &Arc<TupleDescriptor>,
        source: Arc<dyn RowSource>,
    ) -> Arc<Self> {
        Self::new(
            PlanKind::Store {
                name: name.to_string(),
                source,
            },
            Arc::clone(descriptor),
        )
    }

    /// Creates a filter over `input`.
    pub fn filter<F>(input: &Arc<Plan>, predicate: F) -> Arc<Self>
    where
        F: Fn(&PackedTuple, &EnumerationContext) -> Result<bool, ExecutorError> + Send + Sync + 'static,
    {
        Self::new(
            PlanKind::Filter {
                input: Arc::clone(input),
                predicate: Arc::new(predicate),
            },
            Arc::clone(&input.descriptor),
        )
    }

    /// Creates a projection of `input` onto `columns`.
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError::InvalidPlan` if a column is out of range.
    pub fn select(input: &Arc<Plan>, columns: &[usize]) -> Result<Arc<Self>, ExecutorError> {
        let types = columns
            .iter()
            .map(|&c| input.descriptor.types().get(c).copied().ok_or(c))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|c| {
                ExecutorError::InvalidPlan(format!(
                    "select column {} out of range for {}",
                    c, input.descriptor
                ))
            })?;
        Ok(Self::new(
            PlanKind::Select {
                input: Arc::clone(input),
                columns: columns.to_vec(),
            },
            TupleDescriptor::new(&types),
        ))
    }

    /// Creates an Apply of `right` over `left`, binding each left row to
    /// `parameter`.
    pub fn apply(
        left: &Arc<Plan>,
        right: &Arc<Plan>,
        parameter: &Parameter,
        join_type: JoinType,
    ) -> Arc<Self> {
        Self::new(
            PlanKind::Apply {
                left: Arc::clone(left),
                right: Arc::clone(right),
                parameter: parameter.clone(),
                join_type,
            },
            left.descriptor.concat(&right.descriptor),
        )
    }

    /// Creates a hash equi-join.
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError::InvalidPlan` if `keys` is empty, a key column
    /// is out of range, or a key pair has mismatched types.
    pub fn join(
        left: &Arc<Plan>,
        right: &Arc<Plan>,
        keys: &[(usize, usize)],
        join_type: JoinType,
    ) -> Result<Arc<Self>, ExecutorError> {
        if keys.is_empty() {
            return Err(ExecutorError::InvalidPlan("join without key columns".into()));
        }
        for &(l, r) in keys {
            let lt = left.descriptor.types().get(l);
            let rt = right.descriptor.types().get(r);
            match (lt, rt) {
                (Some(lt), Some(rt)) if lt == rt => {}
                _ => {
                    return Err(ExecutorError::InvalidPlan(format!(
                        "join key ({}, {}) is invalid for {} and {}",
                        l, r, left.descriptor, right.descriptor
                    )));
                }
            }
        }
        Ok(Self::new(
            PlanKind::Join {
                left: Arc::clone(left),
                right: Arc::clone(right),
                keys: keys.to_vec(),
                join_type,
            },
            left.descriptor.concat(&right.descriptor),
        ))
    }

    /// Creates a concatenation.
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError::InvalidPlan` if the schemas differ.
    pub fn concat(left: &Arc<Plan>, right: &Arc<Plan>) -> Result<Arc<Self>, ExecutorError> {
        check_same_schema("concat", left, right)?;
        Ok(Self::new(
            PlanKind::Concat {
                left: Arc::clone(left),
                right: Arc::clone(right),
            },
            Arc::clone(&left.descriptor),
        ))
    }

    /// Creates a union.
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError::InvalidPlan` if the schemas differ.
    pub fn union(left: &Arc<Plan>, right: &Arc<Plan>) -> Result<Arc<Self>, ExecutorError> {
        check_same_schema("union", left, right)?;
        Ok(Self::new(
            PlanKind::Union {
                left: Arc::clone(left),
                right: Arc::clone(right),
            },
            Arc::clone(&left.descriptor),
        ))
    }

    fn new(kind: PlanKind, descriptor: Arc<TupleDescriptor>) -> Arc<Self> {
        Arc::new(Self { kind, descriptor })
    }

    /// Returns the node's operation.
    pub fn kind(&self) -> &PlanKind {
        &self.kind
    }

    /// Returns the output schema.
    pub fn descriptor(&self) -> &Arc<TupleDescriptor> {
        &self.descriptor
    }

    /// Returns the child plans, left to right.
    pub fn sources(&self) -> Vec<&Arc<Plan>> {
        match &self.kind {
            PlanKind::Raw { .. } | PlanKind::Store { .. } => Vec::new(),
            PlanKind::Filter { input, .. } | PlanKind::Select { input, .. } => vec![input],
            PlanKind::Apply { left, right, .. }
            | PlanKind::Join { left, right, .. }
            | PlanKind::Concat { left, right }
            | PlanKind::Union { left, right } => vec![left, right],
        }
    }

    /// Returns the node's name.
    pub fn name(&self) -> &'static str {
        match &self.kind {
            PlanKind::Raw { .. } => "Raw",
            PlanKind::Store { .. } => "Store",
            PlanKind::Filter { .. } => "Filter",
            PlanKind::Select { .. } => "Select",
            PlanKind::Apply { .. } => "Apply",
            PlanKind::Join { .. } => "Join",
            PlanKind::Concat { .. } => "Concat",
            PlanKind::Union { .. } => "Union",
        }
    }

    fn fmt_tree(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        write!(f, "{:indent$}{}", "", self.name(), indent = depth * 2)?;
        match &self.kind {
            PlanKind::Raw { tuples } => write!(f, " ({} rows)", tuples.len())?,
            PlanKind::Store { name, .. } => write!(f, " {}", name)?,
            PlanKind::Select { columns, .. } => write!(f, " {:?}", columns)?,
            PlanKind::Apply {
                parameter,
                join_type,
                ..
            } => write!(f, " {:?} {:?}", join_type, parameter)?,
            PlanKind::Join { keys, join_type, .. } => write!(f, " {:?} {:?}", join_type, keys)?,
            PlanKind::Filter { .. } | PlanKind::Concat { .. } | PlanKind::Union { .. } => {}
        }
        writeln!(f, " -> {}", self.descriptor)?;
        for source in self.sources() {
            source.fmt_tree(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_tree(f, 0)
    }
}

fn check_same_schema(op: &str, left: &Plan, right: &Plan) -> Result<(), ExecutorError> {
    if left.descriptor == right.descriptor {
        Ok(())
    } else {
        Err(ExecutorError::InvalidPlan(format!(
            "{} inputs differ: {} vs {}",
            op, left.descriptor, right.descriptor
        )))
    }
}
