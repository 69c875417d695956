//! Executor-specific errors.

use thiserror::Error;

use crate::source::SourceError;
use crate::tuple::TupleError;

/// Errors that can occur while compiling or enumerating a provider tree.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Tuple access or transform failed.
    #[error(transparent)]
    Tuple(#[from] TupleError),

    /// The external row source failed.
    #[error("row source failed: {0}")]
    Source(#[source] SourceError),

    /// The cancellation token was triggered.
    #[error("enumeration was cancelled")]
    Cancelled,

    /// `move_next` was called on a record set that was never prepared.
    #[error("record set is not prepared")]
    NotPrepared,

    /// A parameter was read without being bound.
    #[error("parameter \"{name}\" is not bound")]
    UnboundParameter { name: String },

    /// A parameter was bound to a value of the wrong kind.
    #[error("parameter \"{name}\" is bound to {found}, expected {expected}")]
    ParameterKind {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    /// The plan is malformed (schema mismatch, bad key columns, ...).
    #[error("invalid plan: {0}")]
    InvalidPlan(String),
}

impl ExecutorError {
    /// Returns `true` if the error is a cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExecutorError::Cancelled)
    }
}
