//! Tuple errors.

use thiserror::Error;

use crate::datum::Type;

use super::FieldState;

/// Errors raised by tuple access and tuple transforms.
///
/// All of these are programmer errors: they are reported, never corrected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TupleError {
    /// Field index exceeds the number of fields in the tuple.
    #[error("field index {index} out of bounds for tuple with {len} fields")]
    FieldIndexOutOfBounds { index: usize, len: usize },

    /// Bare `NULL` without `AVAILABLE` was passed as a field state.
    #[error("field state {state:?} cannot be stored; NULL must be combined with AVAILABLE")]
    InvalidFieldState { state: FieldState },

    /// A value or typed accessor does not match the field type.
    #[error("type mismatch for field {index}: expected {expected}, found {found}")]
    TypeMismatch {
        index: usize,
        expected: Type,
        found: String,
    },

    /// Number of values does not match the number of fields.
    #[error("expected {expected} values, found {found}")]
    ArityMismatch { expected: usize, found: usize },

    /// A typed read hit a field whose value has not been loaded.
    #[error("field {index} is not available")]
    FieldUnavailable { index: usize },

    /// A transform received a tuple of a different schema.
    #[error("tuple schema does not match transform input: expected {expected}, found {found}")]
    DescriptorMismatch { expected: String, found: String },
}
