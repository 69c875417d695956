//! Packed tuple records.
//!
//! This module provides:
//! - [`TupleDescriptor`]: Immutable, interned schema with a precomputed storage plan
//! - [`PackedTuple`]: A fixed-schema record with per-field presence/null tracking
//! - [`FieldAccessor`]: Per-field read/write/hash/equality strategy
//! - [`CombineTransform`] / [`MapTransform`]: Schema-preserving tuple transforms
//!
//! # Layout
//!
//! A tuple owns two buffers. The word buffer starts with the state words
//! (2 bits per field, 32 fields per word), followed by the inline values,
//! bit-packed widest first so no value crosses a word boundary. The object
//! buffer holds one slot per variable-size field.
//!
//! ```text
//! values: [u64]
//! +------------------------+ word 0
//! | field states (2b each) |  00 = unavailable, 01 = available, 11 = available + null
//! +------------------------+ word ceil(n/32)
//! | Int8 | Float8 | ...    |  64-bit values
//! | Int4 | Int4 | ...      |  32-bit values, two per word
//! | Int2 ... | Bool bits   |  16-bit and 1-bit values
//! +------------------------+
//!
//! objects: [Option<Value>]
//! +------------------------+
//! | Text | Bytea | ...     |  one slot per variable-size field
//! +------------------------+
//! ```

mod accessor;
mod descriptor;
mod error;
mod packed;
mod state;
mod transform;

pub use accessor::{FieldAccessor, Scalar};
pub use descriptor::{FieldPacking, PackedFieldDescriptor, TupleDescriptor};
pub use error::TupleError;
pub use packed::PackedTuple;
pub use state::FieldState;
pub use transform::{CombineTransform, MapTransform};
