//! Row sources.
//!
//! The storage/cursor layer feeds the executor through [`RowSource`]: a
//! factory of [`RowCursor`]s that yield raw column values, synchronously or
//! asynchronously. Store providers wrap the raw rows into packed tuples.
//!
//! ```text
//! +---------------------+
//! | StoreProvider       |  raw rows -> PackedTuple
//! +---------------------+
//!           |
//!           v
//! +---------------------+
//! | RowSource trait     |
//! +---------------------+
//!      /          \
//!     v            v
//! +-----------+ +------------------+
//! | Memory    | | external cursors |
//! +-----------+ +------------------+
//! ```

mod memory;
mod traits;

pub use memory::{MemoryRowSource, SourceStats};
pub use traits::{BoxFuture, RowCursor, RowSource, SourceError};
