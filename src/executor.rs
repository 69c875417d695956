//! Lazy, cancellable provider execution.
//!
//! A [`Plan`] is compiled once into a tree of [`ExecutableProvider`]s.
//! Each execution creates an [`EnumerationContext`] (usually through a
//! [`Session`]) and pulls tuples from a [`RecordSet`], synchronously or
//! asynchronously.
//!
//! # Architecture
//!
//! ```text
//! Plan (validated, immutable)
//!       |
//! [ExecutableProvider::compile]
//!       |
//! ExecutableProvider tree ---- on_enumerate ----> TupleCursor tree
//!       |                                              |
//! RecordSet::create(context, provider)                 |
//!   New -> Prepared -> Finished  <----- pulls ---------+
//! ```
//!
//! Composite cursors (Filter, Select, Apply left, Join, Concat, Union) read
//! their inputs through nested record sets on the same context, so the
//! before/after hooks of every provider run once per context and every
//! nested scope is disposed with its record set.
//!
//! # Components
//!
//! - [`Plan`]: Raw, Store, Filter, Select, Apply, Join, Concat, Union
//! - [`ExecutableProvider`]: compiled provider with lifecycle hooks
//! - [`EnumerationContext`]: per-execution cache, parameters and scopes
//! - [`RecordSet`]: state machine over a [`TupleCursor`]
//! - [`Session`]: creates contexts from a [`SessionConfig`]

mod apply;
mod concat;
mod context;
mod cursor;
mod error;
mod join;
mod parameter;
mod plan;
mod provider;
mod record_set;
mod session;

pub use context::{
    ContextResource, EnumerationContext, EnumerationOptions, EnumerationScope, EnumerationStats,
    ParameterScope,
};
pub use cursor::TupleCursor;
pub use error::ExecutorError;
pub use parameter::{Parameter, ParameterContext, ParameterValue};
pub use plan::{JoinType, Plan, PlanKind, Predicate};
pub use provider::{ExecutableProvider, ProviderId};
pub use record_set::{RecordSet, RecordSetState};
pub use session::{Session, SessionBinding, SessionConfig};
