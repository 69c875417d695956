//! Hash equi-join.
//!
//! The right input is drained into a hash table keyed by its key columns
//! before the first left tuple is read. Each left tuple then probes the
//! table; matches are emitted in right-input order. Keys containing a null
//! or unavailable field never match.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::tuple::{CombineTransform, MapTransform, PackedTuple, TupleDescriptor};

use super::context::EnumerationContext;
use super::error::ExecutorError;
use super::plan::JoinType;
use super::provider::ExecutableProvider;
use super::record_set::RecordSet;

/// Compiled state of a Join provider.
pub(crate) struct JoinProvider {
    join_type: JoinType,
    combine: CombineTransform,
    left_key: MapTransform,
    right_key: MapTransform,
    right_blank: PackedTuple,
}

impl JoinProvider {
    pub(crate) fn new(
        left: &Arc<TupleDescriptor>,
        right: &Arc<TupleDescriptor>,
        keys: &[(usize, usize)],
        join_type: JoinType,
    ) -> Result<Self, ExecutorError> {
        let (left_columns, right_columns): (Vec<usize>, Vec<usize>) = keys.iter().copied().unzip();
        Ok(Self {
            join_type,
            combine: CombineTransform::new(left, right),
            left_key: MapTransform::new(left, &left_columns)?,
            right_key: MapTransform::new(right, &right_columns)?,
            right_blank: PackedTuple::blank(right),
        })
    }

    /// Returns the probe key, or `None` if it cannot match anything.
    fn key(transform: &MapTransform, tuple: &PackedTuple) -> Result<Option<PackedTuple>, ExecutorError> {
        let key = transform.apply(tuple)?;
        let matchable = (0..key.len()).all(|i| key.field_state(i).is_ok_and(|s| s.has_value()));
        Ok(matchable.then_some(key))
    }
}

type HashTable = HashMap<PackedTuple, Vec<PackedTuple>>;

/// Cursor driving a hash join.
pub struct JoinCursor {
    join: Arc<JoinProvider>,
    left: RecordSet,
    table: HashTable,
    pending: std::vec::IntoIter<PackedTuple>,
}

impl JoinCursor {
    pub(crate) fn open(
        join: &Arc<JoinProvider>,
        left: &Arc<ExecutableProvider>,
        right: &Arc<ExecutableProvider>,
        context: &Arc<EnumerationContext>,
    ) -> Result<Self, ExecutorError> {
        let mut table = HashTable::new();
        let mut rows = right.enumerate(context)?;
        while let Some(tuple) = rows.advance()? {
            insert(&mut table, join, tuple)?;
        }
        rows.dispose();
        Ok(Self::new(join, left.enumerate(context)?, table))
    }

    pub(crate) async fn open_async(
        join: &Arc<JoinProvider>,
        left: &Arc<ExecutableProvider>,
        right: &Arc<ExecutableProvider>,
        context: &Arc<EnumerationContext>,
        token: &CancellationToken,
    ) -> Result<Self, ExecutorError> {
        let mut table = HashTable::new();
        let mut rows = right.enumerate_async(context, token).await?;
        while let Some(tuple) = rows.advance_async().await? {
            insert(&mut table, join, tuple)?;
        }
        rows.dispose_async().await;
        Ok(Self::new(join, left.enumerate_async(context, token).await?, table))
    }

    fn new(join: &Arc<JoinProvider>, left: RecordSet, table: HashTable) -> Self {
        debug!(keys = table.len(), "join hash table built");
        Self {
            join: Arc::clone(join),
            left,
            table,
            pending: Vec::new().into_iter(),
        }
    }

    fn probe(&mut self, left: PackedTuple) -> Result<(), ExecutorError> {
        let join = &self.join;
        let matches = match JoinProvider::key(&join.left_key, &left)? {
            Some(key) => self.table.get(&key),
            None => None,
        };
        let combined = match matches {
            Some(rights) => rights
                .iter()
                .map(|right| join.combine.apply(&left, right))
                .collect::<Result<Vec<_>, _>>()?,
            None if join.join_type == JoinType::LeftOuter => {
                vec![join.combine.apply(&left, &join.right_blank)?]
            }
            None => Vec::new(),
        };
        self.pending = combined.into_iter();
        Ok(())
    }

    pub(crate) fn next(&mut self) -> Result<Option<PackedTuple>, ExecutorError> {
        loop {
            if let Some(tuple) = self.pending.next() {
                return Ok(Some(tuple));
            }
            match self.left.advance()? {
                Some(left) => self.probe(left)?,
                None => return Ok(None),
            }
        }
    }

    pub(crate) async fn next_async(&mut self) -> Result<Option<PackedTuple>, ExecutorError> {
        loop {
            if let Some(tuple) = self.pending.next() {
                return Ok(Some(tuple));
            }
            match self.left.advance_async().await? {
                Some(left) => self.probe(left)?,
                None => return Ok(None),
            }
        }
    }

    pub(crate) fn close(&mut self) {
        self.table.clear();
        self.left.dispose();
    }

    pub(crate) async fn close_async(&mut self) {
        self.table.clear();
        self.left.dispose_async().await;
    }
}

fn insert(table: &mut HashTable, join: &JoinProvider, tuple: PackedTuple) -> Result<(), ExecutorError> {
    if let Some(key) = JoinProvider::key(&join.right_key, &tuple)? {
        table.entry(key).or_default().push(tuple);
    }
    Ok(())
}
