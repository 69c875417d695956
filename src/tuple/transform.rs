//! Tuple transforms.
//!
//! Transforms are built once per schema pair and then applied per row. They
//! copy packed state and values field by field, so no value is boxed on the
//! way through.

use std::sync::Arc;

use super::{PackedTuple, TupleDescriptor, TupleError};

/// Concatenates a left and a right tuple into one tuple.
#[derive(Debug, Clone)]
pub struct CombineTransform {
    left: Arc<TupleDescriptor>,
    right: Arc<TupleDescriptor>,
    result: Arc<TupleDescriptor>,
}

impl CombineTransform {
    /// Creates a transform for the given input schemas.
    pub fn new(left: &Arc<TupleDescriptor>, right: &Arc<TupleDescriptor>) -> Self {
        Self {
            left: Arc::clone(left),
            right: Arc::clone(right),
            result: left.concat(right),
        }
    }

    /// Returns the output schema.
    pub fn descriptor(&self) -> &Arc<TupleDescriptor> {
        &self.result
    }

    /// Returns `left ++ right`.
    ///
    /// # Errors
    ///
    /// Returns `TupleError::DescriptorMismatch` if either input has a
    /// different schema than the transform was built for.
    pub fn apply(&self, left: &PackedTuple, right: &PackedTuple) -> Result<PackedTuple, TupleError> {
        check_input(&self.left, left)?;
        check_input(&self.right, right)?;

        let mut out = PackedTuple::new(&self.result);
        let fields = self.result.fields();
        for (src_field, dst_field) in self.left.fields().iter().zip(fields) {
            out.copy_field_unchecked(dst_field, left, src_field);
        }
        for (src_field, dst_field) in self.right.fields().iter().zip(&fields[self.left.len()..]) {
            out.copy_field_unchecked(dst_field, right, src_field);
        }
        Ok(out)
    }
}

/// Projects a tuple onto a subset (or reordering) of its fields.
#[derive(Debug, Clone)]
pub struct MapTransform {
    source: Arc<TupleDescriptor>,
    map: Box<[usize]>,
    result: Arc<TupleDescriptor>,
}

impl MapTransform {
    /// Creates a transform that emits `source[map[0]], source[map[1]], ...`.
    ///
    /// # Errors
    ///
    /// Returns `TupleError::FieldIndexOutOfBounds` if a mapped index is out of range.
    pub fn new(source: &Arc<TupleDescriptor>, map: &[usize]) -> Result<Self, TupleError> {
        let types = map
            .iter()
            .map(|&index| {
                source
                    .field(index)
                    .map(|f| f.ty)
                    .ok_or(TupleError::FieldIndexOutOfBounds {
                        index,
                        len: source.len(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            source: Arc::clone(source),
            map: map.into(),
            result: TupleDescriptor::new(&types),
        })
    }

    /// Returns the output schema.
    pub fn descriptor(&self) -> &Arc<TupleDescriptor> {
        &self.result
    }

    /// Returns the projected tuple.
    pub fn apply(&self, tuple: &PackedTuple) -> Result<PackedTuple, TupleError> {
        check_input(&self.source, tuple)?;

        let mut out = PackedTuple::new(&self.result);
        for (dst_field, &src_index) in self.result.fields().iter().zip(self.map.iter()) {
            let src_field = &self.source.fields()[src_index];
            out.copy_field_unchecked(dst_field, tuple, src_field);
        }
        Ok(out)
    }
}

fn check_input(expected: &Arc<TupleDescriptor>, tuple: &PackedTuple) -> Result<(), TupleError> {
    if expected.is_compatible(tuple.descriptor()) {
        Ok(())
    } else {
        Err(TupleError::DescriptorMismatch {
            expected: expected.to_string(),
            found: tuple.descriptor().to_string(),
        })
    }
}
