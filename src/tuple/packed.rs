//! Packed tuple instance.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::datum::Value;

use super::{
    FieldPacking, FieldState, PackedFieldDescriptor, Scalar, TupleDescriptor, TupleError,
};

/// Multiplier used when combining per-field hashes.
const HASH_CODE_MULTIPLIER: i32 = 397;

/// A fixed-schema record backed by a word buffer and an object buffer.
///
/// Every field starts [`FieldState::UNAVAILABLE`]. Reads of values go through
/// the field state: [`get_value`](Self::get_value) reports the state next to
/// the value, and the typed [`get_scalar`](Self::get_scalar) refuses to read
/// a field that has not been loaded.
///
/// Cloning copies the word buffer and the object slots; object payloads are
/// reference counted, so they are shared rather than copied.
#[derive(Clone)]
pub struct PackedTuple {
    descriptor: Arc<TupleDescriptor>,
    values: Box<[u64]>,
    objects: Box<[Option<Value>]>,
}

impl PackedTuple {
    /// Creates a tuple with every field unavailable.
    pub fn new(descriptor: &Arc<TupleDescriptor>) -> Self {
        Self {
            descriptor: Arc::clone(descriptor),
            values: vec![0; descriptor.values_len()].into_boxed_slice(),
            objects: vec![None; descriptor.objects_len()].into_boxed_slice(),
        }
    }

    /// Creates a tuple with every field unavailable.
    ///
    /// Used as the right-hand side of outer joins when nothing matched.
    pub fn blank(descriptor: &Arc<TupleDescriptor>) -> Self {
        Self::new(descriptor)
    }

    /// Creates a tuple and sets every field from `values`.
    ///
    /// # Errors
    ///
    /// Returns `TupleError::ArityMismatch` if the number of values differs
    /// from the number of fields, or `TupleError::TypeMismatch` if a value
    /// does not match its field type.
    pub fn from_values(
        descriptor: &Arc<TupleDescriptor>,
        values: Vec<Value>,
    ) -> Result<Self, TupleError> {
        if values.len() != descriptor.len() {
            return Err(TupleError::ArityMismatch {
                expected: descriptor.len(),
                found: values.len(),
            });
        }
        let mut tuple = Self::new(descriptor);
        for (index, value) in values.into_iter().enumerate() {
            tuple.set_value(index, value)?;
        }
        Ok(tuple)
    }

    /// Returns the tuple's descriptor.
    pub fn descriptor(&self) -> &Arc<TupleDescriptor> {
        &self.descriptor
    }

    /// Returns the number of fields.
    pub fn len(&self) -> usize {
        self.descriptor.len()
    }

    /// Returns true if the tuple has no fields.
    pub fn is_empty(&self) -> bool {
        self.descriptor.is_empty()
    }

    fn field(&self, index: usize) -> Result<&PackedFieldDescriptor, TupleError> {
        self.descriptor
            .field(index)
            .ok_or(TupleError::FieldIndexOutOfBounds {
                index,
                len: self.descriptor.len(),
            })
    }

    /// Returns the state of a field.
    pub fn field_state(&self, index: usize) -> Result<FieldState, TupleError> {
        Ok(self.state_of(self.field(index)?))
    }

    /// Sets the state of a field.
    ///
    /// Moving an object field away from `AVAILABLE` drops its boxed value.
    /// Marking an object field with an empty slot `AVAILABLE` stores
    /// `AVAILABLE | NULL` instead, since there is no value to read. Inline
    /// fields keep whatever bits they hold.
    ///
    /// # Errors
    ///
    /// Returns `TupleError::InvalidFieldState` for the bare `NULL` state.
    pub fn set_field_state(&mut self, index: usize, state: FieldState) -> Result<(), TupleError> {
        if !state.is_storable() {
            return Err(TupleError::InvalidFieldState { state });
        }
        let descriptor = Arc::clone(&self.descriptor);
        let field = descriptor
            .field(index)
            .ok_or(TupleError::FieldIndexOutOfBounds {
                index,
                len: descriptor.len(),
            })?;
        let state = match field.packing {
            FieldPacking::Object if state != FieldState::AVAILABLE => {
                *self.object_mut(field) = None;
                state
            }
            FieldPacking::Object if self.object(field).is_none() => FieldState::AVAILABLE_NULL,
            _ => state,
        };
        self.write_state(field, state);
        Ok(())
    }

    /// Returns the value of a field together with its state.
    ///
    /// Unavailable and null fields read as `Value::Null`; the state tells
    /// them apart.
    pub fn get_value(&self, index: usize) -> Result<(Value, FieldState), TupleError> {
        let field = self.field(index)?;
        let state = self.state_of(field);
        if state == FieldState::AVAILABLE {
            Ok((field.accessor.get(self, field), state))
        } else {
            Ok((Value::Null, state))
        }
    }

    /// Sets the value of a field and marks it available.
    ///
    /// `Value::Null` marks the field `AVAILABLE | NULL`.
    pub fn set_value(&mut self, index: usize, value: Value) -> Result<(), TupleError> {
        let descriptor = Arc::clone(&self.descriptor);
        let field = descriptor
            .field(index)
            .ok_or(TupleError::FieldIndexOutOfBounds {
                index,
                len: descriptor.len(),
            })?;
        let state = if value.is_null() {
            FieldState::AVAILABLE_NULL
        } else {
            FieldState::AVAILABLE
        };
        field.accessor.set(self, field, value)?;
        self.write_state(field, state);
        Ok(())
    }

    /// Reads an inline scalar without boxing.
    ///
    /// Returns `None` for a null field.
    ///
    /// # Errors
    ///
    /// Returns `TupleError::TypeMismatch` if `T` does not match the field type
    /// and `TupleError::FieldUnavailable` if the field has not been loaded.
    pub fn get_scalar<T: Scalar>(&self, index: usize) -> Result<Option<T>, TupleError> {
        let field = self.field(index)?;
        check_scalar::<T>(field)?;
        match self.state_of(field) {
            FieldState::AVAILABLE => Ok(Some(T::from_word(self.read_bits(field)))),
            FieldState::AVAILABLE_NULL => Ok(None),
            _ => Err(TupleError::FieldUnavailable { index }),
        }
    }

    /// Writes an inline scalar without boxing and marks the field available.
    pub fn set_scalar<T: Scalar>(&mut self, index: usize, value: T) -> Result<(), TupleError> {
        let descriptor = Arc::clone(&self.descriptor);
        let field = descriptor
            .field(index)
            .ok_or(TupleError::FieldIndexOutOfBounds {
                index,
                len: descriptor.len(),
            })?;
        check_scalar::<T>(field)?;
        self.write_bits(field, value.into_word());
        self.write_state(field, FieldState::AVAILABLE);
        Ok(())
    }

    /// Returns true if every field is available.
    pub fn is_fully_loaded(&self) -> bool {
        self.descriptor
            .fields()
            .iter()
            .all(|f| self.state_of(f).is_available())
    }

    /// Returns the indexes of fields that have not been loaded.
    pub fn unavailable_fields(&self) -> Vec<usize> {
        self.descriptor
            .fields()
            .iter()
            .filter(|f| !self.state_of(f).is_available())
            .map(|f| f.index)
            .collect()
    }

    /// Returns all field values; unavailable fields read as `Value::Null`.
    pub fn to_values(&self) -> Vec<Value> {
        self.descriptor
            .fields()
            .iter()
            .map(|f| {
                if self.state_of(f) == FieldState::AVAILABLE {
                    f.accessor.get(self, f)
                } else {
                    Value::Null
                }
            })
            .collect()
    }

    /// Copies one field (state and value) from `src`.
    ///
    /// # Errors
    ///
    /// Returns `TupleError::TypeMismatch` if the two fields differ in type.
    pub fn copy_field_from(
        &mut self,
        index: usize,
        src: &PackedTuple,
        src_index: usize,
    ) -> Result<(), TupleError> {
        let descriptor = Arc::clone(&self.descriptor);
        let dst_field = descriptor
            .field(index)
            .ok_or(TupleError::FieldIndexOutOfBounds {
                index,
                len: descriptor.len(),
            })?;
        let src_field = src.field(src_index)?;
        if dst_field.ty != src_field.ty {
            return Err(TupleError::TypeMismatch {
                index,
                expected: dst_field.ty,
                found: src_field.ty.to_string(),
            });
        }
        self.copy_field_unchecked(dst_field, src, src_field);
        Ok(())
    }

    /// Copies state and value between fields already known to share a type.
    pub(crate) fn copy_field_unchecked(
        &mut self,
        dst_field: &PackedFieldDescriptor,
        src: &PackedTuple,
        src_field: &PackedFieldDescriptor,
    ) {
        let state = src.state_of(src_field);
        if state == FieldState::AVAILABLE {
            src_field.accessor.copy(src, src_field, self, dst_field);
        } else if dst_field.packing == FieldPacking::Object {
            *self.object_mut(dst_field) = None;
        }
        self.write_state(dst_field, state);
    }

    /// Returns the combined hash of all fields.
    ///
    /// Unavailable and null fields contribute zero, so the hash is defined
    /// for partially loaded tuples.
    pub fn hash_code(&self) -> i32 {
        self.descriptor.fields().iter().fold(0i32, |result, f| {
            let field_hash = if self.state_of(f) == FieldState::AVAILABLE {
                f.accessor.value_hash(self, f)
            } else {
                0
            };
            HASH_CODE_MULTIPLIER.wrapping_mul(result) ^ field_hash
        })
    }

    // Raw layout access used by accessors and transforms.

    fn state_of(&self, field: &PackedFieldDescriptor) -> FieldState {
        // u64 shifts are logical, so no sign extension leaks into the state
        FieldState::from_bits(self.values[field.state_index] >> field.state_bit_offset)
    }

    fn write_state(&mut self, field: &PackedFieldDescriptor, state: FieldState) {
        let block = &mut self.values[field.state_index];
        *block = (*block & !(FieldState::MASK << field.state_bit_offset))
            | (u64::from(state.bits()) << field.state_bit_offset);
    }

    pub(crate) fn read_bits(&self, field: &PackedFieldDescriptor) -> u64 {
        let word = self.values[field.value_index];
        if field.value_bit_width >= 64 {
            word
        } else {
            (word >> field.value_bit_offset) & ((1u64 << field.value_bit_width) - 1)
        }
    }

    pub(crate) fn write_bits(&mut self, field: &PackedFieldDescriptor, bits: u64) {
        let word = &mut self.values[field.value_index];
        if field.value_bit_width >= 64 {
            *word = bits;
        } else {
            let mask = ((1u64 << field.value_bit_width) - 1) << field.value_bit_offset;
            *word = (*word & !mask) | ((bits << field.value_bit_offset) & mask);
        }
    }

    pub(crate) fn object(&self, field: &PackedFieldDescriptor) -> Option<&Value> {
        self.objects[field.value_index].as_ref()
    }

    pub(crate) fn object_mut(&mut self, field: &PackedFieldDescriptor) -> &mut Option<Value> {
        &mut self.objects[field.value_index]
    }
}

fn check_scalar<T: Scalar>(field: &PackedFieldDescriptor) -> Result<(), TupleError> {
    if field.ty == T::TYPE {
        Ok(())
    } else {
        Err(TupleError::TypeMismatch {
            index: field.index,
            expected: field.ty,
            found: T::TYPE.to_string(),
        })
    }
}

impl PartialEq for PackedTuple {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        if !self.descriptor.is_compatible(&other.descriptor) {
            return false;
        }
        let fields = self.descriptor.fields();
        fields.iter().zip(other.descriptor.fields()).all(|(a, b)| {
            let state = self.state_of(a);
            if state != other.state_of(b) {
                return false;
            }
            state != FieldState::AVAILABLE || a.accessor.value_eq(self, a, other, b)
        })
    }
}

impl Eq for PackedTuple {}

impl Hash for PackedTuple {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_i32(self.hash_code());
    }
}

impl fmt::Debug for PackedTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for field in self.descriptor.fields() {
            match self.state_of(field) {
                FieldState::AVAILABLE => list.entry(&field.accessor.get(self, field)),
                FieldState::AVAILABLE_NULL => list.entry(&Value::Null),
                _ => list.entry(&format_args!("<unavailable>")),
            };
        }
        list.finish()
    }
}
