//! Field accessors.
//!
//! Each field of a descriptor gets one [`FieldAccessor`] when the descriptor
//! is built. Accessors read and write the packed buffers directly, so scalar
//! fields are never boxed on the typed paths.

use std::hash::{DefaultHasher, Hasher};

use crate::datum::{Type, Value};

use super::{FieldPacking, PackedFieldDescriptor, PackedTuple, TupleError};

/// Read/write strategy for one field, selected by field type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldAccessor {
    /// 1-bit inline boolean.
    Bool,
    /// 16-bit inline integer.
    Int16,
    /// 32-bit inline integer.
    Int32,
    /// 64-bit inline integer.
    Int64,
    /// 32-bit inline float (stored as IEEE bits).
    Float32,
    /// 64-bit inline float (stored as IEEE bits).
    Float64,
    /// Reference-counted value in an object slot.
    Object,
}

impl FieldAccessor {
    pub(crate) const fn for_type(ty: Type) -> Self {
        match ty {
            Type::Bool => FieldAccessor::Bool,
            Type::Int2 => FieldAccessor::Int16,
            Type::Int4 => FieldAccessor::Int32,
            Type::Int8 => FieldAccessor::Int64,
            Type::Float4 => FieldAccessor::Float32,
            Type::Float8 => FieldAccessor::Float64,
            Type::Text | Type::Bytea => FieldAccessor::Object,
        }
    }

    /// Reads the stored value. The caller checks the field state first.
    pub fn get(self, tuple: &PackedTuple, field: &PackedFieldDescriptor) -> Value {
        let bits = || tuple.read_bits(field);
        match self {
            FieldAccessor::Bool => Value::Boolean(bool::from_word(bits())),
            FieldAccessor::Int16 => Value::Int16(i16::from_word(bits())),
            FieldAccessor::Int32 => Value::Int32(i32::from_word(bits())),
            FieldAccessor::Int64 => Value::Int64(i64::from_word(bits())),
            FieldAccessor::Float32 => Value::Float32(f32::from_word(bits())),
            FieldAccessor::Float64 => Value::Float64(f64::from_word(bits())),
            FieldAccessor::Object => tuple.object(field).cloned().unwrap_or(Value::Null),
        }
    }

    /// Writes `value` into the field's slot without touching its state.
    ///
    /// `Value::Null` clears the slot.
    pub fn set(
        self,
        tuple: &mut PackedTuple,
        field: &PackedFieldDescriptor,
        value: Value,
    ) -> Result<(), TupleError> {
        if let Some(found) = value.data_type()
            && found != field.ty
        {
            return Err(TupleError::TypeMismatch {
                index: field.index,
                expected: field.ty,
                found: found.to_string(),
            });
        }
        let bits = match value {
            Value::Null => {
                match field.packing {
                    FieldPacking::Inline => tuple.write_bits(field, 0),
                    FieldPacking::Object => *tuple.object_mut(field) = None,
                }
                return Ok(());
            }
            Value::Boolean(v) => v.into_word(),
            Value::Int16(v) => v.into_word(),
            Value::Int32(v) => v.into_word(),
            Value::Int64(v) => v.into_word(),
            Value::Float32(v) => v.into_word(),
            Value::Float64(v) => v.into_word(),
            Value::Text(_) | Value::Bytea(_) => {
                *tuple.object_mut(field) = Some(value);
                return Ok(());
            }
        };
        tuple.write_bits(field, bits);
        Ok(())
    }

    /// Hashes the stored value.
    pub fn value_hash(self, tuple: &PackedTuple, field: &PackedFieldDescriptor) -> i32 {
        match self {
            FieldAccessor::Object => {
                let mut hasher = DefaultHasher::new();
                match tuple.object(field) {
                    Some(Value::Text(s)) => hasher.write(s.as_bytes()),
                    Some(Value::Bytea(b)) => hasher.write(b),
                    _ => return 0,
                }
                fold(hasher.finish())
            }
            _ => fold(tuple.read_bits(field)),
        }
    }

    /// Compares the stored values of two fields of the same type.
    pub fn value_eq(
        self,
        a: &PackedTuple,
        a_field: &PackedFieldDescriptor,
        b: &PackedTuple,
        b_field: &PackedFieldDescriptor,
    ) -> bool {
        match self {
            FieldAccessor::Object => a.object(a_field) == b.object(b_field),
            _ => a.read_bits(a_field) == b.read_bits(b_field),
        }
    }

    /// Copies the stored value of `src` into `dst` without boxing.
    pub(crate) fn copy(
        self,
        src: &PackedTuple,
        src_field: &PackedFieldDescriptor,
        dst: &mut PackedTuple,
        dst_field: &PackedFieldDescriptor,
    ) {
        match self {
            FieldAccessor::Object => *dst.object_mut(dst_field) = src.object(src_field).cloned(),
            _ => dst.write_bits(dst_field, src.read_bits(src_field)),
        }
    }
}

fn fold(bits: u64) -> i32 {
    (bits ^ (bits >> 32)) as u32 as i32
}

/// A fixed-width scalar that can be read and written inline.
pub trait Scalar: Copy {
    /// Field type this scalar maps to.
    const TYPE: Type;

    /// Decodes the scalar from its packed bits.
    fn from_word(bits: u64) -> Self;

    /// Encodes the scalar into packed bits (zero-extended to a word).
    fn into_word(self) -> u64;
}

impl Scalar for bool {
    const TYPE: Type = Type::Bool;

    fn from_word(bits: u64) -> Self {
        bits & 1 != 0
    }

    fn into_word(self) -> u64 {
        u64::from(self)
    }
}

impl Scalar for i16 {
    const TYPE: Type = Type::Int2;

    fn from_word(bits: u64) -> Self {
        bits as u16 as i16
    }

    fn into_word(self) -> u64 {
        u64::from(self as u16)
    }
}

impl Scalar for i32 {
    const TYPE: Type = Type::Int4;

    fn from_word(bits: u64) -> Self {
        bits as u32 as i32
    }

    fn into_word(self) -> u64 {
        u64::from(self as u32)
    }
}

impl Scalar for i64 {
    const TYPE: Type = Type::Int8;

    fn from_word(bits: u64) -> Self {
        bits as i64
    }

    fn into_word(self) -> u64 {
        self as u64
    }
}

impl Scalar for f32 {
    const TYPE: Type = Type::Float4;

    fn from_word(bits: u64) -> Self {
        f32::from_bits(bits as u32)
    }

    fn into_word(self) -> u64 {
        u64::from(self.to_bits())
    }
}

impl Scalar for f64 {
    const TYPE: Type = Type::Float8;

    fn from_word(bits: u64) -> Self {
        f64::from_bits(bits)
    }

    fn into_word(self) -> u64 {
        self.to_bits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_words_zero_extend() {
        assert_eq!((-1i16).into_word(), 0xFFFF);
        assert_eq!((-1i32).into_word(), 0xFFFF_FFFF);
        assert_eq!(i16::from_word(0xFFFF), -1);
        assert_eq!(i32::from_word(0xFFFF_FFFF), -1);
        assert_eq!(i64::from_word((-5i64).into_word()), -5);
        assert_eq!(f32::from_word(1.5f32.into_word()), 1.5);
        assert!(bool::from_word(true.into_word()));
    }

    #[test]
    fn test_accessor_for_type() {
        assert_eq!(FieldAccessor::for_type(Type::Bool), FieldAccessor::Bool);
        assert_eq!(FieldAccessor::for_type(Type::Float8), FieldAccessor::Float64);
        assert_eq!(FieldAccessor::for_type(Type::Text), FieldAccessor::Object);
        assert_eq!(FieldAccessor::for_type(Type::Bytea), FieldAccessor::Object);
    }
}
