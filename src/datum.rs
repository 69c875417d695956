//! Field types and values.
//!
//! [`Type`] names the semantic type of a tuple field and decides how the field
//! is stored inside a [`PackedTuple`](crate::tuple::PackedTuple): fixed-width
//! scalars are packed into the tuple's word buffer, variable-size values are
//! kept in its object slots. [`Value`] is the boxed, self-describing form used
//! at the edges (row sources, parameters, untyped reads).

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

/// Semantic type of a tuple field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    /// Packed as a single bit.
    Bool,
    /// Packed as 16 bits.
    Int2,
    /// Packed as 32 bits.
    Int4,
    /// Packed as a full word.
    Int8,
    /// IEEE single, packed as 32 bits.
    Float4,
    /// IEEE double, packed as a full word.
    Float8,
    /// UTF-8 text, kept in an object slot.
    Text,
    /// Raw bytes, kept in an object slot.
    Bytea,
}

impl Type {
    /// Upper-case name used in plan dumps and error messages.
    pub const fn display_name(self) -> &'static str {
        match self {
            Type::Bool => "BOOLEAN",
            Type::Int2 => "SMALLINT",
            Type::Int4 => "INTEGER",
            Type::Int8 => "BIGINT",
            Type::Float4 => "REAL",
            Type::Float8 => "DOUBLE PRECISION",
            Type::Text => "TEXT",
            Type::Bytea => "BYTEA",
        }
    }

    /// Byte size of an inline type; `None` for object-slot types.
    pub const fn fixed_size(self) -> Option<usize> {
        match self {
            Type::Bool => Some(1),
            Type::Int2 => Some(2),
            Type::Int4 => Some(4),
            Type::Int8 => Some(8),
            Type::Float4 => Some(4),
            Type::Float8 => Some(8),
            Type::Text | Type::Bytea => None,
        }
    }

    /// Returns the number of bits the value occupies when packed inline.
    ///
    /// Booleans take a single bit. Variable-length types return `None`
    /// because they live in object slots.
    pub const fn bit_width(self) -> Option<u32> {
        match self {
            Type::Bool => Some(1),
            Type::Int2 => Some(16),
            Type::Int4 | Type::Float4 => Some(32),
            Type::Int8 | Type::Float8 => Some(64),
            Type::Text | Type::Bytea => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Type::Bool => "boolean",
            Type::Int2 => "smallint",
            Type::Int4 => "integer",
            Type::Int8 => "bigint",
            Type::Float4 => "real",
            Type::Float8 => "double precision",
            Type::Text => "text",
            Type::Bytea => "bytea",
        };
        write!(f, "{}", name)
    }
}

/// A typed field value.
///
/// Variable-length payloads are reference counted, so cloning a value (and
/// therefore a tuple's object slots) never copies the payload.
#[derive(Debug, Clone, PartialEq, PartialOrd)]
pub enum Value {
    /// No value. Fits a field of any type.
    Null,
    /// [`Type::Bool`] value.
    Boolean(bool),
    /// [`Type::Int2`] value.
    Int16(i16),
    /// [`Type::Int4`] value.
    Int32(i32),
    /// [`Type::Int8`] value.
    Int64(i64),
    /// [`Type::Float4`] value.
    Float32(f32),
    /// [`Type::Float8`] value.
    Float64(f64),
    /// [`Type::Text`] value, shared on clone.
    Text(Arc<str>),
    /// [`Type::Bytea`] value, shared on clone.
    Bytea(Bytes),
}

impl Value {
    /// Type of the field this value fits; `None` for `Null`, which fits any.
    pub fn data_type(&self) -> Option<Type> {
        match self {
            Value::Null => None,
            Value::Boolean(_) => Some(Type::Bool),
            Value::Int16(_) => Some(Type::Int2),
            Value::Int32(_) => Some(Type::Int4),
            Value::Int64(_) => Some(Type::Int8),
            Value::Float32(_) => Some(Type::Float4),
            Value::Float64(_) => Some(Type::Float8),
            Value::Text(_) => Some(Type::Text),
            Value::Bytea(_) => Some(Type::Bytea),
        }
    }

    /// Returns true for `Value::Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Creates a text value.
    pub fn text(s: &str) -> Self {
        Value::Text(Arc::from(s))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(b) => write!(f, "{}", if *b { "t" } else { "f" }),
            Value::Int16(n) => write!(f, "{}", n),
            Value::Int32(n) => write!(f, "{}", n),
            Value::Int64(n) => write!(f, "{}", n),
            Value::Float32(n) => write!(f, "{}", n),
            Value::Float64(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{}", s),
            Value::Bytea(b) => {
                write!(f, "\\x")?;
                for byte in b.iter() {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::Int16(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::text(v)
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Value::Bytea(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
