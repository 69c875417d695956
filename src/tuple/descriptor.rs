//! Tuple schema and physical layout.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock, Weak};

use parking_lot::Mutex;

use crate::datum::Type;

use super::FieldAccessor;

/// Number of 2-bit field states held by one state word.
const STATES_PER_WORD: usize = 32;
const WORD_BITS: u64 = 64;

/// Descriptors alive in this process, keyed by field type sequence.
static REGISTRY: LazyLock<Mutex<HashMap<Box<[Type]>, Weak<TupleDescriptor>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Where a field's value lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPacking {
    /// Fixed-width scalar packed into the word buffer.
    Inline,
    /// Variable-size value held in an object slot.
    Object,
}

/// Precomputed storage plan for one field.
#[derive(Debug, Clone)]
pub struct PackedFieldDescriptor {
    /// Position of the field in the tuple.
    pub index: usize,
    /// Semantic type.
    pub ty: Type,
    /// Which buffer holds the value.
    pub packing: FieldPacking,
    /// Word index (inline) or object slot (object).
    pub value_index: usize,
    /// Bit offset of the value inside its word. Zero for object fields.
    pub value_bit_offset: u32,
    /// Width of the value in bits. Zero for object fields.
    pub value_bit_width: u32,
    /// Word index holding the field state.
    pub state_index: usize,
    /// Bit offset of the 2-bit state inside its word.
    pub state_bit_offset: u32,
    /// Accessor resolved for `ty`.
    pub accessor: FieldAccessor,
}

/// Immutable tuple schema.
///
/// Descriptors are interned: [`TupleDescriptor::new`] returns the same `Arc`
/// for identical type sequences while any instance is alive, so descriptor
/// identity can key caches and tuple equality can short-circuit on
/// [`Arc::ptr_eq`].
pub struct TupleDescriptor {
    types: Box<[Type]>,
    fields: Box<[PackedFieldDescriptor]>,
    values_len: usize,
    objects_len: usize,
}

impl TupleDescriptor {
    /// Returns the shared descriptor for the given field types.
    pub fn new(types: &[Type]) -> Arc<Self> {
        let mut registry = REGISTRY.lock();
        if let Some(existing) = registry.get(types).and_then(Weak::upgrade) {
            return existing;
        }
        let descriptor = Arc::new(Self::build(types));
        registry.retain(|_, weak| weak.strong_count() > 0);
        registry.insert(types.into(), Arc::downgrade(&descriptor));
        descriptor
    }

    /// Returns the empty (zero-field) descriptor.
    pub fn empty() -> Arc<Self> {
        Self::new(&[])
    }

    /// Computes the storage plan.
    ///
    /// State words come first. Inline values are then placed widest first
    /// (stable by field index); because every width is a power of two no
    /// larger than a word, each value stays inside a single word.
    fn build(types: &[Type]) -> Self {
        let state_words = types.len().div_ceil(STATES_PER_WORD);

        let mut inline: Vec<(usize, u32)> = types
            .iter()
            .enumerate()
            .filter_map(|(i, ty)| ty.bit_width().map(|w| (i, w)))
            .collect();
        inline.sort_by(|a, b| b.1.cmp(&a.1));

        let mut placement = vec![(0usize, 0u32, 0u32); types.len()];
        let mut bit_cursor = state_words as u64 * WORD_BITS;
        for (index, width) in inline {
            placement[index] = (
                (bit_cursor / WORD_BITS) as usize,
                (bit_cursor % WORD_BITS) as u32,
                width,
            );
            bit_cursor += u64::from(width);
        }

        let mut objects_len = 0;
        let fields = types
            .iter()
            .enumerate()
            .map(|(index, &ty)| {
                let (packing, value_index, value_bit_offset, value_bit_width) =
                    if ty.bit_width().is_some() {
                        let (word, offset, width) = placement[index];
                        (FieldPacking::Inline, word, offset, width)
                    } else {
                        objects_len += 1;
                        (FieldPacking::Object, objects_len - 1, 0, 0)
                    };
                PackedFieldDescriptor {
                    index,
                    ty,
                    packing,
                    value_index,
                    value_bit_offset,
                    value_bit_width,
                    state_index: index / STATES_PER_WORD,
                    state_bit_offset: ((index % STATES_PER_WORD) * 2) as u32,
                    accessor: FieldAccessor::for_type(ty),
                }
            })
            .collect();

        Self {
            types: types.into(),
            fields,
            values_len: bit_cursor.div_ceil(WORD_BITS) as usize,
            objects_len,
        }
    }

    /// Returns the number of fields.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns true if the descriptor has no fields.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Returns the field types in order.
    pub fn types(&self) -> &[Type] {
        &self.types
    }

    /// Returns the storage plan of a field.
    pub fn field(&self, index: usize) -> Option<&PackedFieldDescriptor> {
        self.fields.get(index)
    }

    /// Returns all field storage plans in order.
    pub fn fields(&self) -> &[PackedFieldDescriptor] {
        &self.fields
    }

    /// Returns the length of the word buffer (state words + inline values).
    pub fn values_len(&self) -> usize {
        self.values_len
    }

    /// Returns the number of object slots.
    pub fn objects_len(&self) -> usize {
        self.objects_len
    }

    /// Returns the descriptor of `self` followed by `other`.
    pub fn concat(&self, other: &TupleDescriptor) -> Arc<Self> {
        let types: Vec<Type> = self.types.iter().chain(other.types.iter()).copied().collect();
        Self::new(&types)
    }

    /// Returns true if both descriptors describe the same field types.
    pub fn is_compatible(self: &Arc<Self>, other: &Arc<Self>) -> bool {
        Arc::ptr_eq(self, other) || self.types == other.types
    }
}

impl PartialEq for TupleDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.types == other.types
    }
}

impl Eq for TupleDescriptor {}

impl fmt::Debug for TupleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TupleDescriptor")
            .field("types", &self.types)
            .field("values_len", &self.values_len)
            .field("objects_len", &self.objects_len)
            .finish()
    }
}

impl fmt::Display for TupleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, ty) in self.types.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", ty)?;
        }
        write!(f, ")")
    }
}
