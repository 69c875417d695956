//! Property tests for packed tuples.

use bytes::Bytes;
use proptest::collection::vec;
use proptest::prelude::*;
use tuplestream::datum::{Type, Value};
use tuplestream::tuple::{FieldPacking, FieldState, PackedTuple, TupleDescriptor};

fn arb_type() -> impl Strategy<Value = Type> {
    prop_oneof![
        Just(Type::Bool),
        Just(Type::Int2),
        Just(Type::Int4),
        Just(Type::Int8),
        Just(Type::Float4),
        Just(Type::Float8),
        Just(Type::Text),
        Just(Type::Bytea),
    ]
}

fn arb_non_null(ty: Type) -> BoxedStrategy<Value> {
    match ty {
        Type::Bool => any::<bool>().prop_map(Value::Boolean).boxed(),
        Type::Int2 => any::<i16>().prop_map(Value::Int16).boxed(),
        Type::Int4 => any::<i32>().prop_map(Value::Int32).boxed(),
        Type::Int8 => any::<i64>().prop_map(Value::Int64).boxed(),
        Type::Float4 => (-1.0e6f32..1.0e6f32).prop_map(Value::Float32).boxed(),
        Type::Float8 => (-1.0e12f64..1.0e12f64).prop_map(Value::Float64).boxed(),
        Type::Text => "[a-z0-9 ]{0,12}".prop_map(|s| Value::text(&s)).boxed(),
        Type::Bytea => vec(any::<u8>(), 0..16)
            .prop_map(|b| Value::Bytea(Bytes::from(b)))
            .boxed(),
    }
}

fn arb_value(ty: Type) -> BoxedStrategy<Value> {
    prop_oneof![1 => Just(Value::Null), 4 => arb_non_null(ty)].boxed()
}

/// A schema and one row of matching values.
fn arb_row() -> impl Strategy<Value = (Vec<Type>, Vec<Value>)> {
    vec(arb_type(), 0..70).prop_flat_map(|types| {
        let values: Vec<_> = types.iter().map(|&ty| arb_value(ty)).collect();
        (Just(types), values)
    })
}

fn expected_state(value: &Value) -> FieldState {
    if value.is_null() {
        FieldState::AVAILABLE_NULL
    } else {
        FieldState::AVAILABLE
    }
}

proptest! {
    #[test]
    fn prop_set_value_round_trips((types, values) in arb_row()) {
        let d = TupleDescriptor::new(&types);
        let mut t = PackedTuple::new(&d);
        for (i, v) in values.iter().enumerate() {
            t.set_value(i, v.clone()).unwrap();
        }
        for (i, v) in values.iter().enumerate() {
            prop_assert_eq!(t.get_value(i).unwrap(), (v.clone(), expected_state(v)));
        }
        prop_assert!(t.is_fully_loaded());
        prop_assert_eq!(t.to_values(), values);
    }

    #[test]
    fn prop_unavailable_reads_as_no_value((types, values) in arb_row(), pick in any::<prop::sample::Index>()) {
        prop_assume!(!types.is_empty());
        let d = TupleDescriptor::new(&types);
        let mut t = PackedTuple::from_values(&d, values).unwrap();
        let i = pick.index(types.len());
        t.set_field_state(i, FieldState::UNAVAILABLE).unwrap();
        prop_assert_eq!(t.get_value(i).unwrap(), (Value::Null, FieldState::UNAVAILABLE));
        prop_assert_eq!(t.unavailable_fields(), vec![i]);
    }

    #[test]
    fn prop_bare_null_state_always_rejected((types, values) in arb_row()) {
        let d = TupleDescriptor::new(&types);
        let mut t = PackedTuple::from_values(&d, values).unwrap();
        let before = t.clone();
        for i in 0..types.len() {
            prop_assert!(t.set_field_state(i, FieldState::NULL).is_err());
        }
        prop_assert_eq!(t, before);
    }

    #[test]
    fn prop_clone_is_independent((types, values) in arb_row(), pick in any::<prop::sample::Index>()) {
        prop_assume!(!types.is_empty());
        let d = TupleDescriptor::new(&types);
        let t = PackedTuple::from_values(&d, values).unwrap();
        let i = pick.index(types.len());
        let original = t.get_value(i).unwrap();

        let mut t2 = t.clone();
        t2.set_value(i, Value::Null).unwrap();
        t2.set_field_state(i, FieldState::UNAVAILABLE).unwrap();
        prop_assert_eq!(t.get_value(i).unwrap(), original);
    }

    #[test]
    fn prop_equal_tuples_hash_equal((types, values) in arb_row(), pick in any::<prop::sample::Index>()) {
        let d = TupleDescriptor::new(&types);
        let a = PackedTuple::from_values(&d, values.clone()).unwrap();
        let b = PackedTuple::from_values(&d, values).unwrap();
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(a.hash_code(), b.hash_code());

        if !types.is_empty() {
            let mut c = b.clone();
            c.set_field_state(pick.index(types.len()), FieldState::UNAVAILABLE).unwrap();
            prop_assert_ne!(&a, &c);
        }
    }

    #[test]
    fn prop_inline_values_never_straddle_words(types in vec(arb_type(), 0..100)) {
        let d = TupleDescriptor::new(&types);
        let state_words = types.len().div_ceil(32);
        let mut used = vec![0u64; d.values_len()];
        for f in d.fields() {
            if f.packing != FieldPacking::Inline {
                continue;
            }
            prop_assert!(f.value_index >= state_words);
            prop_assert!(f.value_bit_offset + f.value_bit_width <= 64);
            let mask = if f.value_bit_width == 64 {
                u64::MAX
            } else {
                ((1u64 << f.value_bit_width) - 1) << f.value_bit_offset
            };
            prop_assert_eq!(used[f.value_index] & mask, 0, "overlap at field {}", f.index);
            used[f.value_index] |= mask;
        }
        let objects = types.iter().filter(|t| t.bit_width().is_none()).count();
        prop_assert_eq!(d.objects_len(), objects);
    }
}

#[test]
fn test_changing_a_value_breaks_equality() {
    let d = TupleDescriptor::new(&[Type::Int4, Type::Text]);
    let a = PackedTuple::from_values(&d, vec![Value::Int32(1), Value::text("x")]).unwrap();
    let mut b = a.clone();
    b.set_value(1, Value::text("y")).unwrap();
    assert_ne!(a, b);
    b.set_value(1, Value::text("x")).unwrap();
    assert_eq!(a, b);
}
