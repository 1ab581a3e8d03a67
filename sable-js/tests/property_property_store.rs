//! Property 2: Property store reads back what it writes
//!
//! `set_property(obj, k, v)` followed by `get_property(obj, k)` yields `v`
//! for any object-like receiver and key. Writing past an array's end grows
//! `length` and leaves holes reading as Undefined. Deleting removes the key
//! and deleting a missing key is not an error.

use proptest::prelude::*;
use sable_js::{PropertyKey, Tag, Value, VmError, VmSession};

fn arb_key() -> impl Strategy<Value = PropertyKey> {
    prop_oneof![
        (0u32..10_000).prop_map(PropertyKey::Index),
        "[a-zA-Z_$][a-zA-Z0-9_$]{0,12}".prop_map(|s| PropertyKey::from(s.as_str())),
    ]
}

fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Undefined),
        Just(Value::Null),
        any::<bool>().prop_map(Value::Boolean),
        (-1.0e9f64..1.0e9).prop_map(Value::Number),
        "[ -~]{0,16}".prop_map(Value::String),
    ]
}

/// Receivers of every object-like tag.
fn receivers(vm: &mut VmSession) -> Vec<Value> {
    vec![
        vm.create_object().unwrap(),
        vm.create_array(0).unwrap(),
        vm.create_function("f", |_, _, _| Ok(Value::Undefined)).unwrap(),
        vm.create_error(None).unwrap(),
        vm.create_regexp("x", "").unwrap(),
        vm.create_date(Some(0.0)).unwrap(),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn set_then_get(key in arb_key(), value in arb_value()) {
        let mut vm = VmSession::new().unwrap();
        for obj in receivers(&mut vm) {
            // Arrays reserve "length" for the element count.
            if obj.is_array() && key == PropertyKey::from("length") {
                continue;
            }
            vm.set_property(&obj, key.clone(), value.clone()).unwrap();
            prop_assert_eq!(vm.get_property(&obj, key.clone()).unwrap(), value.clone());
        }
    }

    #[test]
    fn array_writes_grow_length(index in 0u32..5_000) {
        let mut vm = VmSession::new().unwrap();
        let array = vm.create_array(0).unwrap();
        vm.set_property(&array, index, "v").unwrap();
        prop_assert_eq!(vm.get_property(&array, "length").unwrap(), Value::from(index + 1));
        if index > 0 {
            prop_assert_eq!(vm.get_property(&array, index - 1).unwrap(), Value::Undefined);
        }
    }
}

#[test]
fn array_growth_leaves_holes() {
    let mut vm = VmSession::new().unwrap();
    let array = vm.create_array(0).unwrap();
    vm.set_property(&array, 5, "five").unwrap();
    assert_eq!(vm.get_property(&array, "length").unwrap(), Value::from(6));
    assert_eq!(vm.get_property(&array, 2).unwrap(), Value::Undefined);
    assert_eq!(vm.get_property(&array, "5").unwrap(), Value::from("five"));
}

#[test]
fn length_write_truncates() {
    let mut vm = VmSession::new().unwrap();
    let array = vm
        .create_array_from(vec![Value::from(1), Value::from(2), Value::from(3)])
        .unwrap();
    vm.set_property(&array, "length", 1).unwrap();
    assert_eq!(vm.get_property(&array, 2).unwrap(), Value::Undefined);
    assert_eq!(vm.own_keys(&array).unwrap(), vec![PropertyKey::Index(0)]);
}

#[test]
fn delete_then_get_is_undefined() {
    let mut vm = VmSession::new().unwrap();
    let obj = vm.create_object().unwrap();
    vm.set_property(&obj, "a", 1).unwrap();
    assert!(vm.delete_property(&obj, "a").unwrap());
    assert_eq!(vm.get_property(&obj, "a").unwrap(), Value::Undefined);
    assert!(!vm.has_property(&obj, "a").unwrap());
    // Missing keys delete cleanly.
    assert!(vm.delete_property(&obj, "never-set").unwrap());
}

#[test]
fn own_keys_order_indices_then_insertion() {
    let mut vm = VmSession::new().unwrap();
    let obj = vm.create_object().unwrap();
    vm.set_property(&obj, "b", 1).unwrap();
    vm.set_property(&obj, 10, 1).unwrap();
    vm.set_property(&obj, "a", 1).unwrap();
    vm.set_property(&obj, 2, 1).unwrap();
    assert_eq!(
        vm.own_keys(&obj).unwrap(),
        vec![
            PropertyKey::Index(2),
            PropertyKey::Index(10),
            PropertyKey::from("b"),
            PropertyKey::from("a"),
        ]
    );
}

#[test]
fn primitives_are_not_property_receivers() {
    let mut vm = VmSession::new().unwrap();
    assert!(matches!(
        vm.get_property(&Value::from(1), "x"),
        Err(VmError::InvalidOperand { found: Tag::Number, .. })
    ));
    assert!(matches!(
        vm.set_property(&Value::from("s"), "x", 1),
        Err(VmError::InvalidOperand { found: Tag::String, .. })
    ));
}
