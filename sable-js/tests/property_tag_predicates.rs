//! Property 1: Tag predicates and primitive round-trips
//!
//! For every factory, the predicate for the created tag holds and every
//! other tag predicate is false. `is_object` is the category predicate for
//! heap values, so it also holds for arrays, functions, errors, regexps and
//! dates. Primitive accessors return exactly what the factory was given.

use proptest::prelude::*;
use sable_js::{Tag, Value, VmError, VmSession};

/// Every tag predicate, in `Tag` declaration order.
fn predicates(value: &Value) -> [(Tag, bool); 11] {
    [
        (Tag::Undefined, value.is_undefined()),
        (Tag::Null, value.is_null()),
        (Tag::Boolean, value.is_boolean()),
        (Tag::Number, value.is_number()),
        (Tag::String, value.is_string()),
        (Tag::Object, value.is_object()),
        (Tag::Array, value.is_array()),
        (Tag::Function, value.is_function()),
        (Tag::Error, value.is_error()),
        (Tag::RegExp, value.is_regexp()),
        (Tag::Date, value.is_date()),
    ]
}

fn assert_only(value: &Value, expected: Tag) {
    for (tag, holds) in predicates(value) {
        let should_hold = tag == expected || (tag == Tag::Object && expected.is_object_like());
        assert_eq!(holds, should_hold, "predicate for {} on a {} value", tag, expected);
    }
    assert_eq!(value.tag(), expected);
}

#[test]
fn every_factory_sets_exactly_its_tag() {
    let mut vm = VmSession::new().unwrap();

    let cases = vec![
        (vm.create_undefined().unwrap(), Tag::Undefined),
        (vm.create_null().unwrap(), Tag::Null),
        (vm.create_boolean(true).unwrap(), Tag::Boolean),
        (vm.create_number(1.5).unwrap(), Tag::Number),
        (vm.create_string("s").unwrap(), Tag::String),
        (vm.create_object().unwrap(), Tag::Object),
        (vm.create_array(3).unwrap(), Tag::Array),
        (
            vm.create_function("f", |_, _, _| Ok(Value::Undefined)).unwrap(),
            Tag::Function,
        ),
        (vm.create_error(Some("boom")).unwrap(), Tag::Error),
        (vm.create_regexp("a+b", "g").unwrap(), Tag::RegExp),
        (vm.create_date(Some(0.0)).unwrap(), Tag::Date),
    ];
    for (value, tag) in &cases {
        assert_only(value, *tag);
    }
}

#[test]
fn typeof_matches_guest_rules() {
    let mut vm = VmSession::new().unwrap();
    let f = vm.create_function("f", |_, _, _| Ok(Value::Undefined)).unwrap();
    let array = vm.create_array(0).unwrap();

    assert_eq!(vm.type_of(&Value::Null).unwrap(), "object");
    assert_eq!(vm.type_of(&Value::Undefined).unwrap(), "undefined");
    assert_eq!(vm.type_of(&f).unwrap(), "function");
    assert_eq!(vm.type_of(&array).unwrap(), "object");
    assert_eq!(vm.type_of(&Value::from("x")).unwrap(), "string");
}

#[test]
fn accessors_reject_other_tags() {
    let vm = VmSession::new().unwrap();
    let err = vm.as_number(&Value::from("12")).unwrap_err();
    assert!(matches!(
        err,
        VmError::TypeMismatch {
            expected: Tag::Number,
            found: Tag::String
        }
    ));
    assert!(matches!(
        vm.as_string(&Value::Null),
        Err(VmError::TypeMismatch { .. })
    ));
    assert!(matches!(
        vm.as_object(&Value::from(1)),
        Err(VmError::TypeMismatch { .. })
    ));
}

proptest! {
    #[test]
    fn numbers_round_trip(n in any::<f64>().prop_filter("finite", |n| n.is_finite())) {
        let vm = VmSession::new().unwrap();
        let value = vm.create_number(n).unwrap();
        prop_assert!(value.is_number());
        prop_assert_eq!(vm.as_number(&value).unwrap().to_bits(), n.to_bits());
    }

    #[test]
    fn strings_round_trip(s in ".*") {
        let vm = VmSession::new().unwrap();
        let value = vm.create_string(s.clone()).unwrap();
        prop_assert!(value.is_string());
        prop_assert_eq!(vm.as_string(&value).unwrap(), s.as_str());
    }

    #[test]
    fn booleans_round_trip(b in any::<bool>()) {
        let vm = VmSession::new().unwrap();
        let value = vm.create_boolean(b).unwrap();
        prop_assert_eq!(vm.as_boolean(&value).unwrap(), b);
        prop_assert!(!value.is_number() && !value.is_string() && !value.is_object());
    }
}
