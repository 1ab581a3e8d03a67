//! Property 3: Prototype fallthrough and cycle rejection
//!
//! A key missing on a child is read from its prototype chain. Linking a
//! prototype that would close a cycle fails with `CyclicPrototype` and keeps
//! the old link. `instanceof` follows the same chain.

use proptest::prelude::*;
use sable_js::{Value, VmError, VmSession};

proptest! {
    #[test]
    fn reads_fall_through_any_chain_depth(depth in 1usize..32, value in -1.0e6f64..1.0e6) {
        let mut vm = VmSession::new().unwrap();
        let root = vm.create_object().unwrap();
        vm.set_property(&root, "x", value).unwrap();

        let mut leaf = root.clone();
        for _ in 0..depth {
            let child = vm.create_object().unwrap();
            vm.set_prototype(&child, &leaf).unwrap();
            leaf = child;
        }
        prop_assert_eq!(vm.get_property(&leaf, "x").unwrap(), Value::Number(value));
        prop_assert!(vm.has_property(&leaf, "x").unwrap());
        prop_assert!(vm.own_keys(&leaf).unwrap().is_empty());
    }
}

#[test]
fn own_keys_shadow_the_prototype() {
    let mut vm = VmSession::new().unwrap();
    let parent = vm.create_object().unwrap();
    let child = vm.create_object().unwrap();
    vm.set_property(&parent, "x", "parent").unwrap();
    vm.set_prototype(&child, &parent).unwrap();
    assert_eq!(vm.get_prototype(&child).unwrap(), parent);
    assert_eq!(vm.get_property(&child, "x").unwrap(), Value::from("parent"));

    vm.set_property(&child, "x", "child").unwrap();
    assert_eq!(vm.get_property(&child, "x").unwrap(), Value::from("child"));
    assert_eq!(vm.get_property(&parent, "x").unwrap(), Value::from("parent"));
}

#[test]
fn cycles_are_rejected_and_links_survive() {
    let mut vm = VmSession::new().unwrap();
    let a = vm.create_object().unwrap();
    let b = vm.create_object().unwrap();
    let c = vm.create_object().unwrap();
    vm.set_prototype(&b, &a).unwrap();
    vm.set_prototype(&c, &b).unwrap();

    assert!(matches!(vm.set_prototype(&a, &c), Err(VmError::CyclicPrototype)));
    assert!(matches!(vm.set_prototype(&a, &a), Err(VmError::CyclicPrototype)));
    assert_ne!(vm.get_prototype(&a).unwrap(), c);
    assert_eq!(vm.get_prototype(&c).unwrap(), b);
}

#[test]
fn null_prototype_ends_the_chain() {
    let mut vm = VmSession::new().unwrap();
    let bare = vm.create_object().unwrap();
    vm.set_prototype(&bare, &Value::Null).unwrap();
    assert_eq!(vm.get_prototype(&bare).unwrap(), Value::Null);
    assert_eq!(vm.get_property(&bare, "toString").unwrap(), Value::Undefined);
}

#[test]
fn dates_are_instances_of_the_global_date() {
    let mut vm = VmSession::new().unwrap();
    let global = vm.get_global().unwrap();
    let date_ctor = vm.get_property(&global, "Date").unwrap();
    let object_ctor = vm.get_property(&global, "Object").unwrap();
    let array_ctor = vm.get_property(&global, "Array").unwrap();

    let date = vm.create_date(None).unwrap();
    assert!(vm.instance_of(&date, &date_ctor).unwrap());
    assert!(vm.instance_of(&date, &object_ctor).unwrap());
    assert!(!vm.instance_of(&date, &array_ctor).unwrap());
    assert!(!vm.instance_of(&Value::from(1), &date_ctor).unwrap());
}
