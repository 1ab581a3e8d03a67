//! Property 4: Bridge calls are re-entrant
//!
//! A host function that calls back into the session with a different
//! receiver and different arguments does not disturb the receiver or the
//! arguments of the outer call. Nested calls are bounded by
//! `max_call_depth`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use proptest::prelude::*;
use sable_js::{SessionConfig, Value, VmError, VmSession};

/// Host function returning `[this.tag, ...args]` as an array.
fn echo(vm: &mut VmSession) -> Value {
    vm.create_function("echo", |vm, this, args| {
        let tag = match this {
            Value::Object(_) => vm.get_property(this, "tag")?,
            other => other.clone(),
        };
        let mut items = vec![tag];
        items.extend_from_slice(args);
        Ok(vm.create_array_from(items)?)
    })
    .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn nested_call_keeps_outer_frame(outer_args in prop::collection::vec(-1000i32..1000, 0..5),
                                     inner_args in prop::collection::vec(-1000i32..1000, 0..5)) {
        let mut vm = VmSession::new().unwrap();
        let echo = echo(&mut vm);
        let global = vm.get_global().unwrap();
        vm.set_property(&global, "echo", echo.clone()).unwrap();

        let inner: Vec<Value> = inner_args.iter().copied().map(Value::from).collect();
        let outer = vm
            .create_function("outer", move |vm, this, args| {
                let global = vm.get_global()?;
                let echo = vm.get_property(&global, "echo")?;
                let receiver = vm.create_object()?;
                vm.set_property(&receiver, "tag", "inner")?;
                let nested = vm.call(&echo, &receiver, &inner)?;
                // Outer frame after the nested call.
                let mine = vm.get_property(this, "tag")?;
                let mut items = vec![mine, nested];
                items.extend_from_slice(args);
                Ok(vm.create_array_from(items)?)
            })
            .unwrap();

        let receiver = vm.create_object().unwrap();
        vm.set_property(&receiver, "tag", "outer").unwrap();
        let args: Vec<Value> = outer_args.iter().copied().map(Value::from).collect();
        let result = vm.call(&outer, &receiver, &args).unwrap();

        prop_assert_eq!(vm.get_property(&result, 0).unwrap(), Value::from("outer"));
        let length = vm.get_property(&result, "length").unwrap();
        prop_assert_eq!(length, Value::from((outer_args.len() + 2) as u32));
        for (i, expected) in args.iter().enumerate() {
            prop_assert_eq!(&vm.get_property(&result, (i + 2) as u32).unwrap(), expected);
        }

        let nested = vm.get_property(&result, 1).unwrap();
        prop_assert_eq!(vm.get_property(&nested, 0).unwrap(), Value::from("inner"));
        for (i, expected) in inner_args.iter().enumerate() {
            prop_assert_eq!(
                vm.get_property(&nested, (i + 1) as u32).unwrap(),
                Value::from(*expected)
            );
        }
    }
}

#[test]
fn guest_code_calls_host_that_calls_guest() {
    let mut vm = VmSession::new().unwrap();
    let apply_twice = vm
        .create_function("applyTwice", |vm, _this, args| {
            let f = args.first().cloned().unwrap_or_default();
            let x = args.get(1).cloned().unwrap_or_default();
            let once = vm.call(&f, &Value::Undefined, &[x])?;
            Ok(vm.call(&f, &Value::Undefined, &[once])?)
        })
        .unwrap();
    let global = vm.get_global().unwrap();
    vm.set_property(&global, "applyTwice", apply_twice).unwrap();

    let result = vm
        .eval("applyTwice(function (n) { return applyTwice(function (m) { return m + 1; }, n) * 2; }, 1)")
        .unwrap();
    // f(n) = (n + 2) * 2, applied twice to 1.
    assert_eq!(result, Value::from(16));
}

#[test]
fn construct_uses_the_function_prototype() {
    let mut vm = VmSession::new().unwrap();
    let ctor = vm
        .create_function("Point", |vm, this, args| {
            vm.set_property(this, "x", args.first().cloned().unwrap_or_default())?;
            Ok(Value::Undefined)
        })
        .unwrap();
    let proto = vm.get_property(&ctor, "prototype").unwrap();
    vm.set_property(&proto, "kind", "point").unwrap();

    let point = vm.construct(&ctor, &[Value::from(3)]).unwrap();
    assert_eq!(vm.get_property(&point, "x").unwrap(), Value::from(3));
    assert_eq!(vm.get_property(&point, "kind").unwrap(), Value::from("point"));
    assert!(vm.instance_of(&point, &ctor).unwrap());
}

#[test]
fn non_functions_are_not_callable() {
    let mut vm = VmSession::new().unwrap();
    let obj = vm.create_object().unwrap();
    assert!(matches!(
        vm.call(&obj, &Value::Undefined, &[]),
        Err(VmError::NotCallable { .. })
    ));
    assert!(matches!(
        vm.construct(&Value::from(1), &[]),
        Err(VmError::NotCallable { .. })
    ));
}

#[test]
fn unbounded_host_recursion_hits_the_depth_limit() {
    let mut vm = VmSession::with_config(SessionConfig {
        max_call_depth: 16,
        ..Default::default()
    })
    .unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let recurse = vm
        .create_function("recurse", move |vm, this, _args| {
            counter.fetch_add(1, Ordering::SeqCst);
            let global = vm.get_global()?;
            let me = vm.get_property(&global, "recurse")?;
            Ok(vm.call(&me, this, &[])?)
        })
        .unwrap();
    let global = vm.get_global().unwrap();
    vm.set_property(&global, "recurse", recurse.clone()).unwrap();

    let err = vm.call(&recurse, &Value::Undefined, &[]).unwrap_err();
    let name = err.exception().and_then(|ex| ex.name.clone());
    assert_eq!(name.as_deref(), Some("RangeError"));
    assert_eq!(calls.load(Ordering::SeqCst), 16);

    // The session is still usable afterwards.
    assert_eq!(vm.eval("1 + 1").unwrap(), Value::from(2));
}
