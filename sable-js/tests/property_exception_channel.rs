//! Property 5: One exception channel in both directions
//!
//! A native error returned by a host callback becomes a guest `Error` whose
//! `message` is the native error's display text, so guest `try/catch` sees
//! it like any other throw. An uncaught guest exception reaches the host as
//! `VmError::Exception` carrying the thrown error's name and message.

use std::fmt;

use proptest::prelude::*;
use sable_js::{ErrorKind, Value, VmError, VmSession};

#[derive(Debug)]
struct DiskFull;

impl fmt::Display for DiskFull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("disk full")
    }
}

impl std::error::Error for DiskFull {}

fn session_with_failing_host() -> VmSession {
    let mut vm = VmSession::new().unwrap();
    let failing = vm
        .create_function("failing", |_vm, _this, _args| Err(DiskFull.into()))
        .unwrap();
    let global = vm.get_global().unwrap();
    vm.set_property(&global, "failing", failing).unwrap();
    vm
}

#[test]
fn native_host_errors_are_caught_as_guest_errors() {
    let mut vm = session_with_failing_host();
    let result = vm
        .eval("try { failing(); 'unreachable' } catch (e) { (e instanceof Error) + ':' + e.message }")
        .unwrap();
    assert_eq!(result, Value::from("true:disk full"));
}

#[test]
fn uncaught_host_errors_reach_the_host_as_exceptions() {
    let mut vm = session_with_failing_host();
    let err = vm.eval("failing()").unwrap_err();
    let ex = err.exception().expect("guest exception");
    assert_eq!(ex.name.as_deref(), Some("Error"));
    assert_eq!(ex.message, "disk full");
    assert!(ex.value.is_error());
}

#[test]
fn uncaught_type_error_keeps_its_name() {
    let mut vm = VmSession::new().unwrap();
    let err = vm.eval("throw new TypeError('x')").unwrap_err();
    match &err {
        VmError::Exception(ex) => {
            assert_eq!(ex.name.as_deref(), Some("TypeError"));
            assert_eq!(ex.message, "x");
        }
        other => panic!("expected a guest exception, got {:?}", other),
    }
    assert_eq!(err.to_string(), "Uncaught TypeError: x");
}

#[test]
fn host_throw_propagates_the_exact_value() {
    let mut vm = VmSession::new().unwrap();
    let thrower = vm
        .create_function("thrower", |vm, _this, args| {
            let value = args.first().cloned().unwrap_or_default();
            Err(vm.throw(value).into())
        })
        .unwrap();
    let global = vm.get_global().unwrap();
    vm.set_property(&global, "thrower", thrower).unwrap();

    let caught = vm
        .eval("var o = { id: 7 }; try { thrower(o) } catch (e) { e === o }")
        .unwrap();
    assert_eq!(caught, Value::Boolean(true));

    let err = vm.eval("thrower('plain')").unwrap_err();
    let ex = err.exception().expect("guest exception");
    assert_eq!(ex.value, Value::from("plain"));
    assert_eq!(ex.name, None);
    assert_eq!(ex.message, "plain");
}

#[test]
fn host_created_errors_have_guest_prototypes() {
    let mut vm = VmSession::new().unwrap();
    let global = vm.get_global().unwrap();
    let range_error = vm.get_property(&global, "RangeError").unwrap();
    let error_ctor = vm.get_property(&global, "Error").unwrap();

    let err = vm.create_error_of(ErrorKind::RangeError, Some("too far")).unwrap();
    assert!(err.is_error());
    assert!(vm.instance_of(&err, &range_error).unwrap());
    assert!(vm.instance_of(&err, &error_ctor).unwrap());
    assert_eq!(vm.get_property(&err, "name").unwrap(), Value::from("RangeError"));
    assert_eq!(vm.get_property(&err, "message").unwrap(), Value::from("too far"));
}

#[test]
fn errors_from_accessor_misuse_inside_guest_are_type_errors() {
    let mut vm = VmSession::new().unwrap();
    let strict = vm
        .create_function("strictNumber", |vm, _this, args| {
            let n = vm.as_number(&args.first().cloned().unwrap_or_default())?;
            Ok(Value::from(n * 2.0))
        })
        .unwrap();
    let global = vm.get_global().unwrap();
    vm.set_property(&global, "strictNumber", strict).unwrap();

    assert_eq!(vm.eval("strictNumber(21)").unwrap(), Value::from(42));
    assert_eq!(
        vm.eval("try { strictNumber('21') } catch (e) { e.name }").unwrap(),
        Value::from("TypeError")
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn thrown_messages_survive_the_boundary(message in "[a-zA-Z0-9 ]{0,24}") {
        let mut vm = VmSession::new().unwrap();
        let global = vm.get_global().unwrap();
        vm.set_property(&global, "msg", message.as_str()).unwrap();
        let err = vm.eval("throw new Error(msg)").unwrap_err();
        let ex = err.exception().expect("guest exception");
        prop_assert_eq!(ex.name.as_deref(), Some("Error"));
        prop_assert_eq!(&ex.message, &message);
    }
}
