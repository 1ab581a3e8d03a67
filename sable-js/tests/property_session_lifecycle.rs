//! Property 6: Session isolation and destruction
//!
//! Destroying a session makes every later operation on it or its handles
//! fail with `UseAfterDestroy`, never crash. Handles from another live
//! session are rejected with `ForeignHandle`. Sessions on different threads
//! run independently.

use std::thread;

use sable_js::{SessionState, Value, VmError, VmSession};

#[test]
fn destroyed_handles_fail_cleanly() {
    let mut vm = VmSession::new().unwrap();
    let obj = vm.create_object().unwrap();
    let f = vm.create_function("f", |_, _, _| Ok(Value::Undefined)).unwrap();
    let code = vm.compile("1").unwrap();
    vm.set_property(&obj, "x", 1).unwrap();
    vm.destroy().unwrap();

    assert!(matches!(vm.get_property(&obj, "x"), Err(VmError::UseAfterDestroy)));
    assert!(matches!(vm.set_property(&obj, "x", 2), Err(VmError::UseAfterDestroy)));
    assert!(matches!(vm.call(&f, &Value::Undefined, &[]), Err(VmError::UseAfterDestroy)));
    assert!(matches!(vm.create_object(), Err(VmError::UseAfterDestroy)));
    assert!(matches!(vm.create_number(1.0), Err(VmError::UseAfterDestroy)));
    assert!(matches!(vm.run(&code), Err(VmError::UseAfterDestroy)));
    assert!(matches!(vm.type_of(&obj), Err(VmError::UseAfterDestroy)));
    assert!(matches!(vm.destroy(), Err(VmError::UseAfterDestroy)));
    assert_eq!(vm.state(), SessionState::Destroyed);
    assert!(!obj.as_object_ref().unwrap().is_alive());
}

#[test]
fn handles_do_not_cross_sessions() {
    let mut a = VmSession::new().unwrap();
    let mut b = VmSession::new().unwrap();
    assert_ne!(a.id(), b.id());

    let from_a = a.create_object().unwrap();
    let in_b = b.create_object().unwrap();
    assert!(matches!(b.get_property(&from_a, "x"), Err(VmError::ForeignHandle)));
    assert!(matches!(b.set_property(&in_b, "x", from_a.clone()), Err(VmError::ForeignHandle)));

    a.destroy().unwrap();
    assert!(matches!(b.get_property(&from_a, "x"), Err(VmError::UseAfterDestroy)));
    // b is unaffected.
    b.set_property(&in_b, "x", 1).unwrap();
    assert_eq!(b.get_property(&in_b, "x").unwrap(), Value::from(1));
}

#[test]
fn globals_are_per_session() {
    let mut a = VmSession::new().unwrap();
    let mut b = VmSession::new().unwrap();
    a.eval("var shared = 'a';").unwrap();
    assert_eq!(b.eval("typeof shared").unwrap(), Value::from("undefined"));
}

#[test]
fn sessions_on_two_threads_run_independently() {
    let workers: Vec<_> = (0..2)
        .map(|seed| {
            thread::spawn(move || {
                let mut vm = VmSession::new().unwrap();
                let script = format!(
                    "var total = 0; for (var i = 0; i < 500; i++) {{ total += i * {}; }} total",
                    seed + 1
                );
                let result = vm.eval(&script).unwrap();
                vm.destroy().unwrap();
                result
            })
        })
        .collect();

    let results: Vec<Value> = workers.into_iter().map(|w| w.join().unwrap()).collect();
    assert_eq!(results, vec![Value::from(124_750), Value::from(249_500)]);
}

#[test]
fn shared_session_serializes_access() {
    let shared = VmSession::new().unwrap().into_shared();
    shared.lock().eval("var hits = 0;").unwrap();

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let shared = shared.clone();
            thread::spawn(move || {
                for _ in 0..25 {
                    shared.lock().eval("hits++").unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(shared.lock().eval("hits").unwrap(), Value::from(100));
}
