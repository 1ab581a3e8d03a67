//! Property 7: Programs run through the bundled engine
//!
//! Compiled programs run against the session's global object, may be run
//! any number of times and share globals across runs. Bytecode survives its
//! base64 text form. A set of conformance snippets pins down guest
//! semantics the embedding layer depends on.

use proptest::prelude::*;
use sable_js::{Bytecode, Value, VmError, VmSession};

const FIB: &str = "function fib(n) { return n < 2 ? n : fib(n - 1) + fib(n - 2); }\nfib(20)";

fn eval(source: &str) -> Value {
    let mut vm = VmSession::new().unwrap();
    vm.eval(source).unwrap()
}

fn eval_error_name(source: &str) -> Option<String> {
    let mut vm = VmSession::new().unwrap();
    vm.eval(source).unwrap_err().exception().and_then(|ex| ex.name.clone())
}

#[test]
fn fibonacci_of_twenty() {
    assert_eq!(eval(FIB), Value::from(6765));
}

#[test]
fn runs_are_repeatable_and_share_globals() {
    let mut vm = VmSession::new().unwrap();
    let define = vm.compile("var counter = 0; function bump() { return ++counter; }").unwrap();
    let bump = vm.compile("bump()").unwrap();

    vm.run(&define).unwrap();
    assert_eq!(vm.run(&bump).unwrap(), Value::from(1));
    assert_eq!(vm.run(&bump).unwrap(), Value::from(2));

    let global = vm.get_global().unwrap();
    assert_eq!(vm.get_property(&global, "counter").unwrap(), Value::from(2));

    // Host writes are visible to the next run.
    vm.set_property(&global, "counter", 40).unwrap();
    assert_eq!(vm.run(&bump).unwrap(), Value::from(41));
}

#[test]
fn bytecode_text_round_trip_still_runs() {
    let mut vm = VmSession::new().unwrap();
    let text = vm.compile(FIB).unwrap().to_text();
    let restored = Bytecode::from_text(&format!("  {}\n", text)).unwrap();
    assert_eq!(vm.run(&restored).unwrap(), Value::from(6765));
    assert!(matches!(Bytecode::from_text("not base64!"), Err(VmError::EngineFault(_))));
}

#[test]
fn compile_errors_report_position() {
    let vm = VmSession::new().unwrap();
    match vm.compile("var a = 1;\nvar = 2;") {
        Err(VmError::Compile { line, column, .. }) => {
            assert_eq!(line, 2);
            assert_eq!(column, 5);
        }
        other => panic!("expected a compile error, got {:?}", other),
    }
}

#[test]
fn guest_functions_are_callable_from_the_host() {
    let mut vm = VmSession::new().unwrap();
    let add = vm.eval("(function add(a, b) { return a + b; })").unwrap();
    assert!(add.is_function());
    assert_eq!(vm.get_property(&add, "length").unwrap(), Value::from(2));
    assert_eq!(vm.get_property(&add, "name").unwrap(), Value::from("add"));
    let sum = vm
        .call(&add, &Value::Undefined, &[Value::from(2), Value::from(3)])
        .unwrap();
    assert_eq!(sum, Value::from(5));
}

#[test]
fn undeclared_self_assignment_throws_reference_error() {
    assert_eq!(eval_error_name("x = x"), Some("ReferenceError".into()));
}

#[test]
fn function_return_value_is_returned() {
    assert_eq!(eval("function f() { return 'value'; } f()"), Value::from("value"));
    assert_eq!(eval("function g() { } g()"), Value::Undefined);
}

#[test]
fn array_callbacks_honour_this_arg() {
    assert_eq!(
        eval(
            "var ctx = { k: 10 }, seen = 0;\n\
             [1, 2].forEach(function (v) { seen += v * this.k; }, ctx);\n\
             seen"
        ),
        Value::from(30)
    );
    assert_eq!(
        eval("[1, 2, 3].some(function (v) { return v === this.k; }, { k: 3 })"),
        Value::Boolean(true)
    );
    assert_eq!(
        eval("[1, 2, 3].every(function (v) { return v < this.k; }, { k: 3 })"),
        Value::Boolean(false)
    );
    assert_eq!(
        eval("[1, 2, 3, 4].filter(function (v) { return v > this.k; }, { k: 2 }).join()"),
        Value::from("3,4")
    );
}

#[test]
fn builtin_methods_are_not_constructors() {
    assert_eq!(
        eval_error_name("new String.prototype.charCodeAt"),
        Some("TypeError".into())
    );
}

#[test]
fn apply_on_undefined_throws_type_error() {
    assert_eq!(
        eval_error_name("Function.prototype.apply.call(undefined)"),
        Some("TypeError".into())
    );
}

#[test]
fn eval_of_non_string_returns_it() {
    assert_eq!(eval("eval(42)"), Value::from(42));
    assert_eq!(eval("var o = {}; eval(o) === o"), Value::Boolean(true));
    assert_eq!(eval("eval('1 + 2')"), Value::from(3));
}

#[test]
fn function_constructor_builds_functions() {
    assert_eq!(
        eval("Function('a,b', 'c', 'return a + b + c')(1, 2, 3)"),
        Value::from(6)
    );
}

fn is_nesting_error(result: Result<Value, VmError>) -> bool {
    matches!(
        result,
        Err(VmError::Compile { ref message, .. }) if message == "Maximum nesting depth exceeded"
    )
}

#[test]
fn deeply_nested_sources_fail_to_compile() {
    let mut vm = VmSession::new().unwrap();
    let sources = [
        format!("{}1{}", "(".repeat(200), ")".repeat(200)),
        format!("{}1{}", "[".repeat(200), "]".repeat(200)),
        format!("{}1{}", "({v:".repeat(200), "})".repeat(200)),
        format!("1{}", "+1".repeat(3000)),
        format!("true{}", " && true".repeat(3000)),
        format!("this{}", ".x".repeat(3000)),
        format!("{}1{}", "-(".repeat(200), ")".repeat(200)),
        format!("{}{}", "{".repeat(200), "}".repeat(200)),
    ];
    for source in &sources {
        assert!(is_nesting_error(vm.eval(source)), "{:.40}", source);
    }
    assert_eq!(vm.eval("6 * 7").unwrap(), Value::from(42));
}

#[test]
fn guest_eval_of_deep_source_is_catchable() {
    let source = format!(
        "try {{ eval('{}1{}'); 'no' }} catch (e) {{ e instanceof SyntaxError }}",
        "(".repeat(200),
        ")".repeat(200)
    );
    assert_eq!(eval(&source), Value::Boolean(true));
}

#[test]
fn moderately_nested_sources_run() {
    assert_eq!(eval(&format!("{}7{}", "(".repeat(25), ")".repeat(25))), Value::from(7));
    assert!(eval(&format!("{}7{}[0]", "[".repeat(20), "]".repeat(20))).is_object());
    assert_eq!(eval(&format!("0{}", "+1".repeat(50))), Value::from(50));
    assert_eq!(
        eval(&format!("var o = {{}}; o.o = o; o{}.o === o", ".o".repeat(40))),
        Value::Boolean(true)
    );
}

#[test]
fn bytecode_nested_past_the_decode_limit_is_an_engine_fault() {
    // One expression statement holding a long run of unary minus nodes.
    let mut bytes = b"SBJS\x01\x00\x01\x01".to_vec();
    for _ in 0..100_000 {
        bytes.extend_from_slice(&[6, 0]);
    }
    let mut vm = VmSession::new().unwrap();
    let err = vm.run(&Bytecode::from_bytes(bytes)).unwrap_err();
    assert!(matches!(err, VmError::EngineFault(_)), "{:?}", err);
    assert_eq!(vm.eval("1 + 1").unwrap(), Value::from(2));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn nesting_never_escapes_the_error_channel(depth in 1usize..400, kind in 0usize..4) {
        let (open, close) = [("(", ")"), ("[", "]"), ("-(", ")"), ("{v:", "}")][kind];
        let source = format!("({}0{})", open.repeat(depth), close.repeat(depth));
        let mut vm = VmSession::new().unwrap();
        match vm.eval(&source) {
            Ok(_) => {}
            Err(err) => prop_assert!(is_nesting_error(Err(err))),
        }
    }

    #[test]
    fn arithmetic_matches_host_arithmetic(a in -10_000i32..10_000, b in 1i32..1_000) {
        let mut vm = VmSession::new().unwrap();
        let source = format!("[{a} + {b}, {a} - {b}, {a} * {b}, {a} % {b}].join()", a = a, b = b);
        let expected = format!("{},{},{},{}", a + b, a - b, a * b, a % b);
        prop_assert_eq!(vm.eval(&source).unwrap(), Value::from(expected));
    }
}
