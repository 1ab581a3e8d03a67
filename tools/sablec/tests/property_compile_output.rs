//! Property 1: Compiled output runs to the same result as the source
//!
//! For generated arithmetic programs, the bytecode text written by
//! `compile_file` decodes and runs to the value the source evaluates to
//! directly, and the report's size matches the decoded blob.

use std::fs;

use proptest::prelude::*;
use sable_js::{Bytecode, Value, VmSession};
use sablec::compile::compile_file;
use sablec::error::SablecError;

fn arithmetic_program() -> impl Strategy<Value = String> {
    let operand = -1_000i32..1_000;
    let operator = prop::sample::select(vec!["+", "-", "*"]);
    (operand.clone(), prop::collection::vec((operator, operand), 0..12)).prop_map(|(first, rest)| {
        let mut source = format!("var total = {};\n", first);
        for (op, n) in rest {
            source.push_str(&format!("total = total {} ({});\n", op, n));
        }
        source.push_str("total");
        source
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn compiled_text_runs_like_source(source in arithmetic_program()) {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.js");
        let output = dir.path().join("output");
        fs::write(&input, &source).unwrap();

        let report = compile_file(&input, &output).unwrap();
        let text = fs::read_to_string(&output).unwrap();
        let bytecode = Bytecode::from_text(&text).unwrap();
        prop_assert_eq!(bytecode.len(), report.bytecode_len);

        let mut compiled = VmSession::new().unwrap();
        let mut direct = VmSession::new().unwrap();
        let expected = direct.eval(&source).unwrap();
        prop_assert_eq!(compiled.run(&bytecode).unwrap(), expected);
    }

    #[test]
    fn any_text_input_compiles_or_reports_an_error(source in "[ -~\n]{0,64}") {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.js");
        let output = dir.path().join("output");
        fs::write(&input, &source).unwrap();

        match compile_file(&input, &output) {
            Ok(_) => prop_assert!(output.is_file()),
            Err(SablecError::Vm(_)) => prop_assert!(!output.exists()),
            Err(other) => prop_assert!(false, "unexpected error {:?}", other),
        }
    }
}

#[test]
fn deeply_nested_input_is_a_compile_error() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("deep.js");
    fs::write(&input, format!("{}1{}", "(".repeat(500), ")".repeat(500))).unwrap();
    let err = compile_file(&input, &dir.path().join("output")).unwrap_err();
    assert!(matches!(err, SablecError::Vm(_)));
    let mut vm = VmSession::new().unwrap();
    assert_eq!(vm.eval("1").unwrap(), Value::from(1));
}
