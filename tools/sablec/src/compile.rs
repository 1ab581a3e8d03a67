use std::fs;
use std::path::{Path, PathBuf};

use sable_js::{Engine, ScriptEngine};

use crate::error::SablecError;

/// Result of one compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileReport {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Size of the bytecode blob before base64.
    pub bytecode_len: usize,
}

/// Compile `input` and write its bytecode text to `output`.
pub fn compile_file(input: &Path, output: &Path) -> Result<CompileReport, SablecError> {
    if !input.is_file() {
        return Err(SablecError::InputNotFound {
            path: input.to_path_buf(),
        });
    }
    let source = fs::read_to_string(input)?;
    log::debug!("[sablec] read {} bytes from {}", source.len(), input.display());

    let bytecode = ScriptEngine::new().compile(&source)?;
    fs::write(output, bytecode.to_text())?;
    log::debug!("[sablec] wrote {}", output.display());

    Ok(CompileReport {
        input: input.to_path_buf(),
        output: output.to_path_buf(),
        bytecode_len: bytecode.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_js::{Bytecode, Value, VmSession};

    #[test]
    fn output_runs_in_a_session() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("fib.js");
        let output = dir.path().join("output");
        fs::write(
            &input,
            "function fib(n) { return n < 2 ? n : fib(n - 1) + fib(n - 2); }\nfib(10)",
        )
        .unwrap();

        let report = compile_file(&input, &output).unwrap();
        assert!(report.bytecode_len > 0);

        let text = fs::read_to_string(&output).unwrap();
        let bytecode = Bytecode::from_text(&text).unwrap();
        let mut vm = VmSession::new().unwrap();
        assert_eq!(vm.run(&bytecode).unwrap(), Value::from(55));
    }

    #[test]
    fn missing_input_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = compile_file(&dir.path().join("absent.js"), &dir.path().join("out")).unwrap_err();
        assert!(matches!(err, SablecError::InputNotFound { .. }));
    }

    #[test]
    fn syntax_errors_leave_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("bad.js");
        let output = dir.path().join("out");
        fs::write(&input, "var = ;").unwrap();
        let err = compile_file(&input, &output).unwrap_err();
        assert!(matches!(err, SablecError::Vm(_)));
        assert!(!output.exists());
    }
}
