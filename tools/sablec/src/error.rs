use std::path::PathBuf;
use std::process::ExitCode;

use sable_js::VmError;

/// All errors produced by sablec.
#[derive(thiserror::Error, Debug)]
pub enum SablecError {
    #[error("input filepath missing: sablec <input filepath> [-o <output filepath>]")]
    InputMissing,

    #[error("input file not exists: {}", .path.display())]
    InputNotFound { path: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{}", describe_vm_error(.0))]
    Vm(#[from] VmError),
}

fn describe_vm_error(err: &VmError) -> String {
    match err {
        VmError::Compile {
            message,
            line,
            column,
        } => format!("SyntaxError: {} at {}:{}", message, line, column),
        other => other.to_string(),
    }
}

impl SablecError {
    /// Every failure exits with 1.
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_errors_show_position() {
        let err = SablecError::from(VmError::compile("Unexpected token ';'", 3, 9));
        assert_eq!(err.to_string(), "SyntaxError: Unexpected token ';' at 3:9");
    }

    #[test]
    fn missing_input_names_the_path() {
        let err = SablecError::InputNotFound {
            path: PathBuf::from("nope.js"),
        };
        assert_eq!(err.to_string(), "input file not exists: nope.js");
    }
}
