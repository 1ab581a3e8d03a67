//! Error types for the interop boundary.

use std::fmt;

use thiserror::Error;

use crate::value::{Tag, Value};

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, VmError>;

/// Error type host callables may return. Anything implementing
/// `std::error::Error` converts into it with `?`.
pub type HostError = Box<dyn std::error::Error + Send + Sync>;

/// Return type of a host callable.
pub type HostResult = std::result::Result<Value, HostError>;

/// A guest exception that escaped to the host.
#[derive(Debug, Clone)]
pub struct GuestException {
    /// The thrown value, usually an Error object.
    pub value: Value,
    /// The error `name`, when the thrown value is an Error.
    pub name: Option<String>,
    /// The error `message`, or the string form of a non-Error value.
    pub message: String,
}

impl fmt::Display for GuestException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) if self.message.is_empty() => f.write_str(name),
            Some(name) => write!(f, "{}: {}", name, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Errors produced by session operations.
#[derive(Error, Debug, Clone)]
pub enum VmError {
    /// An accessor was used on a value of the wrong tag.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: Tag, found: Tag },

    /// `call` or `construct` on a value that is not a function.
    #[error("{found} is not a function")]
    NotCallable { found: Tag },

    /// A property operation on a value that is not object-like.
    #[error("cannot {operation} on {found}")]
    InvalidOperand { operation: &'static str, found: Tag },

    /// A prototype assignment would have closed a cycle.
    #[error("cyclic __proto__ value")]
    CyclicPrototype,

    /// A guest exception propagated to the host.
    #[error("Uncaught {0}")]
    Exception(GuestException),

    /// The session, or the session that issued a handle, has been destroyed.
    #[error("session has been destroyed")]
    UseAfterDestroy,

    /// A handle issued by a different live session.
    #[error("handle belongs to a different session")]
    ForeignHandle,

    /// The call stack exceeded `SessionConfig::max_call_depth`.
    #[error("maximum call stack size exceeded ({depth} frames)")]
    StackOverflow { depth: usize },

    /// Source text rejected by the engine's compiler.
    #[error("SyntaxError: {message} ({line}:{column})")]
    Compile {
        message: String,
        line: usize,
        column: usize,
    },

    /// Opaque engine failure, e.g. malformed bytecode.
    #[error("engine fault: {0}")]
    EngineFault(String),
}

impl VmError {
    /// Whether a guest `try/catch` may intercept this error.
    ///
    /// Session faults always reach the host.
    pub fn is_catchable(&self) -> bool {
        !matches!(
            self,
            VmError::UseAfterDestroy | VmError::ForeignHandle | VmError::EngineFault(_)
        )
    }

    /// The guest exception, if this error carries one.
    pub fn exception(&self) -> Option<&GuestException> {
        match self {
            VmError::Exception(ex) => Some(ex),
            _ => None,
        }
    }

    /// Build a compile error.
    pub fn compile<S: Into<String>>(message: S, line: usize, column: usize) -> Self {
        VmError::Compile {
            message: message.into(),
            line,
            column,
        }
    }

    /// Build an engine fault.
    pub fn fault<S: Into<String>>(message: S) -> Self {
        VmError::EngineFault(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_faults_are_not_catchable() {
        assert!(!VmError::UseAfterDestroy.is_catchable());
        assert!(!VmError::ForeignHandle.is_catchable());
        assert!(!VmError::fault("bad magic").is_catchable());
        assert!(VmError::CyclicPrototype.is_catchable());
        assert!(VmError::StackOverflow { depth: 4 }.is_catchable());
    }

    #[test]
    fn exception_display_uses_name_and_message() {
        let ex = GuestException {
            value: Value::Undefined,
            name: Some("TypeError".into()),
            message: "x".into(),
        };
        assert_eq!(ex.to_string(), "TypeError: x");
        assert_eq!(VmError::Exception(ex).to_string(), "Uncaught TypeError: x");
    }
}
