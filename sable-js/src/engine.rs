//! Engine seam.
//!
//! The session never looks inside compiled code. An [`Engine`] turns source
//! text into an opaque [`Bytecode`] blob and later executes it against a
//! session; guest functions it creates are registered through
//! [`GuestCode`].

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::error::{Result, VmError};
use crate::session::VmSession;
use crate::value::Value;

/// A compiler/interpreter pair a session can run code with.
pub trait Engine: Send + Sync {
    /// Short engine name for logs.
    fn name(&self) -> &str;

    /// Compile source text. Syntax errors are [`VmError::Compile`].
    fn compile(&self, source: &str) -> Result<Bytecode>;

    /// Run compiled code against the session's global object.
    fn execute(&self, bytecode: &Bytecode, session: &mut VmSession) -> Result<Value>;
}

/// Engine-defined body of a guest function.
pub trait GuestCode: Send + Sync + fmt::Debug {
    /// Run the body with the given receiver and arguments.
    fn invoke(&self, session: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value>;

    /// Declared parameter count, reported as the function's `length`.
    fn arity(&self) -> u32 {
        0
    }
}

/// Opaque compiled program.
#[derive(Clone, PartialEq, Eq)]
pub struct Bytecode {
    bytes: Vec<u8>,
}

impl Bytecode {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Bytecode { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Base64 text form, as written by `sablec`.
    pub fn to_text(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// Parse the base64 text form. Surrounding whitespace is ignored.
    pub fn from_text(text: &str) -> Result<Self> {
        STANDARD
            .decode(text.trim())
            .map(Bytecode::from_bytes)
            .map_err(|e| VmError::fault(format!("bytecode text is not valid base64: {}", e)))
    }
}

impl fmt::Debug for Bytecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bytecode({} bytes)", self.bytes.len())
    }
}
