//! Bundled script engine.
//!
//! Parses guest source into an AST and runs it with a tree-walking
//! interpreter. Compiled bytecode is the AST serialized with postcard
//! behind a four byte magic and a format version:
//!
//! ```text
//! "SBJS" | version: u16 LE | postcard(Program)
//! ```
//!
//! Decoding rejects trees nested deeper than [`ast::MAX_DECODE_DEPTH`], so
//! a hand-built blob cannot run the decoder or the interpreter out of stack.

pub mod ast;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod scope;
pub mod token;

use crate::engine::{Bytecode, Engine};
use crate::error::{Result, VmError};
use crate::session::VmSession;
use crate::value::Value;

use ast::Program;

const MAGIC: &[u8; 4] = b"SBJS";
const FORMAT_VERSION: u16 = 1;
const HEADER_LEN: usize = MAGIC.len() + 2;

/// The default [`Engine`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptEngine;

impl ScriptEngine {
    pub fn new() -> Self {
        ScriptEngine
    }

    /// Parse source text without encoding it.
    pub fn parse(&self, source: &str) -> Result<Program> {
        parser::parse(source)
    }

    fn decode(&self, bytecode: &Bytecode) -> Result<Program> {
        let bytes = bytecode.as_bytes();
        if bytes.len() < HEADER_LEN || &bytes[..MAGIC.len()] != MAGIC {
            return Err(VmError::fault("bytecode has no SBJS header"));
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != FORMAT_VERSION {
            return Err(VmError::fault(format!(
                "unsupported bytecode version {} (expected {})",
                version, FORMAT_VERSION
            )));
        }
        postcard::from_bytes(&bytes[HEADER_LEN..])
            .map_err(|e| VmError::fault(format!("corrupt bytecode: {}", e)))
    }
}

impl Engine for ScriptEngine {
    fn name(&self) -> &str {
        "sable-script"
    }

    fn compile(&self, source: &str) -> Result<Bytecode> {
        let program = self.parse(source)?;
        let body = postcard::to_allocvec(&program)
            .map_err(|e| VmError::fault(format!("failed to encode program: {}", e)))?;

        let mut bytes = Vec::with_capacity(HEADER_LEN + body.len());
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&body);
        log::trace!(
            "[sable] compiled {} statements into {} bytes",
            program.body.len(),
            bytes.len()
        );
        Ok(Bytecode::from_bytes(bytes))
    }

    fn execute(&self, bytecode: &Bytecode, session: &mut VmSession) -> Result<Value> {
        let program = self.decode(bytecode)?;
        interpreter::run_program(session, &program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytecode_carries_header() {
        let bytecode = ScriptEngine::new().compile("1 + 1").unwrap();
        assert_eq!(&bytecode.as_bytes()[..4], b"SBJS");
        assert_eq!(&bytecode.as_bytes()[4..6], &1u16.to_le_bytes());
    }

    #[test]
    fn foreign_blobs_are_engine_faults() {
        let mut vm = VmSession::new().unwrap();
        for bytes in [b"nope".to_vec(), b"SBJS\x09\x00".to_vec(), b"SBJS\x01\x00\xff\xff\xff".to_vec()] {
            let err = vm.run(&Bytecode::from_bytes(bytes)).unwrap_err();
            assert!(matches!(err, VmError::EngineFault(_)), "{:?}", err);
        }
    }

    #[test]
    fn compiled_program_runs_repeatedly() {
        let mut vm = VmSession::new().unwrap();
        let bytecode = vm
            .compile("var calls = (typeof calls == 'number' ? calls : 0) + 1; calls")
            .unwrap();
        assert_eq!(vm.run(&bytecode).unwrap(), Value::from(1));
        assert_eq!(vm.run(&bytecode).unwrap(), Value::from(2));
    }

    #[test]
    fn syntax_errors_surface_at_compile_time() {
        let err = ScriptEngine::new().compile("var = 1").unwrap_err();
        assert!(matches!(err, VmError::Compile { line: 1, .. }));
    }
}
