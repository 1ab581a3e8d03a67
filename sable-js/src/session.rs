//! VM sessions.
//!
//! A [`VmSession`] owns one guest heap, one global object and the bridge
//! table of host callbacks. Every other module adds operations to it; this
//! one holds the lifecycle and the liveness checks they all go through.

use std::sync::Arc;

use crate::bridge::Bridge;
use crate::builtins::{self, Intrinsics};
use crate::engine::{Bytecode, Engine};
use crate::error::{Result, VmError};
use crate::heap::Heap;
use crate::object::{ObjectCell, ObjectKind};
use crate::script::ScriptEngine;
use crate::value::{ObjectRef, SessionToken, Value};

/// Session limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Maximum nesting of guest and host calls.
    pub max_call_depth: usize,
    /// Maximum length of a prototype chain.
    pub max_prototype_depth: usize,
    /// Record a `stack` string on new Error objects.
    pub capture_stack: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            max_call_depth: 128,
            max_prototype_depth: 10_000,
            capture_stack: true,
        }
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Built-ins installed, nothing run yet.
    Created,
    /// At least one `run` is on the stack.
    Running,
    /// Between runs.
    Idle,
    /// Heap released; every handle is invalid.
    Destroyed,
}

/// A session behind the external lock multi-threaded hosts need.
pub type SharedSession = Arc<spin::Mutex<VmSession>>;

/// One guest heap and global object.
pub struct VmSession {
    token: Option<Arc<SessionToken>>,
    id: u64,
    state: SessionState,
    running: usize,
    config: SessionConfig,
    engine: Arc<dyn Engine>,
    pub(crate) heap: Heap,
    pub(crate) bridge: Bridge,
    pub(crate) intrinsics: Intrinsics,
    pub(crate) rng: u64,
}

impl VmSession {
    /// Create a session with the default configuration and engine.
    pub fn new() -> Result<Self> {
        Self::with_config(SessionConfig::default())
    }

    /// Create a session with custom limits.
    pub fn with_config(config: SessionConfig) -> Result<Self> {
        Self::with_engine(config, Arc::new(ScriptEngine::new()))
    }

    /// Create a session backed by a custom engine.
    pub fn with_engine(config: SessionConfig, engine: Arc<dyn Engine>) -> Result<Self> {
        let token = SessionToken::new();
        let id = token.id();
        let mut session = VmSession {
            token: Some(token),
            id,
            state: SessionState::Created,
            running: 0,
            config,
            engine,
            heap: Heap::new(),
            bridge: Bridge::default(),
            intrinsics: Intrinsics::default(),
            rng: seed_rng(id),
        };
        builtins::install(&mut session)?;
        log::debug!(
            "[sable] session {} created ({} engine, {} cells)",
            id,
            session.engine.name(),
            session.heap.len()
        );
        Ok(session)
    }

    /// Move the session behind a lock.
    pub fn into_shared(self) -> SharedSession {
        Arc::new(spin::Mutex::new(self))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    pub fn is_destroyed(&self) -> bool {
        self.token.is_none()
    }

    /// The global object. Stable for the session's lifetime.
    pub fn get_global(&self) -> Result<Value> {
        self.handle(self.intrinsics.global)
    }

    /// Compile source text with the session's engine.
    pub fn compile(&self, source: &str) -> Result<Bytecode> {
        self.ensure_live()?;
        log::debug!("[sable] compiling {} bytes with {}", source.len(), self.engine.name());
        self.engine.compile(source)
    }

    /// Execute bytecode against the global object.
    ///
    /// May be called any number of times, including from inside a host
    /// callback; globals persist between runs.
    pub fn run(&mut self, bytecode: &Bytecode) -> Result<Value> {
        self.ensure_live()?;
        let engine = Arc::clone(&self.engine);
        self.running += 1;
        self.state = SessionState::Running;
        log::debug!(
            "[sable] session {} run start ({} bytes, depth {})",
            self.id,
            bytecode.len(),
            self.running
        );

        let result = engine.execute(bytecode, self);

        self.running = self.running.saturating_sub(1);
        if self.token.is_none() {
            self.state = SessionState::Destroyed;
        } else if self.running == 0 {
            self.state = SessionState::Idle;
        }
        log::debug!("[sable] session {} run end (ok: {})", self.id, result.is_ok());

        match result {
            Err(err) if err.is_catchable() && err.exception().is_none() && !self.is_destroyed() => {
                Err(self.into_guest_error(err))
            }
            other => other,
        }
    }

    /// Compile and run source text.
    pub fn eval(&mut self, source: &str) -> Result<Value> {
        let bytecode = self.compile(source)?;
        self.run(&bytecode)
    }

    /// Release the heap and invalidate every handle.
    ///
    /// A second call is rejected with `UseAfterDestroy`.
    pub fn destroy(&mut self) -> Result<()> {
        let Some(token) = self.token.take() else {
            log::warn!("[sable] session {} destroyed twice", self.id);
            return Err(VmError::UseAfterDestroy);
        };
        let released = self.heap.release();
        let bindings = self.bridge.clear();
        self.state = SessionState::Destroyed;
        drop(token);
        log::debug!(
            "[sable] session {} destroyed ({} cells, {} host bindings released)",
            self.id,
            released,
            bindings
        );
        Ok(())
    }

    pub(crate) fn ensure_live(&self) -> Result<&Arc<SessionToken>> {
        self.token.as_ref().ok_or(VmError::UseAfterDestroy)
    }

    /// Slot of a handle issued by this session.
    pub(crate) fn resolve(&self, obj: &ObjectRef) -> Result<u32> {
        let token = self.ensure_live()?;
        if obj.owned_by(token) {
            Ok(obj.slot())
        } else if obj.is_alive() {
            Err(VmError::ForeignHandle)
        } else {
            Err(VmError::UseAfterDestroy)
        }
    }

    /// Reject object handles this session did not issue.
    pub(crate) fn check_value(&self, value: &Value) -> Result<()> {
        match value {
            Value::Object(obj) => self.resolve(obj).map(|_| ()),
            _ => self.ensure_live().map(|_| ()),
        }
    }

    /// Slot of an object-like value, or `InvalidOperand` for a primitive.
    pub(crate) fn object_slot(&self, value: &Value, operation: &'static str) -> Result<u32> {
        match value {
            Value::Object(obj) => self.resolve(obj),
            other => {
                self.ensure_live()?;
                Err(VmError::InvalidOperand {
                    operation,
                    found: other.tag(),
                })
            }
        }
    }

    /// Handle for a heap slot.
    pub(crate) fn handle(&self, slot: u32) -> Result<Value> {
        let token = self.ensure_live()?;
        let tag = self.heap.get(slot)?.tag();
        Ok(Value::Object(ObjectRef::new(Arc::downgrade(token), slot, tag)))
    }

    pub(crate) fn object_ref(&self, slot: u32) -> Result<ObjectRef> {
        let token = self.ensure_live()?;
        let tag = self.heap.get(slot)?.tag();
        Ok(ObjectRef::new(Arc::downgrade(token), slot, tag))
    }

    pub(crate) fn cell(&self, slot: u32) -> Result<&ObjectCell> {
        self.ensure_live()?;
        self.heap.get(slot)
    }

    pub(crate) fn cell_mut(&mut self, slot: u32) -> Result<&mut ObjectCell> {
        self.ensure_live()?;
        self.heap.get_mut(slot)
    }

    pub(crate) fn alloc(&mut self, kind: ObjectKind, prototype: Option<u32>) -> Result<u32> {
        self.ensure_live()?;
        self.heap.alloc(ObjectCell::new(kind, prototype))
    }

    pub(crate) fn alloc_value(&mut self, kind: ObjectKind, prototype: Option<u32>) -> Result<Value> {
        let slot = self.alloc(kind, prototype)?;
        self.handle(slot)
    }

    /// xorshift64* step for `Math.random`.
    pub(crate) fn next_random(&mut self) -> f64 {
        let mut x = self.rng;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.rng = x;
        let bits = x.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 11;
        bits as f64 / (1u64 << 53) as f64
    }
}

impl Drop for VmSession {
    fn drop(&mut self) {
        if self.token.is_some() {
            let released = self.heap.release();
            log::debug!("[sable] session {} dropped ({} cells released)", self.id, released);
        }
    }
}

impl std::fmt::Debug for VmSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VmSession")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("cells", &self.heap.len())
            .field("engine", &self.engine.name())
            .finish()
    }
}

fn seed_rng(id: u64) -> u64 {
    let nanos = chrono::Utc::now().timestamp_subsec_nanos() as u64;
    let seed = (nanos << 20) ^ id.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    if seed == 0 {
        0x853C_49E6_748F_EA9B
    } else {
        seed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_states() {
        let mut vm = VmSession::new().unwrap();
        assert_eq!(vm.state(), SessionState::Created);
        vm.eval("var a = 1;").unwrap();
        assert_eq!(vm.state(), SessionState::Idle);
        vm.destroy().unwrap();
        assert_eq!(vm.state(), SessionState::Destroyed);
        assert!(matches!(vm.destroy(), Err(VmError::UseAfterDestroy)));
        assert!(matches!(vm.get_global(), Err(VmError::UseAfterDestroy)));
    }

    #[test]
    fn global_is_stable() {
        let vm = VmSession::new().unwrap();
        assert_eq!(vm.get_global().unwrap(), vm.get_global().unwrap());
    }

    #[test]
    fn random_stays_in_unit_interval() {
        let mut vm = VmSession::new().unwrap();
        for _ in 0..1000 {
            let r = vm.next_random();
            assert!((0.0..1.0).contains(&r));
        }
    }
}
