//! Exception channel.
//!
//! Builds guest Error objects and moves failures across the boundary: guest
//! throws surface to the host as [`VmError::Exception`], and host errors are
//! turned into guest errors before they unwind guest frames.

use crate::error::{GuestException, HostError, Result, VmError};
use crate::object::ObjectKind;
use crate::session::VmSession;
use crate::value::{PropertyKey, Value};

/// Built-in error constructors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Error,
    TypeError,
    RangeError,
    ReferenceError,
    SyntaxError,
    EvalError,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 6] = [
        ErrorKind::Error,
        ErrorKind::TypeError,
        ErrorKind::RangeError,
        ErrorKind::ReferenceError,
        ErrorKind::SyntaxError,
        ErrorKind::EvalError,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Error => "Error",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::EvalError => "EvalError",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl VmSession {
    /// Raise `value` as a guest exception.
    ///
    /// Host callables return the result: `return Err(vm.throw(err).into())`.
    pub fn throw(&mut self, value: Value) -> VmError {
        if let Err(err) = self.check_value(&value) {
            return err;
        }
        let (name, message) = self.describe_thrown(&value);
        VmError::Exception(GuestException {
            value,
            name,
            message,
        })
    }

    /// A fresh `Error` with an own `message`.
    pub fn create_error(&mut self, message: Option<&str>) -> Result<Value> {
        self.create_error_of(ErrorKind::Error, message)
    }

    /// A fresh error of the given kind.
    pub fn create_error_of(&mut self, kind: ErrorKind, message: Option<&str>) -> Result<Value> {
        let proto = self.intrinsics.error_prototypes[kind.index()];
        let slot = self.alloc(ObjectKind::Error(kind), Some(proto))?;
        let message_value = match message {
            Some(m) => Value::String(m.to_string()),
            None => Value::Undefined,
        };
        self.define_own(slot, "message".into(), message_value, false)?;
        if self.config().capture_stack {
            let mut stack = match message {
                Some(m) if !m.is_empty() => format!("{}: {}", kind.name(), m),
                _ => kind.name().to_string(),
            };
            for frame in self.stack_frames() {
                stack.push_str("\n    at ");
                stack.push_str(&frame);
            }
            self.define_own(slot, "stack".into(), Value::String(stack), false)?;
        }
        self.handle(slot)
    }

    /// Create and throw an error of `kind`.
    pub(crate) fn raise(&mut self, kind: ErrorKind, message: impl Into<String>) -> VmError {
        let message = message.into();
        match self.create_error_of(kind, Some(&message)) {
            Ok(error) => self.throw(error),
            Err(err) => err,
        }
    }

    /// Route a host callback failure into the channel.
    pub(crate) fn absorb_host_error(&mut self, err: HostError) -> VmError {
        match err.downcast::<VmError>() {
            Ok(vm_error) => self.into_guest_error(*vm_error),
            Err(native) => {
                log::trace!("[sable] host error absorbed: {}", native);
                self.raise(ErrorKind::Error, native.to_string())
            }
        }
    }

    /// Turn an internal failure into a catchable guest error.
    ///
    /// Guest exceptions and session faults pass through unchanged.
    pub(crate) fn into_guest_error(&mut self, err: VmError) -> VmError {
        match err {
            VmError::Exception(_)
            | VmError::UseAfterDestroy
            | VmError::ForeignHandle
            | VmError::EngineFault(_) => err,
            VmError::StackOverflow { .. } => {
                self.raise(ErrorKind::RangeError, "Maximum call stack size exceeded")
            }
            VmError::Compile { message, .. } => self.raise(ErrorKind::SyntaxError, message),
            other => self.raise(ErrorKind::TypeError, other.to_string()),
        }
    }

    /// Name and message of a thrown value.
    fn describe_thrown(&mut self, value: &Value) -> (Option<String>, String) {
        if let Value::Object(obj) = value {
            if let Ok(slot) = self.resolve(obj) {
                if obj.is_error_like(self) {
                    let name = match self.get_slot_property(slot, &PropertyKey::from("name")) {
                        Ok(Value::String(s)) => s,
                        _ => "Error".to_string(),
                    };
                    let message = match self.get_slot_property(slot, &PropertyKey::from("message")) {
                        Ok(Value::Undefined) | Err(_) => String::new(),
                        Ok(Value::String(s)) => s,
                        Ok(other) => self.to_display_string(&other).unwrap_or_default(),
                    };
                    return (Some(name), message);
                }
            }
        }
        let message = self
            .to_display_string(value)
            .unwrap_or_else(|_| format!("[object {}]", value.tag()));
        (None, message)
    }
}

impl crate::value::ObjectRef {
    /// Error cells, and objects that inherit from `Error.prototype`.
    fn is_error_like(&self, vm: &VmSession) -> bool {
        if self.tag() == crate::value::Tag::Error {
            return true;
        }
        let Ok(slot) = vm.resolve(self) else {
            return false;
        };
        let base = vm.intrinsics.error_prototypes[ErrorKind::Error.index()];
        vm.chain_contains(slot, base).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct DiskFull;

    impl fmt::Display for DiskFull {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("disk full")
        }
    }

    impl std::error::Error for DiskFull {}

    #[test]
    fn errors_carry_message_and_stack() {
        let mut vm = VmSession::new().unwrap();
        let err = vm.create_error(Some("boom")).unwrap();
        assert!(err.is_error());
        assert_eq!(vm.get_property(&err, "message").unwrap(), Value::from("boom"));
        assert_eq!(vm.get_property(&err, "name").unwrap(), Value::from("Error"));
        assert_eq!(vm.get_property(&err, "stack").unwrap(), Value::from("Error: boom"));
        let bare = vm.create_error(None).unwrap();
        assert_eq!(vm.get_property(&bare, "message").unwrap(), Value::Undefined);
    }

    #[test]
    fn native_host_errors_become_guest_errors() {
        let mut vm = VmSession::new().unwrap();
        let f = vm
            .create_function("write", |_, _, _| Err(DiskFull.into()))
            .unwrap();
        let err = vm.call(&f, &Value::Undefined, &[]).unwrap_err();
        let ex = err.exception().expect("guest exception");
        assert_eq!(ex.name.as_deref(), Some("Error"));
        assert_eq!(ex.message, "disk full");
        assert!(ex.value.is_error());
    }

    #[test]
    fn thrown_values_propagate_unchanged() {
        let mut vm = VmSession::new().unwrap();
        let f = vm
            .create_function("fail", |vm, _, _| {
                let err = vm.create_error_of(ErrorKind::TypeError, Some("x"))?;
                Err(vm.throw(err).into())
            })
            .unwrap();
        let err = vm.call(&f, &Value::Undefined, &[]).unwrap_err();
        assert_eq!(err.to_string(), "Uncaught TypeError: x");

        let g = vm
            .create_function("failPlain", |vm, _, _| Err(vm.throw(Value::from(42)).into()))
            .unwrap();
        let err = vm.call(&g, &Value::Undefined, &[]).unwrap_err();
        let ex = err.exception().expect("guest exception");
        assert_eq!(ex.value, Value::from(42));
        assert_eq!(ex.name, None);
        assert_eq!(ex.message, "42");
    }

    #[test]
    fn internal_failures_in_callbacks_become_type_errors() {
        let mut vm = VmSession::new().unwrap();
        let f = vm
            .create_function("bad", |vm, _, _| {
                vm.as_number(&Value::from("nope"))?;
                Ok(Value::Undefined)
            })
            .unwrap();
        let err = vm.call(&f, &Value::Undefined, &[]).unwrap_err();
        assert_eq!(
            err.exception().and_then(|e| e.name.clone()).as_deref(),
            Some("TypeError")
        );
    }
}
