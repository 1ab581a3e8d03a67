//! Function bridge.
//!
//! Wraps host closures as guest functions and runs calls and `new` in both
//! directions. Host closures are kept in a per-session table keyed by the
//! function's heap slot; the bridge also keeps the frame stack that bounds
//! recursion and feeds Error `stack` strings.

use std::sync::Arc;

use hashbrown::HashMap;

use crate::engine::GuestCode;
use crate::error::{HostResult, Result, VmError};
use crate::exception::ErrorKind;
use crate::object::{BoundFunction, Construct, FunctionData, FunctionKind, ObjectKind};
use crate::session::VmSession;
use crate::value::{ObjectRef, PropertyKey, Tag, Value};

/// Native built-in: `(session, this, args)`.
pub type BuiltinFn = fn(&mut VmSession, &Value, &[Value]) -> Result<Value>;

/// Boxed host closure.
pub(crate) type HostFn = Arc<dyn Fn(&mut VmSession, &Value, &[Value]) -> HostResult + Send + Sync>;

/// A guest-visible name paired with the host closure behind it.
pub(crate) struct HostBinding {
    pub name: String,
    pub callable: HostFn,
}

/// Host binding table and call frames of one session.
#[derive(Default)]
pub(crate) struct Bridge {
    bindings: HashMap<u32, HostBinding>,
    frames: Vec<Arc<str>>,
}

impl Bridge {
    /// Drop all bindings and frames, returning how many bindings there were.
    pub fn clear(&mut self) -> usize {
        let count = self.bindings.len();
        self.bindings.clear();
        self.frames.clear();
        count
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn binding_name(&self, slot: u32) -> Option<&str> {
        self.bindings.get(&slot).map(|b| b.name.as_str())
    }
}

impl VmSession {
    /// Wrap a host closure as a guest function.
    ///
    /// The closure receives the session, the guest `this` and the arguments.
    /// Returning `Err` raises a guest exception: a [`VmError::Exception`]
    /// from [`VmSession::throw`] propagates as is, any other error becomes a
    /// guest `Error` carrying its message.
    pub fn create_function<F>(&mut self, name: &str, callable: F) -> Result<Value>
    where
        F: Fn(&mut VmSession, &Value, &[Value]) -> HostResult + Send + Sync + 'static,
    {
        let data = FunctionData {
            name: Arc::from(name),
            kind: FunctionKind::Host,
            construct: Construct::Ordinary,
        };
        let slot = self.alloc_function(data, 0, true)?;
        self.bridge.bindings.insert(
            slot,
            HostBinding {
                name: name.to_string(),
                callable: Arc::new(callable),
            },
        );
        log::trace!("[sable] host function '{}' bound to #{}", name, slot);
        self.handle(slot)
    }

    /// Register engine code as a guest function.
    pub fn create_guest_function(
        &mut self,
        name: &str,
        code: Arc<dyn GuestCode>,
        constructable: bool,
    ) -> Result<Value> {
        let arity = code.arity();
        let data = FunctionData {
            name: Arc::from(name),
            kind: FunctionKind::Guest(code),
            construct: if constructable {
                Construct::Ordinary
            } else {
                Construct::Never
            },
        };
        let slot = self.alloc_function(data, arity, constructable)?;
        self.handle(slot)
    }

    /// A non-constructable built-in method.
    pub(crate) fn create_builtin(&mut self, name: &str, arity: u32, func: BuiltinFn) -> Result<u32> {
        let data = FunctionData {
            name: Arc::from(name),
            kind: FunctionKind::Builtin(func),
            construct: Construct::Never,
        };
        self.alloc_function(data, arity, false)
    }

    /// A built-in constructor linked to an existing prototype object.
    pub(crate) fn create_native_constructor(
        &mut self,
        name: &str,
        arity: u32,
        call: BuiltinFn,
        construct: BuiltinFn,
        prototype: u32,
    ) -> Result<u32> {
        let data = FunctionData {
            name: Arc::from(name),
            kind: FunctionKind::Builtin(call),
            construct: Construct::Native(construct),
        };
        let slot = self.alloc_function(data, arity, false)?;
        let ctor = self.handle(slot)?;
        let proto = self.handle(prototype)?;
        self.define_own(slot, "prototype".into(), proto, false)?;
        self.define_own(prototype, "constructor".into(), ctor, false)?;
        Ok(slot)
    }

    /// `Function.prototype.bind`.
    pub(crate) fn create_bound_function(
        &mut self,
        target: ObjectRef,
        this: Value,
        args: Vec<Value>,
    ) -> Result<Value> {
        let target_slot = self.resolve(&target)?;
        let (name, construct) = match self.cell(target_slot)?.function() {
            Some(data) => (format!("bound {}", data.name), data.construct),
            None => return Err(VmError::NotCallable { found: target.tag() }),
        };
        let target_length = match self.get_slot_property(target_slot, &PropertyKey::from("length"))? {
            Value::Number(n) => n,
            _ => 0.0,
        };
        let arity = (target_length - args.len() as f64).max(0.0) as u32;
        let data = FunctionData {
            name: Arc::from(name.as_str()),
            kind: FunctionKind::Bound(BoundFunction { target, this, args }),
            construct,
        };
        let slot = self.alloc_function(data, arity, false)?;
        self.handle(slot)
    }

    fn alloc_function(&mut self, data: FunctionData, arity: u32, with_prototype: bool) -> Result<u32> {
        let name = Value::String(data.name.to_string());
        let proto = self.intrinsics.function_prototype;
        let slot = self.alloc(ObjectKind::Function(data), Some(proto))?;
        self.define_own(slot, "length".into(), Value::Number(arity as f64), false)?;
        self.define_own(slot, "name".into(), name, false)?;
        if with_prototype {
            let object_proto = self.intrinsics.object_prototype;
            let prototype = self.alloc_value(ObjectKind::Ordinary, Some(object_proto))?;
            let ctor = self.handle(slot)?;
            let proto_slot = self.object_slot(&prototype, "link prototype")?;
            self.define_own(proto_slot, "constructor".into(), ctor, false)?;
            self.define_own(slot, "prototype".into(), prototype, false)?;
        }
        Ok(slot)
    }

    /// Invoke a function with an explicit receiver.
    ///
    /// Host closures may call back into `call` and `construct`; each frame
    /// keeps its own receiver and arguments.
    pub fn call(&mut self, func: &Value, this: &Value, args: &[Value]) -> Result<Value> {
        self.check_value(this)?;
        for arg in args {
            self.check_value(arg)?;
        }
        self.call_value(func, this, args)
    }

    /// Guest `new`: allocate from the function's `prototype`, call with it as
    /// `this`, and keep an object the function returns explicitly.
    pub fn construct(&mut self, func: &Value, args: &[Value]) -> Result<Value> {
        for arg in args {
            self.check_value(arg)?;
        }
        let slot = self.function_slot(func)?;
        self.construct_slot(slot, args)
    }

    pub(crate) fn call_value(&mut self, func: &Value, this: &Value, args: &[Value]) -> Result<Value> {
        let slot = self.function_slot(func)?;
        self.invoke(slot, this, args)
    }

    pub(crate) fn is_callable(&self, value: &Value) -> bool {
        value.tag() == Tag::Function
    }

    fn function_slot(&self, func: &Value) -> Result<u32> {
        match func {
            Value::Object(obj) if obj.tag() == Tag::Function => self.resolve(obj),
            other => {
                self.ensure_live()?;
                Err(VmError::NotCallable { found: other.tag() })
            }
        }
    }

    pub(crate) fn construct_slot(&mut self, slot: u32, args: &[Value]) -> Result<Value> {
        let Some(data) = self.cell(slot)?.function().cloned() else {
            return Err(VmError::NotCallable {
                found: self.cell(slot)?.tag(),
            });
        };
        match (data.kind, data.construct) {
            (FunctionKind::Bound(bound), _) => {
                let target = self.resolve(&bound.target)?;
                let mut all = bound.args;
                all.extend_from_slice(args);
                self.construct_slot(target, &all)
            }
            (_, Construct::Never) => {
                let message = format!("{} is not a constructor", display_name(&data.name));
                Err(self.raise(ErrorKind::TypeError, message))
            }
            (_, Construct::Native(construct)) => {
                self.enter(data.name)?;
                let result = construct(self, &Value::Undefined, args);
                self.leave();
                result
            }
            (_, Construct::Ordinary) => {
                let proto = match self.get_slot_property(slot, &PropertyKey::from("prototype"))? {
                    Value::Object(p) => self.resolve(&p)?,
                    _ => self.intrinsics.object_prototype,
                };
                let this = self.alloc_value(ObjectKind::Ordinary, Some(proto))?;
                let result = self.invoke(slot, &this, args)?;
                Ok(if result.is_object() { result } else { this })
            }
        }
    }

    fn invoke(&mut self, slot: u32, this: &Value, args: &[Value]) -> Result<Value> {
        let Some(data) = self.cell(slot)?.function().cloned() else {
            return Err(VmError::NotCallable {
                found: self.cell(slot)?.tag(),
            });
        };
        self.enter(Arc::clone(&data.name))?;
        let result = match data.kind {
            FunctionKind::Host => self.invoke_host(slot, this, args),
            FunctionKind::Builtin(func) => func(self, this, args),
            FunctionKind::Guest(code) => code.invoke(self, this, args),
            FunctionKind::Bound(bound) => match self.resolve(&bound.target) {
                Ok(target) => {
                    let mut all = bound.args;
                    all.extend_from_slice(args);
                    self.invoke(target, &bound.this, &all)
                }
                Err(err) => Err(err),
            },
        };
        self.leave();
        result
    }

    fn invoke_host(&mut self, slot: u32, this: &Value, args: &[Value]) -> Result<Value> {
        let (name, callable) = match self.bridge.bindings.get(&slot) {
            Some(binding) => (binding.name.clone(), Arc::clone(&binding.callable)),
            None => return Err(VmError::fault(format!("no host binding for function #{}", slot))),
        };
        log::trace!(
            "[sable] host call {}({} args, depth {})",
            name,
            args.len(),
            self.bridge.depth()
        );
        match callable(self, this, args) {
            Ok(value) => {
                if let Err(err) = self.check_value(&value) {
                    log::warn!("[sable] host function '{}' returned an unusable handle: {}", name, err);
                    return Err(err);
                }
                Ok(value)
            }
            Err(err) => Err(self.absorb_host_error(err)),
        }
    }

    fn enter(&mut self, name: Arc<str>) -> Result<()> {
        let depth = self.bridge.frames.len();
        if depth >= self.config().max_call_depth {
            return Err(VmError::StackOverflow { depth });
        }
        self.bridge.frames.push(name);
        Ok(())
    }

    fn leave(&mut self) {
        self.bridge.frames.pop();
    }

    /// Active frame names, innermost first.
    pub(crate) fn stack_frames(&self) -> Vec<String> {
        self.bridge
            .frames
            .iter()
            .rev()
            .map(|name| display_name(name).to_string())
            .collect()
    }
}

fn display_name(name: &str) -> &str {
    if name.is_empty() {
        "anonymous"
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_function_receives_this_and_args() {
        let mut vm = VmSession::new().unwrap();
        let f = vm
            .create_function("concat", |vm, this, args| {
                let mut out = vm.to_display_string(this)?;
                for arg in args {
                    out.push_str(&vm.to_display_string(arg)?);
                }
                Ok(Value::String(out))
            })
            .unwrap();
        let result = vm
            .call(&f, &Value::from(1), &[Value::from(1), Value::from(false)])
            .unwrap();
        assert_eq!(result, Value::from("11false"));
        assert_eq!(vm.get_property(&f, "name").unwrap(), Value::from("concat"));
    }

    #[test]
    fn call_rejects_non_functions() {
        let mut vm = VmSession::new().unwrap();
        let obj = vm.create_object().unwrap();
        assert!(matches!(
            vm.call(&obj, &Value::Undefined, &[]),
            Err(VmError::NotCallable { found: Tag::Object })
        ));
        assert!(matches!(
            vm.construct(&Value::from(3), &[]),
            Err(VmError::NotCallable { found: Tag::Number })
        ));
    }

    #[test]
    fn construct_uses_prototype_and_honours_object_returns() {
        let mut vm = VmSession::new().unwrap();
        let ctor = vm
            .create_function("Point", |vm, this, args| {
                vm.set_property(this, "x", args.first().cloned().unwrap_or_default())?;
                Ok(Value::from(7))
            })
            .unwrap();
        let proto = vm.get_property(&ctor, "prototype").unwrap();
        let point = vm.construct(&ctor, &[Value::from(3)]).unwrap();
        assert_eq!(vm.get_prototype(&point).unwrap(), proto);
        assert_eq!(vm.get_property(&point, "x").unwrap(), Value::from(3));
        assert!(vm.instance_of(&point, &ctor).unwrap());

        let replacement = vm.create_object().unwrap();
        let captured = replacement.clone();
        let factory = vm
            .create_function("Factory", move |_, _, _| Ok(captured.clone()))
            .unwrap();
        assert_eq!(vm.construct(&factory, &[]).unwrap(), replacement);
    }

    #[test]
    fn call_depth_is_bounded() {
        let mut vm = VmSession::with_config(crate::SessionConfig {
            max_call_depth: 8,
            ..Default::default()
        })
        .unwrap();
        let recurse = vm
            .create_function("recurse", |vm, this, _| {
                let global = vm.get_global()?;
                let me = vm.get_property(&global, "recurse")?;
                Ok(vm.call(&me, this, &[])?)
            })
            .unwrap();
        let global = vm.get_global().unwrap();
        vm.set_property(&global, "recurse", recurse.clone()).unwrap();
        let err = vm.call(&recurse, &Value::Undefined, &[]).unwrap_err();
        let ex = err.exception().expect("guest exception");
        assert_eq!(ex.name.as_deref(), Some("RangeError"));
        assert_eq!(vm.bridge.depth(), 0);
    }
}
