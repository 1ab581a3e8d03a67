//! Built-in objects.
//!
//! Installed into every session at creation: the global object, `Object`,
//! `Function`, `Array`, `String`, `Number`, `Boolean`, the Error family,
//! `RegExp`, `Date`, `Math` and the global functions.

use std::sync::Arc;

use crate::bridge::BuiltinFn;
use crate::error::{Result, VmError};
use crate::exception::ErrorKind;
use crate::object::{ArrayStorage, Construct, FunctionData, FunctionKind, ObjectKind};
use crate::session::VmSession;
use crate::value::{PropertyKey, Value};

pub(crate) mod array;
pub(crate) mod date;
pub(crate) mod error;
pub(crate) mod function;
pub(crate) mod global;
pub(crate) mod math;
pub(crate) mod number;
pub(crate) mod object;
pub(crate) mod regexp;
pub(crate) mod string;

/// Heap slots of the objects the runtime needs to find without a lookup.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Intrinsics {
    pub global: u32,
    pub object_prototype: u32,
    pub function_prototype: u32,
    pub array_prototype: u32,
    pub string_prototype: u32,
    pub number_prototype: u32,
    pub boolean_prototype: u32,
    pub regexp_prototype: u32,
    pub date_prototype: u32,
    pub error_prototypes: [u32; 6],
}

/// Build the global object and every built-in.
pub(crate) fn install(vm: &mut VmSession) -> Result<()> {
    let object_prototype = vm.alloc(ObjectKind::Ordinary, None)?;
    vm.intrinsics.object_prototype = object_prototype;

    let function_prototype = vm.alloc(
        ObjectKind::Function(FunctionData {
            name: Arc::from(""),
            kind: FunctionKind::Builtin(function::empty),
            construct: Construct::Never,
        }),
        Some(object_prototype),
    )?;
    vm.intrinsics.function_prototype = function_prototype;

    vm.intrinsics.global = vm.alloc(ObjectKind::Ordinary, Some(object_prototype))?;
    vm.intrinsics.array_prototype = vm.alloc(
        ObjectKind::Array(ArrayStorage::default()),
        Some(object_prototype),
    )?;
    vm.intrinsics.string_prototype = vm.alloc(
        ObjectKind::Boxed(Value::String(String::new())),
        Some(object_prototype),
    )?;
    vm.intrinsics.number_prototype =
        vm.alloc(ObjectKind::Boxed(Value::Number(0.0)), Some(object_prototype))?;
    vm.intrinsics.boolean_prototype =
        vm.alloc(ObjectKind::Boxed(Value::Boolean(false)), Some(object_prototype))?;
    vm.intrinsics.regexp_prototype = vm.alloc(ObjectKind::Ordinary, Some(object_prototype))?;
    vm.intrinsics.date_prototype = vm.alloc(ObjectKind::Ordinary, Some(object_prototype))?;

    let base_error = vm.alloc(ObjectKind::Ordinary, Some(object_prototype))?;
    for kind in ErrorKind::ALL {
        vm.intrinsics.error_prototypes[kind.index()] = if kind == ErrorKind::Error {
            base_error
        } else {
            vm.alloc(ObjectKind::Ordinary, Some(base_error))?
        };
    }

    object::install(vm)?;
    function::install(vm)?;
    array::install(vm)?;
    string::install(vm)?;
    number::install(vm)?;
    error::install(vm)?;
    regexp::install(vm)?;
    date::install(vm)?;
    math::install(vm)?;
    global::install(vm)?;
    Ok(())
}

/// Argument `index`, or `undefined`.
pub(crate) fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

/// Define a non-enumerable built-in method on `target`.
pub(crate) fn method(
    vm: &mut VmSession,
    target: u32,
    name: &str,
    arity: u32,
    func: BuiltinFn,
) -> Result<()> {
    let slot = vm.create_builtin(name, arity, func)?;
    let value = vm.handle(slot)?;
    vm.define_own(target, PropertyKey::from(name), value, false)
}

/// Define a non-enumerable data property on `target`.
pub(crate) fn constant(vm: &mut VmSession, target: u32, name: &str, value: Value) -> Result<()> {
    vm.define_own(target, PropertyKey::from(name), value, false)
}

/// Create a constructor over `prototype` and publish it on the global object.
pub(crate) fn constructor(
    vm: &mut VmSession,
    name: &str,
    arity: u32,
    call: BuiltinFn,
    construct: BuiltinFn,
    prototype: u32,
) -> Result<u32> {
    let slot = vm.create_native_constructor(name, arity, call, construct, prototype)?;
    let value = vm.handle(slot)?;
    let global = vm.intrinsics.global;
    constant(vm, global, name, value)?;
    Ok(slot)
}

/// Slot of an object-like value, or a guest `TypeError` naming `what`.
pub(crate) fn require_object(vm: &mut VmSession, value: &Value, what: &str) -> Result<u32> {
    match value {
        Value::Object(obj) => vm.resolve(obj),
        _ => Err(vm.raise(ErrorKind::TypeError, format!("{} called on non-object", what))),
    }
}

/// The function in `value`, or a guest `TypeError`.
pub(crate) fn require_callable(vm: &mut VmSession, value: &Value) -> Result<()> {
    if vm.is_callable(value) {
        return Ok(());
    }
    let shown = match value {
        Value::String(s) => format!("\"{}\"", s),
        Value::Object(_) => "object".to_string(),
        other => vm.to_display_string(other)?,
    };
    Err(vm.raise(ErrorKind::TypeError, format!("{} is not a function", shown)))
}

/// Guest `ToObject`: primitives are boxed, `undefined` and `null` throw.
pub(crate) fn to_object(vm: &mut VmSession, value: &Value, what: &str) -> Result<Value> {
    match value {
        Value::Object(_) => Ok(value.clone()),
        Value::Undefined | Value::Null => Err(vm.raise(
            ErrorKind::TypeError,
            format!("{} called on null or undefined", what),
        )),
        primitive => object::box_primitive(vm, primitive.clone()),
    }
}

/// Resolve a relative index argument against `len`, clamping to `0..=len`.
pub(crate) fn relative_index(vm: &mut VmSession, value: &Value, len: f64, default: f64) -> Result<f64> {
    if value.is_undefined() {
        return Ok(default);
    }
    let n = vm.to_integer(value)?;
    Ok(if n < 0.0 { (len + n).max(0.0) } else { n.min(len) })
}

pub(crate) fn type_error(vm: &mut VmSession, message: impl Into<String>) -> VmError {
    vm.raise(ErrorKind::TypeError, message)
}
