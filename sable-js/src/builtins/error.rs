//! `Error` and its subtypes.

use super::{arg, constant, constructor, method, type_error};
use crate::bridge::BuiltinFn;
use crate::error::Result;
use crate::exception::ErrorKind;
use crate::session::VmSession;
use crate::value::{PropertyKey, Value};

pub(super) fn install(vm: &mut VmSession) -> Result<()> {
    let constructors: [BuiltinFn; 6] = [
        construct_error::<0>,
        construct_error::<1>,
        construct_error::<2>,
        construct_error::<3>,
        construct_error::<4>,
        construct_error::<5>,
    ];
    for (kind, ctor) in ErrorKind::ALL.into_iter().zip(constructors) {
        let proto = vm.intrinsics.error_prototypes[kind.index()];
        constructor(vm, kind.name(), 1, ctor, ctor, proto)?;
        constant(vm, proto, "name", Value::from(kind.name()))?;
        constant(vm, proto, "message", Value::from(""))?;
    }
    let base = vm.intrinsics.error_prototypes[ErrorKind::Error.index()];
    method(vm, base, "toString", 0, to_string)?;
    Ok(())
}

/// `Error(message)` and `new Error(message)` behave the same.
fn construct_error<const K: usize>(vm: &mut VmSession, _this: &Value, args: &[Value]) -> Result<Value> {
    let kind = ErrorKind::ALL[K];
    let message = match arg(args, 0) {
        Value::Undefined => None,
        other => Some(vm.to_display_string(&other)?),
    };
    let error = vm.create_error_of(kind, message.as_deref())?;
    if message.is_none() {
        // Inherit the prototype's empty message.
        let slot = vm.object_slot(&error, "construct error")?;
        vm.remove_own(slot, &PropertyKey::from("message"))?;
    }
    Ok(error)
}

fn to_string(vm: &mut VmSession, this: &Value, _args: &[Value]) -> Result<Value> {
    if !this.is_object() {
        return Err(type_error(vm, "Error.prototype.toString called on non-object"));
    }
    let name = match vm.get_member(this, &PropertyKey::from("name"))? {
        Value::Undefined => "Error".to_string(),
        other => vm.to_display_string(&other)?,
    };
    let message = match vm.get_member(this, &PropertyKey::from("message"))? {
        Value::Undefined => String::new(),
        other => vm.to_display_string(&other)?,
    };
    Ok(Value::String(match (name.is_empty(), message.is_empty()) {
        (_, true) => name,
        (true, false) => message,
        (false, false) => format!("{}: {}", name, message),
    }))
}

#[cfg(test)]
mod tests {
    use crate::{Value, VmSession};

    fn eval(source: &str) -> Value {
        let mut vm = VmSession::new().unwrap();
        vm.eval(source).unwrap()
    }

    #[test]
    fn subtypes_inherit_from_error() {
        assert_eq!(
            eval("var e = new RangeError('bad'); (e instanceof RangeError) + ',' + (e instanceof Error) + ',' + e"),
            Value::from("true,true,RangeError: bad")
        );
    }

    #[test]
    fn call_without_new_still_creates() {
        assert_eq!(eval("TypeError('x').name"), Value::from("TypeError"));
    }

    #[test]
    fn missing_message_reads_empty() {
        assert_eq!(eval("new Error().message === '' && String(new Error())"), Value::from("Error"));
    }
}
