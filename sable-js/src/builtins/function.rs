//! `Function` constructor and `Function.prototype`.

use super::{arg, constructor, method, type_error};
use crate::error::Result;
use crate::object::FunctionKind;
use crate::session::VmSession;
use crate::value::{PropertyKey, Value};

pub(super) fn install(vm: &mut VmSession) -> Result<()> {
    let proto = vm.intrinsics.function_prototype;
    constructor(vm, "Function", 1, function_constructor, function_constructor, proto)?;
    method(vm, proto, "call", 1, call)?;
    method(vm, proto, "apply", 2, apply)?;
    method(vm, proto, "bind", 1, bind)?;
    method(vm, proto, "toString", 0, to_string)?;
    Ok(())
}

/// Body of `Function.prototype` itself.
pub(crate) fn empty(_vm: &mut VmSession, _this: &Value, _args: &[Value]) -> Result<Value> {
    Ok(Value::Undefined)
}

/// `Function(p1, p2, ..., body)`: compiles a function expression in the
/// global scope.
fn function_constructor(vm: &mut VmSession, _this: &Value, args: &[Value]) -> Result<Value> {
    let mut parts = Vec::with_capacity(args.len());
    for a in args {
        parts.push(vm.to_display_string(a)?);
    }
    let body = parts.pop().unwrap_or_default();
    let source = format!("(function anonymous({}\n) {{\n{}\n}})", parts.join(","), body);
    vm.eval(&source)
}

fn call(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    if !vm.is_callable(this) {
        return Err(type_error(vm, "Function.prototype.call called on non-function"));
    }
    let receiver = arg(args, 0);
    let rest = args.get(1..).unwrap_or(&[]);
    vm.call_value(this, &receiver, rest)
}

fn apply(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    if !vm.is_callable(this) {
        return Err(type_error(vm, "Function.prototype.apply was called on a non-function"));
    }
    let receiver = arg(args, 0);
    let list = arg(args, 1);
    let call_args = match &list {
        Value::Undefined | Value::Null => Vec::new(),
        Value::Object(_) => {
            let len = vm.length_of(&list)?;
            let mut items = Vec::with_capacity(len.min(1 << 16) as usize);
            for i in 0..len {
                items.push(vm.get_member(&list, &PropertyKey::from(i))?);
            }
            items
        }
        _ => return Err(type_error(vm, "CreateListFromArrayLike called on non-object")),
    };
    vm.call_value(this, &receiver, &call_args)
}

fn bind(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    let Value::Object(target) = this else {
        return Err(type_error(vm, "Bind must be called on a function"));
    };
    if !vm.is_callable(this) {
        return Err(type_error(vm, "Bind must be called on a function"));
    }
    let receiver = arg(args, 0);
    let bound_args = args.get(1..).unwrap_or(&[]).to_vec();
    vm.create_bound_function(target.clone(), receiver, bound_args)
}

fn to_string(vm: &mut VmSession, this: &Value, _args: &[Value]) -> Result<Value> {
    let Value::Object(obj) = this else {
        return Err(type_error(vm, "Function.prototype.toString requires that 'this' be a Function"));
    };
    let slot = vm.resolve(obj)?;
    let Some(data) = vm.cell(slot)?.function() else {
        return Err(type_error(vm, "Function.prototype.toString requires that 'this' be a Function"));
    };
    let text = match &data.kind {
        FunctionKind::Guest(_) => format!("function {}() {{ [guest code] }}", data.name),
        _ => format!("function {}() {{ [native code] }}", data.name),
    };
    Ok(Value::String(text))
}

#[cfg(test)]
mod tests {
    use crate::{Value, VmSession};

    #[test]
    fn function_constructor_joins_parameters() {
        let mut vm = VmSession::new().unwrap();
        let result = vm
            .eval("var f = Function('arg1,arg2', 'arg3', 'return arg1+arg2+arg3'); f('', 1, 2)")
            .unwrap();
        assert_eq!(result, Value::from("12"));
    }

    #[test]
    fn bind_fixes_this_and_prefix() {
        let mut vm = VmSession::new().unwrap();
        let result = vm
            .eval(
                "function f(a, b) { return this.base + a + b; }\n\
                 var g = f.bind({base: 100}, 10);\n\
                 g(1) + g.length",
            )
            .unwrap();
        assert_eq!(result, Value::from(112));
    }

    #[test]
    fn apply_on_undefined_is_a_type_error() {
        let mut vm = VmSession::new().unwrap();
        let result = vm
            .eval("try { Function.prototype.apply.call(undefined, {}, []); 'no' } catch (e) { e instanceof TypeError }")
            .unwrap();
        assert_eq!(result, Value::Boolean(true));
    }
}
