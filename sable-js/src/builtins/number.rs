//! `Number` and `Boolean` constructors with their prototypes.

use super::{arg, constant, constructor, method, type_error};
use crate::coerce::{number_to_radix_string, number_to_string};
use crate::error::Result;
use crate::exception::ErrorKind;
use crate::object::ObjectKind;
use crate::session::VmSession;
use crate::value::Value;

pub(super) fn install(vm: &mut VmSession) -> Result<()> {
    let proto = vm.intrinsics.number_prototype;
    let ctor = constructor(vm, "Number", 1, number_call, number_construct, proto)?;
    let constants = [
        ("MAX_VALUE", f64::MAX),
        ("MIN_VALUE", 5e-324),
        ("NaN", f64::NAN),
        ("POSITIVE_INFINITY", f64::INFINITY),
        ("NEGATIVE_INFINITY", f64::NEG_INFINITY),
        ("MAX_SAFE_INTEGER", 9_007_199_254_740_991.0),
        ("MIN_SAFE_INTEGER", -9_007_199_254_740_991.0),
        ("EPSILON", f64::EPSILON),
    ];
    for (name, value) in constants {
        constant(vm, ctor, name, Value::Number(value))?;
    }
    method(vm, ctor, "isInteger", 1, is_integer)?;
    method(vm, ctor, "isSafeInteger", 1, is_safe_integer)?;
    method(vm, ctor, "isFinite", 1, is_finite)?;
    method(vm, ctor, "isNaN", 1, is_nan)?;
    method(vm, ctor, "parseFloat", 1, super::global::parse_float)?;
    method(vm, ctor, "parseInt", 2, super::global::parse_int)?;

    method(vm, proto, "toString", 1, number_to_string_method)?;
    method(vm, proto, "toLocaleString", 0, number_to_string_method)?;
    method(vm, proto, "toFixed", 1, to_fixed)?;
    method(vm, proto, "valueOf", 0, number_value_of)?;

    let proto = vm.intrinsics.boolean_prototype;
    constructor(vm, "Boolean", 1, boolean_call, boolean_construct, proto)?;
    method(vm, proto, "toString", 0, boolean_to_string)?;
    method(vm, proto, "valueOf", 0, boolean_value_of)?;
    Ok(())
}

fn number_call(vm: &mut VmSession, _this: &Value, args: &[Value]) -> Result<Value> {
    match args.first() {
        None => Ok(Value::Number(0.0)),
        Some(value) => Ok(Value::Number(vm.to_number(value)?)),
    }
}

fn number_construct(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    let value = number_call(vm, this, args)?;
    super::object::box_primitive(vm, value)
}

fn is_integer(_vm: &mut VmSession, _this: &Value, args: &[Value]) -> Result<Value> {
    Ok(Value::Boolean(
        matches!(arg(args, 0), Value::Number(n) if n.is_finite() && n.trunc() == n),
    ))
}

fn is_safe_integer(_vm: &mut VmSession, _this: &Value, args: &[Value]) -> Result<Value> {
    Ok(Value::Boolean(matches!(
        arg(args, 0),
        Value::Number(n) if n.is_finite() && n.trunc() == n && n.abs() <= 9_007_199_254_740_991.0
    )))
}

fn is_finite(_vm: &mut VmSession, _this: &Value, args: &[Value]) -> Result<Value> {
    Ok(Value::Boolean(matches!(arg(args, 0), Value::Number(n) if n.is_finite())))
}

fn is_nan(_vm: &mut VmSession, _this: &Value, args: &[Value]) -> Result<Value> {
    Ok(Value::Boolean(matches!(arg(args, 0), Value::Number(n) if n.is_nan())))
}

/// `this` as a number: a primitive or a Number wrapper.
fn this_number(vm: &mut VmSession, this: &Value, what: &str) -> Result<f64> {
    match this {
        Value::Number(n) => return Ok(*n),
        Value::Object(obj) => {
            let slot = vm.resolve(obj)?;
            if let ObjectKind::Boxed(Value::Number(n)) = vm.cell(slot)?.kind {
                return Ok(n);
            }
        }
        _ => {}
    }
    Err(type_error(
        vm,
        format!("Number.prototype.{} requires that 'this' be a Number", what),
    ))
}

fn number_to_string_method(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    let n = this_number(vm, this, "toString")?;
    let radix = match arg(args, 0) {
        Value::Undefined => 10.0,
        other => vm.to_integer(&other)?,
    };
    if !(2.0..=36.0).contains(&radix) {
        return Err(vm.raise(
            ErrorKind::RangeError,
            "toString() radix must be between 2 and 36",
        ));
    }
    Ok(Value::String(if radix == 10.0 {
        number_to_string(n)
    } else {
        number_to_radix_string(n, radix as u32)
    }))
}

fn to_fixed(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    let n = this_number(vm, this, "toFixed")?;
    let digits = vm.to_integer(&arg(args, 0))?;
    if !(0.0..=100.0).contains(&digits) {
        return Err(vm.raise(
            ErrorKind::RangeError,
            "toFixed() digits argument must be between 0 and 100",
        ));
    }
    if !n.is_finite() || n.abs() >= 1e21 {
        return Ok(Value::String(number_to_string(n)));
    }
    let n = if n == 0.0 { 0.0 } else { n };
    Ok(Value::String(format!("{:.*}", digits as usize, n)))
}

fn number_value_of(vm: &mut VmSession, this: &Value, _args: &[Value]) -> Result<Value> {
    Ok(Value::Number(this_number(vm, this, "valueOf")?))
}

fn boolean_call(_vm: &mut VmSession, _this: &Value, args: &[Value]) -> Result<Value> {
    Ok(Value::Boolean(arg(args, 0).to_boolean()))
}

fn boolean_construct(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    let value = boolean_call(vm, this, args)?;
    super::object::box_primitive(vm, value)
}

fn this_boolean(vm: &mut VmSession, this: &Value, what: &str) -> Result<bool> {
    match this {
        Value::Boolean(b) => return Ok(*b),
        Value::Object(obj) => {
            let slot = vm.resolve(obj)?;
            if let ObjectKind::Boxed(Value::Boolean(b)) = vm.cell(slot)?.kind {
                return Ok(b);
            }
        }
        _ => {}
    }
    Err(type_error(
        vm,
        format!("Boolean.prototype.{} requires that 'this' be a Boolean", what),
    ))
}

fn boolean_to_string(vm: &mut VmSession, this: &Value, _args: &[Value]) -> Result<Value> {
    Ok(Value::from(if this_boolean(vm, this, "toString")? {
        "true"
    } else {
        "false"
    }))
}

fn boolean_value_of(vm: &mut VmSession, this: &Value, _args: &[Value]) -> Result<Value> {
    Ok(Value::Boolean(this_boolean(vm, this, "valueOf")?))
}

#[cfg(test)]
mod tests {
    use crate::{Value, VmSession};

    fn eval(source: &str) -> Value {
        let mut vm = VmSession::new().unwrap();
        vm.eval(source).unwrap()
    }

    #[test]
    fn to_string_radix() {
        assert_eq!(eval("(255).toString(16) + (5).toString(2)"), Value::from("ff101"));
        assert_eq!(
            eval("try { (1).toString(1); } catch (e) { e.name }"),
            Value::from("RangeError")
        );
    }

    #[test]
    fn to_fixed_pads_and_rounds() {
        assert_eq!(eval("(1.005).toFixed(0) + '|' + (3).toFixed(2) + '|' + (-0).toFixed(1)"), Value::from("1|3.00|0.0"));
    }

    #[test]
    fn wrappers_unwrap_through_value_of() {
        assert_eq!(eval("new Number(4) + 1"), Value::from(5));
        assert_eq!(eval("typeof new Boolean(false)"), Value::from("object"));
        assert_eq!(eval("new Boolean(false) ? 'yes' : 'no'"), Value::from("yes"));
    }

    #[test]
    fn static_predicates_do_not_coerce() {
        assert_eq!(eval("Number.isNaN('x')"), Value::Boolean(false));
        assert_eq!(eval("Number.isInteger(5) && !Number.isInteger(5.5)"), Value::Boolean(true));
    }
}
