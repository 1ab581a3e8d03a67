//! The `Math` namespace object.

use super::{arg, constant, method};
use crate::bridge::BuiltinFn;
use crate::error::Result;
use crate::object::ObjectKind;
use crate::session::VmSession;
use crate::value::Value;

pub(super) fn install(vm: &mut VmSession) -> Result<()> {
    let proto = vm.intrinsics.object_prototype;
    let math = vm.alloc(ObjectKind::Ordinary, Some(proto))?;
    let handle = vm.handle(math)?;
    let global = vm.intrinsics.global;
    constant(vm, global, "Math", handle)?;

    let constants = [
        ("PI", std::f64::consts::PI),
        ("E", std::f64::consts::E),
        ("LN2", std::f64::consts::LN_2),
        ("LN10", std::f64::consts::LN_10),
        ("LOG2E", std::f64::consts::LOG2_E),
        ("LOG10E", std::f64::consts::LOG10_E),
        ("SQRT2", std::f64::consts::SQRT_2),
        ("SQRT1_2", std::f64::consts::FRAC_1_SQRT_2),
    ];
    for (name, value) in constants {
        constant(vm, math, name, Value::Number(value))?;
    }

    let unary: [(&str, BuiltinFn); 17] = [
        ("abs", abs),
        ("floor", floor),
        ("ceil", ceil),
        ("round", round),
        ("trunc", trunc),
        ("sign", sign),
        ("sqrt", sqrt),
        ("cbrt", cbrt),
        ("sin", sin),
        ("cos", cos),
        ("tan", tan),
        ("asin", asin),
        ("acos", acos),
        ("atan", atan),
        ("exp", exp),
        ("log", log),
        ("log2", log2),
    ];
    for (name, func) in unary {
        method(vm, math, name, 1, func)?;
    }
    method(vm, math, "log10", 1, log10)?;
    method(vm, math, "atan2", 2, atan2)?;
    method(vm, math, "pow", 2, pow)?;
    method(vm, math, "max", 2, max)?;
    method(vm, math, "min", 2, min)?;
    method(vm, math, "hypot", 2, hypot)?;
    method(vm, math, "random", 0, random)?;
    Ok(())
}

fn number_arg(vm: &mut VmSession, args: &[Value], index: usize) -> Result<f64> {
    vm.to_number(&arg(args, index))
}

macro_rules! unary_math {
    ($($name:ident => $body:expr;)*) => {
        $(
            fn $name(vm: &mut VmSession, _this: &Value, args: &[Value]) -> Result<Value> {
                let x = number_arg(vm, args, 0)?;
                let f: fn(f64) -> f64 = $body;
                Ok(Value::Number(f(x)))
            }
        )*
    };
}

unary_math! {
    abs => f64::abs;
    floor => f64::floor;
    ceil => f64::ceil;
    round => js_round;
    trunc => f64::trunc;
    sign => |x| if x.is_nan() || x == 0.0 { x } else { x.signum() };
    sqrt => f64::sqrt;
    cbrt => f64::cbrt;
    sin => f64::sin;
    cos => f64::cos;
    tan => f64::tan;
    asin => f64::asin;
    acos => f64::acos;
    atan => f64::atan;
    exp => f64::exp;
    log => f64::ln;
    log2 => f64::log2;
    log10 => f64::log10;
}

/// Round half up, keeping the sign of zero.
fn js_round(x: f64) -> f64 {
    if !x.is_finite() || x.fract() == 0.0 {
        return x;
    }
    let r = (x + 0.5).floor();
    if r == 0.0 && x < 0.0 {
        -0.0
    } else {
        r
    }
}

fn atan2(vm: &mut VmSession, _this: &Value, args: &[Value]) -> Result<Value> {
    let y = number_arg(vm, args, 0)?;
    let x = number_arg(vm, args, 1)?;
    Ok(Value::Number(y.atan2(x)))
}

fn pow(vm: &mut VmSession, _this: &Value, args: &[Value]) -> Result<Value> {
    let base = number_arg(vm, args, 0)?;
    let exponent = number_arg(vm, args, 1)?;
    Ok(Value::Number(js_pow(base, exponent)))
}

/// `**` semantics: a NaN exponent always yields NaN, and `(±1) ** ±Infinity` is NaN.
pub(crate) fn js_pow(base: f64, exponent: f64) -> f64 {
    if exponent.is_nan() || (base.abs() == 1.0 && exponent.is_infinite()) {
        return f64::NAN;
    }
    base.powf(exponent)
}

fn max(vm: &mut VmSession, _this: &Value, args: &[Value]) -> Result<Value> {
    let mut result = f64::NEG_INFINITY;
    for a in args {
        let n = vm.to_number(a)?;
        if n.is_nan() || result.is_nan() {
            result = f64::NAN;
        } else if n > result || (n == 0.0 && result == 0.0 && result.is_sign_negative()) {
            result = n;
        }
    }
    Ok(Value::Number(result))
}

fn min(vm: &mut VmSession, _this: &Value, args: &[Value]) -> Result<Value> {
    let mut result = f64::INFINITY;
    for a in args {
        let n = vm.to_number(a)?;
        if n.is_nan() || result.is_nan() {
            result = f64::NAN;
        } else if n < result || (n == 0.0 && result == 0.0 && n.is_sign_negative()) {
            result = n;
        }
    }
    Ok(Value::Number(result))
}

fn hypot(vm: &mut VmSession, _this: &Value, args: &[Value]) -> Result<Value> {
    let mut sum = 0.0;
    for a in args {
        let n = vm.to_number(a)?;
        sum += n * n;
    }
    Ok(Value::Number(sum.sqrt()))
}

fn random(vm: &mut VmSession, _this: &Value, _args: &[Value]) -> Result<Value> {
    Ok(Value::Number(vm.next_random()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_half_goes_up() {
        assert_eq!(js_round(2.5), 3.0);
        assert_eq!(js_round(-2.5), -2.0);
        assert!(js_round(-0.2).is_sign_negative());
    }

    #[test]
    fn pow_edge_cases() {
        assert!(js_pow(1.0, f64::INFINITY).is_nan());
        assert!(js_pow(2.0, f64::NAN).is_nan());
        assert_eq!(js_pow(2.0, 10.0), 1024.0);
    }

    #[test]
    fn min_max_through_guest_code() {
        let mut vm = VmSession::new().unwrap();
        assert_eq!(
            vm.eval("Math.max(1, 7, 3) + Math.min(4, -2)").unwrap(),
            Value::from(5)
        );
        assert_eq!(
            vm.eval("Math.max() === -Infinity && isNaN(Math.min(1, NaN))").unwrap(),
            Value::Boolean(true)
        );
    }
}
