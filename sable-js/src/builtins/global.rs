//! Global functions and value properties.

use super::{arg, constant, method};
use crate::coerce::parse_radix_digits;
use crate::error::Result;
use crate::session::VmSession;
use crate::value::Value;

pub(super) fn install(vm: &mut VmSession) -> Result<()> {
    let global = vm.intrinsics.global;
    constant(vm, global, "NaN", Value::Number(f64::NAN))?;
    constant(vm, global, "Infinity", Value::Number(f64::INFINITY))?;
    constant(vm, global, "undefined", Value::Undefined)?;
    let this = vm.handle(global)?;
    constant(vm, global, "globalThis", this)?;

    method(vm, global, "print", 1, print)?;
    method(vm, global, "eval", 1, eval)?;
    method(vm, global, "isNaN", 1, is_nan)?;
    method(vm, global, "isFinite", 1, is_finite)?;
    method(vm, global, "parseInt", 2, parse_int)?;
    method(vm, global, "parseFloat", 1, parse_float)?;
    Ok(())
}

/// Write the arguments to stdout, separated by spaces.
fn print(vm: &mut VmSession, _this: &Value, args: &[Value]) -> Result<Value> {
    let mut parts = Vec::with_capacity(args.len());
    for a in args {
        parts.push(vm.to_display_string(a)?);
    }
    println!("{}", parts.join(" "));
    Ok(Value::Undefined)
}

/// Indirect eval: the source runs against the global object.
fn eval(vm: &mut VmSession, _this: &Value, args: &[Value]) -> Result<Value> {
    match arg(args, 0) {
        Value::String(source) => vm.eval(&source),
        other => Ok(other),
    }
}

fn is_nan(vm: &mut VmSession, _this: &Value, args: &[Value]) -> Result<Value> {
    Ok(Value::Boolean(vm.to_number(&arg(args, 0))?.is_nan()))
}

fn is_finite(vm: &mut VmSession, _this: &Value, args: &[Value]) -> Result<Value> {
    Ok(Value::Boolean(vm.to_number(&arg(args, 0))?.is_finite()))
}

fn trim_leading(s: &str) -> &str {
    s.trim_start_matches(|c: char| c.is_whitespace() || c == '\u{FEFF}')
}

pub(super) fn parse_int(vm: &mut VmSession, _this: &Value, args: &[Value]) -> Result<Value> {
    let text = vm.to_display_string(&arg(args, 0))?;
    let mut radix = vm.to_int32(&arg(args, 1))?;
    let mut s = trim_leading(&text);
    let negative = s.starts_with('-');
    if negative || s.starts_with('+') {
        s = &s[1..];
    }
    let has_hex_prefix = s.starts_with("0x") || s.starts_with("0X");
    if radix == 0 {
        radix = if has_hex_prefix { 16 } else { 10 };
    }
    if radix == 16 && has_hex_prefix {
        s = &s[2..];
    }
    if !(2..=36).contains(&radix) {
        return Ok(Value::Number(f64::NAN));
    }
    let end = s
        .find(|c: char| !c.is_digit(radix as u32))
        .unwrap_or(s.len());
    let value = parse_radix_digits(&s[..end], radix as u32).unwrap_or(f64::NAN);
    Ok(Value::Number(if negative { -value } else { value }))
}

pub(super) fn parse_float(vm: &mut VmSession, _this: &Value, args: &[Value]) -> Result<Value> {
    let text = vm.to_display_string(&arg(args, 0))?;
    Ok(Value::Number(float_prefix(trim_leading(&text))))
}

/// Longest prefix of `s` that reads as a decimal literal.
fn float_prefix(s: &str) -> f64 {
    let bytes = s.as_bytes();
    let mut i = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        i += 1;
    }
    if s[i..].starts_with("Infinity") {
        return if bytes[0] == b'-' {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        };
    }
    let digits_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let mut mantissa_digits = i - digits_start;
    if i < bytes.len() && bytes[i] == b'.' {
        let fraction_start = i + 1;
        let mut j = fraction_start;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        mantissa_digits += j - fraction_start;
        if mantissa_digits > 0 {
            i = j;
        }
    }
    if mantissa_digits == 0 {
        return f64::NAN;
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        let exponent_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > exponent_start {
            i = j;
        }
    }
    s[..i].parse::<f64>().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_prefix_stops_at_garbage() {
        assert_eq!(float_prefix("3.14abc"), 3.14);
        assert_eq!(float_prefix("-.5"), -0.5);
        assert_eq!(float_prefix("1e3x"), 1000.0);
        assert_eq!(float_prefix("1e"), 1.0);
        assert_eq!(float_prefix("-Infinityx"), f64::NEG_INFINITY);
        assert!(float_prefix(".").is_nan());
    }

    #[test]
    fn parse_int_radix_handling() {
        let mut vm = VmSession::new().unwrap();
        assert_eq!(
            vm.eval("parseInt('0x1F') + parseInt('  42px') + parseInt('101', 2)").unwrap(),
            Value::from(31 + 42 + 5)
        );
        assert_eq!(vm.eval("isNaN(parseInt('z', 10))").unwrap(), Value::Boolean(true));
    }

    #[test]
    fn indirect_eval_returns_completion_value() {
        let mut vm = VmSession::new().unwrap();
        assert_eq!(vm.eval("eval('var q = 2; q * 21')").unwrap(), Value::from(42));
        assert_eq!(vm.eval("q").unwrap(), Value::from(2));
        assert_eq!(vm.eval("eval(7)").unwrap(), Value::from(7));
    }

    #[test]
    fn global_this_is_the_global_object() {
        let mut vm = VmSession::new().unwrap();
        let global = vm.get_global().unwrap();
        assert_eq!(vm.eval("globalThis").unwrap(), global);
    }
}
