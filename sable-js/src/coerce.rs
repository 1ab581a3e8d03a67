//! Guest coercions and equality.
//!
//! These are the explicit conversions of the guest language. The strict
//! `as_*` accessors in `handle.rs` never go through here.

use crate::error::Result;
use crate::exception::ErrorKind;
use crate::object::ObjectKind;
use crate::session::VmSession;
use crate::value::{PropertyKey, Value};

/// Preferred type for `ToPrimitive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Hint {
    Default,
    Number,
    String,
}

impl VmSession {
    /// Guest truthiness.
    pub fn to_boolean(&self, value: &Value) -> Result<bool> {
        self.check_value(value)?;
        Ok(value.to_boolean())
    }

    /// Guest `ToNumber`. Objects go through `valueOf`/`toString`.
    pub fn to_number(&mut self, value: &Value) -> Result<f64> {
        Ok(match value {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::String(s) => string_to_number(s),
            Value::Object(_) => {
                let primitive = self.to_primitive(value, Hint::Number)?;
                return self.to_number(&primitive);
            }
        })
    }

    /// Guest `ToString`, e.g. `1` becomes `"1"` and `[1,2]` becomes `"1,2"`.
    pub fn to_display_string(&mut self, value: &Value) -> Result<String> {
        Ok(match value {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::String(s) => s.clone(),
            Value::Object(_) => {
                let primitive = self.to_primitive(value, Hint::String)?;
                return self.to_display_string(&primitive);
            }
        })
    }

    /// `===`.
    pub fn strict_equals(&self, a: &Value, b: &Value) -> Result<bool> {
        self.check_value(a)?;
        self.check_value(b)?;
        Ok(strict_equals(a, b))
    }

    /// `==`.
    pub fn loose_equals(&mut self, a: &Value, b: &Value) -> Result<bool> {
        self.check_value(a)?;
        self.check_value(b)?;
        self.loose_equals_inner(a, b)
    }

    fn loose_equals_inner(&mut self, a: &Value, b: &Value) -> Result<bool> {
        match (a, b) {
            (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => Ok(true),
            (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => Ok(false),
            (Value::Number(x), Value::String(s)) => Ok(*x == string_to_number(s)),
            (Value::String(s), Value::Number(y)) => Ok(string_to_number(s) == *y),
            (Value::Boolean(x), _) => {
                let x = Value::Number(if *x { 1.0 } else { 0.0 });
                self.loose_equals_inner(&x, b)
            }
            (_, Value::Boolean(y)) => {
                let y = Value::Number(if *y { 1.0 } else { 0.0 });
                self.loose_equals_inner(a, &y)
            }
            (Value::Object(_), Value::Number(_) | Value::String(_)) => {
                let a = self.to_primitive(a, Hint::Default)?;
                self.loose_equals_inner(&a, b)
            }
            (Value::Number(_) | Value::String(_), Value::Object(_)) => {
                let b = self.to_primitive(b, Hint::Default)?;
                self.loose_equals_inner(a, &b)
            }
            _ => Ok(strict_equals(a, b)),
        }
    }

    /// Guest `ToPrimitive`. Dates prefer strings when no hint is given.
    pub(crate) fn to_primitive(&mut self, value: &Value, hint: Hint) -> Result<Value> {
        let Value::Object(obj) = value else {
            return Ok(value.clone());
        };
        let slot = self.resolve(obj)?;
        let prefer_string = match hint {
            Hint::String => true,
            Hint::Number => false,
            Hint::Default => matches!(self.cell(slot)?.kind, ObjectKind::Date(_)),
        };
        let order = if prefer_string {
            ["toString", "valueOf"]
        } else {
            ["valueOf", "toString"]
        };
        for name in order {
            let method = self.get_slot_property(slot, &PropertyKey::from(name))?;
            if method.is_function() {
                let result = self.call_value(&method, value, &[])?;
                if !result.is_object() {
                    return Ok(result);
                }
            }
        }
        Err(self.raise(ErrorKind::TypeError, "Cannot convert object to primitive value"))
    }

    /// Property key for a computed member access.
    pub(crate) fn to_property_key(&mut self, value: &Value) -> Result<PropertyKey> {
        Ok(match value {
            Value::Number(n) => number_key(*n),
            Value::String(s) => PropertyKey::from(s.as_str()),
            other => PropertyKey::from(self.to_display_string(other)?),
        })
    }

    pub(crate) fn to_int32(&mut self, value: &Value) -> Result<i32> {
        Ok(to_int32(self.to_number(value)?))
    }

    pub(crate) fn to_uint32(&mut self, value: &Value) -> Result<u32> {
        Ok(to_uint32(self.to_number(value)?))
    }

    /// `ToIntegerOrInfinity`.
    pub(crate) fn to_integer(&mut self, value: &Value) -> Result<f64> {
        let n = self.to_number(value)?;
        Ok(if n.is_nan() { 0.0 } else { n.trunc() })
    }
}

/// `===` on values already known to belong to one session.
pub(crate) fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Boolean(x), Value::Boolean(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Object(x), Value::Object(y)) => x == y,
        _ => false,
    }
}

/// SameValueZero, used by `indexOf`-style searches that must find NaN.
pub(crate) fn same_value_zero(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) if x.is_nan() && y.is_nan() => true,
        _ => strict_equals(a, b),
    }
}

fn number_key(n: f64) -> PropertyKey {
    if n >= 0.0 && n < u32::MAX as f64 && n.fract() == 0.0 {
        PropertyKey::Index(n as u32)
    } else {
        PropertyKey::Name(number_to_string(n))
    }
}

pub(crate) fn to_int32(n: f64) -> i32 {
    to_uint32(n) as i32
}

pub(crate) fn to_uint32(n: f64) -> u32 {
    if !n.is_finite() {
        return 0;
    }
    n.trunc().rem_euclid(4_294_967_296.0) as u32
}

fn is_js_whitespace(c: char) -> bool {
    c.is_whitespace() || c == '\u{FEFF}'
}

/// `ToNumber` applied to a string.
pub(crate) fn string_to_number(s: &str) -> f64 {
    let s = s.trim_matches(is_js_whitespace);
    if s.is_empty() {
        return 0.0;
    }
    let radix = match s.get(..2) {
        Some("0x") | Some("0X") => Some(16),
        Some("0o") | Some("0O") => Some(8),
        Some("0b") | Some("0B") => Some(2),
        _ => None,
    };
    if let Some(radix) = radix {
        return parse_radix_digits(&s[2..], radix).unwrap_or(f64::NAN);
    }
    match s {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    let valid = s
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'));
    if !valid || !s.chars().any(|c| c.is_ascii_digit()) {
        return f64::NAN;
    }
    s.parse::<f64>().unwrap_or(f64::NAN)
}

/// Digits in `radix` with no sign or prefix; `None` if empty or invalid.
pub(crate) fn parse_radix_digits(digits: &str, radix: u32) -> Option<f64> {
    if digits.is_empty() {
        return None;
    }
    let mut value = 0.0f64;
    for c in digits.chars() {
        value = value * radix as f64 + c.to_digit(radix)? as f64;
    }
    Some(value)
}

/// `Number.prototype.toString()` with radix 10.
pub(crate) fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n < 0.0 {
        return format!("-{}", number_to_string(-n));
    }

    // Shortest round-trip digits, then the guest layout rules.
    let formatted = format!("{:e}", n);
    let (mantissa, exponent) = formatted.split_once('e').unwrap_or((formatted.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let k = digits.len() as i32;
    let point = exponent + 1;

    if k <= point && point <= 21 {
        let mut out = digits;
        out.extend(std::iter::repeat('0').take((point - k) as usize));
        out
    } else if 0 < point && point <= 21 {
        format!("{}.{}", &digits[..point as usize], &digits[point as usize..])
    } else if -6 < point && point <= 0 {
        format!("0.{}{}", "0".repeat((-point) as usize), digits)
    } else {
        let e = point - 1;
        let sign = if e >= 0 { '+' } else { '-' };
        if k == 1 {
            format!("{}e{}{}", digits, sign, e.abs())
        } else {
            format!("{}.{}e{}{}", &digits[..1], &digits[1..], sign, e.abs())
        }
    }
}

/// Integer digits of `n` in `radix`, with a fraction when `n` has one.
pub(crate) fn number_to_radix_string(n: f64, radix: u32) -> String {
    if radix == 10 || !n.is_finite() {
        return number_to_string(n);
    }
    let negative = n < 0.0;
    let n = n.abs();
    let mut int_part = n.trunc();
    let mut frac = n - int_part;
    let mut digits = Vec::new();
    if int_part == 0.0 {
        digits.push('0');
    }
    while int_part >= 1.0 {
        let d = (int_part % radix as f64) as u32;
        digits.push(std::char::from_digit(d, radix).unwrap_or('0'));
        int_part = (int_part / radix as f64).trunc();
    }
    digits.reverse();
    let mut out: String = digits.into_iter().collect();
    if frac > 0.0 {
        out.push('.');
        for _ in 0..20 {
            frac *= radix as f64;
            let d = frac.trunc() as u32;
            out.push(std::char::from_digit(d, radix).unwrap_or('0'));
            frac -= d as f64;
            if frac <= 0.0 {
                break;
            }
        }
    }
    if negative {
        format!("-{}", out)
    } else {
        out
    }
}
