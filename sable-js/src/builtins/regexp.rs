//! `RegExp` on top of the `regex` crate.
//!
//! Patterns are handed to `regex` after the flag prefix is applied, so
//! look-around and backreferences are rejected as syntax errors. Match
//! positions are reported in UTF-16 units.

use regex::{Captures, Regex};

use super::{arg, constructor, method, type_error};
use crate::error::Result;
use crate::object::{ObjectKind, RegExpData};
use crate::session::VmSession;
use crate::value::{PropertyKey, Value};

const FLAGS: &str = "gimsuy";

pub(super) fn install(vm: &mut VmSession) -> Result<()> {
    let proto = vm.intrinsics.regexp_prototype;
    constructor(vm, "RegExp", 2, regexp_call, regexp_construct, proto)?;
    method(vm, proto, "exec", 1, exec)?;
    method(vm, proto, "test", 1, test)?;
    method(vm, proto, "toString", 0, to_string)?;
    Ok(())
}

/// Validate `flags` and compile `pattern`.
pub(crate) fn compile_pattern(pattern: &str, flags: &str) -> std::result::Result<RegExpData, String> {
    let mut seen = String::new();
    for flag in flags.chars() {
        if !FLAGS.contains(flag) || seen.contains(flag) {
            return Err(format!("Invalid flags supplied to RegExp constructor '{}'", flags));
        }
        seen.push(flag);
    }
    let mut prefix = String::new();
    for (flag, inline) in [('i', "(?i)"), ('m', "(?m)"), ('s', "(?s)")] {
        if flags.contains(flag) {
            prefix.push_str(inline);
        }
    }
    let regex = Regex::new(&format!("{}{}", prefix, pattern))
        .map_err(|_| format!("Invalid regular expression: /{}/", pattern))?;
    Ok(RegExpData {
        source: pattern.to_string(),
        flags: flags.to_string(),
        regex,
    })
}

/// Internal data of a RegExp object, or `None` for any other value.
pub(crate) fn regexp_data(vm: &VmSession, value: &Value) -> Result<Option<RegExpData>> {
    let Value::Object(obj) = value else {
        return Ok(None);
    };
    let slot = vm.resolve(obj)?;
    Ok(match &vm.cell(slot)?.kind {
        ObjectKind::RegExp(data) => Some(data.clone()),
        _ => None,
    })
}

/// Byte offset of the UTF-16 position `units`, or `None` past the end.
pub(crate) fn utf16_to_byte(s: &str, units: usize) -> Option<usize> {
    let mut count = 0;
    for (byte, ch) in s.char_indices() {
        if count >= units {
            return Some(byte);
        }
        count += ch.len_utf16();
    }
    (count >= units).then_some(s.len())
}

/// UTF-16 position of a byte offset on a char boundary.
pub(crate) fn byte_to_utf16(s: &str, byte: usize) -> usize {
    s[..byte].encode_utf16().count()
}

/// Capture groups as guest values; unmatched groups are `undefined`.
pub(crate) fn capture_values(caps: &Captures<'_>) -> Vec<Value> {
    caps.iter()
        .map(|group| group.map_or(Value::Undefined, |m| Value::String(m.as_str().to_string())))
        .collect()
}

fn regexp_call(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    let pattern = arg(args, 0);
    if pattern.is_regexp() && arg(args, 1).is_undefined() {
        return Ok(pattern);
    }
    regexp_construct(vm, this, args)
}

fn regexp_construct(vm: &mut VmSession, _this: &Value, args: &[Value]) -> Result<Value> {
    let pattern = arg(args, 0);
    let (source, inherited) = match regexp_data(vm, &pattern)? {
        Some(data) => (data.source, data.flags),
        None if pattern.is_undefined() => (String::new(), String::new()),
        None => (vm.to_display_string(&pattern)?, String::new()),
    };
    let flags = match arg(args, 1) {
        Value::Undefined => inherited,
        other => vm.to_display_string(&other)?,
    };
    vm.create_regexp(&source, &flags)
}

fn this_regexp(vm: &mut VmSession, this: &Value, what: &str) -> Result<RegExpData> {
    match regexp_data(vm, this)? {
        Some(data) => Ok(data),
        None => Err(type_error(
            vm,
            format!("{} called on incompatible receiver", what),
        )),
    }
}

fn exec(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    let data = this_regexp(vm, this, "RegExp.prototype.exec")?;
    let input = vm.to_display_string(&arg(args, 0))?;
    exec_on(vm, this, &data, &input)
}

/// One `exec` step, honouring and updating `lastIndex` for `g` and `y`.
pub(crate) fn exec_on(vm: &mut VmSession, re: &Value, data: &RegExpData, input: &str) -> Result<Value> {
    let global = data.flags.contains('g');
    let sticky = data.flags.contains('y');
    let last_index = PropertyKey::from("lastIndex");
    let start = if global || sticky {
        let raw = vm.get_member(re, &last_index)?;
        vm.to_integer(&raw)?.max(0.0) as usize
    } else {
        0
    };

    let found = utf16_to_byte(input, start).and_then(|byte| {
        data.regex
            .captures_at(input, byte)
            .filter(|caps| !sticky || caps.get(0).is_some_and(|m| m.start() == byte))
    });
    let Some((caps, whole)) = found.and_then(|caps| caps.get(0).map(|m| (caps, m))) else {
        if global || sticky {
            vm.set_member(re, last_index, Value::Number(0.0))?;
        }
        return Ok(Value::Null);
    };

    let result = vm.create_array_from(capture_values(&caps))?;
    let index = byte_to_utf16(input, whole.start());
    vm.set_member(&result, PropertyKey::from("index"), Value::Number(index as f64))?;
    vm.set_member(&result, PropertyKey::from("input"), Value::String(input.to_string()))?;
    if global || sticky {
        let end = byte_to_utf16(input, whole.end());
        vm.set_member(re, last_index, Value::Number(end as f64))?;
    }
    Ok(result)
}

fn test(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    let data = this_regexp(vm, this, "RegExp.prototype.test")?;
    let input = vm.to_display_string(&arg(args, 0))?;
    Ok(Value::Boolean(!exec_on(vm, this, &data, &input)?.is_null()))
}

fn to_string(vm: &mut VmSession, this: &Value, _args: &[Value]) -> Result<Value> {
    let data = this_regexp(vm, this, "RegExp.prototype.toString")?;
    let source = if data.source.is_empty() {
        "(?:)"
    } else {
        data.source.as_str()
    };
    Ok(Value::String(format!("/{}/{}", source, data.flags)))
}
