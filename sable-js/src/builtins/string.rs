//! `String` constructor and `String.prototype`.
//!
//! Positions and lengths are UTF-16 code units, as guest code expects.

use super::regexp::{byte_to_utf16, capture_values, exec_on, regexp_data};
use super::{arg, constructor, method, relative_index, type_error};
use crate::error::Result;
use crate::exception::ErrorKind;
use crate::object::{ObjectKind, RegExpData};
use crate::session::VmSession;
use crate::value::{PropertyKey, Value};

pub(super) fn install(vm: &mut VmSession) -> Result<()> {
    let proto = vm.intrinsics.string_prototype;
    let ctor = constructor(vm, "String", 1, string_call, string_construct, proto)?;
    method(vm, ctor, "fromCharCode", 1, from_char_code)?;

    let methods: [(&str, u32, crate::bridge::BuiltinFn); 28] = [
        ("charAt", 1, char_at),
        ("charCodeAt", 1, char_code_at),
        ("indexOf", 1, index_of),
        ("lastIndexOf", 1, last_index_of),
        ("slice", 2, slice),
        ("substring", 2, substring),
        ("substr", 2, substr),
        ("toUpperCase", 0, to_upper_case),
        ("toLowerCase", 0, to_lower_case),
        ("toLocaleUpperCase", 0, to_upper_case),
        ("toLocaleLowerCase", 0, to_lower_case),
        ("trim", 0, trim),
        ("trimStart", 0, trim_start),
        ("trimEnd", 0, trim_end),
        ("split", 2, split),
        ("replace", 2, replace),
        ("match", 1, match_),
        ("search", 1, search),
        ("concat", 1, concat),
        ("startsWith", 1, starts_with),
        ("endsWith", 1, ends_with),
        ("includes", 1, includes),
        ("repeat", 1, repeat),
        ("padStart", 2, pad_start),
        ("padEnd", 2, pad_end),
        ("localeCompare", 1, locale_compare),
        ("toString", 0, value_of),
        ("valueOf", 0, value_of),
    ];
    for (name, arity, func) in methods {
        method(vm, proto, name, arity, func)?;
    }
    Ok(())
}

fn string_call(vm: &mut VmSession, _this: &Value, args: &[Value]) -> Result<Value> {
    match args.first() {
        None => Ok(Value::String(String::new())),
        Some(value) => Ok(Value::String(vm.to_display_string(value)?)),
    }
}

fn string_construct(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    let value = string_call(vm, this, args)?;
    super::object::box_primitive(vm, value)
}

fn from_char_code(vm: &mut VmSession, _this: &Value, args: &[Value]) -> Result<Value> {
    let mut units = Vec::with_capacity(args.len());
    for a in args {
        units.push(vm.to_uint32(a)? as u16);
    }
    Ok(Value::String(String::from_utf16_lossy(&units)))
}

fn units(s: &str) -> Vec<u16> {
    s.encode_utf16().collect()
}

fn from_units(units: &[u16]) -> Value {
    Value::String(String::from_utf16_lossy(units))
}

/// `this` coerced to a string; `undefined` and `null` throw.
fn this_string(vm: &mut VmSession, this: &Value, what: &str) -> Result<String> {
    if this.is_nullish() {
        return Err(type_error(
            vm,
            format!("String.prototype.{} called on null or undefined", what),
        ));
    }
    vm.to_display_string(this)
}

fn find_units(hay: &[u16], needle: &[u16], from: usize) -> Option<usize> {
    if needle.len() > hay.len() {
        return None;
    }
    (from.min(hay.len())..=hay.len() - needle.len()).find(|&i| hay[i..].starts_with(needle))
}

fn rfind_units(hay: &[u16], needle: &[u16], from: usize) -> Option<usize> {
    if needle.len() > hay.len() {
        return None;
    }
    (0..=from.min(hay.len() - needle.len()))
        .rev()
        .find(|&i| hay[i..].starts_with(needle))
}

fn char_at(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    let s = units(&this_string(vm, this, "charAt")?);
    let pos = vm.to_integer(&arg(args, 0))?;
    if pos < 0.0 || pos >= s.len() as f64 {
        return Ok(Value::String(String::new()));
    }
    Ok(from_units(&s[pos as usize..pos as usize + 1]))
}

fn char_code_at(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    let s = units(&this_string(vm, this, "charCodeAt")?);
    let pos = vm.to_integer(&arg(args, 0))?;
    if pos < 0.0 || pos >= s.len() as f64 {
        return Ok(Value::Number(f64::NAN));
    }
    Ok(Value::Number(s[pos as usize] as f64))
}

fn index_of(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    let s = units(&this_string(vm, this, "indexOf")?);
    let needle = units(&vm.to_display_string(&arg(args, 0))?);
    let from = vm.to_integer(&arg(args, 1))?.max(0.0) as usize;
    Ok(Value::Number(
        find_units(&s, &needle, from).map_or(-1.0, |i| i as f64),
    ))
}

fn last_index_of(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    let s = units(&this_string(vm, this, "lastIndexOf")?);
    let needle = units(&vm.to_display_string(&arg(args, 0))?);
    let position = vm.to_number(&arg(args, 1))?;
    let from = if position.is_nan() {
        usize::MAX
    } else {
        position.max(0.0) as usize
    };
    Ok(Value::Number(
        rfind_units(&s, &needle, from).map_or(-1.0, |i| i as f64),
    ))
}

fn slice(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    let s = units(&this_string(vm, this, "slice")?);
    let len = s.len() as f64;
    let start = relative_index(vm, &arg(args, 0), len, 0.0)? as usize;
    let end = relative_index(vm, &arg(args, 1), len, len)? as usize;
    Ok(from_units(if start < end { &s[start..end] } else { &[] }))
}

fn substring(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    let s = units(&this_string(vm, this, "substring")?);
    let len = s.len() as f64;
    let clamp = |n: f64| n.max(0.0).min(len) as usize;
    let start = clamp(vm.to_integer(&arg(args, 0))?);
    let end = match arg(args, 1) {
        Value::Undefined => s.len(),
        other => clamp(vm.to_integer(&other)?),
    };
    let (from, to) = if start <= end { (start, end) } else { (end, start) };
    Ok(from_units(&s[from..to]))
}

fn substr(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    let s = units(&this_string(vm, this, "substr")?);
    let len = s.len() as f64;
    let start = relative_index(vm, &arg(args, 0), len, 0.0)?;
    let count = match arg(args, 1) {
        Value::Undefined => len,
        other => vm.to_integer(&other)?.max(0.0),
    };
    let end = (start + count).min(len);
    Ok(from_units(if start < end {
        &s[start as usize..end as usize]
    } else {
        &[]
    }))
}

fn to_upper_case(vm: &mut VmSession, this: &Value, _args: &[Value]) -> Result<Value> {
    Ok(Value::String(this_string(vm, this, "toUpperCase")?.to_uppercase()))
}

fn to_lower_case(vm: &mut VmSession, this: &Value, _args: &[Value]) -> Result<Value> {
    Ok(Value::String(this_string(vm, this, "toLowerCase")?.to_lowercase()))
}

fn is_js_whitespace(c: char) -> bool {
    c.is_whitespace() || c == '\u{FEFF}'
}

fn trim(vm: &mut VmSession, this: &Value, _args: &[Value]) -> Result<Value> {
    let s = this_string(vm, this, "trim")?;
    Ok(Value::from(s.trim_matches(is_js_whitespace)))
}

fn trim_start(vm: &mut VmSession, this: &Value, _args: &[Value]) -> Result<Value> {
    let s = this_string(vm, this, "trimStart")?;
    Ok(Value::from(s.trim_start_matches(is_js_whitespace)))
}

fn trim_end(vm: &mut VmSession, this: &Value, _args: &[Value]) -> Result<Value> {
    let s = this_string(vm, this, "trimEnd")?;
    Ok(Value::from(s.trim_end_matches(is_js_whitespace)))
}

fn split(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    let s = this_string(vm, this, "split")?;
    let separator = arg(args, 0);
    let limit = match arg(args, 1) {
        Value::Undefined => u32::MAX,
        other => vm.to_uint32(&other)?,
    } as usize;

    let mut parts: Vec<Value> = Vec::new();
    if limit == 0 {
        return vm.create_array_from(parts);
    }
    if separator.is_undefined() {
        return vm.create_array_from(vec![Value::String(s)]);
    }

    if let Some(data) = regexp_data(vm, &separator)? {
        let mut last = 0;
        for caps in data.regex.captures_iter(&s) {
            let Some(m) = caps.get(0) else { continue };
            if m.start() == m.end() && (m.start() == last || m.start() == s.len()) {
                continue;
            }
            parts.push(Value::from(&s[last..m.start()]));
            parts.extend(capture_values(&caps).into_iter().skip(1));
            last = m.end();
        }
        parts.push(Value::from(&s[last..]));
    } else {
        let separator = vm.to_display_string(&separator)?;
        if separator.is_empty() {
            parts.extend(units(&s).chunks(1).map(from_units));
        } else {
            parts.extend(s.split(separator.as_str()).map(Value::from));
        }
    }
    parts.truncate(limit);
    vm.create_array_from(parts)
}

/// A match located by `replace`, in byte offsets.
struct Found {
    start: usize,
    end: usize,
    groups: Vec<Value>,
}

/// Expand `$$`, `$&`, `` $` ``, `$'` and `$n` in a replacement template.
fn expand_template(template: &str, input: &str, found: &Found) -> String {
    let chars: Vec<char> = template.chars().collect();
    let group_count = found.groups.len().saturating_sub(1);
    let group = |n: usize| match found.groups.get(n) {
        Some(Value::String(text)) => text.clone(),
        _ => String::new(),
    };
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c != '$' || i + 1 == chars.len() {
            out.push(c);
            i += 1;
            continue;
        }
        match chars[i + 1] {
            '$' => out.push('$'),
            '&' => out.push_str(&input[found.start..found.end]),
            '`' => out.push_str(&input[..found.start]),
            '\'' => out.push_str(&input[found.end..]),
            d if d.is_ascii_digit() => {
                let one = d.to_digit(10).unwrap_or(0) as usize;
                let two = chars
                    .get(i + 2)
                    .and_then(|c| c.to_digit(10))
                    .map(|e| one * 10 + e as usize);
                match two {
                    Some(n) if n >= 1 && n <= group_count => {
                        out.push_str(&group(n));
                        i += 3;
                        continue;
                    }
                    _ if one >= 1 && one <= group_count => out.push_str(&group(one)),
                    _ => {
                        out.push('$');
                        out.push(d);
                    }
                }
            }
            other => {
                out.push('$');
                out.push(other);
            }
        }
        i += 2;
    }
    out
}

fn replace(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    let s = this_string(vm, this, "replace")?;
    let pattern = arg(args, 0);
    let replacement = arg(args, 1);

    let matches: Vec<Found> = match regexp_data(vm, &pattern)? {
        Some(data) => {
            let global = data.flags.contains('g');
            if global {
                vm.set_member(&pattern, PropertyKey::from("lastIndex"), Value::Number(0.0))?;
            }
            regex_matches(&data, &s, global)
        }
        None => {
            let needle = vm.to_display_string(&pattern)?;
            s.find(needle.as_str())
                .map(|start| Found {
                    start,
                    end: start + needle.len(),
                    groups: vec![Value::String(needle.clone())],
                })
                .into_iter()
                .collect()
        }
    };

    let callable = vm.is_callable(&replacement);
    let template = if callable {
        String::new()
    } else {
        vm.to_display_string(&replacement)?
    };

    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for found in &matches {
        out.push_str(&s[last..found.start]);
        if callable {
            let mut call_args = found.groups.clone();
            call_args.push(Value::Number(byte_to_utf16(&s, found.start) as f64));
            call_args.push(Value::String(s.clone()));
            let produced = vm.call_value(&replacement, &Value::Undefined, &call_args)?;
            out.push_str(&vm.to_display_string(&produced)?);
        } else {
            out.push_str(&expand_template(&template, &s, found));
        }
        last = found.end;
    }
    out.push_str(&s[last..]);
    Ok(Value::String(out))
}

fn regex_matches(data: &RegExpData, s: &str, global: bool) -> Vec<Found> {
    let to_found = |caps: regex::Captures<'_>| {
        caps.get(0).map(|m| Found {
            start: m.start(),
            end: m.end(),
            groups: capture_values(&caps),
        })
    };
    if global {
        data.regex.captures_iter(s).filter_map(to_found).collect()
    } else {
        data.regex.captures(s).and_then(to_found).into_iter().collect()
    }
}

/// The RegExp in `value`, or a new one compiled from its string form.
fn coerce_regexp(vm: &mut VmSession, value: &Value) -> Result<(Value, RegExpData)> {
    if let Some(data) = regexp_data(vm, value)? {
        return Ok((value.clone(), data));
    }
    let source = match value {
        Value::Undefined => String::new(),
        other => vm.to_display_string(other)?,
    };
    let re = vm.create_regexp(&source, "")?;
    match regexp_data(vm, &re)? {
        Some(data) => Ok((re, data)),
        None => Err(type_error(vm, "RegExp expected")),
    }
}

fn match_(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    let s = this_string(vm, this, "match")?;
    let (re, data) = coerce_regexp(vm, &arg(args, 0))?;
    if !data.flags.contains('g') {
        return exec_on(vm, &re, &data, &s);
    }
    vm.set_member(&re, PropertyKey::from("lastIndex"), Value::Number(0.0))?;
    let all: Vec<Value> = data
        .regex
        .find_iter(&s)
        .map(|m| Value::from(m.as_str()))
        .collect();
    if all.is_empty() {
        return Ok(Value::Null);
    }
    vm.create_array_from(all)
}

fn search(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    let s = this_string(vm, this, "search")?;
    let (_, data) = coerce_regexp(vm, &arg(args, 0))?;
    Ok(Value::Number(
        data.regex
            .find(&s)
            .map_or(-1.0, |m| byte_to_utf16(&s, m.start()) as f64),
    ))
}

fn concat(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    let mut s = this_string(vm, this, "concat")?;
    for a in args {
        s.push_str(&vm.to_display_string(a)?);
    }
    Ok(Value::String(s))
}

fn starts_with(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    let s = units(&this_string(vm, this, "startsWith")?);
    let needle = units(&search_string(vm, &arg(args, 0), "startsWith")?);
    let pos = vm.to_integer(&arg(args, 1))?.max(0.0).min(s.len() as f64) as usize;
    Ok(Value::Boolean(s[pos..].starts_with(&needle)))
}

fn ends_with(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    let s = units(&this_string(vm, this, "endsWith")?);
    let needle = units(&search_string(vm, &arg(args, 0), "endsWith")?);
    let end = match arg(args, 1) {
        Value::Undefined => s.len(),
        other => vm.to_integer(&other)?.max(0.0).min(s.len() as f64) as usize,
    };
    Ok(Value::Boolean(s[..end].ends_with(&needle)))
}

fn includes(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    let s = units(&this_string(vm, this, "includes")?);
    let needle = units(&search_string(vm, &arg(args, 0), "includes")?);
    let from = vm.to_integer(&arg(args, 1))?.max(0.0) as usize;
    Ok(Value::Boolean(find_units(&s, &needle, from).is_some()))
}

/// Search argument of `startsWith` and friends; RegExps are rejected.
fn search_string(vm: &mut VmSession, value: &Value, what: &str) -> Result<String> {
    if value.is_regexp() {
        return Err(type_error(
            vm,
            format!(
                "First argument to String.prototype.{} must not be a regular expression",
                what
            ),
        ));
    }
    vm.to_display_string(value)
}

fn repeat(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    let s = this_string(vm, this, "repeat")?;
    let count = vm.to_integer(&arg(args, 0))?;
    if count < 0.0 || count.is_infinite() {
        return Err(vm.raise(ErrorKind::RangeError, format!("Invalid count value: {}", count)));
    }
    if s.is_empty() {
        return Ok(Value::String(s));
    }
    if s.len() as f64 * count > (1u64 << 30) as f64 {
        return Err(vm.raise(ErrorKind::RangeError, "Invalid string length"));
    }
    Ok(Value::String(s.repeat(count as usize)))
}

fn pad(vm: &mut VmSession, this: &Value, args: &[Value], at_start: bool) -> Result<Value> {
    let s = this_string(vm, this, if at_start { "padStart" } else { "padEnd" })?;
    let target = vm.to_integer(&arg(args, 0))?;
    let filler = match arg(args, 1) {
        Value::Undefined => vec![b' ' as u16],
        other => units(&vm.to_display_string(&other)?),
    };
    let current = units(&s);
    if target <= current.len() as f64 || filler.is_empty() {
        return Ok(Value::String(s));
    }
    if target > (1u64 << 30) as f64 {
        return Err(vm.raise(ErrorKind::RangeError, "Invalid string length"));
    }
    let fill_len = target as usize - current.len();
    let padding: Vec<u16> = filler.iter().copied().cycle().take(fill_len).collect();
    let joined = if at_start {
        [padding, current].concat()
    } else {
        [current, padding].concat()
    };
    Ok(from_units(&joined))
}

fn pad_start(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    pad(vm, this, args, true)
}

fn pad_end(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    pad(vm, this, args, false)
}

fn locale_compare(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    let s = this_string(vm, this, "localeCompare")?;
    let other = vm.to_display_string(&arg(args, 0))?;
    Ok(Value::Number(match s.cmp(&other) {
        std::cmp::Ordering::Less => -1.0,
        std::cmp::Ordering::Equal => 0.0,
        std::cmp::Ordering::Greater => 1.0,
    }))
}

fn value_of(vm: &mut VmSession, this: &Value, _args: &[Value]) -> Result<Value> {
    if let Value::String(_) = this {
        return Ok(this.clone());
    }
    if let Value::Object(obj) = this {
        let slot = vm.resolve(obj)?;
        if let ObjectKind::Boxed(inner @ Value::String(_)) = &vm.cell(slot)?.kind {
            return Ok(inner.clone());
        }
    }
    Err(type_error(
        vm,
        "String.prototype.valueOf requires that 'this' be a String",
    ))
}
