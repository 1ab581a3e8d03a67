//! `Array` constructor and `Array.prototype`.
//!
//! Methods are generic over array-likes: they read `length` and indices
//! through ordinary member access, so they also work on `arguments` and
//! plain objects with a `length`.

use super::{arg, constructor, method, relative_index, require_callable, to_object, type_error};
use crate::coerce::{same_value_zero, strict_equals};
use crate::error::Result;
use crate::exception::ErrorKind;
use crate::session::VmSession;
use crate::value::{PropertyKey, Value};

pub(super) fn install(vm: &mut VmSession) -> Result<()> {
    let proto = vm.intrinsics.array_prototype;
    let ctor = constructor(vm, "Array", 1, array_construct, array_construct, proto)?;
    method(vm, ctor, "isArray", 1, is_array)?;

    let methods: [(&str, u32, crate::bridge::BuiltinFn); 23] = [
        ("push", 1, push),
        ("pop", 0, pop),
        ("shift", 0, shift),
        ("unshift", 1, unshift),
        ("join", 1, join),
        ("toString", 0, to_string),
        ("indexOf", 1, index_of),
        ("lastIndexOf", 1, last_index_of),
        ("includes", 1, includes),
        ("slice", 2, slice),
        ("splice", 2, splice),
        ("concat", 1, concat),
        ("reverse", 0, reverse),
        ("sort", 1, sort),
        ("forEach", 1, for_each),
        ("map", 1, map),
        ("filter", 1, filter),
        ("some", 1, some),
        ("every", 1, every),
        ("reduce", 1, reduce),
        ("reduceRight", 1, reduce_right),
        ("find", 1, find),
        ("findIndex", 1, find_index),
    ];
    for (name, arity, func) in methods {
        method(vm, proto, name, arity, func)?;
    }
    Ok(())
}

fn array_construct(vm: &mut VmSession, _this: &Value, args: &[Value]) -> Result<Value> {
    match args {
        [Value::Number(n)] => {
            let length = *n as u32;
            if length as f64 != *n {
                return Err(vm.raise(ErrorKind::RangeError, "Invalid array length"));
            }
            vm.create_array(length)
        }
        _ => vm.create_array_from(args.to_vec()),
    }
}

fn is_array(_vm: &mut VmSession, _this: &Value, args: &[Value]) -> Result<Value> {
    Ok(Value::Boolean(arg(args, 0).is_array()))
}

fn get(vm: &mut VmSession, obj: &Value, index: u32) -> Result<Value> {
    vm.get_member(obj, &PropertyKey::from(index))
}

fn put(vm: &mut VmSession, obj: &Value, index: u32, value: Value) -> Result<()> {
    vm.set_member(obj, PropertyKey::from(index), value)
}

fn has(vm: &mut VmSession, obj: &Value, index: u32) -> Result<bool> {
    let slot = vm.object_slot(obj, "query element")?;
    Ok(vm.find_property(slot, &PropertyKey::from(index))?.is_some())
}

fn remove(vm: &mut VmSession, obj: &Value, index: u32) -> Result<()> {
    let slot = vm.object_slot(obj, "delete element")?;
    vm.remove_own(slot, &PropertyKey::from(index)).map(|_| ())
}

fn set_length(vm: &mut VmSession, obj: &Value, length: u32) -> Result<()> {
    vm.set_member(obj, PropertyKey::from("length"), Value::Number(length as f64))
}

fn push(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    let obj = to_object(vm, this, "Array.prototype.push")?;
    let mut len = vm.length_of(&obj)?;
    for item in args {
        put(vm, &obj, len, item.clone())?;
        len += 1;
    }
    set_length(vm, &obj, len)?;
    Ok(Value::Number(len as f64))
}

fn pop(vm: &mut VmSession, this: &Value, _args: &[Value]) -> Result<Value> {
    let obj = to_object(vm, this, "Array.prototype.pop")?;
    let len = vm.length_of(&obj)?;
    if len == 0 {
        set_length(vm, &obj, 0)?;
        return Ok(Value::Undefined);
    }
    let last = get(vm, &obj, len - 1)?;
    remove(vm, &obj, len - 1)?;
    set_length(vm, &obj, len - 1)?;
    Ok(last)
}

fn shift(vm: &mut VmSession, this: &Value, _args: &[Value]) -> Result<Value> {
    let obj = to_object(vm, this, "Array.prototype.shift")?;
    let len = vm.length_of(&obj)?;
    if len == 0 {
        set_length(vm, &obj, 0)?;
        return Ok(Value::Undefined);
    }
    let first = get(vm, &obj, 0)?;
    for k in 1..len {
        if has(vm, &obj, k)? {
            let v = get(vm, &obj, k)?;
            put(vm, &obj, k - 1, v)?;
        } else {
            remove(vm, &obj, k - 1)?;
        }
    }
    remove(vm, &obj, len - 1)?;
    set_length(vm, &obj, len - 1)?;
    Ok(first)
}

fn unshift(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    let obj = to_object(vm, this, "Array.prototype.unshift")?;
    let len = vm.length_of(&obj)?;
    let count = args.len() as u32;
    for k in (0..len).rev() {
        if has(vm, &obj, k)? {
            let v = get(vm, &obj, k)?;
            put(vm, &obj, k + count, v)?;
        } else {
            remove(vm, &obj, k + count)?;
        }
    }
    for (i, item) in args.iter().enumerate() {
        put(vm, &obj, i as u32, item.clone())?;
    }
    set_length(vm, &obj, len + count)?;
    Ok(Value::Number((len + count) as f64))
}

fn join(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    let obj = to_object(vm, this, "Array.prototype.join")?;
    let separator = match arg(args, 0) {
        Value::Undefined => ",".to_string(),
        other => vm.to_display_string(&other)?,
    };
    let len = vm.length_of(&obj)?;
    let mut out = String::new();
    for k in 0..len {
        if k > 0 {
            out.push_str(&separator);
        }
        let item = get(vm, &obj, k)?;
        if !item.is_nullish() {
            out.push_str(&vm.to_display_string(&item)?);
        }
    }
    Ok(Value::String(out))
}

fn to_string(vm: &mut VmSession, this: &Value, _args: &[Value]) -> Result<Value> {
    join(vm, this, &[])
}

fn index_of(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    let obj = to_object(vm, this, "Array.prototype.indexOf")?;
    let len = vm.length_of(&obj)?;
    let target = arg(args, 0);
    let start = relative_index(vm, &arg(args, 1), len as f64, 0.0)? as u32;
    for k in start..len {
        if has(vm, &obj, k)? && strict_equals(&get(vm, &obj, k)?, &target) {
            return Ok(Value::Number(k as f64));
        }
    }
    Ok(Value::Number(-1.0))
}

fn last_index_of(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    let obj = to_object(vm, this, "Array.prototype.lastIndexOf")?;
    let len = vm.length_of(&obj)?;
    if len == 0 {
        return Ok(Value::Number(-1.0));
    }
    let target = arg(args, 0);
    let from = match args.get(1) {
        Some(v) => {
            let n = vm.to_integer(v)?;
            if n < 0.0 {
                len as f64 + n
            } else {
                n.min(len as f64 - 1.0)
            }
        }
        None => len as f64 - 1.0,
    };
    if from < 0.0 {
        return Ok(Value::Number(-1.0));
    }
    for k in (0..=from as u32).rev() {
        if has(vm, &obj, k)? && strict_equals(&get(vm, &obj, k)?, &target) {
            return Ok(Value::Number(k as f64));
        }
    }
    Ok(Value::Number(-1.0))
}

fn includes(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    let obj = to_object(vm, this, "Array.prototype.includes")?;
    let len = vm.length_of(&obj)?;
    let target = arg(args, 0);
    let start = relative_index(vm, &arg(args, 1), len as f64, 0.0)? as u32;
    for k in start..len {
        if same_value_zero(&get(vm, &obj, k)?, &target) {
            return Ok(Value::Boolean(true));
        }
    }
    Ok(Value::Boolean(false))
}

fn slice(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    let obj = to_object(vm, this, "Array.prototype.slice")?;
    let len = vm.length_of(&obj)? as f64;
    let start = relative_index(vm, &arg(args, 0), len, 0.0)? as u32;
    let end = relative_index(vm, &arg(args, 1), len, len)? as u32;
    let result = vm.create_array(0)?;
    let mut n = 0;
    for k in start..end.max(start) {
        if has(vm, &obj, k)? {
            let v = get(vm, &obj, k)?;
            put(vm, &result, n, v)?;
        }
        n += 1;
    }
    set_length(vm, &result, n)?;
    Ok(result)
}

fn splice(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    let obj = to_object(vm, this, "Array.prototype.splice")?;
    let len = vm.length_of(&obj)?;
    let start = relative_index(vm, &arg(args, 0), len as f64, 0.0)? as u32;
    let delete_count = match args.len() {
        0 => 0,
        1 => len - start,
        _ => {
            let n = vm.to_integer(&args[1])?;
            n.max(0.0).min((len - start) as f64) as u32
        }
    };
    let items = args.get(2..).unwrap_or(&[]);
    let item_count = items.len() as u32;

    let removed = vm.create_array(0)?;
    for i in 0..delete_count {
        if has(vm, &obj, start + i)? {
            let v = get(vm, &obj, start + i)?;
            put(vm, &removed, i, v)?;
        }
    }
    set_length(vm, &removed, delete_count)?;

    if item_count < delete_count {
        for k in start..len - delete_count {
            let (from, to) = (k + delete_count, k + item_count);
            if has(vm, &obj, from)? {
                let v = get(vm, &obj, from)?;
                put(vm, &obj, to, v)?;
            } else {
                remove(vm, &obj, to)?;
            }
        }
        for k in (len - delete_count + item_count..len).rev() {
            remove(vm, &obj, k)?;
        }
    } else if item_count > delete_count {
        for k in (start..len - delete_count).rev() {
            let (from, to) = (k + delete_count, k + item_count);
            if has(vm, &obj, from)? {
                let v = get(vm, &obj, from)?;
                put(vm, &obj, to, v)?;
            } else {
                remove(vm, &obj, to)?;
            }
        }
    }
    for (i, item) in items.iter().enumerate() {
        put(vm, &obj, start + i as u32, item.clone())?;
    }
    set_length(vm, &obj, len - delete_count + item_count)?;
    Ok(removed)
}

fn concat(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    let obj = to_object(vm, this, "Array.prototype.concat")?;
    let result = vm.create_array(0)?;
    let mut n = 0u32;
    let mut sources = Vec::with_capacity(args.len() + 1);
    sources.push(obj);
    sources.extend(args.iter().cloned());
    for source in sources {
        if source.is_array() {
            let len = vm.length_of(&source)?;
            for k in 0..len {
                if has(vm, &source, k)? {
                    let v = get(vm, &source, k)?;
                    put(vm, &result, n, v)?;
                }
                n += 1;
            }
        } else {
            put(vm, &result, n, source)?;
            n += 1;
        }
    }
    set_length(vm, &result, n)?;
    Ok(result)
}

fn reverse(vm: &mut VmSession, this: &Value, _args: &[Value]) -> Result<Value> {
    let obj = to_object(vm, this, "Array.prototype.reverse")?;
    let len = vm.length_of(&obj)?;
    let (mut lower, mut upper) = (0u32, len.saturating_sub(1));
    while lower < upper {
        let lower_exists = has(vm, &obj, lower)?;
        let upper_exists = has(vm, &obj, upper)?;
        let lower_value = get(vm, &obj, lower)?;
        let upper_value = get(vm, &obj, upper)?;
        if upper_exists {
            put(vm, &obj, lower, upper_value)?;
        } else {
            remove(vm, &obj, lower)?;
        }
        if lower_exists {
            put(vm, &obj, upper, lower_value)?;
        } else {
            remove(vm, &obj, upper)?;
        }
        lower += 1;
        upper -= 1;
    }
    Ok(obj)
}

fn sort(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    let obj = to_object(vm, this, "Array.prototype.sort")?;
    let comparator = arg(args, 0);
    if !comparator.is_undefined() {
        require_callable(vm, &comparator)?;
    }
    let len = vm.length_of(&obj)?;
    let mut values = Vec::new();
    let mut undefined_count = 0u32;
    for k in 0..len {
        if has(vm, &obj, k)? {
            match get(vm, &obj, k)? {
                Value::Undefined => undefined_count += 1,
                v => values.push(v),
            }
        }
    }
    let present = values.len() as u32;
    let sorted = merge_sort(vm, values, &comparator)?;
    for (i, v) in sorted.into_iter().enumerate() {
        put(vm, &obj, i as u32, v)?;
    }
    for k in present..present + undefined_count {
        put(vm, &obj, k, Value::Undefined)?;
    }
    for k in present + undefined_count..len {
        remove(vm, &obj, k)?;
    }
    Ok(obj)
}

/// Stable merge sort with a comparator that may call into the guest.
fn merge_sort(vm: &mut VmSession, mut values: Vec<Value>, comparator: &Value) -> Result<Vec<Value>> {
    if values.len() <= 1 {
        return Ok(values);
    }
    let right = values.split_off(values.len() / 2);
    let left = merge_sort(vm, values, comparator)?;
    let right = merge_sort(vm, right, comparator)?;
    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    while let (Some(a), Some(b)) = (left.peek(), right.peek()) {
        let order = compare(vm, a, b, comparator)?;
        let next = if order > 0.0 { right.next() } else { left.next() };
        merged.extend(next);
    }
    merged.extend(left);
    merged.extend(right);
    Ok(merged)
}

fn compare(vm: &mut VmSession, a: &Value, b: &Value, comparator: &Value) -> Result<f64> {
    if comparator.is_undefined() {
        let a = vm.to_display_string(a)?;
        let b = vm.to_display_string(b)?;
        let a: Vec<u16> = a.encode_utf16().collect();
        let b: Vec<u16> = b.encode_utf16().collect();
        return Ok(match a.cmp(&b) {
            std::cmp::Ordering::Less => -1.0,
            std::cmp::Ordering::Equal => 0.0,
            std::cmp::Ordering::Greater => 1.0,
        });
    }
    let result = vm.call_value(comparator, &Value::Undefined, &[a.clone(), b.clone()])?;
    let n = vm.to_number(&result)?;
    Ok(if n.is_nan() { 0.0 } else { n })
}

/// Shared driver of the callback iteration methods.
fn each(
    vm: &mut VmSession,
    this: &Value,
    args: &[Value],
    name: &str,
    mut visit: impl FnMut(&mut VmSession, u32, Value, Value) -> Result<bool>,
) -> Result<()> {
    let obj = to_object(vm, this, name)?;
    let len = vm.length_of(&obj)?;
    let callback = arg(args, 0);
    require_callable(vm, &callback)?;
    let this_arg = arg(args, 1);
    for k in 0..len {
        if !has(vm, &obj, k)? {
            continue;
        }
        let value = get(vm, &obj, k)?;
        let result = vm.call_value(
            &callback,
            &this_arg,
            &[value.clone(), Value::Number(k as f64), obj.clone()],
        )?;
        if !visit(vm, k, value, result)? {
            break;
        }
    }
    Ok(())
}

fn for_each(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    each(vm, this, args, "Array.prototype.forEach", |_, _, _, _| Ok(true))?;
    Ok(Value::Undefined)
}

fn map(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    let len = {
        let obj = to_object(vm, this, "Array.prototype.map")?;
        vm.length_of(&obj)?
    };
    let result = vm.create_array(len)?;
    let target = result.clone();
    each(vm, this, args, "Array.prototype.map", |vm, k, _, mapped| {
        put(vm, &target, k, mapped)?;
        Ok(true)
    })?;
    Ok(result)
}

fn filter(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    let result = vm.create_array(0)?;
    let target = result.clone();
    let mut n = 0;
    each(vm, this, args, "Array.prototype.filter", |vm, _, value, keep| {
        if keep.to_boolean() {
            put(vm, &target, n, value)?;
            n += 1;
        }
        Ok(true)
    })?;
    Ok(result)
}

fn some(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    let mut found = false;
    each(vm, this, args, "Array.prototype.some", |_, _, _, hit| {
        found = hit.to_boolean();
        Ok(!found)
    })?;
    Ok(Value::Boolean(found))
}

fn every(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    let mut all = true;
    each(vm, this, args, "Array.prototype.every", |_, _, _, ok| {
        all = ok.to_boolean();
        Ok(all)
    })?;
    Ok(Value::Boolean(all))
}

fn find(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    let mut found = Value::Undefined;
    each(vm, this, args, "Array.prototype.find", |_, _, value, hit| {
        if hit.to_boolean() {
            found = value;
            return Ok(false);
        }
        Ok(true)
    })?;
    Ok(found)
}

fn find_index(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    let mut found = -1.0;
    each(vm, this, args, "Array.prototype.findIndex", |_, k, _, hit| {
        if hit.to_boolean() {
            found = k as f64;
            return Ok(false);
        }
        Ok(true)
    })?;
    Ok(Value::Number(found))
}

fn fold(vm: &mut VmSession, this: &Value, args: &[Value], name: &str, backwards: bool) -> Result<Value> {
    let obj = to_object(vm, this, name)?;
    let len = vm.length_of(&obj)?;
    let callback = arg(args, 0);
    require_callable(vm, &callback)?;
    let order: Vec<u32> = if backwards {
        (0..len).rev().collect()
    } else {
        (0..len).collect()
    };
    let mut keys = order.into_iter();
    let mut accumulator = match args.get(1) {
        Some(initial) => initial.clone(),
        None => loop {
            match keys.next() {
                Some(k) if has(vm, &obj, k)? => break get(vm, &obj, k)?,
                Some(_) => continue,
                None => {
                    return Err(type_error(vm, "Reduce of empty array with no initial value"));
                }
            }
        },
    };
    for k in keys {
        if !has(vm, &obj, k)? {
            continue;
        }
        let value = get(vm, &obj, k)?;
        accumulator = vm.call_value(
            &callback,
            &Value::Undefined,
            &[accumulator, value, Value::Number(k as f64), obj.clone()],
        )?;
    }
    Ok(accumulator)
}

fn reduce(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    fold(vm, this, args, "Array.prototype.reduce", false)
}

fn reduce_right(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    fold(vm, this, args, "Array.prototype.reduceRight", true)
}

#[cfg(test)]
mod tests {
    use crate::{Value, VmSession};

    fn eval(source: &str) -> Value {
        let mut vm = VmSession::new().unwrap();
        vm.eval(source).unwrap()
    }

    #[test]
    fn push_pop_shift() {
        assert_eq!(
            eval("var a = [1, 2]; a.push(3, 4); a.shift(); a.pop(); a.join('-')"),
            Value::from("2-3")
        );
    }

    #[test]
    fn splice_removes_and_inserts() {
        assert_eq!(
            eval("var a = [1, 2, 3, 4, 5]; var r = a.splice(1, 2, 'x'); a.join() + '|' + r.join()"),
            Value::from("1,x,4,5|2,3")
        );
    }

    #[test]
    fn sort_with_comparator_and_default_order() {
        assert_eq!(
            eval("[10, 9, 1, 100].sort().join() + '|' + [10, 9, 1, 100].sort(function (a, b) { return a - b; }).join()"),
            Value::from("1,10,100,9|1,9,10,100")
        );
    }

    #[test]
    fn callbacks_honour_this_arg() {
        assert_eq!(
            eval(
                "var seen = 0; var ctx = {k: 2};\n\
                 [1, 2, 3].forEach(function (v) { seen += v * this.k; }, ctx);\n\
                 var big = [1, 2, 3].filter(function (v) { return v > this.k; }, ctx);\n\
                 seen + big.length + ([1, 2].some(function (v) { return v === this.k; }, ctx) ? 100 : 0)"
            ),
            Value::from(113)
        );
    }

    #[test]
    fn reduce_without_initial_value_on_empty_array_throws() {
        assert_eq!(
            eval("try { [].reduce(function (a, b) { return a + b; }); } catch (e) { e.name }"),
            Value::from("TypeError")
        );
        assert_eq!(eval("[1, 2, 3].reduce(function (a, b) { return a + b; })"), Value::from(6));
    }

    #[test]
    fn holes_are_skipped_by_callbacks() {
        assert_eq!(
            eval("var a = []; a[3] = 1; var n = 0; a.forEach(function () { n++; }); n + ':' + a.length"),
            Value::from("1:4")
        );
    }
}
