//! `Object` constructor and `Object.prototype`.

use super::{arg, constructor, method, require_object, type_error};
use crate::error::Result;
use crate::object::ObjectKind;
use crate::session::VmSession;
use crate::value::{PropertyKey, Value};

pub(super) fn install(vm: &mut VmSession) -> Result<()> {
    let proto = vm.intrinsics.object_prototype;
    let ctor = constructor(vm, "Object", 1, object_call, object_construct, proto)?;
    method(vm, ctor, "keys", 1, keys)?;
    method(vm, ctor, "getOwnPropertyNames", 1, own_property_names)?;
    method(vm, ctor, "getPrototypeOf", 1, get_prototype_of)?;
    method(vm, ctor, "setPrototypeOf", 2, set_prototype_of)?;
    method(vm, ctor, "create", 2, create)?;

    method(vm, proto, "hasOwnProperty", 1, has_own_property)?;
    method(vm, proto, "isPrototypeOf", 1, is_prototype_of)?;
    method(vm, proto, "propertyIsEnumerable", 1, property_is_enumerable)?;
    method(vm, proto, "toString", 0, to_string)?;
    method(vm, proto, "toLocaleString", 0, to_string)?;
    method(vm, proto, "valueOf", 0, value_of)?;
    Ok(())
}

/// Wrap a primitive in its object form.
pub(crate) fn box_primitive(vm: &mut VmSession, value: Value) -> Result<Value> {
    let proto = match &value {
        Value::String(_) => vm.intrinsics.string_prototype,
        Value::Number(_) => vm.intrinsics.number_prototype,
        Value::Boolean(_) => vm.intrinsics.boolean_prototype,
        _ => vm.intrinsics.object_prototype,
    };
    vm.alloc_value(ObjectKind::Boxed(value), Some(proto))
}

fn object_call(vm: &mut VmSession, _this: &Value, args: &[Value]) -> Result<Value> {
    object_construct(vm, &Value::Undefined, args)
}

fn object_construct(vm: &mut VmSession, _this: &Value, args: &[Value]) -> Result<Value> {
    match arg(args, 0) {
        Value::Undefined | Value::Null => vm.create_object(),
        value @ Value::Object(_) => Ok(value),
        primitive => box_primitive(vm, primitive),
    }
}

fn key_values(vm: &mut VmSession, keys: Vec<PropertyKey>) -> Result<Value> {
    let items = keys.into_iter().map(|k| Value::String(k.to_string())).collect();
    vm.create_array_from(items)
}

fn keys(vm: &mut VmSession, _this: &Value, args: &[Value]) -> Result<Value> {
    let slot = require_object(vm, &arg(args, 0), "Object.keys")?;
    let keys = vm.cell(slot)?.own_keys(true);
    key_values(vm, keys)
}

fn own_property_names(vm: &mut VmSession, _this: &Value, args: &[Value]) -> Result<Value> {
    let slot = require_object(vm, &arg(args, 0), "Object.getOwnPropertyNames")?;
    let keys = vm.cell(slot)?.own_keys(false);
    key_values(vm, keys)
}

fn get_prototype_of(vm: &mut VmSession, _this: &Value, args: &[Value]) -> Result<Value> {
    let target = arg(args, 0);
    require_object(vm, &target, "Object.getPrototypeOf")?;
    vm.get_prototype(&target)
}

fn set_prototype_of(vm: &mut VmSession, _this: &Value, args: &[Value]) -> Result<Value> {
    let target = arg(args, 0);
    let proto = arg(args, 1);
    if !proto.is_object() && !proto.is_null() {
        return Err(type_error(vm, "Object prototype may only be an Object or null"));
    }
    if target.is_object() {
        vm.set_prototype(&target, &proto)?;
    }
    Ok(target)
}

fn create(vm: &mut VmSession, _this: &Value, args: &[Value]) -> Result<Value> {
    let proto = match arg(args, 0) {
        Value::Null => None,
        Value::Object(obj) => Some(vm.resolve(&obj)?),
        _ => return Err(type_error(vm, "Object prototype may only be an Object or null")),
    };
    let slot = vm.alloc(ObjectKind::Ordinary, proto)?;
    let result = vm.handle(slot)?;

    // Only the `value` and `enumerable` fields of descriptors are honoured.
    if let Value::Object(props) = arg(args, 1) {
        let props = Value::Object(props);
        let props_slot = vm.object_slot(&props, "read descriptors")?;
        for key in vm.cell(props_slot)?.own_keys(true) {
            let descriptor = vm.get_member(&props, &key)?;
            if !descriptor.is_object() {
                return Err(type_error(vm, "Property description must be an object"));
            }
            let value = vm.get_member(&descriptor, &PropertyKey::from("value"))?;
            let enumerable = vm
                .get_member(&descriptor, &PropertyKey::from("enumerable"))?
                .to_boolean();
            vm.define_own(slot, key, value, enumerable)?;
        }
    }
    Ok(result)
}

fn has_own_property(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    let key = vm.to_property_key(&arg(args, 0))?;
    Ok(Value::Boolean(match this {
        Value::Object(obj) => {
            let slot = vm.resolve(obj)?;
            vm.cell(slot)?.has_own(&key)
        }
        Value::String(s) => crate::store::string_own(s, &key).is_some(),
        Value::Undefined | Value::Null => {
            return Err(type_error(vm, "Cannot convert undefined or null to object"))
        }
        _ => false,
    }))
}

fn is_prototype_of(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    let (Value::Object(candidate), Value::Object(proto)) = (arg(args, 0), this) else {
        return Ok(Value::Boolean(false));
    };
    let start = vm.resolve(&candidate)?;
    let target = vm.resolve(proto)?;
    Ok(Value::Boolean(vm.chain_contains(start, target)?))
}

fn property_is_enumerable(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    let key = vm.to_property_key(&arg(args, 0))?;
    let Value::Object(obj) = this else {
        return Ok(Value::Boolean(false));
    };
    let slot = vm.resolve(obj)?;
    let cell = vm.cell(slot)?;
    let enumerable = match cell.properties.get(&key) {
        Some(property) => property.enumerable,
        None => key.as_index().is_some() && cell.has_own(&key),
    };
    Ok(Value::Boolean(enumerable))
}

fn to_string(vm: &mut VmSession, this: &Value, _args: &[Value]) -> Result<Value> {
    let class = match this {
        Value::Undefined => "Undefined",
        Value::Null => "Null",
        Value::Boolean(_) => "Boolean",
        Value::Number(_) => "Number",
        Value::String(_) => "String",
        Value::Object(obj) => {
            let slot = vm.resolve(obj)?;
            vm.cell(slot)?.kind.class_name()
        }
    };
    Ok(Value::String(format!("[object {}]", class)))
}

fn value_of(vm: &mut VmSession, this: &Value, _args: &[Value]) -> Result<Value> {
    super::to_object(vm, this, "Object.prototype.valueOf")
}

#[cfg(test)]
mod tests {
    use crate::{Value, VmSession};

    #[test]
    fn keys_skip_builtin_members() {
        let mut vm = VmSession::new().unwrap();
        let result = vm
            .eval("var o = {b: 1, a: 2}; o[0] = 3; Object.keys(o).join(',')")
            .unwrap();
        assert_eq!(result, Value::from("0,b,a"));
    }

    #[test]
    fn object_create_links_prototype() {
        let mut vm = VmSession::new().unwrap();
        let result = vm
            .eval("var p = {x: 1}; var c = Object.create(p); c.x + (Object.getPrototypeOf(c) === p ? 10 : 0)")
            .unwrap();
        assert_eq!(result, Value::from(11));
    }

    #[test]
    fn to_string_reports_class() {
        let mut vm = VmSession::new().unwrap();
        let result = vm
            .eval("Object.prototype.toString.call([]) + Object.prototype.toString.call(null)")
            .unwrap();
        assert_eq!(result, Value::from("[object Array][object Null]"));
    }
}
