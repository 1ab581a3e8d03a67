//! Property and prototype store.
//!
//! Keyed access on object-like values, array element semantics and the
//! prototype link. Chain walks are iterative and bounded by
//! [`SessionConfig::max_prototype_depth`](crate::SessionConfig).

use hashbrown::HashSet;

use crate::error::{Result, VmError};
use crate::exception::ErrorKind;
use crate::object::{FunctionKind, ObjectCell, ObjectKind, MAX_DENSE_GAP};
use crate::session::VmSession;
use crate::value::{PropertyKey, Tag, Value};

/// Guest accessor for the prototype link.
const PROTO_KEY: &str = "__proto__";

impl VmSession {
    /// Read a property, falling through the prototype chain.
    ///
    /// A missing key is `Undefined`, never an error.
    pub fn get_property(&self, obj: &Value, key: impl Into<PropertyKey>) -> Result<Value> {
        let slot = self.object_slot(obj, "read property")?;
        self.get_slot_property(slot, &key.into())
    }

    /// Create or overwrite an own property.
    ///
    /// On arrays an index at or past `length` grows it; writing `length`
    /// truncates or extends.
    pub fn set_property(
        &mut self,
        obj: &Value,
        key: impl Into<PropertyKey>,
        value: impl Into<Value>,
    ) -> Result<()> {
        let slot = self.object_slot(obj, "write property")?;
        let value = value.into();
        self.check_value(&value)?;
        self.put(slot, key.into(), value)
    }

    /// Remove an own property. Absent keys are not an error.
    ///
    /// Returns false only for keys that cannot be removed, such as an
    /// array's `length`.
    pub fn delete_property(&mut self, obj: &Value, key: impl Into<PropertyKey>) -> Result<bool> {
        let slot = self.object_slot(obj, "delete property")?;
        self.remove_own(slot, &key.into())
    }

    /// Whether the key exists on the value or its prototype chain.
    pub fn has_property(&self, obj: &Value, key: impl Into<PropertyKey>) -> Result<bool> {
        let slot = self.object_slot(obj, "query property")?;
        Ok(self.find_property(slot, &key.into())?.is_some())
    }

    /// Own enumerable keys: indices ascending, then names in insertion order.
    pub fn own_keys(&self, obj: &Value) -> Result<Vec<PropertyKey>> {
        let slot = self.object_slot(obj, "list keys")?;
        Ok(self.cell(slot)?.own_keys(true))
    }

    /// The prototype link, or `Null`.
    pub fn get_prototype(&self, obj: &Value) -> Result<Value> {
        let slot = self.object_slot(obj, "read prototype")?;
        match self.cell(slot)?.prototype {
            Some(proto) => self.handle(proto),
            None => Ok(Value::Null),
        }
    }

    /// Replace the prototype link with an object-like value or `Null`.
    ///
    /// A link that would close a cycle fails with `CyclicPrototype` and
    /// leaves the old link in place.
    pub fn set_prototype(&mut self, obj: &Value, proto: &Value) -> Result<()> {
        let slot = self.object_slot(obj, "set prototype")?;
        let proto = match proto {
            Value::Null => None,
            Value::Object(p) => Some(self.resolve(p)?),
            other => {
                return Err(VmError::InvalidOperand {
                    operation: "use as prototype",
                    found: other.tag(),
                })
            }
        };
        self.link_prototype(slot, proto)
    }

    pub(crate) fn link_prototype(&mut self, slot: u32, proto: Option<u32>) -> Result<()> {
        let limit = self.config().max_prototype_depth;
        let mut current = proto;
        let mut depth = 0;
        while let Some(ancestor) = current {
            if ancestor == slot {
                return Err(VmError::CyclicPrototype);
            }
            depth += 1;
            if depth >= limit {
                return Err(VmError::InvalidOperand {
                    operation: "extend prototype chain past the depth limit",
                    found: Tag::Object,
                });
            }
            current = self.cell(ancestor)?.prototype;
        }
        log::trace!("[sable] prototype of #{} set to {:?}", slot, proto);
        self.cell_mut(slot)?.prototype = proto;
        Ok(())
    }

    /// Value found for `key` on the cell or an ancestor.
    pub(crate) fn find_property(&self, slot: u32, key: &PropertyKey) -> Result<Option<Value>> {
        let limit = self.config().max_prototype_depth;
        let mut current = slot;
        for _ in 0..=limit {
            let cell = self.cell(current)?;
            if let Some(value) = cell.own(key) {
                return Ok(Some(value));
            }
            match cell.prototype {
                Some(proto) => current = proto,
                None => return Ok(None),
            }
        }
        Err(VmError::InvalidOperand {
            operation: "walk prototype chain past the depth limit",
            found: Tag::Object,
        })
    }

    pub(crate) fn get_slot_property(&self, slot: u32, key: &PropertyKey) -> Result<Value> {
        Ok(self.find_property(slot, key)?.unwrap_or(Value::Undefined))
    }

    /// Whether `target` is an ancestor of `start`.
    pub(crate) fn chain_contains(&self, start: u32, target: u32) -> Result<bool> {
        let limit = self.config().max_prototype_depth;
        let mut current = self.cell(start)?.prototype;
        let mut depth = 0;
        while let Some(ancestor) = current {
            if ancestor == target {
                return Ok(true);
            }
            depth += 1;
            if depth > limit {
                break;
            }
            current = self.cell(ancestor)?.prototype;
        }
        Ok(false)
    }

    /// Ordinary write: enumerable, array-aware.
    pub(crate) fn put(&mut self, slot: u32, key: PropertyKey, value: Value) -> Result<()> {
        if matches!(self.cell(slot)?.kind, ObjectKind::Array(_)) {
            match &key {
                PropertyKey::Index(index) => return self.put_element(slot, *index, value),
                PropertyKey::Name(name) if name == "length" => {
                    return self.set_array_length(slot, &value)
                }
                _ => {}
            }
        }
        self.cell_mut(slot)?.properties.set(key, value, true);
        Ok(())
    }

    /// Write with an explicit enumerable bit. Used for built-in members.
    pub(crate) fn define_own(
        &mut self,
        slot: u32,
        key: PropertyKey,
        value: Value,
        enumerable: bool,
    ) -> Result<()> {
        if matches!(self.cell(slot)?.kind, ObjectKind::Array(_))
            && (key.as_index().is_some() || key.is_name("length"))
        {
            return self.put(slot, key, value);
        }
        self.cell_mut(slot)?.properties.define(key, value, enumerable);
        Ok(())
    }

    fn put_element(&mut self, slot: u32, index: u32, value: Value) -> Result<()> {
        let ObjectCell {
            kind, properties, ..
        } = self.cell_mut(slot)?;
        let ObjectKind::Array(storage) = kind else {
            properties.set(PropertyKey::Index(index), value, true);
            return Ok(());
        };
        let dense_len = storage.dense.len() as u32;
        if index < dense_len || index - dense_len <= MAX_DENSE_GAP {
            if index >= dense_len {
                storage.dense.resize(index as usize + 1, None);
            }
            storage.dense[index as usize] = Some(value);
            if !properties.is_empty() {
                properties.remove(&PropertyKey::Index(index));
            }
        } else {
            properties.set(PropertyKey::Index(index), value, true);
        }
        if index >= storage.length {
            storage.length = index + 1;
        }
        Ok(())
    }

    fn set_array_length(&mut self, slot: u32, value: &Value) -> Result<()> {
        let requested = self.to_number(value)?;
        let length = requested as u32;
        if length as f64 != requested {
            return Err(self.raise(ErrorKind::RangeError, "Invalid array length"));
        }
        let ObjectCell {
            kind, properties, ..
        } = self.cell_mut(slot)?;
        if let ObjectKind::Array(storage) = kind {
            if length < storage.length {
                storage.dense.truncate(length as usize);
                properties.truncate_indices(length);
            }
            storage.length = length;
        }
        Ok(())
    }

    pub(crate) fn remove_own(&mut self, slot: u32, key: &PropertyKey) -> Result<bool> {
        let ObjectCell {
            kind, properties, ..
        } = self.cell_mut(slot)?;
        if let ObjectKind::Array(storage) = kind {
            match key {
                PropertyKey::Index(index) => {
                    if let Some(element) = storage.dense.get_mut(*index as usize) {
                        *element = None;
                    }
                }
                PropertyKey::Name(name) if name == "length" => return Ok(false),
                _ => {}
            }
        }
        properties.remove(key);
        Ok(true)
    }

    /// Keys visited by `for-in`: enumerable keys along the chain, each once.
    pub(crate) fn enumerable_keys(&self, slot: u32) -> Result<Vec<PropertyKey>> {
        let limit = self.config().max_prototype_depth;
        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        let mut current = Some(slot);
        let mut depth = 0;
        while let Some(s) = current {
            let cell = self.cell(s)?;
            for key in cell.own_keys(false) {
                if !seen.insert(key.clone()) {
                    continue;
                }
                let enumerable = match (&cell.kind, &key) {
                    (ObjectKind::Array(_), PropertyKey::Index(i)) => cell
                        .properties
                        .get(&key)
                        .map_or_else(|| cell.own(&PropertyKey::Index(*i)).is_some(), |p| p.enumerable),
                    _ => cell.properties.get(&key).is_some_and(|p| p.enumerable),
                };
                if enumerable {
                    keys.push(key);
                }
            }
            depth += 1;
            if depth > limit {
                break;
            }
            current = cell.prototype;
        }
        Ok(keys)
    }

    /// Unwrap bound functions to their final target.
    pub(crate) fn bound_target(&self, slot: u32) -> Result<u32> {
        let mut current = slot;
        for _ in 0..=self.config().max_call_depth {
            match self.cell(current)?.function().map(|f| &f.kind) {
                Some(FunctionKind::Bound(bound)) => current = self.resolve(&bound.target)?,
                _ => return Ok(current),
            }
        }
        Ok(current)
    }

    /// Guest member read. Primitives resolve through their intrinsic
    /// prototypes; `undefined` and `null` raise a guest `TypeError`.
    pub(crate) fn get_member(&mut self, base: &Value, key: &PropertyKey) -> Result<Value> {
        let proto = match base {
            Value::Object(obj) => {
                let slot = self.resolve(obj)?;
                if key.is_name(PROTO_KEY) {
                    return match self.cell(slot)?.prototype {
                        Some(proto) => self.handle(proto),
                        None => Ok(Value::Null),
                    };
                }
                return self.get_slot_property(slot, key);
            }
            Value::String(s) => {
                if let Some(value) = string_own(s, key) {
                    return Ok(value);
                }
                self.intrinsics.string_prototype
            }
            Value::Number(_) => self.intrinsics.number_prototype,
            Value::Boolean(_) => self.intrinsics.boolean_prototype,
            Value::Undefined | Value::Null => {
                let message = format!("Cannot read property '{}' of {}", key, base.type_of_nullish());
                return Err(self.raise(ErrorKind::TypeError, message));
            }
        };
        if key.is_name(PROTO_KEY) {
            return self.handle(proto);
        }
        self.get_slot_property(proto, key)
    }

    /// Guest member write. Writes to other primitives are dropped.
    ///
    /// `__proto__` relinks the prototype; values other than objects and
    /// `null` are ignored.
    pub(crate) fn set_member(&mut self, base: &Value, key: PropertyKey, value: Value) -> Result<()> {
        match base {
            Value::Object(obj) => {
                let slot = self.resolve(obj)?;
                if !key.is_name(PROTO_KEY) {
                    return self.put(slot, key, value);
                }
                match &value {
                    Value::Object(proto) => {
                        let proto = self.resolve(proto)?;
                        self.link_prototype(slot, Some(proto))
                    }
                    Value::Null => self.link_prototype(slot, None),
                    _ => Ok(()),
                }
            }
            Value::Undefined | Value::Null => {
                let message = format!("Cannot set property '{}' of {}", key, base.type_of_nullish());
                Err(self.raise(ErrorKind::TypeError, message))
            }
            _ => Ok(()),
        }
    }

    /// `length` of an array-like value as a uint32.
    pub(crate) fn length_of(&mut self, obj: &Value) -> Result<u32> {
        let length = self.get_member(obj, &PropertyKey::from("length"))?;
        let n = self.to_number(&length)?;
        Ok(crate::coerce::to_uint32(n))
    }
}

impl Value {
    fn type_of_nullish(&self) -> &'static str {
        if self.is_null() {
            "null"
        } else {
            "undefined"
        }
    }
}

/// `length` and index reads on a string primitive, in UTF-16 units.
pub(crate) fn string_own(s: &str, key: &PropertyKey) -> Option<Value> {
    match key {
        PropertyKey::Name(name) if name == "length" => {
            Some(Value::Number(s.encode_utf16().count() as f64))
        }
        PropertyKey::Index(i) => s
            .encode_utf16()
            .nth(*i as usize)
            .map(|unit| Value::String(String::from_utf16_lossy(&[unit]))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_growth_leaves_holes() {
        let mut vm = VmSession::new().unwrap();
        let arr = vm.create_array(0).unwrap();
        vm.set_property(&arr, 5u32, "v").unwrap();
        assert_eq!(vm.get_property(&arr, "length").unwrap(), Value::Number(6.0));
        assert_eq!(vm.get_property(&arr, 2u32).unwrap(), Value::Undefined);
        assert_eq!(vm.get_property(&arr, "5").unwrap(), Value::from("v"));
    }

    #[test]
    fn out_of_range_reads_do_not_grow() {
        let mut vm = VmSession::new().unwrap();
        let arr = vm.create_array(2).unwrap();
        assert_eq!(vm.get_property(&arr, 100u32).unwrap(), Value::Undefined);
        assert_eq!(vm.get_property(&arr, "length").unwrap(), Value::Number(2.0));
    }

    #[test]
    fn far_index_spills_without_allocating() {
        let mut vm = VmSession::new().unwrap();
        let arr = vm.create_array(0).unwrap();
        vm.set_property(&arr, 4_000_000_000u32, true).unwrap();
        assert_eq!(
            vm.get_property(&arr, "length").unwrap(),
            Value::Number(4_000_000_001.0)
        );
        assert_eq!(vm.get_property(&arr, 4_000_000_000u32).unwrap(), Value::Boolean(true));
        vm.set_property(&arr, "length", 1).unwrap();
        assert_eq!(vm.get_property(&arr, 4_000_000_000u32).unwrap(), Value::Undefined);
    }

    #[test]
    fn invalid_length_is_a_range_error() {
        let mut vm = VmSession::new().unwrap();
        let arr = vm.create_array(0).unwrap();
        let err = vm.set_property(&arr, "length", -1).unwrap_err();
        assert_eq!(err.exception().and_then(|e| e.name.clone()).as_deref(), Some("RangeError"));
    }

    #[test]
    fn delete_is_idempotent_and_rejects_primitives() {
        let mut vm = VmSession::new().unwrap();
        let obj = vm.create_object().unwrap();
        vm.set_property(&obj, "x", 1).unwrap();
        assert!(vm.delete_property(&obj, "x").unwrap());
        assert!(vm.delete_property(&obj, "x").unwrap());
        assert_eq!(vm.get_property(&obj, "x").unwrap(), Value::Undefined);
        assert!(matches!(
            vm.delete_property(&Value::from(1), "x"),
            Err(VmError::InvalidOperand { found: Tag::Number, .. })
        ));
    }

    #[test]
    fn cyclic_prototype_is_rejected_and_link_kept() {
        let mut vm = VmSession::new().unwrap();
        let a = vm.create_object().unwrap();
        let b = vm.create_object().unwrap();
        vm.set_prototype(&b, &a).unwrap();
        assert!(matches!(vm.set_prototype(&a, &b), Err(VmError::CyclicPrototype)));
        assert!(matches!(vm.set_prototype(&a, &a), Err(VmError::CyclicPrototype)));
        assert_eq!(vm.get_prototype(&b).unwrap(), a);
        vm.set_prototype(&a, &Value::Null).unwrap();
        assert_eq!(vm.get_prototype(&a).unwrap(), Value::Null);
    }

    #[test]
    fn prototype_depth_is_bounded() {
        let mut vm = VmSession::with_config(crate::SessionConfig {
            max_prototype_depth: 4,
            ..Default::default()
        })
        .unwrap();
        let mut chain = vec![vm.create_object().unwrap()];
        vm.set_prototype(&chain[0], &Value::Null).unwrap();
        for i in 1..4 {
            let next = vm.create_object().unwrap();
            vm.set_prototype(&next, &chain[i - 1]).unwrap();
            chain.push(next);
        }
        let last = vm.create_object().unwrap();
        assert!(matches!(
            vm.set_prototype(&last, &chain[3]),
            Err(VmError::InvalidOperand { .. })
        ));
    }

    #[test]
    fn string_members_use_utf16_units() {
        let mut vm = VmSession::new().unwrap();
        let s = Value::from("h\u{e9}\u{1F600}");
        assert_eq!(vm.get_member(&s, &"length".into()).unwrap(), Value::Number(4.0));
        assert_eq!(vm.get_member(&s, &1u32.into()).unwrap(), Value::from("\u{e9}"));
        assert!(vm.get_member(&s, &"charAt".into()).unwrap().is_function());
    }
}
