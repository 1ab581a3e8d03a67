//! Heap cells for object-like values.
//!
//! Every object-like value is an [`ObjectCell`]: a property map, a prototype
//! link and an [`ObjectKind`] holding the internal slot.

use std::fmt;
use std::sync::Arc;

use hashbrown::HashMap;
use regex::Regex;

use crate::bridge::BuiltinFn;
use crate::engine::GuestCode;
use crate::exception::ErrorKind;
use crate::value::{ObjectRef, PropertyKey, Tag, Value};

/// A stored property.
#[derive(Clone, Debug)]
pub(crate) struct Property {
    /// Current value.
    pub value: Value,
    /// Whether `for-in` and `Object.keys` see it.
    pub enumerable: bool,
}

/// Insertion-ordered property storage with a hash index.
#[derive(Clone, Debug, Default)]
pub(crate) struct PropertyMap {
    entries: Vec<(PropertyKey, Property)>,
    index: HashMap<PropertyKey, usize>,
}

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &PropertyKey) -> Option<&Property> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    pub fn contains(&self, key: &PropertyKey) -> bool {
        self.index.contains_key(key)
    }

    /// Write a value. An existing property keeps its enumerable bit.
    pub fn set(&mut self, key: PropertyKey, value: Value, enumerable: bool) {
        match self.index.get(&key) {
            Some(&i) => self.entries[i].1.value = value,
            None => self.push(key, Property { value, enumerable }),
        }
    }

    /// Write a value and its enumerable bit.
    pub fn define(&mut self, key: PropertyKey, value: Value, enumerable: bool) {
        match self.index.get(&key) {
            Some(&i) => self.entries[i].1 = Property { value, enumerable },
            None => self.push(key, Property { value, enumerable }),
        }
    }

    fn push(&mut self, key: PropertyKey, property: Property) {
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, property));
    }

    pub fn remove(&mut self, key: &PropertyKey) -> Option<Property> {
        let i = self.index.remove(key)?;
        let (_, property) = self.entries.remove(i);
        for (k, _) in &self.entries[i..] {
            if let Some(slot) = self.index.get_mut(k) {
                *slot -= 1;
            }
        }
        Some(property)
    }

    /// Drop every index key at or above `len`.
    pub fn truncate_indices(&mut self, len: u32) {
        let doomed: Vec<PropertyKey> = self
            .entries
            .iter()
            .filter(|(k, _)| matches!(k, PropertyKey::Index(i) if *i >= len))
            .map(|(k, _)| k.clone())
            .collect();
        for key in doomed {
            self.remove(&key);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PropertyKey, &Property)> {
        self.entries.iter().map(|(k, p)| (k, p))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Element storage of an Array cell.
///
/// `dense` may be shorter than `length`; indices past it are holes unless
/// they were spilled into the property map.
#[derive(Clone, Debug, Default)]
pub(crate) struct ArrayStorage {
    pub dense: Vec<Option<Value>>,
    pub length: u32,
}

/// Writes further than this past the dense tail go to the property map.
pub(crate) const MAX_DENSE_GAP: u32 = 1024;

/// Call behaviour of a function cell.
#[derive(Clone)]
pub(crate) enum FunctionKind {
    /// Host closure; the binding lives in the bridge table under this slot.
    Host,
    /// Native built-in.
    Builtin(BuiltinFn),
    /// Code supplied by the engine.
    Guest(Arc<dyn GuestCode>),
    /// Result of `Function.prototype.bind`.
    Bound(BoundFunction),
}

impl fmt::Debug for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionKind::Host => f.write_str("Host"),
            FunctionKind::Builtin(_) => f.write_str("Builtin"),
            FunctionKind::Guest(code) => write!(f, "Guest({:?})", code),
            FunctionKind::Bound(bound) => write!(f, "Bound({:?})", bound.target),
        }
    }
}

/// Bound target, receiver and leading arguments.
#[derive(Clone, Debug)]
pub(crate) struct BoundFunction {
    pub target: ObjectRef,
    pub this: Value,
    pub args: Vec<Value>,
}

/// What `new` does with a function.
#[derive(Clone, Copy)]
pub(crate) enum Construct {
    /// Not a constructor.
    Never,
    /// Allocate `this` from the `prototype` property, then call.
    Ordinary,
    /// Built-in constructor that produces its own exotic object.
    Native(BuiltinFn),
}

impl fmt::Debug for Construct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Construct::Never => f.write_str("Never"),
            Construct::Ordinary => f.write_str("Ordinary"),
            Construct::Native(_) => f.write_str("Native"),
        }
    }
}

/// Internal slot of a function cell.
#[derive(Clone, Debug)]
pub(crate) struct FunctionData {
    pub name: Arc<str>,
    pub kind: FunctionKind,
    pub construct: Construct,
}

/// Compiled regular expression together with its guest source.
#[derive(Clone, Debug)]
pub(crate) struct RegExpData {
    pub source: String,
    pub flags: String,
    pub regex: Regex,
}

/// Object classification and internal slot.
#[derive(Clone, Debug)]
pub(crate) enum ObjectKind {
    /// Ordinary object.
    Ordinary,
    /// Array, including `arguments`.
    Array(ArrayStorage),
    /// Function object.
    Function(FunctionData),
    /// Error object.
    Error(ErrorKind),
    /// RegExp object.
    RegExp(RegExpData),
    /// Date object holding milliseconds since the epoch, NaN when invalid.
    Date(f64),
    /// Primitive wrapper created by `new Number(..)` and friends.
    Boxed(Value),
}

impl ObjectKind {
    pub fn tag(&self) -> Tag {
        match self {
            ObjectKind::Ordinary | ObjectKind::Boxed(_) => Tag::Object,
            ObjectKind::Array(_) => Tag::Array,
            ObjectKind::Function(_) => Tag::Function,
            ObjectKind::Error(_) => Tag::Error,
            ObjectKind::RegExp(_) => Tag::RegExp,
            ObjectKind::Date(_) => Tag::Date,
        }
    }

    /// Name reported by `Object.prototype.toString`.
    pub fn class_name(&self) -> &'static str {
        match self {
            ObjectKind::Ordinary => "Object",
            ObjectKind::Array(_) => "Array",
            ObjectKind::Function(_) => "Function",
            ObjectKind::Error(_) => "Error",
            ObjectKind::RegExp(_) => "RegExp",
            ObjectKind::Date(_) => "Date",
            ObjectKind::Boxed(Value::Number(_)) => "Number",
            ObjectKind::Boxed(Value::String(_)) => "String",
            ObjectKind::Boxed(Value::Boolean(_)) => "Boolean",
            ObjectKind::Boxed(_) => "Object",
        }
    }
}

/// A heap-resident object.
#[derive(Clone, Debug)]
pub(crate) struct ObjectCell {
    pub kind: ObjectKind,
    pub properties: PropertyMap,
    pub prototype: Option<u32>,
}

impl ObjectCell {
    pub fn new(kind: ObjectKind, prototype: Option<u32>) -> Self {
        ObjectCell {
            kind,
            properties: PropertyMap::new(),
            prototype,
        }
    }

    pub fn tag(&self) -> Tag {
        self.kind.tag()
    }

    pub fn function(&self) -> Option<&FunctionData> {
        match &self.kind {
            ObjectKind::Function(data) => Some(data),
            _ => None,
        }
    }

    pub fn array(&self) -> Option<&ArrayStorage> {
        match &self.kind {
            ObjectKind::Array(storage) => Some(storage),
            _ => None,
        }
    }

    /// Own property lookup, including array elements and `length`.
    pub fn own(&self, key: &PropertyKey) -> Option<Value> {
        if let ObjectKind::Array(storage) = &self.kind {
            match key {
                PropertyKey::Index(i) if *i < storage.length => {
                    if let Some(Some(v)) = storage.dense.get(*i as usize) {
                        return Some(v.clone());
                    }
                }
                PropertyKey::Name(n) if n == "length" => {
                    return Some(Value::Number(storage.length as f64));
                }
                _ => {}
            }
        }
        if let ObjectKind::Boxed(Value::String(s)) = &self.kind {
            if let Some(v) = crate::store::string_own(s, key) {
                return Some(v);
            }
        }
        self.properties.get(key).map(|p| p.value.clone())
    }

    pub fn has_own(&self, key: &PropertyKey) -> bool {
        if let ObjectKind::Array(storage) = &self.kind {
            match key {
                PropertyKey::Index(i) => {
                    if let Some(Some(_)) = storage.dense.get(*i as usize) {
                        return true;
                    }
                }
                PropertyKey::Name(n) if n == "length" => return true,
                _ => {}
            }
        }
        self.properties.contains(key)
    }

    /// Own keys: indices ascending, then names in insertion order.
    pub fn own_keys(&self, enumerable_only: bool) -> Vec<PropertyKey> {
        let mut indices: Vec<u32> = Vec::new();
        if let ObjectKind::Array(storage) = &self.kind {
            indices.extend(
                storage
                    .dense
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| v.is_some())
                    .map(|(i, _)| i as u32),
            );
        }
        let mut names = Vec::new();
        for (key, property) in self.properties.iter() {
            if enumerable_only && !property.enumerable {
                continue;
            }
            match key {
                PropertyKey::Index(i) => indices.push(*i),
                PropertyKey::Name(_) => names.push(key.clone()),
            }
        }
        indices.sort_unstable();
        indices.dedup();
        let mut keys: Vec<PropertyKey> = indices.into_iter().map(PropertyKey::Index).collect();
        if !enumerable_only && matches!(self.kind, ObjectKind::Array(_)) {
            keys.push(PropertyKey::Name("length".into()));
        }
        keys.extend(names);
        keys
    }
}

/// Host-inspectable view of an object-like value.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectDescriptor {
    /// Runtime tag of the value.
    pub tag: Tag,
    /// Class name, e.g. `"Array"` or `"Number"` for a wrapper.
    pub class_name: &'static str,
    /// Own enumerable keys in property order.
    pub keys: Vec<PropertyKey>,
    /// Snapshot of the internal slot.
    pub slot: InternalSlot,
    /// Whether the prototype link is set.
    pub has_prototype: bool,
}

/// Snapshot of an object's internal slot.
#[derive(Debug, Clone, PartialEq)]
pub enum InternalSlot {
    /// Ordinary object.
    None,
    /// Array length.
    Array { length: u32 },
    /// Function name and origin.
    Function {
        name: String,
        host: bool,
        constructable: bool,
    },
    /// Error name and message.
    Error { name: String, message: Option<String> },
    /// RegExp source and flags.
    RegExp { source: String, flags: String },
    /// Date epoch value in milliseconds.
    Date { time: f64 },
    /// Wrapped primitive.
    Primitive(Value),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_map_keeps_insertion_order_after_remove() {
        let mut map = PropertyMap::new();
        map.set("a".into(), Value::from(1), true);
        map.set("b".into(), Value::from(2), true);
        map.set("c".into(), Value::from(3), true);
        assert!(map.remove(&"a".into()).is_some());
        let keys: Vec<String> = map.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, ["b", "c"]);
        assert_eq!(map.get(&"c".into()).map(|p| p.value.clone()), Some(Value::from(3)));
    }

    #[test]
    fn set_keeps_enumerable_bit() {
        let mut map = PropertyMap::new();
        map.define("hidden".into(), Value::Null, false);
        map.set("hidden".into(), Value::from(true), true);
        assert!(!map.get(&"hidden".into()).map(|p| p.enumerable).unwrap_or(true));
    }

    #[test]
    fn array_keys_list_indices_first() {
        let mut cell = ObjectCell::new(
            ObjectKind::Array(ArrayStorage {
                dense: vec![Some(Value::from(1)), None, Some(Value::from(3))],
                length: 3,
            }),
            None,
        );
        cell.properties.set("tag".into(), Value::Null, true);
        cell.properties.set(PropertyKey::Index(5000), Value::Null, true);
        let keys = cell.own_keys(true);
        assert_eq!(
            keys,
            vec![
                PropertyKey::Index(0),
                PropertyKey::Index(2),
                PropertyKey::Index(5000),
                PropertyKey::Name("tag".into()),
            ]
        );
    }
}
