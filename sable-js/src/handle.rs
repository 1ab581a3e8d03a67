//! Value factories, strict accessors and classification.

use crate::builtins::regexp::compile_pattern;
use crate::error::{Result, VmError};
use crate::exception::ErrorKind;
use crate::object::{ArrayStorage, InternalSlot, ObjectDescriptor, ObjectKind};
use crate::session::VmSession;
use crate::value::{PropertyKey, Tag, Value};

impl VmSession {
    pub fn create_undefined(&self) -> Result<Value> {
        self.ensure_live()?;
        Ok(Value::Undefined)
    }

    pub fn create_null(&self) -> Result<Value> {
        self.ensure_live()?;
        Ok(Value::Null)
    }

    pub fn create_boolean(&self, value: bool) -> Result<Value> {
        self.ensure_live()?;
        Ok(Value::Boolean(value))
    }

    pub fn create_number(&self, value: f64) -> Result<Value> {
        self.ensure_live()?;
        Ok(Value::Number(value))
    }

    pub fn create_string(&self, value: impl Into<String>) -> Result<Value> {
        self.ensure_live()?;
        Ok(Value::String(value.into()))
    }

    /// A fresh ordinary object inheriting from `Object.prototype`.
    pub fn create_object(&mut self) -> Result<Value> {
        let proto = self.intrinsics.object_prototype;
        self.alloc_value(ObjectKind::Ordinary, Some(proto))
    }

    /// A fresh array of `length` holes.
    pub fn create_array(&mut self, length: u32) -> Result<Value> {
        let proto = self.intrinsics.array_prototype;
        self.alloc_value(
            ObjectKind::Array(ArrayStorage {
                dense: Vec::new(),
                length,
            }),
            Some(proto),
        )
    }

    /// A fresh array holding `items`.
    pub fn create_array_from(&mut self, items: Vec<Value>) -> Result<Value> {
        for item in &items {
            self.check_value(item)?;
        }
        let length = u32::try_from(items.len())
            .map_err(|_| self.raise(ErrorKind::RangeError, "Invalid array length"))?;
        let proto = self.intrinsics.array_prototype;
        self.alloc_value(
            ObjectKind::Array(ArrayStorage {
                dense: items.into_iter().map(Some).collect(),
                length,
            }),
            Some(proto),
        )
    }

    /// A RegExp object. Invalid patterns or flags raise a guest `SyntaxError`.
    pub fn create_regexp(&mut self, pattern: &str, flags: &str) -> Result<Value> {
        self.ensure_live()?;
        let data = compile_pattern(pattern, flags)
            .map_err(|message| self.raise(ErrorKind::SyntaxError, message))?;
        let proto = self.intrinsics.regexp_prototype;
        let fields = [
            ("source", Value::String(data.source.clone())),
            ("flags", Value::String(data.flags.clone())),
            ("global", Value::Boolean(data.flags.contains('g'))),
            ("ignoreCase", Value::Boolean(data.flags.contains('i'))),
            ("multiline", Value::Boolean(data.flags.contains('m'))),
            ("lastIndex", Value::Number(0.0)),
        ];
        let slot = self.alloc(ObjectKind::RegExp(data), Some(proto))?;
        for (name, value) in fields {
            self.define_own(slot, name.into(), value, false)?;
        }
        self.handle(slot)
    }

    /// A Date object; `None` means now.
    pub fn create_date(&mut self, timestamp: Option<f64>) -> Result<Value> {
        let time = match timestamp {
            Some(t) => crate::builtins::date::time_clip(t),
            None => crate::builtins::date::now_ms(),
        };
        let proto = self.intrinsics.date_prototype;
        self.alloc_value(ObjectKind::Date(time), Some(proto))
    }

    pub fn as_undefined(&self, value: &Value) -> Result<()> {
        self.check_value(value)?;
        match value {
            Value::Undefined => Ok(()),
            other => Err(mismatch(Tag::Undefined, other)),
        }
    }

    pub fn as_null(&self, value: &Value) -> Result<()> {
        self.check_value(value)?;
        match value {
            Value::Null => Ok(()),
            other => Err(mismatch(Tag::Null, other)),
        }
    }

    pub fn as_boolean(&self, value: &Value) -> Result<bool> {
        self.check_value(value)?;
        match value {
            Value::Boolean(b) => Ok(*b),
            other => Err(mismatch(Tag::Boolean, other)),
        }
    }

    pub fn as_number(&self, value: &Value) -> Result<f64> {
        self.check_value(value)?;
        match value {
            Value::Number(n) => Ok(*n),
            other => Err(mismatch(Tag::Number, other)),
        }
    }

    pub fn as_string<'v>(&self, value: &'v Value) -> Result<&'v str> {
        self.check_value(value)?;
        match value {
            Value::String(s) => Ok(s),
            other => Err(mismatch(Tag::String, other)),
        }
    }

    /// Describe an object-like value.
    pub fn as_object(&self, value: &Value) -> Result<ObjectDescriptor> {
        let slot = match value {
            Value::Object(obj) => self.resolve(obj)?,
            other => {
                self.ensure_live()?;
                return Err(mismatch(Tag::Object, other));
            }
        };
        let cell = self.cell(slot)?;
        let internal = match &cell.kind {
            ObjectKind::Ordinary => InternalSlot::None,
            ObjectKind::Array(storage) => InternalSlot::Array {
                length: storage.length,
            },
            ObjectKind::Function(data) => InternalSlot::Function {
                name: data.name.to_string(),
                host: matches!(data.kind, crate::object::FunctionKind::Host),
                constructable: !matches!(data.construct, crate::object::Construct::Never),
            },
            ObjectKind::Error(kind) => {
                let name = match self.get_slot_property(slot, &PropertyKey::from("name"))? {
                    Value::String(s) => s,
                    _ => kind.name().to_string(),
                };
                let message = match cell.own(&PropertyKey::from("message")) {
                    Some(Value::String(s)) => Some(s),
                    _ => None,
                };
                InternalSlot::Error { name, message }
            }
            ObjectKind::RegExp(data) => InternalSlot::RegExp {
                source: data.source.clone(),
                flags: data.flags.clone(),
            },
            ObjectKind::Date(time) => InternalSlot::Date { time: *time },
            ObjectKind::Boxed(inner) => InternalSlot::Primitive(inner.clone()),
        };
        Ok(ObjectDescriptor {
            tag: cell.tag(),
            class_name: cell.kind.class_name(),
            keys: cell.own_keys(true),
            slot: internal,
            has_prototype: cell.prototype.is_some(),
        })
    }

    /// Guest `typeof`.
    pub fn type_of(&self, value: &Value) -> Result<&'static str> {
        self.check_value(value)?;
        Ok(value.type_of())
    }

    /// Guest `instanceof` without the throwing cases: false unless `ctor`
    /// is a function whose `prototype` appears on `value`'s chain.
    pub fn instance_of(&self, value: &Value, ctor: &Value) -> Result<bool> {
        self.check_value(value)?;
        self.check_value(ctor)?;
        let Value::Object(ctor_ref) = ctor else {
            return Ok(false);
        };
        if ctor_ref.tag() != Tag::Function {
            return Ok(false);
        }
        let ctor_slot = self.resolve(ctor_ref)?;
        let ctor_slot = self.bound_target(ctor_slot)?;
        let Value::Object(proto_ref) = self.get_slot_property(ctor_slot, &PropertyKey::from("prototype"))? else {
            return Ok(false);
        };
        let Value::Object(obj) = value else {
            return Ok(false);
        };
        let target = self.resolve(&proto_ref)?;
        let start = self.resolve(obj)?;
        self.chain_contains(start, target)
    }
}

fn mismatch(expected: Tag, found: &Value) -> VmError {
    VmError::TypeMismatch {
        expected,
        found: found.tag(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_never_coerce() {
        let vm = VmSession::new().unwrap();
        let n = vm.create_number(1.0).unwrap();
        assert!(matches!(
            vm.as_string(&n),
            Err(VmError::TypeMismatch { expected: Tag::String, found: Tag::Number })
        ));
        assert_eq!(vm.as_number(&n).unwrap(), 1.0);
    }

    #[test]
    fn create_array_preallocates_length() {
        let mut vm = VmSession::new().unwrap();
        let arr = vm.create_array(10).unwrap();
        assert_eq!(vm.get_property(&arr, "length").unwrap(), Value::Number(10.0));
        assert_eq!(vm.get_property(&arr, 3u32).unwrap(), Value::Undefined);
        let descriptor = vm.as_object(&arr).unwrap();
        assert_eq!(descriptor.slot, InternalSlot::Array { length: 10 });
        assert!(descriptor.keys.is_empty());
    }

    #[test]
    fn error_descriptor_reports_name_and_message() {
        let mut vm = VmSession::new().unwrap();
        let err = vm.create_error(Some("boom")).unwrap();
        let descriptor = vm.as_object(&err).unwrap();
        assert_eq!(descriptor.tag, Tag::Error);
        assert_eq!(
            descriptor.slot,
            InternalSlot::Error {
                name: "Error".into(),
                message: Some("boom".into())
            }
        );
    }

    #[test]
    fn regexp_exposes_source() {
        let mut vm = VmSession::new().unwrap();
        let re = vm.create_regexp("[a-z]+", "g").unwrap();
        assert!(re.is_regexp());
        assert_eq!(vm.get_property(&re, "source").unwrap(), Value::from("[a-z]+"));
        assert!(vm.create_regexp("(", "").is_err());
        assert!(vm.create_regexp("a", "q").is_err());
    }

    #[test]
    fn date_is_instance_of_global_date() {
        let mut vm = VmSession::new().unwrap();
        let global = vm.get_global().unwrap();
        let date_ctor = vm.get_property(&global, "Date").unwrap();
        let date = vm.create_date(None).unwrap();
        assert!(vm.instance_of(&date, &date_ctor).unwrap());
        let obj = vm.create_object().unwrap();
        assert!(!vm.instance_of(&obj, &date_ctor).unwrap());
        assert!(!vm.instance_of(&date, &obj).unwrap());
    }
}
