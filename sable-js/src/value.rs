//! Guest value handles.
//!
//! A [`Value`] is what the host holds on to. Primitives are stored inline;
//! object-like values are an [`ObjectRef`] into the heap of the session that
//! produced them. The handle keeps only a weak link to its session, so a
//! handle that outlives [`VmSession::destroy`](crate::VmSession::destroy) is
//! detected instead of dereferenced.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Runtime type discriminant of a guest value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Undefined,
    Null,
    Boolean,
    Number,
    String,
    Object,
    Array,
    Function,
    Error,
    RegExp,
    Date,
}

impl Tag {
    /// Whether values of this tag live on the guest heap.
    pub fn is_object_like(self) -> bool {
        matches!(
            self,
            Tag::Object | Tag::Array | Tag::Function | Tag::Error | Tag::RegExp | Tag::Date
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Tag::Undefined => "undefined",
            Tag::Null => "null",
            Tag::Boolean => "boolean",
            Tag::Number => "number",
            Tag::String => "string",
            Tag::Object => "object",
            Tag::Array => "array",
            Tag::Function => "function",
            Tag::Error => "error",
            Tag::RegExp => "regexp",
            Tag::Date => "date",
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a live session. Sessions own the only strong reference;
/// handles hold it weakly.
#[derive(Debug)]
pub(crate) struct SessionToken {
    id: u64,
}

impl SessionToken {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(SessionToken {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
        })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }
}

/// Handle to an object-like value in a session heap.
#[derive(Clone)]
pub struct ObjectRef {
    owner: Weak<SessionToken>,
    slot: u32,
    tag: Tag,
}

impl ObjectRef {
    pub(crate) fn new(owner: Weak<SessionToken>, slot: u32, tag: Tag) -> Self {
        ObjectRef { owner, slot, tag }
    }

    /// Tag of the referenced cell. Fixed for the lifetime of the cell.
    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// Whether the owning session has not been destroyed yet.
    pub fn is_alive(&self) -> bool {
        self.owner.strong_count() > 0
    }

    pub(crate) fn slot(&self) -> u32 {
        self.slot
    }

    pub(crate) fn owned_by(&self, token: &Arc<SessionToken>) -> bool {
        std::ptr::eq(self.owner.as_ptr(), Arc::as_ptr(token))
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.slot == other.slot && Weak::ptr_eq(&self.owner, &other.owner)
    }
}

impl Eq for ObjectRef {}

impl Hash for ObjectRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self.owner.as_ptr() as *const () as usize).hash(state);
        self.slot.hash(state);
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef(#{} {})", self.slot, self.tag)
    }
}

/// A guest value as seen by the host.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Object(ObjectRef),
}

impl Value {
    pub fn tag(&self) -> Tag {
        match self {
            Value::Undefined => Tag::Undefined,
            Value::Null => Tag::Null,
            Value::Boolean(_) => Tag::Boolean,
            Value::Number(_) => Tag::Number,
            Value::String(_) => Tag::String,
            Value::Object(obj) => obj.tag(),
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, Value::Boolean(_))
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Number(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    /// True for every heap-resident value, arrays and functions included.
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    pub fn is_array(&self) -> bool {
        self.tag() == Tag::Array
    }

    pub fn is_function(&self) -> bool {
        self.tag() == Tag::Function
    }

    pub fn is_error(&self) -> bool {
        self.tag() == Tag::Error
    }

    pub fn is_regexp(&self) -> bool {
        self.tag() == Tag::RegExp
    }

    pub fn is_date(&self) -> bool {
        self.tag() == Tag::Date
    }

    /// `undefined` or `null`.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// Result of the guest `typeof` operator.
    ///
    /// `null` reports `"object"`, matching the guest language.
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(obj) if obj.tag() == Tag::Function => "function",
            Value::Object(_) => "object",
        }
    }

    /// Guest truthiness. Never calls into the guest.
    pub fn to_boolean(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Number(n) => !(*n == 0.0 || n.is_nan()),
            Value::String(s) => !s.is_empty(),
            Value::Object(_) => true,
        }
    }

    pub fn as_object_ref(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<ObjectRef> for Value {
    fn from(obj: ObjectRef) -> Self {
        Value::Object(obj)
    }
}

impl From<&Value> for Value {
    fn from(v: &Value) -> Self {
        v.clone()
    }
}

/// Property key. Canonical array-index strings are normalised to `Index`,
/// so `"5"` and `5` name the same property.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PropertyKey {
    Index(u32),
    Name(String),
}

impl PropertyKey {
    pub fn name(name: impl Into<String>) -> Self {
        let name = name.into();
        match parse_array_index(&name) {
            Some(index) => PropertyKey::Index(index),
            None => PropertyKey::Name(name),
        }
    }

    pub fn as_index(&self) -> Option<u32> {
        match self {
            PropertyKey::Index(i) => Some(*i),
            PropertyKey::Name(_) => None,
        }
    }

    pub(crate) fn is_name(&self, name: &str) -> bool {
        matches!(self, PropertyKey::Name(n) if n == name)
    }
}

/// Largest valid array index is 2^32 - 2.
fn parse_array_index(s: &str) -> Option<u32> {
    if s.is_empty() || s.len() > 10 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if s.len() > 1 && s.starts_with('0') {
        return None;
    }
    s.parse::<u32>().ok().filter(|&i| i != u32::MAX)
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKey::Index(i) => write!(f, "{}", i),
            PropertyKey::Name(s) => f.write_str(s),
        }
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        PropertyKey::name(s)
    }
}

impl From<String> for PropertyKey {
    fn from(s: String) -> Self {
        PropertyKey::name(s)
    }
}

impl From<&String> for PropertyKey {
    fn from(s: &String) -> Self {
        PropertyKey::name(s.as_str())
    }
}

impl From<u32> for PropertyKey {
    fn from(i: u32) -> Self {
        if i == u32::MAX {
            PropertyKey::Name(i.to_string())
        } else {
            PropertyKey::Index(i)
        }
    }
}

impl From<usize> for PropertyKey {
    fn from(i: usize) -> Self {
        match u32::try_from(i) {
            Ok(i) => PropertyKey::from(i),
            Err(_) => PropertyKey::Name(i.to_string()),
        }
    }
}

impl From<i32> for PropertyKey {
    fn from(i: i32) -> Self {
        match u32::try_from(i) {
            Ok(i) => PropertyKey::from(i),
            Err(_) => PropertyKey::Name(i.to_string()),
        }
    }
}

impl From<&PropertyKey> for PropertyKey {
    fn from(key: &PropertyKey) -> Self {
        key.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_index_strings_normalise() {
        assert_eq!(PropertyKey::from("5"), PropertyKey::Index(5));
        assert_eq!(PropertyKey::from("0"), PropertyKey::Index(0));
        assert_eq!(PropertyKey::from("05"), PropertyKey::Name("05".into()));
        assert_eq!(PropertyKey::from("-1"), PropertyKey::Name("-1".into()));
        assert_eq!(PropertyKey::from("4294967295"), PropertyKey::Name("4294967295".into()));
        assert_eq!(PropertyKey::from(-3), PropertyKey::Name("-3".into()));
    }

    #[test]
    fn typeof_null_is_object() {
        assert_eq!(Value::Null.type_of(), "object");
        assert_eq!(Value::Undefined.type_of(), "undefined");
        assert_eq!(Value::from(1.5).type_of(), "number");
    }

    #[test]
    fn truthiness() {
        assert!(!Value::from(f64::NAN).to_boolean());
        assert!(!Value::from("").to_boolean());
        assert!(Value::from("Hello World!").to_boolean());
        assert!(!Value::from(-0.0).to_boolean());
    }
}
