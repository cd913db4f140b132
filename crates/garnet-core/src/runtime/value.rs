//! Ruby value representation.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::FxHashMap;

use super::class::ClassId;
use super::environment::Env;
use super::proc::Proc;

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Hands out `object_id`s for heap objects.
pub fn next_object_id() -> u64 {
    NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed) * 8
}

/// A Ruby value.
///
/// Immediate values are stored inline; everything mutable is reference
/// counted, so cloning a `Value` aliases the same Ruby object.
#[derive(Clone, Default)]
pub enum Value {
    /// nil
    #[default]
    Nil,
    /// true / false
    Bool(bool),
    /// 64-bit integer
    Integer(i64),
    /// Mutable string
    String(Rc<RefCell<String>>),
    /// Symbol
    Symbol(Rc<str>),
    /// Array
    Array(Rc<RefCell<Vec<Value>>>),
    /// Insertion-ordered hash
    Hash(Rc<RefCell<RubyHash>>),
    /// Proc, lambda or captured block
    Proc(Rc<Proc>),
    /// Instance of a user-defined (or exception) class, or `main`
    Object(Rc<Instance>),
    /// Class or module
    Class(ClassId),
}

impl Value {
    /// A fresh string.
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(Rc::new(RefCell::new(s.into())))
    }

    /// A symbol.
    pub fn symbol(s: &str) -> Self {
        Value::Symbol(Rc::from(s))
    }

    /// A fresh array.
    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    /// A fresh hash.
    pub fn hash(hash: RubyHash) -> Self {
        Value::Hash(Rc::new(RefCell::new(hash)))
    }

    /// Everything except `nil` and `false` is truthy.
    pub fn truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    /// Returns true if this value is nil.
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// The integer payload, if any.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// A copy of the string or symbol text, if any.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.borrow().clone()),
            Value::Symbol(s) => Some(s.to_string()),
            _ => None,
        }
    }

    /// `equal?`: object identity.
    pub fn identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::String(a), Value::String(b)) => Rc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Hash(a), Value::Hash(b)) => Rc::ptr_eq(a, b),
            (Value::Proc(a), Value::Proc(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => a == b,
            _ => false,
        }
    }

    /// `object_id`.
    pub fn object_id(&self) -> i64 {
        match self {
            Value::Nil => 8,
            Value::Bool(true) => 20,
            Value::Bool(false) => 0,
            Value::Integer(n) => n.wrapping_mul(2).wrapping_add(1),
            Value::Object(instance) => instance.id as i64,
            Value::Proc(proc) => proc.id as i64,
            Value::Class(id) => 16 + 8 * id.index() as i64,
            Value::String(s) => Rc::as_ptr(s) as usize as i64,
            Value::Symbol(s) => Rc::as_ptr(s) as *const u8 as usize as i64,
            Value::Array(a) => Rc::as_ptr(a) as usize as i64,
            Value::Hash(h) => Rc::as_ptr(h) as usize as i64,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::string(s)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{:?}", s.borrow()),
            Value::Symbol(s) => write!(f, ":{}", s),
            Value::Array(items) => f.debug_list().entries(items.borrow().iter()).finish(),
            Value::Hash(hash) => f
                .debug_map()
                .entries(hash.borrow().iter().map(|(k, v)| (k.clone(), v.clone())))
                .finish(),
            Value::Proc(proc) => write!(f, "Proc({})", proc.id),
            Value::Object(instance) => write!(f, "Object({})", instance.id),
            Value::Class(id) => write!(f, "Class({})", id.index()),
        }
    }
}

/// Structural equality for immediates, strings and collections; identity for
/// everything else. User-defined `==` is honored only through dispatch.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::String(a), Value::String(b)) => *a.borrow() == *b.borrow(),
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Hash(a), Value::Hash(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            _ => self.identical(other),
        }
    }
}

/// State carried by instances of exception classes.
#[derive(Debug, Clone, Default)]
pub struct ExceptionData {
    /// Message passed to `new`, if any
    pub message: Option<String>,
    /// Backtrace recorded when raised
    pub backtrace: Option<Vec<String>>,
}

/// A heap object: `main`, instances of user classes and exceptions.
pub struct Instance {
    /// `object_id`
    pub id: u64,
    class: Cell<ClassId>,
    /// Instance variables
    pub ivars: Env,
    /// Present for exception objects
    pub exception: RefCell<Option<ExceptionData>>,
}

impl Instance {
    /// Allocates an instance of `class`.
    pub fn new(class: ClassId) -> Rc<Self> {
        Rc::new(Self {
            id: next_object_id(),
            class: Cell::new(class),
            ivars: Env::store(),
            exception: RefCell::new(None),
        })
    }

    /// Allocates an exception object.
    pub fn exception(class: ClassId, data: ExceptionData) -> Rc<Self> {
        let instance = Self::new(class);
        *instance.exception.borrow_mut() = Some(data);
        instance
    }

    /// The class dispatch starts from, possibly a singleton shadow.
    pub fn class(&self) -> ClassId {
        self.class.get()
    }

    /// Re-tags the instance; used to install a singleton class.
    pub fn set_class(&self, class: ClassId) {
        self.class.set(class);
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("class", &self.class.get())
            .finish_non_exhaustive()
    }
}

/// Key used to index a [`RubyHash`]; mirrors `eql?` for built-in types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum HashKey {
    Nil,
    Bool(bool),
    Integer(i64),
    Str(String),
    Symbol(Rc<str>),
    Array(Vec<HashKey>),
    Identity(i64),
}

impl HashKey {
    fn of(value: &Value) -> Self {
        match value {
            Value::Nil => HashKey::Nil,
            Value::Bool(b) => HashKey::Bool(*b),
            Value::Integer(n) => HashKey::Integer(*n),
            Value::String(s) => HashKey::Str(s.borrow().clone()),
            Value::Symbol(s) => HashKey::Symbol(s.clone()),
            Value::Array(items) => HashKey::Array(items.borrow().iter().map(HashKey::of).collect()),
            other => HashKey::Identity(other.object_id()),
        }
    }
}

/// An insertion-ordered hash table.
#[derive(Debug, Clone, Default)]
pub struct RubyHash {
    entries: Vec<(Value, Value)>,
    index: FxHashMap<HashKey, usize>,
    /// Returned by `[]` for missing keys
    pub default: Value,
    /// Called with `(hash, key)` for missing keys
    pub default_proc: Option<Rc<Proc>>,
}

impl RubyHash {
    /// An empty hash.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a hash from pairs; later keys overwrite earlier ones.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (Value, Value)>) -> Self {
        let mut hash = Self::new();
        for (key, value) in pairs {
            hash.insert(key, value);
        }
        hash
    }

    /// Looks up a key.
    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.index.get(&HashKey::of(key)).map(|&i| &self.entries[i].1)
    }

    /// True if the key is present.
    pub fn contains_key(&self, key: &Value) -> bool {
        self.index.contains_key(&HashKey::of(key))
    }

    /// Inserts or replaces; an existing key keeps its position.
    pub fn insert(&mut self, key: Value, value: Value) {
        let hash_key = HashKey::of(&key);
        if let Some(&i) = self.index.get(&hash_key) {
            self.entries[i].1 = value;
            return;
        }
        // String keys are copied so later mutation can't corrupt the index
        let key = match key {
            Value::String(s) => Value::string(s.borrow().clone()),
            other => other,
        };
        self.index.insert(hash_key, self.entries.len());
        self.entries.push((key, value));
    }

    /// Removes a key, returning its value.
    pub fn remove(&mut self, key: &Value) -> Option<Value> {
        let i = self.index.remove(&HashKey::of(key))?;
        let (_, value) = self.entries.remove(i);
        for slot in self.index.values_mut() {
            if *slot > i {
                *slot -= 1;
            }
        }
        Some(value)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> Vec<Value> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }

    /// Values in insertion order.
    pub fn values(&self) -> Vec<Value> {
        self.entries.iter().map(|(_, v)| v.clone()).collect()
    }

    /// A copy of the entries, safe to hold across calls back into Ruby.
    pub fn pairs(&self) -> Vec<(Value, Value)> {
        self.entries.clone()
    }
}

impl PartialEq for RubyHash {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(key, value)| other.get(key).is_some_and(|v| v == value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Nil.truthy());
        assert!(!Value::Bool(false).truthy());
        assert!(Value::Bool(true).truthy());
        assert!(Value::Integer(0).truthy());
        assert!(Value::string("").truthy());
    }

    #[test]
    fn test_identity_vs_equality() {
        let a = Value::string("hi");
        let b = Value::string("hi");
        assert_eq!(a, b);
        assert!(!a.identical(&b));
        assert!(a.identical(&a.clone()));
        assert!(Value::symbol("x").identical(&Value::symbol("x")));
    }

    #[test]
    fn test_hash_insertion_order() {
        let mut hash = RubyHash::new();
        hash.insert(Value::symbol("b"), Value::Integer(2));
        hash.insert(Value::symbol("a"), Value::Integer(1));
        hash.insert(Value::symbol("b"), Value::Integer(3));
        assert_eq!(hash.keys(), vec![Value::symbol("b"), Value::symbol("a")]);
        assert_eq!(hash.get(&Value::symbol("b")), Some(&Value::Integer(3)));
    }

    #[test]
    fn test_hash_remove_reindexes() {
        let mut hash = RubyHash::from_pairs((0..4).map(|i| (Value::Integer(i), Value::Integer(i * 10))));
        assert_eq!(hash.remove(&Value::Integer(1)), Some(Value::Integer(10)));
        assert_eq!(hash.get(&Value::Integer(3)), Some(&Value::Integer(30)));
        assert_eq!(hash.len(), 3);
        assert!(hash.remove(&Value::Integer(1)).is_none());
    }

    #[test]
    fn test_string_keys_are_copied() {
        let key = Value::string("k");
        let mut hash = RubyHash::new();
        hash.insert(key.clone(), Value::Integer(1));
        if let Value::String(s) = &key {
            s.borrow_mut().push('!');
        }
        assert!(hash.get(&Value::string("k")).is_some());
        assert!(hash.get(&key).is_none());
    }

    #[test]
    fn test_object_ids() {
        assert_eq!(Value::Integer(1).object_id(), 3);
        assert_eq!(Value::Nil.object_id(), 8);
        assert_ne!(next_object_id(), next_object_id());
    }
}
