//! Methods, method sets and visibility.

use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use super::class::ClassId;
use super::context::CallContext;
use super::environment::Env;
use super::error::{EvalResult, Exception};
use super::proc::Proc;
use super::value::Value;
use crate::ast::{MethodDef, Params};

/// A native (Rust) method.
pub type NativeMethod = fn(&mut CallContext<'_>, Vec<Value>) -> EvalResult;

/// Who may call a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Callable from anywhere
    Public,
    /// Callable when the caller's self is a kind of the method's owner
    Protected,
    /// Callable only without an explicit receiver (or with `self.`)
    Private,
}

impl Visibility {
    /// Lowercase Ruby keyword.
    pub fn name(self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Protected => "protected",
            Visibility::Private => "private",
        }
    }
}

/// Accepted argument counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly `n`
    Exact(usize),
    /// Between `min` and `max` inclusive
    Range(usize, usize),
    /// `n` or more
    AtLeast(usize),
}

impl Arity {
    /// Any number of arguments.
    pub const ANY: Arity = Arity::AtLeast(0);

    /// Derives the arity of a parameter list.
    pub fn from_params(params: &Params) -> Self {
        let required = params.required.len();
        if params.rest.is_some() {
            Arity::AtLeast(required)
        } else if params.optional.is_empty() {
            Arity::Exact(required)
        } else {
            Arity::Range(required, required + params.optional.len())
        }
    }

    /// True if `given` arguments are acceptable.
    pub fn accepts(self, given: usize) -> bool {
        match self {
            Arity::Exact(n) => given == n,
            Arity::Range(min, max) => (min..=max).contains(&given),
            Arity::AtLeast(min) => given >= min,
        }
    }

    /// Fails with `ArgumentError` unless `given` is acceptable.
    pub fn check(self, given: usize) -> Result<(), Exception> {
        if self.accepts(given) {
            Ok(())
        } else {
            Err(Exception::argument_count(given, self))
        }
    }

    /// Ruby's `arity`: the count when fixed, else `-(required + 1)`.
    pub fn ruby_arity(self) -> i64 {
        match self {
            Arity::Exact(n) => n as i64,
            Arity::Range(min, _) | Arity::AtLeast(min) => -(min as i64) - 1,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{}", n),
            Arity::Range(min, max) => write!(f, "{}..{}", min, max),
            Arity::AtLeast(min) => write!(f, "{}+", min),
        }
    }
}

/// What runs when a method is called.
#[derive(Clone)]
pub enum MethodBody {
    /// Built-in
    Native(NativeMethod),
    /// `def`, closed over the scope it was defined in
    User {
        /// The definition
        def: Rc<MethodDef>,
        /// Lexical scope of the definition
        env: Env,
        /// Source file of the definition
        file: Rc<str>,
    },
    /// `define_method` with a block
    Proc(Rc<Proc>),
    /// `attr_reader`; holds the `@name`
    AttrReader(Rc<str>),
    /// `attr_writer`; holds the `@name`
    AttrWriter(Rc<str>),
}

/// A named, visibility-tagged callable.
#[derive(Clone)]
pub struct Method {
    /// Method name
    pub name: Rc<str>,
    /// Visibility
    pub visibility: Visibility,
    /// Accepted argument counts, checked before the body runs
    pub arity: Arity,
    /// Body
    pub body: MethodBody,
    /// Class or module the method was found in; set on insertion
    pub owner: ClassId,
}

impl Method {
    /// A public built-in.
    pub fn native(name: &str, arity: Arity, func: NativeMethod) -> Self {
        Self::new(name, arity, MethodBody::Native(func))
    }

    /// A public method with the given body.
    pub fn new(name: &str, arity: Arity, body: MethodBody) -> Self {
        Self {
            name: Rc::from(name),
            visibility: Visibility::Public,
            arity,
            body,
            owner: ClassId::new(0),
        }
    }

    /// Changes the visibility.
    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// True for methods implemented in Rust.
    pub fn is_native(&self) -> bool {
        matches!(self.body, MethodBody::Native(_))
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = match &self.body {
            MethodBody::Native(_) => "native",
            MethodBody::User { .. } => "def",
            MethodBody::Proc(_) => "define_method",
            MethodBody::AttrReader(_) => "attr_reader",
            MethodBody::AttrWriter(_) => "attr_writer",
        };
        write!(f, "Method({} {} {} [{}])", self.visibility.name(), self.name, self.arity, body)
    }
}

/// The method running in an activation.
#[derive(Debug, Clone)]
pub struct MethodFrame {
    /// Method name
    pub name: Rc<str>,
    /// Where the method was found; `super` searches past it
    pub owner: ClassId,
}

/// A name-to-method table. Later registrations overwrite earlier ones.
#[derive(Debug, Clone, Default)]
pub struct MethodSet {
    methods: FxHashMap<Rc<str>, Method>,
    order: Vec<Rc<str>>,
}

impl MethodSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a method.
    pub fn insert(&mut self, method: Method) {
        let name = method.name.clone();
        if self.methods.insert(name.clone(), method).is_none() {
            self.order.push(name);
        }
    }

    /// Looks up a method by name.
    pub fn get(&self, name: &str) -> Option<&Method> {
        self.methods.get(name)
    }

    /// True if the name is defined here.
    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Removes a method.
    pub fn remove(&mut self, name: &str) -> Option<Method> {
        let removed = self.methods.remove(name)?;
        self.order.retain(|n| &**n != name);
        Some(removed)
    }

    /// Changes a method's visibility; false if it isn't defined here.
    pub fn set_visibility(&mut self, name: &str, visibility: Visibility) -> bool {
        match self.methods.get_mut(name) {
            Some(method) => {
                method.visibility = visibility;
                true
            }
            None => false,
        }
    }

    /// Methods in definition order.
    pub fn iter(&self) -> impl Iterator<Item = &Method> {
        self.order.iter().filter_map(|name| self.methods.get(name))
    }

    /// Number of methods.
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// True if no methods are defined.
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl FromIterator<Method> for MethodSet {
    fn from_iter<I: IntoIterator<Item = Method>>(iter: I) -> Self {
        let mut set = MethodSet::new();
        for method in iter {
            set.insert(method);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, Node, Position};

    fn noop(_ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
        Ok(Value::Nil)
    }

    #[test]
    fn test_arity_from_params() {
        let mut params = Params {
            required: vec!["a".into(), "b".into()],
            ..Params::default()
        };
        assert_eq!(Arity::from_params(&params), Arity::Exact(2));

        params.optional.push(("c".into(), Node::new(Expr::Nil, Position::new(1, 1))));
        assert_eq!(Arity::from_params(&params), Arity::Range(2, 3));

        params.rest = Some("rest".into());
        assert_eq!(Arity::from_params(&params), Arity::AtLeast(2));
    }

    #[test]
    fn test_arity_check_message() {
        let err = Arity::Exact(2).check(1).unwrap_err();
        assert_eq!(err.message, "wrong number of arguments (given 1, expected 2)");
        let err = Arity::Range(1, 2).check(3).unwrap_err();
        assert_eq!(err.message, "wrong number of arguments (given 3, expected 1..2)");
        let err = Arity::AtLeast(1).check(0).unwrap_err();
        assert_eq!(err.message, "wrong number of arguments (given 0, expected 1+)");
        assert!(Arity::ANY.check(99).is_ok());
    }

    #[test]
    fn test_ruby_arity() {
        assert_eq!(Arity::Exact(2).ruby_arity(), 2);
        assert_eq!(Arity::AtLeast(0).ruby_arity(), -1);
        assert_eq!(Arity::Range(1, 3).ruby_arity(), -2);
    }

    #[test]
    fn test_later_registration_wins() {
        let mut set = MethodSet::new();
        set.insert(Method::native("greet", Arity::Exact(0), noop));
        set.insert(Method::native("other", Arity::Exact(0), noop));
        set.insert(Method::native("greet", Arity::Exact(1), noop));

        assert_eq!(set.len(), 2);
        assert_eq!(set.get("greet").map(|m| m.arity), Some(Arity::Exact(1)));
        let names: Vec<_> = set.iter().map(|m| m.name.to_string()).collect();
        assert_eq!(names, vec!["greet", "other"]);
    }

    #[test]
    fn test_set_visibility() {
        let mut set: MethodSet = [Method::native("secret", Arity::ANY, noop)].into_iter().collect();
        assert!(set.set_visibility("secret", Visibility::Private));
        assert_eq!(set.get("secret").map(|m| m.visibility), Some(Visibility::Private));
        assert!(!set.set_visibility("missing", Visibility::Private));
        assert!(set.remove("secret").is_some());
        assert!(set.is_empty());
    }
}
