//! Scoped name resolution.
//!
//! An [`Env`] is a chain of scopes. How a name resolves depends only on its
//! spelling (see [`NameClass`]):
//!
//! - locals live in the nearest scope that binds them, and never resolve
//!   across a [`ScopeKind::Guard`] (method, class body or required file)
//! - instance variables and `self` come from the nearest [`Activation`]
//! - constants resolve lexically through every scope, including guards
//! - globals live in the root scope

use std::cell::{Cell, RefCell};
use std::fmt;
use std::iter;
use std::rc::Rc;

use indexmap::IndexMap;

use super::class::ClassId;
use super::method::{MethodFrame, Visibility};
use super::proc::Proc;
use super::value::Value;

/// Lexical category of a variable name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameClass {
    /// `x`
    Local,
    /// `@x`
    Instance,
    /// `X`
    Constant,
    /// `$x`
    Global,
    /// `self`
    SelfRef,
}

impl NameClass {
    /// Classifies a name by its spelling alone.
    pub fn of(name: &str) -> Self {
        if name == "self" {
            NameClass::SelfRef
        } else if name.starts_with('@') {
            NameClass::Instance
        } else if name.starts_with('$') {
            NameClass::Global
        } else if name.chars().next().is_some_and(char::is_uppercase) {
            NameClass::Constant
        } else {
            NameClass::Local
        }
    }
}

/// How a scope treats names it doesn't bind itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Block or top-level scope; locals resolve outward
    Plain,
    /// Local-variable guard; only non-local names resolve outward
    Guard,
    /// Constant table of a class or module
    Module(ClassId),
}

/// The `self` side of a scope: who is executing and where `def` goes.
pub struct Activation {
    /// Unique id, also the `return` target of the activation
    pub id: u64,
    /// `self`
    pub receiver: Value,
    /// Instance-variable store of the receiver
    pub ivars: Env,
    /// The running method, for `super` and `__method__`
    pub frame: Option<MethodFrame>,
    /// Arguments as passed, for zero-argument `super`
    pub args: Vec<Value>,
    /// The block passed to the running method
    pub block: Option<Rc<Proc>>,
    /// Class that receives methods defined with `def`
    pub definee: ClassId,
    visibility: Cell<Visibility>,
}

impl Activation {
    /// Creates an activation with no method frame and public default visibility.
    pub fn new(id: u64, receiver: Value, ivars: Env, definee: ClassId) -> Self {
        Self {
            id,
            receiver,
            ivars,
            frame: None,
            args: Vec::new(),
            block: None,
            definee,
            visibility: Cell::new(Visibility::Public),
        }
    }

    /// Attaches the running method.
    pub fn with_frame(mut self, frame: MethodFrame, args: Vec<Value>, block: Option<Rc<Proc>>) -> Self {
        self.frame = Some(frame);
        self.args = args;
        self.block = block;
        self
    }

    /// Sets the default visibility for subsequent `def`s.
    pub fn with_visibility(self, visibility: Visibility) -> Self {
        self.visibility.set(visibility);
        self
    }

    /// Default visibility for subsequent `def`s.
    pub fn visibility(&self) -> Visibility {
        self.visibility.get()
    }

    /// Changes the default visibility (`private` with no arguments).
    pub fn set_visibility(&self, visibility: Visibility) {
        self.visibility.set(visibility);
    }
}

struct Scope {
    kind: ScopeKind,
    vars: IndexMap<String, Value>,
    outer: Option<Env>,
    activation: Option<Rc<Activation>>,
    return_tag: Option<u64>,
}

impl Scope {
    fn new(kind: ScopeKind, outer: Option<Env>) -> Self {
        Self {
            kind,
            vars: IndexMap::new(),
            outer,
            activation: None,
            return_tag: None,
        }
    }
}

/// A shared handle to one scope in the chain.
#[derive(Clone)]
pub struct Env(Rc<RefCell<Scope>>);

impl Env {
    fn from_scope(scope: Scope) -> Self {
        Env(Rc::new(RefCell::new(scope)))
    }

    /// The top-level scope of an interpreter, running as `main`.
    pub fn root(activation: Activation) -> Self {
        let mut scope = Scope::new(ScopeKind::Plain, None);
        scope.activation = Some(Rc::new(activation));
        Self::from_scope(scope)
    }

    /// A free-standing variable table (instance variables, tests).
    pub fn store() -> Self {
        Self::from_scope(Scope::new(ScopeKind::Plain, None))
    }

    /// A block scope: sees and updates the locals of `self`.
    pub fn child(&self) -> Self {
        Self::from_scope(Scope::new(ScopeKind::Plain, Some(self.clone())))
    }

    /// A local-variable guard wrapping `self`.
    pub fn guard(&self, activation: Option<Rc<Activation>>) -> Self {
        let mut scope = Scope::new(ScopeKind::Guard, Some(self.clone()));
        scope.activation = activation;
        Self::from_scope(scope)
    }

    /// The constant table of a class or module defined inside `outer`.
    pub fn module_scope(outer: &Env, class: ClassId) -> Self {
        Self::from_scope(Scope::new(ScopeKind::Module(class), Some(outer.clone())))
    }

    /// Installs an activation on this scope.
    pub fn with_activation(self, activation: Rc<Activation>) -> Self {
        self.0.borrow_mut().activation = Some(activation);
        self
    }

    /// Marks this scope as the target of `return`.
    pub fn with_return_tag(self, tag: u64) -> Self {
        self.0.borrow_mut().return_tag = Some(tag);
        self
    }

    /// This scope's kind.
    pub fn kind(&self) -> ScopeKind {
        self.0.borrow().kind
    }

    /// The enclosing scope; for a guard, the wrapped environment.
    pub fn outer(&self) -> Option<Env> {
        self.0.borrow().outer.clone()
    }

    /// Whether two handles name the same scope.
    pub fn ptr_eq(&self, other: &Env) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn scopes(&self) -> impl Iterator<Item = Env> {
        iter::successors(Some(self.clone()), Env::outer)
    }

    /// The outermost scope, home of globals.
    pub fn root_scope(&self) -> Env {
        self.scopes().last().unwrap_or_else(|| self.clone())
    }

    /// The nearest activation.
    pub fn activation(&self) -> Option<Rc<Activation>> {
        self.scopes().find_map(|env| env.0.borrow().activation.clone())
    }

    /// The nearest `return` target; `None` at top level.
    pub fn return_tag(&self) -> Option<u64> {
        self.scopes().find_map(|env| env.0.borrow().return_tag)
    }

    /// The innermost enclosing class or module body.
    pub fn cref(&self) -> Option<ClassId> {
        self.scopes().find_map(|env| match env.kind() {
            ScopeKind::Module(id) => Some(id),
            _ => None,
        })
    }

    /// Resolves a name according to its [`NameClass`].
    pub fn get(&self, name: &str) -> Option<Value> {
        match NameClass::of(name) {
            NameClass::Local => self.find_local(name).and_then(|env| env.get_own(name)),
            NameClass::Instance => self.activation().and_then(|a| a.ivars.get_own(name)),
            NameClass::Constant => self.scopes().find_map(|env| env.get_own(name)),
            NameClass::Global => self.root_scope().get_own(name),
            NameClass::SelfRef => self.activation().map(|a| a.receiver.clone()),
        }
    }

    /// Assigns a name according to its [`NameClass`] and returns the value.
    ///
    /// A local is updated where it is already bound, else bound here.
    /// Constants land in the innermost class body (or the root).
    pub fn set(&self, name: &str, value: Value) -> Value {
        match NameClass::of(name) {
            NameClass::Local => {
                let target = self.find_local(name).unwrap_or_else(|| self.clone());
                target.set_own(name, value.clone());
            }
            NameClass::Instance => {
                if let Some(activation) = self.activation() {
                    activation.ivars.set_own(name, value.clone());
                }
            }
            NameClass::Constant => self.constant_scope().set_own(name, value.clone()),
            NameClass::Global => self.root_scope().set_own(name, value.clone()),
            NameClass::SelfRef => {}
        }
        value
    }

    /// Binds `name` at the root, whatever the current depth.
    pub fn set_global(&self, name: &str, value: Value) -> Value {
        self.root_scope().set_own(name, value.clone());
        value
    }

    /// Binds a local in this very scope, shadowing outer bindings.
    pub fn declare(&self, name: &str, value: Value) {
        self.set_own(name, value);
    }

    /// Removes a binding. Locals are only removed from this scope; constants
    /// and instance variables from wherever they live.
    pub fn unset(&self, name: &str) -> Option<Value> {
        match NameClass::of(name) {
            NameClass::Local => self.remove_own(name),
            NameClass::Instance => self.activation().and_then(|a| a.ivars.remove_own(name)),
            NameClass::Constant => self
                .scopes()
                .find(|env| env.0.borrow().vars.contains_key(name))
                .and_then(|env| env.remove_own(name)),
            NameClass::Global => self.root_scope().remove_own(name),
            NameClass::SelfRef => None,
        }
    }

    /// Every visible binding, nearest scope winning.
    pub fn get_all(&self) -> IndexMap<String, Value> {
        let mut all = self.outer().map(|outer| outer.get_all()).unwrap_or_default();
        for (name, value) in &self.0.borrow().vars {
            all.insert(name.clone(), value.clone());
        }
        all
    }

    /// Names of the locals visible from here, nearest first.
    pub fn local_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for env in self.scopes() {
            let scope = env.0.borrow();
            for name in scope.vars.keys() {
                if NameClass::of(name) == NameClass::Local && !names.contains(name) {
                    names.push(name.clone());
                }
            }
            if scope.kind != ScopeKind::Plain {
                break;
            }
        }
        names
    }

    /// An independent shallow copy with no outer link.
    pub fn detached(&self) -> Env {
        let scope = self.0.borrow();
        let mut copy = Scope::new(ScopeKind::Plain, None);
        copy.vars = scope.vars.clone();
        copy.activation = scope.activation.clone();
        Self::from_scope(copy)
    }

    /// Reads a binding of this scope only.
    pub fn get_own(&self, name: &str) -> Option<Value> {
        self.0.borrow().vars.get(name).cloned()
    }

    /// Writes a binding of this scope only.
    pub fn set_own(&self, name: &str, value: Value) {
        let mut scope = self.0.borrow_mut();
        if let Some(slot) = scope.vars.get_mut(name) {
            *slot = value;
        } else {
            scope.vars.insert(name.to_string(), value);
        }
    }

    /// Removes a binding of this scope only.
    pub fn remove_own(&self, name: &str) -> Option<Value> {
        self.0.borrow_mut().vars.shift_remove(name)
    }

    /// This scope's binding names in definition order.
    pub fn names(&self) -> Vec<String> {
        self.0.borrow().vars.keys().cloned().collect()
    }

    /// Number of bindings in this scope.
    pub fn len(&self) -> usize {
        self.0.borrow().vars.len()
    }

    /// True if this scope binds nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn find_local(&self, name: &str) -> Option<Env> {
        for env in self.scopes() {
            let (found, opaque) = {
                let scope = env.0.borrow();
                (scope.vars.contains_key(name), scope.kind != ScopeKind::Plain)
            };
            if found {
                return Some(env);
            }
            if opaque {
                return None;
            }
        }
        None
    }

    /// Where a constant assigned here lands: the innermost class body, or the root.
    pub fn constant_scope(&self) -> Env {
        self.scopes()
            .find(|env| {
                let scope = env.0.borrow();
                matches!(scope.kind, ScopeKind::Module(_)) || scope.outer.is_none()
            })
            .unwrap_or_else(|| self.clone())
    }
}

// Values reachable from a scope may point back at it, so only names are shown
impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scope = self.0.borrow();
        f.debug_struct("Env")
            .field("kind", &scope.kind)
            .field("names", &scope.vars.keys().collect::<Vec<_>>())
            .field("has_outer", &scope.outer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn main_activation() -> Activation {
        Activation::new(1, Value::symbol("main"), Env::store(), ClassId::new(0))
    }

    #[test]
    fn test_name_classes() {
        assert_eq!(NameClass::of("x"), NameClass::Local);
        assert_eq!(NameClass::of("_tmp"), NameClass::Local);
        assert_eq!(NameClass::of("@x"), NameClass::Instance);
        assert_eq!(NameClass::of("Foo"), NameClass::Constant);
        assert_eq!(NameClass::of("$stdout"), NameClass::Global);
        assert_eq!(NameClass::of("self"), NameClass::SelfRef);
    }

    #[test]
    fn test_nearest_binding_wins() {
        let root = Env::root(main_activation());
        root.set("x", Value::Integer(1));
        let block = root.child();
        assert_eq!(block.get("x"), Some(Value::Integer(1)));

        block.declare("x", Value::Integer(2));
        assert_eq!(block.get("x"), Some(Value::Integer(2)));
        assert_eq!(root.get("x"), Some(Value::Integer(1)));
    }

    #[test]
    fn test_block_updates_outer_local() {
        let root = Env::root(main_activation());
        root.set("total", Value::Integer(0));
        root.child().set("total", Value::Integer(5));
        assert_eq!(root.get("total"), Some(Value::Integer(5)));
    }

    #[test]
    fn test_siblings_are_isolated() {
        let root = Env::root(main_activation());
        let left = root.child();
        let right = root.child();
        left.set("only_left", Value::Integer(1));
        assert_eq!(right.get("only_left"), None);
        assert_eq!(root.get("only_left"), None);
    }

    #[test]
    fn test_set_global_from_any_depth() {
        let root = Env::root(main_activation());
        let deep = root.child().guard(None).child();
        deep.set_global("$answer", Value::Integer(42));
        assert_eq!(root.get("$answer"), Some(Value::Integer(42)));
        assert_eq!(root.child().get("$answer"), Some(Value::Integer(42)));

        deep.set("$other", Value::Integer(1));
        assert_eq!(root.get_own("$other"), Some(Value::Integer(1)));
    }

    #[test]
    fn test_guard_hides_locals_only() {
        let root = Env::root(main_activation());
        root.set("secret", Value::Integer(1));
        root.set("Limit", Value::Integer(10));
        root.set("@count", Value::Integer(3));

        let method = root.guard(None);
        assert_eq!(method.get("secret"), None);
        assert_eq!(method.get("Limit"), Some(Value::Integer(10)));
        assert_eq!(method.get("@count"), Some(Value::Integer(3)));
        assert_eq!(method.get("self"), Some(Value::symbol("main")));

        method.set("secret", Value::Integer(2));
        assert_eq!(root.get("secret"), Some(Value::Integer(1)));
    }

    #[test]
    fn test_guard_unset() {
        let root = Env::root(main_activation());
        root.set("Limit", Value::Integer(10));
        root.set("x", Value::Integer(1));
        let guard = root.guard(None);
        guard.set("x", Value::Integer(2));

        assert_eq!(guard.unset("x"), Some(Value::Integer(2)));
        assert_eq!(guard.unset("x"), None);
        assert_eq!(root.get("x"), Some(Value::Integer(1)));

        assert_eq!(guard.unset("Limit"), Some(Value::Integer(10)));
        assert_eq!(root.get("Limit"), None);
    }

    #[test]
    fn test_get_all_prefers_locals() {
        let root = Env::root(main_activation());
        root.set("x", Value::Integer(1));
        root.set("Y", Value::Integer(2));
        let guard = root.guard(None);
        guard.set("x", Value::Integer(3));

        let all = guard.get_all();
        assert_eq!(all.get("x"), Some(&Value::Integer(3)));
        assert_eq!(all.get("Y"), Some(&Value::Integer(2)));
    }

    #[test]
    fn test_constants_land_in_module_scope() {
        let root = Env::root(main_activation());
        let class_consts = Env::module_scope(&root, ClassId::new(3));
        let body = class_consts.guard(None);
        body.child().set("INNER", Value::Integer(1));

        assert_eq!(class_consts.get_own("INNER"), Some(Value::Integer(1)));
        assert_eq!(root.get("INNER"), None);
        assert_eq!(body.cref(), Some(ClassId::new(3)));

        root.child().set("TOP", Value::Integer(2));
        assert_eq!(root.get_own("TOP"), Some(Value::Integer(2)));
    }

    #[test]
    fn test_local_names_stop_at_guard() {
        let root = Env::root(main_activation());
        root.set("a", Value::Nil);
        let block = root.child();
        block.set("b", Value::Nil);
        assert_eq!(block.local_names(), vec!["b".to_string(), "a".to_string()]);
        assert!(block.guard(None).local_names().is_empty());
    }

    #[test]
    fn test_detached_copy() {
        let root = Env::root(main_activation());
        root.set("x", Value::Integer(1));
        let child = root.child();
        child.set("y", Value::Integer(2));

        let copy = child.detached();
        assert!(copy.outer().is_none());
        assert_eq!(copy.get("y"), Some(Value::Integer(2)));
        assert_eq!(copy.get("x"), None);
        copy.set("y", Value::Integer(3));
        assert_eq!(child.get("y"), Some(Value::Integer(2)));
    }

    #[test]
    fn test_return_tags() {
        let root = Env::root(main_activation());
        assert_eq!(root.return_tag(), None);
        let method = root.guard(None).with_return_tag(7);
        assert_eq!(method.child().child().return_tag(), Some(7));
    }
}
