//! The object model: classes, modules, eigenclasses and singleton classes.
//!
//! Classes live in an arena owned by the [`Registry`] and are addressed by
//! [`ClassId`]. Back-references (eigenclass to wrapped class, singleton class
//! to its object) are plain ids, so the class graph owns no cycles.
//!
//! Every class and module gets an eigenclass when it is created; the
//! eigenclass chain mirrors the superclass chain, so class methods are
//! inherited the same way instance methods are. Per-object singleton
//! classes are created on demand and sit between an object and its
//! original class.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;
use tracing::debug;

use super::environment::Env;
use super::error::{Exception, ExceptionKind};
use super::method::{Method, MethodSet, Visibility};
use super::proc::Proc;
use super::value::{RubyHash, Value};

/// Handle to a class or module in the [`Registry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u32);

impl ClassId {
    pub(crate) fn new(index: usize) -> Self {
        ClassId(index as u32)
    }

    /// Arena index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// What a class-like entry is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    /// Ordinary class
    Class,
    /// Module (mixin)
    Module,
    /// A class's own singleton class, holder of its class methods
    Eigenclass {
        /// The class whose methods these are
        wrapped: ClassId,
    },
    /// Shadow class carrying one object's singleton methods
    Singleton {
        /// `object_id` of the owning object
        object_id: u64,
    },
}

/// One class, module, eigenclass or singleton class.
pub struct ClassData {
    /// Constant name; `None` until an anonymous class is assigned to one
    pub name: Option<String>,
    /// Kind
    pub kind: ClassKind,
    /// Superclass; `None` for `BasicObject` and modules
    pub superclass: Option<ClassId>,
    /// Instance methods defined directly here
    pub methods: MethodSet,
    /// Included modules in inclusion order
    pub includes: Vec<ClassId>,
    /// Eigenclass, for classes and modules
    pub eigenclass: Option<ClassId>,
    /// Constants defined in the body
    pub constants: Env,
    /// Class-level instance variables
    pub ivars: Env,
    /// Nearest built-in exception kind, for exception classes
    pub exception_kind: Option<ExceptionKind>,
}

impl fmt::Debug for ClassData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassData")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("superclass", &self.superclass)
            .field("methods", &self.methods.len())
            .field("includes", &self.includes)
            .finish_non_exhaustive()
    }
}

/// Ids of the classes the interpreter itself relies on.
#[derive(Debug, Clone, Copy)]
pub struct CoreClasses {
    /// `BasicObject`
    pub basic_object: ClassId,
    /// `Object`
    pub object: ClassId,
    /// `Module`
    pub module: ClassId,
    /// `Class`
    pub class: ClassId,
    /// `Kernel`
    pub kernel: ClassId,
    /// `Comparable`
    pub comparable: ClassId,
    /// `Enumerable`
    pub enumerable: ClassId,
    /// `NilClass`
    pub nil: ClassId,
    /// `TrueClass`
    pub true_class: ClassId,
    /// `FalseClass`
    pub false_class: ClassId,
    /// `Integer`
    pub integer: ClassId,
    /// `String`
    pub string: ClassId,
    /// `Symbol`
    pub symbol: ClassId,
    /// `Array`
    pub array: ClassId,
    /// `Hash`
    pub hash: ClassId,
    /// `Proc`
    pub proc_class: ClassId,
    exceptions: [ClassId; ExceptionKind::ALL.len()],
}

impl CoreClasses {
    /// The class of a built-in exception kind.
    pub fn exception(&self, kind: ExceptionKind) -> ClassId {
        self.exceptions[kind.index()]
    }
}

/// A built-in heap value with a singleton class. Holding the weak handle
/// keeps the allocation, and so the address used as its key, from being
/// reused while the entry exists.
#[derive(Debug)]
enum Pinned {
    String(Weak<RefCell<String>>),
    Array(Weak<RefCell<Vec<Value>>>),
    Hash(Weak<RefCell<RubyHash>>),
    Proc(Weak<Proc>),
}

impl Pinned {
    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Pinned::String(Rc::downgrade(s))),
            Value::Array(a) => Some(Pinned::Array(Rc::downgrade(a))),
            Value::Hash(h) => Some(Pinned::Hash(Rc::downgrade(h))),
            Value::Proc(p) => Some(Pinned::Proc(Rc::downgrade(p))),
            _ => None,
        }
    }

    fn is_alive(&self) -> bool {
        match self {
            Pinned::String(w) => w.strong_count() > 0,
            Pinned::Array(w) => w.strong_count() > 0,
            Pinned::Hash(w) => w.strong_count() > 0,
            Pinned::Proc(w) => w.strong_count() > 0,
        }
    }
}

/// The class arena of one interpreter.
#[derive(Debug)]
pub struct Registry {
    classes: Vec<ClassData>,
    core: CoreClasses,
    /// Singleton classes of strings, arrays, hashes and procs, by `object_id`
    shadows: FxHashMap<i64, (ClassId, Pinned)>,
}

impl Registry {
    /// Builds the core class hierarchy with empty method sets and binds
    /// every core constant in `root`.
    pub fn new(root: &Env) -> Self {
        let placeholder = ClassId::new(0);
        let mut registry = Registry {
            classes: Vec::new(),
            core: CoreClasses {
                basic_object: placeholder,
                object: placeholder,
                module: placeholder,
                class: placeholder,
                kernel: placeholder,
                comparable: placeholder,
                enumerable: placeholder,
                nil: placeholder,
                true_class: placeholder,
                false_class: placeholder,
                integer: placeholder,
                string: placeholder,
                symbol: placeholder,
                array: placeholder,
                hash: placeholder,
                proc_class: placeholder,
                exceptions: [placeholder; ExceptionKind::ALL.len()],
            },
            shadows: FxHashMap::default(),
        };

        // The four roots reference each other through their eigenclasses,
        // so they are wired up by hand before anything else exists.
        let basic_object = registry.push(ClassData::new(Some("BasicObject"), ClassKind::Class, None, root));
        let object = registry.push(ClassData::new(Some("Object"), ClassKind::Class, Some(basic_object), root));
        let module = registry.push(ClassData::new(Some("Module"), ClassKind::Class, Some(object), root));
        let class = registry.push(ClassData::new(Some("Class"), ClassKind::Class, Some(module), root));
        registry.core.basic_object = basic_object;
        registry.core.object = object;
        registry.core.module = module;
        registry.core.class = class;
        for id in [basic_object, object, module, class] {
            if id != object {
                registry.classes[id.index()].constants = Env::module_scope(root, id);
            }
            registry.attach_eigenclass(id);
            root.set(registry.name_of(id).as_str(), Value::Class(id));
        }

        registry.core.kernel = registry.core_module("Kernel", root);
        registry.core.comparable = registry.core_module("Comparable", root);
        registry.core.enumerable = registry.core_module("Enumerable", root);
        registry.core.nil = registry.core_class("NilClass", object, root);
        registry.core.true_class = registry.core_class("TrueClass", object, root);
        registry.core.false_class = registry.core_class("FalseClass", object, root);
        registry.core.integer = registry.core_class("Integer", object, root);
        registry.core.string = registry.core_class("String", object, root);
        registry.core.symbol = registry.core_class("Symbol", object, root);
        registry.core.array = registry.core_class("Array", object, root);
        registry.core.hash = registry.core_class("Hash", object, root);
        registry.core.proc_class = registry.core_class("Proc", object, root);

        for kind in ExceptionKind::ALL {
            let superclass = kind.parent().map_or(object, |parent| registry.core.exception(parent));
            let id = registry.core_class(kind.name(), superclass, root);
            registry.classes[id.index()].exception_kind = Some(kind);
            registry.core.exceptions[kind.index()] = id;
        }

        let core = registry.core;
        let mixins = [
            (core.object, core.kernel),
            (core.integer, core.comparable),
            (core.string, core.comparable),
            (core.array, core.enumerable),
            (core.hash, core.enumerable),
        ];
        for (class, module) in mixins {
            registry.classes[class.index()].includes.push(module);
        }
        registry
    }

    fn core_class(&mut self, name: &str, superclass: ClassId, root: &Env) -> ClassId {
        let id = self.define_class(Some(name), superclass, root);
        root.set(name, Value::Class(id));
        id
    }

    fn core_module(&mut self, name: &str, root: &Env) -> ClassId {
        let id = self.define_module(Some(name), root);
        root.set(name, Value::Class(id));
        id
    }

    fn push(&mut self, data: ClassData) -> ClassId {
        let id = ClassId::new(self.classes.len());
        self.classes.push(data);
        id
    }

    /// The core classes.
    pub fn core(&self) -> &CoreClasses {
        &self.core
    }

    /// Class data by id.
    pub fn class(&self, id: ClassId) -> &ClassData {
        &self.classes[id.index()]
    }

    /// Mutable class data by id.
    pub fn class_mut(&mut self, id: ClassId) -> &mut ClassData {
        &mut self.classes[id.index()]
    }

    /// Number of entries in the arena.
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Never true once bootstrapped.
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Creates a class with an eigenclass. Constants defined in its body are
    /// resolved lexically from `lexical`.
    pub fn define_class(&mut self, name: Option<&str>, superclass: ClassId, lexical: &Env) -> ClassId {
        let exception_kind = self.class(superclass).exception_kind;
        let id = self.push(ClassData::new(name, ClassKind::Class, Some(superclass), lexical));
        self.classes[id.index()].constants = Env::module_scope(lexical, id);
        self.classes[id.index()].exception_kind = exception_kind;
        self.attach_eigenclass(id);
        debug!(class = %self.name_of(id), superclass = %self.name_of(superclass), "defined class");
        id
    }

    /// Builds a class from ready-made instance and class method sets.
    pub fn new_class(
        &mut self,
        name: Option<&str>,
        superclass: ClassId,
        instance_methods: MethodSet,
        class_methods: MethodSet,
        lexical: &Env,
    ) -> ClassId {
        let id = self.define_class(name, superclass, lexical);
        for method in instance_methods.iter() {
            self.define_method(id, method.clone());
        }
        let eigenclass = self.ensure_eigenclass(id);
        for method in class_methods.iter() {
            self.define_method(eigenclass, method.clone());
        }
        id
    }

    /// Creates a module with an eigenclass.
    pub fn define_module(&mut self, name: Option<&str>, lexical: &Env) -> ClassId {
        let id = self.push(ClassData::new(name, ClassKind::Module, None, lexical));
        self.classes[id.index()].constants = Env::module_scope(lexical, id);
        self.attach_eigenclass(id);
        debug!(module = %self.name_of(id), "defined module");
        id
    }

    fn attach_eigenclass(&mut self, id: ClassId) {
        let data = self.class(id);
        let superclass = match (data.kind, data.superclass) {
            (ClassKind::Module, _) => self.core.module,
            (_, Some(superclass)) => self.ensure_eigenclass(superclass),
            (_, None) => self.core.class,
        };
        let constants = self.class(id).constants.clone();
        let eigen = ClassData::new(None, ClassKind::Eigenclass { wrapped: id }, Some(superclass), &constants);
        let eigen_id = self.push(eigen);
        self.classes[id.index()].eigenclass = Some(eigen_id);
    }

    /// The eigenclass of a class-like entry, creating one if needed.
    pub fn ensure_eigenclass(&mut self, id: ClassId) -> ClassId {
        if let Some(eigen) = self.class(id).eigenclass {
            return eigen;
        }
        self.attach_eigenclass(id);
        self.class(id).eigenclass.unwrap_or(self.core.class)
    }

    /// The class a singleton method on `value` goes into, creating a shadow
    /// class for plain objects on first use.
    pub fn singleton_class_of(&mut self, value: &Value) -> Result<ClassId, Exception> {
        match value {
            Value::Class(id) => Ok(self.ensure_eigenclass(*id)),
            Value::Object(instance) => {
                let current = instance.class();
                if matches!(self.class(current).kind, ClassKind::Singleton { .. }) {
                    return Ok(current);
                }
                let constants = self.class(current).constants.clone();
                let mut shadow = ClassData::new(
                    None,
                    ClassKind::Singleton { object_id: instance.id },
                    Some(current),
                    &constants,
                );
                shadow.exception_kind = self.class(current).exception_kind;
                let id = self.push(shadow);
                instance.set_class(id);
                debug!(object_id = instance.id, class = %self.name_of(current), "created singleton class");
                Ok(id)
            }
            Value::String(_) | Value::Array(_) | Value::Hash(_) | Value::Proc(_) => {
                let key = value.object_id();
                if let Some((id, _)) = self.shadows.get(&key) {
                    return Ok(*id);
                }
                let current = self.class_of(value);
                let constants = self.class(current).constants.clone();
                let shadow = ClassData::new(
                    None,
                    ClassKind::Singleton { object_id: key as u64 },
                    Some(current),
                    &constants,
                );
                let id = self.push(shadow);
                self.shadows.retain(|_, (_, pinned)| pinned.is_alive());
                if let Some(pinned) = Pinned::of(value) {
                    self.shadows.insert(key, (id, pinned));
                }
                debug!(object_id = key, class = %self.name_of(current), "created singleton class");
                Ok(id)
            }
            other => Err(Exception::type_error(format!(
                "can't define singleton for {}",
                self.name_of(self.class_of(other))
            ))),
        }
    }

    /// Where method lookup for `value` starts.
    pub fn dispatch_class(&self, value: &Value) -> ClassId {
        match value {
            Value::Object(instance) => instance.class(),
            Value::Class(id) => self.class(*id).eigenclass.unwrap_or(self.core.class),
            Value::String(_) | Value::Array(_) | Value::Hash(_) | Value::Proc(_) if !self.shadows.is_empty() => self
                .shadows
                .get(&value.object_id())
                .map_or_else(|| self.class_of(value), |(id, _)| *id),
            other => self.class_of(other),
        }
    }

    /// `value.class`: never a singleton or eigenclass.
    pub fn class_of(&self, value: &Value) -> ClassId {
        match value {
            Value::Nil => self.core.nil,
            Value::Bool(true) => self.core.true_class,
            Value::Bool(false) => self.core.false_class,
            Value::Integer(_) => self.core.integer,
            Value::String(_) => self.core.string,
            Value::Symbol(_) => self.core.symbol,
            Value::Array(_) => self.core.array,
            Value::Hash(_) => self.core.hash,
            Value::Proc(_) => self.core.proc_class,
            Value::Object(instance) => self.real_class(instance.class()),
            Value::Class(id) => match self.class(*id).kind {
                ClassKind::Module => self.core.module,
                _ => self.core.class,
            },
        }
    }

    /// Skips singleton shadows up to the original class.
    pub fn real_class(&self, mut id: ClassId) -> ClassId {
        while let ClassKind::Singleton { .. } = self.class(id).kind {
            match self.class(id).superclass {
                Some(superclass) => id = superclass,
                None => break,
            }
        }
        id
    }

    /// Display name: `Foo`, `#<Class:Foo>` for eigenclasses, or an
    /// address-like form for anonymous classes.
    pub fn name_of(&self, id: ClassId) -> String {
        let data = self.class(id);
        match (&data.name, data.kind) {
            (Some(name), _) => name.clone(),
            (None, ClassKind::Eigenclass { wrapped }) => format!("#<Class:{}>", self.name_of(wrapped)),
            (None, ClassKind::Singleton { .. }) => {
                let original = data.superclass.map(|s| self.name_of(s)).unwrap_or_default();
                format!("#<Class:#<{}>>", original)
            }
            (None, ClassKind::Module) => format!("#<Module:0x{:016x}>", id.index() * 8),
            (None, ClassKind::Class) => format!("#<Class:0x{:016x}>", id.index() * 8),
        }
    }

    /// Names an anonymous class the first time it is bound to a constant.
    pub fn assign_name(&mut self, id: ClassId, name: &str) -> bool {
        let data = self.class_mut(id);
        if data.name.is_some() || !matches!(data.kind, ClassKind::Class | ClassKind::Module) {
            return false;
        }
        data.name = Some(name.to_string());
        true
    }

    /// True for modules.
    pub fn is_module(&self, id: ClassId) -> bool {
        self.class(id).kind == ClassKind::Module
    }

    /// Method resolution order: the class, its modules in inclusion order
    /// (each followed by the modules it includes), then the superclass's
    /// ancestry. No entry appears twice.
    pub fn ancestors(&self, id: ClassId) -> Vec<ClassId> {
        let mut out = Vec::new();
        let mut current = Some(id);
        while let Some(class) = current {
            self.push_with_modules(class, &mut out);
            current = self.class(class).superclass;
        }
        out
    }

    fn push_with_modules(&self, id: ClassId, out: &mut Vec<ClassId>) {
        if out.contains(&id) {
            return;
        }
        out.push(id);
        for &module in &self.class(id).includes {
            self.push_with_modules(module, out);
        }
    }

    /// True if `ancestor` appears in the ancestry of `id`.
    pub fn is_subclass(&self, id: ClassId, ancestor: ClassId) -> bool {
        id == ancestor || self.ancestors(id).contains(&ancestor)
    }

    /// `value.is_a?(class)`.
    pub fn is_a(&self, value: &Value, class: ClassId) -> bool {
        self.is_subclass(self.dispatch_class(value), class)
    }

    /// Finds a method along the ancestry of `class`.
    pub fn find_method(&self, class: ClassId, name: &str) -> Option<Method> {
        self.ancestors(class).into_iter().find_map(|owner| self.own_method(owner, name))
    }

    /// Finds the next method after `owner` in the ancestry of `class`, for `super`.
    pub fn find_super_method(&self, class: ClassId, owner: ClassId, name: &str) -> Option<Method> {
        self.ancestors(class)
            .into_iter()
            .skip_while(|c| *c != owner)
            .skip(1)
            .find_map(|c| self.own_method(c, name))
    }

    fn own_method(&self, owner: ClassId, name: &str) -> Option<Method> {
        self.class(owner).methods.get(name).map(|method| {
            let mut method = method.clone();
            method.owner = owner;
            method
        })
    }

    /// Adds a method to a class's own method set.
    pub fn define_method(&mut self, class: ClassId, mut method: Method) {
        method.owner = class;
        debug!(class = %self.name_of(class), method = %method.name, visibility = method.visibility.name(), "defined method");
        self.class_mut(class).methods.insert(method);
    }

    /// Adds a singleton method to one object (or class).
    pub fn add_singleton_method(&mut self, value: &Value, method: Method) -> Result<ClassId, Exception> {
        let class = self.singleton_class_of(value)?;
        self.define_method(class, method);
        Ok(class)
    }

    /// `alias new old`: copies the method visible as `old` into `class`
    /// under the name `new`.
    pub fn alias_method(&mut self, class: ClassId, new_name: &str, old_name: &str) -> Result<(), Exception> {
        let Some(mut method) = self.find_method(class, old_name) else {
            return Err(Exception::new(
                ExceptionKind::NameError,
                format!("undefined method '{}' for class '{}'", old_name, self.name_of(class)),
            ));
        };
        method.name = Rc::from(new_name);
        self.define_method(class, method);
        Ok(())
    }

    /// Mixes `module` into `class`. Returns false if it was already an ancestor.
    pub fn include_module(&mut self, class: ClassId, module: ClassId) -> Result<bool, Exception> {
        if !self.is_module(module) {
            return Err(Exception::type_error(format!(
                "wrong argument type {} (expected Module)",
                self.name_of(self.class_of(&Value::Class(module)))
            )));
        }
        if self.ancestors(module).contains(&class) {
            return Err(Exception::argument("cyclic include detected"));
        }
        if self.ancestors(class).contains(&module) {
            return Ok(false);
        }
        self.class_mut(class).includes.push(module);
        debug!(class = %self.name_of(class), module = %self.name_of(module), "included module");
        Ok(true)
    }

    /// Changes the visibility of `name` as seen from `class`, copying an
    /// inherited method down when needed.
    pub fn set_visibility(&mut self, class: ClassId, name: &str, visibility: Visibility) -> Result<(), Exception> {
        if self.class_mut(class).methods.set_visibility(name, visibility) {
            return Ok(());
        }
        match self.find_method(class, name) {
            Some(method) => {
                self.define_method(class, method.with_visibility(visibility));
                Ok(())
            }
            None => Err(Exception::new(
                ExceptionKind::NameError,
                format!("undefined method '{}' for class '{}'", name, self.name_of(class)),
            )),
        }
    }

    /// Method names visible on instances of `class`, for `instance_methods`.
    pub fn method_names(&self, class: ClassId, inherit: bool, visible: impl Fn(Visibility) -> bool) -> Vec<String> {
        let owners = if inherit { self.ancestors(class) } else { vec![class] };
        let mut seen: Vec<String> = Vec::new();
        let mut names = Vec::new();
        for owner in owners {
            for method in self.class(owner).methods.iter() {
                if seen.iter().any(|n| **n == *method.name) {
                    continue;
                }
                seen.push(method.name.to_string());
                if visible(method.visibility) {
                    names.push(method.name.to_string());
                }
            }
        }
        names
    }

    /// Resolves `Scope::NAME`: the class's own constants, then its ancestors.
    /// Top-level constants are only found through `Object` itself.
    pub fn lookup_constant(&self, class: ClassId, name: &str) -> Option<Value> {
        self.ancestors(class)
            .into_iter()
            .filter(|c| *c == class || *c != self.core.object)
            .find_map(|c| self.class(c).constants.get_own(name))
    }

    /// The class `rescue` matches an exception against.
    pub fn exception_class_of(&self, exception: &Exception) -> ClassId {
        match &exception.object {
            Some(object) => self.real_class(object.class()),
            None => self.core.exception(exception.kind),
        }
    }
}

impl ClassData {
    fn new(name: Option<&str>, kind: ClassKind, superclass: Option<ClassId>, lexical: &Env) -> Self {
        Self {
            name: name.map(str::to_string),
            kind,
            superclass,
            methods: MethodSet::new(),
            includes: Vec::new(),
            eigenclass: None,
            constants: lexical.clone(),
            ivars: Env::store(),
            exception_kind: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::context::CallContext;
    use crate::runtime::environment::Activation;
    use crate::runtime::error::EvalResult;
    use crate::runtime::method::Arity;
    use crate::runtime::value::Instance;

    fn noop(_ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
        Ok(Value::Nil)
    }

    fn setup() -> (Registry, Env) {
        let root = Env::root(Activation::new(0, Value::Nil, Env::store(), ClassId::new(1)));
        let registry = Registry::new(&root);
        (registry, root)
    }

    fn names(registry: &Registry, ids: &[ClassId]) -> Vec<String> {
        ids.iter().map(|id| registry.name_of(*id)).collect()
    }

    #[test]
    fn test_core_constants_bound() {
        let (registry, root) = setup();
        let core = *registry.core();
        assert!(matches!(root.get("Integer"), Some(Value::Class(id)) if id == core.integer));
        assert!(matches!(root.get("ZeroDivisionError"), Some(Value::Class(_))));
        assert_eq!(registry.class(core.basic_object).superclass, None);
    }

    #[test]
    fn test_ancestors_with_mixin() {
        let (mut registry, root) = setup();
        let core = *registry.core();
        let foo = registry.new_class(Some("Foo"), core.basic_object, MethodSet::new(), MethodSet::new(), &root);
        registry.include_module(foo, core.kernel).unwrap();
        assert_eq!(names(&registry, &registry.ancestors(foo)), vec!["Foo", "Kernel", "BasicObject"]);
    }

    #[test]
    fn test_modules_in_inclusion_order() {
        let (mut registry, root) = setup();
        let core = *registry.core();
        let a = registry.define_module(Some("A"), &root);
        let b = registry.define_module(Some("B"), &root);
        let c = registry.define_module(Some("C"), &root);
        registry.include_module(b, c).unwrap();
        let foo = registry.define_class(Some("Foo"), core.object, &root);
        registry.include_module(foo, a).unwrap();
        registry.include_module(foo, b).unwrap();

        let ancestors = names(&registry, &registry.ancestors(foo));
        assert_eq!(&ancestors[..5], &["Foo", "A", "B", "C", "Object"]);
        assert_eq!(ancestors.last().map(String::as_str), Some("BasicObject"));
    }

    #[test]
    fn test_no_duplicate_modules() {
        let (mut registry, root) = setup();
        let core = *registry.core();
        let foo = registry.define_class(Some("Foo"), core.object, &root);
        assert!(matches!(registry.include_module(foo, core.kernel), Ok(false)));
        let kernels = registry.ancestors(foo).iter().filter(|id| **id == core.kernel).count();
        assert_eq!(kernels, 1);
        assert!(registry.include_module(core.kernel, core.kernel).is_err());
        assert!(registry.include_module(foo, core.object).is_err());
    }

    #[test]
    fn test_method_lookup_and_override() {
        let (mut registry, root) = setup();
        let core = *registry.core();
        let mixin = registry.define_module(Some("Greeting"), &root);
        registry.define_method(mixin, Method::native("greet", Arity::Exact(0), noop));
        registry.define_method(mixin, Method::native("wave", Arity::Exact(0), noop));
        let foo = registry.define_class(Some("Foo"), core.object, &root);
        registry.include_module(foo, mixin).unwrap();
        registry.define_method(foo, Method::native("greet", Arity::Exact(1), noop));

        let greet = registry.find_method(foo, "greet").unwrap();
        assert_eq!(greet.owner, foo);
        assert_eq!(greet.arity, Arity::Exact(1));
        assert_eq!(registry.find_method(foo, "wave").unwrap().owner, mixin);

        let next = registry.find_super_method(foo, foo, "greet").unwrap();
        assert_eq!(next.owner, mixin);
        assert!(registry.find_super_method(foo, mixin, "greet").is_none());
    }

    #[test]
    fn test_class_methods_are_inherited() {
        let (mut registry, root) = setup();
        let core = *registry.core();
        let mut class_methods = MethodSet::new();
        class_methods.insert(Method::native("create", Arity::ANY, noop));
        let base = registry.new_class(Some("Base"), core.object, MethodSet::new(), class_methods, &root);
        let derived = registry.define_class(Some("Derived"), base, &root);

        let lookup = registry.dispatch_class(&Value::Class(derived));
        assert!(registry.find_method(lookup, "create").is_some());
        assert!(registry.find_method(registry.dispatch_class(&Value::Class(core.object)), "create").is_none());
        assert_eq!(registry.name_of(lookup), "#<Class:Derived>");
    }

    #[test]
    fn test_singleton_methods_are_per_object() {
        let (mut registry, root) = setup();
        let core = *registry.core();
        let foo = registry.define_class(Some("Foo"), core.object, &root);
        let first = Value::Object(Instance::new(foo));
        let second = Value::Object(Instance::new(foo));

        registry
            .add_singleton_method(&first, Method::native("greet", Arity::Exact(0), noop))
            .unwrap();
        assert!(registry.find_method(registry.dispatch_class(&first), "greet").is_some());
        assert!(registry.find_method(registry.dispatch_class(&second), "greet").is_none());
        assert_eq!(registry.class_of(&first), foo);

        let again = registry.singleton_class_of(&first).unwrap();
        assert_eq!(again, registry.dispatch_class(&first));
        assert!(registry.singleton_class_of(&Value::Integer(1)).is_err());
    }

    #[test]
    fn test_singleton_methods_on_builtin_values() {
        let (mut registry, _root) = setup();
        let core = *registry.core();
        let first = Value::string("x");
        let second = Value::string("x");

        let shadow = registry
            .add_singleton_method(&first, Method::native("hi", Arity::Exact(0), noop))
            .unwrap();
        assert_eq!(registry.dispatch_class(&first), shadow);
        assert_eq!(registry.dispatch_class(&second), core.string);
        assert_eq!(registry.dispatch_class(&first.clone()), shadow);
        assert_eq!(registry.class_of(&first), core.string);
        assert_eq!(registry.singleton_class_of(&first).unwrap(), shadow);

        let list = Value::array(Vec::new());
        let list_shadow = registry.singleton_class_of(&list).unwrap();
        assert_ne!(list_shadow, shadow);
        assert_eq!(registry.real_class(list_shadow), core.array);
        assert!(registry.singleton_class_of(&Value::symbol("s")).is_err());
        assert!(registry.singleton_class_of(&Value::Nil).is_err());
    }

    #[test]
    fn test_exception_classes() {
        let (mut registry, root) = setup();
        let core = *registry.core();
        let zero = core.exception(ExceptionKind::ZeroDivisionError);
        assert!(registry.is_subclass(zero, core.exception(ExceptionKind::StandardError)));

        let custom = registry.define_class(Some("MyError"), zero, &root);
        assert_eq!(registry.class(custom).exception_kind, Some(ExceptionKind::ZeroDivisionError));
        assert_eq!(
            registry.exception_class_of(&Exception::zero_division()),
            core.exception(ExceptionKind::ZeroDivisionError)
        );
    }

    #[test]
    fn test_set_visibility_copies_inherited() {
        let (mut registry, root) = setup();
        let core = *registry.core();
        let base = registry.define_class(Some("Base"), core.object, &root);
        registry.define_method(base, Method::native("helper", Arity::ANY, noop));
        let derived = registry.define_class(Some("Derived"), base, &root);
        registry.set_visibility(derived, "helper", Visibility::Private).unwrap();

        assert_eq!(registry.find_method(derived, "helper").unwrap().visibility, Visibility::Private);
        assert_eq!(registry.find_method(base, "helper").unwrap().visibility, Visibility::Public);
        assert!(registry.set_visibility(derived, "nope", Visibility::Private).is_err());
    }

    #[test]
    fn test_scoped_constant_lookup() {
        let (mut registry, root) = setup();
        let core = *registry.core();
        let outer = registry.define_module(Some("Outer"), &root);
        registry.class(outer).constants.set_own("LIMIT", Value::Integer(3));
        assert_eq!(registry.lookup_constant(outer, "LIMIT"), Some(Value::Integer(3)));
        assert_eq!(registry.lookup_constant(outer, "String"), None);
        assert!(registry.lookup_constant(core.object, "String").is_some());
    }

    #[test]
    fn test_anonymous_names() {
        let (mut registry, root) = setup();
        let core = *registry.core();
        let anon = registry.define_class(None, core.object, &root);
        assert!(registry.name_of(anon).starts_with("#<Class:0x"));
        assert!(registry.assign_name(anon, "Named"));
        assert!(!registry.assign_name(anon, "Other"));
        assert_eq!(registry.name_of(anon), "Named");
    }
}
