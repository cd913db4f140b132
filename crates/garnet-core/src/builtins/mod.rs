//! Core classes and their native methods.
//!
//! [`bootstrap`] builds a fresh [`Registry`] for one interpreter: the class
//! hierarchy comes from [`Registry::new`], and each submodule then installs
//! the native methods of one class or mixin:
//!
//! - `object` - `BasicObject` and the object half of `Kernel`
//! - `kernel` - `puts`, `raise`, `require`, `loop` and other global functions
//! - `module` - `Module` and `Class`
//! - `integer`, `string`, `symbol`, `array`, `hash`, `boolean`, `proc`
//! - `exception` - `Exception` and `raise` support
//! - `enumerable`, `comparable` - mixins built on `each` and `<=>`
//!
//! Every native is an ordinary entry in a method set, so user code can
//! override or `super` into any of them.

pub mod array;
pub mod boolean;
pub mod comparable;
pub mod enumerable;
pub mod exception;
pub mod hash;
pub mod integer;
pub mod kernel;
pub mod module;
pub mod object;
pub mod proc;
pub mod string;
pub mod symbol;

use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

use crate::runtime::class::{ClassId, Registry};
use crate::runtime::context::CallContext;
use crate::runtime::environment::Env;
use crate::runtime::error::{Control, EvalResult, Exception};
use crate::runtime::method::{Arity, Method, NativeMethod, Visibility};
use crate::runtime::proc::Proc;
use crate::runtime::value::Value;

pub(crate) const NONE: Arity = Arity::Exact(0);
pub(crate) const ONE: Arity = Arity::Exact(1);
pub(crate) const TWO: Arity = Arity::Exact(2);
pub(crate) const ANY: Arity = Arity::ANY;

/// Most elements an array may grow to.
pub(crate) const MAX_ARRAY_LEN: usize = 1 << 26;
/// Most bytes a string may grow to.
pub(crate) const MAX_STRING_LEN: usize = 1 << 30;

/// A class's native methods as `(name, arity, function)` rows.
pub(crate) type NativeTable<'t> = &'t [(&'t str, Arity, NativeMethod)];

/// Builds the core classes of one interpreter and binds their constants in
/// `root`.
pub fn bootstrap(root: &Env) -> Registry {
    let mut registry = Registry::new(root);
    object::register(&mut registry);
    kernel::register(&mut registry);
    module::register(&mut registry);
    comparable::register(&mut registry);
    enumerable::register(&mut registry);
    boolean::register(&mut registry);
    integer::register(&mut registry);
    string::register(&mut registry);
    symbol::register(&mut registry);
    array::register(&mut registry);
    hash::register(&mut registry);
    proc::register(&mut registry);
    exception::register(&mut registry);
    registry
}

/// Gives the top-level object its `main` identity and the class-body
/// helpers Ruby makes available at the top level.
pub fn install_main(registry: &mut Registry, main: &Value) {
    let table: NativeTable<'_> = &[
        ("to_s", NONE, main_to_s),
        ("inspect", NONE, main_to_s),
        ("include", Arity::AtLeast(1), main_include),
        ("public", ANY, main_public),
        ("private", ANY, main_private),
    ];
    for &(name, arity, func) in table {
        // `main` is always an object, so this cannot fail
        let _ = registry.add_singleton_method(main, Method::native(name, arity, func));
    }
}

fn main_to_s(_ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(Value::string("main"))
}

fn main_include(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let object = Value::Class(ctx.core().object);
    ctx.send(&object, "include", args)
}

fn main_public(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let object = ctx.core().object;
    module::apply_visibility(ctx, object, args, Visibility::Public)
}

fn main_private(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let object = ctx.core().object;
    module::apply_visibility(ctx, object, args, Visibility::Private)
}

// ============================================================================
// Registration
// ============================================================================

/// Installs public natives as instance methods of `class`.
pub(crate) fn define(registry: &mut Registry, class: ClassId, table: NativeTable<'_>) {
    for &(name, arity, func) in table {
        registry.define_method(class, Method::native(name, arity, func));
    }
}

/// Installs private natives as instance methods of `class`.
pub(crate) fn define_private(registry: &mut Registry, class: ClassId, table: NativeTable<'_>) {
    for &(name, arity, func) in table {
        registry.define_method(
            class,
            Method::native(name, arity, func).with_visibility(Visibility::Private),
        );
    }
}

/// Installs natives as class methods of `class`.
pub(crate) fn define_singleton(registry: &mut Registry, class: ClassId, table: NativeTable<'_>) {
    let eigenclass = registry.ensure_eigenclass(class);
    define(registry, eigenclass, table);
}

// ============================================================================
// Argument Helpers
// ============================================================================

/// The argument at `index`, or nil.
pub(crate) fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

/// How a value is named in conversion errors: `nil`, `true` and `false` by
/// value, everything else by class.
pub(crate) fn type_name(ctx: &CallContext<'_>, value: &Value) -> String {
    match value {
        Value::Nil => "nil".to_string(),
        Value::Bool(b) => b.to_string(),
        other => ctx.class_name(other),
    }
}

/// An `Integer` argument.
pub(crate) fn int_arg(ctx: &CallContext<'_>, value: &Value) -> Result<i64, Control> {
    match value {
        Value::Integer(n) => Ok(*n),
        other => Err(Exception::implicit_conversion(&type_name(ctx, other), "Integer").into()),
    }
}

/// A `String` argument.
pub(crate) fn str_arg(ctx: &CallContext<'_>, value: &Value) -> Result<String, Control> {
    match value {
        Value::String(s) => Ok(s.borrow().clone()),
        other => Err(Exception::implicit_conversion(&type_name(ctx, other), "String").into()),
    }
}

/// A method or variable name given as a symbol or a string.
pub(crate) fn name_arg(ctx: &mut CallContext<'_>, value: &Value) -> Result<String, Control> {
    match value.as_text() {
        Some(name) => Ok(name),
        None => {
            let shown = ctx.describe(value);
            Err(Exception::type_error(format!("{} is not a symbol nor a string", shown)).into())
        }
    }
}

/// The size of `count` copies of something `unit` long, when it stays
/// within `limit`.
pub(crate) fn repeated_len(unit: usize, count: i64, limit: usize) -> Option<usize> {
    let count = usize::try_from(count).ok()?;
    unit.checked_mul(count).filter(|total| *total <= limit)
}

/// Grows `items` with nils to `len` elements, or fails with `too_big`
/// when that is more than an array may hold.
pub(crate) fn grow_array(items: &mut Vec<Value>, len: usize, too_big: impl FnOnce() -> Exception) -> Result<(), Control> {
    if len <= items.len() {
        return Ok(());
    }
    if len > MAX_ARRAY_LEN || items.try_reserve(len - items.len()).is_err() {
        return Err(too_big().into());
    }
    items.resize(len, Value::Nil);
    Ok(())
}

/// The receiver of an `Array` method.
pub(crate) fn self_array(ctx: &CallContext<'_>) -> Result<Rc<RefCell<Vec<Value>>>, Control> {
    match &ctx.receiver {
        Value::Array(items) => Ok(items.clone()),
        other => Err(Exception::internal(format!("expected an Array receiver, got {:?}", other)).into()),
    }
}

/// The receiver of a `Class` or `Module` method.
pub(crate) fn self_class(ctx: &CallContext<'_>) -> Result<ClassId, Control> {
    match &ctx.receiver {
        Value::Class(id) => Ok(*id),
        other => Err(Exception::internal(format!("expected a class receiver, got {:?}", other)).into()),
    }
}

/// The block, or the `&proc`-style trailing argument some methods accept
/// in its place.
pub(crate) fn block_or_arg(ctx: &CallContext<'_>, args: &[Value], index: usize) -> Option<Rc<Proc>> {
    match args.get(index) {
        Some(Value::Proc(proc)) => Some(proc.clone()),
        _ => ctx.block.clone(),
    }
}

// ============================================================================
// Equality and Ordering
// ============================================================================

/// `a == b`, short-circuiting values whose equality cannot be overridden.
pub(crate) fn values_equal(ctx: &mut CallContext<'_>, a: &Value, b: &Value) -> Result<bool, Control> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Ok(x == y),
        (Value::Nil | Value::Bool(_) | Value::Symbol(_), _) => Ok(a.identical(b)),
        (Value::String(x), Value::String(y)) => Ok(*x.borrow() == *y.borrow()),
        _ => ctx.test(a, "==", vec![b.clone()]),
    }
}

/// Turns a `<=>` result into an ordering; `nil` means the values are not
/// comparable.
pub(crate) fn ordering_of(ctx: &mut CallContext<'_>, result: &Value, a: &Value, b: &Value) -> Result<Ordering, Control> {
    match result {
        Value::Integer(n) => Ok(n.cmp(&0)),
        _ => Err(comparison_failed(ctx, a, b)),
    }
}

/// `ArgumentError: comparison of A with B failed`.
pub(crate) fn comparison_failed(ctx: &mut CallContext<'_>, a: &Value, b: &Value) -> Control {
    let left = ctx.class_name(a);
    let right = match b {
        Value::Nil | Value::Bool(_) | Value::Integer(_) => ctx.describe(b),
        other => ctx.class_name(other),
    };
    Exception::argument(format!("comparison of {} with {} failed", left, right)).into()
}

/// Orders two values with `<=>`.
pub(crate) fn compare(ctx: &mut CallContext<'_>, a: &Value, b: &Value) -> Result<Ordering, Control> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Ok(x.cmp(y)),
        (Value::String(x), Value::String(y)) => Ok(x.borrow().as_str().cmp(y.borrow().as_str())),
        _ => {
            let result = ctx.send(a, "<=>", vec![b.clone()])?;
            ordering_of(ctx, &result, a, b)
        }
    }
}

/// Sorts with `<=>`, or with a comparison block returning `-1`, `0` or `1`.
///
/// The first error raised by a comparison aborts the sort.
pub(crate) fn sort_values(
    ctx: &mut CallContext<'_>,
    mut items: Vec<Value>,
    block: Option<Rc<Proc>>,
) -> Result<Vec<Value>, Control> {
    let mut failure = None;
    // The sort hands over the later element first; comparing the other way
    // round keeps blocks and error messages in source order.
    items.sort_by(|later, earlier| {
        if failure.is_some() {
            return Ordering::Equal;
        }
        let ordering = match &block {
            Some(block) => ctx
                .call_proc(block, vec![earlier.clone(), later.clone()])
                .and_then(|result| ordering_of(ctx, &result, earlier, later)),
            None => compare(ctx, earlier, later),
        };
        ordering.map(Ordering::reverse).unwrap_or_else(|control| {
            failure = Some(control);
            Ordering::Equal
        })
    });
    match failure {
        Some(control) => Err(control),
        None => Ok(items),
    }
}

// ============================================================================
// Inspection
// ============================================================================

thread_local! {
    // Object ids of the collections currently being inspected
    static INSPECTING: RefCell<Vec<i64>> = const { RefCell::new(Vec::new()) };
}

/// Inspects a collection, printing `placeholder` instead of recursing into
/// a collection that contains itself.
pub(crate) fn inspect_nested<F>(
    ctx: &mut CallContext<'_>,
    value: &Value,
    placeholder: &str,
    inspect: F,
) -> Result<String, Control>
where
    F: FnOnce(&mut CallContext<'_>) -> Result<String, Control>,
{
    let id = value.object_id();
    if INSPECTING.with(|active| active.borrow().contains(&id)) {
        return Ok(placeholder.to_string());
    }
    INSPECTING.with(|active| active.borrow_mut().push(id));
    let result = inspect(ctx);
    INSPECTING.with(|active| {
        let mut active = active.borrow_mut();
        if let Some(at) = active.iter().rposition(|entry| *entry == id) {
            active.remove(at);
        }
    });
    result
}


#[cfg(test)]
mod tests {
    use super::testing::{error, inspect, output};
    use super::*;
    use crate::runtime::error::ExceptionKind;

    #[test]
    fn test_bootstrap_is_per_instance() {
        let first = Env::store();
        let second = Env::store();
        let mut a = bootstrap(&first);
        let b = bootstrap(&second);
        let string = a.core().string;
        a.define_method(string, Method::native("shout", NONE, main_to_s));
        assert!(a.find_method(string, "shout").is_some());
        assert!(b.find_method(b.core().string, "shout").is_none());
    }

    #[test]
    fn test_main_identity() {
        assert_eq!(inspect("self"), "main");
        assert_eq!(output("puts self.to_s"), "main\n");
    }

    #[test]
    fn test_top_level_include() {
        let source = "module Greet\n  def hi\n    \"hi\"\n  end\nend\ninclude Greet\n5.hi";
        assert_eq!(inspect(source), "\"hi\"");
    }

    #[test]
    fn test_natives_are_overridable() {
        let source = "class Integer\n  def +(other)\n    42\n  end\nend\n1 + 1";
        assert_eq!(inspect(source), "42");
    }

    #[test]
    fn test_comparison_failure_message() {
        let err = error("[3, \"a\"].sort");
        assert_eq!(err.kind, ExceptionKind::ArgumentError);
        assert_eq!(err.message, "comparison of Integer with String failed");
        let err = error("[:a, 1].sort");
        assert_eq!(err.message, "comparison of Symbol with 1 failed");
        assert_eq!(inspect("[3, 1, 2].sort { |a, b| b <=> a }"), "[3, 2, 1]");
    }

    #[test]
    fn test_recursive_inspect() {
        assert_eq!(inspect("a = [1]\na << a\na"), "[1, [...]]");
        assert_eq!(inspect("h = {}\nh[:self] = h\nh"), "{self: {...}}");
    }
}
