//! `Module` and `Class`.

use std::rc::Rc;

use crate::builtins::{
    ANY, NONE, ONE, NativeTable, arg, block_or_arg, define, define_private, define_singleton, name_arg,
    self_class,
};
use crate::runtime::class::{ClassId, ClassKind, Registry};
use crate::runtime::context::{CallContext, CallFlags, SelfBinding};
use crate::runtime::error::{Control, EvalResult, Exception, ExceptionKind};
use crate::runtime::method::{Arity, Method, MethodBody, Visibility};
use crate::runtime::value::{ExceptionData, Instance, Value};

/// Installs the methods of `Module` and `Class`.
pub fn register(registry: &mut Registry) {
    let core = *registry.core();

    let module: NativeTable<'_> = &[
        ("name", NONE, name),
        ("to_s", NONE, to_s),
        ("inspect", NONE, to_s),
        ("ancestors", NONE, ancestors),
        ("include", Arity::AtLeast(1), include),
        ("included_modules", NONE, included_modules),
        ("include?", ONE, includes),
        ("instance_methods", Arity::Range(0, 1), instance_methods),
        ("public_instance_methods", Arity::Range(0, 1), instance_methods),
        ("private_instance_methods", Arity::Range(0, 1), private_instance_methods),
        ("method_defined?", ONE, method_defined),
        ("public_method_defined?", ONE, public_method_defined),
        ("private_method_defined?", ONE, private_method_defined),
        ("protected_method_defined?", ONE, protected_method_defined),
        ("define_method", Arity::Range(1, 2), define_method),
        ("alias_method", Arity::Exact(2), alias_method),
        ("attr_reader", ANY, attr_reader),
        ("attr_writer", ANY, attr_writer),
        ("attr_accessor", ANY, attr_accessor),
        ("attr", ANY, attr_reader),
        ("private", ANY, private),
        ("public", ANY, public),
        ("protected", ANY, protected),
        ("private_class_method", ANY, private_class_method),
        ("public_class_method", ANY, public_class_method),
        ("const_get", ONE, const_get),
        ("const_set", Arity::Exact(2), const_set),
        ("const_defined?", ONE, const_defined),
        ("constants", NONE, constants),
        ("class_eval", NONE, class_eval),
        ("module_eval", NONE, class_eval),
        ("===", ONE, case_equal),
        ("==", ONE, same),
        ("<", ONE, less),
        ("<=", ONE, less_or_equal),
        (">", ONE, greater),
        (">=", ONE, greater_or_equal),
    ];
    define(registry, core.module, module);
    define_private(
        registry,
        core.module,
        &[("included", ONE, hook), ("extended", ONE, hook), ("method_added", ONE, hook)],
    );
    define_singleton(registry, core.module, &[("new", NONE, module_new)]);

    let class: NativeTable<'_> = &[
        ("new", ANY, new),
        ("allocate", NONE, allocate),
        ("superclass", NONE, superclass),
    ];
    define(registry, core.class, class);
    define_private(registry, core.class, &[("inherited", ONE, hook)]);
    define_singleton(registry, core.class, &[("new", Arity::Range(0, 1), class_new)]);
}

fn hook(_ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(Value::Nil)
}

fn class_arg(ctx: &mut CallContext<'_>, value: &Value, expected: &str) -> Result<ClassId, Control> {
    match value {
        Value::Class(id) => Ok(*id),
        other => {
            let class = ctx.class_name(other);
            Err(Exception::type_error(format!("wrong argument type {} (expected {})", class, expected)).into())
        }
    }
}

// ============================================================================
// Instantiation
// ============================================================================

/// Allocates an instance and sends it `initialize` with the same arguments
/// and block.
fn new(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let class = self_class(ctx)?;
    let object = instantiate(ctx, class)?;
    let block = ctx.block.clone();
    ctx.dispatch(object.clone(), "initialize", args, block, CallFlags::SELF)?;
    Ok(object)
}

fn allocate(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let class = self_class(ctx)?;
    instantiate(ctx, class)
}

fn instantiate(ctx: &mut CallContext<'_>, class: ClassId) -> EvalResult {
    let registry = ctx.registry();
    let core = *registry.core();
    if !matches!(registry.class(class).kind, ClassKind::Class) {
        return Err(Exception::type_error("can't create instance of singleton class").into());
    }
    let immediate = [core.integer, core.symbol, core.nil, core.true_class, core.false_class, core.proc_class];
    if immediate.iter().any(|&builtin| registry.is_subclass(class, builtin)) {
        return Err(Exception::type_error(format!("allocator undefined for {}", registry.name_of(class))).into());
    }
    if registry.is_subclass(class, core.string) {
        return Ok(Value::string(""));
    }
    if registry.is_subclass(class, core.array) {
        return Ok(Value::array(Vec::new()));
    }
    if registry.is_subclass(class, core.hash) {
        return Ok(Value::hash(Default::default()));
    }
    let instance = match registry.class(class).exception_kind {
        Some(_) => Instance::exception(class, ExceptionData::default()),
        None => Instance::new(class),
    };
    Ok(Value::Object(instance))
}

/// `Class.new(superclass = Object) { body }`: an anonymous class, named by
/// the first constant it is assigned to.
fn class_new(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let object = ctx.core().object;
    let parent = match args.first() {
        None => object,
        Some(Value::Class(id)) if !ctx.registry().is_module(*id) => *id,
        Some(other) => {
            let class = ctx.class_name(other);
            return Err(Exception::type_error(format!(
                "superclass must be an instance of Class (given an instance of {})",
                class
            ))
            .into());
        }
    };
    if !matches!(ctx.registry().class(parent).kind, ClassKind::Class) {
        return Err(Exception::type_error("can't make subclass of singleton class").into());
    }
    let lexical = ctx.runtime.root_env();
    let class = ctx.registry_mut().define_class(None, parent, &lexical);
    ctx.funcall(&Value::Class(parent), "inherited", vec![Value::Class(class)])?;
    eval_body(ctx, class)?;
    Ok(Value::Class(class))
}

fn module_new(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let lexical = ctx.runtime.root_env();
    let module = ctx.registry_mut().define_module(None, &lexical);
    eval_body(ctx, module)?;
    Ok(Value::Class(module))
}

// Runs the attached block, if any, as the body of `class`
fn eval_body(ctx: &mut CallContext<'_>, class: ClassId) -> EvalResult {
    let Some(block) = ctx.block.clone() else {
        return Ok(Value::Nil);
    };
    let binding = SelfBinding {
        receiver: Value::Class(class),
        definee: class,
        frame: None,
    };
    ctx.runtime.call_proc(&block, vec![Value::Class(class)], None, Some(binding))
}

/// `class_eval { ... }`: the block runs with the class as `self` and `def`
/// target.
fn class_eval(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let class = self_class(ctx)?;
    ctx.expect_block()?;
    eval_body(ctx, class)
}

// ============================================================================
// Names and Hierarchy
// ============================================================================

fn name(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let class = self_class(ctx)?;
    Ok(ctx
        .registry()
        .class(class)
        .name
        .as_deref()
        .map(Value::string)
        .unwrap_or_default())
}

fn to_s(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let class = self_class(ctx)?;
    Ok(Value::string(ctx.registry().name_of(class)))
}

/// The superclass, skipping singleton shadows; nil for `BasicObject`.
fn superclass(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let class = self_class(ctx)?;
    let registry = ctx.registry();
    Ok(registry
        .class(class)
        .superclass
        .map(|parent| Value::Class(registry.real_class(parent)))
        .unwrap_or_default())
}

fn ancestors(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let class = self_class(ctx)?;
    let ancestors = ctx.registry().ancestors(class);
    Ok(Value::array(ancestors.into_iter().map(Value::Class).collect()))
}

/// Mixes modules in, in argument order, then runs each module's `included`
/// hook.
fn include(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let class = self_class(ctx)?;
    for module in args {
        let id = class_arg(ctx, &module, "Module")?;
        ctx.registry_mut().include_module(class, id)?;
        ctx.funcall(&module, "included", vec![Value::Class(class)])?;
    }
    Ok(Value::Class(class))
}

fn included_modules(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let class = self_class(ctx)?;
    let registry = ctx.registry();
    let modules = registry
        .ancestors(class)
        .into_iter()
        .filter(|id| registry.is_module(*id) && *id != class)
        .map(Value::Class)
        .collect();
    Ok(Value::array(modules))
}

fn includes(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let class = self_class(ctx)?;
    let module = class_arg(ctx, &arg(&args, 0), "Module")?;
    let registry = ctx.registry();
    Ok(Value::Bool(
        module != class && registry.is_module(module) && registry.ancestors(class).contains(&module),
    ))
}

fn case_equal(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let class = self_class(ctx)?;
    Ok(Value::Bool(ctx.registry().is_a(&arg(&args, 0), class)))
}

fn same(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    Ok(Value::Bool(ctx.receiver.identical(&arg(&args, 0))))
}

/// `A < B`: true if A descends from B, false if B descends from A, nil if
/// they are unrelated.
fn relation(ctx: &mut CallContext<'_>, args: &[Value], strict: bool, reversed: bool) -> EvalResult {
    let class = self_class(ctx)?;
    let other = class_arg(ctx, &arg(args, 0), "Class")?;
    let (lower, upper) = if reversed { (other, class) } else { (class, other) };
    let registry = ctx.registry();
    if lower == upper {
        return Ok(Value::Bool(!strict));
    }
    if registry.is_subclass(lower, upper) {
        return Ok(Value::Bool(true));
    }
    if registry.is_subclass(upper, lower) {
        return Ok(Value::Bool(false));
    }
    Ok(Value::Nil)
}

fn less(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    relation(ctx, &args, true, false)
}

fn less_or_equal(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    relation(ctx, &args, false, false)
}

fn greater(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    relation(ctx, &args, true, true)
}

fn greater_or_equal(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    relation(ctx, &args, false, true)
}

// ============================================================================
// Methods and Visibility
// ============================================================================

fn method_list(ctx: &mut CallContext<'_>, args: &[Value], visible: fn(Visibility) -> bool) -> EvalResult {
    let class = self_class(ctx)?;
    let inherit = args.first().is_none_or(Value::truthy);
    let names = ctx.registry().method_names(class, inherit, visible);
    Ok(Value::array(names.iter().map(|name| Value::symbol(name)).collect()))
}

fn instance_methods(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    method_list(ctx, &args, |visibility| visibility != Visibility::Private)
}

fn private_instance_methods(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    method_list(ctx, &args, |visibility| visibility == Visibility::Private)
}

fn defined_with(ctx: &mut CallContext<'_>, args: &[Value], visible: fn(Visibility) -> bool) -> EvalResult {
    let class = self_class(ctx)?;
    let name = name_arg(ctx, &arg(args, 0))?;
    let found = ctx.registry().find_method(class, &name);
    Ok(Value::Bool(found.is_some_and(|method| visible(method.visibility))))
}

fn method_defined(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    defined_with(ctx, &args, |visibility| visibility != Visibility::Private)
}

fn public_method_defined(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    defined_with(ctx, &args, |visibility| visibility == Visibility::Public)
}

fn private_method_defined(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    defined_with(ctx, &args, |visibility| visibility == Visibility::Private)
}

fn protected_method_defined(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    defined_with(ctx, &args, |visibility| visibility == Visibility::Protected)
}

/// The visibility a method defined by a call in the class body gets: the
/// body's current default, or public from anywhere else.
fn default_visibility(ctx: &CallContext<'_>) -> Visibility {
    match ctx.env.activation() {
        Some(activation) if activation.receiver.identical(&ctx.receiver) && activation.frame.is_none() => {
            activation.visibility()
        }
        _ => Visibility::Public,
    }
}

/// `define_method(name) { ... }` or `define_method(name, proc)`. The body
/// runs with the receiver of the call as `self` and is arity-checked.
fn define_method(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let class = self_class(ctx)?;
    let name = name_arg(ctx, &arg(&args, 0))?;
    let body = block_or_arg(ctx, &args, 1)
        .ok_or_else(|| Exception::argument("tried to create Proc object without a block"))?;
    let method = Method::new(&name, body.arity(), MethodBody::Proc(body.rewrap(false, true)))
        .with_visibility(default_visibility(ctx));
    ctx.registry_mut().define_method(class, method);
    Ok(Value::symbol(&name))
}

fn alias_method(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let class = self_class(ctx)?;
    let new_name = name_arg(ctx, &arg(&args, 0))?;
    let old_name = name_arg(ctx, &arg(&args, 1))?;
    ctx.registry_mut().alias_method(class, &new_name, &old_name)?;
    Ok(Value::symbol(&new_name))
}

fn define_attributes(ctx: &mut CallContext<'_>, args: Vec<Value>, reader: bool, writer: bool) -> EvalResult {
    let class = self_class(ctx)?;
    let visibility = default_visibility(ctx);
    let mut defined = Vec::new();
    for value in &args {
        let name = name_arg(ctx, value)?;
        if !is_attribute_name(&name) {
            return Err(Exception::new(
                ExceptionKind::NameError,
                format!("invalid attribute name '{}'", name),
            )
            .into());
        }
        let ivar: Rc<str> = Rc::from(format!("@{}", name));
        if reader {
            let method = Method::new(&name, Arity::Exact(0), MethodBody::AttrReader(ivar.clone()));
            ctx.registry_mut().define_method(class, method.with_visibility(visibility));
            defined.push(Value::symbol(&name));
        }
        if writer {
            let setter = format!("{}=", name);
            let method = Method::new(&setter, Arity::Exact(1), MethodBody::AttrWriter(ivar));
            ctx.registry_mut().define_method(class, method.with_visibility(visibility));
            defined.push(Value::symbol(&setter));
        }
    }
    Ok(Value::array(defined))
}

fn is_attribute_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|first| first == '_' || unicode_xid::UnicodeXID::is_xid_start(first))
        && chars.all(unicode_xid::UnicodeXID::is_xid_continue)
}

fn attr_reader(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    define_attributes(ctx, args, true, false)
}

fn attr_writer(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    define_attributes(ctx, args, false, true)
}

fn attr_accessor(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    define_attributes(ctx, args, true, true)
}

/// `private`, `public` and `protected`. With no arguments they change the
/// default for later `def`s in the current body; with names (or an array
/// of names) they change those methods. Returns the argument.
pub(crate) fn apply_visibility(
    ctx: &mut CallContext<'_>,
    class: ClassId,
    args: Vec<Value>,
    visibility: Visibility,
) -> EvalResult {
    if args.is_empty() {
        if let Some(activation) = ctx.env.activation() {
            activation.set_visibility(visibility);
        }
        return Ok(Value::Nil);
    }
    let names: Vec<Value> = match args.as_slice() {
        [Value::Array(items)] => items.borrow().clone(),
        _ => args.clone(),
    };
    for value in &names {
        let name = name_arg(ctx, value)?;
        ctx.registry_mut().set_visibility(class, &name, visibility)?;
    }
    Ok(match args.len() {
        1 => args.into_iter().next().unwrap_or_default(),
        _ => Value::array(args),
    })
}

fn private(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let class = self_class(ctx)?;
    apply_visibility(ctx, class, args, Visibility::Private)
}

fn public(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let class = self_class(ctx)?;
    apply_visibility(ctx, class, args, Visibility::Public)
}

fn protected(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let class = self_class(ctx)?;
    apply_visibility(ctx, class, args, Visibility::Protected)
}

fn class_method_visibility(ctx: &mut CallContext<'_>, args: Vec<Value>, visibility: Visibility) -> EvalResult {
    let class = self_class(ctx)?;
    let eigenclass = ctx.registry_mut().ensure_eigenclass(class);
    if args.is_empty() {
        return Ok(Value::Nil);
    }
    apply_visibility(ctx, eigenclass, args, visibility)
}

fn private_class_method(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    class_method_visibility(ctx, args, Visibility::Private)
}

fn public_class_method(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    class_method_visibility(ctx, args, Visibility::Public)
}

// ============================================================================
// Constants
// ============================================================================

/// `const_get("A::B")` walks each segment from the receiver.
fn const_get(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let mut scope = self_class(ctx)?;
    let path = name_arg(ctx, &arg(&args, 0))?;
    let mut value = Value::Nil;
    for segment in path.split("::") {
        let registry = ctx.registry();
        value = registry.lookup_constant(scope, segment).ok_or_else(|| {
            let object = registry.core().object;
            let shown = if scope == object {
                segment.to_string()
            } else {
                format!("{}::{}", registry.name_of(scope), segment)
            };
            Exception::uninitialized_constant(&shown)
        })?;
        if let Value::Class(id) = value {
            scope = id;
        }
    }
    Ok(value)
}

fn constant_name(ctx: &mut CallContext<'_>, value: &Value) -> Result<String, Control> {
    let name = name_arg(ctx, value)?;
    if !name.starts_with(|c: char| c.is_uppercase()) {
        return Err(Exception::new(ExceptionKind::NameError, format!("wrong constant name {}", name)).into());
    }
    Ok(name)
}

fn const_set(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let class = self_class(ctx)?;
    let name = constant_name(ctx, &arg(&args, 0))?;
    let value = arg(&args, 1);
    let registry = ctx.registry_mut();
    if let Value::Class(id) = value {
        let qualified = if class == registry.core().object {
            name.clone()
        } else {
            format!("{}::{}", registry.name_of(class), name)
        };
        registry.assign_name(id, &qualified);
    }
    registry.class(class).constants.set_own(&name, value.clone());
    Ok(value)
}

fn const_defined(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let class = self_class(ctx)?;
    let name = constant_name(ctx, &arg(&args, 0))?;
    Ok(Value::Bool(ctx.registry().lookup_constant(class, &name).is_some()))
}

fn constants(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let class = self_class(ctx)?;
    let names = ctx.registry().class(class).constants.names();
    Ok(Value::array(names.iter().map(|name| Value::symbol(name)).collect()))
}

#[cfg(test)]
mod tests {
    use crate::builtins::testing::{error, inspect, output};
    use crate::runtime::error::ExceptionKind;

    #[test]
    fn test_new_calls_initialize() {
        let source = "class Counter\n  attr_reader :count\n  def initialize(start = 10)\n    @count = start\n  end\nend\n[Counter.new.count, Counter.new(3).count]";
        assert_eq!(inspect(source), "[10, 3]");
        let err = error("Object.new(1)");
        assert_eq!(err.message, "wrong number of arguments (given 1, expected 0)");
    }

    #[test]
    fn test_ancestors_and_superclass() {
        let source = "module A; end\nmodule B; end\nclass Base; end\nclass Child < Base\n  include A, B\nend\n[Child.ancestors.take(4), Child.superclass, BasicObject.superclass]";
        assert_eq!(inspect(source), "[[Child, A, B, Base], Base, nil]");
        assert_eq!(inspect("Comparable.class"), "Module");
        assert_eq!(inspect("Integer.ancestors.include?(Comparable)"), "true");
    }

    #[test]
    fn test_include_hooks_and_queries() {
        let source = "module Tracked\n  def self.included(base)\n    puts \"included in #{base}\"\n  end\nend\nclass Item\n  include Tracked\nend\nputs Item.include?(Tracked)\nputs Item.included_modules.first";
        assert_eq!(output(source), "included in Item\ntrue\nTracked\n");
    }

    #[test]
    fn test_inherited_hook() {
        let source = "class Plugin\n  def self.inherited(sub)\n    puts \"registered #{sub.name}\"\n  end\nend\nclass Csv < Plugin; end";
        assert_eq!(output(source), "registered Csv\n");
    }

    #[test]
    fn test_visibility_section_and_symbols() {
        let source = "class Account\n  def a; end\n  private\n  def b; end\n  public\n  def c; end\n  def d; end\n  private :d\nend\n[:a, :b, :c, :d].map { |m| Account.private_method_defined?(m) }";
        assert_eq!(inspect(source), "[false, true, false, true]");
    }

    #[test]
    fn test_protected_between_instances() {
        let source = "class Money\n  def initialize(v)\n    @v = v\n  end\n  def >(other)\n    value > other.value\n  end\n  protected\n  def value\n    @v\n  end\nend\nMoney.new(5) > Money.new(3)";
        assert_eq!(inspect(source), "true");
        let err = error("class Money\n  protected\n  def value; 1; end\nend\nMoney.new.value");
        assert_eq!(err.kind, ExceptionKind::PrivateNoMethodError);
        assert_eq!(err.message, "protected method 'value' called for #<Money>");
    }

    #[test]
    fn test_private_class_method() {
        let source = "class Factory\n  def self.build\n    secret\n  end\n  def self.secret\n    :ok\n  end\n  private_class_method :secret\nend\nFactory.build";
        assert_eq!(inspect(source), ":ok");
        assert_eq!(
            error("class Factory\n  def self.secret; end\n  private_class_method :secret\nend\nFactory.secret").kind,
            ExceptionKind::PrivateNoMethodError
        );
    }

    #[test]
    fn test_define_method_binds_self() {
        let source = "class Greeter\n  def initialize(name)\n    @name = name\n  end\n  [:hello, :bye].each do |word|\n    define_method(\"#{word}_to\") { |suffix| \"#{word} #{@name}#{suffix}\" }\n  end\nend\nGreeter.new(\"Ann\").hello_to(\"!\")";
        assert_eq!(inspect(source), "\"hello Ann!\"");
        let err = error("class K\n  define_method(:two) { |a, b| a }\nend\nK.new.two(1)");
        assert_eq!(err.message, "wrong number of arguments (given 1, expected 2)");
    }

    #[test]
    fn test_attr_accessor() {
        let source = "class Pt\n  attr_accessor :x\nend\np = Pt.new\np.x = 4\np.x += 1\np.x";
        assert_eq!(inspect(source), "5");
        assert_eq!(inspect("class Pt\n  attr_accessor :x, :y\nend"), "[:x, :x=, :y, :y=]");
    }

    #[test]
    fn test_class_new_with_body() {
        let source = "Point = Class.new do\n  def coords\n    [1, 2]\n  end\nend\n[Point.name, Point.new.coords]";
        assert_eq!(inspect(source), "[\"Point\", [1, 2]]");
        let source = "Base = Class.new\nSub = Class.new(Base)\nSub.superclass";
        assert_eq!(inspect(source), "Base");
        assert_eq!(error("Class.new(Comparable)").kind, ExceptionKind::TypeError);
    }

    #[test]
    fn test_class_comparisons() {
        assert_eq!(inspect("[Integer < Object, Object < Integer, Integer <= Integer, Integer < String, Integer === 3]"), "[true, false, true, nil, true]");
    }

    #[test]
    fn test_const_get_and_set() {
        let source = "module Outer\n  class Inner\n    LIMIT = 3\n  end\nend\nOuter.const_get(\"Inner::LIMIT\")";
        assert_eq!(inspect(source), "3");
        let err = error("module Outer; end\nOuter.const_get(:Missing)");
        assert_eq!(err.message, "uninitialized constant Outer::Missing");
        assert_eq!(inspect("module Outer; end\nOuter.const_set(:Anon, Class.new)\nOuter::Anon.name"), "\"Outer::Anon\"");
    }

    #[test]
    fn test_class_eval_defines_methods() {
        let source = "class Open; end\nOpen.class_eval do\n  def extra\n    :added\n  end\nend\nOpen.new.extra";
        assert_eq!(inspect(source), ":added");
    }

    #[test]
    fn test_alias_method() {
        let source = "class Str\n  def shout\n    \"HI\"\n  end\n  alias_method :yell, :shout\nend\nStr.new.yell";
        assert_eq!(inspect(source), "\"HI\"");
    }

    #[test]
    fn test_builtin_subclass_instances() {
        assert_eq!(inspect("class Stack < Array; end\nStack.new.push(1)"), "[1]");
        assert_eq!(error("Integer.new").message, "allocator undefined for Integer");
    }
}
