//! `BasicObject` and the object methods every value gets through `Kernel`.

use crate::builtins::{
    NONE, ONE, NativeTable, arg, block_or_arg, define, define_private, inspect_nested, name_arg,
    values_equal,
};
use crate::runtime::class::{ClassKind, Registry};
use crate::runtime::context::{CallContext, CallFlags, SelfBinding};
use crate::runtime::error::{Control, EvalResult, Exception, ExceptionKind};
use crate::runtime::method::{Arity, Method, MethodBody, Visibility};
use crate::runtime::value::{Instance, RubyHash, Value};

/// Installs the methods of `BasicObject` and the object half of `Kernel`.
pub fn register(registry: &mut Registry) {
    let core = *registry.core();

    let basic: NativeTable<'_> = &[
        ("!", NONE, not),
        ("==", ONE, identical),
        ("equal?", ONE, identical),
        ("!=", ONE, not_equal),
        ("__send__", Arity::AtLeast(1), send),
        ("__id__", NONE, object_id),
        ("instance_eval", NONE, instance_eval),
    ];
    define(registry, core.basic_object, basic);
    define_private(
        registry,
        core.basic_object,
        &[("initialize", NONE, initialize), ("method_missing", Arity::AtLeast(1), method_missing)],
    );

    let kernel: NativeTable<'_> = &[
        ("class", NONE, class),
        ("singleton_class", NONE, singleton_class),
        ("inspect", NONE, inspect),
        ("to_s", NONE, to_s),
        ("===", ONE, case_equal),
        ("nil?", NONE, is_nil),
        ("is_a?", ONE, is_a),
        ("kind_of?", ONE, is_a),
        ("instance_of?", ONE, instance_of),
        ("respond_to?", Arity::Range(1, 2), respond_to),
        ("send", Arity::AtLeast(1), send),
        ("public_send", Arity::AtLeast(1), public_send),
        ("instance_variable_get", ONE, instance_variable_get),
        ("instance_variable_set", Arity::Exact(2), instance_variable_set),
        ("instance_variable_defined?", ONE, instance_variable_defined),
        ("instance_variables", NONE, instance_variables),
        ("define_singleton_method", Arity::Range(1, 2), define_singleton_method),
        ("singleton_methods", NONE, singleton_methods),
        ("extend", Arity::AtLeast(1), extend),
        ("tap", NONE, tap),
        ("then", NONE, then),
        ("yield_self", NONE, then),
        ("itself", NONE, itself),
        ("object_id", NONE, object_id),
        ("frozen?", NONE, is_frozen),
        ("freeze", NONE, itself),
        ("dup", NONE, dup),
    ];
    define(registry, core.kernel, kernel);
    define_private(
        registry,
        core.kernel,
        &[("respond_to_missing?", Arity::Exact(2), respond_to_missing)],
    );
}

// ============================================================================
// BasicObject
// ============================================================================

fn not(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(Value::Bool(!ctx.receiver.truthy()))
}

fn identical(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    Ok(Value::Bool(ctx.receiver.identical(&arg(&args, 0))))
}

fn not_equal(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let receiver = ctx.receiver.clone();
    Ok(Value::Bool(!ctx.test(&receiver, "==", args)?))
}

fn initialize(_ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(Value::Nil)
}

/// Raises `NameError` for a bare identifier and `NoMethodError` otherwise.
fn method_missing(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let name = args.first().and_then(Value::as_text).unwrap_or_default();
    let receiver = ctx.receiver.clone();
    let shown = ctx.describe(&receiver);
    let mut exception = if ctx.vcall {
        Exception::undefined_name(&name, &shown)
    } else {
        Exception::no_method(&name, &shown)
    };
    // Report the caller's frame, not this one
    exception.backtrace = ctx.runtime.call_stack().backtrace().into_iter().skip(1).collect();
    Err(exception.into())
}

/// `send(name, *args)`: calls regardless of visibility.
fn send(ctx: &mut CallContext<'_>, mut args: Vec<Value>) -> EvalResult {
    let name = name_arg(ctx, &args.remove(0))?;
    let receiver = ctx.receiver.clone();
    let block = ctx.block.clone();
    ctx.dispatch(receiver, &name, args, block, CallFlags::SELF)
}

fn public_send(ctx: &mut CallContext<'_>, mut args: Vec<Value>) -> EvalResult {
    let name = name_arg(ctx, &args.remove(0))?;
    let receiver = ctx.receiver.clone();
    let block = ctx.block.clone();
    ctx.dispatch(receiver, &name, args, block, CallFlags::PUBLIC)
}

/// Runs the block with the receiver as `self`; `def` inside it defines
/// singleton methods.
fn instance_eval(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let block = ctx.expect_block()?;
    let receiver = ctx.receiver.clone();
    let definee = match &receiver {
        Value::Nil | Value::Bool(_) | Value::Integer(_) | Value::Symbol(_) => ctx.registry().class_of(&receiver),
        _ => ctx.registry_mut().singleton_class_of(&receiver)?,
    };
    let binding = SelfBinding {
        receiver: receiver.clone(),
        definee,
        frame: None,
    };
    ctx.runtime.call_proc(&block, vec![receiver], None, Some(binding))
}

// ============================================================================
// Identity and Classes
// ============================================================================

fn class(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(Value::Class(ctx.registry().class_of(&ctx.receiver)))
}

fn singleton_class(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let receiver = ctx.receiver.clone();
    Ok(Value::Class(ctx.registry_mut().singleton_class_of(&receiver)?))
}

fn is_nil(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(Value::Bool(ctx.receiver.is_nil()))
}

fn is_a(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    match arg(&args, 0) {
        Value::Class(class) => Ok(Value::Bool(ctx.registry().is_a(&ctx.receiver, class))),
        _ => Err(Exception::type_error("class or module required").into()),
    }
}

fn instance_of(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    match arg(&args, 0) {
        Value::Class(class) => Ok(Value::Bool(ctx.registry().class_of(&ctx.receiver) == class)),
        _ => Err(Exception::type_error("class or module required").into()),
    }
}

fn case_equal(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let receiver = ctx.receiver.clone();
    let other = arg(&args, 0);
    Ok(Value::Bool(receiver.identical(&other) || values_equal(ctx, &receiver, &other)?))
}

fn object_id(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(Value::Integer(ctx.receiver.object_id()))
}

fn is_frozen(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(Value::Bool(matches!(
        ctx.receiver,
        Value::Nil | Value::Bool(_) | Value::Integer(_) | Value::Symbol(_)
    )))
}

fn itself(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(ctx.receiver.clone())
}

fn tap(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let receiver = ctx.receiver.clone();
    ctx.yield_block(vec![receiver.clone()])?;
    Ok(receiver)
}

fn then(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let receiver = ctx.receiver.clone();
    ctx.yield_block(vec![receiver])
}

/// A shallow copy; immediates and classes are returned as is.
fn dup(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(match &ctx.receiver {
        Value::String(s) => Value::string(s.borrow().clone()),
        Value::Array(items) => Value::array(items.borrow().clone()),
        Value::Hash(hash) => {
            let hash = hash.borrow();
            let mut copy = RubyHash::from_pairs(hash.pairs());
            copy.default = hash.default.clone();
            copy.default_proc = hash.default_proc.clone();
            Value::hash(copy)
        }
        Value::Object(instance) => {
            let class = ctx.registry().real_class(instance.class());
            let copy = match instance.exception.borrow().clone() {
                Some(data) => Instance::exception(class, data),
                None => Instance::new(class),
            };
            for name in instance.ivars.names() {
                copy.ivars.set_own(&name, instance.ivars.get_own(&name).unwrap_or_default());
            }
            Value::Object(copy)
        }
        other => other.clone(),
    })
}

// ============================================================================
// Display
// ============================================================================

fn to_s(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let receiver = ctx.receiver.clone();
    Ok(Value::string(ctx.default_to_s(&receiver)))
}

/// `#<Foo>`, or `#<Foo @a=1, @b=2>` once instance variables are set.
fn inspect(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let receiver = ctx.receiver.clone();
    let Value::Object(instance) = &receiver else {
        return Ok(Value::string(ctx.default_to_s(&receiver)));
    };
    let class = ctx.class_name(&receiver);
    let names = instance.ivars.names();
    if names.is_empty() {
        return Ok(Value::string(format!("#<{}>", class)));
    }
    let placeholder = format!("#<{} ...>", class);
    let text = inspect_nested(ctx, &receiver, &placeholder, |ctx| {
        let mut fields = Vec::with_capacity(names.len());
        for name in &names {
            let value = instance.ivars.get_own(name).unwrap_or_default();
            fields.push(format!("{}={}", name, ctx.inspect(&value)?));
        }
        Ok(format!("#<{} {}>", class, fields.join(", ")))
    })?;
    Ok(Value::string(text))
}

// ============================================================================
// Reflection
// ============================================================================

/// `respond_to?(name, include_all = false)`: public methods only unless
/// `include_all`; unknown names are offered to `respond_to_missing?`.
fn respond_to(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let name = name_arg(ctx, &arg(&args, 0))?;
    let include_all = arg(&args, 1).truthy();
    let receiver = ctx.receiver.clone();
    let class = ctx.registry().dispatch_class(&receiver);
    match ctx.registry().find_method(class, &name) {
        Some(method) => Ok(Value::Bool(include_all || method.visibility == Visibility::Public)),
        None => {
            let answer = ctx.funcall(
                &receiver,
                "respond_to_missing?",
                vec![Value::symbol(&name), Value::Bool(include_all)],
            )?;
            Ok(Value::Bool(answer.truthy()))
        }
    }
}

fn respond_to_missing(_ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(Value::Bool(false))
}

fn ivar_name(ctx: &mut CallContext<'_>, value: &Value) -> Result<String, Control> {
    let name = name_arg(ctx, value)?;
    if name.len() < 2 || !name.starts_with('@') || name.starts_with("@@") {
        return Err(Exception::new(
            ExceptionKind::NameError,
            format!("'{}' is not allowed as an instance variable name", name),
        )
        .into());
    }
    Ok(name)
}

fn instance_variable_get(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let name = ivar_name(ctx, &arg(&args, 0))?;
    Ok(ctx
        .ivars_of(&ctx.receiver)
        .and_then(|ivars| ivars.get_own(&name))
        .unwrap_or_default())
}

fn instance_variable_set(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let name = ivar_name(ctx, &arg(&args, 0))?;
    let value = arg(&args, 1);
    match ctx.ivars_of(&ctx.receiver) {
        Some(ivars) => {
            ivars.set_own(&name, value.clone());
            Ok(value)
        }
        None => Err(Exception::new(
            ExceptionKind::RuntimeError,
            format!("can't modify frozen {}", ctx.class_name(&ctx.receiver)),
        )
        .into()),
    }
}

fn instance_variable_defined(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let name = ivar_name(ctx, &arg(&args, 0))?;
    let defined = ctx
        .ivars_of(&ctx.receiver)
        .is_some_and(|ivars| ivars.get_own(&name).is_some());
    Ok(Value::Bool(defined))
}

fn instance_variables(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let names = ctx.ivars_of(&ctx.receiver).map(|ivars| ivars.names()).unwrap_or_default();
    Ok(Value::array(names.iter().map(|name| Value::symbol(name)).collect()))
}

/// `define_singleton_method(name) { ... }` or `(name, proc)`.
fn define_singleton_method(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let name = name_arg(ctx, &arg(&args, 0))?;
    let body = block_or_arg(ctx, &args, 1)
        .ok_or_else(|| Exception::argument("tried to create Proc object without a block"))?;
    let method = Method::new(&name, body.arity(), MethodBody::Proc(body.rewrap(false, true)));
    let receiver = ctx.receiver.clone();
    ctx.registry_mut().add_singleton_method(&receiver, method)?;
    Ok(Value::symbol(&name))
}

fn singleton_methods(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let registry = ctx.registry();
    let holder = match &ctx.receiver {
        Value::Class(id) => registry.class(*id).eigenclass,
        other => {
            let class = registry.dispatch_class(other);
            matches!(registry.class(class).kind, ClassKind::Singleton { .. }).then_some(class)
        }
    };
    let names = holder
        .map(|class| registry.method_names(class, false, |visibility| visibility != Visibility::Private))
        .unwrap_or_default();
    Ok(Value::array(names.iter().map(|name| Value::symbol(name)).collect()))
}

/// Mixes modules into the receiver's singleton class, then runs each
/// module's `extended` hook.
fn extend(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let receiver = ctx.receiver.clone();
    for module in args {
        let Value::Class(id) = module else {
            let class = ctx.class_name(&module);
            return Err(Exception::type_error(format!("wrong argument type {} (expected Module)", class)).into());
        };
        let singleton = ctx.registry_mut().singleton_class_of(&receiver)?;
        ctx.registry_mut().include_module(singleton, id)?;
        ctx.funcall(&module, "extended", vec![receiver.clone()])?;
    }
    Ok(receiver)
}

#[cfg(test)]
mod tests {
    use crate::builtins::testing::{error, inspect, output};
    use crate::runtime::error::ExceptionKind;

    #[test]
    fn test_default_inspect() {
        assert_eq!(inspect("class Foo; end\nFoo.new"), "#<Foo>");
        let source = "class Point\n  def initialize(x, y)\n    @x = x\n    @y = y\n  end\nend\nPoint.new(1, \"a\")";
        assert_eq!(inspect(source), "#<Point @x=1, @y=\"a\">");
    }

    #[test]
    fn test_identity_and_equality() {
        assert_eq!(inspect("o = Object.new\n[o == o, o == Object.new, o != o, o.equal?(o)]"), "[true, false, false, true]");
        assert_eq!(inspect("[!nil, !0, 1.nil?, nil.nil?]"), "[true, false, false, true]");
    }

    #[test]
    fn test_is_a_through_mixins() {
        let source = "module M; end\nclass A; include M; end\nclass B < A; end\nb = B.new\n[b.is_a?(A), b.kind_of?(M), b.instance_of?(A), b.instance_of?(B)]";
        assert_eq!(inspect(source), "[true, true, false, true]");
        assert_eq!(error("1.is_a?(3)").kind, ExceptionKind::TypeError);
    }

    #[test]
    fn test_send_ignores_visibility() {
        let source = "class Safe\n  private\n  def secret(n)\n    n * 2\n  end\nend\nSafe.new.send(:secret, 21)";
        assert_eq!(inspect(source), "42");
        let err = error("class Safe\n  private\n  def secret\n  end\nend\nSafe.new.public_send(:secret)");
        assert_eq!(err.kind, ExceptionKind::PrivateNoMethodError);
    }

    #[test]
    fn test_respond_to() {
        let source = "class Ghost\n  def respond_to_missing?(name, all)\n    name == :boo\n  end\n  private\n  def hidden; end\nend\ng = Ghost.new\n[g.respond_to?(:boo), g.respond_to?(:hidden), g.respond_to?(:hidden, true), g.respond_to?(:inspect)]";
        assert_eq!(inspect(source), "[true, false, true, true]");
    }

    #[test]
    fn test_method_missing_messages() {
        let err = error("undefined_thing");
        assert_eq!(err.kind, ExceptionKind::NameError);
        assert_eq!(err.message, "undefined local variable or method 'undefined_thing' for main");
        let err = error("5.frobnicate");
        assert_eq!(err.kind, ExceptionKind::NoMethodError);
        assert_eq!(err.message, "undefined method 'frobnicate' for 5");
    }

    #[test]
    fn test_instance_variables_reflection() {
        let source = "o = Object.new\no.instance_variable_set(:@a, 1)\n[o.instance_variable_get(:@a), o.instance_variables, o.instance_variable_defined?(:@b)]";
        assert_eq!(inspect(source), "[1, [:@a], false]");
        assert_eq!(error("Object.new.instance_variable_get(:a)").kind, ExceptionKind::NameError);
        assert_eq!(error("5.instance_variable_set(:@a, 1)").kind, ExceptionKind::RuntimeError);
    }

    #[test]
    fn test_singleton_methods_only_on_one_object() {
        let source = "class Foo; end\na = Foo.new\nb = Foo.new\na.define_singleton_method(:greet) { \"hi\" }\n[a.greet, b.respond_to?(:greet), a.singleton_methods]";
        assert_eq!(inspect(source), "[\"hi\", false, [:greet]]");
    }

    #[test]
    fn test_singleton_methods_on_strings_and_collections() {
        let source = "a = \"x\"\nb = \"x\"\nclass << a\n  def hi\n    1\n  end\nend\n[a.hi, b.respond_to?(:hi), a.singleton_methods, a.class]";
        assert_eq!(inspect(source), "[1, false, [:hi], String]");
        let source = "list = [1, 2]\nlist.define_singleton_method(:total) { sum }\nh = {}\ndef h.kind\n  :config\nend\n[list.total, h.kind, [1, 2].respond_to?(:total)]";
        assert_eq!(inspect(source), "[3, :config, false]");
        let err = error("\"y\".hi");
        assert_eq!(err.kind, ExceptionKind::NoMethodError);
        assert_eq!(error("5.define_singleton_method(:x) { 1 }").kind, ExceptionKind::TypeError);
    }

    #[test]
    fn test_extend_runs_hook() {
        let source = "module Loud\n  def self.extended(base)\n    puts \"extended\"\n  end\n  def shout\n    \"HEY\"\n  end\nend\no = Object.new\no.extend(Loud)\nputs o.shout";
        assert_eq!(output(source), "extended\nHEY\n");
    }

    #[test]
    fn test_tap_then_itself() {
        assert_eq!(output("x = 5.tap { |n| puts n + 1 }\nputs x"), "6\n5\n");
        assert_eq!(inspect("5.then { |n| n * 2 }"), "10");
        assert_eq!(inspect("[:a.itself, 1.frozen?, \"s\".frozen?]"), "[:a, true, false]");
    }

    #[test]
    fn test_instance_eval_binds_self() {
        let source = "class Box\n  def initialize\n    @v = 9\n  end\nend\nBox.new.instance_eval { @v }";
        assert_eq!(inspect(source), "9");
    }

    #[test]
    fn test_dup_is_shallow() {
        let source = "a = [1, [2]]\nb = a.dup\nb << 3\nb[1] << 4\n[a, b]";
        assert_eq!(inspect(source), "[[1, [2, 4]], [1, [2, 4], 3]]");
    }
}
