//! `Exception` and its subclasses.
//!
//! Exceptions raised by the runtime itself start out as bare
//! [`Exception`] values and only get a Ruby object when rescued. Exceptions
//! raised from Ruby with `raise` carry their object from the start, so
//! user subclasses, custom `message` methods and extra state survive.

use crate::builtins::{ANY, NONE, NativeTable, arg, define, define_singleton};
use crate::runtime::class::Registry;
use crate::runtime::context::CallContext;
use crate::runtime::error::{Control, EvalResult, Exception, ExceptionKind};
use crate::runtime::method::Arity;
use crate::runtime::value::{ExceptionData, Instance, Value};

/// Installs `Exception`'s methods; every other exception class inherits them.
pub fn register(registry: &mut Registry) {
    let exception = registry.core().exception(ExceptionKind::Exception);
    let table: NativeTable<'_> = &[
        ("initialize", Arity::Range(0, 1), initialize),
        ("exception", Arity::Range(0, 1), exception_with_message),
        ("message", NONE, message),
        ("to_s", NONE, to_s),
        ("inspect", NONE, inspect),
        ("full_message", ANY, full_message),
        ("backtrace", NONE, backtrace),
        ("==", Arity::Exact(1), equal),
    ];
    define(registry, exception, table);
    define_singleton(registry, exception, &[("exception", ANY, class_exception)]);
}

// ============================================================================
// Raising
// ============================================================================

/// Builds the exception `raise` propagates from its arguments.
pub(crate) fn build(ctx: &mut CallContext<'_>, args: Vec<Value>) -> Result<Exception, Control> {
    let mut args = args.into_iter();
    let object = match args.next() {
        None => match ctx.env.get("$!") {
            Some(current @ Value::Object(_)) => current,
            _ => {
                let mut exception = Exception::new(ExceptionKind::RuntimeError, "unhandled exception");
                exception.backtrace = caller_backtrace(ctx);
                return Ok(exception);
            }
        },
        Some(Value::String(message)) => {
            let class = Value::Class(ctx.core().exception(ExceptionKind::RuntimeError));
            ctx.send(&class, "new", vec![Value::String(message)])?
        }
        Some(target) => {
            let class = ctx.registry().dispatch_class(&target);
            if ctx.registry().find_method(class, "exception").is_none() {
                return Err(Exception::type_error("exception class/object expected").into());
            }
            ctx.send(&target, "exception", args.collect())?
        }
    };
    from_object(ctx, object)
}

/// Wraps an exception object for propagation. A backtrace recorded when the
/// object was first raised is kept.
pub(crate) fn from_object(ctx: &mut CallContext<'_>, object: Value) -> Result<Exception, Control> {
    let Value::Object(instance) = &object else {
        return Err(Exception::type_error("exception object expected").into());
    };
    let class = ctx.registry().real_class(instance.class());
    let Some(kind) = ctx.registry().class(class).exception_kind else {
        return Err(Exception::type_error("exception object expected").into());
    };
    let message = ctx.send(&object, "message", Vec::new())?;
    let message = ctx.to_s(&message)?;

    let recorded = instance.exception.borrow().as_ref().and_then(|data| data.backtrace.clone());
    let backtrace = match recorded {
        Some(backtrace) => backtrace,
        None => {
            let backtrace = caller_backtrace(ctx);
            data_mut(instance).backtrace = Some(backtrace.clone());
            backtrace
        }
    };

    let mut exception = Exception::new(kind, message);
    exception.class_name = ctx.registry().name_of(class);
    exception.backtrace = backtrace;
    exception.object = Some(instance.clone());
    Ok(exception)
}

// The running native's own frame is left out
fn caller_backtrace(ctx: &mut CallContext<'_>) -> Vec<String> {
    ctx.runtime.call_stack().backtrace().into_iter().skip(1).collect()
}

fn data_mut(instance: &Instance) -> std::cell::RefMut<'_, ExceptionData> {
    std::cell::RefMut::map(instance.exception.borrow_mut(), |data| {
        data.get_or_insert_with(ExceptionData::default)
    })
}

fn self_instance(ctx: &CallContext<'_>) -> Result<std::rc::Rc<Instance>, Control> {
    match &ctx.receiver {
        Value::Object(instance) => Ok(instance.clone()),
        other => Err(Exception::internal(format!("expected an exception receiver, got {:?}", other)).into()),
    }
}

// ============================================================================
// Exception Methods
// ============================================================================

fn initialize(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let instance = self_instance(ctx)?;
    let message = match args.first() {
        None | Some(Value::Nil) => None,
        Some(value) => Some(ctx.to_s(value)?),
    };
    data_mut(&instance).message = message;
    Ok(Value::Nil)
}

/// `Exception.exception(*args)` is `new`.
fn class_exception(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let class = ctx.receiver.clone();
    ctx.send(&class, "new", args)
}

/// `exception` returns the receiver, or a copy carrying a new message.
fn exception_with_message(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let instance = self_instance(ctx)?;
    let Some(message) = args.first() else {
        return Ok(ctx.receiver.clone());
    };
    let class = ctx.registry().real_class(instance.class());
    let mut data = instance.exception.borrow().clone().unwrap_or_default();
    data.message = Some(ctx.to_s(message)?);
    data.backtrace = None;
    let copy = Instance::exception(class, data);
    for name in instance.ivars.names() {
        copy.ivars.set_own(&name, instance.ivars.get_own(&name).unwrap_or_default());
    }
    Ok(Value::Object(copy))
}

fn message(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let receiver = ctx.receiver.clone();
    ctx.funcall(&receiver, "to_s", Vec::new())
}

/// The message given to `new`, or the class name.
fn to_s(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let instance = self_instance(ctx)?;
    let message = instance.exception.borrow().as_ref().and_then(|data| data.message.clone());
    Ok(Value::string(message.unwrap_or_else(|| ctx.class_name(&ctx.receiver))))
}

/// `#<Class: message>`, or just the class name for an empty message.
fn inspect(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let receiver = ctx.receiver.clone();
    let class = ctx.class_name(&receiver);
    let text = ctx.to_s(&receiver)?;
    if text.is_empty() {
        return Ok(Value::string(class));
    }
    Ok(Value::string(format!("#<{}: {}>", class, text)))
}

fn backtrace(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let instance = self_instance(ctx)?;
    let lines = instance.exception.borrow().as_ref().and_then(|data| data.backtrace.clone());
    Ok(lines
        .map(|lines| Value::array(lines.into_iter().map(Value::string).collect()))
        .unwrap_or_default())
}

/// `file:line:in 'frame': message (Class)` followed by the remaining
/// backtrace lines.
fn full_message(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let receiver = ctx.receiver.clone();
    let class = ctx.class_name(&receiver);
    let message = ctx.send(&receiver, "message", Vec::new())?;
    let message = ctx.to_s(&message)?;
    let lines = match backtrace(ctx, Vec::new())? {
        Value::Array(lines) => lines.borrow().iter().filter_map(Value::as_text).collect(),
        _ => Vec::new(),
    };
    Ok(Value::string(format_report(&class, &message, &lines)))
}

/// The report printed for an uncaught exception.
pub fn format_report(class: &str, message: &str, backtrace: &[String]) -> String {
    let mut report = match backtrace.first() {
        Some(origin) => format!("{}: {} ({})", origin, message, class),
        None => format!("{} ({})", message, class),
    };
    for line in backtrace.iter().skip(1) {
        report.push_str("\n\tfrom ");
        report.push_str(line);
    }
    report
}

fn equal(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let receiver = ctx.receiver.clone();
    let other = arg(&args, 0);
    if receiver.identical(&other) {
        return Ok(Value::Bool(true));
    }
    let registry = ctx.registry();
    if registry.class_of(&receiver) != registry.class_of(&other) {
        return Ok(Value::Bool(false));
    }
    let mine = ctx.send(&receiver, "message", Vec::new())?;
    let theirs = ctx.send(&other, "message", Vec::new())?;
    Ok(Value::Bool(mine == theirs))
}

#[cfg(test)]
mod tests {
    use super::format_report;
    use crate::builtins::testing::{error, inspect, output};
    use crate::runtime::error::ExceptionKind;

    #[test]
    fn test_message_defaults_to_class_name() {
        assert_eq!(inspect("RuntimeError.new.message"), "\"RuntimeError\"");
        assert_eq!(inspect("RuntimeError.new(\"x\").message"), "\"x\"");
        assert_eq!(inspect("StandardError.new(\"bad\")"), "#<StandardError: bad>");
        assert_eq!(inspect("StandardError.new(\"\")"), "StandardError");
    }

    #[test]
    fn test_custom_message_override() {
        let source = "class Oops < StandardError\n  def message\n    \"custom\"\n  end\nend\nbegin\n  raise Oops\nrescue Oops => e\n  e.message\nend";
        assert_eq!(inspect(source), "\"custom\"");
    }

    #[test]
    fn test_initialize_with_super() {
        let source = "class ValidationError < StandardError\n  attr_reader :field\n  def initialize(field)\n    @field = field\n    super(\"#{field} is invalid\")\n  end\nend\nbegin\n  raise ValidationError.new(:name)\nrescue => e\n  [e.field, e.message]\nend";
        assert_eq!(inspect(source), "[:name, \"name is invalid\"]");
    }

    #[test]
    fn test_rescued_runtime_error_has_backtrace() {
        let source = "def divide\n  1 / 0\nend\nbegin\n  divide\nrescue ZeroDivisionError => e\n  puts e.message\n  puts e.backtrace.first\nend";
        let printed = output(source);
        assert!(printed.starts_with("divided by 0\n"), "{}", printed);
        assert!(printed.contains("in '/'"), "{}", printed);
    }

    #[test]
    fn test_raised_backtrace_skips_raise() {
        let source = "def fail_here\n  raise \"x\"\nend\nbegin\n  fail_here\nrescue => e\n  e.backtrace.first\nend";
        let first = inspect(source);
        assert!(first.contains(":2:in 'fail_here'"), "{}", first);
    }

    #[test]
    fn test_rescue_matches_user_hierarchy() {
        let source = "class AppError < StandardError; end\nclass DbError < AppError; end\nbegin\n  raise DbError, \"down\"\nrescue AppError => e\n  e.class\nend";
        assert_eq!(inspect(source), "DbError");
        let err = error("class AppError < StandardError; end\nraise AppError");
        assert!(err.is_a(ExceptionKind::StandardError));
    }

    #[test]
    fn test_exception_with_new_message() {
        let source = "e = ArgumentError.new(\"a\")\nf = e.exception(\"b\")\n[e.message, f.message, f.class, e.exception.equal?(e)]";
        assert_eq!(inspect(source), "[\"a\", \"b\", ArgumentError, true]");
    }

    #[test]
    fn test_full_message_format() {
        assert_eq!(format_report("RuntimeError", "boom", &[]), "boom (RuntimeError)");
        let lines = vec!["a.rb:2:in 'f'".to_string(), "a.rb:5:in '<main>'".to_string()];
        assert_eq!(
            format_report("RuntimeError", "boom", &lines),
            "a.rb:2:in 'f': boom (RuntimeError)\n\tfrom a.rb:5:in '<main>'"
        );
    }
}
