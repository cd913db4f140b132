//! Global functions: output, `raise`, `require`, `loop` and closures.
//!
//! These are private methods of `Kernel`, so they can only be called
//! without an explicit receiver.

use crate::builtins::{ANY, NONE, ONE, NativeTable, define_private, exception, int_arg, str_arg};
use crate::runtime::class::Registry;
use crate::runtime::context::CallContext;
use crate::runtime::error::{Control, EvalResult, Exception};
use crate::runtime::method::Arity;
use crate::runtime::value::Value;

/// Installs the private `Kernel` functions.
pub fn register(registry: &mut Registry) {
    let kernel = registry.core().kernel;
    let table: NativeTable<'_> = &[
        ("puts", ANY, puts),
        ("print", ANY, print),
        ("p", ANY, p),
        ("require", ONE, require),
        ("require_relative", ONE, require_relative),
        ("raise", Arity::Range(0, 2), raise),
        ("fail", Arity::Range(0, 2), raise),
        ("loop", NONE, repeat),
        ("lambda", NONE, lambda),
        ("proc", NONE, proc),
        ("block_given?", NONE, block_given),
        ("caller", Arity::Range(0, 1), caller),
        ("__method__", NONE, current_method),
    ];
    define_private(registry, kernel, table);
}

// ============================================================================
// Output
// ============================================================================

/// Writes each argument on its own line; arrays are flattened one element
/// per line.
fn puts(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    if args.is_empty() {
        ctx.write("\n")?;
        return Ok(Value::Nil);
    }
    let mut text = String::new();
    for value in &args {
        puts_lines(ctx, value, &mut text, 0)?;
    }
    ctx.write(&text)?;
    Ok(Value::Nil)
}

fn puts_lines(ctx: &mut CallContext<'_>, value: &Value, out: &mut String, depth: usize) -> Result<(), Control> {
    match value {
        Value::Array(items) => {
            let items = items.borrow().clone();
            if items.is_empty() && depth == 0 {
                out.push('\n');
            }
            for item in &items {
                if item.identical(value) {
                    out.push_str("[...]\n");
                } else {
                    puts_lines(ctx, item, out, depth + 1)?;
                }
            }
        }
        other => {
            let line = ctx.to_s(other)?;
            out.push_str(&line);
            if !line.ends_with('\n') {
                out.push('\n');
            }
        }
    }
    Ok(())
}

fn print(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let mut text = String::new();
    for value in &args {
        text.push_str(&ctx.to_s(value)?);
    }
    ctx.write(&text)?;
    Ok(Value::Nil)
}

/// Writes each argument's `inspect`; returns its argument (or arguments).
fn p(ctx: &mut CallContext<'_>, mut args: Vec<Value>) -> EvalResult {
    let mut text = String::new();
    for value in &args {
        text.push_str(&ctx.inspect(value)?);
        text.push('\n');
    }
    ctx.write(&text)?;
    Ok(match args.len() {
        0 => Value::Nil,
        1 => args.remove(0),
        _ => Value::array(args),
    })
}

// ============================================================================
// Loading
// ============================================================================

fn require(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let feature = str_arg(ctx, &args[0])?;
    ctx.runtime.load_feature(&feature, false)
}

fn require_relative(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let feature = str_arg(ctx, &args[0])?;
    ctx.runtime.load_feature(&feature, true)
}

// ============================================================================
// Control Flow
// ============================================================================

/// `raise`, `raise "message"`, `raise Class`, `raise Class, "message"` or
/// `raise exception`.
fn raise(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let exception = exception::build(ctx, args)?;
    Err(exception.into())
}

/// Calls the block until it `break`s; the call site catches the break.
fn repeat(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let block = ctx.expect_block()?;
    loop {
        ctx.call_proc(&block, Vec::new())?;
    }
}

fn lambda(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let block = ctx
        .block
        .clone()
        .ok_or_else(|| Exception::argument("tried to create Proc object without a block"))?;
    if block.lambda {
        return Ok(Value::Proc(block));
    }
    Ok(Value::Proc(block.rewrap(true, true)))
}

fn proc(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let block = ctx
        .block
        .clone()
        .ok_or_else(|| Exception::argument("tried to create Proc object without a block"))?;
    if block.strict {
        return Ok(Value::Proc(block));
    }
    Ok(Value::Proc(block.rewrap(false, true)))
}

fn block_given(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let given = ctx
        .env
        .activation()
        .is_some_and(|activation| activation.block.is_some());
    Ok(Value::Bool(given))
}

/// The backtrace of the calling method's caller, or from `start` frames up.
fn caller(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let start = match args.first() {
        Some(value) => int_arg(ctx, value)?.max(0) as usize,
        None => 1,
    };
    let lines = ctx.runtime.call_stack().backtrace();
    Ok(Value::array(lines.into_iter().skip(start + 1).map(Value::string).collect()))
}

fn current_method(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(ctx
        .env
        .activation()
        .and_then(|activation| activation.frame.as_ref().map(|frame| Value::symbol(&frame.name)))
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use crate::builtins::testing::{error, inspect, output};
    use crate::runtime::error::ExceptionKind;

    #[test]
    fn test_puts_flattens_arrays() {
        assert_eq!(output("puts 1, [2, [3, nil]], \"x\\n\""), "1\n2\n3\n\nx\n");
        assert_eq!(output("puts"), "\n");
        assert_eq!(output("puts []"), "\n");
    }

    #[test]
    fn test_print_and_p() {
        assert_eq!(output("print \"a\", 1, nil\nprint \"\\n\""), "a1\n");
        assert_eq!(output("x = p \"s\", :sym\np x"), "\"s\"\n:sym\n[\"s\", :sym]\n");
        assert_eq!(inspect("p"), "nil");
    }

    #[test]
    fn test_kernel_functions_are_private() {
        let err = error("5.puts");
        assert_eq!(err.kind, ExceptionKind::PrivateNoMethodError);
        assert_eq!(err.message, "private method 'puts' called for 5");
    }

    #[test]
    fn test_loop_with_break_value() {
        assert_eq!(inspect("i = 0\nloop do\n  i += 1\n  break i * 10 if i == 3\nend"), "30");
    }

    #[test]
    fn test_raise_forms() {
        let err = error("raise \"boom\"");
        assert_eq!(err.kind, ExceptionKind::RuntimeError);
        assert_eq!(err.message, "boom");

        let err = error("raise ArgumentError");
        assert_eq!(err.message, "ArgumentError");

        let err = error("class AppError < StandardError; end\nraise AppError, \"bad\"");
        assert_eq!(err.class_name, "AppError");
        assert_eq!(err.kind, ExceptionKind::StandardError);
        assert_eq!(err.message, "bad");

        assert_eq!(error("raise 42").message, "exception class/object expected");
    }

    #[test]
    fn test_bare_raise_reraises() {
        let source = "begin\n  begin\n    raise KeyError, \"inner\"\n  rescue => e\n    raise\n  end\nrescue => outer\n  [outer.class, outer.message, outer.equal?(e)]\nend";
        assert_eq!(inspect(source), "[KeyError, \"inner\", true]");
        assert_eq!(error("raise").message, "unhandled exception");
    }

    #[test]
    fn test_lambda_and_proc_are_strict() {
        assert_eq!(inspect("l = lambda { |a, b| a + b }\n[l.call(1, 2), l.lambda?, proc { |x| x }.lambda?]"), "[3, true, false]");
        let err = error("pr = proc { |a, b| a }\npr.call(1)");
        assert_eq!(err.kind, ExceptionKind::ArgumentError);
        assert_eq!(err.message, "wrong number of arguments (given 1, expected 2)");
        // Plain blocks stay lenient
        assert_eq!(inspect("def once\n  yield 1, 2, 3\nend\nonce { |a, b| [a, b] }"), "[1, 2]");
        assert_eq!(inspect("def once\n  yield 1\nend\nonce { |a, b| [a, b] }"), "[1, nil]");
    }

    #[test]
    fn test_block_given() {
        let source = "def check\n  block_given?\nend\n[check, check { }]";
        assert_eq!(inspect(source), "[false, true]");
    }

    #[test]
    fn test_caller_and_method_name() {
        let source = "def inner\n  caller\nend\ndef outer\n  inner\nend\nouter";
        let lines = inspect(source);
        assert!(lines.contains("in 'outer'"), "{}", lines);
        assert!(!lines.contains("in 'inner'"), "{}", lines);
        assert_eq!(inspect("def who\n  __method__\nend\nwho"), ":who");
    }

    #[test]
    fn test_require_missing_file() {
        let err = error("require \"definitely_not_here\"");
        assert_eq!(err.kind, ExceptionKind::LoadError);
        assert_eq!(err.message, "cannot load such file -- definitely_not_here");
    }
}
