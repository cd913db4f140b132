//! `Proc`.

use std::rc::Rc;

use crate::builtins::{NONE, ONE, NativeTable, define, define_singleton};
use crate::runtime::class::Registry;
use crate::runtime::context::CallContext;
use crate::runtime::error::{Control, EvalResult, Exception};
use crate::runtime::method::Arity;
use crate::runtime::proc::Proc;
use crate::runtime::value::Value;

/// Installs `Proc`'s methods.
pub fn register(registry: &mut Registry) {
    let proc_class = registry.core().proc_class;
    let table: NativeTable<'_> = &[
        ("call", Arity::ANY, call),
        ("[]", Arity::ANY, call),
        ("yield", Arity::ANY, call),
        ("===", Arity::ANY, call),
        ("to_proc", NONE, to_proc),
        ("lambda?", NONE, is_lambda),
        ("arity", NONE, arity),
        (">>", ONE, compose_then),
        ("<<", ONE, compose_before),
        ("inspect", NONE, inspect),
        ("to_s", NONE, inspect),
    ];
    define(registry, proc_class, table);
    let constructor: NativeTable<'_> = &[("new", NONE, proc_new)];
    define_singleton(registry, proc_class, constructor);
}

fn receiver(ctx: &CallContext<'_>) -> Result<Rc<Proc>, Control> {
    match &ctx.receiver {
        Value::Proc(proc) => Ok(proc.clone()),
        other => Err(Exception::internal(format!("expected a Proc receiver, got {:?}", other)).into()),
    }
}

/// `Proc.new { ... }`.
fn proc_new(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let block = ctx
        .block
        .clone()
        .ok_or_else(|| Exception::argument("tried to create Proc object without a block"))?;
    Ok(Value::Proc(block.rewrap(block.lambda, true)))
}

/// Runs the closure; a block given to `call` becomes the closure's block.
fn call(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let proc = receiver(ctx)?;
    let block = ctx.block.clone();
    ctx.runtime.call_proc(&proc, args, block, None)
}

fn to_proc(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(ctx.receiver.clone())
}

fn is_lambda(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(Value::Bool(receiver(ctx)?.lambda))
}

fn arity(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(Value::Integer(receiver(ctx)?.ruby_arity()))
}

/// Anything callable: a proc, or an object answering `call`.
fn callable(ctx: &mut CallContext<'_>, value: &Value) -> Result<(), Control> {
    if matches!(value, Value::Proc(_)) || ctx.registry().find_method(ctx.registry().dispatch_class(value), "call").is_some() {
        return Ok(());
    }
    Err(Exception::type_error("callable object is expected").into())
}

fn call_value(ctx: &mut CallContext<'_>, callable: &Value, args: Vec<Value>) -> EvalResult {
    match callable {
        Value::Proc(proc) => ctx.call_proc(proc, args),
        other => ctx.send(other, "call", args),
    }
}

/// `f >> g` calls `f`, then `g` with the result.
fn compose_then(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let first = receiver(ctx)?;
    let then = args[0].clone();
    callable(ctx, &then)?;
    let lambda = first.lambda;
    let composed = Proc::native(first.arity(), move |ctx, args| {
        let result = ctx.call_proc(&first, args)?;
        call_value(ctx, &then, vec![result])
    });
    Ok(Value::Proc(composed.rewrap(lambda, lambda)))
}

/// `f << g` calls `g`, then `f` with the result.
fn compose_before(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let last = receiver(ctx)?;
    let before = args[0].clone();
    callable(ctx, &before)?;
    let lambda = last.lambda;
    let composed = Proc::native(Arity::ANY, move |ctx, args| {
        let result = call_value(ctx, &before, args)?;
        ctx.call_proc(&last, vec![result])
    });
    Ok(Value::Proc(composed.rewrap(lambda, false)))
}

fn inspect(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let proc = receiver(ctx)?;
    let suffix = if proc.lambda { " (lambda)" } else { "" };
    Ok(Value::string(format!("#<Proc{}>", suffix)))
}
