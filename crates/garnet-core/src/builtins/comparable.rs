//! `Comparable`: relational operators derived from `<=>`.

use std::cmp::Ordering;

use crate::builtins::{ONE, TWO, NativeTable, compare, define};
use crate::runtime::class::Registry;
use crate::runtime::context::CallContext;
use crate::runtime::error::{EvalResult, Exception};
use crate::runtime::value::Value;

/// Installs `Comparable`'s methods.
pub fn register(registry: &mut Registry) {
    let comparable = registry.core().comparable;
    let table: NativeTable<'_> = &[
        ("==", ONE, equal),
        ("<", ONE, less),
        ("<=", ONE, less_or_equal),
        (">", ONE, greater),
        (">=", ONE, greater_or_equal),
        ("between?", TWO, between),
        ("clamp", TWO, clamp),
    ];
    define(registry, comparable, table);
}

fn equal(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let receiver = ctx.receiver.clone();
    if receiver.identical(&args[0]) {
        return Ok(Value::Bool(true));
    }
    let result = ctx.send(&receiver, "<=>", vec![args[0].clone()])?;
    Ok(Value::Bool(matches!(result, Value::Integer(0))))
}

fn ordering(ctx: &mut CallContext<'_>, other: &Value) -> Result<Ordering, crate::runtime::error::Control> {
    let receiver = ctx.receiver.clone();
    compare(ctx, &receiver, other)
}

fn less(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    Ok(Value::Bool(ordering(ctx, &args[0])?.is_lt()))
}

fn less_or_equal(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    Ok(Value::Bool(ordering(ctx, &args[0])?.is_le()))
}

fn greater(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    Ok(Value::Bool(ordering(ctx, &args[0])?.is_gt()))
}

fn greater_or_equal(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    Ok(Value::Bool(ordering(ctx, &args[0])?.is_ge()))
}

fn between(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let above_min = ordering(ctx, &args[0])?.is_ge();
    Ok(Value::Bool(above_min && ordering(ctx, &args[1])?.is_le()))
}

fn clamp(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let (min, max) = (&args[0], &args[1]);
    if compare(ctx, min, max)?.is_gt() {
        return Err(Exception::argument("min argument must be less than or equal to max argument").into());
    }
    if ordering(ctx, min)?.is_lt() {
        return Ok(min.clone());
    }
    if ordering(ctx, max)?.is_gt() {
        return Ok(max.clone());
    }
    Ok(ctx.receiver.clone())
}
