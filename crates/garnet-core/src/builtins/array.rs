//! `Array`.
//!
//! Iteration re-reads the array on every step, so blocks may push to or
//! pop from the array they are iterating over without invalidating
//! anything.

use std::cell::RefCell;
use std::rc::Rc;

use crate::builtins::{
    ANY, MAX_ARRAY_LEN, NONE, ONE, NativeTable, arg, compare, define, define_private, grow_array, inspect_nested,
    int_arg, repeated_len, self_array, sort_values, type_name, values_equal,
};
use crate::runtime::class::Registry;
use crate::runtime::context::CallContext;
use crate::runtime::error::{Control, EvalResult, Exception, ExceptionKind};
use crate::runtime::method::Arity;
use crate::runtime::value::{RubyHash, Value};

/// Installs `Array`'s methods.
pub fn register(registry: &mut Registry) {
    let array = registry.core().array;
    let table: NativeTable<'_> = &[
        ("[]", Arity::Range(1, 2), index),
        ("slice", Arity::Range(1, 2), index),
        ("[]=", Arity::Range(2, 3), set_index),
        ("at", ONE, at),
        ("dig", Arity::AtLeast(1), dig),
        ("length", NONE, length),
        ("size", NONE, length),
        ("empty?", NONE, is_empty),
        ("push", ANY, push),
        ("append", ANY, push),
        ("<<", ONE, push),
        ("pop", Arity::Range(0, 1), pop),
        ("shift", Arity::Range(0, 1), shift),
        ("unshift", ANY, unshift),
        ("prepend", ANY, unshift),
        ("insert", Arity::AtLeast(1), insert),
        ("concat", ANY, concat),
        ("delete", ONE, delete),
        ("delete_at", ONE, delete_at),
        ("delete_if", NONE, delete_if),
        ("clear", NONE, clear),
        ("first", Arity::Range(0, 1), first),
        ("last", Arity::Range(0, 1), last),
        ("take", ONE, take),
        ("drop", ONE, drop_first),
        ("each", NONE, each),
        ("each_index", NONE, each_index),
        ("map", NONE, map),
        ("collect", NONE, map),
        ("map!", NONE, map_in_place),
        ("select", NONE, select),
        ("filter", NONE, select),
        ("reject", NONE, reject),
        ("join", Arity::Range(0, 1), join),
        ("reverse", NONE, reverse),
        ("rotate", Arity::Range(0, 1), rotate),
        ("include?", ONE, includes),
        ("index", Arity::Range(0, 1), find_index),
        ("find_index", Arity::Range(0, 1), find_index),
        ("+", ONE, plus),
        ("-", ONE, minus),
        ("*", ONE, times),
        ("&", ONE, intersection),
        ("|", ONE, union),
        ("==", ONE, equal),
        ("eql?", ONE, equal),
        ("<=>", ONE, cmp),
        ("flatten", Arity::Range(0, 1), flatten),
        ("compact", NONE, compact),
        ("uniq", NONE, uniq),
        ("zip", ANY, zip),
        ("sort", NONE, sort),
        ("sort!", NONE, sort_in_place),
        ("to_a", NONE, to_a),
        ("entries", NONE, to_a),
        ("to_h", NONE, to_h),
        ("inspect", NONE, inspect),
        ("to_s", NONE, inspect),
    ];
    define(registry, array, table);
    define_private(registry, array, &[("initialize", Arity::Range(0, 2), initialize)]);
}

fn items(ctx: &CallContext<'_>) -> Result<Vec<Value>, Control> {
    Ok(self_array(ctx)?.borrow().clone())
}

/// An `Array` argument.
fn array_arg(ctx: &CallContext<'_>, value: &Value) -> Result<Rc<RefCell<Vec<Value>>>, Control> {
    match value {
        Value::Array(items) => Ok(items.clone()),
        other => Err(Exception::implicit_conversion(&type_name(ctx, other), "Array").into()),
    }
}

/// Resolves a possibly negative index against `len`.
fn resolve(index: i64, len: usize) -> Option<usize> {
    let resolved = if index < 0 { index + len as i64 } else { index };
    (resolved >= 0).then_some(resolved as usize)
}

/// `Array.new(size = 0, default = nil)`, or `Array.new(size) { |i| ... }`.
fn initialize(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let Some(size) = args.first() else {
        return Ok(Value::Nil);
    };
    let size = int_arg(ctx, size)?;
    if size < 0 {
        return Err(Exception::argument("negative array size").into());
    }
    let too_big = || Exception::argument("array size too big");
    let len = repeated_len(1, size, MAX_ARRAY_LEN).ok_or_else(too_big)?;
    let mut filled = Vec::new();
    if filled.try_reserve(len).is_err() {
        return Err(too_big().into());
    }
    match ctx.block.clone() {
        Some(block) => {
            for i in 0..size {
                filled.push(ctx.call_proc(&block, vec![Value::Integer(i)])?);
            }
        }
        None => filled.resize(len, arg(&args, 1)),
    }
    *self_array(ctx)?.borrow_mut() = filled;
    Ok(Value::Nil)
}

// ============================================================================
// Element Access
// ============================================================================

/// `a[i]` or `a[start, length]`.
fn index(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let items = items(ctx)?;
    let start = int_arg(ctx, &args[0])?;
    match args.get(1) {
        None => Ok(resolve(start, items.len())
            .and_then(|at| items.get(at).cloned())
            .unwrap_or_default()),
        Some(length) => {
            let length = int_arg(ctx, length)?;
            match resolve(start, items.len()) {
                Some(at) if at <= items.len() && length >= 0 => {
                    let end = at.saturating_add(length as usize).min(items.len());
                    Ok(Value::array(items[at..end].to_vec()))
                }
                _ => Ok(Value::Nil),
            }
        }
    }
}

fn at(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    index(ctx, args)
}

/// `a[i] = v` pads with nil past the end; `a[start, length] = v` replaces
/// a run, spreading `v` if it is an array.
fn set_index(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let target = self_array(ctx)?;
    let start = int_arg(ctx, &args[0])?;
    let value = args[args.len() - 1].clone();
    let len = target.borrow().len();
    let Some(at) = resolve(start, len) else {
        let minimum = -(len as i64);
        return Err(Exception::new(
            ExceptionKind::IndexError,
            format!("index {} too small for array; minimum: {}", start, minimum),
        )
        .into());
    };
    let mut items = target.borrow_mut();
    grow_array(&mut items, at, || {
        Exception::new(ExceptionKind::IndexError, format!("index {} too big", start))
    })?;
    if args.len() == 2 {
        if at == items.len() {
            items.push(value.clone());
        } else {
            items[at] = value.clone();
        }
        return Ok(value);
    }
    drop(items);
    let length = int_arg(ctx, &args[1])?;
    if length < 0 {
        return Err(Exception::new(ExceptionKind::IndexError, format!("negative length ({})", length)).into());
    }
    let replacement = match &value {
        Value::Array(values) => values.borrow().clone(),
        other => vec![other.clone()],
    };
    let mut items = target.borrow_mut();
    let end = (at + length as usize).min(items.len());
    items.splice(at..end, replacement);
    Ok(value)
}

/// `a.dig(i, j, ...)`: nested `[]` that stops at the first nil.
fn dig(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let mut current = ctx.receiver.clone();
    for key in args {
        if current.is_nil() {
            break;
        }
        current = ctx.send(&current, "[]", vec![key])?;
    }
    Ok(current)
}

fn length(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(Value::Integer(self_array(ctx)?.borrow().len() as i64))
}

fn is_empty(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(Value::Bool(self_array(ctx)?.borrow().is_empty()))
}

fn count_arg(ctx: &CallContext<'_>, value: &Value) -> Result<usize, Control> {
    let n = int_arg(ctx, value)?;
    if n < 0 {
        return Err(Exception::argument("negative array size").into());
    }
    Ok(n as usize)
}

fn first(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let items = items(ctx)?;
    match args.first() {
        None => Ok(items.first().cloned().unwrap_or_default()),
        Some(n) => {
            let n = count_arg(ctx, n)?.min(items.len());
            Ok(Value::array(items[..n].to_vec()))
        }
    }
}

fn last(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let items = items(ctx)?;
    match args.first() {
        None => Ok(items.last().cloned().unwrap_or_default()),
        Some(n) => {
            let n = count_arg(ctx, n)?.min(items.len());
            Ok(Value::array(items[items.len() - n..].to_vec()))
        }
    }
}

fn take(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    first(ctx, args)
}

fn drop_first(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let items = items(ctx)?;
    let n = count_arg(ctx, &args[0])?.min(items.len());
    Ok(Value::array(items[n..].to_vec()))
}

// ============================================================================
// Mutation
// ============================================================================

fn push(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    self_array(ctx)?.borrow_mut().extend(args);
    Ok(ctx.receiver.clone())
}

/// Removes the last element, or the last `n` as an array.
fn pop(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let target = self_array(ctx)?;
    match args.first() {
        None => Ok(target.borrow_mut().pop().unwrap_or_default()),
        Some(n) => {
            let n = count_arg(ctx, n)?;
            let mut items = target.borrow_mut();
            let at = items.len().saturating_sub(n);
            Ok(Value::array(items.split_off(at)))
        }
    }
}

fn shift(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let target = self_array(ctx)?;
    match args.first() {
        None => {
            let mut items = target.borrow_mut();
            Ok(if items.is_empty() { Value::Nil } else { items.remove(0) })
        }
        Some(n) => {
            let n = count_arg(ctx, n)?;
            let mut items = target.borrow_mut();
            let n = n.min(items.len());
            Ok(Value::array(items.drain(..n).collect()))
        }
    }
}

fn unshift(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    self_array(ctx)?.borrow_mut().splice(0..0, args);
    Ok(ctx.receiver.clone())
}

fn insert(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let target = self_array(ctx)?;
    let index = int_arg(ctx, &args[0])?;
    let len = target.borrow().len();
    // Negative indices insert after the element they name
    let at = if index < 0 { resolve(index + 1, len) } else { Some(index as usize) };
    let Some(at) = at else {
        return Err(Exception::new(
            ExceptionKind::IndexError,
            format!("index {} too small for array; minimum: -{}", index, len + 1),
        )
        .into());
    };
    let mut items = target.borrow_mut();
    grow_array(&mut items, at, || {
        Exception::new(ExceptionKind::IndexError, format!("index {} too big", index))
    })?;
    items.splice(at..at, args.into_iter().skip(1));
    drop(items);
    Ok(ctx.receiver.clone())
}

fn concat(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let mut added = Vec::new();
    for value in &args {
        added.extend(array_arg(ctx, value)?.borrow().iter().cloned());
    }
    self_array(ctx)?.borrow_mut().extend(added);
    Ok(ctx.receiver.clone())
}

/// Removes every element `==` to the argument; returns it, or nil if none
/// matched.
fn delete(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let target = self_array(ctx)?;
    let mut kept = Vec::new();
    let mut found = None;
    let snapshot = target.borrow().clone();
    for item in snapshot {
        if values_equal(ctx, &item, &args[0])? {
            found = Some(item);
        } else {
            kept.push(item);
        }
    }
    *target.borrow_mut() = kept;
    Ok(found.unwrap_or_default())
}

fn delete_at(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let target = self_array(ctx)?;
    let index = int_arg(ctx, &args[0])?;
    let mut items = target.borrow_mut();
    Ok(match resolve(index, items.len()) {
        Some(at) if at < items.len() => items.remove(at),
        _ => Value::Nil,
    })
}

fn delete_if(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let block = ctx.expect_block()?;
    let target = self_array(ctx)?;
    let mut kept = Vec::new();
    let snapshot = target.borrow().clone();
    for item in snapshot {
        if !ctx.call_proc(&block, vec![item.clone()])?.truthy() {
            kept.push(item);
        }
    }
    *target.borrow_mut() = kept;
    Ok(ctx.receiver.clone())
}

fn clear(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    self_array(ctx)?.borrow_mut().clear();
    Ok(ctx.receiver.clone())
}

// ============================================================================
// Iteration
// ============================================================================

/// Yields each element. Without a block, returns a copy of the array.
fn each(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let Some(block) = ctx.block.clone() else {
        return Ok(Value::array(items(ctx)?));
    };
    let target = self_array(ctx)?;
    let mut i = 0;
    loop {
        let Some(item) = target.borrow().get(i).cloned() else {
            break;
        };
        ctx.call_proc(&block, vec![item])?;
        i += 1;
    }
    Ok(ctx.receiver.clone())
}

fn each_index(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let block = ctx.expect_block()?;
    let target = self_array(ctx)?;
    let mut i = 0;
    while i < target.borrow().len() {
        ctx.call_proc(&block, vec![Value::Integer(i as i64)])?;
        i += 1;
    }
    Ok(ctx.receiver.clone())
}

fn map(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let Some(block) = ctx.block.clone() else {
        return Ok(Value::array(items(ctx)?));
    };
    let mut mapped = Vec::new();
    for item in items(ctx)? {
        mapped.push(ctx.call_proc(&block, vec![item])?);
    }
    Ok(Value::array(mapped))
}

fn map_in_place(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let mapped = map(ctx, args)?;
    if let Value::Array(mapped) = mapped {
        let mapped = mapped.borrow().clone();
        *self_array(ctx)?.borrow_mut() = mapped;
    }
    Ok(ctx.receiver.clone())
}

fn filter_by(ctx: &mut CallContext<'_>, keep: bool) -> EvalResult {
    let block = ctx.expect_block()?;
    let mut kept = Vec::new();
    for item in items(ctx)? {
        if ctx.call_proc(&block, vec![item.clone()])?.truthy() == keep {
            kept.push(item);
        }
    }
    Ok(Value::array(kept))
}

fn select(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    filter_by(ctx, true)
}

fn reject(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    filter_by(ctx, false)
}

// ============================================================================
// Queries
// ============================================================================

fn includes(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    for item in items(ctx)? {
        if values_equal(ctx, &item, &args[0])? {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

/// Index of the first element `==` to the argument, or for which the block
/// is truthy.
fn find_index(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let block = ctx.block.clone();
    for (i, item) in items(ctx)?.into_iter().enumerate() {
        let found = match (args.first(), &block) {
            (Some(target), _) => values_equal(ctx, &item, target)?,
            (None, Some(block)) => ctx.call_proc(block, vec![item])?.truthy(),
            (None, None) => return Err(Exception::no_block().into()),
        };
        if found {
            return Ok(Value::Integer(i as i64));
        }
    }
    Ok(Value::Nil)
}

fn equal(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let Value::Array(other) = &args[0] else {
        return Ok(Value::Bool(false));
    };
    if ctx.receiver.identical(&args[0]) {
        return Ok(Value::Bool(true));
    }
    let mine = items(ctx)?;
    let theirs = other.borrow().clone();
    if mine.len() != theirs.len() {
        return Ok(Value::Bool(false));
    }
    for (a, b) in mine.iter().zip(&theirs) {
        if !values_equal(ctx, a, b)? {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

/// Element-wise `<=>`, then by length; nil for non-arrays.
fn cmp(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let Value::Array(other) = &args[0] else {
        return Ok(Value::Nil);
    };
    let mine = items(ctx)?;
    let theirs = other.borrow().clone();
    for (a, b) in mine.iter().zip(&theirs) {
        let ordering = compare(ctx, a, b)?;
        if ordering.is_ne() {
            return Ok(Value::Integer(ordering as i64));
        }
    }
    Ok(Value::Integer(mine.len().cmp(&theirs.len()) as i64))
}

// ============================================================================
// Combination
// ============================================================================

fn plus(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let mut combined = items(ctx)?;
    combined.extend(array_arg(ctx, &args[0])?.borrow().iter().cloned());
    Ok(Value::array(combined))
}

/// Set membership uses hash-key equality, like Ruby's `eql?`.
fn key_set(items: &[Value]) -> RubyHash {
    RubyHash::from_pairs(items.iter().map(|item| (item.clone(), Value::Bool(true))))
}

fn minus(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let removed = key_set(&array_arg(ctx, &args[0])?.borrow());
    let kept = items(ctx)?.into_iter().filter(|item| !removed.contains_key(item)).collect();
    Ok(Value::array(kept))
}

fn intersection(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let other = key_set(&array_arg(ctx, &args[0])?.borrow());
    let common: Vec<Value> = items(ctx)?.into_iter().filter(|item| other.contains_key(item)).collect();
    Ok(Value::array(unique(common)))
}

fn union(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let mut combined = items(ctx)?;
    combined.extend(array_arg(ctx, &args[0])?.borrow().iter().cloned());
    Ok(Value::array(unique(combined)))
}

/// `a * n` repeats; `a * sep` joins.
fn times(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    if let Value::String(_) = &args[0] {
        return join(ctx, args);
    }
    let n = int_arg(ctx, &args[0])?;
    if n < 0 {
        return Err(Exception::argument("negative argument").into());
    }
    let items = items(ctx)?;
    if repeated_len(items.len(), n, MAX_ARRAY_LEN).is_none() {
        return Err(Exception::argument("argument too big").into());
    }
    let repeated = (0..n).flat_map(|_| items.iter().cloned()).collect();
    Ok(Value::array(repeated))
}

fn unique(items: Vec<Value>) -> Vec<Value> {
    let mut seen = RubyHash::new();
    let mut kept = Vec::new();
    for item in items {
        if !seen.contains_key(&item) {
            seen.insert(item.clone(), Value::Bool(true));
            kept.push(item);
        }
    }
    kept
}

fn uniq(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(Value::array(unique(items(ctx)?)))
}

fn compact(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(Value::array(items(ctx)?.into_iter().filter(|item| !item.is_nil()).collect()))
}

fn flatten_into(out: &mut Vec<Value>, items: &[Value], depth: i64, seen: &mut Vec<i64>) -> Result<(), Control> {
    for item in items {
        match item {
            Value::Array(inner) if depth != 0 => {
                let id = item.object_id();
                if seen.contains(&id) {
                    return Err(Exception::argument("tried to flatten recursive array").into());
                }
                seen.push(id);
                flatten_into(out, &inner.borrow().clone(), depth - 1, seen)?;
                seen.pop();
            }
            other => out.push(other.clone()),
        }
    }
    Ok(())
}

/// Flattens nested arrays, fully or to `depth` levels.
fn flatten(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let depth = match args.first() {
        Some(Value::Nil) | None => -1,
        Some(value) => int_arg(ctx, value)?,
    };
    let mut out = Vec::new();
    let mut seen = vec![ctx.receiver.object_id()];
    flatten_into(&mut out, &items(ctx)?, depth, &mut seen)?;
    Ok(Value::array(out))
}

fn zip(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let mut others = Vec::with_capacity(args.len());
    for value in &args {
        others.push(array_arg(ctx, value)?.borrow().clone());
    }
    let rows = items(ctx)?
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            let mut row = vec![item];
            row.extend(others.iter().map(|other| other.get(i).cloned().unwrap_or_default()));
            Value::array(row)
        })
        .collect();
    Ok(Value::array(rows))
}

fn reverse(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let mut items = items(ctx)?;
    items.reverse();
    Ok(Value::array(items))
}

fn rotate(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let mut items = items(ctx)?;
    let n = match args.first() {
        Some(value) => int_arg(ctx, value)?,
        None => 1,
    };
    if !items.is_empty() {
        let shift = n.rem_euclid(items.len() as i64) as usize;
        items.rotate_left(shift);
    }
    Ok(Value::array(items))
}

fn sort(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let block = ctx.block.clone();
    let items = items(ctx)?;
    Ok(Value::array(sort_values(ctx, items, block)?))
}

fn sort_in_place(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let block = ctx.block.clone();
    let items = items(ctx)?;
    let sorted = sort_values(ctx, items, block)?;
    *self_array(ctx)?.borrow_mut() = sorted;
    Ok(ctx.receiver.clone())
}

// ============================================================================
// Conversion
// ============================================================================

fn to_a(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(ctx.receiver.clone())
}

/// `[[k, v], ...]` to a hash.
fn to_h(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let mut hash = RubyHash::new();
    for (i, item) in items(ctx)?.into_iter().enumerate() {
        let pair = match &item {
            Value::Array(pair) if pair.borrow().len() == 2 => pair.borrow().clone(),
            other => {
                let class = ctx.class_name(other);
                return Err(Exception::type_error(format!(
                    "wrong element type {} at {} (expected array)",
                    class, i
                ))
                .into());
            }
        };
        hash.insert(pair[0].clone(), pair[1].clone());
    }
    Ok(Value::hash(hash))
}

fn join_into(ctx: &mut CallContext<'_>, out: &mut String, items: &[Value], separator: &str, seen: &mut Vec<i64>) -> Result<(), Control> {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(separator);
        }
        match item {
            Value::Array(inner) => {
                let id = item.object_id();
                if seen.contains(&id) {
                    return Err(Exception::argument("recursive array join").into());
                }
                seen.push(id);
                let inner = inner.borrow().clone();
                join_into(ctx, out, &inner, separator, seen)?;
                seen.pop();
            }
            other => out.push_str(&ctx.to_s(other)?),
        }
    }
    Ok(())
}

/// Joins the elements' `to_s`, flattening nested arrays.
fn join(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let separator = match args.first() {
        None | Some(Value::Nil) => String::new(),
        Some(Value::String(s)) => s.borrow().clone(),
        Some(other) => {
            return Err(Exception::implicit_conversion(&type_name(ctx, other), "String").into());
        }
    };
    let mut out = String::new();
    let mut seen = vec![ctx.receiver.object_id()];
    join_into(ctx, &mut out, &items(ctx)?, &separator, &mut seen)?;
    Ok(Value::string(out))
}

fn inspect(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let receiver = ctx.receiver.clone();
    let text = inspect_nested(ctx, &receiver, "[...]", |ctx| {
        let mut parts = Vec::new();
        for item in items(ctx)? {
            parts.push(ctx.inspect(&item)?);
        }
        Ok(format!("[{}]", parts.join(", ")))
    })?;
    Ok(Value::string(text))
}

#[cfg(test)]
mod tests {
    use crate::builtins::testing::{error, inspect, output};
    use crate::runtime::error::ExceptionKind;

    #[test]
    fn test_new() {
        assert_eq!(inspect("[Array.new, Array.new(2), Array.new(2, 0), Array.new(3) { |i| i * i }]"), "[[], [nil, nil], [0, 0], [0, 1, 4]]");
    }

    #[test]
    fn test_indexing() {
        assert_eq!(inspect("a = [1, 2, 3, 4]\n[a[0], a[-1], a[9], a[1, 2], a[4, 1], a[5, 1]]"), "[1, 4, nil, [2, 3], [], nil]");
        assert_eq!(inspect("a = [1]\na[3] = 4\na"), "[1, nil, nil, 4]");
        assert_eq!(inspect("a = [1, 2, 3]\na[0, 2] = [9, 8, 7]\na"), "[9, 8, 7, 3]");
        let err = error("a = [1]\na[-3] = 0");
        assert_eq!(err.kind, ExceptionKind::IndexError);
        assert_eq!(err.message, "index -3 too small for array; minimum: -1");
        assert_eq!(inspect("[[1, [2, 3]]].dig(0, 1, 0)"), "2");
    }

    #[test]
    fn test_oversized_arrays_raise() {
        let err = error("Array.new(4611686018427387904)");
        assert_eq!(err.kind, ExceptionKind::ArgumentError);
        assert_eq!(err.message, "array size too big");
        assert_eq!(error("Array.new(4611686018427387904, 0)").message, "array size too big");
        assert_eq!(error("Array.new(4611686018427387904) { |i| i }").message, "array size too big");
        let err = error("a = []\na[4611686018427387904] = 1");
        assert_eq!(err.kind, ExceptionKind::IndexError);
        assert_eq!(err.message, "index 4611686018427387904 too big");
        let err = error("[1].insert(4611686018427387904, 2)");
        assert_eq!(err.kind, ExceptionKind::IndexError);
        assert_eq!(err.message, "index 4611686018427387904 too big");
        assert_eq!(error("[1, 2] * 4611686018427387904").message, "argument too big");
        assert_eq!(inspect("a = [1, 2]\na[1, 9223372036854775807] = 5\na"), "[1, 5]");
    }

    #[test]
    fn test_stack_and_queue() {
        let source = "a = [1, 2]\na.push(3, 4)\na << 5\nx = a.pop\ny = a.shift\na.unshift(0)\n[x, y, a]";
        assert_eq!(inspect(source), "[5, 1, [0, 2, 3, 4]]");
        assert_eq!(inspect("[[].pop, [].shift, [1, 2, 3].pop(2)]"), "[nil, nil, [2, 3]]");
        assert_eq!(inspect("a = [1, 4]\na.insert(1, 2, 3)"), "[1, 2, 3, 4]");
    }

    #[test]
    fn test_first_last() {
        assert_eq!(inspect("a = [1, 2, 3]\n[a.first, a.last, a.first(2), a.last(5), [].first]"), "[1, 3, [1, 2], [1, 2, 3], nil]");
    }

    #[test]
    fn test_iteration_sees_appends() {
        let source = "a = [1, 2]\na.each { |x| a << x * 10 if x < 10 }\na";
        assert_eq!(inspect(source), "[1, 2, 10, 20]");
        assert_eq!(output("[:a, :b].each_with_index { |x, i| puts \"#{i}:#{x}\" }"), "0:a\n1:b\n");
    }

    #[test]
    fn test_transformations() {
        assert_eq!(inspect("[1, 2, 3].map { |x| x * 2 }"), "[2, 4, 6]");
        assert_eq!(inspect("[1, 2, 3, 4].select(&:even?)"), "[2, 4]");
        assert_eq!(inspect("[1, 2, 3, 4].reject(&:even?)"), "[1, 3]");
        assert_eq!(inspect("[1, [2, [3, [4]]]].flatten"), "[1, 2, 3, 4]");
        assert_eq!(inspect("[1, [2, [3, [4]]]].flatten(1)"), "[1, 2, [3, [4]]]");
        assert_eq!(inspect("[1, nil, 2, nil].compact"), "[1, 2]");
        assert_eq!(inspect("[1, 2, 1, \"a\", \"a\"].uniq"), "[1, 2, \"a\"]");
        assert_eq!(inspect("[1, 2].zip([3, 4], [5])"), "[[1, 3, 5], [2, 4, nil]]");
        assert_eq!(inspect("[1, 2, 3].rotate"), "[2, 3, 1]");
    }

    #[test]
    fn test_set_operations() {
        assert_eq!(inspect("[1, 2] + [3]"), "[1, 2, 3]");
        assert_eq!(inspect("[1, 2, 3, 2] - [2]"), "[1, 3]");
        assert_eq!(inspect("[1, 2, 2, 3] & [2, 3, 4]"), "[2, 3]");
        assert_eq!(inspect("[1, 2] | [2, 3]"), "[1, 2, 3]");
        assert_eq!(inspect("[0] * 3"), "[0, 0, 0]");
        assert_eq!(error("[1] + 1").message, "no implicit conversion of Integer into Array");
    }

    #[test]
    fn test_join() {
        assert_eq!(inspect("[1, [2, nil], \"x\"].join(\"-\")"), "\"1-2--x\"");
        assert_eq!(inspect("[1, 2] * \",\""), "\"1,2\"");
        assert_eq!(error("a = [1]\na << a\na.join").message, "recursive array join");
    }

    #[test]
    fn test_queries() {
        assert_eq!(inspect("a = [3, 1, 2]\n[a.length, a.include?(2), a.index(1), a.index { |x| x > 2 }, [].empty?]"), "[3, true, 1, 0, true]");
        assert_eq!(inspect("[[1, 2] == [1, 2], [1, 2] == [2, 1], [1] == 1, [1, 2] <=> [1, 3]]"), "[true, false, false, -1]");
    }

    #[test]
    fn test_sorting() {
        assert_eq!(inspect("[3, 1, 2].sort"), "[1, 2, 3]");
        assert_eq!(inspect("[3, 1, 2].sort { |a, b| b <=> a }"), "[3, 2, 1]");
        assert_eq!(inspect("[\"b\", \"a\"].sort"), "[\"a\", \"b\"]");
        assert_eq!(inspect("[[2, 1], [1, 2]].sort"), "[[1, 2], [2, 1]]");
        assert_eq!(inspect("[4, 9, 1].min"), "1");
        assert_eq!(inspect("[4, 9, 1].max"), "9");
        assert_eq!(inspect("[4, 9, 1].sum"), "14");
    }

    #[test]
    fn test_delete_and_conversion() {
        assert_eq!(inspect("a = [1, 2, 1]\n[a.delete(1), a.delete(7), a]"), "[1, nil, [2]]");
        assert_eq!(inspect("[[:a, 1], [:b, 2]].to_h"), "{a: 1, b: 2}");
        assert_eq!(inspect("[1, \"two\", :three, nil].inspect"), "\"[1, \\\"two\\\", :three, nil]\"");
    }
}
