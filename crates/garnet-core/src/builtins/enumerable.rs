//! `Enumerable`: collection methods built on the includer's `each`.
//!
//! Every method drives `each` with a native block that feeds a visitor.
//! Visitors see one value per yield, with multiple yielded values packed
//! into an array, and stop the enumeration early by returning `false`.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

use crate::builtins::{NONE, ONE, NativeTable, arg, compare, define, int_arg, ordering_of, sort_values, values_equal};
use crate::runtime::class::Registry;
use crate::runtime::context::{CallContext, CallFlags};
use crate::runtime::error::{Control, EvalResult, Exception};
use crate::runtime::method::Arity;
use crate::runtime::proc::Proc;
use crate::runtime::value::{RubyHash, Value};

/// Installs `Enumerable`'s methods.
pub fn register(registry: &mut Registry) {
    let enumerable = registry.core().enumerable;
    let table: NativeTable<'_> = &[
        ("to_a", NONE, to_a),
        ("entries", NONE, to_a),
        ("map", NONE, map),
        ("collect", NONE, map),
        ("flat_map", NONE, flat_map),
        ("collect_concat", NONE, flat_map),
        ("select", NONE, select),
        ("filter", NONE, select),
        ("reject", NONE, reject),
        ("filter_map", NONE, filter_map),
        ("find", NONE, find),
        ("detect", NONE, find),
        ("find_index", Arity::Range(0, 1), find_index),
        ("include?", ONE, include),
        ("member?", ONE, include),
        ("inject", Arity::Range(0, 2), inject),
        ("reduce", Arity::Range(0, 2), inject),
        ("sum", Arity::Range(0, 1), sum),
        ("count", Arity::Range(0, 1), count),
        ("each_with_index", NONE, each_with_index),
        ("each_with_object", ONE, each_with_object),
        ("each_slice", ONE, each_slice),
        ("first", Arity::Range(0, 1), first),
        ("take", ONE, take),
        ("min", NONE, min),
        ("max", NONE, max),
        ("min_by", NONE, min_by),
        ("max_by", NONE, max_by),
        ("sort", NONE, sort),
        ("sort_by", NONE, sort_by),
        ("any?", Arity::Range(0, 1), any),
        ("all?", Arity::Range(0, 1), all),
        ("none?", Arity::Range(0, 1), none),
        ("group_by", NONE, group_by),
        ("partition", NONE, partition),
        ("tally", NONE, tally),
        ("uniq", NONE, uniq),
        ("to_h", NONE, to_h),
    ];
    define(registry, enumerable, table);
}

// ============================================================================
// Driving `each`
// ============================================================================

/// Runs the receiver's `each`, threading `state` through `visit` for every
/// yielded value, and returns the final state.
fn scan<S, F>(ctx: &mut CallContext<'_>, state: S, visit: F) -> Result<S, Control>
where
    S: 'static,
    F: Fn(&mut CallContext<'_>, &mut S, Value) -> Result<bool, Control> + 'static,
{
    let tag = ctx.runtime.next_id();
    let cell = Rc::new(RefCell::new(Some(state)));
    let shared = cell.clone();
    let visitor = Proc::native(Arity::ANY, move |ctx, args| {
        let item = if args.len() == 1 {
            args.into_iter().next().unwrap_or_default()
        } else {
            Value::array(args)
        };
        let mut slot = shared
            .try_borrow_mut()
            .map_err(|_| Exception::internal("enumeration re-entered its own block"))?;
        let Some(state) = slot.as_mut() else {
            return Ok(Value::Nil);
        };
        if visit(ctx, state, item)? {
            Ok(Value::Nil)
        } else {
            Err(Control::Break { tag, value: Value::Nil })
        }
    });
    let receiver = ctx.receiver.clone();
    match ctx.dispatch(receiver, "each", Vec::new(), Some(visitor), CallFlags::SELF) {
        Ok(_) => {}
        Err(Control::Break { tag: target, .. }) if target == tag => {}
        Err(control) => return Err(control),
    }
    let finished = cell.borrow_mut().take();
    finished.ok_or_else(|| Exception::internal("enumeration state lost").into())
}

/// Every value `each` yields.
fn items(ctx: &mut CallContext<'_>) -> Result<Vec<Value>, Control> {
    scan(ctx, Vec::new(), |_, items, item| {
        items.push(item);
        Ok(true)
    })
}

fn to_a(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(Value::array(items(ctx)?))
}

// ============================================================================
// Mapping and Filtering
// ============================================================================

fn map(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let Some(block) = ctx.block.clone() else {
        return to_a(ctx, Vec::new());
    };
    let mapped = scan(ctx, Vec::new(), move |ctx, out, item| {
        out.push(ctx.call_proc(&block, vec![item])?);
        Ok(true)
    })?;
    Ok(Value::array(mapped))
}

fn flat_map(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let block = ctx.expect_block()?;
    let mapped = scan(ctx, Vec::new(), move |ctx, out, item| {
        match ctx.call_proc(&block, vec![item])? {
            Value::Array(inner) => out.extend(inner.borrow().iter().cloned()),
            other => out.push(other),
        }
        Ok(true)
    })?;
    Ok(Value::array(mapped))
}

fn filter_by(ctx: &mut CallContext<'_>, keep: bool) -> EvalResult {
    let Some(block) = ctx.block.clone() else {
        return to_a(ctx, Vec::new());
    };
    let kept = scan(ctx, Vec::new(), move |ctx, out, item| {
        if ctx.call_proc(&block, vec![item.clone()])?.truthy() == keep {
            out.push(item);
        }
        Ok(true)
    })?;
    Ok(Value::array(kept))
}

fn select(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    filter_by(ctx, true)
}

fn reject(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    filter_by(ctx, false)
}

fn filter_map(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let block = ctx.expect_block()?;
    let kept = scan(ctx, Vec::new(), move |ctx, out, item| {
        let mapped = ctx.call_proc(&block, vec![item])?;
        if mapped.truthy() {
            out.push(mapped);
        }
        Ok(true)
    })?;
    Ok(Value::array(kept))
}

// ============================================================================
// Searching
// ============================================================================

fn find(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let block = ctx.expect_block()?;
    let found = scan(ctx, Value::Nil, move |ctx, found, item| {
        if ctx.call_proc(&block, vec![item.clone()])?.truthy() {
            *found = item;
            return Ok(false);
        }
        Ok(true)
    })?;
    Ok(found)
}

fn find_index(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let target = args.first().cloned();
    let block = match &target {
        Some(_) => None,
        None => Some(ctx.expect_block()?),
    };
    let (_, found) = scan(ctx, (0_i64, None::<i64>), move |ctx, (index, found), item| {
        let hit = match (&target, &block) {
            (Some(target), _) => values_equal(ctx, &item, target)?,
            (None, Some(block)) => ctx.call_proc(block, vec![item])?.truthy(),
            (None, None) => false,
        };
        if hit {
            *found = Some(*index);
            return Ok(false);
        }
        *index += 1;
        Ok(true)
    })?;
    Ok(found.map_or(Value::Nil, Value::Integer))
}

fn include(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let target = args[0].clone();
    let found = scan(ctx, false, move |ctx, found, item| {
        *found = values_equal(ctx, &item, &target)?;
        Ok(!*found)
    })?;
    Ok(Value::Bool(found))
}

fn first(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    match args.first() {
        None => {
            let first = scan(ctx, None, |_, first, item| {
                *first = Some(item);
                Ok(false)
            })?;
            Ok(first.unwrap_or_default())
        }
        Some(count) => {
            let count = int_arg(ctx, count)?;
            take_n(ctx, count)
        }
    }
}

fn take(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let count = int_arg(ctx, &args[0])?;
    take_n(ctx, count)
}

fn take_n(ctx: &mut CallContext<'_>, count: i64) -> EvalResult {
    let Ok(count) = usize::try_from(count) else {
        return Err(Exception::argument("attempt to take negative size").into());
    };
    if count == 0 {
        return Ok(Value::array(Vec::new()));
    }
    let taken = scan(ctx, Vec::new(), move |_, taken, item| {
        taken.push(item);
        Ok(taken.len() < count)
    })?;
    Ok(Value::array(taken))
}

// ============================================================================
// Folding
// ============================================================================

/// `inject(initial, :sym)`, `inject(:sym)`, `inject(initial) { }` and
/// `inject { }`; with no initial value the first element seeds the fold.
fn inject(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let (initial, operator) = match (args.len(), ctx.block.is_some()) {
        (2, _) => (Some(args[0].clone()), Some(args[1].clone())),
        (1, false) => (None, Some(args[0].clone())),
        (1, true) => (Some(args[0].clone()), None),
        _ => (None, None),
    };
    let operator = match operator {
        Some(Value::Symbol(name)) => Some(name),
        Some(Value::String(name)) => Some(Rc::from(name.borrow().as_str())),
        Some(other) => {
            let shown = ctx.inspect(&other)?;
            return Err(Exception::type_error(format!("{} is not a symbol nor a string", shown)).into());
        }
        None => None,
    };
    let block = match operator {
        Some(_) => None,
        None => Some(ctx.expect_block()?),
    };
    let folded = scan(ctx, initial, move |ctx, acc, item| {
        let next = match acc.take() {
            None => item,
            Some(current) => match (&operator, &block) {
                (Some(name), _) => ctx.send(&current, name, vec![item])?,
                (None, Some(block)) => ctx.call_proc(block, vec![current, item])?,
                (None, None) => current,
            },
        };
        *acc = Some(next);
        Ok(true)
    })?;
    Ok(folded.unwrap_or_default())
}

fn sum(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let initial = args.first().cloned().unwrap_or(Value::Integer(0));
    let block = ctx.block.clone();
    scan(ctx, initial, move |ctx, total, item| {
        let item = match &block {
            Some(block) => ctx.call_proc(block, vec![item])?,
            None => item,
        };
        let next = match (&*total, &item) {
            (Value::Integer(a), Value::Integer(b)) => {
                Value::Integer(a.checked_add(*b).ok_or_else(Exception::overflow)?)
            }
            _ => ctx.send(total, "+", vec![item])?,
        };
        *total = next;
        Ok(true)
    })
}

/// `count`, `count(item)` or `count { |item| ... }`.
fn count(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let target = args.first().cloned();
    let block = ctx.block.clone();
    let total = scan(ctx, 0_i64, move |ctx, total, item| {
        let counted = match (&target, &block) {
            (Some(target), _) => values_equal(ctx, &item, target)?,
            (None, Some(block)) => ctx.call_proc(block, vec![item])?.truthy(),
            (None, None) => true,
        };
        if counted {
            *total += 1;
        }
        Ok(true)
    })?;
    Ok(Value::Integer(total))
}

fn each_with_index(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let Some(block) = ctx.block.clone() else {
        let pairs = items(ctx)?
            .into_iter()
            .zip(0_i64..)
            .map(|(item, index)| Value::array(vec![item, Value::Integer(index)]))
            .collect();
        return Ok(Value::array(pairs));
    };
    scan(ctx, 0_i64, move |ctx, index, item| {
        ctx.call_proc(&block, vec![item, Value::Integer(*index)])?;
        *index += 1;
        Ok(true)
    })?;
    Ok(ctx.receiver.clone())
}

fn each_with_object(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let block = ctx.expect_block()?;
    let memo = args[0].clone();
    let shared = memo.clone();
    scan(ctx, (), move |ctx, _, item| {
        ctx.call_proc(&block, vec![item, shared.clone()])?;
        Ok(true)
    })?;
    Ok(memo)
}

fn each_slice(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let size = int_arg(ctx, &args[0])?;
    let size = match usize::try_from(size) {
        Ok(size) if size > 0 => size,
        _ => return Err(Exception::argument("invalid slice size").into()),
    };
    let slices: Vec<Value> = items(ctx)?
        .chunks(size)
        .map(|chunk| Value::array(chunk.to_vec()))
        .collect();
    let Some(block) = ctx.block.clone() else {
        return Ok(Value::array(slices));
    };
    for slice in slices {
        ctx.call_proc(&block, vec![slice])?;
    }
    Ok(ctx.receiver.clone())
}

// ============================================================================
// Ordering
// ============================================================================

fn extreme(ctx: &mut CallContext<'_>, wanted: Ordering) -> EvalResult {
    let block = ctx.block.clone();
    let best = scan(ctx, None::<Value>, move |ctx, best, item| {
        let replace = match best.as_ref() {
            None => true,
            Some(current) => {
                let ordering = match &block {
                    Some(block) => {
                        let result = ctx.call_proc(block, vec![item.clone(), current.clone()])?;
                        ordering_of(ctx, &result, &item, current)?
                    }
                    None => compare(ctx, &item, current)?,
                };
                ordering == wanted
            }
        };
        if replace {
            *best = Some(item);
        }
        Ok(true)
    })?;
    Ok(best.unwrap_or_default())
}

fn min(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    extreme(ctx, Ordering::Less)
}

fn max(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    extreme(ctx, Ordering::Greater)
}

fn extreme_by(ctx: &mut CallContext<'_>, wanted: Ordering) -> EvalResult {
    let block = ctx.expect_block()?;
    let best = scan(ctx, None::<(Value, Value)>, move |ctx, best, item| {
        let key = ctx.call_proc(&block, vec![item.clone()])?;
        let replace = match best.as_ref() {
            None => true,
            Some((current, _)) => compare(ctx, &key, current)? == wanted,
        };
        if replace {
            *best = Some((key, item));
        }
        Ok(true)
    })?;
    Ok(best.map(|(_, item)| item).unwrap_or_default())
}

fn min_by(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    extreme_by(ctx, Ordering::Less)
}

fn max_by(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    extreme_by(ctx, Ordering::Greater)
}

fn sort(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let items = items(ctx)?;
    let block = ctx.block.clone();
    Ok(Value::array(sort_values(ctx, items, block)?))
}

/// Sorts by the block's keys; equal keys keep their original order.
fn sort_by(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let block = ctx.expect_block()?;
    let keyed = scan(ctx, Vec::new(), move |ctx, keyed, item| {
        let key = ctx.call_proc(&block, vec![item.clone()])?;
        keyed.push(Value::array(vec![key, item]));
        Ok(true)
    })?;
    let by_key = Proc::native(Arity::Exact(2), |ctx, args| {
        let key_of = |pair: &Value| match pair {
            Value::Array(pair) => pair.borrow().first().cloned().unwrap_or_default(),
            _ => Value::Nil,
        };
        let ordering = compare(ctx, &key_of(&args[0]), &key_of(&args[1]))?;
        Ok(Value::Integer(ordering as i64))
    });
    let sorted = sort_values(ctx, keyed, Some(by_key))?;
    let items = sorted
        .into_iter()
        .map(|pair| match pair {
            Value::Array(pair) => pair.borrow().get(1).cloned().unwrap_or_default(),
            other => other,
        })
        .collect();
    Ok(Value::array(items))
}

// ============================================================================
// Predicates
// ============================================================================

/// Shared test for `any?`, `all?` and `none?`: an optional `===` pattern,
/// else the block, else the element's own truthiness.
fn matcher(
    pattern: Option<Value>,
    block: Option<Rc<Proc>>,
) -> impl Fn(&mut CallContext<'_>, &Value) -> Result<bool, Control> + 'static {
    move |ctx, item| match (&pattern, &block) {
        (Some(pattern), _) => ctx.test(pattern, "===", vec![item.clone()]),
        (None, Some(block)) => Ok(ctx.call_proc(block, vec![item.clone()])?.truthy()),
        (None, None) => Ok(item.truthy()),
    }
}

fn any(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let test = matcher(args.first().cloned(), ctx.block.clone());
    let found = scan(ctx, false, move |ctx, found, item| {
        *found = test(ctx, &item)?;
        Ok(!*found)
    })?;
    Ok(Value::Bool(found))
}

fn all(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let test = matcher(args.first().cloned(), ctx.block.clone());
    let holds = scan(ctx, true, move |ctx, holds, item| {
        *holds = test(ctx, &item)?;
        Ok(*holds)
    })?;
    Ok(Value::Bool(holds))
}

fn none(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let found = any(ctx, args)?;
    Ok(Value::Bool(!found.truthy()))
}

// ============================================================================
// Grouping
// ============================================================================

fn group_by(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let block = ctx.expect_block()?;
    let groups = scan(ctx, RubyHash::new(), move |ctx, groups, item| {
        let key = ctx.call_proc(&block, vec![item.clone()])?;
        match groups.get(&key) {
            Some(Value::Array(group)) => group.borrow_mut().push(item),
            _ => groups.insert(key, Value::array(vec![item])),
        }
        Ok(true)
    })?;
    Ok(Value::hash(groups))
}

fn partition(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let block = ctx.expect_block()?;
    let (kept, rest) = scan(ctx, (Vec::new(), Vec::new()), move |ctx, (kept, rest), item| {
        if ctx.call_proc(&block, vec![item.clone()])?.truthy() {
            kept.push(item);
        } else {
            rest.push(item);
        }
        Ok(true)
    })?;
    Ok(Value::array(vec![Value::array(kept), Value::array(rest)]))
}

fn tally(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let mut counts = RubyHash::new();
    for item in items(ctx)? {
        let seen = counts.get(&item).and_then(Value::as_integer).unwrap_or(0);
        counts.insert(item, Value::Integer(seen + 1));
    }
    Ok(Value::hash(counts))
}

fn uniq(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let block = ctx.block.clone();
    let mut seen = RubyHash::new();
    let mut unique = Vec::new();
    for item in items(ctx)? {
        let key = match &block {
            Some(block) => ctx.call_proc(block, vec![item.clone()])?,
            None => item.clone(),
        };
        if !seen.contains_key(&key) {
            seen.insert(key, Value::Bool(true));
            unique.push(item);
        }
    }
    Ok(Value::array(unique))
}

/// Builds a hash from `[key, value]` pairs, or from the pairs the block
/// returns.
fn to_h(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let block = ctx.block.clone();
    let mut hash = RubyHash::new();
    for item in items(ctx)? {
        let pair = match &block {
            Some(block) => ctx.call_proc(block, vec![item])?,
            None => item,
        };
        let entry = match &pair {
            Value::Array(entry) if entry.borrow().len() == 2 => entry.borrow().clone(),
            other => {
                let class = ctx.class_name(other);
                return Err(Exception::type_error(format!("wrong element type {} (expected array)", class)).into());
            }
        };
        hash.insert(arg(&entry, 0), arg(&entry, 1));
    }
    Ok(Value::hash(hash))
}
