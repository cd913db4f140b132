//! `Hash`: insertion-ordered, keyed by `eql?`-style equality.

use std::cell::RefCell;
use std::rc::Rc;

use crate::builtins::{NONE, ONE, NativeTable, arg, define, define_private, inspect_nested, values_equal};
use crate::runtime::class::Registry;
use crate::runtime::context::CallContext;
use crate::runtime::error::{Control, EvalResult, Exception, ExceptionKind};
use crate::runtime::method::Arity;
use crate::runtime::value::{RubyHash, Value};

/// Installs `Hash`'s methods.
pub fn register(registry: &mut Registry) {
    let hash = registry.core().hash;
    let table: NativeTable<'_> = &[
        ("[]", ONE, get),
        ("[]=", Arity::Exact(2), set),
        ("store", Arity::Exact(2), set),
        ("fetch", Arity::Range(1, 2), fetch),
        ("dig", Arity::AtLeast(1), dig),
        ("key?", ONE, has_key),
        ("has_key?", ONE, has_key),
        ("include?", ONE, has_key),
        ("member?", ONE, has_key),
        ("value?", ONE, has_value),
        ("has_value?", ONE, has_value),
        ("key", ONE, key_of),
        ("keys", NONE, keys),
        ("values", NONE, values),
        ("length", NONE, length),
        ("size", NONE, length),
        ("empty?", NONE, is_empty),
        ("each", NONE, each),
        ("each_pair", NONE, each),
        ("each_key", NONE, each_key),
        ("each_value", NONE, each_value),
        ("delete", ONE, delete),
        ("clear", NONE, clear),
        ("merge", Arity::ANY, merge),
        ("merge!", Arity::ANY, merge_in_place),
        ("update", Arity::ANY, merge_in_place),
        ("select", NONE, select),
        ("filter", NONE, select),
        ("reject", NONE, reject),
        ("transform_values", NONE, transform_values),
        ("transform_keys", NONE, transform_keys),
        ("invert", NONE, invert),
        ("default", NONE, default),
        ("default=", ONE, set_default),
        ("to_a", NONE, to_a),
        ("to_h", NONE, to_h),
        ("==", ONE, equal),
        ("inspect", NONE, inspect),
        ("to_s", NONE, inspect),
    ];
    define(registry, hash, table);
    define_private(registry, hash, &[("initialize", Arity::Range(0, 1), initialize)]);
}

fn receiver(ctx: &CallContext<'_>) -> Result<Rc<RefCell<RubyHash>>, Control> {
    match &ctx.receiver {
        Value::Hash(hash) => Ok(hash.clone()),
        other => Err(Exception::internal(format!("expected a Hash receiver, got {:?}", other)).into()),
    }
}

fn pairs(ctx: &CallContext<'_>) -> Result<Vec<(Value, Value)>, Control> {
    Ok(receiver(ctx)?.borrow().pairs())
}

fn hash_arg(ctx: &CallContext<'_>, value: &Value) -> Result<Rc<RefCell<RubyHash>>, Control> {
    match value {
        Value::Hash(hash) => Ok(hash.clone()),
        other => {
            let class = super::type_name(ctx, other);
            Err(Exception::implicit_conversion(&class, "Hash").into())
        }
    }
}

/// `Hash.new(default)` or `Hash.new { |hash, key| ... }`.
fn initialize(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let hash = receiver(ctx)?;
    if let Some(block) = ctx.block.clone() {
        if !args.is_empty() {
            return Err(Exception::argument_count(args.len(), 0).into());
        }
        hash.borrow_mut().default_proc = Some(block);
    } else {
        hash.borrow_mut().default = arg(&args, 0);
    }
    Ok(Value::Nil)
}

// ============================================================================
// Element Access
// ============================================================================

/// The value for `key`, falling back to the default proc or value.
pub(crate) fn lookup(ctx: &mut CallContext<'_>, hash: &Value, key: &Value) -> EvalResult {
    let Value::Hash(table) = hash else {
        return Ok(Value::Nil);
    };
    let (found, default_proc, default) = {
        let table = table.borrow();
        (table.get(key).cloned(), table.default_proc.clone(), table.default.clone())
    };
    if let Some(value) = found {
        return Ok(value);
    }
    match default_proc {
        Some(proc) => ctx.call_proc(&proc, vec![hash.clone(), key.clone()]),
        None => Ok(default),
    }
}

fn get(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let receiver = ctx.receiver.clone();
    lookup(ctx, &receiver, &args[0])
}

fn set(ctx: &mut CallContext<'_>, mut args: Vec<Value>) -> EvalResult {
    let value = args.pop().unwrap_or_default();
    let key = args.pop().unwrap_or_default();
    receiver(ctx)?.borrow_mut().insert(key, value.clone());
    Ok(value)
}

/// `fetch(key)` raises `KeyError` for a missing key unless a default or a
/// block is given.
fn fetch(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let key = &args[0];
    if let Some(value) = receiver(ctx)?.borrow().get(key).cloned() {
        return Ok(value);
    }
    if let Some(block) = ctx.block.clone() {
        return ctx.call_proc(&block, vec![key.clone()]);
    }
    if let Some(default) = args.get(1) {
        return Ok(default.clone());
    }
    let shown = ctx.inspect(key)?;
    Err(Exception::new(ExceptionKind::KeyError, format!("key not found: {}", shown)).into())
}

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

fn has_key(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    Ok(Value::Bool(receiver(ctx)?.borrow().contains_key(&args[0])))
}

fn has_value(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    for (_, value) in pairs(ctx)? {
        if values_equal(ctx, &value, &args[0])? {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

fn key_of(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    for (key, value) in pairs(ctx)? {
        if values_equal(ctx, &value, &args[0])? {
            return Ok(key);
        }
    }
    Ok(Value::Nil)
}

fn keys(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(Value::array(receiver(ctx)?.borrow().keys()))
}

fn values(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(Value::array(receiver(ctx)?.borrow().values()))
}

fn length(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(Value::Integer(receiver(ctx)?.borrow().len() as i64))
}

fn is_empty(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(Value::Bool(receiver(ctx)?.borrow().is_empty()))
}

fn default(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(receiver(ctx)?.borrow().default.clone())
}

fn set_default(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let hash = receiver(ctx)?;
    let mut hash = hash.borrow_mut();
    hash.default = args[0].clone();
    hash.default_proc = None;
    Ok(args[0].clone())
}

// ============================================================================
// Mutation
// ============================================================================

/// Removes `key`, returning its value; a missing key returns nil or the
/// block's result.
fn delete(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let removed = receiver(ctx)?.borrow_mut().remove(&args[0]);
    match (removed, ctx.block.clone()) {
        (Some(value), _) => Ok(value),
        (None, Some(block)) => ctx.call_proc(&block, vec![args[0].clone()]),
        (None, None) => Ok(Value::Nil),
    }
}

fn clear(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let hash = receiver(ctx)?;
    let mut hash = hash.borrow_mut();
    let (default, default_proc) = (hash.default.clone(), hash.default_proc.clone());
    *hash = RubyHash::new();
    hash.default = default;
    hash.default_proc = default_proc;
    drop(hash);
    Ok(ctx.receiver.clone())
}

/// Merges `others` into `target`; the block resolves duplicate keys.
fn merge_into(ctx: &mut CallContext<'_>, target: &mut RubyHash, others: &[Value]) -> Result<(), Control> {
    let block = ctx.block.clone();
    for other in others {
        let entries = hash_arg(ctx, other)?.borrow().pairs();
        for (key, value) in entries {
            let value = match (&block, target.get(&key).cloned()) {
                (Some(block), Some(existing)) => ctx.call_proc(block, vec![key.clone(), existing, value])?,
                _ => value,
            };
            target.insert(key, value);
        }
    }
    Ok(())
}

fn merge(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let mut merged = {
        let hash = receiver(ctx)?;
        let hash = hash.borrow();
        let mut copy = RubyHash::from_pairs(hash.pairs());
        copy.default = hash.default.clone();
        copy.default_proc = hash.default_proc.clone();
        copy
    };
    merge_into(ctx, &mut merged, &args)?;
    Ok(Value::hash(merged))
}

fn merge_in_place(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let hash = receiver(ctx)?;
    // Work on a copy so blocks may read the receiver
    let mut merged = hash.borrow().clone();
    merge_into(ctx, &mut merged, &args)?;
    *hash.borrow_mut() = merged;
    Ok(ctx.receiver.clone())
}

// ============================================================================
// Iteration
// ============================================================================

/// Yields `[key, value]` pairs; blocks with two parameters receive them
/// spread.
fn each(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let Some(block) = ctx.block.clone() else {
        return to_a(ctx, Vec::new());
    };
    for (key, value) in pairs(ctx)? {
        ctx.call_proc(&block, vec![Value::array(vec![key, value])])?;
    }
    Ok(ctx.receiver.clone())
}

fn each_key(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let block = ctx.expect_block()?;
    for (key, _) in pairs(ctx)? {
        ctx.call_proc(&block, vec![key])?;
    }
    Ok(ctx.receiver.clone())
}

fn each_value(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let block = ctx.expect_block()?;
    for (_, value) in pairs(ctx)? {
        ctx.call_proc(&block, vec![value])?;
    }
    Ok(ctx.receiver.clone())
}

fn filter_by(ctx: &mut CallContext<'_>, keep: bool) -> EvalResult {
    let block = ctx.expect_block()?;
    let mut kept = RubyHash::new();
    for (key, value) in pairs(ctx)? {
        if ctx.call_proc(&block, vec![key.clone(), value.clone()])?.truthy() == keep {
            kept.insert(key, value);
        }
    }
    Ok(Value::hash(kept))
}

fn select(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    filter_by(ctx, true)
}

fn reject(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    filter_by(ctx, false)
}

fn transform_values(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let block = ctx.expect_block()?;
    let mut transformed = RubyHash::new();
    for (key, value) in pairs(ctx)? {
        transformed.insert(key, ctx.call_proc(&block, vec![value])?);
    }
    Ok(Value::hash(transformed))
}

fn transform_keys(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let block = ctx.expect_block()?;
    let mut transformed = RubyHash::new();
    for (key, value) in pairs(ctx)? {
        transformed.insert(ctx.call_proc(&block, vec![key])?, value);
    }
    Ok(Value::hash(transformed))
}

fn invert(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let inverted = pairs(ctx)?.into_iter().map(|(key, value)| (value, key));
    Ok(Value::hash(RubyHash::from_pairs(inverted)))
}

// ============================================================================
// Conversion
// ============================================================================

fn to_a(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let rows = pairs(ctx)?
        .into_iter()
        .map(|(key, value)| Value::array(vec![key, value]))
        .collect();
    Ok(Value::array(rows))
}

fn to_h(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(ctx.receiver.clone())
}

fn equal(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let Value::Hash(other) = &args[0] else {
        return Ok(Value::Bool(false));
    };
    if ctx.receiver.identical(&args[0]) {
        return Ok(Value::Bool(true));
    }
    let mine = pairs(ctx)?;
    if mine.len() != other.borrow().len() {
        return Ok(Value::Bool(false));
    }
    for (key, value) in mine {
        let theirs = other.borrow().get(&key).cloned();
        match theirs {
            Some(theirs) if values_equal(ctx, &value, &theirs)? => {}
            _ => return Ok(Value::Bool(false)),
        }
    }
    Ok(Value::Bool(true))
}

/// `{name: 1, "key" => 2}`: symbol keys that read back as labels use the
/// `key:` shorthand.
fn inspect(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let receiver = ctx.receiver.clone();
    let text = inspect_nested(ctx, &receiver, "{...}", |ctx| {
        let entries = pairs(ctx)?;
        if entries.is_empty() {
            return Ok("{}".to_string());
        }
        let mut parts = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let key = match &key {
                Value::Symbol(name) if is_label(name) => format!("{}:", name),
                Value::Symbol(name) => format!("{}:", super::string::quote(name)),
                other => format!("{} =>", ctx.inspect(other)?),
            };
            parts.push(format!("{} {}", key, ctx.inspect(&value)?));
        }
        Ok(format!("{{{}}}", parts.join(", ")))
    })?;
    Ok(Value::string(text))
}

fn is_label(name: &str) -> bool {
    let body = name.strip_suffix(['?', '!']).unwrap_or(name);
    let mut chars = body.chars();
    chars
        .next()
        .is_some_and(|first| first == '_' || unicode_xid::UnicodeXID::is_xid_start(first))
        && chars.all(unicode_xid::UnicodeXID::is_xid_continue)
}

#[cfg(test)]
mod tests {
    use crate::builtins::testing::{error, inspect, output};
    use crate::runtime::error::ExceptionKind;

    #[test]
    fn test_literal_and_access() {
        assert_eq!(inspect("h = {a: 1, \"b\" => 2}\n[h[:a], h[\"b\"], h[:zz], h.length]"), "[1, 2, nil, 2]");
        assert_eq!(inspect("h = {}\nh[:x] = 1\nh[:y] = 2\nh[:x] = 3\nh"), "{x: 3, y: 2}");
    }

    #[test]
    fn test_inspect_style() {
        assert_eq!(inspect("{a: 1, \"k\" => [nil], 2 => :b}"), "{a: 1, \"k\" => [nil], 2 => :b}");
        assert_eq!(inspect("{:\"two words\" => 1, :ok? => 2}"), "{\"two words\": 1, ok?: 2}");
        assert_eq!(inspect("{}"), "{}");
    }

    #[test]
    fn test_defaults() {
        assert_eq!(inspect("h = Hash.new(0)\nh[:a] += 1\nh[:a] += 1\n[h[:a], h[:b], h.keys]"), "[2, 0, [:a]]");
        let source = "h = Hash.new { |hash, key| hash[key] = key.to_s * 2 }\n[h[:ab], h.keys]";
        assert_eq!(inspect(source), "[\"abab\", [:ab]]");
    }

    #[test]
    fn test_fetch() {
        assert_eq!(inspect("h = {a: 1}\n[h.fetch(:a), h.fetch(:b, 0), h.fetch(:c) { |k| k.to_s }]"), "[1, 0, \"c\"]");
        let err = error("{a: 1}.fetch(:x)");
        assert_eq!(err.kind, ExceptionKind::KeyError);
        assert_eq!(err.message, "key not found: :x");
    }

    #[test]
    fn test_iteration() {
        assert_eq!(output("{a: 1, b: 2}.each { |k, v| puts \"#{k}=#{v}\" }"), "a=1\nb=2\n");
        assert_eq!(output("{a: 1}.each { |pair| p pair }"), "[:a, 1]\n");
        assert_eq!(inspect("{a: 1, b: 2}.map { |k, v| v * 10 }"), "[10, 20]");
        assert_eq!(inspect("{a: 1, b: 2}.count { |k, v| v > 1 }"), "1");
    }

    #[test]
    fn test_filters_return_hashes() {
        assert_eq!(inspect("{a: 1, b: 2, c: 3}.select { |k, v| v.odd? }"), "{a: 1, c: 3}");
        assert_eq!(inspect("{a: 1, b: 2}.reject { |k, v| k == :a }"), "{b: 2}");
        assert_eq!(inspect("{a: 1}.transform_values { |v| v + 1 }"), "{a: 2}");
    }

    #[test]
    fn test_merge_and_delete() {
        assert_eq!(inspect("{a: 1, b: 2}.merge({b: 3, c: 4})"), "{a: 1, b: 3, c: 4}");
        assert_eq!(inspect("{a: 1}.merge({a: 2}) { |key, old, new| old + new }"), "{a: 3}");
        assert_eq!(inspect("h = {a: 1, b: 2}\n[h.delete(:a), h.delete(:zz), h]"), "[1, nil, {b: 2}]");
    }

    #[test]
    fn test_queries_and_equality() {
        assert_eq!(inspect("h = {a: 1}\n[h.key?(:a), h.include?(:b), h.value?(1), h.key(1), h.empty?, {}.empty?]"), "[true, false, true, :a, false, true]");
        assert_eq!(inspect("[{a: 1, b: 2} == {b: 2, a: 1}, {a: 1} == {a: 2}, {a: 1}.to_a]"), "[true, false, [[:a, 1]]]");
    }

    #[test]
    fn test_string_keys_are_copied() {
        assert_eq!(inspect("k = \"key\"\nh = {k => 1}\nk << \"!\"\n[h[\"key\"], h.keys]"), "[1, [\"key\"]]");
    }
}
