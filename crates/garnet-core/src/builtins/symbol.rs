//! `Symbol`.

use std::rc::Rc;

use crate::builtins::{NONE, ONE, NativeTable, define};
use crate::runtime::class::Registry;
use crate::runtime::context::CallContext;
use crate::runtime::error::{Control, EvalResult, Exception};
use crate::runtime::method::Arity;
use crate::runtime::proc::Proc;
use crate::runtime::value::Value;

/// Installs `Symbol`'s methods.
pub fn register(registry: &mut Registry) {
    let symbol = registry.core().symbol;
    let table: NativeTable<'_> = &[
        ("to_s", NONE, to_s),
        ("id2name", NONE, to_s),
        ("name", NONE, to_s),
        ("to_sym", NONE, to_sym),
        ("to_proc", NONE, to_proc),
        ("inspect", NONE, inspect),
        ("length", NONE, length),
        ("size", NONE, length),
        ("upcase", NONE, upcase),
        ("downcase", NONE, downcase),
        ("<=>", ONE, cmp),
        ("==", ONE, equal),
        ("empty?", NONE, is_empty),
    ];
    define(registry, symbol, table);
}

fn receiver(ctx: &CallContext<'_>) -> Result<Rc<str>, Control> {
    match &ctx.receiver {
        Value::Symbol(name) => Ok(name.clone()),
        other => Err(Exception::internal(format!("expected a Symbol receiver, got {:?}", other)).into()),
    }
}

fn to_s(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(Value::string(&*receiver(ctx)?))
}

fn to_sym(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(ctx.receiver.clone())
}

/// A proc that sends the symbol to its first argument, passing the rest
/// along: `[1, 2].map(&:to_s)`.
fn to_proc(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let name = receiver(ctx)?;
    let proc = Proc::native(Arity::AtLeast(1), move |ctx, args| {
        let mut args = args.into_iter();
        let target = args
            .next()
            .ok_or_else(|| Exception::argument("no receiver given"))?;
        let block = ctx.block.clone();
        ctx.send_with_block(&target, &name, args.collect(), block)
    });
    Ok(Value::Proc(proc.rewrap(true, false)))
}

fn length(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(Value::Integer(receiver(ctx)?.chars().count() as i64))
}

fn is_empty(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(Value::Bool(receiver(ctx)?.is_empty()))
}

fn upcase(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(Value::symbol(&receiver(ctx)?.to_uppercase()))
}

fn downcase(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(Value::symbol(&receiver(ctx)?.to_lowercase()))
}

fn cmp(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let name = receiver(ctx)?;
    Ok(match &args[0] {
        Value::Symbol(other) => Value::Integer(name.cmp(other) as i64),
        _ => Value::Nil,
    })
}

fn equal(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    Ok(Value::Bool(ctx.receiver.identical(&args[0])))
}

fn inspect(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let name = receiver(ctx)?;
    if is_plain_symbol(&name) {
        return Ok(Value::string(format!(":{}", name)));
    }
    Ok(Value::string(format!(":{}", super::string::quote(&name))))
}

const OPERATORS: &[&str] = &[
    "+", "-", "*", "/", "%", "**", "==", "!=", "<", "<=", ">", ">=", "<=>", "===", "!", "[]", "[]=", "<<", ">>",
    "&", "|", "^", "~", "+@", "-@", "=~", "!~",
];

/// True when `:name` reads back without quotes.
fn is_plain_symbol(name: &str) -> bool {
    if OPERATORS.contains(&name) {
        return true;
    }
    let body = name
        .strip_prefix("@@")
        .or_else(|| name.strip_prefix('@'))
        .or_else(|| name.strip_prefix('$'))
        .unwrap_or(name);
    let is_variable = body.len() != name.len();
    let body = if is_variable {
        body
    } else {
        body.strip_suffix(['?', '!', '=']).unwrap_or(body)
    };
    let mut chars = body.chars();
    chars
        .next()
        .is_some_and(|first| first == '_' || unicode_xid::UnicodeXID::is_xid_start(first))
        && chars.all(unicode_xid::UnicodeXID::is_xid_continue)
}

#[cfg(test)]
mod tests {
    use super::is_plain_symbol;
    use crate::builtins::testing::{error, inspect};
    use crate::runtime::error::ExceptionKind;

    #[test]
    fn test_conversions() {
        assert_eq!(inspect("[:abc.to_s, :abc.to_sym, :abc.length, :a.upcase]"), "[\"abc\", :abc, 3, :A]");
        assert_eq!(inspect("[:a == :a, :a == \"a\", :a <=> :b, :a.equal?(:a)]"), "[true, false, -1, true]");
    }

    #[test]
    fn test_to_proc() {
        assert_eq!(inspect("[1, 2].map(&:to_s)"), "[\"1\", \"2\"]");
        assert_eq!(inspect("[[1, 2], [3, 4]].map(&:first)"), "[1, 3]");
        assert_eq!(inspect(":+.to_proc.call(2, 3)"), "5");
        assert_eq!(inspect(":upcase.to_proc.lambda?"), "true");
        let err = error(":upcase.to_proc.call");
        assert_eq!(err.kind, ExceptionKind::ArgumentError);
        assert_eq!(err.message, "no receiver given");
    }

    #[test]
    fn test_inspect_quotes_when_needed() {
        assert!(is_plain_symbol("name"));
        assert!(is_plain_symbol("empty?"));
        assert!(is_plain_symbol("value="));
        assert!(is_plain_symbol("@ivar"));
        assert!(is_plain_symbol("<=>"));
        assert!(!is_plain_symbol("two words"));
        assert!(!is_plain_symbol("9lives"));
        assert_eq!(inspect(":\"with space\""), ":\"with space\"");
    }
}
