//! `NilClass`, `TrueClass` and `FalseClass`.

use crate::builtins::{NONE, ONE, NativeTable, define};
use crate::runtime::class::Registry;
use crate::runtime::context::CallContext;
use crate::runtime::error::EvalResult;
use crate::runtime::value::Value;

/// Installs the methods of `nil`, `true` and `false`.
pub fn register(registry: &mut Registry) {
    let core = *registry.core();
    let logic: NativeTable<'_> = &[("&", ONE, and), ("|", ONE, or), ("^", ONE, xor)];

    let nil: NativeTable<'_> = &[
        ("to_s", NONE, nil_to_s),
        ("to_a", NONE, nil_to_a),
        ("to_h", NONE, nil_to_h),
        ("to_i", NONE, nil_to_i),
        ("inspect", NONE, nil_inspect),
    ];
    let boolean: NativeTable<'_> = &[("to_s", NONE, bool_to_s), ("inspect", NONE, bool_to_s)];

    define(registry, core.nil, nil);
    define(registry, core.nil, logic);
    for class in [core.true_class, core.false_class] {
        define(registry, class, boolean);
        define(registry, class, logic);
    }
}

fn nil_to_s(_ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(Value::string(""))
}

fn nil_to_a(_ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(Value::array(Vec::new()))
}

fn nil_to_h(_ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(Value::hash(Default::default()))
}

fn nil_to_i(_ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(Value::Integer(0))
}

fn nil_inspect(_ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(Value::string("nil"))
}

fn bool_to_s(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(Value::string(if ctx.receiver.truthy() { "true" } else { "false" }))
}

// The receiver's truthiness combined with the argument's; the argument is
// always evaluated, unlike `&&` and `||`.

fn and(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    Ok(Value::Bool(ctx.receiver.truthy() && args[0].truthy()))
}

fn or(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    Ok(Value::Bool(ctx.receiver.truthy() || args[0].truthy()))
}

fn xor(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    Ok(Value::Bool(ctx.receiver.truthy() != args[0].truthy()))
}

#[cfg(test)]
mod tests {
    use crate::builtins::testing::{inspect, output};

    #[test]
    fn test_nil_conversions() {
        assert_eq!(inspect("[nil.to_s, nil.to_a, nil.to_i, nil.inspect, nil.to_h]"), "[\"\", [], 0, \"nil\", {}]");
        assert_eq!(output("puts nil\np nil"), "\nnil\n");
    }

    #[test]
    fn test_boolean_operators() {
        assert_eq!(inspect("[true & false, true | false, true ^ true, false ^ true]"), "[false, true, false, true]");
        assert_eq!(inspect("[nil & true, nil | 1, nil ^ nil]"), "[false, true, false]");
    }

    #[test]
    fn test_to_s() {
        assert_eq!(inspect("[true.to_s, false.inspect, \"#{true}\"]"), "[\"true\", \"false\", \"true\"]");
    }
}
