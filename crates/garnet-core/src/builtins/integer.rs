//! `Integer`: 64-bit arithmetic with overflow checks.
//!
//! Division and modulo round toward negative infinity, as in Ruby. Results
//! that do not fit in 64 bits raise `RangeError` instead of wrapping.

use crate::builtins::{NONE, ONE, NativeTable, comparison_failed, define, int_arg, type_name};
use crate::runtime::class::Registry;
use crate::runtime::context::CallContext;
use crate::runtime::error::{Control, EvalResult, Exception, ExceptionKind};
use crate::runtime::method::Arity;
use crate::runtime::value::Value;

/// Installs `Integer`'s methods.
pub fn register(registry: &mut Registry) {
    let integer = registry.core().integer;
    let table: NativeTable<'_> = &[
        ("+", ONE, add),
        ("-", ONE, sub),
        ("*", ONE, mul),
        ("/", ONE, div),
        ("div", ONE, div),
        ("%", ONE, modulo),
        ("modulo", ONE, modulo),
        ("**", ONE, pow),
        ("pow", ONE, pow),
        ("divmod", ONE, divmod),
        ("-@", NONE, negate),
        ("+@", NONE, itself),
        ("==", ONE, equal),
        ("eql?", ONE, equal),
        ("<=>", ONE, cmp),
        ("<", ONE, lt),
        ("<=", ONE, le),
        (">", ONE, gt),
        (">=", ONE, ge),
        ("&", ONE, bit_and),
        ("|", ONE, bit_or),
        ("^", ONE, bit_xor),
        ("~", NONE, bit_not),
        ("<<", ONE, shl),
        (">>", ONE, shr),
        ("times", NONE, times),
        ("upto", ONE, upto),
        ("downto", ONE, downto),
        ("succ", NONE, succ),
        ("next", NONE, succ),
        ("pred", NONE, pred),
        ("abs", NONE, abs),
        ("zero?", NONE, is_zero),
        ("positive?", NONE, is_positive),
        ("negative?", NONE, is_negative),
        ("even?", NONE, is_even),
        ("odd?", NONE, is_odd),
        ("gcd", ONE, gcd),
        ("to_s", Arity::Range(0, 1), to_s),
        ("inspect", NONE, inspect),
        ("to_i", NONE, itself),
        ("to_int", NONE, itself),
        ("hash", NONE, itself),
    ];
    define(registry, integer, table);
}

fn receiver(ctx: &CallContext<'_>) -> Result<i64, Control> {
    match ctx.receiver {
        Value::Integer(n) => Ok(n),
        ref other => Err(Exception::internal(format!("expected an Integer receiver, got {:?}", other)).into()),
    }
}

/// The right-hand operand of an arithmetic operator.
fn operand(ctx: &CallContext<'_>, args: &[Value]) -> Result<i64, Control> {
    match &args[0] {
        Value::Integer(n) => Ok(*n),
        other => Err(Exception::coercion(&type_name(ctx, other), "Integer").into()),
    }
}

fn checked(result: Option<i64>) -> EvalResult {
    result.map(Value::Integer).ok_or_else(|| Exception::overflow().into())
}

// ============================================================================
// Arithmetic
// ============================================================================

fn add(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let (a, b) = (receiver(ctx)?, operand(ctx, &args)?);
    checked(a.checked_add(b))
}

fn sub(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let (a, b) = (receiver(ctx)?, operand(ctx, &args)?);
    checked(a.checked_sub(b))
}

fn mul(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let (a, b) = (receiver(ctx)?, operand(ctx, &args)?);
    checked(a.checked_mul(b))
}

/// Quotient rounded toward negative infinity.
fn floor_div(a: i64, b: i64) -> Result<i64, Control> {
    if b == 0 {
        return Err(Exception::zero_division().into());
    }
    let quotient = a.checked_div(b).ok_or_else(Exception::overflow)?;
    if a % b != 0 && (a < 0) != (b < 0) {
        return Ok(quotient - 1);
    }
    Ok(quotient)
}

/// Remainder with the sign of the divisor.
fn floor_mod(a: i64, b: i64) -> Result<i64, Control> {
    if b == 0 {
        return Err(Exception::zero_division().into());
    }
    let remainder = a.checked_rem(b).unwrap_or(0);
    if remainder != 0 && (remainder < 0) != (b < 0) {
        return Ok(remainder + b);
    }
    Ok(remainder)
}

fn div(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let (a, b) = (receiver(ctx)?, operand(ctx, &args)?);
    Ok(Value::Integer(floor_div(a, b)?))
}

fn modulo(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let (a, b) = (receiver(ctx)?, operand(ctx, &args)?);
    Ok(Value::Integer(floor_mod(a, b)?))
}

fn divmod(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let (a, b) = (receiver(ctx)?, operand(ctx, &args)?);
    let quotient = floor_div(a, b)?;
    let remainder = floor_mod(a, b)?;
    Ok(Value::array(vec![Value::Integer(quotient), Value::Integer(remainder)]))
}

/// Integer powers only; a negative exponent would need rationals.
fn pow(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let (base, exponent) = (receiver(ctx)?, operand(ctx, &args)?);
    if exponent < 0 {
        return Err(Exception::new(
            ExceptionKind::RangeError,
            "negative exponent is not supported for Integer",
        )
        .into());
    }
    match base {
        0 | 1 => return Ok(Value::Integer(if exponent == 0 { 1 } else { base })),
        -1 => return Ok(Value::Integer(if exponent % 2 == 0 { 1 } else { -1 })),
        _ => {}
    }
    let exponent = u32::try_from(exponent).map_err(|_| Exception::overflow())?;
    checked(base.checked_pow(exponent))
}

fn negate(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    checked(receiver(ctx)?.checked_neg())
}

fn itself(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(Value::Integer(receiver(ctx)?))
}

fn abs(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    checked(receiver(ctx)?.checked_abs())
}

fn succ(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    checked(receiver(ctx)?.checked_add(1))
}

fn pred(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    checked(receiver(ctx)?.checked_sub(1))
}

fn gcd(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let a = receiver(ctx)?;
    let b = int_arg(ctx, &args[0])?;
    let (mut a, mut b) = (a.unsigned_abs(), b.unsigned_abs());
    while b != 0 {
        (a, b) = (b, a % b);
    }
    checked(i64::try_from(a).ok())
}

// ============================================================================
// Comparison
// ============================================================================

fn equal(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let a = receiver(ctx)?;
    Ok(Value::Bool(matches!(args[0], Value::Integer(b) if a == b)))
}

fn cmp(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let a = receiver(ctx)?;
    Ok(match args[0] {
        Value::Integer(b) => Value::Integer(a.cmp(&b) as i64),
        _ => Value::Nil,
    })
}

fn compare_with(ctx: &mut CallContext<'_>, args: &[Value], test: fn(i64, i64) -> bool) -> EvalResult {
    let a = receiver(ctx)?;
    match args[0] {
        Value::Integer(b) => Ok(Value::Bool(test(a, b))),
        ref other => {
            let receiver = ctx.receiver.clone();
            Err(comparison_failed(ctx, &receiver, other))
        }
    }
}

fn lt(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    compare_with(ctx, &args, |a, b| a < b)
}

fn le(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    compare_with(ctx, &args, |a, b| a <= b)
}

fn gt(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    compare_with(ctx, &args, |a, b| a > b)
}

fn ge(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    compare_with(ctx, &args, |a, b| a >= b)
}

fn is_zero(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(Value::Bool(receiver(ctx)? == 0))
}

fn is_positive(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(Value::Bool(receiver(ctx)? > 0))
}

fn is_negative(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(Value::Bool(receiver(ctx)? < 0))
}

fn is_even(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(Value::Bool(receiver(ctx)? % 2 == 0))
}

fn is_odd(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(Value::Bool(receiver(ctx)? % 2 != 0))
}

// ============================================================================
// Bitwise
// ============================================================================

fn bit_and(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let (a, b) = (receiver(ctx)?, operand(ctx, &args)?);
    Ok(Value::Integer(a & b))
}

fn bit_or(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let (a, b) = (receiver(ctx)?, operand(ctx, &args)?);
    Ok(Value::Integer(a | b))
}

fn bit_xor(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let (a, b) = (receiver(ctx)?, operand(ctx, &args)?);
    Ok(Value::Integer(a ^ b))
}

fn bit_not(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(Value::Integer(!receiver(ctx)?))
}

fn shift_left(value: i64, bits: i64) -> EvalResult {
    if bits < 0 {
        return shift_right(value, bits.checked_neg().unwrap_or(i64::MAX));
    }
    if value == 0 {
        return Ok(Value::Integer(0));
    }
    if bits >= 64 {
        return Err(Exception::overflow().into());
    }
    let shifted = value << bits;
    if shifted >> bits != value {
        return Err(Exception::overflow().into());
    }
    Ok(Value::Integer(shifted))
}

fn shift_right(value: i64, bits: i64) -> EvalResult {
    if bits < 0 {
        return shift_left(value, bits.checked_neg().unwrap_or(i64::MAX));
    }
    Ok(Value::Integer(value >> bits.min(63)))
}

fn shl(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let (a, b) = (receiver(ctx)?, operand(ctx, &args)?);
    shift_left(a, b)
}

fn shr(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let (a, b) = (receiver(ctx)?, operand(ctx, &args)?);
    shift_right(a, b)
}

// ============================================================================
// Iteration
// ============================================================================

/// Yields `0...n`. Without a block, returns those values as an array.
fn times(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let n = receiver(ctx)?.max(0);
    iterate(ctx, 0..n)
}

fn upto(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let from = receiver(ctx)?;
    let to = int_arg(ctx, &args[0])?;
    iterate(ctx, from..=to)
}

fn downto(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let from = receiver(ctx)?;
    let to = int_arg(ctx, &args[0])?;
    iterate(ctx, (to..=from).rev())
}

// Yields each value and returns the receiver; without a block, collects
// the values instead
fn iterate(ctx: &mut CallContext<'_>, values: impl Iterator<Item = i64>) -> EvalResult {
    let Some(block) = ctx.block.clone() else {
        return Ok(Value::array(values.map(Value::Integer).collect()));
    };
    for value in values {
        ctx.call_proc(&block, vec![Value::Integer(value)])?;
    }
    Ok(ctx.receiver.clone())
}

// ============================================================================
// Conversion
// ============================================================================

/// Digits of `value` in `radix`, with a leading minus sign if negative.
fn format_radix(value: i64, radix: u32) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut magnitude = value.unsigned_abs();
    let mut digits = Vec::new();
    while magnitude > 0 {
        let digit = (magnitude % radix as u64) as u32;
        digits.push(std::char::from_digit(digit, radix).unwrap_or('?'));
        magnitude /= radix as u64;
    }
    if value < 0 {
        digits.push('-');
    }
    digits.iter().rev().collect()
}

fn to_s(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let n = receiver(ctx)?;
    let radix = match args.first() {
        Some(value) => int_arg(ctx, value)?,
        None => 10,
    };
    if !(2..=36).contains(&radix) {
        return Err(Exception::argument(format!("invalid radix {}", radix)).into());
    }
    Ok(Value::string(format_radix(n, radix as u32)))
}

fn inspect(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(Value::string(receiver(ctx)?.to_string()))
}

#[cfg(test)]
mod tests {
    use super::format_radix;
    use crate::builtins::testing::{error, inspect, output};
    use crate::runtime::error::ExceptionKind;

    #[test]
    fn test_arithmetic() {
        assert_eq!(inspect("[1 + 2, 7 - 10, 6 * 7, 2 ** 10, (-5).abs, -(3)]"), "[3, -3, 42, 1024, 5, -3]");
    }

    #[test]
    fn test_floored_division() {
        assert_eq!(inspect("[7 / 2, -7 / 2, 7 / -2, -7 % 3, 7 % -3, 7.divmod(-2)]"), "[3, -4, -4, 2, -2, [-4, -1]]");
    }

    #[test]
    fn test_zero_division() {
        let err = error("1 / 0");
        assert_eq!(err.kind, ExceptionKind::ZeroDivisionError);
        assert_eq!(err.message, "divided by 0");
        assert_eq!(error("5 % 0").kind, ExceptionKind::ZeroDivisionError);
    }

    #[test]
    fn test_overflow_raises() {
        let err = error("9223372036854775807 + 1");
        assert_eq!(err.kind, ExceptionKind::RangeError);
        assert_eq!(err.message, "integer overflow");
        assert_eq!(error("2 ** 64").kind, ExceptionKind::RangeError);
        assert_eq!(error("1 << 70").kind, ExceptionKind::RangeError);
    }

    #[test]
    fn test_coercion_errors() {
        let err = error("1 + \"2\"");
        assert_eq!(err.kind, ExceptionKind::TypeError);
        assert_eq!(err.message, "String can't be coerced into Integer");
        assert_eq!(error("1 * nil").message, "nil can't be coerced into Integer");
        assert_eq!(error("1 < :a").message, "comparison of Integer with Symbol failed");
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(inspect("[1 < 2, 2 <= 2, 3 > 4, 1 <=> 2, 2 <=> 2, 1 <=> \"a\", 1 == 1, 1 == \"1\"]"), "[true, true, false, -1, 0, nil, true, false]");
        assert_eq!(inspect("[5.between?(1, 10), 15.clamp(1, 10)]"), "[true, 10]");
    }

    #[test]
    fn test_bitwise() {
        assert_eq!(inspect("[6 & 3, 6 | 3, 6 ^ 3, 1 << 4, -16 >> 2, 8 >> -1]"), "[2, 7, 5, 16, -4, 16]");
    }

    #[test]
    fn test_iterators() {
        assert_eq!(output("3.times { |i| print i }\n1.upto(3) { |i| print i }\n3.downto(1) { |i| print i }"), "012123321");
        assert_eq!(inspect("3.times.to_a"), "[0, 1, 2]");
        assert_eq!(inspect("4.times { |i| break i * 100 if i == 2 }"), "200");
        assert_eq!(inspect("5.times { }"), "5");
    }

    #[test]
    fn test_predicates() {
        assert_eq!(inspect("[0.zero?, 4.even?, 4.odd?, (-1).negative?, 3.succ, 3.pred, 12.gcd(18)]"), "[true, true, false, true, 4, 2, 6]");
    }

    #[test]
    fn test_to_s_radix() {
        assert_eq!(format_radix(255, 16), "ff");
        assert_eq!(format_radix(-5, 2), "-101");
        assert_eq!(inspect("[255.to_s(2), 42.to_s, 42.inspect]"), "[\"11111111\", \"42\", \"42\"]");
        assert_eq!(error("1.to_s(99)").message, "invalid radix 99");
    }
}
