//! `String`: mutable text.
//!
//! Strings are UTF-8; lengths and indices count characters, not bytes.

use std::cell::RefCell;
use std::rc::Rc;

use crate::builtins::{
    ANY, MAX_STRING_LEN, NONE, ONE, NativeTable, define, define_private, int_arg, repeated_len, str_arg,
};
use crate::runtime::class::Registry;
use crate::runtime::context::CallContext;
use crate::runtime::error::{Control, EvalResult, Exception, ExceptionKind};
use crate::runtime::method::Arity;
use crate::runtime::value::Value;

/// Installs `String`'s methods.
pub fn register(registry: &mut Registry) {
    let string = registry.core().string;
    let table: NativeTable<'_> = &[
        ("+", ONE, concat),
        ("*", ONE, repeat),
        ("<<", ONE, append),
        ("concat", ANY, append_all),
        ("==", ONE, equal),
        ("eql?", ONE, equal),
        ("===", ONE, equal),
        ("<=>", ONE, cmp),
        ("length", NONE, length),
        ("size", NONE, length),
        ("bytesize", NONE, bytesize),
        ("empty?", NONE, is_empty),
        ("upcase", NONE, upcase),
        ("downcase", NONE, downcase),
        ("capitalize", NONE, capitalize),
        ("swapcase", NONE, swapcase),
        ("reverse", NONE, reverse),
        ("strip", NONE, strip),
        ("lstrip", NONE, lstrip),
        ("rstrip", NONE, rstrip),
        ("chomp", NONE, chomp),
        ("chars", NONE, chars),
        ("lines", NONE, lines),
        ("bytes", NONE, bytes),
        ("each_char", NONE, each_char),
        ("include?", ONE, includes),
        ("start_with?", Arity::AtLeast(1), starts_with),
        ("end_with?", Arity::AtLeast(1), ends_with),
        ("index", ONE, index),
        ("count", ONE, count),
        ("split", Arity::Range(0, 1), split),
        ("[]", Arity::Range(1, 2), slice),
        ("slice", Arity::Range(1, 2), slice),
        ("[]=", Arity::Range(2, 3), set_slice),
        ("replace", ONE, replace),
        ("center", Arity::Range(1, 2), center),
        ("ljust", Arity::Range(1, 2), ljust),
        ("rjust", Arity::Range(1, 2), rjust),
        ("ord", NONE, ord),
        ("hash", NONE, hash),
        ("to_s", NONE, to_s),
        ("to_str", NONE, to_s),
        ("to_sym", NONE, to_sym),
        ("intern", NONE, to_sym),
        ("to_i", Arity::Range(0, 1), to_i),
        ("inspect", NONE, inspect),
        ("dump", NONE, inspect),
    ];
    define(registry, string, table);
    define_private(registry, string, &[("initialize", Arity::Range(0, 1), initialize)]);
}

fn receiver(ctx: &CallContext<'_>) -> Result<Rc<RefCell<String>>, Control> {
    match &ctx.receiver {
        Value::String(s) => Ok(s.clone()),
        other => Err(Exception::internal(format!("expected a String receiver, got {:?}", other)).into()),
    }
}

fn text(ctx: &CallContext<'_>) -> Result<String, Control> {
    Ok(receiver(ctx)?.borrow().clone())
}

fn initialize(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    if let Some(value) = args.first() {
        let initial = str_arg(ctx, value)?;
        *receiver(ctx)?.borrow_mut() = initial;
    }
    Ok(Value::Nil)
}

// ============================================================================
// Building
// ============================================================================

fn concat(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let mut result = text(ctx)?;
    result.push_str(&str_arg(ctx, &args[0])?);
    Ok(Value::string(result))
}

fn repeat(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let count = int_arg(ctx, &args[0])?;
    if count < 0 {
        return Err(Exception::argument("negative argument").into());
    }
    let s = text(ctx)?;
    if repeated_len(s.len(), count, MAX_STRING_LEN).is_none() {
        return Err(Exception::argument("argument too big").into());
    }
    Ok(Value::string(s.repeat(count as usize)))
}

/// `<<` appends a string, or the character with an integer's codepoint.
fn append(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let suffix = match &args[0] {
        Value::Integer(code) => u32::try_from(*code)
            .ok()
            .and_then(char::from_u32)
            .map(String::from)
            .ok_or_else(|| Exception::new(ExceptionKind::RangeError, format!("{} out of char range", code)))?,
        other => str_arg(ctx, other)?,
    };
    receiver(ctx)?.borrow_mut().push_str(&suffix);
    Ok(ctx.receiver.clone())
}

fn append_all(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    for value in args {
        append(ctx, vec![value])?;
    }
    Ok(ctx.receiver.clone())
}

fn replace(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let replacement = str_arg(ctx, &args[0])?;
    *receiver(ctx)?.borrow_mut() = replacement;
    Ok(ctx.receiver.clone())
}

// ============================================================================
// Comparison
// ============================================================================

fn equal(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let mine = receiver(ctx)?;
    Ok(Value::Bool(match &args[0] {
        Value::String(other) => *mine.borrow() == *other.borrow(),
        _ => false,
    }))
}

fn cmp(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let mine = receiver(ctx)?;
    Ok(match &args[0] {
        Value::String(other) => Value::Integer(mine.borrow().as_str().cmp(other.borrow().as_str()) as i64),
        _ => Value::Nil,
    })
}

/// A hash consistent with `eql?`, for user classes that key hashes by
/// string content.
fn hash(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    use std::hash::{Hash, Hasher};
    let mut hasher = rustc_hash::FxHasher::default();
    text(ctx)?.hash(&mut hasher);
    Ok(Value::Integer(hasher.finish() as i64))
}

// ============================================================================
// Queries
// ============================================================================

fn length(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(Value::Integer(receiver(ctx)?.borrow().chars().count() as i64))
}

fn bytesize(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(Value::Integer(receiver(ctx)?.borrow().len() as i64))
}

fn is_empty(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(Value::Bool(receiver(ctx)?.borrow().is_empty()))
}

fn includes(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let needle = str_arg(ctx, &args[0])?;
    Ok(Value::Bool(receiver(ctx)?.borrow().contains(needle.as_str())))
}

fn starts_with(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let haystack = text(ctx)?;
    for value in &args {
        if haystack.starts_with(str_arg(ctx, value)?.as_str()) {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

fn ends_with(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let haystack = text(ctx)?;
    for value in &args {
        if haystack.ends_with(str_arg(ctx, value)?.as_str()) {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

/// Character index of the first occurrence, or nil.
fn index(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let needle = str_arg(ctx, &args[0])?;
    let haystack = text(ctx)?;
    Ok(haystack
        .find(needle.as_str())
        .map(|byte| Value::Integer(haystack[..byte].chars().count() as i64))
        .unwrap_or_default())
}

/// Occurrences of any character in the argument.
fn count(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let set = str_arg(ctx, &args[0])?;
    let found = text(ctx)?.chars().filter(|c| set.contains(*c)).count();
    Ok(Value::Integer(found as i64))
}

fn ord(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    match text(ctx)?.chars().next() {
        Some(c) => Ok(Value::Integer(c as i64)),
        None => Err(Exception::argument("empty string").into()),
    }
}

// ============================================================================
// Transformations
// ============================================================================

fn transform(ctx: &CallContext<'_>, f: impl FnOnce(&str) -> String) -> EvalResult {
    let s = receiver(ctx)?;
    let result = f(&s.borrow());
    Ok(Value::string(result))
}

fn upcase(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    transform(ctx, str::to_uppercase)
}

fn downcase(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    transform(ctx, str::to_lowercase)
}

fn capitalize(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    transform(ctx, |s| {
        let mut chars = s.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect(),
            None => String::new(),
        }
    })
}

fn swapcase(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    transform(ctx, |s| {
        s.chars()
            .flat_map(|c| {
                if c.is_uppercase() {
                    c.to_lowercase().collect::<Vec<_>>()
                } else {
                    c.to_uppercase().collect()
                }
            })
            .collect()
    })
}

fn reverse(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    transform(ctx, |s| s.chars().rev().collect())
}

// Ruby strips ASCII whitespace and NUL
fn is_strippable(c: char) -> bool {
    c.is_ascii_whitespace() || c == '\0' || c == '\u{0b}'
}

fn strip(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    transform(ctx, |s| s.trim_matches(is_strippable).to_string())
}

fn lstrip(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    transform(ctx, |s| s.trim_start_matches(is_strippable).to_string())
}

fn rstrip(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    transform(ctx, |s| s.trim_end_matches(is_strippable).to_string())
}

fn chomp(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    transform(ctx, |s| {
        s.strip_suffix("\r\n")
            .or_else(|| s.strip_suffix('\n'))
            .or_else(|| s.strip_suffix('\r'))
            .unwrap_or(s)
            .to_string()
    })
}

fn pad(ctx: &mut CallContext<'_>, args: &[Value], left_share: fn(usize) -> usize) -> EvalResult {
    let width = int_arg(ctx, &args[0])?.max(0) as usize;
    if width > MAX_STRING_LEN {
        return Err(Exception::argument("argument too big").into());
    }
    let filler = match args.get(1) {
        Some(value) => str_arg(ctx, value)?,
        None => " ".to_string(),
    };
    if filler.is_empty() {
        return Err(Exception::argument("zero width padding").into());
    }
    let s = text(ctx)?;
    let len = s.chars().count();
    if width <= len {
        return Ok(Value::string(s));
    }
    let total = width - len;
    let left = left_share(total);
    let fill = |n: usize| filler.chars().cycle().take(n).collect::<String>();
    Ok(Value::string(format!("{}{}{}", fill(left), s, fill(total - left))))
}

fn center(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    pad(ctx, &args, |total| total / 2)
}

fn ljust(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    pad(ctx, &args, |_| 0)
}

fn rjust(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    pad(ctx, &args, |total| total)
}

// ============================================================================
// Splitting and Iteration
// ============================================================================

fn strings(parts: impl Iterator<Item = String>) -> Value {
    Value::array(parts.map(Value::string).collect())
}

/// Without an argument, splits on runs of whitespace; with a separator,
/// splits on it and drops trailing empty fields. An empty separator splits
/// into characters.
fn split(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let s = text(ctx)?;
    let separator = match args.first() {
        None | Some(Value::Nil) => None,
        Some(value) => Some(str_arg(ctx, value)?),
    };
    let mut parts: Vec<String> = match separator.as_deref() {
        None | Some(" ") => s.split_ascii_whitespace().map(str::to_string).collect(),
        Some("") => s.chars().map(String::from).collect(),
        Some(separator) => s.split(separator).map(str::to_string).collect(),
    };
    while parts.last().is_some_and(String::is_empty) {
        parts.pop();
    }
    Ok(strings(parts.into_iter()))
}

fn chars(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(strings(text(ctx)?.chars().map(String::from)))
}

fn lines(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(strings(text(ctx)?.split_inclusive('\n').map(str::to_string)))
}

fn bytes(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let bytes = text(ctx)?.bytes().map(|b| Value::Integer(b as i64)).collect();
    Ok(Value::array(bytes))
}

fn each_char(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    let Some(block) = ctx.block.clone() else {
        return chars(ctx, Vec::new());
    };
    for c in text(ctx)?.chars() {
        ctx.call_proc(&block, vec![Value::string(c.to_string())])?;
    }
    Ok(ctx.receiver.clone())
}

// ============================================================================
// Indexing
// ============================================================================

/// Resolves a possibly negative character index against `len`.
fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let resolved = if index < 0 { index + len as i64 } else { index };
    (0..=len as i64).contains(&resolved).then_some(resolved as usize)
}

/// `s[i]`, `s[start, length]` or `s["sub"]`.
fn slice(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let s = text(ctx)?;
    if let Value::String(needle) = &args[0] {
        let needle = needle.borrow();
        return Ok(if s.contains(needle.as_str()) {
            Value::string(needle.clone())
        } else {
            Value::Nil
        });
    }
    let chars: Vec<char> = s.chars().collect();
    let start = int_arg(ctx, &args[0])?;
    match args.get(1) {
        None => {
            let Some(at) = resolve_index(start, chars.len()).filter(|&at| at < chars.len()) else {
                return Ok(Value::Nil);
            };
            Ok(Value::string(chars[at].to_string()))
        }
        Some(length) => {
            let length = int_arg(ctx, length)?;
            let Some(at) = resolve_index(start, chars.len()) else {
                return Ok(Value::Nil);
            };
            if length < 0 {
                return Ok(Value::Nil);
            }
            let end = (at + length as usize).min(chars.len());
            Ok(Value::string(chars[at..end].iter().collect::<String>()))
        }
    }
}

/// `s[i] = str` or `s[start, length] = str`.
fn set_slice(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let value = args[args.len() - 1].clone();
    let replacement = str_arg(ctx, &value)?;
    let target = receiver(ctx)?;
    let mut chars: Vec<char> = target.borrow().chars().collect();
    let start = int_arg(ctx, &args[0])?;
    let length = match args.len() {
        3 => int_arg(ctx, &args[1])?,
        _ => 1,
    };
    let at = resolve_index(start, chars.len())
        .filter(|&at| args.len() == 3 || at < chars.len())
        .ok_or_else(|| Exception::new(ExceptionKind::IndexError, format!("index {} out of string", start)))?;
    if length < 0 {
        return Err(Exception::new(ExceptionKind::IndexError, format!("negative length {}", length)).into());
    }
    let end = (at + length as usize).min(chars.len());
    chars.splice(at..end, replacement.chars());
    *target.borrow_mut() = chars.into_iter().collect();
    Ok(value)
}

// ============================================================================
// Conversion
// ============================================================================

fn to_s(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(ctx.receiver.clone())
}

fn to_sym(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(Value::symbol(&text(ctx)?))
}

/// Leading integer in `base`, ignoring whitespace and underscores between
/// digits; 0 if there is none.
fn to_i(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
    let base = match args.first() {
        Some(value) => int_arg(ctx, value)?,
        None => 10,
    };
    if !(2..=36).contains(&base) {
        return Err(Exception::argument(format!("invalid radix {}", base)).into());
    }
    Ok(Value::Integer(parse_leading_integer(&text(ctx)?, base as u32)))
}

pub(crate) fn parse_leading_integer(s: &str, base: u32) -> i64 {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let mut value: i64 = 0;
    let mut previous_underscore = true;
    for c in digits.chars() {
        if c == '_' && !previous_underscore {
            previous_underscore = true;
            continue;
        }
        let Some(digit) = c.to_digit(base) else {
            break;
        };
        previous_underscore = false;
        value = value.saturating_mul(base as i64).saturating_add(digit as i64);
    }
    if negative { -value } else { value }
}

fn inspect(ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
    Ok(Value::string(quote(&text(ctx)?)))
}

/// The double-quoted literal that reads back as `s`.
pub(crate) fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\u{1b}' => out.push_str("\\e"),
            '\0' => out.push_str("\\0"),
            '#' if matches!(chars.peek(), Some('{' | '$' | '@')) => out.push_str("\\#"),
            c if c.is_control() => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::{parse_leading_integer, quote};
    use crate::builtins::testing::{error, inspect};
    use crate::runtime::error::ExceptionKind;

    #[test]
    fn test_concat_and_repeat() {
        assert_eq!(inspect("\"ab\" + \"cd\""), "\"abcd\"");
        assert_eq!(inspect("\"ab\" * 3"), "\"ababab\"");
        assert_eq!(error("\"a\" + 1").message, "no implicit conversion of Integer into String");
        assert_eq!(error("\"a\" * -1").message, "negative argument");
        let err = error("\"ab\" * 4611686018427387904");
        assert_eq!(err.kind, ExceptionKind::ArgumentError);
        assert_eq!(err.message, "argument too big");
        assert_eq!(error("\"ab\".ljust(4611686018427387904)").message, "argument too big");
    }

    #[test]
    fn test_append_mutates() {
        assert_eq!(inspect("s = \"a\"\nt = s\ns << \"b\" << 99\nt"), "\"abc\"");
        assert_eq!(inspect("s = \"x\"\ns.concat(\"y\", \"z\")"), "\"xyz\"");
    }

    #[test]
    fn test_case_and_whitespace() {
        assert_eq!(
            inspect("[\"Hello\".upcase, \"Hello\".downcase, \"hELLO wORLD\".capitalize, \"aBc\".swapcase, \"  pad \\n\".strip]"),
            "[\"HELLO\", \"hello\", \"Hello world\", \"AbC\", \"pad\"]"
        );
        assert_eq!(inspect("\"line\\n\".chomp"), "\"line\"");
    }

    #[test]
    fn test_queries() {
        assert_eq!(
            inspect("s = \"héllo\"\n[s.length, s.bytesize, s.include?(\"ll\"), s.start_with?(\"x\", \"h\"), s.end_with?(\"lo\"), \"\".empty?, s.index(\"l\")]"),
            "[5, 6, true, true, true, true, 2]"
        );
    }

    #[test]
    fn test_split() {
        assert_eq!(inspect("\" a  b c \".split"), "[\"a\", \"b\", \"c\"]");
        assert_eq!(inspect("\"a,b,,c,,\".split(\",\")"), "[\"a\", \"b\", \"\", \"c\"]");
        assert_eq!(inspect("\"abc\".split(\"\")"), "[\"a\", \"b\", \"c\"]");
        assert_eq!(inspect("\"ab\".chars"), "[\"a\", \"b\"]");
    }

    #[test]
    fn test_indexing() {
        assert_eq!(inspect("s = \"hello\"\n[s[0], s[-1], s[1, 3], s[10], s[\"ell\"], s[\"z\"]]"), "[\"h\", \"o\", \"ell\", nil, \"ell\", nil]");
        assert_eq!(inspect("s = \"hello\"\ns[0] = \"J\"\ns[1, 4] = \"ava\"\ns"), "\"Java\"");
        assert_eq!(error("s = \"ab\"\ns[5] = \"x\"").kind, ExceptionKind::IndexError);
    }

    #[test]
    fn test_comparison() {
        assert_eq!(inspect("[\"a\" == \"a\", \"a\" == :a, \"a\" <=> \"b\", \"b\" > \"a\", \"a\" <=> 1]"), "[true, false, -1, true, nil]");
    }

    #[test]
    fn test_conversions() {
        assert_eq!(inspect("[\"42abc\".to_i, \" -1_000\".to_i, \"x\".to_i, \"ff\".to_i(16), \"name\".to_sym]"), "[42, -1000, 0, 255, :name]");
        assert_eq!(parse_leading_integer("12_3", 10), 123);
        assert_eq!(parse_leading_integer("_1", 10), 0);
    }

    #[test]
    fn test_inspect_escapes() {
        assert_eq!(quote("say \"hi\"\n"), "\"say \\\"hi\\\"\\n\"");
        assert_eq!(quote("#{x} #y"), "\"\\#{x} #y\"");
        assert_eq!(quote("\u{1}"), "\"\\u0001\"");
        assert_eq!(inspect("\"a\\\\b\".inspect"), "\"\\\"a\\\\\\\\b\\\"\"");
    }

    #[test]
    fn test_string_new_and_padding() {
        assert_eq!(inspect("[String.new, String.new(\"x\")]"), "[\"\", \"x\"]");
        assert_eq!(inspect("[\"ab\".center(6, \"*\"), \"ab\".ljust(4), \"ab\".rjust(4, \"0\")]"), "[\"**ab**\", \"ab  \", \"00ab\"]");
    }
}
