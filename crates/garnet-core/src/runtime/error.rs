//! Ruby exceptions and non-local control flow.
//!
//! Every fallible evaluation step returns an [`EvalResult`]. Its error side,
//! [`Control`], carries both raised exceptions and the unwinding signals used
//! by `return`, `break`, `next` and `retry`.

use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use super::value::{Instance, Value};

/// The result of evaluating anything.
pub type EvalResult = Result<Value, Control>;

/// Built-in exception classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionKind {
    /// `Exception`
    Exception,
    /// `StandardError`
    StandardError,
    /// `SystemStackError`, raised on runaway recursion
    SystemStackError,
    /// `ArgumentError`
    ArgumentError,
    /// `NameError`
    NameError,
    /// `NoMethodError`
    NoMethodError,
    /// `PrivateNoMethodError`
    PrivateNoMethodError,
    /// `TypeError`
    TypeError,
    /// `ZeroDivisionError`
    ZeroDivisionError,
    /// `LoadError`
    LoadError,
    /// `LocalJumpError`
    LocalJumpError,
    /// `RuntimeError`
    RuntimeError,
    /// `IndexError`
    IndexError,
    /// `KeyError`
    KeyError,
    /// `RangeError`
    RangeError,
    /// `SyntaxError`, raised when a required file fails to parse
    SyntaxError,
}

impl ExceptionKind {
    /// Every kind, parents before children.
    pub const ALL: [ExceptionKind; 16] = [
        ExceptionKind::Exception,
        ExceptionKind::StandardError,
        ExceptionKind::SystemStackError,
        ExceptionKind::ArgumentError,
        ExceptionKind::NameError,
        ExceptionKind::NoMethodError,
        ExceptionKind::PrivateNoMethodError,
        ExceptionKind::TypeError,
        ExceptionKind::ZeroDivisionError,
        ExceptionKind::LoadError,
        ExceptionKind::LocalJumpError,
        ExceptionKind::RuntimeError,
        ExceptionKind::IndexError,
        ExceptionKind::KeyError,
        ExceptionKind::RangeError,
        ExceptionKind::SyntaxError,
    ];

    /// The Ruby class name.
    pub fn name(self) -> &'static str {
        match self {
            ExceptionKind::Exception => "Exception",
            ExceptionKind::StandardError => "StandardError",
            ExceptionKind::SystemStackError => "SystemStackError",
            ExceptionKind::ArgumentError => "ArgumentError",
            ExceptionKind::NameError => "NameError",
            ExceptionKind::NoMethodError => "NoMethodError",
            ExceptionKind::PrivateNoMethodError => "PrivateNoMethodError",
            ExceptionKind::TypeError => "TypeError",
            ExceptionKind::ZeroDivisionError => "ZeroDivisionError",
            ExceptionKind::LoadError => "LoadError",
            ExceptionKind::LocalJumpError => "LocalJumpError",
            ExceptionKind::RuntimeError => "RuntimeError",
            ExceptionKind::IndexError => "IndexError",
            ExceptionKind::KeyError => "KeyError",
            ExceptionKind::RangeError => "RangeError",
            ExceptionKind::SyntaxError => "SyntaxError",
        }
    }

    /// The direct parent kind; `None` only for `Exception`.
    pub fn parent(self) -> Option<ExceptionKind> {
        match self {
            ExceptionKind::Exception => None,
            ExceptionKind::StandardError | ExceptionKind::SystemStackError | ExceptionKind::SyntaxError => {
                Some(ExceptionKind::Exception)
            }
            ExceptionKind::NoMethodError | ExceptionKind::PrivateNoMethodError => {
                Some(ExceptionKind::NameError)
            }
            ExceptionKind::KeyError => Some(ExceptionKind::IndexError),
            _ => Some(ExceptionKind::StandardError),
        }
    }

    /// True when `self` is `ancestor` or descends from it.
    pub fn is_a(self, ancestor: ExceptionKind) -> bool {
        let mut current = Some(self);
        while let Some(kind) = current {
            if kind == ancestor {
                return true;
            }
            current = kind.parent();
        }
        false
    }

    /// Position in [`ExceptionKind::ALL`].
    pub fn index(self) -> usize {
        Self::ALL.iter().position(|k| *k == self).unwrap_or(0)
    }
}

impl fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A raised Ruby exception.
#[derive(Debug, Clone, Error)]
#[error("{message} ({class_name})")]
pub struct Exception {
    /// Nearest built-in kind, used for host-side matching
    pub kind: ExceptionKind,
    /// Name of the actual class, which may be a user subclass
    pub class_name: String,
    /// The message
    pub message: String,
    /// `file:line:in 'label'` lines, innermost first
    pub backtrace: Vec<String>,
    /// The Ruby-level exception object, once one exists
    pub object: Option<Rc<Instance>>,
}

impl Exception {
    /// Creates an exception of a built-in kind.
    pub fn new(kind: ExceptionKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            class_name: kind.name().to_string(),
            message: message.into(),
            backtrace: Vec::new(),
            object: None,
        }
    }

    /// True when the exception's kind is `kind` or one of its descendants.
    pub fn is_a(&self, kind: ExceptionKind) -> bool {
        self.kind.is_a(kind)
    }

    /// `ArgumentError` for a call with the wrong argument count.
    pub fn argument_count(given: usize, expected: impl fmt::Display) -> Self {
        Self::new(
            ExceptionKind::ArgumentError,
            format!("wrong number of arguments (given {}, expected {})", given, expected),
        )
    }

    /// `ArgumentError` with a custom message.
    pub fn argument(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::ArgumentError, message)
    }

    /// `NoMethodError` for a name nothing in the ancestry defines.
    pub fn no_method(name: &str, receiver: &str) -> Self {
        Self::new(
            ExceptionKind::NoMethodError,
            format!("undefined method '{}' for {}", name, receiver),
        )
    }

    /// `NameError` for a bare identifier that is neither a local nor a method.
    pub fn undefined_name(name: &str, receiver: &str) -> Self {
        Self::new(
            ExceptionKind::NameError,
            format!("undefined local variable or method '{}' for {}", name, receiver),
        )
    }

    /// `NameError` for a missing constant.
    pub fn uninitialized_constant(name: &str) -> Self {
        Self::new(ExceptionKind::NameError, format!("uninitialized constant {}", name))
    }

    /// `PrivateNoMethodError` for a private method called with a receiver.
    pub fn private_method(name: &str, receiver: &str) -> Self {
        Self::new(
            ExceptionKind::PrivateNoMethodError,
            format!("private method '{}' called for {}", name, receiver),
        )
    }

    /// `PrivateNoMethodError` for a protected method called from outside.
    pub fn protected_method(name: &str, receiver: &str) -> Self {
        Self::new(
            ExceptionKind::PrivateNoMethodError,
            format!("protected method '{}' called for {}", name, receiver),
        )
    }

    /// `ZeroDivisionError`.
    pub fn zero_division() -> Self {
        Self::new(ExceptionKind::ZeroDivisionError, "divided by 0")
    }

    /// `TypeError` for a failed numeric coercion.
    pub fn coercion(from: &str, into: &str) -> Self {
        Self::new(
            ExceptionKind::TypeError,
            format!("{} can't be coerced into {}", from, into),
        )
    }

    /// `TypeError` for a failed implicit conversion.
    pub fn implicit_conversion(from: &str, into: &str) -> Self {
        Self::new(
            ExceptionKind::TypeError,
            format!("no implicit conversion of {} into {}", from, into),
        )
    }

    /// `TypeError` with a custom message.
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::TypeError, message)
    }

    /// `LoadError` for a feature missing from the load path.
    pub fn load_error(feature: &str) -> Self {
        Self::new(
            ExceptionKind::LoadError,
            format!("cannot load such file -- {}", feature),
        )
    }

    /// `LocalJumpError` for `yield` without a block.
    pub fn no_block() -> Self {
        Self::new(ExceptionKind::LocalJumpError, "no block given (yield)")
    }

    /// `LocalJumpError` with a custom message.
    pub fn local_jump(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::LocalJumpError, message)
    }

    /// `SystemStackError` when the call depth limit is reached.
    pub fn stack_overflow() -> Self {
        Self::new(ExceptionKind::SystemStackError, "stack level too deep")
    }

    /// `RangeError` for 64-bit overflow.
    pub fn overflow() -> Self {
        Self::new(ExceptionKind::RangeError, "integer overflow")
    }

    /// `SyntaxError` from a required file.
    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::SyntaxError, message)
    }

    /// A broken interpreter invariant. Never reachable from Ruby code.
    pub fn internal(message: impl fmt::Display) -> Self {
        Self::new(
            ExceptionKind::RuntimeError,
            format!("internal error: {}", message),
        )
    }
}

/// Why evaluation stopped before producing a value.
#[derive(Debug)]
pub enum Control {
    /// An exception is propagating
    Raise(Box<Exception>),
    /// `return`, tagged with the activation it returns from (0 = top level)
    Return {
        /// Target activation
        tag: u64,
        /// Returned value
        value: Value,
    },
    /// `break`, tagged with the block or loop it exits
    Break {
        /// Target block or loop
        tag: u64,
        /// Result of the exited call or loop
        value: Value,
    },
    /// `next`: ends the current block invocation or loop iteration
    Next(Value),
    /// `retry` inside a `rescue` clause
    Retry,
}

impl Control {
    /// The propagating exception, if this is a raise.
    pub fn exception(&self) -> Option<&Exception> {
        match self {
            Control::Raise(exception) => Some(exception),
            _ => None,
        }
    }
}

impl From<Exception> for Control {
    fn from(exception: Exception) -> Self {
        Control::Raise(Box::new(exception))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_hierarchy() {
        assert!(ExceptionKind::ZeroDivisionError.is_a(ExceptionKind::StandardError));
        assert!(ExceptionKind::NoMethodError.is_a(ExceptionKind::NameError));
        assert!(ExceptionKind::PrivateNoMethodError.is_a(ExceptionKind::NameError));
        assert!(ExceptionKind::KeyError.is_a(ExceptionKind::IndexError));
        assert!(ExceptionKind::LoadError.is_a(ExceptionKind::Exception));
        assert!(!ExceptionKind::SystemStackError.is_a(ExceptionKind::StandardError));
        assert!(!ExceptionKind::NameError.is_a(ExceptionKind::NoMethodError));
    }

    #[test]
    fn test_all_parents_precede_children() {
        for (i, kind) in ExceptionKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
            if let Some(parent) = kind.parent() {
                assert!(parent.index() < i, "{} listed before {}", kind, parent);
            }
        }
    }

    #[test]
    fn test_messages() {
        let err = Exception::argument_count(1, 2);
        assert_eq!(err.message, "wrong number of arguments (given 1, expected 2)");
        assert_eq!(err.to_string(), "wrong number of arguments (given 1, expected 2) (ArgumentError)");

        let err = Exception::no_method("frob", "main");
        assert_eq!(err.message, "undefined method 'frob' for main");
        assert_eq!(err.kind, ExceptionKind::NoMethodError);

        assert_eq!(Exception::zero_division().message, "divided by 0");
        assert_eq!(
            Exception::coercion("String", "Integer").message,
            "String can't be coerced into Integer"
        );
        assert_eq!(
            Exception::load_error("missing").message,
            "cannot load such file -- missing"
        );
    }

    #[test]
    fn test_control_from_exception() {
        let control: Control = Exception::no_block().into();
        let exception = control.exception().unwrap();
        assert!(exception.is_a(ExceptionKind::LocalJumpError));
        assert!(Control::Retry.exception().is_none());
    }
}
