// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # garnet-core
//!
//! A Ruby object model and tree-walking evaluator, implemented in Rust.
//!
//! ## Overview
//!
//! This crate provides a complete execution environment for a practical
//! subset of Ruby:
//! - Lexer and recursive-descent parser producing an AST
//! - Classes, modules, eigenclasses, singleton methods and mixins
//! - Method dispatch with visibility, arity checks and `method_missing`
//! - Blocks, procs and lambdas with non-local `return`, `break` and `next`
//! - Exceptions with `rescue`/`ensure`/`retry` and backtraces
//! - Core classes: `Integer`, `String`, `Symbol`, `Array`, `Hash`, `Proc`,
//!   plus the `Kernel`, `Enumerable` and `Comparable` modules
//!
//! ## Quick Start
//!
//! ```rust
//! use garnet_core::{Engine, Value};
//!
//! let mut engine = Engine::new();
//! let result = engine.eval("[1, 2, 3].map { |x| x * 2 }.sum").unwrap();
//! assert!(matches!(result, Value::Integer(12)));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ast;
pub mod builtins;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod runtime;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use crate::ast::Node;
use crate::interpreter::Interpreter;
use crate::parser::Parser;
use crate::runtime::context::Runtime;

pub use runtime::environment::Env;
pub use runtime::error::{Exception, ExceptionKind};
pub use runtime::value::Value;

/// Settings fixed when an [`Engine`] is created.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// `$PROGRAM_NAME`, and the file name of `eval`'d code in backtraces
    pub program_name: String,
    /// Initial `$LOAD_PATH`
    pub load_paths: Vec<PathBuf>,
    /// Nesting depth of method calls before `SystemStackError`
    pub max_call_depth: usize,
    /// Whether hosts should print backtraces for uncaught exceptions
    pub backtrace: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program_name: "-e".to_string(),
            load_paths: Vec::new(),
            max_call_depth: 10_000,
            backtrace: false,
        }
    }
}

/// The main Ruby engine instance.
///
/// Owns one interpreter: its class registry, top-level environment and
/// output stream. Engines are independent of each other.
pub struct Engine {
    interpreter: Interpreter,
    config: EngineConfig,
}

impl Engine {
    /// Creates an engine with the default configuration, writing to stdout.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Creates an engine with the given configuration, writing to stdout.
    pub fn with_config(config: EngineConfig) -> Self {
        let interpreter = Interpreter::new(&config, Box::new(io::stdout()));
        Self { interpreter, config }
    }

    /// Rebuilds the engine so program output goes to `output`.
    pub fn with_output(self, output: impl Write + 'static) -> Self {
        let interpreter = Interpreter::new(&self.config, Box::new(output));
        Self {
            interpreter,
            config: self.config,
        }
    }

    /// The configuration the engine was created with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Evaluates Ruby source code and returns the value of its last
    /// statement.
    ///
    /// Top-level local variables survive between calls, so successive
    /// `eval`s behave like lines of one REPL session.
    ///
    /// # Examples
    ///
    /// ```rust
    /// let mut engine = garnet_core::Engine::new();
    /// engine.eval("x = 40").unwrap();
    /// let answer = engine.eval("x + 2").unwrap();
    /// assert_eq!(engine.inspect(&answer), "42");
    /// ```
    pub fn eval(&mut self, source: &str) -> Result<Value, Error> {
        let file = self.config.program_name.clone();
        self.run_source(source, &file)
    }

    /// Evaluates a Ruby source file.
    pub fn eval_file(&mut self, path: &Path) -> Result<Value, Error> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| Error::Io(format!("{}: {}", path.display(), e)))?;
        self.run_source(&source, &path.display().to_string())
    }

    fn run_source(&mut self, source: &str, file: &str) -> Result<Value, Error> {
        let locals = self.interpreter.global_env().local_names();
        let program = Parser::with_locals(source, locals).parse_program()?;
        debug!(file, "running program");
        self.interpreter.run(&program, file).map_err(Error::raised)
    }

    /// Evaluates an already-parsed node in `env`.
    pub fn evaluate(&mut self, node: &Node, env: &Env) -> Result<Value, Error> {
        let result = self.interpreter.evaluate(node, env);
        self.interpreter.settle(result).map_err(Error::raised)
    }

    /// Calls a public method from the top level.
    pub fn send(&mut self, receiver: &Value, name: &str, args: Vec<Value>) -> Result<Value, Error> {
        self.interpreter.send(receiver, name, args).map_err(Error::raised)
    }

    /// The value's own `inspect`, as shown by `p` and the REPL.
    pub fn inspect(&mut self, value: &Value) -> String {
        match self.interpreter.send(value, "inspect", Vec::new()) {
            Ok(shown) => shown.as_text().unwrap_or_else(|| format!("{:?}", value)),
            Err(_) => format!("{:?}", value),
        }
    }

    /// The top-level environment.
    pub fn global_env(&self) -> &Env {
        self.interpreter.global_env()
    }

    /// Flushes program output.
    pub fn flush(&mut self) -> Result<(), Error> {
        self.interpreter.flush().map_err(|e| Error::Io(e.to_string()))
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// Program output collected in memory, for tests and embedders.
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput(Arc<Mutex<Vec<u8>>>);

impl CapturedOutput {
    /// An empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded as UTF-8.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl Write for CapturedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Errors that can occur while running Ruby code.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The source did not parse
    #[error("line {line}: {message}")]
    Syntax {
        /// What the parser expected
        message: String,
        /// 1-based line of the offending token
        line: u32,
    },
    /// An exception reached the top level
    #[error("{exception}")]
    Raised {
        /// The uncaught exception
        #[source]
        exception: Box<Exception>,
        /// `file:line:in 'frame'` lines, innermost first
        backtrace: Vec<String>,
    },
    /// Reading source or writing output failed
    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    fn raised(exception: Exception) -> Self {
        let backtrace = exception.backtrace.clone();
        Error::Raised {
            exception: Box::new(exception),
            backtrace,
        }
    }

    /// The uncaught exception, if this error is one.
    pub fn exception(&self) -> Option<&Exception> {
        match self {
            Error::Raised { exception, .. } => Some(exception),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eval_returns_last_value() {
        let mut engine = Engine::new();
        let value = engine.eval("a = 1\nb = 2\na + b").unwrap();
        assert!(matches!(value, Value::Integer(3)));
    }

    #[test]
    fn test_locals_survive_between_evals() {
        let mut engine = Engine::new();
        engine.eval("greeting = \"hi\"").unwrap();
        let value = engine.eval("greeting.upcase").unwrap();
        assert_eq!(engine.inspect(&value), "\"HI\"");
    }

    #[test]
    fn test_syntax_error() {
        let mut engine = Engine::new();
        let err = engine.eval("def broken(").unwrap_err();
        assert!(matches!(err, Error::Syntax { line: 1, .. }));
        assert!(err.exception().is_none());
    }

    #[test]
    fn test_uncaught_exception_is_the_source() {
        let mut engine = Engine::new();
        let err = engine.eval("raise ArgumentError, \"bad\"").unwrap_err();
        assert_eq!(err.to_string(), "bad (ArgumentError)");
        let exception = err.exception().unwrap();
        assert_eq!(exception.kind, ExceptionKind::ArgumentError);
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "bad (ArgumentError)");
    }

    #[test]
    fn test_captured_output() {
        let output = CapturedOutput::new();
        let mut engine = Engine::new().with_output(output.clone());
        engine.eval("puts 1\nprint \"a\", \"b\"\np :c").unwrap();
        engine.flush().unwrap();
        assert_eq!(output.contents(), "1\nab:c\n");
    }

    #[test]
    fn test_engines_are_independent() {
        let mut first = Engine::new();
        let mut second = Engine::new();
        first.eval("class String\n  def shout\n    upcase\n  end\nend").unwrap();
        assert!(first.eval("\"a\".shout").is_ok());
        let err = second.eval("\"a\".shout").unwrap_err();
        assert_eq!(err.exception().unwrap().kind, ExceptionKind::NoMethodError);
    }

    #[test]
    fn test_call_depth_limit() {
        let config = EngineConfig {
            max_call_depth: 200,
            ..EngineConfig::default()
        };
        let mut engine = Engine::with_config(config);
        let err = engine.eval("def down(n)\n  down(n + 1)\nend\ndown(0)").unwrap_err();
        assert_eq!(err.exception().unwrap().kind, ExceptionKind::SystemStackError);
        // The engine stays usable afterwards
        assert!(matches!(engine.eval("1 + 1").unwrap(), Value::Integer(2)));
    }

    #[test]
    fn test_evaluate_parsed_node() {
        let mut engine = Engine::new();
        let node = Parser::new("6 * 7").parse_program().unwrap();
        let env = engine.global_env().clone();
        let value = engine.evaluate(&node, &env).unwrap();
        assert!(matches!(value, Value::Integer(42)));
    }

    #[test]
    fn test_send_from_host() {
        let mut engine = Engine::new();
        let value = engine.send(&Value::Integer(5), "+", vec![Value::Integer(1)]).unwrap();
        assert!(matches!(value, Value::Integer(6)));
    }
}
