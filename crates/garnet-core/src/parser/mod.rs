//! Parser for Ruby source code.
//!
//! Transforms a stream of tokens into an Abstract Syntax Tree (AST).
//!
//! ## Structure
//!
//! - `parser` - Parser state, token helpers, statement sequences and modifiers
//! - `expressions` - Operators, calls, blocks and literals
//! - `statements` - Definitions, conditionals, loops and `begin`/`rescue`
//!
//! The parser tracks lexical local-variable scopes: a bare identifier is a
//! local variable read only if it was assigned earlier in the same scope;
//! otherwise it is a call to a method on `self`.
//!
//! ## Usage
//!
//! ```rust
//! use garnet_core::parser::Parser;
//!
//! let mut parser = Parser::new("x = 1 + 2");
//! let program = parser.parse_program().expect("Should parse");
//! ```

mod expressions;
mod parser;
mod statements;

pub use parser::Parser;
