//! Closures: blocks, procs and lambdas.

use std::fmt;
use std::rc::Rc;

use super::context::CallContext;
use super::environment::Env;
use super::error::EvalResult;
use super::method::Arity;
use super::value::{Value, next_object_id};
use crate::ast::BlockLit;

/// A closure implemented in Rust.
pub type NativeProc = Rc<dyn Fn(&mut CallContext<'_>, Vec<Value>) -> EvalResult>;

/// What a closure runs.
#[derive(Clone)]
pub enum ProcBody {
    /// A block or lambda literal and the scope it was created in
    Block {
        /// The literal
        lit: Rc<BlockLit>,
        /// Captured defining environment
        env: Env,
    },
    /// A closure built by the runtime, e.g. `Symbol#to_proc`
    Native {
        /// Reported arity
        arity: Arity,
        /// The function
        func: NativeProc,
    },
}

/// A Ruby `Proc`.
///
/// A closure is *strict* when its argument count must match its parameters
/// exactly (procs and lambdas) and *lenient* otherwise (blocks): lenient
/// closures pad missing parameters with nil, drop extras, and splat a lone
/// array argument across several parameters.
pub struct Proc {
    /// Identity, also the `break` target of the closure
    pub id: u64,
    /// Body
    pub body: ProcBody,
    /// `return` and `break` leave the closure itself
    pub lambda: bool,
    /// Argument count is checked
    pub strict: bool,
}

impl Proc {
    /// A lenient block.
    pub fn block(lit: Rc<BlockLit>, env: Env) -> Rc<Self> {
        Rc::new(Self {
            id: next_object_id(),
            body: ProcBody::Block { lit, env },
            lambda: false,
            strict: false,
        })
    }

    /// A strict lambda.
    pub fn lambda(lit: Rc<BlockLit>, env: Env) -> Rc<Self> {
        Rc::new(Self {
            id: next_object_id(),
            body: ProcBody::Block { lit, env },
            lambda: true,
            strict: true,
        })
    }

    /// A lenient closure implemented in Rust.
    pub fn native<F>(arity: Arity, func: F) -> Rc<Self>
    where
        F: Fn(&mut CallContext<'_>, Vec<Value>) -> EvalResult + 'static,
    {
        Rc::new(Self {
            id: next_object_id(),
            body: ProcBody::Native {
                arity,
                func: Rc::new(func),
            },
            lambda: false,
            strict: false,
        })
    }

    /// A copy with a new identity and the given strictness, sharing the body.
    pub fn rewrap(&self, lambda: bool, strict: bool) -> Rc<Self> {
        Rc::new(Self {
            id: next_object_id(),
            body: self.body.clone(),
            lambda,
            strict,
        })
    }

    /// Declared arity.
    pub fn arity(&self) -> Arity {
        match &self.body {
            ProcBody::Block { lit, .. } => Arity::from_params(&lit.params),
            ProcBody::Native { arity, .. } => *arity,
        }
    }

    /// Ruby's `Proc#arity`. Lenient closures with optional parameters only
    /// report their required count as negative.
    pub fn ruby_arity(&self) -> i64 {
        match (self.strict, self.arity()) {
            (false, Arity::Range(min, _)) if min == 0 => -1,
            (_, arity) => arity.ruby_arity(),
        }
    }

    /// Adapts arguments to the parameter list of a lenient closure.
    ///
    /// Strict closures get their arguments unchanged; the caller checks the
    /// count against [`Proc::arity`].
    pub fn adapt_args(&self, mut args: Vec<Value>) -> Vec<Value> {
        let ProcBody::Block { lit, .. } = &self.body else {
            return args;
        };
        if self.strict {
            return args;
        }
        let params = &lit.params;
        let wants_splat = params.positional() > 1 || (params.positional() == 1 && params.rest.is_some());
        if args.len() == 1 && wants_splat {
            let spread = match &args[0] {
                Value::Array(items) => Some(items.borrow().clone()),
                _ => None,
            };
            if let Some(items) = spread {
                args = items;
            }
        }
        let required = params.required.len();
        if args.len() < required {
            args.resize(required, Value::Nil);
        }
        if params.rest.is_none() && args.len() > params.positional() {
            args.truncate(params.positional());
        }
        args
    }
}

impl fmt::Debug for Proc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proc")
            .field("id", &self.id)
            .field("lambda", &self.lambda)
            .field("strict", &self.strict)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, Node, Params, Position};

    fn lit(required: &[&str], optional: usize, rest: bool) -> Rc<BlockLit> {
        let pos = Position::new(1, 1);
        Rc::new(BlockLit {
            params: Params {
                required: required.iter().map(|s| s.to_string()).collect(),
                optional: (0..optional)
                    .map(|i| (format!("opt{}", i), Node::new(Expr::Nil, pos)))
                    .collect(),
                rest: rest.then(|| "rest".to_string()),
                block: None,
            },
            body: Node::new(Expr::Nil, pos),
        })
    }

    #[test]
    fn test_block_pads_missing_arguments() {
        let block = Proc::block(lit(&["a", "b"], 0, false), Env::store());
        assert_eq!(block.adapt_args(vec![Value::Integer(1)]), vec![Value::Integer(1), Value::Nil]);
    }

    #[test]
    fn test_block_drops_extra_arguments() {
        let block = Proc::block(lit(&["a"], 0, false), Env::store());
        let args = block.adapt_args(vec![Value::Integer(1), Value::Integer(2)]);
        assert_eq!(args, vec![Value::Integer(1)]);
    }

    #[test]
    fn test_block_splats_single_array() {
        let block = Proc::block(lit(&["k", "v"], 0, false), Env::store());
        let pair = Value::array(vec![Value::symbol("a"), Value::Integer(1)]);
        assert_eq!(block.adapt_args(vec![pair.clone()]), vec![Value::symbol("a"), Value::Integer(1)]);

        let single = Proc::block(lit(&["x"], 0, false), Env::store());
        assert_eq!(single.adapt_args(vec![pair.clone()]), vec![pair]);
    }

    #[test]
    fn test_lambda_is_left_alone() {
        let lambda = Proc::lambda(lit(&["a", "b"], 0, false), Env::store());
        assert_eq!(lambda.adapt_args(vec![Value::Integer(1)]), vec![Value::Integer(1)]);
        assert!(lambda.arity().check(1).is_err());
    }

    #[test]
    fn test_arity_reporting() {
        assert_eq!(Proc::lambda(lit(&["a", "b"], 0, false), Env::store()).ruby_arity(), 2);
        assert_eq!(Proc::lambda(lit(&["a"], 1, false), Env::store()).ruby_arity(), -2);
        assert_eq!(Proc::block(lit(&[], 1, false), Env::store()).ruby_arity(), -1);
        assert_eq!(Proc::block(lit(&["a"], 0, true), Env::store()).ruby_arity(), -2);
    }

    #[test]
    fn test_rewrap_gets_new_identity() {
        let block = Proc::block(lit(&["a"], 0, false), Env::store());
        let strict = block.rewrap(false, true);
        assert_ne!(block.id, strict.id);
        assert!(strict.strict && !strict.lambda);
    }
}
