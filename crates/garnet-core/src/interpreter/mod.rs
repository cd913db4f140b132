//! The tree-walking evaluator.
//!
//! [`Interpreter`] walks AST nodes directly. Method calls go through
//! [`CallContext::dispatch`]; the interpreter in turn implements [`Runtime`],
//! which is how method and closure bodies get evaluated again.
//!
//! ## Structure
//!
//! - `calls` - Method calls, arguments, blocks, `super` and `yield`
//! - `control` - Conditionals, loops, `case`, `begin`/`rescue` and jumps
//! - `definitions` - `def`, `class`, `module` and `alias`
//! - `assign` - Assignment targets
//! - `loader` - `require` and `require_relative`

mod assign;
mod calls;
mod control;
mod definitions;
mod loader;

use std::io::Write;
use std::rc::Rc;

use crate::EngineConfig;
use crate::ast::{Expr, Node};
use crate::builtins;
use crate::runtime::class::Registry;
use crate::runtime::context::{CallContext, CallFlags, Runtime, SelfBinding, UserCall};
use crate::runtime::environment::{Activation, Env};
use crate::runtime::error::{Control, EvalResult, Exception};
use crate::runtime::method::Visibility;
use crate::runtime::proc::Proc;
use crate::runtime::stack::CallStack;
use crate::runtime::value::{ExceptionData, Instance, RubyHash, Value, next_object_id};

// Grow the host stack in 4 MiB segments whenever less than 256 KiB remains
const RED_ZONE: usize = 256 * 1024;
const STACK_SEGMENT: usize = 4 * 1024 * 1024;

/// Evaluates programs against one class registry and root environment.
pub struct Interpreter {
    registry: Registry,
    root: Env,
    main: Value,
    stack: CallStack,
    // `break` targets of the blocks and loops being executed; 0 marks a
    // method boundary that `break` cannot cross
    breaks: Vec<u64>,
    output: Box<dyn Write>,
    file: Rc<str>,
}

impl Interpreter {
    /// Bootstraps the core classes and the top-level `main` object.
    pub fn new(config: &EngineConfig, output: Box<dyn Write>) -> Self {
        let root = Env::store();
        let mut registry = builtins::bootstrap(&root);
        let object = registry.core().object;
        let instance = Instance::new(object);
        let main = Value::Object(instance.clone());
        builtins::install_main(&mut registry, &main);

        let activation = Activation::new(0, main.clone(), instance.ivars.clone(), object)
            .with_visibility(Visibility::Private);
        let root = root.with_activation(Rc::new(activation));

        let program_name = Value::string(config.program_name.as_str());
        root.set_global("$PROGRAM_NAME", program_name.clone());
        root.set_global("$0", program_name);
        let load_path = config
            .load_paths
            .iter()
            .map(|path| Value::string(path.display().to_string()))
            .collect();
        root.set_global("$LOAD_PATH", Value::array(load_path));
        root.set_global("$LOADED_FEATURES", Value::array(Vec::new()));
        root.set_global("$!", Value::Nil);

        Self {
            registry,
            root,
            main,
            stack: CallStack::new(&config.program_name, config.max_call_depth),
            breaks: Vec::new(),
            output,
            file: Rc::from(config.program_name.as_str()),
        }
    }

    /// The top-level environment.
    pub fn global_env(&self) -> &Env {
        &self.root
    }

    /// The top-level `self`.
    pub fn main(&self) -> &Value {
        &self.main
    }

    /// Flushes program output.
    pub fn flush(&mut self) -> std::io::Result<()> {
        self.output.flush()
    }

    /// Runs a whole program read from `file` in the root environment.
    pub fn run(&mut self, program: &Node, file: &str) -> Result<Value, Exception> {
        let file: Rc<str> = Rc::from(file);
        let previous = std::mem::replace(&mut self.file, file.clone());
        let previous_frame = self.stack.swap_file(file);
        let root = self.root.clone();
        let result = self.evaluate(program, &root);
        self.file = previous;
        self.stack.swap_file(previous_frame);
        self.settle(result)
    }

    /// Turns the outcome of a top-level evaluation into a value or an
    /// exception, resetting the call and jump stacks.
    pub fn settle(&mut self, result: EvalResult) -> Result<Value, Exception> {
        let outcome = match result {
            Ok(value) => Ok(value),
            Err(Control::Return { tag: 0, value }) => Ok(value),
            Err(Control::Raise(exception)) => Err(*exception),
            Err(Control::Return { .. }) => Err(Exception::local_jump("unexpected return")),
            Err(Control::Break { .. }) => Err(Exception::local_jump("break from proc-closure")),
            Err(Control::Next(_)) => Err(Exception::local_jump("next used outside of block")),
            Err(Control::Retry) => Err(Exception::local_jump("retry used outside of rescue")),
        };
        let outcome = outcome.map_err(|mut exception| {
            if exception.backtrace.is_empty() {
                exception.backtrace = self.stack.backtrace();
            }
            exception
        });
        self.stack.truncate(1);
        self.breaks.clear();
        outcome
    }

    /// Dispatches `name` from the top level, for embedders.
    pub fn send(&mut self, receiver: &Value, name: &str, args: Vec<Value>) -> Result<Value, Exception> {
        let root = self.root.clone();
        let result = self.send_from(&root, receiver.clone(), name, args, None, CallFlags::PUBLIC);
        self.settle(result)
    }

    /// `self` as seen from `env`.
    pub(crate) fn self_value(&self, env: &Env) -> Value {
        env.activation()
            .map(|activation| activation.receiver.clone())
            .unwrap_or_else(|| self.main.clone())
    }

    /// Dispatches a call made by code running in `env`.
    pub(crate) fn send_from(
        &mut self,
        env: &Env,
        receiver: Value,
        name: &str,
        args: Vec<Value>,
        block: Option<Rc<Proc>>,
        flags: CallFlags,
    ) -> EvalResult {
        let line = self.stack.current().line;
        let caller = self.self_value(env);
        CallContext::new(self, env.clone(), caller)
            .at_line(line)
            .dispatch(receiver, name, args, block, flags)
    }

    /// `value.to_s` as text, for interpolation.
    fn stringify(&mut self, value: Value, env: &Env) -> Result<String, Control> {
        if let Value::String(s) = &value {
            return Ok(s.borrow().clone());
        }
        let caller = self.self_value(env);
        CallContext::new(self, env.clone(), caller).to_s(&value)
    }

    /// The Ruby-level object for an exception, created on first rescue.
    pub(crate) fn exception_object(&mut self, exception: &mut Exception) -> Value {
        if let Some(object) = &exception.object {
            let mut data = object.exception.borrow_mut();
            let data = data.get_or_insert_with(ExceptionData::default);
            if data.backtrace.is_none() {
                data.backtrace = Some(exception.backtrace.clone());
            }
            return Value::Object(object.clone());
        }
        let class = self.registry.exception_class_of(exception);
        let object = Instance::exception(
            class,
            ExceptionData {
                message: Some(exception.message.clone()),
                backtrace: Some(exception.backtrace.clone()),
            },
        );
        exception.object = Some(object.clone());
        Value::Object(object)
    }

    fn eval_node(&mut self, node: &Node, env: &Env) -> EvalResult {
        match &node.expr {
            Expr::Nil => Ok(Value::Nil),
            Expr::True => Ok(Value::Bool(true)),
            Expr::False => Ok(Value::Bool(false)),
            Expr::SelfRef => Ok(self.self_value(env)),
            Expr::Integer(n) => Ok(Value::Integer(*n)),
            Expr::Str(s) => Ok(Value::string(s.as_str())),
            Expr::Symbol(s) => Ok(Value::symbol(s)),
            Expr::Interpolated(parts) => {
                let mut text = String::new();
                for part in parts {
                    match &part.expr {
                        Expr::Str(s) => text.push_str(s),
                        _ => {
                            let value = self.evaluate(part, env)?;
                            text.push_str(&self.stringify(value, env)?);
                        }
                    }
                }
                Ok(Value::string(text))
            }
            Expr::Array(items) => Ok(Value::array(self.eval_list(items, env)?)),
            Expr::Hash(pairs) => {
                let mut hash = RubyHash::new();
                for (key, value) in pairs {
                    let key = self.evaluate(key, env)?;
                    let value = self.evaluate(value, env)?;
                    hash.insert(key, value);
                }
                Ok(Value::hash(hash))
            }

            Expr::LocalVar(name) | Expr::InstanceVar(name) | Expr::GlobalVar(name) => {
                Ok(env.get(name).unwrap_or_default())
            }
            Expr::Const { scope, name } => self.lookup_constant(scope.as_deref(), name, env),

            Expr::Assign { target, value } => {
                let value = self.evaluate(value, env)?;
                self.assign(target, value.clone(), env)?;
                Ok(value)
            }
            Expr::OpAssign { target, op, value } => self.eval_op_assign(target, op, value, env),
            Expr::MultiAssign { targets, value } => self.eval_multi_assign(targets, value, env),

            Expr::Call(call) => {
                self.stack.set_line(node.pos.line);
                self.eval_call(call, env)
            }
            Expr::Splat(inner) => {
                let value = self.evaluate(inner, env)?;
                Ok(Value::array(splat_values(value)))
            }
            Expr::Super { args, block } => {
                self.stack.set_line(node.pos.line);
                self.eval_super(args.as_deref(), block.as_ref(), env)
            }
            Expr::Yield(args) => self.eval_yield(args, env),

            Expr::Not(inner) => {
                let value = self.evaluate(inner, env)?;
                self.send_from(env, value, "!", Vec::new(), None, CallFlags::PUBLIC)
            }
            Expr::And(left, right) => {
                let left = self.evaluate(left, env)?;
                if left.truthy() { self.evaluate(right, env) } else { Ok(left) }
            }
            Expr::Or(left, right) => {
                let left = self.evaluate(left, env)?;
                if left.truthy() { Ok(left) } else { self.evaluate(right, env) }
            }
            Expr::Defined(inner) => Ok(self
                .defined(inner, env)
                .map(Value::string)
                .unwrap_or_default()),

            Expr::If {
                cond,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(cond, env)?.truthy() {
                    self.evaluate(then_branch, env)
                } else if let Some(else_branch) = else_branch {
                    self.evaluate(else_branch, env)
                } else {
                    Ok(Value::Nil)
                }
            }
            Expr::While {
                cond,
                body,
                until,
                do_while,
            } => self.eval_while(cond, body, *until, *do_while, env),
            Expr::For { var, iterable, body } => self.eval_for(var, iterable, body, env),
            Expr::Case {
                subject,
                whens,
                else_branch,
            } => self.eval_case(subject.as_deref(), whens, else_branch.as_deref(), env),

            Expr::Def(def) => self.eval_def(def, env),
            Expr::ClassDef {
                scope,
                name,
                superclass,
                body,
            } => self.eval_class(scope.as_deref(), name, superclass.as_deref(), body, env),
            Expr::SingletonClass { target, body } => self.eval_singleton_class(target, body, env),
            Expr::ModuleDef { scope, name, body } => self.eval_module(scope.as_deref(), name, body, env),
            Expr::Begin(block) => self.eval_begin(block, env),

            Expr::Return(value) => {
                let value = self.eval_optional(value.as_deref(), env)?;
                Err(Control::Return {
                    tag: env.return_tag().unwrap_or(0),
                    value,
                })
            }
            Expr::Break(value) => {
                let value = self.eval_optional(value.as_deref(), env)?;
                match self.breaks.last() {
                    Some(&tag) if tag != 0 => Err(Control::Break { tag, value }),
                    _ => Err(Exception::local_jump("break from proc-closure").into()),
                }
            }
            Expr::Next(value) => Err(Control::Next(self.eval_optional(value.as_deref(), env)?)),
            Expr::Retry => Err(Control::Retry),
            Expr::Lambda(lit) => Ok(Value::Proc(Proc::lambda(lit.clone(), env.clone()))),
            Expr::Alias { new_name, old_name } => self.eval_alias(new_name, old_name, env),
            Expr::Seq(statements) => {
                let mut last = Value::Nil;
                for statement in statements {
                    self.stack.set_line(statement.pos.line);
                    last = self.evaluate(statement, env)?;
                }
                Ok(last)
            }
        }
    }

    fn eval_optional(&mut self, node: Option<&Node>, env: &Env) -> EvalResult {
        match node {
            Some(node) => self.evaluate(node, env),
            None => Ok(Value::Nil),
        }
    }

    /// Evaluates list items, expanding `*splat`s in place.
    pub(crate) fn eval_list(&mut self, nodes: &[Node], env: &Env) -> Result<Vec<Value>, Control> {
        let mut values = Vec::with_capacity(nodes.len());
        for node in nodes {
            match &node.expr {
                Expr::Splat(inner) => {
                    let value = self.evaluate(inner, env)?;
                    values.extend(splat_values(value));
                }
                _ => values.push(self.evaluate(node, env)?),
            }
        }
        Ok(values)
    }
}

/// The elements a `*value` expands to.
pub(crate) fn splat_values(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.borrow().clone(),
        Value::Nil => Vec::new(),
        Value::Hash(hash) => hash
            .borrow()
            .pairs()
            .into_iter()
            .map(|(k, v)| Value::array(vec![k, v]))
            .collect(),
        other => vec![other],
    }
}

impl Runtime for Interpreter {
    fn evaluate(&mut self, node: &Node, env: &Env) -> EvalResult {
        stacker::maybe_grow(RED_ZONE, STACK_SEGMENT, || self.eval_node(node, env))
    }

    fn registry(&self) -> &Registry {
        &self.registry
    }

    fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    fn call_stack(&mut self) -> &mut CallStack {
        &mut self.stack
    }

    fn root_env(&self) -> Env {
        self.root.clone()
    }

    fn output(&mut self) -> &mut dyn Write {
        &mut *self.output
    }

    fn invoke_user(&mut self, call: UserCall<'_>) -> EvalResult {
        self.run_method(call)
    }

    fn call_proc(
        &mut self,
        proc: &Rc<Proc>,
        args: Vec<Value>,
        block: Option<Rc<Proc>>,
        binding: Option<SelfBinding>,
    ) -> EvalResult {
        self.run_proc(proc, args, block, binding)
    }

    fn load_feature(&mut self, feature: &str, relative: bool) -> EvalResult {
        self.require(feature, relative)
    }

    fn next_id(&mut self) -> u64 {
        next_object_id()
    }
}
