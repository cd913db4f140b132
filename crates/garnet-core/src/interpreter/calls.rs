//! Method calls, blocks, `super` and `yield`.

use std::rc::Rc;

use tracing::trace;

use super::Interpreter;
use crate::ast::{BlockArg, Call, Expr, Node, Params};
use crate::runtime::context::{CallContext, CallFlags, Runtime, SelfBinding, UserCall};
use crate::runtime::environment::{Activation, Env};
use crate::runtime::error::{Control, EvalResult, Exception, ExceptionKind};
use crate::runtime::proc::{Proc, ProcBody};
use crate::runtime::value::Value;

impl Interpreter {
    pub(super) fn eval_call(&mut self, call: &Call, env: &Env) -> EvalResult {
        let (receiver, self_call) = match &call.receiver {
            None => (self.self_value(env), true),
            Some(node) if matches!(node.expr, Expr::SelfRef) => (self.self_value(env), true),
            Some(node) => (self.evaluate(node, env)?, false),
        };
        let args = self.eval_list(&call.args, env)?;
        let (block, literal) = self.eval_block_arg(call.block.as_ref(), env)?;
        let flags = CallFlags {
            self_call,
            vcall: call.vcall,
        };
        let result = self.send_from(env, receiver, &call.name, args, block, flags);
        catch_break(result, literal)
    }

    /// The block passed to a call, plus the id `break` inside a literal
    /// block targets.
    pub(super) fn eval_block_arg(
        &mut self,
        block: Option<&BlockArg>,
        env: &Env,
    ) -> Result<(Option<Rc<Proc>>, Option<u64>), Control> {
        match block {
            None => Ok((None, None)),
            Some(BlockArg::Literal(lit)) => {
                let proc = Proc::block(lit.clone(), env.clone());
                let id = proc.id;
                Ok((Some(proc), Some(id)))
            }
            Some(BlockArg::Pass(node)) => {
                let value = self.evaluate(node, env)?;
                Ok((self.to_proc(value, env)?, None))
            }
        }
    }

    fn to_proc(&mut self, value: Value, env: &Env) -> Result<Option<Rc<Proc>>, Control> {
        let converted = match value {
            Value::Nil => return Ok(None),
            Value::Proc(proc) => return Ok(Some(proc)),
            other => self.send_from(env, other.clone(), "to_proc", Vec::new(), None, CallFlags::PUBLIC)?,
        };
        match converted {
            Value::Proc(proc) => Ok(Some(proc)),
            other => {
                let class = self.registry.name_of(self.registry.class_of(&other));
                Err(Exception::type_error(format!("wrong argument type {} (expected Proc)", class)).into())
            }
        }
    }

    pub(super) fn eval_yield(&mut self, args: &[Node], env: &Env) -> EvalResult {
        let block = env
            .activation()
            .and_then(|activation| activation.block.clone())
            .ok_or_else(Exception::no_block)?;
        let args = self.eval_list(args, env)?;
        self.run_proc(&block, args, None, None)
    }

    pub(super) fn eval_super(&mut self, args: Option<&[Node]>, block: Option<&BlockArg>, env: &Env) -> EvalResult {
        let activation = env.activation();
        let Some((activation, frame)) = activation.and_then(|a| a.frame.clone().map(|frame| (a, frame))) else {
            return Err(Exception::new(ExceptionKind::RuntimeError, "super called outside of method").into());
        };
        let args = match args {
            Some(nodes) => self.eval_list(nodes, env)?,
            None => activation.args.clone(),
        };
        let (block, literal) = match block {
            Some(block) => self.eval_block_arg(Some(block), env)?,
            None => (activation.block.clone(), None),
        };
        let receiver = activation.receiver.clone();
        let class = self.registry.dispatch_class(&receiver);
        let Some(method) = self.registry.find_super_method(class, frame.owner, &frame.name) else {
            let caller = self.self_value(env);
            let shown = CallContext::new(self, env.clone(), caller).describe(&receiver);
            return Err(Exception::new(
                ExceptionKind::NoMethodError,
                format!("super: no superclass method '{}' for {}", frame.name, shown),
            )
            .into());
        };
        let line = self.stack.current().line;
        let result = CallContext::new(self, env.clone(), receiver.clone())
            .at_line(line)
            .invoke(&method, receiver, args, block, false);
        catch_break(result, literal)
    }

    /// Runs a `def` body: a guarded scope with a fresh activation that
    /// `return` targets and `break` cannot cross.
    pub(super) fn run_method(&mut self, call: UserCall<'_>) -> EvalResult {
        let UserCall {
            def,
            env,
            frame,
            receiver,
            args,
            block,
        } = call;
        let id = self.next_id();
        let ivars = self.ivars_of(&receiver);
        let owner = frame.owner;
        let activation = Activation::new(id, receiver, ivars, owner).with_frame(frame, args.clone(), block.clone());
        let scope = env.guard(Some(Rc::new(activation))).with_return_tag(id);

        self.breaks.push(0);
        let result = match self.bind_params(&def.params, args, block, &scope) {
            Ok(()) => self.evaluate(&def.body, &scope),
            Err(control) => Err(control),
        };
        self.breaks.pop();

        match result {
            Err(Control::Return { tag, value }) if tag == id => Ok(value),
            Err(Control::Next(_)) => Err(Exception::local_jump("next used outside of block").into()),
            Err(Control::Retry) => Err(Exception::local_jump("retry used outside of rescue").into()),
            other => other,
        }
    }

    /// Runs a closure. Blocks get a plain child scope of the environment they
    /// were created in; lambdas additionally catch their own `return`.
    pub(super) fn run_proc(
        &mut self,
        proc: &Rc<Proc>,
        args: Vec<Value>,
        block: Option<Rc<Proc>>,
        binding: Option<SelfBinding>,
    ) -> EvalResult {
        trace!(proc = proc.id, lambda = proc.lambda, args = args.len(), "call proc");
        if proc.strict {
            proc.arity().check(args.len())?;
        }
        let args = proc.adapt_args(args);
        let (lit, captured) = match &proc.body {
            ProcBody::Block { lit, env } => (lit.clone(), env.clone()),
            ProcBody::Native { func, .. } => {
                let func = func.clone();
                let root = self.root.clone();
                let receiver = binding.map(|b| b.receiver).unwrap_or_else(|| self.main.clone());
                let mut ctx = CallContext::new(self, root, receiver);
                ctx.block = block;
                return func(&mut ctx, args);
            }
        };

        let mut scope = captured.child();
        let mut method_tag = None;
        if let Some(binding) = binding {
            let id = self.next_id();
            let ivars = self.ivars_of(&binding.receiver);
            let mut activation = Activation::new(id, binding.receiver, ivars, binding.definee);
            if let Some(frame) = binding.frame {
                activation = activation.with_frame(frame, args.clone(), block.clone());
                method_tag = Some(id);
                scope = scope.with_return_tag(id);
            }
            scope = scope.with_activation(Rc::new(activation));
        } else if proc.lambda {
            scope = scope.with_return_tag(proc.id);
        }

        self.breaks.push(proc.id);
        let result = match self.bind_params(&lit.params, args, block, &scope) {
            Ok(()) => self.evaluate(&lit.body, &scope),
            Err(control) => Err(control),
        };
        self.breaks.pop();

        match result {
            Err(Control::Next(value)) => Ok(value),
            Err(Control::Return { tag, value }) if proc.lambda && tag == proc.id => Ok(value),
            Err(Control::Return { tag, value }) if Some(tag) == method_tag => Ok(value),
            Err(Control::Break { tag, value }) if proc.lambda && tag == proc.id => Ok(value),
            other => other,
        }
    }

    /// Binds arguments to parameters. The count has already been checked or
    /// adapted; optional parameters left over run their default expressions.
    pub(super) fn bind_params(
        &mut self,
        params: &Params,
        args: Vec<Value>,
        block: Option<Rc<Proc>>,
        scope: &Env,
    ) -> Result<(), Control> {
        let supplied_optional = args
            .len()
            .saturating_sub(params.required.len())
            .min(params.optional.len());
        let mut args = args.into_iter();
        for name in &params.required {
            scope.declare(name, args.next().unwrap_or_default());
        }
        for (index, (name, default)) in params.optional.iter().enumerate() {
            let value = if index < supplied_optional {
                args.next().unwrap_or_default()
            } else {
                self.evaluate(default, scope)?
            };
            scope.declare(name, value);
        }
        if let Some(rest) = &params.rest {
            scope.declare(rest, Value::array(args.collect()));
        }
        if let Some(name) = &params.block {
            scope.declare(name, block.map(Value::Proc).unwrap_or_default());
        }
        Ok(())
    }

    /// Instance-variable store of `value`; immediates get a throwaway one.
    pub(super) fn ivars_of(&self, value: &Value) -> Env {
        match value {
            Value::Object(instance) => instance.ivars.clone(),
            Value::Class(id) => self.registry.class(*id).ivars.clone(),
            _ => Env::store(),
        }
    }
}

/// A `break` out of a literal block ends the call it was attached to.
fn catch_break(result: EvalResult, literal: Option<u64>) -> EvalResult {
    match (result, literal) {
        (Err(Control::Break { tag, value }), Some(id)) if tag == id => Ok(value),
        (result, _) => result,
    }
}
