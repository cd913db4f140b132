//! Loops, `case`, `begin`/`rescue`/`ensure` and `defined?`.

use super::{Interpreter, splat_values};
use crate::ast::{BeginBlock, Expr, Node, Target, WhenClause};
use crate::runtime::context::{CallFlags, Runtime};
use crate::runtime::environment::Env;
use crate::runtime::error::{Control, EvalResult, Exception, ExceptionKind};
use crate::runtime::method::Visibility;
use crate::runtime::value::Value;

impl Interpreter {
    pub(super) fn eval_while(
        &mut self,
        cond: &Node,
        body: &Node,
        until: bool,
        do_while: bool,
        env: &Env,
    ) -> EvalResult {
        let id = self.next_id();
        self.breaks.push(id);
        let result = self.run_while(id, cond, body, until, do_while, env);
        self.breaks.pop();
        result
    }

    fn run_while(&mut self, id: u64, cond: &Node, body: &Node, until: bool, do_while: bool, env: &Env) -> EvalResult {
        let mut first = do_while;
        loop {
            if !first && self.evaluate(cond, env)?.truthy() == until {
                return Ok(Value::Nil);
            }
            first = false;
            match self.evaluate(body, env) {
                Ok(_) | Err(Control::Next(_)) => {}
                Err(Control::Break { tag, value }) if tag == id => return Ok(value),
                Err(control) => return Err(control),
            }
        }
    }

    /// `for x in items`: the variable and body share the enclosing scope.
    pub(super) fn eval_for(&mut self, var: &Target, iterable: &Node, body: &Node, env: &Env) -> EvalResult {
        let collection = self.evaluate(iterable, env)?;
        let items = match &collection {
            Value::Array(items) => items.borrow().clone(),
            Value::Hash(_) => splat_values(collection.clone()),
            other => {
                let array = self.send_from(env, other.clone(), "to_a", Vec::new(), None, CallFlags::PUBLIC)?;
                splat_values(array)
            }
        };
        let id = self.next_id();
        self.breaks.push(id);
        let result = self.run_for(id, var, &items, body, env);
        self.breaks.pop();
        result.map(|broke| broke.unwrap_or(collection))
    }

    fn run_for(&mut self, id: u64, var: &Target, items: &[Value], body: &Node, env: &Env) -> Result<Option<Value>, Control> {
        for item in items {
            self.assign(var, item.clone(), env)?;
            match self.evaluate(body, env) {
                Ok(_) | Err(Control::Next(_)) => {}
                Err(Control::Break { tag, value }) if tag == id => return Ok(Some(value)),
                Err(control) => return Err(control),
            }
        }
        Ok(None)
    }

    /// `case` compares with `pattern === subject`; a bare `case` tests each
    /// pattern for truthiness.
    pub(super) fn eval_case(
        &mut self,
        subject: Option<&Node>,
        whens: &[WhenClause],
        else_branch: Option<&Node>,
        env: &Env,
    ) -> EvalResult {
        let subject = match subject {
            Some(node) => Some(self.evaluate(node, env)?),
            None => None,
        };
        for clause in whens {
            let patterns = self.eval_list(&clause.patterns, env)?;
            for pattern in patterns {
                let matched = match &subject {
                    Some(subject) => self
                        .send_from(env, pattern, "===", vec![subject.clone()], None, CallFlags::PUBLIC)?
                        .truthy(),
                    None => pattern.truthy(),
                };
                if matched {
                    return self.evaluate(&clause.body, env);
                }
            }
        }
        match else_branch {
            Some(node) => self.evaluate(node, env),
            None => Ok(Value::Nil),
        }
    }

    pub(super) fn eval_begin(&mut self, block: &BeginBlock, env: &Env) -> EvalResult {
        let result = loop {
            let outcome = match self.evaluate(&block.body, env) {
                Err(Control::Raise(exception)) if !block.rescues.is_empty() => {
                    match self.rescue(block, exception, env) {
                        Err(Control::Retry) => continue,
                        other => other,
                    }
                }
                Ok(value) => match &block.else_branch {
                    Some(else_branch) => self.evaluate(else_branch, env),
                    None => Ok(value),
                },
                other => other,
            };
            break outcome;
        };
        match &block.ensure {
            Some(ensure) => {
                self.evaluate(ensure, env)?;
                result
            }
            None => result,
        }
    }

    fn rescue(&mut self, block: &BeginBlock, mut exception: Box<Exception>, env: &Env) -> EvalResult {
        let raised = self.registry.exception_class_of(&exception);
        for clause in &block.rescues {
            let matched = if clause.classes.is_empty() {
                let standard = self.registry.core().exception(ExceptionKind::StandardError);
                self.registry.is_subclass(raised, standard)
            } else {
                let mut matched = false;
                for class in self.eval_list(&clause.classes, env)? {
                    let Value::Class(id) = class else {
                        return Err(Exception::type_error("class or module required for rescue clause").into());
                    };
                    if self.registry.is_subclass(raised, id) {
                        matched = true;
                        break;
                    }
                }
                matched
            };
            if matched {
                let object = self.exception_object(&mut exception);
                env.set_global("$!", object.clone());
                if let Some(var) = &clause.var {
                    self.assign(var, object, env)?;
                }
                return self.evaluate(&clause.body, env);
            }
        }
        Err(Control::Raise(exception))
    }

    /// What `defined?(node)` reports, without raising.
    pub(super) fn defined(&mut self, node: &Node, env: &Env) -> Option<&'static str> {
        match &node.expr {
            Expr::Nil => Some("expression"),
            Expr::True | Expr::False => Some("expression"),
            Expr::SelfRef => Some("self"),
            Expr::LocalVar(_) => Some("local-variable"),
            Expr::InstanceVar(name) => env.get(name).map(|_| "instance-variable"),
            Expr::GlobalVar(name) => env.get(name).map(|_| "global-variable"),
            Expr::Const { scope, name } => self
                .lookup_constant(scope.as_deref(), name, env)
                .ok()
                .map(|_| "constant"),
            Expr::Assign { .. } | Expr::OpAssign { .. } | Expr::MultiAssign { .. } => Some("assignment"),
            Expr::Yield(_) => env
                .activation()
                .and_then(|activation| activation.block.clone())
                .map(|_| "yield"),
            Expr::Super { .. } => {
                let activation = env.activation()?;
                let frame = activation.frame.clone()?;
                let class = self.registry.dispatch_class(&activation.receiver);
                self.registry
                    .find_super_method(class, frame.owner, &frame.name)
                    .map(|_| "super")
            }
            Expr::Call(call) => {
                let (receiver, self_call) = match &call.receiver {
                    None => (self.self_value(env), true),
                    Some(receiver) => {
                        self.defined(receiver, env)?;
                        (self.evaluate(receiver, env).ok()?, matches!(receiver.expr, Expr::SelfRef))
                    }
                };
                let class = self.registry.dispatch_class(&receiver);
                let method = self.registry.find_method(class, &call.name)?;
                (self_call || method.visibility == Visibility::Public).then_some("method")
            }
            _ => Some("expression"),
        }
    }
}
