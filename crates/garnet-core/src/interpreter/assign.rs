//! Assignment targets and constant resolution.

use super::{Interpreter, splat_values};
use crate::ast::{Expr, Node, Target};
use crate::runtime::class::ClassId;
use crate::runtime::context::{CallContext, CallFlags, Runtime};
use crate::runtime::environment::Env;
use crate::runtime::error::{Control, EvalResult, Exception, ExceptionKind};
use crate::runtime::value::Value;

impl Interpreter {
    pub(super) fn assign(&mut self, target: &Target, value: Value, env: &Env) -> Result<(), Control> {
        match target {
            Target::Local(name) | Target::Instance(name) => {
                env.set(name, value);
            }
            Target::Global(name) => {
                env.set_global(name, value);
            }
            Target::Constant { scope: None, name } => {
                let holder = env.constant_scope();
                self.name_class(&value, &holder, name);
                holder.set_own(name, value);
            }
            Target::Constant { scope: Some(scope), name } => {
                let owner = self.scope_class(scope, env)?;
                let holder = self.registry.class(owner).constants.clone();
                self.name_class(&value, &holder, name);
                holder.set_own(name, value);
            }
            Target::Attribute { receiver, name } => {
                let (receiver, flags) = self.eval_receiver(receiver, env)?;
                self.send_from(env, receiver, &format!("{}=", name), vec![value], None, flags)?;
            }
            Target::Index { receiver, args } => {
                let (receiver, flags) = self.eval_receiver(receiver, env)?;
                let mut args = self.eval_list(args, env)?;
                args.push(value);
                self.send_from(env, receiver, "[]=", args, None, flags)?;
            }
            Target::Splat(inner) => self.assign(inner, Value::array(splat_values(value)), env)?,
        }
        Ok(())
    }

    fn eval_receiver(&mut self, receiver: &Node, env: &Env) -> Result<(Value, CallFlags), Control> {
        let flags = if matches!(receiver.expr, Expr::SelfRef) {
            CallFlags::SELF
        } else {
            CallFlags::PUBLIC
        };
        Ok((self.evaluate(receiver, env)?, flags))
    }

    // An anonymous class takes the name of the first constant it is bound to
    fn name_class(&mut self, value: &Value, holder: &Env, name: &str) {
        if let Value::Class(id) = value {
            let qualified = self.qualified_name(holder, name);
            self.registry.assign_name(*id, &qualified);
        }
    }

    /// `Outer::Name` for a constant defined in the body of `Outer`.
    pub(super) fn qualified_name(&self, holder: &Env, name: &str) -> String {
        match holder.cref() {
            Some(outer) if outer != self.registry.core().object => {
                format!("{}::{}", self.registry.name_of(outer), name)
            }
            _ => name.to_string(),
        }
    }

    /// `x op= value`. `||=` and `&&=` only evaluate the right-hand side when
    /// needed; receivers and index arguments are evaluated once.
    pub(super) fn eval_op_assign(&mut self, target: &Target, op: &str, value: &Node, env: &Env) -> EvalResult {
        match target {
            Target::Attribute { receiver, name } => {
                let (receiver, flags) = self.eval_receiver(receiver, env)?;
                let current = self.send_from(env, receiver.clone(), name, Vec::new(), None, flags)?;
                match self.combine(current.clone(), op, value, env)? {
                    Some(updated) => {
                        let setter = format!("{}=", name);
                        self.send_from(env, receiver, &setter, vec![updated.clone()], None, flags)?;
                        Ok(updated)
                    }
                    None => Ok(current),
                }
            }
            Target::Index { receiver, args } => {
                let (receiver, flags) = self.eval_receiver(receiver, env)?;
                let args = self.eval_list(args, env)?;
                let current = self.send_from(env, receiver.clone(), "[]", args.clone(), None, flags)?;
                match self.combine(current.clone(), op, value, env)? {
                    Some(updated) => {
                        let mut args = args;
                        args.push(updated.clone());
                        self.send_from(env, receiver, "[]=", args, None, flags)?;
                        Ok(updated)
                    }
                    None => Ok(current),
                }
            }
            _ => {
                let current = self.read_target(target, env)?;
                match self.combine(current.clone(), op, value, env)? {
                    Some(updated) => {
                        self.assign(target, updated.clone(), env)?;
                        Ok(updated)
                    }
                    None => Ok(current),
                }
            }
        }
    }

    fn combine(&mut self, current: Value, op: &str, value: &Node, env: &Env) -> Result<Option<Value>, Control> {
        match op {
            "||" if current.truthy() => Ok(None),
            "&&" if !current.truthy() => Ok(None),
            "||" | "&&" => Ok(Some(self.evaluate(value, env)?)),
            _ => {
                let rhs = self.evaluate(value, env)?;
                Ok(Some(self.send_from(env, current, op, vec![rhs], None, CallFlags::PUBLIC)?))
            }
        }
    }

    fn read_target(&mut self, target: &Target, env: &Env) -> EvalResult {
        match target {
            Target::Local(name) | Target::Instance(name) | Target::Global(name) => Ok(env.get(name).unwrap_or_default()),
            Target::Constant { scope, name } => match self.lookup_constant(scope.as_deref(), name, env) {
                Ok(value) => Ok(value),
                Err(Control::Raise(exception)) if exception.kind == ExceptionKind::NameError => {
                    Ok(Value::Nil)
                }
                Err(control) => Err(control),
            },
            _ => Err(Exception::internal("unsupported compound assignment target").into()),
        }
    }

    /// `a, b = ...`: a single array value is destructured; `*rest` takes
    /// whatever the other targets leave over.
    pub(super) fn eval_multi_assign(&mut self, targets: &[Target], value: &Node, env: &Env) -> EvalResult {
        let (values, result) = match &value.expr {
            Expr::Array(items) => {
                let values = self.eval_list(items, env)?;
                (values.clone(), Value::array(values))
            }
            _ => {
                let value = self.evaluate(value, env)?;
                let values = match &value {
                    Value::Array(items) => items.borrow().clone(),
                    other => vec![other.clone()],
                };
                (values, value)
            }
        };

        let splat = targets.iter().position(|t| matches!(t, Target::Splat(_)));
        let after = splat.map_or(0, |index| targets.len() - index - 1);
        let mut values = values.into_iter();
        for (index, target) in targets.iter().enumerate() {
            match (splat, target) {
                (Some(at), Target::Splat(inner)) if at == index => {
                    let take = values.len().saturating_sub(after);
                    let rest: Vec<Value> = values.by_ref().take(take).collect();
                    self.assign(inner, Value::array(rest), env)?;
                }
                _ => self.assign(target, values.next().unwrap_or_default(), env)?,
            }
        }
        Ok(result)
    }

    /// Resolves `Name` lexically, then through the ancestors of the
    /// innermost class body; `Scope::Name` only looks inside `Scope`.
    pub(super) fn lookup_constant(&mut self, scope: Option<&Node>, name: &str, env: &Env) -> EvalResult {
        match scope {
            Some(scope) => {
                let owner = self.scope_class(scope, env)?;
                self.registry.lookup_constant(owner, name).ok_or_else(|| {
                    Exception::uninitialized_constant(&format!("{}::{}", self.registry.name_of(owner), name)).into()
                })
            }
            None => {
                if let Some(value) = env.get(name) {
                    return Ok(value);
                }
                env.cref()
                    .and_then(|cref| self.registry.lookup_constant(cref, name))
                    .ok_or_else(|| Exception::uninitialized_constant(name).into())
            }
        }
    }

    fn scope_class(&mut self, scope: &Node, env: &Env) -> Result<ClassId, Control> {
        match self.evaluate(scope, env)? {
            Value::Class(id) => Ok(id),
            other => {
                let caller = self.self_value(env);
                let shown = CallContext::new(self, env.clone(), caller).describe(&other);
                Err(Exception::type_error(format!("{} is not a class/module", shown)).into())
            }
        }
    }
}
