//! `def`, `class`, `module`, `class << obj` and `alias`.

use std::rc::Rc;

use super::Interpreter;
use crate::ast::{MethodDef, Node};
use crate::runtime::class::ClassId;
use crate::runtime::context::{CallFlags, Runtime};
use crate::runtime::environment::{Activation, Env};
use crate::runtime::error::{Control, EvalResult, Exception};
use crate::runtime::method::{Arity, Method, MethodBody, Visibility};
use crate::runtime::value::Value;

// Always private, whatever the surrounding default
const PRIVATE_HOOKS: [&str; 4] = ["initialize", "initialize_copy", "method_missing", "respond_to_missing?"];

impl Interpreter {
    /// `def name` defines on the current definee with the current default
    /// visibility; `def target.name` defines a singleton method.
    pub(super) fn eval_def(&mut self, def: &Rc<MethodDef>, env: &Env) -> EvalResult {
        let method = Method::new(
            &def.name,
            Arity::from_params(&def.params),
            MethodBody::User {
                def: def.clone(),
                env: env.clone(),
                file: self.file.clone(),
            },
        );
        match &def.singleton {
            Some(target) => {
                let target = self.evaluate(target, env)?;
                self.registry.add_singleton_method(&target, method)?;
            }
            None => {
                let activation = env
                    .activation()
                    .ok_or_else(|| Exception::internal("def without an enclosing activation"))?;
                let visibility = if PRIVATE_HOOKS.contains(&def.name.as_str()) {
                    Visibility::Private
                } else {
                    activation.visibility()
                };
                self.registry
                    .define_method(activation.definee, method.with_visibility(visibility));
            }
        }
        Ok(Value::symbol(&def.name))
    }

    /// `class Name < Super`: reopens an existing class or creates one, then
    /// runs the body with the class as `self`.
    pub(super) fn eval_class(
        &mut self,
        scope: Option<&Node>,
        name: &str,
        superclass: Option<&Node>,
        body: &Node,
        env: &Env,
    ) -> EvalResult {
        let holder = self.definition_holder(scope, env)?;
        let superclass = match superclass {
            Some(node) => match self.evaluate(node, env)? {
                Value::Class(id) if !self.registry.is_module(id) => Some(id),
                other => {
                    let class = self.registry.name_of(self.registry.class_of(&other));
                    return Err(Exception::type_error(format!(
                        "superclass must be an instance of Class (given an instance of {})",
                        class
                    ))
                    .into());
                }
            },
            None => None,
        };

        let class = match holder.get_own(name) {
            Some(Value::Class(id)) if !self.registry.is_module(id) => {
                if let Some(requested) = superclass {
                    if self.registry.class(id).superclass != Some(requested) {
                        return Err(Exception::type_error(format!("superclass mismatch for class {}", name)).into());
                    }
                }
                id
            }
            Some(_) => return Err(Exception::type_error(format!("{} is not a class", name)).into()),
            None => {
                let parent = superclass.unwrap_or(self.registry.core().object);
                let qualified = self.qualified_name(&holder, name);
                let id = self.registry.define_class(Some(&qualified), parent, &holder);
                holder.set_own(name, Value::Class(id));
                self.send_from(
                    env,
                    Value::Class(parent),
                    "inherited",
                    vec![Value::Class(id)],
                    None,
                    CallFlags::SELF,
                )?;
                id
            }
        };
        self.eval_class_body(class, body)
    }

    pub(super) fn eval_module(&mut self, scope: Option<&Node>, name: &str, body: &Node, env: &Env) -> EvalResult {
        let holder = self.definition_holder(scope, env)?;
        let module = match holder.get_own(name) {
            Some(Value::Class(id)) if self.registry.is_module(id) => id,
            Some(_) => return Err(Exception::type_error(format!("{} is not a module", name)).into()),
            None => {
                let qualified = self.qualified_name(&holder, name);
                let id = self.registry.define_module(Some(&qualified), &holder);
                holder.set_own(name, Value::Class(id));
                id
            }
        };
        self.eval_class_body(module, body)
    }

    /// `class << target`: the body runs inside the target's singleton class.
    pub(super) fn eval_singleton_class(&mut self, target: &Node, body: &Node, env: &Env) -> EvalResult {
        let target = self.evaluate(target, env)?;
        let class = self.registry.singleton_class_of(&target)?;
        self.eval_class_body(class, body)
    }

    // Where `class Name` looks for and binds `Name`
    fn definition_holder(&mut self, scope: Option<&Node>, env: &Env) -> Result<Env, Control> {
        match scope {
            Some(scope) => match self.evaluate(scope, env)? {
                Value::Class(id) => Ok(self.registry.class(id).constants.clone()),
                _ => Err(Exception::type_error("not a class/module").into()),
            },
            None => Ok(env.constant_scope()),
        }
    }

    /// Runs a class or module body: a guarded scope over the class's
    /// constant table, with the class as `self` and definee.
    pub(super) fn eval_class_body(&mut self, class: ClassId, body: &Node) -> EvalResult {
        let data = self.registry.class(class);
        let constants = data.constants.clone();
        let ivars = data.ivars.clone();
        let activation = Activation::new(self.next_id(), Value::Class(class), ivars, class);
        let scope = constants.guard(Some(Rc::new(activation)));
        self.breaks.push(0);
        let result = self.evaluate(body, &scope);
        self.breaks.pop();
        result
    }

    /// `alias new old` within the current definee.
    pub(super) fn eval_alias(&mut self, new_name: &str, old_name: &str, env: &Env) -> EvalResult {
        let class = env
            .activation()
            .map(|activation| activation.definee)
            .unwrap_or(self.registry.core().object);
        self.registry.alias_method(class, new_name, old_name)?;
        Ok(Value::Nil)
    }
}
