//! Call contexts and method dispatch.
//!
//! A [`CallContext`] bundles the caller's environment, the current receiver
//! and the [`Runtime`] used to evaluate sub-trees. It is the only way to
//! dispatch a method: [`CallContext::dispatch`] walks the receiver's
//! ancestry, enforces visibility, and falls back to `method_missing`.

use std::io::Write;
use std::rc::Rc;

use tracing::trace;

use super::class::{ClassId, CoreClasses, Registry};
use super::environment::Env;
use super::error::{Control, EvalResult, Exception, ExceptionKind};
use super::method::{Method, MethodBody, MethodFrame, Visibility};
use super::proc::Proc;
use super::stack::CallStack;
use super::value::Value;
use crate::ast::{MethodDef, Node};

/// `self` for a closure run as a method body (`define_method`) or as a
/// class body (`Class.new { ... }`).
#[derive(Debug, Clone)]
pub struct SelfBinding {
    /// The receiver
    pub receiver: Value,
    /// Where `def` inside the closure defines methods
    pub definee: ClassId,
    /// The method being run, if any
    pub frame: Option<MethodFrame>,
}

/// A `def` about to run.
pub struct UserCall<'m> {
    /// The definition
    pub def: &'m Rc<MethodDef>,
    /// Lexical scope of the definition
    pub env: &'m Env,
    /// Name and owner of the method
    pub frame: MethodFrame,
    /// `self`
    pub receiver: Value,
    /// Arguments, already arity-checked
    pub args: Vec<Value>,
    /// Attached block
    pub block: Option<Rc<Proc>>,
}

/// The evaluator as seen by the object model.
pub trait Runtime {
    /// Evaluates `node` in `env`.
    fn evaluate(&mut self, node: &Node, env: &Env) -> EvalResult;

    /// The class registry.
    fn registry(&self) -> &Registry;

    /// The class registry, mutably.
    fn registry_mut(&mut self) -> &mut Registry;

    /// The call-stack tracker.
    fn call_stack(&mut self) -> &mut CallStack;

    /// The top-level environment.
    fn root_env(&self) -> Env;

    /// Where `puts` and friends write.
    fn output(&mut self) -> &mut dyn Write;

    /// Runs a `def` body in a fresh guarded scope.
    fn invoke_user(&mut self, call: UserCall<'_>) -> EvalResult;

    /// Runs a closure.
    fn call_proc(
        &mut self,
        proc: &Rc<Proc>,
        args: Vec<Value>,
        block: Option<Rc<Proc>>,
        binding: Option<SelfBinding>,
    ) -> EvalResult;

    /// `require` / `require_relative`.
    fn load_feature(&mut self, feature: &str, relative: bool) -> EvalResult;

    /// A fresh id for activations and loops.
    fn next_id(&mut self) -> u64;
}

/// How a call was written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallFlags {
    /// No explicit receiver, or `self.`; private methods are allowed
    pub self_call: bool,
    /// A bare identifier that could have been a local variable
    pub vcall: bool,
}

impl CallFlags {
    /// An explicit-receiver call.
    pub const PUBLIC: CallFlags = CallFlags {
        self_call: false,
        vcall: false,
    };

    /// An implicit-self call.
    pub const SELF: CallFlags = CallFlags {
        self_call: true,
        vcall: false,
    };
}

/// Per-call bundle of runtime, environment and receiver.
pub struct CallContext<'a> {
    /// The evaluator
    pub runtime: &'a mut dyn Runtime,
    /// The caller's environment
    pub env: Env,
    /// `self` of the running native method
    pub receiver: Value,
    /// Block passed to the running native method
    pub block: Option<Rc<Proc>>,
    /// Line of the call site
    pub line: u32,
    /// The running call was a bare identifier
    pub vcall: bool,
}

impl<'a> CallContext<'a> {
    /// Creates a context for dispatching from `env` with `receiver` as self.
    pub fn new(runtime: &'a mut dyn Runtime, env: Env, receiver: Value) -> Self {
        Self {
            runtime,
            env,
            receiver,
            block: None,
            line: 0,
            vcall: false,
        }
    }

    /// Sets the call-site line.
    pub fn at_line(mut self, line: u32) -> Self {
        self.line = line;
        self
    }

    /// The class registry.
    pub fn registry(&self) -> &Registry {
        self.runtime.registry()
    }

    /// The class registry, mutably.
    pub fn registry_mut(&mut self) -> &mut Registry {
        self.runtime.registry_mut()
    }

    /// Core class ids.
    pub fn core(&self) -> CoreClasses {
        *self.runtime.registry().core()
    }

    /// Name of `value.class`.
    pub fn class_name(&self, value: &Value) -> String {
        let registry = self.registry();
        registry.name_of(registry.class_of(value))
    }

    /// Calls a public method with an explicit receiver.
    pub fn send(&mut self, receiver: &Value, name: &str, args: Vec<Value>) -> EvalResult {
        self.dispatch(receiver.clone(), name, args, None, CallFlags::PUBLIC)
    }

    /// Calls a public method with a block.
    pub fn send_with_block(
        &mut self,
        receiver: &Value,
        name: &str,
        args: Vec<Value>,
        block: Option<Rc<Proc>>,
    ) -> EvalResult {
        self.dispatch(receiver.clone(), name, args, block, CallFlags::PUBLIC)
    }

    /// Calls a method regardless of visibility.
    pub fn funcall(&mut self, receiver: &Value, name: &str, args: Vec<Value>) -> EvalResult {
        self.dispatch(receiver.clone(), name, args, None, CallFlags::SELF)
    }

    /// Resolves `name` along the receiver's ancestry and invokes it.
    pub fn dispatch(
        &mut self,
        receiver: Value,
        name: &str,
        args: Vec<Value>,
        block: Option<Rc<Proc>>,
        flags: CallFlags,
    ) -> EvalResult {
        let class = self.registry().dispatch_class(&receiver);
        trace!(method = name, args = args.len(), "dispatch");
        if let Some(method) = self.registry().find_method(class, name) {
            self.check_visibility(&method, &receiver, flags)?;
            return self.invoke(&method, receiver, args, block, flags.vcall);
        }
        match self.registry().find_method(class, "method_missing") {
            Some(missing) => {
                let mut forwarded = Vec::with_capacity(args.len() + 1);
                forwarded.push(Value::symbol(name));
                forwarded.extend(args);
                self.invoke(&missing, receiver, forwarded, block, flags.vcall)
            }
            None => Err(Exception::no_method(name, &self.describe(&receiver)).into()),
        }
    }

    fn check_visibility(&mut self, method: &Method, receiver: &Value, flags: CallFlags) -> Result<(), Control> {
        let allowed = match method.visibility {
            Visibility::Public => true,
            Visibility::Private => flags.self_call,
            Visibility::Protected => flags.self_call || self.caller_is_kind_of(method.owner),
        };
        if allowed {
            return Ok(());
        }
        let shown = self.describe(receiver);
        let exception = match method.visibility {
            Visibility::Protected => Exception::protected_method(&method.name, &shown),
            _ => Exception::private_method(&method.name, &shown),
        };
        Err(exception.into())
    }

    // Protected methods need the caller's self to share the owner's lineage;
    // with no caller self at all, the call is refused.
    fn caller_is_kind_of(&self, owner: ClassId) -> bool {
        let registry = self.registry();
        let owner = registry.real_class(owner);
        self.env
            .activation()
            .is_some_and(|activation| registry.is_a(&activation.receiver, owner))
    }

    /// Runs a resolved method after checking its arity.
    pub fn invoke(
        &mut self,
        method: &Method,
        receiver: Value,
        args: Vec<Value>,
        block: Option<Rc<Proc>>,
        vcall: bool,
    ) -> EvalResult {
        let (file, line) = match &method.body {
            MethodBody::User { def, file, .. } => (file.clone(), def.body.pos.line),
            _ => {
                let stack = self.runtime.call_stack();
                (stack.current().file.clone(), self.line)
            }
        };
        let stack = self.runtime.call_stack();
        if let Err(mut exception) = stack.push(method.name.clone(), file, line) {
            exception.backtrace = stack.backtrace();
            return Err(exception.into());
        }
        let result = match method.arity.check(args.len()) {
            Ok(()) => self.run_body(method, receiver, args, block, vcall),
            Err(exception) => Err(exception.into()),
        };
        let stack = self.runtime.call_stack();
        let result = match result {
            Err(Control::Raise(mut exception)) if exception.backtrace.is_empty() => {
                exception.backtrace = stack.backtrace();
                Err(Control::Raise(exception))
            }
            other => other,
        };
        stack.pop();
        result
    }

    fn run_body(
        &mut self,
        method: &Method,
        receiver: Value,
        args: Vec<Value>,
        block: Option<Rc<Proc>>,
        vcall: bool,
    ) -> EvalResult {
        let frame = MethodFrame {
            name: method.name.clone(),
            owner: method.owner,
        };
        match &method.body {
            MethodBody::Native(func) => {
                let mut ctx = CallContext {
                    runtime: &mut *self.runtime,
                    env: self.env.clone(),
                    receiver,
                    block,
                    line: self.line,
                    vcall,
                };
                func(&mut ctx, args)
            }
            MethodBody::User { def, env, .. } => self.runtime.invoke_user(UserCall {
                def,
                env,
                frame,
                receiver,
                args,
                block,
            }),
            MethodBody::Proc(proc) => {
                let binding = SelfBinding {
                    receiver,
                    definee: method.owner,
                    frame: Some(frame),
                };
                self.runtime.call_proc(proc, args, block, Some(binding))
            }
            MethodBody::AttrReader(ivar) => Ok(self
                .ivars_of(&receiver)
                .and_then(|ivars| ivars.get_own(ivar))
                .unwrap_or_default()),
            MethodBody::AttrWriter(ivar) => {
                let value = args.into_iter().next().unwrap_or_default();
                match self.ivars_of(&receiver) {
                    Some(ivars) => ivars.set_own(ivar, value.clone()),
                    None => {
                        return Err(Exception::new(
                            ExceptionKind::RuntimeError,
                            format!("can't modify frozen {}", self.class_name(&receiver)),
                        )
                        .into());
                    }
                }
                Ok(value)
            }
        }
    }

    /// Instance-variable store of a value, if it can have one.
    pub fn ivars_of(&self, value: &Value) -> Option<Env> {
        match value {
            Value::Object(instance) => Some(instance.ivars.clone()),
            Value::Class(id) => Some(self.registry().class(*id).ivars.clone()),
            _ => None,
        }
    }

    /// Calls a closure.
    pub fn call_proc(&mut self, proc: &Rc<Proc>, args: Vec<Value>) -> EvalResult {
        self.runtime.call_proc(proc, args, None, None)
    }

    /// Calls the block passed to the running method.
    pub fn yield_block(&mut self, args: Vec<Value>) -> EvalResult {
        let block = self.block.clone().ok_or_else(Exception::no_block)?;
        self.call_proc(&block, args)
    }

    /// The attached block, or `LocalJumpError`.
    pub fn expect_block(&self) -> Result<Rc<Proc>, Control> {
        self.block.clone().ok_or_else(|| Exception::no_block().into())
    }

    /// `value.inspect` as a Rust string.
    pub fn inspect(&mut self, value: &Value) -> Result<String, Control> {
        let shown = self.funcall(value, "inspect", Vec::new())?;
        Ok(shown.as_text().unwrap_or_else(|| self.default_to_s(value)))
    }

    /// `value.to_s` as a Rust string.
    pub fn to_s(&mut self, value: &Value) -> Result<String, Control> {
        if let Value::String(s) = value {
            return Ok(s.borrow().clone());
        }
        let shown = self.funcall(value, "to_s", Vec::new())?;
        match shown {
            Value::String(s) => Ok(s.borrow().clone()),
            _ => Ok(self.default_to_s(value)),
        }
    }

    /// `#<ClassName>`.
    pub fn default_to_s(&self, value: &Value) -> String {
        format!("#<{}>", self.class_name(value))
    }

    /// An inspected form for error messages; never fails.
    pub fn describe(&mut self, value: &Value) -> String {
        let class = self.registry().dispatch_class(value);
        if self.registry().find_method(class, "inspect").is_none() {
            return self.default_to_s(value);
        }
        self.inspect(value).unwrap_or_else(|_| self.default_to_s(value))
    }

    /// Calls `name` and reports truthiness.
    pub fn test(&mut self, receiver: &Value, name: &str, args: Vec<Value>) -> Result<bool, Control> {
        Ok(self.send(receiver, name, args)?.truthy())
    }

    /// Writes program output.
    pub fn write(&mut self, text: &str) -> Result<(), Control> {
        self.runtime
            .output()
            .write_all(text.as_bytes())
            .map_err(|e| Exception::internal(format!("write failed: {}", e)).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::environment::Activation;
    use crate::runtime::method::Arity;
    use crate::runtime::proc::ProcBody;
    use crate::runtime::value::Instance;

    struct TestRuntime {
        registry: Registry,
        root: Env,
        stack: CallStack,
        out: Vec<u8>,
        ids: u64,
    }

    impl TestRuntime {
        fn new() -> Self {
            let root = Env::root(Activation::new(0, Value::Nil, Env::store(), ClassId::new(1)));
            let registry = Registry::new(&root);
            Self {
                registry,
                root,
                stack: CallStack::new("test.rb", 50),
                out: Vec::new(),
                ids: 0,
            }
        }
    }

    impl Runtime for TestRuntime {
        fn evaluate(&mut self, _node: &Node, _env: &Env) -> EvalResult {
            Ok(Value::Nil)
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
            &mut self.out
        }
        fn invoke_user(&mut self, _call: UserCall<'_>) -> EvalResult {
            Ok(Value::Nil)
        }
        fn call_proc(
            &mut self,
            proc: &Rc<Proc>,
            args: Vec<Value>,
            _block: Option<Rc<Proc>>,
            _binding: Option<SelfBinding>,
        ) -> EvalResult {
            match &proc.body {
                ProcBody::Native { func, .. } => {
                    let func = func.clone();
                    let root = self.root.clone();
                    func(&mut CallContext::new(self, root, Value::Nil), proc.adapt_args(args))
                }
                ProcBody::Block { .. } => Ok(Value::Nil),
            }
        }
        fn load_feature(&mut self, feature: &str, _relative: bool) -> EvalResult {
            Err(Exception::load_error(feature).into())
        }
        fn next_id(&mut self) -> u64 {
            self.ids += 1;
            self.ids
        }
    }

    fn answer(_ctx: &mut CallContext<'_>, _args: Vec<Value>) -> EvalResult {
        Ok(Value::Integer(42))
    }

    fn add(_ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
        let sum: i64 = args.iter().filter_map(Value::as_integer).sum();
        Ok(Value::Integer(sum))
    }

    fn echo_missing(_ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult {
        Ok(args.into_iter().next().unwrap_or_default())
    }

    fn foo_instance(runtime: &mut TestRuntime) -> (ClassId, Value) {
        let object = runtime.registry.core().object;
        let root = runtime.root.clone();
        let foo = runtime.registry.define_class(Some("Foo"), object, &root);
        (foo, Value::Object(Instance::new(foo)))
    }

    fn exception_of(result: EvalResult) -> Exception {
        match result {
            Err(Control::Raise(exception)) => *exception,
            other => panic!("expected an exception, got {:?}", other),
        }
    }

    #[test]
    fn test_private_method_needs_implicit_receiver() {
        let mut runtime = TestRuntime::new();
        let (foo, obj) = foo_instance(&mut runtime);
        runtime
            .registry
            .define_method(foo, Method::native("secret", Arity::Exact(0), answer).with_visibility(Visibility::Private));
        let root = runtime.root.clone();
        let mut ctx = CallContext::new(&mut runtime, root, obj.clone());

        let err = exception_of(ctx.send(&obj, "secret", vec![]));
        assert_eq!(err.kind, ExceptionKind::PrivateNoMethodError);
        assert!(err.message.contains("private method 'secret'"));

        let ok = ctx.dispatch(obj, "secret", vec![], None, CallFlags::SELF);
        assert_eq!(ok.unwrap(), Value::Integer(42));
    }

    #[test]
    fn test_protected_requires_related_caller() {
        let mut runtime = TestRuntime::new();
        let (foo, obj) = foo_instance(&mut runtime);
        runtime
            .registry
            .define_method(foo, Method::native("peek", Arity::Exact(0), answer).with_visibility(Visibility::Protected));

        let root = runtime.root.clone();
        let outsider = CallContext::new(&mut runtime, root.clone(), Value::Nil).send(&obj, "peek", vec![]);
        assert_eq!(exception_of(outsider).kind, ExceptionKind::PrivateNoMethodError);

        let sibling = Value::Object(Instance::new(foo));
        let inside = root.guard(Some(Rc::new(Activation::new(9, sibling, Env::store(), foo))));
        let result = CallContext::new(&mut runtime, inside, Value::Nil).send(&obj, "peek", vec![]);
        assert_eq!(result.unwrap(), Value::Integer(42));
    }

    #[test]
    fn test_missing_method_without_fallback() {
        let mut runtime = TestRuntime::new();
        let (_, obj) = foo_instance(&mut runtime);
        let root = runtime.root.clone();
        let err = exception_of(CallContext::new(&mut runtime, root, Value::Nil).send(&obj, "frobnicate", vec![]));
        assert_eq!(err.kind, ExceptionKind::NoMethodError);
        assert!(err.message.contains("frobnicate"));
        assert!(err.message.contains("#<Foo>"));
    }

    #[test]
    fn test_method_missing_receives_name() {
        let mut runtime = TestRuntime::new();
        let (foo, obj) = foo_instance(&mut runtime);
        runtime
            .registry
            .define_method(foo, Method::native("method_missing", Arity::ANY, echo_missing));
        let root = runtime.root.clone();
        let result = CallContext::new(&mut runtime, root, Value::Nil).send(&obj, "anything", vec![]);
        assert_eq!(result.unwrap(), Value::symbol("anything"));
    }

    #[test]
    fn test_arity_checked_before_call() {
        let mut runtime = TestRuntime::new();
        let (foo, obj) = foo_instance(&mut runtime);
        runtime.registry.define_method(foo, Method::native("add", Arity::Exact(2), add));
        let root = runtime.root.clone();
        let mut ctx = CallContext::new(&mut runtime, root, Value::Nil);

        let err = exception_of(ctx.send(&obj, "add", vec![Value::Integer(1)]));
        assert_eq!(err.kind, ExceptionKind::ArgumentError);
        assert_eq!(err.message, "wrong number of arguments (given 1, expected 2)");
        assert!(!err.backtrace.is_empty());

        let sum = ctx.send(&obj, "add", vec![Value::Integer(1), Value::Integer(2)]);
        assert_eq!(sum.unwrap(), Value::Integer(3));
        assert_eq!(ctx.runtime.call_stack().depth(), 1);
    }

    #[test]
    fn test_singleton_method_dispatch() {
        let mut runtime = TestRuntime::new();
        let (foo, first) = foo_instance(&mut runtime);
        let second = Value::Object(Instance::new(foo));
        runtime
            .registry
            .add_singleton_method(&first, Method::native("greet", Arity::Exact(0), answer))
            .unwrap();
        let root = runtime.root.clone();
        let mut ctx = CallContext::new(&mut runtime, root, Value::Nil);

        assert_eq!(ctx.send(&first, "greet", vec![]).unwrap(), Value::Integer(42));
        assert_eq!(exception_of(ctx.send(&second, "greet", vec![])).kind, ExceptionKind::NoMethodError);
    }

    #[test]
    fn test_attr_accessors() {
        let mut runtime = TestRuntime::new();
        let (foo, obj) = foo_instance(&mut runtime);
        runtime
            .registry
            .define_method(foo, Method::new("name", Arity::Exact(0), MethodBody::AttrReader(Rc::from("@name"))));
        runtime
            .registry
            .define_method(foo, Method::new("name=", Arity::Exact(1), MethodBody::AttrWriter(Rc::from("@name"))));
        let root = runtime.root.clone();
        let mut ctx = CallContext::new(&mut runtime, root, Value::Nil);

        assert_eq!(ctx.send(&obj, "name", vec![]).unwrap(), Value::Nil);
        ctx.send(&obj, "name=", vec![Value::string("garnet")]).unwrap();
        assert_eq!(ctx.send(&obj, "name", vec![]).unwrap(), Value::string("garnet"));
    }

    #[test]
    fn test_native_closure_and_yield() {
        let mut runtime = TestRuntime::new();
        let root = runtime.root.clone();
        let mut ctx = CallContext::new(&mut runtime, root, Value::Nil);
        assert!(exception_of(ctx.yield_block(vec![])).is_a(ExceptionKind::LocalJumpError));

        ctx.block = Some(Proc::native(Arity::Exact(1), |_ctx, args| {
            Ok(Value::Integer(args[0].as_integer().unwrap_or(0) * 2))
        }));
        assert_eq!(ctx.yield_block(vec![Value::Integer(21)]).unwrap(), Value::Integer(42));
    }
}
