//! Abstract Syntax Tree (AST) definitions for Ruby.
//!
//! Every node carries its source position and exposes a stable
//! [`kind`](Node::kind) plus its [`children`](Node::children) in a fixed
//! order, which is all the generic tree utilities in [`walk`] rely on.

use std::rc::Rc;

pub mod walk;

pub use walk::{Walk, path_to, structurally_equal};

/// A 1-based source position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    /// Line number
    pub line: u32,
    /// Column number
    pub column: u32,
}

impl Position {
    /// Creates a new position.
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// A positioned AST node.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// The expression this node holds
    pub expr: Expr,
    /// Where the node starts in the source
    pub pos: Position,
}

/// Every Ruby construct is an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `nil`
    Nil,
    /// `true`
    True,
    /// `false`
    False,
    /// `self`
    SelfRef,
    /// Integer literal
    Integer(i64),
    /// String literal without interpolation
    Str(String),
    /// Double-quoted string with `#{}` parts; text parts are `Str` nodes
    Interpolated(Vec<Node>),
    /// Symbol literal
    Symbol(String),
    /// Array literal; elements may be `Splat`
    Array(Vec<Node>),
    /// Hash literal as ordered key/value pairs
    Hash(Vec<(Node, Node)>),

    /// Local variable read
    LocalVar(String),
    /// Instance variable read (`@x`)
    InstanceVar(String),
    /// Global variable read (`$x`)
    GlobalVar(String),
    /// Constant read; `scope` is set for `Outer::Name`
    Const {
        /// Explicit scope, if any
        scope: Option<Box<Node>>,
        /// The constant name
        name: String,
    },

    /// Simple assignment
    Assign {
        /// What is assigned to
        target: Target,
        /// The assigned value
        value: Box<Node>,
    },
    /// Compound assignment (`+=`, `||=`, `&&=`, ...)
    OpAssign {
        /// What is assigned to
        target: Target,
        /// The binary operator, e.g. `+` or `||`
        op: String,
        /// The right-hand side
        value: Box<Node>,
    },
    /// `a, b = x, y`
    MultiAssign {
        /// Left-hand targets in order
        targets: Vec<Target>,
        /// A single value (array-destructured) or an `Array` of values
        value: Box<Node>,
    },

    /// Method call
    Call(Box<Call>),
    /// `*expr` inside an argument list or array literal
    Splat(Box<Node>),
    /// `super` / `super(...)`
    Super {
        /// `None` forwards the current method's arguments
        args: Option<Vec<Node>>,
        /// Attached block
        block: Option<BlockArg>,
    },
    /// `yield`
    Yield(Vec<Node>),

    /// `!x` / `not x`
    Not(Box<Node>),
    /// `a && b` / `a and b`
    And(Box<Node>, Box<Node>),
    /// `a || b` / `a or b`
    Or(Box<Node>, Box<Node>),
    /// `defined?(x)`
    Defined(Box<Node>),

    /// `if` / `unless` / ternary / modifier forms
    If {
        /// Condition
        cond: Box<Node>,
        /// Taken when truthy
        then_branch: Box<Node>,
        /// Taken when falsy
        else_branch: Option<Box<Node>>,
    },
    /// `while` / `until` loops
    While {
        /// Loop condition
        cond: Box<Node>,
        /// Loop body
        body: Box<Node>,
        /// `until` loops run while the condition is falsy
        until: bool,
        /// `begin ... end while cond` runs the body once before testing
        do_while: bool,
    },
    /// `for var in iterable`
    For {
        /// Loop variable
        var: Target,
        /// Receiver of `each`
        iterable: Box<Node>,
        /// Loop body
        body: Box<Node>,
    },
    /// `case` / `when`
    Case {
        /// Compared with `===`; absent for a bare `case`
        subject: Option<Box<Node>>,
        /// `when` clauses in order
        whens: Vec<WhenClause>,
        /// `else` branch
        else_branch: Option<Box<Node>>,
    },

    /// `def`
    Def(Rc<MethodDef>),
    /// `class Name < Super`
    ClassDef {
        /// Enclosing scope for `Outer::Name`
        scope: Option<Box<Node>>,
        /// Class name
        name: String,
        /// Superclass expression
        superclass: Option<Box<Node>>,
        /// Class body
        body: Box<Node>,
    },
    /// `class << obj`
    SingletonClass {
        /// Object whose singleton class is opened
        target: Box<Node>,
        /// Body evaluated with the singleton class as self
        body: Box<Node>,
    },
    /// `module Name`
    ModuleDef {
        /// Enclosing scope for `Outer::Name`
        scope: Option<Box<Node>>,
        /// Module name
        name: String,
        /// Module body
        body: Box<Node>,
    },
    /// `begin`/`rescue`/`else`/`ensure`, also used for method bodies
    Begin(Box<BeginBlock>),

    /// `return`
    Return(Option<Box<Node>>),
    /// `break`
    Break(Option<Box<Node>>),
    /// `next`
    Next(Option<Box<Node>>),
    /// `retry`
    Retry,
    /// `-> (params) { body }`
    Lambda(Rc<BlockLit>),
    /// `alias new old`
    Alias {
        /// New name
        new_name: String,
        /// Existing name
        old_name: String,
    },
    /// Statement sequence; evaluates to the last value
    Seq(Vec<Node>),
}

/// A method call.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    /// Explicit receiver; `None` means self
    pub receiver: Option<Node>,
    /// Method name
    pub name: String,
    /// Positional arguments (may contain `Splat`, trailing labels become a `Hash`)
    pub args: Vec<Node>,
    /// Block literal or `&blk` argument
    pub block: Option<BlockArg>,
    /// A bare identifier with no receiver, arguments or parentheses
    pub vcall: bool,
}

/// The block attached to a call.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockArg {
    /// `{ |x| ... }` or `do |x| ... end`
    Literal(Rc<BlockLit>),
    /// `&expr`
    Pass(Box<Node>),
}

/// A block or lambda literal.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockLit {
    /// Block parameters
    pub params: Params,
    /// Block body
    pub body: Node,
}

/// A method definition.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDef {
    /// `def self.x` / `def obj.x`
    pub singleton: Option<Node>,
    /// Method name, including any `=`, `?` or `!` suffix
    pub name: String,
    /// Parameters
    pub params: Params,
    /// Method body
    pub body: Node,
}

/// A parameter list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Params {
    /// Required positional parameters
    pub required: Vec<String>,
    /// Optional parameters with default expressions
    pub optional: Vec<(String, Node)>,
    /// `*rest`
    pub rest: Option<String>,
    /// `&blk`
    pub block: Option<String>,
}

impl Params {
    /// Every name bound by this parameter list, in declaration order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.required.iter().map(String::as_str).collect();
        names.extend(self.optional.iter().map(|(name, _)| name.as_str()));
        names.extend(self.rest.as_deref());
        names.extend(self.block.as_deref());
        names
    }

    /// Total count of positional parameters, ignoring `*rest`.
    pub fn positional(&self) -> usize {
        self.required.len() + self.optional.len()
    }
}

/// An assignment target.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// Local variable
    Local(String),
    /// Instance variable
    Instance(String),
    /// Global variable
    Global(String),
    /// Constant, optionally scoped
    Constant {
        /// Explicit scope
        scope: Option<Box<Node>>,
        /// Constant name
        name: String,
    },
    /// `recv.name = value` (calls `name=`)
    Attribute {
        /// Receiver
        receiver: Box<Node>,
        /// Attribute name without the `=`
        name: String,
    },
    /// `recv[args] = value` (calls `[]=`)
    Index {
        /// Receiver
        receiver: Box<Node>,
        /// Index arguments
        args: Vec<Node>,
    },
    /// `*rest` in a multiple assignment
    Splat(Box<Target>),
}

/// One `when` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct WhenClause {
    /// Patterns tested with `===`
    pub patterns: Vec<Node>,
    /// Body
    pub body: Node,
}

/// One `rescue` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct RescueClause {
    /// Exception classes; empty means `StandardError`
    pub classes: Vec<Node>,
    /// `=> var` binding
    pub var: Option<Target>,
    /// Handler body
    pub body: Node,
}

/// `begin ... rescue ... else ... ensure ... end`.
#[derive(Debug, Clone, PartialEq)]
pub struct BeginBlock {
    /// Protected body
    pub body: Node,
    /// Rescue clauses in order
    pub rescues: Vec<RescueClause>,
    /// Runs when the body raised nothing
    pub else_branch: Option<Node>,
    /// Always runs
    pub ensure: Option<Node>,
}

impl Node {
    /// Creates a node.
    pub fn new(expr: Expr, pos: Position) -> Self {
        Self { expr, pos }
    }

    /// A stable name for the node's variant.
    pub fn kind(&self) -> &'static str {
        match &self.expr {
            Expr::Nil => "nil",
            Expr::True => "true",
            Expr::False => "false",
            Expr::SelfRef => "self",
            Expr::Integer(_) => "integer",
            Expr::Str(_) => "str",
            Expr::Interpolated(_) => "dstr",
            Expr::Symbol(_) => "sym",
            Expr::Array(_) => "array",
            Expr::Hash(_) => "hash",
            Expr::LocalVar(_) => "lvar",
            Expr::InstanceVar(_) => "ivar",
            Expr::GlobalVar(_) => "gvar",
            Expr::Const { .. } => "const",
            Expr::Assign { .. } => "assign",
            Expr::OpAssign { .. } => "op_assign",
            Expr::MultiAssign { .. } => "masgn",
            Expr::Call(_) => "send",
            Expr::Splat(_) => "splat",
            Expr::Super { .. } => "super",
            Expr::Yield(_) => "yield",
            Expr::Not(_) => "not",
            Expr::And(..) => "and",
            Expr::Or(..) => "or",
            Expr::Defined(_) => "defined",
            Expr::If { .. } => "if",
            Expr::While { .. } => "while",
            Expr::For { .. } => "for",
            Expr::Case { .. } => "case",
            Expr::Def(_) => "def",
            Expr::ClassDef { .. } => "class",
            Expr::SingletonClass { .. } => "sclass",
            Expr::ModuleDef { .. } => "module",
            Expr::Begin(_) => "begin",
            Expr::Return(_) => "return",
            Expr::Break(_) => "break",
            Expr::Next(_) => "next",
            Expr::Retry => "retry",
            Expr::Lambda(_) => "lambda",
            Expr::Alias { .. } => "alias",
            Expr::Seq(_) => "seq",
        }
    }

    /// The node's direct children, in evaluation order.
    pub fn children(&self) -> Vec<&Node> {
        let mut out: Vec<&Node> = Vec::new();
        match &self.expr {
            Expr::Nil
            | Expr::True
            | Expr::False
            | Expr::SelfRef
            | Expr::Integer(_)
            | Expr::Str(_)
            | Expr::Symbol(_)
            | Expr::LocalVar(_)
            | Expr::InstanceVar(_)
            | Expr::GlobalVar(_)
            | Expr::Retry
            | Expr::Alias { .. } => {}
            Expr::Interpolated(parts) | Expr::Array(parts) | Expr::Yield(parts) | Expr::Seq(parts) => {
                out.extend(parts.iter());
            }
            Expr::Hash(pairs) => {
                for (key, value) in pairs {
                    out.push(key);
                    out.push(value);
                }
            }
            Expr::Const { scope, .. } => out.extend(scope.as_deref()),
            Expr::Assign { target, value } | Expr::OpAssign { target, value, .. } => {
                target_children(target, &mut out);
                out.push(value);
            }
            Expr::MultiAssign { targets, value } => {
                for target in targets {
                    target_children(target, &mut out);
                }
                out.push(value);
            }
            Expr::Call(call) => {
                out.extend(call.receiver.as_ref());
                out.extend(call.args.iter());
                block_children(call.block.as_ref(), &mut out);
            }
            Expr::Splat(inner) | Expr::Not(inner) | Expr::Defined(inner) => out.push(inner),
            Expr::Super { args, block } => {
                if let Some(args) = args {
                    out.extend(args.iter());
                }
                block_children(block.as_ref(), &mut out);
            }
            Expr::And(left, right) | Expr::Or(left, right) => {
                out.push(left);
                out.push(right);
            }
            Expr::If {
                cond,
                then_branch,
                else_branch,
            } => {
                out.push(cond);
                out.push(then_branch);
                out.extend(else_branch.as_deref());
            }
            Expr::While { cond, body, .. } => {
                out.push(cond);
                out.push(body);
            }
            Expr::For { var, iterable, body } => {
                target_children(var, &mut out);
                out.push(iterable);
                out.push(body);
            }
            Expr::Case {
                subject,
                whens,
                else_branch,
            } => {
                out.extend(subject.as_deref());
                for clause in whens {
                    out.extend(clause.patterns.iter());
                    out.push(&clause.body);
                }
                out.extend(else_branch.as_deref());
            }
            Expr::Def(def) => {
                out.extend(def.singleton.as_ref());
                out.extend(def.params.optional.iter().map(|(_, default)| default));
                out.push(&def.body);
            }
            Expr::ClassDef {
                scope,
                superclass,
                body,
                ..
            } => {
                out.extend(scope.as_deref());
                out.extend(superclass.as_deref());
                out.push(body);
            }
            Expr::SingletonClass { target, body } => {
                out.push(target);
                out.push(body);
            }
            Expr::ModuleDef { scope, body, .. } => {
                out.extend(scope.as_deref());
                out.push(body);
            }
            Expr::Begin(block) => {
                out.push(&block.body);
                for rescue in &block.rescues {
                    out.extend(rescue.classes.iter());
                    if let Some(var) = &rescue.var {
                        target_children(var, &mut out);
                    }
                    out.push(&rescue.body);
                }
                out.extend(block.else_branch.as_ref());
                out.extend(block.ensure.as_ref());
            }
            Expr::Return(value) | Expr::Break(value) | Expr::Next(value) => {
                out.extend(value.as_deref());
            }
            Expr::Lambda(lit) => {
                out.extend(lit.params.optional.iter().map(|(_, default)| default));
                out.push(&lit.body);
            }
        }
        out
    }

    /// The node's own data, excluding children and position.
    ///
    /// Two nodes of the same kind with equal payloads differ only in their
    /// subtrees.
    pub fn payload(&self) -> String {
        match &self.expr {
            Expr::Integer(n) => n.to_string(),
            Expr::Str(s) | Expr::Symbol(s) => s.clone(),
            Expr::LocalVar(name) | Expr::InstanceVar(name) | Expr::GlobalVar(name) => name.clone(),
            Expr::Const { name, .. }
            | Expr::ClassDef { name, .. }
            | Expr::ModuleDef { name, .. } => name.clone(),
            Expr::Assign { target, .. } => target_label(target),
            Expr::OpAssign { target, op, .. } => format!("{} {}=", target_label(target), op),
            Expr::MultiAssign { targets, .. } => targets
                .iter()
                .map(target_label)
                .collect::<Vec<_>>()
                .join(","),
            Expr::Call(call) => {
                let block = match &call.block {
                    Some(BlockArg::Literal(lit)) => format!(" |{}|", lit.params.names().join(",")),
                    Some(BlockArg::Pass(_)) => " &".to_string(),
                    None => String::new(),
                };
                format!("{}{}", call.name, block)
            }
            Expr::Super { args, .. } => (if args.is_some() { "explicit" } else { "implicit" }).to_string(),
            Expr::While { until, do_while, .. } => format!("{} {}", until, do_while),
            Expr::For { var, .. } => target_label(var),
            Expr::Def(def) => format!("{}({})", def.name, def.params.names().join(",")),
            Expr::Lambda(lit) => lit.params.names().join(","),
            Expr::Begin(block) => block
                .rescues
                .iter()
                .map(|r| r.var.as_ref().map(target_label).unwrap_or_default())
                .collect::<Vec<_>>()
                .join(","),
            Expr::Alias { new_name, old_name } => format!("{} {}", new_name, old_name),
            _ => String::new(),
        }
    }

    /// Returns a lazy pre-order iterator over this node and its descendants.
    pub fn walk(&self) -> Walk<'_> {
        Walk::new(self)
    }
}

fn target_children<'a>(target: &'a Target, out: &mut Vec<&'a Node>) {
    match target {
        Target::Constant { scope, .. } => out.extend(scope.as_deref()),
        Target::Attribute { receiver, .. } => out.push(receiver),
        Target::Index { receiver, args } => {
            out.push(receiver);
            out.extend(args.iter());
        }
        Target::Splat(inner) => target_children(inner, out),
        Target::Local(_) | Target::Instance(_) | Target::Global(_) => {}
    }
}

fn block_children<'a>(block: Option<&'a BlockArg>, out: &mut Vec<&'a Node>) {
    match block {
        Some(BlockArg::Literal(lit)) => {
            out.extend(lit.params.optional.iter().map(|(_, default)| default));
            out.push(&lit.body);
        }
        Some(BlockArg::Pass(node)) => out.push(node),
        None => {}
    }
}

fn target_label(target: &Target) -> String {
    match target {
        Target::Local(name) | Target::Instance(name) | Target::Global(name) => name.clone(),
        Target::Constant { name, .. } => name.clone(),
        Target::Attribute { name, .. } => format!(".{}", name),
        Target::Index { .. } => "[]".to_string(),
        Target::Splat(inner) => format!("*{}", target_label(inner)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(expr: Expr) -> Node {
        Node::new(expr, Position::new(1, 1))
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(node(Expr::Nil).kind(), "nil");
        assert_eq!(node(Expr::Integer(3)).kind(), "integer");
        assert_eq!(node(Expr::Seq(vec![])).kind(), "seq");
    }

    #[test]
    fn test_children_order() {
        let call = node(Expr::Call(Box::new(Call {
            receiver: Some(node(Expr::LocalVar("a".into()))),
            name: "+".into(),
            args: vec![node(Expr::Integer(1))],
            block: None,
            vcall: false,
        })));
        let kinds: Vec<_> = call.children().iter().map(|n| n.kind()).collect();
        assert_eq!(kinds, vec!["lvar", "integer"]);
    }

    #[test]
    fn test_params_names() {
        let params = Params {
            required: vec!["a".into()],
            optional: vec![("b".into(), node(Expr::Nil))],
            rest: Some("rest".into()),
            block: Some("blk".into()),
        };
        assert_eq!(params.names(), vec!["a", "b", "rest", "blk"]);
        assert_eq!(params.positional(), 2);
    }
}
