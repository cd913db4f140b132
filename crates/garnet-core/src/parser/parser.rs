//! The main parser implementation.

use rustc_hash::FxHashSet;

use crate::Error;
use crate::ast::*;
use crate::lexer::{Scanner, Span, Token, TokenKind};

/// One lexical local-variable scope.
#[derive(Debug, Clone, Default)]
pub(super) struct LocalScope {
    names: FxHashSet<String>,
    /// Blocks see the locals of their enclosing scope; `def`/`class` bodies do not
    transparent: bool,
}

/// A recursive descent parser for Ruby.
pub struct Parser<'a> {
    pub(super) scanner: Scanner<'a>,
    pub(super) current: Token,
    pub(super) previous: Token,
    peeked: Option<Token>,
    pub(super) scopes: Vec<LocalScope>,
    /// Set while parsing a loop condition or command arguments, where `do`
    /// belongs to the enclosing construct
    pub(super) no_do: bool,
}

impl<'a> Parser<'a> {
    /// Creates a new parser for the given source code.
    pub fn new(source: &'a str) -> Self {
        Self::with_scanner(Scanner::new(source), vec![LocalScope::default()])
    }

    /// Creates a parser that treats `locals` as already-assigned local
    /// variables, as when continuing a REPL session.
    pub fn with_locals<I>(source: &'a str, locals: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let scope = LocalScope {
            names: locals.into_iter().collect(),
            transparent: false,
        };
        Self::with_scanner(Scanner::new(source), vec![scope])
    }

    fn with_scanner(mut scanner: Scanner<'a>, scopes: Vec<LocalScope>) -> Self {
        let current = scanner.next_token();
        Self {
            scanner,
            current,
            previous: Token::new(TokenKind::Eof, Span::new(0, 0), 1, 1, false),
            peeked: None,
            scopes,
            no_do: false,
        }
    }

    /// Parses the source code into a single sequence node.
    pub fn parse_program(&mut self) -> Result<Node, Error> {
        let body = self.parse_statements(&[])?;
        if !self.is_at_end() {
            return Err(self.unexpected("end-of-input"));
        }
        Ok(body)
    }

    /// Parses the source of a `#{...}` interpolation with the enclosing
    /// local scopes visible.
    pub(super) fn parse_interpolation(&self, source: &str, line: u32) -> Result<Node, Error> {
        let mut scopes = self.scopes.clone();
        scopes.push(LocalScope {
            names: FxHashSet::default(),
            transparent: true,
        });
        let mut parser = Parser::with_scanner(Scanner::with_line(source, line), scopes);
        parser.parse_program()
    }

    /// Parses statements until one of `terminators` (or end of input).
    ///
    /// Returns `nil` for an empty body, the statement itself for a single
    /// statement, and a `Seq` otherwise.
    pub(super) fn parse_statements(&mut self, terminators: &[TokenKind]) -> Result<Node, Error> {
        let pos = self.pos();
        let mut body = Vec::new();

        loop {
            self.skip_separators();
            if self.is_at_end() || self.check_any(terminators) {
                break;
            }
            body.push(self.parse_statement()?);

            if !(self.check(&TokenKind::Newline)
                || self.check(&TokenKind::Semicolon)
                || self.is_at_end()
                || self.check_any(terminators))
            {
                return Err(self.unexpected("end-of-line"));
            }
        }

        Ok(match body.len() {
            0 => Node::new(Expr::Nil, pos),
            1 => body.remove(0),
            _ => Node::new(Expr::Seq(body), pos),
        })
    }

    /// Parses a statement: an expression followed by any modifiers.
    pub fn parse_statement(&mut self) -> Result<Node, Error> {
        let pos = self.pos();
        let mut node = self.parse_expression_statement()?;

        if self.check(&TokenKind::Comma) && is_assignable(&node) {
            node = self.parse_multiple_assignment(node)?;
        }

        loop {
            match &self.current.kind {
                TokenKind::If | TokenKind::Unless => {
                    let negate = self.check(&TokenKind::Unless);
                    self.advance();
                    let cond = self.parse_expression_statement()?;
                    let cond = if negate { not(cond) } else { cond };
                    node = Node::new(
                        Expr::If {
                            cond: Box::new(cond),
                            then_branch: Box::new(node),
                            else_branch: None,
                        },
                        pos,
                    );
                }
                TokenKind::While | TokenKind::Until => {
                    let until = self.check(&TokenKind::Until);
                    self.advance();
                    let cond = self.parse_expression_statement()?;
                    let do_while = matches!(node.expr, Expr::Begin(_));
                    node = Node::new(
                        Expr::While {
                            cond: Box::new(cond),
                            body: Box::new(node),
                            until,
                            do_while,
                        },
                        pos,
                    );
                }
                TokenKind::Rescue => {
                    self.advance();
                    let fallback = self.parse_expression_statement()?;
                    node = Node::new(
                        Expr::Begin(Box::new(BeginBlock {
                            body: node,
                            rescues: vec![RescueClause {
                                classes: Vec::new(),
                                var: None,
                                body: fallback,
                            }],
                            else_branch: None,
                            ensure: None,
                        })),
                        pos,
                    );
                }
                _ => break,
            }
        }

        Ok(node)
    }

    /// Parses `not x`, `a and b`, `a or b`.
    pub(super) fn parse_expression_statement(&mut self) -> Result<Node, Error> {
        let mut left = self.parse_not()?;

        loop {
            let pos = self.pos();
            let is_and = match self.current.kind {
                TokenKind::And => true,
                TokenKind::Or => false,
                _ => break,
            };
            self.advance();
            self.skip_newlines();
            let right = self.parse_not()?;
            let (l, r) = (Box::new(left), Box::new(right));
            left = Node::new(if is_and { Expr::And(l, r) } else { Expr::Or(l, r) }, pos);
        }

        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Node, Error> {
        if self.check(&TokenKind::Not) {
            let pos = self.pos();
            self.advance();
            let operand = self.parse_not()?;
            return Ok(Node::new(Expr::Not(Box::new(operand)), pos));
        }
        self.parse_expression()
    }

    /// `a, b = 1, 2` and `a, *rest = list`.
    fn parse_multiple_assignment(&mut self, first: Node) -> Result<Node, Error> {
        let pos = first.pos;
        let mut targets = vec![self.to_target(first)?];

        while self.check(&TokenKind::Comma) {
            self.advance();
            if self.check(&TokenKind::Star) {
                self.advance();
                let inner = self.parse_postfix_target()?;
                targets.push(Target::Splat(Box::new(inner)));
            } else {
                targets.push(self.parse_postfix_target()?);
            }
        }

        self.expect(&TokenKind::Equal)?;
        self.skip_newlines();
        let value = self.parse_rhs_list()?;

        Ok(Node::new(
            Expr::MultiAssign {
                targets,
                value: Box::new(value),
            },
            pos,
        ))
    }

    fn parse_postfix_target(&mut self) -> Result<Target, Error> {
        let node = self.parse_postfix()?;
        self.to_target(node)
    }

    /// The right side of `=`: a single value, or `a, b` collected into an array.
    pub(super) fn parse_rhs_list(&mut self) -> Result<Node, Error> {
        let pos = self.pos();
        let first = self.parse_arg_or_splat()?;
        if !self.check(&TokenKind::Comma) && !matches!(first.expr, Expr::Splat(_)) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.check(&TokenKind::Comma) {
            self.advance();
            self.skip_newlines();
            items.push(self.parse_arg_or_splat()?);
        }
        Ok(Node::new(Expr::Array(items), pos))
    }

    /// Converts a parsed expression into an assignment target, declaring
    /// local variables as a side effect.
    pub(super) fn to_target(&mut self, node: Node) -> Result<Target, Error> {
        let line = node.pos.line;
        match node.expr {
            Expr::LocalVar(name) => Ok(Target::Local(name)),
            Expr::InstanceVar(name) => Ok(Target::Instance(name)),
            Expr::GlobalVar(name) => Ok(Target::Global(name)),
            Expr::Const { scope, name } => Ok(Target::Constant { scope, name }),
            Expr::Call(call) => {
                let call = *call;
                if call.block.is_some() {
                    return Err(Error::Syntax {
                        message: "cannot assign to a method call with a block".into(),
                        line,
                    });
                }
                match call.receiver {
                    None if call.vcall && is_local_name(&call.name) => {
                        self.declare(&call.name);
                        Ok(Target::Local(call.name))
                    }
                    Some(receiver) if call.name == "[]" => Ok(Target::Index {
                        receiver: Box::new(receiver),
                        args: call.args,
                    }),
                    Some(receiver) if call.args.is_empty() => Ok(Target::Attribute {
                        receiver: Box::new(receiver),
                        name: call.name,
                    }),
                    _ => Err(Error::Syntax {
                        message: format!("cannot assign to method call '{}'", call.name),
                        line,
                    }),
                }
            }
            Expr::SelfRef => Err(Error::Syntax {
                message: "Can't change the value of self".into(),
                line,
            }),
            keyword @ (Expr::Nil | Expr::True | Expr::False) => Err(Error::Syntax {
                message: format!("Can't assign to {}", keyword_literal(&keyword)),
                line,
            }),
            _ => Err(Error::Syntax {
                message: "unexpected '=', expecting end-of-input".into(),
                line,
            }),
        }
    }

    // Local variable scopes

    pub(super) fn push_scope(&mut self, transparent: bool) {
        self.scopes.push(LocalScope {
            names: FxHashSet::default(),
            transparent,
        });
    }

    pub(super) fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    pub(super) fn declare(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.names.insert(name.to_string());
        }
    }

    pub(super) fn is_local(&self, name: &str) -> bool {
        for scope in self.scopes.iter().rev() {
            if scope.names.contains(name) {
                return true;
            }
            if !scope.transparent {
                return false;
            }
        }
        false
    }

    // Token helpers

    pub(super) fn pos(&self) -> Position {
        Position::new(self.current.line, self.current.column)
    }

    pub(super) fn advance(&mut self) {
        let next = match self.peeked.take() {
            Some(token) => token,
            None => self.scanner.next_token(),
        };
        self.previous = std::mem::replace(&mut self.current, next);
    }

    /// Looks one token past the current one.
    pub(super) fn peek(&mut self) -> &Token {
        let scanner = &mut self.scanner;
        self.peeked.get_or_insert_with(|| scanner.next_token())
    }

    pub(super) fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.current.kind) == std::mem::discriminant(kind)
    }

    pub(super) fn check_any(&self, kinds: &[TokenKind]) -> bool {
        kinds.iter().any(|kind| self.check(kind))
    }

    pub(super) fn expect(&mut self, kind: &TokenKind) -> Result<(), Error> {
        if self.check(kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(&describe(kind)))
        }
    }

    pub(super) fn is_at_end(&self) -> bool {
        matches!(self.current.kind, TokenKind::Eof)
    }

    pub(super) fn skip_newlines(&mut self) {
        while self.check(&TokenKind::Newline) {
            self.advance();
        }
    }

    pub(super) fn skip_separators(&mut self) {
        while self.check(&TokenKind::Newline) || self.check(&TokenKind::Semicolon) {
            self.advance();
        }
    }

    /// Skips an optional `then`, newline or `;` after a condition.
    pub(super) fn skip_then(&mut self) {
        self.skip_separators();
        if self.check(&TokenKind::Then) {
            self.advance();
        }
    }

    pub(super) fn unexpected(&self, expecting: &str) -> Error {
        let message = match &self.current.kind {
            TokenKind::Invalid(message) => message.clone(),
            kind => format!("syntax error, unexpected {}, expecting {}", describe(kind), expecting),
        };
        Error::Syntax {
            message,
            line: self.current.line,
        }
    }
}

/// A human-readable token description for error messages.
pub(super) fn describe(kind: &TokenKind) -> String {
    if let Some(keyword) = kind.keyword_name() {
        return format!("'{}'", keyword);
    }
    if let Some(op) = kind.operator_method() {
        return format!("'{}'", op);
    }
    match kind {
        TokenKind::Eof => "end-of-input".into(),
        TokenKind::Newline => "end-of-line".into(),
        TokenKind::Integer(n) => format!("integer literal {}", n),
        TokenKind::String(_) => "string literal".into(),
        TokenKind::Symbol(name) => format!("symbol :{}", name),
        TokenKind::Label(name) => format!("label {}:", name),
        TokenKind::Identifier(name) | TokenKind::Constant(name) => format!("'{}'", name),
        TokenKind::InstanceVar(name) | TokenKind::GlobalVar(name) => format!("'{}'", name),
        TokenKind::Defined => "'defined?'".into(),
        TokenKind::LeftBrace => "'{'".into(),
        TokenKind::RightBrace => "'}'".into(),
        TokenKind::LeftParen => "'('".into(),
        TokenKind::RightParen => "')'".into(),
        TokenKind::LeftBracket => "'['".into(),
        TokenKind::RightBracket => "']'".into(),
        TokenKind::Dot => "'.'".into(),
        TokenKind::DotDot => "'..'".into(),
        TokenKind::Comma => "','".into(),
        TokenKind::Semicolon => "';'".into(),
        TokenKind::Colon => "':'".into(),
        TokenKind::ColonColon => "'::'".into(),
        TokenKind::Question => "'?'".into(),
        TokenKind::FatArrow => "'=>'".into(),
        TokenKind::Arrow => "'->'".into(),
        TokenKind::Equal => "'='".into(),
        TokenKind::AmpersandAmpersand => "'&&'".into(),
        TokenKind::PipePipe => "'||'".into(),
        TokenKind::OpAssign(op) => format!("'{}='", op),
        TokenKind::Invalid(message) => message.clone(),
        other => format!("{:?}", other),
    }
}

pub(super) fn not(node: Node) -> Node {
    let pos = node.pos;
    Node::new(Expr::Not(Box::new(node)), pos)
}

fn is_local_name(name: &str) -> bool {
    !name.ends_with('?') && !name.ends_with('!') && !name.starts_with(|c: char| c.is_uppercase())
}

fn is_assignable(node: &Node) -> bool {
    match &node.expr {
        Expr::LocalVar(_) | Expr::InstanceVar(_) | Expr::GlobalVar(_) | Expr::Const { .. } => true,
        Expr::Call(call) => {
            call.block.is_none()
                && (call.vcall
                    || (call.receiver.is_some() && (call.args.is_empty() || call.name == "[]")))
        }
        _ => false,
    }
}

fn keyword_literal(expr: &Expr) -> &'static str {
    match expr {
        Expr::Nil => "nil",
        Expr::True => "true",
        Expr::False => "false",
        _ => "expression",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> Node {
        let mut parser = Parser::new(src);
        parser.parse_program().unwrap()
    }

    fn parse_err(src: &str) -> Error {
        let mut parser = Parser::new(src);
        parser.parse_program().unwrap_err()
    }

    fn statements(src: &str) -> Vec<Node> {
        match parse_ok(src).expr {
            Expr::Seq(body) => body,
            Expr::Nil => vec![],
            other => vec![Node::new(other, Position::new(1, 1))],
        }
    }

    fn call(node: &Node) -> &Call {
        match &node.expr {
            Expr::Call(call) => call,
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_empty_program() {
        assert_eq!(parse_ok("").expr, Expr::Nil);
        assert_eq!(parse_ok("\n\n;;\n").expr, Expr::Nil);
    }

    #[test]
    fn test_parse_multiple_statements() {
        assert_eq!(statements("1\n2; 3").len(), 3);
    }

    #[test]
    fn test_local_versus_vcall() {
        let body = statements("foo\nfoo = 1\nfoo");
        assert!(call(&body[0]).vcall);
        assert!(matches!(body[1].expr, Expr::Assign { target: Target::Local(_), .. }));
        assert_eq!(body[2].expr, Expr::LocalVar("foo".into()));
    }

    #[test]
    fn test_locals_do_not_cross_def() {
        let body = statements("x = 1\ndef m\n  x\nend");
        let Expr::Def(def) = &body[1].expr else {
            panic!("expected def");
        };
        assert!(call(&def.body).vcall);
    }

    #[test]
    fn test_blocks_see_outer_locals() {
        let body = statements("x = 1\n[1].each { |y| x + y }");
        let each = call(&body[1]);
        let Some(BlockArg::Literal(block)) = &each.block else {
            panic!("expected block");
        };
        let plus = call(&block.body);
        assert_eq!(plus.receiver.as_ref().unwrap().expr, Expr::LocalVar("x".into()));
        assert_eq!(plus.args[0].expr, Expr::LocalVar("y".into()));
    }

    #[test]
    fn test_seeded_locals() {
        let mut parser = Parser::with_locals("x", vec!["x".to_string()]);
        assert_eq!(parser.parse_program().unwrap().expr, Expr::LocalVar("x".into()));
    }

    #[test]
    fn test_parse_modifiers() {
        let node = parse_ok("puts 1 if ready");
        assert!(matches!(node.expr, Expr::If { else_branch: None, .. }));

        let node = parse_ok("x += 1 until done?");
        assert!(matches!(node.expr, Expr::While { until: true, do_while: false, .. }));

        let node = parse_ok("begin\n  x = 1\nend while false");
        assert!(matches!(node.expr, Expr::While { do_while: true, .. }));

        let node = parse_ok("risky rescue nil");
        assert!(matches!(node.expr, Expr::Begin(_)));
    }

    #[test]
    fn test_parse_and_or_not() {
        assert!(matches!(parse_ok("a and b or c").expr, Expr::Or(..)));
        assert!(matches!(parse_ok("not a").expr, Expr::Not(_)));
    }

    #[test]
    fn test_multiple_assignment() {
        let node = parse_ok("a, b = 1, 2");
        let Expr::MultiAssign { targets, value } = node.expr else {
            panic!("expected masgn");
        };
        assert_eq!(targets.len(), 2);
        assert!(matches!(value.expr, Expr::Array(ref items) if items.len() == 2));

        let node = parse_ok("first, *rest = list");
        let Expr::MultiAssign { targets, .. } = node.expr else {
            panic!("expected masgn");
        };
        assert!(matches!(targets[1], Target::Splat(_)));
    }

    #[test]
    fn test_parse_error_reports_line() {
        let err = parse_err("x = 1\ny = )");
        assert!(matches!(err, Error::Syntax { line: 2, .. }));
    }

    #[test]
    fn test_parse_error_unterminated_def() {
        let err = parse_err("def foo\n  1\n");
        let Error::Syntax { message, .. } = err else {
            panic!("expected syntax error");
        };
        assert!(message.contains("end-of-input"), "{}", message);
    }

    #[test]
    fn test_invalid_token_message() {
        let err = parse_err("x = 1.5");
        let Error::Syntax { message, .. } = err else {
            panic!("expected syntax error");
        };
        assert!(message.contains("floating point"));
    }

    #[test]
    fn test_assign_to_self_rejected() {
        assert!(matches!(parse_err("self = 1"), Error::Syntax { .. }));
    }
}
