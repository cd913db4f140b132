//! Expression parsing: operators, calls, blocks and literals.
//!
//! Precedence, lowest first: assignment, ternary, `||`, `&&`, equality,
//! comparison, `|` `^`, `&`, shifts, additive, multiplicative, unary minus,
//! `**`, then `!` `~` and postfix chains.

use std::rc::Rc;

use super::Parser;
use crate::Error;
use crate::ast::*;
use crate::lexer::{StrSegment, TokenKind};

impl<'a> Parser<'a> {
    /// Parses an expression (no `and`/`or`/`not`, no modifiers).
    pub fn parse_expression(&mut self) -> Result<Node, Error> {
        let pos = self.pos();
        let left = self.parse_ternary()?;

        match &self.current.kind {
            TokenKind::Equal => {
                // Locals exist from the point of assignment, so `x = x` reads nil
                let target = self.to_target(left)?;
                self.advance();
                self.skip_newlines();
                let value = self.parse_assignment_value()?;
                Ok(Node::new(
                    Expr::Assign {
                        target,
                        value: Box::new(value),
                    },
                    pos,
                ))
            }
            TokenKind::OpAssign(op) => {
                let op = op.clone();
                let target = self.to_target(left)?;
                self.advance();
                self.skip_newlines();
                let value = self.parse_assignment_value()?;
                Ok(Node::new(
                    Expr::OpAssign {
                        target,
                        op,
                        value: Box::new(value),
                    },
                    pos,
                ))
            }
            _ => Ok(left),
        }
    }

    fn parse_assignment_value(&mut self) -> Result<Node, Error> {
        let pos = self.pos();
        let value = self.parse_expression()?;
        if !self.check(&TokenKind::Rescue) {
            return Ok(value);
        }
        // `x = risky rescue fallback` rescues the value, not the assignment
        self.advance();
        let fallback = self.parse_expression()?;
        Ok(Node::new(
            Expr::Begin(Box::new(BeginBlock {
                body: value,
                rescues: vec![RescueClause {
                    classes: Vec::new(),
                    var: None,
                    body: fallback,
                }],
                else_branch: None,
                ensure: None,
            })),
            pos,
        ))
    }

    /// `cond ? a : b`
    pub(super) fn parse_ternary(&mut self) -> Result<Node, Error> {
        let pos = self.pos();
        let cond = self.parse_or()?;

        if !self.check(&TokenKind::Question) {
            return Ok(cond);
        }
        self.advance();
        self.skip_newlines();
        let then_branch = self.parse_ternary()?;
        self.skip_newlines();
        self.expect(&TokenKind::Colon)?;
        self.skip_newlines();
        let else_branch = self.parse_ternary()?;

        Ok(Node::new(
            Expr::If {
                cond: Box::new(cond),
                then_branch: Box::new(then_branch),
                else_branch: Some(Box::new(else_branch)),
            },
            pos,
        ))
    }

    fn parse_or(&mut self) -> Result<Node, Error> {
        let mut left = self.parse_and()?;
        while self.check(&TokenKind::PipePipe) {
            let pos = self.pos();
            self.advance();
            self.skip_newlines();
            let right = self.parse_and()?;
            left = Node::new(Expr::Or(Box::new(left), Box::new(right)), pos);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Node, Error> {
        let mut left = self.parse_equality()?;
        while self.check(&TokenKind::AmpersandAmpersand) {
            let pos = self.pos();
            self.advance();
            self.skip_newlines();
            let right = self.parse_equality()?;
            left = Node::new(Expr::And(Box::new(left), Box::new(right)), pos);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Node, Error> {
        self.parse_binary_level(
            &[
                TokenKind::EqualEqual,
                TokenKind::BangEqual,
                TokenKind::EqualEqualEqual,
                TokenKind::Match,
                TokenKind::Spaceship,
            ],
            Self::parse_comparison,
        )
    }

    fn parse_comparison(&mut self) -> Result<Node, Error> {
        self.parse_binary_level(
            &[
                TokenKind::LessThan,
                TokenKind::LessThanEqual,
                TokenKind::GreaterThan,
                TokenKind::GreaterThanEqual,
            ],
            Self::parse_bitwise_or,
        )
    }

    fn parse_bitwise_or(&mut self) -> Result<Node, Error> {
        self.parse_binary_level(&[TokenKind::Pipe, TokenKind::Caret], Self::parse_bitwise_and)
    }

    fn parse_bitwise_and(&mut self) -> Result<Node, Error> {
        self.parse_binary_level(&[TokenKind::Ampersand], Self::parse_shift)
    }

    fn parse_shift(&mut self) -> Result<Node, Error> {
        self.parse_binary_level(&[TokenKind::ShiftLeft, TokenKind::ShiftRight], Self::parse_additive)
    }

    fn parse_additive(&mut self) -> Result<Node, Error> {
        self.parse_binary_level(&[TokenKind::Plus, TokenKind::Minus], Self::parse_multiplicative)
    }

    fn parse_multiplicative(&mut self) -> Result<Node, Error> {
        self.parse_binary_level(
            &[TokenKind::Star, TokenKind::Slash, TokenKind::Percent],
            Self::parse_unary_minus,
        )
    }

    /// One left-associative level of operator calls.
    fn parse_binary_level(
        &mut self,
        operators: &[TokenKind],
        next: fn(&mut Self) -> Result<Node, Error>,
    ) -> Result<Node, Error> {
        let mut left = next(self)?;

        while self.check_any(operators) {
            let pos = left.pos;
            let Some(op) = self.current.kind.operator_method() else {
                break;
            };
            self.advance();
            self.skip_newlines();
            let right = next(self)?;
            left = operator_call(left, op, vec![right], pos);
        }

        Ok(left)
    }

    /// Unary minus binds looser than `**`: `-x ** 2` is `-(x ** 2)`.
    fn parse_unary_minus(&mut self) -> Result<Node, Error> {
        if self.check(&TokenKind::Minus) && !self.minus_starts_literal() {
            let pos = self.pos();
            self.advance();
            let operand = self.parse_unary_minus()?;
            return Ok(operator_call(operand, "-@", Vec::new(), pos));
        }
        self.parse_pow()
    }

    fn parse_pow(&mut self) -> Result<Node, Error> {
        let base = self.parse_unary()?;
        if !self.check(&TokenKind::StarStar) {
            return Ok(base);
        }
        let pos = base.pos;
        self.advance();
        self.skip_newlines();
        // Right-associative
        let exponent = self.parse_unary_minus()?;
        Ok(operator_call(base, "**", vec![exponent], pos))
    }

    /// `!x`, `~x`, `+x`.
    pub(super) fn parse_unary(&mut self) -> Result<Node, Error> {
        let pos = self.pos();
        match self.current.kind {
            TokenKind::Bang => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Node::new(Expr::Not(Box::new(operand)), pos))
            }
            TokenKind::Tilde => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(operator_call(operand, "~", Vec::new(), pos))
            }
            TokenKind::Plus => {
                self.advance();
                self.parse_unary()
            }
            _ => self.parse_postfix(),
        }
    }

    fn minus_starts_literal(&mut self) -> bool {
        let next = self.peek();
        matches!(next.kind, TokenKind::Integer(_)) && !next.spaced
    }

    /// A primary expression followed by `.meth`, `::Name` and `[index]` chains.
    pub(super) fn parse_postfix(&mut self) -> Result<Node, Error> {
        let mut node = self.parse_primary()?;

        loop {
            // Leading-dot chains continue across lines
            if self.check(&TokenKind::Newline) && matches!(self.peek().kind, TokenKind::Dot) {
                self.advance();
                continue;
            }

            match &self.current.kind {
                TokenKind::Dot => {
                    self.advance();
                    self.skip_newlines();
                    node = self.parse_method_call(node)?;
                }
                TokenKind::ColonColon => {
                    self.advance();
                    match self.current.kind.clone() {
                        TokenKind::Constant(name) if !self.constant_call_follows() => {
                            let pos = node.pos;
                            self.advance();
                            node = Node::new(
                                Expr::Const {
                                    scope: Some(Box::new(node)),
                                    name,
                                },
                                pos,
                            );
                        }
                        _ => node = self.parse_method_call(node)?,
                    }
                }
                TokenKind::LeftBracket if !self.current.spaced || !matches!(node.expr, Expr::Call(_)) => {
                    let pos = node.pos;
                    self.advance();
                    let (args, _) = self.nested(|p| p.parse_call_args(Some(&TokenKind::RightBracket)))?;
                    self.expect(&TokenKind::RightBracket)?;
                    node = operator_call(node, "[]", args, pos);
                }
                _ => break,
            }
        }

        Ok(node)
    }

    fn constant_call_follows(&mut self) -> bool {
        let next = self.peek();
        matches!(next.kind, TokenKind::LeftParen) && !next.spaced
    }

    /// The part of a call after `recv.`: name, arguments and block.
    fn parse_method_call(&mut self, receiver: Node) -> Result<Node, Error> {
        let pos = receiver.pos;
        let name = match &self.current.kind {
            TokenKind::Identifier(name) | TokenKind::Constant(name) => name.clone(),
            // `callable.()`
            TokenKind::LeftParen => "call".to_string(),
            kind => match kind.keyword_name().or_else(|| kind.operator_method()) {
                Some(name) => name.to_string(),
                None => return Err(self.unexpected("method name")),
            },
        };
        if !self.check(&TokenKind::LeftParen) {
            self.advance();
        }
        self.parse_call_rest(Some(receiver), name, pos)
    }

    /// Arguments and block of a call whose name has been consumed.
    fn parse_call_rest(&mut self, receiver: Option<Node>, name: String, pos: Position) -> Result<Node, Error> {
        let mut has_parens = false;
        let (args, mut block) = if self.check(&TokenKind::LeftParen) && !self.current.spaced {
            has_parens = true;
            self.advance();
            let result = self.nested(|p| p.parse_call_args(Some(&TokenKind::RightParen)))?;
            self.expect(&TokenKind::RightParen)?;
            result
        } else if self.can_start_command_arg() {
            self.with_no_do(|p| p.parse_call_args(None))?
        } else {
            (Vec::new(), None)
        };

        if let Some(literal) = self.parse_block_literal(!has_parens && !args.is_empty())? {
            if block.is_some() {
                return Err(Error::Syntax {
                    message: "both block arg and actual block given".into(),
                    line: self.previous.line,
                });
            }
            block = Some(literal);
        }

        let vcall = receiver.is_none() && !has_parens && args.is_empty() && block.is_none();
        Ok(Node::new(
            Expr::Call(Box::new(Call {
                receiver,
                name,
                args,
                block,
                vcall,
            })),
            pos,
        ))
    }

    /// A `{ }` or `do end` block, if one follows. After command arguments
    /// only `do` can attach to the command itself.
    fn parse_block_literal(&mut self, after_command_args: bool) -> Result<Option<BlockArg>, Error> {
        let pos = self.pos();
        let (closing, is_brace) = match self.current.kind {
            TokenKind::LeftBrace if !after_command_args => (TokenKind::RightBrace, true),
            TokenKind::Do if !self.no_do => (TokenKind::End, false),
            _ => return Ok(None),
        };
        self.advance();

        self.push_scope(true);
        let result = self.nested(|p| {
            let params = p.parse_block_params()?;
            let body = if is_brace {
                p.parse_statements(&[TokenKind::RightBrace])?
            } else {
                p.parse_body_with_rescue()?
            };
            Ok((params, body))
        });
        self.pop_scope();
        let (params, mut body) = result?;
        self.expect(&closing)?;

        if matches!(body.expr, Expr::Nil) {
            body.pos = pos;
        }
        Ok(Some(BlockArg::Literal(Rc::new(BlockLit { params, body }))))
    }

    /// Whether the current token can begin an argument of a paren-less call.
    pub(super) fn can_start_command_arg(&mut self) -> bool {
        if !self.current.spaced {
            return false;
        }
        match self.current.kind {
            TokenKind::Integer(_)
            | TokenKind::String(_)
            | TokenKind::Symbol(_)
            | TokenKind::Label(_)
            | TokenKind::Identifier(_)
            | TokenKind::Constant(_)
            | TokenKind::InstanceVar(_)
            | TokenKind::GlobalVar(_)
            | TokenKind::Nil
            | TokenKind::True
            | TokenKind::False
            | TokenKind::SelfKw
            | TokenKind::Not
            | TokenKind::Defined
            | TokenKind::Def
            | TokenKind::Arrow
            | TokenKind::Super
            | TokenKind::Yield
            | TokenKind::Case
            | TokenKind::LeftBracket
            | TokenKind::LeftParen
            | TokenKind::Bang => true,
            // `foo -1`, `foo *args`, `foo &blk` but not `foo - 1`
            TokenKind::Minus | TokenKind::Star | TokenKind::Ampersand => {
                !self.peek().spaced
            }
            _ => false,
        }
    }

    /// Whether the current token can begin an expression.
    pub(super) fn can_start_expression(&mut self) -> bool {
        matches!(
            self.current.kind,
            TokenKind::Integer(_)
                | TokenKind::String(_)
                | TokenKind::Symbol(_)
                | TokenKind::Identifier(_)
                | TokenKind::Constant(_)
                | TokenKind::InstanceVar(_)
                | TokenKind::GlobalVar(_)
                | TokenKind::Nil
                | TokenKind::True
                | TokenKind::False
                | TokenKind::SelfKw
                | TokenKind::Not
                | TokenKind::Defined
                | TokenKind::Arrow
                | TokenKind::Super
                | TokenKind::Yield
                | TokenKind::Case
                | TokenKind::Begin
                | TokenKind::If
                | TokenKind::Unless
                | TokenKind::While
                | TokenKind::Until
                | TokenKind::LeftBracket
                | TokenKind::LeftParen
                | TokenKind::LeftBrace
                | TokenKind::Bang
                | TokenKind::Minus
                | TokenKind::Star
                | TokenKind::Label(_)
        )
    }

    /// Parses call arguments up to `closing` (or, for command calls, until
    /// no comma follows). Labels and `=>` pairs are gathered into a trailing
    /// hash; `&blk` becomes the block argument.
    pub(super) fn parse_call_args(
        &mut self,
        closing: Option<&TokenKind>,
    ) -> Result<(Vec<Node>, Option<BlockArg>), Error> {
        let mut args = Vec::new();
        let mut pairs: Vec<(Node, Node)> = Vec::new();
        let mut hash_pos = None;
        let mut block = None;

        if closing.is_some() {
            self.skip_newlines();
        }

        loop {
            if closing.is_some_and(|c| self.check(c)) {
                break;
            }
            if block.is_some() {
                return Err(self.unexpected("')'"));
            }

            let pos = self.pos();
            match self.current.kind.clone() {
                TokenKind::Ampersand => {
                    self.advance();
                    let value = self.parse_ternary()?;
                    block = Some(BlockArg::Pass(Box::new(value)));
                }
                TokenKind::Label(name) => {
                    self.advance();
                    self.skip_newlines();
                    let value = self.parse_expression()?;
                    hash_pos.get_or_insert(pos);
                    pairs.push((Node::new(Expr::Symbol(name), pos), value));
                }
                _ => {
                    let value = self.parse_arg_or_splat()?;
                    if self.check(&TokenKind::FatArrow) {
                        self.advance();
                        self.skip_newlines();
                        let mapped = self.parse_expression()?;
                        hash_pos.get_or_insert(pos);
                        pairs.push((value, mapped));
                    } else if !pairs.is_empty() {
                        return Err(Error::Syntax {
                            message: "positional argument after keyword arguments".into(),
                            line: pos.line,
                        });
                    } else {
                        args.push(value);
                    }
                }
            }

            if self.check(&TokenKind::Comma) {
                self.advance();
                self.skip_newlines();
            } else {
                break;
            }
        }

        if closing.is_some() {
            self.skip_newlines();
        }
        if let Some(pos) = hash_pos {
            args.push(Node::new(Expr::Hash(pairs), pos));
        }
        Ok((args, block))
    }

    /// An expression, or `*expr` producing a splat.
    pub(super) fn parse_arg_or_splat(&mut self) -> Result<Node, Error> {
        if self.check(&TokenKind::Star) {
            let pos = self.pos();
            self.advance();
            let value = self.parse_ternary()?;
            return Ok(Node::new(Expr::Splat(Box::new(value)), pos));
        }
        self.parse_expression()
    }

    fn parse_primary(&mut self) -> Result<Node, Error> {
        let pos = self.pos();

        let expr = match self.current.kind.clone() {
            TokenKind::Integer(n) => {
                self.advance();
                Expr::Integer(n)
            }
            TokenKind::Minus if self.minus_starts_literal() => {
                self.advance();
                let TokenKind::Integer(n) = self.current.kind else {
                    return Err(self.unexpected("integer"));
                };
                self.advance();
                Expr::Integer(-n)
            }
            TokenKind::String(segments) => {
                self.advance();
                return self.build_string(segments, pos);
            }
            TokenKind::Symbol(name) => {
                self.advance();
                Expr::Symbol(name)
            }
            TokenKind::Identifier(name) => {
                self.advance();
                let paren_call = self.check(&TokenKind::LeftParen) && !self.current.spaced;
                if self.is_local(&name) && !paren_call {
                    Expr::LocalVar(name)
                } else {
                    return self.parse_call_rest(None, name, pos);
                }
            }
            TokenKind::Constant(name) => {
                self.advance();
                if self.check(&TokenKind::LeftParen) && !self.current.spaced {
                    return self.parse_call_rest(None, name, pos);
                }
                Expr::Const { scope: None, name }
            }
            TokenKind::InstanceVar(name) => {
                self.advance();
                Expr::InstanceVar(name)
            }
            TokenKind::GlobalVar(name) => {
                self.advance();
                Expr::GlobalVar(name)
            }
            TokenKind::Nil => {
                self.advance();
                Expr::Nil
            }
            TokenKind::True => {
                self.advance();
                Expr::True
            }
            TokenKind::False => {
                self.advance();
                Expr::False
            }
            TokenKind::SelfKw => {
                self.advance();
                Expr::SelfRef
            }
            TokenKind::LeftParen => {
                self.advance();
                let body = self.nested(|p| p.parse_statements(&[TokenKind::RightParen]))?;
                self.expect(&TokenKind::RightParen)?;
                return Ok(body);
            }
            TokenKind::LeftBracket => {
                self.advance();
                let (items, block) = self.nested(|p| p.parse_call_args(Some(&TokenKind::RightBracket)))?;
                if block.is_some() {
                    return Err(self.unexpected("']'"));
                }
                self.expect(&TokenKind::RightBracket)?;
                Expr::Array(items)
            }
            TokenKind::LeftBrace => return self.nested(|p| p.parse_hash(pos)),
            TokenKind::Arrow => return self.parse_lambda(),
            TokenKind::Not => {
                self.advance();
                let operand = self.parse_expression()?;
                Expr::Not(Box::new(operand))
            }
            TokenKind::Defined => {
                self.advance();
                let operand = if self.check(&TokenKind::LeftParen) {
                    self.advance();
                    let operand = self.nested(|p| p.parse_expression_statement())?;
                    self.skip_newlines();
                    self.expect(&TokenKind::RightParen)?;
                    operand
                } else {
                    self.parse_unary()?
                };
                Expr::Defined(Box::new(operand))
            }
            TokenKind::Yield => return self.parse_yield(),
            TokenKind::Super => return self.parse_super(),
            TokenKind::If | TokenKind::Unless => return self.parse_if(),
            TokenKind::While | TokenKind::Until => return self.parse_while(),
            TokenKind::For => return self.parse_for(),
            TokenKind::Case => return self.parse_case(),
            TokenKind::Begin => return self.parse_begin(),
            TokenKind::Def => return self.parse_def(),
            TokenKind::Class => return self.parse_class(),
            TokenKind::Module => return self.parse_module(),
            TokenKind::Return | TokenKind::Break | TokenKind::Next => return self.parse_jump(),
            TokenKind::Alias => return self.parse_alias(),
            TokenKind::Retry => {
                self.advance();
                Expr::Retry
            }
            TokenKind::Redo | TokenKind::Undef | TokenKind::DotDot => {
                let what = super::parser::describe(&self.current.kind);
                return Err(Error::Syntax {
                    message: format!("{} is not supported", what),
                    line: self.current.line,
                });
            }
            _ => return Err(self.unexpected("expression")),
        };

        Ok(Node::new(expr, pos))
    }

    fn build_string(&mut self, segments: Vec<StrSegment>, pos: Position) -> Result<Node, Error> {
        if let [StrSegment::Text(text)] = segments.as_slice() {
            return Ok(Node::new(Expr::Str(text.clone()), pos));
        }

        let mut parts = Vec::with_capacity(segments.len());
        for segment in segments {
            match segment {
                StrSegment::Text(text) => parts.push(Node::new(Expr::Str(text), pos)),
                StrSegment::Code { source, line } => parts.push(self.parse_interpolation(&source, line)?),
            }
        }
        Ok(Node::new(Expr::Interpolated(parts), pos))
    }

    /// `{ key: value, "k" => v }`
    fn parse_hash(&mut self, pos: Position) -> Result<Node, Error> {
        self.advance(); // consume '{'
        self.skip_newlines();

        let mut pairs = Vec::new();
        while !self.check(&TokenKind::RightBrace) {
            let key_pos = self.pos();
            let key = if let TokenKind::Label(name) = self.current.kind.clone() {
                self.advance();
                Node::new(Expr::Symbol(name), key_pos)
            } else {
                let key = self.parse_expression()?;
                self.skip_newlines();
                self.expect(&TokenKind::FatArrow)?;
                key
            };
            self.skip_newlines();
            let value = self.parse_expression()?;
            pairs.push((key, value));

            self.skip_newlines();
            if self.check(&TokenKind::Comma) {
                self.advance();
                self.skip_newlines();
            } else {
                break;
            }
        }
        self.expect(&TokenKind::RightBrace)?;

        Ok(Node::new(Expr::Hash(pairs), pos))
    }

    /// `->(a, b) { ... }` or `-> do ... end`
    fn parse_lambda(&mut self) -> Result<Node, Error> {
        let pos = self.pos();
        self.advance(); // consume '->'

        self.push_scope(true);
        let result = self.nested(|p| {
            let params = if p.check(&TokenKind::LeftParen) {
                p.advance();
                let params = p.parse_param_list(&TokenKind::RightParen)?;
                p.expect(&TokenKind::RightParen)?;
                params
            } else if matches!(p.current.kind, TokenKind::Identifier(_)) {
                p.parse_param_list(&TokenKind::LeftBrace)?
            } else {
                Params::default()
            };

            let body = if p.check(&TokenKind::LeftBrace) {
                p.advance();
                let body = p.parse_statements(&[TokenKind::RightBrace])?;
                p.expect(&TokenKind::RightBrace)?;
                body
            } else {
                p.expect(&TokenKind::Do)?;
                let body = p.parse_body_with_rescue()?;
                p.expect(&TokenKind::End)?;
                body
            };
            Ok((params, body))
        });
        self.pop_scope();
        let (params, body) = result?;

        Ok(Node::new(Expr::Lambda(Rc::new(BlockLit { params, body })), pos))
    }

    fn parse_yield(&mut self) -> Result<Node, Error> {
        let pos = self.pos();
        self.advance(); // consume 'yield'

        let (args, block) = if self.check(&TokenKind::LeftParen) && !self.current.spaced {
            self.advance();
            let result = self.nested(|p| p.parse_call_args(Some(&TokenKind::RightParen)))?;
            self.expect(&TokenKind::RightParen)?;
            result
        } else if self.can_start_command_arg() {
            self.parse_call_args(None)?
        } else {
            (Vec::new(), None)
        };

        if block.is_some() {
            return Err(Error::Syntax {
                message: "block argument should not be given to yield".into(),
                line: pos.line,
            });
        }
        Ok(Node::new(Expr::Yield(args), pos))
    }

    fn parse_super(&mut self) -> Result<Node, Error> {
        let pos = self.pos();
        self.advance(); // consume 'super'

        let (args, mut block) = if self.check(&TokenKind::LeftParen) && !self.current.spaced {
            self.advance();
            let (args, block) = self.nested(|p| p.parse_call_args(Some(&TokenKind::RightParen)))?;
            self.expect(&TokenKind::RightParen)?;
            (Some(args), block)
        } else if self.can_start_command_arg() {
            let (args, block) = self.with_no_do(|p| p.parse_call_args(None))?;
            (Some(args), block)
        } else {
            (None, None)
        };

        if let Some(literal) = self.parse_block_literal(false)? {
            block = Some(literal);
        }
        Ok(Node::new(Expr::Super { args, block }, pos))
    }
}

/// Builds `receiver.op(args)` for an operator.
fn operator_call(receiver: Node, op: &str, args: Vec<Node>, pos: Position) -> Node {
    Node::new(
        Expr::Call(Box::new(Call {
            receiver: Some(receiver),
            name: op.to_string(),
            args,
            block: None,
            vcall: false,
        })),
        pos,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> Node {
        let mut parser = Parser::new(src);
        parser.parse_program().unwrap()
    }

    fn call(node: &Node) -> &Call {
        match &node.expr {
            Expr::Call(call) => call,
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_literals() {
        assert_eq!(parse_ok("42").expr, Expr::Integer(42));
        assert_eq!(parse_ok("-7").expr, Expr::Integer(-7));
        assert_eq!(parse_ok("'hi'").expr, Expr::Str("hi".into()));
        assert_eq!(parse_ok(":sym").expr, Expr::Symbol("sym".into()));
        assert_eq!(parse_ok("nil").expr, Expr::Nil);
        assert_eq!(parse_ok("self").expr, Expr::SelfRef);
    }

    #[test]
    fn test_parse_operator_precedence() {
        // 1 + (2 * 3)
        let node = parse_ok("1 + 2 * 3");
        let plus = call(&node);
        assert_eq!(plus.name, "+");
        assert_eq!(call(&plus.args[0]).name, "*");

        // 2 ** (3 ** 2)
        let node = parse_ok("2 ** 3 ** 2");
        let pow = call(&node);
        assert_eq!(pow.receiver.as_ref().unwrap().expr, Expr::Integer(2));
        assert_eq!(call(&pow.args[0]).name, "**");

        // -(x ** 2)
        let node = parse_ok("x = 3\n-x ** 2");
        let Expr::Seq(body) = node.expr else { panic!() };
        assert_eq!(call(&body[1]).name, "-@");
    }

    #[test]
    fn test_parse_comparison_and_logic() {
        let node = parse_ok("a < b && c == d || !e");
        assert!(matches!(node.expr, Expr::Or(..)));
    }

    #[test]
    fn test_parse_ternary_operator() {
        let node = parse_ok("x ? 1 : 2");
        assert!(matches!(node.expr, Expr::If { else_branch: Some(_), .. }));
    }

    #[test]
    fn test_parse_command_call() {
        let node = parse_ok("puts 1, :two, three: 3");
        let puts = call(&node);
        assert_eq!(puts.name, "puts");
        assert_eq!(puts.args.len(), 3);
        assert!(matches!(puts.args[2].expr, Expr::Hash(_)));
    }

    #[test]
    fn test_parse_paren_call_with_splat_and_block_pass() {
        let node = parse_ok("foo(1, *rest, &blk)");
        let foo = call(&node);
        assert_eq!(foo.args.len(), 2);
        assert!(matches!(foo.args[1].expr, Expr::Splat(_)));
        assert!(matches!(foo.block, Some(BlockArg::Pass(_))));
    }

    #[test]
    fn test_parse_method_chain_and_blocks() {
        let node = parse_ok("list.map { |x| x * 2 }.select do |y|\n  y > 2\nend");
        let select = call(&node);
        assert_eq!(select.name, "select");
        assert!(matches!(select.block, Some(BlockArg::Literal(_))));
        let map = call(select.receiver.as_ref().unwrap());
        assert_eq!(map.name, "map");
        assert!(map.block.is_some());
    }

    #[test]
    fn test_do_block_binds_to_command() {
        let node = parse_ok("puts list.map do |x|\n  x\nend");
        let puts = call(&node);
        assert!(puts.block.is_some());
        assert!(call(&puts.args[0]).block.is_none());
    }

    #[test]
    fn test_leading_dot_chain() {
        let node = parse_ok("items\n  .first\n  .to_s");
        assert_eq!(call(&node).name, "to_s");
    }

    #[test]
    fn test_parse_index_and_assignments() {
        let node = parse_ok("a = [1, 2]\na[0] = 5\na.first");
        let Expr::Seq(body) = node.expr else { panic!() };
        assert!(matches!(body[1].expr, Expr::Assign { target: Target::Index { .. }, .. }));

        let node = parse_ok("obj.name = 'x'");
        assert!(matches!(node.expr, Expr::Assign { target: Target::Attribute { .. }, .. }));

        let node = parse_ok("@count ||= 0");
        assert!(matches!(node.expr, Expr::OpAssign { ref op, .. } if op == "||"));
    }

    #[test]
    fn test_parse_hash_and_array_literals() {
        let node = parse_ok("{ a: 1, 'b' => [2,\n 3], }");
        let Expr::Hash(pairs) = node.expr else { panic!() };
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].0.expr, Expr::Symbol("a".into()));

        let node = parse_ok("[\n  1,\n  *more\n]");
        assert!(matches!(node.expr, Expr::Array(ref items) if items.len() == 2));
    }

    #[test]
    fn test_parse_interpolation() {
        let node = parse_ok("name = 'x'\n\"hi #{name}!\"");
        let Expr::Seq(body) = node.expr else { panic!() };
        let Expr::Interpolated(parts) = &body[1].expr else { panic!() };
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1].expr, Expr::LocalVar("name".into()));
    }

    #[test]
    fn test_parse_lambda() {
        let node = parse_ok("->(a, b) { a + b }");
        let Expr::Lambda(lit) = node.expr else { panic!() };
        assert_eq!(lit.params.required, vec!["a", "b"]);
    }

    #[test]
    fn test_parse_scoped_constant() {
        let node = parse_ok("Outer::Inner::VALUE");
        let Expr::Const { scope, name } = node.expr else { panic!() };
        assert_eq!(name, "VALUE");
        assert!(matches!(scope.unwrap().expr, Expr::Const { .. }));
    }

    #[test]
    fn test_parse_super_forms() {
        assert!(matches!(parse_ok("super").expr, Expr::Super { args: None, .. }));
        assert!(matches!(parse_ok("super()").expr, Expr::Super { args: Some(ref a), .. } if a.is_empty()));
        assert!(matches!(parse_ok("super a, b").expr, Expr::Super { args: Some(ref a), .. } if a.len() == 2));
    }

    #[test]
    fn test_parse_defined() {
        assert!(matches!(parse_ok("defined?(@x)").expr, Expr::Defined(_)));
    }

    #[test]
    fn test_binary_minus_versus_argument() {
        let node = parse_ok("x = 1\nx -1");
        let Expr::Seq(body) = node.expr else { panic!() };
        assert_eq!(call(&body[1]).name, "-");

        let node = parse_ok("foo -1");
        let foo = call(&node);
        assert_eq!(foo.name, "foo");
        assert_eq!(foo.args[0].expr, Expr::Integer(-1));
    }
}
