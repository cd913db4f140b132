//! Compound constructs: definitions, conditionals, loops and exception
//! handling blocks.

use std::rc::Rc;

use super::Parser;
use super::parser::not;
use crate::Error;
use crate::ast::*;
use crate::lexer::TokenKind;

impl<'a> Parser<'a> {
    /// `def name(params) ... end`, including `def self.name` and setters.
    pub(super) fn parse_def(&mut self) -> Result<Node, Error> {
        let pos = self.pos();
        self.advance(); // consume 'def'

        let singleton = self.parse_def_singleton()?;
        let mut name = self.parse_def_name()?;

        // `def value=(v)`
        if self.check(&TokenKind::Equal)
            && !self.current.spaced
            && !name.ends_with(['?', '!', '='])
            && name.starts_with(|c: char| c.is_alphabetic() || c == '_')
        {
            self.advance();
            name.push('=');
        }

        self.push_scope(false);
        let result = self.parse_def_rest(singleton, name, pos);
        self.pop_scope();
        result
    }

    fn parse_def_rest(&mut self, singleton: Option<Node>, name: String, pos: Position) -> Result<Node, Error> {
        let params = if self.check(&TokenKind::LeftParen) {
            self.advance();
            self.skip_newlines();
            let params = self.parse_param_list(&TokenKind::RightParen)?;
            self.expect(&TokenKind::RightParen)?;
            params
        } else if self.check(&TokenKind::Newline) || self.check(&TokenKind::Semicolon) {
            Params::default()
        } else {
            self.parse_param_list(&TokenKind::Newline)?
        };

        let body = self.parse_body_with_rescue()?;
        self.expect(&TokenKind::End)?;

        Ok(Node::new(
            Expr::Def(Rc::new(MethodDef {
                singleton,
                name,
                params,
                body,
            })),
            pos,
        ))
    }

    fn parse_def_singleton(&mut self) -> Result<Option<Node>, Error> {
        let pos = self.pos();
        let target = match &self.current.kind {
            TokenKind::SelfKw => Expr::SelfRef,
            TokenKind::Constant(name) => Expr::Const {
                scope: None,
                name: name.clone(),
            },
            TokenKind::Identifier(name) if self.is_local(name) => Expr::LocalVar(name.clone()),
            _ => return Ok(None),
        };
        if !matches!(self.peek().kind, TokenKind::Dot) {
            return Ok(None);
        }
        self.advance();
        self.advance(); // consume '.'
        Ok(Some(Node::new(target, pos)))
    }

    fn parse_def_name(&mut self) -> Result<String, Error> {
        if self.check(&TokenKind::LeftBracket) {
            self.advance();
            if !self.check(&TokenKind::RightBracket) {
                return Err(self.unexpected("']'"));
            }
            let setter = {
                let next = self.peek();
                matches!(next.kind, TokenKind::Equal) && !next.spaced
            };
            self.advance();
            if setter {
                self.advance();
                return Ok("[]=".into());
            }
            return Ok("[]".into());
        }

        // `-@` / `+@` lex as the operator followed by a bare `@`
        if self.check(&TokenKind::Minus) || self.check(&TokenKind::Plus) {
            let unary = {
                let next = self.peek();
                matches!(next.kind, TokenKind::Invalid(_)) && !next.spaced && next.span.len() == 1
            };
            if unary {
                let name = if self.check(&TokenKind::Minus) { "-@" } else { "+@" };
                self.advance();
                self.advance();
                return Ok(name.into());
            }
        }

        let name = match &self.current.kind {
            TokenKind::Identifier(name) | TokenKind::Constant(name) => name.clone(),
            kind => match kind.keyword_name().or_else(|| kind.operator_method()) {
                Some(name) => name.to_string(),
                None => return Err(self.unexpected("method name")),
            },
        };
        self.advance();
        Ok(name)
    }

    /// Parses parameters up to (not including) `closing`, declaring each one
    /// as a local of the current scope.
    pub(super) fn parse_param_list(&mut self, closing: &TokenKind) -> Result<Params, Error> {
        let mut params = Params::default();

        while !self.check(closing) && !self.is_at_end() {
            let line = self.current.line;
            match self.current.kind.clone() {
                TokenKind::Identifier(name) => {
                    self.advance();
                    self.declare(&name);
                    if self.check(&TokenKind::Equal) {
                        self.advance();
                        let default = self.parse_ternary()?;
                        params.optional.push((name, default));
                    } else if !params.optional.is_empty() || params.rest.is_some() {
                        return Err(Error::Syntax {
                            message: format!(
                                "required parameter '{}' after optional parameters is not supported",
                                name
                            ),
                            line,
                        });
                    } else {
                        params.required.push(name);
                    }
                }
                TokenKind::Star => {
                    self.advance();
                    let name = match &self.current.kind {
                        TokenKind::Identifier(name) => {
                            let name = name.clone();
                            self.advance();
                            name
                        }
                        _ => "*".to_string(),
                    };
                    self.declare(&name);
                    params.rest = Some(name);
                }
                TokenKind::Ampersand => {
                    self.advance();
                    let TokenKind::Identifier(name) = self.current.kind.clone() else {
                        return Err(self.unexpected("block parameter name"));
                    };
                    self.advance();
                    self.declare(&name);
                    params.block = Some(name);
                }
                TokenKind::Label(name) => {
                    return Err(Error::Syntax {
                        message: format!("keyword parameter '{}' is not supported", name),
                        line,
                    });
                }
                _ => return Err(self.unexpected("parameter name")),
            }

            if self.check(&TokenKind::Comma) {
                self.advance();
                self.skip_newlines();
            } else {
                break;
            }
        }

        Ok(params)
    }

    /// `|a, b = 1, *rest, &blk|`
    pub(super) fn parse_block_params(&mut self) -> Result<Params, Error> {
        if self.check(&TokenKind::PipePipe) {
            self.advance();
            return Ok(Params::default());
        }
        if !self.check(&TokenKind::Pipe) {
            return Ok(Params::default());
        }
        self.advance();

        let mut params = Params::default();
        while !self.check(&TokenKind::Pipe) && !self.is_at_end() {
            match self.current.kind.clone() {
                TokenKind::Identifier(name) => {
                    self.advance();
                    self.declare(&name);
                    if self.check(&TokenKind::Equal) {
                        self.advance();
                        let default = self.parse_unary()?;
                        params.optional.push((name, default));
                    } else {
                        params.required.push(name);
                    }
                }
                TokenKind::Star => {
                    self.advance();
                    if let TokenKind::Identifier(name) = self.current.kind.clone() {
                        self.advance();
                        self.declare(&name);
                        params.rest = Some(name);
                    } else {
                        params.rest = Some("*".into());
                    }
                }
                TokenKind::Ampersand => {
                    self.advance();
                    let TokenKind::Identifier(name) = self.current.kind.clone() else {
                        return Err(self.unexpected("block parameter name"));
                    };
                    self.advance();
                    self.declare(&name);
                    params.block = Some(name);
                }
                _ => return Err(self.unexpected("'|'")),
            }
            if self.check(&TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(&TokenKind::Pipe)?;
        Ok(params)
    }

    /// `class Name < Super ... end` and `class << obj ... end`.
    pub(super) fn parse_class(&mut self) -> Result<Node, Error> {
        let pos = self.pos();
        self.advance(); // consume 'class'

        if self.check(&TokenKind::ShiftLeft) {
            self.advance();
            let target = self.parse_expression()?;
            let body = self.parse_scoped_body()?;
            return Ok(Node::new(
                Expr::SingletonClass {
                    target: Box::new(target),
                    body: Box::new(body),
                },
                pos,
            ));
        }

        let (scope, name) = self.parse_constant_path()?;
        let superclass = if self.check(&TokenKind::LessThan) {
            self.advance();
            Some(Box::new(self.parse_expression()?))
        } else {
            None
        };
        let body = self.parse_scoped_body()?;

        Ok(Node::new(
            Expr::ClassDef {
                scope,
                name,
                superclass,
                body: Box::new(body),
            },
            pos,
        ))
    }

    /// `module Name ... end`.
    pub(super) fn parse_module(&mut self) -> Result<Node, Error> {
        let pos = self.pos();
        self.advance(); // consume 'module'

        let (scope, name) = self.parse_constant_path()?;
        let body = self.parse_scoped_body()?;

        Ok(Node::new(
            Expr::ModuleDef {
                scope,
                name,
                body: Box::new(body),
            },
            pos,
        ))
    }

    fn parse_scoped_body(&mut self) -> Result<Node, Error> {
        self.push_scope(false);
        let body = self.parse_body_with_rescue();
        self.pop_scope();
        let body = body?;
        self.expect(&TokenKind::End)?;
        Ok(body)
    }

    fn parse_constant_path(&mut self) -> Result<(Option<Box<Node>>, String), Error> {
        let pos = self.pos();
        let TokenKind::Constant(first) = self.current.kind.clone() else {
            return Err(Error::Syntax {
                message: "class/module name must be CONSTANT".into(),
                line: self.current.line,
            });
        };
        self.advance();

        let mut scope: Option<Box<Node>> = None;
        let mut name = first;
        while self.check(&TokenKind::ColonColon) {
            self.advance();
            let TokenKind::Constant(next) = self.current.kind.clone() else {
                return Err(self.unexpected("constant name"));
            };
            self.advance();
            scope = Some(Box::new(Node::new(Expr::Const { scope, name }, pos)));
            name = next;
        }
        Ok((scope, name))
    }

    /// `if` / `unless` with `elsif` and `else` branches.
    pub(super) fn parse_if(&mut self) -> Result<Node, Error> {
        let pos = self.pos();
        let negate = self.check(&TokenKind::Unless);
        self.advance();

        let cond = self.with_no_do(|p| p.parse_expression_statement())?;
        let cond = if negate { not(cond) } else { cond };
        self.skip_then();
        let node = self.parse_if_tail(cond, pos, !negate)?;
        self.expect(&TokenKind::End)?;
        Ok(node)
    }

    fn parse_if_tail(&mut self, cond: Node, pos: Position, allow_elsif: bool) -> Result<Node, Error> {
        let then_branch = self.parse_statements(&[TokenKind::Elsif, TokenKind::Else, TokenKind::End])?;

        let else_branch = match self.current.kind {
            TokenKind::Elsif if allow_elsif => {
                let elsif_pos = self.pos();
                self.advance();
                let cond = self.with_no_do(|p| p.parse_expression_statement())?;
                self.skip_then();
                Some(Box::new(self.parse_if_tail(cond, elsif_pos, true)?))
            }
            TokenKind::Else => {
                self.advance();
                Some(Box::new(self.parse_statements(&[TokenKind::End])?))
            }
            _ => None,
        };

        Ok(Node::new(
            Expr::If {
                cond: Box::new(cond),
                then_branch: Box::new(then_branch),
                else_branch,
            },
            pos,
        ))
    }

    /// `while cond [do] ... end` / `until cond [do] ... end`.
    pub(super) fn parse_while(&mut self) -> Result<Node, Error> {
        let pos = self.pos();
        let until = self.check(&TokenKind::Until);
        self.advance();

        let cond = self.with_no_do(|p| p.parse_expression_statement())?;
        if self.check(&TokenKind::Do) {
            self.advance();
        }
        let body = self.parse_statements(&[TokenKind::End])?;
        self.expect(&TokenKind::End)?;

        Ok(Node::new(
            Expr::While {
                cond: Box::new(cond),
                body: Box::new(body),
                until,
                do_while: false,
            },
            pos,
        ))
    }

    /// `for x in iterable [do] ... end`; the loop variable stays visible
    /// after the loop.
    pub(super) fn parse_for(&mut self) -> Result<Node, Error> {
        let pos = self.pos();
        self.advance(); // consume 'for'

        let var = match self.current.kind.clone() {
            TokenKind::Identifier(name) => {
                self.advance();
                self.declare(&name);
                Target::Local(name)
            }
            TokenKind::InstanceVar(name) => {
                self.advance();
                Target::Instance(name)
            }
            _ => return Err(self.unexpected("loop variable")),
        };
        self.expect(&TokenKind::In)?;
        let iterable = self.with_no_do(|p| p.parse_expression_statement())?;
        if self.check(&TokenKind::Do) {
            self.advance();
        }
        let body = self.parse_statements(&[TokenKind::End])?;
        self.expect(&TokenKind::End)?;

        Ok(Node::new(
            Expr::For {
                var,
                iterable: Box::new(iterable),
                body: Box::new(body),
            },
            pos,
        ))
    }

    /// `case [subject] when ... [else ...] end`.
    pub(super) fn parse_case(&mut self) -> Result<Node, Error> {
        let pos = self.pos();
        self.advance(); // consume 'case'

        let subject = if self.check(&TokenKind::Newline) || self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(Box::new(self.parse_expression_statement()?))
        };
        self.skip_separators();

        let mut whens = Vec::new();
        while self.check(&TokenKind::When) {
            self.advance();
            let mut patterns = vec![self.parse_arg_or_splat()?];
            while self.check(&TokenKind::Comma) {
                self.advance();
                self.skip_newlines();
                patterns.push(self.parse_arg_or_splat()?);
            }
            self.skip_then();
            let body = self.parse_statements(&[TokenKind::When, TokenKind::Else, TokenKind::End])?;
            whens.push(WhenClause { patterns, body });
        }

        if whens.is_empty() {
            return Err(self.unexpected("'when'"));
        }

        let else_branch = if self.check(&TokenKind::Else) {
            self.advance();
            Some(Box::new(self.parse_statements(&[TokenKind::End])?))
        } else {
            None
        };
        self.expect(&TokenKind::End)?;

        Ok(Node::new(
            Expr::Case {
                subject,
                whens,
                else_branch,
            },
            pos,
        ))
    }

    /// `begin ... end`; always produces a `Begin` node so that
    /// `begin ... end while cond` can be recognized.
    pub(super) fn parse_begin(&mut self) -> Result<Node, Error> {
        let pos = self.pos();
        self.advance(); // consume 'begin'

        let body = self.parse_body_with_rescue()?;
        self.expect(&TokenKind::End)?;

        if matches!(body.expr, Expr::Begin(_)) {
            return Ok(body);
        }
        Ok(Node::new(
            Expr::Begin(Box::new(BeginBlock {
                body,
                rescues: Vec::new(),
                else_branch: None,
                ensure: None,
            })),
            pos,
        ))
    }

    /// A body that may carry `rescue`/`else`/`ensure` clauses, up to (not
    /// including) the closing `end`.
    pub(super) fn parse_body_with_rescue(&mut self) -> Result<Node, Error> {
        let pos = self.pos();
        let body = self.parse_statements(&[
            TokenKind::Rescue,
            TokenKind::Else,
            TokenKind::Ensure,
            TokenKind::End,
        ])?;

        let mut rescues = Vec::new();
        while self.check(&TokenKind::Rescue) {
            rescues.push(self.parse_rescue_clause()?);
        }

        let else_branch = if self.check(&TokenKind::Else) {
            self.advance();
            Some(self.parse_statements(&[TokenKind::Ensure, TokenKind::End])?)
        } else {
            None
        };

        let ensure = if self.check(&TokenKind::Ensure) {
            self.advance();
            Some(self.parse_statements(&[TokenKind::End])?)
        } else {
            None
        };

        if rescues.is_empty() && else_branch.is_none() && ensure.is_none() {
            return Ok(body);
        }

        Ok(Node::new(
            Expr::Begin(Box::new(BeginBlock {
                body,
                rescues,
                else_branch,
                ensure,
            })),
            pos,
        ))
    }

    fn parse_rescue_clause(&mut self) -> Result<RescueClause, Error> {
        self.advance(); // consume 'rescue'

        let mut classes = Vec::new();
        if !self.check_any(&[
            TokenKind::FatArrow,
            TokenKind::Then,
            TokenKind::Newline,
            TokenKind::Semicolon,
        ]) {
            classes.push(self.parse_arg_or_splat()?);
            while self.check(&TokenKind::Comma) {
                self.advance();
                self.skip_newlines();
                classes.push(self.parse_arg_or_splat()?);
            }
        }

        let var = if self.check(&TokenKind::FatArrow) {
            self.advance();
            Some(match self.current.kind.clone() {
                TokenKind::Identifier(name) => {
                    self.advance();
                    self.declare(&name);
                    Target::Local(name)
                }
                TokenKind::InstanceVar(name) => {
                    self.advance();
                    Target::Instance(name)
                }
                TokenKind::GlobalVar(name) => {
                    self.advance();
                    Target::Global(name)
                }
                _ => return Err(self.unexpected("variable name")),
            })
        } else {
            None
        };

        self.skip_then();
        let body = self.parse_statements(&[
            TokenKind::Rescue,
            TokenKind::Else,
            TokenKind::Ensure,
            TokenKind::End,
        ])?;

        Ok(RescueClause { classes, var, body })
    }

    /// `return`, `break` and `next` with an optional value.
    pub(super) fn parse_jump(&mut self) -> Result<Node, Error> {
        let pos = self.pos();
        let keyword = self.current.kind.clone();
        self.advance();

        let value = if self.can_start_expression()
            && !self.check_any(&[TokenKind::If, TokenKind::Unless, TokenKind::While, TokenKind::Until])
        {
            Some(Box::new(self.parse_rhs_list()?))
        } else {
            None
        };

        let expr = match keyword {
            TokenKind::Return => Expr::Return(value),
            TokenKind::Break => Expr::Break(value),
            _ => Expr::Next(value),
        };
        Ok(Node::new(expr, pos))
    }

    /// `alias new_name old_name`.
    pub(super) fn parse_alias(&mut self) -> Result<Node, Error> {
        let pos = self.pos();
        self.advance(); // consume 'alias'
        let new_name = self.parse_alias_name()?;
        let old_name = self.parse_alias_name()?;
        Ok(Node::new(Expr::Alias { new_name, old_name }, pos))
    }

    fn parse_alias_name(&mut self) -> Result<String, Error> {
        match &self.current.kind {
            TokenKind::Symbol(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => self.parse_def_name(),
        }
    }

    /// Runs `f` with `do` reserved for the enclosing construct.
    pub(super) fn with_no_do<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, Error>) -> Result<T, Error> {
        let saved = std::mem::replace(&mut self.no_do, true);
        let result = f(self);
        self.no_do = saved;
        result
    }

    /// Runs `f` inside brackets, where `do` may bind again.
    pub(super) fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, Error>) -> Result<T, Error> {
        let saved = std::mem::replace(&mut self.no_do, false);
        let result = f(self);
        self.no_do = saved;
        result
    }
}
