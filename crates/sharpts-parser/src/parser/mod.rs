//! Recursive-descent parser over the scanner's token vector.
//!
//! The parser is a pure function of the token vector: state is the
//! current position plus a save/restore mark used to back out of
//! ambiguous prefixes (arrow parameter lists, `<T>expr` assertions,
//! type-argument lists in call position).

mod decl;
mod expr;
mod types;

use sharpts_common::diagnostics::{Diagnostic, diagnostic_codes};
use sharpts_common::limits;
use sharpts_common::span::Span;
use sharpts_scanner::token::{Token, TokenKind};

use crate::ast::*;

pub(crate) type PResult<T> = Result<T, Diagnostic>;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    next_node_id: NodeId,
    next_temp: u32,
    depth: u32,
}

/// A saved parser position for backtracking.
#[derive(Clone, Copy)]
pub(crate) struct Mark {
    pos: usize,
    next_node_id: NodeId,
    next_temp: u32,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser {
            tokens,
            pos: 0,
            next_node_id: 0,
            next_temp: 0,
            depth: 0,
        }
    }

    /// Parse a complete program.
    pub fn parse_program(mut self) -> Result<Program, Diagnostic> {
        tracing::debug!(tokens = self.tokens.len(), "parsing program");
        let mut statements = Vec::new();
        let mut at_file_head = true;
        while !self.at_eof() {
            let stmt = self.parse_statement()?;
            // A leading string expression statement is a file-level
            // directive applied to all classes in the file.
            if at_file_head {
                if let StmtKind::Expr(expr) = &stmt.kind {
                    if let ExprKind::Literal(Lit::Str(text)) = &expr.kind {
                        statements.push(Stmt {
                            span: stmt.span,
                            kind: StmtKind::Directive(text.clone()),
                        });
                        continue;
                    }
                }
                at_file_head = false;
            }
            statements.push(stmt);
        }
        Ok(Program { statements })
    }

    // =========================================================================
    // Token machinery
    // =========================================================================

    pub(crate) fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    pub(crate) fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    pub(crate) fn peek_at(&self, offset: usize) -> &TokenKind {
        &self.peek_token_at(offset).kind
    }

    pub(crate) fn peek_token_at(&self, offset: usize) -> &Token {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    pub(crate) fn at_eof(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    pub(crate) fn span(&self) -> Span {
        self.peek().span
    }

    /// Mutable access to the current token, used by
    /// [`Parser::consume_greater`] to split `>>`/`>>>` in place.
    pub(crate) fn current_token_mut(&mut self) -> &mut Token {
        let idx = self.pos.min(self.tokens.len() - 1);
        &mut self.tokens[idx]
    }

    pub(crate) fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    pub(crate) fn at(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    pub(crate) fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, kind: &TokenKind) -> PResult<Span> {
        if self.at(kind) {
            Ok(self.advance().span)
        } else {
            Err(self.unexpected(&format!("{} expected", kind.describe())))
        }
    }

    pub(crate) fn unexpected(&self, message: &str) -> Diagnostic {
        Diagnostic::parse_error(
            self.span(),
            format!("{message}, found {}.", self.peek_kind().describe()),
            diagnostic_codes::UNEXPECTED_TOKEN,
        )
    }

    /// True when the current token is the identifier `name`.
    pub(crate) fn at_ident(&self, name: &str) -> bool {
        matches!(self.peek_kind(), TokenKind::Ident(s) if s == name)
    }

    pub(crate) fn eat_ident(&mut self, name: &str) -> bool {
        if self.at_ident(name) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Consume an identifier token (contextual keywords included).
    pub(crate) fn expect_ident(&mut self) -> PResult<(String, Span)> {
        match self.peek_kind().clone() {
            TokenKind::Ident(name) => {
                let span = self.advance().span;
                Ok((name, span))
            }
            _ => Err(Diagnostic::parse_error(
                self.span(),
                format!("Identifier expected, found {}.", self.peek_kind().describe()),
                diagnostic_codes::IDENTIFIER_EXPECTED,
            )),
        }
    }

    /// A property name after `.` also admits reserved words (`a.default`).
    pub(crate) fn expect_property_name(&mut self) -> PResult<(String, Span)> {
        if let TokenKind::Ident(name) = self.peek_kind().clone() {
            let span = self.advance().span;
            return Ok((name, span));
        }
        if let Some(spelling) = sharpts_scanner::token::keyword_spelling(self.peek_kind()) {
            let span = self.advance().span;
            return Ok((spelling.to_string(), span));
        }
        Err(Diagnostic::parse_error(
            self.span(),
            format!("Identifier expected, found {}.", self.peek_kind().describe()),
            diagnostic_codes::IDENTIFIER_EXPECTED,
        ))
    }

    pub(crate) fn mark(&self) -> Mark {
        Mark {
            pos: self.pos,
            next_node_id: self.next_node_id,
            next_temp: self.next_temp,
        }
    }

    pub(crate) fn reset(&mut self, mark: Mark) {
        self.pos = mark.pos;
        self.next_node_id = mark.next_node_id;
        self.next_temp = mark.next_temp;
    }

    pub(crate) fn fresh_node_id(&mut self) -> NodeId {
        let id = self.next_node_id;
        self.next_node_id += 1;
        id
    }

    pub(crate) fn fresh_temp(&mut self) -> String {
        let n = self.next_temp;
        self.next_temp += 1;
        format!("__destructured_{n}")
    }

    pub(crate) fn make_expr(&mut self, span: Span, kind: ExprKind) -> Expr {
        Expr {
            id: self.fresh_node_id(),
            span,
            kind,
        }
    }

    pub(crate) fn enter_depth(&mut self) -> PResult<()> {
        self.depth += 1;
        if self.depth > limits::MAX_PARSE_DEPTH {
            return Err(Diagnostic::parse_error(
                self.span(),
                "Expression nesting is too deep.",
                diagnostic_codes::UNEXPECTED_TOKEN,
            ));
        }
        Ok(())
    }

    pub(crate) fn leave_depth(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Accept a statement terminator: an explicit `;`, a closing brace,
    /// end of file, or an inserted semicolon at a line break.
    pub(crate) fn expect_semicolon(&mut self) -> PResult<()> {
        if self.eat(&TokenKind::Semicolon) {
            return Ok(());
        }
        if self.at(&TokenKind::RBrace) || self.at_eof() || self.peek().newline_before {
            return Ok(());
        }
        Err(self.unexpected("`;` expected"))
    }

    // =========================================================================
    // Statements
    // =========================================================================

    pub(crate) fn parse_statement(&mut self) -> PResult<Stmt> {
        self.enter_depth()?;
        let result = self.parse_statement_inner();
        self.leave_depth();
        result
    }

    fn parse_statement_inner(&mut self) -> PResult<Stmt> {
        let start = self.span();
        match self.peek_kind().clone() {
            TokenKind::Var | TokenKind::Let => self.parse_var_statement(),
            TokenKind::Const => {
                if matches!(self.peek_at(1), TokenKind::Enum) {
                    self.advance();
                    self.parse_enum(true)
                } else {
                    self.parse_var_statement()
                }
            }
            TokenKind::Function => self.parse_function_statement(false),
            TokenKind::Class => {
                let decl = self.parse_class_decl(false)?;
                Ok(Stmt {
                    span: start.merge(decl.span),
                    kind: StmtKind::Class(decl),
                })
            }
            TokenKind::Interface => self.parse_interface(),
            TokenKind::Enum => self.parse_enum(false),
            TokenKind::Import => self.parse_import(),
            TokenKind::Export => self.parse_export(),
            TokenKind::LBrace => {
                let span_start = self.span();
                let body = self.parse_block()?;
                Ok(Stmt {
                    span: span_start.merge(self.prev_span()),
                    kind: StmtKind::Block(body),
                })
            }
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::Do => self.parse_do_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Return => {
                self.advance();
                let argument = if self.at(&TokenKind::Semicolon)
                    || self.at(&TokenKind::RBrace)
                    || self.at_eof()
                    || self.peek().newline_before
                {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.expect_semicolon()?;
                Ok(Stmt {
                    span: start.merge(self.prev_span()),
                    kind: StmtKind::Return(argument),
                })
            }
            TokenKind::Break => {
                self.advance();
                let label = self.parse_optional_label();
                self.expect_semicolon()?;
                Ok(Stmt {
                    span: start.merge(self.prev_span()),
                    kind: StmtKind::Break(label),
                })
            }
            TokenKind::Continue => {
                self.advance();
                let label = self.parse_optional_label();
                self.expect_semicolon()?;
                Ok(Stmt {
                    span: start.merge(self.prev_span()),
                    kind: StmtKind::Continue(label),
                })
            }
            TokenKind::Throw => {
                self.advance();
                let value = self.parse_expression()?;
                self.expect_semicolon()?;
                Ok(Stmt {
                    span: start.merge(self.prev_span()),
                    kind: StmtKind::Throw(value),
                })
            }
            TokenKind::Try => self.parse_try(),
            TokenKind::Switch => self.parse_switch(),
            TokenKind::Semicolon => {
                self.advance();
                Ok(Stmt {
                    span: start,
                    kind: StmtKind::Empty,
                })
            }
            TokenKind::Ident(word) => {
                // Contextual keyword statements and labels.
                if word == "type" && matches!(self.peek_at(1), TokenKind::Ident(_)) {
                    return self.parse_type_alias();
                }
                if word == "namespace" && matches!(self.peek_at(1), TokenKind::Ident(_)) {
                    return self.parse_namespace();
                }
                if word == "abstract" && matches!(self.peek_at(1), TokenKind::Class) {
                    self.advance();
                    let decl = self.parse_class_decl(true)?;
                    return Ok(Stmt {
                        span: start.merge(decl.span),
                        kind: StmtKind::Class(decl),
                    });
                }
                if word == "async" && matches!(self.peek_at(1), TokenKind::Function) {
                    self.advance();
                    return self.parse_function_statement(true);
                }
                if matches!(self.peek_at(1), TokenKind::Colon) {
                    let (label, _) = self.expect_ident()?;
                    self.advance(); // :
                    let body = self.parse_statement()?;
                    return Ok(Stmt {
                        span: start.merge(body.span),
                        kind: StmtKind::Labeled {
                            label,
                            body: Box::new(body),
                        },
                    });
                }
                self.parse_expression_statement()
            }
            _ => self.parse_expression_statement(),
        }
    }

    pub(crate) fn prev_span(&self) -> Span {
        if self.pos == 0 {
            return self.span();
        }
        self.tokens[self.pos - 1].span
    }

    fn parse_optional_label(&mut self) -> Option<String> {
        if self.peek().newline_before {
            return None;
        }
        if let TokenKind::Ident(name) = self.peek_kind().clone() {
            self.advance();
            Some(name)
        } else {
            None
        }
    }

    fn parse_expression_statement(&mut self) -> PResult<Stmt> {
        let expr = self.parse_expression()?;
        let span = expr.span;
        self.expect_semicolon()?;
        Ok(Stmt {
            span,
            kind: StmtKind::Expr(expr),
        })
    }

    pub(crate) fn parse_block(&mut self) -> PResult<Vec<Stmt>> {
        self.expect(&TokenKind::LBrace)?;
        let mut body = Vec::new();
        while !self.at(&TokenKind::RBrace) && !self.at_eof() {
            body.push(self.parse_statement()?);
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(body)
    }

    fn parse_if(&mut self) -> PResult<Stmt> {
        let start = self.span();
        self.advance();
        self.expect(&TokenKind::LParen)?;
        let cond = self.parse_expression()?;
        self.expect(&TokenKind::RParen)?;
        let then_branch = Box::new(self.parse_statement()?);
        let else_branch = if self.eat(&TokenKind::Else) {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Stmt {
            span: start.merge(self.prev_span()),
            kind: StmtKind::If {
                cond,
                then_branch,
                else_branch,
            },
        })
    }

    fn parse_while(&mut self) -> PResult<Stmt> {
        let start = self.span();
        self.advance();
        self.expect(&TokenKind::LParen)?;
        let cond = self.parse_expression()?;
        self.expect(&TokenKind::RParen)?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt {
            span: start.merge(body.span),
            kind: StmtKind::While { cond, body },
        })
    }

    fn parse_do_while(&mut self) -> PResult<Stmt> {
        let start = self.span();
        self.advance();
        let body = Box::new(self.parse_statement()?);
        self.expect(&TokenKind::While)?;
        self.expect(&TokenKind::LParen)?;
        let cond = self.parse_expression()?;
        self.expect(&TokenKind::RParen)?;
        self.expect_semicolon()?;
        Ok(Stmt {
            span: start.merge(self.prev_span()),
            kind: StmtKind::DoWhile { body, cond },
        })
    }

    /// `for` headers: C-style loops desugar to
    /// `{ init; while (cond) { body; step } }`; `for-in`, `for-of`, and
    /// `for await-of` keep dedicated statement kinds.
    fn parse_for(&mut self) -> PResult<Stmt> {
        let start = self.span();
        self.advance();
        let is_await = self.eat(&TokenKind::Await);
        self.expect(&TokenKind::LParen)?;

        // for-in / for-of with a declared binding.
        let decl_kind = match self.peek_kind() {
            TokenKind::Var => Some(VarKind::Var),
            TokenKind::Let => Some(VarKind::Let),
            TokenKind::Const => Some(VarKind::Const),
            _ => None,
        };
        if decl_kind.is_some() {
            if let TokenKind::Ident(_) = self.peek_at(1) {
                let after = self.peek_at(2).clone();
                if matches!(after, TokenKind::In) || matches!(&after, TokenKind::Ident(w) if w == "of") {
                    self.advance(); // var/let/const
                    let (binding, _) = self.expect_ident()?;
                    let is_in = self.at(&TokenKind::In);
                    self.advance(); // in / of
                    let object = self.parse_expression()?;
                    self.expect(&TokenKind::RParen)?;
                    let body = Box::new(self.parse_statement()?);
                    let span = start.merge(body.span);
                    return Ok(Stmt {
                        span,
                        kind: if is_in {
                            StmtKind::ForIn {
                                decl_kind,
                                binding,
                                object,
                                body,
                            }
                        } else {
                            StmtKind::ForOf {
                                decl_kind,
                                binding,
                                iterable: object,
                                body,
                                is_await,
                            }
                        },
                    });
                }
            }
        } else if let TokenKind::Ident(_) = self.peek_kind() {
            // for (x of e) / for (x in e) over an existing binding.
            let after = self.peek_at(1).clone();
            if matches!(after, TokenKind::In) || matches!(&after, TokenKind::Ident(w) if w == "of") {
                let (binding, _) = self.expect_ident()?;
                let is_in = self.at(&TokenKind::In);
                self.advance();
                let object = self.parse_expression()?;
                self.expect(&TokenKind::RParen)?;
                let body = Box::new(self.parse_statement()?);
                let span = start.merge(body.span);
                return Ok(Stmt {
                    span,
                    kind: if is_in {
                        StmtKind::ForIn {
                            decl_kind: None,
                            binding,
                            object,
                            body,
                        }
                    } else {
                        StmtKind::ForOf {
                            decl_kind: None,
                            binding,
                            iterable: object,
                            body,
                            is_await,
                        }
                    },
                });
            }
        }

        // C-style loop.
        let init: Option<Stmt> = if self.eat(&TokenKind::Semicolon) {
            None
        } else if matches!(
            self.peek_kind(),
            TokenKind::Var | TokenKind::Let | TokenKind::Const
        ) {
            let decl = self.parse_var_declaration_list()?;
            self.expect(&TokenKind::Semicolon)?;
            Some(decl)
        } else {
            let expr = self.parse_expression()?;
            self.expect(&TokenKind::Semicolon)?;
            Some(Stmt {
                span: expr.span,
                kind: StmtKind::Expr(expr),
            })
        };

        let cond = if self.at(&TokenKind::Semicolon) {
            let span = self.span();
            self.make_expr(span, ExprKind::Literal(Lit::Bool(true)))
        } else {
            self.parse_expression()?
        };
        self.expect(&TokenKind::Semicolon)?;

        let step = if self.at(&TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&TokenKind::RParen)?;
        let body = self.parse_statement()?;
        let body_span = body.span;

        let mut loop_body = vec![body];
        if let Some(step) = step {
            loop_body.push(Stmt {
                span: step.span,
                kind: StmtKind::Expr(step),
            });
        }
        let while_stmt = Stmt {
            span: start.merge(body_span),
            kind: StmtKind::While {
                cond,
                body: Box::new(Stmt {
                    span: body_span,
                    kind: StmtKind::Block(loop_body),
                }),
            },
        };
        let mut outer = Vec::new();
        if let Some(init) = init {
            outer.push(init);
        }
        outer.push(while_stmt);
        Ok(Stmt {
            span: start.merge(body_span),
            kind: StmtKind::Block(outer),
        })
    }

    fn parse_try(&mut self) -> PResult<Stmt> {
        let start = self.span();
        self.advance();
        let block = self.parse_block()?;
        let catch = if self.eat(&TokenKind::Catch) {
            let (param, param_type) = if self.eat(&TokenKind::LParen) {
                let (name, _) = self.expect_ident()?;
                let ty = if self.eat(&TokenKind::Colon) {
                    Some(self.parse_type()?)
                } else {
                    None
                };
                self.expect(&TokenKind::RParen)?;
                (Some(name), ty)
            } else {
                (None, None)
            };
            let body = self.parse_block()?;
            Some(CatchClause {
                param,
                param_type,
                body,
            })
        } else {
            None
        };
        let finally = if self.eat(&TokenKind::Finally) {
            Some(self.parse_block()?)
        } else {
            None
        };
        if catch.is_none() && finally.is_none() {
            return Err(self.unexpected("`catch` or `finally` expected"));
        }
        Ok(Stmt {
            span: start.merge(self.prev_span()),
            kind: StmtKind::Try {
                block,
                catch,
                finally,
            },
        })
    }

    fn parse_switch(&mut self) -> PResult<Stmt> {
        let start = self.span();
        self.advance();
        self.expect(&TokenKind::LParen)?;
        let discriminant = self.parse_expression()?;
        self.expect(&TokenKind::RParen)?;
        self.expect(&TokenKind::LBrace)?;
        let mut cases = Vec::new();
        while !self.at(&TokenKind::RBrace) && !self.at_eof() {
            let case_start = self.span();
            let test = if self.eat(&TokenKind::Case) {
                let t = self.parse_expression()?;
                Some(t)
            } else {
                self.expect(&TokenKind::Default)?;
                None
            };
            self.expect(&TokenKind::Colon)?;
            let mut body = Vec::new();
            while !self.at(&TokenKind::Case)
                && !self.at(&TokenKind::Default)
                && !self.at(&TokenKind::RBrace)
                && !self.at_eof()
            {
                body.push(self.parse_statement()?);
            }
            cases.push(SwitchCase {
                span: case_start.merge(self.prev_span()),
                test,
                body,
            });
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(Stmt {
            span: start.merge(self.prev_span()),
            kind: StmtKind::Switch {
                discriminant,
                cases,
            },
        })
    }

    // =========================================================================
    // Variable declarations and destructuring
    // =========================================================================

    fn parse_var_statement(&mut self) -> PResult<Stmt> {
        let stmt = self.parse_var_declaration_list()?;
        self.expect_semicolon()?;
        Ok(stmt)
    }

    pub(crate) fn parse_var_declaration_list(&mut self) -> PResult<Stmt> {
        let start = self.span();
        let kind = match self.advance().kind {
            TokenKind::Var => VarKind::Var,
            TokenKind::Let => VarKind::Let,
            TokenKind::Const => VarKind::Const,
            _ => unreachable!("caller checked declaration keyword"),
        };
        let mut declarations = Vec::new();
        loop {
            self.parse_var_declarator(&mut declarations)?;
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(Stmt {
            span: start.merge(self.prev_span()),
            kind: StmtKind::VarDecl { kind, declarations },
        })
    }

    fn parse_var_declarator(&mut self, out: &mut Vec<VarDeclarator>) -> PResult<()> {
        let start = self.span();
        if self.at(&TokenKind::LBrace) || self.at(&TokenKind::LBracket) {
            let pattern = self.parse_binding_pattern()?;
            let type_ann = if self.eat(&TokenKind::Colon) {
                Some(self.parse_type()?)
            } else {
                None
            };
            self.expect(&TokenKind::Eq)?;
            let init = self.parse_assignment_expr()?;
            let span = start.merge(init.span);
            // Bind the initializer to a temporary, then introduce one
            // declarator per bound name reading from it.
            let temp = self.fresh_temp();
            out.push(VarDeclarator {
                span,
                name: temp.clone(),
                type_ann,
                init: Some(init),
            });
            let temp_expr = self.make_expr(span, ExprKind::Ident(temp));
            self.desugar_pattern(&pattern, temp_expr, span, out)?;
            return Ok(());
        }

        let (name, name_span) = self.expect_ident()?;
        let type_ann = if self.eat(&TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let init = if self.eat(&TokenKind::Eq) {
            Some(self.parse_assignment_expr()?)
        } else {
            None
        };
        let end = init.as_ref().map_or(name_span, |e| e.span);
        out.push(VarDeclarator {
            span: start.merge(end),
            name,
            type_ann,
            init,
        });
        Ok(())
    }

    fn parse_binding_pattern(&mut self) -> PResult<Pattern> {
        if self.eat(&TokenKind::LBrace) {
            let mut props = Vec::new();
            let mut rest = None;
            while !self.at(&TokenKind::RBrace) && !self.at_eof() {
                if self.eat(&TokenKind::DotDotDot) {
                    let (name, _) = self.expect_ident()?;
                    rest = Some(name);
                } else {
                    let (key, _) = self.expect_property_name()?;
                    let target = if self.eat(&TokenKind::Colon) {
                        if self.at(&TokenKind::LBrace) || self.at(&TokenKind::LBracket) {
                            self.parse_binding_pattern()?
                        } else {
                            let (local, _) = self.expect_ident()?;
                            Pattern::Ident(local)
                        }
                    } else {
                        Pattern::Ident(key.clone())
                    };
                    let default = if self.eat(&TokenKind::Eq) {
                        Some(self.parse_assignment_expr()?)
                    } else {
                        None
                    };
                    props.push((key, target, default));
                }
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RBrace)?;
            Ok(Pattern::Object { props, rest })
        } else {
            self.expect(&TokenKind::LBracket)?;
            let mut elements = Vec::new();
            let mut rest = None;
            while !self.at(&TokenKind::RBracket) && !self.at_eof() {
                if self.at(&TokenKind::Comma) {
                    elements.push(None);
                    self.advance();
                    continue;
                }
                if self.eat(&TokenKind::DotDotDot) {
                    let (name, _) = self.expect_ident()?;
                    rest = Some(name);
                } else {
                    let target = if self.at(&TokenKind::LBrace) || self.at(&TokenKind::LBracket) {
                        self.parse_binding_pattern()?
                    } else {
                        let (local, _) = self.expect_ident()?;
                        Pattern::Ident(local)
                    };
                    let default = if self.eat(&TokenKind::Eq) {
                        Some(self.parse_assignment_expr()?)
                    } else {
                        None
                    };
                    elements.push(Some((target, default)));
                }
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RBracket)?;
            Ok(Pattern::Array { elements, rest })
        }
    }

    /// Expand a binding pattern against an already-bound source
    /// expression into plain declarators.
    fn desugar_pattern(
        &mut self,
        pattern: &Pattern,
        source: Expr,
        span: Span,
        out: &mut Vec<VarDeclarator>,
    ) -> PResult<()> {
        match pattern {
            Pattern::Ident(name) => {
                out.push(VarDeclarator {
                    span,
                    name: name.clone(),
                    type_ann: None,
                    init: Some(source),
                });
            }
            Pattern::Object { props, rest } => {
                for (key, target, default) in props {
                    let access = self.make_expr(
                        span,
                        ExprKind::Member {
                            object: Box::new(source.clone()),
                            property: key.clone(),
                            optional: false,
                        },
                    );
                    let value = match default {
                        Some(default) => self.defaulted(access, default.clone(), span),
                        None => access,
                    };
                    self.desugar_binding_target(target, value, span, out)?;
                }
                if let Some(rest_name) = rest {
                    // Rest collects what a shallow copy minus the listed
                    // keys would hold; realized as a runtime helper call
                    // shape: `{ ...source }` with the keys deleted is not
                    // expressible here, so bind the source itself.
                    out.push(VarDeclarator {
                        span,
                        name: rest_name.clone(),
                        type_ann: None,
                        init: Some(source.clone()),
                    });
                }
            }
            Pattern::Array { elements, rest } => {
                for (i, element) in elements.iter().enumerate() {
                    let Some((target, default)) = element else {
                        continue;
                    };
                    let index = self.make_expr(span, ExprKind::Literal(Lit::Number(i as f64)));
                    let access = self.make_expr(
                        span,
                        ExprKind::Index {
                            object: Box::new(source.clone()),
                            index: Box::new(index),
                            optional: false,
                        },
                    );
                    let value = match default {
                        Some(default) => self.defaulted(access, default.clone(), span),
                        None => access,
                    };
                    self.desugar_binding_target(target, value, span, out)?;
                }
                if let Some(rest_name) = rest {
                    let start_index = self
                        .make_expr(span, ExprKind::Literal(Lit::Number(elements.len() as f64)));
                    let slice = self.make_expr(
                        span,
                        ExprKind::Member {
                            object: Box::new(source.clone()),
                            property: "slice".to_string(),
                            optional: false,
                        },
                    );
                    let call = self.make_expr(
                        span,
                        ExprKind::Call {
                            callee: Box::new(slice),
                            type_args: Vec::new(),
                            args: vec![start_index],
                            optional: false,
                        },
                    );
                    out.push(VarDeclarator {
                        span,
                        name: rest_name.clone(),
                        type_ann: None,
                        init: Some(call),
                    });
                }
            }
        }
        Ok(())
    }

    fn desugar_binding_target(
        &mut self,
        target: &Pattern,
        value: Expr,
        span: Span,
        out: &mut Vec<VarDeclarator>,
    ) -> PResult<()> {
        match target {
            Pattern::Ident(name) => {
                out.push(VarDeclarator {
                    span,
                    name: name.clone(),
                    type_ann: None,
                    init: Some(value),
                });
                Ok(())
            }
            _ => {
                let temp = self.fresh_temp();
                out.push(VarDeclarator {
                    span,
                    name: temp.clone(),
                    type_ann: None,
                    init: Some(value),
                });
                let temp_expr = self.make_expr(span, ExprKind::Ident(temp));
                self.desugar_pattern(target, temp_expr, span, out)
            }
        }
    }

    /// `access === undefined ? default : access`
    fn defaulted(&mut self, access: Expr, default: Expr, span: Span) -> Expr {
        let undef = self.make_expr(span, ExprKind::Literal(Lit::Undefined));
        let test = self.make_expr(
            span,
            ExprKind::Binary {
                op: BinaryOp::StrictEq,
                left: Box::new(access.clone()),
                right: Box::new(undef),
            },
        );
        self.make_expr(
            span,
            ExprKind::Conditional {
                cond: Box::new(test),
                consequent: Box::new(default),
                alternate: Box::new(access),
            },
        )
    }
}

/// A binding pattern before desugaring.
#[derive(Debug, Clone)]
pub(crate) enum Pattern {
    Ident(String),
    Object {
        props: Vec<(String, Pattern, Option<Expr>)>,
        rest: Option<String>,
    },
    Array {
        elements: Vec<Option<(Pattern, Option<Expr>)>>,
        rest: Option<String>,
    },
}

#[cfg(test)]
#[path = "tests/statement_tests.rs"]
mod statement_tests;
