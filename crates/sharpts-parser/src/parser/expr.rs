//! Expression parsing: a precedence ladder from sequence down to
//! primary, with backtracking for arrow functions, `<T>expr`
//! assertions, and explicit type arguments in call position.

use sharpts_scanner::token::TokenKind;

use super::{PResult, Parser};
use crate::ast::*;

impl Parser {
    /// Full expression including the comma operator.
    pub(crate) fn parse_expression(&mut self) -> PResult<Expr> {
        let first = self.parse_assignment_expr()?;
        if !self.at(&TokenKind::Comma) {
            return Ok(first);
        }
        let start = first.span;
        let mut parts = vec![first];
        while self.eat(&TokenKind::Comma) {
            parts.push(self.parse_assignment_expr()?);
        }
        let span = start.merge(parts.last().map(|e| e.span).unwrap_or(start));
        Ok(self.make_expr(span, ExprKind::Sequence(parts)))
    }

    pub(crate) fn parse_assignment_expr(&mut self) -> PResult<Expr> {
        self.enter_depth()?;
        let result = self.parse_assignment_inner();
        self.leave_depth();
        result
    }

    fn parse_assignment_inner(&mut self) -> PResult<Expr> {
        if self.at(&TokenKind::Yield) {
            return self.parse_yield();
        }
        if let Some(arrow) = self.try_parse_arrow()? {
            return Ok(arrow);
        }
        let left = self.parse_conditional_expr()?;
        if let Some(op) = assign_op(self.peek_kind()) {
            if !is_valid_assign_target(&left) {
                return Err(self.unexpected("Invalid assignment target"));
            }
            self.advance();
            let value = self.parse_assignment_expr()?;
            let span = left.span.merge(value.span);
            return Ok(self.make_expr(
                span,
                ExprKind::Assign {
                    op,
                    target: Box::new(left),
                    value: Box::new(value),
                },
            ));
        }
        Ok(left)
    }

    fn parse_yield(&mut self) -> PResult<Expr> {
        let start = self.span();
        self.advance();
        let delegate = self.eat(&TokenKind::Star);
        let argument = if self.at(&TokenKind::Semicolon)
            || self.at(&TokenKind::RBrace)
            || self.at(&TokenKind::RParen)
            || self.at(&TokenKind::RBracket)
            || self.at(&TokenKind::Comma)
            || self.at(&TokenKind::Colon)
            || self.at_eof()
            || (!delegate && self.peek().newline_before)
        {
            None
        } else {
            Some(Box::new(self.parse_assignment_expr()?))
        };
        let span = start.merge(argument.as_ref().map_or(start, |e| e.span));
        Ok(self.make_expr(span, ExprKind::Yield { argument, delegate }))
    }

    // =========================================================================
    // Arrow functions
    // =========================================================================

    fn try_parse_arrow(&mut self) -> PResult<Option<Expr>> {
        let start = self.span();
        let mut is_async = false;
        let mark = self.mark();

        if self.at_ident("async")
            && !matches!(self.peek_at(1), TokenKind::Arrow)
            && matches!(
                self.peek_at(1),
                TokenKind::Ident(_) | TokenKind::LParen | TokenKind::Lt
            )
        {
            self.advance();
            is_async = true;
        }

        // `x => ...`
        if let TokenKind::Ident(name) = self.peek_kind().clone() {
            if matches!(self.peek_at(1), TokenKind::Arrow) {
                let param_span = self.span();
                self.advance();
                self.advance(); // =>
                let body = self.parse_arrow_body()?;
                let span = start.merge(self.prev_span());
                let param = Param {
                    span: param_span,
                    name,
                    type_ann: None,
                    optional: false,
                    rest: false,
                    default: None,
                    accessibility: None,
                    readonly: false,
                };
                return Ok(Some(self.make_expr(
                    span,
                    ExprKind::Arrow {
                        type_params: Vec::new(),
                        params: vec![param],
                        return_type: None,
                        body,
                        is_async,
                    },
                )));
            }
            if is_async {
                self.reset(mark);
                return Ok(None);
            }
        }

        if !self.at(&TokenKind::LParen) && !self.at(&TokenKind::Lt) {
            if is_async {
                self.reset(mark);
            }
            return Ok(None);
        }

        // `(params) => ...` or `<T>(params) => ...` -- attempt, roll back on
        // failure.
        let attempt = (|| -> PResult<(Vec<TypeParamDecl>, Vec<Param>, Option<TypeAnn>)> {
            let type_params = if self.at(&TokenKind::Lt) {
                self.parse_type_params()?
            } else {
                Vec::new()
            };
            self.expect(&TokenKind::LParen)?;
            let params = self.parse_param_list()?;
            let return_type = if self.eat(&TokenKind::Colon) {
                Some(self.parse_return_type()?)
            } else {
                None
            };
            self.expect(&TokenKind::Arrow)?;
            Ok((type_params, params, return_type))
        })();

        match attempt {
            Ok((type_params, params, return_type)) => {
                let body = self.parse_arrow_body()?;
                let span = start.merge(self.prev_span());
                Ok(Some(self.make_expr(
                    span,
                    ExprKind::Arrow {
                        type_params,
                        params,
                        return_type,
                        body,
                        is_async,
                    },
                )))
            }
            Err(_) => {
                self.reset(mark);
                Ok(None)
            }
        }
    }

    fn parse_arrow_body(&mut self) -> PResult<ArrowBody> {
        if self.at(&TokenKind::LBrace) {
            Ok(ArrowBody::Block(self.parse_block()?))
        } else {
            Ok(ArrowBody::Expr(Box::new(self.parse_assignment_expr()?)))
        }
    }

    // =========================================================================
    // Precedence ladder
    // =========================================================================

    fn parse_conditional_expr(&mut self) -> PResult<Expr> {
        let cond = self.parse_nullish()?;
        if !self.at(&TokenKind::Question) {
            return Ok(cond);
        }
        self.advance();
        let consequent = self.parse_assignment_expr()?;
        self.expect(&TokenKind::Colon)?;
        let alternate = self.parse_assignment_expr()?;
        let span = cond.span.merge(alternate.span);
        Ok(self.make_expr(
            span,
            ExprKind::Conditional {
                cond: Box::new(cond),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            },
        ))
    }

    fn parse_nullish(&mut self) -> PResult<Expr> {
        let mut left = self.parse_logical_or()?;
        while self.eat(&TokenKind::QuestionQuestion) {
            let right = self.parse_logical_or()?;
            let span = left.span.merge(right.span);
            left = self.make_expr(
                span,
                ExprKind::Logical {
                    op: LogicalOp::Nullish,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            );
        }
        Ok(left)
    }

    fn parse_logical_or(&mut self) -> PResult<Expr> {
        let mut left = self.parse_logical_and()?;
        while self.eat(&TokenKind::PipePipe) {
            let right = self.parse_logical_and()?;
            let span = left.span.merge(right.span);
            left = self.make_expr(
                span,
                ExprKind::Logical {
                    op: LogicalOp::Or,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            );
        }
        Ok(left)
    }

    fn parse_logical_and(&mut self) -> PResult<Expr> {
        let mut left = self.parse_bit_or()?;
        while self.eat(&TokenKind::AmpAmp) {
            let right = self.parse_bit_or()?;
            let span = left.span.merge(right.span);
            left = self.make_expr(
                span,
                ExprKind::Logical {
                    op: LogicalOp::And,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            );
        }
        Ok(left)
    }

    fn parse_bit_or(&mut self) -> PResult<Expr> {
        let mut left = self.parse_bit_xor()?;
        while self.at(&TokenKind::Pipe) {
            self.advance();
            let right = self.parse_bit_xor()?;
            left = self.binary(BinaryOp::BitOr, left, right);
        }
        Ok(left)
    }

    fn parse_bit_xor(&mut self) -> PResult<Expr> {
        let mut left = self.parse_bit_and()?;
        while self.at(&TokenKind::Caret) {
            self.advance();
            let right = self.parse_bit_and()?;
            left = self.binary(BinaryOp::BitXor, left, right);
        }
        Ok(left)
    }

    fn parse_bit_and(&mut self) -> PResult<Expr> {
        let mut left = self.parse_equality()?;
        while self.at(&TokenKind::Amp) {
            self.advance();
            let right = self.parse_equality()?;
            left = self.binary(BinaryOp::BitAnd, left, right);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> PResult<Expr> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::EqEqEq => BinaryOp::StrictEq,
                TokenKind::BangEq => BinaryOp::Neq,
                TokenKind::BangEqEq => BinaryOp::StrictNeq,
                _ => break,
            };
            self.advance();
            let right = self.parse_relational()?;
            left = self.binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> PResult<Expr> {
        let mut left = self.parse_shift()?;
        loop {
            // `as T` binds at relational precedence.
            if self.at_ident("as") && !self.peek().newline_before {
                self.advance();
                let ty = self.parse_type()?;
                let span = left.span.merge(ty.span);
                left = self.make_expr(
                    span,
                    ExprKind::TypeAssertion {
                        expr: Box::new(left),
                        ty,
                    },
                );
                continue;
            }
            let op = match self.peek_kind() {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::LtEq => BinaryOp::LtEq,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::GtEq => BinaryOp::GtEq,
                TokenKind::Instanceof => BinaryOp::Instanceof,
                TokenKind::In => BinaryOp::In,
                _ => break,
            };
            self.advance();
            let right = self.parse_shift()?;
            left = self.binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_shift(&mut self) -> PResult<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::LtLt => BinaryOp::Shl,
                TokenKind::GtGt => BinaryOp::Shr,
                TokenKind::GtGtGt => BinaryOp::UShr,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = self.binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> PResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = self.binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> PResult<Expr> {
        let mut left = self.parse_exponent()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Rem,
                _ => break,
            };
            self.advance();
            let right = self.parse_exponent()?;
            left = self.binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_exponent(&mut self) -> PResult<Expr> {
        let base = self.parse_unary()?;
        if self.at(&TokenKind::StarStar) {
            self.advance();
            // Right associative.
            let exponent = self.parse_exponent()?;
            return Ok(self.binary(BinaryOp::Exp, base, exponent));
        }
        Ok(base)
    }

    fn binary(&mut self, op: BinaryOp, left: Expr, right: Expr) -> Expr {
        let span = left.span.merge(right.span);
        self.make_expr(
            span,
            ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
        )
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        self.enter_depth()?;
        let result = self.parse_unary_inner();
        self.leave_depth();
        result
    }

    fn parse_unary_inner(&mut self) -> PResult<Expr> {
        let start = self.span();
        let op = match self.peek_kind() {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            TokenKind::Typeof => Some(UnaryOp::Typeof),
            TokenKind::Void => Some(UnaryOp::Void),
            TokenKind::Delete => Some(UnaryOp::Delete),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.parse_unary()?;
            let span = start.merge(operand.span);
            return Ok(self.make_expr(
                span,
                ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
            ));
        }
        if self.at(&TokenKind::Await) {
            self.advance();
            let operand = self.parse_unary()?;
            let span = start.merge(operand.span);
            return Ok(self.make_expr(span, ExprKind::Await(Box::new(operand))));
        }
        if self.at(&TokenKind::PlusPlus) || self.at(&TokenKind::MinusMinus) {
            let op = if self.at(&TokenKind::PlusPlus) {
                UpdateOp::Inc
            } else {
                UpdateOp::Dec
            };
            self.advance();
            let operand = self.parse_unary()?;
            let span = start.merge(operand.span);
            return Ok(self.make_expr(
                span,
                ExprKind::Update {
                    op,
                    prefix: true,
                    operand: Box::new(operand),
                },
            ));
        }
        // `<T>expr` type assertion.
        if self.at(&TokenKind::Lt) {
            let mark = self.mark();
            let attempt = (|| -> PResult<(TypeAnn, Expr)> {
                self.advance();
                let ty = self.parse_type()?;
                self.consume_greater()?;
                let expr = self.parse_unary()?;
                Ok((ty, expr))
            })();
            match attempt {
                Ok((ty, expr)) => {
                    let span = start.merge(expr.span);
                    return Ok(self.make_expr(
                        span,
                        ExprKind::TypeAssertion {
                            expr: Box::new(expr),
                            ty,
                        },
                    ));
                }
                Err(_) => self.reset(mark),
            }
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let expr = self.parse_call_chain()?;
        if (self.at(&TokenKind::PlusPlus) || self.at(&TokenKind::MinusMinus))
            && !self.peek().newline_before
        {
            let op = if self.at(&TokenKind::PlusPlus) {
                UpdateOp::Inc
            } else {
                UpdateOp::Dec
            };
            let end = self.advance().span;
            let span = expr.span.merge(end);
            return Ok(self.make_expr(
                span,
                ExprKind::Update {
                    op,
                    prefix: false,
                    operand: Box::new(expr),
                },
            ));
        }
        Ok(expr)
    }

    pub(crate) fn parse_call_chain(&mut self) -> PResult<Expr> {
        let mut expr = if self.at(&TokenKind::New) {
            self.parse_new_expr()?
        } else {
            self.parse_primary()?
        };
        loop {
            match self.peek_kind().clone() {
                TokenKind::Dot => {
                    self.advance();
                    let (property, prop_span) = self.expect_property_name()?;
                    let span = expr.span.merge(prop_span);
                    expr = self.make_expr(
                        span,
                        ExprKind::Member {
                            object: Box::new(expr),
                            property,
                            optional: false,
                        },
                    );
                }
                TokenKind::QuestionDot => {
                    self.advance();
                    if self.at(&TokenKind::LParen) {
                        let args = self.parse_call_args()?;
                        let span = expr.span.merge(self.prev_span());
                        expr = self.make_expr(
                            span,
                            ExprKind::Call {
                                callee: Box::new(expr),
                                type_args: Vec::new(),
                                args,
                                optional: true,
                            },
                        );
                    } else if self.at(&TokenKind::LBracket) {
                        self.advance();
                        let index = self.parse_expression()?;
                        let end = self.expect(&TokenKind::RBracket)?;
                        let span = expr.span.merge(end);
                        expr = self.make_expr(
                            span,
                            ExprKind::Index {
                                object: Box::new(expr),
                                index: Box::new(index),
                                optional: true,
                            },
                        );
                    } else {
                        let (property, prop_span) = self.expect_property_name()?;
                        let span = expr.span.merge(prop_span);
                        expr = self.make_expr(
                            span,
                            ExprKind::Member {
                                object: Box::new(expr),
                                property,
                                optional: true,
                            },
                        );
                    }
                }
                TokenKind::LParen => {
                    let args = self.parse_call_args()?;
                    let span = expr.span.merge(self.prev_span());
                    expr = self.make_expr(
                        span,
                        ExprKind::Call {
                            callee: Box::new(expr),
                            type_args: Vec::new(),
                            args,
                            optional: false,
                        },
                    );
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expression()?;
                    let end = self.expect(&TokenKind::RBracket)?;
                    let span = expr.span.merge(end);
                    expr = self.make_expr(
                        span,
                        ExprKind::Index {
                            object: Box::new(expr),
                            index: Box::new(index),
                            optional: false,
                        },
                    );
                }
                TokenKind::Bang if !self.peek().newline_before => {
                    let end = self.advance().span;
                    let span = expr.span.merge(end);
                    expr = self.make_expr(span, ExprKind::NonNull(Box::new(expr)));
                }
                TokenKind::Lt => {
                    // Explicit type arguments: `f<T>(...)`. Backtrack when
                    // this is really a less-than comparison.
                    let mark = self.mark();
                    let attempt = (|| -> PResult<(Vec<TypeAnn>, Vec<Expr>)> {
                        let type_args = self.parse_type_args()?;
                        if !self.at(&TokenKind::LParen) {
                            return Err(self.unexpected("`(` expected"));
                        }
                        let args = self.parse_call_args()?;
                        Ok((type_args, args))
                    })();
                    match attempt {
                        Ok((type_args, args)) => {
                            let span = expr.span.merge(self.prev_span());
                            expr = self.make_expr(
                                span,
                                ExprKind::Call {
                                    callee: Box::new(expr),
                                    type_args,
                                    args,
                                    optional: false,
                                },
                            );
                        }
                        Err(_) => {
                            self.reset(mark);
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_new_expr(&mut self) -> PResult<Expr> {
        let start = self.span();
        self.expect(&TokenKind::New)?;
        // The callee is a member chain without call parentheses.
        let mut callee = self.parse_primary()?;
        loop {
            if self.at(&TokenKind::Dot) {
                self.advance();
                let (property, prop_span) = self.expect_property_name()?;
                let span = callee.span.merge(prop_span);
                callee = self.make_expr(
                    span,
                    ExprKind::Member {
                        object: Box::new(callee),
                        property,
                        optional: false,
                    },
                );
            } else {
                break;
            }
        }
        let type_args = if self.at(&TokenKind::Lt) {
            let mark = self.mark();
            match self.parse_type_args() {
                Ok(args) if self.at(&TokenKind::LParen) => args,
                _ => {
                    self.reset(mark);
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };
        let args = if self.at(&TokenKind::LParen) {
            self.parse_call_args()?
        } else {
            Vec::new()
        };
        let span = start.merge(self.prev_span());
        Ok(self.make_expr(
            span,
            ExprKind::New {
                callee: Box::new(callee),
                type_args,
                args,
            },
        ))
    }

    pub(crate) fn parse_call_args(&mut self) -> PResult<Vec<Expr>> {
        self.expect(&TokenKind::LParen)?;
        let mut args = Vec::new();
        while !self.at(&TokenKind::RParen) && !self.at_eof() {
            if self.at(&TokenKind::DotDotDot) {
                let start = self.span();
                self.advance();
                let inner = self.parse_assignment_expr()?;
                let span = start.merge(inner.span);
                args.push(self.make_expr(span, ExprKind::Spread(Box::new(inner))));
            } else {
                args.push(self.parse_assignment_expr()?);
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen)?;
        Ok(args)
    }

    // =========================================================================
    // Primary expressions
    // =========================================================================

    fn parse_primary(&mut self) -> PResult<Expr> {
        let start = self.span();
        match self.peek_kind().clone() {
            TokenKind::Number(value) => {
                self.advance();
                Ok(self.make_expr(start, ExprKind::Literal(Lit::Number(value))))
            }
            TokenKind::BigInt(value) => {
                self.advance();
                Ok(self.make_expr(start, ExprKind::Literal(Lit::BigInt(value))))
            }
            TokenKind::Str(value) => {
                self.advance();
                Ok(self.make_expr(start, ExprKind::Literal(Lit::Str(value))))
            }
            TokenKind::Regex { pattern, flags } => {
                self.advance();
                Ok(self.make_expr(start, ExprKind::Literal(Lit::Regex { pattern, flags })))
            }
            TokenKind::True => {
                self.advance();
                Ok(self.make_expr(start, ExprKind::Literal(Lit::Bool(true))))
            }
            TokenKind::False => {
                self.advance();
                Ok(self.make_expr(start, ExprKind::Literal(Lit::Bool(false))))
            }
            TokenKind::Null => {
                self.advance();
                Ok(self.make_expr(start, ExprKind::Literal(Lit::Null)))
            }
            TokenKind::This => {
                self.advance();
                Ok(self.make_expr(start, ExprKind::This))
            }
            TokenKind::Super => {
                self.advance();
                Ok(self.make_expr(start, ExprKind::Super))
            }
            TokenKind::Ident(name) => {
                self.advance();
                if name == "undefined" {
                    Ok(self.make_expr(start, ExprKind::Literal(Lit::Undefined)))
                } else {
                    Ok(self.make_expr(start, ExprKind::Ident(name)))
                }
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                let end = self.expect(&TokenKind::RParen)?;
                let span = start.merge(end);
                Ok(self.make_expr(span, ExprKind::Paren(Box::new(inner))))
            }
            TokenKind::LBracket => self.parse_array_literal(),
            TokenKind::LBrace => self.parse_object_literal(),
            TokenKind::TemplateFull(text) => {
                self.advance();
                Ok(self.make_expr(
                    start,
                    ExprKind::Template {
                        quasis: vec![text],
                        exprs: Vec::new(),
                    },
                ))
            }
            TokenKind::TemplateHead(head) => {
                self.advance();
                let mut quasis = vec![head];
                let mut exprs = Vec::new();
                loop {
                    exprs.push(self.parse_expression()?);
                    match self.peek_kind().clone() {
                        TokenKind::TemplateMiddle(text) => {
                            self.advance();
                            quasis.push(text);
                        }
                        TokenKind::TemplateTail(text) => {
                            self.advance();
                            quasis.push(text);
                            break;
                        }
                        _ => return Err(self.unexpected("Unterminated template literal")),
                    }
                }
                let span = start.merge(self.prev_span());
                Ok(self.make_expr(span, ExprKind::Template { quasis, exprs }))
            }
            TokenKind::Function => self.parse_function_expr(false),
            TokenKind::Class => {
                let decl = self.parse_class_decl(false)?;
                let span = start.merge(decl.span);
                Ok(self.make_expr(span, ExprKind::ClassExpr(Box::new(decl))))
            }
            _ => {
                if self.at_ident("async") && matches!(self.peek_at(1), TokenKind::Function) {
                    self.advance();
                    return self.parse_function_expr(true);
                }
                Err(self.unexpected("Expression expected"))
            }
        }
    }

    fn parse_array_literal(&mut self) -> PResult<Expr> {
        let start = self.span();
        self.expect(&TokenKind::LBracket)?;
        let mut elements = Vec::new();
        while !self.at(&TokenKind::RBracket) && !self.at_eof() {
            if self.at(&TokenKind::Comma) {
                // Elision: a hole reads as undefined.
                let span = self.span();
                elements.push(self.make_expr(span, ExprKind::Literal(Lit::Undefined)));
                self.advance();
                continue;
            }
            if self.at(&TokenKind::DotDotDot) {
                let spread_start = self.span();
                self.advance();
                let inner = self.parse_assignment_expr()?;
                let span = spread_start.merge(inner.span);
                elements.push(self.make_expr(span, ExprKind::Spread(Box::new(inner))));
            } else {
                elements.push(self.parse_assignment_expr()?);
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        let end = self.expect(&TokenKind::RBracket)?;
        let span = start.merge(end);
        Ok(self.make_expr(span, ExprKind::Array(elements)))
    }

    fn parse_object_literal(&mut self) -> PResult<Expr> {
        let start = self.span();
        self.expect(&TokenKind::LBrace)?;
        let mut props = Vec::new();
        while !self.at(&TokenKind::RBrace) && !self.at_eof() {
            props.push(self.parse_object_prop()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        let end = self.expect(&TokenKind::RBrace)?;
        let span = start.merge(end);
        Ok(self.make_expr(span, ExprKind::Object(props)))
    }

    fn parse_object_prop(&mut self) -> PResult<ObjectProp> {
        let start = self.span();
        if self.at(&TokenKind::DotDotDot) {
            self.advance();
            let inner = self.parse_assignment_expr()?;
            return Ok(ObjectProp {
                span: start.merge(inner.span),
                key: PropName::Ident(String::new()),
                value: ObjectPropValue::Spread(inner),
            });
        }

        // Accessors: `get name() {}` / `set name(v) {}`.
        for (word, is_getter) in [("get", true), ("set", false)] {
            if self.at_ident(word)
                && !matches!(
                    self.peek_at(1),
                    TokenKind::Comma
                        | TokenKind::Colon
                        | TokenKind::LParen
                        | TokenKind::RBrace
                        | TokenKind::Eq
                )
            {
                self.advance();
                let key = self.parse_prop_name()?;
                self.expect(&TokenKind::LParen)?;
                let params = self.parse_param_list()?;
                if self.eat(&TokenKind::Colon) {
                    let _ = self.parse_return_type()?;
                }
                let body = self.parse_block()?;
                let value = if is_getter {
                    ObjectPropValue::Getter(Some(body))
                } else {
                    let param = params.into_iter().next().ok_or_else(|| {
                        self.unexpected("A setter must have exactly one parameter")
                    })?;
                    ObjectPropValue::Setter(param, Some(body))
                };
                return Ok(ObjectProp {
                    span: start.merge(self.prev_span()),
                    key,
                    value,
                });
            }
        }

        let is_async = self.at_ident("async")
            && !matches!(
                self.peek_at(1),
                TokenKind::Comma | TokenKind::Colon | TokenKind::LParen | TokenKind::RBrace
            );
        if is_async {
            self.advance();
        }
        let is_generator = self.eat(&TokenKind::Star);

        let key = self.parse_prop_name()?;

        if self.at(&TokenKind::LParen) || self.at(&TokenKind::Lt) {
            // Method shorthand.
            let type_params = if self.at(&TokenKind::Lt) {
                self.parse_type_params()?
            } else {
                Vec::new()
            };
            self.expect(&TokenKind::LParen)?;
            let params = self.parse_param_list()?;
            let return_type = if self.eat(&TokenKind::Colon) {
                Some(self.parse_return_type()?)
            } else {
                None
            };
            let body = self.parse_block()?;
            return Ok(ObjectProp {
                span: start.merge(self.prev_span()),
                key,
                value: ObjectPropValue::Method(FunctionParts {
                    type_params,
                    params,
                    return_type,
                    body: Some(body),
                    is_async,
                    is_generator,
                }),
            });
        }

        if self.eat(&TokenKind::Colon) {
            let value = self.parse_assignment_expr()?;
            return Ok(ObjectProp {
                span: start.merge(value.span),
                key,
                value: ObjectPropValue::Value(value),
            });
        }

        Ok(ObjectProp {
            span: start.merge(self.prev_span()),
            key,
            value: ObjectPropValue::Shorthand,
        })
    }

    pub(crate) fn parse_prop_name(&mut self) -> PResult<PropName> {
        match self.peek_kind().clone() {
            TokenKind::Str(s) => {
                self.advance();
                Ok(PropName::Str(s))
            }
            TokenKind::Number(n) => {
                self.advance();
                Ok(PropName::Num(n))
            }
            TokenKind::LBracket => {
                self.advance();
                let expr = self.parse_assignment_expr()?;
                self.expect(&TokenKind::RBracket)?;
                Ok(PropName::Computed(expr))
            }
            _ => {
                let (name, _) = self.expect_property_name()?;
                Ok(PropName::Ident(name))
            }
        }
    }

    fn parse_function_expr(&mut self, is_async: bool) -> PResult<Expr> {
        let start = self.span();
        self.expect(&TokenKind::Function)?;
        let is_generator = self.eat(&TokenKind::Star);
        let name = if let TokenKind::Ident(name) = self.peek_kind().clone() {
            self.advance();
            Some(name)
        } else {
            None
        };
        let type_params = if self.at(&TokenKind::Lt) {
            self.parse_type_params()?
        } else {
            Vec::new()
        };
        self.expect(&TokenKind::LParen)?;
        let params = self.parse_param_list()?;
        let return_type = if self.eat(&TokenKind::Colon) {
            Some(self.parse_return_type()?)
        } else {
            None
        };
        let body = self.parse_block()?;
        let span = start.merge(self.prev_span());
        Ok(self.make_expr(
            span,
            ExprKind::FunctionExpr {
                name,
                parts: FunctionParts {
                    type_params,
                    params,
                    return_type,
                    body: Some(body),
                    is_async,
                    is_generator,
                },
            },
        ))
    }
}

fn assign_op(kind: &TokenKind) -> Option<AssignOp> {
    Some(match kind {
        TokenKind::Eq => AssignOp::Assign,
        TokenKind::PlusEq => AssignOp::Add,
        TokenKind::MinusEq => AssignOp::Sub,
        TokenKind::StarEq => AssignOp::Mul,
        TokenKind::SlashEq => AssignOp::Div,
        TokenKind::PercentEq => AssignOp::Rem,
        TokenKind::StarStarEq => AssignOp::Exp,
        TokenKind::LtLtEq => AssignOp::Shl,
        TokenKind::GtGtEq => AssignOp::Shr,
        TokenKind::GtGtGtEq => AssignOp::UShr,
        TokenKind::AmpEq => AssignOp::BitAnd,
        TokenKind::PipeEq => AssignOp::BitOr,
        TokenKind::CaretEq => AssignOp::BitXor,
        TokenKind::AmpAmpEq => AssignOp::And,
        TokenKind::PipePipeEq => AssignOp::Or,
        TokenKind::QuestionQuestionEq => AssignOp::Nullish,
        _ => return None,
    })
}

fn is_valid_assign_target(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Ident(_) | ExprKind::Member { .. } | ExprKind::Index { .. } => true,
        ExprKind::Paren(inner) | ExprKind::NonNull(inner) => is_valid_assign_target(inner),
        _ => false,
    }
}
