//! The type-annotation sub-grammar.
//!
//! Precedence, loosest to tightest: conditional (`extends ? :`), union
//! (`|`), intersection (`&`), postfix `[]`/`[K]`, primary. Mapped types
//! are recognized by a lookahead that sees `[ident in` under an optional
//! readonly modifier.

use sharpts_common::diagnostics::{Diagnostic, diagnostic_codes};
use sharpts_common::span::Span;
use sharpts_scanner::token::TokenKind;

use super::{PResult, Parser};
use crate::ast::*;

impl Parser {
    pub(crate) fn parse_type(&mut self) -> PResult<TypeAnn> {
        self.enter_depth()?;
        let result = self.parse_conditional_type();
        self.leave_depth();
        result
    }

    fn parse_conditional_type(&mut self) -> PResult<TypeAnn> {
        let check = self.parse_union_type()?;
        if !self.at(&TokenKind::Extends) {
            return Ok(check);
        }
        self.advance();
        let extends = self.parse_union_type()?;
        self.expect(&TokenKind::Question)?;
        let true_ty = self.parse_type()?;
        self.expect(&TokenKind::Colon)?;
        let false_ty = self.parse_type()?;
        let span = check.span.merge(false_ty.span);
        Ok(TypeAnn {
            span,
            kind: TypeAnnKind::Conditional {
                check: Box::new(check),
                extends: Box::new(extends),
                true_ty: Box::new(true_ty),
                false_ty: Box::new(false_ty),
            },
        })
    }

    fn parse_union_type(&mut self) -> PResult<TypeAnn> {
        self.eat(&TokenKind::Pipe); // optional leading |
        let first = self.parse_intersection_type()?;
        if !self.at(&TokenKind::Pipe) {
            return Ok(first);
        }
        let start = first.span;
        let mut members = vec![first];
        while self.eat(&TokenKind::Pipe) {
            members.push(self.parse_intersection_type()?);
        }
        let span = start.merge(members.last().map(|t| t.span).unwrap_or(start));
        Ok(TypeAnn {
            span,
            kind: TypeAnnKind::Union(members),
        })
    }

    fn parse_intersection_type(&mut self) -> PResult<TypeAnn> {
        self.eat(&TokenKind::Amp); // optional leading &
        let first = self.parse_postfix_type()?;
        if !self.at(&TokenKind::Amp) {
            return Ok(first);
        }
        let start = first.span;
        let mut members = vec![first];
        while self.eat(&TokenKind::Amp) {
            members.push(self.parse_postfix_type()?);
        }
        let span = start.merge(members.last().map(|t| t.span).unwrap_or(start));
        Ok(TypeAnn {
            span,
            kind: TypeAnnKind::Intersection(members),
        })
    }

    fn parse_postfix_type(&mut self) -> PResult<TypeAnn> {
        let mut ty = self.parse_primary_type()?;
        while self.at(&TokenKind::LBracket) && !self.peek().newline_before {
            self.advance();
            if self.eat(&TokenKind::RBracket) {
                let span = ty.span.merge(self.prev_span());
                ty = TypeAnn {
                    span,
                    kind: TypeAnnKind::ArrayOf(Box::new(ty)),
                };
            } else {
                let index = self.parse_type()?;
                let end = self.expect(&TokenKind::RBracket)?;
                let span = ty.span.merge(end);
                ty = TypeAnn {
                    span,
                    kind: TypeAnnKind::IndexedAccess {
                        object: Box::new(ty),
                        index: Box::new(index),
                    },
                };
            }
        }
        Ok(ty)
    }

    fn parse_primary_type(&mut self) -> PResult<TypeAnn> {
        let start = self.span();
        match self.peek_kind().clone() {
            TokenKind::LParen => self.parse_paren_or_function_type(),
            TokenKind::Lt => self.parse_generic_function_type(),
            TokenKind::LBracket => self.parse_tuple_type(),
            TokenKind::LBrace => self.parse_object_or_mapped_type(),
            TokenKind::Typeof => self.parse_typeof_query(),
            TokenKind::Void => {
                self.advance();
                Ok(self.prim(start, PrimitiveKind::Void))
            }
            TokenKind::Null => {
                self.advance();
                Ok(self.prim(start, PrimitiveKind::Null))
            }
            TokenKind::Str(text) => {
                self.advance();
                Ok(TypeAnn {
                    span: start,
                    kind: TypeAnnKind::StrLit(text),
                })
            }
            TokenKind::Number(value) => {
                self.advance();
                Ok(TypeAnn {
                    span: start,
                    kind: TypeAnnKind::NumberLit(value),
                })
            }
            TokenKind::Minus => {
                self.advance();
                if let TokenKind::Number(value) = self.peek_kind().clone() {
                    let end = self.advance().span;
                    Ok(TypeAnn {
                        span: start.merge(end),
                        kind: TypeAnnKind::NumberLit(-value),
                    })
                } else {
                    Err(self.type_expected())
                }
            }
            TokenKind::True => {
                self.advance();
                Ok(TypeAnn {
                    span: start,
                    kind: TypeAnnKind::BoolLit(true),
                })
            }
            TokenKind::False => {
                self.advance();
                Ok(TypeAnn {
                    span: start,
                    kind: TypeAnnKind::BoolLit(false),
                })
            }
            TokenKind::TemplateFull(text) => {
                self.advance();
                Ok(TypeAnn {
                    span: start,
                    kind: TypeAnnKind::TemplateLiteral {
                        quasis: vec![text],
                        types: Vec::new(),
                    },
                })
            }
            TokenKind::TemplateHead(head) => {
                self.advance();
                let mut quasis = vec![head];
                let mut types = Vec::new();
                loop {
                    types.push(self.parse_type()?);
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
                        _ => return Err(self.unexpected("Unterminated template literal type")),
                    }
                }
                let span = start.merge(self.prev_span());
                Ok(TypeAnn {
                    span,
                    kind: TypeAnnKind::TemplateLiteral { quasis, types },
                })
            }
            TokenKind::Ident(word) => match word.as_str() {
                "number" => self.prim_advance(start, PrimitiveKind::Number),
                "string" => self.prim_advance(start, PrimitiveKind::String),
                "boolean" => self.prim_advance(start, PrimitiveKind::Boolean),
                "symbol" => self.prim_advance(start, PrimitiveKind::Symbol),
                "bigint" => self.prim_advance(start, PrimitiveKind::BigInt),
                "any" => self.prim_advance(start, PrimitiveKind::Any),
                "unknown" => self.prim_advance(start, PrimitiveKind::Unknown),
                "never" => self.prim_advance(start, PrimitiveKind::Never),
                "undefined" => self.prim_advance(start, PrimitiveKind::Undefined),
                "object" => self.prim_advance(start, PrimitiveKind::Object),
                "keyof" => {
                    self.advance();
                    let operand = self.parse_postfix_type()?;
                    let span = start.merge(operand.span);
                    Ok(TypeAnn {
                        span,
                        kind: TypeAnnKind::Keyof(Box::new(operand)),
                    })
                }
                "infer" => {
                    self.advance();
                    let (name, end) = self.expect_ident()?;
                    Ok(TypeAnn {
                        span: start.merge(end),
                        kind: TypeAnnKind::Infer(name),
                    })
                }
                "unique" => {
                    self.advance();
                    if self.eat_ident("symbol") {
                        Ok(TypeAnn {
                            span: start.merge(self.prev_span()),
                            kind: TypeAnnKind::UniqueSymbol,
                        })
                    } else {
                        Err(self.type_expected())
                    }
                }
                "readonly" => {
                    // `readonly T[]`: readonly-ness is enforced at
                    // assignment, so the operand type stands alone.
                    self.advance();
                    self.parse_postfix_type()
                }
                _ => self.parse_type_reference(),
            },
            _ => Err(self.type_expected()),
        }
    }

    fn prim(&self, span: Span, kind: PrimitiveKind) -> TypeAnn {
        TypeAnn {
            span,
            kind: TypeAnnKind::Primitive(kind),
        }
    }

    fn prim_advance(&mut self, span: Span, kind: PrimitiveKind) -> PResult<TypeAnn> {
        self.advance();
        Ok(self.prim(span, kind))
    }

    fn type_expected(&self) -> Diagnostic {
        Diagnostic::parse_error(
            self.span(),
            format!("Type expected, found {}.", self.peek_kind().describe()),
            diagnostic_codes::TYPE_EXPECTED,
        )
    }

    fn parse_type_reference(&mut self) -> PResult<TypeAnn> {
        let start = self.span();
        let (first, _) = self.expect_ident()?;
        let mut path = vec![first];
        while self.at(&TokenKind::Dot) {
            self.advance();
            let (seg, _) = self.expect_property_name()?;
            path.push(seg);
        }
        let type_args = if self.at(&TokenKind::Lt) {
            self.parse_type_args()?
        } else {
            Vec::new()
        };
        Ok(TypeAnn {
            span: start.merge(self.prev_span()),
            kind: TypeAnnKind::Ref { path, type_args },
        })
    }

    fn parse_typeof_query(&mut self) -> PResult<TypeAnn> {
        let start = self.span();
        self.expect(&TokenKind::Typeof)?;
        let (first, _) = self.expect_ident()?;
        let mut segs = vec![PathSeg::Prop(first)];
        loop {
            if self.eat(&TokenKind::Dot) {
                let (name, _) = self.expect_property_name()?;
                segs.push(PathSeg::Prop(name));
            } else if self.at(&TokenKind::LBracket) {
                self.advance();
                let seg = match self.peek_kind().clone() {
                    TokenKind::Str(text) => {
                        self.advance();
                        PathSeg::Index(text)
                    }
                    TokenKind::Number(n) => {
                        self.advance();
                        PathSeg::Index(sharpts_common::numeric::format_number(n))
                    }
                    _ => return Err(self.type_expected()),
                };
                self.expect(&TokenKind::RBracket)?;
                segs.push(seg);
            } else {
                break;
            }
        }
        Ok(TypeAnn {
            span: start.merge(self.prev_span()),
            kind: TypeAnnKind::TypeofQuery(segs),
        })
    }

    fn parse_paren_or_function_type(&mut self) -> PResult<TypeAnn> {
        let mark = self.mark();
        match self.parse_function_type(Vec::new()) {
            Ok(ty) => Ok(ty),
            Err(_) => {
                self.reset(mark);
                self.expect(&TokenKind::LParen)?;
                let inner = self.parse_type()?;
                self.expect(&TokenKind::RParen)?;
                Ok(inner)
            }
        }
    }

    fn parse_generic_function_type(&mut self) -> PResult<TypeAnn> {
        let type_params = self.parse_type_params()?;
        self.parse_function_type(type_params)
    }

    /// `(params) => T`, with any already-parsed type parameters.
    fn parse_function_type(&mut self, type_params: Vec<TypeParamDecl>) -> PResult<TypeAnn> {
        let start = self.span();
        self.expect(&TokenKind::LParen)?;
        let params = self.parse_param_ann_list()?;
        self.expect(&TokenKind::RParen)?;
        self.expect(&TokenKind::Arrow)?;
        let return_type = self.parse_return_type()?;
        let span = start.merge(return_type.span);
        Ok(TypeAnn {
            span,
            kind: TypeAnnKind::Function {
                type_params,
                params,
                return_type: Box::new(return_type),
            },
        })
    }

    pub(crate) fn parse_param_ann_list(&mut self) -> PResult<Vec<ParamAnn>> {
        let mut params = Vec::new();
        while !self.at(&TokenKind::RParen) && !self.at_eof() {
            let rest = self.eat(&TokenKind::DotDotDot);
            let (name, _) = self.expect_ident()?;
            let optional = self.eat(&TokenKind::Question);
            self.expect(&TokenKind::Colon)?;
            let ty = self.parse_type()?;
            params.push(ParamAnn {
                name,
                ty,
                optional,
                rest,
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(params)
    }

    fn parse_tuple_type(&mut self) -> PResult<TypeAnn> {
        let start = self.span();
        self.expect(&TokenKind::LBracket)?;
        let mut elements = Vec::new();
        while !self.at(&TokenKind::RBracket) && !self.at_eof() {
            let spread = self.eat(&TokenKind::DotDotDot);
            // Named element: `name: T` or `name?: T`.
            if matches!(self.peek_kind(), TokenKind::Ident(_))
                && (matches!(self.peek_at(1), TokenKind::Colon)
                    || (matches!(self.peek_at(1), TokenKind::Question)
                        && matches!(self.peek_at(2), TokenKind::Colon)))
            {
                let (name, _) = self.expect_ident()?;
                let optional = self.eat(&TokenKind::Question);
                self.expect(&TokenKind::Colon)?;
                let ty = self.parse_type()?;
                elements.push(TupleElementAnn {
                    ty,
                    name: Some(name),
                    optional,
                    spread,
                });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
                continue;
            }
            let ty = self.parse_type()?;
            let optional = self.eat(&TokenKind::Question);
            elements.push(TupleElementAnn {
                ty,
                name: None,
                optional,
                spread,
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        let end = self.expect(&TokenKind::RBracket)?;
        Ok(TypeAnn {
            span: start.merge(end),
            kind: TypeAnnKind::Tuple(elements),
        })
    }

    /// `{ ... }`: an object type, or a mapped type when the lookahead
    /// sees `[ident in` under an optional `readonly`/`+readonly`/
    /// `-readonly` prefix.
    fn parse_object_or_mapped_type(&mut self) -> PResult<TypeAnn> {
        if self.is_mapped_type_start() {
            return self.parse_mapped_type();
        }
        let start = self.span();
        self.expect(&TokenKind::LBrace)?;
        let members = self.parse_object_type_members()?;
        let end = self.expect(&TokenKind::RBrace)?;
        Ok(TypeAnn {
            span: start.merge(end),
            kind: TypeAnnKind::Object(members),
        })
    }

    fn is_mapped_type_start(&self) -> bool {
        // At `{`. Probe for: [+|-] [readonly] `[` ident `in`.
        let mut i = 1;
        if matches!(self.peek_at(i), TokenKind::Plus | TokenKind::Minus) {
            i += 1;
        }
        if matches!(self.peek_at(i), TokenKind::Ident(w) if w == "readonly") {
            i += 1;
        }
        matches!(self.peek_at(i), TokenKind::LBracket)
            && matches!(self.peek_at(i + 1), TokenKind::Ident(_))
            && matches!(self.peek_at(i + 2), TokenKind::In)
    }

    fn parse_mapped_type(&mut self) -> PResult<TypeAnn> {
        let start = self.span();
        self.expect(&TokenKind::LBrace)?;
        let readonly = if self.eat(&TokenKind::Plus) {
            self.expect_contextual("readonly")?;
            MappedModifier::Add
        } else if self.eat(&TokenKind::Minus) {
            self.expect_contextual("readonly")?;
            MappedModifier::Remove
        } else if self.eat_ident("readonly") {
            MappedModifier::Add
        } else {
            MappedModifier::None
        };
        self.expect(&TokenKind::LBracket)?;
        let (param, _) = self.expect_ident()?;
        self.expect(&TokenKind::In)?;
        let constraint = self.parse_type()?;
        let as_clause = if self.eat_ident("as") {
            Some(Box::new(self.parse_type()?))
        } else {
            None
        };
        self.expect(&TokenKind::RBracket)?;
        let optional = if self.eat(&TokenKind::Plus) {
            self.expect(&TokenKind::Question)?;
            MappedModifier::Add
        } else if self.eat(&TokenKind::Minus) {
            self.expect(&TokenKind::Question)?;
            MappedModifier::Remove
        } else if self.eat(&TokenKind::Question) {
            MappedModifier::Add
        } else {
            MappedModifier::None
        };
        self.expect(&TokenKind::Colon)?;
        let value = self.parse_type()?;
        self.eat(&TokenKind::Semicolon);
        self.eat(&TokenKind::Comma);
        let end = self.expect(&TokenKind::RBrace)?;
        Ok(TypeAnn {
            span: start.merge(end),
            kind: TypeAnnKind::Mapped {
                param,
                constraint: Box::new(constraint),
                value: Box::new(value),
                optional,
                readonly,
                as_clause,
            },
        })
    }

    fn expect_contextual(&mut self, word: &str) -> PResult<()> {
        if self.eat_ident(word) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("`{word}` expected")))
        }
    }

    /// Members of `{ ... }` object types and interface bodies.
    pub(crate) fn parse_object_type_members(&mut self) -> PResult<Vec<ObjectTypeMember>> {
        let mut members = Vec::new();
        while !self.at(&TokenKind::RBrace) && !self.at_eof() {
            let readonly = self.at_ident("readonly")
                && !matches!(
                    self.peek_at(1),
                    TokenKind::Colon | TokenKind::Question | TokenKind::LParen | TokenKind::Comma
                );
            if readonly {
                self.advance();
            }

            if self.at(&TokenKind::LBracket) {
                // Index signature: `[key: string]: T`.
                self.advance();
                let (_key_name, _) = self.expect_ident()?;
                self.expect(&TokenKind::Colon)?;
                let key = match self.peek_kind().clone() {
                    TokenKind::Ident(w) if w == "string" => IndexKeyKind::String,
                    TokenKind::Ident(w) if w == "number" => IndexKeyKind::Number,
                    TokenKind::Ident(w) if w == "symbol" => IndexKeyKind::Symbol,
                    _ => {
                        return Err(self.unexpected(
                            "An index signature parameter type must be `string`, `number`, or `symbol`",
                        ));
                    }
                };
                self.advance();
                self.expect(&TokenKind::RBracket)?;
                self.expect(&TokenKind::Colon)?;
                let value = self.parse_type()?;
                members.push(ObjectTypeMember::Index {
                    key,
                    value,
                    readonly,
                });
            } else {
                let (name, _) = self.expect_property_name()?;
                let optional = self.eat(&TokenKind::Question);
                if self.at(&TokenKind::LParen) || self.at(&TokenKind::Lt) {
                    let type_params = if self.at(&TokenKind::Lt) {
                        self.parse_type_params()?
                    } else {
                        Vec::new()
                    };
                    self.expect(&TokenKind::LParen)?;
                    let params = self.parse_param_ann_list()?;
                    self.expect(&TokenKind::RParen)?;
                    self.expect(&TokenKind::Colon)?;
                    let return_type = self.parse_return_type()?;
                    members.push(ObjectTypeMember::Method {
                        name,
                        type_params,
                        params,
                        return_type,
                        optional,
                    });
                } else {
                    self.expect(&TokenKind::Colon)?;
                    let ty = self.parse_type()?;
                    members.push(ObjectTypeMember::Property {
                        name,
                        ty,
                        optional,
                        readonly,
                    });
                }
            }
            if !self.eat(&TokenKind::Comma) && !self.eat(&TokenKind::Semicolon) {
                break;
            }
        }
        Ok(members)
    }

    // =========================================================================
    // Return types and predicates
    // =========================================================================

    /// A return-type annotation: a plain type, or a type predicate
    /// (`x is T`, `asserts x`, `asserts x is T`).
    pub(crate) fn parse_return_type(&mut self) -> PResult<TypeAnn> {
        let start = self.span();
        if self.at_ident("asserts")
            && matches!(self.peek_at(1), TokenKind::Ident(_) | TokenKind::This)
        {
            self.advance();
            let param = if self.at(&TokenKind::This) {
                self.advance();
                "this".to_string()
            } else {
                self.expect_ident()?.0
            };
            let ty = if self.eat_ident("is") {
                Some(Box::new(self.parse_type()?))
            } else {
                None
            };
            return Ok(TypeAnn {
                span: start.merge(self.prev_span()),
                kind: TypeAnnKind::Predicate {
                    param,
                    ty,
                    asserts: true,
                },
            });
        }
        if matches!(self.peek_kind(), TokenKind::Ident(_) | TokenKind::This)
            && matches!(self.peek_at(1), TokenKind::Ident(w) if w == "is")
        {
            let param = if self.at(&TokenKind::This) {
                self.advance();
                "this".to_string()
            } else {
                self.expect_ident()?.0
            };
            self.advance(); // is
            let ty = self.parse_type()?;
            return Ok(TypeAnn {
                span: start.merge(ty.span),
                kind: TypeAnnKind::Predicate {
                    param,
                    ty: Some(Box::new(ty.clone())),
                    asserts: false,
                },
            });
        }
        self.parse_type()
    }

    // =========================================================================
    // Type parameters and arguments
    // =========================================================================

    pub(crate) fn parse_type_params(&mut self) -> PResult<Vec<TypeParamDecl>> {
        self.expect(&TokenKind::Lt)?;
        let mut params = Vec::new();
        loop {
            let start = self.span();
            let is_const = self.eat(&TokenKind::Const);
            let variance = if self.eat(&TokenKind::In) {
                if self.at_ident("out") && matches!(self.peek_at(1), TokenKind::Ident(_)) {
                    self.advance();
                    Variance::InOut
                } else {
                    Variance::In
                }
            } else if self.at_ident("out") && matches!(self.peek_at(1), TokenKind::Ident(_)) {
                self.advance();
                Variance::Out
            } else {
                Variance::Invariant
            };
            let (name, _) = self.expect_ident()?;
            let constraint = if self.eat(&TokenKind::Extends) {
                Some(self.parse_type()?)
            } else {
                None
            };
            let default = if self.eat(&TokenKind::Eq) {
                Some(self.parse_type()?)
            } else {
                None
            };
            params.push(TypeParamDecl {
                span: start.merge(self.prev_span()),
                name,
                constraint,
                default,
                is_const,
                variance,
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.consume_greater()?;
        Ok(params)
    }

    pub(crate) fn parse_type_args(&mut self) -> PResult<Vec<TypeAnn>> {
        self.expect(&TokenKind::Lt)?;
        let mut args = Vec::new();
        loop {
            args.push(self.parse_type()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.consume_greater()?;
        Ok(args)
    }

    /// Consume a single `>` in type context, splitting a `>>`, `>>>`,
    /// `>=`, `>>=`, or `>>>=` token in place when necessary.
    pub(crate) fn consume_greater(&mut self) -> PResult<()> {
        let kind = self.peek_kind().clone();
        let remainder = match kind {
            TokenKind::Gt => {
                self.advance();
                return Ok(());
            }
            TokenKind::GtGt => TokenKind::Gt,
            TokenKind::GtGtGt => TokenKind::GtGt,
            TokenKind::GtEq => TokenKind::Eq,
            TokenKind::GtGtEq => TokenKind::GtEq,
            TokenKind::GtGtGtEq => TokenKind::GtGtEq,
            _ => return Err(self.unexpected("`>` expected")),
        };
        let token = self.current_token_mut();
        token.kind = remainder;
        token.span.start += 1;
        Ok(())
    }
}
