//! Declaration parsing: functions, classes, interfaces, type aliases,
//! enums, namespaces, imports and exports.
//!
//! Two desugarings happen here: constructor parameter properties expand
//! into field declarations plus `this.x = x` assignments at constructor
//! entry, and `namespace A.B.C` nests into single-name namespaces.

use sharpts_common::span::Span;
use sharpts_scanner::token::TokenKind;

use super::{PResult, Parser};
use crate::ast::*;

impl Parser {
    // =========================================================================
    // Functions and parameters
    // =========================================================================

    pub(crate) fn parse_function_statement(&mut self, is_async: bool) -> PResult<Stmt> {
        let start = self.span();
        self.expect(&TokenKind::Function)?;
        let is_generator = self.eat(&TokenKind::Star);
        let (name, _) = self.expect_ident()?;
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
        let body = if self.at(&TokenKind::LBrace) {
            Some(self.parse_block()?)
        } else {
            // Overload signature.
            self.expect_semicolon()?;
            None
        };
        let span = start.merge(self.prev_span());
        Ok(Stmt {
            span,
            kind: StmtKind::Function(FunctionDecl {
                span,
                name,
                type_params,
                params,
                return_type,
                body,
                is_async,
                is_generator,
            }),
        })
    }

    /// Parse a parenthesized parameter list, consuming the closing `)`.
    pub(crate) fn parse_param_list(&mut self) -> PResult<Vec<Param>> {
        let mut params = Vec::new();
        while !self.at(&TokenKind::RParen) && !self.at_eof() {
            params.push(self.parse_param()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen)?;
        Ok(params)
    }

    fn parse_param(&mut self) -> PResult<Param> {
        let start = self.span();
        let mut accessibility = None;
        let mut readonly = false;
        // Parameter-property modifiers (meaningful only on constructors;
        // validated during class elaboration).
        loop {
            let word = match self.peek_kind() {
                TokenKind::Ident(w) => w.clone(),
                _ => break,
            };
            let next_is_name = matches!(
                self.peek_at(1),
                TokenKind::Ident(_) | TokenKind::This | TokenKind::DotDotDot
            );
            match word.as_str() {
                "public" if next_is_name => {
                    accessibility = Some(AccessModifier::Public);
                    self.advance();
                }
                "protected" if next_is_name => {
                    accessibility = Some(AccessModifier::Protected);
                    self.advance();
                }
                "private" if next_is_name => {
                    accessibility = Some(AccessModifier::Private);
                    self.advance();
                }
                "readonly" if next_is_name => {
                    readonly = true;
                    self.advance();
                }
                _ => break,
            }
        }
        let rest = self.eat(&TokenKind::DotDotDot);
        let name = if self.at(&TokenKind::This) {
            self.advance();
            "this".to_string()
        } else {
            self.expect_ident()?.0
        };
        let optional = self.eat(&TokenKind::Question);
        let type_ann = if self.eat(&TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let default = if self.eat(&TokenKind::Eq) {
            Some(self.parse_assignment_expr()?)
        } else {
            None
        };
        Ok(Param {
            span: start.merge(self.prev_span()),
            name,
            type_ann,
            optional,
            rest,
            default,
            accessibility,
            readonly,
        })
    }

    // =========================================================================
    // Classes
    // =========================================================================

    pub(crate) fn parse_class_decl(&mut self, is_abstract: bool) -> PResult<ClassDecl> {
        let start = self.span();
        self.expect(&TokenKind::Class)?;
        let name = if let TokenKind::Ident(name) = self.peek_kind().clone() {
            self.advance();
            name
        } else {
            // Anonymous class expression.
            String::new()
        };
        let type_params = if self.at(&TokenKind::Lt) {
            self.parse_type_params()?
        } else {
            Vec::new()
        };
        let superclass = if self.eat(&TokenKind::Extends) {
            let (super_name, _) = self.expect_ident()?;
            let type_args = if self.at(&TokenKind::Lt) {
                self.parse_type_args()?
            } else {
                Vec::new()
            };
            Some((super_name, type_args))
        } else {
            None
        };
        let mut implements = Vec::new();
        if self.eat_ident("implements") {
            loop {
                implements.push(self.parse_type()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::LBrace)?;
        let mut members = Vec::new();
        while !self.at(&TokenKind::RBrace) && !self.at_eof() {
            if self.eat(&TokenKind::Semicolon) {
                continue;
            }
            self.parse_class_member(&mut members)?;
        }
        let end = self.expect(&TokenKind::RBrace)?;
        Ok(ClassDecl {
            span: start.merge(end),
            name,
            type_params,
            superclass,
            implements,
            members,
            is_abstract,
        })
    }

    fn parse_class_member(&mut self, members: &mut Vec<ClassMember>) -> PResult<()> {
        let start = self.span();
        let mut accessibility = AccessModifier::Public;
        let mut is_static = false;
        let mut is_abstract = false;
        let mut is_override = false;
        let mut is_readonly = false;
        let mut is_async = false;

        // Modifier words are contextual: a word is a modifier only when a
        // member continues after it.
        loop {
            let word = match self.peek_kind() {
                TokenKind::Ident(w) => w.clone(),
                _ => break,
            };
            let terminates = matches!(
                self.peek_at(1),
                TokenKind::LParen
                    | TokenKind::Colon
                    | TokenKind::Eq
                    | TokenKind::Question
                    | TokenKind::Semicolon
                    | TokenKind::Lt
                    | TokenKind::RBrace
                    | TokenKind::Bang
            ) || self.tokens_newline_at(1);
            if terminates {
                break;
            }
            match word.as_str() {
                "public" => accessibility = AccessModifier::Public,
                "protected" => accessibility = AccessModifier::Protected,
                "private" => accessibility = AccessModifier::Private,
                "static" => is_static = true,
                "abstract" => is_abstract = true,
                "override" => is_override = true,
                "readonly" => is_readonly = true,
                "async" => {
                    is_async = true;
                    self.advance();
                    break;
                }
                _ => break,
            }
            self.advance();
        }

        let is_generator = self.eat(&TokenKind::Star);

        // Accessors.
        for (word, is_getter) in [("get", true), ("set", false)] {
            if self.at_ident(word)
                && !matches!(
                    self.peek_at(1),
                    TokenKind::LParen
                        | TokenKind::Colon
                        | TokenKind::Eq
                        | TokenKind::Semicolon
                        | TokenKind::Question
                        | TokenKind::Lt
                )
            {
                self.advance();
                let name = self.parse_prop_name()?;
                self.expect(&TokenKind::LParen)?;
                let mut params = self.parse_param_list()?;
                let return_type = if self.eat(&TokenKind::Colon) {
                    Some(self.parse_return_type()?)
                } else {
                    None
                };
                let body = if self.at(&TokenKind::LBrace) {
                    Some(self.parse_block()?)
                } else {
                    self.expect_semicolon()?;
                    None
                };
                let kind = if is_getter {
                    MemberKind::Getter { return_type, body }
                } else {
                    let param = if params.is_empty() {
                        return Err(self.unexpected("A setter must have exactly one parameter"));
                    } else {
                        params.remove(0)
                    };
                    MemberKind::Setter { param, body }
                };
                members.push(ClassMember {
                    span: start.merge(self.prev_span()),
                    name,
                    kind,
                    is_static,
                    accessibility,
                    is_readonly,
                    is_abstract,
                    is_override,
                });
                return Ok(());
            }
        }

        let name = self.parse_prop_name()?;

        // Constructor (with parameter-property expansion).
        if matches!(&name, PropName::Ident(n) if n == "constructor") {
            self.expect(&TokenKind::LParen)?;
            let params = self.parse_param_list()?;
            if self.eat(&TokenKind::Colon) {
                let _ = self.parse_return_type()?;
            }
            let body = if self.at(&TokenKind::LBrace) {
                Some(self.parse_block()?)
            } else {
                self.expect_semicolon()?;
                None
            };
            let span = start.merge(self.prev_span());
            let body = self.expand_parameter_properties(&params, body, span, members);
            members.push(ClassMember {
                span,
                name,
                kind: MemberKind::Constructor { params, body },
                is_static: false,
                accessibility,
                is_readonly: false,
                is_abstract: false,
                is_override: false,
            });
            return Ok(());
        }

        if self.at(&TokenKind::LParen) || self.at(&TokenKind::Lt) {
            // Method.
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
            let body = if self.at(&TokenKind::LBrace) {
                Some(self.parse_block()?)
            } else {
                self.expect_semicolon()?;
                None
            };
            members.push(ClassMember {
                span: start.merge(self.prev_span()),
                name,
                kind: MemberKind::Method(FunctionParts {
                    type_params,
                    params,
                    return_type,
                    body,
                    is_async,
                    is_generator,
                }),
                is_static,
                accessibility,
                is_readonly,
                is_abstract,
                is_override,
            });
            return Ok(());
        }

        // Field.
        let _optional = self.eat(&TokenKind::Question);
        let _definite = self.eat(&TokenKind::Bang);
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
        self.expect_semicolon()?;
        members.push(ClassMember {
            span: start.merge(self.prev_span()),
            name,
            kind: MemberKind::Field { type_ann, init },
            is_static,
            accessibility,
            is_readonly,
            is_abstract,
            is_override,
        });
        Ok(())
    }

    fn tokens_newline_at(&self, offset: usize) -> bool {
        self.peek_token_at(offset).newline_before
    }

    /// Parameter properties become field declarations plus `this.x = x`
    /// assignments at constructor entry.
    fn expand_parameter_properties(
        &mut self,
        params: &[Param],
        body: Option<Vec<Stmt>>,
        span: Span,
        members: &mut Vec<ClassMember>,
    ) -> Option<Vec<Stmt>> {
        let mut assignments = Vec::new();
        for param in params {
            if param.accessibility.is_none() && !param.readonly {
                continue;
            }
            members.push(ClassMember {
                span: param.span,
                name: PropName::Ident(param.name.clone()),
                kind: MemberKind::Field {
                    type_ann: param.type_ann.clone(),
                    init: None,
                },
                is_static: false,
                accessibility: param.accessibility.unwrap_or(AccessModifier::Public),
                is_readonly: param.readonly,
                is_abstract: false,
                is_override: false,
            });
            let this_expr = self.make_expr(param.span, ExprKind::This);
            let target = self.make_expr(
                param.span,
                ExprKind::Member {
                    object: Box::new(this_expr),
                    property: param.name.clone(),
                    optional: false,
                },
            );
            let value = self.make_expr(param.span, ExprKind::Ident(param.name.clone()));
            let assign = self.make_expr(
                param.span,
                ExprKind::Assign {
                    op: AssignOp::Assign,
                    target: Box::new(target),
                    value: Box::new(value),
                },
            );
            assignments.push(Stmt {
                span: param.span,
                kind: StmtKind::Expr(assign),
            });
        }
        match body {
            Some(mut stmts) => {
                let _ = span;
                assignments.append(&mut stmts);
                Some(assignments)
            }
            None => None,
        }
    }

    // =========================================================================
    // Interfaces, type aliases, enums, namespaces
    // =========================================================================

    pub(crate) fn parse_interface(&mut self) -> PResult<Stmt> {
        let start = self.span();
        self.expect(&TokenKind::Interface)?;
        let (name, _) = self.expect_ident()?;
        let type_params = if self.at(&TokenKind::Lt) {
            self.parse_type_params()?
        } else {
            Vec::new()
        };
        let mut extends = Vec::new();
        if self.eat(&TokenKind::Extends) {
            loop {
                extends.push(self.parse_type()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::LBrace)?;
        let members = self.parse_object_type_members()?;
        let end = self.expect(&TokenKind::RBrace)?;
        let span = start.merge(end);
        Ok(Stmt {
            span,
            kind: StmtKind::Interface(InterfaceDecl {
                span,
                name,
                type_params,
                extends,
                members,
            }),
        })
    }

    pub(crate) fn parse_type_alias(&mut self) -> PResult<Stmt> {
        let start = self.span();
        self.advance(); // `type`
        let (name, _) = self.expect_ident()?;
        let type_params = if self.at(&TokenKind::Lt) {
            self.parse_type_params()?
        } else {
            Vec::new()
        };
        self.expect(&TokenKind::Eq)?;
        let ty = self.parse_type()?;
        self.expect_semicolon()?;
        let span = start.merge(self.prev_span());
        Ok(Stmt {
            span,
            kind: StmtKind::TypeAlias(TypeAliasDecl {
                span,
                name,
                type_params,
                ty,
            }),
        })
    }

    pub(crate) fn parse_enum(&mut self, is_const: bool) -> PResult<Stmt> {
        let start = self.span();
        self.expect(&TokenKind::Enum)?;
        let (name, _) = self.expect_ident()?;
        self.expect(&TokenKind::LBrace)?;
        let mut enum_members = Vec::new();
        while !self.at(&TokenKind::RBrace) && !self.at_eof() {
            let member_start = self.span();
            let member_name = match self.peek_kind().clone() {
                TokenKind::Str(text) => {
                    self.advance();
                    text
                }
                _ => self.expect_property_name()?.0,
            };
            let init = if self.eat(&TokenKind::Eq) {
                Some(self.parse_assignment_expr()?)
            } else {
                None
            };
            enum_members.push(EnumMember {
                span: member_start.merge(self.prev_span()),
                name: member_name,
                init,
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        let end = self.expect(&TokenKind::RBrace)?;
        let span = start.merge(end);
        Ok(Stmt {
            span,
            kind: StmtKind::Enum(EnumDecl {
                span,
                name,
                is_const,
                members: enum_members,
            }),
        })
    }

    pub(crate) fn parse_namespace(&mut self) -> PResult<Stmt> {
        let start = self.span();
        self.advance(); // `namespace`
        let (first, _) = self.expect_ident()?;
        let mut path = vec![first];
        while self.eat(&TokenKind::Dot) {
            path.push(self.expect_ident()?.0);
        }
        let body = self.parse_block()?;
        let span = start.merge(self.prev_span());

        // `namespace A.B.C { ... }` nests inside-out.
        let mut stmt = Stmt {
            span,
            kind: StmtKind::Namespace(NamespaceDecl {
                span,
                name: path.pop().expect("at least one segment"),
                body,
            }),
        };
        while let Some(name) = path.pop() {
            stmt = Stmt {
                span,
                kind: StmtKind::Namespace(NamespaceDecl {
                    span,
                    name,
                    body: vec![stmt],
                }),
            };
        }
        Ok(stmt)
    }

    // =========================================================================
    // Imports and exports
    // =========================================================================

    pub(crate) fn parse_import(&mut self) -> PResult<Stmt> {
        let start = self.span();
        self.expect(&TokenKind::Import)?;

        // `import "module";`
        if let TokenKind::Str(source) = self.peek_kind().clone() {
            self.advance();
            self.expect_semicolon()?;
            let span = start.merge(self.prev_span());
            return Ok(Stmt {
                span,
                kind: StmtKind::Import(ImportDecl {
                    span,
                    default: None,
                    named: Vec::new(),
                    namespace: None,
                    source,
                }),
            });
        }

        let mut default = None;
        let mut named = Vec::new();
        let mut namespace = None;

        if let TokenKind::Ident(name) = self.peek_kind().clone() {
            self.advance();
            default = Some(name);
            if self.eat(&TokenKind::Comma) {
                self.parse_import_clause_rest(&mut named, &mut namespace)?;
            }
        } else {
            self.parse_import_clause_rest(&mut named, &mut namespace)?;
        }

        if !self.eat_ident("from") {
            return Err(self.unexpected("`from` expected"));
        }
        let source = match self.peek_kind().clone() {
            TokenKind::Str(source) => {
                self.advance();
                source
            }
            _ => return Err(self.unexpected("Module specifier expected")),
        };
        self.expect_semicolon()?;
        let span = start.merge(self.prev_span());
        Ok(Stmt {
            span,
            kind: StmtKind::Import(ImportDecl {
                span,
                default,
                named,
                namespace,
                source,
            }),
        })
    }

    fn parse_import_clause_rest(
        &mut self,
        named: &mut Vec<(String, Option<String>)>,
        namespace: &mut Option<String>,
    ) -> PResult<()> {
        if self.eat(&TokenKind::Star) {
            if !self.eat_ident("as") {
                return Err(self.unexpected("`as` expected"));
            }
            *namespace = Some(self.expect_ident()?.0);
            return Ok(());
        }
        self.expect(&TokenKind::LBrace)?;
        while !self.at(&TokenKind::RBrace) && !self.at_eof() {
            let (imported, _) = self.expect_property_name()?;
            let local = if self.eat_ident("as") {
                Some(self.expect_ident()?.0)
            } else {
                None
            };
            named.push((imported, local));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(())
    }

    pub(crate) fn parse_export(&mut self) -> PResult<Stmt> {
        let start = self.span();
        self.expect(&TokenKind::Export)?;

        // `export { a, b as c } [from "m"];`
        if self.at(&TokenKind::LBrace) {
            self.advance();
            let mut names = Vec::new();
            while !self.at(&TokenKind::RBrace) && !self.at_eof() {
                let (name, _) = self.expect_property_name()?;
                let alias = if self.eat_ident("as") {
                    Some(self.expect_ident()?.0)
                } else {
                    None
                };
                names.push((name, alias));
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RBrace)?;
            let source = if self.eat_ident("from") {
                match self.peek_kind().clone() {
                    TokenKind::Str(source) => {
                        self.advance();
                        Some(source)
                    }
                    _ => return Err(self.unexpected("Module specifier expected")),
                }
            } else {
                None
            };
            self.expect_semicolon()?;
            let span = start.merge(self.prev_span());
            return Ok(Stmt {
                span,
                kind: StmtKind::ExportNamed { names, source },
            });
        }

        // `export default expr;`
        if self.eat(&TokenKind::Default) {
            let value = self.parse_assignment_expr()?;
            self.expect_semicolon()?;
            let span = start.merge(self.prev_span());
            let inner = Stmt {
                span,
                kind: StmtKind::Expr(value),
            };
            return Ok(Stmt {
                span,
                kind: StmtKind::Export(Box::new(inner)),
            });
        }

        // `export <declaration>`
        let decl = self.parse_statement()?;
        let span = start.merge(decl.span);
        Ok(Stmt {
            span,
            kind: StmtKind::Export(Box::new(decl)),
        })
    }
}
