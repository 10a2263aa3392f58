//! Expression checking.
//!
//! `check_expr` returns the inferred type of an expression and records
//! it in the side table. Call checking performs overload resolution
//! (arity filter, first compatible candidate in source order) and
//! generic inference by structural unification of parameter types
//! against argument types; explicit type arguments override inference.

use rustc_hash::FxHashMap;
use sharpts_common::diagnostics::{Diagnostic, diagnostic_codes};
use sharpts_common::span::Span;
use sharpts_parser::ast::*;
use sharpts_solver::evaluate::evaluate_type;
use sharpts_solver::instantiate::{TypeSubstitution, instantiate_type};
use sharpts_solver::types::{self as solver, TypeId, TypeKey};
use sharpts_solver::{is_compatible, shape_of, type_to_string};

use crate::annotations::TypeParamEnv;
use crate::context::{BindingKind, CheckerContext, FunctionContext};

impl CheckerContext {
    pub fn check_expr(&mut self, expr: &Expr) -> Result<TypeId, Diagnostic> {
        let ty = self.check_expr_inner(expr)?;
        Ok(self.record_expr_type(expr.id, ty))
    }

    fn check_expr_inner(&mut self, expr: &Expr) -> Result<TypeId, Diagnostic> {
        match &expr.kind {
            ExprKind::Literal(lit) => Ok(self.literal_type(lit)),
            ExprKind::Ident(name) => self.check_ident(name, expr.span),
            ExprKind::This => Ok(self.this_stack.last().copied().unwrap_or(TypeId::ANY)),
            ExprKind::Super => Ok(self
                .super_stack
                .last()
                .copied()
                .flatten()
                .unwrap_or(TypeId::ANY)),
            ExprKind::Paren(inner) => self.check_expr(inner),
            ExprKind::Binary { op, left, right } => self.check_binary(*op, left, right, expr.span),
            ExprKind::Logical { op, left, right } => {
                let left_ty = self.check_expr(left)?;
                let right_ty = self.check_expr(right)?;
                Ok(match op {
                    LogicalOp::And | LogicalOp::Or => {
                        self.interner.union(vec![left_ty, right_ty])
                    }
                    LogicalOp::Nullish => {
                        let non_null = self
                            .remove_from_union(left_ty, &[TypeId::NULL, TypeId::UNDEFINED]);
                        self.interner.union(vec![non_null, right_ty])
                    }
                })
            }
            ExprKind::Unary { op, operand } => self.check_unary(*op, operand, expr.span),
            ExprKind::Update { operand, .. } => {
                let ty = self.check_expr(operand)?;
                let ty = evaluate_type(&self.interner, ty);
                if ty == TypeId::BIGINT {
                    return Ok(TypeId::BIGINT);
                }
                if !is_compatible(&self.interner, TypeId::NUMBER, ty) && ty != TypeId::ANY {
                    return Err(Diagnostic::type_error(
                        operand.span,
                        "An increment or decrement operand must be of type number.",
                        diagnostic_codes::TYPE_NOT_ASSIGNABLE,
                    ));
                }
                Ok(TypeId::NUMBER)
            }
            ExprKind::Assign { op, target, value } => self.check_assignment(*op, target, value),
            ExprKind::Call {
                callee,
                type_args,
                args,
                optional,
            } => self.check_call(expr, callee, type_args, args, *optional),
            ExprKind::New {
                callee,
                type_args,
                args,
            } => self.check_new(expr, callee, type_args, args),
            ExprKind::Member {
                object,
                property,
                optional,
            } => {
                // An active narrowing on this exact path wins.
                if let Some(path) = self.path_key(expr) {
                    if let Some(narrowed) = self.narrowed(&path) {
                        let _ = self.check_expr(object)?;
                        return Ok(narrowed);
                    }
                }
                let object_ty = self.check_expr(object)?;
                let receiver = if *optional {
                    self.remove_from_union(object_ty, &[TypeId::NULL, TypeId::UNDEFINED])
                } else {
                    object_ty
                };
                let member = self.member_type_of(receiver, property, expr.span)?;
                Ok(if *optional {
                    self.interner.union(vec![member, TypeId::UNDEFINED])
                } else {
                    member
                })
            }
            ExprKind::Index {
                object,
                index,
                optional,
            } => self.check_index(expr, object, index, *optional),
            ExprKind::Array(elements) => {
                let mut element_types = Vec::new();
                for element in elements {
                    match &element.kind {
                        ExprKind::Spread(inner) => {
                            let inner_ty = self.check_expr(inner)?;
                            element_types.push(self.element_type_of_iterable(
                                inner_ty,
                                inner.span,
                                false,
                            )?);
                            self.record_expr_type(element.id, inner_ty);
                        }
                        _ => element_types.push(self.check_expr(element)?),
                    }
                }
                let element = if element_types.is_empty() {
                    TypeId::ANY
                } else {
                    let widened: Vec<TypeId> = element_types
                        .iter()
                        .map(|&t| self.widen_literal(t))
                        .collect();
                    self.interner.union(widened)
                };
                Ok(self.interner.array(element))
            }
            ExprKind::Object(props) => self.check_object_literal(props),
            ExprKind::Template { exprs, .. } => {
                for part in exprs {
                    self.check_expr(part)?;
                }
                Ok(TypeId::STRING)
            }
            ExprKind::Arrow {
                type_params,
                params,
                return_type,
                body,
                is_async,
            } => self.check_function_like(
                type_params,
                params,
                return_type.as_ref(),
                FunctionBody::Arrow(body),
                *is_async,
                false,
            ),
            ExprKind::FunctionExpr { parts, .. } => self.check_function_like(
                &parts.type_params,
                &parts.params,
                parts.return_type.as_ref(),
                FunctionBody::Block(parts.body.as_deref()),
                parts.is_async,
                parts.is_generator,
            ),
            ExprKind::ClassExpr(decl) => self.check_class_decl(decl),
            ExprKind::Conditional {
                cond,
                consequent,
                alternate,
            } => {
                self.check_expr(cond)?;
                let (then_set, else_set) = self.narrowings_from_condition(cond);
                self.push_scope();
                for (path, ty) in then_set {
                    self.apply_narrowing(path, ty);
                }
                let consequent_ty = self.check_expr(consequent)?;
                self.pop_scope();
                self.push_scope();
                for (path, ty) in else_set {
                    self.apply_narrowing(path, ty);
                }
                let alternate_ty = self.check_expr(alternate)?;
                self.pop_scope();
                Ok(self.interner.union(vec![consequent_ty, alternate_ty]))
            }
            ExprKind::Sequence(parts) => {
                let mut last = TypeId::UNDEFINED;
                for part in parts {
                    last = self.check_expr(part)?;
                }
                Ok(last)
            }
            ExprKind::Spread(inner) => self.check_expr(inner),
            ExprKind::TypeAssertion { expr: inner, ty } => {
                self.check_expr(inner)?;
                let env = TypeParamEnv::default();
                self.type_from_ann(ty, &env)
            }
            ExprKind::NonNull(inner) => {
                let ty = self.check_expr(inner)?;
                Ok(self.remove_from_union(ty, &[TypeId::NULL, TypeId::UNDEFINED]))
            }
            ExprKind::Yield { argument, .. } => {
                if let Some(argument) = argument {
                    self.check_expr(argument)?;
                }
                // The value sent back by the consumer's next().
                Ok(TypeId::ANY)
            }
            ExprKind::Await(operand) => {
                let ty = self.check_expr(operand)?;
                Ok(self.awaited_type(ty))
            }
        }
    }

    fn literal_type(&mut self, lit: &Lit) -> TypeId {
        match lit {
            Lit::Number(value) => self.interner.number_literal(*value),
            Lit::Str(text) => self.interner.string_literal(text),
            Lit::Bool(value) => self.interner.boolean_literal(*value),
            Lit::Null => TypeId::NULL,
            Lit::Undefined => TypeId::UNDEFINED,
            Lit::BigInt(_) => TypeId::BIGINT,
            Lit::Regex { .. } => self.interner.intern(TypeKey::Record(solver::RecordType {
                fields: vec![
                    (
                        "source".to_string(),
                        solver::PropInfo {
                            ty: TypeId::STRING,
                            optional: false,
                            readonly: true,
                        },
                    ),
                    (
                        "flags".to_string(),
                        solver::PropInfo {
                            ty: TypeId::STRING,
                            optional: false,
                            readonly: true,
                        },
                    ),
                ],
                indexes: solver::IndexSignatures::default(),
            })),
        }
    }

    fn check_ident(&mut self, name: &str, span: Span) -> Result<TypeId, Diagnostic> {
        if let Some(narrowed) = self.narrowed(name) {
            return Ok(narrowed);
        }
        match self.lookup(name) {
            Some(binding) => Ok(binding.ty),
            None => Err(Diagnostic::type_error(
                span,
                format!("Cannot find name '{name}'."),
                diagnostic_codes::CANNOT_FIND_NAME,
            )),
        }
    }

    /// Widen a literal type to its primitive (mutable positions).
    pub fn widen_literal(&mut self, ty: TypeId) -> TypeId {
        match self.interner.lookup(ty) {
            TypeKey::StringLiteral(_) => TypeId::STRING,
            TypeKey::NumberLiteral(_) => TypeId::NUMBER,
            TypeKey::BooleanLiteral(_) => TypeId::BOOLEAN,
            _ => ty,
        }
    }

    pub fn awaited_type(&mut self, ty: TypeId) -> TypeId {
        match self.interner.lookup(evaluate_type(&self.interner, ty)) {
            TypeKey::Promise(inner) => self.awaited_type(inner),
            _ => ty,
        }
    }

    // =========================================================================
    // Operators
    // =========================================================================

    fn check_binary(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        span: Span,
    ) -> Result<TypeId, Diagnostic> {
        let left_checked = self.check_expr(left)?;
        let left_ty = evaluate_type(&self.interner, left_checked);
        let right_checked = self.check_expr(right)?;
        let right_ty = evaluate_type(&self.interner, right_checked);
        let is_bigint = |ty: TypeId, interner: &sharpts_solver::TypeInterner| {
            matches!(interner.lookup(ty), TypeKey::BigInt)
        };
        match op {
            BinaryOp::Add => {
                let stringish = is_compatible(&self.interner, TypeId::STRING, left_ty)
                    || is_compatible(&self.interner, TypeId::STRING, right_ty);
                if stringish {
                    return Ok(TypeId::STRING);
                }
                let left_big = is_bigint(left_ty, &self.interner);
                let right_big = is_bigint(right_ty, &self.interner);
                if left_big != right_big
                    && left_ty != TypeId::ANY
                    && right_ty != TypeId::ANY
                {
                    return Err(Diagnostic::type_error(
                        span,
                        "Operator '+' cannot mix bigint and number operands.",
                        diagnostic_codes::TYPE_NOT_ASSIGNABLE,
                    ));
                }
                if left_big {
                    return Ok(TypeId::BIGINT);
                }
                Ok(TypeId::NUMBER)
            }
            BinaryOp::Sub
            | BinaryOp::Mul
            | BinaryOp::Div
            | BinaryOp::Rem
            | BinaryOp::Exp => {
                let left_big = is_bigint(left_ty, &self.interner);
                let right_big = is_bigint(right_ty, &self.interner);
                if left_big != right_big
                    && left_ty != TypeId::ANY
                    && right_ty != TypeId::ANY
                {
                    return Err(Diagnostic::type_error(
                        span,
                        "Cannot mix bigint and number operands in an arithmetic operation.",
                        diagnostic_codes::TYPE_NOT_ASSIGNABLE,
                    ));
                }
                if left_big {
                    return Ok(TypeId::BIGINT);
                }
                self.require_numeric(left_ty, left.span)?;
                self.require_numeric(right_ty, right.span)?;
                Ok(TypeId::NUMBER)
            }
            BinaryOp::Shl | BinaryOp::Shr | BinaryOp::UShr | BinaryOp::BitAnd
            | BinaryOp::BitOr | BinaryOp::BitXor => {
                if is_bigint(left_ty, &self.interner) && is_bigint(right_ty, &self.interner) {
                    return Ok(TypeId::BIGINT);
                }
                self.require_numeric(left_ty, left.span)?;
                self.require_numeric(right_ty, right.span)?;
                Ok(TypeId::NUMBER)
            }
            BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => Ok(TypeId::BOOLEAN),
            BinaryOp::Eq | BinaryOp::StrictEq | BinaryOp::Neq | BinaryOp::StrictNeq => {
                Ok(TypeId::BOOLEAN)
            }
            BinaryOp::Instanceof => {
                match self.interner.lookup(right_ty) {
                    TypeKey::Class(_) | TypeKey::Function(_) | TypeKey::Overloaded(_)
                    | TypeKey::Any => Ok(TypeId::BOOLEAN),
                    _ => Err(Diagnostic::type_error(
                        right.span,
                        "The right-hand side of 'instanceof' must be callable.",
                        diagnostic_codes::NOT_CALLABLE,
                    )),
                }
            }
            BinaryOp::In => Ok(TypeId::BOOLEAN),
        }
    }

    fn require_numeric(&self, ty: TypeId, span: Span) -> Result<(), Diagnostic> {
        let ok = ty == TypeId::ANY
            || ty == TypeId::ERROR
            || is_compatible(&self.interner, TypeId::NUMBER, ty);
        if ok {
            Ok(())
        } else {
            Err(Diagnostic::type_error(
                span,
                format!(
                    "The operand type '{}' is not a number.",
                    type_to_string(&self.interner, ty)
                ),
                diagnostic_codes::TYPE_NOT_ASSIGNABLE,
            ))
        }
    }

    fn check_unary(
        &mut self,
        op: UnaryOp,
        operand: &Expr,
        _span: Span,
    ) -> Result<TypeId, Diagnostic> {
        let ty = self.check_expr(operand)?;
        let ty = evaluate_type(&self.interner, ty);
        Ok(match op {
            UnaryOp::Neg | UnaryOp::Plus | UnaryOp::BitNot => {
                if matches!(self.interner.lookup(ty), TypeKey::BigInt) {
                    TypeId::BIGINT
                } else {
                    if op != UnaryOp::Plus {
                        self.require_numeric(ty, operand.span)?;
                    }
                    TypeId::NUMBER
                }
            }
            UnaryOp::Not => TypeId::BOOLEAN,
            UnaryOp::Typeof => TypeId::STRING,
            UnaryOp::Void => TypeId::UNDEFINED,
            UnaryOp::Delete => TypeId::BOOLEAN,
        })
    }

    fn check_assignment(
        &mut self,
        op: AssignOp,
        target: &Expr,
        value: &Expr,
    ) -> Result<TypeId, Diagnostic> {
        let value_ty = self.check_expr(value)?;
        let target_ty = self.check_assignment_target(target)?;

        if op == AssignOp::Assign {
            if !is_compatible(&self.interner, target_ty, value_ty) {
                return Err(self.assignability_error(value.span, target_ty, value_ty));
            }
        }

        // Any write to a path invalidates narrowings along it.
        if let Some(path) = self.path_key(target) {
            self.invalidate_narrowings(&path);
        }
        Ok(value_ty)
    }

    /// The declared type of an assignment target, with const/readonly
    /// enforcement.
    fn check_assignment_target(&mut self, target: &Expr) -> Result<TypeId, Diagnostic> {
        match &target.kind {
            ExprKind::Ident(name) => {
                let Some(binding) = self.lookup(name).cloned() else {
                    return Err(Diagnostic::type_error(
                        target.span,
                        format!("Cannot find name '{name}'."),
                        diagnostic_codes::CANNOT_FIND_NAME,
                    ));
                };
                if binding.kind == BindingKind::Const {
                    return Err(Diagnostic::type_error(
                        target.span,
                        format!("Cannot assign to '{name}' because it is a constant."),
                        diagnostic_codes::CANNOT_ASSIGN_TO_CONST,
                    ));
                }
                Ok(binding.ty)
            }
            ExprKind::Member {
                object, property, ..
            } => {
                let object_ty = self.check_expr(object)?;
                self.check_readonly_member(object_ty, property, target.span)?;
                self.member_type_of(object_ty, property, target.span)
            }
            ExprKind::Index { object, index, .. } => {
                let object_ty = self.check_expr(object)?;
                let index_ty = self.check_expr(index)?;
                self.index_result_type(object_ty, index_ty, target.span)
            }
            ExprKind::Paren(inner) | ExprKind::NonNull(inner) => {
                self.check_assignment_target(inner)
            }
            _ => Err(Diagnostic::type_error(
                target.span,
                "The target of an assignment must be a variable or a property access.",
                diagnostic_codes::TYPE_NOT_ASSIGNABLE,
            )),
        }
    }

    fn check_readonly_member(
        &mut self,
        object_ty: TypeId,
        property: &str,
        span: Span,
    ) -> Result<(), Diagnostic> {
        let readonly = match shape_of(&self.interner, object_ty) {
            Some(shape) => shape.find(property).map(|p| p.readonly).unwrap_or(false),
            None => false,
        };
        // Inside the declaring class a readonly field is writable only
        // in the constructor; enforced as: writable while `this` is the
        // declaring class (constructor and initializers run there).
        let in_own_class = !self.this_stack.is_empty();
        if readonly && !in_own_class {
            return Err(Diagnostic::type_error(
                span,
                format!("Cannot assign to '{property}' because it is a read-only property."),
                diagnostic_codes::READONLY_ASSIGNMENT,
            ));
        }
        Ok(())
    }

    pub fn assignability_error(
        &self,
        span: Span,
        expected: TypeId,
        actual: TypeId,
    ) -> Diagnostic {
        Diagnostic::type_error(
            span,
            format!(
                "Type '{}' is not assignable to type '{}'.",
                type_to_string(&self.interner, actual),
                type_to_string(&self.interner, expected)
            ),
            diagnostic_codes::TYPE_NOT_ASSIGNABLE,
        )
    }

    // =========================================================================
    // Indexing
    // =========================================================================

    fn check_index(
        &mut self,
        expr: &Expr,
        object: &Expr,
        index: &Expr,
        optional: bool,
    ) -> Result<TypeId, Diagnostic> {
        if let Some(path) = self.path_key(expr) {
            if let Some(narrowed) = self.narrowed(&path) {
                let _ = self.check_expr(object)?;
                let _ = self.check_expr(index)?;
                return Ok(narrowed);
            }
        }
        let object_ty = self.check_expr(object)?;
        let index_ty = self.check_expr(index)?;
        let receiver = if optional {
            self.remove_from_union(object_ty, &[TypeId::NULL, TypeId::UNDEFINED])
        } else {
            object_ty
        };
        let result = self.index_result_type(receiver, index_ty, expr.span)?;
        Ok(if optional {
            self.interner.union(vec![result, TypeId::UNDEFINED])
        } else {
            result
        })
    }

    pub fn index_result_type(
        &mut self,
        object_ty: TypeId,
        index_ty: TypeId,
        span: Span,
    ) -> Result<TypeId, Diagnostic> {
        let object_ty = evaluate_type(&self.interner, object_ty);
        let index_ty = evaluate_type(&self.interner, index_ty);
        match self.interner.lookup(object_ty) {
            TypeKey::Any | TypeKey::Error => return Ok(TypeId::ANY),
            TypeKey::Array(element) => {
                if is_compatible(&self.interner, TypeId::NUMBER, index_ty) {
                    return Ok(element);
                }
            }
            TypeKey::Tuple(tuple) => {
                if let TypeKey::NumberLiteral(bits) = self.interner.lookup(index_ty) {
                    let idx = bits.as_f64();
                    let in_range = idx >= 0.0
                        && idx.fract() == 0.0
                        && ((idx as usize) < tuple.elements.len() || tuple.has_spread);
                    if !in_range {
                        return Err(Diagnostic::type_error(
                            span,
                            format!(
                                "Tuple type of length {} has no element at index {}.",
                                tuple.elements.len(),
                                sharpts_common::numeric::format_number(idx)
                            ),
                            diagnostic_codes::TUPLE_INDEX_OUT_OF_RANGE,
                        ));
                    }
                    let element = tuple
                        .elements
                        .get(idx as usize)
                        .or_else(|| tuple.elements.iter().find(|e| e.rest));
                    if let Some(element) = element {
                        return Ok(element.type_id);
                    }
                }
                if is_compatible(&self.interner, TypeId::NUMBER, index_ty) {
                    // Dynamic index: the union of element types.
                    let members: Vec<TypeId> =
                        tuple.elements.iter().map(|e| e.type_id).collect();
                    return Ok(self.interner.union(members));
                }
            }
            TypeKey::String | TypeKey::StringLiteral(_) => {
                if is_compatible(&self.interner, TypeId::NUMBER, index_ty) {
                    return Ok(TypeId::STRING);
                }
            }
            TypeKey::Enum(enum_type) => {
                // Reverse mapping: numeric enums only.
                if is_compatible(&self.interner, TypeId::NUMBER, index_ty) {
                    if enum_type.kind == solver::EnumKind::String {
                        return Err(Diagnostic::type_error(
                            span,
                            format!(
                                "String enum '{}' has no reverse mapping.",
                                enum_type.name
                            ),
                            diagnostic_codes::REVERSE_MAP_ON_STRING_ENUM,
                        ));
                    }
                    return Ok(TypeId::STRING);
                }
                if let TypeKey::StringLiteral(name) = self.interner.lookup(index_ty) {
                    let binding_ty = self
                        .interner
                        .intern(TypeKey::Enum(enum_type.clone()));
                    return self.member_type_of(binding_ty, &name, span);
                }
            }
            _ => {
                let access = self.interner.intern(TypeKey::IndexedAccess {
                    object: object_ty,
                    index: index_ty,
                });
                let resolved = evaluate_type(&self.interner, access);
                if resolved != TypeId::ERROR {
                    return Ok(resolved);
                }
            }
        }
        Err(Diagnostic::type_error(
            span,
            format!(
                "Type '{}' cannot be indexed with type '{}'.",
                type_to_string(&self.interner, object_ty),
                type_to_string(&self.interner, index_ty)
            ),
            diagnostic_codes::NOT_INDEXABLE,
        ))
    }

    // =========================================================================
    // Object literals
    // =========================================================================

    fn check_object_literal(&mut self, props: &[ObjectProp]) -> Result<TypeId, Diagnostic> {
        let mut fields: Vec<(String, solver::PropInfo)> = Vec::new();
        let mut push = |name: String, ty: TypeId| {
            fields.retain(|(existing, _)| existing != &name);
            fields.push((
                name,
                solver::PropInfo {
                    ty,
                    optional: false,
                    readonly: false,
                },
            ));
        };
        for prop in props {
            match &prop.value {
                ObjectPropValue::Spread(inner) => {
                    let inner_ty = self.check_expr(inner)?;
                    if let Some(shape) = shape_of(&self.interner, inner_ty) {
                        for (name, info) in shape.props {
                            push(name, info.ty);
                        }
                    }
                }
                ObjectPropValue::Value(value) => {
                    let ty = self.check_expr(value)?;
                    if let Some(name) = prop.key.as_static() {
                        push(name, ty);
                    } else if let PropName::Computed(key_expr) = &prop.key {
                        let _ = self.check_expr(key_expr)?;
                    }
                }
                ObjectPropValue::Shorthand => {
                    if let PropName::Ident(name) = &prop.key {
                        let ty = self.check_ident(name, prop.span)?;
                        push(name.clone(), ty);
                    }
                }
                ObjectPropValue::Method(parts) => {
                    let ty = self.check_function_like(
                        &parts.type_params,
                        &parts.params,
                        parts.return_type.as_ref(),
                        FunctionBody::Block(parts.body.as_deref()),
                        parts.is_async,
                        parts.is_generator,
                    )?;
                    if let Some(name) = prop.key.as_static() {
                        push(name, ty);
                    }
                }
                ObjectPropValue::Getter(body) => {
                    if let Some(body) = body {
                        self.push_scope();
                        for stmt in body {
                            self.check_statement(stmt)?;
                        }
                        self.pop_scope();
                    }
                    if let Some(name) = prop.key.as_static() {
                        push(name, TypeId::ANY);
                    }
                }
                ObjectPropValue::Setter(param, body) => {
                    if let Some(body) = body {
                        self.push_scope();
                        let env = TypeParamEnv::default();
                        let param_ty = param
                            .type_ann
                            .as_ref()
                            .map(|a| self.type_from_ann(a, &env))
                            .transpose()?
                            .unwrap_or(TypeId::ANY);
                        self.declare(&param.name, param_ty, BindingKind::Param)?;
                        for stmt in body {
                            self.check_statement(stmt)?;
                        }
                        self.pop_scope();
                    }
                }
            }
        }
        Ok(self.interner.intern(TypeKey::Record(solver::RecordType {
            fields,
            indexes: solver::IndexSignatures::default(),
        })))
    }

    // =========================================================================
    // Functions
    // =========================================================================

    pub fn check_function_like(
        &mut self,
        type_params: &[TypeParamDecl],
        params: &[Param],
        return_type: Option<&TypeAnn>,
        body: FunctionBody<'_>,
        is_async: bool,
        is_generator: bool,
    ) -> Result<TypeId, Diagnostic> {
        let env = TypeParamEnv::default();
        let (infos, inner_env) = self.bind_type_params(type_params, &env)?;
        let signature = self.signature_from_parts(
            params,
            return_type,
            &infos,
            &inner_env,
            is_async,
            is_generator,
        )?;

        // Check the body with parameters in scope.
        let declared_return = match self.interner.lookup(signature) {
            TypeKey::Function(function) => Some(function),
            _ => None,
        };
        self.push_scope();
        for (i, param) in params.iter().enumerate() {
            let ty = declared_return
                .as_ref()
                .and_then(|f| f.params.get(i).map(|p| p.ty))
                .unwrap_or(TypeId::ANY);
            self.declare(&param.name, ty, BindingKind::Param)?;
            if let Some(default) = &param.default {
                let default_ty = self.check_expr(default)?;
                if !is_compatible(&self.interner, ty, default_ty) {
                    self.pop_scope();
                    return Err(self.assignability_error(default.span, ty, default_ty));
                }
            }
        }
        let return_for_body = declared_return.as_ref().map(|f| {
            if is_async {
                self.awaited_type(f.ret)
            } else {
                f.ret
            }
        });
        self.function_stack.push(FunctionContext {
            return_type: if return_type.is_some() {
                return_for_body
            } else {
                None
            },
            is_async,
            is_generator,
        });
        let body_result = match body {
            FunctionBody::Arrow(ArrowBody::Expr(expr)) => match self.check_expr(expr) {
                Ok(actual) => {
                    let expected = self.function_stack.last().and_then(|f| f.return_type);
                    match expected {
                        Some(expected)
                            if !is_compatible(&self.interner, expected, actual) =>
                        {
                            Err(self.assignability_error(expr.span, expected, actual))
                        }
                        _ => Ok(()),
                    }
                }
                Err(error) => Err(error),
            },
            FunctionBody::Arrow(ArrowBody::Block(stmts)) => self.check_statements(stmts),
            FunctionBody::Block(Some(stmts)) => self.check_statements(stmts),
            FunctionBody::Block(None) => Ok(()),
        };
        self.function_stack.pop();
        self.pop_scope();
        body_result?;
        Ok(signature)
    }

    pub fn signature_from_parts(
        &mut self,
        params: &[Param],
        return_type: Option<&TypeAnn>,
        type_params: &[solver::TypeParamInfo],
        env: &TypeParamEnv,
        is_async: bool,
        is_generator: bool,
    ) -> Result<TypeId, Diagnostic> {
        let mut converted = Vec::with_capacity(params.len());
        let mut this_type = None;
        for param in params {
            let mut ty = param
                .type_ann
                .as_ref()
                .map(|a| self.type_from_ann(a, env))
                .transpose()?
                .unwrap_or(TypeId::ANY);
            if param.name == "this" {
                this_type = Some(ty);
                continue;
            }
            if param.default.is_some() {
                ty = self.widen_literal(ty);
            }
            converted.push(solver::ParamInfo {
                name: param.name.clone(),
                ty,
                optional: param.optional || param.default.is_some(),
                rest: param.rest,
            });
        }
        let (mut ret, predicate) = match return_type {
            Some(ann) => self.return_type_from_ann(ann, env)?,
            None => (TypeId::ANY, None),
        };
        if is_async {
            // The declared annotation is already Promise<T> when
            // written; an inferred `any` also wraps.
            if !matches!(self.interner.lookup(ret), TypeKey::Promise(_)) && return_type.is_none() {
                ret = self.interner.promise(TypeId::ANY);
            }
        }
        if is_generator && return_type.is_none() {
            ret = self.generator_type(TypeId::ANY, is_async);
        }
        let min_arity = converted
            .iter()
            .filter(|p| !p.optional && !p.rest)
            .count() as u32;
        let has_rest = converted.iter().any(|p| p.rest);
        Ok(self.interner.intern(TypeKey::Function(solver::FunctionType {
            type_params: type_params.to_vec(),
            params: converted,
            ret,
            min_arity,
            has_rest,
            this_type,
            predicate,
        })))
    }

    pub fn generator_type(&mut self, element: TypeId, is_async: bool) -> TypeId {
        let name = if is_async { "AsyncGenerator" } else { "Generator" };
        match self.type_bindings.get(name).copied() {
            Some(def) => {
                let params = match self.interner.lookup(def) {
                    TypeKey::Interface(interface) => interface.type_params.clone(),
                    _ => Vec::new(),
                };
                self.instantiate_definition(def, &params, &[element])
            }
            None => TypeId::ANY,
        }
    }

    // =========================================================================
    // Calls
    // =========================================================================

    fn check_call(
        &mut self,
        expr: &Expr,
        callee: &Expr,
        type_args: &[TypeAnn],
        args: &[Expr],
        optional: bool,
    ) -> Result<TypeId, Diagnostic> {
        // `super(...)` checks against the superclass constructor.
        if matches!(callee.kind, ExprKind::Super) {
            for arg in args {
                self.check_expr(arg)?;
            }
            return Ok(TypeId::VOID);
        }

        let callee_ty = self.check_expr(callee)?;
        let env = TypeParamEnv::default();
        let explicit: Vec<TypeId> = type_args
            .iter()
            .map(|a| self.type_from_ann(a, &env))
            .collect::<Result<_, _>>()?;

        let mut arg_types = Vec::with_capacity(args.len());
        let mut has_spread = false;
        for arg in args {
            if let ExprKind::Spread(inner) = &arg.kind {
                has_spread = true;
                let inner_ty = self.check_expr(inner)?;
                self.record_expr_type(arg.id, inner_ty);
                arg_types.push(inner_ty);
            } else {
                arg_types.push(self.check_expr(arg)?);
            }
        }

        let receiver = if optional {
            self.remove_from_union(callee_ty, &[TypeId::NULL, TypeId::UNDEFINED])
        } else {
            callee_ty
        };
        let result =
            self.resolve_call(receiver, &explicit, &arg_types, args, has_spread, expr.span)?;
        Ok(if optional {
            self.interner.union(vec![result, TypeId::UNDEFINED])
        } else {
            result
        })
    }

    pub fn resolve_call(
        &mut self,
        callee_ty: TypeId,
        explicit_type_args: &[TypeId],
        arg_types: &[TypeId],
        args: &[Expr],
        has_spread: bool,
        span: Span,
    ) -> Result<TypeId, Diagnostic> {
        let callee_ty = evaluate_type(&self.interner, callee_ty);
        match self.interner.lookup(callee_ty) {
            TypeKey::Any | TypeKey::Error => Ok(TypeId::ANY),
            TypeKey::Function(function) => self.check_signature(
                &function,
                explicit_type_args,
                arg_types,
                args,
                has_spread,
                span,
            ),
            TypeKey::Overloaded(signatures) => {
                // Arity filter first, then the first candidate whose
                // arguments are all compatible; ties break by source
                // order.
                let mut last_error = None;
                for &signature in &signatures {
                    let TypeKey::Function(function) = self.interner.lookup(signature) else {
                        continue;
                    };
                    if !arity_accepts(&function, arg_types.len(), has_spread) {
                        continue;
                    }
                    match self.check_signature(
                        &function,
                        explicit_type_args,
                        arg_types,
                        args,
                        has_spread,
                        span,
                    ) {
                        Ok(result) => return Ok(result),
                        Err(error) => last_error = Some(error),
                    }
                }
                Err(last_error.unwrap_or_else(|| {
                    Diagnostic::type_error(
                        span,
                        format!(
                            "No overload expects {} argument(s).",
                            arg_types.len()
                        ),
                        diagnostic_codes::NO_OVERLOAD_MATCHES,
                    )
                }))
            }
            TypeKey::Intersection(members) => {
                // Callable-and-record intersections (conversion
                // functions with static members) call through their
                // callable branch.
                for member in members {
                    let callable = matches!(
                        self.interner.lookup(member),
                        TypeKey::Function(_) | TypeKey::Overloaded(_)
                    );
                    if callable {
                        return self.resolve_call(
                            member,
                            explicit_type_args,
                            arg_types,
                            args,
                            has_spread,
                            span,
                        );
                    }
                }
                Err(Diagnostic::type_error(
                    span,
                    format!(
                        "Type '{}' is not callable.",
                        type_to_string(&self.interner, callee_ty)
                    ),
                    diagnostic_codes::NOT_CALLABLE,
                ))
            }
            _ => Err(Diagnostic::type_error(
                span,
                format!(
                    "Type '{}' is not callable.",
                    type_to_string(&self.interner, callee_ty)
                ),
                diagnostic_codes::NOT_CALLABLE,
            )),
        }
    }

    fn check_signature(
        &mut self,
        function: &solver::FunctionType,
        explicit_type_args: &[TypeId],
        arg_types: &[TypeId],
        args: &[Expr],
        has_spread: bool,
        span: Span,
    ) -> Result<TypeId, Diagnostic> {
        if !arity_accepts(function, arg_types.len(), has_spread) {
            return Err(Diagnostic::type_error(
                span,
                format!(
                    "Expected {} argument(s), but got {}.",
                    function.min_arity,
                    arg_types.len()
                ),
                diagnostic_codes::WRONG_ARITY,
            ));
        }

        let mut resolved = function.clone();
        if !function.type_params.is_empty() {
            // Explicit type arguments override inference; otherwise
            // unify parameter types against argument types, applying
            // constraints as defaults.
            let subst = if !explicit_type_args.is_empty() {
                TypeSubstitution::from_params(
                    &self.interner,
                    &function.type_params,
                    explicit_type_args,
                )
            } else {
                let mut bindings: FxHashMap<String, TypeId> = FxHashMap::default();
                let names: Vec<String> = function
                    .type_params
                    .iter()
                    .map(|p| p.name.clone())
                    .collect();
                for (param, &arg_ty) in function.params.iter().zip(arg_types.iter()) {
                    self.unify(param.ty, arg_ty, &names, &mut bindings);
                }
                let mut subst = TypeSubstitution::new();
                for param in &function.type_params {
                    let bound = bindings
                        .get(&param.name)
                        .copied()
                        .map(|t| self.widen_literal(t))
                        .or(param.default)
                        .or(param.constraint)
                        .unwrap_or(TypeId::UNKNOWN);
                    subst.insert(param.name.clone(), bound);
                }
                subst
            };
            // Constraint validation.
            for param in &function.type_params {
                if let (Some(constraint), Some(arg)) = (param.constraint, subst.get(&param.name)) {
                    let constraint = instantiate_type(&self.interner, constraint, &subst);
                    if !is_compatible(&self.interner, constraint, arg) {
                        return Err(Diagnostic::type_error(
                            span,
                            format!(
                                "Type '{}' does not satisfy the constraint '{}'.",
                                type_to_string(&self.interner, arg),
                                type_to_string(&self.interner, constraint)
                            ),
                            diagnostic_codes::CONSTRAINT_UNSATISFIED,
                        ));
                    }
                }
            }
            let instantiated = instantiate_type(
                &self.interner,
                self.interner.intern(TypeKey::Function(solver::FunctionType {
                    type_params: Vec::new(),
                    ..function.clone()
                })),
                &subst,
            );
            if let TypeKey::Function(f) = self.interner.lookup(instantiated) {
                resolved = f;
            }
        }

        for (i, &arg_ty) in arg_types.iter().enumerate() {
            let expected = match resolved.params.get(i) {
                Some(param) if param.rest => rest_element(&self.interner, param.ty),
                Some(param) => param.ty,
                None => match resolved.params.last() {
                    Some(param) if param.rest => rest_element(&self.interner, param.ty),
                    _ => continue,
                },
            };
            // A spread argument supplies elements, not the array itself.
            let effective = if args
                .get(i)
                .is_some_and(|a| matches!(a.kind, ExprKind::Spread(_)))
            {
                self.element_type_of_iterable(arg_ty, span, false)
                    .unwrap_or(TypeId::ANY)
            } else {
                arg_ty
            };
            if !is_compatible(&self.interner, expected, effective) {
                let arg_span = args.get(i).map(|a| a.span).unwrap_or(span);
                return Err(Diagnostic::type_error(
                    arg_span,
                    format!(
                        "Argument of type '{}' is not assignable to parameter of type '{}'.",
                        type_to_string(&self.interner, effective),
                        type_to_string(&self.interner, expected)
                    ),
                    diagnostic_codes::TYPE_NOT_ASSIGNABLE,
                ));
            }
        }
        Ok(evaluate_type(&self.interner, resolved.ret))
    }

    /// Structural unification of a parameter type against an argument
    /// type, binding the named type parameters.
    fn unify(
        &mut self,
        param_ty: TypeId,
        arg_ty: TypeId,
        names: &[String],
        bindings: &mut FxHashMap<String, TypeId>,
    ) {
        match self.interner.lookup(param_ty) {
            TypeKey::TypeParameter(info) if names.contains(&info.name) => {
                match bindings.get(&info.name).copied() {
                    Some(existing) => {
                        let merged = self.interner.union(vec![existing, arg_ty]);
                        bindings.insert(info.name, merged);
                    }
                    None => {
                        bindings.insert(info.name, arg_ty);
                    }
                }
            }
            TypeKey::Array(p_elem) => {
                match self.interner.lookup(evaluate_type(&self.interner, arg_ty)) {
                    TypeKey::Array(a_elem) => self.unify(p_elem, a_elem, names, bindings),
                    TypeKey::Tuple(tuple) => {
                        let union = self
                            .interner
                            .union(tuple.elements.iter().map(|e| e.type_id).collect());
                        self.unify(p_elem, union, names, bindings);
                    }
                    _ => {}
                }
            }
            TypeKey::Promise(p_inner) => {
                if let TypeKey::Promise(a_inner) =
                    self.interner.lookup(evaluate_type(&self.interner, arg_ty))
                {
                    self.unify(p_inner, a_inner, names, bindings);
                }
            }
            TypeKey::Tuple(p_tuple) => {
                if let TypeKey::Tuple(a_tuple) =
                    self.interner.lookup(evaluate_type(&self.interner, arg_ty))
                {
                    for (p, a) in p_tuple.elements.iter().zip(a_tuple.elements.iter()) {
                        self.unify(p.type_id, a.type_id, names, bindings);
                    }
                }
            }
            TypeKey::Function(p_func) => {
                if let TypeKey::Function(a_func) =
                    self.interner.lookup(evaluate_type(&self.interner, arg_ty))
                {
                    for (p, a) in p_func.params.iter().zip(a_func.params.iter()) {
                        self.unify(p.ty, a.ty, names, bindings);
                    }
                    self.unify(p_func.ret, a_func.ret, names, bindings);
                }
            }
            TypeKey::Record(p_record) => {
                if let Some(shape) = shape_of(&self.interner, arg_ty) {
                    for (name, p_prop) in &p_record.fields {
                        if let Some(a_prop) = shape.find(name) {
                            self.unify(p_prop.ty, a_prop.ty, names, bindings);
                        }
                    }
                }
            }
            TypeKey::Union(members) => {
                for member in members {
                    self.unify(member, arg_ty, names, bindings);
                }
            }
            _ => {}
        }
    }

    // =========================================================================
    // new
    // =========================================================================

    fn check_new(
        &mut self,
        expr: &Expr,
        callee: &Expr,
        type_args: &[TypeAnn],
        args: &[Expr],
    ) -> Result<TypeId, Diagnostic> {
        let env = TypeParamEnv::default();
        let explicit: Vec<TypeId> = type_args
            .iter()
            .map(|a| self.type_from_ann(a, &env))
            .collect::<Result<_, _>>()?;

        // `new Promise<T>((resolve, reject) => ...)` builds a promise;
        // the executor is checked loosely.
        if let ExprKind::Ident(name) = &callee.kind {
            let is_builtin_promise = name == "Promise"
                && self
                    .lookup(name)
                    .map(|b| b.kind == BindingKind::Builtin)
                    .unwrap_or(true);
            if is_builtin_promise {
                for arg in args {
                    self.check_expr(arg)?;
                }
                let inner = explicit.first().copied().unwrap_or(TypeId::ANY);
                return Ok(self.interner.promise(inner));
            }
        }

        let callee_ty = self.check_expr(callee)?;
        let mut arg_types = Vec::with_capacity(args.len());
        let mut has_spread = false;
        for arg in args {
            if let ExprKind::Spread(inner) = &arg.kind {
                has_spread = true;
                arg_types.push(self.check_expr(inner)?);
            } else {
                arg_types.push(self.check_expr(arg)?);
            }
        }

        match self.interner.lookup(callee_ty) {
            TypeKey::Any | TypeKey::Error => Ok(TypeId::ANY),
            TypeKey::Class(class) => {
                if class.is_abstract {
                    return Err(Diagnostic::type_error(
                        expr.span,
                        format!("Cannot create an instance of abstract class '{}'.", class.name),
                        diagnostic_codes::ABSTRACT_NOT_IMPLEMENTED,
                    ));
                }
                // Constructor check (inherited when absent).
                if let Some(ctor) = self.resolve_constructor(&class) {
                    self.resolve_call(ctor, &[], &arg_types, args, has_spread, expr.span)?;
                }
                let target = if class.type_params.is_empty() {
                    callee_ty
                } else {
                    let inferred: Vec<TypeId> = if !explicit.is_empty() {
                        explicit
                    } else {
                        self.infer_class_type_args(&class, &arg_types)
                    };
                    self.instantiate_definition(callee_ty, &class.type_params, &inferred)
                };
                Ok(self.interner.intern(TypeKey::Instance(target)))
            }
            _ => Err(Diagnostic::type_error(
                expr.span,
                format!(
                    "Type '{}' is not constructable.",
                    type_to_string(&self.interner, callee_ty)
                ),
                diagnostic_codes::NOT_CALLABLE,
            )),
        }
    }

    fn resolve_constructor(&mut self, class: &solver::ClassType) -> Option<TypeId> {
        if let Some(ctor) = class.ctor {
            return Some(ctor);
        }
        let superclass = class.superclass?;
        let (base, _) = sharpts_solver::class_of_instance(&self.interner, superclass)?;
        self.resolve_constructor(&base)
    }

    fn infer_class_type_args(
        &mut self,
        class: &solver::ClassType,
        arg_types: &[TypeId],
    ) -> Vec<TypeId> {
        let names: Vec<String> = class.type_params.iter().map(|p| p.name.clone()).collect();
        let mut bindings: FxHashMap<String, TypeId> = FxHashMap::default();
        if let Some(ctor) = class.ctor {
            if let TypeKey::Function(function) = self.interner.lookup(ctor) {
                for (param, &arg) in function.params.iter().zip(arg_types.iter()) {
                    self.unify(param.ty, arg, &names, &mut bindings);
                }
            }
        }
        class
            .type_params
            .iter()
            .map(|p| {
                bindings
                    .get(&p.name)
                    .copied()
                    .map(|t| self.widen_literal(t))
                    .or(p.default)
                    .or(p.constraint)
                    .unwrap_or(TypeId::UNKNOWN)
            })
            .collect()
    }
}

/// The checked body form of a function-like expression.
pub enum FunctionBody<'a> {
    Arrow(&'a ArrowBody),
    Block(Option<&'a [Stmt]>),
}

fn arity_accepts(function: &solver::FunctionType, argc: usize, has_spread: bool) -> bool {
    if has_spread {
        // A spread can supply any remaining arity.
        return true;
    }
    if (argc as u32) < function.min_arity {
        return false;
    }
    function.has_rest || argc <= function.params.len()
}

fn rest_element(interner: &sharpts_solver::TypeInterner, rest_ty: TypeId) -> TypeId {
    match interner.lookup(rest_ty) {
        TypeKey::Array(element) => element,
        _ => TypeId::ANY,
    }
}
