//! Statement checking and the hoisting pass.

use sharpts_common::diagnostics::{Diagnostic, diagnostic_codes};
use sharpts_common::span::Span;
use sharpts_parser::ast::*;
use sharpts_solver::evaluate::evaluate_type;
use sharpts_solver::types::{self as solver, TypeId, TypeKey};
use sharpts_solver::{is_compatible, type_to_string};

use crate::annotations::TypeParamEnv;
use crate::context::{BindingKind, CheckerContext};
use crate::expr::FunctionBody;

impl CheckerContext {
    // =========================================================================
    // Hoisting
    // =========================================================================

    /// Collect top-level declarations so mutual references type-check.
    /// Classes are pre-declared with provisional (empty) types that are
    /// replaced during elaboration; consecutive same-name function
    /// statements form overload clusters.
    pub fn hoist_declarations(&mut self, statements: &[Stmt]) -> Result<(), Diagnostic> {
        // Aliases, interfaces, and enums first: class members may
        // reference them.
        for stmt in statements {
            match self.unwrap_export(stmt) {
                StmtKind::TypeAlias(alias) => {
                    if self.aliases.contains_key(&alias.name) {
                        return Err(duplicate(alias.span, &alias.name));
                    }
                    self.aliases.insert(alias.name.clone(), alias.clone());
                }
                StmtKind::Enum(decl) => {
                    self.declare_enum(decl)?;
                }
                _ => {}
            }
        }
        for stmt in statements {
            if let StmtKind::Interface(decl) = self.unwrap_export(stmt) {
                self.declare_interface(decl)?;
            }
        }
        for stmt in statements {
            match self.unwrap_export(stmt) {
                StmtKind::Class(decl) => {
                    let provisional = solver::ClassType {
                        class_id: self.interner.fresh_class_id(),
                        name: decl.name.clone(),
                        superclass: None,
                        type_params: Vec::new(),
                        fields: Vec::new(),
                        methods: Vec::new(),
                        getters: Vec::new(),
                        setters: Vec::new(),
                        static_members: Vec::new(),
                        ctor: None,
                        abstract_methods: Vec::new(),
                        abstract_getters: Vec::new(),
                        abstract_setters: Vec::new(),
                        is_abstract: decl.is_abstract,
                    };
                    let id = self.interner.intern(TypeKey::Class(provisional));
                    self.register_type(&decl.name, id);
                    self.declare(&decl.name, id, BindingKind::Class)?;
                }
                StmtKind::Function(_) => {}
                _ => {}
            }
        }
        // Function overload clusters.
        self.hoist_functions(statements)?;
        Ok(())
    }

    fn unwrap_export<'a>(&self, stmt: &'a Stmt) -> &'a StmtKind {
        match &stmt.kind {
            StmtKind::Export(inner) => &inner.kind,
            other => other,
        }
    }

    /// Group consecutive same-name function statements into overload
    /// clusters and declare their merged signatures.
    pub fn hoist_functions(&mut self, statements: &[Stmt]) -> Result<(), Diagnostic> {
        let mut i = 0;
        while i < statements.len() {
            let StmtKind::Function(first) = self.unwrap_export(&statements[i]) else {
                i += 1;
                continue;
            };
            let mut cluster: Vec<&FunctionDecl> = vec![first];
            let mut j = i + 1;
            while j < statements.len() {
                match self.unwrap_export(&statements[j]) {
                    StmtKind::Function(next) if next.name == first.name => {
                        cluster.push(next);
                        j += 1;
                    }
                    _ => break,
                }
            }
            let signature = self.build_overload_cluster(&cluster)?;
            self.declare(&first.name, signature, BindingKind::Function)?;
            i = j;
        }
        Ok(())
    }

    fn build_overload_cluster(
        &mut self,
        cluster: &[&FunctionDecl],
    ) -> Result<TypeId, Diagnostic> {
        let mut signatures = Vec::new();
        for decl in cluster {
            let env = TypeParamEnv::default();
            let (infos, inner_env) = self.bind_type_params(&decl.type_params, &env)?;
            let signature = self.signature_from_parts(
                &decl.params,
                decl.return_type.as_ref(),
                &infos,
                &inner_env,
                decl.is_async,
                decl.is_generator,
            )?;
            signatures.push((decl.body.is_some(), signature));
        }
        // Overload signatures (without bodies) form the public set; the
        // implementation signature participates only when alone.
        let declared: Vec<TypeId> = signatures
            .iter()
            .filter(|(has_body, _)| !has_body)
            .map(|(_, s)| *s)
            .collect();
        Ok(if declared.is_empty() {
            signatures
                .last()
                .map(|(_, s)| *s)
                .expect("cluster is non-empty")
        } else if declared.len() == 1 {
            declared[0]
        } else {
            self.interner.intern(TypeKey::Overloaded(declared))
        })
    }

    fn declare_interface(&mut self, decl: &InterfaceDecl) -> Result<(), Diagnostic> {
        let env = TypeParamEnv::default();
        let (infos, inner_env) = self.bind_type_params(&decl.type_params, &env)?;
        let record = self.record_from_members(&decl.members, &inner_env)?;
        let mut extends = Vec::new();
        for base in &decl.extends {
            extends.push(self.type_from_ann(base, &inner_env)?);
        }
        let members: Vec<(String, solver::PropInfo)> = record.fields;
        let interface = solver::InterfaceType {
            name: decl.name.clone(),
            type_params: infos,
            members,
            extends,
            indexes: record.indexes,
        };
        let id = self.interner.intern(TypeKey::Interface(interface));
        self.register_type(&decl.name, id);
        Ok(())
    }

    // =========================================================================
    // Statements
    // =========================================================================

    pub fn check_statements(&mut self, statements: &[Stmt]) -> Result<(), Diagnostic> {
        self.hoist_functions(statements)?;
        for stmt in statements {
            self.check_statement(stmt)?;
        }
        Ok(())
    }

    pub fn check_statement(&mut self, stmt: &Stmt) -> Result<(), Diagnostic> {
        match &stmt.kind {
            StmtKind::VarDecl { kind, declarations } => {
                self.check_var_decl(*kind, declarations)
            }
            StmtKind::Function(decl) => self.check_function_decl(decl),
            StmtKind::Class(decl) => {
                let class_ty = self.check_class_decl(decl)?;
                self.declare(&decl.name, class_ty, BindingKind::Class)?;
                Ok(())
            }
            StmtKind::Interface(decl) => {
                // Local interfaces are registered on first encounter.
                if !self.type_bindings.contains_key(&decl.name) {
                    self.declare_interface(decl)?;
                }
                Ok(())
            }
            StmtKind::TypeAlias(alias) => {
                self.aliases.entry(alias.name.clone()).or_insert_with(|| alias.clone());
                Ok(())
            }
            StmtKind::Enum(decl) => {
                if !self.enums.contains_key(&decl.name) {
                    self.declare_enum(decl)?;
                }
                Ok(())
            }
            StmtKind::Namespace(decl) => self.check_namespace(decl),
            StmtKind::Import(decl) => {
                // Module resolution is outside the core; imported names
                // bind as `any`.
                if let Some(default) = &decl.default {
                    self.declare(default, TypeId::ANY, BindingKind::Import)?;
                }
                if let Some(namespace) = &decl.namespace {
                    self.declare(namespace, TypeId::ANY, BindingKind::Import)?;
                }
                for (imported, local) in &decl.named {
                    let name = local.as_ref().unwrap_or(imported);
                    self.declare(name, TypeId::ANY, BindingKind::Import)?;
                }
                Ok(())
            }
            StmtKind::Export(inner) => self.check_statement(inner),
            StmtKind::ExportNamed { names, source } => {
                if source.is_none() {
                    for (name, _) in names {
                        if self.lookup(name).is_none() && !self.type_bindings.contains_key(name)
                        {
                            return Err(Diagnostic::type_error(
                                stmt.span,
                                format!("Cannot find name '{name}'."),
                                diagnostic_codes::CANNOT_FIND_NAME,
                            ));
                        }
                    }
                }
                Ok(())
            }
            StmtKind::Block(statements) => {
                self.push_scope();
                let result = self.check_statements(statements);
                self.pop_scope();
                result
            }
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.check_expr(cond)?;
                let (then_set, else_set) = self.narrowings_from_condition(cond);

                self.push_scope();
                for (path, ty) in &then_set {
                    self.apply_narrowing(path.clone(), *ty);
                }
                let then_result = self.check_statement(then_branch);
                self.pop_scope();
                then_result?;

                if let Some(else_branch) = else_branch {
                    self.push_scope();
                    for (path, ty) in &else_set {
                        self.apply_narrowing(path.clone(), *ty);
                    }
                    let else_result = self.check_statement(else_branch);
                    self.pop_scope();
                    else_result?;
                }

                // When the taken branch cannot fall through, the
                // opposite narrowings hold afterwards.
                if terminates(then_branch) {
                    for (path, ty) in else_set {
                        self.apply_narrowing(path, ty);
                    }
                } else if else_branch.as_deref().is_some_and(terminates) {
                    for (path, ty) in then_set {
                        self.apply_narrowing(path, ty);
                    }
                }
                Ok(())
            }
            StmtKind::While { cond, body } => {
                self.check_expr(cond)?;
                let (then_set, _) = self.narrowings_from_condition(cond);
                self.push_scope();
                for (path, ty) in then_set {
                    self.apply_narrowing(path, ty);
                }
                let result = self.check_statement(body);
                self.pop_scope();
                result
            }
            StmtKind::DoWhile { body, cond } => {
                self.push_scope();
                let result = self.check_statement(body);
                self.pop_scope();
                result?;
                self.check_expr(cond)?;
                Ok(())
            }
            StmtKind::ForIn {
                decl_kind,
                binding,
                object,
                body,
            } => {
                let object_ty = self.check_expr(object)?;
                let object_ty = evaluate_type(&self.interner, object_ty);
                if matches!(
                    self.interner.lookup(object_ty),
                    TypeKey::Number | TypeKey::String | TypeKey::Boolean
                ) {
                    return Err(Diagnostic::type_error(
                        object.span,
                        "The right-hand side of 'for...in' must be an object.",
                        diagnostic_codes::TYPE_NOT_ASSIGNABLE,
                    ));
                }
                self.push_scope();
                if decl_kind.is_some() {
                    self.declare(binding, TypeId::STRING, BindingKind::Let)?;
                }
                let result = self.check_statement(body);
                self.pop_scope();
                result
            }
            StmtKind::ForOf {
                decl_kind,
                binding,
                iterable,
                body,
                is_await,
            } => {
                let iterable_ty = self.check_expr(iterable)?;
                let element =
                    self.element_type_of_iterable(iterable_ty, iterable.span, *is_await)?;
                self.push_scope();
                if decl_kind.is_some() {
                    self.declare(binding, element, BindingKind::Let)?;
                } else if self.lookup(binding).is_none() {
                    return Err(Diagnostic::type_error(
                        stmt.span,
                        format!("Cannot find name '{binding}'."),
                        diagnostic_codes::CANNOT_FIND_NAME,
                    ));
                }
                let result = self.check_statement(body);
                self.pop_scope();
                result
            }
            StmtKind::Return(argument) => {
                let actual = match argument {
                    Some(expr) => self.check_expr(expr)?,
                    None => TypeId::UNDEFINED,
                };
                if let Some(function) = self.function_stack.last() {
                    if let Some(expected) = function.return_type {
                        if expected != TypeId::VOID
                            && !is_compatible(&self.interner, expected, actual)
                        {
                            let span = argument.as_ref().map(|a| a.span).unwrap_or(stmt.span);
                            return Err(self.assignability_error(span, expected, actual));
                        }
                    }
                }
                Ok(())
            }
            StmtKind::Break(_) | StmtKind::Continue(_) => Ok(()),
            StmtKind::Throw(value) => {
                self.check_expr(value)?;
                Ok(())
            }
            StmtKind::Try {
                block,
                catch,
                finally,
            } => {
                self.push_scope();
                let result = self.check_statements(block);
                self.pop_scope();
                result?;
                if let Some(catch) = catch {
                    self.push_scope();
                    if let Some(param) = &catch.param {
                        let env = TypeParamEnv::default();
                        let ty = catch
                            .param_type
                            .as_ref()
                            .map(|a| self.type_from_ann(a, &env))
                            .transpose()?
                            .unwrap_or(TypeId::ANY);
                        self.declare(param, ty, BindingKind::Let)?;
                    }
                    let result = self.check_statements(&catch.body);
                    self.pop_scope();
                    result?;
                }
                if let Some(finally) = finally {
                    self.push_scope();
                    let result = self.check_statements(finally);
                    self.pop_scope();
                    result?;
                }
                Ok(())
            }
            StmtKind::Switch {
                discriminant,
                cases,
            } => {
                let discriminant_ty = self.check_expr(discriminant)?;
                for case in cases {
                    if let Some(test) = &case.test {
                        let test_ty = self.check_expr(test)?;
                        let comparable = is_compatible(&self.interner, discriminant_ty, test_ty)
                            || is_compatible(&self.interner, test_ty, discriminant_ty);
                        if !comparable {
                            return Err(Diagnostic::type_error(
                                test.span,
                                format!(
                                    "Comparison of '{}' and '{}' has no overlap.",
                                    type_to_string(&self.interner, discriminant_ty),
                                    type_to_string(&self.interner, test_ty)
                                ),
                                diagnostic_codes::TYPE_NOT_ASSIGNABLE,
                            ));
                        }
                    }
                    self.push_scope();
                    let result = self.check_statements(&case.body);
                    self.pop_scope();
                    result?;
                }
                Ok(())
            }
            StmtKind::Labeled { body, .. } => self.check_statement(body),
            StmtKind::Expr(expr) => {
                self.check_expr(expr)?;
                // An asserts-predicate call narrows the remainder of the
                // enclosing region.
                if let ExprKind::Call { callee, args, .. } = &expr.kind {
                    self.apply_assertion_call(callee, args);
                }
                Ok(())
            }
            StmtKind::Directive(_) | StmtKind::Empty => Ok(()),
        }
    }

    fn apply_assertion_call(&mut self, callee: &Expr, args: &[Expr]) {
        let Some(callee_ty) = self.effective_type_of_path(callee) else {
            return;
        };
        let TypeKey::Function(function) = self.interner.lookup(callee_ty) else {
            return;
        };
        let Some(predicate) = &function.predicate else {
            return;
        };
        if !predicate.asserts {
            return;
        }
        let position = function
            .params
            .iter()
            .position(|p| p.name == predicate.param);
        let Some(arg) = position.and_then(|i| args.get(i)) else {
            return;
        };
        let Some(path) = self.path_key(arg) else {
            return;
        };
        match predicate.ty {
            Some(narrowed) => self.apply_narrowing(path, narrowed),
            None => {
                // `asserts x`: x is truthy afterwards.
                if let Some(declared) = self.effective_type_of_path(arg) {
                    let narrowed =
                        self.remove_from_union(declared, &[TypeId::NULL, TypeId::UNDEFINED]);
                    self.apply_narrowing(path, narrowed);
                }
            }
        }
    }

    // =========================================================================
    // Declarations
    // =========================================================================

    fn check_var_decl(
        &mut self,
        kind: VarKind,
        declarations: &[VarDeclarator],
    ) -> Result<(), Diagnostic> {
        for declarator in declarations {
            if kind != VarKind::Var && self.is_declared_in_current_scope(&declarator.name) {
                return Err(duplicate(declarator.span, &declarator.name));
            }
            let env = TypeParamEnv::default();
            let declared = declarator
                .type_ann
                .as_ref()
                .map(|a| self.type_from_ann(a, &env))
                .transpose()?;
            let init_ty = declarator
                .init
                .as_ref()
                .map(|e| self.check_expr(e))
                .transpose()?;

            let binding_ty = match (declared, init_ty) {
                (Some(declared), Some(init_ty)) => {
                    if !is_compatible(&self.interner, declared, init_ty) {
                        let span = declarator.init.as_ref().map(|e| e.span).unwrap_or(declarator.span);
                        return Err(self.assignability_error(span, declared, init_ty));
                    }
                    declared
                }
                (Some(declared), None) => declared,
                (None, Some(init_ty)) => {
                    if kind == VarKind::Const {
                        init_ty
                    } else {
                        self.widen_literal(init_ty)
                    }
                }
                (None, None) => TypeId::ANY,
            };
            let binding_kind = match kind {
                VarKind::Var => BindingKind::Var,
                VarKind::Let => BindingKind::Let,
                VarKind::Const => BindingKind::Const,
            };
            self.declare(&declarator.name, binding_ty, binding_kind)?;
        }
        Ok(())
    }

    fn check_function_decl(&mut self, decl: &FunctionDecl) -> Result<(), Diagnostic> {
        // The binding was declared during hoisting (or is declared now
        // for nested scopes).
        if self.lookup(&decl.name).is_none() {
            let env = TypeParamEnv::default();
            let (infos, inner_env) = self.bind_type_params(&decl.type_params, &env)?;
            let signature = self.signature_from_parts(
                &decl.params,
                decl.return_type.as_ref(),
                &infos,
                &inner_env,
                decl.is_async,
                decl.is_generator,
            )?;
            self.declare(&decl.name, signature, BindingKind::Function)?;
        }
        if decl.body.is_some() {
            self.check_function_like(
                &decl.type_params,
                &decl.params,
                decl.return_type.as_ref(),
                FunctionBody::Block(decl.body.as_deref()),
                decl.is_async,
                decl.is_generator,
            )?;
        }
        Ok(())
    }

    fn check_namespace(&mut self, decl: &NamespaceDecl) -> Result<(), Diagnostic> {
        let saved_prefix = self.namespace_prefix.clone();
        self.namespace_prefix = format!("{}{}.", saved_prefix, decl.name);
        self.push_scope();
        let hoisted = self.hoist_declarations(&decl.body);
        let body = hoisted.and_then(|()| {
            for stmt in &decl.body {
                self.check_statement(stmt)?;
            }
            Ok(())
        });
        // Exported value members become a record bound to the namespace
        // name in the enclosing scope.
        let mut fields: Vec<(String, solver::PropInfo)> = Vec::new();
        if let Some(scope) = self.scopes.last() {
            for (name, binding) in &scope.bindings {
                fields.push((
                    name.clone(),
                    solver::PropInfo {
                        ty: binding.ty,
                        optional: false,
                        readonly: false,
                    },
                ));
            }
        }
        fields.sort_by(|(a, _), (b, _)| a.cmp(b));
        self.pop_scope();
        self.namespace_prefix = saved_prefix;
        body?;
        let record = self.interner.intern(TypeKey::Record(solver::RecordType {
            fields,
            indexes: solver::IndexSignatures::default(),
        }));
        self.declare(&decl.name, record, BindingKind::Namespace)?;
        Ok(())
    }

    // =========================================================================
    // Enums
    // =========================================================================

    pub fn declare_enum(&mut self, decl: &EnumDecl) -> Result<(), Diagnostic> {
        if self.enums.contains_key(&decl.name) {
            return Err(duplicate(decl.span, &decl.name));
        }
        let mut members: Vec<(String, solver::EnumMemberValue)> = Vec::new();
        let mut next_auto = 0.0f64;
        let mut saw_number = false;
        let mut saw_string = false;
        for member in &decl.members {
            let value = match &member.init {
                None => {
                    let value = next_auto;
                    next_auto += 1.0;
                    saw_number = true;
                    solver::EnumMemberValue::Num(solver::FloatBits::from_f64(value))
                }
                Some(init) => match self.const_fold_enum_init(init, &members) {
                    Some(ConstValue::Num(value)) => {
                        next_auto = value + 1.0;
                        saw_number = true;
                        solver::EnumMemberValue::Num(solver::FloatBits::from_f64(value))
                    }
                    Some(ConstValue::Str(text)) => {
                        saw_string = true;
                        solver::EnumMemberValue::Str(text)
                    }
                    None => {
                        if decl.is_const {
                            return Err(Diagnostic::compile_error(
                                init.span,
                                "const enum member initializers must be constant expressions.",
                                diagnostic_codes::CONST_ENUM_INITIALIZER,
                            ));
                        }
                        // A computed member evaluates at runtime; its
                        // static kind is numeric.
                        saw_number = true;
                        solver::EnumMemberValue::Num(solver::FloatBits::from_f64(f64::NAN))
                    }
                },
            };
            members.push((member.name.clone(), value));
        }
        let kind = match (saw_number, saw_string) {
            (true, true) => solver::EnumKind::Heterogeneous,
            (false, true) => solver::EnumKind::String,
            _ => solver::EnumKind::Numeric,
        };
        let enum_type = solver::EnumType {
            enum_id: self.interner.fresh_class_id(),
            name: decl.name.clone(),
            kind,
            members,
            is_const: decl.is_const,
        };
        let id = self.interner.intern(TypeKey::Enum(enum_type.clone()));
        self.enums.insert(decl.name.clone(), enum_type);
        self.register_type(&decl.name, id);
        self.declare(&decl.name, id, BindingKind::Enum)?;
        Ok(())
    }

    /// Constant-fold an enum member initializer: literals, references
    /// to earlier members, arithmetic/bitwise/shift operators, unary
    /// minus, and string concatenation.
    fn const_fold_enum_init(
        &self,
        expr: &Expr,
        members: &[(String, solver::EnumMemberValue)],
    ) -> Option<ConstValue> {
        match &expr.kind {
            ExprKind::Literal(Lit::Number(value)) => Some(ConstValue::Num(*value)),
            ExprKind::Literal(Lit::Str(text)) => Some(ConstValue::Str(text.clone())),
            ExprKind::Paren(inner) => self.const_fold_enum_init(inner, members),
            ExprKind::Ident(name) => {
                members.iter().find(|(n, _)| n == name).map(|(_, v)| match v {
                    solver::EnumMemberValue::Num(bits) => ConstValue::Num(bits.as_f64()),
                    solver::EnumMemberValue::Str(text) => ConstValue::Str(text.clone()),
                })
            }
            ExprKind::Unary {
                op: UnaryOp::Neg,
                operand,
            } => match self.const_fold_enum_init(operand, members)? {
                ConstValue::Num(value) => Some(ConstValue::Num(-value)),
                ConstValue::Str(_) => None,
            },
            ExprKind::Binary { op, left, right } => {
                let left = self.const_fold_enum_init(left, members)?;
                let right = self.const_fold_enum_init(right, members)?;
                match (left, right) {
                    (ConstValue::Num(a), ConstValue::Num(b)) => {
                        let value = match op {
                            BinaryOp::Add => a + b,
                            BinaryOp::Sub => a - b,
                            BinaryOp::Mul => a * b,
                            BinaryOp::Div => a / b,
                            BinaryOp::Rem => a % b,
                            BinaryOp::Exp => a.powf(b),
                            BinaryOp::Shl => f64::from((a as i32) << ((b as i64) & 31) as i32),
                            BinaryOp::Shr => f64::from((a as i32) >> ((b as i64) & 31) as i32),
                            BinaryOp::UShr => {
                                f64::from((a as i64 as u32) >> ((b as i64) & 31) as u32)
                            }
                            BinaryOp::BitAnd => f64::from((a as i32) & (b as i32)),
                            BinaryOp::BitOr => f64::from((a as i32) | (b as i32)),
                            BinaryOp::BitXor => f64::from((a as i32) ^ (b as i32)),
                            _ => return None,
                        };
                        Some(ConstValue::Num(value))
                    }
                    (ConstValue::Str(a), ConstValue::Str(b)) if *op == BinaryOp::Add => {
                        Some(ConstValue::Str(format!("{a}{b}")))
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }

    // =========================================================================
    // Iterables
    // =========================================================================

    /// The element type produced by iterating a value.
    pub fn element_type_of_iterable(
        &mut self,
        iterable: TypeId,
        span: Span,
        is_await: bool,
    ) -> Result<TypeId, Diagnostic> {
        let iterable = evaluate_type(&self.interner, iterable);
        let iterable = if is_await {
            self.awaited_type(iterable)
        } else {
            iterable
        };
        match self.interner.lookup(iterable) {
            TypeKey::Any | TypeKey::Error => Ok(TypeId::ANY),
            TypeKey::Array(element) => Ok(element),
            TypeKey::Tuple(tuple) => {
                let members: Vec<TypeId> = tuple.elements.iter().map(|e| e.type_id).collect();
                Ok(self.interner.union(members))
            }
            TypeKey::String | TypeKey::StringLiteral(_) => Ok(TypeId::STRING),
            TypeKey::InstantiatedGeneric { def, args } => {
                let name = match self.interner.lookup(def) {
                    TypeKey::Interface(interface) => interface.name,
                    _ => String::new(),
                };
                match name.as_str() {
                    "Generator" | "Iterable" | "IterableIterator" | "Iterator" => {
                        Ok(args.first().copied().unwrap_or(TypeId::ANY))
                    }
                    "AsyncGenerator" | "AsyncIterable" | "AsyncIterator" if is_await => {
                        Ok(args.first().copied().unwrap_or(TypeId::ANY))
                    }
                    _ => Err(self.not_iterable(iterable, span)),
                }
            }
            TypeKey::Union(members) => {
                let mut elements = Vec::new();
                for member in members {
                    elements.push(self.element_type_of_iterable(member, span, is_await)?);
                }
                Ok(self.interner.union(elements))
            }
            _ => Err(self.not_iterable(iterable, span)),
        }
    }

    fn not_iterable(&self, ty: TypeId, span: Span) -> Diagnostic {
        Diagnostic::type_error(
            span,
            format!(
                "Type '{}' is not iterable.",
                type_to_string(&self.interner, ty)
            ),
            diagnostic_codes::NOT_ITERABLE,
        )
    }
}

/// Whether a statement can never complete normally (conservative).
fn terminates(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::Return(_) | StmtKind::Throw(_) | StmtKind::Break(_) | StmtKind::Continue(_) => {
            true
        }
        StmtKind::Block(statements) => statements.iter().any(terminates),
        _ => false,
    }
}

#[derive(Debug, Clone)]
enum ConstValue {
    Num(f64),
    Str(String),
}

fn duplicate(span: Span, name: &str) -> Diagnostic {
    Diagnostic::type_error(
        span,
        format!("Duplicate identifier '{name}'."),
        diagnostic_codes::DUPLICATE_DECLARATION,
    )
}
