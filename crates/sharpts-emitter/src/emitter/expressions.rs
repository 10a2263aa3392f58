//! Expression lowering.
//!
//! The side table from the checker drives representation choices:
//! expressions the checker proved numeric flow through unboxed doubles,
//! everything else is boxed and goes through the runtime shim's dynamic
//! dispatch helpers.

use rustc_hash::FxHashSet;
use sharpts_common::diagnostics::Diagnostic;
use sharpts_parser::ast::*;
use sharpts_solver::types::{EnumMemberValue, TypeId, TypeKey};

use super::{Emitter, FnCtx, Storage};
use crate::MethodBuilder;
use crate::il::*;

impl Emitter<'_> {
    /// Whether the checker proved this expression numeric (the unboxed
    /// fast path is sound).
    fn is_static_number(&self, expr: &Expr) -> bool {
        match self.check.expr_types.get(&expr.id) {
            Some(&ty) => {
                ty == TypeId::NUMBER
                    || matches!(
                        self.check.interner.lookup(ty),
                        TypeKey::NumberLiteral(_)
                    )
            }
            None => false,
        }
    }

    fn is_static_string(&self, expr: &Expr) -> bool {
        match self.check.expr_types.get(&expr.id) {
            Some(&ty) => {
                ty == TypeId::STRING
                    || matches!(
                        self.check.interner.lookup(ty),
                        TypeKey::StringLiteral(_)
                    )
            }
            None => false,
        }
    }

    pub fn emit_expr(&mut self, ctx: &mut FnCtx, expr: &Expr) -> Result<(), Diagnostic> {
        match &expr.kind {
            ExprKind::Literal(lit) => {
                self.emit_literal(ctx, lit);
                Ok(())
            }
            ExprKind::Ident(name) => self.emit_ident(ctx, name, expr),
            ExprKind::This => {
                if ctx.this_class.is_some() || ctx.machine_class.is_some() {
                    ctx.builder.ld_arg(0);
                } else {
                    ctx.builder.ldc_undefined();
                }
                Ok(())
            }
            ExprKind::Super => {
                ctx.builder.ld_arg(0);
                Ok(())
            }
            ExprKind::Paren(inner)
            | ExprKind::NonNull(inner)
            | ExprKind::TypeAssertion { expr: inner, .. } => self.emit_expr(ctx, inner),
            ExprKind::Binary { op, left, right } => self.emit_binary(ctx, *op, left, right),
            ExprKind::Logical { op, left, right } => self.emit_logical(ctx, *op, left, right),
            ExprKind::Unary { op, operand } => self.emit_unary(ctx, *op, operand),
            ExprKind::Update {
                op,
                prefix,
                operand,
            } => self.emit_update(ctx, *op, *prefix, operand),
            ExprKind::Assign { op, target, value } => self.emit_assign(ctx, *op, target, value),
            ExprKind::Conditional {
                cond,
                consequent,
                alternate,
            } => {
                let else_label = ctx.builder.reserve_label();
                let end_label = ctx.builder.reserve_label();
                let result = ctx.scratch_slot();
                self.emit_expr(ctx, cond)?;
                ctx.builder.br_false(else_label);
                self.emit_expr(ctx, consequent)?;
                ctx.builder.ensure_boxed();
                ctx.builder.st_loc(result);
                ctx.builder.br(end_label);
                ctx.builder.mark_label(else_label);
                self.emit_expr(ctx, alternate)?;
                ctx.builder.ensure_boxed();
                ctx.builder.st_loc(result);
                ctx.builder.mark_label(end_label);
                ctx.builder.ld_loc(result);
                Ok(())
            }
            ExprKind::Sequence(parts) => {
                for (i, part) in parts.iter().enumerate() {
                    self.emit_expr(ctx, part)?;
                    if i + 1 < parts.len() {
                        ctx.builder.pop();
                    }
                }
                Ok(())
            }
            ExprKind::Member {
                object, property, ..
            } => self.emit_member_read(ctx, expr, object, property),
            ExprKind::Index { object, index, .. } => {
                self.use_shim("GetIndex");
                self.emit_expr(ctx, object)?;
                ctx.builder.ensure_boxed();
                self.emit_expr(ctx, index)?;
                ctx.builder.ensure_boxed();
                ctx.builder
                    .call("Runtime", "GetIndex", 2, Some(StackType::Ref));
                Ok(())
            }
            ExprKind::Call { .. } => self.emit_call(ctx, expr),
            ExprKind::New { callee, args, .. } => self.emit_new(ctx, expr, callee, args),
            ExprKind::Array(elements) => {
                ctx.builder
                    .call_intrinsic(Intrinsic::ArrayNew, 0, Some(StackType::Ref));
                for element in elements {
                    ctx.builder.dup();
                    if let ExprKind::Spread(inner) = &element.kind {
                        self.use_shim("SpreadInto");
                        self.emit_expr(ctx, inner)?;
                        ctx.builder.ensure_boxed();
                        ctx.builder.call("Runtime", "SpreadInto", 2, None);
                    } else {
                        self.emit_expr(ctx, element)?;
                        ctx.builder.ensure_boxed();
                        ctx.builder.call_intrinsic(Intrinsic::ArrayPush, 2, None);
                    }
                }
                Ok(())
            }
            ExprKind::Object(props) => self.emit_object_literal(ctx, props),
            ExprKind::Template { quasis, exprs } => {
                ctx.builder.ldc_str(&quasis[0]);
                for (i, part) in exprs.iter().enumerate() {
                    self.emit_expr(ctx, part)?;
                    ctx.builder.emit(Instr::ConvStr, 1, Some(StackType::Str));
                    ctx.builder
                        .call_intrinsic(Intrinsic::StringConcat, 2, Some(StackType::Str));
                    ctx.builder.ldc_str(&quasis[i + 1]);
                    ctx.builder
                        .call_intrinsic(Intrinsic::StringConcat, 2, Some(StackType::Str));
                }
                Ok(())
            }
            ExprKind::Arrow {
                params,
                body,
                is_async,
                ..
            } => {
                let body_stmts: Vec<Stmt> = match body {
                    ArrowBody::Block(stmts) => stmts.clone(),
                    ArrowBody::Expr(inner) => vec![Stmt {
                        span: inner.span,
                        kind: StmtKind::Return(Some(inner.as_ref().clone())),
                    }],
                };
                self.emit_closure(ctx, "arrow", params, &body_stmts, *is_async, false, expr)
            }
            ExprKind::FunctionExpr { name, parts } => {
                let hint = name.clone().unwrap_or_else(|| "anonymous".to_string());
                let body = parts.body.clone().unwrap_or_default();
                self.emit_closure(
                    ctx,
                    &hint,
                    &parts.params,
                    &body,
                    parts.is_async,
                    parts.is_generator,
                    expr,
                )
            }
            ExprKind::ClassExpr(_) => Err(self.invariant(
                expr.span,
                "class expressions are not supported by this backend",
            )),
            ExprKind::Spread(inner) => self.emit_expr(ctx, inner),
            ExprKind::Await(operand) => {
                // Only reachable at top level; coroutine bodies lower
                // awaits into machine transitions.
                self.use_shim("BlockOn");
                self.emit_expr(ctx, operand)?;
                ctx.builder.ensure_boxed();
                ctx.builder
                    .call("Runtime", "BlockOn", 1, Some(StackType::Ref));
                Ok(())
            }
            ExprKind::Yield { .. } => Err(self.invariant(
                expr.span,
                "yield escaped coroutine lowering",
            )),
        }
    }

    fn emit_literal(&mut self, ctx: &mut FnCtx, lit: &Lit) {
        match lit {
            Lit::Number(value) => ctx.builder.ldc_f64(*value),
            Lit::Str(text) => ctx.builder.ldc_str(text),
            Lit::Bool(value) => ctx.builder.ldc_bool(*value),
            Lit::Null => ctx.builder.ldc_null(),
            Lit::Undefined => ctx.builder.ldc_undefined(),
            Lit::BigInt(value) => {
                ctx.builder
                    .emit(Instr::LdcBigInt(value.to_string()), 0, Some(StackType::Ref));
            }
            Lit::Regex { pattern, .. } => {
                // Regex values surface as their source string to the
                // host regex facility.
                ctx.builder.ldc_str(pattern);
                ctx.builder.ensure_boxed();
            }
        }
    }

    fn emit_ident(&mut self, ctx: &mut FnCtx, name: &str, expr: &Expr) -> Result<(), Diagnostic> {
        if let Some(storage) = ctx.lookup(name) {
            self.emit_load(ctx, &storage);
            return Ok(());
        }
        if let Some(storage) = self.global_scope.get(name).cloned() {
            self.emit_load(ctx, &storage);
            return Ok(());
        }
        let _ = expr;
        // Built-in globals resolve through the shim.
        self.use_shim("GetBuiltin");
        ctx.builder.ldc_str(name);
        ctx.builder.ensure_boxed();
        ctx.builder
            .call("Runtime", "GetBuiltin", 1, Some(StackType::Ref));
        Ok(())
    }

    // =========================================================================
    // Operators
    // =========================================================================

    fn emit_binary(
        &mut self,
        ctx: &mut FnCtx,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
    ) -> Result<(), Diagnostic> {
        use BinaryOp::*;
        let both_numeric = self.is_static_number(left) && self.is_static_number(right);
        match op {
            Add => {
                if both_numeric {
                    self.emit_expr(ctx, left)?;
                    ctx.builder.ensure_double();
                    self.emit_expr(ctx, right)?;
                    ctx.builder.ensure_double();
                    ctx.builder.emit(Instr::Add, 2, Some(StackType::Double));
                } else if self.is_static_string(left) || self.is_static_string(right) {
                    self.emit_expr(ctx, left)?;
                    ctx.builder.emit(Instr::ConvStr, 1, Some(StackType::Str));
                    self.emit_expr(ctx, right)?;
                    ctx.builder.emit(Instr::ConvStr, 1, Some(StackType::Str));
                    ctx.builder
                        .call_intrinsic(Intrinsic::StringConcat, 2, Some(StackType::Str));
                } else {
                    // Union-typed or dynamic operands box and take the
                    // runtime dispatch path.
                    self.use_shim("Add");
                    self.emit_expr(ctx, left)?;
                    ctx.builder.ensure_boxed();
                    self.emit_expr(ctx, right)?;
                    ctx.builder.ensure_boxed();
                    ctx.builder.call("Runtime", "Add", 2, Some(StackType::Ref));
                }
            }
            Sub | Mul | Div | Rem | Exp => {
                self.emit_expr(ctx, left)?;
                ctx.builder.ensure_double();
                self.emit_expr(ctx, right)?;
                ctx.builder.ensure_double();
                let instr = match op {
                    Sub => Instr::Sub,
                    Mul => Instr::Mul,
                    Div => Instr::Div,
                    Rem => Instr::Rem,
                    _ => {
                        // Exponentiation goes through the numeric helper.
                        self.use_shim("Pow");
                        ctx.builder
                            .call("Runtime", "Pow", 2, Some(StackType::Double));
                        return Ok(());
                    }
                };
                ctx.builder.emit(instr, 2, Some(StackType::Double));
            }
            Shl | Shr | UShr | BitAnd | BitOr | BitXor => {
                self.emit_expr(ctx, left)?;
                ctx.builder.ensure_double();
                self.emit_expr(ctx, right)?;
                ctx.builder.ensure_double();
                let instr = match op {
                    Shl => Instr::Shl,
                    Shr => Instr::Shr,
                    UShr => Instr::UShr,
                    BitAnd => Instr::BitAnd,
                    BitOr => Instr::BitOr,
                    _ => Instr::BitXor,
                };
                ctx.builder.emit(instr, 2, Some(StackType::Double));
            }
            Lt | LtEq | Gt | GtEq => {
                if self.is_static_string(left) && self.is_static_string(right) {
                    self.use_shim("Compare");
                    self.emit_expr(ctx, left)?;
                    ctx.builder.ensure_boxed();
                    self.emit_expr(ctx, right)?;
                    ctx.builder.ensure_boxed();
                    ctx.builder
                        .call("Runtime", "Compare", 2, Some(StackType::Double));
                    ctx.builder.ldc_f64(0.0);
                } else {
                    self.emit_expr(ctx, left)?;
                    ctx.builder.ensure_double();
                    self.emit_expr(ctx, right)?;
                    ctx.builder.ensure_double();
                }
                let instr = match op {
                    Lt => Instr::CmpLt,
                    LtEq => Instr::CmpLe,
                    Gt => Instr::CmpGt,
                    _ => Instr::CmpGe,
                };
                ctx.builder.emit(instr, 2, Some(StackType::Bool));
            }
            Eq | Neq | StrictEq | StrictNeq => {
                let helper = if matches!(op, Eq | Neq) {
                    "LooseEquals"
                } else {
                    "StrictEquals"
                };
                self.use_shim(helper);
                self.emit_expr(ctx, left)?;
                ctx.builder.ensure_boxed();
                self.emit_expr(ctx, right)?;
                ctx.builder.ensure_boxed();
                ctx.builder
                    .call("Runtime", helper, 2, Some(StackType::Bool));
                if matches!(op, Neq | StrictNeq) {
                    ctx.builder.ldc_bool(false);
                    ctx.builder.emit(Instr::CmpEq, 2, Some(StackType::Bool));
                }
            }
            Instanceof => {
                self.use_shim("InstanceOf");
                self.emit_expr(ctx, left)?;
                ctx.builder.ensure_boxed();
                self.emit_expr(ctx, right)?;
                ctx.builder.ensure_boxed();
                ctx.builder
                    .call("Runtime", "InstanceOf", 2, Some(StackType::Bool));
            }
            In => {
                self.use_shim("HasProperty");
                self.emit_expr(ctx, left)?;
                ctx.builder.ensure_boxed();
                self.emit_expr(ctx, right)?;
                ctx.builder.ensure_boxed();
                ctx.builder
                    .call("Runtime", "HasProperty", 2, Some(StackType::Bool));
            }
        }
        Ok(())
    }

    fn emit_logical(
        &mut self,
        ctx: &mut FnCtx,
        op: LogicalOp,
        left: &Expr,
        right: &Expr,
    ) -> Result<(), Diagnostic> {
        let end = ctx.builder.reserve_label();
        let result = ctx.scratch_slot();
        self.emit_expr(ctx, left)?;
        ctx.builder.ensure_boxed();
        ctx.builder.st_loc(result);
        ctx.builder.ld_loc(result);
        match op {
            LogicalOp::And => {
                ctx.builder.br_false(end);
            }
            LogicalOp::Or => {
                ctx.builder.br_true(end);
            }
            LogicalOp::Nullish => {
                self.use_shim("IsNullish");
                ctx.builder
                    .call("Runtime", "IsNullish", 1, Some(StackType::Bool));
                ctx.builder.br_false(end);
            }
        }
        self.emit_expr(ctx, right)?;
        ctx.builder.ensure_boxed();
        ctx.builder.st_loc(result);
        ctx.builder.mark_label(end);
        ctx.builder.ld_loc(result);
        Ok(())
    }

    fn emit_unary(
        &mut self,
        ctx: &mut FnCtx,
        op: UnaryOp,
        operand: &Expr,
    ) -> Result<(), Diagnostic> {
        match op {
            UnaryOp::Neg => {
                self.emit_expr(ctx, operand)?;
                ctx.builder.ensure_double();
                ctx.builder.emit(Instr::Neg, 1, Some(StackType::Double));
            }
            UnaryOp::Plus => {
                self.emit_expr(ctx, operand)?;
                ctx.builder.ensure_double();
            }
            UnaryOp::Not => {
                self.emit_expr(ctx, operand)?;
                ctx.builder.ensure_bool();
                ctx.builder.ldc_bool(false);
                ctx.builder.emit(Instr::CmpEq, 2, Some(StackType::Bool));
            }
            UnaryOp::BitNot => {
                self.emit_expr(ctx, operand)?;
                ctx.builder.ensure_double();
                ctx.builder.emit(Instr::BitNot, 1, Some(StackType::Double));
            }
            UnaryOp::Typeof => {
                self.use_shim("TypeOf");
                self.emit_expr(ctx, operand)?;
                ctx.builder.ensure_boxed();
                ctx.builder
                    .call("Runtime", "TypeOf", 1, Some(StackType::Str));
            }
            UnaryOp::Void => {
                self.emit_expr(ctx, operand)?;
                ctx.builder.pop();
                ctx.builder.ldc_undefined();
            }
            UnaryOp::Delete => {
                self.use_shim("DeleteProperty");
                match &operand.kind {
                    ExprKind::Member {
                        object, property, ..
                    } => {
                        self.emit_expr(ctx, object)?;
                        ctx.builder.ensure_boxed();
                        ctx.builder.ldc_str(property);
                        ctx.builder.ensure_boxed();
                    }
                    ExprKind::Index { object, index, .. } => {
                        self.emit_expr(ctx, object)?;
                        ctx.builder.ensure_boxed();
                        self.emit_expr(ctx, index)?;
                        ctx.builder.ensure_boxed();
                    }
                    _ => {
                        ctx.builder.ldc_bool(true);
                        return Ok(());
                    }
                }
                ctx.builder
                    .call("Runtime", "DeleteProperty", 2, Some(StackType::Bool));
            }
        }
        Ok(())
    }

    fn emit_update(
        &mut self,
        ctx: &mut FnCtx,
        op: UpdateOp,
        prefix: bool,
        operand: &Expr,
    ) -> Result<(), Diagnostic> {
        // old value
        self.emit_expr(ctx, operand)?;
        ctx.builder.ensure_double();
        if !prefix {
            ctx.builder.dup();
        }
        ctx.builder.ldc_f64(1.0);
        let instr = match op {
            UpdateOp::Inc => Instr::Add,
            UpdateOp::Dec => Instr::Sub,
        };
        ctx.builder.emit(instr, 2, Some(StackType::Double));
        if prefix {
            ctx.builder.dup();
        }
        // Store the new value back; for postfix the old value stays
        // beneath on the stack.
        self.emit_write_back(ctx, operand)?;
        Ok(())
    }

    fn emit_assign(
        &mut self,
        ctx: &mut FnCtx,
        op: AssignOp,
        target: &Expr,
        value: &Expr,
    ) -> Result<(), Diagnostic> {
        if op == AssignOp::Assign {
            self.emit_expr(ctx, value)?;
            ctx.builder.ensure_boxed();
            ctx.builder.dup();
            self.emit_write_back(ctx, target)?;
            return Ok(());
        }
        // Compound: read, combine, write.
        let binary = match op {
            AssignOp::Add => Some(BinaryOp::Add),
            AssignOp::Sub => Some(BinaryOp::Sub),
            AssignOp::Mul => Some(BinaryOp::Mul),
            AssignOp::Div => Some(BinaryOp::Div),
            AssignOp::Rem => Some(BinaryOp::Rem),
            AssignOp::Exp => Some(BinaryOp::Exp),
            AssignOp::Shl => Some(BinaryOp::Shl),
            AssignOp::Shr => Some(BinaryOp::Shr),
            AssignOp::UShr => Some(BinaryOp::UShr),
            AssignOp::BitAnd => Some(BinaryOp::BitAnd),
            AssignOp::BitOr => Some(BinaryOp::BitOr),
            AssignOp::BitXor => Some(BinaryOp::BitXor),
            _ => None,
        };
        match binary {
            Some(binary) => {
                self.emit_binary(ctx, binary, target, value)?;
                ctx.builder.ensure_boxed();
                ctx.builder.dup();
                self.emit_write_back(ctx, target)?;
            }
            None => {
                // Logical assignment: evaluate conditionally.
                let logical = match op {
                    AssignOp::And => LogicalOp::And,
                    AssignOp::Or => LogicalOp::Or,
                    _ => LogicalOp::Nullish,
                };
                self.emit_logical(ctx, logical, target, value)?;
                ctx.builder.ensure_boxed();
                ctx.builder.dup();
                self.emit_write_back(ctx, target)?;
            }
        }
        Ok(())
    }

    /// Store the top of stack into a target expression.
    fn emit_write_back(&mut self, ctx: &mut FnCtx, target: &Expr) -> Result<(), Diagnostic> {
        match &target.kind {
            ExprKind::Ident(name) => {
                let storage = ctx
                    .lookup(name)
                    .or_else(|| self.global_scope.get(name).cloned())
                    .ok_or_else(|| {
                        self.invariant(target.span, format!("unresolved assignment target '{name}'"))
                    })?;
                self.emit_store(ctx, &storage);
                Ok(())
            }
            ExprKind::Member {
                object, property, ..
            } => {
                self.use_shim("SetPropertyStrict");
                ctx.builder.ensure_boxed();
                let scratch = ctx.scratch_slot();
                ctx.builder.st_loc(scratch);
                self.emit_expr(ctx, object)?;
                ctx.builder.ensure_boxed();
                ctx.builder.ldc_str(property);
                ctx.builder.ensure_boxed();
                ctx.builder.ld_loc(scratch);
                ctx.builder.call("Runtime", "SetPropertyStrict", 3, None);
                Ok(())
            }
            ExprKind::Index { object, index, .. } => {
                self.use_shim("SetIndexStrict");
                ctx.builder.ensure_boxed();
                let scratch = ctx.scratch_slot();
                ctx.builder.st_loc(scratch);
                self.emit_expr(ctx, object)?;
                ctx.builder.ensure_boxed();
                self.emit_expr(ctx, index)?;
                ctx.builder.ensure_boxed();
                ctx.builder.ld_loc(scratch);
                ctx.builder.call("Runtime", "SetIndexStrict", 3, None);
                Ok(())
            }
            ExprKind::Paren(inner) | ExprKind::NonNull(inner) => {
                self.emit_write_back(ctx, inner)
            }
            _ => Err(self.invariant(target.span, "invalid assignment target")),
        }
    }

    // =========================================================================
    // Member access
    // =========================================================================

    fn emit_member_read(
        &mut self,
        ctx: &mut FnCtx,
        expr: &Expr,
        object: &Expr,
        property: &str,
    ) -> Result<(), Diagnostic> {
        // Const-enum member accesses inline to their constant values.
        if let ExprKind::Ident(name) = &object.kind {
            if let Some(value) = self.const_enum_value(name, property) {
                match value {
                    EnumMemberValue::Num(bits) => ctx.builder.ldc_f64(bits.as_f64()),
                    EnumMemberValue::Str(text) => ctx.builder.ldc_str(&text),
                }
                return Ok(());
            }
        }
        let _ = expr;
        self.use_shim("GetProperty");
        self.emit_expr(ctx, object)?;
        ctx.builder.ensure_boxed();
        ctx.builder.ldc_str(property);
        ctx.builder.ensure_boxed();
        ctx.builder
            .call("Runtime", "GetProperty", 2, Some(StackType::Ref));
        Ok(())
    }

    // =========================================================================
    // Calls
    // =========================================================================

    fn emit_args_array(&mut self, ctx: &mut FnCtx, args: &[Expr]) -> Result<(), Diagnostic> {
        ctx.builder
            .call_intrinsic(Intrinsic::ArrayNew, 0, Some(StackType::Ref));
        for arg in args {
            ctx.builder.dup();
            if let ExprKind::Spread(inner) = &arg.kind {
                self.use_shim("SpreadInto");
                self.emit_expr(ctx, inner)?;
                ctx.builder.ensure_boxed();
                ctx.builder.call("Runtime", "SpreadInto", 2, None);
            } else {
                self.emit_expr(ctx, arg)?;
                ctx.builder.ensure_boxed();
                ctx.builder.call_intrinsic(Intrinsic::ArrayPush, 2, None);
            }
        }
        Ok(())
    }

    fn emit_call(&mut self, ctx: &mut FnCtx, expr: &Expr) -> Result<(), Diagnostic> {
        let ExprKind::Call {
            callee,
            type_args,
            args,
            ..
        } = &expr.kind
        else {
            return Err(self.invariant(expr.span, "emit_call on a non-call node"));
        };

        // console.log and friends write through the shim directly.
        if let ExprKind::Member {
            object, property, ..
        } = &callee.kind
        {
            if matches!(&object.kind, ExprKind::Ident(n) if n == "console") {
                self.use_shim("ConsoleLog");
                self.emit_args_array(ctx, args)?;
                ctx.builder.call("Runtime", "ConsoleLog", 1, None);
                let _ = property;
                ctx.builder.ldc_undefined();
                return Ok(());
            }
            // Utility wrappers exist in the shim only when the program
            // references them.
            if let ExprKind::Ident(n) = &object.kind {
                match n.as_str() {
                    "crypto" => {
                        self.use_shim("HashDigest");
                        self.use_shim("CipherTransform");
                    }
                    "url" => self.use_shim("UrlParse"),
                    "Promise" => {
                        self.use_shim("PromiseResolve");
                        self.use_shim("PromiseReject");
                    }
                    _ => {}
                }
            }
        }

        // super(...) chains to the base constructor.
        if matches!(callee.kind, ExprKind::Super) {
            let base = self.base_class_of(ctx)?;
            ctx.builder.ld_arg(0);
            let mut argc = 1u8;
            for arg in args {
                self.emit_expr(ctx, arg)?;
                ctx.builder.ensure_boxed();
                argc += 1;
            }
            ctx.builder.emit(
                Instr::Call {
                    method: MethodRef {
                        class: base,
                        name: ".ctor".to_string(),
                    },
                    argc,
                },
                argc as usize,
                Some(StackType::Ref),
            );
            return Ok(());
        }

        // super.m(...) calls the base implementation directly.
        if let ExprKind::Member {
            object, property, ..
        } = &callee.kind
        {
            if matches!(object.kind, ExprKind::Super) {
                let base = self.base_class_of(ctx)?;
                ctx.builder.ld_arg(0);
                let mut argc = 1u8;
                for arg in args {
                    self.emit_expr(ctx, arg)?;
                    ctx.builder.ensure_boxed();
                    argc += 1;
                }
                ctx.builder.emit(
                    Instr::Call {
                        method: MethodRef {
                            class: base,
                            name: property.clone(),
                        },
                        argc,
                    },
                    argc as usize,
                    Some(StackType::Ref),
                );
                return Ok(());
            }

            // Method call: receiver, name, args through the shim.
            self.use_shim("InvokeMethod");
            self.emit_expr(ctx, object)?;
            ctx.builder.ensure_boxed();
            ctx.builder.ldc_str(property);
            ctx.builder.ensure_boxed();
            self.emit_args_array(ctx, args)?;
            ctx.builder
                .call("Runtime", "InvokeMethod", 3, Some(StackType::Ref));
            return Ok(());
        }

        // Direct call of a known top-level function.
        if let ExprKind::Ident(name) = &callee.kind {
            let storage = ctx
                .lookup(name)
                .or_else(|| self.global_scope.get(name).cloned());
            if let Some(Storage::Method(method)) = storage {
                let method = self.resolve_instantiation(&method, type_args)?;
                for arg in args {
                    self.emit_expr(ctx, arg)?;
                    ctx.builder.ensure_boxed();
                }
                ctx.builder.emit(
                    Instr::Call {
                        method: MethodRef {
                            class: String::new(),
                            name: method,
                        },
                        argc: args.len() as u8,
                    },
                    args.len(),
                    Some(StackType::Ref),
                );
                return Ok(());
            }
        }

        // Dynamic call of a function value.
        self.use_shim("InvokeFunction");
        self.emit_expr(ctx, callee)?;
        ctx.builder.ensure_boxed();
        ctx.builder.ldc_undefined();
        self.emit_args_array(ctx, args)?;
        ctx.builder
            .call("Runtime", "InvokeFunction", 3, Some(StackType::Ref));
        Ok(())
    }

    fn base_class_of(&self, ctx: &FnCtx) -> Result<String, Diagnostic> {
        let class = ctx.this_class.as_ref().ok_or_else(|| {
            self.invariant(
                sharpts_common::span::Span::dummy(),
                "super outside of a class member",
            )
        })?;
        self.classes
            .iter()
            .find(|c| &c.name == class)
            .and_then(|c| c.base.clone())
            .ok_or_else(|| {
                self.invariant(
                    sharpts_common::span::Span::dummy(),
                    format!("class '{class}' has no base class"),
                )
            })
    }

    fn emit_new(
        &mut self,
        ctx: &mut FnCtx,
        expr: &Expr,
        callee: &Expr,
        args: &[Expr],
    ) -> Result<(), Diagnostic> {
        if let ExprKind::Ident(name) = &callee.kind {
            if name == "Promise" {
                self.use_shim("NewPromise");
                self.emit_args_array(ctx, args)?;
                ctx.builder
                    .call("Runtime", "NewPromise", 1, Some(StackType::Ref));
                return Ok(());
            }
            let known_class = matches!(
                ctx.lookup(name)
                    .or_else(|| self.global_scope.get(name).cloned()),
                Some(Storage::Class(_))
            );
            if known_class {
                for arg in args {
                    self.emit_expr(ctx, arg)?;
                    ctx.builder.ensure_boxed();
                }
                ctx.builder.emit(
                    Instr::NewObj {
                        class: name.clone(),
                        argc: args.len() as u8,
                    },
                    args.len(),
                    Some(StackType::Ref),
                );
                return Ok(());
            }
        }
        // Dynamic construction (error classes and other builtins).
        let _ = expr;
        self.use_shim("Construct");
        self.emit_expr(ctx, callee)?;
        ctx.builder.ensure_boxed();
        self.emit_args_array(ctx, args)?;
        ctx.builder
            .call("Runtime", "Construct", 2, Some(StackType::Ref));
        Ok(())
    }

    /// One instantiation per `(generic function, explicit type
    /// arguments)` tuple. Values are boxed in this backend, so the
    /// instantiations share the erased body; the cache still guarantees
    /// the once-per-argument-set contract when a typed fast path is
    /// added for a tuple.
    fn resolve_instantiation(
        &mut self,
        method: &str,
        type_args: &[TypeAnn],
    ) -> Result<String, Diagnostic> {
        if type_args.is_empty() {
            return Ok(method.to_string());
        }
        let key: Vec<String> = type_args.iter().map(|a| format!("{:?}", a.kind)).collect();
        let cache_key = (method.to_string(), key);
        if let Some(existing) = self.instantiations.get(&cache_key) {
            return Ok(existing.clone());
        }
        self.instantiations
            .insert(cache_key, method.to_string());
        Ok(method.to_string())
    }

    // =========================================================================
    // Object literals and closures
    // =========================================================================

    fn emit_object_literal(
        &mut self,
        ctx: &mut FnCtx,
        props: &[ObjectProp],
    ) -> Result<(), Diagnostic> {
        self.use_shim("SetProperty");
        ctx.builder
            .call_intrinsic(Intrinsic::DictNew, 0, Some(StackType::Ref));
        for prop in props {
            match &prop.value {
                ObjectPropValue::Spread(inner) => {
                    self.use_shim("CopyProperties");
                    ctx.builder.dup();
                    self.emit_expr(ctx, inner)?;
                    ctx.builder.ensure_boxed();
                    ctx.builder.call("Runtime", "CopyProperties", 2, None);
                }
                ObjectPropValue::Value(value) => {
                    let Some(name) = prop.key.as_static() else {
                        continue;
                    };
                    ctx.builder.dup();
                    ctx.builder.ldc_str(&name);
                    ctx.builder.ensure_boxed();
                    self.emit_expr(ctx, value)?;
                    ctx.builder.ensure_boxed();
                    ctx.builder.call_intrinsic(Intrinsic::DictSet, 3, None);
                }
                ObjectPropValue::Shorthand => {
                    let Some(name) = prop.key.as_static() else {
                        continue;
                    };
                    let storage = ctx
                        .lookup(&name)
                        .or_else(|| self.global_scope.get(&name).cloned())
                        .ok_or_else(|| {
                            self.invariant(prop.span, format!("unresolved shorthand '{name}'"))
                        })?;
                    ctx.builder.dup();
                    ctx.builder.ldc_str(&name);
                    ctx.builder.ensure_boxed();
                    self.emit_load(ctx, &storage);
                    ctx.builder.ensure_boxed();
                    ctx.builder.call_intrinsic(Intrinsic::DictSet, 3, None);
                }
                ObjectPropValue::Method(parts) => {
                    let Some(name) = prop.key.as_static() else {
                        continue;
                    };
                    let body = parts.body.clone().unwrap_or_default();
                    ctx.builder.dup();
                    ctx.builder.ldc_str(&name);
                    ctx.builder.ensure_boxed();
                    let method_expr = Expr {
                        id: u32::MAX,
                        span: prop.span,
                        kind: ExprKind::Literal(Lit::Undefined),
                    };
                    self.emit_closure(
                        ctx,
                        &name,
                        &parts.params,
                        &body,
                        parts.is_async,
                        parts.is_generator,
                        &method_expr,
                    )?;
                    ctx.builder.ensure_boxed();
                    ctx.builder.call_intrinsic(Intrinsic::DictSet, 3, None);
                }
                ObjectPropValue::Getter(_) | ObjectPropValue::Setter(_, _) => {
                    // Object-literal accessors register through the shim
                    // accessor table; outside the emitted subset.
                    continue;
                }
            }
        }
        Ok(())
    }

    /// Emit a nested function as a standalone method plus a closure
    /// value capturing its free variables by value.
    fn emit_closure(
        &mut self,
        ctx: &mut FnCtx,
        hint: &str,
        params: &[Param],
        body: &[Stmt],
        is_async: bool,
        is_generator: bool,
        site: &Expr,
    ) -> Result<(), Diagnostic> {
        let method_name = self.fresh_method_name(hint);
        if is_async || is_generator {
            let machine = crate::statemachine::emit_coroutine(
                self,
                &method_name,
                params,
                body,
                is_async,
                is_generator,
            )?;
            self.classes.push(machine);
        } else {
            let captured = free_variables(params, body, &self.global_scope);
            if captured.is_empty() {
                let method = self.emit_plain_function(&method_name, params, body, site.span)?;
                self.methods.push(method);
            } else {
                // Captured variables arrive as a leading array argument.
                let method =
                    self.emit_captured_function(&method_name, params, body, &captured, site)?;
                self.methods.push(method);
                ctx.builder.ldc_str(&method_name);
                ctx.builder.ensure_boxed();
                ctx.builder
                    .call_intrinsic(Intrinsic::ArrayNew, 0, Some(StackType::Ref));
                for name in &captured {
                    ctx.builder.dup();
                    let storage = ctx
                        .lookup(name)
                        .or_else(|| self.global_scope.get(name).cloned())
                        .ok_or_else(|| {
                            self.invariant(site.span, format!("unresolved capture '{name}'"))
                        })?;
                    self.emit_load(ctx, &storage);
                    ctx.builder.ensure_boxed();
                    ctx.builder.call_intrinsic(Intrinsic::ArrayPush, 2, None);
                }
                ctx.builder
                    .call_intrinsic(Intrinsic::MakeClosure, 2, Some(StackType::Ref));
                return Ok(());
            }
        }
        ctx.builder.ldc_str(&method_name);
        ctx.builder.ensure_boxed();
        ctx.builder
            .call_intrinsic(Intrinsic::MakeClosure, 1, Some(StackType::Ref));
        Ok(())
    }

    fn emit_captured_function(
        &mut self,
        name: &str,
        params: &[Param],
        body: &[Stmt],
        captured: &[String],
        site: &Expr,
    ) -> Result<IlMethod, Diagnostic> {
        let mut param_names = vec!["__captured".to_string()];
        param_names.extend(params.iter().map(|p| p.name.clone()));
        let mut ctx = FnCtx::new(MethodBuilder::new(name, param_names));
        // Captured values unpack into locals at entry.
        for (i, captured_name) in captured.iter().enumerate() {
            let storage = ctx.declare(captured_name);
            ctx.builder.ld_arg(0);
            ctx.builder.ldc_f64(i as f64);
            ctx.builder
                .call_intrinsic(Intrinsic::ArrayGet, 2, Some(StackType::Ref));
            self.emit_store(&mut ctx, &storage);
        }
        let scope = ctx.scopes.last_mut().expect("scope stack is never empty");
        for (i, param) in params.iter().enumerate() {
            scope.insert(param.name.clone(), Storage::Arg(i as u16 + 1));
        }
        for stmt in body {
            self.emit_stmt(&mut ctx, stmt)?;
        }
        ctx.builder.ldc_undefined();
        ctx.builder.ret();
        ctx.builder.finish(true, site.span)
    }
}

/// Names a nested function reads that it neither declares nor finds in
/// the global scope: its by-value captures.
fn free_variables(
    params: &[Param],
    body: &[Stmt],
    globals: &rustc_hash::FxHashMap<String, Storage>,
) -> Vec<String> {
    let mut declared: FxHashSet<String> = params.iter().map(|p| p.name.clone()).collect();
    collect_declared(body, &mut declared);
    let mut used: Vec<String> = Vec::new();
    let mut seen: FxHashSet<String> = FxHashSet::default();
    collect_idents(body, &mut |name| {
        if !declared.contains(name)
            && !globals.contains_key(name)
            && !is_builtin_name(name)
            && seen.insert(name.to_string())
        {
            used.push(name.to_string());
        }
    });
    used
}

fn is_builtin_name(name: &str) -> bool {
    matches!(
        name,
        "console"
            | "Math"
            | "Object"
            | "Symbol"
            | "Promise"
            | "process"
            | "crypto"
            | "url"
            | "Error"
            | "TypeError"
            | "RangeError"
            | "SyntaxError"
            | "String"
            | "Number"
            | "Boolean"
            | "parseInt"
            | "parseFloat"
            | "isNaN"
            | "undefined"
            | "this"
    )
}

fn collect_declared(body: &[Stmt], out: &mut FxHashSet<String>) {
    for stmt in body {
        match &stmt.kind {
            StmtKind::VarDecl { declarations, .. } => {
                for declarator in declarations {
                    out.insert(declarator.name.clone());
                }
            }
            StmtKind::Function(decl) => {
                out.insert(decl.name.clone());
            }
            StmtKind::Block(stmts) => collect_declared(stmts, out),
            StmtKind::If {
                then_branch,
                else_branch,
                ..
            } => {
                collect_declared(std::slice::from_ref(then_branch), out);
                if let Some(else_branch) = else_branch {
                    collect_declared(std::slice::from_ref(else_branch), out);
                }
            }
            StmtKind::While { body, .. } | StmtKind::DoWhile { body, .. } => {
                collect_declared(std::slice::from_ref(body), out);
            }
            StmtKind::ForIn { binding, body, .. } | StmtKind::ForOf { binding, body, .. } => {
                out.insert(binding.clone());
                collect_declared(std::slice::from_ref(body), out);
            }
            StmtKind::Labeled { body, .. } => collect_declared(std::slice::from_ref(body), out),
            StmtKind::Try {
                block,
                catch,
                finally,
            } => {
                collect_declared(block, out);
                if let Some(catch) = catch {
                    if let Some(param) = &catch.param {
                        out.insert(param.clone());
                    }
                    collect_declared(&catch.body, out);
                }
                if let Some(finally) = finally {
                    collect_declared(finally, out);
                }
            }
            StmtKind::Switch { cases, .. } => {
                for case in cases {
                    collect_declared(&case.body, out);
                }
            }
            _ => {}
        }
    }
}

fn collect_idents(body: &[Stmt], push: &mut impl FnMut(&str)) {
    for stmt in body {
        walk_stmt_exprs(stmt, &mut |expr| {
            if let ExprKind::Ident(name) = &expr.kind {
                push(name);
            }
        });
    }
}

fn walk_stmt_exprs(stmt: &Stmt, visit: &mut impl FnMut(&Expr)) {
    match &stmt.kind {
        StmtKind::VarDecl { declarations, .. } => {
            for declarator in declarations {
                if let Some(init) = &declarator.init {
                    walk_expr(init, visit);
                }
            }
        }
        StmtKind::Expr(expr) | StmtKind::Throw(expr) | StmtKind::Return(Some(expr)) => {
            walk_expr(expr, visit)
        }
        StmtKind::Block(stmts) => {
            for stmt in stmts {
                walk_stmt_exprs(stmt, visit);
            }
        }
        StmtKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            walk_expr(cond, visit);
            walk_stmt_exprs(then_branch, visit);
            if let Some(else_branch) = else_branch {
                walk_stmt_exprs(else_branch, visit);
            }
        }
        StmtKind::While { cond, body } | StmtKind::DoWhile { body, cond } => {
            walk_expr(cond, visit);
            walk_stmt_exprs(body, visit);
        }
        StmtKind::ForIn { object, body, .. } => {
            walk_expr(object, visit);
            walk_stmt_exprs(body, visit);
        }
        StmtKind::ForOf { iterable, body, .. } => {
            walk_expr(iterable, visit);
            walk_stmt_exprs(body, visit);
        }
        StmtKind::Labeled { body, .. } => walk_stmt_exprs(body, visit),
        StmtKind::Try {
            block,
            catch,
            finally,
        } => {
            for stmt in block {
                walk_stmt_exprs(stmt, visit);
            }
            if let Some(catch) = catch {
                for stmt in &catch.body {
                    walk_stmt_exprs(stmt, visit);
                }
            }
            if let Some(finally) = finally {
                for stmt in finally {
                    walk_stmt_exprs(stmt, visit);
                }
            }
        }
        StmtKind::Switch {
            discriminant,
            cases,
        } => {
            walk_expr(discriminant, visit);
            for case in cases {
                if let Some(test) = &case.test {
                    walk_expr(test, visit);
                }
                for stmt in &case.body {
                    walk_stmt_exprs(stmt, visit);
                }
            }
        }
        _ => {}
    }
}

fn walk_expr(expr: &Expr, visit: &mut impl FnMut(&Expr)) {
    visit(expr);
    match &expr.kind {
        ExprKind::Paren(inner)
        | ExprKind::NonNull(inner)
        | ExprKind::Spread(inner)
        | ExprKind::Await(inner)
        | ExprKind::TypeAssertion { expr: inner, .. } => walk_expr(inner, visit),
        ExprKind::Unary { operand, .. } | ExprKind::Update { operand, .. } => {
            walk_expr(operand, visit)
        }
        ExprKind::Yield { argument, .. } => {
            if let Some(argument) = argument {
                walk_expr(argument, visit);
            }
        }
        ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
            walk_expr(left, visit);
            walk_expr(right, visit);
        }
        ExprKind::Assign { target, value, .. } => {
            walk_expr(target, visit);
            walk_expr(value, visit);
        }
        ExprKind::Conditional {
            cond,
            consequent,
            alternate,
        } => {
            walk_expr(cond, visit);
            walk_expr(consequent, visit);
            walk_expr(alternate, visit);
        }
        ExprKind::Call { callee, args, .. } | ExprKind::New { callee, args, .. } => {
            walk_expr(callee, visit);
            for arg in args {
                walk_expr(arg, visit);
            }
        }
        ExprKind::Member { object, .. } => walk_expr(object, visit),
        ExprKind::Index { object, index, .. } => {
            walk_expr(object, visit);
            walk_expr(index, visit);
        }
        ExprKind::Array(elements) => {
            for element in elements {
                walk_expr(element, visit);
            }
        }
        ExprKind::Object(props) => {
            for prop in props {
                match &prop.value {
                    ObjectPropValue::Value(value) => walk_expr(value, visit),
                    ObjectPropValue::Spread(inner) => walk_expr(inner, visit),
                    _ => {}
                }
            }
        }
        ExprKind::Template { exprs, .. } => {
            for part in exprs {
                walk_expr(part, visit);
            }
        }
        ExprKind::Sequence(parts) => {
            for part in parts {
                walk_expr(part, visit);
            }
        }
        // Free variables of nested functions are *their* captures; a
        // conservative emitter also captures them here.
        ExprKind::Arrow { body, .. } => match body {
            ArrowBody::Expr(inner) => walk_expr(inner, visit),
            ArrowBody::Block(stmts) => {
                for stmt in stmts {
                    walk_stmt_exprs(stmt, visit);
                }
            }
        },
        ExprKind::FunctionExpr { parts, .. } => {
            if let Some(body) = &parts.body {
                for stmt in body {
                    walk_stmt_exprs(stmt, visit);
                }
            }
        }
        _ => {}
    }
}
