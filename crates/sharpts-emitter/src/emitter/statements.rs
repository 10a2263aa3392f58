//! Statement lowering.

use sharpts_common::diagnostics::Diagnostic;
use sharpts_parser::ast::*;

use super::{Emitter, FnCtx, LoopLabels, Storage};
use crate::il::*;

impl Emitter<'_> {
    pub fn emit_stmt(&mut self, ctx: &mut FnCtx, stmt: &Stmt) -> Result<(), Diagnostic> {
        match &stmt.kind {
            StmtKind::VarDecl { declarations, .. } => {
                for declarator in declarations {
                    self.emit_var_declarator(ctx, declarator)?;
                }
                Ok(())
            }
            StmtKind::Expr(expr) => {
                self.emit_expr(ctx, expr)?;
                ctx.builder.pop();
                Ok(())
            }
            StmtKind::Block(stmts) => {
                ctx.scopes.push(Default::default());
                for stmt in stmts {
                    self.emit_stmt(ctx, stmt)?;
                }
                ctx.scopes.pop();
                Ok(())
            }
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let else_label = ctx.builder.reserve_label();
                let end_label = ctx.builder.reserve_label();
                self.emit_expr(ctx, cond)?;
                ctx.builder.br_false(else_label);
                self.emit_stmt(ctx, then_branch)?;
                ctx.builder.br(end_label);
                ctx.builder.mark_label(else_label);
                if let Some(else_branch) = else_branch {
                    self.emit_stmt(ctx, else_branch)?;
                }
                ctx.builder.mark_label(end_label);
                Ok(())
            }
            StmtKind::While { cond, body } => self.emit_while(ctx, cond, body, None),
            StmtKind::DoWhile { body, cond } => {
                let top = ctx.builder.reserve_label();
                let check = ctx.builder.reserve_label();
                let exit = ctx.builder.reserve_label();
                ctx.loop_stack.push(LoopLabels {
                    label: None,
                    break_label: exit,
                    continue_label: Some(check),
                });
                ctx.builder.mark_label(top);
                self.emit_stmt(ctx, body)?;
                ctx.builder.mark_label(check);
                self.emit_expr(ctx, cond)?;
                ctx.builder.br_true(top);
                ctx.builder.mark_label(exit);
                ctx.loop_stack.pop();
                Ok(())
            }
            StmtKind::ForIn {
                binding,
                object,
                body,
                ..
            } => self.emit_for_in(ctx, binding, object, body),
            StmtKind::ForOf {
                binding,
                iterable,
                body,
                ..
            } => self.emit_for_of(ctx, binding, iterable, body),
            StmtKind::Return(argument) => {
                match argument {
                    Some(expr) => {
                        self.emit_expr(ctx, expr)?;
                        ctx.builder.ensure_boxed();
                    }
                    None => ctx.builder.ldc_undefined(),
                }
                ctx.builder.ret();
                Ok(())
            }
            StmtKind::Break(label) => {
                let target = ctx
                    .loop_stack
                    .iter()
                    .rev()
                    .find(|l| match label {
                        Some(label) => l.label.as_deref() == Some(label),
                        None => true,
                    })
                    .map(|l| l.break_label);
                match target {
                    Some(target) => {
                        ctx.builder.br(target);
                        Ok(())
                    }
                    None => Err(self.invariant(stmt.span, "break outside of a loop")),
                }
            }
            StmtKind::Continue(label) => {
                let target = ctx
                    .loop_stack
                    .iter()
                    .rev()
                    .filter(|l| match label {
                        Some(label) => l.label.as_deref() == Some(label),
                        None => true,
                    })
                    .find_map(|l| l.continue_label);
                match target {
                    Some(target) => {
                        ctx.builder.br(target);
                        Ok(())
                    }
                    None => Err(self.invariant(stmt.span, "continue outside of a loop")),
                }
            }
            StmtKind::Throw(value) => {
                self.emit_expr(ctx, value)?;
                ctx.builder.ensure_boxed();
                ctx.builder.emit(Instr::Throw, 1, None);
                Ok(())
            }
            StmtKind::Try {
                block,
                catch,
                finally,
            } => self.emit_try(ctx, block, catch.as_ref(), finally.as_deref()),
            StmtKind::Switch {
                discriminant,
                cases,
            } => self.emit_switch(ctx, discriminant, cases),
            StmtKind::Labeled { label, body } => match &body.kind {
                StmtKind::While { cond, body } => self.emit_while(ctx, cond, body, Some(label)),
                StmtKind::Block(stmts) => {
                    // A label on a desugared C-for reaches the loop in
                    // final position.
                    ctx.scopes.push(Default::default());
                    for (i, inner) in stmts.iter().enumerate() {
                        if i + 1 == stmts.len() {
                            if let StmtKind::While { cond, body } = &inner.kind {
                                self.emit_while(ctx, cond, body, Some(label))?;
                                continue;
                            }
                        }
                        self.emit_stmt(ctx, inner)?;
                    }
                    ctx.scopes.pop();
                    Ok(())
                }
                _ => self.emit_stmt(ctx, body),
            },
            StmtKind::Function(decl) => {
                // Nested function declarations become closures bound in
                // the enclosing scope.
                let method_name = self.fresh_method_name(&decl.name);
                let method = self.emit_plain_function(
                    &method_name,
                    &decl.params,
                    decl.body.as_deref().unwrap_or(&[]),
                    decl.span,
                )?;
                self.methods.push(method);
                let storage = ctx.declare(&decl.name);
                ctx.builder.ldc_str(&method_name);
                ctx.builder.ensure_boxed();
                ctx.builder
                    .call_intrinsic(Intrinsic::MakeClosure, 1, Some(StackType::Ref));
                self.emit_store(ctx, &storage);
                Ok(())
            }
            StmtKind::Class(decl) => {
                // Top-level classes were emitted in the declaration
                // pass; a class declared in a nested scope is an
                // unsupported construct on this backend.
                Err(Diagnostic::compile_error(
                    stmt.span,
                    format!(
                        "class '{}' cannot be declared in a nested scope on this backend",
                        decl.name
                    ),
                    sharpts_common::diagnostics::diagnostic_codes::UNSUPPORTED_CONSTRUCT,
                ))
            }
            StmtKind::Namespace(decl) => {
                for stmt in &decl.body {
                    self.emit_stmt(ctx, stmt)?;
                }
                Ok(())
            }
            StmtKind::Export(inner) => self.emit_stmt(ctx, inner),
            StmtKind::Interface(_)
            | StmtKind::TypeAlias(_)
            | StmtKind::Enum(_)
            | StmtKind::Import(_)
            | StmtKind::ExportNamed { .. }
            | StmtKind::Directive(_)
            | StmtKind::Empty => Ok(()),
        }
    }

    fn emit_var_declarator(
        &mut self,
        ctx: &mut FnCtx,
        declarator: &VarDeclarator,
    ) -> Result<(), Diagnostic> {
        match &declarator.init {
            Some(init) => {
                self.emit_expr(ctx, init)?;
                ctx.builder.ensure_boxed();
            }
            None => ctx.builder.ldc_undefined(),
        }
        let storage = if ctx.is_entry
            && matches!(self.global_scope.get(&declarator.name), Some(Storage::Global(_)))
        {
            Storage::Global(declarator.name.clone())
        } else {
            ctx.declare(&declarator.name)
        };
        self.emit_store(ctx, &storage);
        Ok(())
    }

    pub fn emit_store(&mut self, ctx: &mut FnCtx, storage: &Storage) {
        match storage {
            Storage::Local(slot) => ctx.builder.st_loc(*slot),
            Storage::Arg(index) => ctx.builder.st_arg(*index),
            Storage::Global(name) => {
                ctx.builder.ensure_boxed();
                ctx.builder.emit(
                    Instr::StSFld(MethodRef {
                        class: "Globals".to_string(),
                        name: name.clone(),
                    }),
                    1,
                    None,
                );
            }
            Storage::MachineField(name) => {
                // Machine fields live on `this` (arg 0); `StFld` wants
                // (object, value), so the value detours through the
                // scratch slot.
                let class = ctx.machine_class.clone().unwrap_or_default();
                ctx.builder.ensure_boxed();
                let scratch = ctx.scratch_slot();
                ctx.builder.st_loc(scratch);
                ctx.builder.ld_arg(0);
                ctx.builder.ld_loc(scratch);
                ctx.builder.emit(
                    Instr::StFld(MethodRef {
                        class,
                        name: name.clone(),
                    }),
                    2,
                    None,
                );
            }
            Storage::Method(_) | Storage::Class(_) => {
                // Immutable bindings; drop the value.
                ctx.builder.pop();
            }
        }
    }

    pub fn emit_load(&mut self, ctx: &mut FnCtx, storage: &Storage) {
        match storage {
            Storage::Local(slot) => ctx.builder.ld_loc(*slot),
            Storage::Arg(index) => ctx.builder.ld_arg(*index),
            Storage::Global(name) => {
                ctx.builder.emit(
                    Instr::LdSFld(MethodRef {
                        class: "Globals".to_string(),
                        name: name.clone(),
                    }),
                    0,
                    Some(StackType::Ref),
                );
            }
            Storage::MachineField(name) => {
                let class = ctx.machine_class.clone().unwrap_or_default();
                ctx.builder.ld_arg(0);
                ctx.builder.emit(
                    Instr::LdFld(MethodRef {
                        class,
                        name: name.clone(),
                    }),
                    1,
                    Some(StackType::Ref),
                );
            }
            Storage::Method(name) => {
                ctx.builder.ldc_str(name);
                ctx.builder.ensure_boxed();
                ctx.builder
                    .call_intrinsic(Intrinsic::MakeClosure, 1, Some(StackType::Ref));
            }
            Storage::Class(name) => {
                ctx.builder.ldc_str(name);
                ctx.builder.ensure_boxed();
                self.use_shim("ClassOf");
                ctx.builder
                    .call("Runtime", "ClassOf", 1, Some(StackType::Ref));
            }
        }
    }

    fn emit_while(
        &mut self,
        ctx: &mut FnCtx,
        cond: &Expr,
        body: &Stmt,
        label: Option<&str>,
    ) -> Result<(), Diagnostic> {
        let top = ctx.builder.reserve_label();
        let exit = ctx.builder.reserve_label();
        ctx.loop_stack.push(LoopLabels {
            label: label.map(str::to_string),
            break_label: exit,
            continue_label: Some(top),
        });
        ctx.builder.mark_label(top);
        self.emit_expr(ctx, cond)?;
        ctx.builder.br_false(exit);
        self.emit_stmt(ctx, body)?;
        ctx.builder.br(top);
        ctx.builder.mark_label(exit);
        ctx.loop_stack.pop();
        Ok(())
    }

    /// `for...of`: acquire the iterator through the protocol, then loop
    /// on `next()` until `done`.
    fn emit_for_of(
        &mut self,
        ctx: &mut FnCtx,
        binding: &str,
        iterable: &Expr,
        body: &Stmt,
    ) -> Result<(), Diagnostic> {
        self.use_shim("GetIterator");
        self.use_shim("GetProperty");
        self.use_shim("InvokeMethod");

        let iterator = ctx.builder.declare_local("__iterator", StackType::Ref);
        let step = ctx.builder.declare_local("__step", StackType::Ref);

        self.emit_expr(ctx, iterable)?;
        ctx.builder.ensure_boxed();
        ctx.builder
            .call("Runtime", "GetIterator", 1, Some(StackType::Ref));
        ctx.builder.st_loc(iterator);

        let top = ctx.builder.reserve_label();
        let exit = ctx.builder.reserve_label();
        ctx.scopes.push(Default::default());
        ctx.loop_stack.push(LoopLabels {
            label: None,
            break_label: exit,
            continue_label: Some(top),
        });

        ctx.builder.mark_label(top);
        // step = iterator.next()
        ctx.builder.ld_loc(iterator);
        ctx.builder.ldc_str("next");
        ctx.builder.ensure_boxed();
        ctx.builder
            .call_intrinsic(Intrinsic::ArrayNew, 0, Some(StackType::Ref));
        ctx.builder
            .call("Runtime", "InvokeMethod", 3, Some(StackType::Ref));
        ctx.builder.st_loc(step);
        // if (step.done) break
        ctx.builder.ld_loc(step);
        ctx.builder.ldc_str("done");
        ctx.builder.ensure_boxed();
        ctx.builder
            .call("Runtime", "GetProperty", 2, Some(StackType::Ref));
        ctx.builder.br_true(exit);
        // binding = step.value
        let storage = ctx.declare(binding);
        ctx.builder.ld_loc(step);
        ctx.builder.ldc_str("value");
        ctx.builder.ensure_boxed();
        ctx.builder
            .call("Runtime", "GetProperty", 2, Some(StackType::Ref));
        self.emit_store(ctx, &storage);
        self.emit_stmt(ctx, body)?;
        ctx.builder.br(top);
        ctx.builder.mark_label(exit);

        ctx.loop_stack.pop();
        ctx.scopes.pop();
        Ok(())
    }

    fn emit_for_in(
        &mut self,
        ctx: &mut FnCtx,
        binding: &str,
        object: &Expr,
        body: &Stmt,
    ) -> Result<(), Diagnostic> {
        self.use_shim("EnumerableKeys");
        let keys = ctx.builder.declare_local("__keys", StackType::Ref);
        let index = ctx.builder.declare_local("__index", StackType::Double);

        self.emit_expr(ctx, object)?;
        ctx.builder.ensure_boxed();
        ctx.builder
            .call("Runtime", "EnumerableKeys", 1, Some(StackType::Ref));
        ctx.builder.st_loc(keys);
        ctx.builder.ldc_f64(0.0);
        ctx.builder.st_loc(index);

        let top = ctx.builder.reserve_label();
        let exit = ctx.builder.reserve_label();
        ctx.scopes.push(Default::default());
        ctx.loop_stack.push(LoopLabels {
            label: None,
            break_label: exit,
            continue_label: Some(top),
        });

        ctx.builder.mark_label(top);
        ctx.builder.ld_loc(index);
        ctx.builder.ld_loc(keys);
        ctx.builder
            .call_intrinsic(Intrinsic::ArrayLen, 1, Some(StackType::Double));
        ctx.builder.emit(Instr::CmpLt, 2, Some(StackType::Bool));
        ctx.builder.br_false(exit);

        let storage = ctx.declare(binding);
        ctx.builder.ld_loc(keys);
        ctx.builder.ld_loc(index);
        ctx.builder
            .call_intrinsic(Intrinsic::ArrayGet, 2, Some(StackType::Ref));
        self.emit_store(ctx, &storage);

        ctx.builder.ld_loc(index);
        ctx.builder.ldc_f64(1.0);
        ctx.builder.emit(Instr::Add, 2, Some(StackType::Double));
        ctx.builder.st_loc(index);

        self.emit_stmt(ctx, body)?;
        ctx.builder.br(top);
        ctx.builder.mark_label(exit);

        ctx.loop_stack.pop();
        ctx.scopes.pop();
        Ok(())
    }

    /// Structured exception regions: try body, typed catch, finally.
    fn emit_try(
        &mut self,
        ctx: &mut FnCtx,
        block: &[Stmt],
        catch: Option<&CatchClause>,
        finally: Option<&[Stmt]>,
    ) -> Result<(), Diagnostic> {
        let end = ctx.builder.reserve_label();
        ctx.builder.emit(Instr::BeginTry, 0, None);
        ctx.scopes.push(Default::default());
        for stmt in block {
            self.emit_stmt(ctx, stmt)?;
        }
        ctx.scopes.pop();
        ctx.builder.emit(Instr::Leave(end), 0, None);

        if let Some(catch) = catch {
            let exception_local = ctx.builder.declare_local("__exception", StackType::Ref);
            ctx.builder
                .emit(Instr::BeginCatch { exception_local }, 0, None);
            ctx.scopes.push(Default::default());
            if let Some(param) = &catch.param {
                let storage = ctx.declare(param);
                ctx.builder.ld_loc(exception_local);
                self.emit_store(ctx, &storage);
            }
            for stmt in &catch.body {
                self.emit_stmt(ctx, stmt)?;
            }
            ctx.scopes.pop();
            ctx.builder.emit(Instr::Leave(end), 0, None);
        }

        if let Some(finally) = finally {
            ctx.builder.emit(Instr::BeginFinally, 0, None);
            ctx.scopes.push(Default::default());
            for stmt in finally {
                self.emit_stmt(ctx, stmt)?;
            }
            ctx.scopes.pop();
        }
        ctx.builder.emit(Instr::EndException, 0, None);
        ctx.builder.mark_label(end);
        Ok(())
    }

    fn emit_switch(
        &mut self,
        ctx: &mut FnCtx,
        discriminant: &Expr,
        cases: &[SwitchCase],
    ) -> Result<(), Diagnostic> {
        self.use_shim("StrictEquals");
        let subject = ctx.builder.declare_local("__switch", StackType::Ref);
        self.emit_expr(ctx, discriminant)?;
        ctx.builder.ensure_boxed();
        ctx.builder.st_loc(subject);

        let exit = ctx.builder.reserve_label();
        let case_labels: Vec<Label> = cases.iter().map(|_| ctx.builder.reserve_label()).collect();
        let default_label = cases
            .iter()
            .position(|c| c.test.is_none())
            .map(|i| case_labels[i])
            .unwrap_or(exit);

        for (i, case) in cases.iter().enumerate() {
            let Some(test) = &case.test else { continue };
            ctx.builder.ld_loc(subject);
            self.emit_expr(ctx, test)?;
            ctx.builder.ensure_boxed();
            ctx.builder
                .call("Runtime", "StrictEquals", 2, Some(StackType::Bool));
            ctx.builder.br_true(case_labels[i]);
        }
        ctx.builder.br(default_label);

        ctx.loop_stack.push(LoopLabels {
            label: None,
            break_label: exit,
            continue_label: None,
        });
        ctx.scopes.push(Default::default());
        for (i, case) in cases.iter().enumerate() {
            ctx.builder.mark_label(case_labels[i]);
            for stmt in &case.body {
                self.emit_stmt(ctx, stmt)?;
            }
            // Fallthrough to the next case body.
        }
        ctx.scopes.pop();
        ctx.loop_stack.pop();
        ctx.builder.mark_label(exit);
        Ok(())
    }
}
