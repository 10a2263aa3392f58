//! State-machine emission for coroutine functions.
//!
//! Each async function, generator, and async generator becomes a class
//! with an integer `state` field (initial 0, terminal -2), one field per
//! hoisted local, an awaiter field, pending-completion fields, and a
//! `MoveNext` method: a dispatch switch over `state`, straight-line
//! emission of each state's statements, suspension sites that store the
//! awaiter and register a continuation when it has not completed, and
//! split exception regions with flag-based replay of pending
//! completions in `finally`.

use rustc_hash::FxHashMap;
use sharpts_common::diagnostics::Diagnostic;
use sharpts_common::limits;
use sharpts_common::span::Span;
use sharpts_lowering::{
    CoroKind, CoroMachine, HandlerRegion, SENT_VAR, Transition, lower_function_body,
};
use sharpts_parser::ast::Param;

use crate::MethodBuilder;
use crate::emitter::{Emitter, FnCtx, Storage};
use crate::il::*;

/// Terminal state value.
const STATE_DONE: f64 = -2.0;

/// Pending-completion codes replayed at the end of a finally block.
mod pending {
    pub const NONE: f64 = 0.0;
    pub const JUMP: f64 = 1.0;
    pub const RETURN: f64 = 2.0;
    pub const THROW: f64 = 3.0;
}

pub fn emit_coroutine(
    emitter: &mut Emitter<'_>,
    name: &str,
    params: &[Param],
    body: &[sharpts_parser::ast::Stmt],
    is_async: bool,
    is_generator: bool,
) -> Result<IlClass, Diagnostic> {
    let machine = lower_function_body(body, is_async, is_generator);
    if machine.states.len() > limits::MAX_CORO_STATES {
        return Err(emitter.invariant(
            Span::dummy(),
            format!("coroutine '{name}' flattened to {} states", machine.states.len()),
        ));
    }
    let class_name = format!("{name}__StateMachine");
    tracing::debug!(
        name = class_name.as_str(),
        states = machine.states.len(),
        kind = ?machine.kind,
        "emitting state machine"
    );

    // Fields: bookkeeping plus hoisted locals plus parameters.
    let mut fields = vec![
        IlField { name: "__state".into(), ty: StackType::Double, is_static: false },
        IlField { name: "__current".into(), ty: StackType::Ref, is_static: false },
        IlField { name: "__result".into(), ty: StackType::Ref, is_static: false },
        IlField { name: "__awaiter".into(), ty: StackType::Ref, is_static: false },
        IlField { name: "__pending".into(), ty: StackType::Double, is_static: false },
        IlField { name: "__pendingValue".into(), ty: StackType::Ref, is_static: false },
        IlField { name: "__pendingTarget".into(), ty: StackType::Double, is_static: false },
    ];
    let hoisted = machine.hoisted_locals();
    for local in &hoisted {
        fields.push(IlField {
            name: local.clone(),
            ty: StackType::Ref,
            is_static: false,
        });
    }
    for param in params {
        if !hoisted.contains(&param.name) {
            fields.push(IlField {
                name: param.name.clone(),
                ty: StackType::Ref,
                is_static: false,
            });
        }
    }

    emitter.use_shim(match machine.kind {
        CoroKind::Async => "RunAsync",
        CoroKind::Generator => "MakeGeneratorObject",
        CoroKind::AsyncGenerator => "MakeAsyncGeneratorObject",
    });
    let move_next = emit_move_next(emitter, &class_name, &machine, params, &hoisted)?;
    let entry = emit_entry_method(name, &class_name, params, machine.kind)?;
    emitter.methods.push(entry);

    Ok(IlClass {
        name: class_name,
        base: None,
        fields,
        methods: vec![move_next],
        regions: machine
            .handlers
            .iter()
            .map(|region| RegionInfo {
                parent: region.parent.map(|p| p as u32),
                catch_state: region.catch_state.map(|s| s as u32),
                finally_state: region.finally_state.map(|s| s as u32),
                exit_state: region.exit_state as u32,
            })
            .collect(),
        state_handlers: machine
            .states
            .iter()
            .map(|state| state.handler.map(|h| h as u32))
            .collect(),
    })
}

/// The callable wrapper: allocates the machine, stores the arguments
/// into parameter fields, and hands the machine to the host driver
/// (promise for async functions, iterator object for generators).
fn emit_entry_method(
    name: &str,
    class_name: &str,
    params: &[Param],
    kind: CoroKind,
) -> Result<IlMethod, Diagnostic> {
    let param_names: Vec<String> = params.iter().map(|p| p.name.clone()).collect();
    let mut builder = MethodBuilder::new(name, param_names);
    let machine_local = builder.declare_local("__machine", StackType::Ref);
    builder.emit(
        Instr::NewObj {
            class: class_name.to_string(),
            argc: 0,
        },
        0,
        Some(StackType::Ref),
    );
    builder.st_loc(machine_local);
    for (i, param) in params.iter().enumerate() {
        builder.ld_loc(machine_local);
        builder.ld_arg(i as u16);
        builder.emit(
            Instr::StFld(MethodRef {
                class: class_name.to_string(),
                name: param.name.clone(),
            }),
            2,
            None,
        );
    }
    builder.ld_loc(machine_local);
    let driver = match kind {
        CoroKind::Async => "RunAsync",
        CoroKind::Generator => "MakeGeneratorObject",
        CoroKind::AsyncGenerator => "MakeAsyncGeneratorObject",
    };
    builder.call("Runtime", driver, 1, Some(StackType::Ref));
    builder.ret();
    builder.finish(true, Span::dummy())
}

struct MachineEmitter<'a, 'b> {
    class_name: &'a str,
    machine: &'a CoroMachine,
    loop_top: Label,
    state_labels: Vec<Label>,
    /// Precomputed next hop per (finally region, jump target).
    jump_routes: FxHashMap<(usize, usize), JumpHop>,
    emitter: &'a mut Emitter<'b>,
}

#[derive(Clone, Copy)]
enum JumpHop {
    /// Keep the pending jump and run this finally state next.
    Finally(usize),
    /// Clear the pending jump and go straight to the target.
    Target(usize),
}

fn emit_move_next(
    emitter: &mut Emitter<'_>,
    class_name: &str,
    machine: &CoroMachine,
    params: &[Param],
    hoisted: &[String],
) -> Result<IlMethod, Diagnostic> {
    let mut ctx = FnCtx::new(MethodBuilder::new("MoveNext", vec!["this".to_string()]));
    ctx.machine_class = Some(class_name.to_string());
    {
        let scope = ctx.scopes.last_mut().expect("scope stack is never empty");
        for name in hoisted {
            scope.insert(name.clone(), Storage::MachineField(name.clone()));
        }
        for param in params {
            scope.insert(
                param.name.clone(),
                Storage::MachineField(param.name.clone()),
            );
        }
        scope.insert(
            SENT_VAR.to_string(),
            Storage::MachineField(SENT_VAR.to_string()),
        );
    }

    let loop_top = ctx.builder.reserve_label();
    let state_labels: Vec<Label> = machine
        .states
        .iter()
        .map(|_| ctx.builder.reserve_label())
        .collect();
    let done_label = ctx.builder.reserve_label();

    let mut me = MachineEmitter {
        class_name,
        machine,
        loop_top,
        state_labels: state_labels.clone(),
        jump_routes: precompute_jump_routes(machine),
        emitter,
    };

    // Dispatch jump table on `state`.
    ctx.builder.mark_label(loop_top);
    ctx.builder.ld_arg(0);
    ctx.builder.emit(
        Instr::LdFld(MethodRef {
            class: class_name.to_string(),
            name: "__state".to_string(),
        }),
        1,
        Some(StackType::Double),
    );
    ctx.builder
        .emit(Instr::Switch(state_labels.clone()), 1, None);
    ctx.builder.br(done_label);

    for (index, state) in machine.states.iter().enumerate() {
        ctx.builder.mark_label(state_labels[index]);
        me.emit_state(&mut ctx, index, state)?;
    }

    ctx.builder.mark_label(done_label);
    ctx.builder.ldc_bool(false);
    ctx.builder.ret();
    ctx.builder.finish(false, Span::dummy())
}

/// For each finally region and each jump target routed through it,
/// decide the next hop after the finally completes.
fn precompute_jump_routes(machine: &CoroMachine) -> FxHashMap<(usize, usize), JumpHop> {
    let mut routes = FxHashMap::default();
    for (index, state) in machine.states.iter().enumerate() {
        let targets: Vec<usize> = match &state.transition {
            Transition::Jump(target) => vec![*target],
            _ => continue,
        };
        for target in targets {
            let target_chain = machine.handler_chain(target);
            let exited: Vec<usize> = machine
                .handler_chain(index)
                .into_iter()
                .take_while(|r| !target_chain.contains(r))
                .filter(|&r| machine.handlers[r].finally_state.is_some())
                .collect();
            for (i, &region) in exited.iter().enumerate() {
                let hop = match exited.get(i + 1) {
                    Some(&next_region) => {
                        JumpHop::Finally(machine.handlers[next_region].finally_state.unwrap())
                    }
                    None => JumpHop::Target(target),
                };
                routes.insert((region, target), hop);
            }
        }
    }
    routes
}

impl MachineEmitter<'_, '_> {
    fn fld(&self, name: &str) -> MethodRef {
        MethodRef {
            class: self.class_name.to_string(),
            name: name.to_string(),
        }
    }

    fn set_state(&self, ctx: &mut FnCtx, target: usize) {
        ctx.builder.ld_arg(0);
        ctx.builder.ldc_f64(target as f64);
        ctx.builder.emit(Instr::StFld(self.fld("__state")), 2, None);
    }

    fn set_state_value(&self, ctx: &mut FnCtx, value: f64) {
        ctx.builder.ld_arg(0);
        ctx.builder.ldc_f64(value);
        ctx.builder.emit(Instr::StFld(self.fld("__state")), 2, None);
    }

    fn store_field_from_stack(&self, ctx: &mut FnCtx, field: &str) {
        // (value) -> stored via scratch so `this` loads first.
        ctx.builder.ensure_boxed();
        let scratch = ctx.scratch_slot();
        ctx.builder.st_loc(scratch);
        ctx.builder.ld_arg(0);
        ctx.builder.ld_loc(scratch);
        ctx.builder.emit(Instr::StFld(self.fld(field)), 2, None);
    }

    fn load_field(&self, ctx: &mut FnCtx, field: &str) {
        ctx.builder.ld_arg(0);
        ctx.builder
            .emit(Instr::LdFld(self.fld(field)), 1, Some(StackType::Ref));
    }

    fn emit_state(
        &mut self,
        ctx: &mut FnCtx,
        index: usize,
        state: &sharpts_lowering::CoroState,
    ) -> Result<(), Diagnostic> {
        // States covered by a region run inside a structured try whose
        // handler routes through the region table.
        let guarded = state.handler.is_some();
        let after_guard = if guarded {
            let label = ctx.builder.reserve_label();
            ctx.builder.emit(Instr::BeginTry, 0, None);
            Some(label)
        } else {
            None
        };

        for stmt in &state.stmts {
            self.emitter.emit_stmt(ctx, stmt)?;
        }
        self.emit_transition(ctx, index, &state.transition)?;

        if let (Some(after_guard), Some(region)) = (after_guard, state.handler) {
            ctx.builder.emit(Instr::Leave(after_guard), 0, None);
            let exception_local = ctx.builder.declare_local("__raised", StackType::Ref);
            ctx.builder
                .emit(Instr::BeginCatch { exception_local }, 0, None);
            self.emit_throw_routing(ctx, region, exception_local);
            ctx.builder.emit(Instr::EndException, 0, None);
            ctx.builder.mark_label(after_guard);
            // The transition already left this block; the label only
            // closes the region.
            ctx.builder.br(self.loop_top);
        }
        Ok(())
    }

    /// Route a raised exception through the region chain, statically.
    fn emit_throw_routing(&mut self, ctx: &mut FnCtx, region: usize, exception_local: u16) {
        let mut current = Some(region);
        while let Some(idx) = current {
            let handler: &HandlerRegion = &self.machine.handlers[idx];
            if let (Some(catch_state), Some(var)) = (handler.catch_state, &handler.catch_var) {
                ctx.builder.ld_loc(exception_local);
                self.store_field_from_stack(ctx, var);
                self.set_state(ctx, catch_state);
                ctx.builder.br(self.loop_top);
                return;
            }
            if let Some(catch_state) = handler.catch_state {
                self.set_state(ctx, catch_state);
                ctx.builder.br(self.loop_top);
                return;
            }
            if let Some(finally_state) = handler.finally_state {
                ctx.builder.ld_arg(0);
                ctx.builder.ldc_f64(pending::THROW);
                ctx.builder
                    .emit(Instr::StFld(self.fld("__pending")), 2, None);
                ctx.builder.ld_loc(exception_local);
                self.store_field_from_stack(ctx, "__pendingValue");
                self.set_state(ctx, finally_state);
                ctx.builder.br(self.loop_top);
                return;
            }
            current = handler.parent;
        }
        // No region handles it: the machine completes and rethrows.
        self.set_state_value(ctx, STATE_DONE);
        ctx.builder.ld_loc(exception_local);
        ctx.builder.emit(Instr::Rethrow, 1, None);
    }

    fn emit_transition(
        &mut self,
        ctx: &mut FnCtx,
        index: usize,
        transition: &Transition,
    ) -> Result<(), Diagnostic> {
        match transition {
            Transition::Jump(target) => {
                self.emit_static_jump(ctx, index, *target);
            }
            Transition::Branch {
                cond,
                then_state,
                else_state,
            } => {
                let else_label = ctx.builder.reserve_label();
                self.emitter.emit_expr(ctx, cond)?;
                ctx.builder.br_false(else_label);
                self.set_state(ctx, *then_state);
                ctx.builder.br(self.loop_top);
                ctx.builder.mark_label(else_label);
                self.set_state(ctx, *else_state);
                ctx.builder.br(self.loop_top);
            }
            Transition::Yield { value, resume } => {
                self.emitter.emit_expr(ctx, value)?;
                self.store_field_from_stack(ctx, "__current");
                self.set_state(ctx, *resume);
                ctx.builder.ldc_bool(true);
                ctx.builder.ret();
            }
            Transition::Await { value, resume } => {
                self.emitter.emit_expr(ctx, value)?;
                self.store_field_from_stack(ctx, "__awaiter");
                self.set_state(ctx, *resume);
                // if (!awaiter.completed) { register continuation; suspend }
                let resolved = ctx.builder.reserve_label();
                self.load_field(ctx, "__awaiter");
                ctx.builder.call_intrinsic(
                    Intrinsic::PromiseIsCompleted,
                    1,
                    Some(StackType::Bool),
                );
                ctx.builder.br_true(resolved);
                ctx.builder.ld_arg(0);
                self.load_field(ctx, "__awaiter");
                ctx.builder
                    .call_intrinsic(Intrinsic::RegisterContinuation, 2, None);
                ctx.builder.ldc_bool(true);
                ctx.builder.ret();
                // Already completed: fall through to the continuation.
                ctx.builder.mark_label(resolved);
                self.load_field(ctx, "__awaiter");
                ctx.builder
                    .call_intrinsic(Intrinsic::PromiseResult, 1, Some(StackType::Ref));
                self.store_field_from_stack(ctx, SENT_VAR);
                ctx.builder.br(self.loop_top);
            }
            Transition::Return(argument) => {
                match argument {
                    Some(expr) => {
                        self.emitter.emit_expr(ctx, expr)?;
                        ctx.builder.ensure_boxed();
                    }
                    None => ctx.builder.ldc_undefined(),
                }
                // Route through enclosing finally regions.
                let finally = self
                    .machine
                    .handler_chain(index)
                    .into_iter()
                    .find(|&r| self.machine.handlers[r].finally_state.is_some());
                match finally {
                    Some(region) => {
                        self.store_field_from_stack(ctx, "__pendingValue");
                        ctx.builder.ld_arg(0);
                        ctx.builder.ldc_f64(pending::RETURN);
                        ctx.builder
                            .emit(Instr::StFld(self.fld("__pending")), 2, None);
                        let finally_state =
                            self.machine.handlers[region].finally_state.unwrap();
                        self.set_state(ctx, finally_state);
                        ctx.builder.br(self.loop_top);
                    }
                    None => {
                        self.store_field_from_stack(ctx, "__result");
                        self.set_state_value(ctx, STATE_DONE);
                        ctx.builder.ldc_bool(false);
                        ctx.builder.ret();
                    }
                }
            }
            Transition::FinallyEnd { region } => {
                self.emit_finally_end(ctx, *region);
            }
        }
        Ok(())
    }

    /// A jump crossing out of finally-bearing regions runs each finally
    /// in order with a pending-jump replay.
    fn emit_static_jump(&mut self, ctx: &mut FnCtx, from: usize, target: usize) {
        let target_chain = self.machine.handler_chain(target);
        let first_finally = self
            .machine
            .handler_chain(from)
            .into_iter()
            .take_while(|r| !target_chain.contains(r))
            .find(|&r| self.machine.handlers[r].finally_state.is_some());
        match first_finally {
            Some(region) => {
                ctx.builder.ld_arg(0);
                ctx.builder.ldc_f64(pending::JUMP);
                ctx.builder
                    .emit(Instr::StFld(self.fld("__pending")), 2, None);
                ctx.builder.ld_arg(0);
                ctx.builder.ldc_f64(target as f64);
                ctx.builder
                    .emit(Instr::StFld(self.fld("__pendingTarget")), 2, None);
                let finally_state = self.machine.handlers[region].finally_state.unwrap();
                self.set_state(ctx, finally_state);
            }
            None => {
                self.set_state(ctx, target);
            }
        }
        ctx.builder.br(self.loop_top);
    }

    /// Replay the pending completion at the end of a finally body.
    fn emit_finally_end(&mut self, ctx: &mut FnCtx, region: usize) {
        let handlers = &self.machine.handlers;
        let jump_case = ctx.builder.reserve_label();
        let return_case = ctx.builder.reserve_label();
        let throw_case = ctx.builder.reserve_label();

        // none -> exit state
        self.load_pending(ctx);
        ctx.builder.ldc_f64(pending::JUMP);
        ctx.builder.emit(Instr::CmpEq, 2, Some(StackType::Bool));
        ctx.builder.br_true(jump_case);
        self.load_pending(ctx);
        ctx.builder.ldc_f64(pending::RETURN);
        ctx.builder.emit(Instr::CmpEq, 2, Some(StackType::Bool));
        ctx.builder.br_true(return_case);
        self.load_pending(ctx);
        ctx.builder.ldc_f64(pending::THROW);
        ctx.builder.emit(Instr::CmpEq, 2, Some(StackType::Bool));
        ctx.builder.br_true(throw_case);
        self.set_state(ctx, handlers[region].exit_state);
        ctx.builder.br(self.loop_top);

        // jump -> next hop per precomputed route
        ctx.builder.mark_label(jump_case);
        let routes: Vec<(usize, JumpHop)> = self
            .jump_routes
            .iter()
            .filter(|((r, _), _)| *r == region)
            .map(|((_, target), hop)| (*target, *hop))
            .collect();
        for (target, hop) in routes {
            let next_check = ctx.builder.reserve_label();
            ctx.builder.ld_arg(0);
            ctx.builder.emit(
                Instr::LdFld(self.fld("__pendingTarget")),
                1,
                Some(StackType::Double),
            );
            ctx.builder.ldc_f64(target as f64);
            ctx.builder.emit(Instr::CmpEq, 2, Some(StackType::Bool));
            ctx.builder.br_false(next_check);
            match hop {
                JumpHop::Finally(finally_state) => {
                    self.set_state(ctx, finally_state);
                }
                JumpHop::Target(target) => {
                    self.clear_pending(ctx);
                    self.set_state(ctx, target);
                }
            }
            ctx.builder.br(self.loop_top);
            ctx.builder.mark_label(next_check);
        }
        // Unknown target: finish defensively.
        self.set_state_value(ctx, STATE_DONE);
        ctx.builder.ldc_bool(false);
        ctx.builder.ret();

        // return -> outer finally or completion
        ctx.builder.mark_label(return_case);
        let outer_finally = {
            let mut cursor = handlers[region].parent;
            let mut found = None;
            while let Some(idx) = cursor {
                if let Some(finally_state) = handlers[idx].finally_state {
                    found = Some(finally_state);
                    break;
                }
                cursor = handlers[idx].parent;
            }
            found
        };
        match outer_finally {
            Some(finally_state) => {
                self.set_state(ctx, finally_state);
                ctx.builder.br(self.loop_top);
            }
            None => {
                self.load_field(ctx, "__pendingValue");
                self.store_field_from_stack(ctx, "__result");
                self.clear_pending(ctx);
                self.set_state_value(ctx, STATE_DONE);
                ctx.builder.ldc_bool(false);
                ctx.builder.ret();
            }
        }

        // throw -> outer catch / finally / rethrow
        ctx.builder.mark_label(throw_case);
        let mut cursor = handlers[region].parent;
        loop {
            match cursor {
                Some(idx) => {
                    let handler = &handlers[idx];
                    if let Some(catch_state) = handler.catch_state {
                        if let Some(var) = handler.catch_var.clone() {
                            self.load_field(ctx, "__pendingValue");
                            self.store_field_from_stack(ctx, &var);
                        }
                        self.clear_pending(ctx);
                        self.set_state(ctx, catch_state);
                        ctx.builder.br(self.loop_top);
                        break;
                    }
                    if let Some(finally_state) = handler.finally_state {
                        self.set_state(ctx, finally_state);
                        ctx.builder.br(self.loop_top);
                        break;
                    }
                    cursor = handler.parent;
                }
                None => {
                    self.set_state_value(ctx, STATE_DONE);
                    self.load_field(ctx, "__pendingValue");
                    ctx.builder.emit(Instr::Rethrow, 1, None);
                    break;
                }
            }
        }
    }

    fn load_pending(&self, ctx: &mut FnCtx) {
        ctx.builder.ld_arg(0);
        ctx.builder.emit(
            Instr::LdFld(self.fld("__pending")),
            1,
            Some(StackType::Double),
        );
    }

    fn clear_pending(&self, ctx: &mut FnCtx) {
        ctx.builder.ld_arg(0);
        ctx.builder.ldc_f64(pending::NONE);
        ctx.builder
            .emit(Instr::StFld(self.fld("__pending")), 2, None);
    }
}
