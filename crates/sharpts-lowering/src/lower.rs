//! Flattening of coroutine bodies into machines.
//!
//! Statements with no suspension and no control transfer stay opaque
//! inside a state (the backends execute them natively). Control
//! structures that contain an `await`/`yield` — or a
//! `return`/`break`/`continue` that must route through the machine —
//! are flattened into states and transitions. Suspensions nested inside
//! expressions are lifted out through temporaries that preserve
//! evaluation order; short-circuit operators with a suspending
//! right-hand side lower to branches.

use sharpts_common::span::Span;
use sharpts_parser::ast::*;

use crate::machine::*;

/// Node ids for synthesized expressions live far above the parser's
/// range so side-table lookups never collide.
const SYNTH_NODE_BASE: NodeId = 0x8000_0000;

/// Lower a coroutine function body.
pub fn lower_coroutine(body: &[Stmt], kind: CoroKind) -> CoroMachine {
    let mut lowerer = Lowerer::new(kind);
    let start = lowerer.reserve();
    debug_assert_eq!(start, START_STATE);
    lowerer.begin(start);
    lowerer.lower_stmts(body);
    lowerer.finish(Transition::Return(None));
    tracing::debug!(
        states = lowerer.states.len(),
        regions = lowerer.handlers.len(),
        "lowered coroutine body"
    );
    CoroMachine {
        kind,
        states: lowerer
            .states
            .into_iter()
            .map(|s| {
                s.unwrap_or(CoroState {
                    stmts: Vec::new(),
                    transition: Transition::Return(None),
                    handler: None,
                })
            })
            .collect(),
        handlers: lowerer.handlers,
    }
}

/// Lower by function flags: async, generator, or both.
pub fn lower_function_body(body: &[Stmt], is_async: bool, is_generator: bool) -> CoroMachine {
    let kind = match (is_async, is_generator) {
        (true, true) => CoroKind::AsyncGenerator,
        (true, false) => CoroKind::Async,
        _ => CoroKind::Generator,
    };
    lower_coroutine(body, kind)
}

struct LoopCtx {
    label: Option<String>,
    /// `continue` target (`None` inside switch).
    continue_state: Option<usize>,
    /// `break` target.
    break_state: usize,
}

struct Lowerer {
    kind: CoroKind,
    states: Vec<Option<CoroState>>,
    handlers: Vec<HandlerRegion>,
    current: usize,
    current_stmts: Vec<Stmt>,
    current_handler: Option<usize>,
    loop_stack: Vec<LoopCtx>,
    pending_label: Option<String>,
    next_temp: u32,
    next_node: NodeId,
}

impl Lowerer {
    fn new(kind: CoroKind) -> Self {
        Lowerer {
            kind,
            states: Vec::new(),
            handlers: Vec::new(),
            current: 0,
            current_stmts: Vec::new(),
            current_handler: None,
            loop_stack: Vec::new(),
            pending_label: None,
            next_temp: 0,
            next_node: SYNTH_NODE_BASE,
        }
    }

    // =========================================================================
    // State plumbing
    // =========================================================================

    fn reserve(&mut self) -> usize {
        self.states.push(None);
        self.states.len() - 1
    }

    fn begin(&mut self, state: usize) {
        self.current = state;
        self.current_stmts = Vec::new();
    }

    fn finish(&mut self, transition: Transition) {
        let stmts = std::mem::take(&mut self.current_stmts);
        self.states[self.current] = Some(CoroState {
            stmts,
            transition,
            handler: self.current_handler,
        });
    }

    // =========================================================================
    // Synthesized AST helpers
    // =========================================================================

    fn mk(&mut self, kind: ExprKind) -> Expr {
        let id = self.next_node;
        self.next_node += 1;
        Expr {
            id,
            span: Span::dummy(),
            kind,
        }
    }

    fn ident(&mut self, name: &str) -> Expr {
        self.mk(ExprKind::Ident(name.to_string()))
    }

    fn undefined(&mut self) -> Expr {
        self.mk(ExprKind::Literal(Lit::Undefined))
    }

    fn member(&mut self, object: Expr, property: &str) -> Expr {
        self.mk(ExprKind::Member {
            object: Box::new(object),
            property: property.to_string(),
            optional: false,
        })
    }

    fn call(&mut self, callee: Expr, args: Vec<Expr>) -> Expr {
        self.mk(ExprKind::Call {
            callee: Box::new(callee),
            type_args: Vec::new(),
            args,
            optional: false,
        })
    }

    fn fresh_temp(&mut self) -> String {
        let n = self.next_temp;
        self.next_temp += 1;
        format!("__coro_{n}")
    }

    fn declare_stmt(&mut self, name: &str, init: Expr) -> Stmt {
        Stmt {
            span: Span::dummy(),
            kind: StmtKind::VarDecl {
                kind: VarKind::Let,
                declarations: vec![VarDeclarator {
                    span: Span::dummy(),
                    name: name.to_string(),
                    type_ann: None,
                    init: Some(init),
                }],
            },
        }
    }

    fn assign_stmt(&mut self, name: &str, value: Expr) -> Stmt {
        let target = self.ident(name);
        let assign = self.mk(ExprKind::Assign {
            op: AssignOp::Assign,
            target: Box::new(target),
            value: Box::new(value),
        });
        Stmt {
            span: Span::dummy(),
            kind: StmtKind::Expr(assign),
        }
    }

    /// Capture a value into a temporary unless it is already trivially
    /// re-evaluable.
    fn stash(&mut self, expr: Expr) -> Expr {
        match &expr.kind {
            ExprKind::Ident(_) | ExprKind::Literal(_) | ExprKind::This => expr,
            _ => {
                let temp = self.fresh_temp();
                let stmt = self.declare_stmt(&temp, expr);
                self.current_stmts.push(stmt);
                self.ident(&temp)
            }
        }
    }

    /// `expr[Symbol.iterator]()` (or asyncIterator).
    fn get_iterator(&mut self, iterable: Expr, is_async: bool) -> Expr {
        let symbol = self.ident("Symbol");
        let well_known = self.member(
            symbol,
            if is_async { "asyncIterator" } else { "iterator" },
        );
        let method = self.mk(ExprKind::Index {
            object: Box::new(iterable),
            index: Box::new(well_known),
            optional: false,
        });
        self.call(method, Vec::new())
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn lower_stmts(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.lower_stmt(stmt);
        }
    }

    fn lower_stmt(&mut self, stmt: &Stmt) {
        if !needs_flatten(stmt) {
            self.current_stmts.push(stmt.clone());
            return;
        }
        match &stmt.kind {
            StmtKind::Block(stmts) => self.lower_stmts(stmts),
            StmtKind::Expr(expr) => {
                let lowered = self.lift_expr(expr);
                self.current_stmts.push(Stmt {
                    span: stmt.span,
                    kind: StmtKind::Expr(lowered),
                });
            }
            StmtKind::VarDecl { kind, declarations } => {
                for declarator in declarations {
                    let init = declarator.init.as_ref().map(|e| self.lift_expr(e));
                    self.current_stmts.push(Stmt {
                        span: declarator.span,
                        kind: StmtKind::VarDecl {
                            kind: *kind,
                            declarations: vec![VarDeclarator {
                                span: declarator.span,
                                name: declarator.name.clone(),
                                type_ann: declarator.type_ann.clone(),
                                init,
                            }],
                        },
                    });
                }
            }
            StmtKind::Return(argument) => {
                let lowered = argument.as_ref().map(|e| self.lift_expr(e));
                self.finish(Transition::Return(lowered));
                let dead = self.reserve();
                self.begin(dead);
            }
            StmtKind::Throw(value) => {
                let lowered = self.lift_expr(value);
                self.current_stmts.push(Stmt {
                    span: stmt.span,
                    kind: StmtKind::Throw(lowered),
                });
            }
            StmtKind::Break(label) => {
                let target = self.find_break_target(label.as_deref());
                if let Some(target) = target {
                    self.finish(Transition::Jump(target));
                    let dead = self.reserve();
                    self.begin(dead);
                }
            }
            StmtKind::Continue(label) => {
                let target = self.find_continue_target(label.as_deref());
                if let Some(target) = target {
                    self.finish(Transition::Jump(target));
                    let dead = self.reserve();
                    self.begin(dead);
                }
            }
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let cond = self.lift_expr(cond);
                let then_state = self.reserve();
                let exit = self.reserve();
                let else_state = if else_branch.is_some() {
                    self.reserve()
                } else {
                    exit
                };
                self.finish(Transition::Branch {
                    cond,
                    then_state,
                    else_state,
                });
                self.begin(then_state);
                self.lower_stmt(then_branch);
                self.finish(Transition::Jump(exit));
                if let Some(else_branch) = else_branch {
                    self.begin(else_state);
                    self.lower_stmt(else_branch);
                    self.finish(Transition::Jump(exit));
                }
                self.begin(exit);
            }
            StmtKind::While { cond, body } => {
                let label = self.pending_label.take();
                let head = self.reserve();
                let body_state = self.reserve();
                let exit = self.reserve();
                self.finish(Transition::Jump(head));
                self.begin(head);
                let cond = self.lift_expr(cond);
                self.finish(Transition::Branch {
                    cond,
                    then_state: body_state,
                    else_state: exit,
                });
                self.loop_stack.push(LoopCtx {
                    label,
                    continue_state: Some(head),
                    break_state: exit,
                });
                self.begin(body_state);
                self.lower_stmt(body);
                self.finish(Transition::Jump(head));
                self.loop_stack.pop();
                self.begin(exit);
            }
            StmtKind::DoWhile { body, cond } => {
                let label = self.pending_label.take();
                let body_state = self.reserve();
                let cond_state = self.reserve();
                let exit = self.reserve();
                self.finish(Transition::Jump(body_state));
                self.loop_stack.push(LoopCtx {
                    label,
                    continue_state: Some(cond_state),
                    break_state: exit,
                });
                self.begin(body_state);
                self.lower_stmt(body);
                self.finish(Transition::Jump(cond_state));
                self.loop_stack.pop();
                self.begin(cond_state);
                let cond = self.lift_expr(cond);
                self.finish(Transition::Branch {
                    cond,
                    then_state: body_state,
                    else_state: exit,
                });
                self.begin(exit);
            }
            StmtKind::ForOf {
                binding,
                iterable,
                body,
                is_await,
                ..
            } => self.lower_for_of(binding, iterable, body, *is_await),
            StmtKind::ForIn {
                binding,
                object,
                body,
                ..
            } => self.lower_for_in(binding, object, body),
            StmtKind::Switch {
                discriminant,
                cases,
            } => self.lower_switch(discriminant, cases),
            StmtKind::Labeled { label, body } => {
                if matches!(
                    body.kind,
                    StmtKind::While { .. }
                        | StmtKind::DoWhile { .. }
                        | StmtKind::ForOf { .. }
                        | StmtKind::ForIn { .. }
                ) {
                    self.pending_label = Some(label.clone());
                    self.lower_stmt(body);
                } else {
                    let exit = self.reserve();
                    self.loop_stack.push(LoopCtx {
                        label: Some(label.clone()),
                        continue_state: None,
                        break_state: exit,
                    });
                    self.lower_stmt(body);
                    self.finish(Transition::Jump(exit));
                    self.loop_stack.pop();
                    self.begin(exit);
                }
            }
            StmtKind::Try {
                block,
                catch,
                finally,
            } => self.lower_try(block, catch.as_ref(), finally.as_deref()),
            // Declarations and the remaining statement kinds carry no
            // suspensions of their own.
            _ => self.current_stmts.push(stmt.clone()),
        }
    }

    fn find_break_target(&self, label: Option<&str>) -> Option<usize> {
        for ctx in self.loop_stack.iter().rev() {
            match label {
                Some(label) => {
                    if ctx.label.as_deref() == Some(label) {
                        return Some(ctx.break_state);
                    }
                }
                None => return Some(ctx.break_state),
            }
        }
        None
    }

    fn find_continue_target(&self, label: Option<&str>) -> Option<usize> {
        for ctx in self.loop_stack.iter().rev() {
            let matches_label = match label {
                Some(label) => ctx.label.as_deref() == Some(label),
                None => true,
            };
            if matches_label {
                if let Some(target) = ctx.continue_state {
                    return Some(target);
                }
                if label.is_none() {
                    continue; // switch: plain continue targets the loop outside
                }
            }
        }
        None
    }

    fn lower_for_of(&mut self, binding: &str, iterable: &Expr, body: &Stmt, is_await: bool) {
        let label = self.pending_label.take();
        let iterable = self.lift_expr(iterable);
        let iterator = self.get_iterator(iterable, is_await);
        let it_temp = self.fresh_temp();
        let decl = self.declare_stmt(&it_temp, iterator);
        self.current_stmts.push(decl);

        let head = self.reserve();
        let body_state = self.reserve();
        let exit = self.reserve();
        let result_temp = self.fresh_temp();

        self.finish(Transition::Jump(head));

        // head: result = [await] it.next(); branch on result.done
        self.begin(head);
        let it = self.ident(&it_temp);
        let next = self.member(it, "next");
        let step = self.call(next, Vec::new());
        if is_await {
            let resume = self.reserve();
            self.finish(Transition::Await {
                value: step,
                resume,
            });
            self.begin(resume);
            let sent = self.ident(SENT_VAR);
            let stmt = self.declare_stmt(&result_temp, sent);
            self.current_stmts.push(stmt);
        } else {
            let stmt = self.declare_stmt(&result_temp, step);
            self.current_stmts.push(stmt);
        }
        let result = self.ident(&result_temp);
        let done = self.member(result, "done");
        self.finish(Transition::Branch {
            cond: done,
            then_state: exit,
            else_state: body_state,
        });

        self.loop_stack.push(LoopCtx {
            label,
            continue_state: Some(head),
            break_state: exit,
        });
        self.begin(body_state);
        let result = self.ident(&result_temp);
        let value = self.member(result, "value");
        let bind = self.declare_stmt(binding, value);
        self.current_stmts.push(bind);
        self.lower_stmt(body);
        self.finish(Transition::Jump(head));
        self.loop_stack.pop();
        self.begin(exit);
    }

    fn lower_for_in(&mut self, binding: &str, object: &Expr, body: &Stmt) {
        let label = self.pending_label.take();
        let object = self.lift_expr(object);
        let object_global = self.ident("Object");
        let keys_fn = self.member(object_global, "keys");
        let keys = self.call(keys_fn, vec![object]);
        let keys_temp = self.fresh_temp();
        let keys_decl = self.declare_stmt(&keys_temp, keys);
        self.current_stmts.push(keys_decl);
        let index_temp = self.fresh_temp();
        let zero = self.mk(ExprKind::Literal(Lit::Number(0.0)));
        let index_decl = self.declare_stmt(&index_temp, zero);
        self.current_stmts.push(index_decl);

        let head = self.reserve();
        let body_state = self.reserve();
        let exit = self.reserve();
        self.finish(Transition::Jump(head));

        self.begin(head);
        let index = self.ident(&index_temp);
        let keys_ref = self.ident(&keys_temp);
        let length = self.member(keys_ref, "length");
        let cond = self.mk(ExprKind::Binary {
            op: BinaryOp::Lt,
            left: Box::new(index),
            right: Box::new(length),
        });
        self.finish(Transition::Branch {
            cond,
            then_state: body_state,
            else_state: exit,
        });

        self.loop_stack.push(LoopCtx {
            label,
            continue_state: Some(head),
            break_state: exit,
        });
        self.begin(body_state);
        // binding = keys[i]; i = i + 1; then the body (so `continue`
        // re-enters at the condition with the index already advanced).
        let keys_ref = self.ident(&keys_temp);
        let index = self.ident(&index_temp);
        let element = self.mk(ExprKind::Index {
            object: Box::new(keys_ref),
            index: Box::new(index),
            optional: false,
        });
        let bind = self.declare_stmt(binding, element);
        self.current_stmts.push(bind);
        let index = self.ident(&index_temp);
        let one = self.mk(ExprKind::Literal(Lit::Number(1.0)));
        let incremented = self.mk(ExprKind::Binary {
            op: BinaryOp::Add,
            left: Box::new(index),
            right: Box::new(one),
        });
        let advance = self.assign_stmt(&index_temp, incremented);
        self.current_stmts.push(advance);
        self.lower_stmt(body);
        self.finish(Transition::Jump(head));
        self.loop_stack.pop();
        self.begin(exit);
    }

    fn lower_switch(&mut self, discriminant: &Expr, cases: &[SwitchCase]) {
        let label = self.pending_label.take();
        let discriminant = self.lift_expr(discriminant);
        let disc_temp = self.fresh_temp();
        let decl = self.declare_stmt(&disc_temp, discriminant);
        self.current_stmts.push(decl);

        let exit = self.reserve();
        let case_states: Vec<usize> = cases.iter().map(|_| self.reserve()).collect();

        // Comparison chain; the default clause is the final fallback.
        let default_target = cases
            .iter()
            .position(|c| c.test.is_none())
            .map(|i| case_states[i])
            .unwrap_or(exit);
        for (i, case) in cases.iter().enumerate() {
            let Some(test) = &case.test else { continue };
            let test = self.lift_expr(test);
            let disc = self.ident(&disc_temp);
            let cond = self.mk(ExprKind::Binary {
                op: BinaryOp::StrictEq,
                left: Box::new(disc),
                right: Box::new(test),
            });
            let next_cmp = self.reserve();
            self.finish(Transition::Branch {
                cond,
                then_state: case_states[i],
                else_state: next_cmp,
            });
            self.begin(next_cmp);
        }
        self.finish(Transition::Jump(default_target));

        // Case bodies fall through to the next case.
        self.loop_stack.push(LoopCtx {
            label,
            continue_state: None,
            break_state: exit,
        });
        for (i, case) in cases.iter().enumerate() {
            self.begin(case_states[i]);
            self.lower_stmts(&case.body);
            let fallthrough = case_states.get(i + 1).copied().unwrap_or(exit);
            self.finish(Transition::Jump(fallthrough));
        }
        self.loop_stack.pop();
        self.begin(exit);
    }

    /// try/catch/finally split at suspension points. A region with both
    /// a catch and a finally behaves as two nested regions: the finally
    /// region wraps the catch region, so exceptions raised in the catch
    /// body still run the finally.
    fn lower_try(
        &mut self,
        block: &[Stmt],
        catch: Option<&CatchClause>,
        finally: Option<&[Stmt]>,
    ) {
        let saved_handler = self.current_handler;
        let exit = self.reserve();
        let finally_state = finally.map(|_| self.reserve());
        let catch_state = catch.map(|_| self.reserve());

        let outer = finally_state.map(|fs| {
            let idx = self.handlers.len();
            self.handlers.push(HandlerRegion {
                parent: saved_handler,
                catch_state: None,
                catch_var: None,
                finally_state: Some(fs),
                exit_state: exit,
            });
            idx
        });
        let inner = catch_state.map(|cs| {
            let idx = self.handlers.len();
            self.handlers.push(HandlerRegion {
                parent: outer.or(saved_handler),
                catch_state: Some(cs),
                catch_var: catch.and_then(|c| c.param.clone()),
                finally_state: None,
                exit_state: exit,
            });
            idx
        });

        let after_body = finally_state.unwrap_or(exit);

        let body_state = self.reserve();
        self.finish(Transition::Jump(body_state));
        self.begin(body_state);
        self.current_handler = inner.or(outer);
        self.lower_stmts(block);
        self.finish(Transition::Jump(after_body));

        if let (Some(catch_state), Some(catch)) = (catch_state, catch) {
            self.begin(catch_state);
            self.current_handler = outer.or(saved_handler);
            self.lower_stmts(&catch.body);
            self.finish(Transition::Jump(after_body));
        }

        if let (Some(finally_state), Some(finally)) = (finally_state, finally) {
            self.begin(finally_state);
            self.current_handler = saved_handler;
            self.lower_stmts(finally);
            self.finish(Transition::FinallyEnd {
                region: outer.expect("finally implies an outer region"),
            });
        }

        self.begin(exit);
        self.current_handler = saved_handler;
    }

    // =========================================================================
    // Expression lifting
    // =========================================================================

    /// Rewrite an expression so every suspension becomes a state split,
    /// preserving evaluation order through temporaries.
    fn lift_expr(&mut self, expr: &Expr) -> Expr {
        if !contains_suspension_expr(expr) {
            return expr.clone();
        }
        match &expr.kind {
            ExprKind::Await(operand) => {
                let value = self.lift_expr(operand);
                self.suspend(SuspendKind::Await, value)
            }
            ExprKind::Yield {
                argument,
                delegate: false,
            } => {
                let value = match argument {
                    Some(argument) => self.lift_expr(argument),
                    None => self.undefined(),
                };
                self.suspend(SuspendKind::Yield, value)
            }
            ExprKind::Yield {
                argument,
                delegate: true,
            } => {
                let value = match argument {
                    Some(argument) => self.lift_expr(argument),
                    None => self.undefined(),
                };
                self.lower_yield_delegate(value)
            }
            ExprKind::Paren(inner) => {
                let inner = self.lift_expr(inner);
                self.mk(ExprKind::Paren(Box::new(inner)))
            }
            ExprKind::Unary { op, operand } => {
                let operand = self.lift_expr(operand);
                self.mk(ExprKind::Unary {
                    op: *op,
                    operand: Box::new(operand),
                })
            }
            ExprKind::TypeAssertion { expr: inner, ty } => {
                let inner = self.lift_expr(inner);
                self.mk(ExprKind::TypeAssertion {
                    expr: Box::new(inner),
                    ty: ty.clone(),
                })
            }
            ExprKind::NonNull(inner) => {
                let inner = self.lift_expr(inner);
                self.mk(ExprKind::NonNull(Box::new(inner)))
            }
            ExprKind::Spread(inner) => {
                let inner = self.lift_expr(inner);
                self.mk(ExprKind::Spread(Box::new(inner)))
            }
            ExprKind::Binary { op, left, right } => {
                if contains_suspension_expr(right) {
                    let left = self.lift_expr(left);
                    let left = self.stash(left);
                    let right = self.lift_expr(right);
                    self.mk(ExprKind::Binary {
                        op: *op,
                        left: Box::new(left),
                        right: Box::new(right),
                    })
                } else {
                    let left = self.lift_expr(left);
                    self.mk(ExprKind::Binary {
                        op: *op,
                        left: Box::new(left),
                        right: Box::new(right.as_ref().clone()),
                    })
                }
            }
            ExprKind::Logical { op, left, right } => {
                if !contains_suspension_expr(right) {
                    let left = self.lift_expr(left);
                    return self.mk(ExprKind::Logical {
                        op: *op,
                        left: Box::new(left),
                        right: Box::new(right.as_ref().clone()),
                    });
                }
                // Short-circuit with a suspending right side: branch.
                let left = self.lift_expr(left);
                let result = self.fresh_temp();
                let decl = self.declare_stmt(&result, left);
                self.current_stmts.push(decl);
                let eval_right = self.reserve();
                let exit = self.reserve();
                let result_ref = self.ident(&result);
                let cond = match op {
                    LogicalOp::And => result_ref,
                    LogicalOp::Or => self.mk(ExprKind::Unary {
                        op: UnaryOp::Not,
                        operand: Box::new(result_ref),
                    }),
                    LogicalOp::Nullish => {
                        let null = self.mk(ExprKind::Literal(Lit::Null));
                        self.mk(ExprKind::Binary {
                            op: BinaryOp::Eq,
                            left: Box::new(result_ref),
                            right: Box::new(null),
                        })
                    }
                };
                self.finish(Transition::Branch {
                    cond,
                    then_state: eval_right,
                    else_state: exit,
                });
                self.begin(eval_right);
                let right = self.lift_expr(right);
                let assign = self.assign_stmt(&result, right);
                self.current_stmts.push(assign);
                self.finish(Transition::Jump(exit));
                self.begin(exit);
                self.ident(&result)
            }
            ExprKind::Conditional {
                cond,
                consequent,
                alternate,
            } => {
                let cond = self.lift_expr(cond);
                let result = self.fresh_temp();
                let undefined = self.undefined();
                let decl = self.declare_stmt(&result, undefined);
                self.current_stmts.push(decl);
                let then_state = self.reserve();
                let else_state = self.reserve();
                let exit = self.reserve();
                self.finish(Transition::Branch {
                    cond,
                    then_state,
                    else_state,
                });
                self.begin(then_state);
                let value = self.lift_expr(consequent);
                let assign = self.assign_stmt(&result, value);
                self.current_stmts.push(assign);
                self.finish(Transition::Jump(exit));
                self.begin(else_state);
                let value = self.lift_expr(alternate);
                let assign = self.assign_stmt(&result, value);
                self.current_stmts.push(assign);
                self.finish(Transition::Jump(exit));
                self.begin(exit);
                self.ident(&result)
            }
            ExprKind::Call {
                callee,
                type_args,
                args,
                optional,
            } => {
                let later_suspends = args.iter().any(contains_suspension_expr);
                // Keep method receivers as member callees so `this`
                // binding survives; only the receiver object is stashed.
                let callee = match &callee.kind {
                    ExprKind::Member {
                        object,
                        property,
                        optional: member_optional,
                    } => {
                        let object = self.lift_expr(object);
                        let object = if later_suspends {
                            self.stash(object)
                        } else {
                            object
                        };
                        self.mk(ExprKind::Member {
                            object: Box::new(object),
                            property: property.clone(),
                            optional: *member_optional,
                        })
                    }
                    _ => {
                        let lowered = self.lift_expr(callee);
                        if later_suspends {
                            self.stash(lowered)
                        } else {
                            lowered
                        }
                    }
                };
                let args = self.lift_args(args);
                self.mk(ExprKind::Call {
                    callee: Box::new(callee),
                    type_args: type_args.clone(),
                    args,
                    optional: *optional,
                })
            }
            ExprKind::New {
                callee,
                type_args,
                args,
            } => {
                let callee = self.lift_expr(callee);
                let callee = self.stash(callee);
                let args = self.lift_args(args);
                self.mk(ExprKind::New {
                    callee: Box::new(callee),
                    type_args: type_args.clone(),
                    args,
                })
            }
            ExprKind::Member {
                object,
                property,
                optional,
            } => {
                let object = self.lift_expr(object);
                self.mk(ExprKind::Member {
                    object: Box::new(object),
                    property: property.clone(),
                    optional: *optional,
                })
            }
            ExprKind::Index {
                object,
                index,
                optional,
            } => {
                let object = self.lift_expr(object);
                let object = if contains_suspension_expr(index) {
                    self.stash(object)
                } else {
                    object
                };
                let index = self.lift_expr(index);
                self.mk(ExprKind::Index {
                    object: Box::new(object),
                    index: Box::new(index),
                    optional: *optional,
                })
            }
            ExprKind::Assign { op, target, value } => {
                let value = self.lift_expr(value);
                self.mk(ExprKind::Assign {
                    op: *op,
                    target: target.clone(),
                    value: Box::new(value),
                })
            }
            ExprKind::Array(elements) => {
                let elements = self.lift_args(elements);
                self.mk(ExprKind::Array(elements))
            }
            ExprKind::Object(props) => {
                let mut lowered = Vec::with_capacity(props.len());
                for prop in props {
                    let value = match &prop.value {
                        ObjectPropValue::Value(value) => {
                            let value = self.lift_expr(value);
                            let value = self.stash(value);
                            ObjectPropValue::Value(value)
                        }
                        ObjectPropValue::Spread(inner) => {
                            let inner = self.lift_expr(inner);
                            ObjectPropValue::Spread(inner)
                        }
                        other => other.clone(),
                    };
                    lowered.push(ObjectProp {
                        span: prop.span,
                        key: prop.key.clone(),
                        value,
                    });
                }
                self.mk(ExprKind::Object(lowered))
            }
            ExprKind::Template { quasis, exprs } => {
                let exprs = self.lift_args(exprs);
                self.mk(ExprKind::Template {
                    quasis: quasis.clone(),
                    exprs,
                })
            }
            ExprKind::Sequence(parts) => {
                let mut last = self.undefined();
                for part in parts {
                    last = self.lift_expr(part);
                }
                last
            }
            // No suspension can hide below these.
            _ => expr.clone(),
        }
    }

    /// Lift a list of expressions in order, stashing earlier values
    /// whenever a later one suspends.
    fn lift_args(&mut self, args: &[Expr]) -> Vec<Expr> {
        let mut lowered = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            let later_suspends = args[i + 1..].iter().any(contains_suspension_expr);
            let value = self.lift_expr(arg);
            lowered.push(if later_suspends {
                self.stash(value)
            } else {
                value
            });
        }
        lowered
    }

    fn suspend(&mut self, kind: SuspendKind, value: Expr) -> Expr {
        let resume = self.reserve();
        let transition = match kind {
            SuspendKind::Await => Transition::Await { value, resume },
            SuspendKind::Yield => Transition::Yield { value, resume },
        };
        self.finish(transition);
        self.begin(resume);
        let temp = self.fresh_temp();
        let sent = self.ident(SENT_VAR);
        let decl = self.declare_stmt(&temp, sent);
        self.current_stmts.push(decl);
        self.ident(&temp)
    }

    /// `yield* inner` forwards values and the final done-value:
    /// resumes feed the inner iterator's `next`.
    fn lower_yield_delegate(&mut self, inner: Expr) -> Expr {
        let is_async = self.kind == CoroKind::AsyncGenerator;
        let iterator = self.get_iterator(inner, is_async);
        let it_temp = self.fresh_temp();
        let decl = self.declare_stmt(&it_temp, iterator);
        self.current_stmts.push(decl);
        let sent_temp = self.fresh_temp();
        let undefined = self.undefined();
        let decl = self.declare_stmt(&sent_temp, undefined);
        self.current_stmts.push(decl);

        let head = self.reserve();
        let yield_state = self.reserve();
        let exit = self.reserve();
        let result_temp = self.fresh_temp();

        self.finish(Transition::Jump(head));

        // head: result = [await] it.next(sent)
        self.begin(head);
        let it = self.ident(&it_temp);
        let next = self.member(it, "next");
        let sent_arg = self.ident(&sent_temp);
        let step = self.call(next, vec![sent_arg]);
        if is_async {
            let resume = self.reserve();
            self.finish(Transition::Await {
                value: step,
                resume,
            });
            self.begin(resume);
            let sent = self.ident(SENT_VAR);
            let stmt = self.declare_stmt(&result_temp, sent);
            self.current_stmts.push(stmt);
        } else {
            let stmt = self.declare_stmt(&result_temp, step);
            self.current_stmts.push(stmt);
        }
        let result = self.ident(&result_temp);
        let done = self.member(result, "done");
        self.finish(Transition::Branch {
            cond: done,
            then_state: exit,
            else_state: yield_state,
        });

        // yield_state: sent = yield result.value
        self.begin(yield_state);
        let result = self.ident(&result_temp);
        let value = self.member(result, "value");
        let resume = self.reserve();
        self.finish(Transition::Yield {
            value,
            resume,
        });
        self.begin(resume);
        let sent = self.ident(SENT_VAR);
        let assign = self.assign_stmt(&sent_temp, sent);
        self.current_stmts.push(assign);
        self.finish(Transition::Jump(head));

        // exit: the delegate expression's value is result.value.
        self.begin(exit);
        let result = self.ident(&result_temp);
        self.member(result, "value")
    }
}

#[derive(Clone, Copy)]
enum SuspendKind {
    Await,
    Yield,
}

// =============================================================================
// Suspension / control-transfer analysis
// =============================================================================

/// Whether a statement must be flattened into machine states: it
/// contains a suspension, or a control transfer that must route through
/// the machine.
pub fn needs_flatten(stmt: &Stmt) -> bool {
    contains_suspension(stmt) || contains_control_transfer(stmt)
}

pub fn contains_suspension(stmt: &Stmt) -> bool {
    stmt_walk(stmt, &|expr| {
        matches!(expr.kind, ExprKind::Await(_) | ExprKind::Yield { .. })
    })
}

fn contains_control_transfer(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::Return(_) | StmtKind::Break(_) | StmtKind::Continue(_) => true,
        StmtKind::Block(stmts) => stmts.iter().any(contains_control_transfer),
        StmtKind::If {
            then_branch,
            else_branch,
            ..
        } => {
            contains_control_transfer(then_branch)
                || else_branch
                    .as_deref()
                    .is_some_and(contains_control_transfer)
        }
        StmtKind::While { body, .. }
        | StmtKind::DoWhile { body, .. }
        | StmtKind::ForIn { body, .. }
        | StmtKind::ForOf { body, .. }
        | StmtKind::Labeled { body, .. } => contains_control_transfer(body),
        StmtKind::Try {
            block,
            catch,
            finally,
        } => {
            block.iter().any(contains_control_transfer)
                || catch
                    .as_ref()
                    .is_some_and(|c| c.body.iter().any(contains_control_transfer))
                || finally
                    .as_deref()
                    .is_some_and(|f| f.iter().any(contains_control_transfer))
        }
        StmtKind::Switch { cases, .. } => cases
            .iter()
            .any(|c| c.body.iter().any(contains_control_transfer)),
        _ => false,
    }
}

pub fn contains_suspension_expr(expr: &Expr) -> bool {
    expr_walk(expr, &|e| {
        matches!(e.kind, ExprKind::Await(_) | ExprKind::Yield { .. })
    })
}

/// Walk statements and their expressions, not descending into nested
/// function bodies (their suspensions belong to their own machines).
fn stmt_walk(stmt: &Stmt, probe: &dyn Fn(&Expr) -> bool) -> bool {
    let expr_hit = |e: &Expr| expr_walk(e, probe);
    match &stmt.kind {
        StmtKind::VarDecl { declarations, .. } => declarations
            .iter()
            .any(|d| d.init.as_ref().is_some_and(|e| expr_hit(e))),
        StmtKind::Expr(expr) | StmtKind::Throw(expr) | StmtKind::Return(Some(expr)) => {
            expr_hit(expr)
        }
        StmtKind::Block(stmts) => stmts.iter().any(|s| stmt_walk(s, probe)),
        StmtKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            expr_hit(cond)
                || stmt_walk(then_branch, probe)
                || else_branch.as_deref().is_some_and(|s| stmt_walk(s, probe))
        }
        StmtKind::While { cond, body } | StmtKind::DoWhile { body, cond } => {
            expr_hit(cond) || stmt_walk(body, probe)
        }
        StmtKind::ForIn { object, body, .. } => expr_hit(object) || stmt_walk(body, probe),
        StmtKind::ForOf {
            iterable,
            body,
            is_await,
            ..
        } => *is_await || expr_hit(iterable) || stmt_walk(body, probe),
        StmtKind::Labeled { body, .. } => stmt_walk(body, probe),
        StmtKind::Try {
            block,
            catch,
            finally,
        } => {
            block.iter().any(|s| stmt_walk(s, probe))
                || catch
                    .as_ref()
                    .is_some_and(|c| c.body.iter().any(|s| stmt_walk(s, probe)))
                || finally
                    .as_deref()
                    .is_some_and(|f| f.iter().any(|s| stmt_walk(s, probe)))
        }
        StmtKind::Switch {
            discriminant,
            cases,
        } => {
            expr_hit(discriminant)
                || cases.iter().any(|c| {
                    c.test.as_ref().is_some_and(|e| expr_hit(e))
                        || c.body.iter().any(|s| stmt_walk(s, probe))
                })
        }
        _ => false,
    }
}

fn expr_walk(expr: &Expr, probe: &dyn Fn(&Expr) -> bool) -> bool {
    if probe(expr) {
        return true;
    }
    let hit = |e: &Expr| expr_walk(e, probe);
    match &expr.kind {
        ExprKind::Paren(inner)
        | ExprKind::NonNull(inner)
        | ExprKind::Spread(inner)
        | ExprKind::Await(inner) => hit(inner),
        ExprKind::Unary { operand, .. } | ExprKind::Update { operand, .. } => hit(operand),
        ExprKind::TypeAssertion { expr: inner, .. } => hit(inner),
        ExprKind::Yield { argument, .. } => {
            argument.as_deref().is_some_and(hit)
        }
        ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
            hit(left) || hit(right)
        }
        ExprKind::Assign { target, value, .. } => hit(target) || hit(value),
        ExprKind::Conditional {
            cond,
            consequent,
            alternate,
        } => hit(cond) || hit(consequent) || hit(alternate),
        ExprKind::Call { callee, args, .. } => hit(callee) || args.iter().any(hit),
        ExprKind::New { callee, args, .. } => hit(callee) || args.iter().any(hit),
        ExprKind::Member { object, .. } => hit(object),
        ExprKind::Index { object, index, .. } => hit(object) || hit(index),
        ExprKind::Array(elements) => elements.iter().any(hit),
        ExprKind::Object(props) => props.iter().any(|p| match &p.value {
            ObjectPropValue::Value(value) => hit(value),
            ObjectPropValue::Spread(inner) => hit(inner),
            _ => false,
        }),
        ExprKind::Template { exprs, .. } => exprs.iter().any(hit),
        ExprKind::Sequence(parts) => parts.iter().any(hit),
        // Nested function bodies own their suspensions.
        ExprKind::Arrow { .. } | ExprKind::FunctionExpr { .. } | ExprKind::ClassExpr(_) => false,
        _ => false,
    }
}
