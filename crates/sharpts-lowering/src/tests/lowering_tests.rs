//! State-machine lowering shape tests.

use sharpts_parser::ast::{Stmt, StmtKind};
use sharpts_parser::parse_source;

use crate::machine::*;
use crate::{lower_coroutine, lower_function_body};

/// Extract the body statements of the first function in a snippet.
fn body_of(source: &str) -> Vec<Stmt> {
    let program = parse_source(source).expect("parse failed");
    for stmt in program.statements {
        if let StmtKind::Function(f) = stmt.kind {
            return f.body.expect("function has a body");
        }
    }
    panic!("no function found");
}

fn count_transitions(machine: &CoroMachine, mut probe: impl FnMut(&Transition) -> bool) -> usize {
    machine
        .states
        .iter()
        .filter(|s| probe(&s.transition))
        .count()
}

#[test]
fn straight_line_async_body_has_one_await_per_suspension() {
    let body = body_of("async function f() { let a = await p; let b = await q; return a; }");
    let machine = lower_function_body(&body, true, false);
    assert_eq!(machine.kind, CoroKind::Async);
    assert_eq!(
        count_transitions(&machine, |t| matches!(t, Transition::Await { .. })),
        2
    );
    // Every await names a resume state within bounds.
    for state in &machine.states {
        if let Transition::Await { resume, .. } = state.transition {
            assert!(resume < machine.states.len());
        }
    }
}

#[test]
fn generator_yields_become_yield_transitions() {
    let body = body_of("function* g(n: number) { let i = 0; while (i < n) { yield i; i = i + 1; } }");
    let machine = lower_function_body(&body, false, true);
    assert_eq!(machine.kind, CoroKind::Generator);
    assert_eq!(
        count_transitions(&machine, |t| matches!(t, Transition::Yield { .. })),
        1
    );
    // The loop produces a branch back-edge.
    assert!(count_transitions(&machine, |t| matches!(t, Transition::Branch { .. })) >= 1);
}

#[test]
fn loop_containing_yield_is_flattened_with_backedge() {
    let body = body_of("function* g() { for (let i = 0; i < 3; i++) yield i; }");
    let machine = lower_function_body(&body, false, true);
    // The C-style for was desugared to a while by the parser; the yield
    // inside forces flattening: there must be a jump or branch whose
    // target precedes it (the back edge).
    let mut has_back_edge = false;
    for (index, state) in machine.states.iter().enumerate() {
        let targets: Vec<usize> = match &state.transition {
            Transition::Jump(t) => vec![*t],
            Transition::Branch {
                then_state,
                else_state,
                ..
            } => vec![*then_state, *else_state],
            Transition::Yield { resume, .. } | Transition::Await { resume, .. } => vec![*resume],
            _ => Vec::new(),
        };
        if targets.iter().any(|&t| t <= index) {
            has_back_edge = true;
        }
    }
    assert!(has_back_edge, "flattened loop must contain a back edge");
}

#[test]
fn non_suspending_statements_stay_opaque() {
    let body = body_of(
        "async function f() { let a = 1; let b = a + 2; console.log(b); let c = await p; return c; }",
    );
    let machine = lower_function_body(&body, true, false);
    // The three leading statements stay together in the start state.
    assert!(machine.states[START_STATE].stmts.len() >= 3);
}

#[test]
fn try_with_suspension_builds_region_table() {
    let body = body_of(
        "async function f() { try { await p; } catch (e) { console.log(e); } finally { console.log(1); } }",
    );
    let machine = lower_function_body(&body, true, false);
    // finally wraps catch: two regions.
    assert_eq!(machine.handlers.len(), 2);
    let finally_region = machine
        .handlers
        .iter()
        .find(|r| r.finally_state.is_some())
        .expect("finally region");
    assert!(finally_region.catch_state.is_none());
    let catch_region = machine
        .handlers
        .iter()
        .find(|r| r.catch_state.is_some())
        .expect("catch region");
    assert_eq!(catch_region.catch_var.as_deref(), Some("e"));
    // The catch region nests inside the finally region.
    assert!(catch_region.parent.is_some());
    // The await state is covered by the catch region.
    let await_state = machine
        .states
        .iter()
        .position(|s| matches!(s.transition, Transition::Await { .. }))
        .expect("await state");
    let chain = machine.handler_chain(await_state);
    assert!(chain.len() == 2);
    // And the finally block ends in a pending-completion replay.
    assert_eq!(
        count_transitions(&machine, |t| matches!(t, Transition::FinallyEnd { .. })),
        1
    );
}

#[test]
fn return_inside_try_routes_through_finally_at_runtime() {
    let body = body_of(
        "async function f() { try { return await p; } finally { console.log(1); } }",
    );
    let machine = lower_function_body(&body, true, false);
    // The return transition exists and its state is covered by the
    // finally region, so the driver replays it after the finally body.
    let return_state = machine
        .states
        .iter()
        .position(|s| matches!(s.transition, Transition::Return(Some(_))))
        .expect("return state");
    let chain = machine.handler_chain(return_state);
    assert!(
        chain
            .iter()
            .any(|&r| machine.handlers[r].finally_state.is_some())
    );
}

#[test]
fn await_inside_expression_is_lifted_in_order() {
    let body = body_of("async function f() { let s = before() + (await p); return s; }");
    let machine = lower_function_body(&body, true, false);
    // The left operand is captured before the suspension.
    let start = &machine.states[START_STATE];
    assert!(
        start
            .stmts
            .iter()
            .any(|s| matches!(&s.kind, StmtKind::VarDecl { .. })),
        "left operand must be stashed before the await"
    );
    assert!(matches!(start.transition, Transition::Await { .. }));
}

#[test]
fn for_await_of_lowers_to_iterator_protocol() {
    let body = body_of("async function f(xs: any) { for await (const v of xs) { console.log(v); } }");
    let machine = lower_function_body(&body, true, false);
    // Each step awaits the inner next() call.
    assert!(count_transitions(&machine, |t| matches!(t, Transition::Await { .. })) >= 1);
    assert!(count_transitions(&machine, |t| matches!(t, Transition::Branch { .. })) >= 1);
}

#[test]
fn yield_delegate_loops_over_inner_iterator() {
    let body = body_of("function* g(inner: any) { yield* inner; }");
    let machine = lower_function_body(&body, false, true);
    assert!(count_transitions(&machine, |t| matches!(t, Transition::Yield { .. })) >= 1);
    assert!(count_transitions(&machine, |t| matches!(t, Transition::Branch { .. })) >= 1);
}

#[test]
fn hoisted_locals_cover_declarations_and_temps() {
    let body = body_of("async function f() { let a = await p; for (const v of xs) { let b = v; } return a; }");
    let machine = lower_function_body(&body, true, false);
    let hoisted = machine.hoisted_locals();
    assert!(hoisted.iter().any(|n| n == "a"));
    assert!(hoisted.iter().any(|n| n == SENT_VAR));
}

#[test]
fn async_generator_composes_both_transitions() {
    let body = body_of("async function* g() { let v = await p; yield v; }");
    let machine = lower_coroutine(&body, CoroKind::AsyncGenerator);
    assert_eq!(
        count_transitions(&machine, |t| matches!(t, Transition::Await { .. })),
        1
    );
    assert_eq!(
        count_transitions(&machine, |t| matches!(t, Transition::Yield { .. })),
        1
    );
    // `yield await x`: the await sequences before the yield, so the
    // yielded value is the awaited result.
    let await_state = machine
        .states
        .iter()
        .position(|s| matches!(s.transition, Transition::Await { .. }))
        .unwrap();
    let yield_state = machine
        .states
        .iter()
        .position(|s| matches!(s.transition, Transition::Yield { .. }))
        .unwrap();
    assert!(await_state < yield_state);
}

#[test]
fn break_and_continue_lower_to_jumps() {
    let body = body_of(
        "function* g() { while (true) { if (stop) { break; } yield 1; } }",
    );
    let machine = lower_function_body(&body, false, true);
    assert!(count_transitions(&machine, |t| matches!(t, Transition::Jump(_))) >= 2);
}
