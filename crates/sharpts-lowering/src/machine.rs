//! The coroutine machine model.

use rustc_hash::FxHashSet;
use sharpts_parser::ast::{Expr, Stmt, StmtKind};

/// Which coroutine shape a machine implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoroKind {
    Async,
    Generator,
    AsyncGenerator,
}

/// The variable that receives the value sent into the machine on each
/// resume (the awaited result, or the argument of `next(v)`).
pub const SENT_VAR: &str = "__sent";

/// State index of the initial state.
pub const START_STATE: usize = 0;

/// How a state hands off control after its statements run.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Generator yield: surface `value` as `{value, done: false}`, set
    /// the state to `resume`, and return control to the consumer.
    Yield { value: Expr, resume: usize },
    /// Await: evaluate `value`; once the promise settles, store the
    /// result in [`SENT_VAR`] and re-enter at `resume`.
    Await { value: Expr, resume: usize },
    Jump(usize),
    Branch {
        cond: Expr,
        then_state: usize,
        else_state: usize,
    },
    /// Complete the machine. Routed through enclosing `finally` regions
    /// by the driver.
    Return(Option<Expr>),
    /// End of a `finally` block: replay the pending completion (none,
    /// jump, return, or rethrow), consulting the region table for outer
    /// `finally` blocks.
    FinallyEnd { region: usize },
}

/// One flattened state: suspension-free statements plus a transition.
#[derive(Debug, Clone, PartialEq)]
pub struct CoroState {
    pub stmts: Vec<Stmt>,
    pub transition: Transition,
    /// Innermost try region whose *try body* contains this state.
    /// Catch and finally states carry the region's parent.
    pub handler: Option<usize>,
}

/// A structured exception region, split across suspension points.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerRegion {
    pub parent: Option<usize>,
    pub catch_state: Option<usize>,
    pub catch_var: Option<String>,
    pub finally_state: Option<usize>,
    /// Where control continues after the region completes normally.
    pub exit_state: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoroMachine {
    pub kind: CoroKind,
    pub states: Vec<CoroState>,
    pub handlers: Vec<HandlerRegion>,
}

impl CoroMachine {
    /// All variable names declared anywhere in the machine body. These
    /// are the locals whose lifetime may cross a suspension; the
    /// emitter hoists them onto the state-machine object.
    pub fn hoisted_locals(&self) -> Vec<String> {
        let mut seen = FxHashSet::default();
        let mut names = Vec::new();
        for state in &self.states {
            for stmt in &state.stmts {
                collect_declared(stmt, &mut |name| {
                    if seen.insert(name.to_string()) {
                        names.push(name.to_string());
                    }
                });
            }
        }
        for region in &self.handlers {
            if let Some(var) = &region.catch_var {
                if seen.insert(var.clone()) {
                    names.push(var.clone());
                }
            }
        }
        if seen.insert(SENT_VAR.to_string()) {
            names.push(SENT_VAR.to_string());
        }
        names
    }

    /// Walk the handler chain from a state, innermost first.
    pub fn handler_chain(&self, state: usize) -> Vec<usize> {
        let mut chain = Vec::new();
        let mut current = self.states.get(state).and_then(|s| s.handler);
        while let Some(region) = current {
            chain.push(region);
            current = self.handlers[region].parent;
        }
        chain
    }
}

fn collect_declared(stmt: &Stmt, push: &mut impl FnMut(&str)) {
    match &stmt.kind {
        StmtKind::VarDecl { declarations, .. } => {
            for declarator in declarations {
                push(&declarator.name);
            }
        }
        StmtKind::Block(stmts) => {
            for stmt in stmts {
                collect_declared(stmt, push);
            }
        }
        StmtKind::If {
            then_branch,
            else_branch,
            ..
        } => {
            collect_declared(then_branch, push);
            if let Some(else_branch) = else_branch {
                collect_declared(else_branch, push);
            }
        }
        StmtKind::While { body, .. } | StmtKind::DoWhile { body, .. } => {
            collect_declared(body, push);
        }
        StmtKind::ForIn { binding, body, .. } | StmtKind::ForOf { binding, body, .. } => {
            push(binding);
            collect_declared(body, push);
        }
        StmtKind::Labeled { body, .. } => collect_declared(body, push),
        StmtKind::Try {
            block,
            catch,
            finally,
        } => {
            for stmt in block {
                collect_declared(stmt, push);
            }
            if let Some(catch) = catch {
                if let Some(param) = &catch.param {
                    push(param);
                }
                for stmt in &catch.body {
                    collect_declared(stmt, push);
                }
            }
            if let Some(finally) = finally {
                for stmt in finally {
                    collect_declared(stmt, push);
                }
            }
        }
        StmtKind::Switch { cases, .. } => {
            for case in cases {
                for stmt in &case.body {
                    collect_declared(stmt, push);
                }
            }
        }
        _ => {}
    }
}
