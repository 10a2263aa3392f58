//! Type checker for the sharpts compiler.
//!
//! The checker runs two passes over a program:
//! 1. A hoisting pass collects top-level declarations (classes,
//!    interfaces, type aliases, enums, functions with their overload
//!    clusters, namespaces) so mutual references resolve.
//! 2. A checking pass visits statement by statement; expression checking
//!    returns the inferred [`TypeId`] and records it in a side table
//!    keyed by expression [`NodeId`].
//!
//! Checking fails fast: the first unrecoverable error aborts the unit
//! with a spanned diagnostic.

mod context;
pub use context::{Binding, BindingKind, CheckerContext};

mod globals;

mod annotations;
mod classes;
mod expr;
mod members;
mod narrowing;
mod statements;

use rustc_hash::FxHashMap;
use sharpts_common::diagnostics::Diagnostic;
use sharpts_parser::ast::{NodeId, Program};
use sharpts_solver::TypeInterner;
use sharpts_solver::types::{EnumType, TypeId};

/// The result of a successful check: the interner, the
/// expression-to-type side table, and the enum environment the emitter
/// needs for reverse maps and const-enum inlining.
pub struct CheckResult {
    pub interner: TypeInterner,
    pub expr_types: FxHashMap<NodeId, TypeId>,
    pub enums: FxHashMap<String, EnumType>,
}

/// Type-check a program.
pub fn check(program: &Program) -> Result<CheckResult, Diagnostic> {
    tracing::debug!(statements = program.statements.len(), "checking program");
    let mut context = CheckerContext::new();
    context.install_globals();
    context.hoist_declarations(&program.statements)?;
    for stmt in &program.statements {
        context.check_statement(stmt)?;
    }
    Ok(context.into_result())
}

#[cfg(test)]
mod tests {
    mod checker_tests;
    mod narrowing_tests;
}
