//! IL emitter for the sharpts compiler.
//!
//! Lowers the type-checked AST to a stack-oriented instruction stream
//! for an external native backend. The module carries:
//! - one method per function (plus the synthetic `main` for top-level
//!   statements),
//! - one class per class declaration,
//! - a state-machine class per coroutine function, with a `MoveNext`
//!   method produced from the shared [`sharpts_lowering::CoroMachine`],
//! - the runtime shim: helper methods generated once per output, only
//!   for the facilities the program actually references.
//!
//! Most values are boxed; a [`StackType`] shadow follows the evaluation
//! stack so `EnsureBoxed`/`EnsureDouble` conversions are inserted only
//! where representation actually changes. Emitter invariant violations
//! abort compilation with a spanned diagnostic and are never swallowed.

pub mod il;
pub use il::*;

mod builder;
pub use builder::MethodBuilder;

mod emitter;
pub use emitter::Emitter;

mod statemachine;

mod shim;

mod artifact;
pub use artifact::{ArtifactPaths, write_artifact};

use sharpts_checker::CheckResult;
use sharpts_common::diagnostics::Diagnostic;
use sharpts_parser::ast::Program;

/// Emit a checked program into an IL module.
pub fn emit_program(program: &Program, check: &CheckResult) -> Result<IlModule, Diagnostic> {
    let mut emitter = Emitter::new(check);
    emitter.emit_program(program)
}

#[cfg(test)]
mod tests {
    mod artifact_tests;
    mod emitter_tests;
    mod statemachine_tests;
}
