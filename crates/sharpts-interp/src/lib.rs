//! Tree-walking interpreter for the sharpts compiler.
//!
//! The interpreter evaluates the typed AST directly and produces the
//! reference semantics. Scheduling is cooperative and single-threaded:
//! promise resolutions seed a FIFO microtask queue, and suspensions
//! occur only at `await`, `yield`, and `for await...of` steps.
//!
//! Coroutine-like functions (async, generator, async generator) run
//! over the shared state-machine lowering: a generator object owns a
//! persistent environment plus a state index, and every resume executes
//! the current state's suspension-free statements by ordinary tree
//! walking before applying its transition.

mod value;
pub use value::*;

mod env;
pub use env::{Env, Environment};

mod interp;
pub use interp::Interpreter;

mod ops;

mod promise;

mod builtins;

mod coroutine;

mod iterator;

use sharpts_common::diagnostics::Diagnostic;
use sharpts_parser::ast::Program;

/// Run a program, writing its output to the given sink. Returns the
/// runtime error, if one escaped to the top level.
pub fn run_program(program: &Program, output: Box<dyn std::io::Write>) -> Result<(), Diagnostic> {
    let mut interp = Interpreter::new(output);
    interp.run(program)
}

/// Run a program with `process.argv` bound to the given arguments.
pub fn run_program_with_argv(
    program: &Program,
    output: Box<dyn std::io::Write>,
    argv: Vec<String>,
) -> Result<(), Diagnostic> {
    let mut interp = Interpreter::with_argv(output, argv);
    interp.run(program)
}

/// Run a program and capture stdout as a string (test harness entry).
pub fn run_program_to_string(program: &Program) -> Result<String, Diagnostic> {
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

    impl std::io::Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    let buffer = SharedBuffer::default();
    let sink = Box::new(buffer.clone());
    let result = run_program(program, sink);
    let text = String::from_utf8_lossy(&buffer.0.borrow()).into_owned();
    result.map(|()| text)
}

#[cfg(test)]
mod tests {
    mod interp_tests;
    mod scenario_tests;
}
