//! Coroutine state-machine lowering.
//!
//! Async functions, generators, and async generators execute as
//! explicit resumable state machines. A function body is flattened into
//! numbered states of suspension-free statements joined by transitions;
//! suspensions (`await`, `yield`) end a state and name the resume
//! state. Exception handling is described by a region table: each state
//! records the innermost try region whose body contains it, and regions
//! chain to their parents, so a raised exception (or a return/break
//! crossing a `finally`) is dispatched to the correct catch/finally with
//! a pending-completion replay at [`Transition::FinallyEnd`].
//!
//! Both backends consume the same machine: the interpreter drives it
//! over a persistent environment, and the emitter lowers it to a
//! `MoveNext` method with the state integer and hoisted locals as
//! fields.

mod machine;
pub use machine::*;

mod lower;
pub use lower::{lower_coroutine, lower_function_body};

#[cfg(test)]
mod tests {
    mod lowering_tests;
}
