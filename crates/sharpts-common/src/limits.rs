//! Centralized limits and thresholds.
//!
//! Shared constants for recursion depths, operation counts, and expansion
//! bounds used throughout the pipeline. Centralizing them prevents duplicate
//! definitions with inconsistent values and documents each limit in one
//! place.

/// Maximum number of combinations produced when expanding a
/// template-literal type over unions of string literals.
///
/// Expanding `` `${A}-${B}` `` is a cartesian product over the union
/// members of `A` and `B`; crossing this bound is a type error rather
/// than a truncation so behavior stays deterministic.
pub const MAX_TEMPLATE_EXPANSION: usize = 10_000;

/// Maximum depth for generic type instantiation.
///
/// Prevents infinite recursion when instantiating recursive generic types
/// (e.g. a conditional type that re-enters itself through its constraint).
/// Exceeding it reports "type instantiation is excessively deep".
pub const MAX_INSTANTIATION_DEPTH: u32 = 50;

/// Maximum depth for lazy type expansion (conditional, mapped, indexed
/// access, keyof chains).
pub const MAX_EXPANSION_DEPTH: u32 = 100;

/// Maximum nesting depth the parser accepts before reporting an error.
///
/// Deeply nested expressions otherwise recurse once per level.
pub const MAX_PARSE_DEPTH: u32 = 400;

/// Maximum interpreter call-stack depth.
///
/// Unbounded user recursion surfaces as a catchable range error at this
/// depth instead of overflowing the host stack.
pub const MAX_CALL_DEPTH: u32 = 2_000;

/// Maximum number of states a single coroutine state machine may have.
///
/// A generator body that flattens to more states than this indicates a
/// lowering bug; the emitter aborts rather than emit a corrupt machine.
pub const MAX_CORO_STATES: usize = 65_536;
