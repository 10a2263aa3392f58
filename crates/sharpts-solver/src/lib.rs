//! Type algebra for the sharpts compiler.
//!
//! Types are interned: a [`TypeId`] is an index into the
//! [`TypeInterner`]'s table of structural [`TypeKey`]s, so equal
//! structures share one id and equality is an integer compare. The
//! primitive types occupy fixed, pre-seeded ids.
//!
//! Three operations define the system:
//! - [`is_compatible`] — structural assignability with the
//!   `any`/`unknown`/`never` lattice rules, literal widening, variance,
//!   and nominal class checks.
//! - [`instantiate_type`] — substitution of type parameters, flattening
//!   tuple spreads (variadic tuples) in place.
//! - [`evaluate_type`] — on-demand, memoized expansion of the lazy forms
//!   (`keyof`, indexed access, conditional, mapped, template-literal),
//!   distributing over unions where TypeScript does.

pub mod types;
pub use types::*;

pub mod intern;
pub use intern::TypeInterner;

pub mod shape;
pub use shape::{TypeShape, class_of_instance, shape_of};

pub mod compat;
pub use compat::is_compatible;

pub mod instantiate;
pub use instantiate::{TypeSubstitution, instantiate_type};

pub mod evaluate;
pub use evaluate::evaluate_type;

pub mod utilities;
pub use utilities::apply_utility;

pub mod display;
pub use display::type_to_string;

#[cfg(test)]
mod tests {
    mod compat_tests;
    mod evaluate_tests;
    mod intern_tests;
    mod utility_tests;
}
