//! Common types and utilities for the sharpts TypeScript compiler.
//!
//! This crate provides foundational types used across all sharpts crates:
//! - Source spans (`Span`, `Spanned`, `SpanBuilder`)
//! - Position/line-map types for source locations
//! - Diagnostics (`Diagnostic`, `DiagnosticCategory`, code tables)
//! - Compiler options
//! - Centralized limits and thresholds
//! - Numeric literal parsing

pub mod span;
pub use span::{Span, SpanBuilder, Spanned};

pub mod position;
pub use position::{LineMap, Position};

pub mod diagnostics;
pub use diagnostics::{Diagnostic, DiagnosticCategory, diagnostic_codes};

pub mod options;
pub use options::{CompilerOptions, NewLineKind};

pub mod limits;

pub mod numeric;
