//! Compiler options shared by the checker, interpreter, and emitter.

use serde::{Deserialize, Serialize};

/// Newline style used when normalizing program output and emitted artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NewLineKind {
    LineFeed,
    CarriageReturnLineFeed,
}

impl NewLineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NewLineKind::LineFeed => "\n",
            NewLineKind::CarriageReturnLineFeed => "\r\n",
        }
    }
}

/// Options controlling checking and execution behavior.
#[derive(Debug, Clone)]
pub struct CompilerOptions {
    /// Strict mode: writes to frozen objects throw instead of being ignored,
    /// and the emitted shim uses the strict property-set helpers.
    pub strict: bool,
    /// Newline kind for emitted artifacts.
    pub newline: NewLineKind,
    /// Upper bound on template-literal type cartesian expansion.
    pub max_template_expansion: usize,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            strict: true,
            newline: NewLineKind::LineFeed,
            max_template_expansion: crate::limits::MAX_TEMPLATE_EXPANSION,
        }
    }
}
