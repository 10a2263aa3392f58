//! Diagnostics for the sharpts pipeline.
//!
//! Every user-visible failure is a [`Diagnostic`]: a category, a numeric
//! code in the familiar TypeScript numbering ranges, a message, and the
//! span of the offending source. Parse and type errors halt the current
//! compilation unit; emitter invariant violations are never swallowed.

use crate::span::Span;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DiagnosticCategory {
    /// Ill-formed tokens or syntax.
    Parse,
    /// Assignability, declaration, and narrowing failures.
    Type,
    /// Emitter invariant violations and unsupported constructs.
    Compile,
    /// Errors raised while interpreting a program.
    Runtime,
}

impl DiagnosticCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticCategory::Parse => "error TS",
            DiagnosticCategory::Type => "error TS",
            DiagnosticCategory::Compile => "error TS",
            DiagnosticCategory::Runtime => "runtime error",
        }
    }
}

/// A single diagnostic with its source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub category: DiagnosticCategory,
    pub code: u32,
    pub message: String,
    pub span: Span,
}

impl Diagnostic {
    pub fn parse_error(span: Span, message: impl Into<String>, code: u32) -> Self {
        Self {
            category: DiagnosticCategory::Parse,
            code,
            message: message.into(),
            span,
        }
    }

    pub fn type_error(span: Span, message: impl Into<String>, code: u32) -> Self {
        Self {
            category: DiagnosticCategory::Type,
            code,
            message: message.into(),
            span,
        }
    }

    pub fn compile_error(span: Span, message: impl Into<String>, code: u32) -> Self {
        Self {
            category: DiagnosticCategory::Compile,
            code,
            message: message.into(),
            span,
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.category {
            DiagnosticCategory::Runtime => write!(f, "{}: {}", self.category.as_str(), self.message),
            _ => write!(f, "{}{}: {}", self.category.as_str(), self.code, self.message),
        }
    }
}

/// Diagnostic codes used across the pipeline.
///
/// Parse errors live in the 1xxx range, type errors in the 2xxx range,
/// matching the reference numbering so messages read familiarly.
pub mod diagnostic_codes {
    // Parse
    pub const UNEXPECTED_TOKEN: u32 = 1012;
    pub const UNTERMINATED_STRING: u32 = 1002;
    pub const UNTERMINATED_TEMPLATE: u32 = 1160;
    pub const UNTERMINATED_REGEX: u32 = 1161;
    pub const INVALID_CHARACTER: u32 = 1127;
    pub const NUMERIC_SEPARATOR_POSITION: u32 = 6188;
    pub const DECLARATION_EXPECTED: u32 = 1146;
    pub const EXPRESSION_EXPECTED: u32 = 1109;
    pub const TYPE_EXPECTED: u32 = 1110;
    pub const IDENTIFIER_EXPECTED: u32 = 1003;

    // Type
    pub const TYPE_NOT_ASSIGNABLE: u32 = 2322;
    pub const PROPERTY_MISSING: u32 = 2339;
    pub const CANNOT_FIND_NAME: u32 = 2304;
    pub const WRONG_ARITY: u32 = 2554;
    pub const NO_OVERLOAD_MATCHES: u32 = 2769;
    pub const ABSTRACT_NOT_IMPLEMENTED: u32 = 2515;
    pub const OVERRIDE_WITHOUT_BASE: u32 = 4113;
    pub const OVERRIDE_ON_STATIC: u32 = 4112;
    pub const CONSTRAINT_UNSATISFIED: u32 = 2344;
    pub const DUPLICATE_DECLARATION: u32 = 2300;
    pub const NOT_CALLABLE: u32 = 2349;
    pub const NOT_INDEXABLE: u32 = 2537;
    pub const TUPLE_INDEX_OUT_OF_RANGE: u32 = 2493;
    pub const REVERSE_MAP_ON_STRING_ENUM: u32 = 2476;
    pub const READONLY_ASSIGNMENT: u32 = 2540;
    pub const NOT_ITERABLE: u32 = 2488;
    pub const PRIVATE_ACCESS: u32 = 2341;
    pub const PROTECTED_ACCESS: u32 = 2445;
    pub const TEMPLATE_EXPANSION_TOO_LARGE: u32 = 2799;
    pub const INSTANTIATION_TOO_DEEP: u32 = 2589;
    pub const CANNOT_ASSIGN_TO_CONST: u32 = 2588;
    pub const INTERFACE_NOT_SATISFIED: u32 = 2420;

    // Compile
    pub const CONST_ENUM_INITIALIZER: u32 = 2474;
    pub const EMITTER_INVARIANT: u32 = 9001;
    pub const UNSUPPORTED_CONSTRUCT: u32 = 9002;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code_for_type_errors() {
        let d = Diagnostic::type_error(Span::new(0, 1), "Type 'string' is not assignable to type 'number'.", diagnostic_codes::TYPE_NOT_ASSIGNABLE);
        assert_eq!(
            d.to_string(),
            "error TS2322: Type 'string' is not assignable to type 'number'."
        );
    }
}
