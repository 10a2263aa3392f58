//! TypeScript parser and AST types for the sharpts compiler.
//!
//! The parser is a recursive-descent parser over the scanner's token
//! vector with a save/restore facility for the ambiguous prefixes
//! (`<T>expr` vs. less-than, arrow parameter lists vs. parenthesized
//! expressions). Type annotations are parsed by a sub-grammar with its
//! own precedence ladder.
//!
//! Several surface forms are desugared during parsing:
//! - C-style `for` loops into `{ init; while (cond) { body; step } }`
//! - Destructuring declarations into a temporary plus per-binding reads
//! - Parameter properties into field declarations plus assignments at
//!   constructor entry
//! - `namespace A.B.C` into nested namespace declarations

pub mod ast;
pub use ast::*;

mod parser;
pub use parser::Parser;

use sharpts_common::diagnostics::Diagnostic;
use sharpts_scanner::Scanner;

/// Scan and parse a source string into a [`Program`].
pub fn parse_source(source: &str) -> Result<Program, Diagnostic> {
    let tokens = Scanner::new(source).scan()?;
    Parser::new(tokens).parse_program()
}
