//! Source positions carried by every expression node and diagnostic.
//!
//! The parser that produces the raw AST owns real file/line/column
//! bookkeeping; this crate treats a position as an opaque, copyable,
//! orderable token so passes can thread it around without depending on
//! how the front end upstream represents source text.

/// A source position, as handed to the core by the parser.
///
/// `line` and `column` are 0-indexed, matching the convention used by the
/// rest of this crate's tooling-facing code (so downstream LSP-style
/// consumers don't need an off-by-one adjustment).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Pos {
    pub line: u32,
    pub column: u32,
}

impl Pos {
    pub const fn new(line: u32, column: u32) -> Self {
        Pos { line, column }
    }

    /// A placeholder position for synthesized nodes (e.g. casts inserted
    /// by the conversion engine, constructor bodies, and similar).
    pub const fn synthetic() -> Self {
        Pos { line: 0, column: 0 }
    }
}

impl std::fmt::Display for Pos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line + 1, self.column + 1)
    }
}
