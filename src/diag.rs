//! Diagnostic sink and the structural error taxonomy.
//!
//! The core never decides how a message is rendered — message formatting
//! is a host concern. What the core *does* own is: which diagnostics
//! exist, with a stable `DiagnosticKind` tag, and the rule that reporting
//! an error is what allows a pass to return `None` without re-reporting.

use crate::pos::Pos;

/// Structural taxonomy of error kinds.
///
/// This is deliberately a flat, closed enum rather than a string: tests
/// assert on `kind()`, not on message text, so message wording can change
/// without breaking callers that only care "was this a lookup failure".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Lookup,
    ShapeMismatch,
    Variability,
    Constness,
    Overload,
    Arithmetic,
    Precision,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    PerformanceWarning,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub pos: Pos,
    pub message: String,
}

/// The narrow interface the core needs from an external diagnostic sink.
/// A parser-driven binary, an LSP server, or a test harness each
/// implement this differently; the core only ever calls through it.
pub trait DiagnosticSink {
    fn error(&mut self, kind: DiagnosticKind, pos: Pos, msg: String);
    fn warning(&mut self, kind: DiagnosticKind, pos: Pos, msg: String);
    fn performance_warning(&mut self, pos: Pos, msg: String);

    /// Internal invariant violated; callers are never expected to continue
    /// past it under well-formed input, so the default implementation
    /// panics. A host that wants fatal errors funneled through its own
    /// error type can override this instead of unwinding.
    fn fatal(&mut self, msg: String) -> ! {
        panic!("internal compiler error: {msg}");
    }
}

/// A `DiagnosticSink` that collects everything in memory. Used by this
/// crate's own tests, and suitable for any host that wants to drain
/// diagnostics after a pass rather than stream them.
#[derive(Debug, Default, Clone)]
pub struct CollectingDiagnostics {
    pub diagnostics: Vec<Diagnostic>,
    fatal_message: Option<String>,
}

impl CollectingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity != Severity::Error)
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn fatal_message(&self) -> Option<&str> {
        self.fatal_message.as_deref()
    }
}

impl DiagnosticSink for CollectingDiagnostics {
    fn error(&mut self, kind: DiagnosticKind, pos: Pos, msg: String) {
        tracing::debug!(%pos, ?kind, %msg, "error");
        self.diagnostics.push(Diagnostic {
            severity: Severity::Error,
            kind,
            pos,
            message: msg,
        });
    }

    fn warning(&mut self, kind: DiagnosticKind, pos: Pos, msg: String) {
        tracing::trace!(%pos, ?kind, %msg, "warning");
        self.diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            kind,
            pos,
            message: msg,
        });
    }

    fn performance_warning(&mut self, pos: Pos, msg: String) {
        tracing::trace!(%pos, %msg, "performance warning");
        self.diagnostics.push(Diagnostic {
            severity: Severity::PerformanceWarning,
            kind: DiagnosticKind::Precision,
            pos,
            message: msg,
        });
    }

    /// Unlike the trait default, the collecting sink never unwinds: tests
    /// want to assert the fatal message was produced, not catch a panic.
    fn fatal(&mut self, msg: String) -> ! {
        self.fatal_message = Some(msg.clone());
        panic!("internal compiler error: {msg}");
    }
}

/// Levenshtein edit distance between two strings, counted in chars.
///
/// Grounded on `rustc`'s own `lev_distance` (single-row dynamic
/// programming over the shorter string), adapted here to return `usize`
/// directly rather than threading a `Symbol` interner through it.
pub fn lev_distance(a: &str, b: &str) -> usize {
    if a.is_empty() {
        return b.chars().count();
    }
    if b.is_empty() {
        return a.chars().count();
    }

    let mut prev_row: Vec<usize> = (0..=b.chars().count()).collect();
    let mut curr_row = vec![0usize; prev_row.len()];

    for (i, ca) in a.chars().enumerate() {
        curr_row[0] = i + 1;
        for (j, cb) in b.chars().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr_row[j + 1] = (prev_row[j + 1] + 1)
                .min(curr_row[j] + 1)
                .min(prev_row[j] + cost);
        }
        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[b.chars().count()]
}

/// Find all names within `max_dist` of `lookup`, returning only the set
/// tied at the smallest qualifying distance found.
pub fn near_miss_suggestions<'a, I>(lookup: &str, candidates: I, max_dist: usize) -> Vec<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best_dist = usize::MAX;
    let mut best: Vec<&str> = Vec::new();

    for name in candidates {
        let dist = lev_distance(lookup, name);
        if dist > max_dist {
            continue;
        }
        match dist.cmp(&best_dist) {
            std::cmp::Ordering::Less => {
                best_dist = dist;
                best.clear();
                best.push(name);
            }
            std::cmp::Ordering::Equal => best.push(name),
            std::cmp::Ordering::Greater => {}
        }
    }

    best
}
