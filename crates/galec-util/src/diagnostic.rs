//! Diagnostic engine.
//!
//! Every stage of the pipeline reports through a shared [`DiagnosticHandler`]
//! sink. Diagnostics are collected in program order and sorted by
//! (file, line, column) for final rendering; an error of severity
//! [`Level::Error`] or above sets a sticky flag that gates progression
//! between pipeline stages.

use std::cell::RefCell;
use std::fmt;

use crate::span::{SourceMap, Span};

/// Diagnostic severity level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// Additional information attached to another diagnostic.
    Note,
    /// Does not prevent compilation.
    Warning,
    /// Prevents advancing past the current pipeline stage.
    Error,
    /// Terminates the pipeline immediately.
    Fatal,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Note => write!(f, "note"),
            Level::Warning => write!(f, "warning"),
            Level::Error => write!(f, "error"),
            Level::Fatal => write!(f, "fatal error"),
        }
    }
}

/// A diagnostic message with severity and location.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    /// Severity level.
    pub level: Level,
    /// Main message.
    pub message: String,
    /// Source location, possibly invalid for module-level reports.
    pub span: Span,
    /// Attached notes.
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn new(level: Level, message: impl Into<String>, span: Span) -> Self {
        Self {
            level,
            message: message.into(),
            span,
            notes: Vec::new(),
        }
    }

    pub fn error(message: impl Into<String>, span: Span) -> Self {
        Self::new(Level::Error, message, span)
    }

    pub fn warning(message: impl Into<String>, span: Span) -> Self {
        Self::new(Level::Warning, message, span)
    }

    /// Attach a note.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

/// Sink collecting diagnostics for a compilation.
///
/// The handler is shared by reference across all pipeline stages; interior
/// mutability keeps the reporting call sites free of `&mut` plumbing.
#[derive(Default)]
pub struct DiagnosticHandler {
    diagnostics: RefCell<Vec<Diagnostic>>,
}

impl DiagnosticHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit a pre-built diagnostic.
    pub fn emit(&self, diagnostic: Diagnostic) {
        self.diagnostics.borrow_mut().push(diagnostic);
    }

    /// Report an error at a location.
    pub fn error(&self, span: Span, message: impl Into<String>) {
        self.emit(Diagnostic::new(Level::Error, message, span));
    }

    /// Report a warning at a location.
    pub fn warning(&self, span: Span, message: impl Into<String>) {
        self.emit(Diagnostic::new(Level::Warning, message, span));
    }

    /// Report a note at a location.
    pub fn note(&self, span: Span, message: impl Into<String>) {
        self.emit(Diagnostic::new(Level::Note, message, span));
    }

    /// Report a fatal error at a location.
    pub fn fatal(&self, span: Span, message: impl Into<String>) {
        self.emit(Diagnostic::new(Level::Fatal, message, span));
    }

    /// True if any diagnostic of severity Error or above was reported.
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .borrow()
            .iter()
            .any(|d| d.level >= Level::Error)
    }

    /// True if a fatal diagnostic was reported.
    pub fn has_fatal(&self) -> bool {
        self.diagnostics
            .borrow()
            .iter()
            .any(|d| d.level == Level::Fatal)
    }

    pub fn error_count(&self) -> usize {
        self.count(Level::Error) + self.count(Level::Fatal)
    }

    pub fn warning_count(&self) -> usize {
        self.count(Level::Warning)
    }

    fn count(&self, level: Level) -> usize {
        self.diagnostics
            .borrow()
            .iter()
            .filter(|d| d.level == level)
            .count()
    }

    /// All diagnostics in emission order.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.borrow().clone()
    }

    /// Diagnostics sorted by (file, line, column), de-duplicated.
    ///
    /// The sort is stable, so diagnostics at the same position keep their
    /// emission order.
    pub fn sorted_diagnostics(&self) -> Vec<Diagnostic> {
        let mut diags = self.diagnostics();
        diags.sort_by_key(|d| d.span.sort_key());
        diags.dedup();
        diags
    }

    /// Render the sorted diagnostics with source lines, carets, and a
    /// trailing count summary.
    pub fn render(&self, source_map: &SourceMap) -> String {
        let mut out = String::new();
        for diag in self.sorted_diagnostics() {
            if diag.span.is_valid() {
                out.push_str(&format!(
                    "{}:{}:{}: {}: {}\n",
                    source_map.file_name(diag.span.file),
                    diag.span.line,
                    diag.span.column,
                    diag.level,
                    diag.message
                ));
                if let Some(line) = source_map.line_text(diag.span) {
                    out.push_str(&format!("    {line}\n"));
                    let caret_col = diag.span.column.max(1) as usize;
                    out.push_str(&format!("    {}^\n", " ".repeat(caret_col - 1)));
                }
            } else {
                out.push_str(&format!("{}: {}\n", diag.level, diag.message));
            }
            for note in &diag.notes {
                out.push_str(&format!("    note: {note}\n"));
            }
        }
        let errors = self.error_count();
        let warnings = self.warning_count();
        if errors > 0 || warnings > 0 {
            out.push_str(&format!(
                "{} error(s), {} warning(s) emitted\n",
                errors, warnings
            ));
        }
        out
    }
}
