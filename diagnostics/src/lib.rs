//! Diagnostics library for lint reporting
//!
//! This library provides rustc-style diagnostics with:
//! - Multiple severity levels (Error, Warning, Info, Hint)
//! - Source code snippets with highlighting
//! - Machine-applicable fixes made of byte-accurate text edits
//! - Multi-file source map support
//! - Colored terminal output

use std::fmt;

use serde::Serialize;

// Re-export source mapping types from the source_map crate
pub use source_map::{FileId, Pos, SourceFile, SourceMap, SourcePosition, SourceSpan};

pub mod edits;

pub use edits::{apply_edits, normalize_edits, EditError, Fix, ImportRequest, TextEdit};

/// Severity level for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    Error,
    Warning,
    Info,
    Hint,
}

impl fmt::Display for DiagnosticSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticSeverity::Error => write!(f, "error"),
            DiagnosticSeverity::Warning => write!(f, "warning"),
            DiagnosticSeverity::Info => write!(f, "info"),
            DiagnosticSeverity::Hint => write!(f, "hint"),
        }
    }
}

/// Style for diagnostic labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LabelStyle {
    Primary,
    Secondary,
}

/// A label that points to a span of code
#[derive(Debug, Clone, Serialize)]
pub struct Label {
    pub span: SourceSpan,
    pub message: String,
    pub style: LabelStyle,
}

impl Label {
    pub fn primary(span: SourceSpan, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
            style: LabelStyle::Primary,
        }
    }

    pub fn secondary(span: SourceSpan, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
            style: LabelStyle::Secondary,
        }
    }
}

/// A diagnostic message with severity, labels, and fixes
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub severity: DiagnosticSeverity,
    pub code: Option<String>,
    pub message: String,
    /// Position the diagnostic is reported at. Used for ordering and
    /// de-duplication; `span` is its rendered form.
    pub pos: Pos,
    pub span: SourceSpan,
    pub labels: Vec<Label>,
    pub fixes: Vec<Fix>,
    pub notes: Vec<String>,
    pub help: Vec<String>,
}

impl Diagnostic {
    /// All edits of all fixes, in fix order
    pub fn edits(&self) -> impl Iterator<Item = &TextEdit> {
        self.fixes.iter().flat_map(|fix| fix.edits.iter())
    }
}

/// Collection of diagnostics
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    pub diagnostics: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.diagnostics.extend(other.diagnostics);
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == DiagnosticSeverity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == DiagnosticSeverity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == DiagnosticSeverity::Warning)
    }

    /// Sort by position, then code, then message. Output order must not
    /// depend on the order functions were analyzed in.
    pub fn sort(&mut self) {
        self.diagnostics.sort_by(|a, b| {
            a.pos
                .cmp(&b.pos)
                .then_with(|| a.code.cmp(&b.code))
                .then_with(|| a.message.cmp(&b.message))
        });
    }

    /// Drop diagnostics that repeat an earlier (position, message) pair.
    /// Expects sorted input.
    pub fn dedup(&mut self) {
        self.diagnostics
            .dedup_by(|later, earlier| later.pos == earlier.pos && later.message == earlier.message);
    }

    /// Diagnostics reported in one file
    pub fn in_file(&self, file_id: FileId) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(move |d| d.pos.file_id == file_id)
    }
}

/// Builder for creating diagnostics
pub struct DiagnosticBuilder {
    severity: DiagnosticSeverity,
    code: Option<String>,
    message: String,
    pos: Pos,
    span: SourceSpan,
    labels: Vec<Label>,
    fixes: Vec<Fix>,
    notes: Vec<String>,
    help: Vec<String>,
}

impl DiagnosticBuilder {
    fn with_severity(severity: DiagnosticSeverity, message: impl Into<String>, pos: Pos, span: SourceSpan) -> Self {
        Self {
            severity,
            code: None,
            message: message.into(),
            pos,
            span,
            labels: vec![],
            fixes: vec![],
            notes: vec![],
            help: vec![],
        }
    }

    pub fn error(message: impl Into<String>, pos: Pos, span: SourceSpan) -> Self {
        Self::with_severity(DiagnosticSeverity::Error, message, pos, span)
    }

    pub fn warning(message: impl Into<String>, pos: Pos, span: SourceSpan) -> Self {
        Self::with_severity(DiagnosticSeverity::Warning, message, pos, span)
    }

    pub fn info(message: impl Into<String>, pos: Pos, span: SourceSpan) -> Self {
        Self::with_severity(DiagnosticSeverity::Info, message, pos, span)
    }

    pub fn hint(message: impl Into<String>, pos: Pos, span: SourceSpan) -> Self {
        Self::with_severity(DiagnosticSeverity::Hint, message, pos, span)
    }

    pub fn code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn label(mut self, span: SourceSpan, message: impl Into<String>) -> Self {
        self.labels.push(Label::primary(span, message));
        self
    }

    pub fn secondary_label(mut self, span: SourceSpan, message: impl Into<String>) -> Self {
        self.labels.push(Label::secondary(span, message));
        self
    }

    pub fn fix(mut self, fix: Fix) -> Self {
        if !fix.edits.is_empty() {
            self.fixes.push(fix);
        }
        self
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn help(mut self, help_msg: impl Into<String>) -> Self {
        self.help.push(help_msg.into());
        self
    }

    pub fn build(self) -> Diagnostic {
        Diagnostic {
            severity: self.severity,
            code: self.code,
            message: self.message,
            pos: self.pos,
            span: self.span,
            labels: self.labels,
            fixes: self.fixes,
            notes: self.notes,
            help: self.help,
        }
    }
}

/// Formatter for displaying diagnostics
pub struct ErrorFormatter {
    use_colors: bool,
}

impl ErrorFormatter {
    pub fn new() -> Self {
        Self { use_colors: false }
    }

    pub fn with_colors() -> Self {
        Self { use_colors: true }
    }

    pub fn format_diagnostics(&self, diagnostics: &Diagnostics, source_map: &SourceMap) -> String {
        let mut output = String::new();

        for (i, diagnostic) in diagnostics.diagnostics.iter().enumerate() {
            if i > 0 {
                output.push('\n');
            }
            output.push_str(&self.format_diagnostic(diagnostic, source_map));
        }

        output
    }

    /// One `file:line:col: message` line per diagnostic, the format go vet
    /// style tooling expects.
    pub fn format_short(&self, diagnostic: &Diagnostic, source_map: &SourceMap) -> String {
        let name = source_map
            .get_file(diagnostic.span.file_id)
            .map(|file| file.name.as_str())
            .unwrap_or("<unknown>");
        format!(
            "{}:{}:{}: {}",
            name, diagnostic.span.start.line, diagnostic.span.start.column, diagnostic.message
        )
    }

    pub fn format_diagnostic(&self, diagnostic: &Diagnostic, source_map: &SourceMap) -> String {
        let mut output = String::new();

        // Header
        if self.use_colors {
            let color = match diagnostic.severity {
                DiagnosticSeverity::Error => "\x1b[31m",
                DiagnosticSeverity::Warning => "\x1b[33m",
                DiagnosticSeverity::Info => "\x1b[36m",
                DiagnosticSeverity::Hint => "\x1b[32m",
            };
            output.push_str(color);
            output.push_str(&format!("{}", diagnostic.severity));

            if let Some(code) = &diagnostic.code {
                output.push_str(&format!("[{}]", code));
            }

            output.push_str("\x1b[0m: \x1b[1;97m");
            output.push_str(&diagnostic.message);
            output.push_str("\x1b[0m\n");
        } else {
            output.push_str(&format!("{}", diagnostic.severity));

            if let Some(code) = &diagnostic.code {
                output.push_str(&format!("[{}]", code));
            }

            output.push_str(&format!(": {}\n", diagnostic.message));
        }

        // Source location
        if let Some(file) = source_map.get_file(diagnostic.span.file_id) {
            let arrow = if self.use_colors { "\x1b[96m-->\x1b[0m" } else { "-->" };
            output.push_str(&format!(
                "  {} {}:{}:{}\n",
                arrow, file.name, diagnostic.span.start.line, diagnostic.span.start.column
            ));

            let line_num = diagnostic.span.start.line;
            let line_num_width = line_num.to_string().len();
            let bar = if self.use_colors { "\x1b[96m|\x1b[0m" } else { "|" };

            output.push_str(&format!("{:width$} {}\n", "", bar, width = line_num_width));

            if let Some(line) = source_map.get_line(diagnostic.span.file_id, line_num) {
                output.push_str(&format!("{} {} {}\n", line_num, bar, line));

                let column = diagnostic.span.start.column.max(1);
                let padding = " ".repeat(column - 1);

                // Underline the selector or identifier starting at the column
                let start_col = column - 1;
                let underline_len = if start_col < line.len() {
                    line[start_col..]
                        .chars()
                        .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '.' || *c == '(')
                        .count()
                        .max(1)
                } else {
                    1
                };

                let underline = if self.use_colors {
                    format!("\x1b[31m{}\x1b[0m", "^".repeat(underline_len))
                } else {
                    "^".repeat(underline_len)
                };

                output.push_str(&format!(
                    "{:width$} {} {}{}",
                    "",
                    bar,
                    padding,
                    underline,
                    width = line_num_width
                ));

                if let Some(label) = diagnostic
                    .labels
                    .iter()
                    .find(|l| l.style == LabelStyle::Primary)
                {
                    output.push_str(&format!(" {}", label.message));
                }
                output.push('\n');
            }
        }

        // Additional labels
        for label in &diagnostic.labels {
            if label.style == LabelStyle::Secondary
                && let Some(file) = source_map.get_file(label.span.file_id)
            {
                output.push_str(&format!(
                    "  --> {}:{}:{}: {}\n",
                    file.name, label.span.start.line, label.span.start.column, label.message
                ));
            }
        }

        for fix in &diagnostic.fixes {
            if self.use_colors {
                output.push_str("\x1b[38;5;208mfix\x1b[0m: ");
            } else {
                output.push_str("fix: ");
            }
            output.push_str(&fix.message);
            output.push('\n');
            for edit in &fix.edits {
                output.push_str(&format!("     {}\n", edit));
            }
        }

        for help_msg in &diagnostic.help {
            output.push_str("     help: ");
            output.push_str(help_msg);
            output.push('\n');
        }

        for note in &diagnostic.notes {
            output.push_str("note: ");
            output.push_str(note);
            output.push('\n');
        }

        output
    }
}

impl Default for ErrorFormatter {
    fn default() -> Self {
        Self::new()
    }
}
