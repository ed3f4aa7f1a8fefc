use std::fmt;

use ariadne::{Color, Label, Report, ReportKind, Source};

use crate::ast::Span;

/// How bad a [`Diagnostic`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// The document compiles but is probably not what was meant.
    Warning,
    /// The document cannot be compiled.
    Error,
}

impl Severity {
    fn report_kind(self) -> (ReportKind<'static>, Color) {
        match self {
            Severity::Warning => (ReportKind::Warning, Color::Yellow),
            Severity::Error => (ReportKind::Error, Color::Red),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

/// A problem found in a logic document, anchored to a byte span.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// How serious the problem is.
    pub severity: Severity,
    /// Byte range of the offending text.
    pub span: Span,
    /// The main message.
    pub message: String,
    /// Text under the highlighted span. The message is used when unset.
    pub label: Option<String>,
    /// Hints printed after the snippet.
    pub notes: Vec<String>,
}

impl Diagnostic {
    fn new(severity: Severity, span: Span, message: impl Into<String>) -> Self {
        Self {
            severity,
            span,
            message: message.into(),
            label: None,
            notes: Vec::new(),
        }
    }

    /// An error at `span`.
    pub fn error(span: Span, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, span, message)
    }

    /// A warning at `span`.
    pub fn warning(span: Span, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, span, message)
    }

    /// Set the text under the highlighted span.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Add a hint.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Whether this diagnostic prevents compilation.
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    fn report<'a>(&'a self, file: &'a str) -> Report<'a, (&'a str, Span)> {
        let (kind, color) = self.severity.report_kind();
        let at = (file, self.span.clone());
        let mut report = Report::build(kind, at.clone()).with_message(&self.message).with_label(
            Label::new(at)
                .with_message(self.label.as_deref().unwrap_or(&self.message))
                .with_color(color),
        );
        for note in &self.notes {
            report = report.with_note(note);
        }
        report.finish()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)
    }
}

/// Render diagnostics against the text of `file` as terminal snippets.
///
/// Spans must be local to `source`. A diagnostic ariadne cannot render is
/// printed on one line instead.
pub fn render_diagnostics(source: &str, file: &str, diagnostics: &[Diagnostic]) -> String {
    let mut rendered = String::new();
    for diagnostic in diagnostics {
        let mut buffer = Vec::new();
        match diagnostic.report(file).write((file, Source::from(source)), &mut buffer) {
            Ok(()) => rendered.push_str(&String::from_utf8_lossy(&buffer)),
            Err(_) => {
                rendered.push_str(&diagnostic.to_string());
                rendered.push('\n');
            }
        }
    }
    rendered
}

/// One-line tally such as `"2 errors, 1 warning"`.
pub fn tally(diagnostics: &[Diagnostic]) -> String {
    let count = |severity: Severity| diagnostics.iter().filter(|d| d.severity == severity).count();
    let plural = |n: usize, word: &str| if n == 1 { format!("1 {word}") } else { format!("{n} {word}s") };
    format!(
        "{}, {}",
        plural(count(Severity::Error), "error"),
        plural(count(Severity::Warning), "warning")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_line_form() {
        let diagnostic = Diagnostic::error(0..5, "unknown type: o");
        assert_eq!(diagnostic.to_string(), "error: unknown type: o");
        assert!(diagnostic.is_error());
        assert!(!Diagnostic::warning(0..1, "unused").is_error());
        assert!(Severity::Error > Severity::Warning);
    }

    #[test]
    fn snippet_carries_label_and_notes() {
        let source = "type c : o {\n    predicates { open(c); }\n}";
        let diagnostics = vec![
            Diagnostic::error(9..10, "unknown type: o")
                .with_label("declared nowhere")
                .with_note("declare `o` before its subtypes"),
        ];
        let output = render_diagnostics(source, "house.twl", &diagnostics);
        assert!(output.contains("unknown type: o"));
        assert!(output.contains("declared nowhere"));
        assert!(output.contains("declare `o` before its subtypes"));
    }

    #[test]
    fn tally_counts_each_severity() {
        let diagnostics = vec![
            Diagnostic::error(0..1, "a"),
            Diagnostic::error(1..2, "b"),
            Diagnostic::warning(2..3, "c"),
        ];
        assert_eq!(tally(&diagnostics), "2 errors, 1 warning");
        assert_eq!(tally(&[]), "0 errors, 0 warnings");
    }
}
