use crate::span::Span;

/// Severity level of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn label(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

/// A compiler diagnostic attached to one shader.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: Option<Span>,
    pub notes: Vec<String>,
}

impl Diagnostic {
    fn with_severity(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            span: None,
            notes: Vec::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Warning, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Info, message)
    }

    /// Attach a span when one is known; `None` leaves the diagnostic unchanged.
    pub fn at(mut self, span: Option<&Span>) -> Self {
        if let Some(span) = span {
            self.span = Some(span.clone());
        }
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.severity.label(), self.message)?;
        if let Some(ref span) = self.span {
            write!(f, "\n  --> {}", span)?;
        }
        for note in &self.notes {
            write!(f, "\n   = note: {}", note)?;
        }
        Ok(())
    }
}

/// Collector for the diagnostics produced while compiling one shader.
#[derive(Debug, Default, Clone)]
pub struct DiagnosticBag {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn extend(&mut self, other: DiagnosticBag) {
        self.diagnostics.extend(other.diagnostics);
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.is_error())
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_severity_span_and_notes() {
        let diag = Diagnostic::error("break depth 3 exceeds 1 enclosing loop")
            .at(Some(&Span::new("s.sl", 4, 9)))
            .with_note("innermost loop starts here");
        assert_eq!(
            diag.to_string(),
            "error: break depth 3 exceeds 1 enclosing loop\n  --> s.sl:4:9\n   = note: innermost loop starts here"
        );
    }

    #[test]
    fn bag_counts_only_errors() {
        let mut bag = DiagnosticBag::new();
        bag.report(Diagnostic::warning("unused"));
        assert!(!bag.has_errors());
        bag.report(Diagnostic::error("bad"));
        bag.report(Diagnostic::info("fyi"));
        assert!(bag.has_errors());
        assert_eq!(bag.error_count(), 1);
        assert_eq!(bag.len(), 3);
    }
}
