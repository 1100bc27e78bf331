use crate::syntax::Span;
use std::sync::{Mutex, MutexGuard};

/// Severity of a front-end diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Error,
    Warning,
}

impl DiagnosticLevel {
    fn label(self) -> &'static str {
        match self {
            DiagnosticLevel::Error => "error",
            DiagnosticLevel::Warning => "warning",
        }
    }
}

/// Stable identifier of a diagnostic kind, rendered as `E1005`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagnosticCode {
    pub prefix: char,
    pub code: u16,
}

impl DiagnosticCode {
    pub const fn new(prefix: char, code: u16) -> Self {
        Self { prefix, code }
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{:04}", self.prefix, self.code)
    }
}

/// A problem found while lexing or parsing a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub span: Span,
    pub message: String,
    pub code: Option<DiagnosticCode>,
}

impl Diagnostic {
    fn with_level(level: DiagnosticLevel, span: Span, message: impl Into<String>) -> Self {
        Self {
            level,
            span,
            message: message.into(),
            code: None,
        }
    }

    pub fn error(span: Span, message: impl Into<String>) -> Self {
        Self::with_level(DiagnosticLevel::Error, span, message)
    }

    pub fn warning(span: Span, message: impl Into<String>) -> Self {
        Self::with_level(DiagnosticLevel::Warning, span, message)
    }

    pub fn error_with_code(span: Span, code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::error(span, message).with_code(code)
    }

    pub fn with_code(mut self, code: DiagnosticCode) -> Self {
        self.code = Some(code);
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.level.label())?;
        if let Some(code) = self.code {
            write!(f, "[{}]", code)?;
        }
        write!(f, " {}: {}", self.span, self.message)
    }
}

/// Sink for diagnostics produced while a document is parsed.
///
/// Shared between the lexer and the parser of one document, so reporting
/// only needs `&self`.
pub trait DiagnosticHandler: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);

    /// Everything reported so far
    fn diagnostics(&self) -> Vec<Diagnostic>;

    fn error_count(&self) -> usize {
        self.diagnostics()
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Error)
            .count()
    }

    fn has_errors(&self) -> bool {
        self.error_count() > 0
    }
}

/// Well-known diagnostic codes reported by the front-end
pub mod codes {
    use super::DiagnosticCode;

    // lexer and parser errors

    /// Unexpected character in source
    pub const UNEXPECTED_CHARACTER: DiagnosticCode = DiagnosticCode::new('E', 1001);

    /// Unterminated string literal
    pub const UNTERMINATED_STRING: DiagnosticCode = DiagnosticCode::new('E', 1002);

    /// Unterminated long comment
    pub const UNTERMINATED_COMMENT: DiagnosticCode = DiagnosticCode::new('E', 1003);

    /// Malformed number literal
    pub const INVALID_NUMBER: DiagnosticCode = DiagnosticCode::new('E', 1004);

    /// Token did not match the grammar
    pub const UNEXPECTED_TOKEN: DiagnosticCode = DiagnosticCode::new('E', 1005);

    /// Blocks, expressions or annotation types nested past the parser's limit
    pub const TOO_MANY_SYNTAX_LEVELS: DiagnosticCode = DiagnosticCode::new('E', 1006);

    // annotation warnings

    /// Unknown `---@` tag
    pub const UNKNOWN_DOC_TAG: DiagnosticCode = DiagnosticCode::new('W', 2001);

    /// Malformed type inside an annotation
    pub const MALFORMED_DOC_TYPE: DiagnosticCode = DiagnosticCode::new('W', 2002);
}

/// Keeps every diagnostic in memory until taken
#[derive(Debug, Default)]
pub struct CollectingDiagnosticHandler {
    diagnostics: Mutex<Vec<Diagnostic>>,
}

impl CollectingDiagnosticHandler {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Diagnostic>> {
        self.diagnostics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Drain everything collected so far
    pub fn take(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.lock())
    }
}

impl DiagnosticHandler for CollectingDiagnosticHandler {
    fn report(&self, diagnostic: Diagnostic) {
        self.lock().push(diagnostic);
    }

    fn diagnostics(&self) -> Vec<Diagnostic> {
        self.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_handler() {
        let handler = CollectingDiagnosticHandler::new();
        handler.report(Diagnostic::error(Span::default(), "first"));
        handler.report(Diagnostic::warning(Span::default(), "second"));

        assert!(handler.has_errors());
        assert_eq!(handler.error_count(), 1);
        assert_eq!(handler.diagnostics().len(), 2);
        assert_eq!(handler.take().len(), 2);
        assert!(handler.diagnostics().is_empty());
    }

    #[test]
    fn test_diagnostic_code_formatting() {
        assert_eq!(codes::UNEXPECTED_TOKEN.to_string(), "E1005");
        assert_eq!(codes::UNKNOWN_DOC_TAG.to_string(), "W2001");
    }

    #[test]
    fn test_display_includes_code_and_position() {
        let diagnostic = Diagnostic::error_with_code(
            Span::new(0, 1, 3, 7),
            codes::UNEXPECTED_TOKEN,
            "expected 'end'",
        );
        assert_eq!(diagnostic.to_string(), "error[E1005] 3:7: expected 'end'");
    }
}
