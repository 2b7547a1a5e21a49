use super::ast::Span;

/// A compiler diagnostic with source location.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub message: String,
    pub span: Span,
    pub kind: ErrorKind,
    pub severity: Severity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Lexer,
    Parser,
    Resolve,
    Compiler,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

impl Diagnostic {
    fn error(kind: ErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            kind,
            severity: Severity::Error,
        }
    }

    pub fn lexer(message: impl Into<String>, span: Span) -> Self {
        Self::error(ErrorKind::Lexer, message, span)
    }

    pub fn parser(message: impl Into<String>, span: Span) -> Self {
        Self::error(ErrorKind::Parser, message, span)
    }

    pub fn resolve(message: impl Into<String>, span: Span) -> Self {
        Self::error(ErrorKind::Resolve, message, span)
    }

    pub fn compiler(message: impl Into<String>, span: Span) -> Self {
        Self::error(ErrorKind::Compiler, message, span)
    }

    pub fn warning(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            kind: ErrorKind::Resolve,
            severity: Severity::Warning,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Format as `origin(line,col): error[stage]: message`.
    pub fn format_with_source(&self, origin: &str, source: &str) -> String {
        let (line, col) = offset_to_line_col(source, self.span.start);
        format!(
            "{origin}({line},{col}): {}[{}]: {}",
            match self.severity {
                Severity::Error => "error",
                Severity::Warning => "warning",
            },
            match self.kind {
                ErrorKind::Lexer => "lexer",
                ErrorKind::Parser => "parser",
                ErrorKind::Resolve => "resolve",
                ErrorKind::Compiler => "compiler",
            },
            self.message,
        )
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Diagnostic {}

fn offset_to_line_col(source: &str, offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut col = 1;
    for (i, ch) in source.char_indices() {
        if i >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_line_and_column() {
        let src = "let a = 1;\nlet b = ;";
        let d = Diagnostic::parser("Unexpected token: Semicolon", Span::new(0, 19, 20));
        assert_eq!(
            d.format_with_source("Mod.ms", src),
            "Mod.ms(2,9): error[parser]: Unexpected token: Semicolon"
        );
    }

    #[test]
    fn warning_severity_is_not_error() {
        let d = Diagnostic::warning("unused", Span::default());
        assert!(!d.is_error());
        assert!(d.format_with_source("<inline>", "").contains("warning[resolve]"));
    }
}
