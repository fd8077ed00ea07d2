//! Diagnostics produced while lowering exception-handling constructs.

use std::fmt;

use serde::Serialize;

/// Byte range in the source the front end attached to a construct.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    #[must_use]
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    #[must_use]
    pub fn is_error(self) -> bool {
        self == Severity::Error
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        })
    }
}

/// Conditions the lowering core reports itself. Each has a fixed code and
/// severity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum EhDiagnostic {
    /// The thrown expression's type, or its pointee, is incomplete.
    IncompleteThrowType,
    /// Exception handling was switched off for this unit.
    ExceptionsDisabled,
    /// `throw NULL;` throws an integer, not a pointer.
    ThrowingNull,
    /// The type system could not size a complete thrown type.
    UnsizedThrowType,
}

impl EhDiagnostic {
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            EhDiagnostic::IncompleteThrowType => "EH0001",
            EhDiagnostic::ExceptionsDisabled => "EH0002",
            EhDiagnostic::ThrowingNull => "EH0003",
            EhDiagnostic::UnsizedThrowType => "EH0004",
        }
    }

    #[must_use]
    pub fn severity(self) -> Severity {
        match self {
            EhDiagnostic::ThrowingNull => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: EhDiagnostic,
    pub severity: Severity,
    pub message: String,
    pub span: Option<Span>,
}

impl Diagnostic {
    #[must_use]
    pub fn eh(kind: EhDiagnostic, message: impl Into<String>, span: Option<Span>) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            message: message.into(),
            span,
        }
    }

    #[must_use]
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    #[must_use]
    pub fn is(&self, kind: EhDiagnostic) -> bool {
        self.kind == kind
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]: {}", self.severity, self.code(), self.message)?;
        match self.span {
            Some(span) => write!(f, " at {}..{}", span.start, span.end),
            None => Ok(()),
        }
    }
}

/// Diagnostics recorded for one translation unit, in report order.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticSink {
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|diagnostic| diagnostic.severity.is_error())
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}
