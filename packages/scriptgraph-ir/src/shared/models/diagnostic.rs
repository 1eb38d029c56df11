//! Build-time diagnostics
//!
//! Construction never aborts: a malformed statement degrades into a
//! diagnostic attached to the offending instruction and the build keeps
//! going, so downstream analyses always receive a complete (if partially
//! typed) graph. Each diagnostic carries a severity, the subsystem that
//! raised it, and a message.

use serde::{Deserialize, Serialize};

use super::span::Span;

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticKind {
    Error,
    Warning,
}

impl DiagnosticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticKind::Error => "error",
            DiagnosticKind::Warning => "warning",
        }
    }
}

/// Subsystem that raised the diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticTag {
    /// SSA construction (variable resolution, phi placement)
    Ssa,
    /// Closure binding (free values, side effects)
    Binding,
    /// Type derivation
    Type,
    /// Host value/type bridging
    Host,
}

impl DiagnosticTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticTag::Ssa => "ssa",
            DiagnosticTag::Binding => "binding",
            DiagnosticTag::Type => "type",
            DiagnosticTag::Host => "host",
        }
    }
}

/// One diagnostic recorded against an instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub tag: DiagnosticTag,
    pub message: String,
    pub span: Option<Span>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, tag: DiagnosticTag, message: impl Into<String>) -> Self {
        Self {
            kind,
            tag,
            message: message.into(),
            span: None,
        }
    }

    pub fn error(tag: DiagnosticTag, message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Error, tag, message)
    }

    pub fn warning(tag: DiagnosticTag, message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Warning, tag, message)
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}:{}] {}",
            self.tag.as_str(),
            self.kind.as_str(),
            self.message
        )?;
        if let Some(span) = &self.span {
            write!(f, " at {}", span)?;
        }
        Ok(())
    }
}
