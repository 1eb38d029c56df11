//! Shared models
//!
//! Types used across multiple features live here to avoid circular
//! dependencies between feature slices.

pub mod diagnostic;
pub mod span;

pub use diagnostic::{Diagnostic, DiagnosticKind, DiagnosticTag};
pub use span::{Location, Span};
