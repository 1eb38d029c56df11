//! Error types for scriptgraph-ir
//!
//! Provides unified error handling across the crate. Build-time problems
//! inside the SSA core are *not* errors: they accumulate as per-instruction
//! diagnostics (see `shared::models::diagnostic`) and construction
//! continues best-effort. This type covers the crate's outer surface
//! (exports, misuse of the build API).

use thiserror::Error;

/// Main error type for scriptgraph-ir operations
#[derive(Debug, Error)]
pub enum ScriptGraphError {
    /// Builder API misuse (e.g. emitting outside an open function)
    #[error("build error: {0}")]
    Build(String),

    /// Type derivation error
    #[error("type error: {0}")]
    Type(String),

    /// Host bridge error
    #[error("host bridge error: {0}")]
    Host(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl ScriptGraphError {
    pub fn build(msg: impl Into<String>) -> Self {
        ScriptGraphError::Build(msg.into())
    }

    pub fn host(msg: impl Into<String>) -> Self {
        ScriptGraphError::Host(msg.into())
    }
}

/// Result type alias for scriptgraph operations
pub type Result<T> = std::result::Result<T, ScriptGraphError>;
