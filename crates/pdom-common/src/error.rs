//! Fault taxonomy for the persisted index.
//!
//! Three classes of trouble, handled differently:
//! - `StorageFault`: a database read or write failed. Propagated with `?`
//!   wherever the failure would compromise an invariant (record
//!   construction); caught, logged, and replaced by a documented fallback in
//!   best-effort cached accessors.
//! - `SemanticFault`: an AST-derived value could not be computed (dependent
//!   type during signature hashing, unavailable exception specification).
//!   Treated as "value unavailable"; callers substitute a placeholder.
//! - `Unsupported`: a mutator that exists only to satisfy a shared surface
//!   was invoked on a persisted, read-only view.
//!
//! Format-integrity violations (out-of-range length prefix, unknown node
//! tag) are NOT errors: they indicate a corrupt database or a programming
//! mistake and panic loudly instead of producing a plausible wrong answer.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PdomError {
    /// A database primitive failed. Carries the failing operation and
    /// offset for diagnostics.
    #[error("storage fault: {0}")]
    StorageFault(String),

    /// An AST-derived value needed for persistence was unavailable.
    #[error("semantic resolution fault: {0}")]
    SemanticFault(String),

    /// Mutation attempted on a persisted view that cannot support it.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// Externally raised cancellation of a read-side traversal. Must not be
    /// swallowed silently during visitation.
    #[error("operation cancelled")]
    Cancelled,
}

impl PdomError {
    pub fn storage(detail: impl Into<String>) -> Self {
        PdomError::StorageFault(detail.into())
    }

    pub fn semantic(detail: impl Into<String>) -> Self {
        PdomError::SemanticFault(detail.into())
    }
}

pub type Result<T> = std::result::Result<T, PdomError>;
