//! Domain error types.

use thiserror::Error;

/// Errors surfaced by domain services and persistence adapters.
///
/// Unknown-id lookups are not errors; those operations return
/// `None`/`false` sentinels instead.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
}

/// Convenience result alias for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
