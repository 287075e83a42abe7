//! Error taxonomy shared across storage, schema and repository layers.
//!
//! # Responsibility
//! - Classify every concrete error into one stable kind callers can branch on.
//!
//! # Invariants
//! - Read paths absorb `Persistence` and `Validation` kinds.
//! - Write paths surface every kind to the caller.

use std::fmt::{Display, Formatter};

/// Coarse error classification independent of the concrete error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The physical store rejected or could not complete an operation.
    Persistence,
    /// Stored or incoming data does not match the expected record shape.
    Validation,
    /// A required record is absent.
    NotFound,
    /// The selected backend cannot be reached or opened at all.
    StorageUnavailable,
}

impl ErrorKind {
    /// Stable string used in log lines.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Persistence => "persistence",
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::StorageUnavailable => "storage_unavailable",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
