//! Entity repositories over one shared storage adapter.
//!
//! # Responsibility
//! - Translate raw storage records into validated rows and domain objects.
//! - Own entity business rules (lazy creation, mastery implies unlock, ...).
//!
//! # Invariants
//! - Read paths never return errors: failures are logged and degrade to
//!   empty/`None`/default results.
//! - Write paths log and return every failure.
//! - Every read passes through schema validation before reaching callers.

use crate::db::{Record, StorageError};
use crate::error::ErrorKind;
use crate::schema::{parse, Validated, ValidationError};
use log::{error, warn};
use thiserror::Error;

pub mod concept_repo;
pub mod journal_repo;
pub mod onboarding_repo;
pub mod pathway_repo;
pub mod settings_repo;

pub use concept_repo::ConceptRepository;
pub use journal_repo::JournalRepository;
pub use onboarding_repo::OnboardingRepository;
pub use pathway_repo::PathwayRepository;
pub use settings_repo::SettingsRepository;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository write failure.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("record not found: {0}")]
    NotFound(String),
}

impl RepoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Storage(err) => err.kind(),
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
        }
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(value: serde_json::Error) -> Self {
        Self::Storage(StorageError::Json(value))
    }
}

/// Unwraps a read result, logging and substituting `fallback` on failure.
pub(crate) fn degrade<T>(operation: &'static str, result: Result<T, StorageError>, fallback: T) -> T {
    match result {
        Ok(value) => value,
        Err(err) => {
            warn!(
                "event=repo_read_failed module=repo operation={operation} error_kind={} error={err}",
                err.kind()
            );
            fallback
        }
    }
}

/// Logs a write failure and hands the error back for propagation.
pub(crate) fn write_failed(operation: &'static str, err: impl Into<RepoError>) -> RepoError {
    let err = err.into();
    error!(
        "event=repo_write_failed module=repo operation={operation} error_kind={} error={err}",
        err.kind()
    );
    err
}

/// Validates a single-record read; an invalid record counts as absent.
pub(crate) fn validate_one<T: Validated>(operation: &'static str, raw: Option<Record>) -> Option<T> {
    let raw = raw?;
    match parse::<T>(&raw) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(
                "event=record_dropped module=repo operation={operation} collection={} field={} reason={}",
                err.collection, err.field, err.message
            );
            None
        }
    }
}
