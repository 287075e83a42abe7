//! Typed records for every persisted collection.
//!
//! # Responsibility
//! - Define storage-row shapes (snake_case, 0/1 flags) and application-facing
//!   domain projections (camelCase, booleans).
//! - Convert rows to storage records for adapter writes.
//!
//! # Invariants
//! - Timestamps are UTC RFC 3339 text with millisecond precision.
//! - Row types only ever leave a repository after schema validation.

use crate::db::Record;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

pub mod concept;
pub mod journal;
pub mod onboarding;
pub mod pathway;

pub use concept::{ConceptStatus, UserConceptRow};
pub use journal::{JournalEntry, JournalEntryRow};
pub use onboarding::{OnboardingGoal, OnboardingRow, OnboardingState, OnboardingUpdate};
pub use pathway::{PathwayCompletionRow, PathwayProgress, PathwayProgressRow};

/// Current time in the stored timestamp format.
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Serializes a row into the raw record shape adapters accept.
pub(crate) fn to_record<T: Serialize>(row: &T) -> Result<Record, serde_json::Error> {
    match serde_json::to_value(row)? {
        Value::Object(record) => Ok(record),
        _ => Err(serde::ser::Error::custom("row did not serialize to an object")),
    }
}

/// Converts a boolean to the stored 0/1 flag.
pub(crate) fn flag(value: bool) -> i64 {
    i64::from(value)
}
