//! Collection registry shared by both storage backends.
//!
//! # Responsibility
//! - Name every persisted collection and its key, recency and storage layout.
//! - Provide the conjunctive equality filter used by `get_where` and `count`.
//!
//! # Invariants
//! - A collection maps to exactly one table and exactly one flat-store key.
//! - Composite ids are JSON arrays of key parts in key-column order, so any
//!   non-empty part (including one containing `::`) round-trips unchanged.
//! - Field names reaching SQL must match `^[a-z_][a-z0-9_]*$`.

use super::{StorageError, StorageResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Raw storage row as seen by repositories: column/field name to JSON value.
pub type Record = Map<String, Value>;

/// Fixed id of the onboarding singleton row.
pub const SINGLETON_ID: &str = "1";

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("valid identifier regex"));

/// Named group of same-shaped records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    UserConcepts,
    JournalEntries,
    Onboarding,
    PathwayProgress,
    PathwayCompletions,
}

impl Collection {
    /// Every collection, in creation order.
    pub const ALL: [Collection; 5] = [
        Self::UserConcepts,
        Self::JournalEntries,
        Self::Onboarding,
        Self::PathwayProgress,
        Self::PathwayCompletions,
    ];

    /// Table name on the relational backend; also used in log lines.
    pub fn table(self) -> &'static str {
        match self {
            Self::UserConcepts => "user_concepts",
            Self::JournalEntries => "journal_entries",
            Self::Onboarding => "onboarding",
            Self::PathwayProgress => "pathway_progress",
            Self::PathwayCompletions => "pathway_concept_completions",
        }
    }

    /// Flat-store key holding the serialized collection.
    pub fn storage_key(self) -> &'static str {
        match self {
            Self::UserConcepts => "compass.user_concepts",
            Self::JournalEntries => "compass.journal_entries",
            Self::Onboarding => "compass.onboarding",
            Self::PathwayProgress => "compass.pathway_progress",
            Self::PathwayCompletions => "compass.pathway_concept_completions",
        }
    }

    /// Primary key columns, in composite-id order.
    pub fn key_columns(self) -> &'static [&'static str] {
        match self {
            Self::UserConcepts => &["concept_id"],
            Self::JournalEntries => &["id"],
            Self::Onboarding => &["id"],
            Self::PathwayProgress => &["pathway_id"],
            Self::PathwayCompletions => &["pathway_id", "concept_id"],
        }
    }

    /// Field `get_all` orders by, descending.
    pub fn recency_field(self) -> Option<&'static str> {
        match self {
            Self::UserConcepts => Some("updated_at"),
            Self::JournalEntries => Some("created_at"),
            Self::Onboarding => None,
            Self::PathwayProgress => Some("started_at"),
            Self::PathwayCompletions => Some("completed_at"),
        }
    }

    /// Whether the collection holds exactly one record that is reset, never deleted.
    pub fn is_singleton(self) -> bool {
        matches!(self, Self::Onboarding)
    }

    /// Default field values of the singleton record.
    ///
    /// Returns `None` for non-singleton collections.
    pub fn singleton_defaults(self) -> Option<Record> {
        if !self.is_singleton() {
            return None;
        }
        let mut record = Record::new();
        record.insert("completed".to_string(), Value::from(0));
        record.insert("goal".to_string(), Value::Null);
        record.insert("comfort_level".to_string(), Value::Null);
        record.insert("first_concept_viewed".to_string(), Value::from(0));
        Some(record)
    }

    /// Splits `id` into `(column, value)` pairs for the collection key.
    ///
    /// Singleton ids always resolve to the fixed row regardless of input.
    pub fn key_values(self, id: &str) -> StorageResult<Vec<(&'static str, String)>> {
        if self.is_singleton() {
            return Ok(vec![("id", SINGLETON_ID.to_string())]);
        }

        let columns = self.key_columns();
        let invalid = || StorageError::InvalidKey {
            collection: self.table(),
            id: id.to_string(),
        };
        let parts: Vec<String> = if columns.len() == 1 {
            vec![id.to_string()]
        } else {
            serde_json::from_str(id).map_err(|_| invalid())?
        };

        if parts.len() != columns.len() || parts.iter().any(String::is_empty) {
            return Err(invalid());
        }

        Ok(columns.iter().copied().zip(parts).collect())
    }
}

/// Encodes key parts as a composite record id.
pub fn composite_key(parts: &[&str]) -> String {
    Value::from(parts.to_vec()).to_string()
}

/// Builds the composite id of one pathway completion.
pub fn completion_key(pathway_id: &str, concept_id: &str) -> String {
    composite_key(&[pathway_id, concept_id])
}

/// Rejects field names that are not plain snake_case identifiers.
pub fn validate_identifier(name: &str) -> StorageResult<()> {
    if IDENTIFIER_RE.is_match(name) {
        Ok(())
    } else {
        Err(StorageError::InvalidIdentifier(name.to_string()))
    }
}

/// Conjunctive equality filter (`field = value AND ...`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: BTreeMap<String, Value>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one `field = value` clause, replacing an earlier clause on the same field.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.insert(field.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Clauses in deterministic field order.
    pub fn clauses(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.clauses.iter().map(|(field, value)| (field.as_str(), value))
    }

    /// Returns whether every clause matches; absent fields compare as `null`.
    pub fn matches(&self, record: &Record) -> bool {
        self.clauses.iter().all(|(field, expected)| {
            let actual = record.get(field).unwrap_or(&Value::Null);
            values_equal(actual, expected)
        })
    }
}

fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(left), Value::Number(right)) => match (left.as_i64(), right.as_i64()) {
            (Some(left), Some(right)) => left == right,
            _ => left.as_f64() == right.as_f64(),
        },
        (Value::Bool(flag), Value::Number(number)) | (Value::Number(number), Value::Bool(flag)) => {
            number.as_i64() == Some(i64::from(*flag))
        }
        _ => actual == expected,
    }
}
