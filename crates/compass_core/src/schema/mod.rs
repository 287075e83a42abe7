//! Declarative record validation with defaulting.
//!
//! # Responsibility
//! - Describe each collection's field types, defaults and accepted ranges.
//! - Offer strict, safe, fallback and array parse entry points.
//!
//! # Invariants
//! - Unknown fields are stripped; missing defaulted fields are filled.
//! - Array parse never fails: invalid items are dropped and logged.
//! - Validation never touches storage.

use crate::db::Record;
use chrono::DateTime;
use log::warn;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

mod definitions;

pub use definitions::{
    JOURNAL_ENTRY_SCHEMA, ONBOARDING_SCHEMA, PATHWAY_COMPLETION_SCHEMA, PATHWAY_PROGRESS_SCHEMA,
    USER_CONCEPT_SCHEMA,
};

/// First validation failure found in a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid `{collection}.{field}`: {message}")]
pub struct ValidationError {
    pub collection: &'static str,
    pub field: String,
    pub message: String,
}

/// One problem reported by [`safe_parse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    pub field: String,
    pub message: String,
}

/// Accepted value shape for one field.
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    Text,
    NonEmptyText,
    /// Text restricted to the listed values.
    Enum(&'static [&'static str]),
    /// Integer `0` or `1`; booleans are coerced.
    Flag,
    Integer { min: i64, max: i64 },
    /// RFC 3339 / ISO-8601 timestamp text.
    Timestamp,
    /// Array of text, or text holding a JSON array of text.
    TextList,
}

/// What happens when a field is missing or `null`.
#[derive(Debug, Clone, Copy)]
pub enum Presence {
    Required,
    Nullable,
    DefaultInt(i64),
    DefaultText(&'static str),
    DefaultEmptyList,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub presence: Presence,
}

impl FieldSpec {
    pub const fn new(name: &'static str, kind: FieldKind, presence: Presence) -> Self {
        Self {
            name,
            kind,
            presence,
        }
    }
}

/// Field rules for one collection.
#[derive(Debug)]
pub struct RecordSchema {
    pub collection: &'static str,
    pub fields: &'static [FieldSpec],
}

impl RecordSchema {
    /// Applies defaults and checks every field, collecting all issues.
    pub fn normalize(&self, raw: &Record) -> Result<Record, Vec<FieldIssue>> {
        let mut normalized = Record::new();
        let mut issues = Vec::new();

        for spec in self.fields {
            match normalize_field(spec, raw.get(spec.name)) {
                Ok(value) => {
                    normalized.insert(spec.name.to_string(), value);
                }
                Err(message) => issues.push(FieldIssue {
                    field: spec.name.to_string(),
                    message,
                }),
            }
        }

        if issues.is_empty() {
            Ok(normalized)
        } else {
            Err(issues)
        }
    }
}

fn normalize_field(spec: &FieldSpec, value: Option<&Value>) -> Result<Value, String> {
    let value = match value {
        None | Some(Value::Null) => {
            return match spec.presence {
                Presence::Required => Err("is required".to_string()),
                Presence::Nullable => Ok(Value::Null),
                Presence::DefaultInt(default) => Ok(Value::from(default)),
                Presence::DefaultText(default) => Ok(Value::from(default)),
                Presence::DefaultEmptyList => Ok(Value::Array(Vec::new())),
            };
        }
        Some(value) => value,
    };

    match spec.kind {
        FieldKind::Text => value
            .as_str()
            .map(Value::from)
            .ok_or_else(|| "expected text".to_string()),
        FieldKind::NonEmptyText => match value.as_str() {
            Some(text) if !text.trim().is_empty() => Ok(Value::from(text)),
            Some(_) => Err("must not be empty".to_string()),
            None => Err("expected text".to_string()),
        },
        FieldKind::Enum(allowed) => match value.as_str() {
            Some(text) if allowed.contains(&text) => Ok(Value::from(text)),
            Some(text) => Err(format!("`{text}` is not one of {}", allowed.join("|"))),
            None => Err("expected text".to_string()),
        },
        FieldKind::Flag => match value {
            Value::Bool(flag) => Ok(Value::from(i64::from(*flag))),
            Value::Number(number) => match number.as_i64() {
                Some(flag @ (0 | 1)) => Ok(Value::from(flag)),
                _ => Err(format!("flag must be 0 or 1, got {number}")),
            },
            _ => Err("expected 0 or 1".to_string()),
        },
        FieldKind::Integer { min, max } => match value.as_i64() {
            Some(number) if (min..=max).contains(&number) => Ok(Value::from(number)),
            Some(number) => Err(format!("{number} is outside {min}..={max}")),
            None => Err("expected an integer".to_string()),
        },
        FieldKind::Timestamp => match value.as_str() {
            Some(text) if DateTime::parse_from_rfc3339(text).is_ok() => Ok(Value::from(text)),
            Some(text) => Err(format!("`{text}` is not an ISO-8601 timestamp")),
            None => Err("expected timestamp text".to_string()),
        },
        FieldKind::TextList => normalize_text_list(value),
    }
}

fn normalize_text_list(value: &Value) -> Result<Value, String> {
    let parsed;
    let items = match value {
        Value::Array(items) => items,
        Value::String(text) => {
            parsed = serde_json::from_str::<Value>(text)
                .map_err(|err| format!("invalid JSON list: {err}"))?;
            match &parsed {
                Value::Array(items) => items,
                _ => return Err("expected a JSON list".to_string()),
            }
        }
        _ => return Err("expected a list".to_string()),
    };

    if items.iter().all(Value::is_string) {
        Ok(Value::Array(items.clone()))
    } else {
        Err("list items must be text".to_string())
    }
}

/// Typed record bound to one schema.
pub trait Validated: DeserializeOwned {
    fn schema() -> &'static RecordSchema;
}

/// Outcome of [`safe_parse`].
#[derive(Debug, Clone, PartialEq)]
pub enum SafeParse<T> {
    Valid(T),
    Invalid(Vec<FieldIssue>),
}

impl<T> SafeParse<T> {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    pub fn ok(self) -> Option<T> {
        match self {
            Self::Valid(value) => Some(value),
            Self::Invalid(_) => None,
        }
    }
}

/// Validates `raw` or returns the first failure.
pub fn parse<T: Validated>(raw: &Record) -> Result<T, ValidationError> {
    let schema = T::schema();
    match safe_parse::<T>(raw) {
        SafeParse::Valid(value) => Ok(value),
        SafeParse::Invalid(mut issues) => {
            let first = if issues.is_empty() {
                FieldIssue {
                    field: "*".to_string(),
                    message: "record rejected".to_string(),
                }
            } else {
                issues.swap_remove(0)
            };
            Err(ValidationError {
                collection: schema.collection,
                field: first.field,
                message: first.message,
            })
        }
    }
}

/// Validates `raw` and reports every issue without an error type.
pub fn safe_parse<T: Validated>(raw: &Record) -> SafeParse<T> {
    let normalized = match T::schema().normalize(raw) {
        Ok(normalized) => normalized,
        Err(issues) => return SafeParse::Invalid(issues),
    };
    match serde_json::from_value(Value::Object(normalized)) {
        Ok(value) => SafeParse::Valid(value),
        Err(err) => SafeParse::Invalid(vec![FieldIssue {
            field: "*".to_string(),
            message: err.to_string(),
        }]),
    }
}

/// Validates `raw`, degrading to `fallback` when it does not conform.
pub fn parse_or<T: Validated>(raw: &Record, fallback: T) -> T {
    match parse::<T>(raw) {
        Ok(value) => value,
        Err(err) => {
            warn!(
                "event=record_fallback module=schema collection={} field={} reason={}",
                err.collection, err.field, err.message
            );
            fallback
        }
    }
}

/// Validates each record, keeping only the valid ones in order.
pub fn parse_array<T: Validated>(raws: Vec<Record>) -> Vec<T> {
    let collection = T::schema().collection;
    raws.into_iter()
        .enumerate()
        .filter_map(|(index, raw)| match parse::<T>(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(
                    "event=record_dropped module=schema collection={collection} index={index} field={} reason={}",
                    err.field, err.message
                );
                None
            }
        })
        .collect()
}
