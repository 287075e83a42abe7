//! Pathway progress and its normalized completion relation.
//!
//! `concepts_completed` on the progress row is the legacy inline list. It is
//! kept readable but no longer written; the completion relation is
//! authoritative for which concepts a pathway has completed.

use crate::schema::{RecordSchema, Validated, PATHWAY_COMPLETION_SCHEMA, PATHWAY_PROGRESS_SCHEMA};
use serde::{Deserialize, Serialize};

/// Stored progress row, keyed by `pathway_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathwayProgressRow {
    pub pathway_id: String,
    pub started_at: String,
    /// Set once every concept of the pathway is completed.
    pub completed_at: Option<String>,
    /// Legacy inline list; not maintained.
    pub concepts_completed: Vec<String>,
}

impl PathwayProgressRow {
    pub fn started(pathway_id: impl Into<String>, now: impl Into<String>) -> Self {
        Self {
            pathway_id: pathway_id.into(),
            started_at: now.into(),
            completed_at: None,
            concepts_completed: Vec::new(),
        }
    }
}

impl Validated for PathwayProgressRow {
    fn schema() -> &'static RecordSchema {
        &PATHWAY_PROGRESS_SCHEMA
    }
}

/// One (pathway, concept) completion, unique per pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathwayCompletionRow {
    pub pathway_id: String,
    pub concept_id: String,
    pub completed_at: String,
}

impl Validated for PathwayCompletionRow {
    fn schema() -> &'static RecordSchema {
        &PATHWAY_COMPLETION_SCHEMA
    }
}

/// Application-facing pathway progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathwayProgress {
    pub pathway_id: String,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub completed_concepts: Vec<String>,
    pub is_completed: bool,
}
