//! Per-concept user progress.

use crate::schema::{RecordSchema, Validated, USER_CONCEPT_SCHEMA};
use serde::{Deserialize, Serialize};

/// How the user has engaged with a concept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConceptStatus {
    Unexplored,
    Explored,
    Resonates,
    NotForMe,
    Curious,
}

impl ConceptStatus {
    /// Stored names, in declaration order.
    pub const NAMES: &'static [&'static str] =
        &["unexplored", "explored", "resonates", "not_for_me", "curious"];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unexplored => "unexplored",
            Self::Explored => "explored",
            Self::Resonates => "resonates",
            Self::NotForMe => "not_for_me",
            Self::Curious => "curious",
        }
    }
}

/// Stored progress row, keyed by `concept_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConceptRow {
    pub concept_id: String,
    pub status: ConceptStatus,
    /// `0` or `1`.
    pub is_unlocked: i64,
    /// `0` or `1`; `1` implies `is_unlocked = 1`.
    pub is_mastered: i64,
    /// Set on first status change and never cleared.
    pub explored_at: Option<String>,
    pub updated_at: String,
}

impl UserConceptRow {
    /// Row for a concept the user has not interacted with yet.
    pub fn new(concept_id: impl Into<String>, now: impl Into<String>) -> Self {
        Self {
            concept_id: concept_id.into(),
            status: ConceptStatus::Unexplored,
            is_unlocked: 0,
            is_mastered: 0,
            explored_at: None,
            updated_at: now.into(),
        }
    }

    pub fn unlocked(&self) -> bool {
        self.is_unlocked == 1
    }

    pub fn mastered(&self) -> bool {
        self.is_mastered == 1
    }
}

impl Validated for UserConceptRow {
    fn schema() -> &'static RecordSchema {
        &USER_CONCEPT_SCHEMA
    }
}
