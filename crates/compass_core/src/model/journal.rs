//! Free-text journal entries.

use crate::schema::{RecordSchema, Validated, JOURNAL_ENTRY_SCHEMA};
use serde::{Deserialize, Serialize};

/// Stored journal row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntryRow {
    /// Generated opaque id.
    pub id: String,
    /// Concept the entry was written about, if any.
    pub concept_id: Option<String>,
    /// May be empty.
    pub content: String,
    /// Immutable after creation.
    pub created_at: String,
    pub updated_at: String,
}

impl Validated for JournalEntryRow {
    fn schema() -> &'static RecordSchema {
        &JOURNAL_ENTRY_SCHEMA
    }
}

/// Application-facing journal entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub id: String,
    pub concept_id: Option<String>,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<JournalEntryRow> for JournalEntry {
    fn from(row: JournalEntryRow) -> Self {
        Self {
            id: row.id,
            concept_id: row.concept_id,
            content: row.content,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{JournalEntry, JournalEntryRow};
    use serde_json::json;

    #[test]
    fn domain_projection_uses_camel_case_names() {
        let entry = JournalEntry::from(JournalEntryRow {
            id: "j1".to_string(),
            concept_id: Some("pairing".to_string()),
            content: "hello".to_string(),
            created_at: "2026-01-01T00:00:00.000Z".to_string(),
            updated_at: "2026-01-02T00:00:00.000Z".to_string(),
        });
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["conceptId"], json!("pairing"));
        assert_eq!(value["createdAt"], json!("2026-01-01T00:00:00.000Z"));
        assert!(value.get("concept_id").is_none());
    }
}
