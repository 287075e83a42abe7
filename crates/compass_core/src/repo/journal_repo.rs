//! Journal entry repository.

use super::{degrade, validate_one, write_failed, RepoResult};
use crate::db::{Collection, Filter, Record, StorageAdapter};
use crate::model::{timestamp_now, to_record, JournalEntry, JournalEntryRow};
use crate::schema::{parse, parse_array};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

const COLLECTION: Collection = Collection::JournalEntries;

pub struct JournalRepository {
    adapter: Arc<dyn StorageAdapter>,
}

impl JournalRepository {
    pub fn new(adapter: Arc<dyn StorageAdapter>) -> Self {
        Self { adapter }
    }

    /// Creates an entry and returns its generated id.
    ///
    /// `created_at` and `updated_at` carry the same instant.
    pub fn create(&self, content: &str, concept_id: Option<&str>) -> RepoResult<String> {
        let operation = "journal.create";
        let now = timestamp_now();
        let row = JournalEntryRow {
            id: Uuid::new_v4().to_string(),
            concept_id: concept_id.map(str::to_string),
            content: content.to_string(),
            created_at: now.clone(),
            updated_at: now,
        };

        let record = to_record(&row).map_err(|err| write_failed(operation, err))?;
        let row: JournalEntryRow = parse(&record).map_err(|err| write_failed(operation, err))?;
        self.adapter
            .upsert(COLLECTION, &row.id, &record)
            .map_err(|err| write_failed(operation, err))?;
        Ok(row.id)
    }

    pub fn get(&self, id: &str) -> Option<JournalEntryRow> {
        let raw = degrade("journal.get", self.adapter.get_one(COLLECTION, id), None);
        validate_one("journal.get", raw)
    }

    /// Every valid entry, newest first.
    pub fn get_all(&self) -> Vec<JournalEntryRow> {
        parse_array(degrade(
            "journal.get_all",
            self.adapter.get_all(COLLECTION),
            Vec::new(),
        ))
    }

    pub fn get_by_concept(&self, concept_id: &str) -> Vec<JournalEntryRow> {
        let filter = Filter::new().eq("concept_id", concept_id);
        parse_array(degrade(
            "journal.get_by_concept",
            self.adapter.get_where(COLLECTION, &filter),
            Vec::new(),
        ))
    }

    /// Replaces the entry text; a missing id is a silent no-op.
    pub fn update(&self, id: &str, content: &str) -> RepoResult<()> {
        let mut fields = Record::new();
        fields.insert("content".to_string(), Value::from(content));
        fields.insert("updated_at".to_string(), Value::from(timestamp_now()));
        self.adapter
            .update(COLLECTION, id, &fields)
            .map_err(|err| write_failed("journal.update", err))
    }

    pub fn delete(&self, id: &str) -> RepoResult<()> {
        self.adapter
            .delete(COLLECTION, id)
            .map_err(|err| write_failed("journal.delete", err))
    }

    pub fn delete_all(&self) -> RepoResult<()> {
        self.adapter
            .delete_all(COLLECTION)
            .map_err(|err| write_failed("journal.delete_all", err))
    }

    pub fn count(&self) -> u64 {
        degrade("journal.count", self.adapter.count(COLLECTION, None), 0)
    }

    pub fn to_domain(row: JournalEntryRow) -> JournalEntry {
        JournalEntry::from(row)
    }
}
