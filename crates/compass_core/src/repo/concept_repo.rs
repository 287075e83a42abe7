//! Concept progress repository.
//!
//! # Responsibility
//! - Track per-concept status, unlock and mastery flags.
//! - Lazily create concept rows on first meaningful interaction.
//!
//! # Invariants
//! - `explored_at` is stamped once and then preserved.
//! - Mastering sets both flags; unlocking never sets mastery.
//! - Concurrent upsert-or-update callers on one id are not serialized.

use super::{degrade, validate_one, write_failed, RepoResult};
use crate::db::{Collection, Filter, Record, StorageAdapter};
use crate::model::{timestamp_now, to_record, ConceptStatus, UserConceptRow};
use crate::schema::{parse, parse_array, safe_parse};
use serde_json::Value;
use std::sync::Arc;

const COLLECTION: Collection = Collection::UserConcepts;

pub struct ConceptRepository {
    adapter: Arc<dyn StorageAdapter>,
}

impl ConceptRepository {
    pub fn new(adapter: Arc<dyn StorageAdapter>) -> Self {
        Self { adapter }
    }

    pub fn get(&self, concept_id: &str) -> Option<UserConceptRow> {
        let raw = degrade(
            "concepts.get",
            self.adapter.get_one(COLLECTION, concept_id),
            None,
        );
        validate_one("concepts.get", raw)
    }

    /// All valid rows, most recently updated first.
    pub fn get_all(&self) -> Vec<UserConceptRow> {
        parse_array(degrade(
            "concepts.get_all",
            self.adapter.get_all(COLLECTION),
            Vec::new(),
        ))
    }

    pub fn get_by_status(&self, status: ConceptStatus) -> Vec<UserConceptRow> {
        self.get_where("concepts.get_by_status", Filter::new().eq("status", status.as_str()))
    }

    pub fn get_unlocked(&self) -> Vec<UserConceptRow> {
        self.get_where("concepts.get_unlocked", Filter::new().eq("is_unlocked", 1))
    }

    pub fn get_mastered(&self) -> Vec<UserConceptRow> {
        self.get_where("concepts.get_mastered", Filter::new().eq("is_mastered", 1))
    }

    /// Sets `status`, stamping `explored_at` only if it was never set.
    pub fn update_status(&self, concept_id: &str, status: ConceptStatus) -> RepoResult<()> {
        let operation = "concepts.update_status";
        let now = timestamp_now();
        let existing = self.find_for_write(operation, concept_id)?;
        let explored_at = existing
            .as_ref()
            .and_then(|row| row.explored_at.clone())
            .unwrap_or_else(|| now.clone());

        let mut fields = Record::new();
        fields.insert("status".to_string(), Value::from(status.as_str()));
        fields.insert("explored_at".to_string(), Value::from(explored_at));
        self.write_fields(operation, concept_id, existing.is_some(), fields, now)
    }

    /// Moves an unexplored (or unseen) concept to `explored`; otherwise no-op.
    pub fn mark_explored(&self, concept_id: &str) -> RepoResult<()> {
        let existing = self.find_for_write("concepts.mark_explored", concept_id)?;
        match existing {
            Some(row) if row.status != ConceptStatus::Unexplored => Ok(()),
            _ => self.update_status(concept_id, ConceptStatus::Explored),
        }
    }

    pub fn unlock(&self, concept_id: &str) -> RepoResult<()> {
        let mut fields = Record::new();
        fields.insert("is_unlocked".to_string(), Value::from(1));
        self.upsert_or_update("concepts.unlock", concept_id, fields)
    }

    /// Marks the concept mastered, which also unlocks it.
    pub fn master(&self, concept_id: &str) -> RepoResult<()> {
        let mut fields = Record::new();
        fields.insert("is_unlocked".to_string(), Value::from(1));
        fields.insert("is_mastered".to_string(), Value::from(1));
        self.upsert_or_update("concepts.master", concept_id, fields)
    }

    pub fn is_unlocked(&self, concept_id: &str) -> bool {
        self.get(concept_id).is_some_and(|row| row.unlocked())
    }

    pub fn is_mastered(&self, concept_id: &str) -> bool {
        self.get(concept_id).is_some_and(|row| row.mastered())
    }

    /// Number of concepts whose status is anything but `unexplored`.
    pub fn get_explored_count(&self) -> usize {
        self.get_all()
            .iter()
            .filter(|row| row.status != ConceptStatus::Unexplored)
            .count()
    }

    pub fn get_resonates_count(&self) -> u64 {
        let filter = Filter::new().eq("status", ConceptStatus::Resonates.as_str());
        degrade(
            "concepts.get_resonates_count",
            self.adapter.count(COLLECTION, Some(&filter)),
            0,
        )
    }

    pub fn delete(&self, concept_id: &str) -> RepoResult<()> {
        self.adapter
            .delete(COLLECTION, concept_id)
            .map_err(|err| write_failed("concepts.delete", err))
    }

    pub fn delete_all(&self) -> RepoResult<()> {
        self.adapter
            .delete_all(COLLECTION)
            .map_err(|err| write_failed("concepts.delete_all", err))
    }

    fn get_where(&self, operation: &'static str, filter: Filter) -> Vec<UserConceptRow> {
        parse_array(degrade(
            operation,
            self.adapter.get_where(COLLECTION, &filter),
            Vec::new(),
        ))
    }

    /// Lookup used before writes: storage errors propagate, invalid rows read as absent.
    fn find_for_write(
        &self,
        operation: &'static str,
        concept_id: &str,
    ) -> RepoResult<Option<UserConceptRow>> {
        let raw = self
            .adapter
            .get_one(COLLECTION, concept_id)
            .map_err(|err| write_failed(operation, err))?;
        Ok(raw.and_then(|raw| safe_parse(&raw).ok()))
    }

    fn upsert_or_update(
        &self,
        operation: &'static str,
        concept_id: &str,
        fields: Record,
    ) -> RepoResult<()> {
        let exists = self.find_for_write(operation, concept_id)?.is_some();
        self.write_fields(operation, concept_id, exists, fields, timestamp_now())
    }

    /// Patches an existing row, or creates a default row carrying `fields`.
    fn write_fields(
        &self,
        operation: &'static str,
        concept_id: &str,
        exists: bool,
        mut fields: Record,
        now: String,
    ) -> RepoResult<()> {
        fields.insert("updated_at".to_string(), Value::from(now.as_str()));

        if exists {
            return self
                .adapter
                .update(COLLECTION, concept_id, &fields)
                .map_err(|err| write_failed(operation, err));
        }

        let mut record = to_record(&UserConceptRow::new(concept_id, now))
            .map_err(|err| write_failed(operation, err))?;
        record.extend(fields);
        let row: UserConceptRow = parse(&record).map_err(|err| write_failed(operation, err))?;
        let record = to_record(&row).map_err(|err| write_failed(operation, err))?;
        self.adapter
            .upsert(COLLECTION, concept_id, &record)
            .map_err(|err| write_failed(operation, err))
    }
}
