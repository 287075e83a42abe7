//! Pathway progress repository.
//!
//! # Responsibility
//! - Start pathways and record per-concept completions.
//! - Derive pathway completion from the normalized completion relation.
//!
//! # Invariants
//! - A (pathway, concept) completion is stored at most once.
//! - `completed_at` is set exactly when distinct completions reach the total.
//! - The legacy inline `concepts_completed` list is never written here and
//!   may be stale; [`PathwayRepository::to_domain`] ignores it on purpose.

use super::{degrade, validate_one, write_failed, RepoResult};
use crate::db::{completion_key, Collection, Filter, Record, StorageAdapter};
use crate::model::{
    timestamp_now, to_record, PathwayCompletionRow, PathwayProgress, PathwayProgressRow,
};
use crate::schema::{parse, parse_array, safe_parse};
use log::info;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

const PROGRESS: Collection = Collection::PathwayProgress;
const COMPLETIONS: Collection = Collection::PathwayCompletions;

pub struct PathwayRepository {
    adapter: Arc<dyn StorageAdapter>,
}

impl PathwayRepository {
    pub fn new(adapter: Arc<dyn StorageAdapter>) -> Self {
        Self { adapter }
    }

    pub fn get(&self, pathway_id: &str) -> Option<PathwayProgressRow> {
        let raw = degrade(
            "pathways.get",
            self.adapter.get_one(PROGRESS, pathway_id),
            None,
        );
        validate_one("pathways.get", raw)
    }

    /// Every valid progress row, most recently started first.
    pub fn get_all(&self) -> Vec<PathwayProgressRow> {
        parse_array(degrade(
            "pathways.get_all",
            self.adapter.get_all(PROGRESS),
            Vec::new(),
        ))
    }

    /// Creates the progress row unless the pathway was already started.
    pub fn start(&self, pathway_id: &str) -> RepoResult<()> {
        let operation = "pathways.start";
        if self.find_for_write(operation, pathway_id)?.is_some() {
            return Ok(());
        }
        self.insert_started(operation, pathway_id)
    }

    /// Records `concept_id` as completed for `pathway_id`.
    ///
    /// Starts the pathway when needed. `completed_at` is set once the number
    /// of distinct completed concepts reaches `total_concepts`, and cleared
    /// otherwise.
    pub fn update_progress(
        &self,
        pathway_id: &str,
        concept_id: &str,
        total_concepts: usize,
    ) -> RepoResult<()> {
        let operation = "pathways.update_progress";
        let key = completion_key(pathway_id, concept_id);
        COMPLETIONS
            .key_values(&key)
            .map_err(|err| write_failed(operation, err))?;

        let existing = match self.find_for_write(operation, pathway_id)? {
            Some(row) => row,
            None => {
                self.insert_started(operation, pathway_id)?;
                PathwayProgressRow::started(pathway_id, timestamp_now())
            }
        };

        let already_completed = self
            .adapter
            .get_one(COMPLETIONS, &key)
            .map_err(|err| write_failed(operation, err))?
            .is_some_and(|raw| safe_parse::<PathwayCompletionRow>(&raw).is_valid());
        if !already_completed {
            let completion = PathwayCompletionRow {
                pathway_id: pathway_id.to_string(),
                concept_id: concept_id.to_string(),
                completed_at: timestamp_now(),
            };
            let record = to_record(&completion).map_err(|err| write_failed(operation, err))?;
            self.adapter
                .upsert(COMPLETIONS, &key, &record)
                .map_err(|err| write_failed(operation, err))?;
        }

        let filter = Filter::new().eq("pathway_id", pathway_id);
        let completed = self
            .adapter
            .count(COMPLETIONS, Some(&filter))
            .map_err(|err| write_failed(operation, err))?;
        let completed_at = if completed >= total_concepts as u64 {
            Value::from(existing.completed_at.unwrap_or_else(timestamp_now))
        } else {
            Value::Null
        };

        let mut fields = Record::new();
        fields.insert("completed_at".to_string(), completed_at.clone());
        self.adapter
            .update(PROGRESS, pathway_id, &fields)
            .map_err(|err| write_failed(operation, err))?;

        if !completed_at.is_null() {
            info!(
                "event=pathway_completed module=repo pathway_id={pathway_id} completed={completed} total={total_concepts}"
            );
        }
        Ok(())
    }

    pub fn is_completed(&self, pathway_id: &str) -> bool {
        self.get(pathway_id)
            .is_some_and(|row| row.completed_at.is_some())
    }

    /// Completed concept ids from the completion relation, oldest first.
    pub fn get_completed_concepts(&self, pathway_id: &str) -> Vec<String> {
        let filter = Filter::new().eq("pathway_id", pathway_id);
        let mut rows: Vec<PathwayCompletionRow> = parse_array(degrade(
            "pathways.get_completed_concepts",
            self.adapter.get_where(COMPLETIONS, &filter),
            Vec::new(),
        ));
        sort_oldest_first(&mut rows);
        rows.into_iter().map(|row| row.concept_id).collect()
    }

    /// Legacy projection: always reports no completed concepts.
    ///
    /// Use [`Self::get_domain`] for the authoritative completion list.
    pub fn to_domain(row: &PathwayProgressRow) -> PathwayProgress {
        project(row, Vec::new())
    }

    pub fn get_domain(&self, pathway_id: &str) -> Option<PathwayProgress> {
        let row = self.get(pathway_id)?;
        let completed = self.get_completed_concepts(pathway_id);
        Some(project(&row, completed))
    }

    pub fn get_all_domain(&self) -> Vec<PathwayProgress> {
        let rows = self.get_all();
        if rows.is_empty() {
            return Vec::new();
        }

        let mut completions: Vec<PathwayCompletionRow> = parse_array(degrade(
            "pathways.get_all_domain",
            self.adapter.get_all(COMPLETIONS),
            Vec::new(),
        ));
        sort_oldest_first(&mut completions);
        let mut by_pathway: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for completion in completions {
            by_pathway
                .entry(completion.pathway_id)
                .or_default()
                .push(completion.concept_id);
        }

        rows.iter()
            .map(|row| {
                let completed = by_pathway.remove(&row.pathway_id).unwrap_or_default();
                project(row, completed)
            })
            .collect()
    }

    /// Removes the progress row and its completions.
    pub fn delete(&self, pathway_id: &str) -> RepoResult<()> {
        let operation = "pathways.delete";
        let filter = Filter::new().eq("pathway_id", pathway_id);
        let completions = self
            .adapter
            .get_where(COMPLETIONS, &filter)
            .map_err(|err| write_failed(operation, err))?;
        for raw in completions {
            let Some(concept_id) = raw.get("concept_id").and_then(Value::as_str) else {
                continue;
            };
            self.adapter
                .delete(COMPLETIONS, &completion_key(pathway_id, concept_id))
                .map_err(|err| write_failed(operation, err))?;
        }
        self.adapter
            .delete(PROGRESS, pathway_id)
            .map_err(|err| write_failed(operation, err))
    }

    pub fn delete_all(&self) -> RepoResult<()> {
        let operation = "pathways.delete_all";
        self.adapter
            .delete_all(COMPLETIONS)
            .map_err(|err| write_failed(operation, err))?;
        self.adapter
            .delete_all(PROGRESS)
            .map_err(|err| write_failed(operation, err))
    }

    fn find_for_write(
        &self,
        operation: &'static str,
        pathway_id: &str,
    ) -> RepoResult<Option<PathwayProgressRow>> {
        let raw = self
            .adapter
            .get_one(PROGRESS, pathway_id)
            .map_err(|err| write_failed(operation, err))?;
        Ok(raw.and_then(|raw| safe_parse(&raw).ok()))
    }

    fn insert_started(&self, operation: &'static str, pathway_id: &str) -> RepoResult<()> {
        let row = PathwayProgressRow::started(pathway_id, timestamp_now());
        let record = to_record(&row).map_err(|err| write_failed(operation, err))?;
        parse::<PathwayProgressRow>(&record)
            .map_err(|err| write_failed(operation, err))?;
        self.adapter
            .upsert(PROGRESS, pathway_id, &record)
            .map_err(|err| write_failed(operation, err))
    }
}

fn project(row: &PathwayProgressRow, completed_concepts: Vec<String>) -> PathwayProgress {
    PathwayProgress {
        pathway_id: row.pathway_id.clone(),
        started_at: row.started_at.clone(),
        completed_at: row.completed_at.clone(),
        completed_concepts,
        is_completed: row.completed_at.is_some(),
    }
}

fn sort_oldest_first(rows: &mut [PathwayCompletionRow]) {
    rows.sort_by(|a, b| {
        a.completed_at
            .cmp(&b.completed_at)
            .then_with(|| a.concept_id.cmp(&b.concept_id))
    });
}
