//! Onboarding singleton repository.
//!
//! # Responsibility
//! - Expose the single onboarding row with defaults substituted for missing
//!   or invalid data.
//! - Apply sparse field updates.
//!
//! # Invariants
//! - `get()` never fails and never returns nothing.
//! - An empty update performs no storage call.
//! - `reset()` restores defaults; the row is never removed.

use super::{degrade, write_failed, RepoResult};
use crate::db::{Collection, Record, StorageAdapter, SINGLETON_ID};
use crate::model::{to_record, OnboardingGoal, OnboardingRow, OnboardingState, OnboardingUpdate};
use crate::schema::{parse, parse_or, safe_parse};
use std::sync::Arc;

const COLLECTION: Collection = Collection::Onboarding;

pub struct OnboardingRepository {
    adapter: Arc<dyn StorageAdapter>,
}

impl OnboardingRepository {
    pub fn new(adapter: Arc<dyn StorageAdapter>) -> Self {
        Self { adapter }
    }

    pub fn get(&self) -> OnboardingRow {
        let raw = degrade(
            "onboarding.get",
            self.adapter.get_one(COLLECTION, SINGLETON_ID),
            None,
        );
        match raw {
            Some(raw) => parse_or(&raw, OnboardingRow::default()),
            None => OnboardingRow::default(),
        }
    }

    pub fn get_state(&self) -> OnboardingState {
        OnboardingState::from(&self.get())
    }

    /// Writes only the supplied fields.
    pub fn update(&self, update: &OnboardingUpdate) -> RepoResult<()> {
        let operation = "onboarding.update";
        let fields = update.to_fields();
        if fields.is_empty() {
            return Ok(());
        }

        let existing = self
            .adapter
            .get_one(COLLECTION, SINGLETON_ID)
            .map_err(|err| write_failed(operation, err))?;
        let current = existing.and_then(|raw| safe_parse::<OnboardingRow>(&raw).ok());
        let exists = current.is_some();

        let mut merged: Record = to_record(&current.unwrap_or_default())
            .map_err(|err| write_failed(operation, err))?;
        merged.extend(fields.clone());
        let row: OnboardingRow = parse(&merged).map_err(|err| write_failed(operation, err))?;

        if exists {
            return self
                .adapter
                .update(COLLECTION, SINGLETON_ID, &fields)
                .map_err(|err| write_failed(operation, err));
        }
        let record = to_record(&row).map_err(|err| write_failed(operation, err))?;
        self.adapter
            .upsert(COLLECTION, SINGLETON_ID, &record)
            .map_err(|err| write_failed(operation, err))
    }

    pub fn complete(&self) -> RepoResult<()> {
        self.update(&OnboardingUpdate {
            completed: Some(true),
            ..OnboardingUpdate::default()
        })
    }

    pub fn set_goal(&self, goal: Option<OnboardingGoal>) -> RepoResult<()> {
        self.update(&OnboardingUpdate {
            goal: Some(goal),
            ..OnboardingUpdate::default()
        })
    }

    /// Level must be within `1..=5`; `None` clears it.
    pub fn set_comfort_level(&self, level: Option<i64>) -> RepoResult<()> {
        self.update(&OnboardingUpdate {
            comfort_level: Some(level),
            ..OnboardingUpdate::default()
        })
    }

    pub fn mark_first_concept_viewed(&self) -> RepoResult<()> {
        self.update(&OnboardingUpdate {
            first_concept_viewed: Some(true),
            ..OnboardingUpdate::default()
        })
    }

    pub fn is_completed(&self) -> bool {
        self.get_state().completed
    }

    pub fn reset(&self) -> RepoResult<()> {
        self.adapter
            .delete_all(COLLECTION)
            .map_err(|err| write_failed("onboarding.reset", err))
    }
}
