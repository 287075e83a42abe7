use compass_core::db::{
    Collection, Filter, MigrationReport, Record, StorageAdapter, StorageError, StorageResult,
};
use compass_core::model::{ConceptStatus, OnboardingRow, OnboardingUpdate};
use compass_core::repo::{
    ConceptRepository, JournalRepository, OnboardingRepository, PathwayRepository,
    SettingsRepository,
};
use compass_core::{Database, ErrorKind, Platform};
use std::sync::Arc;

/// Adapter whose backing store can never be opened.
struct UnavailableAdapter;

fn unavailable<T>() -> StorageResult<T> {
    Err(StorageError::Unavailable("store offline".to_string()))
}

impl StorageAdapter for UnavailableAdapter {
    fn platform(&self) -> Platform {
        Platform::Native
    }

    fn initialize(&self) -> StorageResult<()> {
        unavailable()
    }

    fn is_initialized(&self) -> bool {
        false
    }

    fn migration_report(&self) -> Option<MigrationReport> {
        None
    }

    fn get_value(&self, _key: &str) -> StorageResult<Option<String>> {
        unavailable()
    }

    fn set_value(&self, _key: &str, _value: &str) -> StorageResult<()> {
        unavailable()
    }

    fn delete_value(&self, _key: &str) -> StorageResult<()> {
        unavailable()
    }

    fn get_one(&self, _collection: Collection, _id: &str) -> StorageResult<Option<Record>> {
        unavailable()
    }

    fn get_all(&self, _collection: Collection) -> StorageResult<Vec<Record>> {
        unavailable()
    }

    fn get_where(&self, _collection: Collection, _filter: &Filter) -> StorageResult<Vec<Record>> {
        unavailable()
    }

    fn upsert(&self, _collection: Collection, _id: &str, _record: &Record) -> StorageResult<()> {
        unavailable()
    }

    fn update(&self, _collection: Collection, _id: &str, _fields: &Record) -> StorageResult<()> {
        unavailable()
    }

    fn delete(&self, _collection: Collection, _id: &str) -> StorageResult<()> {
        unavailable()
    }

    fn delete_all(&self, _collection: Collection) -> StorageResult<()> {
        unavailable()
    }

    fn count(&self, _collection: Collection, _filter: Option<&Filter>) -> StorageResult<u64> {
        unavailable()
    }
}

fn adapter() -> Arc<dyn StorageAdapter> {
    Arc::new(UnavailableAdapter)
}

fn assert_unavailable<T: std::fmt::Debug>(result: Result<T, compass_core::RepoError>) {
    assert_eq!(result.unwrap_err().kind(), ErrorKind::StorageUnavailable);
}

#[test]
fn concept_reads_degrade_and_writes_fail() {
    let repo = ConceptRepository::new(adapter());
    assert!(repo.get("pairing").is_none());
    assert!(repo.get_all().is_empty());
    assert!(repo.get_by_status(ConceptStatus::Curious).is_empty());
    assert!(repo.get_unlocked().is_empty());
    assert!(repo.get_mastered().is_empty());
    assert!(!repo.is_unlocked("pairing"));
    assert!(!repo.is_mastered("pairing"));
    assert_eq!(repo.get_explored_count(), 0);
    assert_eq!(repo.get_resonates_count(), 0);

    assert_unavailable(repo.update_status("pairing", ConceptStatus::Resonates));
    assert_unavailable(repo.mark_explored("pairing"));
    assert_unavailable(repo.unlock("pairing"));
    assert_unavailable(repo.master("pairing"));
    assert_unavailable(repo.delete("pairing"));
    assert_unavailable(repo.delete_all());
}

#[test]
fn journal_reads_degrade_and_writes_fail() {
    let repo = JournalRepository::new(adapter());
    assert!(repo.get("entry").is_none());
    assert!(repo.get_all().is_empty());
    assert!(repo.get_by_concept("pairing").is_empty());
    assert_eq!(repo.count(), 0);

    assert_unavailable(repo.create("private words", Some("pairing")));
    assert_unavailable(repo.update("entry", "changed"));
    assert_unavailable(repo.delete("entry"));
    assert_unavailable(repo.delete_all());
}

#[test]
fn onboarding_reads_fall_back_to_defaults_and_writes_fail() {
    let repo = OnboardingRepository::new(adapter());
    assert_eq!(repo.get(), OnboardingRow::default());
    assert!(!repo.get_state().completed);
    assert!(!repo.is_completed());

    repo.update(&OnboardingUpdate::default()).unwrap();
    assert_unavailable(repo.complete());
    assert_unavailable(repo.set_goal(None));
    assert_unavailable(repo.set_comfort_level(Some(3)));
    assert_unavailable(repo.mark_first_concept_viewed());
    assert_unavailable(repo.reset());
}

#[test]
fn pathway_reads_degrade_and_writes_fail() {
    let repo = PathwayRepository::new(adapter());
    assert!(repo.get("intro").is_none());
    assert!(repo.get_all().is_empty());
    assert!(!repo.is_completed("intro"));
    assert!(repo.get_completed_concepts("intro").is_empty());
    assert!(repo.get_domain("intro").is_none());
    assert!(repo.get_all_domain().is_empty());

    assert_unavailable(repo.start("intro"));
    assert_unavailable(repo.update_progress("intro", "pairing", 3));
    assert_unavailable(repo.delete("intro"));
    assert_unavailable(repo.delete_all());
}

#[test]
fn settings_reads_use_defaults_and_writes_fail() {
    let repo = SettingsRepository::new(adapter());
    assert_eq!(repo.get("theme"), None);
    assert!(repo.get_bool("haptics", true));
    assert_eq!(repo.get_number("volume", 0.5), 0.5);
    assert_eq!(repo.get_json("topics", vec!["trust".to_string()]), vec!["trust"]);

    assert_unavailable(repo.set("theme", "dark"));
    assert_unavailable(repo.set_bool("haptics", false));
    assert_unavailable(repo.set_number("volume", 1.0));
    assert_unavailable(repo.set_json("topics", &["play"]));
    assert_unavailable(repo.delete("theme"));
}

#[test]
fn facade_surfaces_storage_failures() {
    let db = Database::new(adapter());
    assert_eq!(
        db.initialize().unwrap_err().kind(),
        ErrorKind::StorageUnavailable
    );
    assert!(!db.is_initialized());
    assert_unavailable(db.clear_all());
}
