//! Database facade: one adapter, five repositories.
//!
//! # Responsibility
//! - Wire every repository to a single shared adapter.
//! - Provide the process-wide instance and its explicit reset hook.
//! - Coordinate `clear_all` across repositories.
//!
//! # Invariants
//! - All repositories of one facade share one adapter instance.
//! - `clear_all` resets the onboarding singleton and leaves settings alone.
//! - The shared instance is built at most once per configuration.

use crate::config::{ConfigError, DatabaseConfig, Platform};
use crate::db::{create_adapter, MigrationReport, StorageAdapter, StorageResult};
use crate::repo::{
    ConceptRepository, JournalRepository, OnboardingRepository, PathwayRepository, RepoResult,
    SettingsRepository,
};
use log::{error, info};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

static SHARED: Lazy<Mutex<Option<(DatabaseConfig, Arc<Database>)>>> =
    Lazy::new(|| Mutex::new(None));

pub struct Database {
    adapter: Arc<dyn StorageAdapter>,
    concepts: ConceptRepository,
    journal: JournalRepository,
    onboarding: OnboardingRepository,
    pathways: PathwayRepository,
    settings: SettingsRepository,
}

impl Database {
    pub fn new(adapter: Arc<dyn StorageAdapter>) -> Self {
        Self {
            concepts: ConceptRepository::new(Arc::clone(&adapter)),
            journal: JournalRepository::new(Arc::clone(&adapter)),
            onboarding: OnboardingRepository::new(Arc::clone(&adapter)),
            pathways: PathwayRepository::new(Arc::clone(&adapter)),
            settings: SettingsRepository::new(Arc::clone(&adapter)),
            adapter,
        }
    }

    pub fn from_config(config: &DatabaseConfig) -> StorageResult<Self> {
        Ok(Self::new(create_adapter(config)?))
    }

    /// Initializes the underlying adapter; concurrent callers share one run.
    pub fn initialize(&self) -> StorageResult<()> {
        self.adapter.initialize()
    }

    pub fn is_initialized(&self) -> bool {
        self.adapter.is_initialized()
    }

    pub fn platform(&self) -> Platform {
        self.adapter.platform()
    }

    pub fn migration_report(&self) -> Option<MigrationReport> {
        self.adapter.migration_report()
    }

    pub fn concepts(&self) -> &ConceptRepository {
        &self.concepts
    }

    pub fn journal(&self) -> &JournalRepository {
        &self.journal
    }

    pub fn onboarding(&self) -> &OnboardingRepository {
        &self.onboarding
    }

    pub fn pathways(&self) -> &PathwayRepository {
        &self.pathways
    }

    pub fn settings(&self) -> &SettingsRepository {
        &self.settings
    }

    /// Clears every entity collection concurrently and resets onboarding.
    ///
    /// Every clear is attempted; the first failure is returned.
    pub fn clear_all(&self) -> RepoResult<()> {
        let started = Instant::now();
        let results: Vec<RepoResult<()>> = thread::scope(|scope| {
            let tasks = [
                scope.spawn(|| self.concepts.delete_all()),
                scope.spawn(|| self.journal.delete_all()),
                scope.spawn(|| self.pathways.delete_all()),
                scope.spawn(|| self.onboarding.reset()),
            ];
            tasks
                .into_iter()
                .map(|task| match task.join() {
                    Ok(result) => result,
                    Err(payload) => std::panic::resume_unwind(payload),
                })
                .collect()
        });

        let failed = results.iter().filter(|result| result.is_err()).count();
        let duration_ms = started.elapsed().as_millis();
        match results.into_iter().find_map(Result::err) {
            None => {
                info!("event=clear_all module=facade status=ok duration_ms={duration_ms}");
                Ok(())
            }
            Some(err) => {
                error!(
                    "event=clear_all module=facade status=error failed={failed} duration_ms={duration_ms} error_kind={}",
                    err.kind()
                );
                Err(err)
            }
        }
    }
}

/// Returns the process-wide database, building it on first use.
///
/// Later calls must pass an equal configuration.
pub fn shared_database(config: &DatabaseConfig) -> Result<Arc<Database>, ConfigError> {
    let mut shared = SHARED.lock();
    if let Some((active, database)) = shared.as_ref() {
        if active != config {
            return Err(ConfigError::Conflict {
                active: active.clone(),
                requested: config.clone(),
            });
        }
        return Ok(Arc::clone(database));
    }

    let database = Arc::new(Database::from_config(config)?);
    info!(
        "event=shared_database module=facade status=ok platform={}",
        config.platform
    );
    *shared = Some((config.clone(), Arc::clone(&database)));
    Ok(database)
}

/// Drops the process-wide instance so the next call rebuilds it.
pub fn reset_shared_database() {
    SHARED.lock().take();
}
