//! Versioned migration registry and runner.
//!
//! # Responsibility
//! - Register schema changes in strictly increasing version order.
//! - Apply pending changes one at a time against either backend.
//!
//! # Invariants
//! - The recorded version only moves forward and is written after each step.
//! - A failing step stops the run; earlier steps stay recorded.
//! - Shipped migration bodies are never edited; new changes get new versions.

use super::kv::KeyValueStore;
use super::{StorageError, StorageResult};
use log::{error, info};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use serde::Serialize;
use std::time::Instant;

mod steps;

/// One historical schema change with a body per backend.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: fn(&SqlContext<'_>) -> StorageResult<()>,
    pub key_value: fn(&KeyValueContext<'_>) -> StorageResult<()>,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "add_concept_progress_flags",
        sql: steps::add_concept_progress_flags_sql,
        key_value: steps::add_concept_progress_flags_kv,
    },
    Migration {
        version: 2,
        description: "add_onboarding_details",
        sql: steps::add_onboarding_details_sql,
        key_value: steps::add_onboarding_details_kv,
    },
    Migration {
        version: 3,
        description: "normalize_pathway_completions",
        sql: steps::normalize_pathway_completions_sql,
        key_value: steps::normalize_pathway_completions_kv,
    },
];

/// Every migration shipped with this binary.
pub fn all_migrations() -> &'static [Migration] {
    MIGRATIONS
}

/// Returns the latest migration version known by this binary.
pub fn latest_version() -> u32 {
    latest_of(MIGRATIONS)
}

fn latest_of(migrations: &[Migration]) -> u32 {
    migrations.last().map_or(0, |migration| migration.version)
}

/// Structured outcome of one runner pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub success: bool,
    pub migrations_run: u32,
    pub current_version: u32,
    pub error: Option<String>,
}

/// Backend-specific version tracking plus step execution.
pub trait MigrationTarget {
    /// Short backend name for log lines.
    fn backend(&self) -> &'static str;
    /// Highest applied version; `0` for a pristine store.
    fn current_version(&self) -> StorageResult<u32>;
    fn apply(&self, migration: &Migration) -> StorageResult<()>;
    fn record_version(&self, version: u32) -> StorageResult<()>;
}

/// Applies every migration newer than the target's recorded version.
///
/// Never returns an error: failures are logged and reported in the result.
pub fn run_migrations(target: &dyn MigrationTarget, migrations: &[Migration]) -> MigrationReport {
    let backend = target.backend();

    if let Some(pair) = migrations
        .windows(2)
        .find(|pair| pair[0].version >= pair[1].version)
    {
        let message = format!(
            "migration versions must strictly increase: {} then {}",
            pair[0].version, pair[1].version
        );
        error!("event=migration_run module=db.migrations status=error backend={backend} error={message}");
        return MigrationReport {
            success: false,
            migrations_run: 0,
            current_version: 0,
            error: Some(message),
        };
    }

    let current = match target.current_version() {
        Ok(version) => version,
        Err(err) => {
            error!(
                "event=migration_run module=db.migrations status=error backend={backend} error_code=version_read_failed error={err}"
            );
            return MigrationReport {
                success: false,
                migrations_run: 0,
                current_version: 0,
                error: Some(err.to_string()),
            };
        }
    };

    let latest = latest_of(migrations);
    if current > latest {
        let err = StorageError::UnsupportedSchemaVersion {
            db_version: current,
            latest_supported: latest,
        };
        error!("event=migration_run module=db.migrations status=error backend={backend} error={err}");
        return MigrationReport {
            success: false,
            migrations_run: 0,
            current_version: current,
            error: Some(err.to_string()),
        };
    }

    let mut version = current;
    let mut migrations_run = 0;
    for migration in migrations.iter().filter(|m| m.version > current) {
        let started_at = Instant::now();
        let outcome = target
            .apply(migration)
            .and_then(|()| target.record_version(migration.version));

        if let Err(err) = outcome {
            error!(
                "event=migration_run module=db.migrations status=error backend={backend} version={} description={} duration_ms={} error={err}",
                migration.version,
                migration.description,
                started_at.elapsed().as_millis()
            );
            return MigrationReport {
                success: false,
                migrations_run,
                current_version: version,
                error: Some(format!(
                    "migration {} ({}) failed: {err}",
                    migration.version, migration.description
                )),
            };
        }

        info!(
            "event=migration_run module=db.migrations status=ok backend={backend} version={} description={} duration_ms={}",
            migration.version,
            migration.description,
            started_at.elapsed().as_millis()
        );
        version = migration.version;
        migrations_run += 1;
    }

    MigrationReport {
        success: true,
        migrations_run,
        current_version: version,
        error: None,
    }
}

/// Primitives a migration may use against the relational backend.
pub struct SqlContext<'a> {
    conn: &'a Connection,
    version: u32,
}

impl<'a> SqlContext<'a> {
    pub(crate) fn new(conn: &'a Connection, version: u32) -> Self {
        Self { conn, version }
    }

    pub fn execute_batch(&self, sql: &str) -> StorageResult<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    pub fn execute(&self, sql: &str, params: Vec<SqlValue>) -> StorageResult<usize> {
        Ok(self.conn.execute(sql, params_from_iter(params))?)
    }

    pub fn has_column(&self, table: &str, column: &str) -> StorageResult<bool> {
        let mut stmt = self.conn.prepare(&format!("PRAGMA table_info({table});"))?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let current: String = row.get(1)?;
            if current == column {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// `ALTER TABLE ... ADD COLUMN` guarded by a schema check.
    ///
    /// Returns whether the column was added.
    pub fn add_column_if_missing(
        &self,
        table: &str,
        column: &str,
        definition: &str,
    ) -> StorageResult<bool> {
        if self.has_column(table, column)? {
            self.log(&format!("column {table}.{column} already present"));
            return Ok(false);
        }
        self.execute_batch(&format!(
            "ALTER TABLE {table} ADD COLUMN {column} {definition};"
        ))?;
        self.log(&format!("added column {table}.{column}"));
        Ok(true)
    }

    pub fn log(&self, message: &str) {
        info!(
            "event=migration_step module=db.migrations backend=sqlite version={} message={message}",
            self.version
        );
    }
}

/// Primitives a migration may use against the flat key/value backend.
pub struct KeyValueContext<'a> {
    store: &'a dyn KeyValueStore,
    version: u32,
}

impl<'a> KeyValueContext<'a> {
    pub(crate) fn new(store: &'a dyn KeyValueStore, version: u32) -> Self {
        Self { store, version }
    }

    pub fn get_value(&self, key: &str) -> StorageResult<Option<String>> {
        self.store.get_item(key)
    }

    pub fn set_value(&self, key: &str, value: &str) -> StorageResult<()> {
        self.store.set_item(key, value)
    }

    pub fn log(&self, message: &str) {
        info!(
            "event=migration_step module=db.migrations backend=kv version={} message={message}",
            self.version
        );
    }
}
