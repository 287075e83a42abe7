//! Storage adapters, collection registry and schema migrations.
//!
//! # Responsibility
//! - Define one storage contract implemented by the relational and flat-store backends.
//! - Select the backend for the runtime platform exactly once.
//!
//! # Invariants
//! - Adapter methods surface store errors unmodified; interpretation belongs to repositories.
//! - `initialize()` is idempotent and the only fatal entry point.
//! - Raw SQL escape hatches exist only on the relational backend.

use crate::config::{DatabaseConfig, Platform, StorageLocation};
use crate::error::ErrorKind;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

pub mod collection;
pub mod kv;
pub mod migrations;
pub mod sqlite;

pub use collection::{completion_key, Collection, Filter, Record, SINGLETON_ID};
pub use kv::{JsonFileStore, KeyValueAdapter, KeyValueStore, MemoryKeyValueStore};
pub use migrations::MigrationReport;
pub use sqlite::SqliteAdapter;

/// File name of the relational database inside the configured directory.
pub const SQLITE_FILE_NAME: &str = "compass.sqlite3";
/// File name of the flat key/value document inside the configured directory.
pub const KV_FILE_NAME: &str = "compass_kv.json";

pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by storage adapters and migrations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("invalid json payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The physical store could not be opened.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("`{operation}` is unsupported on the {platform} platform")]
    Unsupported {
        operation: &'static str,
        platform: Platform,
    },
    #[error("invalid field name `{0}`")]
    InvalidIdentifier(String),
    #[error("invalid id `{id}` for collection `{collection}`")]
    InvalidKey { collection: &'static str, id: String },
    /// A stored blob is not the JSON shape its key requires.
    #[error("corrupt value under `{key}`: {message}")]
    Corrupt { key: String, message: String },
    #[error("database schema version {db_version} is newer than supported {latest_supported}")]
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unavailable(_) => ErrorKind::StorageUnavailable,
            Self::InvalidIdentifier(_) | Self::InvalidKey { .. } => ErrorKind::Validation,
            _ => ErrorKind::Persistence,
        }
    }
}

/// Uniform CRUD and key/value contract over one physical store.
///
/// Records cross this boundary as raw JSON objects; validation happens in
/// repositories, never here.
pub trait StorageAdapter: Send + Sync {
    /// Backend platform this adapter serves.
    fn platform(&self) -> Platform;

    /// Opens the store, creates required tables/keys and runs pending migrations.
    ///
    /// Concurrent callers share one in-flight initialization. A failed
    /// migration does not fail initialization; see [`Self::migration_report`].
    fn initialize(&self) -> StorageResult<()>;

    fn is_initialized(&self) -> bool;

    /// Outcome of the migration run performed by `initialize()`.
    fn migration_report(&self) -> Option<MigrationReport>;

    fn get_value(&self, key: &str) -> StorageResult<Option<String>>;
    fn set_value(&self, key: &str, value: &str) -> StorageResult<()>;
    fn delete_value(&self, key: &str) -> StorageResult<()>;

    fn get_one(&self, collection: Collection, id: &str) -> StorageResult<Option<Record>>;
    /// All records, newest first by the collection recency field.
    fn get_all(&self, collection: Collection) -> StorageResult<Vec<Record>>;
    /// Records matching every filter clause, in `get_all` order.
    fn get_where(&self, collection: Collection, filter: &Filter) -> StorageResult<Vec<Record>>;
    /// Fully replaces the record stored under `id`.
    fn upsert(&self, collection: Collection, id: &str, record: &Record) -> StorageResult<()>;
    /// Merges `fields` onto an existing record; no-op when the record is absent.
    fn update(&self, collection: Collection, id: &str, fields: &Record) -> StorageResult<()>;
    /// Removes one record; singleton collections are reset instead.
    fn delete(&self, collection: Collection, id: &str) -> StorageResult<()>;
    /// Removes every record; singleton collections are reset instead.
    fn delete_all(&self, collection: Collection) -> StorageResult<()>;
    fn count(&self, collection: Collection, filter: Option<&Filter>) -> StorageResult<u64>;

    fn raw_query(&self, _sql: &str, _params: &[Value]) -> StorageResult<Vec<Record>> {
        Err(StorageError::Unsupported {
            operation: "raw_query",
            platform: self.platform(),
        })
    }

    fn raw_execute(&self, _sql: &str, _params: &[Value]) -> StorageResult<usize> {
        Err(StorageError::Unsupported {
            operation: "raw_execute",
            platform: self.platform(),
        })
    }
}

/// Builds the adapter matching `config.platform`.
///
/// Native platforms get the relational backend, web gets the flat store.
/// Directory locations are created when missing.
pub fn create_adapter(config: &DatabaseConfig) -> StorageResult<Arc<dyn StorageAdapter>> {
    if let StorageLocation::Directory(dir) = &config.location {
        std::fs::create_dir_all(dir)?;
    }

    let adapter: Arc<dyn StorageAdapter> = match (config.platform, &config.location) {
        (Platform::Native, StorageLocation::InMemory) => Arc::new(SqliteAdapter::in_memory()),
        (Platform::Native, StorageLocation::Directory(dir)) => {
            Arc::new(SqliteAdapter::new(dir.join(SQLITE_FILE_NAME)))
        }
        (Platform::Web, StorageLocation::InMemory) => {
            Arc::new(KeyValueAdapter::new(Arc::new(MemoryKeyValueStore::new())))
        }
        (Platform::Web, StorageLocation::Directory(dir)) => Arc::new(KeyValueAdapter::new(
            Arc::new(JsonFileStore::new(dir.join(KV_FILE_NAME))),
        )),
    };
    Ok(adapter)
}
