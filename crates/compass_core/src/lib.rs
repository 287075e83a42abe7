//! Local persistence for the Compass content app.
//! Storage backends, validated repositories and schema migrations live here.

pub mod config;
pub mod db;
pub mod error;
pub mod facade;
pub mod logging;
pub mod model;
pub mod repo;
pub mod schema;

pub use config::{ConfigError, DatabaseConfig, Platform, StorageLocation};
pub use db::{create_adapter, Collection, Filter, MigrationReport, Record, StorageAdapter, StorageError};
pub use error::ErrorKind;
pub use facade::{reset_shared_database, shared_database, Database};
pub use logging::{default_log_level, init_logging, logging_status, LogLevel, LoggingError};
pub use repo::{RepoError, RepoResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
