//! Runtime platform and storage location configuration.

use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use thiserror::Error;

use crate::db::StorageError;

/// Runtime platform family; decides which storage backend is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// Mobile/desktop targets backed by embedded SQLite.
    Native,
    /// Web targets backed by a flat key/value store.
    Web,
}

impl Platform {
    /// Platform of the running binary.
    pub fn current() -> Self {
        if cfg!(target_arch = "wasm32") {
            Self::Web
        } else {
            Self::Native
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Web => "web",
        }
    }
}

impl Display for Platform {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the physical store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageLocation {
    /// Process-lifetime store; used by tests and previews.
    InMemory,
    /// Directory holding the database file (created on demand).
    Directory(PathBuf),
}

/// Storage selection for one database facade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub platform: Platform,
    pub location: StorageLocation,
}

impl DatabaseConfig {
    pub fn new(platform: Platform, location: StorageLocation) -> Self {
        Self { platform, location }
    }

    pub fn in_memory(platform: Platform) -> Self {
        Self::new(platform, StorageLocation::InMemory)
    }

    pub fn for_current_platform(location: StorageLocation) -> Self {
        Self::new(Platform::current(), location)
    }
}

/// Errors from building the shared database instance.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("shared database already configured as {active:?}; refusing to switch to {requested:?}")]
    Conflict {
        active: DatabaseConfig,
        requested: DatabaseConfig,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
}
