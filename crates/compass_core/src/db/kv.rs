//! Flat key/value storage adapter.
//!
//! # Responsibility
//! - Provide string key/value stores (in-memory and single JSON file).
//! - Serialize each collection as one JSON object under one fixed key.
//! - Run versioned migrations tracked under `compass.schema_version`.
//!
//! # Invariants
//! - Collection writes are read-modify-write cycles over the whole blob; there
//!   is no cross-operation atomicity, callers serialize through one adapter.
//! - The onboarding collection is a single object, reset rather than removed.
//! - Settings live under the `compass.settings.` prefix.

use super::collection::{Collection, Filter, Record};
use super::migrations::{
    all_migrations, run_migrations, KeyValueContext, Migration, MigrationReport, MigrationTarget,
};
use super::{StorageAdapter, StorageError, StorageResult};
use crate::config::Platform;
use chrono::{SecondsFormat, Utc};
use log::{error, info, warn};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Key holding the flat-store schema version record.
pub const SCHEMA_VERSION_KEY: &str = "compass.schema_version";
const SETTINGS_PREFIX: &str = "compass.settings.";

/// Minimal string-to-string store the flat adapter is built on.
pub trait KeyValueStore: Send + Sync {
    /// Opens the backing medium. Called once by adapter initialization.
    fn open(&self) -> StorageResult<()> {
        Ok(())
    }
    fn get_item(&self, key: &str) -> StorageResult<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> StorageResult<()>;
    fn remove_item(&self, key: &str) -> StorageResult<()>;
}

/// Process-lifetime store.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> StorageResult<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> StorageResult<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// Store persisted as one JSON document, rewritten on every change.
///
/// Writes go to a sibling temp file first and are renamed into place.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: OnceCell<Mutex<BTreeMap<String, String>>>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: OnceCell::new(),
        }
    }

    fn entries(&self) -> StorageResult<&Mutex<BTreeMap<String, String>>> {
        self.entries.get_or_try_init(|| {
            if !self.path.exists() {
                return Ok(Mutex::new(BTreeMap::new()));
            }
            let raw = std::fs::read_to_string(&self.path)?;
            let entries: BTreeMap<String, String> = serde_json::from_str(&raw)?;
            Ok(Mutex::new(entries))
        })
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> StorageResult<()> {
        let tmp_path = self.path.with_extension("json.tmp");
        if let Err(err) = std::fs::write(&tmp_path, serde_json::to_vec(entries)?) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(err.into());
        }
        rename_with_fallback(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Applies `change` to a copy of the entries and keeps it only once it
    /// is on disk.
    fn commit(
        &self,
        change: impl FnOnce(&mut BTreeMap<String, String>) -> bool,
    ) -> StorageResult<()> {
        let mut entries = self.entries()?.lock();
        let mut next = entries.clone();
        if !change(&mut next) {
            return Ok(());
        }
        self.persist(&next)?;
        *entries = next;
        Ok(())
    }
}

/// Renames `tmp_path` over `destination`, removing an existing target and
/// retrying once. The temp file is removed when the retry fails too.
fn rename_with_fallback(tmp_path: &Path, destination: &Path) -> io::Result<()> {
    if let Err(initial_err) = std::fs::rename(tmp_path, destination) {
        let _ = std::fs::remove_file(destination);
        std::fs::rename(tmp_path, destination).map_err(|retry_err| {
            let _ = std::fs::remove_file(tmp_path);
            io::Error::new(
                retry_err.kind(),
                format!("rename failed (initial: {initial_err}, retry: {retry_err})"),
            )
        })?;
    }
    Ok(())
}

impl KeyValueStore for JsonFileStore {
    fn open(&self) -> StorageResult<()> {
        self.entries()
            .map(drop)
            .map_err(|err| StorageError::Unavailable(format!("{}: {err}", self.path.display())))
    }

    fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.entries()?.lock().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> StorageResult<()> {
        self.commit(|entries| {
            entries.insert(key.to_string(), value.to_string());
            true
        })
    }

    fn remove_item(&self, key: &str) -> StorageResult<()> {
        self.commit(|entries| entries.remove(key).is_some())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SchemaVersionRecord {
    version: u32,
    applied_at: String,
}

/// Storage adapter over any [`KeyValueStore`].
pub struct KeyValueAdapter {
    store: Arc<dyn KeyValueStore>,
    migrations: &'static [Migration],
    initialized: OnceCell<()>,
    report: Mutex<Option<MigrationReport>>,
}

impl KeyValueAdapter {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_migrations(store, all_migrations())
    }

    /// Adapter running a caller-supplied migration set.
    pub fn with_migrations(store: Arc<dyn KeyValueStore>, migrations: &'static [Migration]) -> Self {
        Self {
            store,
            migrations,
            initialized: OnceCell::new(),
            report: Mutex::new(None),
        }
    }

    fn ensure_initialized(&self) -> StorageResult<()> {
        self.initialized.get_or_try_init(|| self.open_store()).map(drop)
    }

    fn open_store(&self) -> StorageResult<()> {
        let started_at = Instant::now();
        info!("event=kv_open module=db status=start");

        if let Err(err) = self.store.open() {
            error!(
                "event=kv_open module=db status=error duration_ms={} error_code=kv_open_failed error={err}",
                started_at.elapsed().as_millis()
            );
            return Err(err);
        }

        let onboarding = Collection::Onboarding;
        if self.store.get_item(onboarding.storage_key())?.is_none() {
            if let Some(defaults) = onboarding.singleton_defaults() {
                self.save_value(onboarding.storage_key(), &Value::Object(defaults))?;
            }
        }

        let report = run_migrations(
            &KeyValueMigrationTarget {
                store: self.store.as_ref(),
            },
            self.migrations,
        );
        if report.success {
            info!(
                "event=kv_open module=db status=ok duration_ms={} schema_version={} migrations_run={}",
                started_at.elapsed().as_millis(),
                report.current_version,
                report.migrations_run
            );
        } else {
            warn!(
                "event=kv_open module=db status=degraded duration_ms={} schema_version={}",
                started_at.elapsed().as_millis(),
                report.current_version
            );
        }
        *self.report.lock() = Some(report);
        Ok(())
    }

    fn load_value(&self, key: &str) -> StorageResult<Option<Value>> {
        match self.store.get_item(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn save_value(&self, key: &str, value: &Value) -> StorageResult<()> {
        self.store.set_item(key, &value.to_string())
    }

    /// Loads the id-to-record map of a keyed collection.
    fn load_map(&self, collection: Collection) -> StorageResult<Record> {
        self.ensure_initialized()?;
        let key = collection.storage_key();
        match self.load_value(key)? {
            None => Ok(Record::new()),
            Some(Value::Object(map)) => Ok(map),
            Some(_) => Err(StorageError::Corrupt {
                key: key.to_string(),
                message: "expected an object of records".to_string(),
            }),
        }
    }

    fn save_map(&self, collection: Collection, map: Record) -> StorageResult<()> {
        self.save_value(collection.storage_key(), &Value::Object(map))
    }

    fn load_singleton(&self, collection: Collection) -> StorageResult<Option<Record>> {
        self.ensure_initialized()?;
        match self.load_value(collection.storage_key())? {
            Some(Value::Object(record)) => Ok(Some(record)),
            _ => Ok(None),
        }
    }

    fn reset_singleton(&self, collection: Collection) -> StorageResult<()> {
        self.ensure_initialized()?;
        let defaults = collection.singleton_defaults().unwrap_or_default();
        self.save_value(collection.storage_key(), &Value::Object(defaults))
    }

    fn sorted_records(&self, collection: Collection) -> StorageResult<Vec<Record>> {
        if collection.is_singleton() {
            return Ok(self.load_singleton(collection)?.into_iter().collect());
        }
        let mut records: Vec<Record> = self
            .load_map(collection)?
            .into_iter()
            .filter_map(|(_, value)| match value {
                Value::Object(record) => Some(record),
                _ => None,
            })
            .collect();
        if let Some(field) = collection.recency_field() {
            records.sort_by(|left, right| compare_desc(left.get(field), right.get(field)));
        }
        Ok(records)
    }
}

fn compare_desc(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    let left = left.and_then(Value::as_str);
    let right = right.and_then(Value::as_str);
    right.cmp(&left)
}

fn settings_key(key: &str) -> String {
    format!("{SETTINGS_PREFIX}{key}")
}

impl StorageAdapter for KeyValueAdapter {
    fn platform(&self) -> Platform {
        Platform::Web
    }

    fn initialize(&self) -> StorageResult<()> {
        self.ensure_initialized()
    }

    fn is_initialized(&self) -> bool {
        self.initialized.get().is_some()
    }

    fn migration_report(&self) -> Option<MigrationReport> {
        self.report.lock().clone()
    }

    fn get_value(&self, key: &str) -> StorageResult<Option<String>> {
        self.ensure_initialized()?;
        self.store.get_item(&settings_key(key))
    }

    fn set_value(&self, key: &str, value: &str) -> StorageResult<()> {
        self.ensure_initialized()?;
        self.store.set_item(&settings_key(key), value)
    }

    fn delete_value(&self, key: &str) -> StorageResult<()> {
        self.ensure_initialized()?;
        self.store.remove_item(&settings_key(key))
    }

    fn get_one(&self, collection: Collection, id: &str) -> StorageResult<Option<Record>> {
        if collection.is_singleton() {
            return self.load_singleton(collection);
        }
        collection.key_values(id)?;
        match self.load_map(collection)?.remove(id) {
            Some(Value::Object(record)) => Ok(Some(record)),
            _ => Ok(None),
        }
    }

    fn get_all(&self, collection: Collection) -> StorageResult<Vec<Record>> {
        self.sorted_records(collection)
    }

    fn get_where(&self, collection: Collection, filter: &Filter) -> StorageResult<Vec<Record>> {
        let mut records = self.sorted_records(collection)?;
        records.retain(|record| filter.matches(record));
        Ok(records)
    }

    fn upsert(&self, collection: Collection, id: &str, record: &Record) -> StorageResult<()> {
        let mut stored = collection.singleton_defaults().unwrap_or_default();
        for (field, value) in record {
            stored.insert(field.clone(), value.clone());
        }

        if collection.is_singleton() {
            self.ensure_initialized()?;
            return self.save_value(collection.storage_key(), &Value::Object(stored));
        }

        for (column, value) in collection.key_values(id)? {
            stored.insert(column.to_string(), Value::String(value));
        }
        let mut map = self.load_map(collection)?;
        map.insert(id.to_string(), Value::Object(stored));
        self.save_map(collection, map)
    }

    fn update(&self, collection: Collection, id: &str, fields: &Record) -> StorageResult<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let key_columns = collection.key_columns();

        if collection.is_singleton() {
            let Some(mut record) = self.load_singleton(collection)? else {
                return Ok(());
            };
            for (field, value) in fields {
                if !key_columns.contains(&field.as_str()) {
                    record.insert(field.clone(), value.clone());
                }
            }
            return self.save_value(collection.storage_key(), &Value::Object(record));
        }

        collection.key_values(id)?;
        let mut map = self.load_map(collection)?;
        let Some(Value::Object(record)) = map.get_mut(id) else {
            return Ok(());
        };
        for (field, value) in fields {
            if !key_columns.contains(&field.as_str()) {
                record.insert(field.clone(), value.clone());
            }
        }
        self.save_map(collection, map)
    }

    fn delete(&self, collection: Collection, id: &str) -> StorageResult<()> {
        if collection.is_singleton() {
            return self.reset_singleton(collection);
        }
        collection.key_values(id)?;
        let mut map = self.load_map(collection)?;
        if map.remove(id).is_some() {
            self.save_map(collection, map)?;
        }
        Ok(())
    }

    fn delete_all(&self, collection: Collection) -> StorageResult<()> {
        if collection.is_singleton() {
            return self.reset_singleton(collection);
        }
        self.ensure_initialized()?;
        self.save_map(collection, Record::new())
    }

    fn count(&self, collection: Collection, filter: Option<&Filter>) -> StorageResult<u64> {
        let records = match filter {
            Some(filter) => self.get_where(collection, filter)?,
            None => self.sorted_records(collection)?,
        };
        Ok(records.len() as u64)
    }
}

struct KeyValueMigrationTarget<'store> {
    store: &'store dyn KeyValueStore,
}

impl MigrationTarget for KeyValueMigrationTarget<'_> {
    fn backend(&self) -> &'static str {
        "kv"
    }

    fn current_version(&self) -> StorageResult<u32> {
        let Some(raw) = self.store.get_item(SCHEMA_VERSION_KEY)? else {
            return Ok(0);
        };
        let record: SchemaVersionRecord = serde_json::from_str(&raw)?;
        Ok(record.version)
    }

    fn apply(&self, migration: &Migration) -> StorageResult<()> {
        (migration.key_value)(&KeyValueContext::new(self.store, migration.version))
    }

    fn record_version(&self, version: u32) -> StorageResult<()> {
        let record = SchemaVersionRecord {
            version,
            applied_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        self.store
            .set_item(SCHEMA_VERSION_KEY, &serde_json::to_string(&record)?)
    }
}
