//! Relational storage adapter over embedded SQLite.
//!
//! # Responsibility
//! - Open file or in-memory connections and create the baseline schema.
//! - Run versioned migrations tracked in `schema_migrations`.
//! - Compile collection operations to parameterized SQL.
//!
//! # Invariants
//! - The connection is opened at most once per adapter instance.
//! - The onboarding row (`id = 1`) always exists and is reset, never deleted.
//! - Only validated identifiers are interpolated into SQL text.

use super::collection::{validate_identifier, Collection, Filter, Record};
use super::migrations::{
    all_migrations, run_migrations, Migration, MigrationReport, MigrationTarget, SqlContext,
};
use super::{StorageAdapter, StorageError, StorageResult};
use crate::config::Platform;
use chrono::{SecondsFormat, Utc};
use log::{error, info, warn};
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, MutexGuard};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde_json::{Number, Value};
use std::path::PathBuf;
use std::time::{Duration, Instant};

const BASE_SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS user_concepts (
    concept_id TEXT PRIMARY KEY,
    status TEXT NOT NULL DEFAULT 'unexplored',
    is_unlocked INTEGER NOT NULL DEFAULT 0,
    is_mastered INTEGER NOT NULL DEFAULT 0,
    explored_at TEXT,
    updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS journal_entries (
    id TEXT PRIMARY KEY,
    concept_id TEXT,
    content TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS onboarding (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    completed INTEGER NOT NULL DEFAULT 0,
    goal TEXT,
    comfort_level INTEGER,
    first_concept_viewed INTEGER NOT NULL DEFAULT 0
);
INSERT OR IGNORE INTO onboarding (id) VALUES (1);
CREATE TABLE IF NOT EXISTS pathway_progress (
    pathway_id TEXT PRIMARY KEY,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    concepts_completed TEXT NOT NULL DEFAULT '[]'
);
CREATE TABLE IF NOT EXISTS pathway_concept_completions (
    pathway_id TEXT NOT NULL,
    concept_id TEXT NOT NULL,
    completed_at TEXT NOT NULL,
    PRIMARY KEY (pathway_id, concept_id)
);
CREATE INDEX IF NOT EXISTS idx_pathway_completions_pathway
    ON pathway_concept_completions(pathway_id);
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);
";

#[derive(Debug, Clone)]
enum DbLocation {
    File(PathBuf),
    Memory,
}

impl DbLocation {
    fn mode(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::Memory => "memory",
        }
    }
}

/// SQLite-backed storage adapter.
pub struct SqliteAdapter {
    location: DbLocation,
    migrations: &'static [Migration],
    conn: OnceCell<Mutex<Connection>>,
    report: Mutex<Option<MigrationReport>>,
}

impl SqliteAdapter {
    /// Adapter for a database file; nothing is opened until first use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_location(DbLocation::File(path.into()), all_migrations())
    }

    pub fn in_memory() -> Self {
        Self::with_location(DbLocation::Memory, all_migrations())
    }

    /// File adapter running a caller-supplied migration set.
    pub fn with_migrations(path: impl Into<PathBuf>, migrations: &'static [Migration]) -> Self {
        Self::with_location(DbLocation::File(path.into()), migrations)
    }

    fn with_location(location: DbLocation, migrations: &'static [Migration]) -> Self {
        Self {
            location,
            migrations,
            conn: OnceCell::new(),
            report: Mutex::new(None),
        }
    }

    fn connection(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        let conn = self.conn.get_or_try_init(|| self.open_connection())?;
        Ok(conn.lock())
    }

    fn open_connection(&self) -> StorageResult<Mutex<Connection>> {
        let started_at = Instant::now();
        let mode = self.location.mode();
        info!("event=db_open module=db status=start mode={mode}");

        let opened = match &self.location {
            DbLocation::File(path) => Connection::open(path),
            DbLocation::Memory => Connection::open_in_memory(),
        };
        let conn = match opened {
            Ok(conn) => conn,
            Err(err) => {
                error!(
                    "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_open_failed error={err}",
                    started_at.elapsed().as_millis()
                );
                return Err(StorageError::Unavailable(err.to_string()));
            }
        };

        if let Err(err) = bootstrap_connection(&conn) {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_bootstrap_failed error={err}",
                started_at.elapsed().as_millis()
            );
            return Err(err);
        }

        let report = run_migrations(&SqliteMigrationTarget { conn: &conn }, self.migrations);
        if report.success {
            info!(
                "event=db_open module=db status=ok mode={mode} duration_ms={} schema_version={} migrations_run={}",
                started_at.elapsed().as_millis(),
                report.current_version,
                report.migrations_run
            );
        } else {
            warn!(
                "event=db_open module=db status=degraded mode={mode} duration_ms={} schema_version={}",
                started_at.elapsed().as_millis(),
                report.current_version
            );
        }
        *self.report.lock() = Some(report);

        Ok(Mutex::new(conn))
    }
}

fn bootstrap_connection(conn: &Connection) -> StorageResult<()> {
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.execute_batch(BASE_SCHEMA_SQL)?;
    Ok(())
}

impl StorageAdapter for SqliteAdapter {
    fn platform(&self) -> Platform {
        Platform::Native
    }

    fn initialize(&self) -> StorageResult<()> {
        self.connection().map(drop)
    }

    fn is_initialized(&self) -> bool {
        self.conn.get().is_some()
    }

    fn migration_report(&self) -> Option<MigrationReport> {
        self.report.lock().clone()
    }

    fn get_value(&self, key: &str) -> StorageResult<Option<String>> {
        let conn = self.connection()?;
        let value = conn
            .query_row("SELECT value FROM settings WHERE key = ?1;", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set_value(&self, key: &str, value: &str) -> StorageResult<()> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2);",
            params![key, value],
        )?;
        Ok(())
    }

    fn delete_value(&self, key: &str) -> StorageResult<()> {
        let conn = self.connection()?;
        conn.execute("DELETE FROM settings WHERE key = ?1;", [key])?;
        Ok(())
    }

    fn get_one(&self, collection: Collection, id: &str) -> StorageResult<Option<Record>> {
        let (clause, binds) = key_clause(collection, id)?;
        let sql = format!("SELECT * FROM {} WHERE {clause} LIMIT 1;", collection.table());
        let conn = self.connection()?;
        let mut records = query_records(&conn, &sql, binds)?;
        Ok(records.pop())
    }

    fn get_all(&self, collection: Collection) -> StorageResult<Vec<Record>> {
        let sql = format!(
            "SELECT * FROM {}{};",
            collection.table(),
            order_clause(collection)
        );
        let conn = self.connection()?;
        query_records(&conn, &sql, Vec::new())
    }

    fn get_where(&self, collection: Collection, filter: &Filter) -> StorageResult<Vec<Record>> {
        let (clause, binds) = filter_clause(filter)?;
        let sql = format!(
            "SELECT * FROM {}{clause}{};",
            collection.table(),
            order_clause(collection)
        );
        let conn = self.connection()?;
        query_records(&conn, &sql, binds)
    }

    fn upsert(&self, collection: Collection, id: &str, record: &Record) -> StorageResult<()> {
        let mut row = collection.singleton_defaults().unwrap_or_default();
        for (field, value) in record {
            row.insert(field.clone(), value.clone());
        }
        for (column, value) in collection.key_values(id)? {
            row.insert(column.to_string(), key_json(collection, value));
        }

        let mut columns = Vec::with_capacity(row.len());
        let mut binds = Vec::with_capacity(row.len());
        for (field, value) in &row {
            validate_identifier(field)?;
            columns.push(field.as_str());
            binds.push(json_to_sql(value));
        }
        let placeholders = (1..=binds.len())
            .map(|index| format!("?{index}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT OR REPLACE INTO {} ({}) VALUES ({placeholders});",
            collection.table(),
            columns.join(", ")
        );

        let conn = self.connection()?;
        conn.execute(&sql, params_from_iter(binds))?;
        Ok(())
    }

    fn update(&self, collection: Collection, id: &str, fields: &Record) -> StorageResult<()> {
        let key_columns = collection.key_columns();
        let mut assignments = Vec::new();
        let mut binds = Vec::new();
        for (field, value) in fields {
            if key_columns.contains(&field.as_str()) {
                continue;
            }
            validate_identifier(field)?;
            binds.push(json_to_sql(value));
            assignments.push(format!("{field} = ?{}", binds.len()));
        }
        if assignments.is_empty() {
            return Ok(());
        }

        let (clause, key_binds) = key_clause_from(collection, id, binds.len())?;
        binds.extend(key_binds);
        let sql = format!(
            "UPDATE {} SET {} WHERE {clause};",
            collection.table(),
            assignments.join(", ")
        );

        let conn = self.connection()?;
        conn.execute(&sql, params_from_iter(binds))?;
        Ok(())
    }

    fn delete(&self, collection: Collection, id: &str) -> StorageResult<()> {
        if collection.is_singleton() {
            return self.delete_all(collection);
        }
        let (clause, binds) = key_clause(collection, id)?;
        let sql = format!("DELETE FROM {} WHERE {clause};", collection.table());
        let conn = self.connection()?;
        conn.execute(&sql, params_from_iter(binds))?;
        Ok(())
    }

    fn delete_all(&self, collection: Collection) -> StorageResult<()> {
        if collection.is_singleton() {
            return self.upsert(collection, super::SINGLETON_ID, &Record::new());
        }
        let conn = self.connection()?;
        conn.execute(&format!("DELETE FROM {};", collection.table()), [])?;
        Ok(())
    }

    fn count(&self, collection: Collection, filter: Option<&Filter>) -> StorageResult<u64> {
        let (clause, binds) = match filter {
            Some(filter) => filter_clause(filter)?,
            None => (String::new(), Vec::new()),
        };
        let sql = format!("SELECT COUNT(*) FROM {}{clause};", collection.table());
        let conn = self.connection()?;
        let count: i64 = conn.query_row(&sql, params_from_iter(binds), |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    fn raw_query(&self, sql: &str, params: &[Value]) -> StorageResult<Vec<Record>> {
        let conn = self.connection()?;
        query_records(&conn, sql, params.iter().map(json_to_sql).collect())
    }

    fn raw_execute(&self, sql: &str, params: &[Value]) -> StorageResult<usize> {
        let conn = self.connection()?;
        let changed = conn.execute(sql, params_from_iter(params.iter().map(json_to_sql)))?;
        Ok(changed)
    }
}

struct SqliteMigrationTarget<'conn> {
    conn: &'conn Connection,
}

impl MigrationTarget for SqliteMigrationTarget<'_> {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    fn current_version(&self) -> StorageResult<u32> {
        let version: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations;",
            [],
            |row| row.get(0),
        )?;
        Ok(u32::try_from(version).unwrap_or_default())
    }

    fn apply(&self, migration: &Migration) -> StorageResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        (migration.sql)(&SqlContext::new(&tx, migration.version))?;
        tx.commit()?;
        Ok(())
    }

    fn record_version(&self, version: u32) -> StorageResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO schema_migrations (version, applied_at) VALUES (?1, ?2);",
            params![
                i64::from(version),
                Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
            ],
        )?;
        Ok(())
    }
}

fn order_clause(collection: Collection) -> String {
    collection
        .recency_field()
        .map(|field| format!(" ORDER BY {field} DESC"))
        .unwrap_or_default()
}

fn key_clause(collection: Collection, id: &str) -> StorageResult<(String, Vec<SqlValue>)> {
    key_clause_from(collection, id, 0)
}

/// Builds `k1 = ?n AND k2 = ?n+1` with placeholders numbered after `offset`.
fn key_clause_from(
    collection: Collection,
    id: &str,
    offset: usize,
) -> StorageResult<(String, Vec<SqlValue>)> {
    let mut terms = Vec::new();
    let mut binds = Vec::new();
    for (column, value) in collection.key_values(id)? {
        binds.push(json_to_sql(&key_json(collection, value)));
        terms.push(format!("{column} = ?{}", offset + binds.len()));
    }
    Ok((terms.join(" AND "), binds))
}

fn filter_clause(filter: &Filter) -> StorageResult<(String, Vec<SqlValue>)> {
    if filter.is_empty() {
        return Ok((String::new(), Vec::new()));
    }
    let mut terms = Vec::new();
    let mut binds = Vec::new();
    for (field, value) in filter.clauses() {
        validate_identifier(field)?;
        if value.is_null() {
            terms.push(format!("{field} IS NULL"));
        } else {
            binds.push(json_to_sql(value));
            terms.push(format!("{field} = ?{}", binds.len()));
        }
    }
    Ok((format!(" WHERE {}", terms.join(" AND ")), binds))
}

/// Singleton keys are stored as integers; everything else as text.
fn key_json(collection: Collection, value: String) -> Value {
    if collection.is_singleton() {
        value
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or(Value::String(value))
    } else {
        Value::String(value)
    }
}

fn query_records(conn: &Connection, sql: &str, binds: Vec<SqlValue>) -> StorageResult<Vec<Record>> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    let mut rows = stmt.query(params_from_iter(binds))?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        records.push(row_to_record(row, &columns)?);
    }
    Ok(records)
}

fn row_to_record(row: &Row<'_>, columns: &[String]) -> StorageResult<Record> {
    let mut record = Record::new();
    for (index, column) in columns.iter().enumerate() {
        let value: SqlValue = row.get(index)?;
        record.insert(column.clone(), sql_to_json(value));
    }
    Ok(record)
}

fn sql_to_json(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(number) => Value::from(number),
        SqlValue::Real(number) => Number::from_f64(number).map_or(Value::Null, Value::Number),
        SqlValue::Text(text) => Value::String(text),
        SqlValue::Blob(bytes) => Value::Array(bytes.into_iter().map(Value::from).collect()),
    }
}

fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => SqlValue::Integer(integer),
            None => number.as_f64().map_or(SqlValue::Null, SqlValue::Real),
        },
        Value::String(text) => SqlValue::Text(text.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::{filter_clause, json_to_sql, sql_to_json};
    use crate::db::Filter;
    use rusqlite::types::Value as SqlValue;
    use serde_json::{json, Value};

    #[test]
    fn json_values_map_to_sqlite_affinities() {
        assert_eq!(json_to_sql(&json!(true)), SqlValue::Integer(1));
        assert_eq!(json_to_sql(&json!(7)), SqlValue::Integer(7));
        assert_eq!(json_to_sql(&json!("x")), SqlValue::Text("x".to_string()));
        assert_eq!(json_to_sql(&json!(["a"])), SqlValue::Text("[\"a\"]".to_string()));
        assert_eq!(json_to_sql(&Value::Null), SqlValue::Null);
        assert_eq!(sql_to_json(SqlValue::Integer(3)), json!(3));
    }

    #[test]
    fn filter_clause_uses_is_null_for_null_values() {
        let filter = Filter::new().eq("status", "curious").eq("explored_at", Value::Null);
        let (clause, binds) = filter_clause(&filter).unwrap();
        assert_eq!(clause, " WHERE explored_at IS NULL AND status = ?1");
        assert_eq!(binds, vec![SqlValue::Text("curious".to_string())]);
    }

    #[test]
    fn filter_clause_rejects_unsafe_field_names() {
        let filter = Filter::new().eq("status = 1 OR 1", 1);
        assert!(filter_clause(&filter).is_err());
    }
}
