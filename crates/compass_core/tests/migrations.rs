use compass_core::db::kv::SCHEMA_VERSION_KEY;
use compass_core::db::migrations::{latest_version, KeyValueContext, Migration, SqlContext};
use compass_core::db::{
    completion_key, KeyValueAdapter, KeyValueStore, MemoryKeyValueStore, SqliteAdapter, StorageAdapter,
    StorageError, StorageResult,
};
use compass_core::repo::{ConceptRepository, OnboardingRepository, PathwayRepository};
use rusqlite::Connection;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;

fn create_legacy_sqlite(path: &Path) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE user_concepts (
            concept_id TEXT PRIMARY KEY,
            status TEXT NOT NULL DEFAULT 'unexplored',
            explored_at TEXT,
            updated_at TEXT NOT NULL
        );
        CREATE TABLE onboarding (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            completed INTEGER NOT NULL DEFAULT 0,
            goal TEXT
        );
        INSERT INTO onboarding (id, completed, goal) VALUES (1, 1, 'self_discovery');
        CREATE TABLE pathway_progress (
            pathway_id TEXT PRIMARY KEY,
            started_at TEXT NOT NULL,
            completed_at TEXT,
            concepts_completed TEXT NOT NULL DEFAULT '[]'
        );
        INSERT INTO user_concepts (concept_id, status, explored_at, updated_at)
            VALUES ('pairing', 'resonates', '2025-06-01T00:00:00.000Z', '2025-06-01T00:00:00.000Z');
        INSERT INTO pathway_progress (pathway_id, started_at, completed_at, concepts_completed)
            VALUES ('intro', '2025-06-01T00:00:00.000Z', NULL, '[\"pairing\",\"balance\"]');
        INSERT INTO pathway_progress (pathway_id, started_at, completed_at, concepts_completed)
            VALUES ('broken', '2025-06-02T00:00:00.000Z', NULL, 'not json');",
    )
    .unwrap();
}

#[test]
fn legacy_sqlite_store_is_migrated_without_data_loss() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("compass.sqlite3");
    create_legacy_sqlite(&path);

    let adapter: Arc<dyn StorageAdapter> = Arc::new(SqliteAdapter::new(&path));
    adapter.initialize().unwrap();

    let report = adapter.migration_report().unwrap();
    assert!(report.success, "{:?}", report.error);
    assert_eq!(report.migrations_run, latest_version());
    assert_eq!(report.current_version, latest_version());

    let concepts = ConceptRepository::new(Arc::clone(&adapter));
    let pairing = concepts.get("pairing").unwrap();
    assert!(!pairing.unlocked());
    assert!(!pairing.mastered());
    assert_eq!(pairing.explored_at.as_deref(), Some("2025-06-01T00:00:00.000Z"));

    let onboarding = OnboardingRepository::new(Arc::clone(&adapter)).get_state();
    assert!(onboarding.completed);
    assert_eq!(onboarding.comfort_level, None);
    assert!(!onboarding.first_concept_viewed);

    let pathways = PathwayRepository::new(Arc::clone(&adapter));
    let mut completed = pathways.get_completed_concepts("intro");
    completed.sort();
    assert_eq!(completed, vec!["balance", "pairing"]);
    assert!(pathways.get_completed_concepts("broken").is_empty());
}

#[test]
fn reopening_migrated_sqlite_store_runs_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("compass.sqlite3");
    create_legacy_sqlite(&path);

    SqliteAdapter::new(&path).initialize().unwrap();

    let reopened = SqliteAdapter::new(&path);
    reopened.initialize().unwrap();
    let report = reopened.migration_report().unwrap();
    assert!(report.success);
    assert_eq!(report.migrations_run, 0);
    assert_eq!(report.current_version, latest_version());

    let rows = reopened
        .raw_query(
            "SELECT COUNT(*) AS n FROM pathway_concept_completions;",
            &[],
        )
        .unwrap();
    assert_eq!(rows[0]["n"], json!(2));
}

#[test]
fn columns_added_before_versioning_are_not_re_added() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("compass.sqlite3");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE user_concepts (
            concept_id TEXT PRIMARY KEY,
            status TEXT NOT NULL DEFAULT 'unexplored',
            is_unlocked INTEGER NOT NULL DEFAULT 0,
            explored_at TEXT,
            updated_at TEXT NOT NULL
        );",
    )
    .unwrap();
    drop(conn);

    let adapter = SqliteAdapter::new(&path);
    adapter.initialize().unwrap();
    let report = adapter.migration_report().unwrap();
    assert!(report.success, "{:?}", report.error);
    assert_eq!(report.current_version, latest_version());
}

#[test]
fn newer_sqlite_store_is_left_untouched_and_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("compass.sqlite3");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE schema_migrations (version INTEGER PRIMARY KEY, applied_at TEXT NOT NULL);
         INSERT INTO schema_migrations (version, applied_at) VALUES (99, '2030-01-01T00:00:00.000Z');",
    )
    .unwrap();
    drop(conn);

    let adapter = SqliteAdapter::new(&path);
    adapter.initialize().unwrap();
    let report = adapter.migration_report().unwrap();
    assert!(!report.success);
    assert_eq!(report.migrations_run, 0);
    assert_eq!(report.current_version, 99);
    assert!(report.error.unwrap().contains("newer"));
}

#[test]
fn key_value_normalization_fans_out_legacy_lists() {
    let store = Arc::new(MemoryKeyValueStore::new());
    store
        .set_item(
            "compass.pathway_progress",
            &json!({
                "intro": {
                    "pathway_id": "intro",
                    "started_at": "2025-06-01T00:00:00.000Z",
                    "completed_at": null,
                    "concepts_completed": ["pairing", "balance"]
                }
            })
            .to_string(),
        )
        .unwrap();
    store
        .set_item(
            "compass.user_concepts",
            &json!({
                "pairing": {
                    "concept_id": "pairing",
                    "status": "curious",
                    "explored_at": null,
                    "updated_at": "2025-06-01T00:00:00.000Z"
                }
            })
            .to_string(),
        )
        .unwrap();

    let adapter: Arc<dyn StorageAdapter> = Arc::new(KeyValueAdapter::new(store.clone()));
    adapter.initialize().unwrap();
    let report = adapter.migration_report().unwrap();
    assert!(report.success, "{:?}", report.error);
    assert_eq!(report.current_version, latest_version());

    let completions: Value = serde_json::from_str(
        &store
            .get_item("compass.pathway_concept_completions")
            .unwrap()
            .unwrap(),
    )
    .unwrap();
    let pairing = completion_key("intro", "pairing");
    let balance = completion_key("intro", "balance");
    assert_eq!(completions[&pairing]["concept_id"], json!("pairing"));
    assert_eq!(completions[&balance]["pathway_id"], json!("intro"));
    assert_eq!(
        completions[&balance]["completed_at"],
        json!("2025-06-01T00:00:00.000Z")
    );

    let progress: Value =
        serde_json::from_str(&store.get_item("compass.pathway_progress").unwrap().unwrap())
            .unwrap();
    assert_eq!(
        progress["intro"]["concepts_completed"],
        json!(["pairing", "balance"])
    );

    let pathways = PathwayRepository::new(Arc::clone(&adapter));
    assert_eq!(
        pathways.get_completed_concepts("intro"),
        vec!["balance", "pairing"]
    );
    let concept = ConceptRepository::new(Arc::clone(&adapter))
        .get("pairing")
        .unwrap();
    assert!(!concept.unlocked());

    let version: Value =
        serde_json::from_str(&store.get_item(SCHEMA_VERSION_KEY).unwrap().unwrap()).unwrap();
    assert_eq!(version["version"], json!(latest_version()));
    assert!(version["applied_at"].is_string());
}

fn add_marker_sql(ctx: &SqlContext<'_>) -> StorageResult<()> {
    ctx.execute_batch("CREATE TABLE IF NOT EXISTS marker (id INTEGER PRIMARY KEY);")
}

fn add_marker_kv(ctx: &KeyValueContext<'_>) -> StorageResult<()> {
    let runs = ctx
        .get_value("test.marker")?
        .and_then(|raw| raw.parse::<u32>().ok())
        .unwrap_or(0);
    ctx.set_value("test.marker", &(runs + 1).to_string())
}

fn second_marker_kv(ctx: &KeyValueContext<'_>) -> StorageResult<()> {
    let runs = ctx
        .get_value("test.second")?
        .and_then(|raw| raw.parse::<u32>().ok())
        .unwrap_or(0);
    ctx.set_value("test.second", &(runs + 1).to_string())
}

fn failing_sql(_: &SqlContext<'_>) -> StorageResult<()> {
    Err(StorageError::Unavailable("step exploded".to_string()))
}

fn failing_kv(_: &KeyValueContext<'_>) -> StorageResult<()> {
    Err(StorageError::Unavailable("step exploded".to_string()))
}

static FIRST_ONLY: [Migration; 1] = [Migration {
    version: 1,
    description: "add_marker",
    sql: add_marker_sql,
    key_value: add_marker_kv,
}];

static FIRST_AND_SECOND: [Migration; 2] = [
    Migration {
        version: 1,
        description: "add_marker",
        sql: add_marker_sql,
        key_value: add_marker_kv,
    },
    Migration {
        version: 2,
        description: "second_marker",
        sql: add_marker_sql,
        key_value: second_marker_kv,
    },
];

static FAILS_AT_SECOND: [Migration; 3] = [
    Migration {
        version: 1,
        description: "add_marker",
        sql: add_marker_sql,
        key_value: add_marker_kv,
    },
    Migration {
        version: 2,
        description: "explode",
        sql: failing_sql,
        key_value: failing_kv,
    },
    Migration {
        version: 3,
        description: "second_marker",
        sql: add_marker_sql,
        key_value: second_marker_kv,
    },
];

#[test]
fn pending_migrations_apply_exactly_once() {
    let store = Arc::new(MemoryKeyValueStore::new());

    let first = KeyValueAdapter::with_migrations(store.clone(), &FIRST_ONLY);
    first.initialize().unwrap();
    assert_eq!(first.migration_report().unwrap().current_version, 1);

    let second = KeyValueAdapter::with_migrations(store.clone(), &FIRST_AND_SECOND);
    second.initialize().unwrap();
    let report = second.migration_report().unwrap();
    assert_eq!(report.migrations_run, 1);
    assert_eq!(report.current_version, 2);
    assert_eq!(store.get_item("test.marker").unwrap().as_deref(), Some("1"));
    assert_eq!(store.get_item("test.second").unwrap().as_deref(), Some("1"));

    let third = KeyValueAdapter::with_migrations(store.clone(), &FIRST_AND_SECOND);
    third.initialize().unwrap();
    assert_eq!(third.migration_report().unwrap().migrations_run, 0);
    assert_eq!(store.get_item("test.second").unwrap().as_deref(), Some("1"));
}

#[test]
fn failed_step_keeps_version_of_last_success_and_startup_continues() {
    let store = Arc::new(MemoryKeyValueStore::new());
    let adapter = KeyValueAdapter::with_migrations(store.clone(), &FAILS_AT_SECOND);

    adapter.initialize().unwrap();
    assert!(adapter.is_initialized());

    let report = adapter.migration_report().unwrap();
    assert!(!report.success);
    assert_eq!(report.migrations_run, 1);
    assert_eq!(report.current_version, 1);
    let error = report.error.unwrap();
    assert!(error.contains("migration 2"));
    assert!(error.contains("explode"));
    assert_eq!(store.get_item("test.second").unwrap(), None);

    let version: Value =
        serde_json::from_str(&store.get_item(SCHEMA_VERSION_KEY).unwrap().unwrap()).unwrap();
    assert_eq!(version["version"], json!(1));

    adapter.set_value("still", "works").unwrap();
    assert_eq!(adapter.get_value("still").unwrap().as_deref(), Some("works"));
}

#[test]
fn failed_sqlite_step_rolls_back_only_that_step() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("compass.sqlite3");
    let adapter = SqliteAdapter::with_migrations(&path, &FAILS_AT_SECOND);
    adapter.initialize().unwrap();

    let report = adapter.migration_report().unwrap();
    assert!(!report.success);
    assert_eq!(report.current_version, 1);

    let versions = adapter
        .raw_query("SELECT version FROM schema_migrations ORDER BY version;", &[])
        .unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0]["version"], json!(1));
}
