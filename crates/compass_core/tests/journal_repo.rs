use compass_core::db::{KeyValueAdapter, MemoryKeyValueStore, SqliteAdapter, StorageAdapter};
use compass_core::repo::JournalRepository;
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

fn repos() -> Vec<(&'static str, JournalRepository)> {
    let adapters: Vec<(&'static str, Arc<dyn StorageAdapter>)> = vec![
        ("sqlite", Arc::new(SqliteAdapter::in_memory())),
        (
            "kv",
            Arc::new(KeyValueAdapter::new(Arc::new(MemoryKeyValueStore::new()))),
        ),
    ];
    adapters
        .into_iter()
        .map(|(name, adapter)| (name, JournalRepository::new(adapter)))
        .collect()
}

#[test]
fn create_get_update_scenario() {
    for (name, repo) in repos() {
        let id = repo.create("hello", None).unwrap();
        assert!(!id.is_empty());

        let created = repo.get(&id).unwrap();
        assert_eq!(created.id, id, "backend {name}");
        assert_eq!(created.concept_id, None, "backend {name}");
        assert_eq!(created.content, "hello", "backend {name}");
        assert_eq!(created.created_at, created.updated_at, "backend {name}");

        sleep(Duration::from_millis(5));
        repo.update(&id, "hello world").unwrap();

        let updated = repo.get(&id).unwrap();
        assert_eq!(updated.content, "hello world", "backend {name}");
        assert_eq!(updated.created_at, created.created_at, "backend {name}");
        assert!(updated.updated_at > created.updated_at, "backend {name}");
    }
}

#[test]
fn ids_are_unique_and_listing_is_newest_first() {
    for (name, repo) in repos() {
        let first = repo.create("first", Some("pairing")).unwrap();
        sleep(Duration::from_millis(5));
        let second = repo.create("second", None).unwrap();
        assert_ne!(first, second);

        let ids: Vec<String> = repo.get_all().into_iter().map(|row| row.id).collect();
        assert_eq!(ids, vec![second, first], "backend {name}");
        assert_eq!(repo.count(), 2, "backend {name}");
    }
}

#[test]
fn get_by_concept_filters_entries() {
    for (name, repo) in repos() {
        repo.create("a", Some("pairing")).unwrap();
        repo.create("b", Some("balance")).unwrap();
        repo.create("", Some("pairing")).unwrap();

        let entries = repo.get_by_concept("pairing");
        assert_eq!(entries.len(), 2, "backend {name}");
        assert!(entries
            .iter()
            .all(|entry| entry.concept_id.as_deref() == Some("pairing")));
    }
}

#[test]
fn update_of_missing_entry_is_a_silent_no_op() {
    for (name, repo) in repos() {
        repo.update("missing", "text").unwrap();
        assert!(repo.get("missing").is_none(), "backend {name}");
        assert_eq!(repo.count(), 0, "backend {name}");
    }
}

#[test]
fn delete_and_delete_all() {
    for (name, repo) in repos() {
        let keep = repo.create("keep", None).unwrap();
        let drop_id = repo.create("drop", None).unwrap();

        repo.delete(&drop_id).unwrap();
        assert!(repo.get(&drop_id).is_none(), "backend {name}");
        assert!(repo.get(&keep).is_some(), "backend {name}");

        repo.delete_all().unwrap();
        assert_eq!(repo.count(), 0, "backend {name}");
    }
}

#[test]
fn to_domain_renames_fields_only() {
    let (_, repo) = repos().remove(0);
    let id = repo.create("note", Some("pairing")).unwrap();
    let row = repo.get(&id).unwrap();

    let entry = JournalRepository::to_domain(row.clone());
    assert_eq!(entry.id, row.id);
    assert_eq!(entry.concept_id, row.concept_id);
    assert_eq!(entry.content, row.content);
    assert_eq!(entry.created_at, row.created_at);

    let value = serde_json::to_value(&entry).unwrap();
    assert_eq!(value["conceptId"], "pairing");
    assert!(value.get("created_at").is_none());
}
