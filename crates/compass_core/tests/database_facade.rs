use compass_core::db::migrations::latest_version;
use compass_core::model::{ConceptStatus, OnboardingGoal, OnboardingRow};
use compass_core::{
    reset_shared_database, shared_database, ConfigError, Database, DatabaseConfig, Platform,
    StorageLocation,
};
use std::sync::Arc;
use std::thread;

fn populated(platform: Platform) -> Database {
    let db = Database::from_config(&DatabaseConfig::in_memory(platform)).unwrap();
    db.initialize().unwrap();
    db.concepts().master("pairing").unwrap();
    db.concepts()
        .update_status("balance", ConceptStatus::Resonates)
        .unwrap();
    db.journal().create("hello", Some("pairing")).unwrap();
    db.onboarding().complete().unwrap();
    db.onboarding()
        .set_goal(Some(OnboardingGoal::SelfDiscovery))
        .unwrap();
    db.pathways().update_progress("intro", "pairing", 2).unwrap();
    db.settings().set_bool("haptics", false).unwrap();
    db
}

#[test]
fn platform_selects_backend() {
    let native = Database::from_config(&DatabaseConfig::in_memory(Platform::Native)).unwrap();
    assert_eq!(native.platform(), Platform::Native);
    let web = Database::from_config(&DatabaseConfig::in_memory(Platform::Web)).unwrap();
    assert_eq!(web.platform(), Platform::Web);
}

#[test]
fn concurrent_initialize_shares_one_run() {
    for platform in [Platform::Native, Platform::Web] {
        let db = Arc::new(Database::from_config(&DatabaseConfig::in_memory(platform)).unwrap());
        assert!(!db.is_initialized());

        thread::scope(|scope| {
            for _ in 0..6 {
                scope.spawn(|| db.initialize().unwrap());
            }
        });

        assert!(db.is_initialized());
        let report = db.migration_report().unwrap();
        assert!(report.success);
        assert_eq!(report.migrations_run, latest_version());
    }
}

#[test]
fn clear_all_empties_collections_and_resets_onboarding() {
    for platform in [Platform::Native, Platform::Web] {
        let db = populated(platform);
        assert_eq!(db.journal().count(), 1);
        assert!(db.onboarding().is_completed());

        db.clear_all().unwrap();

        assert!(db.concepts().get_all().is_empty(), "platform {platform}");
        assert_eq!(db.journal().count(), 0, "platform {platform}");
        assert!(db.pathways().get_all().is_empty(), "platform {platform}");
        assert!(db.pathways().get_completed_concepts("intro").is_empty());
        assert_eq!(db.onboarding().get(), OnboardingRow::default());
        assert!(!db.settings().get_bool("haptics", true), "platform {platform}");
    }
}

#[test]
fn file_backed_database_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    for platform in [Platform::Native, Platform::Web] {
        let config = DatabaseConfig::new(
            platform,
            StorageLocation::Directory(dir.path().join(platform.as_str())),
        );

        let db = Database::from_config(&config).unwrap();
        db.initialize().unwrap();
        let id = db.journal().create("persisted", None).unwrap();
        drop(db);

        let reopened = Database::from_config(&config).unwrap();
        reopened.initialize().unwrap();
        assert_eq!(reopened.journal().get(&id).unwrap().content, "persisted");
        assert_eq!(reopened.migration_report().unwrap().migrations_run, 0);
    }
}

#[test]
fn shared_database_is_built_once_and_rejects_other_configs() {
    reset_shared_database();
    let config = DatabaseConfig::in_memory(Platform::Web);

    let first = shared_database(&config).unwrap();
    let second = shared_database(&config).unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    first.onboarding().complete().unwrap();
    assert!(second.onboarding().is_completed());

    let err = shared_database(&DatabaseConfig::in_memory(Platform::Native))
        .err()
        .unwrap();
    assert!(matches!(err, ConfigError::Conflict { .. }));

    reset_shared_database();
    let rebuilt = shared_database(&DatabaseConfig::in_memory(Platform::Native)).unwrap();
    assert!(!Arc::ptr_eq(&first, &rebuilt));
    assert_eq!(rebuilt.platform(), Platform::Native);
    assert!(!rebuilt.onboarding().is_completed());
    reset_shared_database();
}
