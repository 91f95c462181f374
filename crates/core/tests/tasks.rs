//! Behavioral tests of the task surface against the in-memory engine,
//! using a two-target setup: a primary database with users/posts
//! migrations and a second database with its own comments migration.

use std::fs;
use std::sync::Arc;

use tempfile::TempDir;

use dualbase_core::{
    CoreError, DatabaseEngine, MemoryEngine, MigrationVersion, Registry, SchemaFormat,
    TargetConfig, TaskOrchestrator, VersionState,
};

const USERS_VERSION: i64 = 20141214142600;
const POSTS_VERSION: i64 = 20141214142700;
const COMMENTS_VERSION: i64 = 20151202075826;
const FOOS_VERSION: i64 = 20160101000000;

struct Dummy {
    _tmp: TempDir,
    engine: Arc<MemoryEngine>,
    orch: TaskOrchestrator,
    primary: TargetConfig,
    second: TargetConfig,
}

fn write_migration(dir: &std::path::Path, version: i64, name: &str, table: &str) {
    fs::write(
        dir.join(format!("{}_{}.sql", version, name)),
        format!(
            "-- up\nCREATE TABLE {t} (id BIGINT);\n-- down\nDROP TABLE {t};\n",
            t = table
        ),
    )
    .unwrap();
}

fn dummy_with_format(format: SchemaFormat) -> Dummy {
    let tmp = TempDir::new().unwrap();
    let primary_dir = tmp.path().join("db/migrate");
    let second_dir = tmp.path().join("db/second_migrate");
    fs::create_dir_all(&primary_dir).unwrap();
    fs::create_dir_all(&second_dir).unwrap();

    write_migration(&primary_dir, USERS_VERSION, "create_users", "users");
    write_migration(&primary_dir, POSTS_VERSION, "create_posts", "posts");
    write_migration(&second_dir, COMMENTS_VERSION, "create_comments", "comments");

    let primary = TargetConfig {
        name: "primary".to_string(),
        url: String::new(),
        migrations_dir: primary_dir,
        ledger_table: "schema_migrations".to_string(),
        snapshot_path: tmp.path().join("db/schema.sql"),
        structure_path: tmp.path().join("db/structure.sql"),
    };
    let second = TargetConfig {
        name: "second".to_string(),
        url: String::new(),
        migrations_dir: second_dir,
        ledger_table: "schema_migrations".to_string(),
        snapshot_path: tmp.path().join("db/second_schema.sql"),
        structure_path: tmp.path().join("db/second_structure.sql"),
    };

    let registry = Registry::new(vec![primary.clone(), second.clone()]).unwrap();
    let engine = Arc::new(MemoryEngine::new());
    let orch = TaskOrchestrator::new(registry, engine.clone(), format);

    Dummy {
        _tmp: tmp,
        engine,
        orch,
        primary,
        second,
    }
}

fn dummy() -> Dummy {
    dummy_with_format(SchemaFormat::Snapshot)
}

impl Dummy {
    fn add_foos_migration(&self) {
        write_migration(
            &self.second.migrations_dir,
            FOOS_VERSION,
            "create_foos",
            "foos",
        );
    }

    fn snapshot(&self, target: &TargetConfig) -> String {
        fs::read_to_string(&target.snapshot_path).unwrap()
    }

    async fn tables(&self, target: &TargetConfig) -> Vec<String> {
        self.engine.tables(target).await.unwrap()
    }

    async fn databases_exist(&self) -> bool {
        self.engine.database_exists(&self.primary).await.unwrap()
            && self.engine.database_exists(&self.second).await.unwrap()
    }
}

#[tokio::test]
async fn create_brings_up_every_database() {
    let mut d = dummy();
    assert!(!d.databases_exist().await);
    d.orch.create_all().await.unwrap();
    assert!(d.databases_exist().await);

    // Idempotent: a second create is a no-op, not an error.
    d.orch.create_all().await.unwrap();
}

#[tokio::test]
async fn drop_removes_every_database() {
    let mut d = dummy();
    d.orch.create_all().await.unwrap();
    d.orch.drop_all().await.unwrap();
    assert!(!d.databases_exist().await);
}

#[tokio::test]
async fn setup_recreates_and_migrates() {
    let mut d = dummy();
    d.orch.create_all().await.unwrap();
    d.orch.migrate_all().await.unwrap();
    d.orch.drop_all().await.unwrap();
    assert!(!d.databases_exist().await);

    d.orch.setup_all().await.unwrap();
    assert!(d.databases_exist().await);
    let tables = d.tables(&d.primary).await;
    assert!(tables.contains(&"users".to_string()));
    assert!(tables.contains(&"posts".to_string()));
    assert!(d.tables(&d.second).await.contains(&"comments".to_string()));
}

#[tokio::test]
async fn purge_leaves_empty_databases() {
    let mut d = dummy();
    d.orch.create_all().await.unwrap();
    d.orch.migrate_all().await.unwrap();
    assert!(!d.tables(&d.primary).await.is_empty());

    d.orch.purge_all().await.unwrap();
    assert!(d.databases_exist().await);
    assert!(d.tables(&d.primary).await.is_empty());
    assert!(d.tables(&d.second).await.is_empty());
}

#[tokio::test]
async fn migrate_writes_independent_snapshots() {
    let mut d = dummy();
    d.orch.create_all().await.unwrap();
    d.orch.migrate_all().await.unwrap();

    let schema = d.snapshot(&d.primary);
    assert!(schema.contains(&format!("version: {}", POSTS_VERSION)));
    assert!(schema.contains("create_table \"users\""));
    assert!(schema.contains("create_table \"posts\""));
    assert!(!schema.contains("create_table \"comments\""));

    let second_schema = d.snapshot(&d.second);
    assert!(second_schema.contains(&format!("version: {}", COMMENTS_VERSION)));
    assert!(second_schema.contains("create_table \"comments\""));
    assert!(!second_schema.contains("create_table \"users\""));
    assert!(!second_schema.contains("create_table \"posts\""));
}

#[tokio::test]
async fn migrate_up_and_down_respect_target_namespaces() {
    let mut d = dummy();
    d.orch.create_all().await.unwrap();
    d.orch.migrate_all().await.unwrap();

    // The comments migration lives in the second target's namespace, so
    // the primary target cannot address it.
    let err = d
        .orch
        .migrate_down("primary", MigrationVersion(COMMENTS_VERSION))
        .await
        .unwrap_err();
    assert!(err.to_string().to_lowercase().contains("no migration"));
    assert!(err.to_string().contains("20151202075826"));
    // Primary ledger is untouched by the failed operation.
    assert_eq!(
        d.orch.current_version("primary").await.unwrap(),
        MigrationVersion(POSTS_VERSION)
    );

    d.orch
        .migrate_down("second", MigrationVersion(COMMENTS_VERSION))
        .await
        .unwrap();
    let second_schema = d.snapshot(&d.second);
    assert!(!second_schema.contains(&format!("version: {}", COMMENTS_VERSION)));
    assert!(!second_schema.contains("create_table \"comments\""));

    let err = d
        .orch
        .migrate_up("primary", MigrationVersion(COMMENTS_VERSION))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::UnknownVersion(_)));

    d.orch
        .migrate_up("second", MigrationVersion(COMMENTS_VERSION))
        .await
        .unwrap();
    let second_schema = d.snapshot(&d.second);
    assert!(second_schema.contains(&format!("version: {}", COMMENTS_VERSION)));
    assert!(second_schema.contains("create_table \"comments\""));
}

#[tokio::test]
async fn reset_regenerates_a_deleted_snapshot() {
    let mut d = dummy();
    d.orch.create_all().await.unwrap();
    d.orch.migrate_all().await.unwrap();

    let before = d.snapshot(&d.second);
    fs::remove_file(&d.second.snapshot_path).unwrap();

    d.orch.reset("second").await.unwrap();
    assert_eq!(d.snapshot(&d.second), before);
}

#[tokio::test]
async fn redo_regenerates_snapshot_and_replays_exactly() {
    let mut d = dummy();
    d.orch.create_all().await.unwrap();
    d.orch.migrate_all().await.unwrap();

    fs::remove_file(&d.second.snapshot_path).unwrap();
    d.orch.redo("second", None).await.unwrap();
    let second_schema = d.snapshot(&d.second);
    assert!(second_schema.contains(&format!("version: {}", COMMENTS_VERSION)));
    assert!(second_schema.contains("create_table \"comments\""));

    // Redoing an old version keeps the head version in the snapshot.
    d.add_foos_migration();
    d.orch.migrate("second", None).await.unwrap();
    d.orch
        .redo("second", Some(MigrationVersion(COMMENTS_VERSION)))
        .await
        .unwrap();
    let second_schema = d.snapshot(&d.second);
    assert!(second_schema.contains(&format!("version: {}", FOOS_VERSION)));
    assert!(second_schema.contains("create_table \"comments\""));
}

#[tokio::test]
async fn status_reports_every_version_exactly_once() {
    let mut d = dummy();
    d.orch.create_all().await.unwrap();

    let err = d.orch.status("second").await.unwrap_err();
    assert!(err.to_string().contains("migrations table does not exist"));

    d.orch.migrate_all().await.unwrap();
    let status = d.orch.status("second").await.unwrap();
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].version, MigrationVersion(COMMENTS_VERSION));
    assert_eq!(status[0].state, VersionState::Up);

    d.add_foos_migration();
    let status = d.orch.status("second").await.unwrap();
    assert_eq!(status.len(), 2);
    assert_eq!(status[0].state, VersionState::Up);
    assert_eq!(status[1].version, MigrationVersion(FOOS_VERSION));
    assert_eq!(status[1].state, VersionState::Down);
}

#[tokio::test]
async fn status_tags_orphaned_versions() {
    let mut d = dummy();
    d.orch.create_all().await.unwrap();
    d.orch.migrate_all().await.unwrap();

    fs::remove_file(
        d.second
            .migrations_dir
            .join(format!("{}_create_comments.sql", COMMENTS_VERSION)),
    )
    .unwrap();

    let status = d.orch.status("second").await.unwrap();
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].state, VersionState::Orphaned);
    assert_eq!(status[0].name, None);
}

#[tokio::test]
async fn forward_and_rollback_move_one_step() {
    let mut d = dummy();
    d.orch.create_all().await.unwrap();
    d.orch.migrate_all().await.unwrap();
    d.add_foos_migration();

    let second_schema = d.snapshot(&d.second);
    assert!(!second_schema.contains("create_table \"foos\""));

    d.orch.forward("second", 1).await.unwrap();
    let second_schema = d.snapshot(&d.second);
    assert!(second_schema.contains(&format!("version: {}", FOOS_VERSION)));
    assert!(second_schema.contains("create_table \"foos\""));

    d.orch.rollback("second", 1).await.unwrap();
    let second_schema = d.snapshot(&d.second);
    assert!(second_schema.contains(&format!("version: {}", COMMENTS_VERSION)));
    assert!(!second_schema.contains("create_table \"foos\""));
}

#[tokio::test]
async fn full_migration_leaves_nothing_pending() {
    let mut d = dummy();
    d.orch.create_all().await.unwrap();
    d.orch.migrate_all().await.unwrap();
    d.orch.abort_if_pending().await.unwrap();

    // A second run is a no-op.
    d.orch.migrate_all().await.unwrap();
    d.orch.abort_if_pending().await.unwrap();
}

#[tokio::test]
async fn guard_aborts_with_a_pending_listing() {
    let mut d = dummy();
    d.orch.create_all().await.unwrap();
    d.orch.migrate_all().await.unwrap();
    d.add_foos_migration();

    let err = d.orch.abort_if_pending().await.unwrap_err();
    assert!(matches!(err, CoreError::PendingMigrations(_)));
    let text = err.to_string();
    assert!(text.contains("1 pending migration"));
    assert!(text.contains(&FOOS_VERSION.to_string()));
    assert!(text.contains("second"));
}

#[tokio::test]
async fn revert_then_apply_restores_ledger_and_snapshot() {
    let mut d = dummy();
    d.orch.create_all().await.unwrap();
    d.orch.migrate_all().await.unwrap();

    let snapshot_before = d.snapshot(&d.second);
    let version_before = d.orch.current_version("second").await.unwrap();

    d.orch
        .migrate_down("second", MigrationVersion(COMMENTS_VERSION))
        .await
        .unwrap();
    d.orch
        .migrate_up("second", MigrationVersion(COMMENTS_VERSION))
        .await
        .unwrap();

    assert_eq!(d.snapshot(&d.second), snapshot_before);
    assert_eq!(d.orch.current_version("second").await.unwrap(), version_before);
}

#[tokio::test]
async fn version_reports_zero_until_migrated() {
    let mut d = dummy();
    d.orch.create_all().await.unwrap();
    assert_eq!(
        d.orch.current_version("second").await.unwrap(),
        MigrationVersion::ZERO
    );

    d.orch.migrate_all().await.unwrap();
    assert_eq!(
        d.orch.current_version("primary").await.unwrap(),
        MigrationVersion(POSTS_VERSION)
    );
    assert_eq!(
        d.orch.current_version("second").await.unwrap(),
        MigrationVersion(COMMENTS_VERSION)
    );

    // Drop and recreate brings the version back to the sentinel.
    d.orch.purge("second").await.unwrap();
    assert_eq!(
        d.orch.current_version("second").await.unwrap(),
        MigrationVersion::ZERO
    );
}

#[tokio::test]
async fn load_schema_rebuilds_from_snapshot_without_replay() {
    let mut d = dummy();
    d.orch.create_all().await.unwrap();
    d.orch.migrate_all().await.unwrap();

    d.orch.test_purge().await.unwrap();
    assert!(d.tables(&d.primary).await.is_empty());

    d.orch.test_load_schema().await.unwrap();
    let tables = d.tables(&d.primary).await;
    assert!(tables.contains(&"users".to_string()));
    assert!(tables.contains(&"posts".to_string()));
    assert!(d.tables(&d.second).await.contains(&"comments".to_string()));

    // The ledger matches the snapshot version, so nothing is pending.
    d.orch.abort_if_pending().await.unwrap();
    assert_eq!(
        d.orch.current_version("second").await.unwrap(),
        MigrationVersion(COMMENTS_VERSION)
    );
}

#[tokio::test]
async fn load_structure_rebuilds_from_the_sql_dump() {
    let mut d = dummy_with_format(SchemaFormat::Sql);
    d.orch.create_all().await.unwrap();
    d.orch.migrate_all().await.unwrap();
    assert!(d.primary.structure_path.exists());

    d.orch.test_purge().await.unwrap();
    d.orch.test_load_structure().await.unwrap();

    let tables = d.tables(&d.primary).await;
    assert!(tables.contains(&"users".to_string()));
    assert!(tables.contains(&"posts".to_string()));
    assert!(d.tables(&d.second).await.contains(&"comments".to_string()));
    assert_eq!(
        d.orch.current_version("second").await.unwrap(),
        MigrationVersion(COMMENTS_VERSION)
    );
}

#[tokio::test]
async fn failure_on_one_target_does_not_skip_the_rest() {
    let mut d = dummy();
    d.orch.create("primary").await.unwrap();
    // The second database is never created, so migrating it fails.

    let err = d.orch.migrate_all().await.unwrap_err();
    match err {
        CoreError::MultiTarget(failures) => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].0, "second");
        }
        other => panic!("expected MultiTarget, got {:?}", other),
    }

    // Primary was still migrated despite the second target failing.
    assert_eq!(
        d.orch.current_version("primary").await.unwrap(),
        MigrationVersion(POSTS_VERSION)
    );
}

#[tokio::test]
async fn unknown_target_is_rejected_before_dispatch() {
    let mut d = dummy();
    let err = d.orch.create("third").await.unwrap_err();
    assert!(matches!(err, CoreError::UnknownTarget(_)));
}
