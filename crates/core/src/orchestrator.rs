//! Task orchestrator
//!
//! The named operation surface over ledger, resolver and runner,
//! addressed by target name. Single-target operations fail fast;
//! multi-target operations attempt every registered target and collect
//! per-target failures, because each target is its own failure domain.

use std::sync::Arc;

use crate::config::{Registry, SchemaFormat, TargetConfig};
use crate::definitions::StatusEntry;
use crate::engine::DatabaseEngine;
use crate::error::{CoreError, CoreResult};
use crate::ledger::VersionLedger;
use crate::resolver::MigrationResolver;
use crate::runner::MigrationRunner;
use crate::snapshot::SnapshotWriter;
use crate::version::MigrationVersion;

pub struct TaskOrchestrator {
    registry: Registry,
    engine: Arc<dyn DatabaseEngine>,
    ledger: VersionLedger,
    resolver: MigrationResolver,
    runner: MigrationRunner,
}

impl TaskOrchestrator {
    pub fn new(registry: Registry, engine: Arc<dyn DatabaseEngine>, format: SchemaFormat) -> Self {
        Self {
            ledger: VersionLedger::new(engine.clone()),
            resolver: MigrationResolver::new(engine.clone()),
            runner: MigrationRunner::new(engine.clone(), format),
            registry,
            engine,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn target(&self, name: &str) -> CoreResult<TargetConfig> {
        self.registry.get(name).map(TargetConfig::clone)
    }

    // Lifecycle ----------------------------------------------------------

    pub async fn create(&mut self, name: &str) -> CoreResult<()> {
        let target = self.target(name)?;
        if self.engine.database_exists(&target).await? {
            tracing::info!(target = %target.name, "database already exists");
            return Ok(());
        }
        self.engine.create_database(&target).await
    }

    pub async fn drop(&mut self, name: &str) -> CoreResult<()> {
        let target = self.target(name)?;
        if !self.engine.database_exists(&target).await? {
            tracing::warn!(target = %target.name, "database does not exist, nothing to drop");
            return Ok(());
        }
        self.engine.drop_database(&target).await
    }

    /// Drop and recreate empty. The ledger table goes with the database
    /// and is recreated lazily on the next migrate.
    pub async fn purge(&mut self, name: &str) -> CoreResult<()> {
        let target = self.target(name)?;
        if self.engine.database_exists(&target).await? {
            self.engine.drop_database(&target).await?;
        }
        self.engine.create_database(&target).await
    }

    /// Create (dropping first when present) and migrate to head.
    pub async fn setup(&mut self, name: &str) -> CoreResult<()> {
        self.purge(name).await?;
        self.migrate(name, None).await
    }

    // Migration ----------------------------------------------------------

    pub async fn migrate(
        &mut self,
        name: &str,
        version: Option<MigrationVersion>,
    ) -> CoreResult<()> {
        let target = self.target(name)?;
        self.runner.migrate_to(&target, version).await
    }

    pub async fn migrate_up(&mut self, name: &str, version: MigrationVersion) -> CoreResult<()> {
        let target = self.target(name)?;
        self.runner.migrate_up(&target, version).await
    }

    pub async fn migrate_down(&mut self, name: &str, version: MigrationVersion) -> CoreResult<()> {
        let target = self.target(name)?;
        self.runner.migrate_down(&target, version).await
    }

    pub async fn forward(&mut self, name: &str, steps: usize) -> CoreResult<()> {
        let target = self.target(name)?;
        self.runner.forward(&target, steps).await
    }

    pub async fn rollback(&mut self, name: &str, steps: usize) -> CoreResult<()> {
        let target = self.target(name)?;
        self.runner.rollback(&target, steps).await
    }

    pub async fn redo(&mut self, name: &str, version: Option<MigrationVersion>) -> CoreResult<()> {
        let target = self.target(name)?;
        self.runner.redo(&target, version).await
    }

    pub async fn reset(&mut self, name: &str) -> CoreResult<()> {
        let target = self.target(name)?;
        self.runner.reset(&target).await
    }

    // Reporting ----------------------------------------------------------

    /// Status rows for the union of discovered and applied versions.
    /// A never-created ledger table is its own distinct error so callers
    /// can tell "fresh" apart from "fully rolled back".
    pub async fn status(&self, name: &str) -> CoreResult<Vec<StatusEntry>> {
        let target = self.target(name)?;
        if !self.ledger.table_exists(&target).await? {
            return Err(CoreError::LedgerTableMissing {
                table: target.ledger_table.clone(),
            });
        }
        self.resolver.status(&target).await
    }

    pub async fn current_version(&self, name: &str) -> CoreResult<MigrationVersion> {
        let target = self.target(name)?;
        self.ledger.current_version(&target).await
    }

    /// Deploy-time guard across every registered target.
    pub async fn abort_if_pending(&self) -> CoreResult<()> {
        let targets: Vec<&TargetConfig> = self.registry.iter().collect();
        self.resolver.abort_if_pending(&targets).await
    }

    // Multi-target -------------------------------------------------------

    pub async fn create_all(&mut self) -> CoreResult<()> {
        let mut failures = Vec::new();
        for name in self.target_names() {
            if let Err(e) = self.create(&name).await {
                failures.push(note_failure(&name, e));
            }
        }
        collect(failures)
    }

    pub async fn drop_all(&mut self) -> CoreResult<()> {
        let mut failures = Vec::new();
        for name in self.target_names() {
            if let Err(e) = self.drop(&name).await {
                failures.push(note_failure(&name, e));
            }
        }
        collect(failures)
    }

    pub async fn purge_all(&mut self) -> CoreResult<()> {
        let mut failures = Vec::new();
        for name in self.target_names() {
            if let Err(e) = self.purge(&name).await {
                failures.push(note_failure(&name, e));
            }
        }
        collect(failures)
    }

    pub async fn setup_all(&mut self) -> CoreResult<()> {
        let mut failures = Vec::new();
        for name in self.target_names() {
            if let Err(e) = self.setup(&name).await {
                failures.push(note_failure(&name, e));
            }
        }
        collect(failures)
    }

    /// Migrate every registered target to head, independently.
    pub async fn migrate_all(&mut self) -> CoreResult<()> {
        let mut failures = Vec::new();
        for name in self.target_names() {
            if let Err(e) = self.migrate(&name, None).await {
                failures.push(note_failure(&name, e));
            }
        }
        collect(failures)
    }

    // Test-environment ---------------------------------------------------

    /// Recreate every target empty.
    pub async fn test_purge(&mut self) -> CoreResult<()> {
        self.purge_all().await
    }

    /// Rebuild every target straight from its snapshot file: create the
    /// declared tables and mark every discovered version at or below the
    /// snapshot version as applied. No migration is replayed.
    pub async fn test_load_schema(&mut self) -> CoreResult<()> {
        let mut failures = Vec::new();
        for name in self.target_names() {
            if let Err(e) = self.load_schema_one(&name).await {
                failures.push(note_failure(&name, e));
            }
        }
        collect(failures)
    }

    async fn load_schema_one(&mut self, name: &str) -> CoreResult<()> {
        let target = self.target(name)?;
        let snapshot = SnapshotWriter::read_snapshot(&target.snapshot_path)?;

        for table in &snapshot.tables {
            let sql = format!("CREATE TABLE IF NOT EXISTS \"{}\" ();", table);
            self.engine.execute(&target, &sql).await?;
        }

        self.ledger.ensure_table(&target).await?;
        let applied = self.ledger.applied_versions(&target).await?;
        for definition in self.resolver.discover(&target)? {
            if definition.version <= snapshot.version && !applied.contains(&definition.version) {
                self.ledger.record(&target, definition.version).await?;
            }
        }
        Ok(())
    }

    /// Rebuild every target from its raw structure dump.
    pub async fn test_load_structure(&mut self) -> CoreResult<()> {
        let mut failures = Vec::new();
        for name in self.target_names() {
            if let Err(e) = self.load_structure_one(&name).await {
                failures.push(note_failure(&name, e));
            }
        }
        collect(failures)
    }

    async fn load_structure_one(&mut self, name: &str) -> CoreResult<()> {
        let target = self.target(name)?;
        let dump = std::fs::read_to_string(&target.structure_path).map_err(|e| {
            CoreError::Snapshot(format!(
                "cannot read {}: {}",
                target.structure_path.display(),
                e
            ))
        })?;
        self.engine.load_structure(&target, &dump).await
    }

    fn target_names(&self) -> Vec<String> {
        self.registry
            .names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }
}

fn note_failure(name: &str, error: CoreError) -> (String, String) {
    tracing::error!(target = %name, %error, "target operation failed");
    (name.to_string(), error.to_string())
}

fn collect(failures: Vec<(String, String)>) -> CoreResult<()> {
    if failures.is_empty() {
        Ok(())
    } else {
        Err(CoreError::MultiTarget(failures))
    }
}
