//! Migration runner
//!
//! Drives a single migration between its Down and Up states. Each
//! transition runs the definition's SQL and the ledger write inside one
//! transactional scope: either both land or neither does. The schema
//! artifact is regenerated after every successful transition.

use std::sync::Arc;

use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::config::{SchemaFormat, TargetConfig};
use crate::definitions::MigrationDefinition;
use crate::engine::{DatabaseEngine, EngineTransaction};
use crate::error::{CoreError, CoreResult};
use crate::ledger::VersionLedger;
use crate::resolver::MigrationResolver;
use crate::snapshot::SnapshotWriter;
use crate::version::MigrationVersion;

pub struct MigrationRunner {
    engine: Arc<dyn DatabaseEngine>,
    ledger: VersionLedger,
    resolver: MigrationResolver,
    snapshot: SnapshotWriter,
    /// Version of the most recent transition in this invocation. Redo
    /// without an explicit version falls back to this before consulting
    /// the ledger; the scope is deliberately per-invocation.
    last_touched: Option<MigrationVersion>,
}

impl MigrationRunner {
    pub fn new(engine: Arc<dyn DatabaseEngine>, format: SchemaFormat) -> Self {
        Self {
            ledger: VersionLedger::new(engine.clone()),
            resolver: MigrationResolver::new(engine.clone()),
            snapshot: SnapshotWriter::new(engine.clone(), format),
            engine,
            last_touched: None,
        }
    }

    pub fn last_touched(&self) -> Option<MigrationVersion> {
        self.last_touched
    }

    /// Down -> Up. DDL plus ledger insert in one transaction, snapshot
    /// regenerated afterward.
    pub async fn apply(
        &mut self,
        target: &TargetConfig,
        definition: &MigrationDefinition,
    ) -> CoreResult<()> {
        tracing::info!(target = %target.name, version = %definition.version,
            name = %definition.name, "applying migration");
        self.transition(target, definition, &definition.up_sql, true)
            .await
    }

    /// Up -> Down, symmetric to [`apply`].
    pub async fn revert(
        &mut self,
        target: &TargetConfig,
        definition: &MigrationDefinition,
    ) -> CoreResult<()> {
        tracing::info!(target = %target.name, version = %definition.version,
            name = %definition.name, "reverting migration");
        self.transition(target, definition, &definition.down_sql, false)
            .await
    }

    async fn transition(
        &mut self,
        target: &TargetConfig,
        definition: &MigrationDefinition,
        sql: &str,
        up: bool,
    ) -> CoreResult<()> {
        self.ledger.ensure_table(target).await?;

        let mut tx = self.engine.begin(target).await?;
        match Self::run_in_tx(&mut *tx, target, definition, sql, up).await {
            Ok(()) => tx.commit().await?,
            Err(e) => {
                // Best effort: dropping the scope rolls back anyway.
                let _ = tx.rollback().await;
                return Err(e);
            }
        }

        self.last_touched = Some(definition.version);
        self.snapshot.regenerate(target).await
    }

    async fn run_in_tx(
        tx: &mut dyn EngineTransaction,
        target: &TargetConfig,
        definition: &MigrationDefinition,
        sql: &str,
        up: bool,
    ) -> CoreResult<()> {
        for statement in split_statements(sql) {
            tx.execute_ddl(&statement).await.map_err(|e| {
                CoreError::Migration(format!(
                    "migration {} failed on '{}': {}",
                    definition.version, target.name, e
                ))
            })?;
        }
        if up {
            tx.record_version(&target.ledger_table, definition.version)
                .await
        } else {
            tx.erase_version(&target.ledger_table, definition.version)
                .await
        }
    }

    /// Move the target to `to`: revert applied versions above it in
    /// descending order, then apply pending versions at or below it in
    /// ascending order. `None` applies everything pending.
    pub async fn migrate_to(
        &mut self,
        target: &TargetConfig,
        to: Option<MigrationVersion>,
    ) -> CoreResult<()> {
        self.ledger.ensure_table(target).await?;

        let discovered = self.resolver.discover(target)?;
        let applied = self.ledger.applied_versions(target).await?;

        let ceiling = match to {
            Some(version) => {
                let known = version.is_zero()
                    || discovered.iter().any(|d| d.version == version)
                    || applied.contains(&version);
                if !known {
                    return Err(CoreError::UnknownVersion(version));
                }
                version
            }
            None => MigrationVersion(i64::MAX),
        };

        for version in applied.iter().rev().filter(|v| **v > ceiling) {
            let definition = discovered
                .iter()
                .find(|d| d.version == *version)
                .ok_or(CoreError::UnknownVersion(*version))?
                .clone();
            self.revert(target, &definition).await?;
        }

        let to_apply: Vec<MigrationDefinition> = discovered
            .into_iter()
            .filter(|d| d.version <= ceiling && !applied.contains(&d.version))
            .collect();
        for definition in to_apply {
            self.apply(target, &definition).await?;
        }
        Ok(())
    }

    /// Apply exactly one version. Unknown versions fail before the
    /// ledger is touched; an already-applied version is a no-op.
    pub async fn migrate_up(
        &mut self,
        target: &TargetConfig,
        version: MigrationVersion,
    ) -> CoreResult<()> {
        let definition = self.find_definition(target, version)?;
        if self.ledger.applied_versions(target).await?.contains(&version) {
            tracing::info!(target = %target.name, %version, "already up");
            return Ok(());
        }
        self.apply(target, &definition).await
    }

    /// Revert exactly one version, symmetric to [`migrate_up`].
    pub async fn migrate_down(
        &mut self,
        target: &TargetConfig,
        version: MigrationVersion,
    ) -> CoreResult<()> {
        let definition = self.find_definition(target, version)?;
        if !self.ledger.applied_versions(target).await?.contains(&version) {
            tracing::info!(target = %target.name, %version, "already down");
            return Ok(());
        }
        self.revert(target, &definition).await
    }

    /// Apply the next `steps` pending versions.
    pub async fn forward(&mut self, target: &TargetConfig, steps: usize) -> CoreResult<()> {
        let next: Vec<MigrationDefinition> = self
            .resolver
            .pending(target)
            .await?
            .into_iter()
            .take(steps)
            .collect();
        for definition in next {
            self.apply(target, &definition).await?;
        }
        Ok(())
    }

    /// Revert the last `steps` applied versions, most recent first.
    pub async fn rollback(&mut self, target: &TargetConfig, steps: usize) -> CoreResult<()> {
        let applied: Vec<MigrationVersion> = self
            .ledger
            .applied_versions(target)
            .await?
            .into_iter()
            .rev()
            .take(steps)
            .collect();
        for version in applied {
            let definition = self.find_definition(target, version)?;
            self.revert(target, &definition).await?;
        }
        Ok(())
    }

    /// Revert then re-apply one version: the explicit one, else the last
    /// version touched in this invocation, else the ledger's current.
    /// Fails rather than silently skipping when the definition is gone.
    pub async fn redo(
        &mut self,
        target: &TargetConfig,
        version: Option<MigrationVersion>,
    ) -> CoreResult<()> {
        let version = match version.or(self.last_touched) {
            Some(v) => v,
            None => self.ledger.current_version(target).await?,
        };
        if version.is_zero() {
            return Err(CoreError::UnknownVersion(version));
        }

        let definition = self.find_definition(target, version)?;
        if self.ledger.applied_versions(target).await?.contains(&version) {
            self.revert(target, &definition).await?;
        }
        self.apply(target, &definition).await
    }

    /// Re-derive the schema artifact without any net migration change.
    /// Tolerates the file having been deleted externally.
    pub async fn reset(&mut self, target: &TargetConfig) -> CoreResult<()> {
        self.ledger.ensure_table(target).await?;
        self.snapshot.regenerate(target).await
    }

    fn find_definition(
        &self,
        target: &TargetConfig,
        version: MigrationVersion,
    ) -> CoreResult<MigrationDefinition> {
        self.resolver
            .discover(target)?
            .into_iter()
            .find(|d| d.version == version)
            .ok_or(CoreError::UnknownVersion(version))
    }
}

/// Split a migration section into individual statements, preferring a
/// real parse and falling back to semicolon splitting.
pub fn split_statements(sql: &str) -> Vec<String> {
    if sql.trim().is_empty() {
        return Vec::new();
    }
    match Parser::parse_sql(&GenericDialect {}, sql) {
        Ok(statements) => statements.iter().map(|s| format!("{};", s)).collect(),
        Err(e) => {
            tracing::warn!("SQL parsing failed, using naive semicolon splitting: {}", e);
            sql.split(';')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| format!("{};", s))
                .collect()
        }
    }
}
