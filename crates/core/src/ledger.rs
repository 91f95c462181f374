//! Version ledger
//!
//! One metadata table per target, one row per applied migration version.
//! The ledger is the sole source of truth for "applied". A missing table
//! means the target has never been migrated; an existing empty table
//! means it has been fully rolled back. Callers that care get at the
//! difference through [`VersionLedger::table_exists`].

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::config::TargetConfig;
use crate::engine::DatabaseEngine;
use crate::error::{CoreError, CoreResult};
use crate::version::MigrationVersion;

#[derive(Clone)]
pub struct VersionLedger {
    engine: Arc<dyn DatabaseEngine>,
}

impl VersionLedger {
    pub fn new(engine: Arc<dyn DatabaseEngine>) -> Self {
        Self { engine }
    }

    /// Idempotently create the ledger table.
    pub async fn ensure_table(&self, target: &TargetConfig) -> CoreResult<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (\"version\" BIGINT PRIMARY KEY);",
            target.ledger_table
        );
        self.engine.execute(target, &sql).await
    }

    pub async fn table_exists(&self, target: &TargetConfig) -> CoreResult<bool> {
        self.engine.table_exists(target, &target.ledger_table).await
    }

    /// Every recorded version. Empty when the table has never been
    /// created; connection failures still surface as errors.
    pub async fn applied_versions(
        &self,
        target: &TargetConfig,
    ) -> CoreResult<BTreeSet<MigrationVersion>> {
        if !self.table_exists(target).await? {
            return Ok(BTreeSet::new());
        }
        let versions = self
            .engine
            .select_versions(target, &target.ledger_table)
            .await?;
        Ok(versions.into_iter().collect())
    }

    /// Insert one entry outside any runner transaction. Used by snapshot
    /// loading, where there is no migration to wrap.
    pub async fn record(&self, target: &TargetConfig, version: MigrationVersion) -> CoreResult<()> {
        if self.applied_versions(target).await?.contains(&version) {
            return Err(CoreError::DuplicateVersion {
                version,
                table: target.ledger_table.clone(),
            });
        }
        let mut tx = self.engine.begin(target).await?;
        tx.record_version(&target.ledger_table, version).await?;
        tx.commit().await
    }

    /// Delete one entry. Erroring on an absent row keeps ledger drift
    /// loud instead of silent.
    pub async fn erase(&self, target: &TargetConfig, version: MigrationVersion) -> CoreResult<()> {
        let mut tx = self.engine.begin(target).await?;
        tx.erase_version(&target.ledger_table, version).await?;
        tx.commit().await
    }

    /// Maximum recorded version, or the ZERO sentinel when none.
    pub async fn current_version(&self, target: &TargetConfig) -> CoreResult<MigrationVersion> {
        Ok(self
            .applied_versions(target)
            .await?
            .iter()
            .next_back()
            .copied()
            .unwrap_or(MigrationVersion::ZERO))
    }
}
