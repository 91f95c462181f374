//! Migration resolver
//!
//! Discovers migration files for one target and computes the delta
//! between what exists on disk and what the ledger says has run. Each
//! target has its own migration directory, so definitions never leak
//! between targets.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::config::TargetConfig;
use crate::definitions::{MigrationDefinition, StatusEntry, VersionState};
use crate::engine::DatabaseEngine;
use crate::error::{CoreError, CoreResult, PendingReport};
use crate::ledger::VersionLedger;
use crate::version::MigrationVersion;

#[derive(Clone)]
pub struct MigrationResolver {
    ledger: VersionLedger,
}

impl MigrationResolver {
    pub fn new(engine: Arc<dyn DatabaseEngine>) -> Self {
        Self {
            ledger: VersionLedger::new(engine),
        }
    }

    /// All definitions in the target's migration directory, ascending by
    /// version. A missing directory is an empty catalog, not an error.
    pub fn discover(&self, target: &TargetConfig) -> CoreResult<Vec<MigrationDefinition>> {
        if !target.migrations_dir.exists() {
            return Ok(Vec::new());
        }

        let mut definitions = Vec::new();
        for entry in std::fs::read_dir(&target.migrations_dir)? {
            let path = entry?.path();
            if path.extension().map_or(false, |ext| ext == "sql") {
                definitions.push(MigrationDefinition::from_file(&path)?);
            }
        }

        definitions.sort_by_key(|d| d.version);
        for pair in definitions.windows(2) {
            if pair[0].version == pair[1].version {
                return Err(CoreError::Migration(format!(
                    "duplicate migration version {} in {}",
                    pair[0].version,
                    target.migrations_dir.display()
                )));
            }
        }
        Ok(definitions)
    }

    /// Discovered minus applied, ascending. Orphaned ledger entries are
    /// tolerated here; they only show up in status reporting.
    pub async fn pending(&self, target: &TargetConfig) -> CoreResult<Vec<MigrationDefinition>> {
        let applied = self.ledger.applied_versions(target).await?;
        Ok(self
            .discover(target)?
            .into_iter()
            .filter(|d| !applied.contains(&d.version))
            .collect())
    }

    pub async fn has_pending(&self, target: &TargetConfig) -> CoreResult<bool> {
        Ok(!self.pending(target).await?.is_empty())
    }

    /// Applied versions whose definition can no longer be found.
    pub async fn orphaned(&self, target: &TargetConfig) -> CoreResult<Vec<MigrationVersion>> {
        let discovered: BTreeSet<MigrationVersion> =
            self.discover(target)?.iter().map(|d| d.version).collect();
        Ok(self
            .ledger
            .applied_versions(target)
            .await?
            .into_iter()
            .filter(|v| !discovered.contains(v))
            .collect())
    }

    /// Merge of discovered and applied versions, each exactly once,
    /// ascending, tagged up/down/orphaned.
    pub async fn status(&self, target: &TargetConfig) -> CoreResult<Vec<StatusEntry>> {
        let applied = self.ledger.applied_versions(target).await?;
        let discovered = self.discover(target)?;

        let mut entries: Vec<StatusEntry> = discovered
            .iter()
            .map(|d| StatusEntry {
                version: d.version,
                name: Some(d.name.clone()),
                state: if applied.contains(&d.version) {
                    VersionState::Up
                } else {
                    VersionState::Down
                },
            })
            .collect();

        let known: BTreeSet<MigrationVersion> = discovered.iter().map(|d| d.version).collect();
        for version in applied {
            if !known.contains(&version) {
                entries.push(StatusEntry {
                    version,
                    name: None,
                    state: VersionState::Orphaned,
                });
            }
        }

        entries.sort_by_key(|e| e.version);
        Ok(entries)
    }

    /// Fail-fast guard for deploy-time checks: an error listing every
    /// pending version across the given targets, or Ok when none.
    pub async fn abort_if_pending(&self, targets: &[&TargetConfig]) -> CoreResult<()> {
        let mut entries = Vec::new();
        for target in targets {
            for def in self.pending(target).await? {
                entries.push((target.name.clone(), def.version, def.name.clone()));
            }
        }
        if entries.is_empty() {
            Ok(())
        } else {
            Err(CoreError::PendingMigrations(PendingReport { entries }))
        }
    }
}
