//! Schema snapshot writer
//!
//! After every successful transition the target's schema artifact is
//! regenerated: either the snapshot format (current version plus
//! `create_table` declarations) or, in SQL mode, the engine's raw
//! structure dump. Identical state always produces identical bytes, so
//! the artifact is safe to commit and diff.

use std::path::Path;
use std::sync::Arc;

use crate::config::{SchemaFormat, TargetConfig};
use crate::engine::DatabaseEngine;
use crate::error::{CoreError, CoreResult};
use crate::ledger::VersionLedger;
use crate::version::MigrationVersion;

/// Parsed form of a snapshot file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub version: MigrationVersion,
    pub tables: Vec<String>,
}

#[derive(Clone)]
pub struct SnapshotWriter {
    engine: Arc<dyn DatabaseEngine>,
    ledger: VersionLedger,
    format: SchemaFormat,
}

impl SnapshotWriter {
    pub fn new(engine: Arc<dyn DatabaseEngine>, format: SchemaFormat) -> Self {
        Self {
            ledger: VersionLedger::new(engine.clone()),
            engine,
            format,
        }
    }

    pub fn format(&self) -> SchemaFormat {
        self.format
    }

    /// Regenerate the artifact selected by the format switch.
    pub async fn regenerate(&self, target: &TargetConfig) -> CoreResult<()> {
        match self.format {
            SchemaFormat::Snapshot => self.write_snapshot(target).await,
            SchemaFormat::Sql => self.write_structure(target).await,
        }
    }

    /// Serialize current version and table set to the snapshot file.
    pub async fn write_snapshot(&self, target: &TargetConfig) -> CoreResult<()> {
        let version = self.ledger.current_version(target).await?;
        let tables: Vec<String> = self
            .engine
            .tables(target)
            .await?
            .into_iter()
            .filter(|t| t != &target.ledger_table)
            .collect();

        let content = render(version, &tables);
        write_atomically(&target.snapshot_path, &content)?;
        tracing::debug!(target = %target.name, %version, "snapshot regenerated");
        Ok(())
    }

    /// Dump raw DDL (ledger rows included) to the structure file.
    pub async fn write_structure(&self, target: &TargetConfig) -> CoreResult<()> {
        let dump = self.engine.dump_structure(target).await?;
        write_atomically(&target.structure_path, &dump)?;
        tracing::debug!(target = %target.name, "structure dump regenerated");
        Ok(())
    }

    /// Parse a snapshot file back into version and table list.
    pub fn read_snapshot(path: &Path) -> CoreResult<Snapshot> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Snapshot(format!("cannot read {}: {}", path.display(), e))
        })?;

        let mut version = None;
        let mut tables = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if let Some(raw) = line.strip_prefix("version:") {
                version = Some(raw.trim().parse::<MigrationVersion>().map_err(|_| {
                    CoreError::Snapshot(format!("invalid version line in {}", path.display()))
                })?);
            } else if let Some(raw) = line.strip_prefix("create_table") {
                tables.push(raw.trim().trim_matches('"').to_string());
            }
        }

        match version {
            Some(version) => Ok(Snapshot { version, tables }),
            None => Err(CoreError::Snapshot(format!(
                "no version line in {}",
                path.display()
            ))),
        }
    }
}

/// Render the snapshot text. Tables appear in the order the engine
/// reports them, which for engines that track it is creation order.
pub fn render(version: MigrationVersion, tables: &[String]) -> String {
    let mut out = format!("version: {}\n", version);
    for table in tables {
        out.push('\n');
        out.push_str(&format!("create_table \"{}\"\n", table));
    }
    out
}

fn write_atomically(path: &Path, content: &str) -> CoreResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}
