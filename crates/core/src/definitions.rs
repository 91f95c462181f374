//! Core migration types
//!
//! A migration lives in a per-target directory as
//! `<version>_<name>.sql` with `-- up` and `-- down` sections. Once
//! loaded the definition is immutable for the rest of the run.

use std::path::Path;

use crate::error::{CoreError, CoreResult};
use crate::version::MigrationVersion;

/// A single schema migration with both transition directions.
#[derive(Debug, Clone)]
pub struct MigrationDefinition {
    /// Unique, timestamp-like version
    pub version: MigrationVersion,
    /// Human-readable name derived from the filename
    pub name: String,
    /// SQL statements for the forward transition
    pub up_sql: String,
    /// SQL statements for the backward transition
    pub down_sql: String,
}

impl MigrationDefinition {
    /// Parse a migration from a `<version>_<name>.sql` file.
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| CoreError::Migration(format!("invalid migration filename: {}", path.display())))?;

        let (raw_version, raw_name) = stem.split_once('_').ok_or_else(|| {
            CoreError::Migration(format!(
                "migration filename must follow <version>_<name>.sql: {}",
                stem
            ))
        })?;

        let version: MigrationVersion = raw_version.parse().map_err(|_| {
            CoreError::Migration(format!("invalid migration version '{}' in {}", raw_version, stem))
        })?;

        let (up_sql, down_sql) = parse_sections(&content);

        Ok(MigrationDefinition {
            version,
            name: raw_name.replace('_', " "),
            up_sql,
            down_sql,
        })
    }
}

/// Split migration file content into UP and DOWN sections.
fn parse_sections(content: &str) -> (String, String) {
    let mut up = Vec::new();
    let mut down = Vec::new();
    let mut section = "";

    for line in content.lines() {
        let marker = line.trim().to_lowercase();
        if marker.starts_with("-- up") {
            section = "up";
            continue;
        } else if marker.starts_with("-- down") {
            section = "down";
            continue;
        }
        if line.trim().is_empty() || line.trim().starts_with("--") {
            continue;
        }
        match section {
            "up" => up.push(line),
            "down" => down.push(line),
            _ => {}
        }
    }

    (
        up.join("\n").trim().to_string(),
        down.join("\n").trim().to_string(),
    )
}

/// State of one version in a status report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionState {
    /// Recorded in the ledger with a matching definition
    Up,
    /// Definition exists but nothing recorded
    Down,
    /// Recorded in the ledger but the definition is gone
    Orphaned,
}

impl std::fmt::Display for VersionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VersionState::Up => write!(f, "up"),
            VersionState::Down => write!(f, "down"),
            VersionState::Orphaned => write!(f, "orphaned"),
        }
    }
}

/// One row in a status report: the union of discovered and applied
/// versions contains each version exactly once.
#[derive(Debug, Clone)]
pub struct StatusEntry {
    pub version: MigrationVersion,
    /// None for orphaned versions, whose files no longer exist
    pub name: Option<String>,
    pub state: VersionState,
}
