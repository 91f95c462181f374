//! Error types for the migration core
//!
//! Realizes the error taxonomy shared by the ledger, resolver, runner
//! and orchestrator. Every failure here is a deterministic schema/state
//! mismatch, so nothing is retried.

use thiserror::Error;

use crate::version::MigrationVersion;

/// Result type alias for core operations
pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Target database unreachable or does not exist. Fatal, no retry.
    #[error("connection to database '{target}' failed: {message}")]
    Connection { target: String, message: String },

    /// A requested version matches neither a migration definition nor a
    /// ledger entry, so the operation cannot determine what to run.
    #[error("no migration with version {0}")]
    UnknownVersion(MigrationVersion),

    /// The ledger already holds this version. Should be unreachable given
    /// the resolver's pending computation; indicates corruption or a
    /// concurrent run without external locking.
    #[error("version {version} is already recorded in '{table}'")]
    DuplicateVersion {
        version: MigrationVersion,
        table: String,
    },

    /// Raised only by the abort-if-pending guard. Reported on stderr and
    /// turned into a non-zero exit by the caller.
    #[error("{0}")]
    PendingMigrations(PendingReport),

    /// Status was requested against a target whose ledger table has never
    /// been created. Distinct from "table exists but is empty".
    #[error("schema migrations table does not exist yet ('{table}')")]
    LedgerTableMissing { table: String },

    /// No target registered under this name.
    #[error("unknown database target '{0}'")]
    UnknownTarget(String),

    /// Migration file or DDL failure scoped to a single operation.
    #[error("migration error: {0}")]
    Migration(String),

    /// Snapshot file unreadable or malformed.
    #[error("snapshot error: {0}")]
    Snapshot(String),

    /// Engine-level statement failure that is not a connection problem.
    #[error("database error: {0}")]
    Database(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Per-target failures collected by a multi-target operation. Every
    /// registered target was still attempted.
    #[error("{}", format_failures(.0))]
    MultiTarget(Vec<(String, String)>),
}

/// Human-readable listing of pending migrations across targets, produced
/// by the abort-if-pending guard.
#[derive(Debug, Clone)]
pub struct PendingReport {
    pub entries: Vec<(String, MigrationVersion, String)>,
}

impl std::fmt::Display for PendingReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "You have {} pending migration(s):",
            self.entries.len()
        )?;
        for (target, version, name) in &self.entries {
            writeln!(f, "  [{}] {} {}", target, version, name)?;
        }
        Ok(())
    }
}

fn format_failures(failures: &[(String, String)]) -> String {
    let mut out = format!("{} target(s) failed:", failures.len());
    for (target, message) in failures {
        out.push_str(&format!("\n  {}: {}", target, message));
    }
    out
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::Database(err.to_string())
    }
}
