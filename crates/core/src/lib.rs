//! # dualbase-core: multi-database migration management
//!
//! Lets an application maintain several independently versioned
//! databases, each with its own migration directory, version ledger and
//! schema snapshot. The ledger records which versions have run, the
//! resolver computes what is pending, the runner performs forward and
//! backward transitions atomically, and the orchestrator exposes the
//! named task surface (create, drop, migrate, rollback, status, ...)
//! over a registry of targets.

pub mod config;
pub mod definitions;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod orchestrator;
pub mod resolver;
pub mod runner;
pub mod snapshot;
pub mod version;

// Re-export core types
pub use config::{Registry, SchemaFormat, TargetConfig};
pub use definitions::{MigrationDefinition, StatusEntry, VersionState};
pub use engine::{DatabaseEngine, EngineTransaction, MemoryEngine, PostgresEngine};
pub use error::{CoreError, CoreResult, PendingReport};
pub use ledger::VersionLedger;
pub use orchestrator::TaskOrchestrator;
pub use resolver::MigrationResolver;
pub use runner::MigrationRunner;
pub use snapshot::{Snapshot, SnapshotWriter};
pub use version::MigrationVersion;
