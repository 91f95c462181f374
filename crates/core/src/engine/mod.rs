//! Engine abstraction
//!
//! The migration core never talks to a database driver directly. It goes
//! through these traits: a connection-provider/DDL-executor pair scoped
//! to one target per operation. The Postgres engine is the production
//! implementation; the in-memory engine backs the behavioral test suite.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::config::TargetConfig;
use crate::error::CoreResult;
use crate::version::MigrationVersion;

pub use memory::MemoryEngine;
pub use postgres::PostgresEngine;

/// A transactional scope against exactly one target database. DDL and
/// ledger writes inside one scope commit or roll back together; dropping
/// the scope without committing rolls back.
#[async_trait]
pub trait EngineTransaction: Send {
    /// Execute one schema statement inside the transaction.
    async fn execute_ddl(&mut self, sql: &str) -> CoreResult<()>;

    /// Insert a ledger row. Fails with `DuplicateVersion` if present.
    async fn record_version(&mut self, table: &str, version: MigrationVersion) -> CoreResult<()>;

    /// Delete a ledger row. Fails with `UnknownVersion` if absent.
    async fn erase_version(&mut self, table: &str, version: MigrationVersion) -> CoreResult<()>;

    async fn commit(self: Box<Self>) -> CoreResult<()>;

    async fn rollback(self: Box<Self>) -> CoreResult<()>;
}

/// Engine-level operations against named target databases. One
/// connection per target per operation, released when the operation
/// ends.
#[async_trait]
pub trait DatabaseEngine: Send + Sync {
    async fn create_database(&self, target: &TargetConfig) -> CoreResult<()>;

    async fn drop_database(&self, target: &TargetConfig) -> CoreResult<()>;

    async fn database_exists(&self, target: &TargetConfig) -> CoreResult<bool>;

    async fn table_exists(&self, target: &TargetConfig, table: &str) -> CoreResult<bool>;

    /// Table names, in creation order where the engine can know it.
    async fn tables(&self, target: &TargetConfig) -> CoreResult<Vec<String>>;

    /// Execute a single autocommitted statement.
    async fn execute(&self, target: &TargetConfig, sql: &str) -> CoreResult<()>;

    /// All versions recorded in a ledger table, ascending.
    async fn select_versions(
        &self,
        target: &TargetConfig,
        table: &str,
    ) -> CoreResult<Vec<MigrationVersion>>;

    async fn begin(&self, target: &TargetConfig) -> CoreResult<Box<dyn EngineTransaction>>;

    /// Raw DDL dump of the target, ledger rows included.
    async fn dump_structure(&self, target: &TargetConfig) -> CoreResult<String>;

    /// Replay a structure dump against the target.
    async fn load_structure(&self, target: &TargetConfig, sql: &str) -> CoreResult<()>;
}
