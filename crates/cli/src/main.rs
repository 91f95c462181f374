mod commands;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use dualbase_core::{
    CoreError, PostgresEngine, Registry, SchemaFormat, TaskOrchestrator,
};

#[derive(Parser)]
#[command(name = "dualbase")]
#[command(about = "Migration tasks for independently versioned databases")]
struct Cli {
    /// Target registry file
    #[arg(long, global = true, default_value = "dualbase.toml")]
    config: PathBuf,

    /// Operate on a single target instead of every registered one
    #[arg(long, global = true)]
    database: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database for every target (or one with --database)
    Create,

    /// Drop the database for every target (or one with --database)
    Drop,

    /// Drop and recreate every database empty
    Purge,

    /// Create (dropping first if present) and migrate to head
    Setup,

    /// Run pending migrations, optionally up or down to a version
    Migrate {
        /// Target version; falls back to the VERSION environment variable
        #[arg(long)]
        version: Option<i64>,
    },

    /// Apply a single migration version
    MigrateUp {
        #[arg(long)]
        version: Option<i64>,
    },

    /// Revert a single migration version
    MigrateDown {
        #[arg(long)]
        version: Option<i64>,
    },

    /// Revert the most recent migrations
    Rollback {
        #[arg(long, default_value_t = 1)]
        steps: usize,
    },

    /// Apply the next pending migrations
    Forward {
        #[arg(long, default_value_t = 1)]
        steps: usize,
    },

    /// Revert then re-apply one version (latest touched if omitted)
    Redo {
        #[arg(long)]
        version: Option<i64>,
    },

    /// Re-derive the schema snapshot without changing migration state
    Reset,

    /// Report up/down/orphaned state for every known version
    Status,

    /// Report the current schema version
    Version,

    /// Exit non-zero if any target has pending migrations
    AbortIfPendingMigrations,

    /// Recreate every target database empty
    TestPurge,

    /// Rebuild every target from its schema snapshot, skipping migrations
    TestLoadSchema,

    /// Rebuild every target from its raw structure dump
    TestLoadStructure,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        match e.downcast_ref::<CoreError>() {
            // The guard's listing belongs on the diagnostic stream.
            Some(CoreError::PendingMigrations(report)) => eprint!("{}", report),
            _ => eprintln!("error: {}", e),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let registry = Registry::from_file(&cli.config)?;
    let engine = Arc::new(PostgresEngine::new());
    let mut orch = TaskOrchestrator::new(registry, engine, SchemaFormat::from_env());
    let database = cli.database.as_deref();

    match cli.command {
        Commands::Create => commands::db::create(&mut orch, database).await?,
        Commands::Drop => commands::db::drop(&mut orch, database).await?,
        Commands::Purge => commands::db::purge(&mut orch, database).await?,
        Commands::Setup => commands::db::setup(&mut orch, database).await?,
        Commands::Migrate { version } => {
            commands::db::migrate(&mut orch, database, version).await?
        }
        Commands::MigrateUp { version } => {
            commands::db::migrate_up(&mut orch, database, version).await?
        }
        Commands::MigrateDown { version } => {
            commands::db::migrate_down(&mut orch, database, version).await?
        }
        Commands::Rollback { steps } => {
            commands::db::rollback(&mut orch, database, steps).await?
        }
        Commands::Forward { steps } => {
            commands::db::forward(&mut orch, database, steps).await?
        }
        Commands::Redo { version } => commands::db::redo(&mut orch, database, version).await?,
        Commands::Reset => commands::db::reset(&mut orch, database).await?,
        Commands::Status => commands::db::status(&orch, database).await?,
        Commands::Version => commands::db::version(&orch, database).await?,
        Commands::AbortIfPendingMigrations => orch.abort_if_pending().await?,
        Commands::TestPurge => orch.test_purge().await?,
        Commands::TestLoadSchema => orch.test_load_schema().await?,
        Commands::TestLoadStructure => orch.test_load_structure().await?,
    }
    Ok(())
}
