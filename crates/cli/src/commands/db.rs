//! Database task commands
//!
//! Thin printing layer over the orchestrator. Reports go to stdout;
//! errors bubble up to main, which routes them to stderr and a
//! non-zero exit.

use anyhow::{bail, Result};

use dualbase_core::{MigrationVersion, TaskOrchestrator};

/// Resolve the version argument, falling back to the rake-style
/// `VERSION` environment variable.
fn resolve_version(flag: Option<i64>) -> Result<Option<MigrationVersion>> {
    if let Some(raw) = flag {
        return Ok(Some(MigrationVersion(raw)));
    }
    match std::env::var("VERSION") {
        Ok(raw) => {
            let version = raw
                .parse::<MigrationVersion>()
                .map_err(|_| anyhow::anyhow!("invalid VERSION '{}'", raw))?;
            Ok(Some(version))
        }
        Err(_) => Ok(None),
    }
}

fn require_version(flag: Option<i64>) -> Result<MigrationVersion> {
    resolve_version(flag)?
        .ok_or_else(|| anyhow::anyhow!("VERSION is required for this task"))
}

fn require_database(database: Option<&str>) -> Result<&str> {
    match database {
        Some(name) => Ok(name),
        None => bail!("this task needs --database <target>"),
    }
}

pub async fn create(orch: &mut TaskOrchestrator, database: Option<&str>) -> Result<()> {
    match database {
        Some(name) => orch.create(name).await?,
        None => orch.create_all().await?,
    }
    println!("Created database(s)");
    Ok(())
}

pub async fn drop(orch: &mut TaskOrchestrator, database: Option<&str>) -> Result<()> {
    match database {
        Some(name) => orch.drop(name).await?,
        None => orch.drop_all().await?,
    }
    println!("Dropped database(s)");
    Ok(())
}

pub async fn purge(orch: &mut TaskOrchestrator, database: Option<&str>) -> Result<()> {
    match database {
        Some(name) => orch.purge(name).await?,
        None => orch.purge_all().await?,
    }
    println!("Purged database(s)");
    Ok(())
}

pub async fn setup(orch: &mut TaskOrchestrator, database: Option<&str>) -> Result<()> {
    match database {
        Some(name) => orch.setup(name).await?,
        None => orch.setup_all().await?,
    }
    println!("Database(s) ready");
    Ok(())
}

pub async fn migrate(
    orch: &mut TaskOrchestrator,
    database: Option<&str>,
    version: Option<i64>,
) -> Result<()> {
    let version = resolve_version(version)?;
    match database {
        Some(name) => orch.migrate(name, version).await?,
        None => {
            if version.is_some() {
                bail!("migrating to a VERSION needs --database <target>");
            }
            orch.migrate_all().await?;
        }
    }
    Ok(())
}

pub async fn migrate_up(
    orch: &mut TaskOrchestrator,
    database: Option<&str>,
    version: Option<i64>,
) -> Result<()> {
    let name = require_database(database)?;
    let version = require_version(version)?;
    orch.migrate_up(name, version).await?;
    Ok(())
}

pub async fn migrate_down(
    orch: &mut TaskOrchestrator,
    database: Option<&str>,
    version: Option<i64>,
) -> Result<()> {
    let name = require_database(database)?;
    let version = require_version(version)?;
    orch.migrate_down(name, version).await?;
    Ok(())
}

pub async fn rollback(
    orch: &mut TaskOrchestrator,
    database: Option<&str>,
    steps: usize,
) -> Result<()> {
    let name = require_database(database)?;
    orch.rollback(name, steps).await?;
    Ok(())
}

pub async fn forward(
    orch: &mut TaskOrchestrator,
    database: Option<&str>,
    steps: usize,
) -> Result<()> {
    let name = require_database(database)?;
    orch.forward(name, steps).await?;
    Ok(())
}

pub async fn redo(
    orch: &mut TaskOrchestrator,
    database: Option<&str>,
    version: Option<i64>,
) -> Result<()> {
    let name = require_database(database)?;
    let version = resolve_version(version)?;
    orch.redo(name, version).await?;
    Ok(())
}

pub async fn reset(orch: &mut TaskOrchestrator, database: Option<&str>) -> Result<()> {
    let name = require_database(database)?;
    orch.reset(name).await?;
    Ok(())
}

pub async fn status(orch: &TaskOrchestrator, database: Option<&str>) -> Result<()> {
    let names: Vec<String> = match database {
        Some(name) => vec![name.to_string()],
        None => orch
            .registry()
            .names()
            .into_iter()
            .map(str::to_string)
            .collect(),
    };

    for name in names {
        let entries = orch.status(&name).await?;
        println!("database: {}", name);
        println!();
        println!(" {:<8} {:<16} {}", "Status", "Migration ID", "Migration Name");
        println!("{}", "-".repeat(50));
        for entry in entries {
            println!(
                " {:<8} {:<16} {}",
                entry.state.to_string(),
                entry.version.to_string(),
                entry.name.as_deref().unwrap_or("********** NO FILE **********"),
            );
        }
        println!();
    }
    Ok(())
}

pub async fn version(orch: &TaskOrchestrator, database: Option<&str>) -> Result<()> {
    let names: Vec<String> = match database {
        Some(name) => vec![name.to_string()],
        None => orch
            .registry()
            .names()
            .into_iter()
            .map(str::to_string)
            .collect(),
    };

    for name in names {
        let version = orch.current_version(&name).await?;
        println!("{} current version: {}", name, version);
    }
    Ok(())
}
