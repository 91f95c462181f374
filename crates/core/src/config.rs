//! Target registry and configuration
//!
//! Every independently migrated database is a named target with its own
//! migration directory, ledger table and schema artifacts. The registry
//! is looked up explicitly; nothing here is ambient or global.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{CoreError, CoreResult};

fn default_ledger_table() -> String {
    "schema_migrations".to_string()
}

/// One registered database target.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    pub name: String,
    /// Connection URL for the engine (ignored by the in-memory engine)
    #[serde(default)]
    pub url: String,
    /// Directory holding this target's migration files
    pub migrations_dir: PathBuf,
    /// Metadata table recording applied versions
    #[serde(default = "default_ledger_table")]
    pub ledger_table: String,
    /// Generated schema snapshot artifact
    pub snapshot_path: PathBuf,
    /// Raw DDL dump artifact for SQL-format mode
    pub structure_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(rename = "target")]
    targets: Vec<TargetConfig>,
}

/// Ordered registry of targets. Declaration order is preserved so that
/// multi-target operations run primary-first, like the original task
/// surface.
#[derive(Debug, Clone)]
pub struct Registry {
    targets: Vec<TargetConfig>,
}

impl Registry {
    pub fn new(targets: Vec<TargetConfig>) -> CoreResult<Self> {
        if targets.is_empty() {
            return Err(CoreError::Config("no targets registered".to_string()));
        }
        for (i, target) in targets.iter().enumerate() {
            if targets[..i].iter().any(|t| t.name == target.name) {
                return Err(CoreError::Config(format!(
                    "duplicate target name '{}'",
                    target.name
                )));
            }
        }
        Ok(Registry { targets })
    }

    /// Load the registry from a TOML file, applying
    /// `DUALBASE_<NAME>_URL` environment overrides.
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let parsed: ConfigFile = toml::from_str(&raw)
            .map_err(|e| CoreError::Config(format!("{}: {}", path.display(), e)))?;

        let mut targets = parsed.targets;
        for target in &mut targets {
            let key = format!("DUALBASE_{}_URL", target.name.to_uppercase());
            if let Ok(url) = std::env::var(&key) {
                target.url = url;
            }
        }
        Registry::new(targets)
    }

    pub fn get(&self, name: &str) -> CoreResult<&TargetConfig> {
        self.targets
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| CoreError::UnknownTarget(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &TargetConfig> {
        self.targets.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.targets.iter().map(|t| t.name.as_str()).collect()
    }
}

/// Which artifact the snapshot writer regenerates after each transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchemaFormat {
    /// `version:` + `create_table` snapshot file
    #[default]
    Snapshot,
    /// Raw DDL structure dump
    Sql,
}

impl SchemaFormat {
    /// Reads the `SCHEMA_FORMAT` switch, `sql` selecting structure mode.
    pub fn from_env() -> Self {
        match std::env::var("SCHEMA_FORMAT") {
            Ok(value) if value.eq_ignore_ascii_case("sql") => SchemaFormat::Sql,
            _ => SchemaFormat::Snapshot,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn loads_registry_from_toml() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("dualbase.toml");
        fs::write(
            &path,
            r#"
[[target]]
name = "primary"
url = "postgres://localhost/app"
migrations_dir = "db/migrate"
snapshot_path = "db/schema.sql"
structure_path = "db/structure.sql"

[[target]]
name = "second"
url = "postgres://localhost/app_second"
migrations_dir = "db/second_migrate"
ledger_table = "second_schema_migrations"
snapshot_path = "db/second_schema.sql"
structure_path = "db/second_structure.sql"
"#,
        )
        .unwrap();

        let registry = Registry::from_file(&path).unwrap();
        assert_eq!(registry.names(), vec!["primary", "second"]);
        assert_eq!(registry.get("primary").unwrap().ledger_table, "schema_migrations");
        assert_eq!(
            registry.get("second").unwrap().ledger_table,
            "second_schema_migrations"
        );
        assert!(matches!(
            registry.get("third"),
            Err(CoreError::UnknownTarget(_))
        ));
    }

    #[test]
    fn rejects_duplicate_target_names() {
        let target = TargetConfig {
            name: "primary".to_string(),
            url: String::new(),
            migrations_dir: PathBuf::from("db/migrate"),
            ledger_table: default_ledger_table(),
            snapshot_path: PathBuf::from("db/schema.sql"),
            structure_path: PathBuf::from("db/structure.sql"),
        };
        assert!(Registry::new(vec![target.clone(), target]).is_err());
    }
}
