//! In-memory engine
//!
//! Interprets schema statements at the level the snapshot format cares
//! about: which tables exist and which versions a ledger table holds.
//! Statements are parsed with sqlparser, falling back to naive textual
//! interpretation when parsing fails. Backs the behavioral test suite.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sqlparser::ast::{Expr, ObjectType, SetExpr, Statement, Value};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::config::TargetConfig;
use crate::error::{CoreError, CoreResult};
use crate::version::MigrationVersion;

use super::{DatabaseEngine, EngineTransaction};

#[derive(Debug, Clone, Default)]
struct MemoryDatabase {
    /// Table names in creation order
    tables: Vec<String>,
    /// Version rows per ledger table
    rows: HashMap<String, BTreeSet<MigrationVersion>>,
}

type SharedState = Arc<Mutex<HashMap<String, MemoryDatabase>>>;

/// Engine holding every target database as plain in-process state.
#[derive(Debug, Clone, Default)]
pub struct MemoryEngine {
    state: SharedState,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_db<T>(
        &self,
        target: &TargetConfig,
        f: impl FnOnce(&MemoryDatabase) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let state = self.state.lock().expect("engine state poisoned");
        let db = state
            .get(&target.name)
            .ok_or_else(|| connection_error(target))?;
        f(db)
    }

    fn with_db_mut<T>(
        &self,
        target: &TargetConfig,
        f: impl FnOnce(&mut MemoryDatabase) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let mut state = self.state.lock().expect("engine state poisoned");
        let db = state
            .get_mut(&target.name)
            .ok_or_else(|| connection_error(target))?;
        f(db)
    }
}

fn connection_error(target: &TargetConfig) -> CoreError {
    CoreError::Connection {
        target: target.name.clone(),
        message: format!("database \"{}\" does not exist", target.name),
    }
}

fn object_name(name: &sqlparser::ast::ObjectName) -> String {
    name.0
        .last()
        .map(|ident| ident.value.clone())
        .unwrap_or_default()
}

/// Apply one parsed statement. Anything that is not a table creation,
/// a table drop or a ledger insert/delete is accepted and ignored,
/// since only schema-level facts are tracked here.
fn apply_statement(db: &mut MemoryDatabase, statement: &Statement) -> CoreResult<()> {
    match statement {
        Statement::CreateTable(ct) => {
            let table = object_name(&ct.name);
            if db.tables.iter().any(|t| t == &table) {
                if ct.if_not_exists {
                    return Ok(());
                }
                return Err(CoreError::Database(format!(
                    "relation \"{}\" already exists",
                    table
                )));
            }
            db.tables.push(table);
            Ok(())
        }
        Statement::Drop {
            object_type: ObjectType::Table,
            if_exists,
            names,
            ..
        } => {
            for name in names {
                let table = object_name(name);
                if let Some(pos) = db.tables.iter().position(|t| t == &table) {
                    db.tables.remove(pos);
                    db.rows.remove(&table);
                } else if !if_exists {
                    return Err(CoreError::Database(format!(
                        "table \"{}\" does not exist",
                        table
                    )));
                }
            }
            Ok(())
        }
        Statement::Insert(insert) => {
            let table = object_name(&insert.table_name);
            if !db.tables.iter().any(|t| t == &table) {
                return Err(CoreError::Database(format!(
                    "relation \"{}\" does not exist",
                    table
                )));
            }
            if let Some(source) = &insert.source {
                if let SetExpr::Values(values) = source.body.as_ref() {
                    for row in &values.rows {
                        for expr in row {
                            if let Expr::Value(Value::Number(number, _)) = expr {
                                let version: MigrationVersion =
                                    number.parse().map_err(|_| {
                                        CoreError::Database(format!(
                                            "invalid version literal '{}'",
                                            number
                                        ))
                                    })?;
                                db.rows.entry(table.clone()).or_default().insert(version);
                            }
                        }
                    }
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Interpret a batch of SQL against one database.
fn apply_sql(db: &mut MemoryDatabase, sql: &str) -> CoreResult<()> {
    match Parser::parse_sql(&GenericDialect {}, sql) {
        Ok(statements) => {
            for statement in &statements {
                apply_statement(db, statement)?;
            }
            Ok(())
        }
        Err(e) => {
            tracing::warn!("SQL parsing failed, using naive interpretation: {}", e);
            apply_sql_naive(db, sql)
        }
    }
}

fn apply_sql_naive(db: &mut MemoryDatabase, sql: &str) -> CoreResult<()> {
    for raw in sql.split(';') {
        let statement = raw.trim();
        if statement.is_empty() {
            continue;
        }
        let upper = statement.to_uppercase();
        if upper.starts_with("CREATE TABLE") {
            let rest = &statement["CREATE TABLE".len()..];
            let rest = strip_prefix_ci(rest.trim_start(), "IF NOT EXISTS");
            if let Some(table) = first_identifier(rest) {
                if !db.tables.iter().any(|t| t == &table) {
                    db.tables.push(table);
                }
            }
        } else if upper.starts_with("DROP TABLE") {
            let rest = &statement["DROP TABLE".len()..];
            let rest = strip_prefix_ci(rest.trim_start(), "IF EXISTS");
            if let Some(table) = first_identifier(rest) {
                if let Some(pos) = db.tables.iter().position(|t| t == &table) {
                    db.tables.remove(pos);
                    db.rows.remove(&table);
                }
            }
        } else if upper.starts_with("INSERT INTO") {
            let rest = &statement["INSERT INTO".len()..];
            if let Some(table) = first_identifier(rest.trim_start()) {
                if let Some(open) = upper.rfind('(') {
                    let digits: String = statement[open..]
                        .chars()
                        .filter(|c| c.is_ascii_digit())
                        .collect();
                    if let Ok(version) = digits.parse::<MigrationVersion>() {
                        db.rows.entry(table).or_default().insert(version);
                    }
                }
            }
        }
    }
    Ok(())
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> &'a str {
    if s.len() >= prefix.len() && s[..prefix.len()].eq_ignore_ascii_case(prefix) {
        s[prefix.len()..].trim_start()
    } else {
        s
    }
}

fn first_identifier(s: &str) -> Option<String> {
    let s = s.trim_start();
    let end = s
        .find(|c: char| c.is_whitespace() || c == '(' || c == ';')
        .unwrap_or(s.len());
    let ident = s[..end].trim_matches('"').trim_matches('`');
    if ident.is_empty() {
        None
    } else {
        Some(ident.to_string())
    }
}

#[async_trait]
impl DatabaseEngine for MemoryEngine {
    async fn create_database(&self, target: &TargetConfig) -> CoreResult<()> {
        let mut state = self.state.lock().expect("engine state poisoned");
        if state.contains_key(&target.name) {
            return Err(CoreError::Database(format!(
                "database \"{}\" already exists",
                target.name
            )));
        }
        state.insert(target.name.clone(), MemoryDatabase::default());
        Ok(())
    }

    async fn drop_database(&self, target: &TargetConfig) -> CoreResult<()> {
        let mut state = self.state.lock().expect("engine state poisoned");
        state
            .remove(&target.name)
            .map(|_| ())
            .ok_or_else(|| connection_error(target))
    }

    async fn database_exists(&self, target: &TargetConfig) -> CoreResult<bool> {
        let state = self.state.lock().expect("engine state poisoned");
        Ok(state.contains_key(&target.name))
    }

    async fn table_exists(&self, target: &TargetConfig, table: &str) -> CoreResult<bool> {
        self.with_db(target, |db| Ok(db.tables.iter().any(|t| t == table)))
    }

    async fn tables(&self, target: &TargetConfig) -> CoreResult<Vec<String>> {
        self.with_db(target, |db| Ok(db.tables.clone()))
    }

    async fn execute(&self, target: &TargetConfig, sql: &str) -> CoreResult<()> {
        self.with_db_mut(target, |db| apply_sql(db, sql))
    }

    async fn select_versions(
        &self,
        target: &TargetConfig,
        table: &str,
    ) -> CoreResult<Vec<MigrationVersion>> {
        self.with_db(target, |db| {
            if !db.tables.iter().any(|t| t == table) {
                return Err(CoreError::Database(format!(
                    "relation \"{}\" does not exist",
                    table
                )));
            }
            Ok(db
                .rows
                .get(table)
                .map(|set| set.iter().copied().collect())
                .unwrap_or_default())
        })
    }

    async fn begin(&self, target: &TargetConfig) -> CoreResult<Box<dyn EngineTransaction>> {
        let working = self.with_db(target, |db| Ok(db.clone()))?;
        Ok(Box::new(MemoryTransaction {
            state: Arc::clone(&self.state),
            target: target.name.clone(),
            working,
        }))
    }

    async fn dump_structure(&self, target: &TargetConfig) -> CoreResult<String> {
        self.with_db(target, |db| {
            let mut out = String::new();
            for table in &db.tables {
                out.push_str(&format!("CREATE TABLE \"{}\" ();\n", table));
            }
            for table in &db.tables {
                if let Some(versions) = db.rows.get(table) {
                    for version in versions {
                        out.push_str(&format!(
                            "INSERT INTO \"{}\" (\"version\") VALUES ({});\n",
                            table, version
                        ));
                    }
                }
            }
            Ok(out)
        })
    }

    async fn load_structure(&self, target: &TargetConfig, sql: &str) -> CoreResult<()> {
        self.with_db_mut(target, |db| apply_sql(db, sql))
    }
}

/// Clone-mutate-swap transaction: work on a copy, install it on commit.
struct MemoryTransaction {
    state: SharedState,
    target: String,
    working: MemoryDatabase,
}

#[async_trait]
impl EngineTransaction for MemoryTransaction {
    async fn execute_ddl(&mut self, sql: &str) -> CoreResult<()> {
        apply_sql(&mut self.working, sql)
    }

    async fn record_version(&mut self, table: &str, version: MigrationVersion) -> CoreResult<()> {
        if !self.working.tables.iter().any(|t| t == table) {
            return Err(CoreError::Database(format!(
                "relation \"{}\" does not exist",
                table
            )));
        }
        let rows = self.working.rows.entry(table.to_string()).or_default();
        if !rows.insert(version) {
            return Err(CoreError::DuplicateVersion {
                version,
                table: table.to_string(),
            });
        }
        Ok(())
    }

    async fn erase_version(&mut self, table: &str, version: MigrationVersion) -> CoreResult<()> {
        let removed = self
            .working
            .rows
            .get_mut(table)
            .map(|rows| rows.remove(&version))
            .unwrap_or(false);
        if !removed {
            return Err(CoreError::UnknownVersion(version));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> CoreResult<()> {
        let mut state = self.state.lock().expect("engine state poisoned");
        if !state.contains_key(&self.target) {
            return Err(CoreError::Connection {
                target: self.target.clone(),
                message: "database dropped during transaction".to_string(),
            });
        }
        state.insert(self.target.clone(), self.working);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> CoreResult<()> {
        Ok(())
    }
}
