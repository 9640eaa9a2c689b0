//! In-memory database backend for tests
//!
//! Understands just enough SQL to stand in for PostgreSQL in migration tests:
//! the catalog queries and DDL/DML the engine issues, `CREATE TABLE` and
//! `INSERT` from migration files, and transaction keywords. Anything it does
//! not recognise fails like a syntax error.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};

use crate::backends::{DatabaseConnection, DatabaseConnector, DatabaseRow, DatabaseValue};
use crate::config::ConnectionConfig;
use crate::error::{OrmError, OrmResult};

#[derive(Debug, Clone)]
struct LedgerRow {
    id: i32,
    name: String,
    executed_at: NaiveDateTime,
}

#[derive(Debug, Default)]
struct Table {
    rows: Vec<LedgerRow>,
}

#[derive(Debug, Default)]
struct State {
    databases: BTreeSet<String>,
    tables: HashMap<(String, String), Table>,
    executed: Vec<(String, String)>,
    failure_patterns: Vec<String>,
    refuse_connections: bool,
    refused_databases: BTreeSet<String>,
    stale_lookups: bool,
    connected: Vec<String>,
    open_connections: usize,
}

/// Shared handle to one fake server
#[derive(Clone, Default)]
pub struct FakeDatabase {
    state: Arc<Mutex<State>>,
}

impl FakeDatabase {
    /// A server holding only the `postgres` admin database
    pub fn new() -> Self {
        let db = Self::default();
        db.lock().databases.insert("postgres".to_string());
        db
    }

    pub fn with_database(name: &str) -> Self {
        let db = Self::new();
        db.lock().databases.insert(name.to_string());
        db
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn connector(&self) -> Arc<dyn DatabaseConnector> {
        Arc::new(FakeConnector { db: self.clone() })
    }

    /// A connection that bypasses the connector bookkeeping
    pub fn connection(&self, database: &str) -> FakeConnection {
        FakeConnection {
            db: self.clone(),
            database: database.to_string(),
            counted: false,
        }
    }

    /// Fail every statement or query containing `pattern`
    pub fn fail_on(&self, pattern: &str) {
        self.lock().failure_patterns.push(pattern.to_string());
    }

    pub fn refuse_connections(&self) {
        self.lock().refuse_connections = true;
    }

    /// Refuse connections to one database while the rest of the server works
    pub fn refuse_connections_to(&self, database: &str) {
        self.lock().refused_databases.insert(database.to_string());
    }

    /// Make ledger point lookups miss, as if another runner inserted the row
    /// after this runner checked
    pub fn simulate_concurrent_runner(&self) {
        self.lock().stale_lookups = true;
    }

    pub fn has_database(&self, name: &str) -> bool {
        self.lock().databases.contains(name)
    }

    pub fn has_table(&self, database: &str, table: &str) -> bool {
        self.lock()
            .tables
            .contains_key(&(database.to_string(), table.to_string()))
    }

    /// Names recorded in `table`, in insertion order
    pub fn ledger_names(&self, database: &str, table: &str) -> Vec<String> {
        self.lock()
            .tables
            .get(&(database.to_string(), table.to_string()))
            .map(|t| t.rows.iter().map(|row| row.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Insert a ledger row directly, creating the table if needed
    pub fn seed_ledger(&self, database: &str, table: &str, name: &str) {
        let mut state = self.lock();
        let rows = &mut state
            .tables
            .entry((database.to_string(), table.to_string()))
            .or_default()
            .rows;
        let id = rows.len() as i32 + 1;
        rows.push(LedgerRow {
            id,
            name: name.to_string(),
            executed_at: Utc::now().naive_utc(),
        });
    }

    /// Statements passed to `execute` against `database`, in order
    pub fn executed_statements(&self, database: &str) -> Vec<String> {
        self.lock()
            .executed
            .iter()
            .filter(|(db, _)| db == database)
            .map(|(_, sql)| sql.clone())
            .collect()
    }

    /// Number of executed statements (any database) containing `pattern`
    pub fn count_executed(&self, pattern: &str) -> usize {
        self.lock()
            .executed
            .iter()
            .filter(|(_, sql)| sql.contains(pattern))
            .count()
    }

    /// Databases connected to through the connector, in order
    pub fn connected_databases(&self) -> Vec<String> {
        self.lock().connected.clone()
    }

    pub fn open_connections(&self) -> usize {
        self.lock().open_connections
    }
}

struct FakeConnector {
    db: FakeDatabase,
}

#[async_trait]
impl DatabaseConnector for FakeConnector {
    async fn connect(&self, config: &ConnectionConfig) -> OrmResult<Box<dyn DatabaseConnection>> {
        let mut state = self.db.lock();

        if state.refuse_connections || state.refused_databases.contains(&config.database) {
            return Err(OrmError::Connection("connection refused".to_string()));
        }

        if !state.databases.contains(&config.database) {
            return Err(OrmError::Connection(format!(
                "database \"{}\" does not exist",
                config.database
            )));
        }

        state.connected.push(config.database.clone());
        state.open_connections += 1;

        Ok(Box::new(FakeConnection {
            db: self.db.clone(),
            database: config.database.clone(),
            counted: true,
        }))
    }
}

pub struct FakeConnection {
    db: FakeDatabase,
    database: String,
    counted: bool,
}

impl FakeConnection {
    fn check_failure(state: &State, sql: &str) -> OrmResult<()> {
        match state.failure_patterns.iter().find(|p| sql.contains(p.as_str())) {
            Some(pattern) => Err(OrmError::Query(format!("injected failure on '{}'", pattern))),
            None => Ok(()),
        }
    }

    fn key(&self, table: &str) -> (String, String) {
        (self.database.clone(), table.to_string())
    }

    fn param_string(params: &[DatabaseValue]) -> OrmResult<String> {
        match params.first() {
            Some(DatabaseValue::String(s)) => Ok(s.clone()),
            other => Err(OrmError::Query(format!("expected string parameter, got {:?}", other))),
        }
    }
}

#[async_trait]
impl DatabaseConnection for FakeConnection {
    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> OrmResult<u64> {
        let mut state = self.db.lock();
        Self::check_failure(&state, sql)?;

        let words = keywords(sql);
        let first = match words.first() {
            Some(word) => word.to_uppercase(),
            None => {
                state.executed.push((self.database.clone(), sql.to_string()));
                return Ok(0);
            }
        };

        let affected = match first.as_str() {
            "CREATE" if upper_at(&words, 1) == "DATABASE" => {
                let name = unquote(words.get(2).map(String::as_str).unwrap_or_default());
                if !state.databases.insert(name.clone()) {
                    return Err(OrmError::Query(format!("database \"{}\" already exists", name)));
                }
                0
            }
            "CREATE" if upper_at(&words, 1) == "TABLE" => {
                let if_not_exists = upper_at(&words, 2) == "IF";
                let raw = if if_not_exists { words.get(5) } else { words.get(2) };
                let table = unquote(raw.map(String::as_str).unwrap_or_default());
                let key = self.key(&table);

                if state.tables.contains_key(&key) {
                    if !if_not_exists {
                        return Err(OrmError::Query(format!(
                            "relation \"{}\" already exists",
                            table
                        )));
                    }
                } else {
                    state.tables.insert(key, Table::default());
                }
                0
            }
            "INSERT" => {
                let table = unquote(words.get(2).map(String::as_str).unwrap_or_default());
                let stale_lookups = state.stale_lookups;
                let rows = &mut state
                    .tables
                    .get_mut(&self.key(&table))
                    .ok_or_else(|| {
                        OrmError::Query(format!("relation \"{}\" does not exist", table))
                    })?
                    .rows;

                if !params.is_empty() {
                    let name = Self::param_string(params)?;
                    if stale_lookups || rows.iter().any(|row| row.name == name) {
                        return Err(OrmError::UniqueViolation(format!(
                            "duplicate key value violates unique constraint \"{}_name_key\"",
                            table
                        )));
                    }
                    let id = rows.len() as i32 + 1;
                    rows.push(LedgerRow {
                        id,
                        name,
                        executed_at: Utc::now().naive_utc(),
                    });
                }
                1
            }
            "BEGIN" | "COMMIT" | "ROLLBACK" | "ALTER" | "DROP" | "UPDATE" | "DELETE"
            | "SELECT" => 0,
            _ => {
                return Err(OrmError::Query(format!(
                    "syntax error at or near \"{}\"",
                    words[0]
                )))
            }
        };

        state.executed.push((self.database.clone(), sql.to_string()));
        Ok(affected)
    }

    async fn fetch_all(
        &mut self,
        sql: &str,
        _params: &[DatabaseValue],
    ) -> OrmResult<Vec<Box<dyn DatabaseRow>>> {
        let state = self.db.lock();
        Self::check_failure(&state, sql)?;

        if !sql.starts_with("SELECT name, executed_at FROM") {
            return Err(OrmError::Query(format!("unsupported query: {}", sql)));
        }

        let words = keywords(sql);
        let table = unquote(&words[4]);
        let table = state
            .tables
            .get(&self.key(&table))
            .ok_or_else(|| OrmError::Query(format!("relation \"{}\" does not exist", table)))?;

        let mut rows = table.rows.clone();
        rows.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(rows
            .into_iter()
            .map(|row| {
                Box::new(FakeRow::from([
                    ("name", DatabaseValue::String(row.name)),
                    ("executed_at", DatabaseValue::Timestamp(row.executed_at)),
                ])) as Box<dyn DatabaseRow>
            })
            .collect())
    }

    async fn fetch_optional(
        &mut self,
        sql: &str,
        params: &[DatabaseValue],
    ) -> OrmResult<Option<Box<dyn DatabaseRow>>> {
        let state = self.db.lock();
        Self::check_failure(&state, sql)?;

        let row = if sql.contains("pg_catalog.pg_database") {
            let name = Self::param_string(params)?;
            state
                .databases
                .contains(&name)
                .then(|| FakeRow::from([("datname", DatabaseValue::String(name))]))
        } else if sql.contains("information_schema.tables") {
            let table = Self::param_string(params)?;
            let exists = state.tables.contains_key(&self.key(&table));
            Some(FakeRow::from([("exists", DatabaseValue::Bool(exists))]))
        } else if sql.starts_with("SELECT id FROM") {
            let words = keywords(sql);
            let table = unquote(&words[3]);
            let name = Self::param_string(params)?;
            let rows = &state
                .tables
                .get(&self.key(&table))
                .ok_or_else(|| OrmError::Query(format!("relation \"{}\" does not exist", table)))?
                .rows;

            rows.iter()
                .find(|row| row.name == name && !state.stale_lookups)
                .map(|row| FakeRow::from([("id", DatabaseValue::Int32(row.id))]))
        } else if sql.contains("NOW()") {
            Some(FakeRow::from([(
                "current_time",
                DatabaseValue::DateTime(Utc::now()),
            )]))
        } else {
            return Err(OrmError::Query(format!("unsupported query: {}", sql)));
        };

        Ok(row.map(|r| Box::new(r) as Box<dyn DatabaseRow>))
    }

    async fn close(self: Box<Self>) -> OrmResult<()> {
        if self.counted {
            let mut state = self.db.lock();
            state.open_connections = state.open_connections.saturating_sub(1);
        }
        Ok(())
    }
}

struct FakeRow(HashMap<String, DatabaseValue>);

impl<const N: usize> From<[(&str, DatabaseValue); N]> for FakeRow {
    fn from(columns: [(&str, DatabaseValue); N]) -> Self {
        Self(
            columns
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        )
    }
}

impl DatabaseRow for FakeRow {
    fn get_by_name(&self, name: &str) -> OrmResult<DatabaseValue> {
        self.0
            .get(name)
            .cloned()
            .ok_or_else(|| OrmError::Query(format!("Column '{}' not found", name)))
    }

    fn column_names(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }
}

/// Words of the statement after leading `--` comment lines, split on
/// whitespace and `(`
fn keywords(sql: &str) -> Vec<String> {
    sql.lines()
        .skip_while(|line| {
            let line = line.trim();
            line.is_empty() || line.starts_with("--")
        })
        .flat_map(|line| line.split(|c: char| c.is_whitespace() || c == '('))
        .filter(|word| !word.is_empty())
        .map(str::to_string)
        .collect()
}

fn upper_at(words: &[String], index: usize) -> String {
    words.get(index).map(|w| w.to_uppercase()).unwrap_or_default()
}

fn unquote(identifier: &str) -> String {
    identifier.trim_matches('"').to_string()
}
