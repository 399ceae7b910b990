//! In-memory migration backend for integration tests
//!
//! `RecordingConnection` records every transaction call and emulates the
//! `migrations` bookkeeping table: statements are buffered per transaction
//! and only take effect on commit. Individual calls can be made to fail,
//! panic or hang.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use tideway::{BookkeepingRecord, DatabaseValue, MigrationConnection, MigrationTransaction};

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Begin,
    Execute(String),
    Commit,
    Rollback,
    Abort,
}

/// Calls that should misbehave. Statement faults match on a substring of
/// the executed SQL.
#[derive(Debug, Clone, Default)]
pub struct Faults {
    pub begin: bool,
    pub execute: Option<&'static str>,
    pub commit: bool,
    pub rollback: bool,
    pub panic: Option<&'static str>,
    pub hang: Option<&'static str>,
}

#[derive(Debug, Default)]
struct State {
    events: Vec<Event>,
    table_exists: bool,
    records: BTreeMap<i32, BookkeepingRecord>,
}

#[derive(Clone, Default)]
pub struct RecordingConnection {
    state: Arc<Mutex<State>>,
    faults: Faults,
}

fn db_error(message: &str) -> sqlx::Error {
    sqlx::Error::Protocol(message.to_string())
}

impl RecordingConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// A connection whose bookkeeping table already exists
    pub fn with_table() -> Self {
        let conn = Self::new();
        conn.lock().table_exists = true;
        conn
    }

    /// A connection sharing this one's state but with different faults
    pub fn with_faults(&self, faults: Faults) -> Self {
        Self {
            state: Arc::clone(&self.state),
            faults,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert a bookkeeping row as if an earlier run had recorded it
    pub fn seed(&self, revision: i32, name: &str, active: bool) {
        let mut state = self.lock();
        state.table_exists = true;
        state.records.insert(
            revision,
            BookkeepingRecord {
                revision,
                name: name.to_string(),
                active,
                applied: active.then(Utc::now),
                created: Some(Utc::now()),
            },
        );
    }

    pub fn events(&self) -> Vec<Event> {
        self.lock().events.clone()
    }

    pub fn clear_events(&self) {
        self.lock().events.clear();
    }

    /// Every statement executed, committed or not
    pub fn statements(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Execute(sql) => Some(sql),
                _ => None,
            })
            .collect()
    }

    pub fn record(&self, revision: i32) -> Option<BookkeepingRecord> {
        self.lock().records.get(&revision).cloned()
    }

    pub fn table_exists(&self) -> bool {
        self.lock().table_exists
    }
}

#[async_trait]
impl MigrationConnection for RecordingConnection {
    async fn begin(&self) -> Result<Box<dyn MigrationTransaction>, sqlx::Error> {
        if self.faults.begin {
            return Err(db_error("connection refused"));
        }
        self.lock().events.push(Event::Begin);
        Ok(Box::new(RecordingTransaction {
            conn: self.clone(),
            pending: Vec::new(),
        }))
    }

    async fn fetch_bookkeeping(&self) -> Result<Vec<BookkeepingRecord>, sqlx::Error> {
        let state = self.lock();
        if !state.table_exists {
            return Err(db_error("relation \"migrations\" does not exist"));
        }
        Ok(state.records.values().cloned().collect())
    }
}

pub struct RecordingTransaction {
    conn: RecordingConnection,
    pending: Vec<(String, Vec<DatabaseValue>)>,
}

impl RecordingTransaction {
    fn creates_table(&self) -> bool {
        self.pending
            .iter()
            .any(|(sql, _)| sql.contains("CREATE TABLE IF NOT EXISTS migrations"))
    }
}

#[async_trait]
impl MigrationTransaction for RecordingTransaction {
    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> Result<u64, sqlx::Error> {
        self.conn.lock().events.push(Event::Execute(sql.to_string()));
        let faults = self.conn.faults.clone();

        if faults.panic.is_some_and(|f| sql.contains(f)) {
            panic!("statement panicked: {}", sql);
        }
        if faults.hang.is_some_and(|f| sql.contains(f)) {
            std::future::pending::<()>().await;
        }
        if faults.execute.is_some_and(|f| sql.contains(f)) {
            return Err(db_error("syntax error"));
        }

        let touches_table = sql.starts_with("INSERT INTO migrations") || sql.starts_with("UPDATE migrations");
        if touches_table && !self.conn.table_exists() && !self.creates_table() {
            return Err(db_error("relation \"migrations\" does not exist"));
        }

        self.pending.push((sql.to_string(), params.to_vec()));
        Ok(1)
    }

    async fn commit(self: Box<Self>) -> Result<(), sqlx::Error> {
        let mut state = self.conn.lock();
        state.events.push(Event::Commit);
        if self.conn.faults.commit {
            return Err(db_error("could not serialize access"));
        }
        for (sql, params) in &self.pending {
            apply(&mut state, sql, params);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), sqlx::Error> {
        self.conn.lock().events.push(Event::Rollback);
        if self.conn.faults.rollback {
            return Err(db_error("connection reset"));
        }
        Ok(())
    }

    fn abort(&mut self) {
        self.pending.clear();
        self.conn.lock().events.push(Event::Abort);
    }
}

fn apply(state: &mut State, sql: &str, params: &[DatabaseValue]) {
    if sql.contains("CREATE TABLE IF NOT EXISTS migrations") {
        state.table_exists = true;
    } else if sql.contains("DROP TABLE IF EXISTS migrations") {
        state.table_exists = false;
        state.records.clear();
    } else if sql.starts_with("INSERT INTO migrations") {
        if let [DatabaseValue::Int32(revision), DatabaseValue::String(name)] = params {
            state.records.entry(*revision).or_insert_with(|| BookkeepingRecord {
                revision: *revision,
                name: name.clone(),
                active: false,
                applied: None,
                created: Some(Utc::now()),
            });
        }
    } else if sql.starts_with("UPDATE migrations") {
        match params {
            [DatabaseValue::Bool(active), DatabaseValue::DateTime(applied), DatabaseValue::Int32(revision)] => {
                if let Some(record) = state.records.get_mut(revision) {
                    record.active = *active;
                    record.applied = Some(*applied);
                }
            }
            [DatabaseValue::Bool(active), DatabaseValue::Int32(revision)] => {
                if let Some(record) = state.records.get_mut(revision) {
                    record.active = *active;
                    record.applied = None;
                }
            }
            _ => {}
        }
    }
}
