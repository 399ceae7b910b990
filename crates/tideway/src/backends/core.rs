//! Core Database Backend Traits
//!
//! The migration engine talks to the database only through these traits, so
//! up/down execution can run against PostgreSQL in production and against a
//! recording connection in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A connection (or pool) able to open transactions and read bookkeeping
#[async_trait]
pub trait MigrationConnection: Send + Sync {
    /// Begin a transaction
    async fn begin(&self) -> Result<Box<dyn MigrationTransaction>, sqlx::Error>;

    /// Read every row of the `migrations` bookkeeping table
    async fn fetch_bookkeeping(&self) -> Result<Vec<BookkeepingRecord>, sqlx::Error>;
}

/// An open transaction.
///
/// Dropping a transaction that was neither committed nor rolled back must
/// roll it back; [`MigrationTransaction::abort`] is how callers request that
/// without awaiting.
#[async_trait]
pub trait MigrationTransaction: Send {
    /// Execute a statement within the transaction and return the affected
    /// row count. Statements without parameters may contain several SQL
    /// statements separated by semicolons.
    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> Result<u64, sqlx::Error>;

    /// Commit the transaction
    async fn commit(self: Box<Self>) -> Result<(), sqlx::Error>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> Result<(), sqlx::Error>;

    /// Start a rollback without waiting for it. Used when a transaction is
    /// abandoned by a panic or a cancelled future.
    fn abort(&mut self);
}

/// One row of the `migrations` table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookkeepingRecord {
    pub revision: i32,
    pub name: String,
    pub active: bool,
    pub applied: Option<DateTime<Utc>>,
    pub created: Option<DateTime<Utc>>,
}

/// Parameter values bound to bookkeeping statements
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseValue {
    Null,
    Bool(bool),
    Int32(i32),
    String(String),
    DateTime(DateTime<Utc>),
}

impl DatabaseValue {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, DatabaseValue::Null)
    }
}

impl From<bool> for DatabaseValue {
    fn from(value: bool) -> Self {
        DatabaseValue::Bool(value)
    }
}

impl From<i32> for DatabaseValue {
    fn from(value: i32) -> Self {
        DatabaseValue::Int32(value)
    }
}

impl From<String> for DatabaseValue {
    fn from(value: String) -> Self {
        DatabaseValue::String(value)
    }
}

impl From<&str> for DatabaseValue {
    fn from(value: &str) -> Self {
        DatabaseValue::String(value.to_string())
    }
}

impl From<DateTime<Utc>> for DatabaseValue {
    fn from(value: DateTime<Utc>) -> Self {
        DatabaseValue::DateTime(value)
    }
}

impl<T> From<Option<T>> for DatabaseValue
where
    T: Into<DatabaseValue>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => DatabaseValue::Null,
        }
    }
}
