//! PostgreSQL Backend Implementation
//!
//! Implements the migration backend traits over a sqlx `PgPool`.

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgPoolOptions};
use sqlx::query::Query;
use sqlx::{Executor, PgPool, Postgres, Row, Transaction};
use tracing::debug;

use super::core::*;

const SELECT_BOOKKEEPING: &str =
    "SELECT revision, name, active, applied, created FROM migrations ORDER BY revision";

/// PostgreSQL connection pool used to run migrations
#[derive(Debug, Clone)]
pub struct PostgresConnection {
    pool: PgPool,
}

impl PostgresConnection {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to the database at `database_url`. Migrations run one
    /// transaction at a time, so a single connection is enough.
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Get the underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl MigrationConnection for PostgresConnection {
    async fn begin(&self) -> Result<Box<dyn MigrationTransaction>, sqlx::Error> {
        let tx = self.pool.begin().await?;
        debug!("Began migration transaction");
        Ok(Box::new(PostgresTransaction { inner: Some(tx) }))
    }

    async fn fetch_bookkeeping(&self) -> Result<Vec<BookkeepingRecord>, sqlx::Error> {
        let rows = sqlx::query(SELECT_BOOKKEEPING).fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| {
                Ok(BookkeepingRecord {
                    revision: row.try_get("revision")?,
                    name: row.try_get::<Option<String>, _>("name")?.unwrap_or_default(),
                    active: row.try_get::<Option<bool>, _>("active")?.unwrap_or(false),
                    applied: row.try_get("applied")?,
                    created: row.try_get("created")?,
                })
            })
            .collect()
    }
}

/// PostgreSQL transaction implementation
pub struct PostgresTransaction {
    inner: Option<Transaction<'static, Postgres>>,
}

impl PostgresTransaction {
    fn take(&mut self) -> Result<Transaction<'static, Postgres>, sqlx::Error> {
        self.inner.take().ok_or_else(closed)
    }
}

fn closed() -> sqlx::Error {
    sqlx::Error::Protocol("transaction has already been closed".to_string())
}

#[async_trait]
impl MigrationTransaction for PostgresTransaction {
    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> Result<u64, sqlx::Error> {
        let tx = self.inner.as_mut().ok_or_else(closed)?;

        let result = if params.is_empty() {
            // Unprepared so that multi-statement migration bodies run as one batch
            (&mut **tx).execute(sql).await?
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_database_value(query, param);
            }
            query.execute(&mut **tx).await?
        };

        Ok(result.rows_affected())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), sqlx::Error> {
        self.take()?.commit().await
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), sqlx::Error> {
        self.take()?.rollback().await
    }

    fn abort(&mut self) {
        // sqlx queues a ROLLBACK when an open transaction is dropped
        if self.inner.take().is_some() {
            debug!("Abandoned migration transaction, rollback queued");
        }
    }
}

fn bind_database_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &DatabaseValue,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        DatabaseValue::Null => query.bind(Option::<String>::None),
        DatabaseValue::Bool(b) => query.bind(*b),
        DatabaseValue::Int32(i) => query.bind(*i),
        DatabaseValue::String(s) => query.bind(s.clone()),
        DatabaseValue::DateTime(dt) => query.bind(*dt),
    }
}
