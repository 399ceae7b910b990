//! Transactional up/down execution
//!
//! Applying or rolling back a migration runs two statements in one
//! transaction: the migration's own SQL and, for application migrations, the
//! update of its row in the `migrations` table. Either both commit or
//! neither does.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::backends::{DatabaseValue, MigrationConnection, MigrationTransaction};
use crate::error::{MigrationError, MigrationResult, TransactionStage};
use crate::migration::{Direction, Migration, BOOKKEEPING_REVISION};

const MARK_APPLIED: &str = "UPDATE migrations SET active=$1, applied=$2 WHERE revision=$3";
const MARK_ROLLED_BACK: &str = "UPDATE migrations SET active=$1, applied=NULL WHERE revision=$2";

/// The bookkeeping statement and parameters recording `direction` for `revision`.
pub(crate) fn bookkeeping_statement(
    direction: Direction,
    revision: i32,
    now: DateTime<Utc>,
) -> (&'static str, Vec<DatabaseValue>) {
    match direction {
        Direction::Up => (
            MARK_APPLIED,
            vec![true.into(), now.into(), revision.into()],
        ),
        Direction::Down => (MARK_ROLLED_BACK, vec![false.into(), revision.into()]),
    }
}

/// Owns an open transaction until it is committed or rolled back. If it is
/// dropped while still open (a panic, or the future being cancelled) the
/// transaction is aborted.
pub(crate) struct TransactionGuard {
    tx: Option<Box<dyn MigrationTransaction>>,
}

impl TransactionGuard {
    pub(crate) fn new(tx: Box<dyn MigrationTransaction>) -> Self {
        Self { tx: Some(tx) }
    }

    pub(crate) async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> Result<u64, sqlx::Error> {
        match self.tx.as_mut() {
            Some(tx) => tx.execute(sql, params).await,
            None => Err(sqlx::Error::Protocol("transaction has already been closed".to_string())),
        }
    }

    pub(crate) async fn commit(mut self) -> Result<(), sqlx::Error> {
        match self.tx.take() {
            Some(tx) => tx.commit().await,
            None => Ok(()),
        }
    }

    /// Roll back after a failed statement. The rollback's own error is
    /// logged and dropped so the statement's error can be returned.
    pub(crate) async fn rollback_quietly(mut self) {
        if let Some(tx) = self.tx.take() {
            if let Err(e) = tx.rollback().await {
                warn!("Rollback after failed statement also failed: {}", e);
            }
        }
    }
}

impl Drop for TransactionGuard {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.as_mut() {
            warn!("Migration transaction abandoned while open, rolling back");
            tx.abort();
        }
    }
}

impl Migration {
    /// Apply the migration. The up SQL and the bookkeeping update run in a
    /// single transaction; any failure rolls both back.
    pub async fn up(&mut self, conn: &dyn MigrationConnection) -> MigrationResult<()> {
        self.run(Direction::Up, conn).await
    }

    /// Roll the migration back. The down SQL and the bookkeeping update run
    /// in a single transaction; any failure rolls both back.
    pub async fn down(&mut self, conn: &dyn MigrationConnection) -> MigrationResult<()> {
        self.run(Direction::Down, conn).await
    }

    /// Run the migration in the given direction.
    pub async fn run(&mut self, direction: Direction, conn: &dyn MigrationConnection) -> MigrationResult<()> {
        let revision = self.revision();
        let failed = |stage: TransactionStage, source: sqlx::Error| MigrationError::Transaction {
            revision,
            direction,
            stage,
            source,
        };

        let sql = self.descriptor().sql(direction)?.to_string();
        let now = Utc::now();

        debug!("Beginning {} transaction for revision {}", direction, revision);
        let tx = conn
            .begin()
            .await
            .map_err(|e| failed(TransactionStage::Begin, e))?;
        let mut guard = TransactionGuard::new(tx);

        if let Err(e) = guard.execute(&sql, &[]).await {
            guard.rollback_quietly().await;
            return Err(failed(TransactionStage::Execute, e));
        }

        if revision > BOOKKEEPING_REVISION {
            let (statement, params) = bookkeeping_statement(direction, revision, now);
            if let Err(e) = guard.execute(statement, &params).await {
                guard.rollback_quietly().await;
                return Err(failed(TransactionStage::Bookkeeping, e));
            }
        }

        guard
            .commit()
            .await
            .map_err(|e| failed(TransactionStage::Commit, e))?;

        match direction {
            Direction::Up => {
                self.active = true;
                self.applied = Some(now);
                info!("Applied migration {}", self);
            }
            Direction::Down => {
                self.active = false;
                self.applied = None;
                info!("Rolled back migration {}", self);
            }
        }
        Ok(())
    }
}
