//! Migration Runner - Brings a database to a target revision
//!
//! The runner walks a [`Registry`] in revision order and applies or rolls
//! back migrations one transaction at a time, using the `migrations` table
//! to decide which revisions are already active.

use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::backends::{BookkeepingRecord, DatabaseValue, MigrationConnection};
use crate::error::{MigrationError, MigrationResult};
use crate::executor::TransactionGuard;
use crate::migration::{Direction, Migration, BOOKKEEPING_REVISION};
use crate::registry::Registry;

const INSERT_BOOKKEEPING: &str =
    "INSERT INTO migrations (revision, name) VALUES ($1, $2) ON CONFLICT (revision) DO NOTHING";

/// Options for a migrate or rollback run
#[derive(Debug, Clone, Copy, Default)]
pub struct MigrateOptions {
    /// Revision to migrate up to or roll back down to. Migrating defaults to
    /// the latest registered revision, rolling back to revision 0.
    pub target: Option<i32>,
    /// Report the plan without executing anything
    pub dry_run: bool,
}

impl MigrateOptions {
    pub fn to(target: i32) -> Self {
        Self {
            target: Some(target),
            dry_run: false,
        }
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }
}

/// Result of a migrate or rollback run
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Revisions applied or rolled back, in the order they ran
    pub revisions: Vec<i32>,
    /// Revisions already in the requested state
    pub skipped: usize,
    /// True if nothing was executed
    pub dry_run: bool,
    pub execution_time_ms: u128,
}

/// State of one registered migration as seen by the database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub revision: i32,
    pub name: String,
    pub active: bool,
    pub applied: Option<DateTime<Utc>>,
    pub created: Option<DateTime<Utc>>,
    pub synchronized: bool,
}

/// Copy the state of the `migrations` table onto the registered migrations.
///
/// Returns the bookkeeping rows whose revision is not registered.
pub async fn sync(registry: &mut Registry, conn: &dyn MigrationConnection) -> MigrationResult<Vec<BookkeepingRecord>> {
    let records = conn
        .fetch_bookkeeping()
        .await
        .map_err(|e| MigrationError::database("reading migration status", e))?;

    let mut unknown = Vec::new();
    for record in records {
        match registry.get_mut(record.revision) {
            Some(migration) => migration.synchronize(&record),
            None => {
                warn!(
                    "Database records revision {} ({}) which is not registered",
                    record.revision, record.name
                );
                unknown.push(record);
            }
        }
    }
    Ok(unknown)
}

/// Applies and rolls back registered migrations against one connection
pub struct Migrator<'a> {
    registry: &'a mut Registry,
    conn: &'a dyn MigrationConnection,
}

impl<'a> Migrator<'a> {
    pub fn new(registry: &'a mut Registry, conn: &'a dyn MigrationConnection) -> Self {
        Self { registry, conn }
    }

    pub fn registry(&self) -> &Registry {
        &*self.registry
    }

    /// Apply every inactive migration up to the target revision, in order.
    ///
    /// The bookkeeping table is created first if needed, and a row is
    /// inserted for every registered revision that lacks one. Stops at the
    /// first migration that fails.
    pub async fn migrate(&mut self, options: MigrateOptions) -> MigrationResult<RunReport> {
        let start_time = Instant::now();
        let target = options
            .target
            .or_else(|| self.registry.latest_revision())
            .unwrap_or(BOOKKEEPING_REVISION);

        if options.dry_run {
            // The table may not exist yet, in which case nothing is active
            if let Err(e) = sync(self.registry, self.conn).await {
                warn!("Could not read migration status, assuming none applied: {}", e);
            }
        } else {
            self.ensure_bookkeeping().await?;
            sync(self.registry, self.conn).await?;
        }

        let mut pending = Vec::new();
        let mut skipped = 0;
        for m in self.registry.iter() {
            if m.is_bookkeeping() || m.revision() > target {
                continue;
            }
            if m.active() {
                skipped += 1;
            } else {
                pending.push(m.revision());
            }
        }

        let revisions = self.run(Direction::Up, &pending, options.dry_run).await?;

        Ok(RunReport {
            revisions,
            skipped,
            dry_run: options.dry_run,
            execution_time_ms: start_time.elapsed().as_millis(),
        })
    }

    /// Roll back every active migration above the target revision, newest
    /// first. Stops at the first migration that fails.
    pub async fn rollback(&mut self, options: MigrateOptions) -> MigrationResult<RunReport> {
        let start_time = Instant::now();
        let target = options.target.unwrap_or(BOOKKEEPING_REVISION);

        sync(self.registry, self.conn).await?;

        let mut active = Vec::new();
        let mut skipped = 0;
        for m in self.registry.iter().rev() {
            if m.is_bookkeeping() || m.revision() <= target {
                continue;
            }
            if m.active() {
                active.push(m.revision());
            } else {
                skipped += 1;
            }
        }

        let revisions = self.run(Direction::Down, &active, options.dry_run).await?;

        Ok(RunReport {
            revisions,
            skipped,
            dry_run: options.dry_run,
            execution_time_ms: start_time.elapsed().as_millis(),
        })
    }

    /// Synchronize with the database and report every registered migration.
    pub async fn status(&mut self) -> MigrationResult<Vec<MigrationStatus>> {
        sync(self.registry, self.conn).await?;

        Ok(self
            .registry
            .iter()
            .map(|m| MigrationStatus {
                revision: m.revision(),
                name: m.name().to_string(),
                active: m.active(),
                applied: m.applied(),
                created: m.created(),
                synchronized: m.synchronized(),
            })
            .collect())
    }

    async fn run(&mut self, direction: Direction, revisions: &[i32], dry_run: bool) -> MigrationResult<Vec<i32>> {
        let mut done = Vec::with_capacity(revisions.len());

        for &revision in revisions {
            let Some(migration) = self.registry.get_mut(revision) else {
                return Err(MigrationError::Unregistered { revision });
            };

            if dry_run {
                info!("Would run {} for migration {}", direction, migration);
            } else {
                migration.run(direction, self.conn).await?;
            }
            done.push(revision);
        }

        Ok(done)
    }

    /// Apply revision 0 and insert a bookkeeping row for every registered
    /// application migration.
    async fn ensure_bookkeeping(&mut self) -> MigrationResult<()> {
        match self.registry.get_mut(BOOKKEEPING_REVISION) {
            Some(migration) => migration.up(self.conn).await?,
            None => Migration::bookkeeping().up(self.conn).await?,
        }

        let tx = self
            .conn
            .begin()
            .await
            .map_err(|e| MigrationError::database("recording registered migrations", e))?;
        let mut guard = TransactionGuard::new(tx);

        for migration in self.registry.iter().filter(|m| !m.is_bookkeeping()) {
            let params = [
                DatabaseValue::from(migration.revision()),
                DatabaseValue::from(migration.name()),
            ];
            if let Err(e) = guard.execute(INSERT_BOOKKEEPING, &params).await {
                guard.rollback_quietly().await;
                return Err(MigrationError::database(
                    format!("recording revision {}", migration.revision()),
                    e,
                ));
            }
        }

        guard
            .commit()
            .await
            .map_err(|e| MigrationError::database("recording registered migrations", e))
    }
}
