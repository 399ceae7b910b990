use std::path::Path;

use anyhow::{Context, Result};
use tideway::{loader, Direction, MigrateOptions, MigrationConfig, Migrator, Registry, RunReport};

use super::connect;
use crate::discovery::find_migrations;

/// Apply migrations up to `target`, or all of them
pub async fn up(config: &MigrationConfig, target: Option<i32>, dry_run: bool) -> Result<()> {
    run(config, Direction::Up, target, dry_run).await
}

/// Roll back migrations down to `target`, or all of them
pub async fn down(config: &MigrationConfig, target: Option<i32>, dry_run: bool) -> Result<()> {
    run(config, Direction::Down, target, dry_run).await
}

async fn run(config: &MigrationConfig, direction: Direction, target: Option<i32>, dry_run: bool) -> Result<()> {
    let dir = find_migrations(config.migrations_dir.as_deref())?;
    let mut registry = load_registry(&dir)?;
    let conn = connect(config).await?;

    let options = MigrateOptions { target, dry_run };
    let mut migrator = Migrator::new(&mut registry, &conn);
    let result = match direction {
        Direction::Up => migrator.migrate(options).await,
        Direction::Down => migrator.rollback(options).await,
    };
    conn.close().await;

    let report = result?;
    println!("{}", describe(direction, &report));
    Ok(())
}

/// Build a registry from the migration files in `dir`
fn load_registry(dir: &Path) -> Result<Registry> {
    let mut registry = Registry::with_bookkeeping();
    let migrations = loader::load_dir(dir)
        .with_context(|| format!("could not load migrations from {}", dir.display()))?;

    for migration in migrations {
        registry.register(migration)?;
    }
    Ok(registry)
}

fn describe(direction: Direction, report: &RunReport) -> String {
    let (verb, done) = match (direction, report.dry_run) {
        (Direction::Up, false) => ("Applied", "applied"),
        (Direction::Up, true) => ("Would apply", "applied"),
        (Direction::Down, false) => ("Rolled back", "rolled back"),
        (Direction::Down, true) => ("Would roll back", "rolled back"),
    };

    if report.revisions.is_empty() {
        return format!("Nothing to do ({} already {})", report.skipped, done);
    }

    let revisions: Vec<String> = report.revisions.iter().map(|r| format!("{:04}", r)).collect();
    format!(
        "{} {} migration(s): {} ({}ms)",
        verb,
        report.revisions.len(),
        revisions.join(", "),
        report.execution_time_ms
    )
}
