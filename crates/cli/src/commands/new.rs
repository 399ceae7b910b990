use anyhow::Result;
use tideway::{loader, MigrationConfig};

use crate::discovery::find_migrations;

/// Create a blank migration with the next free revision
pub fn run(config: &MigrationConfig, name: Option<&str>, package: Option<&str>) -> Result<()> {
    let dir = find_migrations(config.migrations_dir.as_deref())?;
    let package = package.or(config.package.as_deref());

    let path = loader::create(&dir, name, package)?;
    println!("Created migration: {}", path.display());
    Ok(())
}
