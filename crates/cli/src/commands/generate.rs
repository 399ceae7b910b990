use anyhow::{Context, Result};
use tideway::{codegen, MigrationConfig};

use crate::discovery::find_migrations;

/// Embed the migrations directory into generated Rust code
pub fn run(config: &MigrationConfig) -> Result<()> {
    let dir = find_migrations(config.migrations_dir.as_deref())?;

    let path = codegen::generate(&dir, config.out.as_deref(), config.package.as_deref())
        .with_context(|| format!("could not generate migrations from {}", dir.display()))?;

    println!("Generated {}", path.display());
    Ok(())
}
