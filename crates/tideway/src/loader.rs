//! Migration Loader - File system operations for migrations
//!
//! Handles creating new migration files and loading a directory of them.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::debug;

use crate::descriptor::{DOWN_DIRECTIVE, PACKAGE_DIRECTIVE, UP_DIRECTIVE};
use crate::error::{MigrationError, MigrationResult};
use crate::filename::is_migration_filename;
use crate::migration::Migration;

/// Load every migration file in `dir`, sorted by revision.
///
/// Only files named like migrations are read; anything else in the
/// directory is skipped. Two files with the same revision are an error.
pub fn load_dir<P: AsRef<Path>>(dir: P) -> MigrationResult<Vec<Migration>> {
    let dir = dir.as_ref();
    let entries = fs::read_dir(dir).map_err(|e| MigrationError::io(dir, e))?;

    let mut migrations = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| MigrationError::io(dir, e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        match path.file_name().and_then(|f| f.to_str()) {
            Some(filename) if is_migration_filename(filename) => {
                debug!("Loading migration {}", path.display());
                migrations.push(Migration::open(&path)?);
            }
            _ => debug!("Skipping {}", path.display()),
        }
    }

    migrations.sort_by_key(|m| m.revision());
    if let Some(pair) = migrations
        .windows(2)
        .find(|pair| pair[0].revision() == pair[1].revision())
    {
        return Err(MigrationError::DuplicateRevision {
            revision: pair[0].revision(),
        });
    }

    Ok(migrations)
}

/// Create a new, empty migration file in `dir` with the next free revision.
///
/// Without a name the migration is called `auto_<timestamp>`.
pub fn create<P: AsRef<Path>>(dir: P, name: Option<&str>, package: Option<&str>) -> MigrationResult<PathBuf> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).map_err(|e| MigrationError::io(dir, e))?;

    let revision = match load_dir(dir)?.last() {
        Some(latest) => latest.revision().checked_add(1).ok_or_else(|| MigrationError::Format {
            identifier: latest.descriptor().source().to_string(),
            reason: Some("no revision number left after this one".to_string()),
        })?,
        None => 1,
    };

    let slug = match name {
        Some(name) => slugify(name),
        None => format!("auto_{}", Utc::now().format("%Y%m%d%H%M%S")),
    };
    if slug.is_empty() {
        return Err(MigrationError::format(name.unwrap_or_default()));
    }

    let filename = format!("{:04}_{}.sql", revision, slug);
    let path = dir.join(&filename);

    let template = migration_template(&slug.replace('_', " "), package);
    fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .and_then(|mut file| std::io::Write::write_all(&mut file, template.as_bytes()))
        .map_err(|e| MigrationError::io(&path, e))?;

    Ok(path)
}

/// Lowercase the name and map everything that is not a word character to `_`.
fn slugify(name: &str) -> String {
    let mapped: String = name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();

    mapped
        .split('_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

fn migration_template(title: &str, package: Option<&str>) -> String {
    let mut template = String::new();
    if let Some(package) = package.filter(|p| !p.is_empty()) {
        template.push_str(&format!("{} {}\n", PACKAGE_DIRECTIVE, package));
    }
    template.push_str(&format!(
        "-- Migration: {}\n\
         -- Created: {}\n\n\
         {}\n\n\n\
         {}\n\n",
        title,
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
        UP_DIRECTIVE,
        DOWN_DIRECTIVE,
    ));
    template
}
