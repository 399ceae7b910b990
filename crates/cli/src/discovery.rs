//! Locating the migrations directory

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use walkdir::WalkDir;

const MIGRATIONS_DIR: &str = "migrations";

/// The migrations directory to use: the configured one if set, otherwise
/// the result of searching the working directory.
pub fn find_migrations(configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = configured {
        return Ok(dir.to_path_buf());
    }

    let cwd = env::current_dir().context("could not determine the working directory")?;
    search(&cwd)
}

/// Search below `root` for a directory named `migrations`.
///
/// Hidden directories, directories starting with `~` and cargo `target`
/// directories are not searched. With no match the root itself is used;
/// more than one match is an error. The result is relative to `root`.
pub fn search(root: &Path) -> Result<PathBuf> {
    let mut found = Vec::new();

    let mut walker = WalkDir::new(root).into_iter();
    while let Some(entry) = walker.next() {
        let entry = entry.with_context(|| format!("could not search {}", root.display()))?;
        if entry.depth() == 0 || !entry.file_type().is_dir() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().to_lowercase();
        if name == MIGRATIONS_DIR {
            found.push(entry.into_path());
            walker.skip_current_dir();
        } else if name.starts_with('.') || name.starts_with('~') || name == "target" {
            walker.skip_current_dir();
        }
    }

    match found.as_slice() {
        [] => Ok(PathBuf::from(".")),
        [dir] => Ok(dir.strip_prefix(root).map(Path::to_path_buf).unwrap_or_else(|_| dir.clone())),
        dirs => bail!(
            "discovered {} migrations directories, please specify which one to use",
            dirs.len()
        ),
    }
}
