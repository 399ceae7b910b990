//! Migration configuration
//!
//! Settings shared by the code generator and the runner. Values come from
//! the environment and can be overridden field by field.

use std::env;
use std::path::PathBuf;

/// Environment variable holding the database URL
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";
/// Environment variable holding the migrations directory
pub const MIGRATIONS_DIR_ENV: &str = "TIDEWAY_MIGRATIONS_DIR";
/// Environment variable holding the generated code output path
pub const OUT_ENV: &str = "TIDEWAY_OUT";
/// Environment variable holding the package override
pub const PACKAGE_ENV: &str = "TIDEWAY_PACKAGE";

/// Configuration for the migration system
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationConfig {
    /// Directory where migration files are stored. Tools search for a
    /// `migrations` directory when this is unset.
    pub migrations_dir: Option<PathBuf>,
    /// Where generated code is written (see `codegen::output_path`)
    pub out: Option<PathBuf>,
    /// Package name overriding the migrations' package directives
    pub package: Option<String>,
    /// Database to migrate
    pub database_url: Option<String>,
}

impl MigrationConfig {
    /// Build a configuration from environment variables. Unset or empty
    /// variables leave their field unset.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            migrations_dir: get(MIGRATIONS_DIR_ENV).map(PathBuf::from),
            out: get(OUT_ENV).map(PathBuf::from),
            package: get(PACKAGE_ENV),
            database_url: get(DATABASE_URL_ENV),
        }
    }

    pub fn with_migrations_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.migrations_dir = Some(dir.into());
        self
    }

    pub fn with_out<P: Into<PathBuf>>(mut self, out: P) -> Self {
        self.out = Some(out.into());
        self
    }

    pub fn with_package<S: Into<String>>(mut self, package: S) -> Self {
        self.package = Some(package.into());
        self
    }

    pub fn with_database_url<S: Into<String>>(mut self, url: S) -> Self {
        self.database_url = Some(url.into());
        self
    }
}
