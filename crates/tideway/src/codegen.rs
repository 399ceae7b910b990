//! Code generation for embedded migrations
//!
//! `generate` turns a directory of migration sources into a Rust module that
//! embeds each migration as a serialized descriptor, so the migrations are
//! compiled into the application binary:
//!
//! ```rust,ignore
//! mod migrations; // generated
//!
//! let mut registry = tideway::Registry::with_bookkeeping();
//! migrations::accounts::register(&mut registry)?;
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{MigrationError, MigrationResult};
use crate::loader::load_dir;
use crate::migration::Migration;

/// Module name used when no migration declares a package
pub const DEFAULT_PACKAGE: &str = "migrations";

const GENERATED_FILE: &str = "migrations.rs";
const BYTES_PER_LINE: usize = 16;

const REGISTER_FN: &str = "    ];

    /// Register every embedded migration
    pub fn register(registry: &mut tideway::Registry) -> tideway::MigrationResult<()> {
        for data in DESCRIPTORS {
            registry.register_descriptor(data)?;
        }
        Ok(())
    }
}
";

/// Decide the module name for the generated code.
///
/// A non-empty override wins. Otherwise every migration that declares a
/// package must declare the same one; with none declared the default is used.
pub fn determine_package(migrations: &[Migration], override_package: Option<&str>) -> MigrationResult<String> {
    let package = match override_package.filter(|p| !p.is_empty()) {
        Some(package) => package.to_string(),
        None => {
            let mut found: Option<&str> = None;
            for package in migrations.iter().map(|m| m.package()).filter(|p| !p.is_empty()) {
                match found {
                    Some(first) if first != package => {
                        return Err(MigrationError::PackageConflict {
                            first: first.to_string(),
                            second: package.to_string(),
                        });
                    }
                    _ => found = Some(package),
                }
            }
            found.unwrap_or(DEFAULT_PACKAGE).to_string()
        }
    };

    if !is_identifier(&package) {
        return Err(MigrationError::InvalidPackage { package });
    }
    Ok(package)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    name != "_" && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

/// Render the Rust source embedding `migrations` in module `package`.
pub fn render(migrations: &[Migration], package: &str) -> MigrationResult<String> {
    let mut out = String::new();
    out.push_str("// Code generated by tideway. DO NOT EDIT.\n\n");
    out.push_str("#[allow(dead_code)]\n");
    out.push_str(&format!("pub mod {} {{\n", package));
    out.push_str("    /// Serialized migration descriptors in revision order\n");
    out.push_str("    pub static DESCRIPTORS: &[&[u8]] = &[\n");

    for migration in migrations {
        let blob = migration.descriptor().encode()?;
        out.push_str(&format!("        // {}\n", migration.descriptor().source()));
        out.push_str("        &[\n");
        for chunk in blob.as_bytes().chunks(BYTES_PER_LINE) {
            let line: Vec<String> = chunk.iter().map(|b| format!("0x{:02x}", b)).collect();
            out.push_str(&format!("            {},\n", line.join(", ")));
        }
        out.push_str("        ],\n");
    }

    out.push_str(REGISTER_FN);
    Ok(out)
}

/// Where to write generated code.
///
/// A path ending in `.rs` is used as is. A directory named `migrations` puts
/// the file beside it, any other directory gets the file inside it. Without
/// an explicit output the file goes next to the migrations directory.
pub fn output_path(migrations_dir: &Path, out: Option<&Path>) -> PathBuf {
    let out = match out {
        Some(out) => out.to_path_buf(),
        None => migrations_dir.to_path_buf(),
    };

    if out.extension().is_some_and(|ext| ext == "rs") {
        return out;
    }

    let is_migrations_dir = out
        .file_name()
        .and_then(|f| f.to_str())
        .is_some_and(|f| f.eq_ignore_ascii_case("migrations"));

    if is_migrations_dir {
        out.parent()
            .unwrap_or_else(|| Path::new(""))
            .join(GENERATED_FILE)
    } else {
        out.join(GENERATED_FILE)
    }
}

/// Load the migrations in `dir`, render them and write the generated file.
/// Returns the path written.
pub fn generate(dir: &Path, out: Option<&Path>, override_package: Option<&str>) -> MigrationResult<PathBuf> {
    let migrations = load_dir(dir)?;
    let package = determine_package(&migrations, override_package)?;
    let source = render(&migrations, &package)?;

    let path = output_path(dir, out);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| MigrationError::io(parent, e))?;
    }
    fs::write(&path, source).map_err(|e| MigrationError::io(&path, e))?;

    info!(
        "Generated {} migration(s) in package {} at {}",
        migrations.len(),
        package,
        path.display()
    );
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::SerializedDescriptor;
    use crate::registry::Registry;
    use tempfile::TempDir;

    fn migration(identifier: &str, package: &str) -> Migration {
        let text = format!("-- package: {}\n-- migrate: up\nSELECT 1;\n-- migrate: down\nSELECT 2;\n", package);
        Migration::from_source(identifier, &text).unwrap()
    }

    #[test]
    fn test_determine_package() {
        let agreeing = vec![migration("0001_a.sql", "foo"), migration("0002_b.sql", "foo")];
        assert_eq!(determine_package(&agreeing, None).unwrap(), "foo");
        assert_eq!(determine_package(&agreeing, Some("")).unwrap(), "foo");
        assert_eq!(determine_package(&agreeing, Some("bar")).unwrap(), "bar");

        let partial = vec![migration("0001_a.sql", ""), migration("0002_b.sql", "foo")];
        assert_eq!(determine_package(&partial, None).unwrap(), "foo");

        let none = vec![migration("0001_a.sql", "")];
        assert_eq!(determine_package(&none, None).unwrap(), DEFAULT_PACKAGE);
        assert_eq!(determine_package(&[], None).unwrap(), DEFAULT_PACKAGE);
    }

    #[test]
    fn test_determine_package_conflict() {
        let conflicting = vec![migration("0001_a.sql", "foo"), migration("0002_b.sql", "bar")];
        match determine_package(&conflicting, None) {
            Err(MigrationError::PackageConflict { first, second }) => {
                assert_eq!(first, "foo");
                assert_eq!(second, "bar");
            }
            other => panic!("expected package conflict, got {:?}", other),
        }
        assert_eq!(determine_package(&conflicting, Some("both")).unwrap(), "both");
    }

    #[test]
    fn test_determine_package_invalid() {
        for bad in ["my-package", "1st", "_", "with space"] {
            assert!(matches!(
                determine_package(&[], Some(bad)),
                Err(MigrationError::InvalidPackage { .. })
            ));
        }
    }

    #[test]
    fn test_render() {
        let migrations = vec![migration("0001_a.sql", "foo"), migration("0002_b.sql", "foo")];
        let source = render(&migrations, "foo").unwrap();

        assert!(source.starts_with("// Code generated by tideway. DO NOT EDIT."));
        assert!(source.contains("pub mod foo {"));
        assert!(source.contains("pub static DESCRIPTORS: &[&[u8]] = &["));
        assert!(source.contains("// 0001_a.sql"));
        assert!(source.contains("// 0002_b.sql"));
        assert_eq!(source.matches("        &[\n").count(), 2);
        assert!(source.contains("registry.register_descriptor(data)?;"));
    }

    /// Collect the byte arrays of the `DESCRIPTORS` table in generated source.
    fn embedded_descriptors(source: &str) -> Vec<SerializedDescriptor> {
        let mut blobs = Vec::new();
        let mut current: Option<Vec<u8>> = None;

        for line in source.lines().map(str::trim) {
            match line {
                "&[" => current = Some(Vec::new()),
                "]," => blobs.extend(current.take().map(SerializedDescriptor::from_bytes)),
                _ => {
                    if let Some(bytes) = current.as_mut() {
                        for byte in line.split(',').map(str::trim).filter(|b| !b.is_empty()) {
                            let hex = byte.strip_prefix("0x").unwrap();
                            bytes.push(u8::from_str_radix(hex, 16).unwrap());
                        }
                    }
                }
            }
        }
        blobs
    }

    #[test]
    fn test_rendered_descriptors_register() {
        let long_body: String = (0..40)
            .map(|i| format!("INSERT INTO settings (key, value) VALUES ('key_{}', 'value_{}');\n", i, i))
            .collect();
        let migrations = vec![
            Migration::from_source(
                "0001_users.sql",
                "-- package: foo\n-- migrate: up\nCREATE TABLE users (id SERIAL PRIMARY KEY);\n-- migrate: down\nDROP TABLE users;\n",
            )
            .unwrap(),
            Migration::from_source("0002_settings.sql", &format!("-- migrate: up\n{}", long_body)).unwrap(),
        ];

        let source = render(&migrations, "foo").unwrap();
        let blobs = embedded_descriptors(&source);
        assert_eq!(blobs.len(), migrations.len());

        let mut registry = Registry::new();
        for (blob, migration) in blobs.iter().zip(&migrations) {
            assert_eq!(blob, &migration.descriptor().encode().unwrap());
            assert_eq!(
                blob.info().unwrap(),
                (migration.descriptor().source().to_string(), migration.revision())
            );
            registry.register_descriptor(blob).unwrap();
        }

        assert_eq!(registry.len(), 2);
        for migration in &migrations {
            let embedded = registry.get(migration.revision()).unwrap();
            assert_eq!(embedded.name(), migration.name());
            assert_eq!(embedded.package(), migration.package());
            assert_eq!(embedded.up_sql().unwrap(), migration.up_sql().unwrap());
            assert_eq!(
                embedded.down_sql().map_err(|e| e.to_string()),
                migration.down_sql().map_err(|e| e.to_string())
            );
            assert_eq!(embedded.descriptor().info().unwrap(), migration.descriptor().info().unwrap());
        }
        assert!(registry.get(2).unwrap().up_sql().unwrap().contains("'key_39'"));
    }

    #[test]
    fn test_output_path() {
        let dir = Path::new("db/migrations");
        assert_eq!(output_path(dir, None), PathBuf::from("db/migrations.rs"));
        assert_eq!(output_path(dir, Some(Path::new("src/schema.rs"))), PathBuf::from("src/schema.rs"));
        assert_eq!(output_path(dir, Some(Path::new("src"))), PathBuf::from("src/migrations.rs"));
        assert_eq!(output_path(Path::new("sql"), None), PathBuf::from("sql/migrations.rs"));
        assert_eq!(output_path(Path::new("migrations"), None), PathBuf::from("migrations.rs"));
    }

    #[test]
    fn test_generate() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("migrations");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("0001_users.sql"), "-- package: accounts\n-- migrate: up\nSELECT 1;\n").unwrap();
        fs::write(dir.join("0002_groups.sql"), "-- migrate: up\nSELECT 2;\n").unwrap();

        let path = generate(&dir, None, None).unwrap();
        assert_eq!(path, temp_dir.path().join("migrations.rs"));

        let source = fs::read_to_string(&path).unwrap();
        assert!(source.contains("pub mod accounts {"));
        assert!(source.contains("// 0001_users.sql"));
        assert!(source.contains("// 0002_groups.sql"));
    }
}
