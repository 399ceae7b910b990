//! Loading migration sources from disk and embedding them as descriptors

use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;
use tideway::{codegen, loader, Migration, MigrationError, Registry};

fn testdata(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/testdata").join(name)
}

#[test]
fn test_open_migration() {
    let m = Migration::open(testdata("0001_test_migration.sql")).unwrap();
    assert_eq!(m.revision(), 1);
    assert_eq!(m.name(), "test migration");
    assert!(!m.synchronized());
    assert_eq!(m.package(), "foo");

    let up = m.up_sql().unwrap();
    assert!(up.contains("CREATE TABLE IF NOT EXISTS groups"));
    assert!(up.contains("CREATE TABLE IF NOT EXISTS membership"));
    assert!(!up.contains("-- migrate: up"));

    let down = m.down_sql().unwrap();
    assert!(down.contains("DROP TABLE IF EXISTS users CASCADE;"));
    assert!(!down.contains("-- migrate: down"));
}

#[test]
fn test_open_non_migration() {
    let err = Migration::open(testdata("foo.txt")).unwrap_err();
    assert!(matches!(err, MigrationError::Format { ref identifier, .. } if identifier == "foo.txt"));
    assert_eq!(err.to_string(), r#"could not parse "foo.txt" as a migration filename"#);
}

#[test]
fn test_open_missing_file() {
    let err = Migration::open(testdata("0099_missing.sql")).unwrap_err();
    assert!(matches!(err, MigrationError::Io { .. }));
}

#[test]
fn test_load_testdata_skips_other_files() {
    let migrations = loader::load_dir(testdata("")).unwrap();
    assert_eq!(migrations.len(), 1);
    assert_eq!(migrations[0].revision(), 1);
}

#[test]
fn test_descriptor_round_trip_through_registry() {
    let original = Migration::open(testdata("0001_test_migration.sql")).unwrap();
    let blob = original.descriptor().encode().unwrap();

    let (source, revision) = blob.info().unwrap();
    assert_eq!(source, "0001_test_migration.sql");
    assert_eq!(revision, 1);

    let mut registry = Registry::with_bookkeeping();
    registry.register_descriptor(blob.as_bytes()).unwrap();

    let embedded = registry.get(1).unwrap();
    assert_eq!(embedded.name(), original.name());
    assert_eq!(embedded.package(), "foo");
    assert_eq!(embedded.up_sql().unwrap(), original.up_sql().unwrap());
    assert_eq!(embedded.down_sql().unwrap(), original.down_sql().unwrap());
    assert_eq!(registry.predecessors(embedded).unwrap(), 1);
    assert_eq!(registry.successors(embedded).unwrap(), 0);
}

#[test]
fn test_create_then_generate() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().join("migrations");

    let first = loader::create(&dir, Some("create users"), Some("accounts")).unwrap();
    let second = loader::create(&dir, Some("add index"), None).unwrap();
    assert_eq!(first.file_name().unwrap(), "0001_create_users.sql");
    assert_eq!(second.file_name().unwrap(), "0002_add_index.sql");

    let out = codegen::generate(&dir, None, None).unwrap();
    assert_eq!(out, temp_dir.path().join("migrations.rs"));

    let source = fs::read_to_string(out).unwrap();
    assert!(source.contains("pub mod accounts {"));
    assert!(source.contains("// 0001_create_users.sql"));
    assert!(source.contains("// 0002_add_index.sql"));
}

#[test]
fn test_generate_rejects_conflicting_packages() {
    let temp_dir = TempDir::new().unwrap();
    loader::create(temp_dir.path(), Some("one"), Some("first")).unwrap();
    loader::create(temp_dir.path(), Some("two"), Some("second")).unwrap();

    assert!(matches!(
        codegen::generate(temp_dir.path(), None, None),
        Err(MigrationError::PackageConflict { .. })
    ));

    let out = temp_dir.path().join("schema.rs");
    let written = codegen::generate(temp_dir.path(), Some(out.as_path()), Some("combined")).unwrap();
    assert_eq!(written, out);
    assert!(fs::read_to_string(out).unwrap().contains("pub mod combined {"));
}
