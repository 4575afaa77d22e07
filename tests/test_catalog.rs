//! Integration tests for model discovery.
//!
//! Tests cover:
//! - Listing *.pb files sorted by name
//! - Ignoring other extensions and subdirectories
//! - Failing on missing directories and empty directories
//! - Rescanning picks up new files

mod common;

use common::*;

#[test]
fn test_scan_lists_models_sorted() -> anyhow::Result<()> {
    let dir = create_model_dir(&["zeta.pb", "alpha.pb", "he_heavy_augment.pb"]);
    let catalog = ModelCatalog::new(dir.path());

    let names: Vec<String> = catalog.scan()?.into_iter().map(|m| m.name).collect();
    assert_eq!(names, vec!["alpha.pb", "he_heavy_augment.pb", "zeta.pb"]);

    // Same order on every scan
    let again: Vec<String> = catalog.scan()?.into_iter().map(|m| m.name).collect();
    assert_eq!(names, again);

    Ok(())
}

#[test]
fn test_scan_excludes_other_files() -> anyhow::Result<()> {
    let dir = create_model_dir(&["model.pb", "notes.txt", "model.pb.bak", "model.onnx"]);
    std::fs::create_dir(dir.path().join("nested.pb"))?;
    let catalog = ModelCatalog::new(dir.path());

    let models = catalog.scan()?;
    assert_eq!(models.len(), 1);
    assert_eq!(models[0].name, "model.pb");
    assert_eq!(models[0].path, dir.path().join("model.pb"));

    Ok(())
}

#[test]
fn test_scan_missing_directory_fails() {
    let dir = tempfile::TempDir::new().expect("temp dir");
    let missing = dir.path().join("does-not-exist");
    let catalog = ModelCatalog::new(&missing);

    let result = catalog.scan();
    assert_eq!(result, Err(ConfigurationError::MissingDirectory(missing)));
}

#[test]
fn test_scan_file_instead_of_directory_fails() {
    let dir = create_model_dir(&["model.pb"]);
    let catalog = ModelCatalog::new(dir.path().join("model.pb"));

    assert!(matches!(
        catalog.scan(),
        Err(ConfigurationError::NotADirectory(_))
    ));
}

#[test]
fn test_scan_without_models_fails() {
    let dir = create_model_dir(&["readme.md"]);
    let catalog = ModelCatalog::new(dir.path());

    assert!(matches!(
        catalog.scan(),
        Err(ConfigurationError::NoModels { .. })
    ));
}

#[test]
fn test_rescan_sees_new_models() -> anyhow::Result<()> {
    let dir = create_model_dir(&["b.pb"]);
    let catalog = ModelCatalog::new(dir.path());
    assert_eq!(catalog.scan()?.len(), 1);

    std::fs::write(dir.path().join("a.pb"), b"weights")?;
    let models = catalog.scan()?;
    assert_eq!(models.len(), 2);
    assert_eq!(catalog.default_model()?.name, "a.pb");

    Ok(())
}

#[test]
fn test_resolve_unknown_model() {
    let (catalog, _dir) = create_test_catalog();

    assert_eq!(
        catalog.resolve("missing.pb"),
        Err(ConfigurationError::UnknownModel("missing.pb".to_string()))
    );
    assert!(catalog.resolve(TEST_MODEL).is_ok());
}

#[cfg(unix)]
#[test]
fn test_scan_unreadable_directory_fails() -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let dir = create_model_dir(&["model.pb"]);
    let locked = dir.path().join("locked");
    std::fs::create_dir(&locked)?;
    std::fs::write(locked.join("model.pb"), b"weights")?;
    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000))?;

    // Permission bits do not stop a privileged user
    let readable = std::fs::read_dir(&locked).is_ok();
    let result = ModelCatalog::new(&locked).scan();
    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755))?;

    if !readable {
        assert!(matches!(
            result,
            Err(ConfigurationError::UnreadableDirectory { ref path, .. }) if *path == locked
        ));
    }
    Ok(())
}
