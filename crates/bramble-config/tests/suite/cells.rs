use std::path::Path;

use bramble_config::{BrambleConfig, ConfigError};
use bramble_core::CellName;
use tempfile::tempdir;

#[test]
fn repositories_become_cells() {
    let dir = tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("xplat")).unwrap();

    let config = BrambleConfig::load_from_str(
        r#"
[project]
ignore = ["third_party/huge"]

[repositories]
xplat = "xplat"
"#,
    )
    .unwrap();
    let cells = config.cell_registry(dir.path()).unwrap();

    let root = cells.root_cell();
    assert!(root.name().is_root());
    assert_eq!(root.build_file_name(), "BUCK");
    assert!(root.is_ignored(Path::new("third_party/huge/lib")));
    assert!(root.is_ignored(Path::new(".git")));
    assert!(root.is_ignored(Path::new("xplat/lib")));

    let xplat = cells.get(&CellName::new("xplat")).unwrap();
    assert_eq!(xplat.root(), dir.path().join("xplat"));
    assert_eq!(xplat.build_file_name(), "BUCK");
    assert!(xplat.is_ignored(Path::new("third_party/huge")));
}

#[test]
fn child_cells_read_their_own_config() {
    let dir = tempdir().unwrap();
    let child = dir.path().join("libs");
    std::fs::create_dir_all(&child).unwrap();
    std::fs::write(
        child.join("bramble.toml"),
        "[parser]\nbuild_file_name = \"TARGETS\"\n[project]\nignore = [\"gen\"]\n",
    )
    .unwrap();

    let config = BrambleConfig::load_from_str("[repositories]\nlibs = \"libs\"\n").unwrap();
    let cells = config.cell_registry(dir.path()).unwrap();
    let libs = cells.get(&CellName::new("libs")).unwrap();
    assert_eq!(libs.build_file_name(), "TARGETS");
    assert!(libs.is_ignored(Path::new("gen/x")));
    assert!(!cells.root_cell().is_ignored(Path::new("gen/x")));
}

#[test]
fn invalid_repository_entries_are_rejected() {
    let err = BrambleConfig::load_from_str("[repositories]\n\"a/b\" = \"x\"\n").unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { key: "repositories", .. }));

    let err = BrambleConfig::load_from_str("[project]\nignore = [\"a/[b\"]\n")
        .unwrap()
        .cell_registry(Path::new("/tmp"))
        .unwrap_err();
    assert!(matches!(err, ConfigError::Ignore { .. }));
}
