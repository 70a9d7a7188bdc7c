use std::fs;
use std::path::Path;

use tempfile::TempDir;

use strata_core::package::Task;
use strata_core::scanner::Scanner;
use strata_core::Error;

fn create_test_package(dir: &Path, name: &str, layer: &str, deps: &[&str]) {
    let pkg_dir = dir.join(name);
    fs::create_dir_all(&pkg_dir).unwrap();

    let deps_str = deps
        .iter()
        .map(|d| format!("\"{}\"", d))
        .collect::<Vec<_>>()
        .join(", ");

    let config = format!(
        r#"
name = "{}"
layer = "{}"

[deps]
internal = [{}]

[tasks]
build = "echo build"
test = "echo test"
"#,
        name, layer, deps_str
    );

    fs::write(pkg_dir.join("strata.toml"), config).unwrap();
}

#[test]
fn test_scan_packages() {
    let temp_dir = TempDir::new().unwrap();
    let packages_dir = temp_dir.path().join("packages");
    fs::create_dir_all(&packages_dir).unwrap();

    create_test_package(&packages_dir, "pkg-b", "tools", &["pkg-a"]);
    create_test_package(&packages_dir, "pkg-a", "core", &[]);

    let packages = Scanner::new([&packages_dir]).scan().unwrap();

    assert_eq!(packages.len(), 2);
    assert_eq!(packages[0].name, "pkg-a");
    assert_eq!(packages[1].name, "pkg-b");
    assert_eq!(packages[1].deps.len(), 1);
    assert_eq!(packages[1].layer, "tools");
    assert_eq!(packages[0].path, packages_dir.join("pkg-a"));
    assert_eq!(packages[0].descriptor, packages_dir.join("pkg-a/strata.toml"));
}

#[test]
fn test_scan_multiple_roots_and_nested_dirs() {
    let temp_dir = TempDir::new().unwrap();
    let libs = temp_dir.path().join("libs");
    let apps = temp_dir.path().join("apps");
    create_test_package(&libs.join("group"), "nested", "core", &[]);
    create_test_package(&apps, "app", "apps", &["nested"]);

    let packages = Scanner::new([&libs, &apps]).scan().unwrap();
    let names: Vec<&str> = packages.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["app", "nested"]);
}

#[test]
fn test_scan_skips_hidden_and_build_dirs() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    create_test_package(root, "real", "core", &[]);
    create_test_package(&root.join("node_modules"), "vendored", "core", &[]);
    create_test_package(&root.join(".cache"), "hidden", "core", &[]);
    create_test_package(&root.join("target"), "built", "core", &[]);

    let packages = Scanner::new([root]).scan().unwrap();
    assert_eq!(packages.len(), 1);
    assert_eq!(packages[0].name, "real");
}

#[test]
fn test_scan_skips_workspace_file() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    fs::write(
        root.join("strata.toml"),
        "[workspace]\npackages = [\".\"]\n\n[layers]\ncore = []\n",
    )
    .unwrap();
    create_test_package(root, "pkg-a", "core", &[]);

    let packages = Scanner::new([root]).scan().unwrap();
    assert_eq!(packages.len(), 1);
    assert_eq!(packages[0].name, "pkg-a");
}

#[test]
fn test_scan_merges_workspace_tasks() {
    let temp_dir = TempDir::new().unwrap();
    create_test_package(temp_dir.path(), "pkg-a", "core", &[]);

    let packages = Scanner::new([temp_dir.path()])
        .with_workspace_tasks(vec![
            Task::new("lint", "echo lint"),
            Task::new("build", "echo shadowed"),
        ])
        .scan()
        .unwrap();

    let package = &packages[0];
    assert_eq!(package.tasks.len(), 3);
    assert_eq!(package.get_task("build").unwrap().command, "echo build");
    assert_eq!(package.get_task("lint").unwrap().command, "echo lint");
}

#[test]
fn test_malformed_descriptor_names_its_path() {
    let temp_dir = TempDir::new().unwrap();
    let pkg_dir = temp_dir.path().join("broken");
    fs::create_dir_all(&pkg_dir).unwrap();
    fs::write(pkg_dir.join("strata.toml"), "name = \"broken\"\nlayer = [1, 2]\n").unwrap();

    let err = Scanner::new([temp_dir.path()]).scan().unwrap_err();
    match err {
        Error::Config { path, .. } => assert_eq!(path, pkg_dir.join("strata.toml")),
        other => panic!("expected config error, got {:?}", other),
    }
}

#[test]
fn test_missing_root_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let err = Scanner::new([temp_dir.path().join("nope")]).scan().unwrap_err();
    assert!(err.is_fatal());
}
