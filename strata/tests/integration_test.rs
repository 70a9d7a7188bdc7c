use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn create_test_package(root: &Path, name: &str, layer: &str, deps: &[&str]) {
    let pkg_dir = root.join("packages").join(name);
    fs::create_dir_all(pkg_dir.join("src")).unwrap();
    fs::write(pkg_dir.join("src/main.txt"), format!("source of {}", name)).unwrap();

    let deps = deps
        .iter()
        .map(|d| format!("\"{}\"", d))
        .collect::<Vec<_>>()
        .join(", ");
    let config = format!(
        r#"
name = "{name}"
layer = "{layer}"
version = "1.0.0"

[deps]
internal = [{deps}]

[tasks]
build = {{ command = "echo built {name}", inputs = ["src/**"] }}
test = {{ command = "echo tested {name}", inputs = ["src/**"] }}
"#
    );
    fs::write(pkg_dir.join("strata.toml"), config).unwrap();
}

fn create_workspace(layers: &str) -> TempDir {
    let workspace = TempDir::new().unwrap();
    fs::write(workspace.path().join("strata.toml"), layers).unwrap();
    workspace
}

fn strata(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_strata"))
        .arg("--root")
        .arg(root)
        .args(args)
        .output()
        .expect("Failed to execute strata")
}

fn json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout is not JSON")
}

const LAYERS: &str = "[layers]\ncore = []\ntools = [\"core\"]\n";

#[cfg(unix)]
#[test]
fn test_build_then_rebuild_is_all_skipped() {
    let workspace = create_workspace(LAYERS);
    create_test_package(workspace.path(), "base", "core", &[]);
    create_test_package(workspace.path(), "cli", "tools", &["base"]);

    let first = strata(workspace.path(), &["build", "--json"]);
    assert!(first.status.success());
    let first = json(&first);
    let statuses: Vec<&str> = first["tasks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["status"].as_str().unwrap())
        .collect();
    assert_eq!(statuses, vec!["succeeded", "succeeded"]);
    assert_eq!(first["tasks"][0]["id"]["package"], "base");

    let second = json(&strata(workspace.path(), &["build", "--json"]));
    assert!(second["tasks"]
        .as_array()
        .unwrap()
        .iter()
        .all(|t| t["status"] == "skipped"));
}

#[cfg(unix)]
#[test]
fn test_failing_task_exits_non_zero() {
    let workspace = create_workspace(LAYERS);
    create_test_package(workspace.path(), "base", "core", &[]);
    let descriptor = workspace.path().join("packages/base/strata.toml");
    let config = fs::read_to_string(&descriptor)
        .unwrap()
        .replace("echo tested base", "exit 3");
    fs::write(&descriptor, config).unwrap();

    let output = strata(workspace.path(), &["test", "--json"]);
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(json(&output)["tasks"][0]["status"], "failed");
}

#[test]
fn test_check_layers_reports_violation() {
    let workspace = create_workspace(LAYERS);
    create_test_package(workspace.path(), "base", "core", &["cli"]);
    create_test_package(workspace.path(), "cli", "tools", &[]);

    let output = strata(workspace.path(), &["check-layers", "--json"]);
    assert_eq!(output.status.code(), Some(1));
    let report = json(&output);
    assert_eq!(report["valid"], false);
    assert_eq!(report["violations"][0]["kind"], "layer");
    assert_eq!(report["violations"][0]["from"], "base");
}

#[test]
fn test_check_layers_passes_downward_edges() {
    let workspace = create_workspace(LAYERS);
    create_test_package(workspace.path(), "base", "core", &[]);
    create_test_package(workspace.path(), "cli", "tools", &["base"]);

    let output = strata(workspace.path(), &["check-layers"]);
    assert!(output.status.success());
}

#[test]
fn test_release_dry_run_reports_states() {
    let workspace = create_workspace(&format!(
        "{}\n[release]\ncheck_tasks = []\n",
        LAYERS
    ));
    create_test_package(workspace.path(), "base", "core", &[]);

    let output = strata(workspace.path(), &["release", "patch", "--dry-run", "--json"]);
    assert!(output.status.success());
    let report = json(&output);
    assert_eq!(report["final_state"], "ReleaseComplete");
    assert_eq!(report["visited"][1], "DoPatchRelease");
    assert_eq!(report["plan"]["packages"][0]["new_version"], "1.0.1");

    let descriptor =
        fs::read_to_string(workspace.path().join("packages/base/strata.toml")).unwrap();
    assert!(descriptor.contains("version = \"1.0.0\""));
}

#[test]
fn test_unknown_package_is_fatal() {
    let workspace = create_workspace(LAYERS);
    create_test_package(workspace.path(), "base", "core", &[]);

    let output = strata(workspace.path(), &["build", "-p", "nope"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("nope"));
}

#[test]
fn test_list_json() {
    let workspace = create_workspace(LAYERS);
    create_test_package(workspace.path(), "base", "core", &[]);
    create_test_package(workspace.path(), "cli", "tools", &["base"]);

    let output = strata(workspace.path(), &["list", "--json"]);
    assert!(output.status.success());
    let list = json(&output);
    assert_eq!(list["cli"]["layer"], "tools");
    assert_eq!(list["cli"]["dependencies"][0], "base");
    assert_eq!(list["base"]["tasks"][1], "test");
}

#[test]
fn test_release_help_explains_tagging() {
    let output = Command::new(env!("CARGO_BIN_EXE_strata"))
        .args(["release", "--help"])
        .output()
        .expect("Failed to execute strata");
    assert!(output.status.success());
    let help = String::from_utf8_lossy(&output.stdout);
    assert!(help.contains("uncommitted"));
    assert!(help.contains("--no-tag"));
}
