use std::path::Path;

use strata_core::config::{PackageConfig, WorkspaceFile};
use strata_core::Error;

fn parse(toml: &str) -> strata_core::Result<PackageConfig> {
    PackageConfig::parse(toml, Path::new("pkg/strata.toml"))
}

#[test]
fn test_parse_config() {
    let toml = r#"
name = "core-utils"
layer = "core"
version = "1.4.0"

[deps]
internal = ["core-types", "core-io"]
external = ["left-pad"]

[tasks]
build = "make build"
test = { command = "make test", depends_on = ["build"], inputs = ["src/**"], outputs = ["out/test.log"] }
"#;

    let config = parse(toml).unwrap();
    assert_eq!(config.name, "core-utils");
    assert_eq!(config.layer, "core");
    assert_eq!(config.version.as_deref(), Some("1.4.0"));
    assert_eq!(config.deps.internal.len(), 2);
    assert_eq!(config.deps.external, vec!["left-pad".to_string()]);

    let tasks = config.to_tasks(Path::new("pkg/strata.toml")).unwrap();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].name, "build");
    assert_eq!(tasks[0].command, "make build");
    assert_eq!(tasks[0].runner, "shell");
    assert!(tasks[0].propagate);
    assert_eq!(tasks[1].depends_on, vec!["build".to_string()]);
    assert_eq!(tasks[1].inputs, vec!["src/**".to_string()]);
    assert_eq!(tasks[1].outputs, vec!["out/test.log".to_string()]);
}

#[test]
fn test_parse_config_defaults() {
    let config = parse("name = \"a\"\nlayer = \"core\"\n").unwrap();
    assert!(config.version.is_none());
    assert!(config.deps.internal.is_empty());
    assert!(config.tasks.is_empty());
}

#[test]
fn test_tasks_keep_declaration_order() {
    let toml = r#"
name = "a"
layer = "core"

[tasks]
zeta = "echo z"
alpha = "echo a"
mid = "echo m"
"#;
    let config = parse(toml).unwrap();
    let names: Vec<String> = config
        .to_tasks(Path::new("a/strata.toml"))
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(names, vec!["zeta", "alpha", "mid"]);
}

#[test]
fn test_dotted_depends_on_overrides_table() {
    let toml = r#"
name = "a"
layer = "core"

[tasks]
build = "echo build"
lint = { command = "echo lint", depends_on = [] }
"lint.depends_on" = ["build"]
"#;
    let config = parse(toml).unwrap();
    let tasks = config.to_tasks(Path::new("a/strata.toml")).unwrap();
    assert_eq!(tasks.len(), 2);
    let lint = tasks.iter().find(|t| t.name == "lint").unwrap();
    assert_eq!(lint.depends_on, vec!["build".to_string()]);
}

#[test]
fn test_dotted_depends_on_unknown_task() {
    let toml = r#"
name = "a"
layer = "core"

[tasks]
"ghost.depends_on" = ["build"]
"#;
    let config = parse(toml).unwrap();
    let err = config.to_tasks(Path::new("a/strata.toml")).unwrap_err();
    assert!(matches!(err, Error::Config { .. }));
}

#[test]
fn test_missing_layer_is_rejected() {
    let err = parse("name = \"a\"\n").unwrap_err();
    match err {
        Error::Config { path, message } => {
            assert_eq!(path, Path::new("pkg/strata.toml"));
            assert!(message.contains("layer"), "{}", message);
        }
        other => panic!("expected config error, got {:?}", other),
    }
}

#[test]
fn test_unknown_task_field_is_rejected() {
    let toml = r#"
name = "a"
layer = "core"

[tasks]
build = { command = "make", cache = true }
"#;
    let err = parse(toml)
        .unwrap()
        .to_tasks(Path::new("a/strata.toml"))
        .unwrap_err();
    assert!(err.to_string().contains("cache"));
}

#[test]
fn test_task_without_command_needs_other_runner() {
    let toml = r#"
name = "a"
layer = "core"

[tasks]
all = { runner = "noop", depends_on = ["build"] }
build = "make"
broken = { depends_on = ["build"] }
"#;
    let err = parse(toml)
        .unwrap()
        .to_tasks(Path::new("a/strata.toml"))
        .unwrap_err();
    assert!(err.to_string().contains("broken"));
}

#[test]
fn test_invalid_values_are_rejected() {
    assert!(parse("name = \"has space\"\nlayer = \"core\"\n").is_err());
    assert!(parse("name = \"a#b\"\nlayer = \"core\"\n").is_err());
    assert!(parse("name = \"a\"\nlayer = \"\"\n").is_err());
    assert!(parse("name = \"a\"\nlayer = \"core\"\nversion = \"one\"\n").is_err());
    assert!(parse("name = \"a\"\nlayer = \"core\"\n[deps]\ninternal = [\"a\"]\n").is_err());
    assert!(parse("name = \"a\"\nlayer = \"core\"\ncolour = \"blue\"\n").is_err());
}

#[test]
fn test_workspace_file() {
    let toml = r#"
[workspace]
packages = ["packages", "tools"]
default_parallel = 3
stop_on_failure = true

[workspace.tasks]
lint = "echo lint"

[layers]
core = []
tools = ["core"]

[release]
check_tasks = ["build", "test"]
"#;
    let path = Path::new("strata.toml");
    let file = WorkspaceFile::parse(toml, path).unwrap();
    assert_eq!(file.workspace.packages, vec!["packages", "tools"]);
    assert_eq!(file.workspace.default_parallel, Some(3));
    assert!(file.workspace.stop_on_failure);
    assert!(!file.workspace.strict_commands);
    assert_eq!(file.layers["tools"], vec!["core".to_string()]);
    assert!(file.layers["core"].is_empty());
    assert_eq!(file.release.check_tasks, vec!["build", "test"]);
    assert_eq!(file.release.tag_prefix, "v");

    let tasks = file.workspace_tasks(path).unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].name, "lint");
}

#[test]
fn test_patterns_outside_package_are_rejected() {
    for field in ["inputs", "outputs"] {
        let toml = format!(
            "name = \"a\"\nlayer = \"core\"\n\n[tasks]\nbuild = {{ command = \"make\", {} = [\"src/**\", \"../shared.json\"] }}\n",
            field
        );
        let err = parse(&toml)
            .unwrap()
            .to_tasks(Path::new("a/strata.toml"))
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }), "{}", err);
        assert!(err.to_string().contains("../shared.json"));
    }

    let absolute =
        "name = \"a\"\nlayer = \"core\"\n\n[tasks]\nbuild = { command = \"make\", inputs = [\"/etc/shared.json\"] }\n";
    assert!(parse(absolute)
        .unwrap()
        .to_tasks(Path::new("a/strata.toml"))
        .is_err());
}
