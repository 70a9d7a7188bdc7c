//! TOML configuration parsing for package descriptors and the workspace file.
//!
//! Descriptors are parsed eagerly into the typed [`Package`] and [`Task`]
//! structures; any malformed shape is rejected here as [`Error::Config`]
//! naming the offending file, so nothing loosely typed reaches the graph or
//! the scheduler.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::package::{Package, Task, DEFAULT_RUNNER};
use crate::patterns::leaves_base;

/// File name of package descriptors and of the workspace file.
pub const DESCRIPTOR_FILE: &str = "strata.toml";

const DEPENDS_ON_SUFFIX: &str = ".depends_on";
const TASK_FIELDS: &[&str] = &[
    "command",
    "runner",
    "depends_on",
    "inputs",
    "outputs",
    "propagate",
];

/// Package configuration as written in `strata.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageConfig {
    pub name: String,
    pub layer: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub deps: Deps,
    #[serde(default)]
    pub tasks: IndexMap<String, toml::Value>,
}

/// Package dependencies configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Deps {
    /// Packages of this workspace.
    #[serde(default)]
    pub internal: Vec<String>,
    /// Names that resolve outside the workspace and are ignored by the graph.
    #[serde(default)]
    pub external: Vec<String>,
}

impl PackageConfig {
    /// Parses a descriptor, attributing any error to `path`.
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let config: PackageConfig =
            toml::from_str(content).map_err(|e| Error::config(path, e.message().to_string()))?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        validate_name(&self.name).map_err(|message| Error::config(path, message))?;
        if self.layer.trim().is_empty() {
            return Err(Error::config(path, "Layer must not be empty"));
        }
        if let Some(version) = &self.version {
            semver::Version::parse(version).map_err(|e| {
                Error::config(path, format!("Invalid version '{}': {}", version, e))
            })?;
        }
        for dep in &self.deps.internal {
            if dep == &self.name {
                return Err(Error::config(
                    path,
                    format!("Package '{}' lists itself as a dependency", self.name),
                ));
            }
        }
        Ok(())
    }

    pub fn to_tasks(&self, path: &Path) -> Result<Vec<Task>> {
        parse_tasks(&self.tasks, path)
    }

    /// Builds the package, merging workspace default tasks it does not declare.
    pub fn into_package(
        self,
        package_dir: PathBuf,
        descriptor: PathBuf,
        workspace_tasks: &[Task],
    ) -> Result<Package> {
        let mut tasks = self.to_tasks(&descriptor)?;
        for workspace_task in workspace_tasks {
            if !tasks.iter().any(|t| t.name == workspace_task.name) {
                tasks.push(workspace_task.clone());
            }
        }

        Ok(Package {
            name: self.name,
            layer: self.layer,
            path: package_dir,
            descriptor,
            deps: self.deps.internal.into_iter().collect(),
            external: self.deps.external,
            tasks,
            version: self.version,
        })
    }
}

fn validate_name(name: &str) -> std::result::Result<(), String> {
    if name.trim().is_empty() {
        return Err("Package name must not be empty".to_string());
    }
    if name.chars().any(|c| c.is_whitespace() || c == '#') {
        return Err(format!(
            "Invalid package name '{}': whitespace and '#' are not allowed",
            name
        ));
    }
    Ok(())
}

fn string_list(
    value: &toml::Value,
    field: &str,
    task: &str,
) -> std::result::Result<Vec<String>, String> {
    let array = value
        .as_array()
        .ok_or_else(|| format!("Field '{}' of task '{}' must be an array", field, task))?;
    array
        .iter()
        .map(|v| {
            v.as_str().map(str::to_string).ok_or_else(|| {
                format!(
                    "Field '{}' of task '{}' must only contain strings",
                    field, task
                )
            })
        })
        .collect()
}

/// A string list of patterns that must stay inside the package directory.
fn path_patterns(
    value: &toml::Value,
    field: &str,
    task: &str,
) -> std::result::Result<Vec<String>, String> {
    let patterns = string_list(value, field, task)?;
    if let Some(outside) = patterns.iter().find(|p| leaves_base(p)) {
        return Err(format!(
            "Pattern '{}' in field '{}' of task '{}' points outside the package directory",
            outside, field, task
        ));
    }
    Ok(patterns)
}

fn parse_task(name: &str, value: &toml::Value) -> std::result::Result<Task, String> {
    match value {
        toml::Value::String(command) => Ok(Task::new(name, command.clone())),
        toml::Value::Table(table) => {
            if let Some(unknown) = table.keys().find(|k| !TASK_FIELDS.contains(&k.as_str())) {
                return Err(format!("Unknown field '{}' in task '{}'", unknown, name));
            }

            let runner = match table.get("runner") {
                Some(v) => v
                    .as_str()
                    .ok_or_else(|| format!("Field 'runner' of task '{}' must be a string", name))?
                    .to_string(),
                None => DEFAULT_RUNNER.to_string(),
            };
            let command = match table.get("command") {
                Some(v) => v
                    .as_str()
                    .ok_or_else(|| format!("Field 'command' of task '{}' must be a string", name))?
                    .to_string(),
                None if runner != DEFAULT_RUNNER => String::new(),
                None => return Err(format!("Task '{}' must have a 'command' field", name)),
            };

            let mut task = Task::new(name, command).with_runner(runner);
            if let Some(v) = table.get("depends_on") {
                task.depends_on = string_list(v, "depends_on", name)?;
            }
            if let Some(v) = table.get("inputs") {
                task.inputs = path_patterns(v, "inputs", name)?;
            }
            if let Some(v) = table.get("outputs") {
                task.outputs = path_patterns(v, "outputs", name)?;
            }
            if let Some(v) = table.get("propagate") {
                task.propagate = v
                    .as_bool()
                    .ok_or_else(|| {
                        format!("Field 'propagate' of task '{}' must be a boolean", name)
                    })?;
            }
            Ok(task)
        }
        _ => Err(format!("Task '{}' must be a string or a table", name)),
    }
}

/// Converts a `[tasks]` table into typed tasks, keeping declaration order.
///
/// Besides string and table values, a quoted dotted key such as
/// `"test.depends_on" = ["build"]` sets the dependencies of an already
/// declared task and takes precedence over a `depends_on` inside its table.
pub(crate) fn parse_tasks(map: &IndexMap<String, toml::Value>, path: &Path) -> Result<Vec<Task>> {
    let mut tasks: IndexMap<String, Task> = IndexMap::new();
    let mut dotted_deps: Vec<(String, Vec<String>)> = Vec::new();

    for (key, value) in map {
        if let Some(task_name) = key.strip_suffix(DEPENDS_ON_SUFFIX) {
            let deps = string_list(value, "depends_on", task_name)
                .map_err(|message| Error::config(path, message))?;
            dotted_deps.push((task_name.to_string(), deps));
            continue;
        }

        let task = parse_task(key, value).map_err(|message| Error::config(path, message))?;
        tasks.insert(key.clone(), task);
    }

    for (task_name, deps) in dotted_deps {
        let task = tasks.get_mut(&task_name).ok_or_else(|| {
            Error::config(
                path,
                format!(
                    "Task '{}' referenced in dotted-key dependency does not exist",
                    task_name
                ),
            )
        })?;
        task.depends_on = deps;
    }

    Ok(tasks.into_values().collect())
}

/// The `[workspace]` table of the root `strata.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkspaceConfig {
    /// Directories scanned for package descriptors, relative to the root.
    #[serde(default)]
    pub packages: Vec<String>,
    /// Fingerprint store location, relative to the root unless absolute.
    pub cache_dir: Option<String>,
    /// Default number of parallel workers.
    pub default_parallel: Option<usize>,
    #[serde(default)]
    pub stop_on_failure: bool,
    /// Reject shell metacharacters in task commands.
    #[serde(default)]
    pub strict_commands: bool,
    /// Tasks applied to every package that does not declare them.
    #[serde(default)]
    pub tasks: IndexMap<String, toml::Value>,
}

/// The `[release]` table of the root `strata.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReleaseConfig {
    /// Tasks that must pass before versions are bumped.
    #[serde(default = "default_check_tasks")]
    pub check_tasks: Vec<String>,
    #[serde(default = "default_tag_prefix")]
    pub tag_prefix: String,
}

fn default_check_tasks() -> Vec<String> {
    vec!["build".to_string()]
}

fn default_tag_prefix() -> String {
    "v".to_string()
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            check_tasks: default_check_tasks(),
            tag_prefix: default_tag_prefix(),
        }
    }
}

/// Complete contents of the workspace-level `strata.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkspaceFile {
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    /// Layer name to the layers it may depend on.
    #[serde(default)]
    pub layers: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub release: ReleaseConfig,
}

impl WorkspaceFile {
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::config(path, e.message().to_string()))
    }

    /// Loads `<root>/strata.toml`, returning `None` when there is none.
    pub fn load(root: &Path) -> Result<Option<Self>> {
        let path = root.join(DESCRIPTOR_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        Self::parse(&content, &path).map(Some)
    }

    pub fn workspace_tasks(&self, path: &Path) -> Result<Vec<Task>> {
        parse_tasks(&self.workspace.tasks, path)
    }
}

/// Returns true when a parsed `strata.toml` is a workspace file rather than a
/// package descriptor.
pub(crate) fn is_workspace_file(value: &toml::Value) -> bool {
    value.get("name").is_none()
        && ["workspace", "layers", "release"]
            .iter()
            .any(|key| value.get(key).is_some())
}
