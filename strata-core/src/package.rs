//! Package and task data models.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Runner used when a task does not name one.
pub const DEFAULT_RUNNER: &str = "shell";

/// Identity of one unit of work: a task inside a package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId {
    pub package: String,
    pub task: String,
}

impl TaskId {
    pub fn new(package: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            task: task.into(),
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.package, self.task)
    }
}

/// A task declared by a package descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    pub name: String,
    pub command: String,
    pub runner: String,
    /// Tasks of the same package that must finish first.
    pub depends_on: Vec<String>,
    /// Input path patterns, relative to the package directory.
    pub inputs: Vec<String>,
    /// Output path patterns, relative to the package directory.
    pub outputs: Vec<String>,
    /// Whether the task waits on the same task in dependency packages.
    pub propagate: bool,
}

impl Task {
    /// Creates a shell task with no inputs, outputs or intra-package ordering.
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            runner: DEFAULT_RUNNER.to_string(),
            depends_on: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            propagate: true,
        }
    }

    pub fn with_depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_outputs<I, S>(mut self, outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outputs = outputs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_runner(mut self, runner: impl Into<String>) -> Self {
        self.runner = runner.into();
        self
    }

    pub fn without_propagation(mut self) -> Self {
        self.propagate = false;
        self
    }
}

/// Represents a package in the monorepo.
#[derive(Debug, Clone, Serialize)]
pub struct Package {
    pub name: String,
    /// Architectural layer the package belongs to.
    pub layer: String,
    /// Package directory.
    pub path: PathBuf,
    /// Descriptor file the package was loaded from.
    pub descriptor: PathBuf,
    #[serde(serialize_with = "serialize_deps")]
    pub deps: SmallVec<[String; 4]>,
    /// Dependencies explicitly marked as living outside the workspace.
    pub external: Vec<String>,
    pub tasks: Vec<Task>,
    pub version: Option<String>,
}

fn serialize_deps<S>(deps: &SmallVec<[String; 4]>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    let vec: Vec<&String> = deps.iter().collect();
    vec.serialize(serializer)
}

impl Package {
    pub fn new(
        name: impl Into<String>,
        layer: impl Into<String>,
        path: impl Into<PathBuf>,
        deps: Vec<String>,
        tasks: Vec<Task>,
    ) -> Self {
        let path = path.into();
        Self {
            name: name.into(),
            layer: layer.into(),
            descriptor: path.join(crate::config::DESCRIPTOR_FILE),
            path,
            deps: SmallVec::from_vec(deps),
            external: Vec::new(),
            tasks,
            version: None,
        }
    }

    pub fn with_external(mut self, external: Vec<String>) -> Self {
        self.external = external;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    #[inline]
    pub fn get_task(&self, name: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.name == name)
    }

    #[inline]
    pub fn is_external(&self, dep: &str) -> bool {
        self.external.iter().any(|e| e == dep)
    }
}
