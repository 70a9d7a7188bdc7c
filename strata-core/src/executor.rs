//! Task executors and the registry that maps runner names to them.

use std::collections::HashMap;
use std::process::{Command, Stdio};
use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::package::DEFAULT_RUNNER;
use crate::task_graph::TaskNode;

/// Runner name of [`NoopExecutor`].
pub const NOOP_RUNNER: &str = "noop";

const SHELL_METACHARACTERS: &[&str] = &[";", "&&", "||", "|", "`", "$"];

/// Result of running one task body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl TaskOutput {
    pub fn success() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }
}

/// Shared invocation contract of every kind of task.
///
/// `Err` means the task could not be started at all; a task that ran and
/// reported failure returns `Ok` with `success == false`.
pub trait TaskExecutor: Send + Sync {
    fn execute(&self, node: &TaskNode) -> Result<TaskOutput>;
}

/// Runs the task command through `sh -c` inside the package directory.
#[derive(Debug, Clone, Default)]
pub struct ShellExecutor {
    strict: bool,
}

impl ShellExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an executor that rejects commands using shell features.
    pub fn strict() -> Self {
        Self { strict: true }
    }

    fn validate(&self, node: &TaskNode) -> Result<()> {
        let failure = |message: String| Error::TaskExecution {
            package: node.id.package.clone(),
            task: node.id.task.clone(),
            message,
        };

        if node.command.trim().is_empty() {
            return Err(failure("Command cannot be empty".to_string()));
        }
        if self.strict {
            if let Some(found) = SHELL_METACHARACTERS
                .iter()
                .find(|m| node.command.contains(*m))
            {
                return Err(failure(format!(
                    "Command uses shell feature '{}', which strict mode rejects: {}",
                    found, node.command
                )));
            }
        }
        Ok(())
    }
}

impl TaskExecutor for ShellExecutor {
    fn execute(&self, node: &TaskNode) -> Result<TaskOutput> {
        self.validate(node)?;
        debug!(task = %node.id, command = %node.command, "spawning shell");

        let output = Command::new("sh")
            .arg("-c")
            .arg(&node.command)
            .current_dir(&node.package_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| Error::TaskExecution {
                package: node.id.package.clone(),
                task: node.id.task.clone(),
                message: format!("Failed to execute task: {}", e),
            })?;

        Ok(TaskOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Always succeeds. Used for aggregate tasks that only order others.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopExecutor;

impl TaskExecutor for NoopExecutor {
    fn execute(&self, _node: &TaskNode) -> Result<TaskOutput> {
        Ok(TaskOutput::success())
    }
}

/// Explicit mapping from runner names to executors.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn TaskExecutor>>,
}

impl ExecutorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `shell` and `noop` runners.
    pub fn with_defaults(strict_commands: bool) -> Self {
        let shell = if strict_commands {
            ShellExecutor::strict()
        } else {
            ShellExecutor::new()
        };
        let mut registry = Self::new();
        registry.register(DEFAULT_RUNNER, shell);
        registry.register(NOOP_RUNNER, NoopExecutor);
        registry
    }

    /// Registers `executor` under `runner`, replacing any previous one.
    pub fn register<E>(&mut self, runner: &str, executor: E)
    where
        E: TaskExecutor + 'static,
    {
        self.executors.insert(runner.to_string(), Arc::new(executor));
    }

    pub fn register_arc(&mut self, runner: &str, executor: Arc<dyn TaskExecutor>) {
        self.executors.insert(runner.to_string(), executor);
    }

    pub fn get(&self, runner: &str) -> Option<Arc<dyn TaskExecutor>> {
        self.executors.get(runner).cloned()
    }

    /// Lists all registered runner names, sorted.
    pub fn registered_runners(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.executors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("runners", &self.registered_runners())
            .finish()
    }
}
