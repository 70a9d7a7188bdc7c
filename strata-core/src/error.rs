//! Error types and result aliases.

use std::path::PathBuf;

use thiserror::Error;

use crate::package::TaskId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed, ambiguous or unresolvable package, task or rule definitions.
    #[error("Configuration error in {}: {message}", path.display())]
    Config { path: PathBuf, message: String },

    /// A structural cycle among tasks, packages or release states.
    #[error("Circular dependency detected: {}", format_cycle(members))]
    Cycle { members: Vec<String> },

    /// An input file of a task could not be read while fingerprinting.
    #[error("Failed to read input {} of {task}: {source}", path.display())]
    InputIo {
        task: TaskId,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The fingerprint store could not be read or written.
    #[error("Fingerprint cache error: {message}")]
    Cache { message: String },

    #[error("Package not found: {name}. Available packages: {available}")]
    PackageNotFound { name: String, available: String },

    #[error("No selected package declares task '{name}'")]
    TaskNotFound { name: String },

    #[error("Task execution failed for {package}#{task}: {message}")]
    TaskExecution {
        package: String,
        task: String,
        message: String,
    },

    #[error("Release error: {0}")]
    Release(String),

    #[error("Mutex lock error: {0}")]
    MutexLock(String),
}

impl Error {
    pub(crate) fn config(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::Config {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns true for errors that must abort a run before anything executes.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config { .. } | Error::Cycle { .. })
    }
}

fn format_cycle(members: &[String]) -> String {
    match members.first() {
        Some(first) => format!("{} -> {}", members.join(" -> "), first),
        None => "(empty cycle)".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, Error>;
