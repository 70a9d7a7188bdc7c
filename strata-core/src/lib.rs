//! Core library for monorepo orchestration: package discovery, incremental
//! task scheduling, architectural layer checks and the release flow.

pub mod config;
pub mod context;
mod cycles;
pub mod error;
pub mod executor;
pub mod fingerprint;
pub mod fs_util;
pub mod graph;
pub mod layers;
pub mod package;
pub mod patterns;
pub mod release;
pub mod scanner;
pub mod scheduler;
pub mod task_graph;

pub use config::{PackageConfig, ReleaseConfig, WorkspaceConfig, WorkspaceFile, DESCRIPTOR_FILE};
pub use context::Context;
pub use error::{Error, Result};
pub use executor::{ExecutorRegistry, NoopExecutor, ShellExecutor, TaskExecutor, TaskOutput};
pub use fingerprint::{Fingerprint, FingerprintRecord, FingerprintStore};
pub use graph::PackageGraph;
pub use layers::{LayerChecker, LayerRules, Violation};
pub use package::{Package, Task, TaskId};
pub use release::{
    BumpType, ReleaseDriver, ReleaseEvent, ReleaseMachine, ReleasePlan, ReleaseRun, ReleaseState,
    WorkspaceReleaseActions,
};
pub use scanner::Scanner;
pub use scheduler::{RunResult, RunSummary, Scheduler, TaskEvent, TaskReport, TaskStatus};
pub use task_graph::{EdgeKind, TaskGraph, TaskNode};
