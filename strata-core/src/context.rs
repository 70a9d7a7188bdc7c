//! Explicit run configuration, built once and passed to every component.

use std::path::{Path, PathBuf};
use std::thread;

use tracing::debug;

use crate::config::{ReleaseConfig, WorkspaceFile, DESCRIPTOR_FILE};
use crate::error::Result;
use crate::executor::ExecutorRegistry;
use crate::fingerprint::FingerprintStore;
use crate::graph::PackageGraph;
use crate::layers::LayerRules;
use crate::package::Task;

const DEFAULT_PACKAGES_DIR: &str = "packages";
const DEFAULT_CACHE_DIR: &str = ".strata/cache";

/// Workspace settings, resolved against the workspace root.
#[derive(Debug, Clone)]
pub struct Context {
    pub root: PathBuf,
    /// Directories scanned for package descriptors.
    pub package_roots: Vec<PathBuf>,
    pub cache_dir: PathBuf,
    pub concurrency: usize,
    pub stop_on_failure: bool,
    pub strict_commands: bool,
    pub layer_rules: LayerRules,
    pub release: ReleaseConfig,
    pub workspace_tasks: Vec<Task>,
}

fn default_concurrency() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

impl Context {
    /// A context with default settings and no workspace file.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let packages_dir = root.join(DEFAULT_PACKAGES_DIR);
        let package_roots = if packages_dir.is_dir() {
            vec![packages_dir]
        } else {
            vec![root.clone()]
        };
        Self {
            cache_dir: root.join(DEFAULT_CACHE_DIR),
            package_roots,
            root,
            concurrency: default_concurrency(),
            stop_on_failure: false,
            strict_commands: false,
            layer_rules: LayerRules::default(),
            release: ReleaseConfig::default(),
            workspace_tasks: Vec::new(),
        }
    }

    /// Reads `<root>/strata.toml` if present and resolves its settings.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] if the workspace file is malformed.
    pub fn load(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let mut ctx = Self::new(&root);
        let Some(file) = WorkspaceFile::load(&root)? else {
            debug!(root = %root.display(), "no workspace file, using defaults");
            return Ok(ctx);
        };

        let path = root.join(DESCRIPTOR_FILE);
        ctx.workspace_tasks = file.workspace_tasks(&path)?;

        let workspace = file.workspace;
        if !workspace.packages.is_empty() {
            ctx.package_roots = workspace.packages.iter().map(|p| root.join(p)).collect();
        }
        if let Some(cache_dir) = workspace.cache_dir {
            ctx.cache_dir = root.join(cache_dir);
        }
        if let Some(parallel) = workspace.default_parallel {
            ctx.concurrency = parallel.max(1);
        }
        ctx.stop_on_failure = workspace.stop_on_failure;
        ctx.strict_commands = workspace.strict_commands;
        ctx.layer_rules = LayerRules::from_map(file.layers);
        ctx.release = file.release;

        debug!(
            roots = ctx.package_roots.len(),
            cache_dir = %ctx.cache_dir.display(),
            concurrency = ctx.concurrency,
            "loaded workspace configuration"
        );
        Ok(ctx)
    }

    pub fn with_concurrency(mut self, concurrency: Option<usize>) -> Self {
        if let Some(n) = concurrency {
            self.concurrency = n.max(1);
        }
        self
    }

    pub fn with_stop_on_failure(mut self, stop_on_failure: bool) -> Self {
        self.stop_on_failure |= stop_on_failure;
        self
    }

    pub fn with_layer_rules(mut self, rules: LayerRules) -> Self {
        self.layer_rules = rules;
        self
    }

    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }

    pub fn load_graph(&self) -> Result<PackageGraph> {
        PackageGraph::load_with_tasks(&self.package_roots, self.workspace_tasks.clone())
    }

    pub fn fingerprint_store(&self) -> FingerprintStore {
        FingerprintStore::new(&self.cache_dir)
    }

    pub fn registry(&self) -> ExecutorRegistry {
        ExecutorRegistry::with_defaults(self.strict_commands)
    }
}
