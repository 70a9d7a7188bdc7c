//! Repository scanner for discovering package descriptors.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::config::{is_workspace_file, PackageConfig, DESCRIPTOR_FILE};
use crate::error::{Error, Result};
use crate::package::{Package, Task};

const MAX_SCAN_DEPTH: usize = 4;
const SKIPPED_DIRS: &[&str] = &["node_modules", "target", "dist"];

/// Scans one or more root directories for packages.
///
/// Looks for `strata.toml` files and parses them into `Package` structures.
/// Workspace files (those with a `[workspace]`, `[layers]` or `[release]`
/// table and no `name`) are skipped.
pub struct Scanner {
    roots: Vec<PathBuf>,
    workspace_tasks: Vec<Task>,
}

impl Scanner {
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        Self {
            roots: roots.into_iter().map(|p| p.as_ref().to_path_buf()).collect(),
            workspace_tasks: Vec::new(),
        }
    }

    /// Tasks merged into every package that does not declare them itself.
    pub fn with_workspace_tasks(mut self, tasks: Vec<Task>) -> Self {
        self.workspace_tasks = tasks;
        self
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Discovers and parses every descriptor below the scan roots.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a root does not exist or a descriptor is
    /// malformed.
    pub fn scan(&self) -> Result<Vec<Package>> {
        let mut descriptors = Vec::new();
        for root in &self.roots {
            if !root.is_dir() {
                return Err(Error::config(root, "Scan root is not a directory"));
            }
            descriptors.extend(
                WalkDir::new(root)
                    .max_depth(MAX_SCAN_DEPTH)
                    .follow_links(false)
                    .sort_by_file_name()
                    .into_iter()
                    .filter_entry(|e| !is_skipped_dir(e))
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file() && e.file_name() == DESCRIPTOR_FILE)
                    .map(|e| e.into_path()),
            );
        }
        descriptors.sort();
        descriptors.dedup();
        debug!(count = descriptors.len(), "found descriptor files");

        let parsed: Result<Vec<Option<Package>>> = descriptors
            .into_par_iter()
            .map(|path| self.load_descriptor(path))
            .collect();

        let mut packages: Vec<Package> = parsed?.into_iter().flatten().collect();
        packages.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.descriptor.cmp(&b.descriptor)));
        Ok(packages)
    }

    fn load_descriptor(&self, descriptor: PathBuf) -> Result<Option<Package>> {
        let content = std::fs::read_to_string(&descriptor)?;
        let raw: toml::Value = toml::from_str(&content)
            .map_err(|e| Error::config(&descriptor, e.message().to_string()))?;
        if is_workspace_file(&raw) {
            return Ok(None);
        }

        let package_dir = descriptor
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| Error::config(&descriptor, "Descriptor has no parent directory"))?;

        let config = PackageConfig::parse(&content, &descriptor)?;
        config
            .into_package(package_dir, descriptor, &self.workspace_tasks)
            .map(Some)
    }
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_ref())
}
