//! Package dependency graph management using petgraph.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::package::{Package, Task};
use crate::scanner::Scanner;

/// Directed graph of package dependencies plus each package's layer.
///
/// Edges point from a package to the packages it depends on. Cycles are
/// allowed here: they are reported by the layer checker, and fail task graph
/// construction only when they induce a task cycle.
#[derive(Debug, Clone)]
pub struct PackageGraph {
    graph: DiGraph<String, ()>,
    node_map: FxHashMap<String, NodeIndex>,
    packages: Vec<Package>,
}

impl PackageGraph {
    /// Scans `roots` for descriptors and builds the graph.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for malformed descriptors, duplicate package
    /// names and unresolved dependencies.
    pub fn load<I, P>(roots: I) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        Self::load_with_tasks(roots, Vec::new())
    }

    /// Like [`PackageGraph::load`], merging workspace default tasks.
    pub fn load_with_tasks<I, P>(roots: I, workspace_tasks: Vec<Task>) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let packages = Scanner::new(roots)
            .with_workspace_tasks(workspace_tasks)
            .scan()?;
        Self::new(packages)
    }

    /// Creates a graph from already parsed packages.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if two packages share a name or a dependency
    /// is neither a known package nor listed as external.
    pub fn new(mut packages: Vec<Package>) -> Result<Self> {
        packages.sort_by(|a, b| a.name.cmp(&b.name));

        let mut graph = DiGraph::new();
        let mut node_map: FxHashMap<String, NodeIndex> = FxHashMap::default();
        let mut seen: FxHashMap<&str, &PathBuf> = FxHashMap::default();

        for package in &packages {
            if let Some(previous) = seen.insert(&package.name, &package.descriptor) {
                return Err(Error::config(
                    &package.descriptor,
                    format!(
                        "Duplicate package name '{}' (also declared in {})",
                        package.name,
                        previous.display()
                    ),
                ));
            }
            let node = graph.add_node(package.name.clone());
            node_map.insert(package.name.clone(), node);
        }

        for package in &packages {
            let from_node = node_map[&package.name];
            for dep_name in &package.deps {
                match node_map.get(dep_name) {
                    Some(to_node) => {
                        graph.update_edge(from_node, *to_node, ());
                    }
                    None if package.is_external(dep_name) => {}
                    None => {
                        return Err(Error::config(
                            &package.descriptor,
                            format!(
                                "Dependency '{}' of '{}' is not a workspace package and is not listed as external",
                                dep_name, package.name
                            ),
                        ));
                    }
                }
            }
        }

        Ok(Self {
            graph,
            node_map,
            packages,
        })
    }

    fn node(&self, package_name: &str) -> Result<NodeIndex> {
        self.node_map
            .get(package_name)
            .copied()
            .ok_or_else(|| Error::PackageNotFound {
                name: package_name.to_string(),
                available: self.available(),
            })
    }

    fn available(&self) -> String {
        self.packages
            .iter()
            .map(|p| p.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Returns all packages, sorted by name.
    #[inline]
    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    /// Retrieves a package by name.
    #[inline]
    pub fn get_package(&self, name: &str) -> Option<&Package> {
        self.node_map
            .get(name)
            .map(|idx| &self.packages[idx.index()])
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Returns the internal dependencies of a package, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the package is not found in the graph.
    pub fn dependencies_of(&self, package_name: &str) -> Result<Vec<&str>> {
        let node = self.node(package_name)?;
        Ok(self.neighbors(node, Direction::Outgoing))
    }

    /// Returns direct dependents of a package (packages that depend on it).
    ///
    /// # Errors
    ///
    /// Returns an error if the package is not found in the graph.
    pub fn dependents_of(&self, package_name: &str) -> Result<Vec<&str>> {
        let node = self.node(package_name)?;
        Ok(self.neighbors(node, Direction::Incoming))
    }

    fn neighbors(&self, node: NodeIndex, direction: Direction) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .graph
            .neighbors_directed(node, direction)
            .map(|idx| self.graph[idx].as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// Returns the layer tag of a package.
    pub fn layer_of(&self, package_name: &str) -> Result<&str> {
        let node = self.node(package_name)?;
        Ok(self.packages[node.index()].layer.as_str())
    }

    /// Iterates over every `(dependent, dependency)` edge, ordered by name.
    pub fn edges(&self) -> impl Iterator<Item = (&Package, &Package)> + '_ {
        self.packages.iter().flat_map(move |package| {
            let node = self.node_map[&package.name];
            self.neighbors(node, Direction::Outgoing)
                .into_iter()
                .filter_map(move |dep| self.get_package(dep).map(|d| (package, d)))
        })
    }

    /// Returns all transitive dependents of a package.
    ///
    /// This includes both direct and indirect dependents (packages that depend
    /// on packages that depend on this package, etc.).
    ///
    /// # Errors
    ///
    /// Returns an error if the package is not found in the graph.
    pub fn all_dependents(&self, package_name: &str) -> Result<HashSet<String>> {
        let start = self.node(package_name)?;
        let mut result = HashSet::new();
        let mut stack = vec![start];

        while let Some(current) = stack.pop() {
            for dependent in self.graph.neighbors_directed(current, Direction::Incoming) {
                if result.insert(self.graph[dependent].clone()) {
                    stack.push(dependent);
                }
            }
        }

        result.remove(package_name);
        Ok(result)
    }

    /// Returns all packages affected by changes to the given packages.
    ///
    /// This includes the changed packages themselves and all their transitive
    /// dependents.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the changed packages are not found in the graph.
    pub fn affected_packages(&self, changed_packages: &[String]) -> Result<HashSet<String>> {
        let mut affected = HashSet::new();

        for package_name in changed_packages {
            affected.insert(package_name.clone());
            affected.extend(self.all_dependents(package_name)?);
        }

        Ok(affected)
    }

    /// The underlying petgraph, with one node per package in name order.
    pub(crate) fn inner(&self) -> &DiGraph<String, ()> {
        &self.graph
    }
}
