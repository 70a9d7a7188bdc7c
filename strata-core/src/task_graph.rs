//! Task dependency graph derived from the package graph.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::path::PathBuf;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::debug;

use crate::cycles::{cyclic_components, rotate_to_min, shortest_cycle};
use crate::error::{Error, Result};
use crate::graph::PackageGraph;
use crate::package::{Package, Task, TaskId};

/// One unit of work: a task of one package, with everything needed to
/// fingerprint and run it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskNode {
    pub id: TaskId,
    pub command: String,
    pub runner: String,
    /// Working directory of the command and base of the path patterns.
    pub package_dir: PathBuf,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

impl TaskNode {
    pub fn new(package: &Package, task: &Task) -> Self {
        Self {
            id: TaskId::new(&package.name, &task.name),
            command: task.command.clone(),
            runner: task.runner.clone(),
            package_dir: package.path.clone(),
            inputs: task.inputs.clone(),
            outputs: task.outputs.clone(),
        }
    }
}

/// Why an edge exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    /// Declared with `depends_on` inside one package.
    Intra,
    /// Same task name in a package this one depends on.
    Propagated,
}

/// Acyclic graph of [`TaskNode`]s. Edges point from a task to the tasks it
/// waits for.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    graph: DiGraph<TaskNode, EdgeKind>,
    index: FxHashMap<TaskId, NodeIndex>,
    order: Vec<NodeIndex>,
}

impl TaskGraph {
    /// Derives the task graph of every package.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a task depends on an undeclared task of
    /// its package, and [`Error::Cycle`] with a minimal cycle if the derived
    /// relation is cyclic.
    pub fn build(packages: &PackageGraph) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut index: FxHashMap<TaskId, NodeIndex> = FxHashMap::default();

        for package in packages.packages() {
            for task in &package.tasks {
                let node = TaskNode::new(package, task);
                let id = node.id.clone();
                index.insert(id, graph.add_node(node));
            }
        }

        for package in packages.packages() {
            for task in &package.tasks {
                let from = index[&TaskId::new(&package.name, &task.name)];

                for dep in &task.depends_on {
                    if package.get_task(dep).is_none() {
                        return Err(Error::config(
                            &package.descriptor,
                            format!(
                                "Task '{}' of package '{}' depends on unknown task '{}'",
                                task.name, package.name, dep
                            ),
                        ));
                    }
                    let to = index[&TaskId::new(&package.name, dep)];
                    graph.update_edge(from, to, EdgeKind::Intra);
                }

                if task.propagate {
                    for provider in nearest_providers(packages, package, &task.name)? {
                        let to = index[&TaskId::new(provider, &task.name)];
                        graph.update_edge(from, to, EdgeKind::Propagated);
                    }
                }
            }
        }

        let task_graph = Self::from_graph(graph)?;
        debug!(
            tasks = task_graph.len(),
            edges = task_graph.graph.edge_count(),
            "built task graph"
        );
        Ok(task_graph)
    }

    fn from_graph(graph: DiGraph<TaskNode, EdgeKind>) -> Result<Self> {
        if let Some(members) = minimal_cycle(&graph) {
            return Err(Error::Cycle { members });
        }

        let mut order = toposort(&graph, None).map_err(|cycle| Error::Cycle {
            members: vec![graph[cycle.node_id()].id.to_string()],
        })?;
        order.reverse();

        let index = graph
            .node_indices()
            .map(|i| (graph[i].id.clone(), i))
            .collect();

        Ok(Self {
            graph,
            index,
            order,
        })
    }

    /// Restricts the graph to the named tasks and everything they wait for.
    ///
    /// An empty `packages` slice selects the tasks in every package.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskNotFound`] if a task name matches no selected
    /// package.
    pub fn select(&self, task_names: &[String], packages: &[String]) -> Result<Self> {
        let mut stack = Vec::new();
        for name in task_names {
            let before = stack.len();
            stack.extend(self.graph.node_indices().filter(|&i| {
                let id = &self.graph[i].id;
                &id.task == name && (packages.is_empty() || packages.contains(&id.package))
            }));
            if stack.len() == before {
                return Err(Error::TaskNotFound { name: name.clone() });
            }
        }

        let mut keep: HashSet<NodeIndex> = HashSet::new();
        while let Some(node) = stack.pop() {
            if keep.insert(node) {
                stack.extend(self.graph.neighbors_directed(node, Direction::Outgoing));
            }
        }

        let graph = self.graph.filter_map(
            |i, node| keep.contains(&i).then(|| node.clone()),
            |_, kind| Some(*kind),
        );
        Self::from_graph(graph)
    }

    /// Nodes with every dependency before its dependents.
    pub fn topological_order(&self) -> Vec<&TaskNode> {
        self.order.iter().map(|&i| &self.graph[i]).collect()
    }

    /// Direct predecessors of `id`, sorted.
    pub fn predecessors(&self, id: &TaskId) -> Vec<&TaskId> {
        self.neighbors(id, Direction::Outgoing)
    }

    /// Direct dependents of `id`, sorted.
    pub fn dependents(&self, id: &TaskId) -> Vec<&TaskId> {
        self.neighbors(id, Direction::Incoming)
    }

    fn neighbors(&self, id: &TaskId, direction: Direction) -> Vec<&TaskId> {
        let Some(&node) = self.index.get(id) else {
            return Vec::new();
        };
        let mut ids: Vec<&TaskId> = self
            .graph
            .neighbors_directed(node, direction)
            .map(|i| &self.graph[i].id)
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn node(&self, id: &TaskId) -> Option<&TaskNode> {
        self.index.get(id).map(|&i| &self.graph[i])
    }

    pub fn nodes(&self) -> impl Iterator<Item = &TaskNode> + '_ {
        self.graph.node_weights()
    }

    /// Every edge as `(task, waits_for, kind)`, sorted.
    pub fn edges(&self) -> Vec<(&TaskId, &TaskId, EdgeKind)> {
        let mut edges: Vec<_> = self
            .graph
            .edge_references()
            .map(|e| (&self.graph[e.source()].id, &self.graph[e.target()].id, *e.weight()))
            .collect();
        edges.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        edges
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub(crate) fn inner(&self) -> &DiGraph<TaskNode, EdgeKind> {
        &self.graph
    }

    pub(crate) fn order_indices(&self) -> &[NodeIndex] {
        &self.order
    }
}

/// Nearest packages below `package` that declare `task`, walking through
/// packages that do not and past providers whose task does not propagate.
/// A package never provides for itself, even when a package cycle leads back
/// to it.
fn nearest_providers<'a>(
    packages: &'a PackageGraph,
    package: &'a Package,
    task: &str,
) -> Result<BTreeSet<&'a str>> {
    let mut providers = BTreeSet::new();
    let mut visited: HashSet<&str> = HashSet::from([package.name.as_str()]);
    let mut queue: VecDeque<&str> = packages.dependencies_of(&package.name)?.into();

    while let Some(name) = queue.pop_front() {
        if !visited.insert(name) {
            continue;
        }
        let Some(dep) = packages.get_package(name) else {
            continue;
        };
        match dep.get_task(task) {
            Some(provided) => {
                providers.insert(dep.name.as_str());
                // A provider that does not propagate does not order anything
                // below it, so those packages are still ours to wait for.
                if !provided.propagate {
                    queue.extend(packages.dependencies_of(name)?);
                }
            }
            None => queue.extend(packages.dependencies_of(name)?),
        }
    }

    Ok(providers)
}

fn minimal_cycle(graph: &DiGraph<TaskNode, EdgeKind>) -> Option<Vec<String>> {
    cyclic_components(graph)
        .into_iter()
        .map(|component| {
            let cycle: Vec<&TaskId> = shortest_cycle(graph, &component)
                .into_iter()
                .map(|i| &graph[i].id)
                .collect();
            rotate_to_min(cycle, |id| *id)
        })
        .min_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)))
        .map(|cycle| cycle.into_iter().map(ToString::to_string).collect())
}
