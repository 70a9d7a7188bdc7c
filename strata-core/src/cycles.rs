//! Minimal cycle extraction over petgraph graphs.

use std::collections::VecDeque;

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use rustc_hash::{FxHashMap, FxHashSet};

/// Returns every non-trivial strongly connected component: more than one
/// node, or a single node with a self-loop.
pub(crate) fn cyclic_components<N, E>(graph: &DiGraph<N, E>) -> Vec<Vec<NodeIndex>> {
    tarjan_scc(graph)
        .into_iter()
        .filter(|component| {
            component.len() > 1
                || component
                    .first()
                    .is_some_and(|&n| graph.contains_edge(n, n))
        })
        .collect()
}

/// Finds a shortest cycle inside one strongly connected component.
///
/// A breadth-first search is started from every member, restricted to the
/// component; the shortest path back to the start wins, ties going to the
/// lowest start index so the result is deterministic.
pub(crate) fn shortest_cycle<N, E>(
    graph: &DiGraph<N, E>,
    component: &[NodeIndex],
) -> Vec<NodeIndex> {
    let members: FxHashSet<NodeIndex> = component.iter().copied().collect();
    let mut starts: Vec<NodeIndex> = component.to_vec();
    starts.sort_unstable();

    let mut best: Option<Vec<NodeIndex>> = None;

    for &start in &starts {
        if graph.contains_edge(start, start) {
            return vec![start];
        }
        if let Some(cycle) = bfs_back_to(graph, &members, start) {
            if best.as_ref().map_or(true, |b| cycle.len() < b.len()) {
                best = Some(cycle);
            }
        }
    }

    best.unwrap_or_default()
}

fn bfs_back_to<N, E>(
    graph: &DiGraph<N, E>,
    members: &FxHashSet<NodeIndex>,
    start: NodeIndex,
) -> Option<Vec<NodeIndex>> {
    let mut parent: FxHashMap<NodeIndex, NodeIndex> = FxHashMap::default();
    let mut queue = VecDeque::from([start]);

    while let Some(current) = queue.pop_front() {
        let mut next: Vec<NodeIndex> = graph
            .neighbors(current)
            .filter(|n| members.contains(n))
            .collect();
        next.sort_unstable();
        next.dedup();

        for neighbor in next {
            if neighbor == start {
                let mut path = vec![current];
                let mut cursor = current;
                while cursor != start {
                    cursor = parent[&cursor];
                    path.push(cursor);
                }
                path.reverse();
                return Some(path);
            }
            if !parent.contains_key(&neighbor) {
                parent.insert(neighbor, current);
                queue.push_back(neighbor);
            }
        }
    }

    None
}

/// Rotates `cycle` so that it starts at its smallest member by `key`.
pub(crate) fn rotate_to_min<T, K: Ord>(mut cycle: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    if let Some(pos) = cycle
        .iter()
        .enumerate()
        .min_by_key(|(_, item)| key(item))
        .map(|(i, _)| i)
    {
        cycle.rotate_left(pos);
    }
    cycle
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(n: usize, edges: &[(usize, usize)]) -> (DiGraph<usize, ()>, Vec<NodeIndex>) {
        let mut g = DiGraph::new();
        let nodes: Vec<_> = (0..n).map(|i| g.add_node(i)).collect();
        for &(a, b) in edges {
            g.add_edge(nodes[a], nodes[b], ());
        }
        (g, nodes)
    }

    #[test]
    fn acyclic_graph_has_no_components() {
        let (g, _) = graph(3, &[(0, 1), (1, 2)]);
        assert!(cyclic_components(&g).is_empty());
    }

    #[test]
    fn self_loop_is_a_cycle_of_one() {
        let (g, nodes) = graph(2, &[(0, 0), (0, 1)]);
        let components = cyclic_components(&g);
        assert_eq!(components.len(), 1);
        assert_eq!(shortest_cycle(&g, &components[0]), vec![nodes[0]]);
    }

    #[test]
    fn picks_the_shortest_cycle_in_a_component() {
        // 0 -> 1 -> 2 -> 3 -> 0 plus the chord 2 -> 0
        let (g, _) = graph(4, &[(0, 1), (1, 2), (2, 3), (3, 0), (2, 0)]);
        let components = cyclic_components(&g);
        assert_eq!(components.len(), 1);
        let cycle = shortest_cycle(&g, &components[0]);
        let values: Vec<usize> = cycle.iter().map(|&n| g[n]).collect();
        assert_eq!(values, vec![0, 1, 2]);
    }

    #[test]
    fn two_node_cycle() {
        let (g, _) = graph(3, &[(1, 2), (2, 1), (0, 1)]);
        let components = cyclic_components(&g);
        assert_eq!(components.len(), 1);
        let values: Vec<usize> = shortest_cycle(&g, &components[0])
            .iter()
            .map(|&n| g[n])
            .collect();
        assert_eq!(values, vec![1, 2]);
    }

    #[test]
    fn rotation_starts_at_smallest() {
        let rotated = rotate_to_min(vec!["c", "a", "b"], |s| *s);
        assert_eq!(rotated, vec!["a", "b", "c"]);
    }
}
